//! Engine settings
//!
//! Settings are read once at startup from an optional TOML file and then
//! overridden by environment variables. The resulting [`Settings`] value is
//! passed into the engine and server constructors.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ConfigError;

const DEFAULT_SETTINGS_PATH: &str = "./settings.toml";

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address the HTTP listener binds to
    pub listen_addr: IpAddr,
    pub port: u16,
    /// Shared secret used to decrypt incoming requests
    pub secret_key: String,
    /// Number of sandbox slots (isolate boxes)
    pub pool_size: usize,
    /// First isolate box id used by this engine
    pub box_id_offset: u32,
    /// Root for per-request and per-case working directories
    pub work_dir: PathBuf,
    pub isolate_path: PathBuf,
    /// Run isolate with cgroup accounting (`--cg`)
    pub use_cgroups: bool,
    pub compiler: CompilerSettings,
    /// Maximum accepted request body in bytes
    pub max_request_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub cxx: PathBuf,
    pub flags: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            cxx: PathBuf::from("g++"),
            flags: vec!["-O2".into(), "-std=c++17".into(), "-static".into()],
            timeout_secs: 30,
        }
    }
}

/// Raw TOML layout; every field is optional so env vars can fill the gaps
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    listen_addr: Option<IpAddr>,
    port: Option<u16>,
    secret_key: Option<String>,
    pool_size: Option<usize>,
    box_id_offset: Option<u32>,
    work_dir: Option<PathBuf>,
    isolate_path: Option<PathBuf>,
    use_cgroups: Option<bool>,
    max_request_bytes: Option<usize>,
    #[serde(default)]
    compiler: RawCompilerSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCompilerSettings {
    cxx: Option<PathBuf>,
    flags: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

impl Settings {
    /// Load settings from `.env`, the settings file and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("JUDGE_SETTINGS").unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.into());
        let path = Path::new(&path);
        let contents = if path.exists() {
            info!("Loading settings from {:?}", path);
            Some(
                std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?,
            )
        } else {
            warn!("Settings file {:?} not found, using environment only", path);
            None
        };

        Self::from_sources(path, contents.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build settings from file contents and an environment lookup
    pub fn from_sources(
        path: &Path,
        contents: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw: RawSettings = match contents {
            Some(text) => toml::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            None => RawSettings::default(),
        };

        let defaults = CompilerSettings::default();

        let listen_addr = parse_env(&env, "JUDGE_LISTEN_ADDR")?
            .or(raw.listen_addr)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = parse_env(&env, "JUDGE_PORT")?
            .or(raw.port)
            .ok_or(ConfigError::Missing("port"))?;
        let secret_key = env("JUDGE_SECRET_KEY")
            .or(raw.secret_key)
            .ok_or(ConfigError::Missing("secret_key"))?;
        let pool_size = parse_env(&env, "JUDGE_POOL_SIZE")?
            .or(raw.pool_size)
            .ok_or(ConfigError::Missing("pool_size"))?;
        let box_id_offset = parse_env(&env, "JUDGE_BOX_ID_OFFSET")?
            .or(raw.box_id_offset)
            .unwrap_or(0);
        let work_dir = env("JUDGE_WORK_DIR")
            .map(PathBuf::from)
            .or(raw.work_dir)
            .unwrap_or_else(|| std::env::temp_dir().join("judge-engine"));
        let isolate_path = env("JUDGE_ISOLATE_PATH")
            .map(PathBuf::from)
            .or(raw.isolate_path)
            .unwrap_or_else(|| PathBuf::from("isolate"));
        let use_cgroups = parse_env(&env, "JUDGE_USE_CGROUPS")?
            .or(raw.use_cgroups)
            .unwrap_or(false);
        let max_request_bytes = raw.max_request_bytes.unwrap_or(16 * 1024 * 1024);

        let compiler = CompilerSettings {
            cxx: env("JUDGE_CXX")
                .map(PathBuf::from)
                .or(raw.compiler.cxx)
                .unwrap_or(defaults.cxx),
            flags: raw.compiler.flags.unwrap_or(defaults.flags),
            timeout_secs: raw.compiler.timeout_secs.unwrap_or(defaults.timeout_secs),
        };

        let settings = Self {
            listen_addr,
            port,
            secret_key,
            pool_size,
            box_id_offset,
            work_dir,
            isolate_path,
            use_cgroups,
            compiler,
            max_request_bytes,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.is_empty() {
            return Err(ConfigError::Invalid {
                key: "secret_key",
                reason: "must not be empty".into(),
            });
        }
        if !matches!(self.secret_key.len(), 0..=16 | 24 | 32) {
            return Err(ConfigError::Invalid {
                key: "secret_key",
                reason: format!(
                    "length {} is not usable as an AES key",
                    self.secret_key.len()
                ),
            });
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "pool_size",
                reason: "must be at least 1".into(),
            });
        }
        // isolate box ids are limited to 0-9999
        if self.box_id_offset as usize + self.pool_size > 10_000 {
            return Err(ConfigError::Invalid {
                key: "box_id_offset",
                reason: "box id range exceeds 9999".into(),
            });
        }
        if self.compiler.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "compiler.timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }
}

fn parse_env<T>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}
