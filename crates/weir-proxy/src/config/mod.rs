//! Proxy config: path resolution and strict YAML loading.
//!
//! The path comes from the first CLI argument, then `WEIRPROXY_CONFIG`,
//! then `weirproxy.yaml` in the working directory.

pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use weir_core::error::{Result, WeirError};

pub use schema::{OpsSection, ProxyConfig};

pub const DEFAULT_CONFIG_PATH: &str = "weirproxy.yaml";
pub const CONFIG_PATH_ENV: &str = "WEIRPROXY_CONFIG";

/// Pick the config path: explicit argument, then env value, then default.
/// Empty values count as unset.
pub fn resolve_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.into_iter()
        .chain(env)
        .find(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// [`resolve_path`] against the process arguments and environment.
pub fn path_from_env() -> PathBuf {
    resolve_path(std::env::args().nth(1), std::env::var(CONFIG_PATH_ENV).ok())
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<ProxyConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        WeirError::Internal(format!("read config failed ({}): {e}", path.display()))
    })?;
    let cfg = load_from_str(&s)?;
    tracing::debug!(path = %path.display(), ops_listen = %cfg.ops.listen, "config loaded");
    Ok(cfg)
}

pub fn load_from_str(s: &str) -> Result<ProxyConfig> {
    let cfg: ProxyConfig = serde_yaml::from_str(s)
        .map_err(|e| WeirError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
