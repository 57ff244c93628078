use std::net::SocketAddr;

use serde::Deserialize;
use weir_core::error::{Result, WeirError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    pub version: u32,

    #[serde(default)]
    pub ops: OpsSection,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(WeirError::UnsupportedVersion);
        }
        self.ops.validate()?;
        Ok(())
    }
}

/// Ops HTTP surface (`/healthz`, `/metrics`).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    #[serde(default = "default_ops_listen")]
    pub listen: String,
}

impl Default for OpsSection {
    fn default() -> Self {
        Self {
            listen: default_ops_listen(),
        }
    }
}

impl OpsSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            WeirError::BadRequest(format!("ops.listen must be a valid socket address: {e}"))
        })
    }
}

fn default_ops_listen() -> String {
    "0.0.0.0:6060".into()
}
