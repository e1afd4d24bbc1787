//! Bridge config loader (strict parsing).

pub mod schema;

use std::fs;
use std::io::ErrorKind;

use telebridge_core::error::{BridgeError, Result};

pub use schema::{
    BridgeConfig, ExportMode, ExportSection, OtlpSection, ParameterConfig, ServerSection,
    ServiceSection, SinkKind,
};

/// Read `path`, apply environment overrides, validate.
///
/// A missing file falls back to the built-in defaults, which still need an
/// instance id from `INSTANCE_ID`.
pub fn load_from_file(path: &str) -> Result<BridgeConfig> {
    let mut cfg = match fs::read_to_string(path) {
        Ok(s) => parse(&s)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(%path, "config file not found, using defaults");
            BridgeConfig::default()
        }
        Err(e) => {
            return Err(BridgeError::InvalidConfig(format!("read config failed: {e}")));
        }
    };
    cfg.apply_env();
    cfg.validate()?;
    Ok(cfg)
}

/// Parse and validate without consulting the environment.
pub fn load_from_str(s: &str) -> Result<BridgeConfig> {
    let cfg = parse(s)?;
    cfg.validate()?;
    Ok(cfg)
}

fn parse(s: &str) -> Result<BridgeConfig> {
    serde_yaml::from_str(s).map_err(|e| BridgeError::InvalidConfig(format!("invalid yaml: {e}")))
}
