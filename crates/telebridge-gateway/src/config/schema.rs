use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use telebridge_core::error::{BridgeError, Result};
use telebridge_core::{Domain, ParamSpec, ParameterSet};

/// Path segments already taken by built-in endpoints.
const RESERVED_ROUTES: [&str; 5] = ["params", "update", "metrics", "healthz", "readyz"];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub version: u32,

    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default = "default_parameters")]
    pub parameters: Vec<ParameterConfig>,

    #[serde(default)]
    pub export: ExportSection,

    #[serde(default = "default_routes")]
    pub routes: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            service: ServiceSection::default(),
            server: ServerSection::default(),
            parameters: default_parameters(),
            export: ExportSection::default(),
            routes: default_routes(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(BridgeError::InvalidConfig(format!(
                "unsupported config version {} (expected 1)",
                self.version
            )));
        }

        self.service.validate()?;
        self.server.validate()?;
        self.parameter_set()?;
        self.export.validate()?;
        if self.parameters.iter().any(|p| p.name == self.export.sum_instrument) {
            return Err(BridgeError::InvalidConfig(format!(
                "export.sum_instrument {:?} collides with a parameter name",
                self.export.sum_instrument
            )));
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.is_empty()
                || !route
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
            {
                return Err(BridgeError::InvalidConfig(format!(
                    "route {route:?} may only contain [a-z0-9_-]"
                )));
            }
            if RESERVED_ROUTES.contains(&route.as_str()) {
                return Err(BridgeError::InvalidConfig(format!(
                    "route {route:?} collides with a built-in endpoint"
                )));
            }
            if !seen.insert(route.as_str()) {
                return Err(BridgeError::InvalidConfig(format!("duplicate route: {route}")));
            }
        }

        Ok(())
    }

    /// Compile the parameter list into the core's ordered set.
    pub fn parameter_set(&self) -> Result<ParameterSet> {
        ParameterSet::new(self.parameters.iter().map(ParameterConfig::to_spec).collect())
    }

    /// Environment overrides: `INSTANCE_ID`, `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn apply_env(&mut self) {
        if let Ok(id) = std::env::var("INSTANCE_ID") {
            if !id.is_empty() {
                self.service.instance_id = Some(id);
            }
        }
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            if !endpoint.is_empty() {
                self.export.otlp.endpoint = endpoint;
            }
        }
    }

    /// Instance identifier attached to every exported data point.
    pub fn instance_id(&self) -> &str {
        self.service.instance_id.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_service_version")]
    pub version: String,

    #[serde(default)]
    pub instance_id: Option<String>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: default_service_version(),
            instance_id: None,
        }
    }
}

impl ServiceSection {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BridgeError::InvalidConfig("service.name must not be empty".into()));
        }
        match self.instance_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(()),
            _ => Err(BridgeError::InvalidConfig(
                "service.instance_id is required (or set INSTANCE_ID)".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            BridgeError::InvalidConfig(format!(
                "server.listen {:?} is not a socket address: {e}",
                self.listen
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub default: i64,

    #[serde(default)]
    pub domain: Domain,
}

impl ParameterConfig {
    fn binary(name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default: 0,
            domain: Domain::Binary,
        }
    }

    fn to_spec(&self) -> ParamSpec {
        ParamSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            default: self.default,
            domain: self.domain.clone(),
        }
    }
}

/// How samples reach the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Record on every successful update.
    Push,
    /// Sample and flush on a fixed interval.
    #[default]
    Timer,
    /// Observable instruments read by the SDK on collection.
    Callback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Otlp,
    /// Structured log lines only; no network.
    Log,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportSection {
    #[serde(default)]
    pub mode: ExportMode,

    #[serde(default)]
    pub sink: SinkKind,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_sum_instrument")]
    pub sum_instrument: String,

    #[serde(default = "default_sum_boundaries")]
    pub sum_boundaries: Vec<f64>,

    #[serde(default)]
    pub otlp: OtlpSection,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            mode: ExportMode::default(),
            sink: SinkKind::default(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            sum_instrument: default_sum_instrument(),
            sum_boundaries: default_sum_boundaries(),
            otlp: OtlpSection::default(),
        }
    }
}

impl ExportSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=3_600_000).contains(&self.interval_ms) {
            return Err(BridgeError::InvalidConfig(
                "export.interval_ms must be between 1000 and 3600000".into(),
            ));
        }
        if self.timeout_ms < 100 || self.timeout_ms >= self.interval_ms {
            return Err(BridgeError::InvalidConfig(
                "export.timeout_ms must be at least 100 and less than interval_ms".into(),
            ));
        }
        if self.mode == ExportMode::Callback && self.sink != SinkKind::Otlp {
            return Err(BridgeError::InvalidConfig(
                "export.mode callback requires the otlp sink".into(),
            ));
        }
        if self.sum_instrument.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "export.sum_instrument must not be empty".into(),
            ));
        }
        if self.sum_boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BridgeError::InvalidConfig(
                "export.sum_boundaries must be strictly increasing".into(),
            ));
        }
        if self.sink == SinkKind::Otlp {
            self.otlp.validate()?;
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OtlpSection {
    #[serde(default = "default_otlp_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for OtlpSection {
    fn default() -> Self {
        Self {
            endpoint: default_otlp_endpoint(),
            username: None,
            password: None,
        }
    }
}

impl OtlpSection {
    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(BridgeError::InvalidConfig(
                "export.otlp.endpoint must start with http:// or https://".into(),
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(BridgeError::InvalidConfig(
                "export.otlp.password requires export.otlp.username".into(),
            ));
        }
        Ok(())
    }
}

fn default_service_name() -> String {
    "hub".into()
}
fn default_service_version() -> String {
    "0.1.0".into()
}
fn default_listen() -> String {
    "0.0.0.0:8008".into()
}
fn default_parameters() -> Vec<ParameterConfig> {
    vec![
        ParameterConfig::binary("hub_param_a", "status of service A"),
        ParameterConfig::binary("hub_param_b", "status of service B"),
        ParameterConfig::binary("hub_param_c", "status of service C"),
    ]
}
fn default_routes() -> Vec<String> {
    Vec::new()
}
fn default_interval_ms() -> u64 {
    60000
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_sum_instrument() -> String {
    "hub-utilization".into()
}
fn default_sum_boundaries() -> Vec<f64> {
    vec![0.0, 1.0, 2.0, 3.0]
}
fn default_otlp_endpoint() -> String {
    "http://otel-collector:4317".into()
}
