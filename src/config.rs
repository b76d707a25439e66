use crate::error::{Result, RioError};
use crate::protocol::DEFAULT_PORT;
use crate::types::ControllerId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Connection settings for one controller
///
/// Deserializes from either a bare object or one nested under `"rio"`:
///
/// ```json
/// { "rio": { "ip": "192.168.1.50", "zones": 8, "sources": 4 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    #[serde(alias = "controller")]
    pub controller_id: ControllerId,

    #[serde(alias = "ipaddress")]
    pub ip: String,

    pub port: u16,

    /// Number of zones on this controller
    pub zones: u32,

    /// Number of sources
    pub sources: u32,

    pub name: String,

    /// How long a command waits for its response
    pub request_timeout_ms: u64,

    /// Per-zone display settings, matched by controller zone name.
    /// When set, only listed zones are configured.
    #[serde(alias = "zone_mapping", skip_serializing_if = "Vec::is_empty")]
    pub zone_map: Vec<ZoneMapping>,

    /// Per-source display settings, matched by controller source name.
    /// When set, only listed sources are configured.
    #[serde(alias = "source_mapping", skip_serializing_if = "Vec::is_empty")]
    pub source_map: Vec<SourceMapping>,
}

fn enabled() -> bool {
    true
}

/// Display settings for one zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMapping {
    /// Zone name as reported by the controller
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default = "enabled")]
    pub enable: bool,

    /// Source names offered in this zone; every configured source if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// Display settings for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMapping {
    /// Source name as reported by the controller
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default = "enabled")]
    pub enable: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_id: 1,
            ip: String::new(),
            port: DEFAULT_PORT,
            zones: 6,
            sources: 6,
            name: "Russound".to_string(),
            request_timeout_ms: 10_000,
            zone_map: Vec::new(),
            source_map: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Default settings for the controller at `ip`
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Parse settings from JSON, accepting a top-level `"rio"` section.
    ///
    /// `zones` and `sources` may also be arrays of mappings, in which case
    /// they fill `zone_map` / `source_map` and the counts keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        let mut section = match value.get_mut("rio").map(serde_json::Value::take) {
            Some(rio) => rio,
            None => value,
        };
        move_mapping_lists(&mut section);

        let config: Self = serde_json::from_value(section)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that the settings can address a controller
    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(RioError::InvalidConfig("controller ip is not set".to_string()));
        }
        if self.controller_id == 0 {
            return Err(RioError::InvalidConfig("controller id must be at least 1".to_string()));
        }
        if self.zones == 0 || self.sources == 0 {
            return Err(RioError::InvalidConfig(
                "zone and source counts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(RioError::InvalidConfig("request timeout must be non-zero".to_string()));
        }
        let unnamed = self.zone_map.iter().any(|z| z.name.trim().is_empty())
            || self.source_map.iter().any(|s| s.name.trim().is_empty());
        if unnamed {
            return Err(RioError::InvalidConfig("mapping entries need a name".to_string()));
        }
        Ok(())
    }
}

/// Rename array-valued `zones` / `sources` to the mapping fields
fn move_mapping_lists(section: &mut serde_json::Value) {
    let Some(object) = section.as_object_mut() else {
        return;
    };
    for (list, map) in [("zones", "zone_map"), ("sources", "source_map")] {
        if object.get(list).is_some_and(serde_json::Value::is_array) {
            if let Some(entries) = object.remove(list) {
                object.insert(map.to_string(), entries);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::new("10.0.0.5");
        assert_eq!(config.controller_id, 1);
        assert_eq!(config.port, 9621);
        assert_eq!(config.zones, 6);
        assert_eq!(config.sources, 6);
        assert_eq!(config.name, "Russound");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_rio_section_with_aliases() {
        let config = ControllerConfig::from_json_str(
            r#"{ "rio": { "ipaddress": "192.168.1.50", "controller": 2, "zones": 8 } }"#,
        )
        .unwrap();
        assert_eq!(config.ip, "192.168.1.50");
        assert_eq!(config.controller_id, 2);
        assert_eq!(config.zones, 8);
        assert_eq!(config.sources, 6);
    }

    #[test]
    fn test_bare_object() {
        let config = ControllerConfig::from_json_str(
            r#"{ "ip": "192.168.1.50", "port": 9000, "name": "Basement" }"#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.name, "Basement");
    }

    #[test]
    fn test_mapping_arrays() {
        let config = ControllerConfig::from_json_str(
            r#"{ "rio": {
                "ip": "192.168.1.50",
                "zones": [
                    { "name": "Zone 1", "display_name": "Living Room", "sources": ["Tuner"] },
                    { "name": "Zone 2", "enable": false }
                ],
                "sources": [{ "name": "Tuner", "display_name": "Radio" }]
            } }"#,
        )
        .unwrap();

        assert_eq!(config.zones, 6);
        assert_eq!(config.sources, 6);
        assert_eq!(config.zone_map.len(), 2);
        assert_eq!(config.zone_map[0].display_name.as_deref(), Some("Living Room"));
        assert_eq!(config.zone_map[0].sources, Some(vec!["Tuner".to_string()]));
        assert!(config.zone_map[0].enable);
        assert!(!config.zone_map[1].enable);
        assert_eq!(config.source_map[0].name, "Tuner");
    }

    #[test]
    fn test_unnamed_mapping_is_rejected() {
        let result = ControllerConfig::from_json_str(
            r#"{ "ip": "192.168.1.50", "source_map": [{ "name": "" }] }"#,
        );
        assert!(matches!(result, Err(RioError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_ip_is_rejected() {
        let result = ControllerConfig::from_json_str(r#"{ "rio": { "zones": 4 } }"#);
        assert!(matches!(result, Err(RioError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = ControllerConfig::from_json_str("{ ip: ");
        assert!(matches!(result, Err(RioError::Json(_))));
    }
}
