//! Applies the configured zone and source mappings to controller snapshots

use crate::config::{SourceMapping, ZoneMapping};
use crate::types::{ConfiguredSource, ConfiguredZone, SourceState, ZoneState};

/// Sources to present, in source id order.
///
/// Unnamed and unassigned (`N/A`) sources are skipped. Without mappings every
/// other source is kept under its own name; with mappings only enabled,
/// listed sources are kept.
pub fn configure_sources(
    mappings: &[SourceMapping],
    sources: &[SourceState],
) -> Vec<ConfiguredSource> {
    sources
        .iter()
        .filter(|source| !source.is_unassigned())
        .filter_map(|source| {
            let name = source.name()?;
            let display_name = if mappings.is_empty() {
                name
            } else {
                let mapping = mappings.iter().find(|m| m.name == name)?;
                if !mapping.enable {
                    return None;
                }
                mapping.display_name.as_deref().unwrap_or(name)
            };
            Some(ConfiguredSource {
                source_id: source.source_id,
                name: name.to_string(),
                display_name: display_name.to_string(),
            })
        })
        .collect()
}

/// Zones to present, in zone id order, each with its selectable sources.
///
/// Without mappings every named zone is kept and offers every configured
/// source. With mappings only enabled, listed zones are kept; a mapping's
/// `sources` list picks configured sources by name, in the listed order.
pub fn configure_zones(
    mappings: &[ZoneMapping],
    zones: &[ZoneState],
    sources: &[ConfiguredSource],
) -> Vec<ConfiguredZone> {
    zones
        .iter()
        .filter_map(|zone| {
            let name = zone.name()?;
            let (display_name, offered) = if mappings.is_empty() {
                (name, sources.to_vec())
            } else {
                let mapping = mappings.iter().find(|m| m.name == name)?;
                if !mapping.enable {
                    return None;
                }
                let offered = match &mapping.sources {
                    Some(names) => names
                        .iter()
                        .filter_map(|wanted| sources.iter().find(|s| &s.name == wanted))
                        .cloned()
                        .collect(),
                    None => sources.to_vec(),
                };
                (mapping.display_name.as_deref().unwrap_or(name), offered)
            };
            Some(ConfiguredZone {
                controller_id: zone.controller_id,
                zone_id: zone.zone_id,
                name: name.to_string(),
                display_name: display_name.to_string(),
                sources: offered,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn source(source_id: u32, name: &str) -> SourceState {
        SourceState {
            source_id,
            variables: BTreeMap::from([("name".to_string(), name.to_string())]),
        }
    }

    fn zone(zone_id: u32, name: &str) -> ZoneState {
        ZoneState {
            controller_id: 1,
            zone_id,
            variables: BTreeMap::from([("name".to_string(), name.to_string())]),
        }
    }

    fn source_mapping(name: &str, display_name: Option<&str>, enable: bool) -> SourceMapping {
        SourceMapping {
            name: name.to_string(),
            display_name: display_name.map(str::to_string),
            enable,
        }
    }

    #[test]
    fn test_sources_without_mapping() {
        let configured = configure_sources(&[], &[source(1, "Tuner"), source(2, "N/A")]);
        assert_eq!(
            configured,
            vec![ConfiguredSource {
                source_id: 1,
                name: "Tuner".to_string(),
                display_name: "Tuner".to_string(),
            }]
        );
    }

    #[test]
    fn test_sources_with_mapping() {
        let mappings = [
            source_mapping("Tuner", Some("Radio"), true),
            source_mapping("Streamer", None, false),
        ];
        let configured = configure_sources(
            &mappings,
            &[source(1, "Tuner"), source(2, "Streamer"), source(3, "Aux")],
        );
        assert_eq!(configured.len(), 1);
        assert_eq!(configured[0].display_name, "Radio");
    }

    #[test]
    fn test_zones_without_mapping_offer_every_source() {
        let sources = configure_sources(&[], &[source(1, "Tuner"), source(2, "Aux")]);
        let zones = configure_zones(&[], &[zone(1, "Living"), zone(2, "Kitchen")], &sources);

        assert_eq!(zones.len(), 2);
        assert_eq!(zones[1].display_name, "Kitchen");
        assert_eq!(zones[1].sources, sources);
    }

    #[test]
    fn test_zones_with_mapping() {
        let sources = configure_sources(&[], &[source(1, "Tuner"), source(2, "Aux")]);
        let mappings = [
            ZoneMapping {
                name: "Living".to_string(),
                display_name: Some("Living Room".to_string()),
                enable: true,
                sources: Some(vec!["Aux".to_string(), "Missing".to_string()]),
            },
            ZoneMapping {
                name: "Garage".to_string(),
                display_name: None,
                enable: false,
                sources: None,
            },
        ];
        let zones = configure_zones(
            &mappings,
            &[zone(1, "Living"), zone(2, "Kitchen"), zone(3, "Garage")],
            &sources,
        );

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].display_name, "Living Room");
        assert_eq!(zones[0].sources.len(), 1);
        assert_eq!(zones[0].sources[0].name, "Aux");
    }
}
