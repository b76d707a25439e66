use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Controller identifier (1-based, as printed in `C[n]`)
pub type ControllerId = u32;

/// Zone identifier within a controller (1-based, as printed in `Z[n]`)
pub type ZoneId = u32;

/// Source identifier (1-based, as printed in `S[n]`)
pub type SourceId = u32;

/// Source name the controller reports for an unassigned input
pub const UNASSIGNED_SOURCE_NAME: &str = "N/A";

/// Addressable target of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRef {
    /// The whole system (`System.status`, `VERSION`)
    System,
    /// A physical controller, `C[n]`
    Controller { controller_id: ControllerId },
    /// A zone on a controller, `C[n].Z[m]`
    Zone {
        controller_id: ControllerId,
        zone_id: ZoneId,
    },
    /// A source, `S[n]`
    Source { source_id: SourceId },
}

impl EntityRef {
    pub fn controller(controller_id: ControllerId) -> Self {
        Self::Controller { controller_id }
    }

    pub fn zone(controller_id: ControllerId, zone_id: ZoneId) -> Self {
        Self::Zone {
            controller_id,
            zone_id,
        }
    }

    pub fn source(source_id: SourceId) -> Self {
        Self::Source { source_id }
    }

    /// Which collection this entity belongs to
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::System => EntityKind::System,
            Self::Controller { .. } => EntityKind::Controller,
            Self::Zone { .. } => EntityKind::Zone,
            Self::Source { .. } => EntityKind::Source,
        }
    }
}

/// Formats the wire target expression (`C[1].Z[2]`, `S[3]`, ...)
impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            Self::Controller { controller_id } => write!(f, "C[{}]", controller_id),
            Self::Zone {
                controller_id,
                zone_id,
            } => write!(f, "C[{}].Z[{}]", controller_id, zone_id),
            Self::Source { source_id } => write!(f, "S[{}]", source_id),
        }
    }
}

/// Entity collection kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    System,
    Controller,
    Zone,
    Source,
}

/// Something that can be watched for unsolicited change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WatchItem {
    System,
    Zone {
        controller_id: ControllerId,
        zone_id: ZoneId,
    },
    Source { source_id: SourceId },
}

impl WatchItem {
    pub fn zone(controller_id: ControllerId, zone_id: ZoneId) -> Self {
        Self::Zone {
            controller_id,
            zone_id,
        }
    }

    pub fn source(source_id: SourceId) -> Self {
        Self::Source { source_id }
    }

    /// Registry key: `System`, `zone{N}` or `source{N}`
    pub fn key(&self) -> String {
        match self {
            Self::System => "System".to_string(),
            Self::Zone { zone_id, .. } => format!("zone{}", zone_id),
            Self::Source { source_id } => format!("source{}", source_id),
        }
    }

    /// The entity whose variables this watch reports on
    pub fn entity(&self) -> EntityRef {
        match *self {
            Self::System => EntityRef::System,
            Self::Zone {
                controller_id,
                zone_id,
            } => EntityRef::zone(controller_id, zone_id),
            Self::Source { source_id } => EntityRef::source(source_id),
        }
    }
}

/// Last known variables of one zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneState {
    pub controller_id: ControllerId,
    pub zone_id: ZoneId,

    /// Lowercased variable name to last observed value
    pub variables: BTreeMap<String, String>,
}

impl ZoneState {
    /// Get the zone name, if it has been observed
    pub fn name(&self) -> Option<&str> {
        self.variables.get("name").map(String::as_str)
    }

    /// Get any cached variable (case-insensitive)
    pub fn get(&self, variable: &str) -> Option<&str> {
        self.variables
            .get(&variable.to_lowercase())
            .map(String::as_str)
    }
}

/// Last known variables of one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    pub source_id: SourceId,

    /// Lowercased variable name to last observed value
    pub variables: BTreeMap<String, String>,
}

impl SourceState {
    /// Get the source name, if it has been observed
    pub fn name(&self) -> Option<&str> {
        self.variables.get("name").map(String::as_str)
    }

    /// Get any cached variable (case-insensitive)
    pub fn get(&self, variable: &str) -> Option<&str> {
        self.variables
            .get(&variable.to_lowercase())
            .map(String::as_str)
    }

    /// Whether the controller reports this input as unassigned
    pub fn is_unassigned(&self) -> bool {
        self.name() == Some(UNASSIGNED_SOURCE_NAME)
    }
}

/// A source as presented to users, after the source mapping is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredSource {
    pub source_id: SourceId,
    /// Name reported by the controller
    pub name: String,
    pub display_name: String,
}

/// A zone as presented to users, after the zone mapping is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredZone {
    pub controller_id: ControllerId,
    pub zone_id: ZoneId,
    /// Name reported by the controller
    pub name: String,
    pub display_name: String,
    /// Sources selectable in this zone
    pub sources: Vec<ConfiguredSource>,
}
