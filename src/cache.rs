//! Last known controller state, fed only by observed wire traffic

use crate::types::{ControllerId, EntityRef, SourceId, SourceState, ZoneId, ZoneState};
use std::collections::BTreeMap;

/// A collection whose names are tracked for completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Zones `1..=n` of one controller
    Zones { controller_id: ControllerId },
    /// Sources `1..=n`
    Sources,
}

impl Collection {
    fn entity(&self, id: u32) -> EntityRef {
        match *self {
            Self::Zones { controller_id } => EntityRef::zone(controller_id, id),
            Self::Sources => EntityRef::source(id),
        }
    }
}

/// Variable values per entity.
///
/// Variable names are lowercased on the way in and on lookup. Entities are
/// created on first observed value and never removed.
#[derive(Debug, Default)]
pub struct StateCache {
    entities: BTreeMap<EntityRef, BTreeMap<String, String>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous one if there was any
    pub fn upsert(
        &mut self,
        entity: EntityRef,
        variable: &str,
        value: impl Into<String>,
    ) -> Option<String> {
        let variable = variable.to_lowercase();
        let value = value.into();
        tracing::debug!("Cache store {}.{} = {}", entity, variable, value);

        self.entities
            .entry(entity)
            .or_default()
            .insert(variable, value)
    }

    /// Last known value of a variable
    pub fn get(&self, entity: &EntityRef, variable: &str) -> Option<&str> {
        self.entities
            .get(entity)?
            .get(&variable.to_lowercase())
            .map(String::as_str)
    }

    /// All cached variables of one entity
    pub fn variables(&self, entity: &EntityRef) -> Option<&BTreeMap<String, String>> {
        self.entities.get(entity)
    }

    /// Number of distinct entities cached
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// True once every entity `1..=expected` of the collection has a name
    pub fn is_complete(&self, collection: Collection, expected: u32) -> bool {
        expected > 0
            && (1..=expected).all(|id| self.get(&collection.entity(id), "name").is_some())
    }

    /// Snapshot of the cached zones of one controller, ordered by zone id
    pub fn zones(&self, controller_id: ControllerId) -> Vec<ZoneState> {
        self.entities
            .iter()
            .filter_map(|(entity, variables)| match *entity {
                EntityRef::Zone {
                    controller_id: c,
                    zone_id,
                } if c == controller_id => Some(ZoneState {
                    controller_id,
                    zone_id,
                    variables: variables.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Snapshot of the cached sources, ordered by source id
    pub fn sources(&self) -> Vec<SourceState> {
        self.entities
            .iter()
            .filter_map(|(entity, variables)| match *entity {
                EntityRef::Source { source_id } => Some(SourceState {
                    source_id,
                    variables: variables.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn zone(&self, controller_id: ControllerId, zone_id: ZoneId) -> Option<ZoneState> {
        self.variables(&EntityRef::zone(controller_id, zone_id))
            .map(|variables| ZoneState {
                controller_id,
                zone_id,
                variables: variables.clone(),
            })
    }

    pub fn source(&self, source_id: SourceId) -> Option<SourceState> {
        self.variables(&EntityRef::source(source_id))
            .map(|variables| SourceState {
                source_id,
                variables: variables.clone(),
            })
    }
}
