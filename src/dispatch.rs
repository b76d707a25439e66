//! Routes decoded inbound lines into the state cache and out as events

use crate::cache::{Collection, StateCache};
use crate::config::{SourceMapping, ZoneMapping};
use crate::mapping;
use crate::parser::{Assignment, ResponseLine};
use crate::subscription::RioEvent;
use crate::types::{ConfiguredSource, ConfiguredZone, ControllerId, EntityRef};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

pub(crate) type SharedDispatcher = Arc<Mutex<Dispatcher>>;

/// Lock the dispatcher, recovering the state if a holder panicked
pub(crate) fn lock(dispatcher: &Mutex<Dispatcher>) -> MutexGuard<'_, Dispatcher> {
    dispatcher
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single writer of the state cache
pub(crate) struct Dispatcher {
    controller_id: ControllerId,
    zone_count: u32,
    source_count: u32,
    cache: StateCache,
    zones_announced: bool,
    sources_announced: bool,
    zone_map: Vec<ZoneMapping>,
    source_map: Vec<SourceMapping>,
    configured_zones: Option<Vec<ConfiguredZone>>,
    configured_sources: Option<Vec<ConfiguredSource>>,
    events: broadcast::Sender<RioEvent>,
}

impl Dispatcher {
    pub fn new(
        controller_id: ControllerId,
        zone_count: u32,
        source_count: u32,
        events: broadcast::Sender<RioEvent>,
    ) -> Self {
        Self {
            controller_id,
            zone_count,
            source_count,
            cache: StateCache::new(),
            zones_announced: false,
            sources_announced: false,
            zone_map: Vec::new(),
            source_map: Vec::new(),
            configured_zones: None,
            configured_sources: None,
            events,
        }
    }

    /// Use display mappings when building the configured snapshots
    pub fn with_mappings(
        mut self,
        zone_map: Vec<ZoneMapping>,
        source_map: Vec<SourceMapping>,
    ) -> Self {
        self.zone_map = zone_map;
        self.source_map = source_map;
        self
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn configured_zones(&self) -> Option<&[ConfiguredZone]> {
        self.configured_zones.as_deref()
    }

    pub fn configured_sources(&self) -> Option<&[ConfiguredSource]> {
        self.configured_sources.as_deref()
    }

    pub fn emit(&self, event: RioEvent) {
        // Sending only fails when nobody is subscribed
        let _ = self.events.send(event);
    }

    /// Allow the aggregate `Zones`/`Sources` events to fire again
    pub fn reset_announcements(&mut self) {
        self.zones_announced = false;
        self.sources_announced = false;
        self.configured_zones = None;
        self.configured_sources = None;
    }

    /// Apply every assignment carried by a line
    pub fn dispatch(&mut self, line: &ResponseLine) {
        for assignment in line.assignments() {
            self.apply(assignment);
        }
    }

    /// Report a lost connection: `Error` (when there is a cause) then `Close`
    pub fn connection_lost(&self, error: Option<String>) {
        if let Some(detail) = error {
            self.emit(RioEvent::Error { detail });
        }
        self.emit(RioEvent::Close);
    }

    fn apply(&mut self, assignment: Assignment) {
        let Assignment {
            entity,
            variable,
            value,
        } = assignment;
        let variable = variable.to_lowercase();
        self.cache.upsert(entity, &variable, value.clone());

        let is_name = variable == "name";
        match entity {
            EntityRef::System => self.emit(RioEvent::System { variable, value }),
            EntityRef::Controller { controller_id } => self.emit(RioEvent::Controller {
                controller_id,
                variable,
                value,
            }),
            EntityRef::Zone {
                controller_id,
                zone_id,
            } => {
                self.emit(RioEvent::Zone {
                    controller_id,
                    zone_id,
                    variable,
                    value,
                });
                if is_name && controller_id == self.controller_id {
                    self.announce_zones();
                }
            }
            EntityRef::Source { source_id } => {
                self.emit(RioEvent::Source {
                    source_id,
                    variable,
                    value,
                });
                if is_name {
                    self.announce_sources();
                }
            }
        }
    }

    fn announce_zones(&mut self) {
        let collection = Collection::Zones {
            controller_id: self.controller_id,
        };
        if self.zones_announced || !self.cache.is_complete(collection, self.zone_count) {
            return;
        }
        self.zones_announced = true;

        let zones = self.cache.zones(self.controller_id);
        tracing::info!("All {} zone names known", self.zone_count);
        self.emit(RioEvent::Zones {
            controller_id: self.controller_id,
            zones,
        });
        self.configure_zones();
    }

    fn announce_sources(&mut self) {
        if self.sources_announced
            || !self.cache.is_complete(Collection::Sources, self.source_count)
        {
            return;
        }
        self.sources_announced = true;

        let sources = self
            .cache
            .sources()
            .into_iter()
            .filter(|source| !source.is_unassigned())
            .collect();
        tracing::info!("All {} source names known", self.source_count);
        self.emit(RioEvent::Sources {
            controller_id: self.controller_id,
            sources,
        });
        self.configure_sources();
    }

    /// Build the configured sources, then the zones if they were waiting
    fn configure_sources(&mut self) {
        let sources = mapping::configure_sources(&self.source_map, &self.cache.sources());
        tracing::debug!("{} configured sources", sources.len());
        self.configured_sources = Some(sources.clone());
        self.emit(RioEvent::ConfiguredSources {
            controller_id: self.controller_id,
            sources,
        });
        self.configure_zones();
    }

    /// Zones are configured once both aggregates are known
    fn configure_zones(&mut self) {
        if self.configured_zones.is_some() || !self.zones_announced {
            return;
        }
        let Some(sources) = &self.configured_sources else {
            return;
        };

        let zones = mapping::configure_zones(
            &self.zone_map,
            &self.cache.zones(self.controller_id),
            sources,
        );
        tracing::debug!("{} configured zones", zones.len());
        self.configured_zones = Some(zones.clone());
        self.emit(RioEvent::ConfiguredZones {
            controller_id: self.controller_id,
            zones,
        });
    }
}
