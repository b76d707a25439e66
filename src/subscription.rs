use crate::error::{Result, RioError};
use crate::types::{
    ConfiguredSource, ConfiguredZone, ControllerId, SourceId, SourceState, ZoneId, ZoneState,
};
use tokio::sync::broadcast;

/// Event emitted by a [`RioClient`](crate::RioClient)
///
/// Variable names are lowercased, matching the cache keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RioEvent {
    /// Connection to the controller was established
    Connect { host: String, port: u16 },

    /// Connection was closed (by either side)
    Close,

    /// Connection failed or was lost
    Error { detail: String },

    /// A system-scoped variable was reported
    System { variable: String, value: String },

    /// A controller-scoped variable was reported
    Controller {
        controller_id: ControllerId,
        variable: String,
        value: String,
    },

    /// A zone variable was reported
    Zone {
        controller_id: ControllerId,
        zone_id: ZoneId,
        variable: String,
        value: String,
    },

    /// A source variable was reported
    Source {
        source_id: SourceId,
        variable: String,
        value: String,
    },

    /// Every configured zone name is known; emitted once per connection
    Zones {
        controller_id: ControllerId,
        zones: Vec<ZoneState>,
    },

    /// Every configured source name is known; emitted once per connection
    Sources {
        controller_id: ControllerId,
        sources: Vec<SourceState>,
    },

    /// Sources after the source mapping; follows `Sources` once per connection
    ConfiguredSources {
        controller_id: ControllerId,
        sources: Vec<ConfiguredSource>,
    },

    /// Zones after the zone mapping, each with its selectable sources;
    /// emitted once both `Zones` and `ConfiguredSources` have fired
    ConfiguredZones {
        controller_id: ControllerId,
        zones: Vec<ConfiguredZone>,
    },
}

/// Receiver for client events
pub struct EventReceiver {
    rx: broadcast::Receiver<RioEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<RioEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Fails with [`RioError::ConnectionClosed`] once the client is dropped.
    pub async fn recv(&mut self) -> Result<RioEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => RioError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                RioError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive an event without waiting
    ///
    /// Returns `None` if no event is queued.
    pub fn try_recv(&mut self) -> Result<Option<RioEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(RioError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(RioError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
