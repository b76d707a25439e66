use crate::config::ControllerConfig;
use crate::connection::Connection;
use crate::dispatch::{self, Dispatcher, SharedDispatcher};
use crate::error::{Result, RioError};
use crate::parser::{Assignment, ResponseLine, Status};
use crate::protocol::{event, Command, CONTROLLER_VARIABLES, SOURCE_VARIABLES, ZONE_VARIABLES};
use crate::subscription::{EventReceiver, RioEvent};
use crate::types::{
    ConfiguredSource, ConfiguredZone, EntityRef, SourceId, SourceState, WatchItem, ZoneId,
    ZoneState,
};
use crate::watch::WatchRegistry;
use futures_util::future::try_join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{Instrument, Span};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

enum Link {
    Disconnected,
    Connecting,
    Connected(Arc<Connection>),
}

/// Client for one Russound controller speaking RIO
///
/// The client owns the socket, the command queue and the state cache.
/// Every variable the controller reports, whether as a command response or
/// a watch notification, is cached and published as a [`RioEvent`].
///
/// # Example
///
/// ```no_run
/// use russound_rio::{ControllerConfig, RioClient, RioEvent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = RioClient::new(ControllerConfig::new("192.168.1.50"))?;
///     let mut events = client.subscribe();
///
///     client.connect().await?;
///     client.zone_names().await?;
///     client.watch_all_zones(true).await?;
///
///     while let Ok(event) = events.recv().await {
///         if let RioEvent::Zone { zone_id, variable, value, .. } = event {
///             println!("zone {} {} = {}", zone_id, variable, value);
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct RioClient {
    config: ControllerConfig,
    span: Span,
    events: broadcast::Sender<RioEvent>,
    dispatcher: SharedDispatcher,
    link: Mutex<Link>,
    /// Serializes `connect` calls
    connecting: tokio::sync::Mutex<()>,
    watches: Arc<tokio::sync::Mutex<WatchRegistry>>,
}

impl RioClient {
    /// Create a disconnected client
    pub fn new(config: ControllerConfig) -> Result<Self> {
        let span = tracing::info_span!(
            "rio",
            controller = config.controller_id,
            host = %config.ip
        );
        Self::with_span(config, span)
    }

    /// Create a disconnected client that logs under the given span
    pub fn with_span(config: ControllerConfig, span: Span) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let dispatcher = Dispatcher::new(
            config.controller_id,
            config.zones,
            config.sources,
            events.clone(),
        )
        .with_mappings(config.zone_map.clone(), config.source_map.clone());

        Ok(Self {
            config,
            span,
            events,
            dispatcher: Arc::new(Mutex::new(dispatcher)),
            link: Mutex::new(Link::Disconnected),
            connecting: tokio::sync::Mutex::new(()),
            watches: Arc::new(tokio::sync::Mutex::new(WatchRegistry::new())),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Subscribe to client events
    ///
    /// Multiple receivers can be active at once; each sees every event
    /// emitted after it subscribed.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.events.subscribe())
    }

    pub fn status(&self) -> ConnectionStatus {
        match &*self.lock_link() {
            Link::Connected(conn) if conn.is_open() => ConnectionStatus::Connected,
            Link::Connecting => ConnectionStatus::Connecting,
            _ => ConnectionStatus::Disconnected,
        }
    }

    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: RioEvent) {
        dispatch::lock(&self.dispatcher).emit(event);
    }

    // ========== Lifecycle ==========

    /// Connect to the controller
    ///
    /// Does nothing if already connected. There is no automatic reconnect:
    /// after a `Close` event call `connect` again.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connecting.lock().await;

        if self.status() == ConnectionStatus::Connected {
            return Ok(());
        }
        *self.lock_link() = Link::Connecting;
        let mut attempt = ConnectAttempt {
            link: &self.link,
            done: false,
        };

        // A fresh socket starts with no watches on the controller side
        self.watches.lock().await.clear();
        dispatch::lock(&self.dispatcher).reset_announcements();

        let host = self.config.ip.clone();
        let port = self.config.port;
        let result = Connection::connect(
            &host,
            port,
            self.config.request_timeout(),
            self.dispatcher.clone(),
            self.span.clone(),
        )
        .instrument(self.span.clone())
        .await;

        match result {
            Ok(conn) => {
                *self.lock_link() = Link::Connected(Arc::new(conn));
                attempt.done = true;
                self.span
                    .in_scope(|| tracing::info!("Connected to {}:{}", host, port));
                self.emit(RioEvent::Connect { host, port });
                Ok(())
            }
            Err(e) => {
                drop(attempt);
                self.span
                    .in_scope(|| tracing::error!("Failed to connect to {}:{}: {}", host, port, e));
                self.emit(RioEvent::Error {
                    detail: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Close the connection
    ///
    /// Commands still pending fail with [`RioError::ConnectionClosed`].
    pub fn close(&self) {
        let link = std::mem::replace(&mut *self.lock_link(), Link::Disconnected);
        if let Link::Connected(conn) = link {
            if conn.close() {
                self.span.in_scope(|| tracing::info!("Connection closed"));
                self.emit(RioEvent::Close);
            }
        }
    }

    fn connection(&self) -> Result<Arc<Connection>> {
        match &*self.lock_link() {
            Link::Connected(conn) if conn.is_open() => Ok(conn.clone()),
            _ => Err(RioError::NotConnected),
        }
    }

    // ========== Commands ==========

    /// Send a command and return the response payload
    ///
    /// Commands are written one at a time in call order. A controller error
    /// line fails only this command.
    pub async fn command(&self, command: Command) -> Result<String> {
        self.connection()?.send(command).await
    }

    /// Send a GET and return the value reported for `entity.variable`
    async fn get_value(&self, entity: EntityRef, variable: &str) -> Result<String> {
        let payload = self.command(Command::get(entity, variable)).await?;
        find_value(&payload, entity, variable)
            .ok_or_else(|| RioError::InvalidResponse(payload.clone()))
    }

    /// Controller firmware version (`VERSION`)
    pub async fn version(&self) -> Result<String> {
        let payload = self.command(Command::version()).await?;
        Ok(find_value(&payload, EntityRef::System, "version").unwrap_or(payload))
    }

    /// `System.status`: `ON` if any zone is on
    pub async fn system_status(&self) -> Result<String> {
        self.get_value(EntityRef::System, "status").await
    }

    /// Query the controller's IP and MAC address
    pub async fn controller_info(&self) -> Result<BTreeMap<String, String>> {
        let entity = EntityRef::controller(self.config.controller_id);
        self.command(Command::get_variables(entity, CONTROLLER_VARIABLES))
            .await?;
        Ok(self.cached_variables(&entity))
    }

    // ========== Zones ==========

    fn zone_entity(&self, zone_id: ZoneId) -> EntityRef {
        EntityRef::zone(self.config.controller_id, zone_id)
    }

    /// Read one zone variable from the controller
    pub async fn zone_variable(&self, zone_id: ZoneId, variable: &str) -> Result<String> {
        self.get_value(self.zone_entity(zone_id), variable).await
    }

    /// Change one zone variable
    pub async fn set_zone_variable(
        &self,
        zone_id: ZoneId,
        variable: &str,
        value: impl fmt::Display,
    ) -> Result<()> {
        self.command(Command::set(self.zone_entity(zone_id), variable, value))
            .await?;
        Ok(())
    }

    /// Read every zone variable and return the refreshed zone state
    pub async fn zone(&self, zone_id: ZoneId) -> Result<ZoneState> {
        let entity = self.zone_entity(zone_id);
        self.command(Command::get_variables(entity, ZONE_VARIABLES))
            .await?;
        Ok(ZoneState {
            controller_id: self.config.controller_id,
            zone_id,
            variables: self.cached_variables(&entity),
        })
    }

    /// Read the names of all configured zones in one batched GET
    pub async fn zone_names(&self) -> Result<Vec<ZoneState>> {
        self.command(Command::get_zones(
            self.config.controller_id,
            self.config.zones,
            "name",
        ))
        .await?;
        Ok(self.cached_zones())
    }

    /// Fire a zone event: `EVENT C[n].Z[m]!<event> [data1] [data2]`
    pub async fn zone_event(
        &self,
        zone_id: ZoneId,
        event: &str,
        data1: Option<&str>,
        data2: Option<&str>,
    ) -> Result<()> {
        self.command(Command::event(
            self.config.controller_id,
            zone_id,
            event,
            data1,
            data2,
        ))
        .await?;
        Ok(())
    }

    pub async fn zone_on(&self, zone_id: ZoneId) -> Result<()> {
        self.zone_event(zone_id, event::ZONE_ON, None, None).await
    }

    pub async fn zone_off(&self, zone_id: ZoneId) -> Result<()> {
        self.zone_event(zone_id, event::ZONE_OFF, None, None).await
    }

    /// Turn every zone on (sent through the given zone)
    pub async fn all_on(&self, zone_id: ZoneId) -> Result<()> {
        self.zone_event(zone_id, event::ALL_ON, None, None).await
    }

    /// Turn every zone off (sent through the given zone)
    pub async fn all_off(&self, zone_id: ZoneId) -> Result<()> {
        self.zone_event(zone_id, event::ALL_OFF, None, None).await
    }

    pub async fn select_source(&self, zone_id: ZoneId, source_id: SourceId) -> Result<()> {
        let source = source_id.to_string();
        self.zone_event(zone_id, event::SELECT_SOURCE, Some(&source), None)
            .await
    }

    /// Set the zone volume (0-50, shown as 0-100 on keypads)
    pub async fn set_volume(&self, zone_id: ZoneId, volume: u8) -> Result<()> {
        let volume = volume.to_string();
        self.zone_event(
            zone_id,
            event::KEY_PRESS,
            Some(event::KEY_VOLUME),
            Some(&volume),
        )
        .await
    }

    pub async fn key_press(&self, zone_id: ZoneId, key: &str) -> Result<()> {
        self.zone_event(zone_id, event::KEY_PRESS, Some(key), None)
            .await
    }

    pub async fn key_release(&self, zone_id: ZoneId, key: &str) -> Result<()> {
        self.zone_event(zone_id, event::KEY_RELEASE, Some(key), None)
            .await
    }

    pub async fn key_hold(&self, zone_id: ZoneId, key: &str, hold_ms: u32) -> Result<()> {
        let hold = hold_ms.to_string();
        self.zone_event(zone_id, event::KEY_HOLD, Some(key), Some(&hold))
            .await
    }

    /// Party mode: `ON`, `OFF` or `MASTER`
    pub async fn party_mode(&self, zone_id: ZoneId, mode: &str) -> Result<()> {
        self.zone_event(zone_id, event::PARTY_MODE, Some(mode), None)
            .await
    }

    pub async fn do_not_disturb(&self, zone_id: ZoneId, on: bool) -> Result<()> {
        let state = if on { "ON" } else { "OFF" };
        self.zone_event(zone_id, event::DO_NOT_DISTURB, Some(state), None)
            .await
    }

    // ========== Sources ==========

    /// Read one source variable from the controller
    pub async fn source_variable(&self, source_id: SourceId, variable: &str) -> Result<String> {
        self.get_value(EntityRef::source(source_id), variable).await
    }

    /// Change one source variable
    pub async fn set_source_variable(
        &self,
        source_id: SourceId,
        variable: &str,
        value: impl fmt::Display,
    ) -> Result<()> {
        self.command(Command::set(EntityRef::source(source_id), variable, value))
            .await?;
        Ok(())
    }

    /// Read every source variable and return the refreshed source state
    pub async fn source(&self, source_id: SourceId) -> Result<SourceState> {
        let entity = EntityRef::source(source_id);
        self.command(Command::get_variables(entity, SOURCE_VARIABLES))
            .await?;
        Ok(SourceState {
            source_id,
            variables: self.cached_variables(&entity),
        })
    }

    /// Read the names of all configured sources in one batched GET
    pub async fn source_names(&self) -> Result<Vec<SourceState>> {
        self.command(Command::get_sources(self.config.sources, "name"))
            .await?;
        Ok(self.cached_sources())
    }

    // ========== Watches ==========

    /// Turn change notifications for an item on or off
    ///
    /// Idempotent: no command is sent when the item is already in the
    /// requested state.
    ///
    /// The exchange runs in its own task, so the registry still records the
    /// controller's answer if the caller stops waiting.
    pub async fn set_watch(&self, item: WatchItem, turn_on: bool) -> Result<()> {
        let connection = self.connection();
        let watches = self.watches.clone();

        let task = tokio::spawn(
            async move {
                let mut registry = watches.lock().await;
                registry
                    .set(item, turn_on, |command| async move {
                        connection?.send(command).await
                    })
                    .await
            }
            .instrument(self.span.clone()),
        );

        task.await
            .map_err(|e| RioError::ChannelError(format!("Watch task failed: {}", e)))?
    }

    pub async fn watch_system(&self, turn_on: bool) -> Result<()> {
        self.set_watch(WatchItem::System, turn_on).await
    }

    pub async fn watch_zone(&self, zone_id: ZoneId, turn_on: bool) -> Result<()> {
        self.set_watch(WatchItem::zone(self.config.controller_id, zone_id), turn_on)
            .await
    }

    pub async fn watch_source(&self, source_id: SourceId, turn_on: bool) -> Result<()> {
        self.set_watch(WatchItem::source(source_id), turn_on).await
    }

    /// Watch every configured zone
    ///
    /// Fails on the first rejected watch. Watches that already succeeded
    /// stay on.
    pub async fn watch_all_zones(&self, turn_on: bool) -> Result<()> {
        let controller_id = self.config.controller_id;
        try_join_all(
            (1..=self.config.zones)
                .map(|zone_id| self.set_watch(WatchItem::zone(controller_id, zone_id), turn_on)),
        )
        .await?;
        Ok(())
    }

    /// Watch every configured source
    ///
    /// Fails on the first rejected watch. Watches that already succeeded
    /// stay on.
    pub async fn watch_all_sources(&self, turn_on: bool) -> Result<()> {
        try_join_all(
            (1..=self.config.sources)
                .map(|source_id| self.set_watch(WatchItem::source(source_id), turn_on)),
        )
        .await?;
        Ok(())
    }

    /// Items currently watched
    pub async fn active_watches(&self) -> Vec<WatchItem> {
        self.watches.lock().await.active()
    }

    // ========== Cache ==========

    /// Last known value of any variable, without asking the controller
    pub fn cached(&self, entity: &EntityRef, variable: &str) -> Option<String> {
        dispatch::lock(&self.dispatcher)
            .cache()
            .get(entity, variable)
            .map(str::to_string)
    }

    fn cached_variables(&self, entity: &EntityRef) -> BTreeMap<String, String> {
        dispatch::lock(&self.dispatcher)
            .cache()
            .variables(entity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn cached_zone_variable(&self, zone_id: ZoneId, variable: &str) -> Option<String> {
        self.cached(&self.zone_entity(zone_id), variable)
    }

    pub fn cached_source_variable(&self, source_id: SourceId, variable: &str) -> Option<String> {
        self.cached(&EntityRef::source(source_id), variable)
    }

    /// Cached zones of this controller
    pub fn cached_zones(&self) -> Vec<ZoneState> {
        dispatch::lock(&self.dispatcher)
            .cache()
            .zones(self.config.controller_id)
    }

    /// Cached sources
    pub fn cached_sources(&self) -> Vec<SourceState> {
        dispatch::lock(&self.dispatcher).cache().sources()
    }

    /// Zones after the zone mapping, once zone and source names are known
    pub fn configured_zones(&self) -> Option<Vec<ConfiguredZone>> {
        dispatch::lock(&self.dispatcher)
            .configured_zones()
            .map(<[_]>::to_vec)
    }

    /// Sources after the source mapping, once source names are known
    pub fn configured_sources(&self) -> Option<Vec<ConfiguredSource>> {
        dispatch::lock(&self.dispatcher)
            .configured_sources()
            .map(<[_]>::to_vec)
    }

    /// Controller MAC address, once reported (see [`RioClient::controller_info`])
    pub fn mac_address(&self) -> Option<String> {
        self.cached(&EntityRef::controller(self.config.controller_id), "macaddress")
    }

    /// Firmware version, once reported (see [`RioClient::version`])
    pub fn system_version(&self) -> Option<String> {
        self.cached(&EntityRef::System, "version")
    }
}

/// Puts the link back to `Disconnected` unless the attempt succeeded,
/// including when the `connect` future is dropped mid-way
struct ConnectAttempt<'a> {
    link: &'a Mutex<Link>,
    done: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut link = self
                .link
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *link = Link::Disconnected;
        }
    }
}

impl Drop for RioClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Value assigned to `entity.variable` in a success payload
fn find_value(payload: &str, entity: EntityRef, variable: &str) -> Option<String> {
    let line = ResponseLine {
        status: Status::Success,
        payload: payload.to_string(),
    };
    line.assignments()
        .into_iter()
        .find(|a| a.entity == entity && a.variable.eq_ignore_ascii_case(variable))
        .map(|Assignment { value, .. }| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_value() {
        let payload = "C[1].Z[1].name=\"Living\",C[1].Z[2].name=\"Kitchen\"";
        assert_eq!(
            find_value(payload, EntityRef::zone(1, 2), "Name").as_deref(),
            Some("Kitchen")
        );
        assert_eq!(find_value(payload, EntityRef::zone(1, 3), "name"), None);
        assert_eq!(
            find_value("VERSION=\"01.10.00\"", EntityRef::System, "version").as_deref(),
            Some("01.10.00")
        );
    }

    #[test]
    fn test_new_client_is_disconnected() {
        let client = RioClient::new(ControllerConfig::new("127.0.0.1")).unwrap();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert!(client.cached_zones().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            RioClient::new(ControllerConfig::default()),
            Err(RioError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_command_while_disconnected_fails_fast() {
        let client = RioClient::new(ControllerConfig::new("127.0.0.1")).unwrap();
        assert!(matches!(
            client.command(Command::version()).await,
            Err(RioError::NotConnected)
        ));
        assert!(matches!(
            client.watch_zone(1, true).await,
            Err(RioError::NotConnected)
        ));
        assert!(client.active_watches().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_connect_resets_status() {
        let client = RioClient::new(ControllerConfig::new("127.0.0.1")).unwrap();

        // Park the attempt before it reaches the socket
        let registry = client.watches.lock().await;
        let mut connect = Box::pin(client.connect());
        assert!(futures_util::poll!(connect.as_mut()).is_pending());
        assert_eq!(client.status(), ConnectionStatus::Connecting);

        drop(connect);
        drop(registry);
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }
}
