//! RIO command encoding.
//!
//! Commands are single text lines terminated by CR:
//!
//! ```text
//! VERSION
//! GET C[1].Z[2].volume
//! GET C[1].Z[1].name, C[1].Z[2].name
//! SET C[1].Z[2].bass="10"
//! EVENT C[1].Z[2]!KeyPress Volume 20
//! WATCH C[1].Z[2] ON
//! ```
//!
//! Variable names are lowercased; ids are not validated here, the
//! controller answers out-of-range ids with an `E` line.

use crate::types::{ControllerId, EntityRef, SourceId, WatchItem, ZoneId};
use std::fmt;

/// Default RIO TCP port
pub const DEFAULT_PORT: u16 = 9621;

/// Command terminator written after every command
pub const COMMAND_TERMINATOR: &str = "\r";

/// Variables readable on every zone
pub const ZONE_VARIABLES: &[&str] = &[
    "name",
    "currentSource",
    "volume",
    "bass",
    "treble",
    "balance",
    "loudness",
    "turnOnVolume",
    "doNotDisturb",
    "partyMode",
    "status",
    "mute",
    "sharedSource",
    "lastError",
];

/// Variables readable on every source
pub const SOURCE_VARIABLES: &[&str] = &[
    "name",
    "type",
    "composerName",
    "channel",
    "coverArtURL",
    "channelName",
    "genre",
    "artistName",
    "albumName",
    "playlistName",
    "songName",
    "programServiceName",
    "radioText",
    "radioText2",
    "radioText3",
    "radioText4",
    "shuffleMode",
    "mode",
];

/// Variables readable on every controller
pub const CONTROLLER_VARIABLES: &[&str] = &["ipAddress", "macAddress"];

/// Zone event names for `EVENT C[n].Z[m]!<event>`
pub mod event {
    pub const ZONE_ON: &str = "ZoneOn";
    pub const ZONE_OFF: &str = "ZoneOff";
    pub const ALL_ON: &str = "AllOn";
    pub const ALL_OFF: &str = "AllOff";
    pub const SELECT_SOURCE: &str = "SelectSource";
    pub const KEY_PRESS: &str = "KeyPress";
    pub const KEY_RELEASE: &str = "KeyRelease";
    pub const KEY_HOLD: &str = "KeyHold";
    pub const PARTY_MODE: &str = "PartyMode";
    pub const DO_NOT_DISTURB: &str = "DoNotDisturb";

    /// Key code carrying an absolute volume as event data
    pub const KEY_VOLUME: &str = "Volume";
    pub const KEY_VOLUME_UP: &str = "VolumeUp";
    pub const KEY_VOLUME_DOWN: &str = "VolumeDown";
}

/// Command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Version,
    Get,
    Set,
    Event,
    Watch,
    /// Anything sent through [`Command::raw`] with another leading word
    Raw,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Version => "VERSION",
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Event => "EVENT",
            Self::Watch => "WATCH",
            Self::Raw => "",
        }
    }
}

/// A fully encoded RIO command line (without terminator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Verb,
    text: String,
}

impl Command {
    fn with_body(verb: Verb, body: impl AsRef<str>) -> Self {
        Self {
            verb,
            text: format!("{} {}", verb.as_str(), body.as_ref()),
        }
    }

    /// `VERSION`
    pub fn version() -> Self {
        Self {
            verb: Verb::Version,
            text: Verb::Version.as_str().to_string(),
        }
    }

    /// `GET System.status`
    pub fn system_status() -> Self {
        Self::get(EntityRef::System, "status")
    }

    /// `GET <target>.<variable>`
    pub fn get(target: EntityRef, variable: &str) -> Self {
        Self::with_body(Verb::Get, variable_expr(target, variable))
    }

    /// One GET for the same variable across several targets, joined by `", "`
    pub fn get_many<I>(targets: I, variable: &str) -> Self
    where
        I: IntoIterator<Item = EntityRef>,
    {
        let exprs: Vec<String> = targets
            .into_iter()
            .map(|target| variable_expr(target, variable))
            .collect();
        Self::with_body(Verb::Get, exprs.join(", "))
    }

    /// One GET for several variables of the same target, joined by `","`
    pub fn get_variables(target: EntityRef, variables: &[&str]) -> Self {
        let exprs: Vec<String> = variables
            .iter()
            .map(|variable| variable_expr(target, variable))
            .collect();
        Self::with_body(Verb::Get, exprs.join(","))
    }

    /// Batch GET of one variable on zones `1..=count` of a controller
    pub fn get_zones(controller_id: ControllerId, count: u32, variable: &str) -> Self {
        Self::get_many(
            (1..=count).map(|zone_id| EntityRef::zone(controller_id, zone_id)),
            variable,
        )
    }

    /// Batch GET of one variable on sources `1..=count`
    pub fn get_sources(count: u32, variable: &str) -> Self {
        Self::get_many((1..=count).map(EntityRef::source), variable)
    }

    /// `SET <target>.<variable>="<value>"`; the value is always quoted
    pub fn set(target: EntityRef, variable: &str, value: impl fmt::Display) -> Self {
        Self::with_body(
            Verb::Set,
            format!("{}=\"{}\"", variable_expr(target, variable), value),
        )
    }

    /// `EVENT C[n].Z[m]!<event>[ <data1>][ <data2>]`
    pub fn event(
        controller_id: ControllerId,
        zone_id: ZoneId,
        event: &str,
        data1: Option<&str>,
        data2: Option<&str>,
    ) -> Self {
        let mut body = format!("{}!{}", EntityRef::zone(controller_id, zone_id), event);
        for data in [data1, data2].into_iter().flatten() {
            if !data.is_empty() {
                body.push(' ');
                body.push_str(data);
            }
        }
        Self::with_body(Verb::Event, body)
    }

    /// `WATCH <target> ON|OFF`
    pub fn watch(item: WatchItem, turn_on: bool) -> Self {
        Self::with_body(
            Verb::Watch,
            format!("{} {}", item.entity(), if turn_on { "ON" } else { "OFF" }),
        )
    }

    /// A caller-supplied command line, sent verbatim
    pub fn raw(text: impl Into<String>) -> Self {
        let text = text.into();
        let verb = match text.split_whitespace().next() {
            Some("GET") => Verb::Get,
            Some("SET") => Verb::Set,
            Some("EVENT") => Verb::Event,
            Some("WATCH") => Verb::Watch,
            Some("VERSION") => Verb::Version,
            _ => Verb::Raw,
        };
        Self { verb, text }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Bytes written to the socket, CR terminated
    pub fn to_wire(&self) -> String {
        format!("{}{}", self.text, COMMAND_TERMINATOR)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `<target>.<variable-lowercased>`
pub fn variable_expr(target: EntityRef, variable: &str) -> String {
    format!("{}.{}", target, variable.to_lowercase())
}

/// Target expression for a zone, `C[n].Z[m]`
pub fn zone_target(controller_id: ControllerId, zone_id: ZoneId) -> String {
    EntityRef::zone(controller_id, zone_id).to_string()
}

/// Target expression for a source, `S[n]`
pub fn source_target(source_id: SourceId) -> String {
    EntityRef::source(source_id).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_expressions() {
        assert_eq!(zone_target(1, 2), "C[1].Z[2]");
        assert_eq!(source_target(3), "S[3]");
        assert_eq!(EntityRef::controller(2).to_string(), "C[2]");
    }

    #[test]
    fn test_get_lowercases_variable() {
        let cmd = Command::get(EntityRef::zone(1, 2), "currentSource");
        assert_eq!(cmd.as_str(), "GET C[1].Z[2].currentsource");
        assert_eq!(cmd.verb(), Verb::Get);
        assert_eq!(Command::system_status().as_str(), "GET System.status");
        assert_eq!(Command::version().as_str(), "VERSION");
    }

    #[test]
    fn test_set_always_quotes_value() {
        assert_eq!(
            Command::set(EntityRef::zone(1, 4), "Bass", 10).as_str(),
            "SET C[1].Z[4].bass=\"10\""
        );
        assert_eq!(
            Command::set(EntityRef::source(2), "name", "Tuner").as_str(),
            "SET S[2].name=\"Tuner\""
        );
    }

    #[test]
    fn test_batch_get() {
        assert_eq!(
            Command::get_zones(1, 3, "name").as_str(),
            "GET C[1].Z[1].name, C[1].Z[2].name, C[1].Z[3].name"
        );
        assert_eq!(
            Command::get_sources(2, "name").as_str(),
            "GET S[1].name, S[2].name"
        );
        assert_eq!(
            Command::get_variables(EntityRef::controller(1), CONTROLLER_VARIABLES).as_str(),
            "GET C[1].ipaddress,C[1].macaddress"
        );
    }

    #[test]
    fn test_event_optional_data() {
        assert_eq!(
            Command::event(1, 2, event::ZONE_ON, None, None).as_str(),
            "EVENT C[1].Z[2]!ZoneOn"
        );
        assert_eq!(
            Command::event(1, 2, event::KEY_PRESS, Some("Volume"), Some("20")).as_str(),
            "EVENT C[1].Z[2]!KeyPress Volume 20"
        );
        assert_eq!(
            Command::event(1, 2, event::SELECT_SOURCE, Some("3"), None).as_str(),
            "EVENT C[1].Z[2]!SelectSource 3"
        );
    }

    #[test]
    fn test_watch_commands() {
        assert_eq!(Command::watch(WatchItem::System, true).as_str(), "WATCH System ON");
        assert_eq!(
            Command::watch(WatchItem::zone(1, 5), false).as_str(),
            "WATCH C[1].Z[5] OFF"
        );
        assert_eq!(
            Command::watch(WatchItem::source(2), true).as_str(),
            "WATCH S[2] ON"
        );
    }

    #[test]
    fn test_wire_is_cr_terminated() {
        assert_eq!(Command::version().to_wire(), "VERSION\r");
    }
}
