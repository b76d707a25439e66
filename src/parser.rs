//! RIO response framing and decoding.
//!
//! The controller answers every command with one CRLF-terminated line:
//!
//! ```text
//! S C[1].Z[2].volume="35"
//! S C[1].Z[1].name="Living",C[1].Z[2].name="Kitchen"
//! E Invalid command
//! N C[1].Z[2].volume="36"
//! ```
//!
//! The first character is the status code, the payload starts after a fixed
//! two-character prefix. A payload may carry several comma-separated
//! assignments (the answer to a batched GET).

use crate::error::{Result, RioError};
use crate::types::EntityRef;

/// Line status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `S`
    Success,
    /// `E`
    Error,
    /// `N`
    Notification,
}

impl Status {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'S' => Some(Self::Success),
            'E' => Some(Self::Error),
            'N' => Some(Self::Notification),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            Self::Success => 'S',
            Self::Error => 'E',
            Self::Notification => 'N',
        }
    }
}

/// Longest unterminated tail kept while waiting for the rest of a line
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Reassembles complete lines out of arbitrarily chunked socket reads.
///
/// Bytes after the last terminator are held back until the rest of the
/// line arrives. A tail longer than [`MAX_LINE_LENGTH`] is dropped, along
/// with the rest of that line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Inside an oversized line; skip input up to the next terminator
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, terminators removed.
    /// Blank lines are skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        // The held-back tail never contains a terminator
        let mut start = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=start + offset).collect();
            start = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            let line = String::from_utf8_lossy(&raw)
                .trim_end_matches(|c| c == '\r' || c == '\n')
                .to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }

        if self.pending.len() > MAX_LINE_LENGTH {
            tracing::warn!(
                "Dropping {} bytes of unterminated input",
                self.pending.len()
            );
            self.pending.clear();
            self.discarding = true;
        }
        lines
    }

    /// Bytes of an incomplete trailing line
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

/// One decoded response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub status: Status,
    pub payload: String,
}

impl ResponseLine {
    /// Decode a line without its terminator.
    ///
    /// Returns `None` for an empty line or an unknown status code.
    pub fn parse(line: &str) -> Option<Self> {
        let status = Status::from_code(line.chars().next()?)?;
        let payload = line.get(2..).unwrap_or("").to_string();
        Some(Self { status, payload })
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Turn the line into a command outcome: error lines become
    /// [`RioError::Protocol`], anything else yields the payload.
    pub fn into_result(self) -> Result<String> {
        match self.status {
            Status::Error => Err(RioError::Protocol {
                detail: self.payload,
            }),
            _ => Ok(self.payload),
        }
    }

    /// Every variable assignment carried by this line.
    ///
    /// Error lines and empty payloads carry none. Segments that fit no
    /// known grammar come back as system-scoped `key=value` pairs.
    pub fn assignments(&self) -> Vec<Assignment> {
        if self.is_error() {
            return Vec::new();
        }

        split_segments(&self.payload)
            .into_iter()
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                parse_assignment(segment).unwrap_or_else(|| {
                    tracing::debug!("Unmatched response segment: {}", segment);
                    fallback_assignment(segment)
                })
            })
            .collect()
    }
}

/// A variable value reported by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub entity: EntityRef,
    /// Variable name exactly as it appeared on the wire
    pub variable: String,
    pub value: String,
}

impl Assignment {
    pub fn new(entity: EntityRef, variable: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            entity,
            variable: variable.into(),
            value: value.into(),
        }
    }
}

/// Split a payload on commas that are not inside a quoted value
fn split_segments(payload: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in payload.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                segments.push(&payload[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&payload[start..]);
    segments
}

/// Parse a bracketed id such as `[12]`, returning the id and the remainder
fn bracketed_id(s: &str) -> Option<(u32, &str)> {
    let s = s.strip_prefix('[')?;
    let end = s.find(']')?;
    let id = s[..end].parse().ok()?;
    Some((id, &s[end + 1..]))
}

/// Parse a target expression prefix (`S[n]`, `C[n]`, `C[n].Z[m]`, `System`)
fn parse_target(s: &str) -> Option<(EntityRef, &str)> {
    if let Some(rest) = s.strip_prefix('S') {
        if rest.starts_with('[') {
            let (source_id, rest) = bracketed_id(rest)?;
            return Some((EntityRef::source(source_id), rest));
        }
    }

    if let Some(rest) = s.strip_prefix('C') {
        let (controller_id, rest) = bracketed_id(rest)?;
        if let Some(zone) = rest.strip_prefix(".Z") {
            let (zone_id, rest) = bracketed_id(zone)?;
            return Some((EntityRef::zone(controller_id, zone_id), rest));
        }
        return Some((EntityRef::controller(controller_id), rest));
    }

    if s.get(..6).is_some_and(|head| head.eq_ignore_ascii_case("System")) {
        return Some((EntityRef::System, &s[6..]));
    }

    None
}

fn is_variable_name(s: &str) -> bool {
    !s.is_empty() && !s.contains(|c: char| c.is_whitespace() || c == '"')
}

/// Decode a `<target>.<variable>` expression, as written by a GET command
pub fn parse_variable_expr(expr: &str) -> Option<(EntityRef, String)> {
    let (entity, rest) = parse_target(expr.trim())?;
    let variable = rest.strip_prefix('.')?;
    is_variable_name(variable).then(|| (entity, variable.to_string()))
}

/// Match a segment against the assignment grammar:
///
/// - `S[n].<variable>="<value>"`
/// - `C[n].Z[m].<variable>="<value>"`
/// - `C[n].<variable>="<value>"`
/// - `System.<variable>="<value>"` or a bare `<variable>="<value>"`
pub fn parse_assignment(segment: &str) -> Option<Assignment> {
    let segment = segment.trim();
    let (name, raw_value) = match parse_target(segment) {
        Some((entity, rest)) => {
            let (variable, raw_value) = rest.strip_prefix('.')?.split_once('=')?;
            ((entity, variable), raw_value)
        }
        None => {
            let (variable, raw_value) = segment.split_once('=')?;
            ((EntityRef::System, variable), raw_value)
        }
    };

    let (entity, variable) = name;
    if !is_variable_name(variable) {
        return None;
    }
    let value = unquote(raw_value)?;
    Some(Assignment::new(entity, variable, value))
}

/// Best-effort decode of an unmatched segment as a system `key=value` pair,
/// split on the first `=` only
pub fn fallback_assignment(segment: &str) -> Assignment {
    match segment.split_once('=') {
        Some((key, value)) => {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Assignment::new(EntityRef::System, key.trim(), value)
        }
        None => Assignment::new(EntityRef::System, segment.trim(), ""),
    }
}

/// Strip the surrounding quotes of a wire value and undo `\"` / `\\` escapes
fn unquote(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('"')?.strip_suffix('"')?;

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => value.push(next),
                None => value.push(c),
            }
        } else {
            value.push(c);
        }
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn single(line: &str) -> Vec<Assignment> {
        ResponseLine::parse(line).unwrap().assignments()
    }

    #[test]
    fn test_zone_assignment() {
        let mut buf = LineBuffer::new();
        let lines = buf.feed(b"S C[1].Z[2].volume=\"35\"\r\n");
        assert_eq!(lines.len(), 1);

        let assignments = single(&lines[0]);
        assert_eq!(
            assignments,
            vec![Assignment::new(EntityRef::zone(1, 2), "volume", "35")]
        );
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.feed(b"S C[1].Z[2].vol").is_empty());
        assert_eq!(buf.pending(), b"S C[1].Z[2].vol");

        let lines = buf.feed(b"ume=\"35\"\r\n");
        assert_eq!(lines, vec!["S C[1].Z[2].volume=\"35\"".to_string()]);
        assert!(buf.pending().is_empty());
        assert_eq!(
            single(&lines[0]),
            vec![Assignment::new(EntityRef::zone(1, 2), "volume", "35")]
        );
    }

    #[test]
    fn test_terminator_split_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.feed(b"S VERSION=\"1.10\"\r").is_empty());
        assert_eq!(buf.feed(b"\nS\r\n"), vec!["S VERSION=\"1.10\"", "S"]);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut buf = LineBuffer::new();
        let lines = buf.feed(b"S\r\nN S[3].name=\"Tuner\"\r\nE Bad");
        assert_eq!(lines, vec!["S", "N S[3].name=\"Tuner\""]);
        assert_eq!(buf.pending(), b"E Bad");
    }

    #[test]
    fn test_oversized_line_is_dropped() {
        let mut buf = LineBuffer::new();
        let junk = vec![b'x'; 1024];
        for _ in 0..=MAX_LINE_LENGTH / junk.len() {
            assert!(buf.feed(&junk).is_empty());
        }
        assert!(buf.pending().len() <= MAX_LINE_LENGTH);

        // The rest of the oversized line goes too; the next line survives
        let lines = buf.feed(b"xxxx\r\nS System.status=\"ON\"\r\n");
        assert_eq!(lines, vec!["S System.status=\"ON\""]);
        assert!(buf.pending().is_empty());
    }

    #[test]
    fn test_batched_get_response() {
        let assignments =
            single("S C[1].Z[1].name=\"Living\",C[1].Z[2].name=\"Kitchen\"");
        assert_eq!(
            assignments,
            vec![
                Assignment::new(EntityRef::zone(1, 1), "name", "Living"),
                Assignment::new(EntityRef::zone(1, 2), "name", "Kitchen"),
            ]
        );

        let spaced = single("S S[1].name=\"Tuner\", S[2].name=\"N/A\",");
        assert_eq!(spaced.len(), 2);
        assert_eq!(spaced[1], Assignment::new(EntityRef::source(2), "name", "N/A"));
    }

    #[test]
    fn test_comma_inside_value_is_kept() {
        let assignments = single("S S[1].songName=\"Hello, World\",S[1].artistName=\"A\"");
        assert_eq!(assignments[0].value, "Hello, World");
        assert_eq!(assignments[1].variable, "artistName");
    }

    #[test]
    fn test_escaped_quotes() {
        let assignments = single(r#"N S[2].songName="Say \"Hi\"""#);
        assert_eq!(assignments[0].value, "Say \"Hi\"");
    }

    #[test]
    fn test_controller_and_system_scopes() {
        assert_eq!(
            single("S C[1].macAddress=\"00:11:22\""),
            vec![Assignment::new(EntityRef::controller(1), "macAddress", "00:11:22")]
        );
        assert_eq!(
            single("S System.status=\"ON\""),
            vec![Assignment::new(EntityRef::System, "status", "ON")]
        );
        assert_eq!(
            single("S VERSION=\"01.10.00\""),
            vec![Assignment::new(EntityRef::System, "VERSION", "01.10.00")]
        );
    }

    #[test]
    fn test_unmatched_payload_falls_back_to_system() {
        assert_eq!(
            single("S foo bar=baz=1"),
            vec![Assignment::new(EntityRef::System, "foo bar", "baz=1")]
        );
        assert_eq!(
            single("S C[1].Z[x].volume=\"3\""),
            vec![Assignment::new(EntityRef::System, "C[1].Z[x].volume", "3")]
        );
        assert_eq!(
            single("S 01.10.00"),
            vec![Assignment::new(EntityRef::System, "01.10.00", "")]
        );
    }

    #[test]
    fn test_error_line_is_never_matched() {
        let line = ResponseLine::parse("E C[1].Z[9].volume=\"1\"").unwrap();
        assert!(line.is_error());
        assert!(line.assignments().is_empty());

        let line = ResponseLine::parse("E Invalid command").unwrap();
        match line.into_result() {
            Err(RioError::Protocol { detail }) => assert_eq!(detail, "Invalid command"),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_payload_has_no_assignments() {
        let line = ResponseLine::parse("S").unwrap();
        assert_eq!(line.status, Status::Success);
        assert_eq!(line.payload, "");
        assert!(line.assignments().is_empty());
        assert_eq!(line.into_result().unwrap(), "");
    }

    #[test]
    fn test_unknown_status_code() {
        assert!(ResponseLine::parse("X C[1].Z[1].name=\"A\"").is_none());
        assert!(ResponseLine::parse("").is_none());
    }

    #[test]
    fn test_get_expression_round_trip() {
        for controller_id in 1..=3 {
            for zone_id in [1, 2, 8, 31] {
                for variable in ["volume", "currentSource", "name"] {
                    let entity = EntityRef::zone(controller_id, zone_id);
                    let cmd = Command::get(entity, variable);
                    let expr = cmd.as_str().strip_prefix("GET ").unwrap();
                    assert_eq!(
                        parse_variable_expr(expr),
                        Some((entity, variable.to_lowercase()))
                    );
                }
            }
        }

        let cmd = Command::get(EntityRef::source(4), "songName");
        let expr = cmd.as_str().strip_prefix("GET ").unwrap();
        assert_eq!(
            parse_variable_expr(expr),
            Some((EntityRef::source(4), "songname".to_string()))
        );
    }
}
