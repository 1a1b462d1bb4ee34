//! STOMP 1.2 frame type and the text codec.
//!
//! A frame on the wire is `COMMAND\nheader:value\n...\n\nBODY\0`. The codec
//! is pure and stateless: [`encode`] produces `SEND` frames for application
//! payloads, [`decode`] parses one frame, and [`decode_stream`] splits a
//! transport message that may hold several frames and heart-beat EOLs.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::HeartBeat;

/// Frame terminator.
pub const NULL: char = '\0';

/// Content type used for every application body.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Protocol version announced in `CONNECT`.
pub const ACCEPT_VERSION: &str = "1.2";

/// Errors produced while decoding an inbound frame.
///
/// Never surfaced to observers: the connection logs and discards the frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The transport delivered nothing but terminators.
    #[error("empty frame")]
    Empty,

    /// No blank line separates the headers from the body.
    #[error("frame has no blank line between headers and body")]
    MissingBoundary,

    /// The command line is not a STOMP command this client knows.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A header line without a `:` separator, or with an unusable value.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A backslash escape not defined by STOMP 1.2.
    #[error("invalid header escape: {0}")]
    InvalidEscape(String),

    /// The body is not the JSON shape the caller asked for.
    #[error("unparsable body: {0}")]
    Body(#[from] serde_json::Error),
}

/// STOMP commands used by this client, in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client → broker: open a session.
    Connect,
    /// Broker → client: session accepted.
    Connected,
    /// Client → broker: publish to a destination.
    Send,
    /// Client → broker: register interest in a destination.
    Subscribe,
    /// Client → broker: drop a subscription.
    Unsubscribe,
    /// Client → broker: graceful goodbye.
    Disconnect,
    /// Broker → client: delivery for a subscription.
    Message,
    /// Broker → client: acknowledgement of a `receipt` header.
    Receipt,
    /// Broker → client: protocol error, usually followed by a close.
    Error,
}

impl Command {
    /// Returns the command line as written on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// `CONNECT` and `CONNECTED` carry their header values unescaped.
    const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SEND" => Ok(Self::Send),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "DISCONNECT" => Ok(Self::Disconnect),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            other => Err(DecodeError::UnknownCommand(other.to_owned())),
        }
    }
}

/// One STOMP frame: command, ordered headers and a text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order. Lookups return the first occurrence.
    pub headers: Vec<(String, String)>,
    /// Body text without the terminator.
    pub body: String,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    #[must_use]
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first value of the named header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `CONNECT` announcing version 1.2 and the requested heart-beats.
    #[must_use]
    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("heart-beat", heart_beat.to_string())
            .with_header("host", host)
    }

    /// `SUBSCRIBE` for `destination` under subscription `id`.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
    }

    /// `UNSUBSCRIBE` for subscription `id`.
    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    /// `DISCONNECT` without a receipt request.
    #[must_use]
    pub const fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// `SEND` carrying `body` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `body` cannot be serialized.
    pub fn send_json<B: Serialize + ?Sized>(
        destination: &str,
        body: &B,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::send(destination, serde_json::to_string(body)?))
    }

    /// `SEND` carrying an already serialized JSON body.
    #[must_use]
    pub fn send(destination: &str, json: String) -> Self {
        Self {
            command: Command::Send,
            headers: vec![
                ("destination".to_owned(), destination.to_owned()),
                ("content-type".to_owned(), CONTENT_TYPE_JSON.to_owned()),
                ("content-length".to_owned(), json.len().to_string()),
            ],
            body: json,
        }
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Body`] if the body is not valid JSON for `T`.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Serializes the frame to its wire text, terminator included.
    #[must_use]
    pub fn encode(&self) -> String {
        let escaped = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escaped {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NULL);
        out
    }
}

/// Encodes a `SEND` frame for `destination` with a JSON body and optional
/// extra headers appended after the standard ones.
///
/// # Errors
///
/// Returns the `serde_json` error if `body` cannot be serialized.
pub fn encode<B: Serialize + ?Sized>(
    destination: &str,
    body: &B,
    headers: &[(&str, &str)],
) -> Result<String, serde_json::Error> {
    let frame = headers.iter().fold(
        Frame::send_json(destination, body)?,
        |frame, (name, value)| frame.with_header(*name, *value),
    );
    Ok(frame.encode())
}

/// Decodes a single frame.
///
/// Leading EOLs (heart-beats) are skipped and everything from the first
/// terminator on is ignored. A `content-length` header shorter than the
/// body trims it.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the text is empty, has no blank line
/// after the headers, names an unknown command, or has a malformed header.
pub fn decode(raw: &str) -> Result<Frame, DecodeError> {
    let raw = raw.trim_start_matches(['\r', '\n']);
    let frame = raw.split(NULL).next().unwrap_or_default();
    if frame.is_empty() {
        return Err(DecodeError::Empty);
    }

    let (head, body) = split_head(frame).ok_or(DecodeError::MissingBoundary)?;
    let mut lines = head.lines();
    let command: Command = lines.next().unwrap_or_default().trim_end().parse()?;

    let mut headers = Vec::new();
    for line in lines.map(|line| line.trim_end_matches('\r')) {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| DecodeError::MalformedHeader(line.to_owned()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_owned(), value.to_owned()));
        }
    }

    let mut frame = Frame {
        command,
        headers,
        body: String::new(),
    };
    let body = frame
        .header("content-length")
        .and_then(|len| len.trim().parse::<usize>().ok())
        .and_then(|len| body.get(..len))
        .unwrap_or(body);
    frame.body = body.to_owned();
    Ok(frame)
}

/// One unit found in a transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A bare EOL sent to keep the session alive.
    HeartBeat,
    /// A complete frame.
    Frame(Frame),
}

/// Splits a transport message into heart-beats and frames, decoding each.
///
/// Brokers normally send one frame per WebSocket message, but STOMP allows
/// several, and heart-beats arrive as lone `\n` (or `\r\n`) messages.
#[must_use]
pub fn decode_stream(raw: &str) -> Vec<Result<Inbound, DecodeError>> {
    raw.split(NULL)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            if chunk.trim_matches(['\r', '\n']).is_empty() {
                Ok(Inbound::HeartBeat)
            } else {
                decode(chunk).map(Inbound::Frame)
            }
        })
        .collect()
}

/// Splits at the first blank line, accepting LF or CRLF line endings.
fn split_head(frame: &str) -> Option<(&str, &str)> {
    let lf = frame.find("\n\n").map(|at| (at, 2));
    let crlf = frame.find("\r\n\r\n").map(|at| (at, 4));
    let (at, width) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (a, b) => a.or(b)?,
    };
    Some((frame.get(..at)?, frame.get(at + width..)?))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => return Err(DecodeError::InvalidEscape(format!("\\{other}"))),
            None => return Err(DecodeError::InvalidEscape("\\".to_owned())),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_frame_matches_wire_layout() {
        let Ok(raw) = encode("/app/score", &json!({"message": "WORD=GATO;TIME=12"}), &[]) else {
            panic!("encoding failed");
        };
        assert_eq!(
            raw,
            "SEND\ndestination:/app/score\ncontent-type:application/json\ncontent-length:31\n\n{\"message\":\"WORD=GATO;TIME=12\"}\u{0}"
        );
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let Ok(frame) = Frame::send_json("/app/score", &json!({"message": "AÑO"})) else {
            panic!("encoding failed");
        };
        assert_eq!(frame.header("content-length"), Some("18"));
        assert_eq!(frame.body.len(), 18);
    }

    #[test]
    fn extra_headers_follow_standard_ones() {
        let Ok(raw) = encode("/app/score", &json!({}), &[("receipt", "r-1")]) else {
            panic!("encoding failed");
        };
        assert!(raw.contains("content-length:2\nreceipt:r-1\n\n{}"));
    }

    #[test]
    fn decode_message_frame() {
        let raw = "MESSAGE\nsubscription:sub-1\ndestination:/list/score\n\n{\"message\":\"WORD=SOL;TIME=5\"}\u{0}";
        let Ok(frame) = decode(raw) else {
            panic!("expected a frame");
        };
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-1"));
        assert_eq!(frame.header("destination"), Some("/list/score"));
        let Ok(body) = frame.json_body::<serde_json::Value>() else {
            panic!("expected JSON body");
        };
        assert_eq!(body, json!({"message": "WORD=SOL;TIME=5"}));
    }

    #[test]
    fn decode_reverses_encode() {
        let body = json!({"message": "WORD=GATO;TIME=12", "score": 40, "name": "Ana"});
        let Ok(raw) = encode("/app/score", &body, &[]) else {
            panic!("encoding failed");
        };
        let Ok(frame) = decode(&raw) else {
            panic!("decoding failed");
        };
        let Ok(decoded) = frame.json_body::<serde_json::Value>() else {
            panic!("body did not parse");
        };
        assert_eq!(decoded, body);
    }

    #[test]
    fn missing_boundary_is_an_error() {
        let result = decode("MESSAGE\nsubscription:sub-1\u{0}");
        assert!(matches!(result, Err(DecodeError::MissingBoundary)));
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(matches!(
            decode("HELLO\n\n\u{0}"),
            Err(DecodeError::UnknownCommand(cmd)) if cmd == "HELLO"
        ));
    }

    #[test]
    fn connected_with_crlf_and_leading_heartbeat() {
        let raw = "\r\nCONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\u{0}";
        let Ok(frame) = decode(raw) else {
            panic!("expected CONNECTED");
        };
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("heart-beat"), Some("0,0"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn first_repeated_header_wins() {
        let Ok(frame) = decode("MESSAGE\ndestination:/a\ndestination:/b\n\n\u{0}") else {
            panic!("expected a frame");
        };
        assert_eq!(frame.header("destination"), Some("/a"));
    }

    #[test]
    fn header_values_are_escaped_outside_connect() {
        let frame = Frame::subscribe("sub-1", "/topic/a:b");
        assert!(frame.encode().contains("destination:/topic/a\\cb\n"));
        let Ok(back) = decode(&frame.encode()) else {
            panic!("decoding failed");
        };
        assert_eq!(back.header("destination"), Some("/topic/a:b"));
    }

    #[test]
    fn invalid_escape_is_rejected() {
        assert!(matches!(
            decode("MESSAGE\ndestination:/a\\t\n\n\u{0}"),
            Err(DecodeError::InvalidEscape(_))
        ));
    }

    #[test]
    fn content_length_trims_body() {
        let Ok(frame) = decode("MESSAGE\ncontent-length:2\n\n{}trailing\u{0}") else {
            panic!("expected a frame");
        };
        assert_eq!(frame.body, "{}");
    }

    #[test]
    fn stream_separates_heartbeats_and_frames() {
        let raw = "\nRECEIPT\nreceipt-id:1\n\n\u{0}MESSAGE\nsubscription:sub-2\n\n{}\u{0}";
        let units = decode_stream(raw);
        assert_eq!(units.len(), 2);
        let mut commands = units.into_iter().filter_map(|unit| match unit {
            Ok(Inbound::Frame(frame)) => Some(frame.command),
            _ => None,
        });
        assert_eq!(commands.next(), Some(Command::Receipt));
        assert_eq!(commands.next(), Some(Command::Message));
    }

    #[test]
    fn lone_eol_is_a_heartbeat() {
        let units = decode_stream("\n");
        assert!(matches!(units.as_slice(), [Ok(Inbound::HeartBeat)]));
    }

    #[test]
    fn connect_frame_declares_version_and_heartbeat() {
        let raw = Frame::connect("localhost", HeartBeat::from_millis(10_000, 10_000)).encode();
        assert!(raw.starts_with("CONNECT\naccept-version:1.2\nheart-beat:10000,10000\n"));
        assert!(raw.ends_with("\n\n\u{0}"));
    }
}
