//! Engine.IO v4 / Socket.IO v5 packets over the WebSocket transport.
//!
//! Only the default namespace is used. Text frames carry one packet each;
//! binary attachments of a binary event follow as raw binary frames.

use {
    crate::ComError,
    serde::Deserialize,
    serde_json::{Value, json},
    std::time::Duration,
};

pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16 MB

/// Most binary attachments a single event may announce.
pub const MAX_ATTACHMENTS: usize = 16;

/// Query string selecting Engine.IO v4 over a plain WebSocket.
pub const TRANSPORT_QUERY: &str = "EIO=4&transport=websocket";

/// The open packet the server sends first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// milliseconds
    pub ping_interval: u64,
    /// milliseconds
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

impl Handshake {
    pub fn new(sid: impl Into<String>, ping_interval: Duration, ping_timeout: Duration) -> Self {
        Self {
            sid: sid.into(),
            upgrades: Vec::new(),
            ping_interval: ping_interval.as_millis() as u64,
            ping_timeout: ping_timeout.as_millis() as u64,
            max_payload: MAX_MESSAGE_SIZE as u64,
        }
    }

    /// How long the client waits for a ping before calling the connection dead.
    pub fn ping_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }

    fn to_json(&self) -> Value {
        json!({
            "sid": self.sid,
            "upgrades": self.upgrades,
            "pingInterval": self.ping_interval,
            "pingTimeout": self.ping_timeout,
            "maxPayload": self.max_payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Connect(Option<Value>),
    Disconnect,
    /// `attachments` binary frames follow a binary event.
    Event {
        name: String,
        data: Value,
        attachments: usize,
    },
    ConnectError(Value),
    /// Upgrade, noop and acknowledgement packets; never needed here.
    Noop,
}

impl Packet {
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Packet::Event {
            name: name.into(),
            data,
            attachments: 0,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ComError> {
        let (kind, rest) = split_first(text)?;
        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            // "2probe" only appears during transport upgrades
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => parse_socket_packet(rest),
            '5' | '6' => Ok(Packet::Noop),
            other => Err(ComError::Protocol(format!(
                "unknown engine.io packet type {other:?}"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!("0{}", handshake.to_json()),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Connect(None) => "40".to_string(),
            Packet::Connect(Some(data)) => format!("40{data}"),
            Packet::Disconnect => "41".to_string(),
            Packet::Event {
                name,
                data,
                attachments: 0,
            } => format!("42{}", json!([name, data])),
            Packet::Event {
                name,
                data,
                attachments,
            } => format!("45{attachments}-{}", json!([name, data])),
            Packet::ConnectError(data) => format!("44{data}"),
            Packet::Noop => "6".to_string(),
        }
    }
}

fn split_first(text: &str) -> Result<(char, &str), ComError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ComError::Protocol("empty packet".to_string()))?;
    Ok((kind, chars.as_str()))
}

fn parse_socket_packet(text: &str) -> Result<Packet, ComError> {
    let (kind, mut rest) = split_first(text)?;

    let mut attachments = 0;
    if kind == '5' || kind == '6' {
        let (count, tail) = rest
            .split_once('-')
            .ok_or_else(|| ComError::Protocol("binary packet without attachment count".to_string()))?;
        attachments = count
            .parse()
            .map_err(|_| ComError::Protocol(format!("bad attachment count {count:?}")))?;
        if attachments > MAX_ATTACHMENTS {
            return Err(ComError::Protocol(format!("too many attachments ({attachments})")));
        }
        rest = tail;
    }

    // namespace ("/admin,") and ack id are ignored
    if rest.starts_with('/') {
        rest = rest.split_once(',').map(|(_, tail)| tail).unwrap_or("");
    }
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' if rest.is_empty() => Ok(Packet::Connect(None)),
        '0' => Ok(Packet::Connect(Some(serde_json::from_str(rest)?))),
        '1' => Ok(Packet::Disconnect),
        '2' | '5' => {
            let Value::Array(items) = serde_json::from_str(rest)? else {
                return Err(ComError::Protocol("event payload is not an array".to_string()));
            };
            let mut items = items.into_iter();
            let Some(Value::String(name)) = items.next() else {
                return Err(ComError::Protocol("event without a name".to_string()));
            };
            Ok(Packet::Event {
                name,
                data: items.next().unwrap_or(Value::Null),
                attachments,
            })
        }
        '3' | '6' => Ok(Packet::Noop),
        '4' if rest.is_empty() => Ok(Packet::ConnectError(Value::Null)),
        '4' => Ok(Packet::ConnectError(serde_json::from_str(rest)?)),
        other => Err(ComError::Protocol(format!(
            "unknown socket.io packet type {other:?}"
        ))),
    }
}

/// Stand-in for binary attachment `num` inside an event payload.
pub fn placeholder(num: usize) -> Value {
    json!({ "_placeholder": true, "num": num })
}

/// The attachment index if `value` is a placeholder.
pub fn placeholder_index(value: &Value) -> Option<usize> {
    let object = value.as_object()?;
    if !object.get("_placeholder")?.as_bool()? {
        return None;
    }
    object.get("num")?.as_u64().map(|num| num as usize)
}
