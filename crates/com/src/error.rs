use std::fmt;

#[derive(Debug)]
pub enum ComError {
    Io(std::io::Error),
    WebSocket(tokio_websockets::Error),
    Json(serde_json::Error),
    /// The peer sent something the Socket.IO protocol does not allow.
    Protocol(String),
    /// Connect, handshake or heartbeat took too long.
    Timeout(&'static str),
    ConnectionClosed,
    MessageTooLarge(usize),
}

impl fmt::Display for ComError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComError::Io(err) => write!(f, "io error: {err}"),
            ComError::WebSocket(err) => write!(f, "websocket error: {err}"),
            ComError::Json(err) => write!(f, "json error: {err}"),
            ComError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ComError::Timeout(what) => write!(f, "{what} timed out"),
            ComError::ConnectionClosed => write!(f, "connection closed"),
            ComError::MessageTooLarge(len) => write!(f, "message too large: {len} bytes"),
        }
    }
}

impl std::error::Error for ComError {}

impl From<std::io::Error> for ComError {
    fn from(err: std::io::Error) -> Self {
        ComError::Io(err)
    }
}

impl From<tokio_websockets::Error> for ComError {
    fn from(err: tokio_websockets::Error) -> Self {
        ComError::WebSocket(err)
    }
}

impl From<serde_json::Error> for ComError {
    fn from(err: serde_json::Error) -> Self {
        ComError::Json(err)
    }
}

impl From<image::ImageError> for ComError {
    fn from(err: image::ImageError) -> Self {
        ComError::Protocol(err.to_string())
    }
}
