//! Text framing for outbound payloads.

use axum::extract::ws::Message;
use serde::Serialize;

use super::Connection;
use crate::error::WsError;

/// Anything that can write one text frame.
pub trait SocketSend {
    /// Writes `text` as a single text frame.
    ///
    /// # Errors
    ///
    /// Returns the transport's write error.
    fn send_text(&self, text: String) -> Result<(), WsError>;
}

impl SocketSend for Connection {
    fn send_text(&self, text: String) -> Result<(), WsError> {
        self.send_message(Message::text(text))
    }
}

/// Outbound payload: plain text, or a structured value sent as JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Sent unchanged.
    Text(String),
    /// Encoded to its canonical JSON text.
    Json(serde_json::Value),
}

impl Payload {
    /// Builds a structured payload from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Encode`] if `value` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, WsError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Returns the text that goes on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Encode`] if a structured value fails to encode.
    pub fn into_text(self) -> Result<String, WsError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Json(value) => Ok(serde_json::to_string(&value)?),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Sends `payload` on `socket` as one text frame.
///
/// Callers check readiness first; sending on a socket that is not open
/// surfaces the transport's error.
///
/// # Errors
///
/// Returns [`WsError::Encode`] if a structured payload fails to encode, or
/// the error returned by [`SocketSend::send_text`].
pub fn socket_send<S>(socket: &S, payload: impl Into<Payload>) -> Result<(), WsError>
where
    S: SocketSend + ?Sized,
{
    socket.send_text(payload.into().into_text()?)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingSocket {
        frames: Mutex<Vec<String>>,
    }

    impl SocketSend for RecordingSocket {
        fn send_text(&self, text: String) -> Result<(), WsError> {
            self.frames.lock().push(text);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenSocket;

    impl SocketSend for BrokenSocket {
        fn send_text(&self, _text: String) -> Result<(), WsError> {
            Err(WsError::ConnectionClosed)
        }
    }

    #[test]
    fn structured_payload_is_encoded() {
        let socket = RecordingSocket::default();
        assert!(socket_send(&socket, serde_json::json!({ "a": 1 })).is_ok());
        assert_eq!(socket.frames.lock().as_slice(), ["{\"a\":1}".to_string()]);
    }

    #[test]
    fn text_payload_is_sent_unchanged() {
        let socket = RecordingSocket::default();
        assert!(socket_send(&socket, "ping").is_ok());
        assert!(socket_send(&socket, String::new()).is_ok());
        assert_eq!(
            socket.frames.lock().as_slice(),
            ["ping".to_string(), String::new()]
        );
    }

    #[test]
    fn serializable_struct_payload() {
        #[derive(Serialize)]
        struct Greeting<'a> {
            hello: &'a str,
        }

        let Ok(payload) = Payload::json(&Greeting { hello: "world" }) else {
            panic!("greeting serializes");
        };
        let socket = RecordingSocket::default();
        assert!(socket_send(&socket, payload).is_ok());
        assert_eq!(
            socket.frames.lock().as_slice(),
            ["{\"hello\":\"world\"}".to_string()]
        );
    }

    #[test]
    fn transport_errors_propagate() {
        assert!(matches!(
            socket_send(&BrokenSocket, "ping"),
            Err(WsError::ConnectionClosed)
        ));
    }

    #[test]
    fn connection_writes_text_frame() {
        let (conn, mut io) = Connection::pair();
        io.open();
        assert!(socket_send(&conn, serde_json::json!({ "a": 1 })).is_ok());
        let Some(Message::Text(text)) = io.try_next_outbound() else {
            panic!("expected text frame");
        };
        assert_eq!(text.as_str(), "{\"a\":1}");
    }
}
