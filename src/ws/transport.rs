//! Pump between an axum [`WebSocket`] and a [`TransportIo`].
//!
//! One task per socket forwards queued frames to the client and inbound
//! text/binary frames to the connection, then reports the end once either
//! side closes.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{self, Instant};

use super::{ReadyState, TransportIo};

/// How long to wait for the client's close frame after sending ours.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

enum Step {
    Outbound(Option<Message>),
    Inbound(Option<Result<Message, axum::Error>>),
    CloseTimedOut,
}

/// Opens the connection behind `io` and spawns the pump for `socket`.
pub fn attach(socket: WebSocket, io: TransportIo) {
    io.open();
    tokio::spawn(run_pump(socket, io));
}

async fn run_pump(socket: WebSocket, mut io: TransportIo) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let connection_id = io.connection().id();
    let mut close_deadline: Option<Instant> = None;

    loop {
        let step = tokio::select! {
            outbound = io.next_outbound() => Step::Outbound(outbound),
            inbound = ws_rx.next() => Step::Inbound(inbound),
            () = sleep_until(close_deadline) => Step::CloseTimedOut,
        };

        match step {
            // Frame queued by the application
            Step::Outbound(Some(message)) => {
                let closing = matches!(message, Message::Close(_));
                if ws_tx.send(message).await.is_err() {
                    break;
                }
                if closing {
                    close_deadline = Some(Instant::now() + CLOSE_TIMEOUT);
                }
            }
            Step::Outbound(None) => break,
            // Frame from the client
            Step::Inbound(Some(Ok(message @ (Message::Text(_) | Message::Binary(_))))) => {
                io.push_inbound(message);
            }
            Step::Inbound(Some(Ok(Message::Close(_))) | None) => {
                io.set_ready_state(ReadyState::Closing);
                break;
            }
            Step::Inbound(Some(Ok(_))) => {}
            Step::Inbound(Some(Err(err))) => {
                tracing::debug!(connection_id = %connection_id, error = %err, "websocket read failed");
                break;
            }
            Step::CloseTimedOut => {
                tracing::debug!(connection_id = %connection_id, "client did not answer close frame");
                break;
            }
        }
    }

    io.signal_end();
    tracing::debug!(connection_id = %connection_id, "ws connection closed");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
