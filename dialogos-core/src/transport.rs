//! Session Transport
//!
//! One transport per streaming turn: a unidirectional, server-to-client
//! push channel carrying event frames. `done` and `error` frames are
//! terminal and close the channel. Writes never block indefinitely on a
//! slow consumer; a bounded per-fragment timeout turns a stalled write into
//! a client disconnect.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{EngineError, Result};

/// Wire frame of the streaming transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventFrame {
    /// One incremental piece of assistant text
    Fragment { text: String },
    /// Normal completion; terminal
    Done,
    /// Out-of-band failure; terminal
    Error { reason: String },
}

/// Server-to-client push channel for one streaming turn.
///
/// A `TransportClosed` error from any method means the client has gone
/// away (or a write timed out); the caller treats that as early
/// finalization, not as a user-visible failure.
#[async_trait]
pub trait TurnTransport: Send {
    /// Push one text fragment.
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Push the terminal error frame and close the channel.
    async fn send_error(&mut self, reason: &str) -> Result<()>;

    /// Push the terminal `done` frame and close the channel.
    async fn close(&mut self) -> Result<()>;
}

/// Channel-backed transport.
///
/// The receiving half is typically drained into an SSE response body; in
/// tests it is read directly.
pub struct ChannelTransport {
    tx: Option<mpsc::Sender<EventFrame>>,
    write_timeout: Duration,
}

impl ChannelTransport {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<EventFrame>, write_timeout: Duration) -> Self {
        Self {
            tx: Some(tx),
            write_timeout,
        }
    }

    /// Create a bounded channel and the transport over its sending half.
    pub fn channel(
        buffer: usize,
        write_timeout: Duration,
    ) -> (Self, mpsc::Receiver<EventFrame>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx, write_timeout), rx)
    }

    async fn write(&mut self, frame: EventFrame) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(EngineError::TransportClosed);
        };

        match tokio::time::timeout(self.write_timeout, tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            // Receiver dropped, or the consumer is too slow to keep up.
            Ok(Err(_)) | Err(_) => {
                self.tx = None;
                Err(EngineError::TransportClosed)
            }
        }
    }
}

#[async_trait]
impl TurnTransport for ChannelTransport {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.write(EventFrame::Fragment {
            text: text.to_string(),
        })
        .await
    }

    async fn send_error(&mut self, reason: &str) -> Result<()> {
        let result = self
            .write(EventFrame::Error {
                reason: reason.to_string(),
            })
            .await;
        self.tx = None;
        result
    }

    async fn close(&mut self) -> Result<()> {
        let result = self.write(EventFrame::Done).await;
        self.tx = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wire_format() {
        let fragment = EventFrame::Fragment {
            text: "hi".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&fragment).unwrap(),
            r#"{"type":"fragment","text":"hi"}"#
        );
        assert_eq!(
            serde_json::to_string(&EventFrame::Done).unwrap(),
            r#"{"type":"done"}"#
        );

        let error: EventFrame =
            serde_json::from_str(r#"{"type":"error","reason":"backend down"}"#).unwrap();
        assert_eq!(
            error,
            EventFrame::Error {
                reason: "backend down".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_send_and_close() {
        let (mut transport, mut rx) = ChannelTransport::channel(8, Duration::from_secs(1));

        transport.send("hello").await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            EventFrame::Fragment {
                text: "hello".to_string()
            }
        );
        assert_eq!(rx.recv().await.unwrap(), EventFrame::Done);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_terminal_frame_fails() {
        let (mut transport, mut rx) = ChannelTransport::channel(8, Duration::from_secs(1));

        transport.close().await.unwrap();
        let err = transport.send("late").await.unwrap_err();
        assert!(matches!(err, EngineError::TransportClosed));

        assert_eq!(rx.recv().await.unwrap(), EventFrame::Done);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_disconnect() {
        let (mut transport, rx) = ChannelTransport::channel(8, Duration::from_secs(1));
        drop(rx);

        let err = transport.send("hello").await.unwrap_err();
        assert!(matches!(err, EngineError::TransportClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_times_out() {
        // Buffer of one, never drained: the second write must time out
        // instead of blocking the turn forever.
        let (mut transport, _rx) = ChannelTransport::channel(1, Duration::from_millis(100));

        transport.send("first").await.unwrap();
        let err = transport.send("second").await.unwrap_err();
        assert!(matches!(err, EngineError::TransportClosed));
    }
}
