//! Async driver for the phantom host.
//!
//! The host itself is synchronous. This module owns the fixed tick
//! interval, feeds transport events in between ticks and hands outbound
//! envelopes to the transport without waiting on delivery. The stdio
//! transport speaks one JSON frame per line:
//!
//! ```json
//! {"peer":3,"event":"connect"}
//! {"peer":3,"event":{"message":{"type":"JOIN_REQUEST","body":{"peer":3,"name":"Ada","color":"#fff"}}}}
//! {"peer":3,"event":"disconnect"}
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;
use warfront_core::scenario::WorldGenerator;

use crate::error::{NetError, Result};
use crate::persistence::SnapshotStore;
use crate::phantom::PhantomHost;
use crate::protocol::{Envelope, PeerId, WireMessage};

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A peer connected.
    Connected(PeerId),
    /// A peer went away.
    Disconnected(PeerId),
    /// A peer sent a message.
    Message {
        /// Sender.
        from: PeerId,
        /// Decoded message.
        message: WireMessage,
    },
    /// Stop after saving.
    Shutdown,
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Run the host until shutdown or until the event channel closes, then
/// save once more. Returns the host for inspection.
pub async fn run_phantom<S, G>(
    mut host: PhantomHost<S, G>,
    tick_ms: u64,
    mut events: UnboundedReceiver<PeerEvent>,
    outbound: UnboundedSender<Envelope>,
    clock: impl Fn() -> u64,
) -> Result<PhantomHost<S, G>>
where
    S: SnapshotStore,
    G: WorldGenerator,
{
    let send = |envelopes: Vec<Envelope>| -> Result<()> {
        for envelope in envelopes {
            outbound.send(envelope).map_err(|_| NetError::ChannelClosed("outbound"))?;
        }
        Ok(())
    };

    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(tick_ms, "phantom host running");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                send(host.tick(clock()))?;
            }
            event = events.recv() => {
                let now_ms = clock();
                let replies = match event {
                    Some(PeerEvent::Connected(peer)) => host.peer_connected(peer, now_ms),
                    Some(PeerEvent::Disconnected(peer)) => {
                        host.peer_disconnected(peer, now_ms);
                        Vec::new()
                    }
                    Some(PeerEvent::Message { from, message }) => host.receive(from, message, now_ms),
                    Some(PeerEvent::Shutdown) | None => break,
                };
                send(replies)?;
            }
        }
    }

    host.save(clock())?;
    tracing::info!(tick = host.state().tick, "phantom host stopped");
    Ok(host)
}

// ============================================================================
// Stdio transport
// ============================================================================

/// What a stdio frame reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameEvent {
    /// The peer connected.
    Connect,
    /// The peer disconnected.
    Disconnect,
    /// The peer sent a message.
    Message(WireMessage),
    /// Stop the host.
    Shutdown,
}

/// One inbound line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Peer the event concerns.
    pub peer: PeerId,
    /// What happened.
    pub event: FrameEvent,
}

impl From<InboundFrame> for PeerEvent {
    fn from(frame: InboundFrame) -> Self {
        match frame.event {
            FrameEvent::Connect => Self::Connected(frame.peer),
            FrameEvent::Disconnect => Self::Disconnected(frame.peer),
            FrameEvent::Message(message) => Self::Message {
                from: frame.peer,
                message,
            },
            FrameEvent::Shutdown => Self::Shutdown,
        }
    }
}

/// Read frames line by line into `events`. Malformed lines are logged and
/// skipped; end of input becomes [`PeerEvent::Shutdown`].
pub async fn read_frames<R>(reader: R, events: UnboundedSender<PeerEvent>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundFrame>(line) {
            Ok(frame) => {
                let event = PeerEvent::from(frame);
                let stop = event == PeerEvent::Shutdown;
                events.send(event).map_err(|_| NetError::ChannelClosed("events"))?;
                if stop {
                    return Ok(());
                }
            }
            Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
        }
    }
    // The host may already be gone by now.
    let _ = events.send(PeerEvent::Shutdown);
    Ok(())
}

/// Write every envelope as one JSON line until the channel closes.
pub async fn write_envelopes<W>(mut writer: W, mut outbound: UnboundedReceiver<Envelope>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = outbound.recv().await {
        let mut line = serde_json::to_string(&envelope)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
