use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::Sender;
use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{info, warn};

use crate::error::ConnectionError;
use crate::events::{EngineEvent, LifecycleEvent};
use crate::protocol::{self, OutboundFrame};

/// One live duplex connection to the game-server plugin. Owns the read and
/// write tasks; parses inbound text into typed frames and drops (while
/// counting) anything that does not match the catalogue. Best-effort,
/// in-order delivery; no acknowledgement layer.
pub struct TelemetryChannel {
    url: String,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
    dropped_frames: Arc<AtomicU64>,
}

impl TelemetryChannel {
    pub async fn open(url: &str, events: Sender<EngineEvent>) -> Result<Self, ConnectionError> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|err| classify_connect_error(url, &err))?;
        info!(url = %url, "telemetry channel connected");

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let dropped_frames = Arc::new(AtomicU64::new(0));

        if events.send(EngineEvent::Lifecycle(LifecycleEvent::Connect)).is_err() {
            warn!("engine receiver dropped before channel start");
        }

        let write_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let message = tungstenite::Message::Text(frame.to_wire());
                if let Err(err) = sink.send(message).await {
                    warn!(?err, "telemetry channel write failed");
                    break;
                }
            }
        });

        let read_events = events.clone();
        let dropped = Arc::clone(&dropped_frames);
        let read_task = tokio::spawn(async move {
            let mut errored = false;
            while let Some(next) = stream.next().await {
                let text = match next {
                    Ok(tungstenite::Message::Text(text)) => text,
                    Ok(tungstenite::Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(?err, "telemetry stream read error");
                        errored = true;
                        break;
                    }
                };
                match protocol::parse_inbound(&text) {
                    Ok(frame) => {
                        if read_events.send(EngineEvent::Frame(frame)).is_err() {
                            warn!("engine receiver dropped; stopping telemetry channel");
                            return;
                        }
                    }
                    Err(err) => {
                        let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(%err, dropped_total = total, "dropped malformed telemetry frame");
                    }
                }
            }
            // Exactly one terminal lifecycle transition per channel.
            let terminal = if errored {
                LifecycleEvent::Error
            } else {
                LifecycleEvent::Disconnect
            };
            let _ = read_events.send(EngineEvent::Lifecycle(terminal));
        });

        Ok(Self {
            url: url.to_owned(),
            outbound: outbound_tx,
            read_task,
            write_task,
            dropped_frames,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queues an outbound frame. Returns false when the write task is gone.
    pub fn send(&self, frame: OutboundFrame) -> bool {
        self.outbound.send(frame).is_ok()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Tears the connection down without emitting lifecycle events; the
    /// supervisor reports the replacement itself.
    pub fn close(&self) {
        self.read_task.abort();
        self.write_task.abort();
    }
}

fn classify_connect_error(url: &str, err: &tungstenite::Error) -> ConnectionError {
    match err {
        tungstenite::Error::Url(_)
        | tungstenite::Error::Tls(_)
        | tungstenite::Error::Http(_)
        | tungstenite::Error::HttpFormat(_) => {
            ConnectionError::SecurityPolicy(format!("{url}: {err}"))
        }
        _ => ConnectionError::Unreachable(format!("{url}: {err}")),
    }
}
