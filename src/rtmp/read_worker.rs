// src/rtmp/read_worker.rs - Connection state machine
//
// Connecting -> Probing -> Streaming -> Disconnecting -> Connecting ...
//
// - Owns the connection exclusively; it is closed on every path back to Connecting
// - Each connection gets a child cancellation token so a decoder fault can tear down
//   just that connection while the session token stops everything
// - Spawns one decode worker per connection and always joins it before the
//   disconnected handler fires

use std::cell::Cell;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use crate::core::backend::{Connection, MediaBackend};
use crate::core::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::rtmp::callbacks::CallbackTable;
use crate::rtmp::decode_worker::DecodeWorker;
use crate::rtmp::packet_queue::PacketQueue;
use crate::rtmp::prober::{self, Probe};
use crate::rtmp::settings::ServerSettings;

pub(crate) const READ_WORKER_NAME: &str = "rtmp-read-worker";

thread_local! {
    static IN_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as a pipeline worker.
pub(crate) fn mark_worker_thread() {
    IN_WORKER.with(|flag| flag.set(true));
}

/// Whether the caller runs on a pipeline worker (i.e. inside a handler).
pub(crate) fn on_worker_thread() -> bool {
    IN_WORKER.with(|flag| flag.get())
}

/// Everything a worker may touch. Workers never see the server itself.
pub(crate) struct WorkerContext<B: MediaBackend> {
    pub(crate) backend: Arc<B>,
    pub(crate) settings: Arc<ServerSettings>,
    pub(crate) queue: PacketQueue,
    pub(crate) callbacks: Arc<CallbackTable>,
    pub(crate) cancel: CancellationToken,
}

impl<B: MediaBackend> Clone for WorkerContext<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            settings: self.settings.clone(),
            queue: self.queue.clone(),
            callbacks: self.callbacks.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

pub(crate) fn spawn<B: MediaBackend>(context: WorkerContext<B>) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(READ_WORKER_NAME.to_string())
        .spawn(move || {
            mark_worker_thread();
            ReadWorker { context }.run();
        })
        .map_err(|e| {
            error!("Thread[{READ_WORKER_NAME}] failed to start: {e}");
            Error::ThreadSpawn {
                name: READ_WORKER_NAME,
                reason: e.to_string(),
            }
        })
}

/// How the streaming phase of a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// The peer finished or the transport failed; queued packets are still decoded.
    Finished,
    /// The connection token fired; queued packets are discarded.
    Aborted,
}

struct ReadWorker<B: MediaBackend> {
    context: WorkerContext<B>,
}

impl<B: MediaBackend> ReadWorker<B> {
    fn run(self) {
        let endpoint = self.context.settings.endpoint();
        let cancel = &self.context.cancel;

        while !cancel.is_cancelled() {
            let connection_token = cancel.child();

            // Connecting
            let mut connection = match self.context.backend.open(&endpoint, &connection_token) {
                Ok(connection) => connection,
                Err(e) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let error = match e {
                        Error::ConnectFailed { .. } => e,
                        other => Error::ConnectFailed {
                            url: endpoint.url.clone(),
                            reason: other.to_string(),
                        },
                    };
                    warn!("{error}");
                    self.context.callbacks.on_error(error);
                    self.backoff();
                    continue;
                }
            };
            info!("Rtmp publisher connected on {}", endpoint.url);

            // Probing
            let probe = match prober::probe(&*self.context.backend, &mut connection) {
                Ok(probe) => probe,
                Err(e) => {
                    drop(connection);
                    if cancel.is_cancelled() {
                        break;
                    }
                    warn!("Failed to probe rtmp connection: {e}");
                    self.context.callbacks.on_error(e);
                    self.backoff();
                    continue;
                }
            };

            // Streaming + Disconnecting
            self.stream(connection, probe, &connection_token);

            // The decode side dropped the connection; a publisher that left on its own is
            // accepted again right away.
            if connection_token.is_cancelled() && !cancel.is_cancelled() {
                self.backoff();
            }
        }

        info!("Rtmp read worker exited.");
    }

    fn backoff(&self) {
        let delay = self.context.settings.reconnect_delay;
        if !delay.is_zero() {
            self.context.cancel.sleep(delay);
        }
    }

    fn stream(
        &self,
        mut connection: B::Connection,
        probe: Probe<B::Decoder>,
        connection_token: &CancellationToken,
    ) {
        let Probe { info, decoder } = probe;
        let stream_index = info.stream_index;
        let callbacks = &self.context.callbacks;

        callbacks.on_connected(info);

        let decode_worker =
            match DecodeWorker::spawn(self.context.clone(), decoder, connection_token.clone()) {
                Ok(worker) => worker,
                Err(e) => {
                    callbacks.on_error(e);
                    callbacks.on_disconnected();
                    drop(connection);
                    self.backoff();
                    return;
                }
            };

        let mut forwarded = 0usize;
        let mut discarded = 0usize;
        let end = loop {
            match connection.read_packet() {
                Ok(Some(packet)) if packet.stream_index() == stream_index => {
                    if !self.context.queue.push(packet, connection_token) {
                        break StreamEnd::Aborted;
                    }
                    forwarded += 1;
                }
                Ok(Some(_)) => discarded += 1,
                Ok(None) => {
                    info!("Rtmp publisher ended the stream.");
                    break StreamEnd::Finished;
                }
                Err(Error::Cancelled) => break StreamEnd::Aborted,
                Err(e) => {
                    if connection_token.is_cancelled() {
                        break StreamEnd::Aborted;
                    }
                    let error = match e {
                        Error::TransportReadFailed(_) => e,
                        other => Error::TransportReadFailed(other.to_string()),
                    };
                    warn!("{error}");
                    callbacks.on_error(error);
                    break StreamEnd::Finished;
                }
            }
        };

        // Disconnecting
        let stats = if end == StreamEnd::Finished && !connection_token.is_cancelled() {
            decode_worker.finish()
        } else {
            decode_worker.abort()
        };
        callbacks.on_disconnected();

        let drained = self.context.queue.drain();
        debug!(
            "Connection summary: forwarded={forwarded} discarded={discarded} decoded_packets={} images={} converter_builds={} drained={drained}",
            stats.packets, stats.images, stats.converter_builds
        );
        drop(connection);
        info!("Rtmp connection closed.");
    }
}
