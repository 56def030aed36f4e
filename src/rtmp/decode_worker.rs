use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::core::backend::{Converter, DecodedFrame, Decoder, DecoderFault, MediaBackend};
use crate::core::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::rtmp::read_worker::{mark_worker_thread, WorkerContext};

pub(crate) const DECODE_WORKER_NAME: &str = "rtmp-decode-worker";

/// Upper bound on how long the worker waits for a packet before re-checking its flags.
pub(crate) const POP_INTERVAL: Duration = Duration::from_millis(50);

/// Per-connection decode counters, returned when the worker is joined.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DecodeStats {
    pub(crate) packets: usize,
    pub(crate) images: usize,
    pub(crate) converter_builds: usize,
}

/// Handle to the decode thread of one connection.
pub(crate) struct DecodeWorker {
    handle: JoinHandle<DecodeStats>,
    finish: Arc<AtomicBool>,
    abort: CancellationToken,
}

impl DecodeWorker {
    /// Starts decoding packets from the context's queue with `decoder`.
    ///
    /// `abort` is the connection token: cancelling it stops the worker immediately, and the
    /// worker cancels it itself after an unrecoverable decoder fault when reconnecting is
    /// enabled.
    pub(crate) fn spawn<B: MediaBackend>(
        context: WorkerContext<B>,
        decoder: B::Decoder,
        abort: CancellationToken,
    ) -> Result<Self> {
        let finish = Arc::new(AtomicBool::new(false));
        let worker_finish = finish.clone();
        let worker_abort = abort.clone();

        let handle = std::thread::Builder::new()
            .name(DECODE_WORKER_NAME.to_string())
            .spawn(move || {
                mark_worker_thread();
                DecodeLoop::<B> {
                    context,
                    decoder,
                    converter: None,
                    sequence: 0,
                    stats: DecodeStats::default(),
                    abort: worker_abort,
                    finish: worker_finish,
                }
                .run()
            })
            .map_err(|e| Error::ThreadSpawn {
                name: DECODE_WORKER_NAME,
                reason: e.to_string(),
            })?;

        Ok(Self {
            handle,
            finish,
            abort,
        })
    }

    /// Lets the worker decode everything already queued, then joins it.
    pub(crate) fn finish(self) -> DecodeStats {
        self.finish.store(true, Ordering::Release);
        self.join()
    }

    /// Stops the worker at the next packet boundary and joins it.
    pub(crate) fn abort(self) -> DecodeStats {
        self.abort.cancel();
        self.join()
    }

    fn join(self) -> DecodeStats {
        match self.handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                error!("Thread[{DECODE_WORKER_NAME}] panicked.");
                DecodeStats::default()
            }
        }
    }
}

/// Drops the connection if the decode thread unwinds, so the read worker does not wait on a
/// queue nobody drains.
struct AbortOnPanic(CancellationToken);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Thread[{DECODE_WORKER_NAME}] is panicking, dropping the connection.");
            self.0.cancel();
        }
    }
}

struct DecodeLoop<B: MediaBackend> {
    context: WorkerContext<B>,
    decoder: B::Decoder,
    converter: Option<B::Converter>,
    sequence: u64,
    stats: DecodeStats,
    abort: CancellationToken,
    finish: Arc<AtomicBool>,
}

impl<B: MediaBackend> DecodeLoop<B> {
    fn run(mut self) -> DecodeStats {
        let _guard = AbortOnPanic(self.abort.clone());
        debug!("Decode worker started.");
        while !self.abort.is_cancelled() {
            let Some(packet) = self.context.queue.pop(POP_INTERVAL) else {
                if self.finish.load(Ordering::Acquire) && self.context.queue.is_empty() {
                    break;
                }
                continue;
            };
            self.stats.packets += 1;

            if let Err(fault) = self.decoder.submit(&packet) {
                if fault.is_unrecoverable() {
                    if self.on_fatal(fault) {
                        break;
                    }
                } else {
                    warn!("Failed to submit packet: {}", fault.reason());
                    self.context
                        .callbacks
                        .on_error(Error::SubmitFailed(fault.reason().to_string()));
                }
                continue;
            }

            if !self.drain_frames() {
                break;
            }
        }
        debug!("Decode worker exited: {:?}", self.stats);
        self.stats
    }

    /// Pulls every frame the last packet produced.
    ///
    /// Returns `false` when the worker must stop.
    fn drain_frames(&mut self) -> bool {
        loop {
            if self.abort.is_cancelled() {
                return false;
            }
            match self.decoder.receive_frame() {
                Ok(Some(frame)) => self.deliver(frame),
                Ok(None) => return true,
                Err(fault) if fault.is_unrecoverable() => return !self.on_fatal(fault),
                Err(fault) => {
                    warn!("Failed to decode frame: {}", fault.reason());
                    self.context
                        .callbacks
                        .on_error(Error::DecodeFailed(fault.reason().to_string()));
                    return true;
                }
            }
        }
    }

    /// Reports an unrecoverable fault. Returns `true` if the connection is being dropped.
    fn on_fatal(&mut self, fault: DecoderFault) -> bool {
        error!("Unrecoverable decoder fault: {}", fault.reason());
        self.context
            .callbacks
            .on_error(Error::DecoderFault(fault.reason().to_string()));
        if self.context.settings.reconnect_on_decoder_fault {
            info!("Dropping connection after decoder fault.");
            self.abort.cancel();
            true
        } else {
            false
        }
    }

    fn deliver(&mut self, frame: B::Frame) {
        let layout = frame.layout();
        let current = self.converter.as_ref().map(|converter| converter.layout());
        if current != Some(layout) {
            if let Some(previous) = current {
                info!(
                    "Frame layout changed from {} to {}, rebuilding converter.",
                    previous.resolution, layout.resolution
                );
            }
            self.converter = None;
            match self
                .context
                .backend
                .build_converter(&frame, self.context.settings.output_format)
            {
                Ok(converter) => {
                    self.converter = Some(converter);
                    self.stats.converter_builds += 1;
                }
                Err(e) => {
                    warn!("{e}");
                    self.context.callbacks.on_error(e);
                    return;
                }
            }
        }

        let Some(converter) = self.converter.as_mut() else {
            return;
        };
        match converter.convert(&frame, self.sequence) {
            Ok(image) => {
                self.sequence += 1;
                self.stats.images += 1;
                self.context.callbacks.on_image(image);
            }
            Err(e) => {
                warn!("{e}");
                self.context.callbacks.on_error(e);
            }
        }
    }
}
