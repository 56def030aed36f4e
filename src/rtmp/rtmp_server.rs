use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use log::{error, info};

use crate::core::backend::MediaBackend;
use crate::core::cancel::CancellationToken;
use crate::core::ffmpeg::FfmpegBackend;
use crate::core::image::Image;
use crate::core::stream_info::StreamInfo;
use crate::error::{Error, Result};
use crate::rtmp::callbacks::CallbackTable;
use crate::rtmp::packet_queue::PacketQueue;
use crate::rtmp::read_worker::{self, on_worker_thread, WorkerContext, READ_WORKER_NAME};
use crate::rtmp::settings::{ServerBuilder, ServerSettings};

const STATUS_INIT: usize = 0;
const STATUS_RUN: usize = 1;
const STATUS_END: usize = 2;

/// A listening RTMP ingest session.
///
/// Accepts one publisher at a time on the configured URL, decodes its best video stream
/// and hands every frame to the image handler as an [`Image`] in the configured
/// [`OutputFormat`](crate::OutputFormat). When the publisher goes away the server goes back
/// to listening until [`stop`](RtmpServer::stop) is called.
///
/// Handlers run on the worker threads: the connected, disconnected and connection-level
/// error handlers on `rtmp-read-worker`, the image handler and decode errors on
/// `rtmp-decode-worker`. A slow image handler applies backpressure all the way to the
/// network; no packet is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let server = RtmpServer::builder()
///     .url("rtmp://0.0.0.0:1935/live")
///     .build()?;
///
/// server.set_connected_handler(|info| println!("connected: {info}"));
/// server.set_image_handler(|image| println!("image #{} {}", image.sequence(), image.resolution()));
/// server.set_error_handler(|e| eprintln!("error: {e}"));
///
/// server.start()?;
/// // ...
/// server.stop();
/// ```
pub struct RtmpServer<B: MediaBackend = FfmpegBackend> {
    settings: Arc<ServerSettings>,
    backend: Arc<B>,
    callbacks: Arc<CallbackTable>,
    queue: PacketQueue,
    cancel: CancellationToken,
    status: Arc<AtomicUsize>,
    read_worker: Mutex<Option<JoinHandle<()>>>,
}

impl RtmpServer<FfmpegBackend> {
    /// Starts a chained configuration, see [`ServerBuilder`].
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Creates an FFmpeg-backed server.
    ///
    /// # Returns
    ///
    /// * `Err(Error::InvalidSettings)` if `settings` fail validation.
    pub fn new(settings: ServerSettings) -> Result<Self> {
        Self::with_backend(settings, FfmpegBackend)
    }
}

impl<B: MediaBackend> RtmpServer<B> {
    /// Creates a server on top of a custom media backend.
    pub fn with_backend(settings: ServerSettings, backend: B) -> Result<Self> {
        settings.validate()?;
        let queue = PacketQueue::new(settings.queue_size);
        Ok(Self {
            settings: Arc::new(settings),
            backend: Arc::new(backend),
            callbacks: Arc::new(CallbackTable::default()),
            queue,
            cancel: CancellationToken::new(),
            status: Arc::new(AtomicUsize::new(STATUS_INIT)),
            read_worker: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Starts listening in the background. Returns immediately.
    ///
    /// Calling `start` on a running server does nothing.
    ///
    /// # Returns
    ///
    /// * `Ok(())` once the read worker is running.
    /// * `Err(Error::ServerStopped)` if the server has already been stopped.
    /// * `Err(Error::ThreadSpawn)` if the worker thread could not be created.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.lock_worker();
        match self.status.load(Ordering::Acquire) {
            STATUS_RUN => return Ok(()),
            STATUS_END => return Err(Error::ServerStopped),
            _ => {}
        }

        let handle = read_worker::spawn(WorkerContext {
            backend: self.backend.clone(),
            settings: self.settings.clone(),
            queue: self.queue.clone(),
            callbacks: self.callbacks.clone(),
            cancel: self.cancel.clone(),
        })?;
        *worker = Some(handle);
        self.status.store(STATUS_RUN, Ordering::Release);

        info!(
            "Rtmp server listening on {} (queue_size: {}, buffer: {}ms, output: {}).",
            self.settings.url,
            self.settings.queue_size,
            self.settings.buffer_time.as_millis(),
            self.settings.output_format
        );
        Ok(())
    }

    /// Stops the server and waits for both workers to exit, closing any open connection.
    ///
    /// Idempotent. No handler fires after `stop` returns. When called from inside a
    /// handler it only requests the stop; the workers are joined by the next `stop` (or
    /// the drop) on a non-worker thread.
    pub fn stop(&self) {
        self.cancel.cancel();

        // Same lock as `start`, so a concurrent start cannot overwrite END with RUN.
        let (previous, handle) = {
            let mut worker = self.lock_worker();
            let previous = self.status.swap(STATUS_END, Ordering::AcqRel);
            if on_worker_thread() {
                return;
            }
            (previous, worker.take())
        };

        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Thread[{READ_WORKER_NAME}] panicked.");
            }
        }
        if previous != STATUS_END {
            info!("Rtmp server stopped.");
        }
    }

    /// `true` between a successful [`start`](RtmpServer::start) and
    /// [`stop`](RtmpServer::stop).
    pub fn is_running(&self) -> bool {
        self.status.load(Ordering::Acquire) == STATUS_RUN
    }

    /// Checks whether the server has been stopped. A stopped server cannot be restarted.
    pub fn is_stopped(&self) -> bool {
        self.status.load(Ordering::Acquire) == STATUS_END
    }

    /// Called once per connection, after probing and before the first image.
    pub fn set_connected_handler<F>(&self, handler: F)
    where
        F: Fn(StreamInfo) + Send + Sync + 'static,
    {
        self.callbacks.set_connected(Arc::new(handler));
    }

    /// Called once per connection, after its last image.
    pub fn set_disconnected_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.set_disconnected(Arc::new(handler));
    }

    pub fn set_image_handler<F>(&self, handler: F)
    where
        F: Fn(Image) + Send + Sync + 'static,
    {
        self.callbacks.set_image(Arc::new(handler));
    }

    /// Receives every non-fatal error. Errors are dropped (and logged) while unset.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(Error) + Send + Sync + 'static,
    {
        self.callbacks.set_error(Arc::new(handler));
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.read_worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<B: MediaBackend> Drop for RtmpServer<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
