use std::sync::{Arc, RwLock};

use log::warn;

use crate::core::image::Image;
use crate::core::stream_info::StreamInfo;
use crate::error::Error;

pub type ConnectedHandler = Arc<dyn Fn(StreamInfo) + Send + Sync>;
pub type DisconnectedHandler = Arc<dyn Fn() + Send + Sync>;
pub type ImageHandler = Arc<dyn Fn(Image) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

/// The four application handlers, shared by the server and both workers.
///
/// Each slot sits behind its own lock. Invocation clones the handler out of the lock and
/// calls it unlocked, so a handler may replace itself (or any other) without deadlocking,
/// and a setter never waits for a running handler.
#[derive(Default)]
pub(crate) struct CallbackTable {
    connected: RwLock<Option<ConnectedHandler>>,
    disconnected: RwLock<Option<DisconnectedHandler>>,
    image: RwLock<Option<ImageHandler>>,
    error: RwLock<Option<ErrorHandler>>,
}

fn load<T: ?Sized>(slot: &RwLock<Option<Arc<T>>>) -> Option<Arc<T>> {
    match slot.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn store<T: ?Sized>(slot: &RwLock<Option<Arc<T>>>, handler: Arc<T>) {
    match slot.write() {
        Ok(mut guard) => *guard = Some(handler),
        Err(poisoned) => *poisoned.into_inner() = Some(handler),
    }
}

impl CallbackTable {
    pub(crate) fn set_connected(&self, handler: ConnectedHandler) {
        store(&self.connected, handler);
    }

    pub(crate) fn set_disconnected(&self, handler: DisconnectedHandler) {
        store(&self.disconnected, handler);
    }

    pub(crate) fn set_image(&self, handler: ImageHandler) {
        store(&self.image, handler);
    }

    pub(crate) fn set_error(&self, handler: ErrorHandler) {
        store(&self.error, handler);
    }

    pub(crate) fn on_connected(&self, info: StreamInfo) {
        if let Some(handler) = load(&self.connected) {
            handler(info);
        }
    }

    pub(crate) fn on_disconnected(&self) {
        if let Some(handler) = load(&self.disconnected) {
            handler();
        }
    }

    pub(crate) fn on_image(&self, image: Image) {
        if let Some(handler) = load(&self.image) {
            handler(image);
        }
    }

    /// Reports `error` on the calling thread. `Cancelled` is internal and never delivered.
    pub(crate) fn on_error(&self, error: Error) {
        if error == Error::Cancelled {
            return;
        }
        match load(&self.error) {
            Some(handler) => handler(error),
            None => warn!("Dropping error with no error handler registered: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::{OutputFormat, Resolution};
    use std::sync::Mutex;

    #[test]
    fn test_unset_handlers_are_noops() {
        let table = CallbackTable::default();
        table.on_connected(StreamInfo {
            codec: "h264".to_string(),
            pixel_format: "yuv420p".to_string(),
            resolution: Resolution::new(640, 480),
            stream_index: 0,
        });
        table.on_disconnected();
        table.on_image(Image::new(
            Resolution::new(1, 1),
            OutputFormat::Gray8,
            0,
            vec![0],
        ));
        table.on_error(Error::DecodeFailed("Invalid data".to_string()));
    }

    #[test]
    fn test_setter_replaces_handler() {
        let table = CallbackTable::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        table.set_error(Arc::new(move |e| first.lock().unwrap().push(format!("first: {e}"))));
        table.on_error(Error::ServerStopped);

        let second = seen.clone();
        table.set_error(Arc::new(move |_| second.lock().unwrap().push("second".to_string())));
        table.on_error(Error::ServerStopped);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("first"));
        assert_eq!(seen[1], "second");
    }

    #[test]
    fn test_cancelled_is_not_delivered() {
        let table = CallbackTable::default();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        table.set_error(Arc::new(move |_| *counter.lock().unwrap() += 1));
        table.on_error(Error::Cancelled);
        table.on_error(Error::SubmitFailed("Invalid data".to_string()));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_handler_can_replace_itself() {
        let table = Arc::new(CallbackTable::default());
        let calls = Arc::new(Mutex::new(0));

        let inner_table = table.clone();
        let inner_calls = calls.clone();
        table.set_disconnected(Arc::new(move || {
            *inner_calls.lock().unwrap() += 1;
            inner_table.set_disconnected(Arc::new(|| {}));
        }));

        table.on_disconnected();
        table.on_disconnected();
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
