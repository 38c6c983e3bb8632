// Delivery contexts for completion callbacks

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, warn};

/// Boxed callback handed to a context
pub type SyncCallback = Box<dyn FnOnce() + Send + 'static>;

/// Marshals completion callbacks onto a caller-designated execution context.
///
/// Workers only ever call `post`; they never run caller callbacks themselves.
pub trait SynchronizationContext: Send + Sync {
    fn post(&self, callback: SyncCallback);
}

/// Queue drained by its owner, typically once per logic tick.
///
/// Callbacks always wait for the next `drain`, even when posted from the owning thread,
/// so delivery order is exactly post order.
pub struct ChannelSyncContext {
    sender: Sender<SyncCallback>,
    receiver: Receiver<SyncCallback>,
}

impl ChannelSyncContext {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Run every callback posted so far; returns how many ran
    pub fn drain(&self) -> usize {
        let mut count = 0;
        while let Ok(callback) = self.receiver.try_recv() {
            callback();
            count += 1;
        }
        count
    }

    /// Like [`drain`](Self::drain) but waits up to `timeout` for the first callback
    pub fn drain_timeout(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        match self.receiver.recv_deadline(deadline) {
            Ok(callback) => {
                callback();
                1 + self.drain()
            }
            Err(_) => 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for ChannelSyncContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SynchronizationContext for ChannelSyncContext {
    fn post(&self, callback: SyncCallback) {
        // Both ends live in self, the channel cannot be disconnected here
        let _ = self.sender.send(callback);
    }
}

/// Owns one delivery thread; callbacks run there in post order.
pub struct ThreadSyncContext {
    sender: Mutex<Option<Sender<SyncCallback>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadSyncContext {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<SyncCallback>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || delivery_loop(receiver))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop accepting callbacks, deliver what is already queued, then join the thread
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        // A callback may drop the last reference from the delivery thread itself
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("Synchronization thread exited abnormally");
        }
    }
}

fn delivery_loop(receiver: Receiver<SyncCallback>) {
    // recv keeps yielding queued callbacks after the sender is gone
    while let Ok(callback) = receiver.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            error!("Path callback panicked: {}", panic_message(payload.as_ref()));
        }
    }
}

impl SynchronizationContext for ThreadSyncContext {
    fn post(&self, callback: SyncCallback) {
        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(callback).is_ok(),
            None => false,
        };
        if !sent {
            warn!("Dropping path callback posted after synchronization context shutdown");
        }
    }
}

impl Drop for ThreadSyncContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Best-effort text from a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_channel_context_defers_until_drain() {
        let sync = ChannelSyncContext::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            sync.post(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(sync.pending(), 3);
        assert_eq!(sync.drain(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(sync.drain(), 0);
    }

    #[test]
    fn test_channel_context_drain_timeout() {
        let sync = Arc::new(ChannelSyncContext::new());
        assert_eq!(sync.drain_timeout(Duration::from_millis(5)), 0);

        let poster = sync.clone();
        let handle = thread::spawn(move || poster.post(Box::new(|| {})));
        assert_eq!(sync.drain_timeout(Duration::from_secs(5)), 1);
        handle.join().unwrap();
    }

    #[test]
    fn test_thread_context_runs_in_order_on_own_thread() {
        let sync = ThreadSyncContext::new("test-sync").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let caller = thread::current().id();

        for i in 0..5 {
            let seen = seen.clone();
            sync.post(Box::new(move || {
                assert_ne!(thread::current().id(), caller);
                seen.lock().push(i);
            }));
        }
        sync.shutdown();
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_thread_context_survives_panicking_callback() {
        let sync = ThreadSyncContext::new("test-sync-panic").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        sync.post(Box::new(|| panic!("callback failure")));
        let counter = hits.clone();
        sync.post(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        sync.shutdown();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_after_shutdown_is_dropped() {
        let sync = ThreadSyncContext::new("test-sync-closed").unwrap();
        sync.shutdown();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        sync.post(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
