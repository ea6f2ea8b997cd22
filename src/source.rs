//! Position stream contract.
//!
//! The platform pushes fixes (and stream errors) to whoever subscribed. A
//! subscription stays live until its [`Subscription`] handle is cancelled or
//! dropped; after cancellation returns, the listener receives nothing more.
//!
//! [`SampleBroadcaster`] is a ready-made source a host can feed from its own
//! positioning callback (or a test can feed by hand).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::GeoSample;

/// Stream-level failure reported by the positioning hardware.
///
/// These never transition the recorder; they are reported as status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PositionError {
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("location permission denied")]
    PermissionDenied,
    #[error("timed out waiting for a position")]
    Timeout,
}

/// One item pushed by a position stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleEvent {
    Fix(GeoSample),
    Error(PositionError),
}

/// Callback invoked for every event while the subscription is live.
pub type SampleListener = Box<dyn FnMut(SampleEvent) + Send + 'static>;

/// A push-based source of position samples.
pub trait GeoSampleSource: Send + Sync {
    /// Start delivering events to `listener` until the returned handle is
    /// cancelled or dropped.
    fn subscribe(&self, listener: SampleListener) -> Subscription;
}

/// Cancel handle for a live subscription. Dropping it cancels.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    /// Wrap the source-specific cancellation action.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Cancel now. Equivalent to dropping the handle.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

// ============================================================================
// Broadcaster
// ============================================================================

struct ListenerSlot {
    active: AtomicBool,
    listener: Mutex<SampleListener>,
}

#[derive(Default)]
struct BroadcastInner {
    next_id: AtomicU64,
    slots: Mutex<BTreeMap<u64, Arc<ListenerSlot>>>,
}

/// Fan-out source: every [`publish`](Self::publish)ed event goes to every live
/// listener, in subscription order.
///
/// Listeners are snapshotted before delivery, so a listener may cancel any
/// subscription (its own included) from inside its callback. A listener must
/// not publish into the same broadcaster from inside its own callback.
#[derive(Default)]
pub struct SampleBroadcaster {
    inner: Arc<BroadcastInner>,
}

impl SampleBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every live listener.
    pub fn publish(&self, event: SampleEvent) {
        let slots: Vec<Arc<ListenerSlot>> = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for slot in slots {
            if !slot.active.load(Ordering::SeqCst) {
                continue;
            }
            let mut listener = slot.listener.lock().unwrap_or_else(PoisonError::into_inner);
            // Cancelled while we waited for the listener lock
            if !slot.active.load(Ordering::SeqCst) {
                continue;
            }
            let deliver: &mut SampleListener = &mut listener;
            deliver(event);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl GeoSampleSource for SampleBroadcaster {
    fn subscribe(&self, listener: SampleListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(ListenerSlot {
            active: AtomicBool::new(true),
            listener: Mutex::new(listener),
        });

        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&slot));

        let inner: Weak<BroadcastInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            slot.active.store(false, Ordering::SeqCst);
            if let Some(inner) = inner.upgrade() {
                inner
                    .slots
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        })
    }
}
