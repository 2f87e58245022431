use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-flight set of conversations with an operation running.
///
/// Steps and approval resolutions on the same conversation are mutually
/// exclusive: a second caller gets `None` from [`try_acquire`] instead of
/// waiting. Cancellation requests that arrive while a step is running are
/// parked here until the step picks them up.
///
/// [`try_acquire`]: ConversationLocks::try_acquire
#[derive(Debug, Default)]
pub struct ConversationLocks {
    in_flight: Mutex<HashSet<String>>,
    cancel_requests: Mutex<HashSet<String>>,
}

impl ConversationLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `id`. The claim is released when the guard drops.
    pub fn try_acquire(self: &Arc<Self>, id: &str) -> Option<ConversationGuard> {
        if !lock(&self.in_flight).insert(id.to_string()) {
            return None;
        }
        Some(ConversationGuard {
            locks: Arc::clone(self),
            id: id.to_string(),
        })
    }

    pub fn is_busy(&self, id: &str) -> bool {
        lock(&self.in_flight).contains(id)
    }

    pub fn request_cancel(&self, id: &str) {
        lock(&self.cancel_requests).insert(id.to_string());
    }

    pub fn cancel_requested(&self, id: &str) -> bool {
        lock(&self.cancel_requests).contains(id)
    }

    /// Consume a parked cancellation request.
    pub fn take_cancel_request(&self, id: &str) -> bool {
        lock(&self.cancel_requests).remove(id)
    }
}

// A poisoned set is still a valid set.
fn lock(m: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Exclusive claim on one conversation.
#[derive(Debug)]
pub struct ConversationGuard {
    locks: Arc<ConversationLocks>,
    id: String,
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        lock(&self.locks.in_flight).remove(&self.id);
    }
}
