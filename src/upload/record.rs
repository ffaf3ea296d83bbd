use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Default)]
struct RecordState {
    last_upload: Option<SystemTime>,
    in_flight: Option<u64>,
}

/// Upload bookkeeping shared for the lifetime of the session.
///
/// `last_upload` of `None` compares like timestamp 0.
#[derive(Debug, Default)]
pub struct UploadRecord {
    state: Mutex<RecordState>,
    next_attempt: AtomicU64,
}

impl UploadRecord {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the single in-flight slot; `None` when another attempt holds it
    pub fn try_claim(self: &Arc<Self>) -> Option<UploadClaim> {
        let mut state = self.state.lock();
        if state.in_flight.is_some() {
            return None;
        }

        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed) + 1;
        state.in_flight = Some(attempt);
        debug!("Upload attempt {} claimed", attempt);

        Some(UploadClaim {
            record: Arc::clone(self),
            attempt,
            released: false,
        })
    }

    pub fn last_upload(&self) -> Option<SystemTime> {
        self.state.lock().last_upload
    }

    pub fn is_uploading(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Forget the last successful upload so the newest photo is eligible again
    pub fn reset(&self) {
        self.state.lock().last_upload = None;
    }

    fn release(&self, attempt: u64, uploaded_at: Option<SystemTime>) {
        let mut state = self.state.lock();
        if let Some(at) = uploaded_at {
            state.last_upload = Some(at);
        }
        if state.in_flight == Some(attempt) {
            state.in_flight = None;
            debug!("Upload attempt {} released", attempt);
        }
    }
}

/// Ownership of the in-flight slot for one attempt; dropping it releases the slot
#[derive(Debug)]
pub struct UploadClaim {
    record: Arc<UploadRecord>,
    attempt: u64,
    released: bool,
}

impl UploadClaim {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Release the slot, recording `uploaded_at` as the last successful upload
    pub fn finish(mut self, uploaded_at: Option<SystemTime>) {
        self.record.release(self.attempt, uploaded_at);
        self.released = true;
    }
}

impl Drop for UploadClaim {
    fn drop(&mut self) {
        if !self.released {
            self.record.release(self.attempt, None);
        }
    }
}
