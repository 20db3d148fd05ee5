//! Single-slot holder for the most recent response.
//!
//! "Most recent" means the last completed `set`. With several requests in
//! flight on different threads the slot ends up holding whichever finished
//! last, not whichever started last.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::response::ResponseRecord;

#[derive(Debug, Default)]
pub struct LastResponseStore {
    slot: Mutex<Option<Arc<ResponseRecord>>>,
}

impl LastResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, response: Arc<ResponseRecord>) {
        *self.slot.lock() = Some(response);
    }

    /// `None` until the first `set`, and after `clear`.
    pub fn get(&self) -> Option<Arc<ResponseRecord>> {
        self.slot.lock().clone()
    }

    pub fn clear(&self) {
        self.slot.lock().take();
    }
}
