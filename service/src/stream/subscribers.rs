use super::{StreamBatch, StreamError, StreamStatus};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub type BatchCallback = Arc<dyn Fn(&StreamBatch) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(&StreamStatus) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&StreamError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Batch,
    Status,
    Error,
}

/// Independent subscriber sets, one per channel, keyed by handle id.
///
/// Ordered maps keep delivery in subscription order.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    batch: BTreeMap<u64, BatchCallback>,
    status: BTreeMap<u64, StatusCallback>,
    error: BTreeMap<u64, ErrorCallback>,
}

impl Subscribers {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn add_batch(&mut self, cb: BatchCallback) -> u64 {
        let id = self.next();
        self.batch.insert(id, cb);
        id
    }

    pub(crate) fn add_status(&mut self, cb: StatusCallback) -> u64 {
        let id = self.next();
        self.status.insert(id, cb);
        id
    }

    pub(crate) fn add_error(&mut self, cb: ErrorCallback) -> u64 {
        let id = self.next();
        self.error.insert(id, cb);
        id
    }

    pub(crate) fn remove(&mut self, channel: Channel, id: u64) -> bool {
        match channel {
            Channel::Batch => self.batch.remove(&id).is_some(),
            Channel::Status => self.status.remove(&id).is_some(),
            Channel::Error => self.error.remove(&id).is_some(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.batch.clear();
        self.status.clear();
        self.error.clear();
    }

    pub(crate) fn batch_callbacks(&self) -> Vec<BatchCallback> {
        self.batch.values().cloned().collect()
    }

    pub(crate) fn status_callbacks(&self) -> Vec<StatusCallback> {
        self.status.values().cloned().collect()
    }

    pub(crate) fn error_callbacks(&self) -> Vec<ErrorCallback> {
        self.error.values().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.batch.len() + self.status.len() + self.error.len()
    }
}

/// Call one subscriber, turning a panic into its message.
pub(crate) fn invoke<T: ?Sized>(cb: &Arc<dyn Fn(&T) + Send + Sync>, value: &T) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(|| cb(value))).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
