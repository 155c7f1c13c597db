//! Registry of in-flight requests, keyed by correlation id.
//!
//! Responses may arrive in any order, so lookup is always by id, never by
//! send order. At most one entry exists per id.

use std::collections::HashMap;

use rmpv::Value;

use super::ResultSlot;
use crate::error::{Result, TarantoolError};
use crate::protocol::RequestCode;

/// One request waiting for its response.
#[derive(Debug)]
pub struct PendingRequest {
    code: RequestCode,
    slot: ResultSlot,
}

impl PendingRequest {
    /// Operation code the request was sent with.
    #[inline]
    pub fn code(&self) -> RequestCode {
        self.code
    }

    /// Complete the request with `outcome`.
    ///
    /// Returns false if the caller already dropped its future.
    pub fn complete(self, outcome: Result<Value>) -> bool {
        self.slot.send(outcome).is_ok()
    }
}

/// Maps correlation ids to pending requests.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<u32, PendingRequest>,
}

impl PendingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a request under `sync`.
    ///
    /// # Errors
    ///
    /// If `sync` is already outstanding, the new slot is failed and a
    /// protocol error is returned; the existing entry is untouched.
    pub fn register(&mut self, sync: u32, code: RequestCode, slot: ResultSlot) -> Result<()> {
        if self.entries.contains_key(&sync) {
            let message = format!("sync {} is already pending", sync);
            let _ = slot.send(Err(TarantoolError::Protocol(message.clone())));
            return Err(TarantoolError::Protocol(message));
        }

        self.entries.insert(sync, PendingRequest { code, slot });
        Ok(())
    }

    /// Check whether `sync` is outstanding.
    #[inline]
    pub fn contains(&self, sync: u32) -> bool {
        self.entries.contains_key(&sync)
    }

    /// Remove and return the entry for `sync`.
    pub fn take(&mut self, sync: u32) -> Option<PendingRequest> {
        self.entries.remove(&sync)
    }

    /// Resolve `sync` with `value`. Returns false if no such entry.
    pub fn resolve(&mut self, sync: u32, value: Value) -> bool {
        match self.take(sync) {
            Some(entry) => {
                entry.complete(Ok(value));
                true
            }
            None => false,
        }
    }

    /// Fail `sync` with `error`. Returns false if no such entry.
    pub fn fail(&mut self, sync: u32, error: TarantoolError) -> bool {
        match self.take(sync) {
            Some(entry) => {
                entry.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every entry with a fresh error from `make_error` and empty the
    /// registry. Returns the number of entries failed.
    pub fn fail_all<F>(&mut self, make_error: F) -> usize
    where
        F: Fn() -> TarantoolError,
    {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.complete(Err(make_error()));
        }
        count
    }

    /// Number of outstanding requests.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is outstanding.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outstanding ids in ascending order (for diagnostics).
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::response_channel;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let mut registry = PendingRegistry::new();
        let (slot, future) = response_channel();

        registry.register(1, RequestCode::Ping, slot).unwrap();
        assert!(registry.contains(1));
        assert_eq!(registry.len(), 1);

        assert!(registry.resolve(1, Value::from("pong")));
        assert!(registry.is_empty());
        assert_eq!(future.await.unwrap(), Value::from("pong"));
    }

    #[tokio::test]
    async fn test_fail_single_entry() {
        let mut registry = PendingRegistry::new();
        let (slot_a, future_a) = response_channel();
        let (slot_b, future_b) = response_channel();

        registry.register(1, RequestCode::Insert, slot_a).unwrap();
        registry.register(2, RequestCode::Insert, slot_b).unwrap();

        assert!(registry.fail(1, TarantoolError::Validation("x".into())));
        assert!(future_a.await.is_err());
        assert_eq!(registry.ids(), vec![2]);

        assert!(registry.resolve(2, Value::Nil));
        assert!(future_b.await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_sync_rejected() {
        let mut registry = PendingRegistry::new();
        let (first, first_future) = response_channel();
        let (second, second_future) = response_channel();

        registry.register(5, RequestCode::Ping, first).unwrap();
        assert!(registry.register(5, RequestCode::Ping, second).is_err());
        assert!(second_future.await.is_err());

        // Original entry still resolvable
        assert!(registry.resolve(5, Value::Nil));
        assert!(first_future.await.is_ok());
    }

    #[test]
    fn test_unknown_sync() {
        let mut registry = PendingRegistry::new();
        assert!(!registry.resolve(9, Value::Nil));
        assert!(!registry.fail(9, TarantoolError::ConnectionClosed));
        assert!(registry.take(9).is_none());
    }

    #[tokio::test]
    async fn test_fail_all_empties_registry() {
        let mut registry = PendingRegistry::new();
        let mut futures = Vec::new();
        for sync in 0..4 {
            let (slot, future) = response_channel();
            registry.register(sync, RequestCode::Select, slot).unwrap();
            futures.push(future);
        }

        assert_eq!(registry.fail_all(|| TarantoolError::ConnectionClosed), 4);
        assert!(registry.is_empty());

        for future in futures {
            assert!(matches!(
                future.await.unwrap_err(),
                TarantoolError::ConnectionClosed
            ));
        }
    }

    #[test]
    fn test_complete_after_caller_dropped() {
        let mut registry = PendingRegistry::new();
        let (slot, future) = response_channel();
        drop(future);

        registry.register(3, RequestCode::Ping, slot).unwrap();
        let entry = registry.take(3).unwrap();
        assert_eq!(entry.code(), RequestCode::Ping);
        assert!(!entry.complete(Ok(Value::Nil)));
    }
}
