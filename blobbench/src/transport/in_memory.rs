//! In-memory transport for dry runs and tests.
//!
//! Blobs live in a process-local `HashMap`, so this measures nothing but the engine itself and
//! the optional simulated latency. The transport is [`Clone`]; clones share the same store, so
//! tests can keep a handle for direct inspection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use super::Transport;
use crate::error::{Result, TransferError};

type Store = HashMap<String, Bytes>;

#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    name: String,
    latency: Duration,
    store: Arc<Mutex<Store>>,
}

impl InMemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: Duration::ZERO,
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sleeps for `latency` in every upload and download call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Returns a clone of the stored bytes, if present.
    pub fn get_stored(&self, name: &str) -> Option<Bytes> {
        self.store.lock().unwrap().get(name).cloned()
    }

    /// Returns the number of stored blobs.
    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    /// Returns `true` if no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.store.lock().unwrap().is_empty()
    }

    fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
    }
}

impl Transport for InMemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn download(&self, name: &str, buffer: &mut [u8]) -> Result<()> {
        self.simulate_latency();

        let bytes = self.get_stored(name).ok_or_else(|| TransferError::NotFound {
            name: name.to_owned(),
        })?;
        if bytes.len() != buffer.len() {
            return Err(TransferError::SizeMismatch {
                name: name.to_owned(),
                expected: buffer.len() as u64,
                actual: bytes.len() as u64,
            });
        }

        buffer.copy_from_slice(&bytes);
        Ok(())
    }

    fn upload(&self, name: &str, buffer: &[u8]) -> Result<()> {
        self.simulate_latency();

        self.store
            .lock()
            .unwrap()
            .insert(name.to_owned(), Bytes::copy_from_slice(buffer));
        Ok(())
    }
}
