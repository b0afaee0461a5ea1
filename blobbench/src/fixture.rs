//! Populates source blobs for download trials.
//!
//! [`Fixtures`] remembers which blobs it already uploaded through which transport, so trials
//! that reuse a blob size only pay for seeding once per process.

use std::collections::HashSet;
use std::sync::Mutex;

use thiserror::Error;

use crate::payload::{blob_name, random_payload};
use crate::pool::run_workers;
use crate::transport::Transport;

/// Number of workers used to upload missing fixture blobs.
pub const DEFAULT_SEED_CONCURRENCY: usize = 32;

/// Seeding a fixture blob failed.
#[derive(Debug, Error)]
#[error("failed to populate {missing} fixture blob(s) of {blob_size} bytes via `{transport}`")]
pub struct FixtureError {
    /// Name of the transport used for seeding.
    pub transport: String,
    /// Size of the fixture blobs.
    pub blob_size: u64,
    /// Number of blobs that were missing before seeding.
    pub missing: usize,
}

/// Process-scoped cache of populated fixture blobs.
#[derive(Debug)]
pub struct Fixtures {
    concurrency: usize,
    populated: Mutex<HashSet<(String, String)>>,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self::new(DEFAULT_SEED_CONCURRENCY)
    }
}

impl Fixtures {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            populated: Mutex::new(HashSet::new()),
        }
    }

    /// Returns `true` if the blob has already been populated through the given transport.
    pub fn is_populated(&self, transport: &str, blob_name: &str) -> bool {
        let key = (transport.to_owned(), blob_name.to_owned());
        self.populated.lock().unwrap().contains(&key)
    }

    /// Makes sure blobs `0..count` of the given size exist behind `transport`.
    ///
    /// Only blobs that this instance has not seeded before are uploaded. All of them carry the
    /// deterministic contents of [`random_payload`].
    pub fn ensure_blobs(
        &self,
        transport: &dyn Transport,
        blob_size: u64,
        count: usize,
    ) -> Result<(), FixtureError> {
        let missing: Vec<usize> = (0..count)
            .filter(|&index| !self.is_populated(transport.name(), &blob_name(blob_size, index)))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            transport = transport.name(),
            blob_size,
            missing = missing.len(),
            "populating fixture blobs"
        );

        let failed = match random_payload(blob_size) {
            Ok(content) => {
                let outcome = run_workers(
                    self.concurrency.min(missing.len()),
                    missing.len(),
                    |_| Ok(()),
                    |_, claimed| {
                        let name = blob_name(blob_size, missing[claimed - 1]);
                        transport.upload(&name, &content)?;

                        self.populated
                            .lock()
                            .unwrap()
                            .insert((transport.name().to_owned(), name));
                        Ok(())
                    },
                );
                outcome.failure_observed
            }
            Err(error) => {
                tracing::debug!(error = &error as &dyn std::error::Error);
                true
            }
        };

        if failed {
            tracing::error!(
                transport = transport.name(),
                blob_size,
                "failed when initialising test resource"
            );
            return Err(FixtureError {
                transport: transport.name().to_owned(),
                blob_size,
                missing: missing.len(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::transport::InMemoryTransport;

    use super::*;

    #[test]
    fn seeds_missing_blobs_once() {
        let transport = InMemoryTransport::new("memory");
        let fixtures = Fixtures::new(4);

        fixtures.ensure_blobs(&transport, 16, 3).unwrap();
        assert_eq!(transport.len(), 3);
        assert!(fixtures.is_populated("memory", "blob-16-2"));
        assert_eq!(
            transport.get_stored("blob-16-0").unwrap().as_ref(),
            random_payload(16).unwrap().as_slice()
        );

        // remove all blobs behind the cache's back: nothing gets re-uploaded
        let other = InMemoryTransport::new("memory");
        fixtures.ensure_blobs(&other, 16, 3).unwrap();
        assert!(other.is_empty());

        fixtures.ensure_blobs(&other, 16, 4).unwrap();
        assert_eq!(other.len(), 1);
        assert!(other.get_stored("blob-16-3").is_some());
    }

    #[test]
    fn tracks_transports_separately() {
        let fixtures = Fixtures::default();
        let first = InMemoryTransport::new("first");
        let second = InMemoryTransport::new("second");

        fixtures.ensure_blobs(&first, 8, 1).unwrap();
        fixtures.ensure_blobs(&second, 8, 1).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
