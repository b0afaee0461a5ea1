//! Transports move single blobs to and from the storage service under test.
//!
//! All transports are interchangeable: they address the same logical namespace of named blobs
//! through different client stacks. The benchmark engine only ever talks to the [`Transport`]
//! trait.

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::{HttpClient, TransportConfig};
use crate::error::Result;

mod http;
mod in_memory;
mod local_fs;

pub use http::{AsyncHttpTransport, BlockingHttpTransport};
pub use in_memory::InMemoryTransport;
pub use local_fs::LocalFsTransport;

/// A shared, type-erased [`Transport`] instance.
pub type SharedTransport = Arc<dyn Transport>;

/// Capability to upload and download a single named blob of known size.
///
/// Implementations are shared between all worker threads of a trial and between all trials that
/// reuse them, so every method takes `&self`.
pub trait Transport: Debug + Send + Sync + 'static {
    /// The transport name, used in logs and reports.
    fn name(&self) -> &str;

    /// Re-provisions internal resources for the given number of concurrent workers.
    ///
    /// This is called once before every trial. Calling it repeatedly with the same concurrency
    /// must leave the transport in the same state as a single call.
    fn reset(&self, _concurrency: usize) -> Result<()> {
        Ok(())
    }

    /// Downloads the blob `name` into `buffer`.
    ///
    /// The blob must be exactly `buffer.len()` bytes long.
    fn download(&self, name: &str, buffer: &mut [u8]) -> Result<()>;

    /// Uploads the contents of `buffer` as blob `name`, replacing any existing blob.
    fn upload(&self, name: &str, buffer: &[u8]) -> Result<()>;
}

/// Creates the transport described by the given configuration.
pub fn build_transport(config: &TransportConfig) -> SharedTransport {
    let name = config.name();
    match config {
        TransportConfig::Http {
            endpoint,
            container,
            client: HttpClient::Blocking,
        } => Arc::new(BlockingHttpTransport::new(name, endpoint, container)),
        TransportConfig::Http {
            endpoint,
            container,
            client: HttpClient::Async,
        } => Arc::new(AsyncHttpTransport::new(name, endpoint, container)),
        TransportConfig::FileSystem { path } => Arc::new(LocalFsTransport::new(name, path)),
        TransportConfig::Memory { latency } => {
            Arc::new(InMemoryTransport::new(name).with_latency(*latency))
        }
    }
}
