//! Transports talking to a blob store over HTTP.
//!
//! Blobs are addressed as `{endpoint}/{container}/{name}`: a `PUT` with the raw body uploads a
//! blob, a `GET` downloads it. Both transports share this wire contract and only differ in the
//! client stack that drives the requests.

use std::sync::{Arc, RwLock};

use bytes::Bytes;
use reqwest::StatusCode;
use tokio::runtime::Runtime;

use super::Transport;
use crate::error::{Result, TransferError};

fn blob_url(endpoint: &str, container: &str, name: &str) -> String {
    format!("{}/{container}/{name}", endpoint.trim_end_matches('/'))
}

fn status_error(name: &str, status: StatusCode, body: String) -> TransferError {
    if status == StatusCode::NOT_FOUND {
        return TransferError::NotFound {
            name: name.to_owned(),
        };
    }

    let message = match body.trim() {
        "" => status.canonical_reason().unwrap_or("unknown").to_owned(),
        body => body.to_owned(),
    };
    TransferError::Status {
        status: status.as_u16(),
        message,
    }
}

fn copy_exact(name: &str, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
    if bytes.len() != buffer.len() {
        return Err(TransferError::SizeMismatch {
            name: name.to_owned(),
            expected: buffer.len() as u64,
            actual: bytes.len() as u64,
        });
    }
    buffer.copy_from_slice(bytes);
    Ok(())
}

fn not_initialized(transport: &str) -> TransferError {
    TransferError::Setup(format!("transport `{transport}` used before reset"))
}

/// Client state provisioned for one concurrency level.
#[derive(Debug)]
struct Provisioned<T> {
    concurrency: usize,
    inner: T,
}

/// HTTP transport using the blocking `reqwest` client.
///
/// Every [`reset`](Transport::reset) with a new concurrency level replaces the client, sizing its
/// idle connection pool to the number of workers.
#[derive(Debug)]
pub struct BlockingHttpTransport {
    name: String,
    endpoint: String,
    container: String,
    client: RwLock<Option<Provisioned<reqwest::blocking::Client>>>,
}

impl BlockingHttpTransport {
    pub fn new(name: impl Into<String>, endpoint: &str, container: &str) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.to_owned(),
            container: container.to_owned(),
            client: RwLock::new(None),
        }
    }

    fn client(&self) -> Result<reqwest::blocking::Client> {
        let guard = self.client.read().unwrap();
        let provisioned = guard.as_ref().ok_or_else(|| not_initialized(&self.name))?;
        Ok(provisioned.inner.clone())
    }
}

impl Transport for BlockingHttpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&self, concurrency: usize) -> Result<()> {
        let mut guard = self.client.write().unwrap();
        if guard.as_ref().is_some_and(|p| p.concurrency == concurrency) {
            return Ok(());
        }

        let client = reqwest::blocking::Client::builder()
            .pool_max_idle_per_host(concurrency)
            .build()?;
        *guard = Some(Provisioned {
            concurrency,
            inner: client,
        });

        tracing::debug!(transport = self.name, concurrency, "provisioned http client");
        Ok(())
    }

    fn download(&self, name: &str, buffer: &mut [u8]) -> Result<()> {
        let url = blob_url(&self.endpoint, &self.container, name);
        let response = self.client()?.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(name, status, response.text().unwrap_or_default()));
        }

        let bytes = response.bytes()?;
        copy_exact(name, &bytes, buffer)
    }

    fn upload(&self, name: &str, buffer: &[u8]) -> Result<()> {
        let url = blob_url(&self.endpoint, &self.container, name);
        let response = self
            .client()?
            .put(url)
            .body(Bytes::copy_from_slice(buffer))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(name, status, response.text().unwrap_or_default()));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AsyncStack {
    runtime: Arc<Runtime>,
    client: reqwest::Client,
}

/// HTTP transport using the async `reqwest` client on a dedicated tokio runtime.
///
/// Worker threads drive their requests with [`Runtime::block_on`]. Every
/// [`reset`](Transport::reset) with a new concurrency level rebuilds the runtime with one worker
/// thread per benchmark worker, together with a fresh connection pool.
#[derive(Debug)]
pub struct AsyncHttpTransport {
    name: String,
    endpoint: String,
    container: String,
    stack: RwLock<Option<Provisioned<AsyncStack>>>,
}

impl AsyncHttpTransport {
    pub fn new(name: impl Into<String>, endpoint: &str, container: &str) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.to_owned(),
            container: container.to_owned(),
            stack: RwLock::new(None),
        }
    }

    fn stack(&self) -> Result<(Arc<Runtime>, reqwest::Client)> {
        let guard = self.stack.read().unwrap();
        let provisioned = guard.as_ref().ok_or_else(|| not_initialized(&self.name))?;
        let AsyncStack { runtime, client } = &provisioned.inner;
        Ok((Arc::clone(runtime), client.clone()))
    }
}

impl Transport for AsyncHttpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&self, concurrency: usize) -> Result<()> {
        let mut guard = self.stack.write().unwrap();
        if guard.as_ref().is_some_and(|p| p.concurrency == concurrency) {
            return Ok(());
        }

        // Tear down the previous runtime before spawning a new set of threads.
        guard.take();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name(format!("{}-rt", self.name))
            .worker_threads(concurrency.max(1))
            .enable_all()
            .build()
            .map_err(|err| TransferError::Setup(err.to_string()))?;

        let client = {
            let _runtime_guard = runtime.enter();
            reqwest::Client::builder()
                .pool_max_idle_per_host(concurrency)
                .build()?
        };

        *guard = Some(Provisioned {
            concurrency,
            inner: AsyncStack {
                runtime: Arc::new(runtime),
                client,
            },
        });

        tracing::debug!(transport = self.name, concurrency, "provisioned http runtime");
        Ok(())
    }

    fn download(&self, name: &str, buffer: &mut [u8]) -> Result<()> {
        let url = blob_url(&self.endpoint, &self.container, name);
        let (runtime, client) = self.stack()?;

        let bytes = runtime.block_on(async move {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(name, status, body));
            }
            Ok(response.bytes().await?)
        })?;

        copy_exact(name, &bytes, buffer)
    }

    fn upload(&self, name: &str, buffer: &[u8]) -> Result<()> {
        let url = blob_url(&self.endpoint, &self.container, name);
        let body = Bytes::copy_from_slice(buffer);
        let (runtime, client) = self.stack()?;

        runtime.block_on(async move {
            let response = client.put(url).body(body).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(name, status, body));
            }
            Ok(())
        })
    }
}
