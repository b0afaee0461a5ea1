//! Blob naming and deterministic blob contents.

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::error::{Result, TransferError};

/// Returns the name of the blob with the given size and index.
///
/// Download fixtures use index `0`; uploads use the claimed work item index, which starts at `1`,
/// so uploads never overwrite a fixture.
pub fn blob_name(blob_size: u64, index: usize) -> String {
    format!("blob-{blob_size}-{index}")
}

/// Fills `buffer` with pseudo-random bytes.
///
/// The RNG is seeded from the buffer length, so buffers of equal size always receive the same
/// contents. This makes fixtures reproducible across processes.
pub fn fill_buffer(buffer: &mut [u8]) {
    let mut rng = SmallRng::seed_from_u64(buffer.len() as u64);
    rng.fill_bytes(buffer);
}

/// Allocates a zeroed buffer of `size` bytes.
///
/// Unlike `vec![0; size]`, running out of memory is reported as a [`TransferError::Setup`]
/// instead of aborting the process.
pub fn allocate(size: u64) -> Result<Vec<u8>> {
    let out_of_memory = || TransferError::Setup(format!("failed to allocate {size} bytes"));

    let len = usize::try_from(size).map_err(|_| out_of_memory())?;
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| out_of_memory())?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Allocates a buffer of `size` bytes filled by [`fill_buffer`].
pub fn random_payload(size: u64) -> Result<Vec<u8>> {
    let mut buffer = allocate(size)?;
    fill_buffer(&mut buffer);
    Ok(buffer)
}
