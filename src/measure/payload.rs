//! Random upload payloads.

use crate::errors::{ErrorKind, SpeedTestError};
use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;

/// Largest slice handed to the OS generator in one call.
pub const MAX_FILL_CHUNK: usize = 65_536;

/// `size` bytes from the operating system CSPRNG, so compressing proxies
/// cannot shrink the transfer.
pub fn random_payload(size: usize) -> Result<Bytes, SpeedTestError> {
    let mut buffer = vec![0u8; size];

    for chunk in buffer.chunks_mut(MAX_FILL_CHUNK) {
        OsRng.try_fill_bytes(chunk).map_err(|e| {
            SpeedTestError::new(
                ErrorKind::Unknown,
                format!("random generator unavailable: {}", e),
            )
        })?;
    }

    Ok(Bytes::from(buffer))
}
