//! Access to the remote echo service.
//!
//! The measurement code only talks to the [`Transport`] trait, which covers
//! the three operations the service offers: a zero-byte probe, a bulk
//! download streamed chunk by chunk, and an opaque upload sink.
//! [`EchoClient`] is the HTTP implementation.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub(crate) mod requests;

pub use client::EchoClient;

use crate::errors::SpeedTestError;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::future::Future;

/// Body chunks of a bulk download, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, SpeedTestError>>;

/// The echo service operations the probers rely on.
///
/// Implementations must not retry internally; failures are handled by the
/// callers' own policies.
pub trait Transport: Send + Sync {
    /// One round trip to the zero-byte endpoint. Resolves once the response
    /// body has been fully consumed.
    fn ping(&self) -> impl Future<Output = Result<(), SpeedTestError>> + Send;

    /// Open a download of `bytes` bytes and return its body as a stream.
    fn download(
        &self,
        bytes: u64,
    ) -> impl Future<Output = Result<ByteStream, SpeedTestError>> + Send;

    /// POST `payload` to the upload sink and wait for the response.
    fn upload(
        &self,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), SpeedTestError>> + Send;
}
