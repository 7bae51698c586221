//! Request descriptions for the echo service endpoints.

pub mod download;
pub mod ping;
pub mod upload;

pub(crate) use download::Download;
pub(crate) use ping::Ping;
pub(crate) use upload::Upload;

use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, USER_AGENT};
use reqwest::Method;
use std::borrow::Cow;

pub(crate) const UA: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION")
);

pub trait Request {
    const METHOD: Method = Method::GET;

    fn endpoint(&self) -> Cow<'_, str>;

    fn headers(&self) -> HeaderMap {
        common_headers()
    }
}

/// Headers every echo request carries.
pub(crate) fn common_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(UA));

    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    headers
}

impl<R: Request> Request for &R {
    const METHOD: Method = R::METHOD;

    fn endpoint(&self) -> Cow<'_, str> {
        (**self).endpoint()
    }

    fn headers(&self) -> HeaderMap {
        (**self).headers()
    }
}
