use crate::echo::requests::{common_headers, Request};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::borrow::Cow;

/// Opaque upload sink. The body is supplied by the caller.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Upload;

impl Request for Upload {
    const METHOD: Method = Method::POST;

    fn endpoint(&self) -> Cow<'_, str> {
        "/__up".into()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = common_headers();

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        headers
    }
}
