use crate::echo::requests::Request;
use std::borrow::Cow;

/// Zero-byte download used as a round-trip probe.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Ping;

impl Request for Ping {
    fn endpoint(&self) -> Cow<'_, str> {
        "/__down?bytes=0".into()
    }
}
