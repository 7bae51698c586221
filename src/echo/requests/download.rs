use crate::echo::requests::Request;
use std::borrow::Cow;

#[derive(Copy, Clone, Debug)]
pub(crate) struct Download {
    pub bytes: u64,
}

impl Request for Download {
    fn endpoint(&self) -> Cow<'_, str> {
        format!("/__down?bytes={}", self.bytes).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_carries_byte_count() {
        let request = Download { bytes: 25_000_000 };
        assert_eq!(request.endpoint(), "/__down?bytes=25000000");
    }
}
