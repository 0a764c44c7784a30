use crate::apdu::UnconfirmedRequestHeader;
use crate::encoding::primitives::encode_ctx_unsigned;
use crate::encoding::{reader::Reader, writer::Writer};
use crate::services::decode_optional_ctx_unsigned;
use crate::{DecodeError, EncodeError};

pub const SERVICE_WHO_IS: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhoIsRequest {
    pub low_limit: Option<u32>,
    pub high_limit: Option<u32>,
}

impl WhoIsRequest {
    pub const fn global() -> Self {
        Self {
            low_limit: None,
            high_limit: None,
        }
    }

    pub const fn range(low: u32, high: u32) -> Self {
        Self {
            low_limit: Some(low),
            high_limit: Some(high),
        }
    }

    /// Whether a device with the given instance should answer.
    pub fn covers(&self, instance: u32) -> bool {
        match (self.low_limit, self.high_limit) {
            (Some(low), Some(high)) => (low..=high).contains(&instance),
            _ => true,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_WHO_IS).encode(w)?;

        if let Some(low) = self.low_limit {
            encode_ctx_unsigned(w, 0, low)?;
        }
        if let Some(high) = self.high_limit {
            encode_ctx_unsigned(w, 1, high)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let low_limit = decode_optional_ctx_unsigned(r, 0)?;
        let high_limit = if low_limit.is_some() {
            Some(
                decode_optional_ctx_unsigned(r, 1)?.ok_or(DecodeError::Message(
                    "who-is high limit missing",
                ))?,
            )
        } else {
            None
        };
        Ok(Self {
            low_limit,
            high_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::WhoIsRequest;
    use crate::apdu::UnconfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};

    #[test]
    fn ranged_roundtrip() {
        let req = WhoIsRequest::range(1000, 1000);
        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        UnconfirmedRequestHeader::decode(&mut r).unwrap();
        let dec = WhoIsRequest::decode_after_header(&mut r).unwrap();
        assert_eq!(dec, req);
        assert!(dec.covers(1000));
        assert!(!dec.covers(999));
    }

    #[test]
    fn global_covers_everything() {
        let req = WhoIsRequest::global();
        assert!(req.covers(0));
        assert!(req.covers(0x3F_FFFE));
    }
}
