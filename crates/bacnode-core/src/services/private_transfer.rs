use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader, UnconfirmedRequestHeader};
use crate::encoding::{
    primitives::encode_ctx_unsigned,
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::{decode_required_ctx_unsigned, expect_closing, peek_opening};
use crate::{DecodeError, EncodeError};

pub const SERVICE_CONFIRMED_PRIVATE_TRANSFER: u8 = 0x12;
pub const SERVICE_UNCONFIRMED_PRIVATE_TRANSFER: u8 = 0x04;

/// Vendor pass-through. Parameters are carried as opaque bytes between the
/// opening/closing tag pair; their interpretation is the vendor callback's
/// business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateTransferRequest<'a> {
    pub vendor_id: u32,
    pub service_number: u32,
    pub parameters: Option<&'a [u8]>,
    pub invoke_id: u8,
}

impl<'a> PrivateTransferRequest<'a> {
    fn encode_payload(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        encode_ctx_unsigned(w, 0, self.vendor_id)?;
        encode_ctx_unsigned(w, 1, self.service_number)?;
        if let Some(parameters) = self.parameters {
            Tag::Opening { tag_num: 2 }.encode(w)?;
            w.write_all(parameters)?;
            Tag::Closing { tag_num: 2 }.encode(w)?;
        }
        Ok(())
    }

    pub fn encode_confirmed(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_CONFIRMED_PRIVATE_TRANSFER)
            .encode(w)?;
        self.encode_payload(w)
    }

    pub fn encode_unconfirmed(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_UNCONFIRMED_PRIVATE_TRANSFER).encode(w)?;
        self.encode_payload(w)
    }

    pub fn decode_after_header(r: &mut Reader<'a>, invoke_id: u8) -> Result<Self, DecodeError> {
        let vendor_id = decode_required_ctx_unsigned(r, 0)?;
        let service_number = decode_required_ctx_unsigned(r, 1)?;
        let parameters = if peek_opening(r, 2) {
            Tag::decode(r)?;
            let parameters = read_until_closing(r, 2)?;
            expect_closing(r, 2)?;
            Some(parameters)
        } else {
            None
        };
        Ok(Self {
            vendor_id,
            service_number,
            parameters,
            invoke_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateTransferAck<'a> {
    pub vendor_id: u32,
    pub service_number: u32,
    pub result_block: Option<&'a [u8]>,
}

impl<'a> PrivateTransferAck<'a> {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_CONFIRMED_PRIVATE_TRANSFER).encode(w)?;
        encode_ctx_unsigned(w, 0, self.vendor_id)?;
        encode_ctx_unsigned(w, 1, self.service_number)?;
        if let Some(result_block) = self.result_block {
            Tag::Opening { tag_num: 2 }.encode(w)?;
            w.write_all(result_block)?;
            Tag::Closing { tag_num: 2 }.encode(w)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let vendor_id = decode_required_ctx_unsigned(r, 0)?;
        let service_number = decode_required_ctx_unsigned(r, 1)?;
        let result_block = if peek_opening(r, 2) {
            Tag::decode(r)?;
            let block = read_until_closing(r, 2)?;
            expect_closing(r, 2)?;
            Some(block)
        } else {
            None
        };
        Ok(Self {
            vendor_id,
            service_number,
            result_block,
        })
    }
}

/// Slice off raw bytes up to (not including) the matching closing tag.
/// Vendor parameter blocks are opaque, so nesting is tracked purely by
/// scanning tag framing.
fn read_until_closing<'a>(r: &mut Reader<'a>, tag_num: u8) -> Result<&'a [u8], DecodeError> {
    let mut probe = *r;
    let mut depth = 0u32;
    let mut len = 0usize;
    loop {
        let before = probe.remaining();
        let tag = Tag::decode(&mut probe)?;
        match tag {
            Tag::Closing { tag_num: t } if t == tag_num && depth == 0 => {
                let out = r.read_exact(len)?;
                return Ok(out);
            }
            Tag::Opening { .. } => depth += 1,
            Tag::Closing { .. } => depth = depth.saturating_sub(1),
            Tag::Application { len: l, .. } | Tag::Context { len: l, .. } => {
                probe.read_exact(l as usize)?;
            }
        }
        len += before - probe.remaining();
    }
}

#[cfg(test)]
mod tests {
    use super::{PrivateTransferAck, PrivateTransferRequest};
    use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
    use crate::encoding::{reader::Reader, writer::Writer};

    #[test]
    fn confirmed_roundtrip_with_parameters() {
        // Parameters: one application-tagged unsigned.
        let params = [0x21, 0x07];
        let req = PrivateTransferRequest {
            vendor_id: 260,
            service_number: 9,
            parameters: Some(&params),
            invoke_id: 4,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode_confirmed(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            PrivateTransferRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }

    #[test]
    fn ack_roundtrip_without_result() {
        let ack = PrivateTransferAck {
            vendor_id: 260,
            service_number: 9,
            result_block: None,
        };
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        ack.encode_response(&mut w, 4).unwrap();

        let mut r = Reader::new(w.as_written());
        ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(PrivateTransferAck::decode_after_header(&mut r).unwrap(), ack);
    }
}
