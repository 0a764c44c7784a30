use crate::apdu::UnconfirmedRequestHeader;
use crate::encoding::primitives::{
    decode_app_enumerated, decode_app_object_id_raw, decode_app_unsigned, encode_app_enumerated,
    encode_app_object_id, encode_app_unsigned,
};
use crate::encoding::{reader::Reader, writer::Writer};
use crate::types::{ObjectId, Segmentation};
use crate::{DecodeError, EncodeError};

pub const SERVICE_I_AM: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IAmRequest {
    pub device_id: ObjectId,
    pub max_apdu_length: u32,
    pub segmentation: Segmentation,
    pub vendor_id: u32,
}

impl IAmRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_I_AM).encode(w)?;
        encode_app_object_id(w, self.device_id.raw())?;
        encode_app_unsigned(w, self.max_apdu_length)?;
        encode_app_enumerated(w, self.segmentation.to_u32())?;
        encode_app_unsigned(w, self.vendor_id)
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let device_id = ObjectId::from_raw(decode_app_object_id_raw(r)?);
        let max_apdu_length = decode_app_unsigned(r)?;
        let segmentation =
            Segmentation::from_u32(decode_app_enumerated(r)?).ok_or(DecodeError::InvalidValue)?;
        let vendor_id = decode_app_unsigned(r)?;
        Ok(Self {
            device_id,
            max_apdu_length,
            segmentation,
            vendor_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::IAmRequest;
    use crate::apdu::UnconfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType, Segmentation};

    #[test]
    fn i_am_roundtrip() {
        let req = IAmRequest {
            device_id: ObjectId::new(ObjectType::Device, 1000),
            max_apdu_length: 1476,
            segmentation: Segmentation::SegmentedBoth,
            vendor_id: 0,
        };
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        UnconfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(IAmRequest::decode_after_header(&mut r).unwrap(), req);
    }
}
