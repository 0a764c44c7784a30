use crate::apdu::ConfirmedRequestHeader;
use crate::encoding::{
    primitives::{encode_ctx_object_id, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::value_codec::{decode_application_data_value, encode_application_data_value};
use crate::services::{
    decode_optional_ctx_unsigned, decode_required_ctx_object_id, decode_required_ctx_unsigned,
    expect_closing, expect_opening,
};
use crate::types::{DataValue, ObjectId, PropertyId};
use crate::{DecodeError, EncodeError};

pub const SERVICE_WRITE_PROPERTY: u8 = 0x0F;

/// Commanded writes default to the lowest priority slot.
pub const DEFAULT_WRITE_PRIORITY: u8 = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyRequest<'a> {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: DataValue<'a>,
    pub priority: Option<u8>,
    pub invoke_id: u8,
}

impl<'a> WritePropertyRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_WRITE_PROPERTY).encode(w)?;
        encode_ctx_object_id(w, 0, self.object_id.raw())?;
        encode_ctx_unsigned(w, 1, self.property_id.to_u32())?;
        if let Some(idx) = self.array_index {
            encode_ctx_unsigned(w, 2, idx)?;
        }
        Tag::Opening { tag_num: 3 }.encode(w)?;
        encode_application_data_value(w, &self.value)?;
        Tag::Closing { tag_num: 3 }.encode(w)?;
        if let Some(priority) = self.priority {
            encode_ctx_unsigned(w, 4, priority as u32)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'a>, invoke_id: u8) -> Result<Self, DecodeError> {
        let object_id = decode_required_ctx_object_id(r, 0)?;
        let property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 1)?);
        let array_index = decode_optional_ctx_unsigned(r, 2)?;
        expect_opening(r, 3)?;
        let value = decode_application_data_value(r)?;
        expect_closing(r, 3)?;
        let priority = match decode_optional_ctx_unsigned(r, 4)? {
            Some(p) if p >= 1 && p <= 16 => Some(p as u8),
            Some(_) => return Err(DecodeError::InvalidValue),
            None => None,
        };
        Ok(Self {
            object_id,
            property_id,
            array_index,
            value,
            priority,
            invoke_id,
        })
    }
}

/// Encode a WriteProperty request around an owned value.
#[cfg(feature = "alloc")]
pub fn encode_write_property_request(
    w: &mut Writer<'_>,
    invoke_id: u8,
    object_id: ObjectId,
    property_id: PropertyId,
    array_index: Option<u32>,
    value: &crate::types::PropertyValue,
    priority: Option<u8>,
) -> Result<(), EncodeError> {
    ConfirmedRequestHeader::simple(invoke_id, SERVICE_WRITE_PROPERTY).encode(w)?;
    encode_ctx_object_id(w, 0, object_id.raw())?;
    encode_ctx_unsigned(w, 1, property_id.to_u32())?;
    if let Some(idx) = array_index {
        encode_ctx_unsigned(w, 2, idx)?;
    }
    Tag::Opening { tag_num: 3 }.encode(w)?;
    crate::services::value_codec::encode_property_value(w, value)?;
    Tag::Closing { tag_num: 3 }.encode(w)?;
    if let Some(priority) = priority {
        encode_ctx_unsigned(w, 4, priority as u32)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::WritePropertyRequest;
    use crate::apdu::ConfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{DataValue, ObjectId, ObjectType, PropertyId};

    #[test]
    fn request_roundtrip_with_priority() {
        let req = WritePropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogValue, 1),
            property_id: PropertyId::PresentValue,
            array_index: None,
            value: DataValue::Real(72.5),
            priority: Some(8),
            invoke_id: 11,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        let dec = WritePropertyRequest::decode_after_header(&mut r, header.invoke_id).unwrap();
        assert_eq!(dec, req);
    }

    #[test]
    fn relinquish_is_null_write() {
        let req = WritePropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogValue, 1),
            property_id: PropertyId::PresentValue,
            array_index: None,
            value: DataValue::Null,
            priority: Some(8),
            invoke_id: 12,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        let dec = WritePropertyRequest::decode_after_header(&mut r, header.invoke_id).unwrap();
        assert_eq!(dec.value, DataValue::Null);
        assert_eq!(dec.priority, Some(8));
    }

    #[test]
    fn out_of_range_priority_rejected() {
        let req = WritePropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogValue, 1),
            property_id: PropertyId::PresentValue,
            array_index: None,
            value: DataValue::Real(1.0),
            priority: Some(17),
            invoke_id: 1,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert!(WritePropertyRequest::decode_after_header(&mut r, header.invoke_id).is_err());
    }
}
