use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
use crate::encoding::{
    primitives::{decode_unsigned, encode_ctx_object_id, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::value_codec::decode_application_data_value;
use crate::services::{decode_optional_ctx_unsigned, decode_required_ctx_object_id};
use crate::types::{DataValue, ObjectId, PropertyId};
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use crate::services::value_codec::encode_property_value;
#[cfg(feature = "alloc")]
use crate::types::PropertyValue;

pub const SERVICE_READ_PROPERTY: u8 = 0x0C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPropertyRequest {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub invoke_id: u8,
}

impl ReadPropertyRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_READ_PROPERTY).encode(w)?;
        encode_ctx_object_id(w, 0, self.object_id.raw())?;
        encode_ctx_unsigned(w, 1, self.property_id.to_u32())?;
        if let Some(idx) = self.array_index {
            encode_ctx_unsigned(w, 2, idx)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let object_id = decode_required_ctx_object_id(r, 0)?;
        let property_id = PropertyId::from_u32(crate::services::decode_required_ctx_unsigned(r, 1)?);
        let array_index = decode_optional_ctx_unsigned(r, 2)?;
        Ok(Self {
            object_id,
            property_id,
            array_index,
            invoke_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyAck<'a> {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: DataValue<'a>,
}

impl<'a> ReadPropertyAck<'a> {
    /// Encode a full Complex-ACK frame for a served ReadProperty.
    #[cfg(feature = "alloc")]
    pub fn encode_response(
        w: &mut Writer<'_>,
        invoke_id: u8,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
        value: &PropertyValue,
    ) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_READ_PROPERTY).encode(w)?;
        encode_ctx_object_id(w, 0, object_id.raw())?;
        encode_ctx_unsigned(w, 1, property_id.to_u32())?;
        if let Some(idx) = array_index {
            encode_ctx_unsigned(w, 2, idx)?;
        }
        Tag::Opening { tag_num: 3 }.encode(w)?;
        encode_property_value(w, value)?;
        Tag::Closing { tag_num: 3 }.encode(w)
    }

    pub fn decode_after_header(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let object_id = match Tag::decode(r)? {
            Tag::Context { tag_num: 0, len } => {
                ObjectId::from_raw(decode_unsigned(r, len as usize)?)
            }
            _ => return Err(DecodeError::UnexpectedTag),
        };

        let property_id = match Tag::decode(r)? {
            Tag::Context { tag_num: 1, len } => {
                PropertyId::from_u32(decode_unsigned(r, len as usize)?)
            }
            _ => return Err(DecodeError::UnexpectedTag),
        };

        let next = Tag::decode(r)?;
        let (array_index, value_start_tag) = match next {
            Tag::Context { tag_num: 2, len } => {
                let idx = decode_unsigned(r, len as usize)?;
                (Some(idx), Tag::decode(r)?)
            }
            other => (None, other),
        };

        if value_start_tag != (Tag::Opening { tag_num: 3 }) {
            return Err(DecodeError::UnexpectedTag);
        }

        let value = decode_application_data_value(r)?;

        match Tag::decode(r)? {
            Tag::Closing { tag_num: 3 } => {}
            _ => return Err(DecodeError::UnexpectedTag),
        }

        Ok(Self {
            object_id,
            property_id,
            array_index,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ReadPropertyAck, ReadPropertyRequest, SERVICE_READ_PROPERTY};
    use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{DataValue, ObjectId, ObjectType, PropertyId, PropertyValue};

    #[test]
    fn request_roundtrip() {
        let req = ReadPropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogInput, 1),
            property_id: PropertyId::PresentValue,
            array_index: Some(2),
            invoke_id: 7,
        };
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(header.service_choice, SERVICE_READ_PROPERTY);
        let dec = ReadPropertyRequest::decode_after_header(&mut r, header.invoke_id).unwrap();
        assert_eq!(dec, req);
    }

    #[test]
    fn response_roundtrip() {
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        ReadPropertyAck::encode_response(
            &mut w,
            3,
            ObjectId::new(ObjectType::AnalogInput, 1),
            PropertyId::PresentValue,
            None,
            &PropertyValue::Real(60.0),
        )
        .unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(header.invoke_id, 3);
        let ack = ReadPropertyAck::decode_after_header(&mut r).unwrap();
        assert_eq!(ack.value, DataValue::Real(60.0));
    }
}
