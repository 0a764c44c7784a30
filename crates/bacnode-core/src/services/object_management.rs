#[cfg(feature = "alloc")]
use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{decode_unsigned, encode_ctx_object_id, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::value_codec::{decode_property_values, encode_property_value};
#[cfg(feature = "alloc")]
use crate::services::{expect_closing, expect_opening, peek_closing};
#[cfg(feature = "alloc")]
use crate::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_CREATE_OBJECT: u8 = 0x0A;
pub const SERVICE_DELETE_OBJECT: u8 = 0x0B;

/// The object specifier of a CreateObject request: either a bare type
/// (server picks the instance) or a full object identifier.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectSpecifier {
    ObjectType(ObjectType),
    ObjectId(ObjectId),
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct InitialPropertyValue {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: PropertyValue,
    pub priority: Option<u8>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct CreateObjectRequest {
    pub specifier: ObjectSpecifier,
    pub initial_values: Vec<InitialPropertyValue>,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl CreateObjectRequest {
    pub fn by_type(object_type: ObjectType, invoke_id: u8) -> Self {
        Self {
            specifier: ObjectSpecifier::ObjectType(object_type),
            initial_values: Vec::new(),
            invoke_id,
        }
    }

    pub fn by_id(object_id: ObjectId, invoke_id: u8) -> Self {
        Self {
            specifier: ObjectSpecifier::ObjectId(object_id),
            initial_values: Vec::new(),
            invoke_id,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_CREATE_OBJECT).encode(w)?;
        Tag::Opening { tag_num: 0 }.encode(w)?;
        match self.specifier {
            ObjectSpecifier::ObjectType(t) => encode_ctx_unsigned(w, 0, t.to_u16() as u32)?,
            ObjectSpecifier::ObjectId(id) => encode_ctx_object_id(w, 1, id.raw())?,
        }
        Tag::Closing { tag_num: 0 }.encode(w)?;
        if !self.initial_values.is_empty() {
            Tag::Opening { tag_num: 1 }.encode(w)?;
            for init in &self.initial_values {
                encode_ctx_unsigned(w, 0, init.property_id.to_u32())?;
                if let Some(idx) = init.array_index {
                    encode_ctx_unsigned(w, 1, idx)?;
                }
                Tag::Opening { tag_num: 2 }.encode(w)?;
                encode_property_value(w, &init.value)?;
                Tag::Closing { tag_num: 2 }.encode(w)?;
                if let Some(priority) = init.priority {
                    encode_ctx_unsigned(w, 3, priority as u32)?;
                }
            }
            Tag::Closing { tag_num: 1 }.encode(w)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        expect_opening(r, 0)?;
        let specifier = match Tag::decode(r)? {
            Tag::Context { tag_num: 0, len } => {
                let raw = decode_unsigned(r, len as usize)?;
                if raw > u16::MAX as u32 {
                    return Err(DecodeError::InvalidValue);
                }
                ObjectSpecifier::ObjectType(ObjectType::from_u16(raw as u16))
            }
            Tag::Context { tag_num: 1, len: 4 } => {
                ObjectSpecifier::ObjectId(ObjectId::from_raw(r.read_be_u32()?))
            }
            _ => return Err(DecodeError::UnexpectedTag),
        };
        expect_closing(r, 0)?;

        let mut initial_values = Vec::new();
        if !r.is_empty() {
            expect_opening(r, 1)?;
            while !peek_closing(r, 1) {
                let property_id = PropertyId::from_u32(
                    crate::services::decode_required_ctx_unsigned(r, 0)?,
                );
                let array_index = crate::services::decode_optional_ctx_unsigned(r, 1)?;
                expect_opening(r, 2)?;
                let mut values = decode_property_values(r, 2)?;
                expect_closing(r, 2)?;
                let value = if values.len() == 1 {
                    values.remove(0)
                } else {
                    PropertyValue::List(values)
                };
                let priority = crate::services::decode_optional_ctx_unsigned(r, 3)?
                    .map(|p| p as u8);
                initial_values.push(InitialPropertyValue {
                    property_id,
                    array_index,
                    value,
                    priority,
                });
            }
            expect_closing(r, 1)?;
        }
        Ok(Self {
            specifier,
            initial_values,
            invoke_id,
        })
    }
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateObjectAck {
    pub object_id: ObjectId,
}

#[cfg(feature = "alloc")]
impl CreateObjectAck {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_CREATE_OBJECT).encode(w)?;
        crate::encoding::primitives::encode_app_object_id(w, self.object_id.raw())
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            object_id: ObjectId::from_raw(
                crate::encoding::primitives::decode_app_object_id_raw(r)?,
            ),
        })
    }
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteObjectRequest {
    pub object_id: ObjectId,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl DeleteObjectRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_DELETE_OBJECT).encode(w)?;
        crate::encoding::primitives::encode_app_object_id(w, self.object_id.raw())
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        Ok(Self {
            object_id: ObjectId::from_raw(
                crate::encoding::primitives::decode_app_object_id_raw(r)?,
            ),
            invoke_id,
        })
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{CreateObjectRequest, DeleteObjectRequest, ObjectSpecifier};
    use crate::apdu::ConfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType};

    #[test]
    fn create_by_type_roundtrip() {
        let req = CreateObjectRequest::by_type(ObjectType::AnalogValue, 3);
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        let dec = CreateObjectRequest::decode_after_header(&mut r, header.invoke_id).unwrap();
        assert_eq!(
            dec.specifier,
            ObjectSpecifier::ObjectType(ObjectType::AnalogValue)
        );
    }

    #[test]
    fn create_by_id_roundtrip() {
        let req = CreateObjectRequest::by_id(ObjectId::new(ObjectType::AnalogValue, 55), 4);
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        let dec = CreateObjectRequest::decode_after_header(&mut r, header.invoke_id).unwrap();
        assert_eq!(
            dec.specifier,
            ObjectSpecifier::ObjectId(ObjectId::new(ObjectType::AnalogValue, 55))
        );
    }

    #[test]
    fn delete_roundtrip() {
        let req = DeleteObjectRequest {
            object_id: ObjectId::new(ObjectType::AnalogValue, 55),
            invoke_id: 5,
        };
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            DeleteObjectRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }
}
