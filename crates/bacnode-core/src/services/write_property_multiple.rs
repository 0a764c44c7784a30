#[cfg(feature = "alloc")]
use crate::apdu::ConfirmedRequestHeader;
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{encode_ctx_object_id, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::value_codec::{decode_property_values, encode_property_value};
#[cfg(feature = "alloc")]
use crate::services::{
    decode_optional_ctx_unsigned, decode_required_ctx_object_id, decode_required_ctx_unsigned,
    expect_closing, expect_opening, peek_closing,
};
#[cfg(feature = "alloc")]
use crate::types::{ObjectId, PropertyId, PropertyValue};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_WRITE_PROPERTY_MULTIPLE: u8 = 0x10;

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyWriteSpec {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: PropertyValue,
    pub priority: Option<u8>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAccessSpecification {
    pub object_id: ObjectId,
    pub writes: Vec<PropertyWriteSpec>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyMultipleRequest {
    pub specifications: Vec<WriteAccessSpecification>,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl WritePropertyMultipleRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_WRITE_PROPERTY_MULTIPLE)
            .encode(w)?;
        for spec in &self.specifications {
            encode_ctx_object_id(w, 0, spec.object_id.raw())?;
            Tag::Opening { tag_num: 1 }.encode(w)?;
            for write in &spec.writes {
                encode_ctx_unsigned(w, 0, write.property_id.to_u32())?;
                if let Some(idx) = write.array_index {
                    encode_ctx_unsigned(w, 1, idx)?;
                }
                Tag::Opening { tag_num: 2 }.encode(w)?;
                encode_property_value(w, &write.value)?;
                Tag::Closing { tag_num: 2 }.encode(w)?;
                if let Some(priority) = write.priority {
                    encode_ctx_unsigned(w, 3, priority as u32)?;
                }
            }
            Tag::Closing { tag_num: 1 }.encode(w)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let mut specifications = Vec::new();
        while !r.is_empty() {
            let object_id = decode_required_ctx_object_id(r, 0)?;
            expect_opening(r, 1)?;
            let mut writes = Vec::new();
            while !peek_closing(r, 1) {
                let property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 0)?);
                let array_index = decode_optional_ctx_unsigned(r, 1)?;
                expect_opening(r, 2)?;
                let mut values = decode_property_values(r, 2)?;
                expect_closing(r, 2)?;
                let value = if values.len() == 1 {
                    values.remove(0)
                } else {
                    PropertyValue::List(values)
                };
                let priority = match decode_optional_ctx_unsigned(r, 3)? {
                    Some(p) if (1..=16).contains(&p) => Some(p as u8),
                    Some(_) => return Err(DecodeError::InvalidValue),
                    None => None,
                };
                writes.push(PropertyWriteSpec {
                    property_id,
                    array_index,
                    value,
                    priority,
                });
            }
            expect_closing(r, 1)?;
            specifications.push(WriteAccessSpecification { object_id, writes });
        }
        if specifications.is_empty() {
            return Err(DecodeError::Message("empty write access list"));
        }
        Ok(Self {
            specifications,
            invoke_id,
        })
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{PropertyWriteSpec, WriteAccessSpecification, WritePropertyMultipleRequest};
    use crate::apdu::ConfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
    use alloc::vec;

    #[test]
    fn request_roundtrip() {
        let req = WritePropertyMultipleRequest {
            specifications: vec![WriteAccessSpecification {
                object_id: ObjectId::new(ObjectType::AnalogValue, 2),
                writes: vec![
                    PropertyWriteSpec {
                        property_id: PropertyId::PresentValue,
                        array_index: None,
                        value: PropertyValue::Real(19.5),
                        priority: Some(10),
                    },
                    PropertyWriteSpec {
                        property_id: PropertyId::CovIncrement,
                        array_index: None,
                        value: PropertyValue::Real(0.5),
                        priority: None,
                    },
                ],
            }],
            invoke_id: 21,
        };
        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        let dec =
            WritePropertyMultipleRequest::decode_after_header(&mut r, header.invoke_id).unwrap();
        assert_eq!(dec, req);
    }
}
