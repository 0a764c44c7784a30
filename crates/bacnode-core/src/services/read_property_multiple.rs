#[cfg(feature = "alloc")]
use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{
        decode_app_enumerated, encode_app_enumerated, encode_ctx_object_id, encode_ctx_unsigned,
    },
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

pub const SERVICE_READ_PROPERTY_MULTIPLE: u8 = 0x0E;

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyReference {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAccessSpecification {
    pub object_id: ObjectId,
    pub property_references: Vec<PropertyReference>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyMultipleRequest {
    pub specifications: Vec<ReadAccessSpecification>,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl ReadPropertyMultipleRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_READ_PROPERTY_MULTIPLE)
            .encode(w)?;
        for spec in &self.specifications {
            encode_ctx_object_id(w, 0, spec.object_id.raw())?;
            Tag::Opening { tag_num: 1 }.encode(w)?;
            for prop in &spec.property_references {
                encode_ctx_unsigned(w, 0, prop.property_id.to_u32())?;
                if let Some(idx) = prop.array_index {
                    encode_ctx_unsigned(w, 1, idx)?;
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
            let mut property_references = Vec::new();
            while !peek_closing(r, 1) {
                let property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 0)?);
                let array_index = decode_optional_ctx_unsigned(r, 1)?;
                property_references.push(PropertyReference {
                    property_id,
                    array_index,
                });
            }
            expect_closing(r, 1)?;
            specifications.push(ReadAccessSpecification {
                object_id,
                property_references,
            });
        }
        if specifications.is_empty() {
            return Err(DecodeError::Message("empty read access list"));
        }
        Ok(Self {
            specifications,
            invoke_id,
        })
    }
}

/// Result for one property in a ReadPropertyMultiple response: either the
/// decoded values or a BACnet error pair. Partial failure never fails the
/// whole request.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAccessResult {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub result: Result<Vec<PropertyValue>, (u32, u32)>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAccessResult {
    pub object_id: ObjectId,
    pub results: Vec<PropertyAccessResult>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyMultipleAck {
    pub results: Vec<ReadAccessResult>,
}

#[cfg(feature = "alloc")]
impl ReadPropertyMultipleAck {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_READ_PROPERTY_MULTIPLE).encode(w)?;
        for object_result in &self.results {
            encode_ctx_object_id(w, 0, object_result.object_id.raw())?;
            Tag::Opening { tag_num: 1 }.encode(w)?;
            for prop in &object_result.results {
                encode_ctx_unsigned(w, 2, prop.property_id.to_u32())?;
                if let Some(idx) = prop.array_index {
                    encode_ctx_unsigned(w, 3, idx)?;
                }
                match &prop.result {
                    Ok(values) => {
                        Tag::Opening { tag_num: 4 }.encode(w)?;
                        for value in values {
                            encode_property_value(w, value)?;
                        }
                        Tag::Closing { tag_num: 4 }.encode(w)?;
                    }
                    Err((class, code)) => {
                        Tag::Opening { tag_num: 5 }.encode(w)?;
                        encode_app_enumerated(w, *class)?;
                        encode_app_enumerated(w, *code)?;
                        Tag::Closing { tag_num: 5 }.encode(w)?;
                    }
                }
            }
            Tag::Closing { tag_num: 1 }.encode(w)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut results = Vec::new();
        while !r.is_empty() {
            let object_id = decode_required_ctx_object_id(r, 0)?;
            expect_opening(r, 1)?;
            let mut prop_results = Vec::new();
            while !peek_closing(r, 1) {
                let property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 2)?);
                let array_index = decode_optional_ctx_unsigned(r, 3)?;
                let result = match Tag::decode(r)? {
                    Tag::Opening { tag_num: 4 } => {
                        let values = decode_property_values(r, 4)?;
                        expect_closing(r, 4)?;
                        Ok(values)
                    }
                    Tag::Opening { tag_num: 5 } => {
                        let class = decode_app_enumerated(r)?;
                        let code = decode_app_enumerated(r)?;
                        expect_closing(r, 5)?;
                        Err((class, code))
                    }
                    _ => return Err(DecodeError::UnexpectedTag),
                };
                prop_results.push(PropertyAccessResult {
                    property_id,
                    array_index,
                    result,
                });
            }
            expect_closing(r, 1)?;
            results.push(ReadAccessResult {
                object_id,
                results: prop_results,
            });
        }
        Ok(Self { results })
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{
        PropertyAccessResult, PropertyReference, ReadAccessResult, ReadAccessSpecification,
        ReadPropertyMultipleAck, ReadPropertyMultipleRequest,
    };
    use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
    use alloc::vec;

    #[test]
    fn request_roundtrip() {
        let req = ReadPropertyMultipleRequest {
            specifications: vec![ReadAccessSpecification {
                object_id: ObjectId::new(ObjectType::AnalogInput, 1),
                property_references: vec![
                    PropertyReference {
                        property_id: PropertyId::PresentValue,
                        array_index: None,
                    },
                    PropertyReference {
                        property_id: PropertyId::StatusFlags,
                        array_index: None,
                    },
                ],
            }],
            invoke_id: 4,
        };
        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        let dec =
            ReadPropertyMultipleRequest::decode_after_header(&mut r, header.invoke_id).unwrap();
        assert_eq!(dec, req);
    }

    #[test]
    fn ack_roundtrip_mixes_values_and_errors() {
        let ack = ReadPropertyMultipleAck {
            results: vec![ReadAccessResult {
                object_id: ObjectId::new(ObjectType::AnalogInput, 1),
                results: vec![
                    PropertyAccessResult {
                        property_id: PropertyId::PresentValue,
                        array_index: None,
                        result: Ok(vec![PropertyValue::Real(21.5)]),
                    },
                    PropertyAccessResult {
                        property_id: PropertyId::Proprietary(9999),
                        array_index: None,
                        result: Err((2, 32)),
                    },
                ],
            }],
        };
        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        ack.encode_response(&mut w, 4).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(header.invoke_id, 4);
        let dec = ReadPropertyMultipleAck::decode_after_header(&mut r).unwrap();
        assert_eq!(dec, ack);
    }
}
