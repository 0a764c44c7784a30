#[cfg(feature = "alloc")]
use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{
        decode_app_date, decode_app_signed, decode_app_time, decode_app_unsigned,
        encode_app_date, encode_app_signed, encode_app_time, encode_app_unsigned,
        encode_ctx_bit_string, encode_ctx_object_id, encode_ctx_unsigned,
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
    expect_closing, expect_opening,
};
#[cfg(feature = "alloc")]
use crate::types::{Date, ObjectId, PropertyId, PropertyValue, Time};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_READ_RANGE: u8 = 0x1A;

/// Range qualifier of a ReadRange request.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeSpecifier {
    /// Whole list/array.
    All,
    ByPosition { reference_index: u32, count: i32 },
    BySequenceNumber { reference_sequence: u32, count: i32 },
    ByTime { date: Date, time: Time, count: i32 },
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadRangeRequest {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub range: RangeSpecifier,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl ReadRangeRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_READ_RANGE).encode(w)?;
        encode_ctx_object_id(w, 0, self.object_id.raw())?;
        encode_ctx_unsigned(w, 1, self.property_id.to_u32())?;
        if let Some(idx) = self.array_index {
            encode_ctx_unsigned(w, 2, idx)?;
        }
        match self.range {
            RangeSpecifier::All => {}
            RangeSpecifier::ByPosition {
                reference_index,
                count,
            } => {
                Tag::Opening { tag_num: 3 }.encode(w)?;
                encode_app_unsigned(w, reference_index)?;
                encode_app_signed(w, count)?;
                Tag::Closing { tag_num: 3 }.encode(w)?;
            }
            RangeSpecifier::BySequenceNumber {
                reference_sequence,
                count,
            } => {
                Tag::Opening { tag_num: 6 }.encode(w)?;
                encode_app_unsigned(w, reference_sequence)?;
                encode_app_signed(w, count)?;
                Tag::Closing { tag_num: 6 }.encode(w)?;
            }
            RangeSpecifier::ByTime { date, time, count } => {
                Tag::Opening { tag_num: 7 }.encode(w)?;
                encode_app_date(w, date)?;
                encode_app_time(w, time)?;
                encode_app_signed(w, count)?;
                Tag::Closing { tag_num: 7 }.encode(w)?;
            }
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let object_id = decode_required_ctx_object_id(r, 0)?;
        let property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 1)?);
        let array_index = decode_optional_ctx_unsigned(r, 2)?;
        let range = if r.is_empty() {
            RangeSpecifier::All
        } else {
            match Tag::decode(r)? {
                Tag::Opening { tag_num: 3 } => {
                    let reference_index = decode_app_unsigned(r)?;
                    let count = decode_app_signed(r)?;
                    expect_closing(r, 3)?;
                    RangeSpecifier::ByPosition {
                        reference_index,
                        count,
                    }
                }
                Tag::Opening { tag_num: 6 } => {
                    let reference_sequence = decode_app_unsigned(r)?;
                    let count = decode_app_signed(r)?;
                    expect_closing(r, 6)?;
                    RangeSpecifier::BySequenceNumber {
                        reference_sequence,
                        count,
                    }
                }
                Tag::Opening { tag_num: 7 } => {
                    let date = decode_app_date(r)?;
                    let time = decode_app_time(r)?;
                    let count = decode_app_signed(r)?;
                    expect_closing(r, 7)?;
                    RangeSpecifier::ByTime { date, time, count }
                }
                _ => return Err(DecodeError::UnexpectedTag),
            }
        };
        Ok(Self {
            object_id,
            property_id,
            array_index,
            range,
            invoke_id,
        })
    }
}

/// Result flags of a ReadRange response.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultFlags {
    pub first_item: bool,
    pub last_item: bool,
    pub more_items: bool,
}

#[cfg(feature = "alloc")]
impl ResultFlags {
    pub const fn to_byte(self) -> u8 {
        (if self.first_item { 0x80 } else { 0 })
            | (if self.last_item { 0x40 } else { 0 })
            | (if self.more_items { 0x20 } else { 0 })
    }

    pub const fn from_byte(byte: u8) -> Self {
        Self {
            first_item: (byte & 0x80) != 0,
            last_item: (byte & 0x40) != 0,
            more_items: (byte & 0x20) != 0,
        }
    }
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRangeAck {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub result_flags: ResultFlags,
    pub item_count: u32,
    pub items: Vec<PropertyValue>,
    pub first_sequence_number: Option<u32>,
}

#[cfg(feature = "alloc")]
impl ReadRangeAck {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_READ_RANGE).encode(w)?;
        encode_ctx_object_id(w, 0, self.object_id.raw())?;
        encode_ctx_unsigned(w, 1, self.property_id.to_u32())?;
        if let Some(idx) = self.array_index {
            encode_ctx_unsigned(w, 2, idx)?;
        }
        encode_ctx_bit_string(w, 3, 5, &[self.result_flags.to_byte()])?;
        encode_ctx_unsigned(w, 4, self.item_count)?;
        Tag::Opening { tag_num: 5 }.encode(w)?;
        for item in &self.items {
            encode_property_value(w, item)?;
        }
        Tag::Closing { tag_num: 5 }.encode(w)?;
        if let Some(seq) = self.first_sequence_number {
            encode_ctx_unsigned(w, 6, seq)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let object_id = decode_required_ctx_object_id(r, 0)?;
        let property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 1)?);
        let array_index = decode_optional_ctx_unsigned(r, 2)?;
        let result_flags = match Tag::decode(r)? {
            Tag::Context { tag_num: 3, len } if len >= 2 => {
                let raw = r.read_exact(len as usize)?;
                ResultFlags::from_byte(raw[1])
            }
            _ => return Err(DecodeError::UnexpectedTag),
        };
        let item_count = decode_required_ctx_unsigned(r, 4)?;
        expect_opening(r, 5)?;
        let items = decode_property_values(r, 5)?;
        expect_closing(r, 5)?;
        let first_sequence_number = decode_optional_ctx_unsigned(r, 6)?;
        Ok(Self {
            object_id,
            property_id,
            array_index,
            result_flags,
            item_count,
            items,
            first_sequence_number,
        })
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{RangeSpecifier, ReadRangeAck, ReadRangeRequest, ResultFlags};
    use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
    use alloc::vec;

    #[test]
    fn request_by_position_roundtrip() {
        let req = ReadRangeRequest {
            object_id: ObjectId::new(ObjectType::TrendLog, 1),
            property_id: PropertyId::Proprietary(131),
            array_index: None,
            range: RangeSpecifier::ByPosition {
                reference_index: 1,
                count: 10,
            },
            invoke_id: 6,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            ReadRangeRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }

    #[test]
    fn ack_roundtrip() {
        let ack = ReadRangeAck {
            object_id: ObjectId::new(ObjectType::TrendLog, 1),
            property_id: PropertyId::Proprietary(131),
            array_index: None,
            result_flags: ResultFlags {
                first_item: true,
                last_item: true,
                more_items: false,
            },
            item_count: 2,
            items: vec![PropertyValue::Real(1.0), PropertyValue::Real(2.0)],
            first_sequence_number: Some(17),
        };
        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        ack.encode_response(&mut w, 6).unwrap();

        let mut r = Reader::new(w.as_written());
        ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(ReadRangeAck::decode_after_header(&mut r).unwrap(), ack);
    }
}
