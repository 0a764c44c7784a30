#[cfg(feature = "alloc")]
use crate::apdu::UnconfirmedRequestHeader;
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{decode_unsigned, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::value_codec::{
    decode_application_data_value, encode_property_value,
};
#[cfg(feature = "alloc")]
use crate::services::{decode_required_ctx_unsigned, expect_closing, expect_opening, peek_closing};
#[cfg(feature = "alloc")]
use crate::types::{PropertyValue};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_WRITE_GROUP: u8 = 0x0A;

/// One channel-value change in a WriteGroup request.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct GroupChannelValue {
    pub channel: u16,
    pub overriding_priority: Option<u8>,
    pub value: PropertyValue,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct WriteGroupRequest {
    pub group_number: u32,
    pub write_priority: u8,
    pub change_list: Vec<GroupChannelValue>,
    /// When set, receivers suppress the usual change-of-value processing.
    pub inhibit_delay: Option<bool>,
}

#[cfg(feature = "alloc")]
impl WriteGroupRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_WRITE_GROUP).encode(w)?;
        encode_ctx_unsigned(w, 0, self.group_number)?;
        encode_ctx_unsigned(w, 1, self.write_priority as u32)?;
        Tag::Opening { tag_num: 2 }.encode(w)?;
        for change in &self.change_list {
            encode_ctx_unsigned(w, 0, change.channel as u32)?;
            if let Some(priority) = change.overriding_priority {
                encode_ctx_unsigned(w, 1, priority as u32)?;
            }
            encode_property_value(w, &change.value)?;
        }
        Tag::Closing { tag_num: 2 }.encode(w)?;
        if let Some(inhibit) = self.inhibit_delay {
            Tag::Context { tag_num: 3, len: 1 }.encode(w)?;
            w.write_u8(if inhibit { 1 } else { 0 })?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let group_number = decode_required_ctx_unsigned(r, 0)?;
        let write_priority = decode_required_ctx_unsigned(r, 1)?;
        if !(1..=16).contains(&write_priority) {
            return Err(DecodeError::InvalidValue);
        }
        expect_opening(r, 2)?;
        let mut change_list = Vec::new();
        while !peek_closing(r, 2) {
            let channel = decode_required_ctx_unsigned(r, 0)?;
            if channel > u16::MAX as u32 {
                return Err(DecodeError::InvalidValue);
            }
            let checkpoint = *r;
            let overriding_priority = match Tag::decode(r) {
                Ok(Tag::Context { tag_num: 1, len }) => {
                    Some(decode_unsigned(r, len as usize)? as u8)
                }
                _ => {
                    *r = checkpoint;
                    None
                }
            };
            let value = decode_application_data_value(r)?;
            change_list.push(GroupChannelValue {
                channel: channel as u16,
                overriding_priority,
                value: PropertyValue::from_data_value(&value),
            });
        }
        expect_closing(r, 2)?;
        let inhibit_delay = crate::services::decode_optional_ctx_boolean(r, 3)?;
        Ok(Self {
            group_number,
            write_priority: write_priority as u8,
            change_list,
            inhibit_delay,
        })
    }
}
