use crate::apdu::{ConfirmedRequestHeader, UnconfirmedRequestHeader};
use crate::encoding::{
    primitives::{
        decode_ctx_character_string, decode_unsigned, encode_ctx_character_string,
        encode_ctx_object_id, encode_ctx_unsigned,
    },
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::{decode_required_ctx_object_id, expect_closing, expect_opening};
use crate::types::ObjectId;
use crate::{DecodeError, EncodeError};

pub const SERVICE_CONFIRMED_TEXT_MESSAGE: u8 = 0x13;
pub const SERVICE_UNCONFIRMED_TEXT_MESSAGE: u8 = 0x05;

/// Message class choice: numeric or character class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass<'a> {
    Numeric(u32),
    Character(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessagePriority {
    Normal = 0,
    Urgent = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMessageRequest<'a> {
    pub source_device_id: ObjectId,
    pub message_class: Option<MessageClass<'a>>,
    pub priority: MessagePriority,
    pub message: &'a str,
    pub invoke_id: u8,
}

impl<'a> TextMessageRequest<'a> {
    fn encode_payload(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        encode_ctx_object_id(w, 0, self.source_device_id.raw())?;
        if let Some(class) = self.message_class {
            Tag::Opening { tag_num: 1 }.encode(w)?;
            match class {
                MessageClass::Numeric(v) => encode_ctx_unsigned(w, 0, v)?,
                MessageClass::Character(s) => encode_ctx_character_string(w, 1, s)?,
            }
            Tag::Closing { tag_num: 1 }.encode(w)?;
        }
        encode_ctx_unsigned(w, 2, self.priority as u32)?;
        encode_ctx_character_string(w, 3, self.message)
    }

    pub fn encode_confirmed(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_CONFIRMED_TEXT_MESSAGE)
            .encode(w)?;
        self.encode_payload(w)
    }

    pub fn encode_unconfirmed(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_UNCONFIRMED_TEXT_MESSAGE).encode(w)?;
        self.encode_payload(w)
    }

    pub fn decode_after_header(r: &mut Reader<'a>, invoke_id: u8) -> Result<Self, DecodeError> {
        let source_device_id = decode_required_ctx_object_id(r, 0)?;
        let message_class = if crate::services::peek_opening(r, 1) {
            expect_opening(r, 1)?;
            let class = match Tag::decode(r)? {
                Tag::Context { tag_num: 0, len } => {
                    MessageClass::Numeric(decode_unsigned(r, len as usize)?)
                }
                Tag::Context { tag_num: 1, len } => {
                    MessageClass::Character(decode_ctx_character_string(r, len as usize)?)
                }
                _ => return Err(DecodeError::UnexpectedTag),
            };
            expect_closing(r, 1)?;
            Some(class)
        } else {
            None
        };
        let priority = match crate::services::decode_required_ctx_unsigned(r, 2)? {
            0 => MessagePriority::Normal,
            1 => MessagePriority::Urgent,
            _ => return Err(DecodeError::InvalidValue),
        };
        let message = match Tag::decode(r)? {
            Tag::Context { tag_num: 3, len } => decode_ctx_character_string(r, len as usize)?,
            _ => return Err(DecodeError::UnexpectedTag),
        };
        Ok(Self {
            source_device_id,
            message_class,
            priority,
            message,
            invoke_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageClass, MessagePriority, TextMessageRequest};
    use crate::apdu::ConfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType};

    #[test]
    fn confirmed_roundtrip() {
        let req = TextMessageRequest {
            source_device_id: ObjectId::new(ObjectType::Device, 12),
            message_class: Some(MessageClass::Numeric(1)),
            priority: MessagePriority::Urgent,
            message: "filter change due",
            invoke_id: 7,
        };
        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        req.encode_confirmed(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            TextMessageRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }
}
