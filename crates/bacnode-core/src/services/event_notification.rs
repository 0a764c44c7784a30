#[cfg(feature = "alloc")]
use crate::apdu::{ConfirmedRequestHeader, UnconfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{
        decode_ctx_character_string, encode_ctx_character_string, encode_ctx_object_id,
        encode_ctx_unsigned,
    },
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::timestamp::TimeStamp;
#[cfg(feature = "alloc")]
use crate::services::value_codec::{decode_property_values, encode_property_value};
#[cfg(feature = "alloc")]
use crate::services::{
    decode_optional_ctx_boolean, decode_optional_ctx_unsigned, decode_required_ctx_object_id,
    decode_required_ctx_unsigned, expect_closing, peek_opening,
};
#[cfg(feature = "alloc")]
use crate::types::{EventState, EventType, NotifyType, ObjectId, PropertyValue};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::string::String;
#[cfg(feature = "alloc")]
use alloc::string::ToString;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_CONFIRMED_EVENT_NOTIFICATION: u8 = 0x02;
pub const SERVICE_UNCONFIRMED_EVENT_NOTIFICATION: u8 = 0x03;

/// An alarm/event notification, both directions.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    pub process_id: u32,
    pub initiating_device_id: ObjectId,
    pub event_object_id: ObjectId,
    pub timestamp: TimeStamp,
    pub notification_class: u32,
    pub priority: u8,
    pub event_type: EventType,
    pub message_text: Option<String>,
    pub notify_type: NotifyType,
    pub ack_required: Option<bool>,
    pub from_state: Option<EventState>,
    pub to_state: EventState,
    /// Raw notification parameters, preserved as decoded values.
    pub event_values: Option<Vec<PropertyValue>>,
}

#[cfg(feature = "alloc")]
impl EventNotification {
    fn encode_payload(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        encode_ctx_unsigned(w, 0, self.process_id)?;
        encode_ctx_object_id(w, 1, self.initiating_device_id.raw())?;
        encode_ctx_object_id(w, 2, self.event_object_id.raw())?;
        self.timestamp.encode_ctx(w, 3)?;
        encode_ctx_unsigned(w, 4, self.notification_class)?;
        encode_ctx_unsigned(w, 5, self.priority as u32)?;
        encode_ctx_unsigned(w, 6, self.event_type.to_u32())?;
        if let Some(text) = &self.message_text {
            encode_ctx_character_string(w, 7, text)?;
        }
        encode_ctx_unsigned(w, 8, self.notify_type.to_u32())?;
        if let Some(ack_required) = self.ack_required {
            Tag::Context { tag_num: 9, len: 1 }.encode(w)?;
            w.write_u8(if ack_required { 1 } else { 0 })?;
        }
        if let Some(from_state) = self.from_state {
            encode_ctx_unsigned(w, 10, from_state.to_u32())?;
        }
        encode_ctx_unsigned(w, 11, self.to_state.to_u32())?;
        if let Some(values) = &self.event_values {
            Tag::Opening { tag_num: 12 }.encode(w)?;
            for value in values {
                encode_property_value(w, value)?;
            }
            Tag::Closing { tag_num: 12 }.encode(w)?;
        }
        Ok(())
    }

    pub fn encode_unconfirmed(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_UNCONFIRMED_EVENT_NOTIFICATION).encode(w)?;
        self.encode_payload(w)
    }

    pub fn encode_confirmed(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(invoke_id, SERVICE_CONFIRMED_EVENT_NOTIFICATION)
            .encode(w)?;
        self.encode_payload(w)
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let process_id = decode_required_ctx_unsigned(r, 0)?;
        let initiating_device_id = decode_required_ctx_object_id(r, 1)?;
        let event_object_id = decode_required_ctx_object_id(r, 2)?;
        let timestamp = TimeStamp::decode_ctx(r, 3)?;
        let notification_class = decode_required_ctx_unsigned(r, 4)?;
        let priority = decode_required_ctx_unsigned(r, 5)?;
        if priority > u8::MAX as u32 {
            return Err(DecodeError::InvalidValue);
        }
        let event_type = EventType::from_u32(decode_required_ctx_unsigned(r, 6)?);

        let checkpoint = *r;
        let message_text = match Tag::decode(r) {
            Ok(Tag::Context { tag_num: 7, len }) => {
                Some(decode_ctx_character_string(r, len as usize)?.to_string())
            }
            _ => {
                *r = checkpoint;
                None
            }
        };

        let notify_type = NotifyType::from_u32(decode_required_ctx_unsigned(r, 8)?)
            .ok_or(DecodeError::InvalidValue)?;
        let ack_required = decode_optional_ctx_boolean(r, 9)?;
        let from_state = match decode_optional_ctx_unsigned(r, 10)? {
            Some(raw) => Some(EventState::from_u32(raw).ok_or(DecodeError::InvalidValue)?),
            None => None,
        };
        let to_state = EventState::from_u32(decode_required_ctx_unsigned(r, 11)?)
            .ok_or(DecodeError::InvalidValue)?;

        let event_values = if peek_opening(r, 12) {
            match Tag::decode(r)? {
                Tag::Opening { tag_num: 12 } => {}
                _ => return Err(DecodeError::UnexpectedTag),
            }
            let values = decode_property_values(r, 12)?;
            expect_closing(r, 12)?;
            Some(values)
        } else {
            None
        };

        Ok(Self {
            process_id,
            initiating_device_id,
            event_object_id,
            timestamp,
            notification_class,
            priority: priority as u8,
            event_type,
            message_text,
            notify_type,
            ack_required,
            from_state,
            to_state,
            event_values,
        })
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::EventNotification;
    use crate::apdu::UnconfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::services::timestamp::TimeStamp;
    use crate::types::{EventState, EventType, NotifyType, ObjectId, ObjectType};

    #[test]
    fn notification_roundtrip() {
        let notification = EventNotification {
            process_id: 0,
            initiating_device_id: ObjectId::new(ObjectType::Device, 1000),
            event_object_id: ObjectId::new(ObjectType::AnalogInput, 1),
            timestamp: TimeStamp::SequenceNumber(12),
            notification_class: 0,
            priority: 128,
            event_type: EventType::OutOfRange,
            message_text: None,
            notify_type: NotifyType::Alarm,
            ack_required: Some(true),
            from_state: Some(EventState::Normal),
            to_state: EventState::HighLimit,
            event_values: None,
        };

        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        notification.encode_unconfirmed(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        UnconfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            EventNotification::decode_after_header(&mut r).unwrap(),
            notification
        );
    }
}
