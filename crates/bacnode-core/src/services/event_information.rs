#[cfg(feature = "alloc")]
use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{encode_ctx_bit_string, encode_ctx_object_id, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::alarm_summary::{acked_bits, decode_acked_bits};
#[cfg(feature = "alloc")]
use crate::services::timestamp::TimeStamp;
#[cfg(feature = "alloc")]
use crate::services::{
    decode_required_ctx_object_id, decode_required_ctx_unsigned, expect_closing, expect_opening,
    peek_closing,
};
#[cfg(feature = "alloc")]
use crate::types::{EventState, NotifyType, ObjectId};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_GET_EVENT_INFORMATION: u8 = 0x1D;

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetEventInformationRequest {
    /// Resume point for paged responses.
    pub last_received_object_id: Option<ObjectId>,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl GetEventInformationRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_GET_EVENT_INFORMATION)
            .encode(w)?;
        if let Some(id) = self.last_received_object_id {
            encode_ctx_object_id(w, 0, id.raw())?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let last_received_object_id = if r.is_empty() {
            None
        } else {
            Some(decode_required_ctx_object_id(r, 0)?)
        };
        Ok(Self {
            last_received_object_id,
            invoke_id,
        })
    }
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct EventSummaryItem {
    pub object_id: ObjectId,
    pub event_state: EventState,
    pub acked_transitions: [bool; 3],
    pub event_time_stamps: [TimeStamp; 3],
    pub notify_type: NotifyType,
    pub event_enable: [bool; 3],
    pub event_priorities: [u32; 3],
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct GetEventInformationAck {
    pub summaries: Vec<EventSummaryItem>,
    pub more_events: bool,
}

#[cfg(feature = "alloc")]
impl GetEventInformationAck {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_GET_EVENT_INFORMATION).encode(w)?;
        Tag::Opening { tag_num: 0 }.encode(w)?;
        for item in &self.summaries {
            encode_ctx_object_id(w, 0, item.object_id.raw())?;
            encode_ctx_unsigned(w, 1, item.event_state.to_u32())?;
            encode_ctx_bit_string(w, 2, 5, &[acked_bits(item.acked_transitions)])?;
            Tag::Opening { tag_num: 3 }.encode(w)?;
            for ts in &item.event_time_stamps {
                ts.encode_choice(w)?;
            }
            Tag::Closing { tag_num: 3 }.encode(w)?;
            encode_ctx_unsigned(w, 4, item.notify_type.to_u32())?;
            encode_ctx_bit_string(w, 5, 5, &[acked_bits(item.event_enable)])?;
            Tag::Opening { tag_num: 6 }.encode(w)?;
            for priority in &item.event_priorities {
                crate::encoding::primitives::encode_app_unsigned(w, *priority)?;
            }
            Tag::Closing { tag_num: 6 }.encode(w)?;
        }
        Tag::Closing { tag_num: 0 }.encode(w)?;
        Tag::Context { tag_num: 1, len: 1 }.encode(w)?;
        w.write_u8(if self.more_events { 1 } else { 0 })
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        expect_opening(r, 0)?;
        let mut summaries = Vec::new();
        while !peek_closing(r, 0) {
            let object_id = decode_required_ctx_object_id(r, 0)?;
            let event_state = EventState::from_u32(decode_required_ctx_unsigned(r, 1)?)
                .ok_or(DecodeError::InvalidValue)?;
            let acked_transitions = decode_ctx_three_bits(r, 2)?;
            expect_opening(r, 3)?;
            let event_time_stamps = [
                TimeStamp::decode_choice(r)?,
                TimeStamp::decode_choice(r)?,
                TimeStamp::decode_choice(r)?,
            ];
            expect_closing(r, 3)?;
            let notify_type = NotifyType::from_u32(decode_required_ctx_unsigned(r, 4)?)
                .ok_or(DecodeError::InvalidValue)?;
            let event_enable = decode_ctx_three_bits(r, 5)?;
            expect_opening(r, 6)?;
            let event_priorities = [
                crate::encoding::primitives::decode_app_unsigned(r)?,
                crate::encoding::primitives::decode_app_unsigned(r)?,
                crate::encoding::primitives::decode_app_unsigned(r)?,
            ];
            expect_closing(r, 6)?;
            summaries.push(EventSummaryItem {
                object_id,
                event_state,
                acked_transitions,
                event_time_stamps,
                notify_type,
                event_enable,
                event_priorities,
            });
        }
        expect_closing(r, 0)?;
        let more_events = decode_required_ctx_unsigned(r, 1)? != 0;
        Ok(Self {
            summaries,
            more_events,
        })
    }
}

#[cfg(feature = "alloc")]
fn decode_ctx_three_bits(r: &mut Reader<'_>, tag_num: u8) -> Result<[bool; 3], DecodeError> {
    match Tag::decode(r)? {
        Tag::Context { tag_num: t, len } if t == tag_num && len >= 2 => {
            let raw = r.read_exact(len as usize)?;
            Ok(decode_acked_bits(raw[1]))
        }
        _ => Err(DecodeError::UnexpectedTag),
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{EventSummaryItem, GetEventInformationAck, GetEventInformationRequest};
    use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::services::timestamp::TimeStamp;
    use crate::types::{EventState, NotifyType, ObjectId, ObjectType};
    use alloc::vec;

    #[test]
    fn request_roundtrip() {
        let req = GetEventInformationRequest {
            last_received_object_id: Some(ObjectId::new(ObjectType::AnalogInput, 3)),
            invoke_id: 9,
        };
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            GetEventInformationRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }

    #[test]
    fn ack_roundtrip() {
        let ack = GetEventInformationAck {
            summaries: vec![EventSummaryItem {
                object_id: ObjectId::new(ObjectType::AnalogInput, 2),
                event_state: EventState::HighLimit,
                acked_transitions: [false, true, true],
                event_time_stamps: [
                    TimeStamp::SequenceNumber(1),
                    TimeStamp::unspecified(),
                    TimeStamp::unspecified(),
                ],
                notify_type: NotifyType::Alarm,
                event_enable: [true, true, true],
                event_priorities: [128, 128, 192],
            }],
            more_events: false,
        };
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        ack.encode_response(&mut w, 9).unwrap();

        let mut r = Reader::new(w.as_written());
        ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(
            GetEventInformationAck::decode_after_header(&mut r).unwrap(),
            ack
        );
    }
}
