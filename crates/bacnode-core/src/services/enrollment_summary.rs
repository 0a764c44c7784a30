#[cfg(feature = "alloc")]
use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{
        decode_app_enumerated, decode_app_object_id_raw, decode_app_unsigned,
        encode_app_enumerated, encode_app_object_id, encode_app_unsigned, encode_ctx_unsigned,
    },
    reader::Reader,
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::{decode_optional_ctx_unsigned, decode_required_ctx_unsigned};
#[cfg(feature = "alloc")]
use crate::types::{EventState, EventType, ObjectId};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_GET_ENROLLMENT_SUMMARY: u8 = 0x04;

/// Acknowledgment filter of a GetEnrollmentSummary request.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AcknowledgmentFilter {
    #[default]
    All = 0,
    Acked = 1,
    NotAcked = 2,
}

#[cfg(feature = "alloc")]
impl AcknowledgmentFilter {
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::All),
            1 => Some(Self::Acked),
            2 => Some(Self::NotAcked),
            _ => None,
        }
    }
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetEnrollmentSummaryRequest {
    pub acknowledgment_filter: AcknowledgmentFilter,
    pub event_state_filter: Option<EventState>,
    pub event_type_filter: Option<EventType>,
    pub notification_class_filter: Option<u32>,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl GetEnrollmentSummaryRequest {
    pub fn all(invoke_id: u8) -> Self {
        Self {
            acknowledgment_filter: AcknowledgmentFilter::All,
            event_state_filter: None,
            event_type_filter: None,
            notification_class_filter: None,
            invoke_id,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_GET_ENROLLMENT_SUMMARY)
            .encode(w)?;
        encode_ctx_unsigned(w, 0, self.acknowledgment_filter as u32)?;
        // Tag 1 (enrollment filter: recipient ranges) is not produced by
        // this stack.
        if let Some(state) = self.event_state_filter {
            encode_ctx_unsigned(w, 2, state.to_u32())?;
        }
        if let Some(event_type) = self.event_type_filter {
            encode_ctx_unsigned(w, 3, event_type.to_u32())?;
        }
        if let Some(class) = self.notification_class_filter {
            encode_ctx_unsigned(w, 5, class)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let acknowledgment_filter =
            AcknowledgmentFilter::from_u32(decode_required_ctx_unsigned(r, 0)?)
                .ok_or(DecodeError::InvalidValue)?;
        let event_state_filter = match decode_optional_ctx_unsigned(r, 2)? {
            Some(raw) => Some(EventState::from_u32(raw).ok_or(DecodeError::InvalidValue)?),
            None => None,
        };
        let event_type_filter = decode_optional_ctx_unsigned(r, 3)?.map(EventType::from_u32);
        let notification_class_filter = decode_optional_ctx_unsigned(r, 5)?;
        Ok(Self {
            acknowledgment_filter,
            event_state_filter,
            event_type_filter,
            notification_class_filter,
            invoke_id,
        })
    }
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentSummaryItem {
    pub object_id: ObjectId,
    pub event_type: EventType,
    pub event_state: EventState,
    pub priority: u8,
    pub notification_class: Option<u32>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct GetEnrollmentSummaryAck {
    pub summaries: Vec<EnrollmentSummaryItem>,
}

#[cfg(feature = "alloc")]
impl GetEnrollmentSummaryAck {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_GET_ENROLLMENT_SUMMARY).encode(w)?;
        for item in &self.summaries {
            encode_app_object_id(w, item.object_id.raw())?;
            encode_app_enumerated(w, item.event_type.to_u32())?;
            encode_app_enumerated(w, item.event_state.to_u32())?;
            encode_app_unsigned(w, item.priority as u32)?;
            if let Some(class) = item.notification_class {
                encode_app_unsigned(w, class)?;
            }
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut summaries = Vec::new();
        while !r.is_empty() {
            let object_id = ObjectId::from_raw(decode_app_object_id_raw(r)?);
            let event_type = EventType::from_u32(decode_app_enumerated(r)?);
            let event_state = EventState::from_u32(decode_app_enumerated(r)?)
                .ok_or(DecodeError::InvalidValue)?;
            let priority = decode_app_unsigned(r)?;
            if priority > u8::MAX as u32 {
                return Err(DecodeError::InvalidValue);
            }
            // The notification class is optional; peek for a following
            // unsigned before the next object id.
            let checkpoint = *r;
            let notification_class = match decode_app_unsigned(r) {
                Ok(v) => Some(v),
                Err(_) => {
                    *r = checkpoint;
                    None
                }
            };
            summaries.push(EnrollmentSummaryItem {
                object_id,
                event_type,
                event_state,
                priority: priority as u8,
                notification_class,
            });
        }
        Ok(Self { summaries })
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{
        EnrollmentSummaryItem, GetEnrollmentSummaryAck, GetEnrollmentSummaryRequest,
    };
    use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{EventState, EventType, ObjectId, ObjectType};
    use alloc::vec;

    #[test]
    fn request_roundtrip() {
        let req = GetEnrollmentSummaryRequest::all(2);
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            GetEnrollmentSummaryRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }

    #[test]
    fn ack_roundtrip() {
        let ack = GetEnrollmentSummaryAck {
            summaries: vec![EnrollmentSummaryItem {
                object_id: ObjectId::new(ObjectType::EventEnrollment, 1),
                event_type: EventType::OutOfRange,
                event_state: EventState::Normal,
                priority: 64,
                notification_class: Some(1),
            }],
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        ack.encode_response(&mut w, 2).unwrap();

        let mut r = Reader::new(w.as_written());
        ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(
            GetEnrollmentSummaryAck::decode_after_header(&mut r).unwrap(),
            ack
        );
    }
}
