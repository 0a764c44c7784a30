use crate::apdu::ConfirmedRequestHeader;
use crate::encoding::{
    primitives::{
        decode_ctx_character_string, encode_ctx_character_string, encode_ctx_object_id,
        encode_ctx_unsigned,
    },
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::timestamp::TimeStamp;
use crate::services::{decode_required_ctx_object_id, decode_required_ctx_unsigned};
use crate::types::{EventState, ObjectId};
use crate::{DecodeError, EncodeError};

pub const SERVICE_ACKNOWLEDGE_ALARM: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgeAlarmRequest<'a> {
    pub acknowledging_process_id: u32,
    pub event_object_id: ObjectId,
    pub event_state_acknowledged: EventState,
    pub timestamp: TimeStamp,
    pub acknowledgment_source: &'a str,
    pub time_of_acknowledgment: TimeStamp,
    pub invoke_id: u8,
}

impl<'a> AcknowledgeAlarmRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_ACKNOWLEDGE_ALARM).encode(w)?;
        encode_ctx_unsigned(w, 0, self.acknowledging_process_id)?;
        encode_ctx_object_id(w, 1, self.event_object_id.raw())?;
        encode_ctx_unsigned(w, 2, self.event_state_acknowledged.to_u32())?;
        self.timestamp.encode_ctx(w, 3)?;
        encode_ctx_character_string(w, 4, self.acknowledgment_source)?;
        self.time_of_acknowledgment.encode_ctx(w, 5)
    }

    pub fn decode_after_header(r: &mut Reader<'a>, invoke_id: u8) -> Result<Self, DecodeError> {
        let acknowledging_process_id = decode_required_ctx_unsigned(r, 0)?;
        let event_object_id = decode_required_ctx_object_id(r, 1)?;
        let event_state_acknowledged = EventState::from_u32(decode_required_ctx_unsigned(r, 2)?)
            .ok_or(DecodeError::InvalidValue)?;
        let timestamp = TimeStamp::decode_ctx(r, 3)?;
        let acknowledgment_source = match Tag::decode(r)? {
            Tag::Context { tag_num: 4, len } => decode_ctx_character_string(r, len as usize)?,
            _ => return Err(DecodeError::UnexpectedTag),
        };
        let time_of_acknowledgment = TimeStamp::decode_ctx(r, 5)?;
        Ok(Self {
            acknowledging_process_id,
            event_object_id,
            event_state_acknowledged,
            timestamp,
            acknowledgment_source,
            time_of_acknowledgment,
            invoke_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::AcknowledgeAlarmRequest;
    use crate::apdu::ConfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::services::timestamp::TimeStamp;
    use crate::types::{EventState, ObjectId, ObjectType};

    #[test]
    fn acknowledge_alarm_roundtrip() {
        let req = AcknowledgeAlarmRequest {
            acknowledging_process_id: 1,
            event_object_id: ObjectId::new(ObjectType::AnalogInput, 2),
            event_state_acknowledged: EventState::HighLimit,
            timestamp: TimeStamp::SequenceNumber(16),
            acknowledgment_source: "operator",
            time_of_acknowledgment: TimeStamp::SequenceNumber(17),
            invoke_id: 5,
        };
        let mut buf = [0u8; 128];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            AcknowledgeAlarmRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }
}
