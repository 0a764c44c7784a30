#[cfg(feature = "alloc")]
use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{
        decode_app_enumerated, decode_app_object_id_raw, encode_app_bit_string,
        encode_app_enumerated, encode_app_object_id,
    },
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::types::{EventState, ObjectId};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_GET_ALARM_SUMMARY: u8 = 0x03;

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSummaryItem {
    pub object_id: ObjectId,
    pub alarm_state: EventState,
    /// to-offnormal, to-fault, to-normal acknowledgment bits.
    pub acked_transitions: [bool; 3],
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetAlarmSummaryRequest {
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl GetAlarmSummaryRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_GET_ALARM_SUMMARY).encode(w)
    }
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct GetAlarmSummaryAck {
    pub summaries: Vec<AlarmSummaryItem>,
}

#[cfg(feature = "alloc")]
impl GetAlarmSummaryAck {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_GET_ALARM_SUMMARY).encode(w)?;
        for item in &self.summaries {
            encode_app_object_id(w, item.object_id.raw())?;
            encode_app_enumerated(w, item.alarm_state.to_u32())?;
            encode_app_bit_string(w, 5, &[acked_bits(item.acked_transitions)])?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut summaries = Vec::new();
        while !r.is_empty() {
            let object_id = ObjectId::from_raw(decode_app_object_id_raw(r)?);
            let alarm_state = EventState::from_u32(decode_app_enumerated(r)?)
                .ok_or(DecodeError::InvalidValue)?;
            let acked_transitions = match Tag::decode(r)? {
                Tag::Application {
                    tag: AppTag::BitString,
                    len,
                } if len >= 2 => {
                    let raw = r.read_exact(len as usize)?;
                    decode_acked_bits(raw[1])
                }
                _ => return Err(DecodeError::UnexpectedTag),
            };
            summaries.push(AlarmSummaryItem {
                object_id,
                alarm_state,
                acked_transitions,
            });
        }
        Ok(Self { summaries })
    }
}

#[cfg(feature = "alloc")]
pub(crate) fn acked_bits(acked: [bool; 3]) -> u8 {
    (if acked[0] { 0x80 } else { 0 })
        | (if acked[1] { 0x40 } else { 0 })
        | (if acked[2] { 0x20 } else { 0 })
}

#[cfg(feature = "alloc")]
pub(crate) fn decode_acked_bits(byte: u8) -> [bool; 3] {
    [
        (byte & 0x80) != 0,
        (byte & 0x40) != 0,
        (byte & 0x20) != 0,
    ]
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{AlarmSummaryItem, GetAlarmSummaryAck};
    use crate::apdu::ComplexAckHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{EventState, ObjectId, ObjectType};
    use alloc::vec;

    #[test]
    fn ack_roundtrip() {
        let ack = GetAlarmSummaryAck {
            summaries: vec![AlarmSummaryItem {
                object_id: ObjectId::new(ObjectType::AnalogInput, 2),
                alarm_state: EventState::HighLimit,
                acked_transitions: [false, true, true],
            }],
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        ack.encode_response(&mut w, 9).unwrap();

        let mut r = Reader::new(w.as_written());
        ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(GetAlarmSummaryAck::decode_after_header(&mut r).unwrap(), ack);
    }
}
