#[cfg(feature = "alloc")]
use crate::apdu::{ConfirmedRequestHeader, UnconfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{decode_unsigned, encode_ctx_object_id, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::value_codec::{
    decode_application_data_value_from_tag, encode_property_value,
};
#[cfg(feature = "alloc")]
use crate::services::{decode_required_ctx_object_id, decode_required_ctx_unsigned};
#[cfg(feature = "alloc")]
use crate::types::{DataValue, ObjectId, PropertyId, PropertyValue};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_CONFIRMED_COV_NOTIFICATION: u8 = 0x01;
pub const SERVICE_UNCONFIRMED_COV_NOTIFICATION: u8 = 0x02;

/// One `(property, value)` pair carried by a COV notification, owned form
/// used on the sending side.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct CovValue {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: PropertyValue,
    pub priority: Option<u8>,
}

/// One `(property, value)` pair decoded from a received COV notification.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct CovPropertyValue<'a> {
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub value: DataValue<'a>,
    pub priority: Option<u8>,
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct CovNotification<'a> {
    pub subscriber_process_id: u32,
    pub initiating_device_id: ObjectId,
    pub monitored_object_id: ObjectId,
    pub time_remaining_seconds: u32,
    pub values: Vec<CovPropertyValue<'a>>,
}

#[cfg(feature = "alloc")]
impl<'a> CovNotification<'a> {
    pub fn decode_after_header(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let subscriber_process_id = decode_required_ctx_unsigned(r, 0)?;
        let initiating_device_id = decode_required_ctx_object_id(r, 1)?;
        let monitored_object_id = decode_required_ctx_object_id(r, 2)?;
        let time_remaining_seconds = decode_required_ctx_unsigned(r, 3)?;

        match Tag::decode(r)? {
            Tag::Opening { tag_num: 4 } => {}
            _ => return Err(DecodeError::UnexpectedTag),
        }

        let mut values = Vec::new();
        loop {
            let property_start = Tag::decode(r)?;
            if property_start == (Tag::Closing { tag_num: 4 }) {
                break;
            }

            let property_id = match property_start {
                Tag::Context { tag_num: 0, len } => {
                    PropertyId::from_u32(decode_unsigned(r, len as usize)?)
                }
                _ => return Err(DecodeError::UnexpectedTag),
            };

            let next = Tag::decode(r)?;
            let (array_index, value_open_tag) = match next {
                Tag::Context { tag_num: 1, len } => {
                    let idx = decode_unsigned(r, len as usize)?;
                    (Some(idx), Tag::decode(r)?)
                }
                other => (None, other),
            };
            if value_open_tag != (Tag::Opening { tag_num: 2 }) {
                return Err(DecodeError::UnexpectedTag);
            }

            let value_tag = Tag::decode(r)?;
            let value = decode_application_data_value_from_tag(r, value_tag)?;
            match Tag::decode(r)? {
                Tag::Closing { tag_num: 2 } => {}
                _ => return Err(DecodeError::UnexpectedTag),
            }

            let checkpoint = *r;
            let priority = match Tag::decode(r) {
                Ok(Tag::Context { tag_num: 3, len }) => {
                    let p = decode_unsigned(r, len as usize)?;
                    if p > u8::MAX as u32 {
                        return Err(DecodeError::InvalidValue);
                    }
                    Some(p as u8)
                }
                _ => {
                    *r = checkpoint;
                    None
                }
            };

            values.push(CovPropertyValue {
                property_id,
                array_index,
                value,
                priority,
            });
        }

        Ok(Self {
            subscriber_process_id,
            initiating_device_id,
            monitored_object_id,
            time_remaining_seconds,
            values,
        })
    }
}

/// Encode the shared service payload of a COV notification.
#[cfg(feature = "alloc")]
fn encode_payload(
    w: &mut Writer<'_>,
    subscriber_process_id: u32,
    initiating_device_id: ObjectId,
    monitored_object_id: ObjectId,
    time_remaining_seconds: u32,
    values: &[CovValue],
) -> Result<(), EncodeError> {
    encode_ctx_unsigned(w, 0, subscriber_process_id)?;
    encode_ctx_object_id(w, 1, initiating_device_id.raw())?;
    encode_ctx_object_id(w, 2, monitored_object_id.raw())?;
    encode_ctx_unsigned(w, 3, time_remaining_seconds)?;
    Tag::Opening { tag_num: 4 }.encode(w)?;
    for value in values {
        encode_ctx_unsigned(w, 0, value.property_id.to_u32())?;
        if let Some(idx) = value.array_index {
            encode_ctx_unsigned(w, 1, idx)?;
        }
        Tag::Opening { tag_num: 2 }.encode(w)?;
        encode_property_value(w, &value.value)?;
        Tag::Closing { tag_num: 2 }.encode(w)?;
        if let Some(priority) = value.priority {
            encode_ctx_unsigned(w, 3, priority as u32)?;
        }
    }
    Tag::Closing { tag_num: 4 }.encode(w)
}

#[cfg(feature = "alloc")]
#[allow(clippy::too_many_arguments)]
pub fn encode_unconfirmed_cov_notification(
    w: &mut Writer<'_>,
    subscriber_process_id: u32,
    initiating_device_id: ObjectId,
    monitored_object_id: ObjectId,
    time_remaining_seconds: u32,
    values: &[CovValue],
) -> Result<(), EncodeError> {
    UnconfirmedRequestHeader::new(SERVICE_UNCONFIRMED_COV_NOTIFICATION).encode(w)?;
    encode_payload(
        w,
        subscriber_process_id,
        initiating_device_id,
        monitored_object_id,
        time_remaining_seconds,
        values,
    )
}

#[cfg(feature = "alloc")]
#[allow(clippy::too_many_arguments)]
pub fn encode_confirmed_cov_notification(
    w: &mut Writer<'_>,
    invoke_id: u8,
    subscriber_process_id: u32,
    initiating_device_id: ObjectId,
    monitored_object_id: ObjectId,
    time_remaining_seconds: u32,
    values: &[CovValue],
) -> Result<(), EncodeError> {
    ConfirmedRequestHeader::simple(invoke_id, SERVICE_CONFIRMED_COV_NOTIFICATION).encode(w)?;
    encode_payload(
        w,
        subscriber_process_id,
        initiating_device_id,
        monitored_object_id,
        time_remaining_seconds,
        values,
    )
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{encode_unconfirmed_cov_notification, CovNotification, CovValue};
    use crate::apdu::UnconfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{DataValue, ObjectId, ObjectType, PropertyId, PropertyValue};
    use alloc::vec;

    #[test]
    fn notification_roundtrip() {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        encode_unconfirmed_cov_notification(
            &mut w,
            42,
            ObjectId::new(ObjectType::Device, 1000),
            ObjectId::new(ObjectType::AnalogValue, 1),
            55,
            &[
                CovValue {
                    property_id: PropertyId::PresentValue,
                    array_index: None,
                    value: PropertyValue::Real(5.0),
                    priority: None,
                },
                CovValue {
                    property_id: PropertyId::StatusFlags,
                    array_index: None,
                    value: PropertyValue::BitString {
                        unused_bits: 4,
                        data: vec![0x00],
                    },
                    priority: None,
                },
            ],
        )
        .unwrap();

        let mut r = Reader::new(w.as_written());
        UnconfirmedRequestHeader::decode(&mut r).unwrap();
        let dec = CovNotification::decode_after_header(&mut r).unwrap();
        assert_eq!(dec.subscriber_process_id, 42);
        assert_eq!(dec.time_remaining_seconds, 55);
        assert_eq!(dec.values.len(), 2);
        assert_eq!(dec.values[0].value, DataValue::Real(5.0));
    }
}
