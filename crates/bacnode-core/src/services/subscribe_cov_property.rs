use crate::apdu::ConfirmedRequestHeader;
use crate::encoding::{
    primitives::{decode_ctx_real, encode_ctx_object_id, encode_ctx_real, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::{
    decode_optional_ctx_boolean, decode_optional_ctx_unsigned, decode_required_ctx_object_id,
    decode_required_ctx_unsigned, expect_closing, expect_opening,
};
use crate::types::{ObjectId, PropertyId};
use crate::{DecodeError, EncodeError};

pub const SERVICE_SUBSCRIBE_COV_PROPERTY: u8 = 0x1C;

/// SubscribeCOVProperty: a property-level COV subscription with an optional
/// client-supplied COV increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscribeCovPropertyRequest {
    pub subscriber_process_id: u32,
    pub monitored_object_id: ObjectId,
    pub issue_confirmed_notifications: Option<bool>,
    pub lifetime_seconds: Option<u32>,
    pub monitored_property_id: PropertyId,
    pub monitored_property_array_index: Option<u32>,
    pub cov_increment: Option<f32>,
    pub invoke_id: u8,
}

impl SubscribeCovPropertyRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_SUBSCRIBE_COV_PROPERTY)
            .encode(w)?;
        encode_ctx_unsigned(w, 0, self.subscriber_process_id)?;
        encode_ctx_object_id(w, 1, self.monitored_object_id.raw())?;
        if let Some(issue_confirmed) = self.issue_confirmed_notifications {
            Tag::Context { tag_num: 2, len: 1 }.encode(w)?;
            w.write_u8(if issue_confirmed { 1 } else { 0 })?;
        }
        if let Some(lifetime_seconds) = self.lifetime_seconds {
            encode_ctx_unsigned(w, 3, lifetime_seconds)?;
        }
        Tag::Opening { tag_num: 4 }.encode(w)?;
        encode_ctx_unsigned(w, 0, self.monitored_property_id.to_u32())?;
        if let Some(idx) = self.monitored_property_array_index {
            encode_ctx_unsigned(w, 1, idx)?;
        }
        Tag::Closing { tag_num: 4 }.encode(w)?;
        if let Some(increment) = self.cov_increment {
            encode_ctx_real(w, 5, increment)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let subscriber_process_id = decode_required_ctx_unsigned(r, 0)?;
        let monitored_object_id = decode_required_ctx_object_id(r, 1)?;
        let issue_confirmed_notifications = decode_optional_ctx_boolean(r, 2)?;
        let lifetime_seconds = decode_optional_ctx_unsigned(r, 3)?;
        expect_opening(r, 4)?;
        let monitored_property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 0)?);
        let monitored_property_array_index = decode_optional_ctx_unsigned(r, 1)?;
        expect_closing(r, 4)?;
        let cov_increment = if r.is_empty() {
            None
        } else {
            match Tag::decode(r)? {
                Tag::Context { tag_num: 5, len } => Some(decode_ctx_real(r, len as usize)?),
                _ => return Err(DecodeError::UnexpectedTag),
            }
        };
        Ok(Self {
            subscriber_process_id,
            monitored_object_id,
            issue_confirmed_notifications,
            lifetime_seconds,
            monitored_property_id,
            monitored_property_array_index,
            cov_increment,
            invoke_id,
        })
    }

    pub const fn is_cancellation(&self) -> bool {
        self.issue_confirmed_notifications.is_none() && self.lifetime_seconds.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::SubscribeCovPropertyRequest;
    use crate::apdu::ConfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType, PropertyId};

    #[test]
    fn roundtrip_with_increment() {
        let req = SubscribeCovPropertyRequest {
            subscriber_process_id: 9,
            monitored_object_id: ObjectId::new(ObjectType::AnalogInput, 4),
            issue_confirmed_notifications: Some(true),
            lifetime_seconds: Some(300),
            monitored_property_id: PropertyId::PresentValue,
            monitored_property_array_index: None,
            cov_increment: Some(0.25),
            invoke_id: 8,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            SubscribeCovPropertyRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }
}
