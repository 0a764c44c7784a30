use crate::apdu::UnconfirmedRequestHeader;
use crate::encoding::primitives::{
    decode_app_object_id_raw, decode_ctx_character_string, decode_unsigned,
    encode_app_character_string, encode_app_object_id, encode_ctx_character_string,
    encode_ctx_object_id, encode_ctx_unsigned,
};
use crate::encoding::{reader::Reader, tag::Tag, writer::Writer};
use crate::services::decode_optional_ctx_unsigned;
use crate::types::ObjectId;
use crate::{DecodeError, EncodeError};

pub const SERVICE_I_HAVE: u8 = 0x01;
pub const SERVICE_WHO_HAS: u8 = 0x07;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhoHasObject<'a> {
    ObjectId(ObjectId),
    ObjectName(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhoHasRequest<'a> {
    pub low_limit: Option<u32>,
    pub high_limit: Option<u32>,
    pub object: WhoHasObject<'a>,
}

impl<'a> WhoHasRequest<'a> {
    pub fn covers(&self, instance: u32) -> bool {
        match (self.low_limit, self.high_limit) {
            (Some(low), Some(high)) => (low..=high).contains(&instance),
            _ => true,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_WHO_HAS).encode(w)?;
        if let Some(low) = self.low_limit {
            encode_ctx_unsigned(w, 0, low)?;
        }
        if let Some(high) = self.high_limit {
            encode_ctx_unsigned(w, 1, high)?;
        }
        match self.object {
            WhoHasObject::ObjectId(id) => encode_ctx_object_id(w, 2, id.raw()),
            WhoHasObject::ObjectName(name) => encode_ctx_character_string(w, 3, name),
        }
    }

    pub fn decode_after_header(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let low_limit = decode_optional_ctx_unsigned(r, 0)?;
        let high_limit = if low_limit.is_some() {
            decode_optional_ctx_unsigned(r, 1)?
        } else {
            None
        };
        let object = match Tag::decode(r)? {
            Tag::Context { tag_num: 2, len } => {
                WhoHasObject::ObjectId(ObjectId::from_raw(decode_unsigned(r, len as usize)?))
            }
            Tag::Context { tag_num: 3, len } => {
                WhoHasObject::ObjectName(decode_ctx_character_string(r, len as usize)?)
            }
            _ => return Err(DecodeError::UnexpectedTag),
        };
        Ok(Self {
            low_limit,
            high_limit,
            object,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IHaveRequest<'a> {
    pub device_id: ObjectId,
    pub object_id: ObjectId,
    pub object_name: &'a str,
}

impl<'a> IHaveRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_I_HAVE).encode(w)?;
        encode_app_object_id(w, self.device_id.raw())?;
        encode_app_object_id(w, self.object_id.raw())?;
        encode_app_character_string(w, self.object_name)
    }

    pub fn decode_after_header(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let device_id = ObjectId::from_raw(decode_app_object_id_raw(r)?);
        let object_id = ObjectId::from_raw(decode_app_object_id_raw(r)?);
        let object_name = match Tag::decode(r)? {
            Tag::Application {
                tag: crate::encoding::tag::AppTag::CharacterString,
                len,
            } => decode_raw_character_string(r, len as usize)?,
            _ => return Err(DecodeError::UnexpectedTag),
        };
        Ok(Self {
            device_id,
            object_id,
            object_name,
        })
    }
}

fn decode_raw_character_string<'a>(
    r: &mut Reader<'a>,
    len: usize,
) -> Result<&'a str, DecodeError> {
    if len == 0 {
        return Err(DecodeError::InvalidLength);
    }
    let raw = r.read_exact(len)?;
    if raw[0] != 0 {
        return Err(DecodeError::UnknownCharacterSet(raw[0]));
    }
    core::str::from_utf8(&raw[1..]).map_err(|_| DecodeError::InvalidValue)
}

#[cfg(test)]
mod tests {
    use super::{IHaveRequest, WhoHasObject, WhoHasRequest};
    use crate::apdu::UnconfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType};

    #[test]
    fn who_has_by_name_roundtrip() {
        let req = WhoHasRequest {
            low_limit: Some(1),
            high_limit: Some(99),
            object: WhoHasObject::ObjectName("zone-1-temp"),
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        UnconfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(WhoHasRequest::decode_after_header(&mut r).unwrap(), req);
    }

    #[test]
    fn i_have_roundtrip() {
        let req = IHaveRequest {
            device_id: ObjectId::new(ObjectType::Device, 9),
            object_id: ObjectId::new(ObjectType::AnalogInput, 3),
            object_name: "outdoor-air-temp",
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        UnconfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(IHaveRequest::decode_after_header(&mut r).unwrap(), req);
    }
}
