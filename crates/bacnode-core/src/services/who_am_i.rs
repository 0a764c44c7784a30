use crate::apdu::UnconfirmedRequestHeader;
use crate::encoding::{
    primitives::{
        decode_app_unsigned, encode_app_character_string, encode_app_unsigned,
        encode_ctx_object_id,
    },
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
use crate::services::decode_optional_ctx_unsigned;
use crate::types::ObjectId;
use crate::{DecodeError, EncodeError};

pub const SERVICE_WHO_AM_I: u8 = 0x0D;
pub const SERVICE_YOU_ARE: u8 = 0x0E;

/// Who-Am-I: a device without a configured instance number announces its
/// vendor/model/serial triple and asks to be assigned one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhoAmIRequest<'a> {
    pub vendor_id: u32,
    pub model_name: &'a str,
    pub serial_number: &'a str,
}

impl<'a> WhoAmIRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_WHO_AM_I).encode(w)?;
        encode_app_unsigned(w, self.vendor_id)?;
        encode_app_character_string(w, self.model_name)?;
        encode_app_character_string(w, self.serial_number)
    }

    pub fn decode_after_header(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let vendor_id = decode_app_unsigned(r)?;
        let model_name = decode_app_string(r)?;
        let serial_number = decode_app_string(r)?;
        Ok(Self {
            vendor_id,
            model_name,
            serial_number,
        })
    }
}

/// You-Are: assigns a device instance (and optionally a MAC) to the device
/// matching the vendor/model/serial triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YouAreRequest<'a> {
    pub vendor_id: u32,
    pub model_name: &'a str,
    pub serial_number: &'a str,
    pub device_id: Option<ObjectId>,
    pub device_mac: Option<&'a [u8]>,
}

impl<'a> YouAreRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        UnconfirmedRequestHeader::new(SERVICE_YOU_ARE).encode(w)?;
        encode_app_unsigned(w, self.vendor_id)?;
        encode_app_character_string(w, self.model_name)?;
        encode_app_character_string(w, self.serial_number)?;
        if let Some(device_id) = self.device_id {
            encode_ctx_object_id(w, 0, device_id.raw())?;
        }
        if let Some(mac) = self.device_mac {
            Tag::Context {
                tag_num: 1,
                len: mac.len() as u32,
            }
            .encode(w)?;
            w.write_all(mac)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let vendor_id = decode_app_unsigned(r)?;
        let model_name = decode_app_string(r)?;
        let serial_number = decode_app_string(r)?;
        let device_id = decode_optional_ctx_unsigned(r, 0)?.map(ObjectId::from_raw);
        let device_mac = if r.is_empty() {
            None
        } else {
            match Tag::decode(r)? {
                Tag::Context { tag_num: 1, len } => Some(r.read_exact(len as usize)?),
                _ => return Err(DecodeError::UnexpectedTag),
            }
        };
        Ok(Self {
            vendor_id,
            model_name,
            serial_number,
            device_id,
            device_mac,
        })
    }
}

fn decode_app_string<'a>(r: &mut Reader<'a>) -> Result<&'a str, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::CharacterString,
            len,
        } => {
            if len == 0 {
                return Err(DecodeError::InvalidLength);
            }
            let raw = r.read_exact(len as usize)?;
            if raw[0] != 0 {
                return Err(DecodeError::UnknownCharacterSet(raw[0]));
            }
            core::str::from_utf8(&raw[1..]).map_err(|_| DecodeError::InvalidValue)
        }
        _ => Err(DecodeError::UnexpectedTag),
    }
}

#[cfg(test)]
mod tests {
    use super::{WhoAmIRequest, YouAreRequest};
    use crate::apdu::UnconfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType};

    #[test]
    fn who_am_i_roundtrip() {
        let req = WhoAmIRequest {
            vendor_id: 999,
            model_name: "bacnode-1",
            serial_number: "SN-0042",
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        UnconfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(WhoAmIRequest::decode_after_header(&mut r).unwrap(), req);
    }

    #[test]
    fn you_are_roundtrip() {
        let req = YouAreRequest {
            vendor_id: 999,
            model_name: "bacnode-1",
            serial_number: "SN-0042",
            device_id: Some(ObjectId::new(ObjectType::Device, 77)),
            device_mac: None,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        UnconfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(YouAreRequest::decode_after_header(&mut r).unwrap(), req);
    }
}
