use crate::apdu::ConfirmedRequestHeader;
use crate::encoding::{
    primitives::{decode_ctx_character_string, encode_ctx_character_string, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
use crate::services::{decode_optional_ctx_unsigned, decode_required_ctx_unsigned};
use crate::types::{EnableDisable, ReinitializedState};
use crate::{DecodeError, EncodeError};

pub const SERVICE_DEVICE_COMMUNICATION_CONTROL: u8 = 0x11;
pub const SERVICE_REINITIALIZE_DEVICE: u8 = 0x14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCommunicationControlRequest<'a> {
    /// Minutes until communication is automatically restored.
    pub time_duration_minutes: Option<u16>,
    pub enable_disable: EnableDisable,
    pub password: Option<&'a str>,
    pub invoke_id: u8,
}

impl<'a> DeviceCommunicationControlRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_DEVICE_COMMUNICATION_CONTROL)
            .encode(w)?;
        if let Some(minutes) = self.time_duration_minutes {
            encode_ctx_unsigned(w, 0, minutes as u32)?;
        }
        encode_ctx_unsigned(w, 1, self.enable_disable.to_u32())?;
        if let Some(password) = self.password {
            encode_ctx_character_string(w, 2, password)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'a>, invoke_id: u8) -> Result<Self, DecodeError> {
        let time_duration_minutes = match decode_optional_ctx_unsigned(r, 0)? {
            Some(v) if v <= u16::MAX as u32 => Some(v as u16),
            Some(_) => return Err(DecodeError::InvalidValue),
            None => None,
        };
        let enable_disable = EnableDisable::from_u32(decode_required_ctx_unsigned(r, 1)?)
            .ok_or(DecodeError::InvalidValue)?;
        let password = if r.is_empty() {
            None
        } else {
            match Tag::decode(r)? {
                Tag::Context { tag_num: 2, len } => {
                    Some(decode_ctx_character_string(r, len as usize)?)
                }
                _ => return Err(DecodeError::UnexpectedTag),
            }
        };
        Ok(Self {
            time_duration_minutes,
            enable_disable,
            password,
            invoke_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReinitializeDeviceRequest<'a> {
    pub state: ReinitializedState,
    pub password: Option<&'a str>,
    pub invoke_id: u8,
}

impl<'a> ReinitializeDeviceRequest<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_REINITIALIZE_DEVICE).encode(w)?;
        encode_ctx_unsigned(w, 0, self.state.to_u32())?;
        if let Some(password) = self.password {
            encode_ctx_character_string(w, 1, password)?;
        }
        Ok(())
    }

    pub fn decode_after_header(r: &mut Reader<'a>, invoke_id: u8) -> Result<Self, DecodeError> {
        let state = ReinitializedState::from_u32(decode_required_ctx_unsigned(r, 0)?)
            .ok_or(DecodeError::InvalidValue)?;
        let password = if r.is_empty() {
            None
        } else {
            match Tag::decode(r)? {
                Tag::Context { tag_num: 1, len } => {
                    Some(decode_ctx_character_string(r, len as usize)?)
                }
                _ => return Err(DecodeError::UnexpectedTag),
            }
        };
        Ok(Self {
            state,
            password,
            invoke_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceCommunicationControlRequest, ReinitializeDeviceRequest};
    use crate::apdu::ConfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{EnableDisable, ReinitializedState};

    #[test]
    fn dcc_roundtrip() {
        let req = DeviceCommunicationControlRequest {
            time_duration_minutes: Some(5),
            enable_disable: EnableDisable::Disable,
            password: Some("secret"),
            invoke_id: 2,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            DeviceCommunicationControlRequest::decode_after_header(&mut r, header.invoke_id)
                .unwrap(),
            req
        );
    }

    #[test]
    fn reinitialize_roundtrip() {
        let req = ReinitializeDeviceRequest {
            state: ReinitializedState::Warmstart,
            password: None,
            invoke_id: 3,
        };
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            ReinitializeDeviceRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }
}
