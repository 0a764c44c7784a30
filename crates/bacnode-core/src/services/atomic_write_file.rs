#[cfg(feature = "alloc")]
use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{
        decode_app_object_id_raw, decode_app_signed, decode_app_unsigned, decode_signed,
        encode_app_object_id, encode_app_octet_string, encode_app_signed, encode_app_unsigned,
        encode_ctx_signed,
    },
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::expect_closing;
#[cfg(feature = "alloc")]
use crate::types::ObjectId;
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_ATOMIC_WRITE_FILE: u8 = 0x07;

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFileAccess {
    Stream {
        file_start_position: i32,
        file_data: Vec<u8>,
    },
    Record {
        file_start_record: i32,
        file_record_data: Vec<Vec<u8>>,
    },
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicWriteFileRequest {
    pub file_object_id: ObjectId,
    pub access: WriteFileAccess,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl AtomicWriteFileRequest {
    pub fn stream(
        file_object_id: ObjectId,
        file_start_position: i32,
        file_data: Vec<u8>,
        invoke_id: u8,
    ) -> Self {
        Self {
            file_object_id,
            access: WriteFileAccess::Stream {
                file_start_position,
                file_data,
            },
            invoke_id,
        }
    }

    pub fn record(
        file_object_id: ObjectId,
        file_start_record: i32,
        file_record_data: Vec<Vec<u8>>,
        invoke_id: u8,
    ) -> Self {
        Self {
            file_object_id,
            access: WriteFileAccess::Record {
                file_start_record,
                file_record_data,
            },
            invoke_id,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_ATOMIC_WRITE_FILE).encode(w)?;
        encode_app_object_id(w, self.file_object_id.raw())?;
        match &self.access {
            WriteFileAccess::Stream {
                file_start_position,
                file_data,
            } => {
                Tag::Opening { tag_num: 0 }.encode(w)?;
                encode_app_signed(w, *file_start_position)?;
                encode_app_octet_string(w, file_data)?;
                Tag::Closing { tag_num: 0 }.encode(w)
            }
            WriteFileAccess::Record {
                file_start_record,
                file_record_data,
            } => {
                Tag::Opening { tag_num: 1 }.encode(w)?;
                encode_app_signed(w, *file_start_record)?;
                encode_app_unsigned(w, file_record_data.len() as u32)?;
                for record in file_record_data {
                    encode_app_octet_string(w, record)?;
                }
                Tag::Closing { tag_num: 1 }.encode(w)
            }
        }
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let file_object_id = ObjectId::from_raw(decode_app_object_id_raw(r)?);
        let access = match Tag::decode(r)? {
            Tag::Opening { tag_num: 0 } => {
                let file_start_position = decode_app_signed(r)?;
                let file_data = decode_app_octet_string(r)?.to_vec();
                expect_closing(r, 0)?;
                WriteFileAccess::Stream {
                    file_start_position,
                    file_data,
                }
            }
            Tag::Opening { tag_num: 1 } => {
                let file_start_record = decode_app_signed(r)?;
                let count = decode_app_unsigned(r)?;
                let mut file_record_data = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    file_record_data.push(decode_app_octet_string(r)?.to_vec());
                }
                expect_closing(r, 1)?;
                WriteFileAccess::Record {
                    file_start_record,
                    file_record_data,
                }
            }
            _ => return Err(DecodeError::UnexpectedTag),
        };
        Ok(Self {
            file_object_id,
            access,
            invoke_id,
        })
    }
}

/// The file position (stream) or record number (record) where the write
/// actually started.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicWriteFileAck {
    Stream { file_start_position: i32 },
    Record { file_start_record: i32 },
}

#[cfg(feature = "alloc")]
impl AtomicWriteFileAck {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_ATOMIC_WRITE_FILE).encode(w)?;
        match self {
            Self::Stream {
                file_start_position,
            } => encode_ctx_signed(w, 0, *file_start_position),
            Self::Record { file_start_record } => encode_ctx_signed(w, 1, *file_start_record),
        }
    }

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        match Tag::decode(r)? {
            Tag::Context { tag_num: 0, len } => Ok(Self::Stream {
                file_start_position: decode_signed(r, len as usize)?,
            }),
            Tag::Context { tag_num: 1, len } => Ok(Self::Record {
                file_start_record: decode_signed(r, len as usize)?,
            }),
            _ => Err(DecodeError::UnexpectedTag),
        }
    }
}

#[cfg(feature = "alloc")]
fn decode_app_octet_string<'a>(r: &mut Reader<'a>) -> Result<&'a [u8], DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::OctetString,
            len,
        } => r.read_exact(len as usize),
        _ => Err(DecodeError::UnexpectedTag),
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{AtomicWriteFileAck, AtomicWriteFileRequest};
    use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType};
    use alloc::vec;

    #[test]
    fn stream_request_roundtrip() {
        let req = AtomicWriteFileRequest::stream(
            ObjectId::new(ObjectType::File, 2),
            128,
            vec![9, 8, 7],
            6,
        );
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            AtomicWriteFileRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }

    #[test]
    fn ack_roundtrip() {
        let ack = AtomicWriteFileAck::Stream {
            file_start_position: 128,
        };
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        ack.encode_response(&mut w, 6).unwrap();

        let mut r = Reader::new(w.as_written());
        ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(
            AtomicWriteFileAck::decode_after_header(&mut r).unwrap(),
            ack
        );
    }
}
