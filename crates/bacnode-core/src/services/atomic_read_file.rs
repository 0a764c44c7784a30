#[cfg(feature = "alloc")]
use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{
        decode_app_signed, decode_app_unsigned, decode_app_object_id_raw, encode_app_boolean,
        encode_app_object_id, encode_app_octet_string, encode_app_signed, encode_app_unsigned,
    },
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::{expect_closing};
#[cfg(feature = "alloc")]
use crate::types::ObjectId;
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_ATOMIC_READ_FILE: u8 = 0x06;

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFileAccess {
    Stream {
        file_start_position: i32,
        requested_octet_count: u32,
    },
    Record {
        file_start_record: i32,
        requested_record_count: u32,
    },
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicReadFileRequest {
    pub file_object_id: ObjectId,
    pub access: ReadFileAccess,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl AtomicReadFileRequest {
    pub fn stream(
        file_object_id: ObjectId,
        file_start_position: i32,
        requested_octet_count: u32,
        invoke_id: u8,
    ) -> Self {
        Self {
            file_object_id,
            access: ReadFileAccess::Stream {
                file_start_position,
                requested_octet_count,
            },
            invoke_id,
        }
    }

    pub fn record(
        file_object_id: ObjectId,
        file_start_record: i32,
        requested_record_count: u32,
        invoke_id: u8,
    ) -> Self {
        Self {
            file_object_id,
            access: ReadFileAccess::Record {
                file_start_record,
                requested_record_count,
            },
            invoke_id,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, SERVICE_ATOMIC_READ_FILE).encode(w)?;
        encode_app_object_id(w, self.file_object_id.raw())?;
        match self.access {
            ReadFileAccess::Stream {
                file_start_position,
                requested_octet_count,
            } => {
                Tag::Opening { tag_num: 0 }.encode(w)?;
                encode_app_signed(w, file_start_position)?;
                encode_app_unsigned(w, requested_octet_count)?;
                Tag::Closing { tag_num: 0 }.encode(w)
            }
            ReadFileAccess::Record {
                file_start_record,
                requested_record_count,
            } => {
                Tag::Opening { tag_num: 1 }.encode(w)?;
                encode_app_signed(w, file_start_record)?;
                encode_app_unsigned(w, requested_record_count)?;
                Tag::Closing { tag_num: 1 }.encode(w)
            }
        }
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let file_object_id = ObjectId::from_raw(decode_app_object_id_raw(r)?);
        let access = match Tag::decode(r)? {
            Tag::Opening { tag_num: 0 } => {
                let file_start_position = decode_app_signed(r)?;
                let requested_octet_count = decode_app_unsigned(r)?;
                expect_closing(r, 0)?;
                ReadFileAccess::Stream {
                    file_start_position,
                    requested_octet_count,
                }
            }
            Tag::Opening { tag_num: 1 } => {
                let file_start_record = decode_app_signed(r)?;
                let requested_record_count = decode_app_unsigned(r)?;
                expect_closing(r, 1)?;
                ReadFileAccess::Record {
                    file_start_record,
                    requested_record_count,
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

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFileAckAccess {
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
pub struct AtomicReadFileAck {
    pub end_of_file: bool,
    pub access: ReadFileAckAccess,
}

#[cfg(feature = "alloc")]
impl AtomicReadFileAck {
    pub fn encode_response(&self, w: &mut Writer<'_>, invoke_id: u8) -> Result<(), EncodeError> {
        ComplexAckHeader::simple(invoke_id, SERVICE_ATOMIC_READ_FILE).encode(w)?;
        encode_app_boolean(w, self.end_of_file)?;
        match &self.access {
            ReadFileAckAccess::Stream {
                file_start_position,
                file_data,
            } => {
                Tag::Opening { tag_num: 0 }.encode(w)?;
                encode_app_signed(w, *file_start_position)?;
                encode_app_octet_string(w, file_data)?;
                Tag::Closing { tag_num: 0 }.encode(w)
            }
            ReadFileAckAccess::Record {
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

    pub fn decode_after_header(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let end_of_file = match Tag::decode(r)? {
            Tag::Application {
                tag: AppTag::Boolean,
                len,
            } => len != 0,
            _ => return Err(DecodeError::UnexpectedTag),
        };
        let access = match Tag::decode(r)? {
            Tag::Opening { tag_num: 0 } => {
                let file_start_position = decode_app_signed(r)?;
                let file_data = decode_app_octet_string(r)?.to_vec();
                expect_closing(r, 0)?;
                ReadFileAckAccess::Stream {
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
                ReadFileAckAccess::Record {
                    file_start_record,
                    file_record_data,
                }
            }
            _ => return Err(DecodeError::UnexpectedTag),
        };
        Ok(Self {
            end_of_file,
            access,
        })
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
    use super::{AtomicReadFileAck, AtomicReadFileRequest, ReadFileAckAccess};
    use crate::apdu::{ComplexAckHeader, ConfirmedRequestHeader};
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType};
    use alloc::vec;

    #[test]
    fn stream_request_roundtrip() {
        let req = AtomicReadFileRequest::stream(ObjectId::new(ObjectType::File, 1), 0, 1024, 5);
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            AtomicReadFileRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }

    #[test]
    fn record_ack_roundtrip() {
        let ack = AtomicReadFileAck {
            end_of_file: true,
            access: ReadFileAckAccess::Record {
                file_start_record: 3,
                file_record_data: vec![vec![1, 2, 3], vec![4, 5]],
            },
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        ack.encode_response(&mut w, 5).unwrap();

        let mut r = Reader::new(w.as_written());
        ComplexAckHeader::decode(&mut r).unwrap();
        assert_eq!(AtomicReadFileAck::decode_after_header(&mut r).unwrap(), ack);
    }
}
