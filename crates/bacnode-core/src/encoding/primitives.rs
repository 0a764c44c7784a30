use crate::encoding::{
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
use crate::types::{Date, Time};
use crate::{DecodeError, EncodeError};

pub fn encode_unsigned(w: &mut Writer<'_>, value: u32) -> Result<usize, EncodeError> {
    let len = if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFF_FFFF {
        3
    } else {
        4
    };

    for i in (0..len).rev() {
        let b = ((value >> (i * 8)) & 0xFF) as u8;
        w.write_u8(b)?;
    }
    Ok(len)
}

pub fn decode_unsigned(r: &mut Reader<'_>, len: usize) -> Result<u32, DecodeError> {
    if len == 0 || len > 4 {
        return Err(DecodeError::InvalidLength);
    }
    let mut value = 0u32;
    for _ in 0..len {
        value = (value << 8) | r.read_u8()? as u32;
    }
    Ok(value)
}

pub fn encode_signed(w: &mut Writer<'_>, value: i32) -> Result<usize, EncodeError> {
    let value64 = value as i64;
    let len = if (-128..=127).contains(&value64) {
        1
    } else if (-32768..=32767).contains(&value64) {
        2
    } else if (-8_388_608..=8_388_607).contains(&value64) {
        3
    } else {
        4
    };

    let bytes = value.to_be_bytes();
    w.write_all(&bytes[4 - len..])?;
    Ok(len)
}

pub fn decode_signed(r: &mut Reader<'_>, len: usize) -> Result<i32, DecodeError> {
    if len == 0 || len > 4 {
        return Err(DecodeError::InvalidLength);
    }

    let bytes = r.read_exact(len)?;
    let mut out = [0u8; 4];
    out[4 - len..].copy_from_slice(bytes);
    if (bytes[0] & 0x80) != 0 {
        for b in &mut out[..4 - len] {
            *b = 0xFF;
        }
    }
    Ok(i32::from_be_bytes(out))
}

pub fn encode_app_null(w: &mut Writer<'_>) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::Null,
        len: 0,
    }
    .encode(w)
}

pub fn encode_app_boolean(w: &mut Writer<'_>, value: bool) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::Boolean,
        len: if value { 1 } else { 0 },
    }
    .encode(w)
}

pub fn encode_app_unsigned(w: &mut Writer<'_>, value: u32) -> Result<(), EncodeError> {
    let mut scratch = [0u8; 4];
    let mut tw = Writer::new(&mut scratch);
    let len = encode_unsigned(&mut tw, value)? as u32;
    Tag::Application {
        tag: AppTag::UnsignedInt,
        len,
    }
    .encode(w)?;
    w.write_all(&scratch[..len as usize])
}

pub fn encode_app_enumerated(w: &mut Writer<'_>, value: u32) -> Result<(), EncodeError> {
    let mut scratch = [0u8; 4];
    let mut tw = Writer::new(&mut scratch);
    let len = encode_unsigned(&mut tw, value)? as u32;
    Tag::Application {
        tag: AppTag::Enumerated,
        len,
    }
    .encode(w)?;
    w.write_all(&scratch[..len as usize])
}

pub fn encode_app_signed(w: &mut Writer<'_>, value: i32) -> Result<(), EncodeError> {
    let mut scratch = [0u8; 4];
    let mut tw = Writer::new(&mut scratch);
    let len = encode_signed(&mut tw, value)? as u32;
    Tag::Application {
        tag: AppTag::SignedInt,
        len,
    }
    .encode(w)?;
    w.write_all(&scratch[..len as usize])
}

pub fn encode_app_real(w: &mut Writer<'_>, value: f32) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::Real,
        len: 4,
    }
    .encode(w)?;
    w.write_all(&value.to_bits().to_be_bytes())
}

pub fn encode_app_double(w: &mut Writer<'_>, value: f64) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::Double,
        len: 8,
    }
    .encode(w)?;
    w.write_all(&value.to_bits().to_be_bytes())
}

pub fn encode_app_octet_string(w: &mut Writer<'_>, data: &[u8]) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::OctetString,
        len: u32::try_from(data.len()).map_err(|_| EncodeError::ValueOutOfRange)?,
    }
    .encode(w)?;
    w.write_all(data)
}

pub fn encode_app_character_string(w: &mut Writer<'_>, value: &str) -> Result<(), EncodeError> {
    let bytes = value.as_bytes();
    Tag::Application {
        tag: AppTag::CharacterString,
        len: u32::try_from(bytes.len() + 1).map_err(|_| EncodeError::ValueOutOfRange)?,
    }
    .encode(w)?;
    // Character set 0 = UTF-8 (ANSI X3.4 superset).
    w.write_u8(0)?;
    w.write_all(bytes)
}

pub fn encode_app_bit_string(
    w: &mut Writer<'_>,
    unused_bits: u8,
    data: &[u8],
) -> Result<(), EncodeError> {
    if unused_bits > 7 {
        return Err(EncodeError::ValueOutOfRange);
    }
    Tag::Application {
        tag: AppTag::BitString,
        len: u32::try_from(data.len() + 1).map_err(|_| EncodeError::ValueOutOfRange)?,
    }
    .encode(w)?;
    w.write_u8(unused_bits)?;
    w.write_all(data)
}

pub fn encode_app_date(w: &mut Writer<'_>, date: Date) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::Date,
        len: 4,
    }
    .encode(w)?;
    w.write_all(&[date.year_since_1900, date.month, date.day, date.weekday])
}

pub fn encode_app_time(w: &mut Writer<'_>, time: Time) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::Time,
        len: 4,
    }
    .encode(w)?;
    w.write_all(&[time.hour, time.minute, time.second, time.hundredths])
}

pub fn encode_app_object_id(w: &mut Writer<'_>, object_id_raw: u32) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::ObjectId,
        len: 4,
    }
    .encode(w)?;
    w.write_be_u32(object_id_raw)
}

pub fn decode_app_unsigned(r: &mut Reader<'_>) -> Result<u32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::UnsignedInt,
            len,
        } => decode_unsigned(r, len as usize),
        _ => Err(DecodeError::UnexpectedTag),
    }
}

pub fn decode_app_enumerated(r: &mut Reader<'_>) -> Result<u32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::Enumerated,
            len,
        } => decode_unsigned(r, len as usize),
        _ => Err(DecodeError::UnexpectedTag),
    }
}

pub fn decode_app_signed(r: &mut Reader<'_>) -> Result<i32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::SignedInt,
            len,
        } => decode_signed(r, len as usize),
        _ => Err(DecodeError::UnexpectedTag),
    }
}

pub fn decode_app_real(r: &mut Reader<'_>) -> Result<f32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::Real,
            len: 4,
        } => {
            let bytes = r.read_exact(4)?;
            Ok(f32::from_bits(u32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ])))
        }
        _ => Err(DecodeError::UnexpectedTag),
    }
}

pub fn decode_app_object_id_raw(r: &mut Reader<'_>) -> Result<u32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::ObjectId,
            len: 4,
        } => r.read_be_u32(),
        _ => Err(DecodeError::UnexpectedTag),
    }
}

pub fn decode_app_date(r: &mut Reader<'_>) -> Result<Date, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::Date,
            len: 4,
        } => {
            let b = r.read_exact(4)?;
            Ok(Date {
                year_since_1900: b[0],
                month: b[1],
                day: b[2],
                weekday: b[3],
            })
        }
        _ => Err(DecodeError::UnexpectedTag),
    }
}

pub fn decode_app_time(r: &mut Reader<'_>) -> Result<Time, DecodeError> {
    match Tag::decode(r)? {
        Tag::Application {
            tag: AppTag::Time,
            len: 4,
        } => {
            let b = r.read_exact(4)?;
            Ok(Time {
                hour: b[0],
                minute: b[1],
                second: b[2],
                hundredths: b[3],
            })
        }
        _ => Err(DecodeError::UnexpectedTag),
    }
}

pub fn encode_ctx_unsigned(w: &mut Writer<'_>, tag_num: u8, value: u32) -> Result<(), EncodeError> {
    let mut scratch = [0u8; 4];
    let mut tw = Writer::new(&mut scratch);
    let len = encode_unsigned(&mut tw, value)? as u32;
    Tag::Context { tag_num, len }.encode(w)?;
    w.write_all(&scratch[..len as usize])
}

pub fn encode_ctx_object_id(
    w: &mut Writer<'_>,
    tag_num: u8,
    object_id_raw: u32,
) -> Result<(), EncodeError> {
    Tag::Context { tag_num, len: 4 }.encode(w)?;
    w.write_be_u32(object_id_raw)
}

pub fn encode_ctx_signed(w: &mut Writer<'_>, tag_num: u8, value: i32) -> Result<(), EncodeError> {
    let mut scratch = [0u8; 4];
    let mut tw = Writer::new(&mut scratch);
    let len = encode_signed(&mut tw, value)? as u32;
    Tag::Context { tag_num, len }.encode(w)?;
    w.write_all(&scratch[..len as usize])
}

pub fn encode_ctx_enumerated(
    w: &mut Writer<'_>,
    tag_num: u8,
    value: u32,
) -> Result<(), EncodeError> {
    encode_ctx_unsigned(w, tag_num, value)
}

pub fn encode_ctx_boolean(w: &mut Writer<'_>, tag_num: u8, value: bool) -> Result<(), EncodeError> {
    Tag::Context { tag_num, len: 1 }.encode(w)?;
    w.write_u8(if value { 1 } else { 0 })
}

pub fn encode_ctx_real(w: &mut Writer<'_>, tag_num: u8, value: f32) -> Result<(), EncodeError> {
    Tag::Context { tag_num, len: 4 }.encode(w)?;
    w.write_all(&value.to_bits().to_be_bytes())
}

pub fn encode_ctx_character_string(
    w: &mut Writer<'_>,
    tag_num: u8,
    value: &str,
) -> Result<(), EncodeError> {
    let bytes = value.as_bytes();
    Tag::Context {
        tag_num,
        len: (bytes.len() + 1) as u32,
    }
    .encode(w)?;
    w.write_u8(0)?;
    w.write_all(bytes)
}

pub fn encode_ctx_octet_string(
    w: &mut Writer<'_>,
    tag_num: u8,
    data: &[u8],
) -> Result<(), EncodeError> {
    Tag::Context {
        tag_num,
        len: u32::try_from(data.len()).map_err(|_| EncodeError::ValueOutOfRange)?,
    }
    .encode(w)?;
    w.write_all(data)
}

pub fn encode_ctx_bit_string(
    w: &mut Writer<'_>,
    tag_num: u8,
    unused_bits: u8,
    data: &[u8],
) -> Result<(), EncodeError> {
    if unused_bits > 7 {
        return Err(EncodeError::ValueOutOfRange);
    }
    Tag::Context {
        tag_num,
        len: u32::try_from(data.len() + 1).map_err(|_| EncodeError::ValueOutOfRange)?,
    }
    .encode(w)?;
    w.write_u8(unused_bits)?;
    w.write_all(data)
}

pub fn encode_ctx_date(w: &mut Writer<'_>, tag_num: u8, date: Date) -> Result<(), EncodeError> {
    Tag::Context { tag_num, len: 4 }.encode(w)?;
    w.write_all(&[date.year_since_1900, date.month, date.day, date.weekday])
}

pub fn encode_ctx_time(w: &mut Writer<'_>, tag_num: u8, time: Time) -> Result<(), EncodeError> {
    Tag::Context { tag_num, len: 4 }.encode(w)?;
    w.write_all(&[time.hour, time.minute, time.second, time.hundredths])
}

pub fn decode_ctx_character_string<'a>(
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

pub fn decode_ctx_real(r: &mut Reader<'_>, len: usize) -> Result<f32, DecodeError> {
    if len != 4 {
        return Err(DecodeError::InvalidLength);
    }
    let bytes = r.read_exact(4)?;
    Ok(f32::from_bits(u32::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3],
    ])))
}

pub fn encode_opening_tag(w: &mut Writer<'_>, tag_num: u8) -> Result<(), EncodeError> {
    Tag::Opening { tag_num }.encode(w)
}

pub fn encode_closing_tag(w: &mut Writer<'_>, tag_num: u8) -> Result<(), EncodeError> {
    Tag::Closing { tag_num }.encode(w)
}
