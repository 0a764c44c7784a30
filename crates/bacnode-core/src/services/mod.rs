pub mod acknowledge_alarm;
pub mod alarm_summary;
pub mod atomic_read_file;
pub mod atomic_write_file;
pub mod cov_notification;
pub mod device_management;
pub mod enrollment_summary;
pub mod event_information;
pub mod event_notification;
pub mod i_am;
pub mod list_element;
pub mod object_management;
pub mod private_transfer;
pub mod read_property;
pub mod read_property_multiple;
pub mod read_range;
pub mod subscribe_cov;
pub mod subscribe_cov_property;
pub mod text_message;
pub mod time_synchronization;
pub mod timestamp;
pub mod value_codec;
pub mod who_am_i;
pub mod who_has;
pub mod who_is;
pub mod write_group;
pub mod write_property;
pub mod write_property_multiple;

use crate::encoding::{primitives::decode_unsigned, reader::Reader, tag::Tag};
use crate::types::ObjectId;
use crate::DecodeError;

/// Decode a required context-tagged unsigned integer at the expected tag number.
pub(crate) fn decode_required_ctx_unsigned(
    r: &mut Reader<'_>,
    expected_tag_num: u8,
) -> Result<u32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Context { tag_num, len } if tag_num == expected_tag_num => {
            decode_unsigned(r, len as usize)
        }
        _ => Err(DecodeError::UnexpectedTag),
    }
}

/// Decode a required context-tagged BACnet object identifier at the expected tag number.
pub(crate) fn decode_required_ctx_object_id(
    r: &mut Reader<'_>,
    expected_tag_num: u8,
) -> Result<ObjectId, DecodeError> {
    Ok(ObjectId::from_raw(decode_required_ctx_unsigned(
        r,
        expected_tag_num,
    )?))
}

/// Decode an optional context-tagged unsigned at the expected tag number,
/// rewinding if the next tag is something else.
pub(crate) fn decode_optional_ctx_unsigned(
    r: &mut Reader<'_>,
    expected_tag_num: u8,
) -> Result<Option<u32>, DecodeError> {
    if r.is_empty() {
        return Ok(None);
    }
    let checkpoint = *r;
    match Tag::decode(r) {
        Ok(Tag::Context { tag_num, len }) if tag_num == expected_tag_num => {
            Ok(Some(decode_unsigned(r, len as usize)?))
        }
        _ => {
            *r = checkpoint;
            Ok(None)
        }
    }
}

/// Decode an optional context-tagged boolean at the expected tag number.
pub(crate) fn decode_optional_ctx_boolean(
    r: &mut Reader<'_>,
    expected_tag_num: u8,
) -> Result<Option<bool>, DecodeError> {
    Ok(decode_optional_ctx_unsigned(r, expected_tag_num)?.map(|v| v != 0))
}

/// Consume a required opening tag.
pub(crate) fn expect_opening(r: &mut Reader<'_>, tag_num: u8) -> Result<(), DecodeError> {
    match Tag::decode(r)? {
        Tag::Opening { tag_num: t } if t == tag_num => Ok(()),
        _ => Err(DecodeError::UnexpectedTag),
    }
}

/// Consume a required closing tag.
pub(crate) fn expect_closing(r: &mut Reader<'_>, tag_num: u8) -> Result<(), DecodeError> {
    match Tag::decode(r)? {
        Tag::Closing { tag_num: t } if t == tag_num => Ok(()),
        _ => Err(DecodeError::UnexpectedTag),
    }
}

/// True if the next tag is the given opening tag (reader not advanced).
pub(crate) fn peek_opening(r: &Reader<'_>, tag_num: u8) -> bool {
    let mut probe = *r;
    matches!(Tag::decode(&mut probe), Ok(Tag::Opening { tag_num: t }) if t == tag_num)
}

/// True if the next tag is the given closing tag (reader not advanced).
pub(crate) fn peek_closing(r: &Reader<'_>, tag_num: u8) -> bool {
    let mut probe = *r;
    matches!(Tag::decode(&mut probe), Ok(Tag::Closing { tag_num: t }) if t == tag_num)
}
