#[cfg(feature = "alloc")]
use crate::apdu::ConfirmedRequestHeader;
#[cfg(feature = "alloc")]
use crate::encoding::{
    primitives::{encode_ctx_object_id, encode_ctx_unsigned},
    reader::Reader,
    tag::Tag,
    writer::Writer,
};
#[cfg(feature = "alloc")]
use crate::services::value_codec::{decode_property_values, encode_property_value};
#[cfg(feature = "alloc")]
use crate::services::{
    decode_optional_ctx_unsigned, decode_required_ctx_object_id, decode_required_ctx_unsigned,
    expect_closing, expect_opening,
};
#[cfg(feature = "alloc")]
use crate::types::{ObjectId, PropertyId, PropertyValue};
#[cfg(feature = "alloc")]
use crate::{DecodeError, EncodeError};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SERVICE_ADD_LIST_ELEMENT: u8 = 0x08;
pub const SERVICE_REMOVE_LIST_ELEMENT: u8 = 0x09;

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq)]
pub struct ListElementRequest {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
    pub elements: Vec<PropertyValue>,
    pub invoke_id: u8,
}

#[cfg(feature = "alloc")]
impl ListElementRequest {
    fn encode_with_choice(&self, w: &mut Writer<'_>, service_choice: u8) -> Result<(), EncodeError> {
        ConfirmedRequestHeader::simple(self.invoke_id, service_choice).encode(w)?;
        encode_ctx_object_id(w, 0, self.object_id.raw())?;
        encode_ctx_unsigned(w, 1, self.property_id.to_u32())?;
        if let Some(idx) = self.array_index {
            encode_ctx_unsigned(w, 2, idx)?;
        }
        Tag::Opening { tag_num: 3 }.encode(w)?;
        for element in &self.elements {
            encode_property_value(w, element)?;
        }
        Tag::Closing { tag_num: 3 }.encode(w)
    }

    pub fn encode_add(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        self.encode_with_choice(w, SERVICE_ADD_LIST_ELEMENT)
    }

    pub fn encode_remove(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        self.encode_with_choice(w, SERVICE_REMOVE_LIST_ELEMENT)
    }

    pub fn decode_after_header(r: &mut Reader<'_>, invoke_id: u8) -> Result<Self, DecodeError> {
        let object_id = decode_required_ctx_object_id(r, 0)?;
        let property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 1)?);
        let array_index = decode_optional_ctx_unsigned(r, 2)?;
        expect_opening(r, 3)?;
        let elements = decode_property_values(r, 3)?;
        expect_closing(r, 3)?;
        Ok(Self {
            object_id,
            property_id,
            array_index,
            elements,
            invoke_id,
        })
    }
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::ListElementRequest;
    use crate::apdu::ConfirmedRequestHeader;
    use crate::encoding::{reader::Reader, writer::Writer};
    use crate::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
    use alloc::vec;

    #[test]
    fn add_list_element_roundtrip() {
        let req = ListElementRequest {
            object_id: ObjectId::new(ObjectType::NotificationClass, 1),
            property_id: PropertyId::RecipientList,
            array_index: None,
            elements: vec![PropertyValue::Unsigned(1), PropertyValue::Unsigned(2)],
            invoke_id: 6,
        };
        let mut buf = [0u8; 64];
        let mut w = Writer::new(&mut buf);
        req.encode_add(&mut w).unwrap();

        let mut r = Reader::new(w.as_written());
        let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
        assert_eq!(
            ListElementRequest::decode_after_header(&mut r, header.invoke_id).unwrap(),
            req
        );
    }
}
