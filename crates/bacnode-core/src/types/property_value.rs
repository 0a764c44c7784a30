use crate::types::{DataValue, Date, ObjectId, Time};

use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// An owned BACnet application-layer value, used wherever a value outlives
/// the buffer it was decoded from (object storage, priority arrays, COV
/// snapshots, queued notifications).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Signed(i32),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    /// Non-UTF-8 character string kept verbatim (character-set id first).
    RawCharacterString(Vec<u8>),
    BitString { unused_bits: u8, data: Vec<u8> },
    Enumerated(u32),
    Date(Date),
    Time(Time),
    ObjectId(ObjectId),
    /// Fixed-size array property value (e.g. priority-array,
    /// event-time-stamps).
    Array(Vec<PropertyValue>),
    /// List property value (e.g. object-list, recipient-list).
    List(Vec<PropertyValue>),
    /// Constructed value preserved as a tagged group of children.
    Constructed {
        tag_num: u8,
        values: Vec<PropertyValue>,
    },
}

impl PropertyValue {
    pub fn from_data_value(value: &DataValue<'_>) -> Self {
        match value {
            DataValue::Null => Self::Null,
            DataValue::Boolean(v) => Self::Boolean(*v),
            DataValue::Unsigned(v) => Self::Unsigned(*v),
            DataValue::Signed(v) => Self::Signed(*v),
            DataValue::Real(v) => Self::Real(*v),
            DataValue::Double(v) => Self::Double(*v),
            DataValue::OctetString(v) => Self::OctetString(v.to_vec()),
            DataValue::CharacterString(v) => Self::CharacterString(v.to_string()),
            DataValue::RawCharacterString(v) => Self::RawCharacterString(v.to_vec()),
            DataValue::BitString(v) => Self::BitString {
                unused_bits: v.unused_bits,
                data: v.data.to_vec(),
            },
            DataValue::Enumerated(v) => Self::Enumerated(*v),
            DataValue::Date(v) => Self::Date(*v),
            DataValue::Time(v) => Self::Time(*v),
            DataValue::ObjectId(v) => Self::ObjectId(*v),
            DataValue::Constructed { tag_num, values } => Self::Constructed {
                tag_num: *tag_num,
                values: values.iter().map(Self::from_data_value).collect(),
            },
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::Unsigned(v) | Self::Enumerated(v) => Some(*v as f64),
            Self::Signed(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Unsigned(v) | Self::Enumerated(v) => Some(*v),
            Self::Signed(v) if *v >= 0 => Some(*v as u32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::Enumerated(v) | Self::Unsigned(v) => Some(*v != 0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PropertyValue;
    use crate::types::DataValue;

    #[test]
    fn converts_from_borrowed() {
        let dv = DataValue::CharacterString("kitchen temp");
        assert_eq!(
            PropertyValue::from_data_value(&dv),
            PropertyValue::CharacterString("kitchen temp".into())
        );
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(PropertyValue::Real(2.5).as_f64(), Some(2.5));
        assert_eq!(PropertyValue::Unsigned(7).as_f64(), Some(7.0));
        assert_eq!(PropertyValue::Null.as_f64(), None);
    }
}
