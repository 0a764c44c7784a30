pub mod database;

pub use database::{ObjectDatabase, PropertyChange};

use crate::error::ServiceError;
use bacnode_core::types::{
    EventState, ObjectId, ObjectType, PropertyId, PropertyValue, StatusFlags,
};
use std::collections::BTreeMap;

/// Priority slot reserved for minimum-on/off-time command logic.
pub const RESERVED_COMMAND_PRIORITY: u8 = 6;

/// Backing storage of a File object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStorage {
    Stream(Vec<u8>),
    Records(Vec<Vec<u8>>),
}

/// A BACnet object: a property map, an optional 16-slot priority array
/// for commandable types, and optional file storage.
#[derive(Debug, Clone)]
pub struct Object {
    id: ObjectId,
    properties: BTreeMap<PropertyId, PropertyValue>,
    priority_array: Option<[Option<PropertyValue>; 16]>,
    pub file_storage: Option<FileStorage>,
}

const EMPTY_SLOT: Option<PropertyValue> = None;

impl Object {
    pub fn new(id: ObjectId, name: &str) -> Self {
        let mut object = Self {
            id,
            properties: BTreeMap::new(),
            priority_array: if id.object_type().is_commandable() {
                Some([EMPTY_SLOT; 16])
            } else {
                None
            },
            file_storage: None,
        };
        object.properties.insert(
            PropertyId::ObjectIdentifier,
            PropertyValue::ObjectId(id),
        );
        object.properties.insert(
            PropertyId::ObjectName,
            PropertyValue::CharacterString(name.into()),
        );
        object.properties.insert(
            PropertyId::ObjectType,
            PropertyValue::Enumerated(id.object_type().to_u16() as u32),
        );
        object
    }

    pub const fn id(&self) -> ObjectId {
        self.id
    }

    pub fn object_type(&self) -> ObjectType {
        self.id.object_type()
    }

    pub fn name(&self) -> &str {
        match self.properties.get(&PropertyId::ObjectName) {
            Some(PropertyValue::CharacterString(name)) => name,
            _ => "",
        }
    }

    pub const fn is_commandable(&self) -> bool {
        self.priority_array.is_some()
    }

    /// Raw property access without synthesis; used internally by engines.
    pub fn get(&self, property: PropertyId) -> Option<&PropertyValue> {
        self.properties.get(&property)
    }

    /// Install or replace a property without access checks or change
    /// tracking (object construction and engine bookkeeping).
    pub fn set(&mut self, property: PropertyId, value: PropertyValue) {
        self.properties.insert(property, value);
    }

    pub fn with(mut self, property: PropertyId, value: PropertyValue) -> Self {
        self.set(property, value);
        self
    }

    pub fn contains(&self, property: PropertyId) -> bool {
        if property == PropertyId::PriorityArray {
            return self.priority_array.is_some();
        }
        self.properties.contains_key(&property)
    }

    pub fn status_flags(&self) -> StatusFlags {
        let event_state = self
            .get(PropertyId::EventState)
            .and_then(PropertyValue::as_u32)
            .and_then(EventState::from_u32)
            .unwrap_or(EventState::Normal);
        let fault = self
            .get(PropertyId::Reliability)
            .and_then(PropertyValue::as_u32)
            .map(|raw| raw != 0)
            .unwrap_or(false);
        StatusFlags {
            in_alarm: event_state != EventState::Normal,
            fault,
            overridden: false,
            out_of_service: self.out_of_service(),
        }
    }

    pub fn out_of_service(&self) -> bool {
        self.get(PropertyId::OutOfService)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }

    /// The properties present on this object, for PROPERTY_LIST synthesis:
    /// everything except object-id, object-name, object-type, and
    /// property-list itself.
    pub fn property_list(&self) -> Vec<PropertyId> {
        let mut list: Vec<PropertyId> = self
            .properties
            .keys()
            .copied()
            .filter(|p| {
                !matches!(
                    p,
                    PropertyId::ObjectIdentifier
                        | PropertyId::ObjectName
                        | PropertyId::ObjectType
                        | PropertyId::PropertyList
                )
            })
            .collect();
        if self.priority_array.is_some() {
            list.push(PropertyId::PriorityArray);
            list.sort_by_key(|p| p.to_u32());
            list.dedup();
        }
        list
    }

    /// Read a property with synthesis of status-flags, property-list,
    /// priority-array, and current-command-priority.
    pub fn read(&self, property: PropertyId) -> Result<PropertyValue, ServiceError> {
        match property {
            PropertyId::StatusFlags => Ok(PropertyValue::BitString {
                unused_bits: 4,
                data: vec![self.status_flags().to_byte()],
            }),
            PropertyId::PropertyList => Ok(PropertyValue::List(
                self.property_list()
                    .into_iter()
                    .map(|p| PropertyValue::Enumerated(p.to_u32()))
                    .collect(),
            )),
            PropertyId::PriorityArray => {
                let array = self
                    .priority_array
                    .as_ref()
                    .ok_or_else(ServiceError::unknown_property)?;
                Ok(PropertyValue::Array(
                    array
                        .iter()
                        .map(|slot| slot.clone().unwrap_or(PropertyValue::Null))
                        .collect(),
                ))
            }
            PropertyId::CurrentCommandPriority => {
                let array = self
                    .priority_array
                    .as_ref()
                    .ok_or_else(ServiceError::unknown_property)?;
                Ok(match array.iter().position(|slot| slot.is_some()) {
                    Some(index) => PropertyValue::Unsigned(index as u32 + 1),
                    None => PropertyValue::Null,
                })
            }
            _ => self
                .properties
                .get(&property)
                .cloned()
                .ok_or_else(ServiceError::unknown_property),
        }
    }

    /// Read with an optional array index: index 0 yields the element
    /// count, 1..=N the element.
    pub fn read_indexed(
        &self,
        property: PropertyId,
        array_index: Option<u32>,
    ) -> Result<PropertyValue, ServiceError> {
        let value = self.read(property)?;
        let Some(index) = array_index else {
            return Ok(value);
        };
        match value {
            PropertyValue::Array(items) | PropertyValue::List(items) => {
                if index == 0 {
                    Ok(PropertyValue::Unsigned(items.len() as u32))
                } else {
                    items
                        .get(index as usize - 1)
                        .cloned()
                        .ok_or_else(ServiceError::invalid_array_index)
                }
            }
            _ => Err(ServiceError::Error(
                bacnode_core::types::ErrorClass::Property,
                bacnode_core::types::ErrorCode::PropertyIsNotAnArray,
            )),
        }
    }

    /// The slots of the priority array, when commandable.
    pub fn priority_array(&self) -> Option<&[Option<PropertyValue>; 16]> {
        self.priority_array.as_ref()
    }

    /// Recompute present-value from the priority array: highest-priority
    /// non-empty slot, or the relinquish default.
    fn derive_present_value(&mut self) {
        let Some(array) = &self.priority_array else {
            return;
        };
        let effective = array
            .iter()
            .find_map(|slot| slot.clone())
            .or_else(|| self.properties.get(&PropertyId::RelinquishDefault).cloned())
            .unwrap_or(PropertyValue::Null);
        self.properties.insert(PropertyId::PresentValue, effective);
    }

    /// Apply a commanded write at the given priority (default 16).
    /// `Null` relinquishes the slot.
    pub fn command(
        &mut self,
        value: PropertyValue,
        priority: Option<u8>,
    ) -> Result<(), ServiceError> {
        let priority = priority.unwrap_or(16);
        if !(1..=16).contains(&priority) {
            return Err(ServiceError::value_out_of_range());
        }
        if priority == RESERVED_COMMAND_PRIORITY && !self.has_minimum_time_properties() {
            return Err(ServiceError::write_access_denied());
        }
        let array = self
            .priority_array
            .as_mut()
            .ok_or_else(ServiceError::write_access_denied)?;
        array[priority as usize - 1] = if value.is_null() { None } else { Some(value) };
        self.derive_present_value();
        Ok(())
    }

    fn has_minimum_time_properties(&self) -> bool {
        self.properties.contains_key(&PropertyId::MinimumOnTime)
            || self.properties.contains_key(&PropertyId::MinimumOffTime)
    }

    /// Whether this property accepts WriteProperty on this object type.
    pub fn is_writable(&self, property: PropertyId) -> bool {
        if matches!(
            property,
            PropertyId::ObjectName
                | PropertyId::Description
                | PropertyId::OutOfService
                | PropertyId::CovIncrement
                | PropertyId::HighLimit
                | PropertyId::LowLimit
                | PropertyId::Deadband
                | PropertyId::LimitEnable
                | PropertyId::EventEnable
                | PropertyId::TimeDelay
                | PropertyId::TimeDelayNormal
                | PropertyId::NotificationClass
                | PropertyId::NotifyType
                | PropertyId::EventDetectionEnable
                | PropertyId::EventAlgorithmInhibit
                | PropertyId::ReliabilityEvaluationInhibit
                | PropertyId::RelinquishDefault
                | PropertyId::Setpoint
                | PropertyId::AlarmValue
                | PropertyId::AlarmValues
                | PropertyId::FeedbackValue
                | PropertyId::RecipientList
                | PropertyId::Priority
                | PropertyId::AckRequired
                | PropertyId::ObjectPropertyReference
                | PropertyId::EventParameters
                | PropertyId::EventType
                | PropertyId::Reliability
        ) {
            return true;
        }
        if property == PropertyId::PresentValue {
            // Inputs accept present-value writes only while out of
            // service; commandable and value types always do.
            return self.is_commandable()
                || matches!(
                    self.object_type(),
                    ObjectType::AnalogValue
                        | ObjectType::BinaryValue
                        | ObjectType::MultiStateValue
                        | ObjectType::CharacterStringValue
                )
                || self.out_of_service();
        }
        false
    }

    /// Coerce an incoming value toward the datatype already stored for
    /// the property. Numeric widening between unsigned/signed/real is
    /// performed; anything else must match.
    pub fn coerce(
        &self,
        property: PropertyId,
        value: PropertyValue,
    ) -> Result<PropertyValue, ServiceError> {
        let Some(current) = self.properties.get(&property) else {
            return Ok(value);
        };
        let coerced = match (current, &value) {
            (PropertyValue::Real(_), PropertyValue::Unsigned(v)) => {
                PropertyValue::Real(*v as f32)
            }
            (PropertyValue::Real(_), PropertyValue::Signed(v)) => PropertyValue::Real(*v as f32),
            (PropertyValue::Real(_), PropertyValue::Double(v)) => PropertyValue::Real(*v as f32),
            (PropertyValue::Double(_), PropertyValue::Real(v)) => {
                PropertyValue::Double(*v as f64)
            }
            (PropertyValue::Double(_), PropertyValue::Unsigned(v)) => {
                PropertyValue::Double(*v as f64)
            }
            (PropertyValue::Unsigned(_), PropertyValue::Enumerated(v))
            | (PropertyValue::Enumerated(_), PropertyValue::Unsigned(v)) => {
                if matches!(current, PropertyValue::Unsigned(_)) {
                    PropertyValue::Unsigned(*v)
                } else {
                    PropertyValue::Enumerated(*v)
                }
            }
            (PropertyValue::Boolean(_), PropertyValue::Enumerated(v)) => {
                PropertyValue::Boolean(*v != 0)
            }
            _ => {
                if core::mem::discriminant(current) == core::mem::discriminant(&value) {
                    value
                } else {
                    return Err(ServiceError::invalid_data_type());
                }
            }
        };
        Ok(coerced)
    }
}

/// Object constructors with the default property sets of the standard
/// types this stack ships.
pub mod factory {
    use super::*;
    use bacnode_core::types::{EventState, Reliability};

    fn with_io_defaults(mut object: Object) -> Object {
        object.set(
            PropertyId::EventState,
            PropertyValue::Enumerated(EventState::Normal.to_u32()),
        );
        object.set(PropertyId::OutOfService, PropertyValue::Boolean(false));
        object.set(
            PropertyId::Reliability,
            PropertyValue::Enumerated(Reliability::NoFaultDetected.to_u32()),
        );
        object
    }

    pub fn analog_input(instance: u32, name: &str) -> Object {
        let object = Object::new(ObjectId::new(ObjectType::AnalogInput, instance), name)
            .with(PropertyId::PresentValue, PropertyValue::Real(0.0))
            .with(PropertyId::Units, PropertyValue::Enumerated(95));
        with_io_defaults(object)
    }

    pub fn analog_output(instance: u32, name: &str) -> Object {
        let mut object = Object::new(ObjectId::new(ObjectType::AnalogOutput, instance), name)
            .with(PropertyId::Units, PropertyValue::Enumerated(95))
            .with(PropertyId::RelinquishDefault, PropertyValue::Real(0.0));
        object.set(PropertyId::PresentValue, PropertyValue::Real(0.0));
        object.derive_present_value();
        with_io_defaults(object)
    }

    pub fn analog_value(instance: u32, name: &str) -> Object {
        let mut object = Object::new(ObjectId::new(ObjectType::AnalogValue, instance), name)
            .with(PropertyId::Units, PropertyValue::Enumerated(95))
            .with(PropertyId::RelinquishDefault, PropertyValue::Real(0.0));
        object.derive_present_value();
        with_io_defaults(object)
    }

    pub fn binary_input(instance: u32, name: &str) -> Object {
        let object = Object::new(ObjectId::new(ObjectType::BinaryInput, instance), name)
            .with(PropertyId::PresentValue, PropertyValue::Enumerated(0))
            .with(PropertyId::Polarity, PropertyValue::Enumerated(0));
        with_io_defaults(object)
    }

    pub fn binary_value(instance: u32, name: &str) -> Object {
        let mut object = Object::new(ObjectId::new(ObjectType::BinaryValue, instance), name)
            .with(PropertyId::RelinquishDefault, PropertyValue::Enumerated(0));
        object.derive_present_value();
        with_io_defaults(object)
    }

    pub fn multi_state_value(instance: u32, name: &str, number_of_states: u32) -> Object {
        let mut object = Object::new(ObjectId::new(ObjectType::MultiStateValue, instance), name)
            .with(
                PropertyId::NumberOfStates,
                PropertyValue::Unsigned(number_of_states),
            )
            .with(PropertyId::RelinquishDefault, PropertyValue::Unsigned(1));
        object.derive_present_value();
        with_io_defaults(object)
    }

    pub fn notification_class(instance: u32, name: &str) -> Object {
        Object::new(ObjectId::new(ObjectType::NotificationClass, instance), name)
            .with(PropertyId::NotificationClass, PropertyValue::Unsigned(instance))
            .with(
                PropertyId::Priority,
                PropertyValue::Array(vec![
                    PropertyValue::Unsigned(127),
                    PropertyValue::Unsigned(127),
                    PropertyValue::Unsigned(200),
                ]),
            )
            .with(
                PropertyId::AckRequired,
                PropertyValue::BitString {
                    unused_bits: 5,
                    data: vec![0x00],
                },
            )
            .with(PropertyId::RecipientList, PropertyValue::List(Vec::new()))
    }

    pub fn file(instance: u32, name: &str, storage: FileStorage) -> Object {
        let (size, access_method) = match &storage {
            FileStorage::Stream(data) => (data.len() as u32, 0),
            FileStorage::Records(records) => (
                records.iter().map(|r| r.len() as u32).sum(),
                1,
            ),
        };
        let record_count = match &storage {
            FileStorage::Stream(_) => None,
            FileStorage::Records(records) => Some(records.len() as u32),
        };
        let mut object = Object::new(ObjectId::new(ObjectType::File, instance), name)
            .with(PropertyId::FileSize, PropertyValue::Unsigned(size))
            .with(
                PropertyId::FileAccessMethod,
                PropertyValue::Enumerated(access_method),
            )
            .with(PropertyId::FileType, PropertyValue::CharacterString("data".into()))
            .with(PropertyId::Archive, PropertyValue::Boolean(false))
            .with(PropertyId::ReadOnly, PropertyValue::Boolean(false));
        if let Some(count) = record_count {
            object.set(PropertyId::RecordCount, PropertyValue::Unsigned(count));
        }
        object.file_storage = Some(storage);
        object
    }
}

#[cfg(test)]
mod tests {
    use super::factory;
    use bacnode_core::types::{PropertyId, PropertyValue};

    #[test]
    fn present_value_tracks_priority_array() {
        let mut av = factory::analog_value(1, "setpoint");
        assert_eq!(
            av.read(PropertyId::PresentValue).unwrap(),
            PropertyValue::Real(0.0)
        );

        av.command(PropertyValue::Real(72.5), Some(8)).unwrap();
        assert_eq!(
            av.read(PropertyId::PresentValue).unwrap(),
            PropertyValue::Real(72.5)
        );
        assert_eq!(
            av.read(PropertyId::CurrentCommandPriority).unwrap(),
            PropertyValue::Unsigned(8)
        );

        // Lower priority does not override.
        av.command(PropertyValue::Real(10.0), Some(12)).unwrap();
        assert_eq!(
            av.read(PropertyId::PresentValue).unwrap(),
            PropertyValue::Real(72.5)
        );

        // Relinquish returns to the next slot, then the default.
        av.command(PropertyValue::Null, Some(8)).unwrap();
        assert_eq!(
            av.read(PropertyId::PresentValue).unwrap(),
            PropertyValue::Real(10.0)
        );
        av.command(PropertyValue::Null, Some(12)).unwrap();
        assert_eq!(
            av.read(PropertyId::PresentValue).unwrap(),
            PropertyValue::Real(0.0)
        );
        assert_eq!(
            av.read(PropertyId::CurrentCommandPriority).unwrap(),
            PropertyValue::Null
        );
    }

    #[test]
    fn priority_six_reserved_without_minimum_times() {
        let mut bv = factory::binary_value(1, "fan");
        assert!(bv.command(PropertyValue::Enumerated(1), Some(6)).is_err());

        bv.set(PropertyId::MinimumOnTime, PropertyValue::Unsigned(30));
        assert!(bv.command(PropertyValue::Enumerated(1), Some(6)).is_ok());
    }

    #[test]
    fn input_present_value_writable_only_out_of_service() {
        let mut ai = factory::analog_input(1, "zone-temp");
        assert!(!ai.is_writable(PropertyId::PresentValue));
        ai.set(PropertyId::OutOfService, PropertyValue::Boolean(true));
        assert!(ai.is_writable(PropertyId::PresentValue));
    }

    #[test]
    fn array_index_reads() {
        let av = factory::analog_value(1, "sp");
        assert_eq!(
            av.read_indexed(PropertyId::PriorityArray, Some(0)).unwrap(),
            PropertyValue::Unsigned(16)
        );
        assert_eq!(
            av.read_indexed(PropertyId::PriorityArray, Some(16)).unwrap(),
            PropertyValue::Null
        );
        assert!(av.read_indexed(PropertyId::PriorityArray, Some(17)).is_err());
    }

    #[test]
    fn property_list_excludes_core_identifiers() {
        let ai = factory::analog_input(1, "t");
        let list = ai.property_list();
        assert!(list.contains(&PropertyId::PresentValue));
        assert!(!list.contains(&PropertyId::ObjectIdentifier));
        assert!(!list.contains(&PropertyId::ObjectName));
        assert!(!list.contains(&PropertyId::ObjectType));
    }
}
