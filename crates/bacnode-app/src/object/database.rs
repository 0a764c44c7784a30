use crate::config::DeviceConfig;
use crate::error::ServiceError;
use crate::object::Object;
use bacnode_core::types::{
    ErrorClass, ErrorCode, ObjectId, ObjectType, PropertyId, PropertyValue, Segmentation,
};
use std::collections::{BTreeMap, HashMap};

/// One observed property mutation, queued for the COV manager.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub old: Option<PropertyValue>,
    pub new: PropertyValue,
}

/// The device's object store: identifier map, name index, and the change
/// queue that stands in for per-object write-observer callbacks in the
/// single-task model.
#[derive(Debug)]
pub struct ObjectDatabase {
    objects: BTreeMap<ObjectId, Object>,
    name_index: HashMap<String, ObjectId>,
    device_id: ObjectId,
    changes: Vec<PropertyChange>,
}

impl ObjectDatabase {
    /// Build the database around its Device object.
    pub fn new(config: &DeviceConfig) -> Self {
        let device_id = ObjectId::new(ObjectType::Device, config.instance_number);
        let device = Object::new(device_id, &config.name)
            .with(PropertyId::SystemStatus, PropertyValue::Enumerated(0))
            .with(
                PropertyId::VendorIdentifier,
                PropertyValue::Unsigned(config.vendor_id as u32),
            )
            .with(
                PropertyId::VendorName,
                PropertyValue::CharacterString("bacnode".into()),
            )
            .with(
                PropertyId::ModelName,
                PropertyValue::CharacterString("bacnode-stack".into()),
            )
            .with(
                PropertyId::FirmwareRevision,
                PropertyValue::CharacterString(env!("CARGO_PKG_VERSION").into()),
            )
            .with(
                PropertyId::ApplicationSoftwareVersion,
                PropertyValue::CharacterString(env!("CARGO_PKG_VERSION").into()),
            )
            .with(PropertyId::ProtocolVersion, PropertyValue::Unsigned(1))
            .with(PropertyId::ProtocolRevision, PropertyValue::Unsigned(22))
            .with(
                PropertyId::MaxApduLengthAccepted,
                PropertyValue::Unsigned(config.max_apdu_length as u32),
            )
            .with(
                PropertyId::SegmentationSupported,
                PropertyValue::Enumerated(Segmentation::SegmentedBoth.to_u32()),
            )
            .with(
                PropertyId::ApduTimeout,
                PropertyValue::Unsigned(config.apdu_timeout.as_millis() as u32),
            )
            .with(
                PropertyId::NumberOfApduRetries,
                PropertyValue::Unsigned(config.apdu_retries as u32),
            )
            .with(PropertyId::DatabaseRevision, PropertyValue::Unsigned(1))
            .with(PropertyId::DeviceAddressBinding, PropertyValue::List(Vec::new()));

        let mut db = Self {
            objects: BTreeMap::new(),
            name_index: HashMap::new(),
            device_id,
            changes: Vec::new(),
        };
        db.name_index.insert(config.name.clone(), device_id);
        db.objects.insert(device_id, device);
        db
    }

    pub const fn device_id(&self) -> ObjectId {
        self.device_id
    }

    /// Resolve the device-wildcard instance to the local device.
    pub fn resolve(&self, id: ObjectId) -> ObjectId {
        if id.is_device_wildcard() {
            self.device_id
        } else {
            id
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&self.resolve(id))
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&self.resolve(id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        let id = self.resolve(id);
        self.objects.get_mut(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<ObjectId> {
        self.name_index.get(name).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn ids_of_type(&self, object_type: ObjectType) -> Vec<ObjectId> {
        self.objects
            .keys()
            .copied()
            .filter(|id| id.object_type() == object_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn database_revision(&self) -> u32 {
        self.objects
            .get(&self.device_id)
            .and_then(|device| device.get(PropertyId::DatabaseRevision))
            .and_then(PropertyValue::as_u32)
            .unwrap_or(0)
    }

    fn bump_revision(&mut self) {
        let next = self.database_revision().wrapping_add(1);
        if let Some(device) = self.objects.get_mut(&self.device_id) {
            device.set(PropertyId::DatabaseRevision, PropertyValue::Unsigned(next));
        }
    }

    /// Insert a new object. Fails on duplicate identifier or name.
    pub fn add(&mut self, object: Object) -> Result<(), ServiceError> {
        let id = object.id();
        if self.objects.contains_key(&id) {
            return Err(ServiceError::Error(
                ErrorClass::Object,
                ErrorCode::ObjectIdentifierAlreadyExists,
            ));
        }
        let name = object.name().to_string();
        if name.is_empty() {
            return Err(ServiceError::Error(
                ErrorClass::Property,
                ErrorCode::InvalidConfigurationData,
            ));
        }
        if self.name_index.contains_key(&name) {
            return Err(ServiceError::duplicate_name());
        }
        self.name_index.insert(name, id);
        self.objects.insert(id, object);
        self.bump_revision();
        Ok(())
    }

    /// Remove an object. The Device object is undeletable.
    pub fn remove(&mut self, id: ObjectId) -> Result<(), ServiceError> {
        let id = self.resolve(id);
        if id == self.device_id {
            return Err(ServiceError::Error(
                ErrorClass::Object,
                ErrorCode::ObjectDeletionNotPermitted,
            ));
        }
        let Some(object) = self.objects.remove(&id) else {
            return Err(ServiceError::unknown_object());
        };
        self.name_index.remove(object.name());
        self.bump_revision();
        Ok(())
    }

    /// Read a property, synthesizing the device object-list.
    pub fn read(
        &self,
        id: ObjectId,
        property: PropertyId,
        array_index: Option<u32>,
    ) -> Result<PropertyValue, ServiceError> {
        let id = self.resolve(id);
        let object = self.objects.get(&id).ok_or_else(ServiceError::unknown_object)?;
        if id == self.device_id && property == PropertyId::ObjectList {
            let list = PropertyValue::Array(
                self.objects.keys().map(|id| PropertyValue::ObjectId(*id)).collect(),
            );
            return index_into(list, array_index);
        }
        object.read_indexed(property, array_index)
    }

    /// Write a property, enforcing access rules, name uniqueness, type
    /// coercion, and the priority-array path. Changes are queued for the
    /// COV manager.
    pub fn write(
        &mut self,
        id: ObjectId,
        property: PropertyId,
        array_index: Option<u32>,
        value: PropertyValue,
        priority: Option<u8>,
    ) -> Result<(), ServiceError> {
        let id = self.resolve(id);
        if array_index.is_some() {
            // Array-element writes are limited to whole-value replacement
            // in this database.
            return Err(ServiceError::Error(
                ErrorClass::Property,
                ErrorCode::OptionalFunctionalityNotSupported,
            ));
        }

        // Renames go through the name index.
        if property == PropertyId::ObjectName {
            return self.rename(id, value);
        }

        let object = self
            .objects
            .get_mut(&id)
            .ok_or_else(ServiceError::unknown_object)?;
        if !object.is_writable(property) {
            return Err(ServiceError::write_access_denied());
        }

        let old = object.read(property).ok();
        if property == PropertyId::PresentValue && object.is_commandable()
            && !object.out_of_service()
        {
            object.command(value, priority)?;
        } else {
            if priority == Some(crate::object::RESERVED_COMMAND_PRIORITY)
                && property == PropertyId::PresentValue
            {
                return Err(ServiceError::write_access_denied());
            }
            let coerced = object.coerce(property, value)?;
            object.set(property, coerced);
        }

        let new = object
            .read(property)
            .unwrap_or(PropertyValue::Null);
        if old.as_ref() != Some(&new) {
            self.changes.push(PropertyChange {
                object_id: id,
                property_id: property,
                old,
                new,
            });
        }
        Ok(())
    }

    fn rename(&mut self, id: ObjectId, value: PropertyValue) -> Result<(), ServiceError> {
        let PropertyValue::CharacterString(new_name) = value else {
            return Err(ServiceError::invalid_data_type());
        };
        if new_name.is_empty() {
            return Err(ServiceError::value_out_of_range());
        }
        let object = self
            .objects
            .get(&id)
            .ok_or_else(ServiceError::unknown_object)?;
        let old_name = object.name().to_string();
        if old_name == new_name {
            return Ok(());
        }
        if self.name_index.contains_key(&new_name) {
            return Err(ServiceError::duplicate_name());
        }
        self.name_index.remove(&old_name);
        self.name_index.insert(new_name.clone(), id);
        if let Some(object) = self.objects.get_mut(&id) {
            object.set(
                PropertyId::ObjectName,
                PropertyValue::CharacterString(new_name.clone()),
            );
        }
        self.bump_revision();
        self.changes.push(PropertyChange {
            object_id: id,
            property_id: PropertyId::ObjectName,
            old: Some(PropertyValue::CharacterString(old_name)),
            new: PropertyValue::CharacterString(new_name),
        });
        Ok(())
    }

    /// Record a change made by an engine directly (fault transitions,
    /// out-of-service simulation) so COV subscribers still hear about it.
    pub fn record_change(&mut self, change: PropertyChange) {
        self.changes.push(change);
    }

    /// Drain the queued write observations.
    pub fn drain_changes(&mut self) -> Vec<PropertyChange> {
        std::mem::take(&mut self.changes)
    }
}

fn index_into(
    value: PropertyValue,
    array_index: Option<u32>,
) -> Result<PropertyValue, ServiceError> {
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
            ErrorClass::Property,
            ErrorCode::PropertyIsNotAnArray,
        )),
    }
}
