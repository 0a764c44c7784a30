/// Network-layer addressing (network number + MAC).
pub mod address;
/// Borrowed bit string type.
pub mod bit_string;
/// Zero-copy application-layer data values.
pub mod data_value;
/// BACnet date and time types.
pub mod date_time;
/// Packed object identifier (type + instance).
pub mod object_id;
/// BACnet object type enumeration.
pub mod object_type;
/// BACnet property identifier enumeration.
pub mod property_id;
/// Owned application-layer values for object storage.
#[cfg(feature = "alloc")]
pub mod property_value;
/// Protocol-level enumerations (segmentation, max APDU, errors, events).
pub mod spec;

#[cfg(feature = "alloc")]
pub use address::BacnetAddress;
pub use bit_string::{BitString, StatusFlags};
pub use data_value::DataValue;
pub use date_time::{Date, Time};
pub use object_id::ObjectId;
pub use object_type::ObjectType;
pub use property_id::PropertyId;
#[cfg(feature = "alloc")]
pub use property_value::PropertyValue;
pub use spec::{
    AbortReason, EnableDisable, ErrorClass, ErrorCode, EventState, EventType, MaxApdu, NotifyType,
    RejectReason, Reliability, ReinitializedState, Segmentation,
};
