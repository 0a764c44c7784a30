/// BBMD engine: broadcast distribution and foreign-device tables.
pub mod bbmd;
/// BVLC framing for BACnet/IPv4 (Annex J).
pub mod bvlc;
/// UDP transport for BACnet/IPv4 devices and foreign devices.
pub mod transport;
