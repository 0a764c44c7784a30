//! Wire-level BACnet: the tag codec, primitive and constructed value
//! codecs, NPDU and APDU framing, and per-service request/ack codecs
//! shared by every bacnode crate.
//!
//! Everything here is sans-IO: encoders write into caller-owned buffers
//! through [`encoding::Writer`], decoders borrow from received datagrams
//! through [`encoding::Reader`]. The transports live in
//! `bacnode-datalink`; the device runtime that drives these codecs lives
//! in `bacnode-app`.
//!
//! The crate is `no_std`-capable: the default `std`/`alloc` features add
//! the owned value type and the codecs that collect into vectors, which
//! the device side needs and embedded decoders can do without.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod apdu;
pub mod encoding;
pub mod error;
pub mod npdu;
pub mod services;
pub mod types;

pub use encoding::{Reader, Writer};
pub use error::{DecodeError, EncodeError};
pub use types::{ObjectId, ObjectType, PropertyId};
