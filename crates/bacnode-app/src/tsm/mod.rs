pub mod client;
pub mod server;

pub use client::{ClientTsm, ConfirmedResult};
pub use server::{ServerDispatch, ServerResponse, ServerTsm};

use bacnode_core::types::BacnetAddress;

/// An APDU the TSM wants transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub destination: BacnetAddress,
    pub apdu: Vec<u8>,
    pub expecting_reply: bool,
}

/// Segment payload capacity for a given APDU budget: the segmented
/// confirmed-request/complex-ack header occupies up to six octets.
pub(crate) fn segment_capacity(max_apdu: usize) -> usize {
    max_apdu.saturating_sub(6).max(32)
}
