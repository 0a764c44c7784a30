#![allow(async_fn_in_trait)]

pub mod address;
pub mod bip;
pub mod bip6;
pub mod traits;

pub use address::DataLinkAddress;
pub use bip::bbmd::{Bbmd, BbmdConfig, BbmdOutput, BbmdTransport, ForeignDeviceTableEntry};
pub use bip::transport::{BacnetIpTransport, BroadcastDistributionEntry};
pub use traits::{DataLink, DataLinkError};
