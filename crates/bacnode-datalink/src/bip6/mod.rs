/// UDP/IPv6 transport with virtual MAC addressing (Annex U).
pub mod transport;

pub use transport::{BacnetIp6Transport, Vmac};
