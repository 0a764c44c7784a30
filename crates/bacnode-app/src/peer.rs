use bacnode_core::types::{BacnetAddress, ObjectId, Segmentation};
use std::collections::HashMap;

/// Capabilities learned from a peer's I-Am, used to clamp outbound APDU
/// sizes and to decide whether segmented requests are possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCapabilities {
    pub device_id: ObjectId,
    pub max_apdu_accepted: usize,
    pub segmentation: Segmentation,
}

#[derive(Debug, Default)]
pub struct PeerCache {
    peers: HashMap<BacnetAddress, PeerCapabilities>,
}

impl PeerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn learn(&mut self, address: BacnetAddress, capabilities: PeerCapabilities) {
        self.peers.insert(address, capabilities);
    }

    pub fn get(&self, address: &BacnetAddress) -> Option<&PeerCapabilities> {
        self.peers.get(address)
    }

    /// The largest APDU the peer accepts, or our own limit when the peer
    /// is unknown.
    pub fn max_apdu_for(&self, address: &BacnetAddress, local_max: usize) -> usize {
        self.peers
            .get(address)
            .map(|caps| caps.max_apdu_accepted.min(local_max))
            .unwrap_or(local_max)
    }

    pub fn segmentation_for(&self, address: &BacnetAddress) -> Option<Segmentation> {
        self.peers.get(address).map(|caps| caps.segmentation)
    }
}
