use crate::{DataLink, DataLinkAddress, DataLinkError};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

pub const BVLC_TYPE_BIP6: u8 = 0x82;

pub const BVLC6_RESULT: u8 = 0x00;
pub const BVLC6_ORIGINAL_UNICAST_NPDU: u8 = 0x01;
pub const BVLC6_ORIGINAL_BROADCAST_NPDU: u8 = 0x02;
pub const BVLC6_ADDRESS_RESOLUTION: u8 = 0x03;
pub const BVLC6_ADDRESS_RESOLUTION_ACK: u8 = 0x05;

/// Link-local all-BACnet-devices group.
pub const MULTICAST_LINK_LOCAL: Ipv6Addr = Ipv6Addr::new(0xFF02, 0, 0, 0, 0, 0, 0, 0xBAC0);
/// Site-local all-BACnet-devices group.
pub const MULTICAST_SITE_LOCAL: Ipv6Addr = Ipv6Addr::new(0xFF05, 0, 0, 0, 0, 0, 0, 0xBAC0);

/// Lifetime of an address-resolution cache entry.
pub const RESOLUTION_CACHE_TTL: Duration = Duration::from_secs(300);

const MAX_BIP6_FRAME_LEN: usize = 1600;

/// A 3-byte virtual MAC identifying a node on a BACnet/IPv6 network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vmac(pub [u8; 3]);

impl Vmac {
    pub const fn as_u32(self) -> u32 {
        ((self.0[0] as u32) << 16) | ((self.0[1] as u32) << 8) | self.0[2] as u32
    }

    pub fn from_device_instance(instance: u32) -> Self {
        Self([
            ((instance >> 16) & 0xFF) as u8,
            ((instance >> 8) & 0xFF) as u8,
            (instance & 0xFF) as u8,
        ])
    }
}

#[derive(Debug)]
struct ResolutionCache {
    by_vmac: HashMap<Vmac, (SocketAddr, Instant)>,
    by_addr: HashMap<SocketAddr, Vmac>,
}

impl ResolutionCache {
    fn new() -> Self {
        Self {
            by_vmac: HashMap::new(),
            by_addr: HashMap::new(),
        }
    }

    fn learn(&mut self, vmac: Vmac, addr: SocketAddr, now: Instant) {
        self.by_vmac.insert(vmac, (addr, now));
        self.by_addr.insert(addr, vmac);
    }

    fn lookup_vmac(&mut self, addr: SocketAddr) -> Option<Vmac> {
        self.by_addr.get(&addr).copied()
    }

    fn evict_expired(&mut self, now: Instant) {
        let by_addr = &mut self.by_addr;
        self.by_vmac.retain(|_, (addr, seen)| {
            if now.duration_since(*seen) > RESOLUTION_CACHE_TTL {
                by_addr.remove(addr);
                false
            } else {
                true
            }
        });
    }
}

/// BACnet/IPv6 transport per Annex U: every frame carries the sender's
/// 3-byte virtual MAC; broadcasts go to the well-known multicast group.
#[derive(Debug, Clone)]
pub struct BacnetIp6Transport {
    socket: Arc<UdpSocket>,
    vmac: Vmac,
    multicast_group: Ipv6Addr,
    port: u16,
    cache: Arc<Mutex<ResolutionCache>>,
}

impl BacnetIp6Transport {
    pub async fn bind(
        bind_addr: SocketAddr,
        vmac: Vmac,
        site_local: bool,
    ) -> Result<Self, DataLinkError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let multicast_group = if site_local {
            MULTICAST_SITE_LOCAL
        } else {
            MULTICAST_LINK_LOCAL
        };
        if let Err(e) = socket.join_multicast_v6(&multicast_group, 0) {
            log::warn!("could not join {multicast_group}: {e}");
        }
        let port = socket.local_addr()?.port();
        Ok(Self {
            socket: Arc::new(socket),
            vmac,
            multicast_group,
            port,
            cache: Arc::new(Mutex::new(ResolutionCache::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DataLinkError> {
        self.socket.local_addr().map_err(DataLinkError::Io)
    }

    pub const fn vmac(&self) -> Vmac {
        self.vmac
    }

    /// Drop cache entries older than the TTL; call from a periodic task.
    pub async fn evict_resolution_cache(&self) {
        self.cache.lock().await.evict_expired(Instant::now());
    }

    fn frame(&self, function: u8, body: &[u8]) -> Result<Vec<u8>, DataLinkError> {
        let total = 4 + 3 + body.len();
        if total > MAX_BIP6_FRAME_LEN || total > usize::from(u16::MAX) {
            return Err(DataLinkError::FrameTooLarge);
        }
        let mut frame = Vec::with_capacity(total);
        frame.push(BVLC_TYPE_BIP6);
        frame.push(function);
        frame.extend_from_slice(&(total as u16).to_be_bytes());
        frame.extend_from_slice(&self.vmac.0);
        frame.extend_from_slice(body);
        Ok(frame)
    }

    async fn send_address_resolution_ack(&self, destination: SocketAddr, target: Vmac) {
        if let Ok(frame) = self.frame(BVLC6_ADDRESS_RESOLUTION_ACK, &target.0) {
            if let Err(e) = self.socket.send_to(&frame, destination).await {
                log::warn!("address-resolution ack to {destination} failed: {e}");
            }
        }
    }
}

impl DataLink for BacnetIp6Transport {
    async fn send(&self, address: DataLinkAddress, payload: &[u8]) -> Result<(), DataLinkError> {
        let addr = address.as_socket_addr();
        let is_broadcast = address.is_broadcast() || addr.ip() == IpAddr::V6(self.multicast_group);

        if is_broadcast {
            let frame = self.frame(BVLC6_ORIGINAL_BROADCAST_NPDU, payload)?;
            let group = SocketAddr::new(IpAddr::V6(self.multicast_group), self.port);
            self.socket.send_to(&frame, group).await?;
            return Ok(());
        }

        // Unicast frames carry the destination VMAC after ours; it is
        // learned from prior traffic or resolved on demand.
        let dest_vmac = { self.cache.lock().await.lookup_vmac(addr) };
        let dest_vmac = match dest_vmac {
            Some(vmac) => vmac,
            None => {
                // Ask the group who owns this address; the caller retries
                // once the ACK has populated the cache.
                let frame = self.frame(BVLC6_ADDRESS_RESOLUTION, &[0, 0, 0])?;
                let group = SocketAddr::new(IpAddr::V6(self.multicast_group), self.port);
                self.socket.send_to(&frame, group).await?;
                return Err(DataLinkError::UnresolvedVmac(0));
            }
        };

        let mut body = Vec::with_capacity(3 + payload.len());
        body.extend_from_slice(&dest_vmac.0);
        body.extend_from_slice(payload);
        let frame = self.frame(BVLC6_ORIGINAL_UNICAST_NPDU, &body)?;
        self.socket.send_to(&frame, addr).await?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, DataLinkAddress), DataLinkError> {
        loop {
            let mut frame = [0u8; MAX_BIP6_FRAME_LEN];
            let (n, src) = self.socket.recv_from(&mut frame).await?;
            if n < 7 || frame[0] != BVLC_TYPE_BIP6 {
                return Err(DataLinkError::InvalidFrame);
            }
            let function = frame[1];
            let length = u16::from_be_bytes([frame[2], frame[3]]) as usize;
            if length != n {
                return Err(DataLinkError::InvalidFrame);
            }
            let source_vmac = Vmac([frame[4], frame[5], frame[6]]);
            {
                let mut cache = self.cache.lock().await;
                cache.learn(source_vmac, src, Instant::now());
            }

            match function {
                BVLC6_ORIGINAL_UNICAST_NPDU => {
                    if n < 10 {
                        return Err(DataLinkError::InvalidFrame);
                    }
                    let dest_vmac = Vmac([frame[7], frame[8], frame[9]]);
                    if dest_vmac != self.vmac {
                        continue;
                    }
                    let payload = &frame[10..n];
                    if payload.len() > buf.len() {
                        return Err(DataLinkError::FrameTooLarge);
                    }
                    buf[..payload.len()].copy_from_slice(payload);
                    return Ok((payload.len(), DataLinkAddress::Ip(src)));
                }
                BVLC6_ORIGINAL_BROADCAST_NPDU => {
                    let payload = &frame[7..n];
                    if payload.len() > buf.len() {
                        return Err(DataLinkError::FrameTooLarge);
                    }
                    buf[..payload.len()].copy_from_slice(payload);
                    return Ok((payload.len(), DataLinkAddress::Ip(src)));
                }
                BVLC6_ADDRESS_RESOLUTION => {
                    if n >= 10 {
                        let target = Vmac([frame[7], frame[8], frame[9]]);
                        if target == self.vmac || target.as_u32() == 0 {
                            self.send_address_resolution_ack(src, source_vmac).await;
                        }
                    }
                    continue;
                }
                BVLC6_ADDRESS_RESOLUTION_ACK | BVLC6_RESULT => {
                    // Cache already learned the sender above.
                    continue;
                }
                other => return Err(DataLinkError::UnsupportedBvlcFunction(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BacnetIp6Transport, Vmac, BVLC6_ORIGINAL_UNICAST_NPDU, BVLC_TYPE_BIP6};
    use crate::{DataLink, DataLinkAddress, DataLinkError};
    use std::net::{IpAddr, Ipv6Addr, SocketAddr};
    use tokio::net::UdpSocket;

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn unicast_requires_resolved_vmac() {
        let a = BacnetIp6Transport::bind(loopback(), Vmac([0, 0, 1]), false)
            .await
            .unwrap();
        let peer = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 45000);
        let err = a
            .send(DataLinkAddress::Ip(peer), &[1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, DataLinkError::UnresolvedVmac(_)));
    }

    #[tokio::test]
    async fn unicast_roundtrip_after_learning() {
        let a = BacnetIp6Transport::bind(loopback(), Vmac([0, 0, 1]), false)
            .await
            .unwrap();
        let a_addr = a.local_addr().unwrap();

        // A peer announces itself by unicasting an NPDU to a; a learns
        // VMAC 0,0,2 for the sender's socket address.
        let peer = UdpSocket::bind(loopback()).await.unwrap();
        let mut frame = vec![BVLC_TYPE_BIP6, BVLC6_ORIGINAL_UNICAST_NPDU, 0, 0];
        frame.extend_from_slice(&[0, 0, 2]);
        frame.extend_from_slice(&[0, 0, 1]);
        frame.extend_from_slice(&[0x01, 0x00]);
        let len = frame.len() as u16;
        frame[2..4].copy_from_slice(&len.to_be_bytes());
        peer.send_to(&frame, a_addr).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, src) = a.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x00]);

        // a can now unicast back, framing with both VMACs.
        a.send(src, &[9, 9, 9]).await.unwrap();

        let mut raw_buf = [0u8; 64];
        let (rn, _) = peer.recv_from(&mut raw_buf).await.unwrap();
        assert_eq!(raw_buf[0], BVLC_TYPE_BIP6);
        assert_eq!(raw_buf[1], BVLC6_ORIGINAL_UNICAST_NPDU);
        assert_eq!(&raw_buf[4..7], &[0, 0, 1]);
        assert_eq!(&raw_buf[7..10], &[0, 0, 2]);
        assert_eq!(&raw_buf[10..rn], &[9, 9, 9]);
    }
}
