use crate::bip::bvlc::{
    self, BvlcFunction, BvlcHeader, RESULT_DELETE_FDT_ENTRY_NAK, RESULT_DISTRIBUTE_BROADCAST_NAK,
    RESULT_REGISTER_FOREIGN_DEVICE_NAK, RESULT_SUCCESSFUL_COMPLETION, RESULT_WRITE_BDT_NAK,
};
use crate::bip::transport::{decode_bdt_payload, encode_bdt_payload, BroadcastDistributionEntry};
use crate::{DataLink, DataLinkAddress, DataLinkError};
use bacnode_core::encoding::reader::Reader;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

/// Default capacity of the foreign device table.
pub const DEFAULT_MAX_FOREIGN_DEVICES: usize = 128;

/// Seconds granted past the requested TTL before an entry expires.
pub const FDT_GRACE_SECONDS: u16 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignDeviceTableEntry {
    pub address: SocketAddrV4,
    pub ttl_seconds: u16,
    pub remaining_seconds: u16,
}

/// Static configuration of a BBMD port.
#[derive(Debug, Clone)]
pub struct BbmdConfig {
    /// Our own address as it appears in the BDT.
    pub local_address: SocketAddrV4,
    /// Public address when operating behind NAT; substituted as the
    /// originating address of Forwarded-NPDUs.
    pub nat_global_address: Option<SocketAddrV4>,
    pub accept_fd_registrations: bool,
    /// Write-BDT is refused unless explicitly enabled (default per
    /// protocol revision 17).
    pub allow_write_bdt: bool,
    pub max_foreign_devices: usize,
    /// Path of the JSON BDT backup; every successful mutation rewrites it.
    pub backup_path: Option<PathBuf>,
}

impl BbmdConfig {
    pub fn new(local_address: SocketAddrV4) -> Self {
        Self {
            local_address,
            nat_global_address: None,
            accept_fd_registrations: true,
            allow_write_bdt: false,
            max_foreign_devices: DEFAULT_MAX_FOREIGN_DEVICES,
            backup_path: None,
        }
    }
}

/// An I/O action the engine wants performed. The engine itself never
/// touches a socket, which keeps the forwarding rules testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BbmdOutput {
    /// Hand the NPDU to the local application.
    Deliver {
        npdu: Vec<u8>,
        source: SocketAddr,
    },
    /// Transmit a BVLC frame to a unicast/directed destination.
    Send {
        frame: Vec<u8>,
        destination: SocketAddr,
    },
    /// Transmit a BVLC frame as a local-wire broadcast.
    Broadcast { frame: Vec<u8> },
}

#[derive(Debug, Clone, Copy)]
struct FdtSlot {
    address: SocketAddrV4,
    ttl_seconds: u16,
    remaining_seconds: u16,
}

/// The broadcast-management engine: owns the BDT and FDT and implements
/// the Annex J forwarding rules.
#[derive(Debug)]
pub struct Bbmd {
    config: BbmdConfig,
    bdt: Vec<BroadcastDistributionEntry>,
    bdt_set_programmatically: bool,
    fdt: Vec<FdtSlot>,
}

impl Bbmd {
    /// Create an engine, loading the BDT backup file if one is configured
    /// and present.
    pub fn new(config: BbmdConfig) -> io::Result<Self> {
        let mut bbmd = Self {
            config,
            bdt: Vec::new(),
            bdt_set_programmatically: false,
            fdt: Vec::new(),
        };
        if let Some(path) = bbmd.config.backup_path.clone() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    bbmd.bdt = parse_bdt_backup(&contents)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    log::info!(
                        "loaded {} BDT entries from {}",
                        bbmd.bdt.len(),
                        path.display()
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(bbmd)
    }

    /// Install a BDT programmatically; this takes precedence over the
    /// backup file.
    pub fn set_broadcast_distribution_table(
        &mut self,
        entries: Vec<BroadcastDistributionEntry>,
    ) -> io::Result<()> {
        self.bdt = entries;
        self.bdt_set_programmatically = true;
        self.persist_bdt()
    }

    pub fn broadcast_distribution_table(&self) -> &[BroadcastDistributionEntry] {
        &self.bdt
    }

    pub fn foreign_device_table(&self) -> Vec<ForeignDeviceTableEntry> {
        self.fdt
            .iter()
            .map(|slot| ForeignDeviceTableEntry {
                address: slot.address,
                ttl_seconds: slot.ttl_seconds,
                remaining_seconds: slot.remaining_seconds,
            })
            .collect()
    }

    fn persist_bdt(&self) -> io::Result<()> {
        let Some(path) = &self.config.backup_path else {
            return Ok(());
        };
        let records: Vec<BdtBackupRecord> = self
            .bdt
            .iter()
            .map(|entry| BdtBackupRecord {
                host: entry.address.ip().to_string(),
                port: entry.address.port(),
                mask: entry.mask.octets(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }

    /// Decrement FDT lifetimes by `elapsed_seconds` and drop expired
    /// entries. Run from a periodic task (default every 10 s).
    pub fn sweep(&mut self, elapsed_seconds: u16) {
        self.fdt.retain_mut(|slot| {
            slot.remaining_seconds = slot.remaining_seconds.saturating_sub(elapsed_seconds);
            if slot.remaining_seconds == 0 {
                log::debug!("foreign device {} expired", slot.address);
                false
            } else {
                true
            }
        });
    }

    /// Process one inbound UDP datagram. Malformed frames produce no
    /// outputs (dropped and logged).
    pub fn handle_datagram(&mut self, raw: &[u8], source: SocketAddr) -> Vec<BbmdOutput> {
        let mut r = Reader::new(raw);
        let Ok(header) = BvlcHeader::decode(&mut r) else {
            log::warn!("dropping malformed BVLC datagram from {source}");
            return Vec::new();
        };
        let Ok(payload) = r.read_exact(header.length as usize - 4) else {
            log::warn!("dropping truncated BVLC datagram from {source}");
            return Vec::new();
        };

        match header.function {
            BvlcFunction::ForwardedNpdu => self.handle_forwarded_npdu(payload, source),
            BvlcFunction::OriginalBroadcastNpdu => {
                let mut outputs = self.forward_broadcast(payload, source, source);
                outputs.push(BbmdOutput::Deliver {
                    npdu: payload.to_vec(),
                    source,
                });
                outputs
            }
            BvlcFunction::OriginalUnicastNpdu => vec![BbmdOutput::Deliver {
                npdu: payload.to_vec(),
                source,
            }],
            BvlcFunction::RegisterForeignDevice => self.handle_register(payload, source),
            BvlcFunction::WriteBroadcastDistributionTable => self.handle_write_bdt(payload, source),
            BvlcFunction::ReadBroadcastDistributionTable => vec![BbmdOutput::Send {
                frame: bvlc::build_frame(
                    BvlcFunction::ReadBroadcastDistributionTableAck,
                    &encode_bdt_payload(&self.bdt),
                )
                .unwrap_or_default(),
                destination: source,
            }],
            BvlcFunction::ReadForeignDeviceTable => vec![BbmdOutput::Send {
                frame: bvlc::build_frame(
                    BvlcFunction::ReadForeignDeviceTableAck,
                    &self.encode_fdt_payload(),
                )
                .unwrap_or_default(),
                destination: source,
            }],
            BvlcFunction::DeleteForeignDeviceTableEntry => self.handle_delete_fdt(payload, source),
            BvlcFunction::DistributeBroadcastToNetwork => self.handle_distribute(payload, source),
            BvlcFunction::Result
            | BvlcFunction::ReadBroadcastDistributionTableAck
            | BvlcFunction::ReadForeignDeviceTableAck => Vec::new(),
            BvlcFunction::Unknown(v) => {
                log::warn!("dropping BVLC function 0x{v:02x} from {source}");
                Vec::new()
            }
        }
    }

    /// Forwarding for a broadcast NPDU our own application originates.
    pub fn handle_local_origin_broadcast(&mut self, npdu: &[u8]) -> Vec<BbmdOutput> {
        let local = SocketAddr::V4(self.config.local_address);
        let mut outputs = vec![BbmdOutput::Broadcast {
            frame: bvlc::build_frame(BvlcFunction::OriginalBroadcastNpdu, npdu)
                .unwrap_or_default(),
        }];
        outputs.extend(self.forward_broadcast(npdu, local, local));
        outputs
    }

    fn handle_forwarded_npdu(&mut self, payload: &[u8], source: SocketAddr) -> Vec<BbmdOutput> {
        if payload.len() < 6 {
            log::warn!("dropping short Forwarded-NPDU from {source}");
            return Vec::new();
        }
        let origin = SocketAddrV4::new(
            Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]),
            u16::from_be_bytes([payload[4], payload[5]]),
        );
        // Self-echo loop prevention: a forwarded copy of our own traffic.
        if origin == self.config.local_address
            || Some(origin) == self.config.nat_global_address
        {
            return Vec::new();
        }
        let npdu = &payload[6..];
        let mut outputs = Vec::new();

        // The peer that forwarded to us did so by unicast when its entry
        // carries an all-ones mask; local devices then rely on us to
        // re-broadcast on this wire.
        let peer_uses_unicast = match source {
            SocketAddr::V4(v4) => self
                .bdt
                .iter()
                .any(|entry| entry.address == v4 && entry.mask == Ipv4Addr::BROADCAST),
            SocketAddr::V6(_) => false,
        };
        if peer_uses_unicast {
            if let Ok(frame) = bvlc::build_frame(BvlcFunction::ForwardedNpdu, payload) {
                outputs.push(BbmdOutput::Broadcast { frame });
            }
        }

        // Registered foreign devices also get a copy.
        for slot in &self.fdt {
            if SocketAddr::V4(slot.address) == source || slot.address == origin {
                continue;
            }
            if let Ok(frame) = bvlc::build_frame(BvlcFunction::ForwardedNpdu, payload) {
                outputs.push(BbmdOutput::Send {
                    frame,
                    destination: SocketAddr::V4(slot.address),
                });
            }
        }

        outputs.push(BbmdOutput::Deliver {
            npdu: npdu.to_vec(),
            source: SocketAddr::V4(origin),
        });
        outputs
    }

    /// The two-hop distribution core: forward an NPDU to every BDT peer and
    /// registered foreign device, skipping the originator.
    fn forward_broadcast(
        &self,
        npdu: &[u8],
        originating_source: SocketAddr,
        skip_address: SocketAddr,
    ) -> Vec<BbmdOutput> {
        let origin_v4 = match originating_source {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => return Vec::new(),
        };
        // Forwarded-NPDUs carry the configured global address when NATted.
        let advertised_origin = self.config.nat_global_address.unwrap_or(origin_v4);

        let mut forwarded_payload = Vec::with_capacity(6 + npdu.len());
        forwarded_payload.extend_from_slice(&advertised_origin.ip().octets());
        forwarded_payload.extend_from_slice(&advertised_origin.port().to_be_bytes());
        forwarded_payload.extend_from_slice(npdu);

        let Ok(frame) = bvlc::build_frame(BvlcFunction::ForwardedNpdu, &forwarded_payload) else {
            return Vec::new();
        };

        let mut outputs = Vec::new();
        for entry in &self.bdt {
            if entry.address == self.config.local_address {
                continue;
            }
            let destination = entry.forward_destination();
            // Don't reflect a broadcast at its source.
            if SocketAddr::V4(destination) == skip_address || destination == origin_v4 {
                continue;
            }
            if Some(destination) == self.config.nat_global_address {
                continue;
            }
            outputs.push(BbmdOutput::Send {
                frame: frame.clone(),
                destination: SocketAddr::V4(destination),
            });
        }

        for slot in &self.fdt {
            if SocketAddr::V4(slot.address) == originating_source
                || SocketAddr::V4(slot.address) == skip_address
            {
                continue;
            }
            outputs.push(BbmdOutput::Send {
                frame: frame.clone(),
                destination: SocketAddr::V4(slot.address),
            });
        }
        outputs
    }

    fn handle_register(&mut self, payload: &[u8], source: SocketAddr) -> Vec<BbmdOutput> {
        let SocketAddr::V4(source_v4) = source else {
            return vec![self.result_to(source, RESULT_REGISTER_FOREIGN_DEVICE_NAK)];
        };
        if payload.len() != 2 || !self.config.accept_fd_registrations {
            return vec![self.result_to(source, RESULT_REGISTER_FOREIGN_DEVICE_NAK)];
        }
        let ttl = u16::from_be_bytes([payload[0], payload[1]]);
        let remaining = ttl.saturating_add(FDT_GRACE_SECONDS);

        if let Some(slot) = self.fdt.iter_mut().find(|slot| slot.address == source_v4) {
            slot.ttl_seconds = ttl;
            slot.remaining_seconds = remaining;
        } else {
            if self.fdt.len() >= self.config.max_foreign_devices {
                return vec![self.result_to(source, RESULT_REGISTER_FOREIGN_DEVICE_NAK)];
            }
            self.fdt.push(FdtSlot {
                address: source_v4,
                ttl_seconds: ttl,
                remaining_seconds: remaining,
            });
        }
        log::debug!("registered foreign device {source_v4} ttl={ttl}s");
        vec![self.result_to(source, RESULT_SUCCESSFUL_COMPLETION)]
    }

    fn handle_write_bdt(&mut self, payload: &[u8], source: SocketAddr) -> Vec<BbmdOutput> {
        if !self.config.allow_write_bdt {
            return vec![self.result_to(source, RESULT_WRITE_BDT_NAK)];
        }
        let Ok(entries) = decode_bdt_payload(payload) else {
            return vec![self.result_to(source, RESULT_WRITE_BDT_NAK)];
        };
        self.bdt = entries;
        if let Err(e) = self.persist_bdt() {
            log::warn!("failed to persist BDT backup: {e}");
        }
        vec![self.result_to(source, RESULT_SUCCESSFUL_COMPLETION)]
    }

    fn handle_delete_fdt(&mut self, payload: &[u8], source: SocketAddr) -> Vec<BbmdOutput> {
        if payload.len() != 6 {
            return vec![self.result_to(source, RESULT_DELETE_FDT_ENTRY_NAK)];
        }
        let target = SocketAddrV4::new(
            Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]),
            u16::from_be_bytes([payload[4], payload[5]]),
        );
        let before = self.fdt.len();
        self.fdt.retain(|slot| slot.address != target);
        if self.fdt.len() == before {
            return vec![self.result_to(source, RESULT_DELETE_FDT_ENTRY_NAK)];
        }
        vec![self.result_to(source, RESULT_SUCCESSFUL_COMPLETION)]
    }

    fn handle_distribute(&mut self, payload: &[u8], source: SocketAddr) -> Vec<BbmdOutput> {
        let registered = matches!(source, SocketAddr::V4(v4)
            if self.fdt.iter().any(|slot| slot.address == v4));
        if !registered {
            return vec![self.result_to(source, RESULT_DISTRIBUTE_BROADCAST_NAK)];
        }

        let mut outputs = self.forward_broadcast(payload, source, source);
        // The distributing foreign device cannot reach the local wire.
        let origin_v4 = match source {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => return outputs,
        };
        let advertised = self.config.nat_global_address.unwrap_or(origin_v4);
        let mut forwarded = Vec::with_capacity(6 + payload.len());
        forwarded.extend_from_slice(&advertised.ip().octets());
        forwarded.extend_from_slice(&advertised.port().to_be_bytes());
        forwarded.extend_from_slice(payload);
        if let Ok(frame) = bvlc::build_frame(BvlcFunction::ForwardedNpdu, &forwarded) {
            outputs.push(BbmdOutput::Broadcast { frame });
        }
        outputs.push(BbmdOutput::Deliver {
            npdu: payload.to_vec(),
            source,
        });
        outputs
    }

    fn encode_fdt_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.fdt.len() * 10);
        for slot in &self.fdt {
            payload.extend_from_slice(&slot.address.ip().octets());
            payload.extend_from_slice(&slot.address.port().to_be_bytes());
            payload.extend_from_slice(&slot.ttl_seconds.to_be_bytes());
            payload.extend_from_slice(&slot.remaining_seconds.to_be_bytes());
        }
        payload
    }

    fn result_to(&self, destination: SocketAddr, code: u16) -> BbmdOutput {
        BbmdOutput::Send {
            frame: bvlc::build_result(code),
            destination,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct BdtBackupRecord {
    host: String,
    port: u16,
    mask: [u8; 4],
}

fn parse_bdt_backup(contents: &str) -> Result<Vec<BroadcastDistributionEntry>, String> {
    let records: Vec<BdtBackupRecord> =
        serde_json::from_str(contents).map_err(|e| e.to_string())?;
    records
        .into_iter()
        .map(|record| {
            let ip: Ipv4Addr = record.host.parse().map_err(|_| {
                format!("invalid BDT backup host '{}'", record.host)
            })?;
            Ok(BroadcastDistributionEntry {
                address: SocketAddrV4::new(ip, record.port),
                mask: Ipv4Addr::from(record.mask),
            })
        })
        .collect()
}

/// A BBMD-capable transport: an ordinary BACnet/IP socket that also runs
/// the broadcast-management engine on every datagram.
#[derive(Debug, Clone)]
pub struct BbmdTransport {
    socket: Arc<UdpSocket>,
    engine: Arc<Mutex<Bbmd>>,
    broadcast_port: u16,
}

impl BbmdTransport {
    pub async fn bind(bind_addr: SocketAddr, config: BbmdConfig) -> Result<Self, DataLinkError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        let broadcast_port = config.local_address.port();
        let engine = Bbmd::new(config).map_err(DataLinkError::Io)?;
        Ok(Self {
            socket: Arc::new(socket),
            engine: Arc::new(Mutex::new(engine)),
            broadcast_port,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DataLinkError> {
        self.socket.local_addr().map_err(DataLinkError::Io)
    }

    pub async fn set_broadcast_distribution_table(
        &self,
        entries: Vec<BroadcastDistributionEntry>,
    ) -> Result<(), DataLinkError> {
        self.engine
            .lock()
            .await
            .set_broadcast_distribution_table(entries)
            .map_err(DataLinkError::Io)
    }

    pub async fn broadcast_distribution_table(&self) -> Vec<BroadcastDistributionEntry> {
        self.engine.lock().await.broadcast_distribution_table().to_vec()
    }

    pub async fn foreign_device_table(&self) -> Vec<ForeignDeviceTableEntry> {
        self.engine.lock().await.foreign_device_table()
    }

    /// Age the FDT; call from a periodic task.
    pub async fn sweep(&self, elapsed_seconds: u16) {
        self.engine.lock().await.sweep(elapsed_seconds);
    }

    async fn execute(&self, outputs: Vec<BbmdOutput>) -> Result<Option<(Vec<u8>, SocketAddr)>, DataLinkError> {
        let mut delivered = None;
        for output in outputs {
            match output {
                BbmdOutput::Deliver { npdu, source } => delivered = Some((npdu, source)),
                BbmdOutput::Send { frame, destination } => {
                    self.socket.send_to(&frame, destination).await?;
                }
                BbmdOutput::Broadcast { frame } => {
                    let destination = SocketAddr::new(
                        IpAddr::V4(Ipv4Addr::BROADCAST),
                        self.broadcast_port,
                    );
                    self.socket.send_to(&frame, destination).await?;
                }
            }
        }
        Ok(delivered)
    }
}

impl DataLink for BbmdTransport {
    async fn send(&self, address: DataLinkAddress, payload: &[u8]) -> Result<(), DataLinkError> {
        if address.is_broadcast() {
            let outputs = {
                let mut engine = self.engine.lock().await;
                engine.handle_local_origin_broadcast(payload)
            };
            self.execute(outputs).await?;
            Ok(())
        } else {
            let frame = bvlc::build_frame(BvlcFunction::OriginalUnicastNpdu, payload)
                .map_err(|_| DataLinkError::FrameTooLarge)?;
            self.socket.send_to(&frame, address.as_socket_addr()).await?;
            Ok(())
        }
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, DataLinkAddress), DataLinkError> {
        loop {
            let mut frame = [0u8; super::transport::MAX_BIP_FRAME_LEN];
            let (n, src) = self.socket.recv_from(&mut frame).await?;
            let outputs = {
                let mut engine = self.engine.lock().await;
                engine.handle_datagram(&frame[..n], src)
            };
            if let Some((npdu, source)) = self.execute(outputs).await? {
                if npdu.len() > buf.len() {
                    return Err(DataLinkError::FrameTooLarge);
                }
                buf[..npdu.len()].copy_from_slice(&npdu);
                return Ok((npdu.len(), DataLinkAddress::Ip(source)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Bbmd, BbmdConfig, BbmdOutput};
    use crate::bip::bvlc::{
        self, BvlcFunction, RESULT_DISTRIBUTE_BROADCAST_NAK,
        RESULT_REGISTER_FOREIGN_DEVICE_NAK, RESULT_SUCCESSFUL_COMPLETION, RESULT_WRITE_BDT_NAK,
    };
    use crate::bip::transport::BroadcastDistributionEntry;
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

    fn local() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 47808)
    }

    fn peer() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 47808)
    }

    fn engine_with_peer() -> Bbmd {
        let mut bbmd = Bbmd::new(BbmdConfig::new(local())).unwrap();
        bbmd.set_broadcast_distribution_table(vec![
            BroadcastDistributionEntry::unicast(local()),
            BroadcastDistributionEntry::unicast(peer()),
        ])
        .unwrap();
        bbmd
    }

    fn result_code(frame: &[u8]) -> u16 {
        u16::from_be_bytes([frame[4], frame[5]])
    }

    fn register_frame(ttl: u16) -> Vec<u8> {
        bvlc::build_frame(BvlcFunction::RegisterForeignDevice, &ttl.to_be_bytes()).unwrap()
    }

    #[test]
    fn original_broadcast_forwards_to_peers_not_source() {
        let mut bbmd = engine_with_peer();
        let wire_device = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 77), 47808));
        let frame = bvlc::build_frame(BvlcFunction::OriginalBroadcastNpdu, &[1, 2, 3]).unwrap();

        let outputs = bbmd.handle_datagram(&frame, wire_device);
        let sends: Vec<_> = outputs
            .iter()
            .filter_map(|o| match o {
                BbmdOutput::Send { destination, .. } => Some(*destination),
                _ => None,
            })
            .collect();
        assert_eq!(sends, vec![SocketAddr::V4(peer())]);
        assert!(outputs
            .iter()
            .any(|o| matches!(o, BbmdOutput::Deliver { source, .. } if *source == wire_device)));
    }

    #[test]
    fn broadcast_is_not_reflected_to_originating_peer() {
        let mut bbmd = engine_with_peer();
        let frame = bvlc::build_frame(BvlcFunction::OriginalBroadcastNpdu, &[9]).unwrap();
        let outputs = bbmd.handle_datagram(&frame, SocketAddr::V4(peer()));
        assert!(!outputs.iter().any(|o| matches!(
            o,
            BbmdOutput::Send { destination, .. } if *destination == SocketAddr::V4(peer())
        )));
    }

    #[test]
    fn forwarded_npdu_from_self_is_dropped() {
        let mut bbmd = engine_with_peer();
        let mut payload = Vec::new();
        payload.extend_from_slice(&local().ip().octets());
        payload.extend_from_slice(&local().port().to_be_bytes());
        payload.extend_from_slice(&[1, 2, 3]);
        let frame = bvlc::build_frame(BvlcFunction::ForwardedNpdu, &payload).unwrap();

        let outputs = bbmd.handle_datagram(&frame, SocketAddr::V4(peer()));
        assert!(outputs.is_empty());
    }

    #[test]
    fn forwarded_npdu_from_unicast_peer_rebroadcasts_locally() {
        let mut bbmd = engine_with_peer();
        let origin = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 99), 47808);
        let mut payload = Vec::new();
        payload.extend_from_slice(&origin.ip().octets());
        payload.extend_from_slice(&origin.port().to_be_bytes());
        payload.extend_from_slice(&[7, 7]);
        let frame = bvlc::build_frame(BvlcFunction::ForwardedNpdu, &payload).unwrap();

        let outputs = bbmd.handle_datagram(&frame, SocketAddr::V4(peer()));
        assert!(outputs
            .iter()
            .any(|o| matches!(o, BbmdOutput::Broadcast { .. })));
        assert!(outputs.iter().any(|o| matches!(
            o,
            BbmdOutput::Deliver { source, .. } if *source == SocketAddr::V4(origin)
        )));
    }

    #[test]
    fn register_and_expire_foreign_device() {
        let mut bbmd = Bbmd::new(BbmdConfig::new(local())).unwrap();
        let fd = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(172, 16, 0, 9), 47808));

        let outputs = bbmd.handle_datagram(&register_frame(60), fd);
        match &outputs[..] {
            [BbmdOutput::Send { frame, destination }] => {
                assert_eq!(*destination, fd);
                assert_eq!(result_code(frame), RESULT_SUCCESSFUL_COMPLETION);
            }
            other => panic!("unexpected outputs: {other:?}"),
        }
        assert_eq!(bbmd.foreign_device_table().len(), 1);
        assert_eq!(bbmd.foreign_device_table()[0].remaining_seconds, 90);

        bbmd.sweep(89);
        assert_eq!(bbmd.foreign_device_table().len(), 1);
        bbmd.sweep(1);
        assert!(bbmd.foreign_device_table().is_empty());
    }

    #[test]
    fn registration_refused_when_table_full() {
        let mut config = BbmdConfig::new(local());
        config.max_foreign_devices = 1;
        let mut bbmd = Bbmd::new(config).unwrap();

        let first = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(172, 16, 0, 1), 47808));
        let second = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(172, 16, 0, 2), 47808));
        bbmd.handle_datagram(&register_frame(60), first);

        let outputs = bbmd.handle_datagram(&register_frame(60), second);
        match &outputs[..] {
            [BbmdOutput::Send { frame, .. }] => {
                assert_eq!(result_code(frame), RESULT_REGISTER_FOREIGN_DEVICE_NAK);
            }
            other => panic!("unexpected outputs: {other:?}"),
        }
        // Re-registration of an existing entry still succeeds.
        let outputs = bbmd.handle_datagram(&register_frame(120), first);
        match &outputs[..] {
            [BbmdOutput::Send { frame, .. }] => {
                assert_eq!(result_code(frame), RESULT_SUCCESSFUL_COMPLETION);
            }
            other => panic!("unexpected outputs: {other:?}"),
        }
    }

    #[test]
    fn write_bdt_refused_by_default() {
        let mut bbmd = Bbmd::new(BbmdConfig::new(local())).unwrap();
        let frame = bvlc::build_frame(
            BvlcFunction::WriteBroadcastDistributionTable,
            &[10, 0, 0, 1, 0xBA, 0xC0, 255, 255, 255, 255],
        )
        .unwrap();
        let outputs = bbmd.handle_datagram(&frame, SocketAddr::V4(peer()));
        match &outputs[..] {
            [BbmdOutput::Send { frame, .. }] => {
                assert_eq!(result_code(frame), RESULT_WRITE_BDT_NAK);
            }
            other => panic!("unexpected outputs: {other:?}"),
        }
    }

    #[test]
    fn distribute_requires_registration() {
        let mut bbmd = engine_with_peer();
        let fd = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(172, 16, 0, 9), 47808));
        let frame =
            bvlc::build_frame(BvlcFunction::DistributeBroadcastToNetwork, &[1, 2]).unwrap();

        let outputs = bbmd.handle_datagram(&frame, fd);
        match &outputs[..] {
            [BbmdOutput::Send { frame, .. }] => {
                assert_eq!(result_code(frame), RESULT_DISTRIBUTE_BROADCAST_NAK);
            }
            other => panic!("unexpected outputs: {other:?}"),
        }

        bbmd.handle_datagram(&register_frame(60), fd);
        let outputs = bbmd.handle_datagram(&frame, fd);
        // Forward to peer, local re-broadcast, local delivery; never back
        // to the distributing device.
        assert!(outputs.iter().any(|o| matches!(
            o,
            BbmdOutput::Send { destination, .. } if *destination == SocketAddr::V4(peer())
        )));
        assert!(outputs
            .iter()
            .any(|o| matches!(o, BbmdOutput::Broadcast { .. })));
        assert!(!outputs.iter().any(|o| matches!(
            o,
            BbmdOutput::Send { destination, .. } if *destination == fd
        )));
    }

    #[test]
    fn nat_global_address_substitutes_origin() {
        let mut config = BbmdConfig::new(local());
        let nat = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 47808);
        config.nat_global_address = Some(nat);
        let mut bbmd = Bbmd::new(config).unwrap();
        bbmd.set_broadcast_distribution_table(vec![
            BroadcastDistributionEntry::unicast(local()),
            BroadcastDistributionEntry::unicast(peer()),
        ])
        .unwrap();

        let wire_device = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 2), 47808));
        let frame = bvlc::build_frame(BvlcFunction::OriginalBroadcastNpdu, &[5]).unwrap();
        let outputs = bbmd.handle_datagram(&frame, wire_device);
        let forwarded = outputs
            .iter()
            .find_map(|o| match o {
                BbmdOutput::Send { frame, .. } => Some(frame.clone()),
                _ => None,
            })
            .expect("expected a forwarded frame");
        assert_eq!(&forwarded[4..8], &nat.ip().octets());

        // And a Forwarded-NPDU claiming to come from the NAT address is
        // recognised as our own echo.
        let mut payload = Vec::new();
        payload.extend_from_slice(&nat.ip().octets());
        payload.extend_from_slice(&nat.port().to_be_bytes());
        payload.extend_from_slice(&[5]);
        let echo = bvlc::build_frame(BvlcFunction::ForwardedNpdu, &payload).unwrap();
        assert!(bbmd.handle_datagram(&echo, SocketAddr::V4(peer())).is_empty());
    }

    #[test]
    fn bdt_backup_roundtrip() {
        let dir = std::env::temp_dir().join(format!("bacnode-bdt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bdt.json");

        let mut config = BbmdConfig::new(local());
        config.backup_path = Some(path.clone());
        let mut bbmd = Bbmd::new(config.clone()).unwrap();
        bbmd.set_broadcast_distribution_table(vec![BroadcastDistributionEntry::unicast(peer())])
            .unwrap();

        let reloaded = Bbmd::new(config).unwrap();
        assert_eq!(
            reloaded.broadcast_distribution_table(),
            &[BroadcastDistributionEntry::unicast(peer())]
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
