use crate::error::AppError;
use bacnode_core::encoding::{reader::Reader, writer::Writer};
use bacnode_core::npdu::{NetworkMessageType, Npdu, NpduAddress, GLOBAL_BROADCAST_NETWORK};
use bacnode_core::types::BacnetAddress;
use bacnode_datalink::bip6::BacnetIp6Transport;
use bacnode_datalink::{BacnetIpTransport, BbmdTransport, DataLink, DataLinkAddress};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::time::{Duration, Instant};

const MAX_NPDU_LEN: usize = 1600;

/// How long a learned route stays valid without being refreshed.
const ROUTER_CACHE_TTL: Duration = Duration::from_secs(300);

/// How long an NPDU waits for Who-Is-Router resolution before being
/// dropped.
const PENDING_RESOLUTION_TTL: Duration = Duration::from_secs(5);

/// The transports a port can run on.
#[derive(Debug, Clone)]
pub enum PortTransport {
    Ip(BacnetIpTransport),
    Ip6(BacnetIp6Transport),
    Bbmd(BbmdTransport),
}

impl PortTransport {
    pub async fn send(
        &self,
        address: DataLinkAddress,
        payload: &[u8],
    ) -> Result<(), bacnode_datalink::DataLinkError> {
        match self {
            Self::Ip(t) => t.send(address, payload).await,
            Self::Ip6(t) => t.send(address, payload).await,
            Self::Bbmd(t) => t.send(address, payload).await,
        }
    }

    pub async fn recv(
        &self,
        buf: &mut [u8],
    ) -> Result<(usize, DataLinkAddress), bacnode_datalink::DataLinkError> {
        match self {
            Self::Ip(t) => t.recv(buf).await,
            Self::Ip6(t) => t.recv(buf).await,
            Self::Bbmd(t) => t.recv(buf).await,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, bacnode_datalink::DataLinkError> {
        match self {
            Self::Ip(t) => t.local_addr(),
            Self::Ip6(t) => t.local_addr(),
            Self::Bbmd(t) => t.local_addr(),
        }
    }
}

/// One attached data link.
#[derive(Debug, Clone)]
pub struct Port {
    pub port_id: u8,
    /// Network number of the wire this port attaches to; `None` for a
    /// plain single-port device that never routes.
    pub network_number: Option<u16>,
    pub transport: PortTransport,
    pub udp_port: u16,
}

#[derive(Debug, Clone)]
struct RouterEntry {
    port_id: u8,
    router_mac: Vec<u8>,
    last_seen: Instant,
}

#[derive(Debug)]
struct PendingNpdu {
    destination: BacnetAddress,
    apdu: Vec<u8>,
    expecting_reply: bool,
    queued_at: Instant,
}

/// What the network layer decided about an inbound datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// An APDU for the local application, with its effective source.
    Apdu {
        source: BacnetAddress,
        apdu: Vec<u8>,
    },
    /// Consumed at the network layer (network message, forwarded, or
    /// dropped).
    Consumed,
}

/// The network layer: NPDU framing, router-cache learning, and N-port
/// forwarding when more than one port is attached.
pub struct NetworkStack {
    ports: Vec<Port>,
    application_port: u8,
    router_cache: HashMap<u16, RouterEntry>,
    /// At most one queued NPDU per unresolved destination network; a new
    /// miss overwrites the old entry.
    pending: HashMap<u16, PendingNpdu>,
}

impl NetworkStack {
    pub fn new(ports: Vec<Port>, application_port: u8) -> Self {
        Self {
            ports,
            application_port,
            router_cache: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn is_router(&self) -> bool {
        self.ports.len() > 1
    }

    fn port(&self, port_id: u8) -> Option<&Port> {
        self.ports.iter().find(|p| p.port_id == port_id)
    }

    fn application_port(&self) -> &Port {
        self.port(self.application_port)
            .unwrap_or(&self.ports[0])
    }

    fn port_for_network(&self, network: u16) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| p.network_number == Some(network))
    }

    fn wire_destination(&self, port: &Port, mac: &[u8]) -> DataLinkAddress {
        if mac.is_empty() {
            DataLinkAddress::local_broadcast(port.udp_port)
        } else {
            BacnetAddress::local(mac.to_vec())
                .to_socket_addr()
                .map(DataLinkAddress::Ip)
                .unwrap_or_else(|| DataLinkAddress::local_broadcast(port.udp_port))
        }
    }

    /// Send an APDU toward a BACnet address, routing as required.
    pub async fn send_apdu(
        &mut self,
        destination: &BacnetAddress,
        apdu: &[u8],
        expecting_reply: bool,
    ) -> Result<(), AppError> {
        match destination.network {
            // Local wire of the application port.
            None => {
                let port = self.application_port().clone();
                let npdu = Npdu::application(expecting_reply);
                let frame = frame_npdu(&npdu, apdu)?;
                let wire = self.wire_destination(&port, &destination.mac);
                port.transport.send(wire, &frame).await?;
                Ok(())
            }
            Some(GLOBAL_BROADCAST_NETWORK) => {
                let npdu = Npdu::application(expecting_reply)
                    .with_destination(NpduAddress::broadcast(GLOBAL_BROADCAST_NETWORK));
                let frame = frame_npdu(&npdu, apdu)?;
                for port in self.ports.clone() {
                    let wire = DataLinkAddress::local_broadcast(port.udp_port);
                    if let Err(e) = port.transport.send(wire, &frame).await {
                        log::warn!("global broadcast on port {} failed: {e}", port.port_id);
                    }
                }
                Ok(())
            }
            Some(network) => {
                // Directly attached network: deliver as local traffic on
                // that wire.
                if let Some(port) = self.port_for_network(network).cloned() {
                    let npdu = Npdu::application(expecting_reply);
                    let frame = frame_npdu(&npdu, apdu)?;
                    let wire = self.wire_destination(&port, &destination.mac);
                    port.transport.send(wire, &frame).await?;
                    return Ok(());
                }
                // Remote: through a router, resolving on demand.
                self.send_remote(destination, network, apdu, expecting_reply)
                    .await
            }
        }
    }

    async fn send_remote(
        &mut self,
        destination: &BacnetAddress,
        network: u16,
        apdu: &[u8],
        expecting_reply: bool,
    ) -> Result<(), AppError> {
        if let Some(entry) = self.router_cache.get(&network) {
            let port = self
                .port(entry.port_id)
                .cloned()
                .ok_or(AppError::UnreachableNetwork(network))?;
            let npdu = Npdu::application(expecting_reply)
                .with_destination(NpduAddress::new(network, &destination.mac));
            let frame = frame_npdu(&npdu, apdu)?;
            let wire = self.wire_destination(&port, &entry.router_mac.clone());
            port.transport.send(wire, &frame).await?;
            return Ok(());
        }

        // Cache miss: park the NPDU (one slot per network) and ask.
        self.pending.insert(
            network,
            PendingNpdu {
                destination: destination.clone(),
                apdu: apdu.to_vec(),
                expecting_reply,
                queued_at: Instant::now(),
            },
        );
        self.send_who_is_router(Some(network)).await;
        Ok(())
    }

    pub async fn send_who_is_router(&mut self, network: Option<u16>) {
        let mut npdu = Npdu::network_message(NetworkMessageType::WhoIsRouterToNetwork);
        npdu.destination = Some(NpduAddress::broadcast(GLOBAL_BROADCAST_NETWORK));
        npdu.hop_count = Some(255);
        let mut body = [0u8; 2];
        let body = match network {
            Some(n) => {
                body.copy_from_slice(&n.to_be_bytes());
                &body[..]
            }
            None => &[],
        };
        let Ok(frame) = frame_npdu(&npdu, body) else {
            return;
        };
        for port in self.ports.clone() {
            let wire = DataLinkAddress::local_broadcast(port.udp_port);
            if let Err(e) = port.transport.send(wire, &frame).await {
                log::warn!("who-is-router on port {} failed: {e}", port.port_id);
            }
        }
    }

    /// Process one inbound NPDU-bearing datagram.
    pub async fn handle_inbound(
        &mut self,
        port_id: u8,
        raw: &[u8],
        wire_source: DataLinkAddress,
    ) -> Result<Inbound, AppError> {
        let mut r = Reader::new(raw);
        let npdu = match Npdu::decode(&mut r) {
            Ok(npdu) => npdu,
            Err(e) => {
                log::warn!("dropping malformed NPDU from {wire_source}: {e}");
                return Ok(Inbound::Consumed);
            }
        };
        let body = r.rest().to_vec();
        let wire_mac = match wire_source {
            DataLinkAddress::Ip(addr) => BacnetAddress::from_socket_addr(addr).mac,
        };

        // Router-cache learning: remote SNETs are reachable through the
        // wire source.
        if let Some(source) = npdu.source {
            if self.port_for_network(source.network).is_none() {
                self.learn_route(source.network, port_id, wire_mac.clone())
                    .await;
            }
        }

        if npdu.is_network_message() {
            self.handle_network_message(port_id, &npdu, &body, &wire_mac)
                .await;
            return Ok(Inbound::Consumed);
        }

        // Routed traffic: a DNET present means somebody wants this
        // elsewhere (or it is a broadcast we also consume).
        if let Some(destination) = npdu.destination {
            let local_network = self.port(port_id).and_then(|p| p.network_number);
            let is_global = destination.network == GLOBAL_BROADCAST_NETWORK;
            let is_for_us = is_global || local_network == Some(destination.network);

            if self.is_router() && (is_global || !is_for_us) {
                self.forward(port_id, &npdu, &body, &wire_mac).await;
            }
            if !is_for_us && !is_global {
                return Ok(Inbound::Consumed);
            }
        }

        let source = match npdu.source {
            Some(snet) => BacnetAddress::remote(snet.network, snet.mac_bytes().to_vec()),
            None => BacnetAddress::local(wire_mac),
        };
        Ok(Inbound::Apdu { source, apdu: body })
    }

    async fn learn_route(&mut self, network: u16, port_id: u8, router_mac: Vec<u8>) {
        let refreshed = self
            .router_cache
            .insert(
                network,
                RouterEntry {
                    port_id,
                    router_mac,
                    last_seen: Instant::now(),
                },
            )
            .is_some();
        if !refreshed {
            log::debug!("learned route to network {network} via port {port_id}");
        }
        self.flush_pending(network).await;
    }

    async fn flush_pending(&mut self, network: u16) {
        let Some(pending) = self.pending.remove(&network) else {
            return;
        };
        if pending.queued_at.elapsed() > PENDING_RESOLUTION_TTL {
            return;
        }
        if let Err(e) = self
            .send_apdu(&pending.destination, &pending.apdu, pending.expecting_reply)
            .await
        {
            log::warn!("flushing queued NPDU for network {network} failed: {e}");
        }
    }

    async fn handle_network_message(
        &mut self,
        port_id: u8,
        npdu: &Npdu,
        body: &[u8],
        wire_mac: &[u8],
    ) {
        let message = NetworkMessageType::from_u8(npdu.message_type.unwrap_or(0));
        match message {
            NetworkMessageType::WhoIsRouterToNetwork => {
                if !self.is_router() {
                    return;
                }
                let asked = (body.len() >= 2).then(|| u16::from_be_bytes([body[0], body[1]]));
                let reachable = self.reachable_networks(port_id);
                let respond = match asked {
                    Some(network) => reachable.contains(&network),
                    None => !reachable.is_empty(),
                };
                if respond {
                    let networks = match asked {
                        Some(network) => vec![network],
                        None => reachable,
                    };
                    self.send_i_am_router(port_id, &networks).await;
                }
            }
            NetworkMessageType::IAmRouterToNetwork => {
                for chunk in body.chunks_exact(2) {
                    let network = u16::from_be_bytes([chunk[0], chunk[1]]);
                    if self.port_for_network(network).is_none() {
                        self.learn_route(network, port_id, wire_mac.to_vec()).await;
                    }
                }
            }
            NetworkMessageType::RejectMessageToNetwork => {
                if body.len() >= 3 {
                    let reason = body[0];
                    let network = u16::from_be_bytes([body[1], body[2]]);
                    log::warn!(
                        "router rejected traffic for network {network} (reason {reason})"
                    );
                    self.pending.remove(&network);
                }
            }
            other => {
                log::debug!("ignoring network message {other:?} on port {port_id}");
            }
        }
    }

    fn reachable_networks(&self, via_port: u8) -> Vec<u16> {
        let mut networks: Vec<u16> = self
            .ports
            .iter()
            .filter(|p| p.port_id != via_port)
            .filter_map(|p| p.network_number)
            .collect();
        networks.extend(
            self.router_cache
                .iter()
                .filter(|(_, entry)| entry.port_id != via_port)
                .map(|(network, _)| *network),
        );
        networks.sort_unstable();
        networks.dedup();
        networks
    }

    async fn send_i_am_router(&self, via_port: u8, networks: &[u16]) {
        let Some(port) = self.port(via_port) else {
            return;
        };
        let npdu = Npdu::network_message(NetworkMessageType::IAmRouterToNetwork);
        let mut body = Vec::with_capacity(networks.len() * 2);
        for network in networks {
            body.extend_from_slice(&network.to_be_bytes());
        }
        let Ok(frame) = frame_npdu(&npdu, &body) else {
            return;
        };
        let wire = DataLinkAddress::local_broadcast(port.udp_port);
        if let Err(e) = port.transport.send(wire, &frame).await {
            log::warn!("i-am-router on port {via_port} failed: {e}");
        }
    }

    async fn send_reject_message(&self, via_port: u8, to_mac: &[u8], network: u16, reason: u8) {
        let Some(port) = self.port(via_port) else {
            return;
        };
        let npdu = Npdu::network_message(NetworkMessageType::RejectMessageToNetwork);
        let mut body = [0u8; 3];
        body[0] = reason;
        body[1..].copy_from_slice(&network.to_be_bytes());
        let Ok(frame) = frame_npdu(&npdu, &body) else {
            return;
        };
        let wire = self.wire_destination(port, to_mac);
        if let Err(e) = port.transport.send(wire, &frame).await {
            log::warn!("reject-message on port {via_port} failed: {e}");
        }
    }

    /// Re-emit a routed NPDU on the far port(s), decrementing the hop
    /// count and adding the source we learned on arrival.
    async fn forward(&mut self, arrival_port: u8, npdu: &Npdu, body: &[u8], wire_mac: &[u8]) {
        let Some(destination) = npdu.destination else {
            return;
        };
        let hop_count = npdu.hop_count.unwrap_or(0);
        if hop_count == 0 {
            log::debug!("hop count exhausted; dropping routed NPDU");
            return;
        }

        let arrival_network = self.port(arrival_port).and_then(|p| p.network_number);
        let source = npdu.source.or_else(|| {
            arrival_network.map(|network| NpduAddress::new(network, wire_mac))
        });

        if destination.network == GLOBAL_BROADCAST_NETWORK {
            for port in self.ports.clone() {
                if port.port_id == arrival_port {
                    continue;
                }
                let mut forwarded = *npdu;
                forwarded.source = source;
                forwarded.hop_count = Some(hop_count - 1);
                let Ok(frame) = frame_npdu(&forwarded, body) else {
                    continue;
                };
                let wire = DataLinkAddress::local_broadcast(port.udp_port);
                if let Err(e) = port.transport.send(wire, &frame).await {
                    log::warn!("broadcast forward on port {} failed: {e}", port.port_id);
                }
            }
            return;
        }

        let Some(out_port) = self.port_for_network(destination.network).cloned() else {
            // Not directly attached; try a learned route before giving up.
            if let Some(entry) = self.router_cache.get(&destination.network).cloned() {
                if entry.port_id != arrival_port {
                    if let Some(port) = self.port(entry.port_id).cloned() {
                        let mut forwarded = *npdu;
                        forwarded.source = source;
                        forwarded.hop_count = Some(hop_count - 1);
                        if let Ok(frame) = frame_npdu(&forwarded, body) {
                            let wire = self.wire_destination(&port, &entry.router_mac);
                            if let Err(e) = port.transport.send(wire, &frame).await {
                                log::warn!(
                                    "transit forward on port {} failed: {e}",
                                    port.port_id
                                );
                            }
                        }
                        return;
                    }
                }
            }
            self.send_reject_message(arrival_port, wire_mac, destination.network, 1)
                .await;
            return;
        };
        if out_port.port_id == arrival_port {
            return;
        }

        // Final hop: DNET is stripped and the frame goes out as local
        // traffic on the destination wire.
        let mut forwarded = Npdu::new(npdu.control);
        forwarded.source = source;
        let Ok(frame) = frame_npdu(&forwarded, body) else {
            return;
        };
        let wire = self.wire_destination(&out_port, destination.mac_bytes());
        if let Err(e) = out_port.transport.send(wire, &frame).await {
            log::warn!("forward on port {} failed: {e}", out_port.port_id);
        }
    }

    /// Install a static route: the given network is reachable through a
    /// router at `router_mac` on the application port. Pre-populating
    /// routes avoids the Who-Is-Router exchange.
    pub fn add_static_route(&mut self, network: u16, router_mac: Vec<u8>) {
        let port_id = self.application_port;
        self.router_cache.insert(
            network,
            RouterEntry {
                port_id,
                router_mac,
                last_seen: Instant::now() + Duration::from_secs(86_400),
            },
        );
    }

    /// Evict stale routes and expired queued NPDUs.
    pub fn sweep(&mut self) {
        let now = Instant::now();
        self.router_cache
            .retain(|_, entry| now.duration_since(entry.last_seen) <= ROUTER_CACHE_TTL);
        self.pending
            .retain(|_, pending| now.duration_since(pending.queued_at) <= PENDING_RESOLUTION_TTL);
    }

    /// Announce ourselves as a router on every port at startup.
    pub async fn announce_routes(&mut self) {
        if !self.is_router() {
            return;
        }
        for port in self.ports.clone() {
            let networks = self.reachable_networks(port.port_id);
            if !networks.is_empty() {
                self.send_i_am_router(port.port_id, &networks).await;
            }
        }
    }
}

fn frame_npdu(npdu: &Npdu, body: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut buf = vec![0u8; MAX_NPDU_LEN.min(body.len() + 64)];
    let len = {
        let mut w = Writer::new(&mut buf);
        npdu.encode(&mut w)?;
        w.write_all(body)?;
        w.as_written().len()
    };
    buf.truncate(len);
    Ok(buf)
}
