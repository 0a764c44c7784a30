//! The application orchestrator: one task owns every piece of mutable
//! protocol state (TSMs, object database, COV and event engines, router
//! cache) and multiplexes sockets, timers, and caller commands with
//! `select!`. Callers talk to it through [`ApplicationHandle`].

use crate::config::DeviceConfig;
use crate::cov::{CovDispatch, CovManager};
use crate::error::{AppError, ServiceError};
use crate::event::engine::EventEngine;
use crate::handlers::{self, DccState, HandlerContext, Notice};
use crate::network::{Inbound, NetworkStack, Port, PortTransport};
use crate::object::{Object, ObjectDatabase};
use crate::peer::{PeerCache, PeerCapabilities};
use crate::tsm::{ClientTsm, ConfirmedResult, Frame, ServerTsm};
use bacnode_core::apdu::{ApduType, UnconfirmedRequestHeader};
use bacnode_core::encoding::{reader::Reader, writer::Writer};
use bacnode_core::services::cov_notification::{
    encode_confirmed_cov_notification, encode_unconfirmed_cov_notification,
};
use bacnode_core::services::i_am::{IAmRequest, SERVICE_I_AM};
use bacnode_core::services::read_property::{ReadPropertyAck, ReadPropertyRequest};
use bacnode_core::services::subscribe_cov::SubscribeCovRequest;
use bacnode_core::services::text_message::SERVICE_UNCONFIRMED_TEXT_MESSAGE;
use bacnode_core::services::time_synchronization::{
    SERVICE_TIME_SYNCHRONIZATION, SERVICE_UTC_TIME_SYNCHRONIZATION,
};
use bacnode_core::services::who_has::{IHaveRequest, WhoHasObject, WhoHasRequest, SERVICE_WHO_HAS};
use bacnode_core::services::who_is::{WhoIsRequest, SERVICE_WHO_IS};
use bacnode_core::services::write_property::encode_write_property_request;
use bacnode_core::services::{
    cov_notification::SERVICE_UNCONFIRMED_COV_NOTIFICATION,
    event_notification::{EventNotification, SERVICE_UNCONFIRMED_EVENT_NOTIFICATION},
    private_transfer::SERVICE_UNCONFIRMED_PRIVATE_TRANSFER,
    who_am_i::{SERVICE_WHO_AM_I, SERVICE_YOU_ARE},
    write_group::SERVICE_WRITE_GROUP,
};
use bacnode_core::types::{BacnetAddress, ObjectId, PropertyId, PropertyValue, Segmentation};
use bacnode_core::EncodeError;
use bacnode_datalink::bip::bbmd::BbmdConfig;
use bacnode_datalink::{BacnetIpTransport, BbmdTransport, DataLinkAddress};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(100);
const TABLE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const MAX_DATAGRAM_LEN: usize = 1600;

/// A device discovered through Who-Is/I-Am.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: BacnetAddress,
    pub device_id: ObjectId,
    pub max_apdu_length: u32,
    pub segmentation: Segmentation,
    pub vendor_id: u32,
}

enum Command {
    Confirmed {
        destination: BacnetAddress,
        apdu: Vec<u8>,
        reply: oneshot::Sender<Result<ConfirmedResult, AppError>>,
    },
    Unconfirmed {
        destination: BacnetAddress,
        apdu: Vec<u8>,
    },
    Discover {
        range: Option<(u32, u32)>,
        wait: Duration,
        reply: oneshot::Sender<Vec<DiscoveredDevice>>,
    },
    AddObject {
        object: Object,
        reply: oneshot::Sender<Result<(), ServiceError>>,
    },
    RemoveObject {
        object_id: ObjectId,
        reply: oneshot::Sender<Result<(), ServiceError>>,
    },
    LocalRead {
        object_id: ObjectId,
        property_id: PropertyId,
        reply: oneshot::Sender<Result<PropertyValue, ServiceError>>,
    },
    LocalWrite {
        object_id: ObjectId,
        property_id: PropertyId,
        value: PropertyValue,
        priority: Option<u8>,
        reply: oneshot::Sender<Result<(), ServiceError>>,
    },
    AddRoute {
        network: u16,
        router_mac: Vec<u8>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

struct Discovery {
    range: Option<(u32, u32)>,
    deadline: Instant,
    found: Vec<DiscoveredDevice>,
    reply: Option<oneshot::Sender<Vec<DiscoveredDevice>>>,
}

/// Cloneable handle for talking to a running [`Application`].
#[derive(Clone)]
pub struct ApplicationHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    device_id: ObjectId,
}

impl ApplicationHandle {
    pub const fn device_id(&self) -> ObjectId {
        self.device_id
    }

    async fn command<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, AppError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| AppError::ShutDown)?;
        rx.await.map_err(|_| AppError::ShutDown)
    }

    /// Issue a raw confirmed request (a complete request APDU; the TSM
    /// assigns the invoke id) and await its outcome.
    pub async fn confirmed_request(
        &self,
        destination: BacnetAddress,
        apdu: Vec<u8>,
    ) -> Result<ConfirmedResult, AppError> {
        self.command(|reply| Command::Confirmed {
            destination,
            apdu,
            reply,
        })
        .await?
    }

    /// Send an unconfirmed request APDU.
    pub async fn unconfirmed_request(
        &self,
        destination: BacnetAddress,
        apdu: Vec<u8>,
    ) -> Result<(), AppError> {
        self.cmd_tx
            .send(Command::Unconfirmed { destination, apdu })
            .map_err(|_| AppError::ShutDown)
    }

    /// Broadcast Who-Is and collect I-Am responses for `wait`.
    pub async fn who_is(
        &self,
        range: Option<(u32, u32)>,
        wait: Duration,
    ) -> Result<Vec<DiscoveredDevice>, AppError> {
        self.command(|reply| Command::Discover { range, wait, reply })
            .await
    }

    pub async fn read_property(
        &self,
        destination: BacnetAddress,
        object_id: ObjectId,
        property_id: PropertyId,
    ) -> Result<PropertyValue, AppError> {
        self.read_property_at(destination, object_id, property_id, None)
            .await
    }

    pub async fn read_property_at(
        &self,
        destination: BacnetAddress,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
    ) -> Result<PropertyValue, AppError> {
        let apdu = encode_apdu(|w| {
            ReadPropertyRequest {
                object_id,
                property_id,
                array_index,
                invoke_id: 0,
            }
            .encode(w)
        })?;
        match self.confirmed_request(destination, apdu).await? {
            ConfirmedResult::ComplexAck(payload) => {
                let mut r = Reader::new(&payload);
                let ack = ReadPropertyAck::decode_after_header(&mut r)?;
                Ok(PropertyValue::from_data_value(&ack.value))
            }
            ConfirmedResult::SimpleAck => Err(AppError::UnsupportedResponse),
        }
    }

    pub async fn write_property(
        &self,
        destination: BacnetAddress,
        object_id: ObjectId,
        property_id: PropertyId,
        value: PropertyValue,
        priority: Option<u8>,
    ) -> Result<(), AppError> {
        let apdu = encode_apdu(|w| {
            encode_write_property_request(w, 0, object_id, property_id, None, &value, priority)
        })?;
        match self.confirmed_request(destination, apdu).await? {
            ConfirmedResult::SimpleAck => Ok(()),
            ConfirmedResult::ComplexAck(_) => Err(AppError::UnsupportedResponse),
        }
    }

    pub async fn subscribe_cov(
        &self,
        destination: BacnetAddress,
        request: SubscribeCovRequest,
    ) -> Result<(), AppError> {
        let apdu = encode_apdu(|w| request.encode(w))?;
        match self.confirmed_request(destination, apdu).await? {
            ConfirmedResult::SimpleAck => Ok(()),
            ConfirmedResult::ComplexAck(_) => Err(AppError::UnsupportedResponse),
        }
    }

    /// Add an object to the local database.
    pub async fn add_object(&self, object: Object) -> Result<(), AppError> {
        self.command(|reply| Command::AddObject { object, reply })
            .await?
            .map_err(|e| service_to_app(e))
    }

    pub async fn remove_object(&self, object_id: ObjectId) -> Result<(), AppError> {
        self.command(|reply| Command::RemoveObject { object_id, reply })
            .await?
            .map_err(|e| service_to_app(e))
    }

    /// Read a property of a local object without touching the network.
    pub async fn local_read(
        &self,
        object_id: ObjectId,
        property_id: PropertyId,
    ) -> Result<PropertyValue, AppError> {
        self.command(|reply| Command::LocalRead {
            object_id,
            property_id,
            reply,
        })
        .await?
        .map_err(|e| service_to_app(e))
    }

    /// Write a property of a local object, driving COV exactly like a
    /// remote write.
    pub async fn local_write(
        &self,
        object_id: ObjectId,
        property_id: PropertyId,
        value: PropertyValue,
        priority: Option<u8>,
    ) -> Result<(), AppError> {
        self.command(|reply| Command::LocalWrite {
            object_id,
            property_id,
            value,
            priority,
            reply,
        })
        .await?
        .map_err(|e| service_to_app(e))
    }

    /// Install a static route to a remote network through a router MAC.
    pub fn add_route(&self, network: u16, router_mac: Vec<u8>) -> Result<(), AppError> {
        self.cmd_tx
            .send(Command::AddRoute {
                network,
                router_mac,
            })
            .map_err(|_| AppError::ShutDown)
    }

    /// Stop the application: cancels outstanding transactions, stops the
    /// engines, and closes the sockets. Safe to call more than once.
    pub async fn stop(&self) -> Result<(), AppError> {
        match self.command(|reply| Command::Stop { reply }).await {
            Ok(()) => Ok(()),
            // Already stopped.
            Err(AppError::ShutDown) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn service_to_app(error: ServiceError) -> AppError {
    match error {
        ServiceError::Error(class, code) => AppError::RemoteError {
            class: Some(class),
            code: Some(code),
            class_raw: Some(class.to_u32()),
            code_raw: Some(code.to_u32()),
        },
        ServiceError::Reject(reason) => AppError::RemoteReject { reason },
        ServiceError::Abort(reason) => AppError::RemoteAbort {
            reason,
            server: true,
        },
    }
}

fn encode_apdu<F>(mut encode: F) -> Result<Vec<u8>, AppError>
where
    F: FnMut(&mut Writer<'_>) -> Result<(), EncodeError>,
{
    let mut overflow = EncodeError::BufferTooSmall { needed: 0 };
    for size in [256usize, 1024, 4096, 16_384, 65_536] {
        let mut buf = vec![0u8; size];
        let mut w = Writer::new(&mut buf);
        match encode(&mut w) {
            Ok(()) => {
                let len = w.as_written().len();
                buf.truncate(len);
                return Ok(buf);
            }
            Err(e @ EncodeError::BufferTooSmall { .. }) => {
                overflow = e;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Encode(overflow))
}

/// A running BACnet device/server/router instance.
pub struct Application {
    config: DeviceConfig,
    db: ObjectDatabase,
    cov: CovManager,
    events: EventEngine,
    dcc: DccState,
    peers: PeerCache,
    network: NetworkStack,
    client_tsm: ClientTsm,
    server_tsm: ServerTsm,
    bbmd: Option<BbmdTransport>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    datagram_rx: mpsc::UnboundedReceiver<(u8, Vec<u8>, DataLinkAddress)>,
    reader_tasks: Vec<JoinHandle<()>>,
    discoveries: Vec<Discovery>,
}

impl Application {
    /// Bind sockets per the configuration and build the application.
    /// Call [`run`](Self::run) (usually in a spawned task) to serve.
    pub async fn start(
        config: DeviceConfig,
    ) -> Result<(Application, ApplicationHandle), AppError> {
        config.validate().map_err(AppError::Configuration)?;

        let (datagram_tx, datagram_rx) = mpsc::unbounded_channel();
        let mut ports = Vec::new();
        let mut reader_tasks = Vec::new();
        let mut bbmd_transport = None;

        if let Some(router) = &config.router {
            for port_config in &router.ports {
                let transport = BacnetIpTransport::bind(port_config.bind).await?;
                let udp_port = transport.local_addr()?.port();
                ports.push(Port {
                    port_id: port_config.port_id,
                    network_number: Some(port_config.network_number),
                    transport: PortTransport::Ip(transport),
                    udp_port,
                });
            }
        } else if let Some(bbmd_config) = &config.bbmd {
            let engine_config = BbmdConfig {
                local_address: bbmd_config.local_address,
                nat_global_address: bbmd_config.nat_global_address,
                accept_fd_registrations: bbmd_config.accept_fd_registrations,
                allow_write_bdt: bbmd_config.allow_write_bdt,
                max_foreign_devices: bacnode_datalink::bip::bbmd::DEFAULT_MAX_FOREIGN_DEVICES,
                backup_path: bbmd_config.backup_path.clone(),
            };
            let transport = BbmdTransport::bind(config.bind, engine_config).await?;
            if !bbmd_config.bdt.is_empty() {
                transport
                    .set_broadcast_distribution_table(bbmd_config.bdt.clone())
                    .await?;
            }
            let udp_port = transport.local_addr()?.port();
            bbmd_transport = Some(transport.clone());
            ports.push(Port {
                port_id: 1,
                network_number: None,
                transport: PortTransport::Bbmd(transport),
                udp_port,
            });
        } else {
            let transport = match config.foreign_bbmd {
                Some((bbmd_addr, ttl)) => {
                    let transport = BacnetIpTransport::bind_foreign(config.bind, bbmd_addr).await?;
                    transport.register_foreign_device(ttl).await?;
                    // Re-register at three quarters of the TTL so the FDT
                    // entry never lapses.
                    let renewal = transport.clone();
                    let interval_secs = (u64::from(ttl).saturating_mul(3) / 4).max(1);
                    reader_tasks.push(tokio::spawn(async move {
                        loop {
                            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
                            if let Err(e) = renewal.register_foreign_device_no_wait(ttl).await {
                                log::warn!("foreign device renewal send failed: {e}");
                            }
                        }
                    }));
                    transport
                }
                None => BacnetIpTransport::bind(config.bind).await?,
            };
            let udp_port = transport.local_addr()?.port();
            ports.push(Port {
                port_id: 1,
                network_number: None,
                transport: PortTransport::Ip(transport),
                udp_port,
            });
        }

        for port in &ports {
            let transport = port.transport.clone();
            let port_id = port.port_id;
            let tx = datagram_tx.clone();
            reader_tasks.push(tokio::spawn(async move {
                let mut buf = [0u8; MAX_DATAGRAM_LEN];
                loop {
                    match transport.recv(&mut buf).await {
                        Ok((n, source)) => {
                            if tx.send((port_id, buf[..n].to_vec(), source)).is_err() {
                                break;
                            }
                        }
                        Err(bacnode_datalink::DataLinkError::InvalidFrame)
                        | Err(bacnode_datalink::DataLinkError::UnsupportedBvlcFunction(_)) => {
                            continue;
                        }
                        Err(e) => {
                            log::warn!("port {port_id} receive failed: {e}");
                            break;
                        }
                    }
                }
            }));
        }

        let application_port = config
            .router
            .as_ref()
            .map(|router| router.application_port)
            .unwrap_or(1);
        let network = NetworkStack::new(ports, application_port);
        let db = ObjectDatabase::new(&config);
        let device_id = db.device_id();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = ApplicationHandle { cmd_tx, device_id };

        let application = Application {
            client_tsm: ClientTsm::new(
                config.apdu_timeout,
                config.apdu_segment_timeout,
                config.apdu_retries,
                config.proposed_window_size,
            ),
            server_tsm: ServerTsm::new(
                config.apdu_timeout,
                config.apdu_segment_timeout,
                config.max_apdu_length,
                config.proposed_window_size,
            ),
            db,
            cov: CovManager::new(),
            events: EventEngine::new(),
            dcc: DccState::new(),
            peers: PeerCache::new(),
            network,
            bbmd: bbmd_transport,
            cmd_rx,
            datagram_rx,
            reader_tasks,
            discoveries: Vec::new(),
            config,
        };
        Ok((application, handle))
    }

    /// Socket address of the application port, for callers that need to
    /// advertise it (tests, tools).
    pub fn primary_addr(&self) -> Option<std::net::SocketAddr> {
        self.network
            .ports()
            .first()
            .and_then(|port| port.transport.local_addr().ok())
    }

    /// Socket address of a specific router port.
    pub fn port_addr(&self, port_id: u8) -> Option<std::net::SocketAddr> {
        self.network
            .ports()
            .iter()
            .find(|port| port.port_id == port_id)
            .and_then(|port| port.transport.local_addr().ok())
    }

    /// The event loop. Returns after `stop()`.
    pub async fn run(mut self) {
        let mut scan = interval(self.config.event_scan_interval);
        scan.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut housekeeping = interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut table_sweep = interval(TABLE_SWEEP_INTERVAL);
        table_sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.network.announce_routes().await;
        self.broadcast_i_am().await;

        loop {
            tokio::select! {
                maybe = self.datagram_rx.recv() => {
                    let Some((port_id, data, source)) = maybe else { break };
                    self.handle_datagram(port_id, data, source).await;
                }
                maybe = self.cmd_rx.recv() => {
                    let Some(command) = maybe else { break };
                    if self.handle_command(command).await {
                        break;
                    }
                }
                _ = scan.tick() => self.scan_events().await,
                _ = housekeeping.tick() => self.housekeeping().await,
                _ = table_sweep.tick() => self.table_sweep().await,
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.client_tsm.cancel_all();
        self.server_tsm.clear();
        self.cov.clear();
        for task in self.reader_tasks.drain(..) {
            task.abort();
        }
        self.cmd_rx.close();
        // Commands that raced the shutdown get a clean error by having
        // their reply channels dropped.
        while let Ok(command) = self.cmd_rx.try_recv() {
            if let Command::Stop { reply } = command {
                let _ = reply.send(());
            }
        }
        log::info!("application stopped");
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Confirmed {
                destination,
                apdu,
                reply,
            } => {
                if !self.dcc.allows_initiation() {
                    let _ = reply.send(Err(AppError::CommunicationDisabled));
                    return false;
                }
                let peer_max = self
                    .peers
                    .max_apdu_for(&destination, self.config.max_apdu_length);
                let peer_can_segment = self
                    .peers
                    .segmentation_for(&destination)
                    .map(Segmentation::can_receive)
                    .unwrap_or(true);
                let frames = self.client_tsm.start(
                    Instant::now(),
                    destination,
                    apdu,
                    peer_max,
                    peer_can_segment,
                    reply,
                );
                self.send_frames(frames).await;
            }
            Command::Unconfirmed { destination, apdu } => {
                if self.dcc.allows_initiation() {
                    self.send_frames(vec![Frame {
                        destination,
                        apdu,
                        expecting_reply: false,
                    }])
                    .await;
                }
            }
            Command::Discover { range, wait, reply } => {
                let request = match range {
                    Some((low, high)) => WhoIsRequest::range(low, high),
                    None => WhoIsRequest::global(),
                };
                match encode_apdu(|w| request.encode(w)) {
                    Ok(apdu) => {
                        self.send_frames(vec![Frame {
                            destination: BacnetAddress::local_broadcast(),
                            apdu,
                            expecting_reply: false,
                        }])
                        .await;
                        self.discoveries.push(Discovery {
                            range,
                            deadline: Instant::now() + wait,
                            found: Vec::new(),
                            reply: Some(reply),
                        });
                    }
                    Err(_) => {
                        let _ = reply.send(Vec::new());
                    }
                }
            }
            Command::AddObject { object, reply } => {
                let _ = reply.send(self.db.add(object));
            }
            Command::RemoveObject { object_id, reply } => {
                let _ = reply.send(self.db.remove(object_id));
            }
            Command::LocalRead {
                object_id,
                property_id,
                reply,
            } => {
                let _ = reply.send(self.db.read(object_id, property_id, None));
            }
            Command::LocalWrite {
                object_id,
                property_id,
                value,
                priority,
                reply,
            } => {
                let result = self.db.write(object_id, property_id, None, value, priority);
                let _ = reply.send(result);
                self.flush_value_changes().await;
            }
            Command::AddRoute {
                network,
                router_mac,
            } => {
                self.network.add_static_route(network, router_mac);
            }
            Command::Stop { reply } => {
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    async fn handle_datagram(&mut self, port_id: u8, data: Vec<u8>, source: DataLinkAddress) {
        let inbound = match self.network.handle_inbound(port_id, &data, source).await {
            Ok(inbound) => inbound,
            Err(e) => {
                log::warn!("inbound processing failed: {e}");
                return;
            }
        };
        let Inbound::Apdu { source, apdu } = inbound else {
            return;
        };
        let Some(first) = apdu.first() else {
            return;
        };

        match ApduType::of_first_byte(*first) {
            Some(ApduType::ConfirmedRequest) => {
                self.handle_confirmed(source, &apdu).await;
            }
            Some(ApduType::UnconfirmedRequest) => {
                if self.dcc.allows_inbound_unconfirmed() {
                    self.handle_unconfirmed(source, &apdu).await;
                }
            }
            Some(ApduType::SegmentAck) => {
                // Bit 0 of the first octet: sent by the server side.
                if first & 0x01 != 0 {
                    let (_, frames) =
                        self.client_tsm.handle_apdu(Instant::now(), &source, &apdu);
                    self.send_frames(frames).await;
                } else {
                    let frames = self
                        .server_tsm
                        .handle_segment_ack(Instant::now(), &source, &apdu);
                    self.send_frames(frames).await;
                }
            }
            Some(ApduType::Abort) => {
                self.server_tsm.handle_abort(&source, &apdu);
                let (_, frames) = self.client_tsm.handle_apdu(Instant::now(), &source, &apdu);
                self.send_frames(frames).await;
            }
            Some(kind) if kind.is_client_bound() => {
                let (_, frames) = self.client_tsm.handle_apdu(Instant::now(), &source, &apdu);
                self.send_frames(frames).await;
            }
            Some(_) | None => log::warn!("dropping APDU with invalid type from {source:?}"),
        }
    }

    async fn handle_confirmed(&mut self, source: BacnetAddress, apdu: &[u8]) {
        let now = Instant::now();
        let (frames, dispatch) = self
            .server_tsm
            .handle_confirmed_request(now, source, apdu);
        self.send_frames(frames).await;
        let Some(dispatch) = dispatch else {
            return;
        };

        if !self.dcc.allows_inbound_confirmed(dispatch.service_choice) {
            log::debug!(
                "dropping service 0x{:02x} while communication is disabled",
                dispatch.service_choice
            );
            return;
        }

        let mut ctx = HandlerContext {
            db: &mut self.db,
            cov: &mut self.cov,
            dcc: &mut self.dcc,
            config: &self.config,
            now,
        };
        let handled = handlers::dispatch_confirmed(&mut ctx, &dispatch);

        let frames = self.server_tsm.respond(now, &dispatch, handled.response);
        self.send_frames(frames).await;

        for notice in handled.notices {
            self.process_notice(notice).await;
        }
        self.dispatch_cov(handled.cov_dispatches).await;
        self.flush_value_changes().await;
    }

    async fn process_notice(&mut self, notice: Notice) {
        match notice {
            Notice::CovNotification {
                source,
                process_id,
                monitored_object,
                values_len,
            } => {
                log::debug!(
                    "cov notification from {source:?} process {process_id} for {monitored_object} ({values_len} values)"
                );
            }
            Notice::EventNotification { source, notification } => {
                log::info!(
                    "event notification from {source:?}: {} -> {:?}",
                    notification.event_object_id,
                    notification.to_state
                );
            }
            Notice::TextMessage { source, message } => {
                log::info!("text message from {source:?}: {message}");
            }
            Notice::Reinitialize(state) => {
                log::warn!("reinitialize requested: {state:?}");
            }
        }
    }

    async fn handle_unconfirmed(&mut self, source: BacnetAddress, apdu: &[u8]) {
        let mut r = Reader::new(apdu);
        let Ok(header) = UnconfirmedRequestHeader::decode(&mut r) else {
            return;
        };
        match header.service_choice {
            SERVICE_WHO_IS => {
                let Ok(request) = WhoIsRequest::decode_after_header(&mut r) else {
                    return;
                };
                if request.covers(self.config.instance_number)
                    && self.dcc.allows_discovery_reply()
                {
                    // Answer the asker directly; the startup announcement
                    // already went out as a broadcast.
                    self.send_i_am(source).await;
                }
            }
            SERVICE_I_AM => {
                let Ok(i_am) = IAmRequest::decode_after_header(&mut r) else {
                    return;
                };
                self.peers.learn(
                    source.clone(),
                    PeerCapabilities {
                        device_id: i_am.device_id,
                        max_apdu_accepted: i_am.max_apdu_length as usize,
                        segmentation: i_am.segmentation,
                    },
                );
                let discovered = DiscoveredDevice {
                    address: source,
                    device_id: i_am.device_id,
                    max_apdu_length: i_am.max_apdu_length,
                    segmentation: i_am.segmentation,
                    vendor_id: i_am.vendor_id,
                };
                for discovery in &mut self.discoveries {
                    let instance = discovered.device_id.instance();
                    let in_range = match discovery.range {
                        Some((low, high)) => (low..=high).contains(&instance),
                        None => true,
                    };
                    if in_range
                        && !discovery
                            .found
                            .iter()
                            .any(|d| d.address == discovered.address)
                    {
                        discovery.found.push(discovered.clone());
                    }
                }
            }
            SERVICE_WHO_HAS => {
                let Ok(request) = WhoHasRequest::decode_after_header(&mut r) else {
                    return;
                };
                if !request.covers(self.config.instance_number)
                    || !self.dcc.allows_discovery_reply()
                {
                    return;
                }
                let object_id = match request.object {
                    WhoHasObject::ObjectId(id) => self.db.contains(id).then(|| self.db.resolve(id)),
                    WhoHasObject::ObjectName(name) => self.db.by_name(name),
                };
                if let Some(object_id) = object_id {
                    self.send_i_have(object_id, source).await;
                }
            }
            SERVICE_TIME_SYNCHRONIZATION | SERVICE_UTC_TIME_SYNCHRONIZATION => {
                // No settable clock here; note the sync and move on.
                log::debug!("time synchronization from {source:?}");
            }
            SERVICE_UNCONFIRMED_COV_NOTIFICATION => {
                log::debug!("unconfirmed cov notification from {source:?}");
            }
            SERVICE_UNCONFIRMED_EVENT_NOTIFICATION => {
                log::debug!("unconfirmed event notification from {source:?}");
            }
            SERVICE_UNCONFIRMED_TEXT_MESSAGE => {
                log::info!("unconfirmed text message from {source:?}");
            }
            SERVICE_UNCONFIRMED_PRIVATE_TRANSFER => {
                log::debug!("unconfirmed private transfer from {source:?}");
            }
            SERVICE_WRITE_GROUP => {
                // Channel objects are not implemented; the message is
                // parsed for validity and dropped.
                match bacnode_core::services::write_group::WriteGroupRequest::decode_after_header(
                    &mut r,
                ) {
                    Ok(request) => log::debug!(
                        "write-group {} from {source:?} ignored ({} channel value(s), no channel objects)",
                        request.group_number,
                        request.change_list.len()
                    ),
                    Err(e) => log::warn!("malformed write-group from {source:?}: {e}"),
                }
            }
            SERVICE_WHO_AM_I | SERVICE_YOU_ARE => {
                log::debug!("instance-assignment service from {source:?} ignored");
            }
            other => {
                log::debug!("unhandled unconfirmed service 0x{other:02x} from {source:?}");
            }
        }
    }

    async fn broadcast_i_am(&mut self) {
        self.send_i_am(BacnetAddress::local_broadcast()).await;
    }

    async fn send_i_am(&mut self, destination: BacnetAddress) {
        let request = IAmRequest {
            device_id: self.db.device_id(),
            max_apdu_length: self.config.max_apdu_length as u32,
            segmentation: Segmentation::SegmentedBoth,
            vendor_id: self.config.vendor_id as u32,
        };
        match encode_apdu(|w| request.encode(w)) {
            Ok(apdu) => {
                self.send_frames(vec![Frame {
                    destination,
                    apdu,
                    expecting_reply: false,
                }])
                .await;
            }
            Err(e) => log::warn!("could not encode I-Am: {e}"),
        }
    }

    async fn send_i_have(&mut self, object_id: ObjectId, destination: BacnetAddress) {
        let name = self
            .db
            .get(object_id)
            .map(|object| object.name().to_string())
            .unwrap_or_default();
        let request = IHaveRequest {
            device_id: self.db.device_id(),
            object_id,
            object_name: &name,
        };
        match encode_apdu(|w| request.encode(w)) {
            Ok(apdu) => {
                self.send_frames(vec![Frame {
                    destination,
                    apdu,
                    expecting_reply: false,
                }])
                .await;
            }
            Err(e) => log::warn!("could not encode I-Have: {e}"),
        }
    }

    /// Push queued database changes through the COV manager.
    async fn flush_value_changes(&mut self) {
        let changes = self.db.drain_changes();
        if changes.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut dispatches = Vec::new();
        for change in &changes {
            dispatches.extend(self.cov.on_change(now, &self.db, change));
        }
        self.dispatch_cov(dispatches).await;
    }

    async fn dispatch_cov(&mut self, dispatches: Vec<CovDispatch>) {
        if dispatches.is_empty() {
            return;
        }
        if !self.dcc.allows_initiation() {
            return;
        }
        let device_id = self.db.device_id();
        for dispatch in dispatches {
            if dispatch.confirmed {
                // Fire and forget through the client TSM; delivery
                // failures are logged, never propagated.
                let apdu = encode_apdu(|w| {
                    encode_confirmed_cov_notification(
                        w,
                        0,
                        dispatch.process_id,
                        device_id,
                        dispatch.monitored_object,
                        dispatch.time_remaining_seconds,
                        &dispatch.values,
                    )
                });
                let Ok(apdu) = apdu else {
                    continue;
                };
                let (reply_tx, reply_rx) = oneshot::channel();
                let peer_max = self
                    .peers
                    .max_apdu_for(&dispatch.subscriber, self.config.max_apdu_length);
                let frames = self.client_tsm.start(
                    Instant::now(),
                    dispatch.subscriber.clone(),
                    apdu,
                    peer_max,
                    false,
                    reply_tx,
                );
                self.send_frames(frames).await;
                tokio::spawn(async move {
                    match reply_rx.await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => log::warn!("confirmed cov notification failed: {e}"),
                        Err(_) => {}
                    }
                });
            } else {
                let apdu = encode_apdu(|w| {
                    encode_unconfirmed_cov_notification(
                        w,
                        dispatch.process_id,
                        device_id,
                        dispatch.monitored_object,
                        dispatch.time_remaining_seconds,
                        &dispatch.values,
                    )
                });
                let Ok(apdu) = apdu else {
                    continue;
                };
                self.send_frames(vec![Frame {
                    destination: dispatch.subscriber.clone(),
                    apdu,
                    expecting_reply: false,
                }])
                .await;
            }
        }
    }

    async fn scan_events(&mut self) {
        let device_id = self.db.device_id();
        let notifications = self
            .events
            .scan(Instant::now(), &mut self.db, device_id);
        for notification in notifications {
            self.broadcast_event_notification(notification).await;
        }
        self.flush_value_changes().await;
    }

    async fn broadcast_event_notification(&mut self, notification: EventNotification) {
        if !self.dcc.allows_initiation() {
            return;
        }
        match encode_apdu(|w| notification.encode_unconfirmed(w)) {
            Ok(apdu) => {
                self.send_frames(vec![Frame {
                    destination: BacnetAddress::global_broadcast(),
                    apdu,
                    expecting_reply: false,
                }])
                .await;
            }
            Err(e) => log::warn!("could not encode event notification: {e}"),
        }
    }

    async fn housekeeping(&mut self) {
        let now = Instant::now();
        self.dcc.tick(now);
        let frames = self.client_tsm.tick(now);
        self.send_frames(frames).await;
        let frames = self.server_tsm.tick(now);
        self.send_frames(frames).await;
        self.cov.expire(now);

        // Expired discovery collections complete.
        let mut index = 0;
        while index < self.discoveries.len() {
            if now >= self.discoveries[index].deadline {
                let mut discovery = self.discoveries.remove(index);
                if let Some(reply) = discovery.reply.take() {
                    let _ = reply.send(discovery.found);
                }
            } else {
                index += 1;
            }
        }
    }

    async fn table_sweep(&mut self) {
        self.network.sweep();
        if let Some(bbmd) = &self.bbmd {
            bbmd.sweep(TABLE_SWEEP_INTERVAL.as_secs() as u16).await;
        }
    }

    async fn send_frames(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            if let Err(e) = self
                .network
                .send_apdu(&frame.destination, &frame.apdu, frame.expecting_reply)
                .await
            {
                log::warn!("send to {:?} failed: {e}", frame.destination);
            }
        }
    }
}
