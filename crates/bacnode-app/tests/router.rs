//! Two-port router scenario: a client on network 1 reads a property from
//! a device on network 2 through a router, with source/destination
//! rewriting on both legs.

use bacnode_app::object::factory;
use bacnode_app::{Application, DeviceConfig, RouterConfig, RouterPortConfig};
use bacnode_core::encoding::{reader::Reader, writer::Writer};
use bacnode_core::npdu::{Npdu, NpduAddress};
use bacnode_core::services::who_is::WhoIsRequest;
use bacnode_core::types::{BacnetAddress, ObjectId, ObjectType, PropertyId, PropertyValue};
use bacnode_datalink::{BacnetIpTransport, DataLink, DataLinkAddress};
use std::net::SocketAddr;
use tokio::time::{timeout, Duration};

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[tokio::test]
async fn read_property_across_router() {
    // Router between networks 1 and 2.
    let mut router_config = DeviceConfig::new(900, "router-900").with_bind(loopback());
    router_config.router = Some(RouterConfig {
        ports: vec![
            RouterPortConfig {
                port_id: 1,
                network_number: 1,
                bind: loopback(),
                max_npdu_length: 1497,
            },
            RouterPortConfig {
                port_id: 2,
                network_number: 2,
                bind: loopback(),
                max_npdu_length: 1497,
            },
        ],
        application_port: 1,
    });
    let (router, router_handle) = Application::start(router_config).await.unwrap();
    let router_port1 = router.port_addr(1).unwrap();
    tokio::spawn(router.run());

    // Device with instance 501 on network 2.
    let server_config = DeviceConfig::new(501, "server-501").with_bind(loopback());
    let (server, server_handle) = Application::start(server_config).await.unwrap();
    let server_addr = server.primary_addr().unwrap();
    tokio::spawn(server.run());
    let mut ai = factory::analog_input(1, "net2-temp");
    ai.set(PropertyId::PresentValue, PropertyValue::Real(19.5));
    server_handle.add_object(ai).await.unwrap();

    // Client on network 1 with its router cache pre-populated.
    let client_config = DeviceConfig::new(502, "client-502").with_bind(loopback());
    let (client, client_handle) = Application::start(client_config).await.unwrap();
    tokio::spawn(client.run());
    let router_mac = BacnetAddress::from_socket_addr(router_port1).mac;
    client_handle.add_route(2, router_mac).unwrap();

    // The destination is the remote device's MAC on network 2.
    let server_mac = BacnetAddress::from_socket_addr(server_addr).mac;
    let destination = BacnetAddress::remote(2, server_mac);

    let value = client_handle
        .read_property(
            destination,
            ObjectId::new(ObjectType::AnalogInput, 1),
            PropertyId::PresentValue,
        )
        .await
        .unwrap();
    assert_eq!(value, PropertyValue::Real(19.5));

    client_handle.stop().await.unwrap();
    server_handle.stop().await.unwrap();
    router_handle.stop().await.unwrap();
}

/// An exhausted hop count stops forwarding; a fresh one is routed to the
/// destination wire with the source network added and DNET stripped.
#[tokio::test]
async fn hop_count_gates_forwarding() {
    let mut router_config = DeviceConfig::new(901, "router-901").with_bind(loopback());
    router_config.router = Some(RouterConfig {
        ports: vec![
            RouterPortConfig {
                port_id: 1,
                network_number: 1,
                bind: loopback(),
                max_npdu_length: 1497,
            },
            RouterPortConfig {
                port_id: 2,
                network_number: 2,
                bind: loopback(),
                max_npdu_length: 1497,
            },
        ],
        application_port: 1,
    });
    let (router, router_handle) = Application::start(router_config).await.unwrap();
    let router_port1 = router.port_addr(1).unwrap();
    tokio::spawn(router.run());

    // A plain socket stands in for the device on network 2.
    let net2_device = BacnetIpTransport::bind(loopback()).await.unwrap();
    let net2_mac = BacnetAddress::from_socket_addr(net2_device.local_addr().unwrap()).mac;
    let sender = BacnetIpTransport::bind(loopback()).await.unwrap();

    let frame = |hops: u8| {
        let mut buf = vec![0u8; 64];
        let len = {
            let mut w = Writer::new(&mut buf);
            let mut npdu = Npdu::new(0).with_destination(NpduAddress::new(2, &net2_mac));
            npdu.hop_count = Some(hops);
            npdu.encode(&mut w).unwrap();
            WhoIsRequest::global().encode(&mut w).unwrap();
            w.as_written().len()
        };
        buf.truncate(len);
        buf
    };

    // Hop count zero: dropped at the router.
    sender
        .send(DataLinkAddress::Ip(router_port1), &frame(0))
        .await
        .unwrap();
    let mut rx = [0u8; 256];
    assert!(
        timeout(Duration::from_millis(400), net2_device.recv(&mut rx))
            .await
            .is_err()
    );

    // A live hop count reaches the wire with SNET=1 and no DNET.
    sender
        .send(DataLinkAddress::Ip(router_port1), &frame(255))
        .await
        .unwrap();
    let (n, _) = timeout(Duration::from_secs(2), net2_device.recv(&mut rx))
        .await
        .expect("expected the forwarded NPDU")
        .unwrap();
    let mut r = Reader::new(&rx[..n]);
    let npdu = Npdu::decode(&mut r).unwrap();
    assert!(npdu.destination.is_none());
    assert_eq!(npdu.source.unwrap().network, 1);

    router_handle.stop().await.unwrap();
}
