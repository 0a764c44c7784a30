//! End-to-end exchanges between devices on loopback sockets: discovery,
//! property access with priority arrays, and COV subscription flow.

use bacnode_app::object::factory;
use bacnode_app::{Application, ApplicationHandle, DeviceConfig};
use bacnode_core::apdu::{ApduType, SimpleAck, UnconfirmedRequestHeader};
use bacnode_core::encoding::{reader::Reader, writer::Writer};
use bacnode_core::npdu::Npdu;
use bacnode_core::services::cov_notification::CovNotification;
use bacnode_core::services::i_am::{IAmRequest, SERVICE_I_AM};
use bacnode_core::services::subscribe_cov::SubscribeCovRequest;
use bacnode_core::services::who_is::WhoIsRequest;
use bacnode_core::types::{
    BacnetAddress, DataValue, ObjectId, ObjectType, PropertyId, PropertyValue, Segmentation,
};
use bacnode_datalink::{BacnetIpTransport, DataLink, DataLinkAddress};
use std::net::SocketAddr;
use tokio::time::{timeout, Duration};

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn start_server(instance: u32) -> (SocketAddr, ApplicationHandle) {
    let config = DeviceConfig::new(instance, format!("server-{instance}")).with_bind(loopback());
    let (app, handle) = Application::start(config).await.unwrap();
    let addr = app.primary_addr().unwrap();

    let mut ai = factory::analog_input(1, "zone-temp");
    ai.set(PropertyId::PresentValue, PropertyValue::Real(60.0));
    let mut av = factory::analog_value(1, "setpoint");
    av.set(PropertyId::CovIncrement, PropertyValue::Real(5.0));

    tokio::spawn(app.run());
    handle.add_object(ai).await.unwrap();
    handle.add_object(av).await.unwrap();
    (addr, handle)
}

async fn start_client() -> (SocketAddr, ApplicationHandle) {
    let config = DeviceConfig::new(999, "client-999").with_bind(loopback());
    let (app, handle) = Application::start(config).await.unwrap();
    let addr = app.primary_addr().unwrap();
    tokio::spawn(app.run());
    (addr, handle)
}

fn server_address(addr: SocketAddr) -> BacnetAddress {
    BacnetAddress::from_socket_addr(addr)
}

/// S1: a ranged Who-Is covering the server's instance draws exactly one
/// I-Am; a range missing it draws none.
#[tokio::test]
async fn who_is_draws_single_i_am() {
    let (server_addr, server) = start_server(1000).await;
    let probe = BacnetIpTransport::bind(loopback()).await.unwrap();

    let mut tx = [0u8; 64];
    let mut w = Writer::new(&mut tx);
    Npdu::new(0).encode(&mut w).unwrap();
    WhoIsRequest::range(1000, 1000).encode(&mut w).unwrap();
    probe
        .send(DataLinkAddress::Ip(server_addr), w.as_written())
        .await
        .unwrap();

    let mut rx = [0u8; 256];
    let (n, _) = timeout(Duration::from_secs(2), probe.recv(&mut rx))
        .await
        .expect("expected an I-Am")
        .unwrap();
    let mut r = Reader::new(&rx[..n]);
    Npdu::decode(&mut r).unwrap();
    let header = UnconfirmedRequestHeader::decode(&mut r).unwrap();
    assert_eq!(header.service_choice, SERVICE_I_AM);
    let i_am = IAmRequest::decode_after_header(&mut r).unwrap();
    assert_eq!(i_am.device_id, ObjectId::new(ObjectType::Device, 1000));
    assert_eq!(i_am.max_apdu_length, 1476);
    assert_eq!(i_am.segmentation, Segmentation::SegmentedBoth);
    assert_eq!(i_am.vendor_id, 0);

    // A second response must not arrive.
    assert!(
        timeout(Duration::from_millis(300), probe.recv(&mut rx))
            .await
            .is_err()
    );

    // A range excluding the instance is ignored.
    let mut tx = [0u8; 64];
    let mut w = Writer::new(&mut tx);
    Npdu::new(0).encode(&mut w).unwrap();
    WhoIsRequest::range(1, 10).encode(&mut w).unwrap();
    probe
        .send(DataLinkAddress::Ip(server_addr), w.as_written())
        .await
        .unwrap();
    assert!(
        timeout(Duration::from_millis(300), probe.recv(&mut rx))
            .await
            .is_err()
    );

    server.stop().await.unwrap();
}

/// S2: ReadProperty of an analog input returns the application-tagged
/// REAL through the full client TSM.
#[tokio::test]
async fn read_property_end_to_end() {
    let (server_addr, server) = start_server(1001).await;
    let (_, client) = start_client().await;

    let value = client
        .read_property(
            server_address(server_addr),
            ObjectId::new(ObjectType::AnalogInput, 1),
            PropertyId::PresentValue,
        )
        .await
        .unwrap();
    assert_eq!(value, PropertyValue::Real(60.0));

    client.stop().await.unwrap();
    server.stop().await.unwrap();
}

/// S3: commanded writes land in the priority array; relinquishing with
/// NULL restores the relinquish default.
#[tokio::test]
async fn write_priority_and_relinquish() {
    let (server_addr, server) = start_server(1002).await;
    let (_, client) = start_client().await;
    let destination = server_address(server_addr);
    let av = ObjectId::new(ObjectType::AnalogValue, 1);

    client
        .write_property(
            destination.clone(),
            av,
            PropertyId::PresentValue,
            PropertyValue::Real(72.5),
            Some(8),
        )
        .await
        .unwrap();

    let value = client
        .read_property(destination.clone(), av, PropertyId::PresentValue)
        .await
        .unwrap();
    assert_eq!(value, PropertyValue::Real(72.5));

    let priority = client
        .read_property(destination.clone(), av, PropertyId::CurrentCommandPriority)
        .await
        .unwrap();
    assert_eq!(priority, PropertyValue::Unsigned(8));

    client
        .write_property(
            destination.clone(),
            av,
            PropertyId::PresentValue,
            PropertyValue::Null,
            Some(8),
        )
        .await
        .unwrap();
    let value = client
        .read_property(destination, av, PropertyId::PresentValue)
        .await
        .unwrap();
    assert_eq!(value, PropertyValue::Real(0.0));

    client.stop().await.unwrap();
    server.stop().await.unwrap();
}

/// S4: COV subscription delivers an initial notification, then only
/// notifies once accumulated drift reaches the COV increment.
#[tokio::test]
async fn cov_increment_accumulation() {
    let (server_addr, server) = start_server(1003).await;
    let subscriber = BacnetIpTransport::bind(loopback()).await.unwrap();
    let av = ObjectId::new(ObjectType::AnalogValue, 1);

    let mut tx = [0u8; 64];
    let mut w = Writer::new(&mut tx);
    Npdu::application(true).encode(&mut w).unwrap();
    SubscribeCovRequest {
        subscriber_process_id: 42,
        monitored_object_id: av,
        issue_confirmed_notifications: Some(false),
        lifetime_seconds: Some(60),
        invoke_id: 1,
    }
    .encode(&mut w)
    .unwrap();
    subscriber
        .send(DataLinkAddress::Ip(server_addr), w.as_written())
        .await
        .unwrap();

    // A SimpleAck and the initial notification arrive, in either order.
    let mut got_ack = false;
    let mut initial = None;
    while !(got_ack && initial.is_some()) {
        let notification = recv_apdu(&subscriber).await.expect("subscribe exchange");
        match notification {
            ReceivedApdu::Ack(ack) => {
                assert_eq!(ack.invoke_id, 1);
                got_ack = true;
            }
            ReceivedApdu::Cov(values) => initial = Some(values),
        }
    }
    let initial = initial.unwrap();
    assert_eq!(initial[0], (PropertyId::PresentValue, PropertyValue::Real(0.0)));
    assert_eq!(
        initial[1],
        (
            PropertyId::StatusFlags,
            PropertyValue::BitString {
                unused_bits: 4,
                data: vec![0x00]
            }
        )
    );

    // 2.0 and 4.0 stay below the 5.0 increment.
    for value in [2.0f32, 4.0] {
        server
            .local_write(av, PropertyId::PresentValue, PropertyValue::Real(value), Some(8))
            .await
            .unwrap();
    }
    // 5.0 crosses it.
    server
        .local_write(av, PropertyId::PresentValue, PropertyValue::Real(5.0), Some(8))
        .await
        .unwrap();
    let values = expect_cov(&subscriber).await;
    assert_eq!(values[0], (PropertyId::PresentValue, PropertyValue::Real(5.0)));

    // 9.0 is 4.0 from the new reference; 10.0 crosses again.
    server
        .local_write(av, PropertyId::PresentValue, PropertyValue::Real(9.0), Some(8))
        .await
        .unwrap();
    server
        .local_write(av, PropertyId::PresentValue, PropertyValue::Real(10.0), Some(8))
        .await
        .unwrap();
    let values = expect_cov(&subscriber).await;
    assert_eq!(
        values[0],
        (PropertyId::PresentValue, PropertyValue::Real(10.0))
    );

    // No further notifications are pending.
    let mut rx = [0u8; 512];
    assert!(
        timeout(Duration::from_millis(300), subscriber.recv(&mut rx))
            .await
            .is_err()
    );

    server.stop().await.unwrap();
}

/// Shutdown is idempotent and outstanding API calls fail cleanly after
/// it.
#[tokio::test]
async fn shutdown_is_idempotent() {
    let (_, server) = start_server(1004).await;
    server.stop().await.unwrap();
    server.stop().await.unwrap();

    let result = server
        .local_read(
            ObjectId::new(ObjectType::Device, 1004),
            PropertyId::ObjectName,
        )
        .await;
    assert!(result.is_err());
}

enum ReceivedApdu {
    Ack(SimpleAck),
    Cov(Vec<(PropertyId, PropertyValue)>),
}

async fn recv_apdu(transport: &BacnetIpTransport) -> Option<ReceivedApdu> {
    let mut rx = [0u8; 512];
    loop {
        let (n, _) = timeout(Duration::from_secs(2), transport.recv(&mut rx))
            .await
            .ok()?
            .ok()?;
        let mut r = Reader::new(&rx[..n]);
        Npdu::decode(&mut r).ok()?;
        let Some(first) = rx
            .get(n - r.remaining())
            .copied()
        else {
            continue;
        };
        match ApduType::of_first_byte(first) {
            Some(ApduType::SimpleAck) => {
                let ack = SimpleAck::decode(&mut r).ok()?;
                return Some(ReceivedApdu::Ack(ack));
            }
            Some(ApduType::UnconfirmedRequest) => {
                let header = UnconfirmedRequestHeader::decode(&mut r).ok()?;
                if header.service_choice
                    != bacnode_core::services::cov_notification::SERVICE_UNCONFIRMED_COV_NOTIFICATION
                {
                    continue;
                }
                let notification = CovNotification::decode_after_header(&mut r).ok()?;
                let values = notification
                    .values
                    .iter()
                    .map(|value| {
                        (
                            value.property_id,
                            PropertyValue::from_data_value(&value.value),
                        )
                    })
                    .collect();
                return Some(ReceivedApdu::Cov(values));
            }
            _ => continue,
        }
    }
}

async fn expect_cov(transport: &BacnetIpTransport) -> Vec<(PropertyId, PropertyValue)> {
    loop {
        match recv_apdu(transport).await {
            Some(ReceivedApdu::Cov(values)) => return values,
            Some(ReceivedApdu::Ack(_)) => continue,
            None => panic!("expected a COV notification"),
        }
    }
}

/// Local reads through the handle resolve the device-wildcard instance.
#[tokio::test]
async fn wildcard_device_resolution() {
    let (server_addr, server) = start_server(1005).await;
    let (_, client) = start_client().await;

    let value = client
        .read_property(
            server_address(server_addr),
            ObjectId::new(ObjectType::Device, ObjectId::WILDCARD_INSTANCE),
            PropertyId::ObjectIdentifier,
        )
        .await
        .unwrap();
    assert_eq!(
        value,
        PropertyValue::ObjectId(ObjectId::new(ObjectType::Device, 1005))
    );

    // The DataValue round-trips through the wire as an object id.
    let as_data = DataValue::ObjectId(ObjectId::new(ObjectType::Device, 1005));
    assert_eq!(PropertyValue::from_data_value(&as_data), value);

    client.stop().await.unwrap();
    server.stop().await.unwrap();
}
