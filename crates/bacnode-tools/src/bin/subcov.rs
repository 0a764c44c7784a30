use bacnode_app::{Application, DeviceConfig};
use bacnode_core::services::subscribe_cov::SubscribeCovRequest;
use bacnode_core::types::ObjectId;
use bacnode_tools::{target_address, ObjectTypeArg};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bacnode-subcov")]
struct Args {
    #[arg(long)]
    ip: IpAddr,
    #[arg(long, default_value_t = 47808)]
    port: u16,
    #[arg(long)]
    network: Option<u16>,
    #[arg(long, value_enum, default_value = "analog-input")]
    object_type: ObjectTypeArg,
    #[arg(long)]
    instance: u32,
    #[arg(long, default_value_t = 1)]
    process_id: u32,
    #[arg(long, default_value_t = 600)]
    lifetime_seconds: u32,
    #[arg(long)]
    confirmed_notifications: bool,
    #[arg(long)]
    cancel: bool,
    /// Keep running to log incoming notifications (0 = exit after the
    /// subscribe exchange).
    #[arg(long, default_value_t = 0)]
    listen_seconds: u64,
    #[arg(long, default_value = "0.0.0.0:47808")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = DeviceConfig::new(0x3F_FFFE, "bacnode-subcov").with_bind(args.bind);
    let (app, handle) = Application::start(config).await?;
    tokio::spawn(app.run());

    let destination = target_address((args.ip, args.port).into(), args.network);
    let object_id = ObjectId::new(args.object_type.into_object_type(), args.instance);

    let request = if args.cancel {
        SubscribeCovRequest::cancel(args.process_id, object_id, 0)
    } else {
        SubscribeCovRequest {
            subscriber_process_id: args.process_id,
            monitored_object_id: object_id,
            issue_confirmed_notifications: Some(args.confirmed_notifications),
            lifetime_seconds: Some(args.lifetime_seconds),
            invoke_id: 0,
        }
    };
    handle.subscribe_cov(destination, request).await?;

    if args.cancel {
        println!("COV subscription canceled");
    } else {
        println!(
            "COV subscription active: process_id={} object={object_id} lifetime={}s",
            args.process_id, args.lifetime_seconds
        );
    }

    if args.listen_seconds > 0 {
        // Notifications arrive on the application's socket and show up in
        // the log output.
        tokio::time::sleep(Duration::from_secs(args.listen_seconds)).await;
    }
    handle.stop().await?;
    Ok(())
}
