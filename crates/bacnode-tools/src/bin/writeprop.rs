use bacnode_app::{Application, DeviceConfig};
use bacnode_core::types::{ObjectId, PropertyId};
use bacnode_tools::{parse_value, target_address, ObjectTypeArg};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};

#[derive(Parser, Debug)]
#[command(name = "bacnode-writeprop")]
struct Args {
    #[arg(long)]
    ip: IpAddr,
    #[arg(long, default_value_t = 47808)]
    port: u16,
    #[arg(long)]
    network: Option<u16>,
    #[arg(long, value_enum, default_value = "analog-value")]
    object_type: ObjectTypeArg,
    #[arg(long)]
    instance: u32,
    #[arg(long, default_value_t = 85)]
    property: u32,
    /// `null` relinquishes a commanded slot.
    #[arg(long)]
    value: String,
    #[arg(long)]
    priority: Option<u8>,
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = DeviceConfig::new(0x3F_FFFE, "bacnode-writeprop").with_bind(args.bind);
    let (app, handle) = Application::start(config).await?;
    tokio::spawn(app.run());

    let destination = target_address((args.ip, args.port).into(), args.network);
    let object_id = ObjectId::new(args.object_type.into_object_type(), args.instance);
    let result = handle
        .write_property(
            destination,
            object_id,
            PropertyId::from_u32(args.property),
            parse_value(&args.value),
            args.priority,
        )
        .await;

    match result {
        Ok(()) => println!("write acknowledged"),
        Err(e) => {
            eprintln!("write failed: {e}");
            std::process::exit(1);
        }
    }
    handle.stop().await?;
    Ok(())
}
