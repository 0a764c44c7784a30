use bacnode_app::{Application, DeviceConfig};
use bacnode_core::types::{ObjectId, PropertyId};
use bacnode_tools::{target_address, ObjectTypeArg};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};

#[derive(Parser, Debug)]
#[command(name = "bacnode-readprop")]
struct Args {
    #[arg(long)]
    ip: IpAddr,
    #[arg(long, default_value_t = 47808)]
    port: u16,
    /// Routed destination network number, if the target sits behind a
    /// router.
    #[arg(long)]
    network: Option<u16>,
    #[arg(long, value_enum, default_value = "device")]
    object_type: ObjectTypeArg,
    #[arg(long, default_value_t = 0)]
    instance: u32,
    #[arg(long, default_value_t = 77)]
    property: u32,
    #[arg(long)]
    array_index: Option<u32>,
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = DeviceConfig::new(0x3F_FFFE, "bacnode-readprop").with_bind(args.bind);
    let (app, handle) = Application::start(config).await?;
    tokio::spawn(app.run());

    let destination = target_address((args.ip, args.port).into(), args.network);
    let object_id = ObjectId::new(args.object_type.into_object_type(), args.instance);
    let result = handle
        .read_property_at(
            destination,
            object_id,
            PropertyId::from_u32(args.property),
            args.array_index,
        )
        .await;

    match result {
        Ok(value) => println!("value: {value:?}"),
        Err(e) => {
            eprintln!("read failed: {e}");
            std::process::exit(1);
        }
    }
    handle.stop().await?;
    Ok(())
}
