use bacnode_app::object::factory;
use bacnode_app::{Application, DeviceConfig};
use bacnode_core::types::{PropertyId, PropertyValue};
use clap::Parser;
use std::net::SocketAddr;

/// Run a BACnet device with a handful of demo points: useful as an
/// interop target for scanners and head-ends.
#[derive(Parser, Debug)]
#[command(name = "bacnode-server")]
struct Args {
    #[arg(long, default_value_t = 1000)]
    instance: u32,
    #[arg(long, default_value = "bacnode-server")]
    name: String,
    #[arg(long, default_value = "0.0.0.0:47808")]
    bind: SocketAddr,
    #[arg(long, default_value_t = 0)]
    vendor_id: u16,
    #[arg(long)]
    password: Option<String>,
    /// Register as a foreign device with this BBMD.
    #[arg(long)]
    bbmd: Option<SocketAddr>,
    #[arg(long, default_value_t = 300)]
    foreign_ttl: u16,
    #[arg(long, default_value_t = 4)]
    analog_points: u32,
    #[arg(long, default_value_t = 2)]
    binary_points: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = DeviceConfig::new(args.instance, args.name.clone()).with_bind(args.bind);
    config.vendor_id = args.vendor_id;
    config.password = args.password.clone();
    config.foreign_bbmd = args.bbmd.map(|addr| (addr, args.foreign_ttl));

    let (app, handle) = Application::start(config).await?;
    let addr = app.primary_addr();
    tokio::spawn(app.run());

    handle
        .add_object(factory::notification_class(1, "default-alarms"))
        .await?;
    for index in 1..=args.analog_points {
        let mut ai = factory::analog_input(index, &format!("analog-input-{index}"));
        ai.set(PropertyId::CovIncrement, PropertyValue::Real(1.0));
        handle.add_object(ai).await?;
        handle
            .add_object(factory::analog_value(
                index,
                &format!("analog-value-{index}"),
            ))
            .await?;
    }
    for index in 1..=args.binary_points {
        handle
            .add_object(factory::binary_input(index, &format!("binary-input-{index}")))
            .await?;
        handle
            .add_object(factory::binary_value(index, &format!("binary-value-{index}")))
            .await?;
    }

    println!(
        "device {} serving on {}",
        args.instance,
        addr.map(|a| a.to_string()).unwrap_or_else(|| "?".into())
    );
    tokio::signal::ctrl_c().await?;
    handle.stop().await?;
    Ok(())
}
