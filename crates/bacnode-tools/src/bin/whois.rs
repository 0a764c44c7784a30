use bacnode_app::{Application, DeviceConfig};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bacnode-whois")]
struct Args {
    #[arg(long, default_value = "0.0.0.0:47808")]
    bind: SocketAddr,
    #[arg(long)]
    low: Option<u32>,
    #[arg(long)]
    high: Option<u32>,
    #[arg(long, default_value_t = 3)]
    timeout_secs: u64,
    #[arg(long)]
    bbmd: Option<SocketAddr>,
    #[arg(long, default_value_t = 60)]
    foreign_ttl: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = DeviceConfig::new(0x3F_FFFE, "bacnode-whois").with_bind(args.bind);
    config.foreign_bbmd = args.bbmd.map(|addr| (addr, args.foreign_ttl));
    let (app, handle) = Application::start(config).await?;
    tokio::spawn(app.run());

    let range = match (args.low, args.high) {
        (Some(low), Some(high)) => Some((low, high)),
        _ => None,
    };
    let devices = handle
        .who_is(range, Duration::from_secs(args.timeout_secs))
        .await?;
    for device in &devices {
        println!(
            "{}: instance={} max_apdu={} segmentation={:?} vendor={}",
            device
                .address
                .to_socket_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "?".into()),
            device.device_id.instance(),
            device.max_apdu_length,
            device.segmentation,
            device.vendor_id,
        );
    }
    eprintln!("{} device(s)", devices.len());
    handle.stop().await?;
    Ok(())
}
