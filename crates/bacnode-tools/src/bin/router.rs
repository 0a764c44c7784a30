use bacnode_app::{Application, DeviceConfig, RouterConfig, RouterPortConfig};
use clap::Parser;
use std::net::SocketAddr;

fn parse_port(value: &str) -> Result<RouterPortConfig, String> {
    // port_id:network:bind, e.g. 1:100:0.0.0.0:47808
    let mut pieces = value.splitn(3, ':');
    let port_id = pieces
        .next()
        .ok_or("missing port id")?
        .parse::<u8>()
        .map_err(|e| format!("invalid port id: {e}"))?;
    let network_number = pieces
        .next()
        .ok_or("missing network number")?
        .parse::<u16>()
        .map_err(|e| format!("invalid network number: {e}"))?;
    let bind = pieces
        .next()
        .ok_or("missing bind address")?
        .parse::<SocketAddr>()
        .map_err(|e| format!("invalid bind address: {e}"))?;
    Ok(RouterPortConfig {
        port_id,
        network_number,
        bind,
        max_npdu_length: 1497,
    })
}

/// Run an N-port BACnet/IP router.
#[derive(Parser, Debug)]
#[command(name = "bacnode-router")]
struct Args {
    #[arg(long, default_value_t = 900)]
    instance: u32,
    /// `port_id:network:ip:port`, repeatable; at least two.
    #[arg(long = "port", value_parser = parse_port, required = true, num_args = 2..)]
    ports: Vec<RouterPortConfig>,
    #[arg(long, default_value_t = 1)]
    application_port: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = DeviceConfig::new(args.instance, "bacnode-router");
    config.router = Some(RouterConfig {
        ports: args.ports.clone(),
        application_port: args.application_port,
    });

    let (app, handle) = Application::start(config).await?;
    tokio::spawn(app.run());

    println!("routing between {} networks", args.ports.len());
    tokio::signal::ctrl_c().await?;
    handle.stop().await?;
    Ok(())
}
