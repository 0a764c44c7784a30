use bacnode_app::{Application, BbmdPortConfig, DeviceConfig};
use bacnode_datalink::BroadcastDistributionEntry;
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;

fn parse_bdt_entry(value: &str) -> Result<BroadcastDistributionEntry, String> {
    let (addr_part, mask_part) = value
        .split_once('/')
        .ok_or_else(|| "entry must be in ip:port/mask format".to_string())?;
    let address: SocketAddrV4 = addr_part
        .parse()
        .map_err(|e| format!("invalid entry address '{addr_part}': {e}"))?;
    let mask: Ipv4Addr = mask_part
        .parse()
        .map_err(|e| format!("invalid subnet mask '{mask_part}': {e}"))?;
    Ok(BroadcastDistributionEntry { address, mask })
}

/// Run a BBMD (with its own device object) on this subnet.
#[derive(Parser, Debug)]
#[command(name = "bacnode-bbmd")]
struct Args {
    #[arg(long, default_value_t = 999)]
    instance: u32,
    /// Our own address as peers reach it (goes into the BDT).
    #[arg(long)]
    local_address: SocketAddrV4,
    #[arg(long, default_value = "0.0.0.0:47808")]
    bind: SocketAddr,
    /// Peer BBMDs, `ip:port/mask` each; all-ones mask means unicast
    /// forwarding.
    #[arg(long, value_parser = parse_bdt_entry)]
    peer: Vec<BroadcastDistributionEntry>,
    #[arg(long)]
    nat_global_address: Option<SocketAddrV4>,
    #[arg(long)]
    allow_write_bdt: bool,
    #[arg(long)]
    refuse_registrations: bool,
    /// JSON backup file for the BDT (written atomically on change).
    #[arg(long)]
    backup: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut bdt = vec![BroadcastDistributionEntry::unicast(args.local_address)];
    bdt.extend(args.peer.iter().copied());

    let mut config = DeviceConfig::new(args.instance, "bacnode-bbmd").with_bind(args.bind);
    config.bbmd = Some(BbmdPortConfig {
        local_address: args.local_address,
        nat_global_address: args.nat_global_address,
        accept_fd_registrations: !args.refuse_registrations,
        allow_write_bdt: args.allow_write_bdt,
        bdt,
        backup_path: args.backup.clone(),
    });

    let (app, handle) = Application::start(config).await?;
    tokio::spawn(app.run());

    println!(
        "bbmd on {} with {} peer(s)",
        args.local_address,
        args.peer.len()
    );
    tokio::signal::ctrl_c().await?;
    handle.stop().await?;
    Ok(())
}
