use bacnode_datalink::{BacnetIpTransport, BroadcastDistributionEntry};
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

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

#[derive(Parser, Debug)]
#[command(name = "bacnode-writebdt")]
struct Args {
    #[arg(long)]
    bbmd: SocketAddr,
    #[arg(long, value_parser = parse_bdt_entry, required = true)]
    entry: Vec<BroadcastDistributionEntry>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let transport =
        BacnetIpTransport::bind_foreign("0.0.0.0:0".parse().unwrap(), args.bbmd).await?;
    transport
        .write_broadcast_distribution_table(&args.entry)
        .await?;
    println!("wrote {} bdt entries", args.entry.len());
    Ok(())
}
