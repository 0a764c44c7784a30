use bacnode_datalink::BacnetIpTransport;
use clap::Parser;
use std::net::SocketAddr;

/// Read a BBMD's broadcast distribution and foreign device tables.
#[derive(Parser, Debug)]
#[command(name = "bacnode-readbdt")]
struct Args {
    #[arg(long)]
    bbmd: SocketAddr,
    #[arg(long)]
    fdt: bool,
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let transport =
        BacnetIpTransport::bind_foreign("0.0.0.0:0".parse().unwrap(), args.bbmd).await?;

    if args.fdt {
        let entries = transport.read_foreign_device_table().await?;
        for entry in &entries {
            println!(
                "{} ttl={}s remaining={}s",
                entry.address, entry.ttl_seconds, entry.remaining_seconds
            );
        }
        eprintln!("{} fdt entries", entries.len());
    } else {
        let entries = transport.read_broadcast_distribution_table().await?;
        if args.json {
            let records: Vec<serde_json::Value> = entries
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "host": entry.address.ip().to_string(),
                        "port": entry.address.port(),
                        "mask": entry.mask.octets(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else {
            for entry in &entries {
                println!("{} mask={}", entry.address, entry.mask);
            }
            eprintln!("{} bdt entries", entries.len());
        }
    }
    Ok(())
}
