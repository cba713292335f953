use anyhow::Result;
use tracing::{debug, info};

use distributed_shm::cluster::config::ClusterConfig;
use distributed_shm::runtime::service::Runtime;
use distributed_shm::site;

const TARGET: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <node_id> [hosts_file]", args[0]);
        eprintln!("Example: {} 0 hosts.conf", args[0]);
        std::process::exit(1);
    }

    let node_id: u32 = match args[1].parse() {
        Ok(id) => id,
        Err(_) => {
            eprintln!("Invalid node id '{}'", args[1]);
            std::process::exit(1);
        }
    };
    let hosts_file = args.get(2).map(String::as_str).unwrap_or("hosts.conf");

    let config = ClusterConfig::load(hosts_file)?;
    let runtime = Runtime::start(config, node_id).await?;

    // Two-role workout: the master bumps the counter on even values, the
    // slaves on odd ones, so every increment crosses the wire.
    let counter = runtime.register(site!(), 0u64)?;
    runtime.barrier(site!()).await;

    loop {
        let value = counter.read().await;
        if value >= TARGET {
            break;
        }
        let my_turn = if runtime.is_master() {
            value % 2 == 0
        } else {
            value % 2 == 1
        };
        if my_turn {
            debug!("Incrementing counter from {}", value);
            counter.update(|v| *v += 1).await;
        }
    }

    runtime.barrier(site!()).await;
    info!("Counter settled at {}", counter.read().await);
    println!("DONE!");

    Ok(())
}
