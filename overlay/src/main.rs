use clap::Parser;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use toroid_overlay::cli::{Cli, Commands, ServerConfig};
use toroid_overlay::engine::network::NetworkHandler;
use toroid_overlay::errors::OverlayError;
use toroid_overlay::server::OverlayServer;
use toroid_types::DIM;
use toroid_types::node::NodeId;
use toroid_types::policy::DistributionPolicy;
use toroid_types::tag::ParityTag;
use utils::allocator::{GLOBAL_ALLOCATOR, MemoryReport};
use utils::cli::CommandLineConfig;

const SERVICE_NAME: &str = "toroid-overlay";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return match error.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
        }
    };
    tracer::init_log_or_trace(SERVICE_NAME, &cli.common.log_level);
    GLOBAL_ALLOCATOR
        .set_limit(cli.common.allocator_size)
        .expect("Could not set up overlay with allocator_size");

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) if error.is_usage() => {
            eprintln!("{error}");
            ExitCode::from(1)
        }
        Err(error) => {
            eprintln!("{error}");
            ExitCode::from(2)
        }
    }
}

fn resolve_seed(explicit: Option<u64>) -> u64 {
    if let Some(seed) = explicit {
        return seed;
    }
    if let Ok(value) = std::env::var("TOROID_SEED") {
        match value.parse() {
            Ok(seed) => return seed,
            Err(_) => log::warn!("ignoring unparseable TOROID_SEED value '{value}'"),
        }
    }
    let seed: u64 = rand::random();
    log::info!("no seed supplied, picked {seed}");
    seed
}

fn build_network(common: &CommandLineConfig) -> Result<Arc<NetworkHandler>, OverlayError> {
    let seed = resolve_seed(common.seed);
    let network = Arc::new(NetworkHandler::new(common.nodes, DIM, seed)?);
    network.connect_ring(common.neighbor_fanout);
    Ok(network)
}

async fn dispatch(cli: Cli) -> Result<(), OverlayError> {
    match cli.command {
        Commands::Run(config) => run_daemon(&cli.common, config).await,
        Commands::Injectvec { id, components } => {
            let network = build_network(&cli.common)?;
            network.inject_vector(NodeId(id), &components)?;
            println!("Injected vector into node {id}");
            Ok(())
        }
        Commands::Findnearest { id, k } => {
            let network = build_network(&cli.common)?;
            let results = network.find_k_nearest(NodeId(id), k);
            println!("Top {k} nearest nodes to node {id}:");
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "#{} -> Node {} | Similarity: {:.4} | Score: {:.4}",
                    rank + 1,
                    result.node_id,
                    result.similarity,
                    result.combined_score
                );
            }
            Ok(())
        }
        Commands::Vectorstats { id } => {
            let network = build_network(&cli.common)?;
            let stats = network.vector_stats(NodeId(id))?;
            println!(
                "Node {id}: density={:.4} coherence={:.4}",
                stats.density, stats.coherence
            );
            let rendered: Vec<String> = stats
                .vector
                .iter()
                .map(|component| format!("{component:.3}"))
                .collect();
            println!("Vector: [{}]", rendered.join(", "));
            Ok(())
        }
        Commands::Evolveann { id, rate } => {
            let network = build_network(&cli.common)?;
            network.evolve_vector(NodeId(id), rate)?;
            println!("Evolved vector for node {id}");
            Ok(())
        }
        Commands::Announce { id } => {
            let network = build_network(&cli.common)?;
            let announcement = network.announce(NodeId(id))?;
            println!(
                "Announced {} parity tags from node {id} at timestamp {}",
                announcement.parity_count(),
                announcement.timestamp
            );
            Ok(())
        }
        Commands::Recovery { tag } => {
            let network = build_network(&cli.common)?;
            let tag = ParityTag::from_str(&tag)?;
            let report = network.recover(&tag, &DistributionPolicy::default())?;
            println!(
                "Recovered parity '{tag}' from {} survivors onto {:?}",
                report.survivors.len(),
                report.targets
            );
            Ok(())
        }
        Commands::Distribute { tag } => {
            let network = build_network(&cli.common)?;
            let tag = ParityTag::from_str(&tag)?;
            let placement = network.distribute(&tag, &DistributionPolicy::default())?;
            println!("Placed parity '{tag}' on {:?}", placement.targets);
            if placement.insufficient_capacity {
                println!("Warning: fewer nodes than the requested replica floor");
            }
            Ok(())
        }
        Commands::Checkmem => {
            println!("{}", MemoryReport::capture());
            Ok(())
        }
        Commands::Detectleaks => {
            let baseline = MemoryReport::capture();
            {
                let network = build_network(&cli.common)?;
                let _ = network.find_k_nearest(NodeId(0), 2);
            }
            let after = MemoryReport::capture();
            let leaked = after.growth_since(&baseline);
            if leaked == 0 {
                println!("No leaks detected");
            } else {
                println!("[LEAK] {leaked} bytes still allocated after overlay teardown");
            }
            Ok(())
        }
    }
}

async fn run_daemon(common: &CommandLineConfig, config: ServerConfig) -> Result<(), OverlayError> {
    let network = build_network(common)?;
    let server = OverlayServer::new(network, config);
    server.start().await;
    Ok(())
}
