use clap::{Args, Parser, Subcommand};
use utils::cli::CommandLineConfig;

#[derive(Parser)]
#[command(name = "toroid-overlay", version, about = "Content-addressed parity overlay", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[clap(flatten)]
    pub common: CommandLineConfig,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Starts the overlay daemon with the background scheduler
    Run(ServerConfig),
    /// Replaces a node's vector; density is reset to 1.0
    Injectvec {
        id: usize,
        /// Exactly one component per overlay dimension
        components: Vec<f64>,
    },
    /// Prints the k nearest nodes by combined score
    Findnearest { id: usize, k: usize },
    /// Prints a node's density, coherence and vector components
    Vectorstats { id: usize },
    /// Moves a node's vector toward the query vector, then normalizes
    Evolveann { id: usize, rate: f64 },
    /// Broadcasts a node's parity announcement
    Announce { id: usize },
    /// Re-replicates a parity tag from its surviving holders
    Recovery { tag: String },
    /// Places a parity tag under the default distribution policy
    Distribute { tag: String },
    /// Prints the capped-allocator counters
    Checkmem,
    /// Builds and tears down an overlay, reporting bytes left behind
    Detectleaks,
}

#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    /// Seconds between announcement rounds
    #[arg(long, default_value_t = 5)]
    pub announce_interval_secs: u64,

    /// Seconds between replication rebalance sweeps
    #[arg(long, default_value_t = 30)]
    pub rebalance_interval_secs: u64,

    /// Seconds between Merkle integrity checks
    #[arg(long, default_value_t = 60)]
    pub integrity_interval_secs: u64,

    /// Journal file refreshed whenever the Merkle root changes
    #[arg(long, default_value = "merkle.journal")]
    pub journal_path: std::path::PathBuf,

    /// Replica floor maintained by placement and rebalancing
    #[arg(long, default_value_t = 3)]
    pub min_replicas: usize,

    /// Replica ceiling accepted by the distribution policy
    #[arg(long, default_value_t = 8)]
    pub max_replicas: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            announce_interval_secs: 5,
            rebalance_interval_secs: 30,
            integrity_interval_secs: 60,
            journal_path: std::path::PathBuf::from("merkle.journal"),
            min_replicas: 3,
            max_replicas: 8,
        }
    }
}
