use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct CommandLineConfig {
    /// Number of nodes in the overlay
    #[arg(long, default_value_t = 16)]
    pub nodes: usize,

    /// Ring neighbors wired per node at startup
    #[arg(long, default_value_t = 4)]
    pub neighbor_fanout: usize,

    /// Seed for the deterministic PRNG; falls back to the TOROID_SEED
    /// environment variable, then to OS entropy (logged at startup)
    #[arg(long)]
    pub seed: Option<u64>,

    /// sets size(in bytes) for global allocator used
    /// Defaults to 1 Gi (1 * 1024 * 1024 * 1024)
    #[arg(long, default_value_t = 1_073_741_824)]
    pub allocator_size: usize,

    ///  Log level
    #[arg(long, default_value_t = String::from("info"))]
    pub log_level: String,
}

impl Default for CommandLineConfig {
    fn default() -> Self {
        Self {
            nodes: 16,
            neighbor_fanout: 4,
            seed: None,
            allocator_size: 1_073_741_824,
            log_level: String::from("info"),
        }
    }
}
