use serde::{Deserialize, Serialize};

/// Weights blended into the hybrid next-hop score. `parity_weight` only
/// participates in parity-aware routing, where it balances holder
/// proximity against the plain hybrid score. `use_fhe` routes density
/// reads through the decrypt oracle when a ciphertext is attached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub density_weight: f64,
    pub similarity_weight: f64,
    pub coherence_weight: f64,
    pub parity_weight: f64,
    pub use_fhe: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            density_weight: 1.0,
            similarity_weight: 1.0,
            coherence_weight: 1.0,
            parity_weight: 0.5,
            use_fhe: false,
        }
    }
}
