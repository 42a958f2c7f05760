use crate::errors::TypeError;
use crate::MAX_PARITY_TAGS;
use serde::{Deserialize, Serialize};

/// Weights and bounds steering the parity placement tree. All weights are
/// nonnegative; replica bounds satisfy `1 <= min <= max <= MAX_PARITY_TAGS`
/// and the evaluation depth caps the placement tree height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionPolicy {
    pub rtt_weight: f64,
    pub load_balance_weight: f64,
    pub knn_similarity_weight: f64,
    pub centrality_weight: f64,
    pub min_replicas: usize,
    pub max_replicas: usize,
    pub tree_evaluation_depth: usize,
}

impl Default for DistributionPolicy {
    fn default() -> Self {
        Self {
            rtt_weight: 1.0,
            load_balance_weight: 1.0,
            knn_similarity_weight: 1.0,
            centrality_weight: 1.0,
            min_replicas: 3,
            max_replicas: 8,
            tree_evaluation_depth: 8,
        }
    }
}

impl DistributionPolicy {
    pub fn validate(&self) -> Result<(), TypeError> {
        for (name, weight) in [
            ("rtt_weight", self.rtt_weight),
            ("load_balance_weight", self.load_balance_weight),
            ("knn_similarity_weight", self.knn_similarity_weight),
            ("centrality_weight", self.centrality_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(TypeError::PolicyViolation(format!(
                    "{name} must be a nonnegative real, got {weight}"
                )));
            }
        }
        if self.min_replicas == 0 {
            return Err(TypeError::PolicyViolation(
                "min_replicas must be positive".into(),
            ));
        }
        if self.min_replicas > self.max_replicas {
            return Err(TypeError::PolicyViolation(format!(
                "min_replicas {} exceeds max_replicas {}",
                self.min_replicas, self.max_replicas
            )));
        }
        if self.max_replicas > MAX_PARITY_TAGS {
            return Err(TypeError::PolicyViolation(format!(
                "max_replicas {} exceeds tag capacity {MAX_PARITY_TAGS}",
                self.max_replicas
            )));
        }
        if self.tree_evaluation_depth == 0 {
            return Err(TypeError::PolicyViolation(
                "tree_evaluation_depth must be positive".into(),
            ));
        }
        Ok(())
    }
}
