use crate::engine::network::NetworkHandler;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use toroid_similarity::{BoundedMaxHeap, cosine_similarity};
use toroid_types::node::NodeId;

/// One hit of a k-nearest scan. The combined score biases raw vector
/// similarity by the query's coherence and the candidate's density.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    pub node_id: NodeId,
    pub similarity: f64,
    pub combined_score: f64,
}

/// Heap ordering for scan results: combined score first, lower id wins
/// ties (and any NaN pairing) so output is fully deterministic.
#[derive(Debug, Clone, PartialEq)]
struct RankedResult(SimilarityResult);

impl Eq for RankedResult {}

impl PartialOrd for RankedResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedResult {
    fn cmp(&self, other: &Self) -> Ordering {
        match self
            .0
            .combined_score
            .partial_cmp(&other.0.combined_score)
        {
            Some(Ordering::Equal) | None => other.0.node_id.cmp(&self.0.node_id),
            Some(ordering) => ordering,
        }
    }
}

impl NetworkHandler {
    /// Top-k nodes by combined score around `query_id`, excluding the
    /// query itself. Linear scan into a bounded heap; output length is
    /// `min(k, N - 1)`, empty on `k = 0` or an unknown query id.
    #[tracing::instrument(skip(self))]
    pub fn find_k_nearest(&self, query_id: NodeId, k: usize) -> Vec<SimilarityResult> {
        let Some(capacity) = NonZeroUsize::new(k) else {
            return Vec::new();
        };
        self.with_nodes(|nodes| {
            let Some(query) = nodes.get(query_id.0) else {
                return Vec::new();
            };
            let scored: Vec<SimilarityResult> = nodes
                .par_iter()
                .filter(|candidate| candidate.id != query_id)
                .map(|candidate| {
                    let similarity = cosine_similarity(&query.vector, &candidate.vector);
                    SimilarityResult {
                        node_id: candidate.id,
                        similarity,
                        combined_score: similarity * query.coherence + candidate.density,
                    }
                })
                .collect();
            let mut heap = BoundedMaxHeap::new(capacity);
            for result in scored {
                heap.push(RankedResult(result));
            }
            heap.into_sorted_vec()
                .into_iter()
                .map(|ranked| ranked.0)
                .collect()
        })
    }
}
