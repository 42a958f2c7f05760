use crate::engine::network::NetworkHandler;
use crate::errors::OverlayError;
use itertools::Itertools;
use std::cmp::Ordering;
use toroid_types::node::NodeId;
use toroid_types::policy::DistributionPolicy;
use toroid_types::tag::ParityTag;
use toroid_types::MAX_PARITY_TAGS;

/// Snapshot view of one node taken for scoring. Load is the current tag
/// count; latency and centrality come from the topology oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct ParityNodeView {
    pub node_id: NodeId,
    pub rtt_latency: f64,
    pub centrality_score: f64,
    pub current_load: usize,
    pub last_access: i64,
}

/// Ephemeral per-call scoring graph over the live node set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringGraph {
    pub nodes: Vec<ParityNodeView>,
    pub tree_height: usize,
}

fn floor_log2(count: usize) -> usize {
    if count == 0 { 0 } else { count.ilog2() as usize }
}

/// Outcome of a placement run. `insufficient_capacity` flags that the
/// policy asked for more replicas than the overlay has nodes; the full
/// node set is returned in that case.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub tag: ParityTag,
    pub targets: Vec<NodeId>,
    pub insufficient_capacity: bool,
}

/// Ephemeral complete f-ary evaluation tree over the scoring graph.
/// Leaves sit at the configured height in scoring-graph order; internal
/// positions score as the max over their existing children.
pub struct PlacementTree<'a> {
    fanout: usize,
    height: usize,
    leaves: &'a [ParityNodeView],
    policy: &'a DistributionPolicy,
}

impl<'a> PlacementTree<'a> {
    /// Full placement shape: fanout `max(2, floor(sqrt(N)))`, height
    /// capped by the policy's evaluation depth.
    pub fn placement(graph: &'a ScoringGraph, policy: &'a DistributionPolicy) -> Self {
        Self {
            fanout: graph.nodes.len().isqrt().max(2),
            height: graph.tree_height.min(policy.tree_evaluation_depth),
            leaves: &graph.nodes,
            policy,
        }
    }

    /// Reduced recovery shape over surviving holders only: fanout 2,
    /// height `floor(log2(survivors))`.
    pub fn recovery(leaves: &'a [ParityNodeView], policy: &'a DistributionPolicy) -> Self {
        Self {
            fanout: 2,
            height: floor_log2(leaves.len()),
            leaves,
            policy,
        }
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Height-zero score of one candidate: inverse latency, headroom in
    /// the tag table, and centrality under two separate weights.
    pub fn leaf_score(&self, view: &ParityNodeView) -> f64 {
        self.policy.rtt_weight / (1.0 + view.rtt_latency)
            + self.policy.load_balance_weight
                * (1.0 - view.current_load as f64 / MAX_PARITY_TAGS as f64)
            + self.policy.knn_similarity_weight * view.centrality_score
            + self.policy.centrality_weight * view.centrality_score
    }

    /// Max score over the subtree rooted at the level-local `index` at
    /// `depth`. Children outside the complete-tree range, or with no
    /// leaves beneath them, are skipped.
    pub fn subtree_score(&self, depth: usize, index: usize) -> f64 {
        if depth >= self.height {
            return self
                .leaves
                .get(index)
                .map_or(f64::NEG_INFINITY, |leaf| self.leaf_score(leaf));
        }
        let levels_below = (self.height - depth - 1) as u32;
        let span = self
            .fanout
            .checked_pow(levels_below)
            .unwrap_or(usize::MAX);
        let mut best = f64::NEG_INFINITY;
        for child in 0..self.fanout {
            let Some(child_index) = index
                .checked_mul(self.fanout)
                .and_then(|base| base.checked_add(child))
            else {
                break;
            };
            let first_leaf = child_index.checked_mul(span).unwrap_or(usize::MAX);
            if first_leaf >= self.leaves.len() {
                break;
            }
            let score = self.subtree_score(depth + 1, child_index);
            if score > best {
                best = score;
            }
        }
        best
    }

    pub fn root_score(&self) -> f64 {
        self.subtree_score(0, 0)
    }

    /// Top `count` leaves by score, ties broken toward the lower id.
    pub fn select_top(&self, count: usize) -> Vec<NodeId> {
        self.leaves
            .iter()
            .map(|leaf| (self.leaf_score(leaf), leaf.node_id))
            .sorted_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.1.cmp(&b.1))
            })
            .take(count)
            .map(|(_, node_id)| node_id)
            .collect()
    }
}

impl NetworkHandler {
    /// Scoring snapshot of the full arena under the read guard.
    pub(crate) fn scoring_graph(&self) -> ScoringGraph {
        self.with_nodes(|nodes| ScoringGraph {
            nodes: nodes
                .iter()
                .map(|node| ParityNodeView {
                    node_id: node.id,
                    rtt_latency: self.topology.rtt_latency(node.id),
                    centrality_score: self.topology.centrality(node.id),
                    current_load: node.parity_count(),
                    last_access: node.last_announcement,
                })
                .collect(),
            tree_height: floor_log2(nodes.len()),
        })
    }

    /// Scoring snapshot restricted to the given ids, in the given order.
    pub(crate) fn scoring_graph_for(&self, ids: &[NodeId]) -> ScoringGraph {
        self.with_nodes(|nodes| ScoringGraph {
            nodes: ids
                .iter()
                .filter_map(|id| nodes.get(id.0))
                .map(|node| ParityNodeView {
                    node_id: node.id,
                    rtt_latency: self.topology.rtt_latency(node.id),
                    centrality_score: self.topology.centrality(node.id),
                    current_load: node.parity_count(),
                    last_access: node.last_announcement,
                })
                .collect(),
            tree_height: floor_log2(ids.len()),
        })
    }

    /// Places a parity tag on the best `min_replicas` nodes. Scoring
    /// runs against a read-guard snapshot; the write guard is taken only
    /// per assignment and every announcement goes out guard-free.
    #[tracing::instrument(skip(self, policy))]
    pub fn distribute(
        &self,
        tag: &ParityTag,
        policy: &DistributionPolicy,
    ) -> Result<Placement, OverlayError> {
        policy.validate()?;
        let graph = self.scoring_graph();
        let tree = PlacementTree::placement(&graph, policy);
        let insufficient_capacity = policy.min_replicas > graph.nodes.len();
        if insufficient_capacity {
            tracing::warn!(
                tag = %tag,
                min_replicas = policy.min_replicas,
                nodes = graph.nodes.len(),
                "insufficient capacity, selecting the full node set"
            );
        }
        let targets = tree.select_top(policy.min_replicas.min(graph.nodes.len()));
        for target in &targets {
            if let crate::engine::network::AssignOutcome::CapacityExceeded =
                self.assign_parity_tag(*target, tag)?
            {
                tracing::warn!(node = %target, tag = %tag, "tag table full, replica skipped");
            }
        }
        for target in &targets {
            self.announce(*target)?;
        }
        Ok(Placement {
            tag: tag.clone(),
            targets,
            insufficient_capacity,
        })
    }
}
