use crate::engine::network::{NetworkHandler, Node};
use crate::errors::OverlayError;
use std::collections::{HashSet, VecDeque};
use toroid_similarity::cosine_similarity;
use toroid_types::node::NodeId;
use toroid_types::routing::RoutingConfig;
use toroid_types::tag::ParityTag;

/// Hop count between two nodes over the neighbor graph; `None` when no
/// path exists. Hop distance stands in for RTT until links are measured.
fn bfs_hops(nodes: &[Node], from: NodeId, to: NodeId) -> Option<usize> {
    if from == to {
        return Some(0);
    }
    let mut visited = vec![false; nodes.len()];
    let mut frontier = VecDeque::new();
    visited[from.0] = true;
    frontier.push_back((from, 0usize));
    while let Some((current, hops)) = frontier.pop_front() {
        for &neighbor in &nodes[current.0].neighbors {
            if neighbor == to {
                return Some(hops + 1);
            }
            if !visited[neighbor.0] {
                visited[neighbor.0] = true;
                frontier.push_back((neighbor, hops + 1));
            }
        }
    }
    None
}

impl NetworkHandler {
    fn hybrid_score(&self, node: &Node, target: Option<&[f64]>, config: &RoutingConfig) -> f64 {
        let density = if config.use_fhe {
            node.encrypted_density
                .as_ref()
                .map_or(node.density, |ciphertext| self.fhe.decrypt(ciphertext))
        } else {
            node.density
        };
        let similarity = target.map_or(0.0, |t| cosine_similarity(&node.vector, t));
        config.density_weight * density
            + config.similarity_weight * similarity
            + config.coherence_weight * node.coherence
    }

    /// Argmax over id-ordered neighbors, so equal scores resolve to the
    /// lower id.
    fn best_neighbor(
        &self,
        nodes: &[Node],
        current: &Node,
        mut score_of: impl FnMut(&Node) -> f64,
    ) -> Option<NodeId> {
        let mut ordered = current.neighbors.clone();
        ordered.sort();
        let mut best: Option<(f64, NodeId)> = None;
        for neighbor_id in ordered {
            let Some(neighbor) = nodes.get(neighbor_id.0) else {
                continue;
            };
            let score = score_of(neighbor);
            if best.is_none_or(|(best_score, _)| score > best_score) {
                best = Some((score, neighbor_id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Density/similarity/coherence-weighted next hop among the current
    /// node's neighbors. A missing target vector zeroes the similarity
    /// term; a node without neighbors has no next hop.
    #[tracing::instrument(skip(self, target, config))]
    pub fn hybrid_next_hop(
        &self,
        current: NodeId,
        target: Option<&[f64]>,
        config: &RoutingConfig,
    ) -> Result<Option<NodeId>, OverlayError> {
        let nodes = self.read_nodes();
        let node = nodes.get(current.0).ok_or(OverlayError::InvalidNode(current))?;
        Ok(self.best_neighbor(&nodes, node, |neighbor| {
            self.hybrid_score(neighbor, target, config)
        }))
    }

    /// Next hop biased toward holders of a parity tag: holder proximity
    /// (inverse BFS hop count) blended against the plain hybrid score by
    /// `parity_weight`. With no holder anywhere this degrades to hybrid
    /// routing without a target.
    #[tracing::instrument(skip(self, config))]
    pub fn parity_aware_next_hop(
        &self,
        current: NodeId,
        tag: &ParityTag,
        config: &RoutingConfig,
    ) -> Result<Option<NodeId>, OverlayError> {
        let holders = self.holders_of(tag);
        if holders.is_empty() {
            return self.hybrid_next_hop(current, None, config);
        }
        let query = self.query_vector();
        let nodes = self.read_nodes();
        let node = nodes.get(current.0).ok_or(OverlayError::InvalidNode(current))?;
        Ok(self.best_neighbor(&nodes, node, |neighbor| {
            let min_hops = holders
                .iter()
                .filter_map(|holder| bfs_hops(&nodes, neighbor.id, *holder))
                .min();
            let parity_score = min_hops.map_or(0.0, |hops| 1.0 / (1.0 + hops as f64));
            config.parity_weight * parity_score
                + (1.0 - config.parity_weight) * self.hybrid_score(neighbor, Some(&query), config)
        }))
    }

    /// Iterates hybrid hops toward the destination's vector until it is
    /// reached, a hop revisits the path, or the budget runs out. The
    /// scoring alone does not guarantee loop freedom, hence the visited
    /// set.
    #[tracing::instrument(skip(self, config))]
    pub fn route_path(
        &self,
        from: NodeId,
        to: NodeId,
        config: &RoutingConfig,
        hop_budget: usize,
    ) -> Result<Vec<NodeId>, OverlayError> {
        let destination = self.with_node(to, |node| node.vector.clone())?;
        let mut path = vec![from];
        let mut visited: HashSet<NodeId> = HashSet::from([from]);
        let mut current = from;
        for _ in 0..hop_budget {
            if current == to {
                break;
            }
            let Some(next) = self.hybrid_next_hop(current, Some(&destination), config)? else {
                break;
            };
            if !visited.insert(next) {
                break;
            }
            path.push(next);
            current = next;
        }
        Ok(path)
    }
}
