use crate::engine::network::NetworkHandler;
use crate::engine::placement::PlacementTree;
use crate::errors::OverlayError;
use toroid_types::node::NodeId;
use toroid_types::policy::DistributionPolicy;
use toroid_types::tag::ParityTag;

/// Result of one recovery run: the survivors found and the replica set
/// the tag was restored onto.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    pub tag: ParityTag,
    pub survivors: Vec<NodeId>,
    pub targets: Vec<NodeId>,
}

impl NetworkHandler {
    /// Restores a tag's replica set from its surviving holders. With no
    /// survivor the tag is unrecoverable and nothing changes. Selection
    /// re-runs over the survivors only (existing holders stay eligible);
    /// with fewer survivors than `min_replicas` the target list is
    /// filled round-robin over the survivor set and the replication
    /// deficit is left to the caller. Idempotent absent topology change.
    #[tracing::instrument(skip(self, policy))]
    pub fn recover(
        &self,
        tag: &ParityTag,
        policy: &DistributionPolicy,
    ) -> Result<RecoveryReport, OverlayError> {
        policy.validate()?;
        let survivors = self.holders_of(tag);
        if survivors.is_empty() {
            return Err(OverlayError::Unrecoverable(tag.clone()));
        }
        let graph = self.scoring_graph_for(&survivors);
        let tree = PlacementTree::recovery(&graph.nodes, policy);
        let targets: Vec<NodeId> = if survivors.len() >= policy.min_replicas {
            tree.select_top(policy.min_replicas)
        } else {
            (0..policy.min_replicas)
                .map(|slot| survivors[slot % survivors.len()])
                .collect()
        };
        for target in &targets {
            self.assign_parity_tag(*target, tag)?;
        }
        for target in &targets {
            self.announce(*target)?;
        }
        tracing::info!(tag = %tag, survivors = survivors.len(), "parity tag restored");
        Ok(RecoveryReport {
            tag: tag.clone(),
            survivors,
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use toroid_types::DIM;

    fn tag(value: &str) -> ParityTag {
        ParityTag::new(value).unwrap()
    }

    fn policy(min_replicas: usize) -> DistributionPolicy {
        DistributionPolicy {
            min_replicas,
            ..Default::default()
        }
    }

    #[test]
    fn test_recovery_without_survivors_is_unrecoverable() {
        let network = NetworkHandler::new(4, DIM, 42).unwrap();
        let missing = tag("block-lost");
        assert!(matches!(
            network.recover(&missing, &policy(2)),
            Err(OverlayError::Unrecoverable(t)) if t == missing
        ));
    }

    #[test]
    fn test_single_survivor_fills_targets_round_robin() {
        let network = NetworkHandler::new(4, DIM, 42).unwrap();
        let block = tag("block-1");
        network.assign_parity_tag(NodeId(2), &block).unwrap();
        let report = network.recover(&block, &policy(3)).unwrap();
        assert_eq!(report.survivors, vec![NodeId(2)]);
        assert_eq!(report.targets, vec![NodeId(2), NodeId(2), NodeId(2)]);
        assert_eq!(network.holders_of(&block), vec![NodeId(2)]);
    }

    #[test]
    fn test_enough_survivors_select_by_score_with_id_ties() {
        let network = NetworkHandler::new(6, DIM, 42).unwrap();
        let block = tag("block-1");
        for id in [1usize, 3, 4, 5] {
            network.assign_parity_tag(NodeId(id), &block).unwrap();
        }
        let report = network.recover(&block, &policy(2)).unwrap();
        assert_eq!(report.survivors, vec![NodeId(1), NodeId(3), NodeId(4), NodeId(5)]);
        // uniform topology, equal loads: lowest ids win
        assert_eq!(report.targets, vec![NodeId(1), NodeId(3)]);
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let network = NetworkHandler::new(5, DIM, 42).unwrap();
        let block = tag("block-1");
        network.assign_parity_tag(NodeId(1), &block).unwrap();
        network.assign_parity_tag(NodeId(4), &block).unwrap();
        let first = network.recover(&block, &policy(3)).unwrap();
        let second = network.recover(&block, &policy(3)).unwrap();
        assert_eq!(first.targets, second.targets);
        assert_eq!(network.holders_of(&block), first.survivors);
    }

    #[test]
    fn test_recovery_announces_from_every_target() {
        let network = NetworkHandler::new(4, DIM, 42).unwrap();
        let block = tag("block-1");
        network.assign_parity_tag(NodeId(2), &block).unwrap();
        let report = network.recover(&block, &policy(2)).unwrap();
        network.with_nodes(|nodes| {
            for target in &report.targets {
                for node in nodes {
                    let heard = node
                        .known_parity_map
                        .get(target)
                        .expect("announcement missing");
                    assert!(heard.parity_tags.contains(&block));
                }
            }
        });
    }
}
