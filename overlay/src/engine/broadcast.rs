use crate::engine::network::NetworkHandler;
use crate::errors::OverlayError;
use rand::seq::SliceRandom;
use toroid_types::announcement::ParityAnnouncement;
use toroid_types::node::NodeId;

/// Fan-out of one gossip round, capped by the node's degree.
const GOSSIP_FANOUT: usize = 3;

impl NetworkHandler {
    /// Snapshots a node's holdings into a signed announcement. Load is
    /// the tag count for now; a richer load oracle can replace it without
    /// touching the wire format.
    #[tracing::instrument(skip(self))]
    pub fn build_announcement(&self, id: NodeId) -> Result<ParityAnnouncement, OverlayError> {
        let parity_tags = self.with_node(id, |node| node.parity_tags.clone())?;
        let timestamp = self.next_timestamp();
        let load_factor = parity_tags.len() as f64;
        Ok(ParityAnnouncement {
            node_id: id,
            parity_tags,
            load_factor,
            timestamp,
            signature: ParityAnnouncement::sign(id, timestamp),
        })
    }

    /// Broadcasts a node's announcement to every peer, best effort, then
    /// applies local delivery: each peer runs the acceptance rule and the
    /// sender records its own announcement. The transport call happens
    /// with no guard held; failures are logged and left to the next
    /// scheduler tick.
    #[tracing::instrument(skip(self))]
    pub fn announce(&self, id: NodeId) -> Result<ParityAnnouncement, OverlayError> {
        let announcement = self.build_announcement(id)?;
        if let Err(error) = self.transport.broadcast(&announcement) {
            log::warn!("broadcast from node {id} failed, awaiting next tick: {error}");
        }
        let recipients: Vec<NodeId> = self.with_nodes(|nodes| {
            nodes
                .iter()
                .map(|node| node.id)
                .filter(|peer| *peer != id)
                .collect()
        });
        self.deliver(&announcement, &recipients, true);
        Ok(announcement)
    }

    /// Sends the announcement to `min(3, degree)` distinct random
    /// neighbors, chosen without replacement from the seeded RNG.
    #[tracing::instrument(skip(self))]
    pub fn gossip(&self, id: NodeId) -> Result<Vec<NodeId>, OverlayError> {
        let announcement = self.build_announcement(id)?;
        let neighbors = self.with_node(id, |node| node.neighbors.clone())?;
        let count = neighbors.len().min(GOSSIP_FANOUT);
        let targets: Vec<NodeId> = {
            let mut rng = self.rng.lock().expect("rng lock poisoned");
            neighbors
                .choose_multiple(&mut *rng, count)
                .copied()
                .collect()
        };
        for target in &targets {
            if let Err(error) = self.transport.send(*target, &announcement) {
                log::warn!("gossip from node {id} to node {target} failed: {error}");
            }
        }
        self.deliver(&announcement, &targets, false);
        Ok(targets)
    }

    /// Local propagation under one write guard: recipients run the
    /// acceptance rule; when `record_sender` the sender caches its own
    /// announcement and bumps `last_announcement`.
    fn deliver(
        &self,
        announcement: &ParityAnnouncement,
        recipients: &[NodeId],
        record_sender: bool,
    ) {
        let mut nodes = self.write_nodes();
        for recipient in recipients {
            if let Some(node) = nodes.get_mut(recipient.0) {
                node.accept_announcement(announcement);
            }
        }
        if record_sender {
            if let Some(sender) = nodes.get_mut(announcement.node_id.0) {
                sender.accept_announcement(announcement);
                sender.last_announcement = announcement.timestamp;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalBus;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use toroid_types::DIM;
    use toroid_types::tag::ParityTag;

    #[test]
    fn test_build_announcement_snapshots_tags_and_signs() {
        let network = NetworkHandler::new(4, DIM, 42).unwrap();
        let tag = ParityTag::new("block-1").unwrap();
        network.assign_parity_tag(NodeId(2), &tag).unwrap();
        let announcement = network.build_announcement(NodeId(2)).unwrap();
        assert_eq!(announcement.node_id, NodeId(2));
        assert_eq!(announcement.parity_tags, vec![tag]);
        assert_eq!(announcement.load_factor, 1.0);
        assert_eq!(
            announcement.signature,
            ParityAnnouncement::sign(NodeId(2), announcement.timestamp)
        );
    }

    #[test]
    fn test_announce_reaches_every_peer_and_the_sender() {
        let bus = Arc::new(LocalBus::new());
        let network = NetworkHandler::new(4, DIM, 42).unwrap().with_transport(bus.clone());
        let announcement = network.announce(NodeId(1)).unwrap();
        assert_eq!(bus.broadcast_frames(), 1);
        network.with_nodes(|nodes| {
            for node in nodes {
                assert_eq!(
                    node.known_parity_map.get(&NodeId(1)),
                    Some(&announcement)
                );
            }
            assert_eq!(nodes[1].last_announcement, announcement.timestamp);
        });
    }

    #[test]
    fn test_repeated_announcements_monotonically_refresh_peers() {
        let network = NetworkHandler::new(3, DIM, 42).unwrap();
        let first = network.announce(NodeId(0)).unwrap();
        let second = network.announce(NodeId(0)).unwrap();
        assert!(second.timestamp > first.timestamp);
        network.with_nodes(|nodes| {
            for node in nodes {
                assert_eq!(
                    node.known_parity_map.get(&NodeId(0)).map(|a| a.timestamp),
                    Some(second.timestamp)
                );
            }
        });
    }

    #[test]
    fn test_gossip_targets_are_distinct_neighbors() {
        let network = NetworkHandler::new(8, DIM, 42).unwrap();
        network.connect_ring(5);
        let neighbors = network.with_node(NodeId(0), |n| n.neighbors.clone()).unwrap();
        let targets = network.gossip(NodeId(0)).unwrap();
        assert_eq!(targets.len(), 3);
        let mut unique = targets.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert!(targets.iter().all(|t| neighbors.contains(t)));
    }

    #[test]
    fn test_gossip_is_capped_by_degree() {
        let network = NetworkHandler::new(3, DIM, 42).unwrap();
        network.connect_ring(2);
        let targets = network.gossip(NodeId(0)).unwrap();
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_gossip_selection_is_seeded() {
        let build = || {
            let network = NetworkHandler::new(8, DIM, 42).unwrap();
            network.connect_ring(5);
            network.gossip(NodeId(0)).unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_gossip_only_reaches_selected_neighbors() {
        let network = NetworkHandler::new(8, DIM, 42).unwrap();
        network.connect_ring(5);
        let targets = network.gossip(NodeId(0)).unwrap();
        network.with_nodes(|nodes| {
            for node in nodes {
                let heard = node.known_parity_map.contains_key(&NodeId(0));
                assert_eq!(heard, targets.contains(&node.id));
            }
        });
    }
}
