use crate::errors::OverlayError;
use crate::fhe::{Ciphertext, HomomorphicDensity, StubScheme};
use crate::transport::{LocalBus, Transport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use toroid_similarity::{add_weighted, normalize};
use toroid_types::announcement::ParityAnnouncement;
use toroid_types::node::NodeId;
use toroid_types::tag::ParityTag;
use toroid_types::{MAX_NEIGHBORS, MAX_PARITY_TAGS};

/// Wall-clock oracle behind announcement timestamps. The handler layers a
/// logical floor on top so per-sender stamps are strictly increasing even
/// when the wall clock stalls.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as i64)
    }
}

/// Measurement oracle for placement scoring. Latency and centrality
/// default to 1.0 for links nothing has measured yet.
pub trait TopologyOracle: Send + Sync {
    fn rtt_latency(&self, _id: NodeId) -> f64 {
        1.0
    }

    fn centrality(&self, _id: NodeId) -> f64 {
        1.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UniformTopology;

impl TopologyOracle for UniformTopology {}

/// Outcome of a tag assignment; capacity pressure is data, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    AlreadyHeld,
    CapacityExceeded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorStats {
    pub density: f64,
    pub coherence: f64,
    pub vector: Vec<f64>,
}

/// A vertex of the overlay. Neighbors are non-owning ids into the arena
/// (the node table), never references.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub vector: Vec<f64>,
    pub density: f64,
    pub coherence: f64,
    pub neighbors: Vec<NodeId>,
    pub parity_tags: Vec<ParityTag>,
    pub hash: String,
    pub known_parity_map: HashMap<NodeId, ParityAnnouncement>,
    pub last_announcement: i64,
    pub replication_factor: usize,
    pub encrypted_density: Option<Ciphertext>,
}

impl Node {
    pub fn parity_count(&self) -> usize {
        self.parity_tags.len()
    }

    pub fn holds_tag(&self, tag: &ParityTag) -> bool {
        self.parity_tags.iter().any(|held| held == tag)
    }

    /// Refreshes the content digest from the canonical node state. Called
    /// after every mutation; until the first one the hash keeps its
    /// initialization seed string.
    pub(crate) fn refresh_hash(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(self.id.0.to_le_bytes());
        for component in &self.vector {
            hasher.update(component.to_le_bytes());
        }
        hasher.update(self.density.to_le_bytes());
        hasher.update(self.coherence.to_le_bytes());
        for tag in &self.parity_tags {
            hasher.update(tag.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        self.hash = digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
    }

    /// Receiver policy: a known sender is replaced only by a strictly
    /// newer stamp; an unknown sender is dropped when the map is full.
    pub(crate) fn accept_announcement(&mut self, announcement: &ParityAnnouncement) -> bool {
        match self.known_parity_map.get(&announcement.node_id) {
            Some(known) if announcement.timestamp <= known.timestamp => false,
            Some(_) => {
                self.known_parity_map
                    .insert(announcement.node_id, announcement.clone());
                true
            }
            None if self.known_parity_map.len() >= MAX_PARITY_TAGS => false,
            None => {
                self.known_parity_map
                    .insert(announcement.node_id, announcement.clone());
                true
            }
        }
    }
}

/// Owns the node arena and every oracle the engine consumes. Search,
/// routing and scoring snapshots run under the read guard; assignment,
/// wiring, vector mutation and announcement acceptance take the write
/// guard. Guards are never held across transport sends.
pub struct NetworkHandler {
    pub(crate) nodes: RwLock<Vec<Node>>,
    pub(crate) dim: usize,
    pub(crate) seed: u64,
    pub(crate) rng: Mutex<StdRng>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) topology: Arc<dyn TopologyOracle>,
    pub(crate) fhe: Arc<dyn HomomorphicDensity>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) query_vector: RwLock<Vec<f64>>,
    last_stamp: AtomicI64,
}

impl NetworkHandler {
    /// Builds `count` nodes with seeded scalar fields and unit-norm
    /// random vectors. Per node the RNG draws density, coherence, then
    /// the vector components, so a seed pins the whole arena. An overlay
    /// holds at least one node; `count == 0` is rejected here so no
    /// empty arena can ever exist behind a handler.
    #[tracing::instrument]
    pub fn new(count: usize, dim: usize, seed: u64) -> Result<Self, OverlayError> {
        if count == 0 {
            return Err(OverlayError::EmptyNetwork);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes = (0..count)
            .map(|i| {
                let _density: f64 = rng.r#gen();
                let coherence: f64 = rng.r#gen();
                let mut vector: Vec<f64> = (0..dim).map(|_| rng.r#gen::<f64>() - 0.5).collect();
                normalize(&mut vector);
                Node {
                    id: NodeId(i),
                    vector,
                    // vectors are born dense
                    density: 1.0,
                    coherence,
                    neighbors: Vec::new(),
                    parity_tags: Vec::new(),
                    hash: format!("node{i}hash"),
                    known_parity_map: HashMap::new(),
                    last_announcement: 0,
                    replication_factor: 3,
                    encrypted_density: None,
                }
            })
            .collect();
        let mut query_vector = vec![1.0; dim];
        normalize(&mut query_vector);
        Ok(Self {
            nodes: RwLock::new(nodes),
            dim,
            seed,
            rng: Mutex::new(rng),
            clock: Arc::new(SystemClock),
            topology: Arc::new(UniformTopology),
            fhe: Arc::new(StubScheme),
            transport: Arc::new(LocalBus::new()),
            query_vector: RwLock::new(query_vector),
            last_stamp: AtomicI64::new(0),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_topology(mut self, topology: Arc<dyn TopologyOracle>) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_fhe(mut self, fhe: Arc<dyn HomomorphicDensity>) -> Self {
        self.fhe = fhe;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn node_count(&self) -> usize {
        self.read_nodes().len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn read_nodes(&self) -> RwLockReadGuard<'_, Vec<Node>> {
        self.nodes.read().expect("node table lock poisoned")
    }

    pub(crate) fn write_nodes(&self) -> RwLockWriteGuard<'_, Vec<Node>> {
        self.nodes.write().expect("node table lock poisoned")
    }

    /// Read-only view of the arena for callers that need more than one
    /// node at a time.
    pub fn with_nodes<R>(&self, reader: impl FnOnce(&[Node]) -> R) -> R {
        reader(&self.read_nodes())
    }

    /// Read-only view of a single node.
    pub fn with_node<R>(
        &self,
        id: NodeId,
        reader: impl FnOnce(&Node) -> R,
    ) -> Result<R, OverlayError> {
        let nodes = self.read_nodes();
        let node = nodes.get(id.0).ok_or(OverlayError::InvalidNode(id))?;
        Ok(reader(node))
    }

    /// Wires `fanout` ring neighbors `(id + 1 + k) mod N`, skipping self
    /// references and duplicates, capped at `MAX_NEIGHBORS`.
    #[tracing::instrument(skip(self))]
    pub fn connect_neighbors(&self, id: NodeId, fanout: usize) -> Result<(), OverlayError> {
        let mut nodes = self.write_nodes();
        let count = nodes.len();
        let node = nodes.get_mut(id.0).ok_or(OverlayError::InvalidNode(id))?;
        for k in 0..fanout {
            let neighbor = NodeId((id.0 + 1 + k) % count);
            if neighbor == id || node.neighbors.contains(&neighbor) {
                continue;
            }
            if node.neighbors.len() >= MAX_NEIGHBORS {
                break;
            }
            node.neighbors.push(neighbor);
        }
        Ok(())
    }

    /// Ring-wires every node with the same fanout.
    pub fn connect_ring(&self, fanout: usize) {
        for id in 0..self.node_count() {
            // ids are in range by construction
            let _ = self.connect_neighbors(NodeId(id), fanout);
        }
    }

    /// Replaces a node's vector wholesale; injected vectors are assumed
    /// dense.
    #[tracing::instrument(skip(self, components))]
    pub fn inject_vector(&self, id: NodeId, components: &[f64]) -> Result<(), OverlayError> {
        if components.len() != self.dim {
            return Err(OverlayError::DimensionMismatch {
                got: components.len(),
                expected: self.dim,
            });
        }
        let mut nodes = self.write_nodes();
        let node = nodes.get_mut(id.0).ok_or(OverlayError::InvalidNode(id))?;
        node.vector.copy_from_slice(components);
        node.density = 1.0;
        node.refresh_hash();
        Ok(())
    }

    /// Moves a node's vector toward the query vector by `rate`, then
    /// renormalizes.
    #[tracing::instrument(skip(self))]
    pub fn evolve_vector(&self, id: NodeId, rate: f64) -> Result<(), OverlayError> {
        let target = self.query_vector();
        let mut nodes = self.write_nodes();
        let node = nodes.get_mut(id.0).ok_or(OverlayError::InvalidNode(id))?;
        let delta: Vec<f64> = target
            .iter()
            .zip(&node.vector)
            .map(|(t, v)| t - v)
            .collect();
        add_weighted(&mut node.vector, &delta, rate);
        normalize(&mut node.vector);
        node.refresh_hash();
        Ok(())
    }

    pub fn vector_stats(&self, id: NodeId) -> Result<VectorStats, OverlayError> {
        self.with_node(id, |node| VectorStats {
            density: node.density,
            coherence: node.coherence,
            vector: node.vector.clone(),
        })
    }

    pub fn set_density(&self, id: NodeId, density: f64) -> Result<(), OverlayError> {
        let mut nodes = self.write_nodes();
        let node = nodes.get_mut(id.0).ok_or(OverlayError::InvalidNode(id))?;
        node.density = density.clamp(0.0, 1.0);
        node.refresh_hash();
        Ok(())
    }

    pub fn set_coherence(&self, id: NodeId, coherence: f64) -> Result<(), OverlayError> {
        let mut nodes = self.write_nodes();
        let node = nodes.get_mut(id.0).ok_or(OverlayError::InvalidNode(id))?;
        node.coherence = coherence.clamp(0.0, 1.0);
        node.refresh_hash();
        Ok(())
    }

    pub fn query_vector(&self) -> Vec<f64> {
        self.query_vector
            .read()
            .expect("query vector lock poisoned")
            .clone()
    }

    pub fn set_query_vector(&self, components: &[f64]) -> Result<(), OverlayError> {
        if components.len() != self.dim {
            return Err(OverlayError::DimensionMismatch {
                got: components.len(),
                expected: self.dim,
            });
        }
        *self
            .query_vector
            .write()
            .expect("query vector lock poisoned") = components.to_vec();
        Ok(())
    }

    /// Appends a parity tag, refusing duplicates silently and signalling
    /// capacity exhaustion as a soft outcome.
    #[tracing::instrument(skip(self))]
    pub fn assign_parity_tag(
        &self,
        id: NodeId,
        tag: &ParityTag,
    ) -> Result<AssignOutcome, OverlayError> {
        let mut nodes = self.write_nodes();
        let node = nodes.get_mut(id.0).ok_or(OverlayError::InvalidNode(id))?;
        if node.holds_tag(tag) {
            return Ok(AssignOutcome::AlreadyHeld);
        }
        if node.parity_count() >= MAX_PARITY_TAGS {
            return Ok(AssignOutcome::CapacityExceeded);
        }
        node.parity_tags.push(tag.clone());
        node.refresh_hash();
        Ok(AssignOutcome::Assigned)
    }

    /// All current holders of a tag, in id order.
    pub fn holders_of(&self, tag: &ParityTag) -> Vec<NodeId> {
        self.with_nodes(|nodes| {
            nodes
                .iter()
                .filter(|node| node.holds_tag(tag))
                .map(|node| node.id)
                .collect()
        })
    }

    /// Union of every node's tag set; the rebalance tick walks this.
    pub fn known_tags(&self) -> BTreeSet<ParityTag> {
        self.with_nodes(|nodes| {
            nodes
                .iter()
                .flat_map(|node| node.parity_tags.iter().cloned())
                .collect()
        })
    }

    pub fn attach_encrypted_density(&self, id: NodeId) -> Result<(), OverlayError> {
        let mut nodes = self.write_nodes();
        let node = nodes.get_mut(id.0).ok_or(OverlayError::InvalidNode(id))?;
        node.encrypted_density = Some(self.fhe.encrypt(node.density));
        Ok(())
    }

    pub fn attach_all_encrypted_densities(&self) {
        let mut nodes = self.write_nodes();
        for node in nodes.iter_mut() {
            node.encrypted_density = Some(self.fhe.encrypt(node.density));
        }
    }

    /// Strictly increasing timestamp: the wall clock floored by the last
    /// stamp handed out plus one.
    pub(crate) fn next_timestamp(&self) -> i64 {
        let now = self.clock.now();
        let mut prev = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_stamp.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use toroid_types::DIM;

    const TOLERANCE: f64 = 1e-6;

    fn vector_norm(vector: &[f64]) -> f64 {
        vector.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    #[test]
    fn test_zero_node_overlay_is_rejected() {
        assert!(matches!(
            NetworkHandler::new(0, DIM, 1),
            Err(OverlayError::EmptyNetwork)
        ));
    }

    #[test]
    fn test_initialization_is_seeded_and_unit_norm() {
        let first = NetworkHandler::new(4, DIM, 42).unwrap();
        let second = NetworkHandler::new(4, DIM, 42).unwrap();
        first.with_nodes(|nodes| {
            assert_eq!(nodes.len(), 4);
            for node in nodes {
                assert!((vector_norm(&node.vector) - 1.0).abs() < TOLERANCE);
                assert_eq!(node.density, 1.0);
                assert!((0.0..1.0).contains(&node.coherence));
                assert_eq!(node.hash, format!("node{}hash", node.id));
            }
        });
        let first_vectors = first.with_nodes(|n| n.iter().map(|x| x.vector.clone()).collect::<Vec<_>>());
        let second_vectors =
            second.with_nodes(|n| n.iter().map(|x| x.vector.clone()).collect::<Vec<_>>());
        assert_eq!(first_vectors, second_vectors);
    }

    #[test]
    fn test_connect_neighbors_refuses_self_and_duplicates() {
        let network = NetworkHandler::new(3, DIM, 7).unwrap();
        network.connect_neighbors(NodeId(0), 5).unwrap();
        let neighbors = network.with_node(NodeId(0), |n| n.neighbors.clone()).unwrap();
        assert_eq!(neighbors, vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_neighbor_list_is_capped() {
        let network = NetworkHandler::new(64, DIM, 7).unwrap();
        network.connect_neighbors(NodeId(0), 40).unwrap();
        let degree = network.with_node(NodeId(0), |n| n.neighbors.len()).unwrap();
        assert_eq!(degree, MAX_NEIGHBORS);
    }

    #[test]
    fn test_inject_vector_checks_dimension_and_sets_density() {
        let network = NetworkHandler::new(2, DIM, 1).unwrap();
        network.set_density(NodeId(0), 0.3).unwrap();
        assert!(matches!(
            network.inject_vector(NodeId(0), &[1.0; 3]),
            Err(OverlayError::DimensionMismatch { got: 3, expected: 8 })
        ));
        let injected = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        network.inject_vector(NodeId(0), &injected).unwrap();
        let stats = network.vector_stats(NodeId(0)).unwrap();
        assert_eq!(stats.vector, injected.to_vec());
        assert_eq!(stats.density, 1.0);
    }

    #[test]
    fn test_evolve_vector_normalizes_and_moves_toward_target() {
        let network = NetworkHandler::new(2, DIM, 1).unwrap();
        let target = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        network.set_query_vector(&target).unwrap();
        let before = network.vector_stats(NodeId(0)).unwrap().vector;
        let before_sim = toroid_similarity::cosine_similarity(&before, &target);
        network.evolve_vector(NodeId(0), 0.5).unwrap();
        let after = network.vector_stats(NodeId(0)).unwrap().vector;
        assert!((vector_norm(&after) - 1.0).abs() < TOLERANCE);
        let after_sim = toroid_similarity::cosine_similarity(&after, &target);
        assert!(after_sim > before_sim);
    }

    #[test]
    fn test_assign_parity_tag_outcomes() {
        let network = NetworkHandler::new(1, DIM, 1).unwrap();
        let tag = ParityTag::new("tag-a").unwrap();
        assert_eq!(
            network.assign_parity_tag(NodeId(0), &tag).unwrap(),
            AssignOutcome::Assigned
        );
        assert_eq!(
            network.assign_parity_tag(NodeId(0), &tag).unwrap(),
            AssignOutcome::AlreadyHeld
        );
        for i in 1..MAX_PARITY_TAGS {
            let filler = ParityTag::new(format!("tag-{i}")).unwrap();
            assert_eq!(
                network.assign_parity_tag(NodeId(0), &filler).unwrap(),
                AssignOutcome::Assigned
            );
        }
        let overflow = ParityTag::new("tag-overflow").unwrap();
        assert_eq!(
            network.assign_parity_tag(NodeId(0), &overflow).unwrap(),
            AssignOutcome::CapacityExceeded
        );
        let count = network.with_node(NodeId(0), |n| n.parity_count()).unwrap();
        assert_eq!(count, MAX_PARITY_TAGS);
    }

    #[test]
    fn test_mutation_refreshes_content_hash() {
        let network = NetworkHandler::new(2, DIM, 1).unwrap();
        let seeded = network.with_node(NodeId(0), |n| n.hash.clone()).unwrap();
        assert_eq!(seeded, "node0hash");
        network
            .assign_parity_tag(NodeId(0), &ParityTag::new("tag-a").unwrap())
            .unwrap();
        let refreshed = network.with_node(NodeId(0), |n| n.hash.clone()).unwrap();
        assert_eq!(refreshed.len(), toroid_types::HASH_HEX_LEN);
        assert_ne!(refreshed, seeded);
    }

    #[test]
    fn test_attached_ciphertext_decrypts_to_the_plain_density() {
        let network = NetworkHandler::new(2, DIM, 1).unwrap();
        network.set_density(NodeId(1), 0.75).unwrap();
        network.attach_encrypted_density(NodeId(1)).unwrap();
        let decrypted = network
            .with_node(NodeId(1), |n| {
                n.encrypted_density
                    .as_ref()
                    .map(|c| network.fhe.decrypt(c))
            })
            .unwrap()
            .unwrap();
        assert!((decrypted - 0.75).abs() < TOLERANCE);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let network = NetworkHandler::new(1, DIM, 1).unwrap();
        let first = network.next_timestamp();
        let second = network.next_timestamp();
        let third = network.next_timestamp();
        assert!(first < second && second < third);
    }

    #[test]
    fn test_knowledge_map_rejects_stale_and_overflow() {
        let mut node = Node {
            id: NodeId(0),
            vector: vec![0.0; DIM],
            density: 1.0,
            coherence: 0.5,
            neighbors: vec![],
            parity_tags: vec![],
            hash: String::from("node0hash"),
            known_parity_map: HashMap::new(),
            last_announcement: 0,
            replication_factor: 3,
            encrypted_density: None,
        };
        let fresh = |sender: usize, timestamp: i64| ParityAnnouncement {
            node_id: NodeId(sender),
            parity_tags: vec![],
            load_factor: 0.0,
            timestamp,
            signature: ParityAnnouncement::sign(NodeId(sender), timestamp),
        };
        assert!(node.accept_announcement(&fresh(1, 10)));
        assert!(!node.accept_announcement(&fresh(1, 10)));
        assert!(!node.accept_announcement(&fresh(1, 9)));
        assert!(node.accept_announcement(&fresh(1, 11)));
        for sender in 2..=MAX_PARITY_TAGS {
            assert!(node.accept_announcement(&fresh(sender, 1)));
        }
        // map full, unknown sender dropped, known sender still updates
        assert!(!node.accept_announcement(&fresh(MAX_PARITY_TAGS + 1, 1)));
        assert!(node.accept_announcement(&fresh(1, 12)));
    }
}
