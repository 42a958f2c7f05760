use crate::cli::ServerConfig;
use crate::engine::merkle::MerkleTree;
use crate::engine::network::NetworkHandler;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use task_manager::{Task, TaskManager, TaskState};
use tokio_util::sync::CancellationToken;
use toroid_types::node::NodeId;
use toroid_types::policy::DistributionPolicy;

/// Background daemon over one node table: periodic announcements,
/// replication rebalancing and Merkle integrity checks, each on its own
/// interval. Every tick snapshots under the table guard and releases it
/// before anything is broadcast.
pub struct OverlayServer {
    network: Arc<NetworkHandler>,
    task_manager: Arc<TaskManager>,
    config: ServerConfig,
}

struct AnnounceTask {
    network: Arc<NetworkHandler>,
}

#[async_trait::async_trait]
impl Task for AnnounceTask {
    fn task_name(&self) -> String {
        "announce".to_string()
    }

    async fn run(&self) -> TaskState {
        for id in 0..self.network.node_count() {
            if let Err(error) = self.network.announce(NodeId(id)) {
                log::warn!("announcement round skipped node {id}: {error}");
            }
        }
        TaskState::Continue
    }
}

struct RebalanceTask {
    network: Arc<NetworkHandler>,
    policy: DistributionPolicy,
}

#[async_trait::async_trait]
impl Task for RebalanceTask {
    fn task_name(&self) -> String {
        "rebalance".to_string()
    }

    async fn run(&self) -> TaskState {
        for tag in self.network.known_tags() {
            let holders = self.network.holders_of(&tag).len();
            if holders >= self.policy.min_replicas {
                continue;
            }
            log::info!(
                "tag '{tag}' at {holders}/{} replicas, re-running placement",
                self.policy.min_replicas
            );
            if let Err(error) = self.network.distribute(&tag, &self.policy) {
                log::warn!("rebalance of '{tag}' failed: {error}");
            }
        }
        TaskState::Continue
    }
}

struct IntegrityTask {
    network: Arc<NetworkHandler>,
    journal_path: PathBuf,
    last_root: Mutex<Option<String>>,
}

impl IntegrityTask {
    fn export(&self, tree: &MerkleTree) -> std::io::Result<()> {
        let file = File::create(&self.journal_path)?;
        let mut writer = BufWriter::new(file);
        tree.export_journal(&mut writer)
    }
}

#[async_trait::async_trait]
impl Task for IntegrityTask {
    fn task_name(&self) -> String {
        "integrity".to_string()
    }

    async fn run(&self) -> TaskState {
        let tree = self.network.build_merkle_tree();
        let root = tree.root_hash().to_string();
        let mut last_root = self.last_root.lock().expect("integrity state lock poisoned");
        if last_root.as_deref() == Some(root.as_str()) {
            return TaskState::Continue;
        }
        log::info!("merkle root moved to {root}, refreshing journal");
        if let Err(error) = self.export(&tree) {
            log::error!("journal export failed: {error}");
            return TaskState::Continue;
        }
        *last_root = Some(root);
        TaskState::Continue
    }
}

impl OverlayServer {
    pub fn new(network: Arc<NetworkHandler>, config: ServerConfig) -> Self {
        Self {
            network,
            task_manager: Arc::new(TaskManager::new()),
            config,
        }
    }

    pub fn network(&self) -> Arc<NetworkHandler> {
        self.network.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.task_manager.cancellation_token()
    }

    /// Requests shutdown: every loop observes the token at its next tick
    /// boundary and `start` returns once all of them have joined.
    pub fn shutdown(&self) {
        self.task_manager.cancel_all();
    }

    pub fn policy(&self) -> DistributionPolicy {
        DistributionPolicy {
            min_replicas: self.config.min_replicas,
            max_replicas: self.config.max_replicas,
            ..Default::default()
        }
    }

    /// Spawns the periodic loops and parks until every one has observed
    /// cancellation (ctrl-c or the token) at a tick boundary and joined.
    pub async fn start(&self) {
        self.task_manager.spawn_interval_task(
            AnnounceTask {
                network: self.network.clone(),
            },
            Duration::from_secs(self.config.announce_interval_secs),
        );
        self.task_manager.spawn_interval_task(
            RebalanceTask {
                network: self.network.clone(),
                policy: self.policy(),
            },
            Duration::from_secs(self.config.rebalance_interval_secs),
        );
        self.task_manager.spawn_interval_task(
            IntegrityTask {
                network: self.network.clone(),
                journal_path: self.config.journal_path.clone(),
                last_root: Mutex::new(None),
            },
            Duration::from_secs(self.config.integrity_interval_secs),
        );
        log::info!(
            "overlay daemon running over {} nodes (seed {})",
            self.network.node_count(),
            self.network.seed()
        );
        self.task_manager.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toroid_types::DIM;
    use toroid_types::tag::ParityTag;

    fn server(config: ServerConfig) -> OverlayServer {
        let network = Arc::new(NetworkHandler::new(4, DIM, 42).unwrap());
        network.connect_ring(2);
        OverlayServer::new(network, config)
    }

    #[tokio::test]
    async fn test_announce_tick_reaches_every_peer() {
        let task = AnnounceTask {
            network: server(ServerConfig::default()).network(),
        };
        assert_eq!(task.run().await, TaskState::Continue);
        task.network.with_nodes(|nodes| {
            for node in nodes {
                assert_eq!(node.known_parity_map.len(), nodes.len());
            }
        });
    }

    #[tokio::test]
    async fn test_rebalance_tick_restores_replica_floor() {
        let overlay = server(ServerConfig::default());
        let network = overlay.network();
        let block = ParityTag::new("block-1").unwrap();
        network.assign_parity_tag(NodeId(0), &block).unwrap();
        let task = RebalanceTask {
            network: network.clone(),
            policy: DistributionPolicy {
                min_replicas: 2,
                ..Default::default()
            },
        };
        assert_eq!(task.run().await, TaskState::Continue);
        assert!(network.holders_of(&block).len() >= 2);
    }

    #[tokio::test]
    async fn test_integrity_tick_journals_only_on_root_change() {
        let dir = tempfile::tempdir().unwrap();
        let journal_path = dir.path().join("merkle.journal");
        let overlay = server(ServerConfig::default());
        let network = overlay.network();
        let task = IntegrityTask {
            network: network.clone(),
            journal_path: journal_path.clone(),
            last_root: Mutex::new(None),
        };
        assert_eq!(task.run().await, TaskState::Continue);
        let first = std::fs::read_to_string(&journal_path).unwrap();
        assert!(first.starts_with("MERKLE_ROOT: "));
        assert_eq!(first.lines().count(), 1 + network.node_count());

        // no mutation: journal untouched
        std::fs::remove_file(&journal_path).unwrap();
        task.run().await;
        assert!(!journal_path.exists());

        // mutation moves the root and refreshes the journal
        network
            .assign_parity_tag(NodeId(1), &ParityTag::new("block-1").unwrap())
            .unwrap();
        task.run().await;
        let second = std::fs::read_to_string(&journal_path).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_cancellation_joins_all_loops() {
        let overlay = server(ServerConfig {
            announce_interval_secs: 3600,
            rebalance_interval_secs: 3600,
            integrity_interval_secs: 3600,
            ..Default::default()
        });
        let overlay = Arc::new(overlay);
        let runner = overlay.clone();
        let handle = tokio::spawn(async move { runner.start().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        overlay.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("daemon did not observe cancellation")
            .expect("daemon task panicked");
    }
}
