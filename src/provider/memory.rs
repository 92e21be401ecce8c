//! In-memory node provider
//!
//! Backs the `mock` provider type. Nodes live in a per-cluster map shared
//! by every handle built for that cluster, so sequential operations in
//! one process observe each other's effects. An optional termination lag
//! keeps terminated nodes visible for a configurable number of queries,
//! mimicking the eventual consistency of real cloud APIs.

use super::{NodeId, NodeProvider, ProviderFactory, TagMap};
use crate::config::schema::ClusterConfig;
use crate::error::{DroverError, DroverResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

struct MemoryNode {
    tags: TagMap,
    internal_ip: String,
    external_ip: String,
    /// Queries this node stays visible for after termination
    terminating: Option<u32>,
}

struct MemoryState {
    nodes: HashMap<NodeId, MemoryNode>,
    next_id: u64,
    termination_lag: u32,
}

/// One cluster's view of the in-memory backend
pub struct MemoryProvider {
    cluster_name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProvider {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NodeProvider for MemoryProvider {
    async fn non_terminated_nodes(&self, filter: &TagMap) -> DroverResult<Vec<NodeId>> {
        let mut state = self.lock();

        // Age out nodes whose termination lag has expired, then tick the
        // countdown of the ones still draining.
        state.nodes.retain(|_, node| node.terminating != Some(0));
        for node in state.nodes.values_mut() {
            if let Some(remaining) = node.terminating.as_mut() {
                *remaining -= 1;
            }
        }

        let mut matching: Vec<NodeId> = state
            .nodes
            .iter()
            .filter(|(_, node)| filter.iter().all(|(k, v)| node.tags.get(k) == Some(v)))
            .map(|(id, _)| id.clone())
            .collect();
        matching.sort();
        Ok(matching)
    }

    async fn node_tags(&self, node: &NodeId) -> DroverResult<TagMap> {
        let state = self.lock();
        state
            .nodes
            .get(node)
            .map(|n| n.tags.clone())
            .ok_or_else(|| DroverError::Provider(format!("no such node: {}", node)))
    }

    async fn internal_ip(&self, node: &NodeId) -> DroverResult<String> {
        let state = self.lock();
        state
            .nodes
            .get(node)
            .map(|n| n.internal_ip.clone())
            .ok_or_else(|| DroverError::Provider(format!("no such node: {}", node)))
    }

    async fn external_ip(&self, node: &NodeId) -> DroverResult<String> {
        let state = self.lock();
        state
            .nodes
            .get(node)
            .map(|n| n.external_ip.clone())
            .ok_or_else(|| DroverError::Provider(format!("no such node: {}", node)))
    }

    async fn create_node(
        &self,
        _node_spec: &serde_json::Value,
        tags: &TagMap,
        count: u32,
    ) -> DroverResult<()> {
        let mut state = self.lock();
        for _ in 0..count {
            let n = state.next_id;
            state.next_id += 1;
            state.nodes.insert(
                NodeId::new(format!("mock-{}", n)),
                MemoryNode {
                    tags: tags.clone(),
                    internal_ip: format!("10.0.0.{}", 10 + n),
                    external_ip: format!("203.0.113.{}", 10 + n),
                    terminating: None,
                },
            );
        }
        debug!(
            "Created {} mock node(s) for cluster {}",
            count, self.cluster_name
        );
        Ok(())
    }

    async fn terminate_node(&self, node: &NodeId) -> DroverResult<()> {
        let mut state = self.lock();
        let lag = state.termination_lag;
        let entry = state
            .nodes
            .get_mut(node)
            .ok_or_else(|| DroverError::Provider(format!("no such node: {}", node)))?;

        // Re-terminating a draining node must not reset its countdown,
        // otherwise convergence loops would never finish.
        if entry.terminating.is_none() {
            entry.terminating = Some(lag);
            debug!("Terminating mock node {}", node);
        }
        Ok(())
    }

    async fn terminate_nodes(&self, nodes: &[NodeId]) -> DroverResult<()> {
        for node in nodes {
            match self.terminate_node(node).await {
                Ok(()) => {}
                Err(DroverError::Provider(_)) => {
                    debug!("Node {} already gone, skipping terminate", node);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn cleanup(&self) {
        debug!("Releasing mock provider for cluster {}", self.cluster_name);
    }
}

/// Factory for the `mock` provider type
///
/// Cluster state is keyed by cluster name and shared across handles.
/// The spec's provider section may set `termination_lag` to delay node
/// disappearance; the value is fixed when a cluster's state is first
/// created.
pub struct MemoryProviderFactory {
    clusters: Mutex<HashMap<String, Arc<Mutex<MemoryState>>>>,
}

impl MemoryProviderFactory {
    pub fn new() -> Self {
        Self {
            clusters: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderFactory for MemoryProviderFactory {
    async fn bootstrap(&self, mut config: ClusterConfig) -> DroverResult<ClusterConfig> {
        // Observable marker so callers can tell resolved configs apart
        // from raw specs.
        config
            .provider
            .extra
            .insert("bootstrapped".to_string(), serde_json::Value::Bool(true));
        Ok(config)
    }

    async fn build(&self, config: &ClusterConfig) -> DroverResult<Arc<dyn NodeProvider>> {
        let lag = config
            .provider
            .extra
            .get("termination_lag")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;

        let mut clusters = self.clusters.lock().unwrap_or_else(|e| e.into_inner());
        let state = clusters
            .entry(config.cluster_name.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(MemoryState {
                    nodes: HashMap::new(),
                    next_id: 0,
                    termination_lag: lag,
                }))
            })
            .clone();

        Ok(Arc::new(MemoryProvider {
            cluster_name: config.cluster_name.clone(),
            state,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{NODE_KIND_HEAD, NODE_KIND_WORKER, TAG_NODE_KIND};

    fn test_config(name: &str) -> ClusterConfig {
        let mut config = ClusterConfig::default();
        config.cluster_name = name.to_string();
        config.provider.kind = "mock".to_string();
        config.auth.ssh_user = "ubuntu".to_string();
        config
    }

    fn kind_tags(kind: &str) -> TagMap {
        let mut tags = TagMap::new();
        tags.insert(TAG_NODE_KIND.to_string(), kind.to_string());
        tags
    }

    async fn build_test_provider(name: &str) -> Arc<dyn NodeProvider> {
        MemoryProviderFactory::new()
            .build(&test_config(name))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_filter_by_kind() {
        let provider = build_test_provider("filter").await;
        let spec = serde_json::json!({});

        provider
            .create_node(&spec, &kind_tags(NODE_KIND_HEAD), 1)
            .await
            .unwrap();
        provider
            .create_node(&spec, &kind_tags(NODE_KIND_WORKER), 3)
            .await
            .unwrap();

        let heads = provider
            .non_terminated_nodes(&kind_tags(NODE_KIND_HEAD))
            .await
            .unwrap();
        let workers = provider
            .non_terminated_nodes(&kind_tags(NODE_KIND_WORKER))
            .await
            .unwrap();

        assert_eq!(heads.len(), 1);
        assert_eq!(workers.len(), 3);
    }

    #[tokio::test]
    async fn empty_filter_matches_everything() {
        let provider = build_test_provider("all").await;
        let spec = serde_json::json!({});

        provider
            .create_node(&spec, &kind_tags(NODE_KIND_WORKER), 2)
            .await
            .unwrap();

        let all = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn node_tags_round_trip() {
        let provider = build_test_provider("tags").await;
        let mut tags = kind_tags(NODE_KIND_HEAD);
        tags.insert("drover-node-name".to_string(), "drover-tags-head".to_string());

        provider
            .create_node(&serde_json::json!({}), &tags, 1)
            .await
            .unwrap();

        let nodes = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();
        let read_back = provider.node_tags(&nodes[0]).await.unwrap();
        assert_eq!(read_back, tags);
    }

    #[tokio::test]
    async fn nodes_get_distinct_ips() {
        let provider = build_test_provider("ips").await;
        provider
            .create_node(&serde_json::json!({}), &kind_tags(NODE_KIND_WORKER), 2)
            .await
            .unwrap();

        let nodes = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();
        let ip_a = provider.external_ip(&nodes[0]).await.unwrap();
        let ip_b = provider.external_ip(&nodes[1]).await.unwrap();
        assert_ne!(ip_a, ip_b);

        let internal = provider.internal_ip(&nodes[0]).await.unwrap();
        assert!(internal.starts_with("10."));
    }

    #[tokio::test]
    async fn terminate_without_lag_is_immediate() {
        let provider = build_test_provider("fast-term").await;
        provider
            .create_node(&serde_json::json!({}), &kind_tags(NODE_KIND_WORKER), 1)
            .await
            .unwrap();

        let nodes = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();
        provider.terminate_node(&nodes[0]).await.unwrap();

        let after = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn termination_lag_keeps_nodes_visible() {
        let mut config = test_config("laggy");
        config.provider.extra.insert(
            "termination_lag".to_string(),
            serde_json::Value::from(2u64),
        );
        let provider = MemoryProviderFactory::new().build(&config).await.unwrap();

        provider
            .create_node(&serde_json::json!({}), &kind_tags(NODE_KIND_WORKER), 1)
            .await
            .unwrap();
        let nodes = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();
        provider.terminate_node(&nodes[0]).await.unwrap();

        // Visible for exactly two queries after termination
        assert_eq!(
            provider
                .non_terminated_nodes(&TagMap::new())
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            provider
                .non_terminated_nodes(&TagMap::new())
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(provider
            .non_terminated_nodes(&TagMap::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn re_terminating_does_not_reset_lag() {
        let mut config = test_config("re-term");
        config.provider.extra.insert(
            "termination_lag".to_string(),
            serde_json::Value::from(1u64),
        );
        let provider = MemoryProviderFactory::new().build(&config).await.unwrap();

        provider
            .create_node(&serde_json::json!({}), &kind_tags(NODE_KIND_WORKER), 1)
            .await
            .unwrap();
        let nodes = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();

        provider.terminate_node(&nodes[0]).await.unwrap();
        let visible = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();
        assert_eq!(visible.len(), 1);

        // A convergence loop terminates whatever it still sees
        provider.terminate_nodes(&visible).await.unwrap();
        assert!(provider
            .non_terminated_nodes(&TagMap::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn terminate_missing_node_errors() {
        let provider = build_test_provider("missing").await;
        let result = provider.terminate_node(&NodeId::new("mock-99")).await;
        assert!(matches!(result, Err(DroverError::Provider(_))));
    }

    #[tokio::test]
    async fn batch_terminate_skips_missing() {
        let provider = build_test_provider("batch").await;
        provider
            .create_node(&serde_json::json!({}), &kind_tags(NODE_KIND_WORKER), 1)
            .await
            .unwrap();
        let mut nodes = provider.non_terminated_nodes(&TagMap::new()).await.unwrap();
        nodes.push(NodeId::new("mock-404"));

        provider.terminate_nodes(&nodes).await.unwrap();
        assert!(provider
            .non_terminated_nodes(&TagMap::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn handles_share_cluster_state() {
        let factory = MemoryProviderFactory::new();
        let config = test_config("shared");

        let first = factory.build(&config).await.unwrap();
        first
            .create_node(&serde_json::json!({}), &kind_tags(NODE_KIND_HEAD), 1)
            .await
            .unwrap();

        let second = factory.build(&config).await.unwrap();
        let seen = second.non_terminated_nodes(&TagMap::new()).await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_marks_config() {
        let factory = MemoryProviderFactory::new();
        let resolved = factory.bootstrap(test_config("marked")).await.unwrap();
        assert_eq!(
            resolved.provider.extra.get("bootstrapped"),
            Some(&serde_json::Value::Bool(true))
        );
    }
}
