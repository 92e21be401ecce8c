//! Node selection by role
//!
//! Thin layer over the provider's tag-filter queries plus the uniform
//! sampling used by keep-min-workers teardown and kill-node.

use crate::error::DroverResult;
use crate::provider::{
    NodeId, NodeProvider, TagMap, NODE_KIND_HEAD, NODE_KIND_WORKER, TAG_NODE_KIND,
};
use rand::seq::SliceRandom;

/// Tag filter matching head nodes
pub fn head_filter() -> TagMap {
    let mut tags = TagMap::new();
    tags.insert(TAG_NODE_KIND.to_string(), NODE_KIND_HEAD.to_string());
    tags
}

/// Tag filter matching worker nodes
pub fn worker_filter() -> TagMap {
    let mut tags = TagMap::new();
    tags.insert(TAG_NODE_KIND.to_string(), NODE_KIND_WORKER.to_string());
    tags
}

/// Role-based node queries against one provider handle
pub struct NodeSelector<'a> {
    provider: &'a dyn NodeProvider,
}

impl<'a> NodeSelector<'a> {
    pub fn new(provider: &'a dyn NodeProvider) -> Self {
        Self { provider }
    }

    /// Non-terminated head nodes (zero or one in a converged cluster)
    pub async fn head_nodes(&self) -> DroverResult<Vec<NodeId>> {
        self.provider.non_terminated_nodes(&head_filter()).await
    }

    /// Non-terminated worker nodes
    pub async fn worker_nodes(&self) -> DroverResult<Vec<NodeId>> {
        self.provider.non_terminated_nodes(&worker_filter()).await
    }

    /// One uniformly random worker, or None when there are none
    pub async fn random_worker(&self) -> DroverResult<Option<NodeId>> {
        let workers = self.worker_nodes().await?;
        Ok(workers.choose(&mut rand::thread_rng()).cloned())
    }
}

/// Uniform sample of `nodes.len() - keep` nodes, leaving `keep` untouched.
///
/// Returns the candidates for termination. Shuffle-and-slice keeps the
/// selection unbiased over subsets; when the pool is already at or below
/// `keep`, nothing is selected.
pub fn sample_for_termination(mut nodes: Vec<NodeId>, keep: usize) -> Vec<NodeId> {
    if nodes.len() <= keep {
        return Vec::new();
    }
    let take = nodes.len() - keep;
    nodes.shuffle(&mut rand::thread_rng());
    nodes.truncate(take);
    nodes
}
