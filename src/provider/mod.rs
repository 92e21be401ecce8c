//! Node provider abstraction
//!
//! Providers own the actual machines. This crate only ever talks to them
//! through the `NodeProvider` trait: create nodes with tags, query
//! non-terminated nodes by tag filter, read tags and IPs, terminate.
//! Factories are registered process-wide under the provider `type` string
//! from the cluster spec; the in-memory `mock` provider is built in.

pub mod memory;

use crate::config::schema::ClusterConfig;
use crate::error::{DroverError, DroverResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// Tag holding a node's role within the cluster
pub const TAG_NODE_KIND: &str = "drover-node-kind";

/// Tag holding the launch hash the node was created from
pub const TAG_LAUNCH_CONFIG: &str = "drover-launch-config";

/// Tag holding the display name of the node
pub const TAG_NODE_NAME: &str = "drover-node-name";

/// Node kind tag value for the head node
pub const NODE_KIND_HEAD: &str = "head";

/// Node kind tag value for worker nodes
pub const NODE_KIND_WORKER: &str = "worker";

/// Tag set attached to nodes, ordered for stable iteration
pub type TagMap = BTreeMap<String, String>;

/// Opaque provider-assigned node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a provider-assigned identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Abstract node provisioning backend
///
/// Implementations must be safe to share behind `Arc` across await
/// points. All state reported here is authoritative: callers re-derive
/// cluster state from these queries on every operation.
#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// IDs of all non-terminated nodes whose tags contain `filter`
    async fn non_terminated_nodes(&self, filter: &TagMap) -> DroverResult<Vec<NodeId>>;

    /// Tags of one node
    async fn node_tags(&self, node: &NodeId) -> DroverResult<TagMap>;

    /// Internal (private network) IP of one node
    async fn internal_ip(&self, node: &NodeId) -> DroverResult<String>;

    /// External (public) IP of one node
    async fn external_ip(&self, node: &NodeId) -> DroverResult<String>;

    /// Create `count` nodes from a launch spec, stamped with `tags`
    async fn create_node(
        &self,
        node_spec: &serde_json::Value,
        tags: &TagMap,
        count: u32,
    ) -> DroverResult<()>;

    /// Terminate one node
    async fn terminate_node(&self, node: &NodeId) -> DroverResult<()>;

    /// Terminate a batch of nodes
    async fn terminate_nodes(&self, nodes: &[NodeId]) -> DroverResult<()>;

    /// Release any resources held by this handle.
    ///
    /// Called on every exit path of a top-level operation, including
    /// error paths. Infallible; implementations log their own failures.
    async fn cleanup(&self);
}

/// Fetch a node's address honoring the internal-IP preference
pub async fn node_ip(
    provider: &dyn NodeProvider,
    node: &NodeId,
    use_internal: bool,
) -> DroverResult<String> {
    if use_internal {
        provider.internal_ip(node).await
    } else {
        provider.external_ip(node).await
    }
}

/// Builds providers and runs their resolve-time bootstrap transform
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Fill in provider-side details of a prepared, validated config.
    ///
    /// May side-effect external resources (key pairs, networks). The
    /// returned config is what gets cached and shipped to nodes.
    async fn bootstrap(&self, config: ClusterConfig) -> DroverResult<ClusterConfig>;

    /// Build a provider handle scoped to one cluster
    async fn build(&self, config: &ClusterConfig) -> DroverResult<Arc<dyn NodeProvider>>;
}

type Registry = RwLock<HashMap<String, Arc<dyn ProviderFactory>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut factories: HashMap<String, Arc<dyn ProviderFactory>> = HashMap::new();
        factories.insert(
            "mock".to_string(),
            Arc::new(memory::MemoryProviderFactory::new()),
        );
        RwLock::new(factories)
    })
}

/// Register a provider factory under a type string
pub fn register_factory(kind: impl Into<String>, factory: Arc<dyn ProviderFactory>) {
    let mut factories = registry().write().unwrap_or_else(|e| e.into_inner());
    factories.insert(kind.into(), factory);
}

/// Look up the factory for a provider type
pub fn factory_for(kind: &str) -> DroverResult<Arc<dyn ProviderFactory>> {
    let factories = registry().read().unwrap_or_else(|e| e.into_inner());
    factories
        .get(kind)
        .cloned()
        .ok_or_else(|| DroverError::UnsupportedProvider(kind.to_string()))
}

/// Build a provider handle for a resolved config
pub async fn build_provider(config: &ClusterConfig) -> DroverResult<Arc<dyn NodeProvider>> {
    let factory = factory_for(&config.provider.kind)?;
    factory.build(config).await
}
