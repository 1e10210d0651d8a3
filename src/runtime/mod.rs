use crate::error::RuntimeError;
use crate::types::{ContainerSnapshot, LifecycleEvent};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub mod docker;
pub use docker::DockerRuntime;

/// The three operations the synchronizer needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Every container that is currently running.
    async fn list_running(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError>;

    /// A single container by id or name.
    async fn inspect(&self, id: &str) -> Result<ContainerSnapshot, RuntimeError>;

    /// Subscribe to lifecycle events. The stream ends or yields an error when
    /// the subscription breaks; callers resubscribe.
    fn events(&self) -> BoxStream<'_, Result<LifecycleEvent, RuntimeError>>;
}
