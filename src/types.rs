//! Data structures used throughout the daemon.
//!
//! These are runtime-neutral views of what the container runtime reports.
//! The Docker adapter converts `bollard` models into them so the name
//! mapper and the synchronizer never touch Engine API types directly.

use serde::{Deserialize, Serialize};

/// Ordered IPv4 addresses a hostname resolves to, as reported by the runtime.
pub type AddressSet = Vec<String>;

/// One network a container is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Network name, e.g. `bridge` or a user-defined network.
    pub network: String,
    /// IPv4 address on that network. Empty while the endpoint is provisioning.
    pub ip_address: String,
}

/// Transient view of a single container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub id: String,
    /// Declared names, still carrying the runtime's leading `/`.
    pub names: Vec<String>,
    /// `HostConfig.NetworkMode`, e.g. `bridge`, `host` or `container:<id>`.
    pub network_mode: Option<String>,
    pub networks: Vec<NetworkAttachment>,
}

/// A lifecycle event from the runtime's event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Event category (`container`, `network`, `image`, ...).
    pub kind: String,
    /// Action within the category (`start`, `die`, `stop`, `kill`, ...).
    pub action: String,
    pub container_id: Option<String>,
    /// The `name` attribute of the event actor, without a leading `/`.
    pub container_name: Option<String>,
}

#[cfg(test)]
impl LifecycleEvent {
    pub fn container(action: &str, id: &str, name: &str) -> Self {
        Self {
            kind: "container".into(),
            action: action.into(),
            container_id: Some(id.into()).filter(|s: &String| !s.is_empty()),
            container_name: Some(name.into()).filter(|s: &String| !s.is_empty()),
        }
    }
}
