//! Container name → hostname and network attachment → address derivation.
//!
//! Everything here is pure: the same snapshot and policy always yield the
//! same hostnames and addresses, so the synchronizer can re-derive the
//! hostnames of a stopped container from nothing but its name.

use crate::config::{Config, HostNetworkPolicy};
use crate::types::{AddressSet, ContainerSnapshot};

/// Network mode and network name the runtime uses for the host namespace.
const HOST_NETWORK: &str = "host";

/// Hostnames and addresses to publish for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub hostnames: Vec<String>,
    pub addresses: AddressSet,
}

/// Which hostname forms a container name expands to.
#[derive(Debug, Clone)]
pub struct NamingPolicy {
    suffixes: Vec<String>,
    short_names: bool,
    host_network: HostNetworkPolicy,
}

impl NamingPolicy {
    /// `suffixes` must already be dot-terminated without a leading dot.
    pub fn new(suffixes: Vec<String>, short_names: bool, host_network: HostNetworkPolicy) -> Self {
        Self {
            suffixes,
            short_names,
            host_network,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.suffixes.clone(), cfg.short_names, cfg.host_network)
    }

    /// Hostnames for a single runtime-reported name such as `/web`.
    ///
    /// Names that are empty, or still contain `/` once the leading one is
    /// stripped (legacy link aliases like `/app/db`), expand to nothing.
    pub fn hostnames(&self, name: &str) -> Vec<String> {
        let name = name.trim_start_matches('/').to_ascii_lowercase();
        if name.is_empty() || name.contains('/') {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(self.suffixes.len() + 1);
        if self.short_names {
            out.push(format!("{}.", name));
        }
        for suffix in &self.suffixes {
            out.push(format!("{}.{}", name, suffix));
        }
        out
    }

    /// Hostnames for every declared name of a container, without duplicates.
    pub fn container_hostnames(&self, container: &ContainerSnapshot) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for hostname in container.names.iter().flat_map(|n| self.hostnames(n)) {
            if !out.contains(&hostname) {
                out.push(hostname);
            }
        }
        out
    }

    /// What to publish for `container`, or `None` if it is not registered.
    pub fn registration(&self, container: &ContainerSnapshot) -> Option<Registration> {
        if is_host_networked(container) && self.host_network == HostNetworkPolicy::Skip {
            return None;
        }

        let hostnames = self.container_hostnames(container);
        if hostnames.is_empty() {
            return None;
        }

        Some(Registration {
            hostnames,
            addresses: derive_addresses(container),
        })
    }
}

pub fn is_host_networked(container: &ContainerSnapshot) -> bool {
    container.network_mode.as_deref() == Some(HOST_NETWORK)
}

/// Routable addresses of a container, in attachment order.
///
/// Host-networked containers have none. Attachments to a network named
/// `host` and endpoints without an address are skipped.
pub fn derive_addresses(container: &ContainerSnapshot) -> AddressSet {
    if is_host_networked(container) {
        return AddressSet::new();
    }

    container
        .networks
        .iter()
        .filter(|n| n.network != HOST_NETWORK && !n.ip_address.is_empty())
        .map(|n| n.ip_address.clone())
        .collect()
}
