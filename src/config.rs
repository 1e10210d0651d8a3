use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// What to do with containers running in the host's network namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostNetworkPolicy {
    /// Do not register them at all.
    Skip,
    /// Register their hostnames with an empty address set.
    Empty,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub dns_bind: SocketAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_ip: Option<String>,
    /// Zone the responder answers for. `.` answers for every name.
    pub zone: String,
    /// Suffixes appended to each container name, one hostname per suffix.
    pub suffixes: Vec<String>,
    /// Also register the bare `<name>.` form.
    pub short_names: bool,
    pub host_network: HostNetworkPolicy,
    pub ttl: u32,
    pub reconnect_delay_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dns_bind: SocketAddr::from(([0, 0, 0, 0], 53)),
            bind_ip: None,
            zone: "docker.local.".into(),
            suffixes: vec!["docker.local.".into()],
            short_names: false,
            host_network: HostNetworkPolicy::Skip,
            ttl: 3600,
            reconnect_delay_secs: 2,
            log_level: "info".into(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("dockdns.toml"))
            .merge(Json::file("dockdns.json"))
            .merge(Env::prefixed("DOCKDNS_"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        config.normalized()
    }

    /// Canonicalizes names and applies `bind_ip`.
    pub fn normalized(mut self) -> anyhow::Result<Self> {
        // If bind_ip is set, override the IP part of dns_bind
        if let Some(ref ip) = self.bind_ip {
            let port = self.dns_bind.port();
            self.dns_bind = format!("{}:{}", ip, port)
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid bind_ip: {}", e))?;
        }

        self.zone = fqdn(&self.zone);
        self.suffixes = self
            .suffixes
            .iter()
            .map(|s| fqdn(s))
            .filter(|s| s != ".")
            .collect();

        if self.suffixes.is_empty() && !self.short_names {
            anyhow::bail!("No hostname forms configured: set `suffixes` or enable `short_names`");
        }

        Ok(self)
    }

    /// Settings that are accepted but leave some hostnames unreachable.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        for suffix in &self.suffixes {
            if !in_zone(suffix, &self.zone) {
                out.push(format!(
                    "Suffix {} is outside zone {}; those hostnames will never be answered",
                    suffix, self.zone
                ));
            }
        }
        if self.short_names && self.zone != "." {
            out.push(format!(
                "short_names is enabled but zone is {}; bare names will never be answered",
                self.zone
            ));
        }
        out
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Lower-cases `name` and makes it dot-terminated without a leading dot.
/// An empty name becomes the root, `.`.
pub fn fqdn(name: &str) -> String {
    let trimmed = name.trim().trim_matches('.').to_ascii_lowercase();
    if trimmed.is_empty() {
        ".".into()
    } else {
        format!("{}.", trimmed)
    }
}

/// Whether the fully-qualified `name` equals `zone` or lies under it.
pub fn in_zone(name: &str, zone: &str) -> bool {
    zone == "." || name == zone || name.ends_with(&format!(".{}", zone))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serve_docker_local() {
        let cfg = Config::default().normalized().unwrap();
        assert_eq!(cfg.dns_bind.port(), 53);
        assert_eq!(cfg.zone, "docker.local.");
        assert_eq!(cfg.suffixes, vec!["docker.local.".to_string()]);
        assert_eq!(cfg.host_network, HostNetworkPolicy::Skip);
    }

    #[test]
    fn fqdn_normalizes_dots_and_case() {
        assert_eq!(fqdn("Docker.Local"), "docker.local.");
        assert_eq!(fqdn(".container."), "container.");
        assert_eq!(fqdn(""), ".");
        assert_eq!(fqdn("."), ".");
    }

    #[test]
    fn bind_ip_overrides_address_but_keeps_port() {
        let cfg = Config {
            dns_bind: "0.0.0.0:5353".parse().unwrap(),
            bind_ip: Some("127.0.0.1".into()),
            ..Config::default()
        }
        .normalized()
        .unwrap();
        assert_eq!(cfg.dns_bind, "127.0.0.1:5353".parse().unwrap());
    }

    #[test]
    fn invalid_bind_ip_is_rejected() {
        let cfg = Config {
            bind_ip: Some("not-an-ip".into()),
            ..Config::default()
        };
        assert!(cfg.normalized().is_err());
    }

    #[test]
    fn no_hostname_forms_is_rejected() {
        let cfg = Config {
            suffixes: vec![".".into()],
            short_names: false,
            ..Config::default()
        };
        assert!(cfg.normalized().is_err());
    }

    #[test]
    fn default_config_has_no_warnings() {
        assert!(Config::default().normalized().unwrap().warnings().is_empty());
    }

    #[test]
    fn unreachable_hostname_forms_are_reported() {
        let cfg = Config {
            suffixes: vec!["container.".into(), "docker.local.".into()],
            short_names: true,
            ..Config::default()
        }
        .normalized()
        .unwrap();

        let warnings = cfg.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("container."));
        assert!(warnings[1].contains("short_names"));
    }

    #[test]
    fn root_zone_accepts_every_form() {
        let cfg = Config {
            zone: ".".into(),
            suffixes: vec!["container.".into()],
            short_names: true,
            ..Config::default()
        }
        .normalized()
        .unwrap();
        assert!(cfg.warnings().is_empty());
    }

    #[test]
    fn zone_membership() {
        assert!(in_zone("web.docker.local.", "docker.local."));
        assert!(in_zone("docker.local.", "docker.local."));
        assert!(!in_zone("web.mydocker.local.", "docker.local."));
        assert!(in_zone("web.", "."));
    }

    #[test]
    fn host_network_policy_parses_lowercase() {
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Serialized::default("host_network", "empty"))
            .extract()
            .unwrap();
        assert_eq!(cfg.host_network, HostNetworkPolicy::Empty);
    }
}
