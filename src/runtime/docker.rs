use super::ContainerRuntime;
use crate::error::RuntimeError;
use crate::types::{ContainerSnapshot, LifecycleEvent, NetworkAttachment};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerInspectResponse, ContainerSummary, EndpointSettings, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::{BoxStream, StreamExt};
use log::info;
use std::collections::HashMap;

/// Event actions the daemon reacts to; everything else is filtered server-side.
const WATCHED_ACTIONS: [&str; 4] = ["start", "die", "kill", "stop"];

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon (unix socket, or `DOCKER_HOST`).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        info!("Connected to local Docker daemon");
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers.into_iter().map(from_summary).collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerSnapshot, RuntimeError> {
        let detail = self.docker.inspect_container(id, None).await?;
        from_inspect(detail, id)
    }

    fn events(&self) -> BoxStream<'_, Result<LifecycleEvent, RuntimeError>> {
        let opts = EventsOptions::<String> {
            filters: HashMap::from([
                ("type".to_string(), vec!["container".to_string()]),
                (
                    "event".to_string(),
                    WATCHED_ACTIONS.iter().map(|s| s.to_string()).collect(),
                ),
            ]),
            ..Default::default()
        };

        self.docker
            .events(Some(opts))
            .map(|msg| msg.map(from_event).map_err(RuntimeError::from))
            .boxed()
    }
}

/// Attachments sorted by network name; the Engine API reports them as a map.
fn attachments(networks: Option<HashMap<String, EndpointSettings>>) -> Vec<NetworkAttachment> {
    let mut out: Vec<NetworkAttachment> = networks
        .unwrap_or_default()
        .into_iter()
        .map(|(network, settings)| NetworkAttachment {
            network,
            ip_address: settings.ip_address.unwrap_or_default(),
        })
        .collect();
    out.sort_by(|a, b| a.network.cmp(&b.network));
    out
}

fn from_summary(c: ContainerSummary) -> ContainerSnapshot {
    ContainerSnapshot {
        id: c.id.unwrap_or_default(),
        names: c.names.unwrap_or_default(),
        network_mode: c.host_config.and_then(|h| h.network_mode),
        networks: attachments(c.network_settings.and_then(|s| s.networks)),
    }
}

fn from_inspect(
    detail: ContainerInspectResponse,
    requested: &str,
) -> Result<ContainerSnapshot, RuntimeError> {
    let name = detail
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RuntimeError::MissingIdentity(requested.to_string()))?;

    Ok(ContainerSnapshot {
        id: detail.id.unwrap_or_else(|| requested.to_string()),
        names: vec![name],
        network_mode: detail.host_config.and_then(|h| h.network_mode),
        networks: attachments(detail.network_settings.and_then(|s| s.networks)),
    })
}

fn from_event(event: EventMessage) -> LifecycleEvent {
    let (container_id, container_name) = match event.actor {
        Some(actor) => {
            let name = actor.attributes.and_then(|mut a| a.remove("name"));
            (actor.id, name)
        }
        None => (None, None),
    };

    LifecycleEvent {
        kind: event.typ.map(|t| t.to_string()).unwrap_or_default(),
        action: event.action.unwrap_or_default(),
        container_id: container_id.filter(|s| !s.is_empty()),
        container_name: container_name.filter(|s| !s.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{
        ContainerSummaryHostConfig, ContainerSummaryNetworkSettings, EventActor,
        EventMessageTypeEnum, HostConfig,
    };

    fn endpoint(ip: &str) -> EndpointSettings {
        EndpointSettings {
            ip_address: Some(ip.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn summary_is_converted_with_sorted_networks() {
        let summary = ContainerSummary {
            id: Some("f00d".into()),
            names: Some(vec!["/web".into()]),
            host_config: Some(ContainerSummaryHostConfig {
                network_mode: Some("bridge".into()),
                ..Default::default()
            }),
            network_settings: Some(ContainerSummaryNetworkSettings {
                networks: Some(HashMap::from([
                    ("zeta".to_string(), endpoint("172.20.0.2")),
                    ("bridge".to_string(), endpoint("172.17.0.2")),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let snapshot = from_summary(summary);
        assert_eq!(snapshot.id, "f00d");
        assert_eq!(snapshot.names, vec!["/web"]);
        assert_eq!(snapshot.network_mode.as_deref(), Some("bridge"));
        let networks: Vec<&str> = snapshot.networks.iter().map(|n| n.network.as_str()).collect();
        assert_eq!(networks, vec!["bridge", "zeta"]);
    }

    #[test]
    fn inspect_without_name_is_an_error() {
        let detail = ContainerInspectResponse {
            id: Some("f00d".into()),
            ..Default::default()
        };
        assert!(matches!(
            from_inspect(detail, "f00d"),
            Err(RuntimeError::MissingIdentity(_))
        ));
    }

    #[test]
    fn inspect_keeps_host_mode() {
        let detail = ContainerInspectResponse {
            id: Some("f00d".into()),
            name: Some("/agent".into()),
            host_config: Some(HostConfig {
                network_mode: Some("host".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let snapshot = from_inspect(detail, "f00d").unwrap();
        assert_eq!(snapshot.names, vec!["/agent"]);
        assert_eq!(snapshot.network_mode.as_deref(), Some("host"));
        assert!(snapshot.networks.is_empty());
    }

    #[test]
    fn event_carries_actor_id_and_name() {
        let event = EventMessage {
            typ: Some(EventMessageTypeEnum::CONTAINER),
            action: Some("stop".into()),
            actor: Some(EventActor {
                id: Some("f00d".into()),
                attributes: Some(HashMap::from([
                    ("name".to_string(), "api".to_string()),
                    ("image".to_string(), "nginx".to_string()),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let event = from_event(event);
        assert_eq!(event.kind, "container");
        assert_eq!(event.action, "stop");
        assert_eq!(event.container_id.as_deref(), Some("f00d"));
        assert_eq!(event.container_name.as_deref(), Some("api"));
    }
}
