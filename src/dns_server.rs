//! DNS server subsystem.
//!
//! A lightweight authoritative responder built on
//! [hickory-server](https://crates.io/crates/hickory-server). It listens on a
//! UDP socket and answers every query from the shared [`Registry`]:
//!
//! * **A queries inside the zone**: one A record per registered address.
//!   Unknown names get an empty NOERROR answer, not NXDOMAIN.
//! * **Any other type inside the zone**: empty NOERROR answer.
//! * **Names outside the zone**: REFUSED. Nothing is forwarded.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::proto::op::{Header, OpCode, ResponseCode};
use hickory_server::proto::rr::rdata::A;
use hickory_server::proto::rr::{LowerName, Name, RData, Record, RecordType};
use hickory_server::server::{
    Request, RequestHandler, ResponseHandler, ResponseInfo, ServerFuture,
};
use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;

/// Start the DNS server and serve until `shutdown` is cancelled.
pub async fn run_dns_server(
    bind_addr: SocketAddr,
    handler: RegistryHandler,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!("DNS server starting on {} for zone {}", bind_addr, handler.zone);

    let mut server = ServerFuture::new(handler);

    let udp = UdpSocket::bind(bind_addr).await?;
    server.register_socket(udp);

    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("DNS server shutting down");
        }
        result = server.block_until_done() => {
            result?;
        }
    }
    Ok(())
}

/// Answers queries for one zone from the registry.
pub struct RegistryHandler {
    zone: LowerName,
    registry: Registry,
    ttl: u32,
}

impl RegistryHandler {
    pub fn new(zone: &str, registry: Registry, ttl: u32) -> anyhow::Result<Self> {
        let zone = Name::from_ascii(zone)
            .map_err(|e| anyhow::anyhow!("Invalid zone {}: {}", zone, e))?;
        Ok(Self {
            zone: LowerName::from(zone),
            registry,
            ttl,
        })
    }

    /// A records for `name`. Addresses that are not valid IPv4 are dropped.
    async fn a_records(&self, name: &LowerName) -> Vec<Record> {
        let key = name.to_string();
        let addresses = match self.registry.lookup(&key).await {
            Some(addresses) => addresses,
            None => return Vec::new(),
        };

        let owner = Name::from(name.clone());
        addresses
            .iter()
            .filter_map(|ip| match ip.parse::<Ipv4Addr>() {
                Ok(ipv4) => Some(Record::from_rdata(owner.clone(), self.ttl, RData::A(A(ipv4)))),
                Err(e) => {
                    warn!("Skipping invalid address {:?} for {}: {}", ip, key, e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl RequestHandler for RegistryHandler {
    async fn handle_request<R>(&self, request: &Request, mut response_handle: R) -> ResponseInfo
    where
        R: ResponseHandler + Send,
    {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_recursion_available(false);

        let mut answers = Vec::new();
        if request.header().op_code() == OpCode::Query {
            let query = request.query();
            let qtype = query.query_type();
            debug!("Query for {} {} from {}", query.name(), qtype, request.src());

            if !self.zone.zone_of(query.name()) {
                header.set_authoritative(false);
                header.set_response_code(ResponseCode::Refused);
            } else if qtype == RecordType::A {
                answers = self.a_records(query.name()).await;
            }
        }

        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(
            header,
            answers.iter(),
            std::iter::empty(),
            std::iter::empty(),
            std::iter::empty(),
        );

        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to send DNS response to {}: {}", request.src(), e);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}
