//! Consul agent backed service registry
//!
//! Talks to the local Consul agent over its HTTP API. A registration carries
//! a TCP check per endpoint plus a TTL check that a heartbeat task keeps
//! passing.

pub mod model;

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dtm_driver_common::ServiceInstance;
use reqwest::{Client, RequestBuilder};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::registry::ServiceRegistry;

use self::model::{
    AgentServiceCheck, AgentServiceRegistration, CheckStatusUpdate, ServiceAddress, ServiceHealth,
};

const DEFAULT_ADDRESS: &str = "127.0.0.1:8500";

/// Configuration for the Consul client
#[derive(Clone, Debug)]
pub struct ConsulClientConfig {
    /// Agent address, `host:port` or a full URL
    pub address: String,
    /// Scheme used when `address` has none
    pub scheme: String,
    /// ACL token sent as `X-Consul-Token`
    pub token: Option<String>,
    /// Register a TCP check per endpoint
    pub health_check: bool,
    /// Register a TTL check and keep it passing
    pub heartbeat: bool,
    /// Check interval; the TTL check uses twice this value
    pub health_check_interval: Duration,
    /// Critical duration after which Consul drops the service
    pub deregister_critical_after: Duration,
}

impl Default for ConsulClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            scheme: "http".to_string(),
            token: None,
            health_check: true,
            heartbeat: true,
            health_check_interval: Duration::from_secs(10),
            deregister_critical_after: Duration::from_secs(600),
        }
    }
}

impl ConsulClientConfig {
    /// Create a config for a single agent address
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Default::default()
        }
    }

    /// Set the ACL token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Enable or disable the TCP and TTL checks
    pub fn with_checks(mut self, health_check: bool, heartbeat: bool) -> Self {
        self.health_check = health_check;
        self.heartbeat = heartbeat;
        self
    }

    /// Base URL of the agent API
    pub fn base_url(&self) -> Result<String> {
        let address = if self.address.is_empty() {
            DEFAULT_ADDRESS
        } else {
            self.address.as_str()
        };
        let base = if address.contains("://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("{}://{}", self.scheme, address)
        };
        match url::Url::parse(&base) {
            Ok(u) if u.host_str().is_some_and(|h| !h.is_empty()) => Ok(base),
            _ => Err(RegistryError::InvalidAddress(self.address.clone())),
        }
    }
}

/// Service registry over a Consul agent
pub struct ConsulRegistry {
    client: Client,
    base_url: String,
    config: ConsulClientConfig,
    /// TTL heartbeat tasks by service ID
    heartbeats: DashMap<String, JoinHandle<()>>,
}

impl ConsulRegistry {
    /// Create a registry client; fails on an unusable agent address
    pub fn new(config: ConsulClientConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder().build()?;
        debug!("Created consul client: base_url={}", base_url);
        Ok(Self {
            client,
            base_url,
            config,
            heartbeats: DashMap::new(),
        })
    }

    /// Client for a single agent address with default checks
    pub fn from_address(address: &str) -> Result<Self> {
        Self::new(ConsulClientConfig::new(address))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the registration body for an instance
    pub fn registration(&self, instance: &ServiceInstance) -> AgentServiceRegistration {
        let endpoints = instance.parsed_endpoints();
        let interval = self.config.health_check_interval.as_secs();
        let deregister_after = format!("{}s", self.config.deregister_critical_after.as_secs());

        let mut reg = AgentServiceRegistration {
            id: instance.id.clone(),
            name: instance.name.clone(),
            tags: vec![format!("version={}", instance.version)],
            meta: instance.metadata.clone(),
            ..Default::default()
        };

        for ep in &endpoints {
            reg.tagged_addresses.insert(
                ep.scheme.clone(),
                ServiceAddress {
                    address: ep.host.clone(),
                    port: ep.port,
                },
            );
            if self.config.health_check {
                reg.checks.push(AgentServiceCheck {
                    tcp: Some(ep.address()),
                    interval: Some(format!("{}s", interval)),
                    deregister_critical_service_after: Some(deregister_after.clone()),
                    ..Default::default()
                });
            }
        }
        if let Some(first) = endpoints.first() {
            reg.address = first.host.clone();
            reg.port = first.port;
        }
        if self.config.heartbeat {
            reg.checks.push(AgentServiceCheck {
                check_id: Some(ttl_check_id(&instance.id)),
                ttl: Some(format!("{}s", interval * 2)),
                deregister_critical_service_after: Some(deregister_after),
                ..Default::default()
            });
        }
        reg
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.with_token(self.client.put(format!("{}{}", self.base_url, path)))
    }

    fn with_token(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => builder.header("X-Consul-Token", token),
            None => builder,
        }
    }
}

fn ttl_check_id(service_id: &str) -> String {
    format!("service:{}", service_id)
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RegistryError::RequestFailed {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    fn kind(&self) -> &'static str {
        "consul"
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let reg = self.registration(instance);
        let resp = self
            .put("/v1/agent/service/register")
            .query(&[("replace-existing-checks", "true")])
            .json(&reg)
            .send()
            .await?;
        check_status(resp).await?;

        if self.config.heartbeat {
            let task = tokio::spawn(heartbeat(
                self.client.clone(),
                self.base_url.clone(),
                self.config.token.clone(),
                ttl_check_id(&instance.id),
                self.config.health_check_interval,
            ));
            if let Some(previous) = self.heartbeats.insert(instance.id.clone(), task) {
                previous.abort();
            }
        }

        info!(
            "Registered instance in consul: service={}, id={}",
            instance.name, instance.id
        );
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()> {
        if let Some((_, task)) = self.heartbeats.remove(&instance.id) {
            task.abort();
        }
        let resp = self
            .put(&format!("/v1/agent/service/deregister/{}", instance.id))
            .send()
            .await?;
        check_status(resp).await?;
        debug!("Deregistered instance from consul: id={}", instance.id);
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let url = format!("{}/v1/health/service/{}", self.base_url, name);
        let resp = self
            .with_token(self.client.get(url))
            .query(&[("passing", "true")])
            .send()
            .await?;
        let entries: Vec<ServiceHealth> = check_status(resp).await?.json().await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let svc = entry.service;
                ServiceInstance {
                    version: svc.version(),
                    endpoints: svc.endpoints(),
                    metadata: svc.meta.clone().unwrap_or_default(),
                    id: svc.id,
                    name: svc.service,
                }
            })
            .collect())
    }
}

impl Drop for ConsulRegistry {
    fn drop(&mut self) {
        for entry in self.heartbeats.iter() {
            entry.value().abort();
        }
    }
}

async fn heartbeat(
    client: Client,
    base_url: String,
    token: Option<String>,
    check_id: String,
    interval: Duration,
) {
    let url = format!("{}/v1/agent/check/update/{}", base_url, check_id);
    tokio::time::sleep(Duration::from_secs(1)).await;
    loop {
        let mut req = client.put(&url).json(&CheckStatusUpdate::passing());
        if let Some(token) = &token {
            req = req.header("X-Consul-Token", token);
        }
        match req.send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(
                "consul TTL update rejected: check={}, status={}",
                check_id,
                resp.status()
            ),
            Err(e) => warn!("consul TTL update failed: check={}, error={}", check_id, e),
        }
        tokio::time::sleep(interval).await;
    }
}
