//! Polaris mesh backed service registry
//!
//! Uses the Polaris HTTP OpenAPI. Every endpoint of an instance becomes one
//! Polaris instance; the `merge` metadata key ties them back together when
//! discovering.

pub mod config;
pub mod model;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dtm_driver_common::{Endpoint, ServiceInstance};
use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::registry::ServiceRegistry;

pub use self::config::{PolarisConfigError, PolarisConfiguration, DEFAULT_CONFIG_PATH};
use self::model::{
    DISCOVER_INSTANCE, DiscoverRequest, HEALTH_CHECK_HEARTBEAT, HealthCheck, HeartbeatCheck,
    Instance, Response, ServiceRef,
};

const META_KIND: &str = "kind";
const META_VERSION: &str = "version";
const META_MERGE: &str = "merge";

/// Registration policy applied to every instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolarisRegistryPolicy {
    pub namespace: String,
    /// Timeout of each request to the server
    pub timeout: Duration,
    pub healthy: bool,
    pub isolate: bool,
    /// Extra attempts after a failed registration
    pub retry_count: u32,
    pub weight: u32,
    pub priority: u32,
    /// Heartbeat TTL in seconds
    pub ttl: u32,
    /// Send heartbeats every TTL seconds
    pub heartbeat: bool,
}

impl Default for PolarisRegistryPolicy {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            timeout: Duration::from_secs(1),
            healthy: true,
            isolate: false,
            retry_count: 3,
            weight: 100,
            priority: 0,
            ttl: 5,
            heartbeat: true,
        }
    }
}

/// Service registry over a Polaris server
pub struct PolarisRegistry {
    client: Client,
    addresses: Vec<String>,
    policy: PolarisRegistryPolicy,
    /// Heartbeat tasks by `host:port` of the registered endpoint
    heartbeats: DashMap<String, JoinHandle<()>>,
}

impl std::fmt::Debug for PolarisRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolarisRegistry")
            .field("addresses", &self.addresses)
            .field("policy", &self.policy)
            .finish()
    }
}

impl PolarisRegistry {
    /// Build the client context from a loaded configuration
    pub fn new(
        config: &PolarisConfiguration,
        policy: PolarisRegistryPolicy,
    ) -> std::result::Result<Self, PolarisConfigError> {
        config.validate()?;
        let addresses = config.server_addresses();
        let client = Client::builder().timeout(policy.timeout).build()?;
        debug!("Created polaris client: addresses={:?}", addresses);
        Ok(Self {
            client,
            addresses,
            policy,
            heartbeats: DashMap::new(),
        })
    }

    /// Load `path` and build the client context
    pub fn from_file(
        path: impl AsRef<std::path::Path>,
        policy: PolarisRegistryPolicy,
    ) -> std::result::Result<Self, PolarisConfigError> {
        let config = PolarisConfiguration::load(path)?;
        Self::new(&config, policy)
    }

    pub fn policy(&self) -> &PolarisRegistryPolicy {
        &self.policy
    }

    /// Register body for one endpoint of an instance
    pub fn instance_body(&self, instance: &ServiceInstance, endpoint: &Endpoint) -> Instance {
        let mut metadata = instance.metadata.clone();
        metadata.insert(META_KIND.to_string(), endpoint.scheme.clone());
        metadata.insert(META_VERSION.to_string(), instance.version.clone());
        metadata.insert(META_MERGE.to_string(), instance.id.clone());

        Instance {
            service: instance.name.clone(),
            namespace: self.policy.namespace.clone(),
            host: endpoint.host.clone(),
            port: endpoint.port,
            protocol: Some(endpoint.scheme.clone()),
            version: Some(instance.version.clone()),
            priority: Some(self.policy.priority),
            weight: Some(self.policy.weight),
            healthy: Some(self.policy.healthy),
            isolate: Some(self.policy.isolate),
            enable_health_check: Some(self.policy.heartbeat),
            health_check: self.policy.heartbeat.then(|| HealthCheck {
                check_type: HEALTH_CHECK_HEARTBEAT,
                heartbeat: HeartbeatCheck {
                    ttl: self.policy.ttl,
                },
            }),
            metadata,
            ..Default::default()
        }
    }

    async fn call<B: Serialize + Sync>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<Response> {
        call(&self.client, &self.addresses, 0, method, path, body).await
    }

    async fn register_endpoint(&self, body: &Instance) -> Result<()> {
        let mut attempt = 0;
        loop {
            let result = call(
                &self.client,
                &self.addresses,
                attempt as usize,
                reqwest::Method::POST,
                "/v1/RegisterInstance",
                body,
            )
            .await;
            match result {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.policy.retry_count => {
                    debug!(
                        "polaris register attempt {} failed: host={}, port={}, error={}",
                        attempt + 1,
                        body.host,
                        body.port,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Send one request to the server picked by `attempt`
async fn call<B: Serialize + Sync>(
    client: &Client,
    addresses: &[String],
    attempt: usize,
    method: reqwest::Method,
    path: &str,
    body: &B,
) -> Result<Response> {
    let base = &addresses[attempt % addresses.len()];
    let resp = client
        .request(method, format!("{}{}", base, path))
        .json(body)
        .send()
        .await?;

    let status = resp.status();
    let text = resp.text().await?;
    let parsed: Response = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => {
            return Err(RegistryError::RequestFailed {
                status: status.as_u16(),
                body: text,
            });
        }
        Err(e) => return Err(e.into()),
    };
    if !parsed.is_success() {
        return Err(RegistryError::Polaris {
            code: parsed.code,
            info: parsed.info,
        });
    }
    Ok(parsed)
}

#[async_trait]
impl ServiceRegistry for PolarisRegistry {
    fn kind(&self) -> &'static str {
        "polaris"
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        for endpoint in instance.endpoints.iter() {
            let ep = Endpoint::parse(endpoint)
                .ok_or_else(|| RegistryError::InvalidEndpoint(endpoint.clone()))?;
            let body = self.instance_body(instance, &ep);
            self.register_endpoint(&body).await?;

            if self.policy.heartbeat {
                let key = Instance::key(&body.service, &body.namespace, &body.host, body.port);
                let task = tokio::spawn(heartbeat(
                    self.client.clone(),
                    self.addresses.clone(),
                    key,
                    Duration::from_secs(self.policy.ttl.max(1) as u64),
                ));
                if let Some(previous) = self.heartbeats.insert(ep.address(), task) {
                    previous.abort();
                }
            }
        }

        info!(
            "Registered instance in polaris: namespace={}, service={}, id={}",
            self.policy.namespace, instance.name, instance.id
        );
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()> {
        for ep in instance.parsed_endpoints() {
            if let Some((_, task)) = self.heartbeats.remove(&ep.address()) {
                task.abort();
            }
            let body = Instance::key(&instance.name, &self.policy.namespace, &ep.host, ep.port);
            self.call(reqwest::Method::POST, "/v1/DeregisterInstance", &body)
                .await?;
        }
        debug!("Deregistered instance from polaris: id={}", instance.id);
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let req = DiscoverRequest {
            request_type: DISCOVER_INSTANCE,
            service: ServiceRef {
                name: name.to_string(),
                namespace: self.policy.namespace.clone(),
            },
        };
        let resp = self.call(reqwest::Method::POST, "/v1/Discover", &req).await?;
        Ok(merge_instances(name, resp.instances))
    }
}

impl Drop for PolarisRegistry {
    fn drop(&mut self) {
        for entry in self.heartbeats.iter() {
            entry.value().abort();
        }
    }
}

/// Group live Polaris instances back into service instances by `merge` key
pub fn merge_instances(name: &str, instances: Vec<Instance>) -> Vec<ServiceInstance> {
    let mut merged: Vec<ServiceInstance> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for ins in instances.into_iter().filter(Instance::is_live) {
        let mut metadata = ins.metadata;
        let kind = metadata
            .remove(META_KIND)
            .or(ins.protocol)
            .unwrap_or_else(|| "grpc".to_string());
        let version = metadata.remove(META_VERSION).or(ins.version).unwrap_or_default();
        let id = metadata
            .remove(META_MERGE)
            .or(ins.id)
            .unwrap_or_else(|| format!("{}:{}", ins.host, ins.port));
        let endpoint = Endpoint::new(kind, ins.host, ins.port).to_string();

        match index.get(&id) {
            Some(&i) => merged[i].endpoints.push(endpoint),
            None => {
                index.insert(id.clone(), merged.len());
                merged.push(ServiceInstance {
                    id,
                    name: name.to_string(),
                    version,
                    metadata,
                    endpoints: vec![endpoint],
                });
            }
        }
    }
    merged
}

async fn heartbeat(client: Client, addresses: Vec<String>, key: Instance, interval: Duration) {
    let mut attempt = 0usize;
    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = call(
            &client,
            &addresses,
            attempt,
            reqwest::Method::PUT,
            "/v1/Heartbeat",
            &key,
        )
        .await
        {
            warn!(
                "polaris heartbeat failed: service={}, host={}, port={}, error={}",
                key.service, key.host, key.port, e
            );
            // Move to the next server on failure
            attempt = attempt.wrapping_add(1);
        }
    }
}
