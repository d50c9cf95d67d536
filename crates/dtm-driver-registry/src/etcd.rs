//! etcd v3 backed service registry
//!
//! Each instance is stored as JSON under `<namespace>/<name>/<id>`, attached
//! to a lease that a background task keeps alive. When the lease is lost the
//! task re-registers the key with bounded retries.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dtm_driver_common::ServiceInstance;
use etcd_client::{Client, GetOptions, PutOptions};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::registry::ServiceRegistry;

/// Options for `EtcdRegistry`
#[derive(Clone, Debug)]
pub struct EtcdRegistryOptions {
    /// Key prefix for all instances
    pub namespace: String,
    /// Lease TTL
    pub ttl: Duration,
    /// Re-registration attempts after the lease is lost
    pub max_retry: u32,
}

impl Default for EtcdRegistryOptions {
    fn default() -> Self {
        Self {
            namespace: "/microservices".to_string(),
            ttl: Duration::from_secs(15),
            max_retry: 5,
        }
    }
}

/// Service registry over an etcd cluster
pub struct EtcdRegistry {
    client: Client,
    options: EtcdRegistryOptions,
    /// Keep-alive tasks by instance key
    heartbeats: DashMap<String, JoinHandle<()>>,
}

impl EtcdRegistry {
    /// Wrap an existing client
    pub fn new(client: Client, options: EtcdRegistryOptions) -> Self {
        Self {
            client,
            options,
            heartbeats: DashMap::new(),
        }
    }

    /// Connect to the given etcd endpoints with default options
    pub async fn connect(endpoints: &[String]) -> Result<Self> {
        let client = Client::connect(endpoints, None).await?;
        debug!("Connected etcd client: endpoints={:?}", endpoints);
        Ok(Self::new(client, EtcdRegistryOptions::default()))
    }

    fn instance_key(&self, instance: &ServiceInstance) -> String {
        instance_key(&self.options.namespace, &instance.name, &instance.id)
    }
}

/// Build the key an instance is stored under
pub fn instance_key(namespace: &str, name: &str, id: &str) -> String {
    format!("{}/{}/{}", namespace, name, id)
}

/// Build the prefix covering every instance of a service
pub fn service_prefix(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

#[async_trait]
impl ServiceRegistry for EtcdRegistry {
    fn kind(&self) -> &'static str {
        "etcd"
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let key = self.instance_key(instance);
        let value = serde_json::to_string(instance)?;
        let ttl = ttl_seconds(self.options.ttl);

        let mut client = self.client.clone();
        let lease_id = register_with_kv(&mut client, &key, &value, ttl).await?;

        let task = tokio::spawn(heartbeat(
            client,
            lease_id,
            key.clone(),
            value,
            ttl,
            self.options.max_retry,
        ));
        if let Some(previous) = self.heartbeats.insert(key.clone(), task) {
            previous.abort();
        }

        info!("Registered instance in etcd: key={}, lease={}", key, lease_id);
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()> {
        let key = self.instance_key(instance);
        if let Some((_, task)) = self.heartbeats.remove(&key) {
            task.abort();
        }
        self.client.clone().delete(key.as_str(), None).await?;
        debug!("Deregistered instance from etcd: key={}", key);
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let prefix = service_prefix(&self.options.namespace, name);
        let resp = self
            .client
            .clone()
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await?;

        let mut instances = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let instance: ServiceInstance = serde_json::from_slice(kv.value())?;
            // The prefix also matches services sharing a name prefix
            if instance.name != name {
                continue;
            }
            instances.push(instance);
        }
        Ok(instances)
    }
}

impl Drop for EtcdRegistry {
    fn drop(&mut self) {
        for entry in self.heartbeats.iter() {
            entry.value().abort();
        }
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

async fn register_with_kv(client: &mut Client, key: &str, value: &str, ttl: i64) -> Result<i64> {
    let lease = client.lease_grant(ttl, None).await?;
    client
        .put(key, value, Some(PutOptions::new().with_lease(lease.id())))
        .await?;
    Ok(lease.id())
}

/// Keep the lease alive, re-registering the key when it is lost.
async fn heartbeat(
    mut client: Client,
    lease_id: i64,
    key: String,
    value: String,
    ttl: i64,
    max_retry: u32,
) {
    let mut lease = Some(lease_id);
    loop {
        let id = match lease {
            Some(id) => id,
            None => match reregister(&mut client, &key, &value, ttl, max_retry).await {
                Some(id) => id,
                None => {
                    warn!("Giving up etcd keep-alive: key={}", key);
                    return;
                }
            },
        };

        if let Err(e) = keep_alive(&mut client, id, ttl).await {
            warn!("etcd keep-alive lost: key={}, lease={}, error={}", key, id, e);
            lease = None;
        }
    }
}

async fn keep_alive(client: &mut Client, lease_id: i64, ttl: i64) -> Result<()> {
    let (mut keeper, mut stream) = client.lease_keep_alive(lease_id).await?;
    let mut ticker = tokio::time::interval(Duration::from_secs((ttl as u64 / 3).max(1)));
    loop {
        ticker.tick().await;
        keeper.keep_alive().await?;
        match stream.message().await? {
            Some(resp) if resp.ttl() > 0 => {}
            _ => {
                return Err(RegistryError::LeaseExpired(lease_id));
            }
        }
    }
}

async fn reregister(
    client: &mut Client,
    key: &str,
    value: &str,
    ttl: i64,
    max_retry: u32,
) -> Option<i64> {
    for attempt in 0..max_retry {
        let registered = tokio::time::timeout(
            Duration::from_secs(3),
            register_with_kv(client, key, value, ttl),
        )
        .await;

        match registered {
            Ok(Ok(id)) => {
                info!("Re-registered instance in etcd: key={}, lease={}", key, id);
                return Some(id);
            }
            Ok(Err(e)) => warn!("etcd re-register failed: key={}, error={}", key, e),
            Err(_) => warn!("etcd re-register timed out: key={}", key),
        }
        tokio::time::sleep(Duration::from_secs(1 << attempt.min(5))).await;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = EtcdRegistryOptions::default();
        assert_eq!(options.namespace, "/microservices");
        assert_eq!(options.ttl, Duration::from_secs(15));
        assert_eq!(options.max_retry, 5);
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            instance_key("/microservices", "pay.order", "abc"),
            "/microservices/pay.order/abc"
        );
        assert_eq!(
            service_prefix("/microservices", "pay.order"),
            "/microservices/pay.order"
        );
    }

    #[test]
    fn test_ttl_seconds_floor() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(15)), 15);
    }
}
