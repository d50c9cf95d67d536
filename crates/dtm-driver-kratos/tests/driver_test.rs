//! Driver registration tests with recording registry backends

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dtm_driver_common::{DriverRegistry, ServiceInstance, TransactionDriver};
use dtm_driver_kratos::{
    DRIVER_NAME, DriverConfig, DriverError, KratosDriver, PodIp, RegistryFactory,
    parse_server_method,
};
use dtm_driver_registry::{
    PolarisConfigError, PolarisRegistryPolicy, RegistryError, ResolverRegistry, ServiceRegistry,
};
use parking_lot::Mutex;

/// Registry that stores registered instances in memory
#[derive(Default)]
struct RecordingRegistry {
    kind: &'static str,
    instances: Mutex<Vec<ServiceInstance>>,
    fail: bool,
}

#[async_trait]
impl ServiceRegistry for RecordingRegistry {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn register(&self, instance: &ServiceInstance) -> dtm_driver_registry::Result<()> {
        if self.fail {
            return Err(RegistryError::RequestFailed {
                status: 500,
                body: "rejected".to_string(),
            });
        }
        self.instances.lock().push(instance.clone());
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> dtm_driver_registry::Result<()> {
        self.instances.lock().retain(|i| i.id != instance.id);
        Ok(())
    }

    async fn get_service(&self, name: &str) -> dtm_driver_registry::Result<Vec<ServiceInstance>> {
        Ok(self
            .instances
            .lock()
            .iter()
            .filter(|i| i.name == name)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Etcd(Vec<String>),
    Consul(String),
    Polaris(PathBuf, PolarisRegistryPolicy),
}

/// Factory recording constructor arguments and handing out one shared registry
#[derive(Default)]
struct RecordingFactory {
    calls: Mutex<Vec<Call>>,
    registries: Mutex<Vec<Arc<RecordingRegistry>>>,
    fail_register: bool,
}

impl RecordingFactory {
    fn failing() -> Self {
        Self {
            fail_register: true,
            ..Default::default()
        }
    }

    fn build(&self, kind: &'static str) -> Arc<dyn ServiceRegistry> {
        let registry = Arc::new(RecordingRegistry {
            kind,
            fail: self.fail_register,
            ..Default::default()
        });
        self.registries.lock().push(registry.clone());
        registry
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn registered(&self) -> Vec<ServiceInstance> {
        self.registries
            .lock()
            .iter()
            .flat_map(|r| r.instances.lock().clone())
            .collect()
    }
}

#[async_trait]
impl RegistryFactory for RecordingFactory {
    async fn etcd(
        &self,
        endpoints: Vec<String>,
    ) -> Result<Arc<dyn ServiceRegistry>, RegistryError> {
        self.calls.lock().push(Call::Etcd(endpoints));
        Ok(self.build("etcd"))
    }

    fn consul(&self, address: &str) -> Result<Arc<dyn ServiceRegistry>, RegistryError> {
        self.calls.lock().push(Call::Consul(address.to_string()));
        if address.is_empty() {
            return Err(RegistryError::InvalidAddress(address.to_string()));
        }
        Ok(self.build("consul"))
    }

    fn polaris(
        &self,
        config_path: &Path,
        policy: PolarisRegistryPolicy,
    ) -> Result<Arc<dyn ServiceRegistry>, PolarisConfigError> {
        self.calls
            .lock()
            .push(Call::Polaris(config_path.to_path_buf(), policy));
        Ok(self.build("polaris"))
    }
}

struct Fixture {
    driver: KratosDriver,
    resolvers: Arc<ResolverRegistry>,
    factory: Arc<RecordingFactory>,
}

fn fixture_with(config: DriverConfig, factory: RecordingFactory) -> Fixture {
    let resolvers = Arc::new(ResolverRegistry::new());
    let factory = Arc::new(factory);
    let driver = KratosDriver::with_parts(config, resolvers.clone(), factory.clone());
    Fixture {
        driver,
        resolvers,
        factory,
    }
}

fn fixture() -> Fixture {
    fixture_with(
        DriverConfig::new().with_pod_ip(PodIp::Fixed("10.0.0.5".to_string())),
        RecordingFactory::default(),
    )
}

fn panic_on_fatal(err: &PolarisConfigError) -> ! {
    panic!("fatal polaris config: {}", err)
}

#[tokio::test]
async fn test_etcd_receives_every_host() {
    for scheme in ["etcd", "discovery"] {
        let f = fixture();
        let target = format!("{}://h1:2379,h2:2379/pay.order", scheme);
        f.driver.register_service(&target, "").await.unwrap();

        assert_eq!(
            f.factory.calls(),
            vec![Call::Etcd(vec![
                "h1:2379".to_string(),
                "h2:2379".to_string()
            ])]
        );
        let registered = f.factory.registered();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].name, "pay.order");
        assert!(!registered[0].id.is_empty());
    }
}

#[tokio::test]
async fn test_target_is_unescaped_and_userinfo_dropped() {
    let f = fixture();
    f.driver
        .register_service("etcd://u:p@h1:2379,h2:2379/pay%2Eorder", "")
        .await
        .unwrap();

    assert_eq!(
        f.factory.calls(),
        vec![Call::Etcd(vec![
            "h1:2379".to_string(),
            "h2:2379".to_string()
        ])]
    );
    assert_eq!(f.factory.registered()[0].name, "pay.order");
}

#[tokio::test]
async fn test_invalid_escape_is_parse_error() {
    let f = fixture();
    let err = f
        .driver
        .register_service("etcd://h:2379/%zz", "")
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Parse { .. }));
    assert!(f.factory.calls().is_empty());
    assert!(f.resolvers.is_empty());
}

#[tokio::test]
async fn test_consul_uses_first_host() {
    let f = fixture();
    f.driver
        .register_service("consul://c1:8500,c2:8500/pay.order", "")
        .await
        .unwrap();
    assert_eq!(f.factory.calls(), vec![Call::Consul("c1:8500".to_string())]);
}

#[tokio::test]
async fn test_polaris_uses_fixed_policy() {
    let f = fixture_with(
        DriverConfig::new()
            .with_pod_ip(PodIp::Fixed("10.0.0.5".to_string()))
            .with_polaris_config_path("/etc/dtm/polaris.yaml"),
        RecordingFactory::default(),
    );
    f.driver
        .register_service("polaris://p:8090/pay.order", "")
        .await
        .unwrap();

    let calls = f.factory.calls();
    let Call::Polaris(path, policy) = &calls[0] else {
        panic!("unexpected call: {:?}", calls);
    };
    assert_eq!(path, &PathBuf::from("/etc/dtm/polaris.yaml"));
    assert_eq!(policy.namespace, "go");
    assert_eq!(policy.timeout, std::time::Duration::from_secs(1));
    assert!(policy.healthy);
    assert!(!policy.isolate);
    assert_eq!(policy.retry_count, 3);
    assert_eq!(policy.weight, 100);
    assert_eq!(policy.ttl, 3);
}

#[tokio::test]
async fn test_endpoint_argument_is_ignored() {
    for target in [
        "etcd://h1:2379/svc",
        "consul://c:8500/svc",
        "polaris://p:8090/svc",
    ] {
        let f = fixture();
        f.driver
            .register_service(target, "ignored-value")
            .await
            .unwrap();
        let registered = f.factory.registered();
        assert_eq!(registered[0].endpoints, vec!["grpc://10.0.0.5:36790"]);
    }
}

#[tokio::test]
async fn test_pod_ip_read_from_env_at_call_time() {
    let var = "DTM_DRIVER_KRATOS_TEST_POD_IP";
    let f = fixture_with(
        DriverConfig::new().with_pod_ip(PodIp::Env(var.to_string())),
        RecordingFactory::default(),
    );

    f.driver.register_service("etcd://h/a", "").await.unwrap();
    // SAFETY: the variable name is unique to this test
    unsafe { std::env::set_var(var, "10.0.0.5") };
    f.driver.register_service("etcd://h/b", "").await.unwrap();
    unsafe { std::env::remove_var(var) };

    let endpoints: Vec<String> = f
        .factory
        .registered()
        .into_iter()
        .flat_map(|i| i.endpoints)
        .collect();
    assert_eq!(endpoints, vec!["grpc://:36790", "grpc://10.0.0.5:36790"]);
}

#[tokio::test]
async fn test_unknown_scheme_has_no_side_effects() {
    let f = fixture();
    let err = f
        .driver
        .register_service("zookeeper://z:2181/svc", "")
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::UnknownScheme(ref s) if s == "zookeeper"));
    assert_eq!(err.to_string(), "unknown scheme: zookeeper");
    assert!(f.factory.calls().is_empty());
    assert!(f.resolvers.is_empty());
}

#[tokio::test]
async fn test_empty_target_is_noop() {
    let f = fixture();
    f.driver.register_service("", "anything").await.unwrap();
    assert!(f.factory.calls().is_empty());
    assert!(f.resolvers.is_empty());
}

#[tokio::test]
async fn test_each_registration_adds_a_resolver() {
    let f = fixture();
    f.driver
        .register_service("etcd://h1:2379/pay.order", "")
        .await
        .unwrap();
    f.driver
        .register_service("consul://c:8500/pay.refund", "")
        .await
        .unwrap();

    assert_eq!(f.resolvers.schemes(), vec!["discovery", "discovery"]);

    // The latest binding resolves through the Consul backend
    let addresses = f.resolvers.resolve("discovery:///pay.refund").await.unwrap();
    assert_eq!(addresses, vec!["10.0.0.5:36790"]);
    let addresses = f.resolvers.resolve("discovery:///pay.order").await.unwrap();
    assert!(addresses.is_empty());

    let bindings = f.resolvers.bindings();
    assert!(bindings.iter().all(|b| b.insecure()));
}

#[tokio::test]
async fn test_connection_setup_error_is_returned() {
    let f = fixture();
    let err = f
        .driver
        .register_service("consul:///svc", "")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DriverError::ConnectionSetup(RegistryError::InvalidAddress(_))
    ));
    assert!(f.resolvers.is_empty());
}

#[tokio::test]
async fn test_registration_error_is_returned_verbatim() {
    let f = fixture_with(
        DriverConfig::new().with_pod_ip(PodIp::Fixed("10.0.0.5".to_string())),
        RecordingFactory::failing(),
    );
    let err = f
        .driver
        .register_service("etcd://h1:2379/svc", "")
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::Registration(_)));
    assert_eq!(
        err.to_string(),
        RegistryError::RequestFailed {
            status: 500,
            body: "rejected".to_string()
        }
        .to_string()
    );
}

#[tokio::test]
#[should_panic(expected = "fatal polaris config")]
async fn test_missing_polaris_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let driver = KratosDriver::with_parts(
        DriverConfig::new()
            .with_polaris_config_path(dir.path().join("polaris.yaml"))
            .with_fatal_handler(panic_on_fatal),
        Arc::new(ResolverRegistry::new()),
        Arc::new(dtm_driver_kratos::DefaultRegistryFactory),
    );
    let _ = driver.register_service("polaris://p:8090/svc", "").await;
}

#[tokio::test]
#[should_panic(expected = "fatal polaris config")]
async fn test_malformed_polaris_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("polaris.yaml");
    std::fs::write(&path, "global: [unclosed").unwrap();

    let driver = KratosDriver::with_parts(
        DriverConfig::new()
            .with_polaris_config_path(path)
            .with_fatal_handler(panic_on_fatal),
        Arc::new(ResolverRegistry::new()),
        Arc::new(dtm_driver_kratos::DefaultRegistryFactory),
    );
    let _ = driver.register_service("polaris://p:8090/svc", "").await;
}

#[tokio::test]
#[should_panic(expected = "fatal polaris config")]
async fn test_unsupported_polaris_protocol_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("polaris.yaml");
    std::fs::write(
        &path,
        "global:\n  serverConnector:\n    protocol: grpc\n    addresses:\n      - 127.0.0.1:8091\n",
    )
    .unwrap();

    let driver = KratosDriver::with_parts(
        DriverConfig::new()
            .with_polaris_config_path(path)
            .with_fatal_handler(panic_on_fatal),
        Arc::new(ResolverRegistry::new()),
        Arc::new(dtm_driver_kratos::DefaultRegistryFactory),
    );
    let _ = driver.register_service("polaris://p:8090/svc", "").await;
}

#[test]
fn test_parse_server_method_examples() {
    assert_eq!(
        parse_server_method("svcA/doThing").unwrap(),
        ("svcA".to_string(), "/doThing".to_string())
    );
    assert!(matches!(
        parse_server_method("nodash"),
        Err(DriverError::BadMethodUri(_))
    ));
    assert_eq!(
        parse_server_method("discovery://etcdhost:2379/svcA/doThing").unwrap(),
        (
            "discovery://etcdhost:2379/svcA".to_string(),
            "/doThing".to_string()
        )
    );
    assert_eq!(
        parse_server_method("not a valid url://").unwrap(),
        (String::new(), String::new())
    );
}

#[tokio::test]
async fn test_install_registers_driver_once() {
    dtm_driver_kratos::install();
    dtm_driver_kratos::install();

    let registry = DriverRegistry::global();
    let driver = registry.get(DRIVER_NAME).unwrap();
    assert_eq!(driver.name(), "dtm-driver-kratos2");
    assert_eq!(
        registry.names().iter().filter(|n| *n == DRIVER_NAME).count(),
        1
    );

    registry.use_driver(DRIVER_NAME).unwrap();
    assert_eq!(registry.current().unwrap().name(), DRIVER_NAME);
    driver.register_service("", "").await.unwrap();
}
