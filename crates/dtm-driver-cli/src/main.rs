//! `dtm-driver` - register a service, split method URIs or resolve targets
//! with the kratos registry driver.

mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dtm_driver_common::{DriverRegistry, POD_IP_ENV, TransactionDriver};
use dtm_driver_kratos::{DRIVER_NAME, DriverConfig, KratosDriver, PodIp};
use dtm_driver_registry::ResolverRegistry;
use dtm_driver_registry::polaris::DEFAULT_CONFIG_PATH;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "dtm-driver", version, about)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level", env = "DTM_DRIVER_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register this process under a target and stay registered until Ctrl-C
    Register {
        /// e.g. etcd://127.0.0.1:2379/pay.order
        target: String,

        /// Accepted for compatibility, the advertised endpoint comes from the pod IP
        #[arg(long, default_value = "")]
        endpoint: String,

        #[arg(long = "pod-ip", env = POD_IP_ENV)]
        pod_ip: Option<String>,

        #[arg(long = "polaris-config", default_value = DEFAULT_CONFIG_PATH)]
        polaris_config: PathBuf,
    },

    /// Split a method URI into server and method
    Parse { uri: String },

    /// Resolve a target such as direct:///a:1,b:2 into addresses
    Resolve { target: String },
}

impl Command {
    fn driver_config(pod_ip: Option<String>, polaris_config: PathBuf) -> DriverConfig {
        let pod_ip = pod_ip.map(PodIp::Fixed).unwrap_or_default();
        DriverConfig::new()
            .with_pod_ip(pod_ip)
            .with_polaris_config_path(polaris_config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level)?;

    dtm_driver_kratos::install();
    let drivers = DriverRegistry::global();
    drivers.use_driver(DRIVER_NAME)?;

    match cli.command {
        Command::Register {
            target,
            endpoint,
            pod_ip,
            polaris_config,
        } => {
            // The installed driver reads POD_IP and ./polaris.yaml; the flags
            // need their own instance over the same global resolvers.
            let driver = KratosDriver::with_config(Command::driver_config(pod_ip, polaris_config));
            driver.register_service(&target, &endpoint).await?;
            info!(
                "Registered {} as {}, press Ctrl-C to exit",
                target,
                driver.advertised_endpoint()
            );
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
        }
        Command::Parse { uri } => {
            let driver = drivers
                .current()
                .ok_or_else(|| anyhow::anyhow!("no dtm driver selected"))?;
            let (server, method) = driver.parse_server_method(&uri)?;
            println!("server: {}", server);
            println!("method: {}", method);
        }
        Command::Resolve { target } => {
            for address in ResolverRegistry::global().resolve(&target).await? {
                println!("{}", address);
            }
        }
    }
    Ok(())
}
