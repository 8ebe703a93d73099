//! kube-deploy - Kubernetes 部署命令行
//!
//! Usage:
//!   kube-deploy -w blog.json -k prod.kubeconfig deploy
//!   kube-deploy -w blog.json -k prod.kubeconfig -c creds.json chart-deploy
//!   kube-deploy -w blog.json -k prod.kubeconfig logs --tail 200
//!   kube-deploy -w blog.json render

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kube_deploy_core::domain::deploy::DeployOptions;
use kube_deploy_core::domain::registry::CredentialInput;
use kube_deploy_core::domain::workload::{Cluster, Workload};
use kube_deploy_core::{AppState, KubeDeployer, OpResult};

#[derive(Parser)]
#[command(name = "kube-deploy", version)]
#[command(about = "Deploy workloads to Kubernetes with kubectl and helm", long_about = None)]
struct Cli {
    /// Workload definition (JSON)
    #[arg(short, long, value_name = "FILE")]
    workload: PathBuf,

    /// Kubeconfig to bind the workload to; overrides any cluster in the workload file
    #[arg(short, long, value_name = "FILE")]
    kubeconfig: Option<PathBuf>,

    /// Cluster name used in logs and errors
    #[arg(long, default_value = "default")]
    cluster_name: String,

    /// Registry credentials to register before running (JSON array)
    #[arg(short, long, value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// Deploy options (JSON)
    #[arg(short, long, value_name = "FILE")]
    options: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply raw manifests and wait for the rollout
    Deploy,
    /// Install or upgrade the generated helm chart
    ChartDeploy,
    /// Delete the workload namespace
    Teardown,
    /// Set the deployment replica count
    Scale {
        replicas: u32,
    },
    /// List pods
    Pods,
    /// Load balancer and ingress endpoints
    Endpoints,
    /// Deployment logs, or one pod's logs with --pod
    Logs {
        #[arg(long)]
        pod: Option<String>,
        #[arg(long)]
        tail: Option<u32>,
    },
    /// Recent namespace events
    Events {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Pod cpu / memory usage
    Top,
    /// Run a shell command in a pod
    Exec {
        #[arg(long)]
        pod: Option<String>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Print the manifests as multi-document YAML
    Render,
    /// Write the helm chart to a directory
    Chart {
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_workload(cli: &Cli) -> Result<Workload> {
    let mut workload: Workload = read_json(&cli.workload)?;
    if let Some(ref path) = cli.kubeconfig {
        let kubeconfig = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        workload.cluster = Some(Cluster {
            id: cli.cluster_name.clone(),
            name: cli.cluster_name.clone(),
            kubeconfig,
        });
    }
    Ok(workload)
}

/// Print the envelope and report whether it succeeded
fn report<T: Serialize>(result: &OpResult<T>) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(result.success)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kube_deploy_core=info,kube_deploy=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let workload = load_workload(&cli)?;
    let options: DeployOptions = match cli.options {
        Some(ref path) => read_json(path)?,
        None => DeployOptions::default(),
    };

    let deployer = KubeDeployer::new(Arc::new(AppState::from_env()));
    if let Some(ref path) = cli.credentials {
        let inputs: Vec<CredentialInput> = read_json(path)?;
        for input in &inputs {
            deployer.store_credential(&workload, input).await?;
        }
        tracing::info!(count = inputs.len(), "Registry credentials registered");
    }

    let success = match cli.command {
        Commands::Deploy => report(&deployer.deploy(&workload, &options).await?)?,
        Commands::ChartDeploy => report(&deployer.deploy_via_chart(&workload, &options).await?)?,
        Commands::Teardown => report(&deployer.teardown(&workload).await?)?,
        Commands::Scale { replicas } => report(&deployer.scale(&workload, replicas).await?)?,
        Commands::Pods => report(&deployer.pods(&workload).await)?,
        Commands::Endpoints => report(&deployer.service_endpoints(&workload).await)?,
        Commands::Logs { pod: Some(pod), tail } => {
            let result = deployer.pod_logs(&workload, &pod, tail).await;
            print!("{}", result.payload);
            if !result.success {
                eprintln!("{}", result.diagnostic);
            }
            result.success
        }
        Commands::Logs { pod: None, tail } => {
            let result = deployer.logs(&workload, tail).await;
            print!("{}", result.payload);
            if !result.success {
                eprintln!("{}", result.diagnostic);
            }
            result.success
        }
        Commands::Events { limit } => report(&deployer.events(&workload, limit).await)?,
        Commands::Top => report(&deployer.resource_usage(&workload).await)?,
        Commands::Exec { pod, command } => {
            let command = command.join(" ");
            report(&deployer.exec_in_pod(&workload, &command, pod.as_deref()).await?)?
        }
        Commands::Render => {
            let manifests = deployer.render_manifests(&workload, &options).await?;
            print!("{}", manifests.to_multi_document_yaml()?);
            true
        }
        Commands::Chart { out } => {
            if out.exists() && std::fs::read_dir(&out)?.next().is_some() {
                bail!("{} is not empty", out.display());
            }
            let package = deployer.build_chart(&workload, &options).await?;
            package.write_to(&out)?;
            println!("Chart written to {} (templates: {})", out.display(), package.active_templates().join(", "));
            true
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
