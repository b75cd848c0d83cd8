//! Samtest Kubernetes Operator binary.
//!
//! Watches Samtest custom resources together with the Deployments and
//! Services they own, and reconciles them.

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::Controller;
use kube::runtime::events::Reporter;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, CustomResourceExt};
use samtest_operator::OperatorConfig;
use samtest_operator::controller::{
    ControllerContext, KubeClusterClient, SamtestController, error_policy, reconcile,
};
use samtest_operator::crd::Samtest;
use samtest_operator::observability::{TracingConfig, init_tracing};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Check for CRD generation mode
    if std::env::args().any(|arg| arg == "--generate-crds") {
        generate_crds()?;
        return Ok(());
    }

    init_tracing(&TracingConfig::from_env())?;
    let config = OperatorConfig::from_env()?;

    tracing::info!(
        controller = %config.controller_name,
        namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        "Starting Samtest operator"
    );

    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    run_controller(client, config).await
}

/// Run the Samtest controller until shutdown.
async fn run_controller(client: Client, config: OperatorConfig) -> anyhow::Result<()> {
    let reporter = Reporter {
        controller: config.controller_name.clone(),
        instance: config.instance.clone(),
    };
    let cluster = Arc::new(KubeClusterClient::new(
        client.clone(),
        reporter,
        config.controller_name.clone(),
    ));
    let controller = SamtestController::new(cluster).with_resync(config.resync);
    let ctx = Arc::new(ControllerContext::new(controller, config.error_requeue));

    let (samtests, deployments, services) = match config.watch_namespace.as_deref() {
        Some(ns) => (
            Api::<Samtest>::namespaced(client.clone(), ns),
            Api::<Deployment>::namespaced(client.clone(), ns),
            Api::<Service>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<Samtest>::all(client.clone()),
            Api::<Deployment>::all(client.clone()),
            Api::<Service>::all(client.clone()),
        ),
    };

    Controller::new(samtests, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default())
        .owns(services, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            reconcile::<KubeClusterClient>,
            error_policy::<KubeClusterClient>,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(
                        samtest = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or_default(),
                        ?action,
                        "Reconciled Samtest"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Samtest controller stream error");
                }
            }
        })
        .await;

    tracing::info!("Samtest controller stopped");
    Ok(())
}

/// Generate CRD YAML.
fn generate_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&Samtest::crd())?);
    Ok(())
}
