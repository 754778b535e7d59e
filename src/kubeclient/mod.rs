use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use kube::api::{Api, ListParams, ObjectMeta, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::config::KubeConfig;

mod apply;
mod play;

pub use apply::split_documents;
pub use play::apply_play_to_deployment;

pub const FIELD_MANAGER: &str = "slicer";

/// Cluster access for slice workloads and monitoring artifacts: typed core
/// reads plus untyped apply/delete of rendered manifests.
pub struct KubeClient {
    client: kube::Client,
    namespace: String,
    monitor_namespace: String,
}

impl KubeClient {
    /// An explicit kubeconfig path wins; otherwise fall back to the inferred
    /// configuration (KUBECONFIG, `~/.kube/config`, then in-cluster).
    pub async fn new(config: &KubeConfig) -> anyhow::Result<Self> {
        let kube_config = if !config.kubeconfig_path.is_empty() {
            let kubeconfig = Kubeconfig::read_from(&config.kubeconfig_path)?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await?
        } else {
            kube::Config::infer().await?
        };

        Ok(Self {
            client: kube::Client::try_from(kube_config)?,
            namespace: config.namespace.clone(),
            monitor_namespace: config.monitor_namespace.clone(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn monitor_namespace(&self) -> &str {
        &self.monitor_namespace
    }

    pub(crate) fn client(&self) -> kube::Client {
        self.client.clone()
    }

    pub async fn get_pods(
        &self,
        namespace: &str,
        label_selectors: &[&str],
    ) -> anyhow::Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client(), namespace);
        let list = api.list(&list_params(label_selectors)).await?;
        Ok(list.items)
    }

    pub async fn get_services(
        &self,
        namespace: &str,
        label_selectors: &[&str],
    ) -> anyhow::Result<Vec<Service>> {
        let api: Api<Service> = Api::namespaced(self.client(), namespace);
        let list = api.list(&list_params(label_selectors)).await?;
        Ok(list.items)
    }

    pub async fn get_deployments(
        &self,
        namespace: &str,
        label_selectors: &[&str],
    ) -> anyhow::Result<Vec<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client(), namespace);
        let list = api.list(&list_params(label_selectors)).await?;
        Ok(list.items)
    }

    pub async fn ensure_namespace(&self, name: &str) -> anyhow::Result<()> {
        let api: Api<Namespace> = Api::all(self.client());
        if api.get_opt(name).await?.is_some() {
            return Ok(());
        }

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &ns).await?;
        tracing::info!(namespace = name, "created namespace");
        Ok(())
    }

    /// Both workload and monitoring namespaces must exist before anything is
    /// applied into them.
    pub async fn bootstrap_namespaces(&self) -> anyhow::Result<()> {
        let namespaces = [self.namespace.clone(), self.monitor_namespace.clone()];
        tokio::time::timeout(Duration::from_secs(60), async {
            for ns in &namespaces {
                self.ensure_namespace(ns).await?;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await
        .map_err(|_| anyhow::anyhow!("namespace bootstrap timed out"))?
    }

    // Rendered-manifest wrappers, bound to their namespaces.

    pub async fn apply_slice(&self, docs: &[String]) -> anyhow::Result<()> {
        self.apply_multi(docs, &self.namespace).await
    }

    pub async fn delete_slice(&self, docs: &[String]) -> anyhow::Result<()> {
        self.delete_multi(docs, &self.namespace).await
    }

    pub async fn apply_mde(&self, yaml: &str) -> anyhow::Result<()> {
        self.apply(yaml, &self.monitor_namespace).await
    }

    pub async fn delete_mde(&self, yaml: &str) -> anyhow::Result<()> {
        self.delete(yaml, &self.monitor_namespace).await
    }

    pub async fn apply_kpic(&self, yaml: &str) -> anyhow::Result<()> {
        self.apply(yaml, &self.monitor_namespace).await
    }

    pub async fn delete_kpic(&self, yaml: &str) -> anyhow::Result<()> {
        self.delete(yaml, &self.monitor_namespace).await
    }
}

fn list_params(label_selectors: &[&str]) -> ListParams {
    if label_selectors.is_empty() {
        ListParams::default()
    } else {
        ListParams::default().labels(&label_selectors.join(","))
    }
}
