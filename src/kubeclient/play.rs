use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, Patch, PatchParams, PostParams};

use super::{KubeClient, FIELD_MANAGER};
use crate::types::Play;

impl KubeClient {
    /// Applies a Play to the slice's UPF deployment: resources, bandwidth
    /// annotations, scheduling, extra annotations, then the NetworkPolicy as
    /// its own object.
    pub async fn apply_play(&self, play: &Play, namespace: &str) -> anyhow::Result<()> {
        let name = format!("open5gs-upf{}", play.slice_id);
        let api: Api<Deployment> = Api::namespaced(self.client(), namespace);

        let mut deployment = api.get(&name).await?;
        apply_play_to_deployment(&mut deployment, play)?;
        api.replace(&name, &PostParams::default(), &deployment)
            .await?;
        tracing::info!(deployment = %name, namespace, "applied play to deployment");

        if let Some(policy) = &play.network_policy {
            self.apply_network_policy(policy, play, namespace).await?;
        }

        Ok(())
    }

    async fn apply_network_policy(
        &self,
        policy: &k8s_openapi::api::networking::v1::NetworkPolicy,
        play: &Play,
        namespace: &str,
    ) -> anyhow::Result<()> {
        let name = policy
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| format!("slice-networkpolicy-{}", play.slice_id));

        // Typed objects carry no TypeMeta; splice it in for server-side apply.
        let mut value = serde_json::to_value(policy)?;
        value["apiVersion"] = "networking.k8s.io/v1".into();
        value["kind"] = "NetworkPolicy".into();
        value["metadata"]["name"] = name.clone().into();

        let api: Api<k8s_openapi::api::networking::v1::NetworkPolicy> =
            Api::namespaced(self.client(), namespace);
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&value),
        )
        .await?;
        tracing::info!(policy = %name, namespace, "applied network policy");
        Ok(())
    }
}

/// Rewrites a UPF deployment in place from a Play. Merges are additive:
/// existing node-selector entries and pod annotations survive unless the Play
/// names the same key.
pub fn apply_play_to_deployment(deployment: &mut Deployment, play: &Play) -> anyhow::Result<()> {
    let spec = deployment
        .spec
        .as_mut()
        .ok_or_else(|| anyhow::anyhow!("deployment has no spec"))?;

    let pod_spec = spec
        .template
        .spec
        .as_mut()
        .ok_or_else(|| anyhow::anyhow!("deployment has no pod spec"))?;

    let container = pod_spec
        .containers
        .get_mut(0)
        .ok_or_else(|| anyhow::anyhow!("deployment has no containers"))?;

    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), Quantity(play.resources.cpu_request.clone()));
    requests.insert(
        "memory".to_string(),
        Quantity(play.resources.memory_request.clone()),
    );
    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_string(), Quantity(play.resources.cpu_limit.clone()));
    limits.insert(
        "memory".to_string(),
        Quantity(play.resources.memory_limit.clone()),
    );
    container.resources = Some(ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    });

    if !play.scheduling.scheduler_name.is_empty() {
        pod_spec.scheduler_name = Some(play.scheduling.scheduler_name.clone());
    }
    if !play.scheduling.node_name.is_empty() {
        pod_spec.node_name = Some(play.scheduling.node_name.clone());
    }
    let node_selector = pod_spec.node_selector.get_or_insert_with(BTreeMap::new);
    for (key, val) in &play.scheduling.node_selector {
        node_selector.insert(key.clone(), val.clone());
    }

    let metadata = spec.template.metadata.get_or_insert_with(Default::default);
    let annotations = metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(
        "kubernetes.io/ingress-bandwidth".to_string(),
        play.bandwidth.ingress.clone(),
    );
    annotations.insert(
        "kubernetes.io/egress-bandwidth".to_string(),
        play.bandwidth.egress.clone(),
    );
    for (key, val) in &play.annotations {
        annotations.insert(key.clone(), val.clone());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BandwidthSpec, ResourceSpec, SchedulingSpec};
    use serde_json::json;

    fn test_deployment() -> Deployment {
        serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "open5gs-upf1-000001"},
            "spec": {
                "selector": {"matchLabels": {"name": "upf1-000001"}},
                "template": {
                    "metadata": {
                        "labels": {"name": "upf1-000001"},
                        "annotations": {"existing": "kept"}
                    },
                    "spec": {
                        "nodeSelector": {"zone": "edge"},
                        "containers": [{"name": "upf", "image": "open5gs-upf"}]
                    }
                }
            }
        }))
        .unwrap()
    }

    fn test_play() -> Play {
        Play {
            id: None,
            slice_id: "1-000001".to_string(),
            resources: ResourceSpec {
                cpu_request: "500m".to_string(),
                cpu_limit: "1".to_string(),
                memory_request: "512Mi".to_string(),
                memory_limit: "1Gi".to_string(),
            },
            bandwidth: BandwidthSpec {
                ingress: "100M".to_string(),
                egress: "200M".to_string(),
            },
            priority: 0,
            scheduling: SchedulingSpec {
                scheduler_name: "default-scheduler".to_string(),
                node_name: String::new(),
                node_selector: [("tier".to_string(), "gold".to_string())].into(),
            },
            network_policy: None,
            annotations: [("qos-policy".to_string(), "ha-99.9".to_string())].into(),
        }
    }

    #[test]
    fn test_resources_overwritten() {
        let mut dep = test_deployment();
        apply_play_to_deployment(&mut dep, &test_play()).unwrap();

        let resources = dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .resources
            .as_ref()
            .unwrap();
        assert_eq!(resources.requests.as_ref().unwrap()["cpu"].0, "500m");
        assert_eq!(resources.requests.as_ref().unwrap()["memory"].0, "512Mi");
        assert_eq!(resources.limits.as_ref().unwrap()["cpu"].0, "1");
        assert_eq!(resources.limits.as_ref().unwrap()["memory"].0, "1Gi");
    }

    #[test]
    fn test_bandwidth_and_play_annotations_merged() {
        let mut dep = test_deployment();
        apply_play_to_deployment(&mut dep, &test_play()).unwrap();

        let annotations = dep
            .spec
            .as_ref()
            .unwrap()
            .template
            .metadata
            .as_ref()
            .unwrap()
            .annotations
            .as_ref()
            .unwrap();
        assert_eq!(annotations["kubernetes.io/ingress-bandwidth"], "100M");
        assert_eq!(annotations["kubernetes.io/egress-bandwidth"], "200M");
        assert_eq!(annotations["qos-policy"], "ha-99.9");
        // Keys the Play does not mention survive the merge.
        assert_eq!(annotations["existing"], "kept");
    }

    #[test]
    fn test_scheduling_merge_keeps_existing_selector_keys() {
        let mut dep = test_deployment();
        apply_play_to_deployment(&mut dep, &test_play()).unwrap();

        let pod_spec = dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod_spec.scheduler_name.as_deref(), Some("default-scheduler"));
        assert_eq!(pod_spec.node_name, None);

        let selector = pod_spec.node_selector.as_ref().unwrap();
        assert_eq!(selector["zone"], "edge");
        assert_eq!(selector["tier"], "gold");
    }

    #[test]
    fn test_node_name_set_when_given() {
        let mut dep = test_deployment();
        let mut play = test_play();
        play.scheduling.node_name = "worker-1".to_string();
        play.scheduling.node_selector.clear();
        apply_play_to_deployment(&mut dep, &play).unwrap();

        let pod_spec = dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod_spec.node_name.as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_deployment_without_containers_rejected() {
        let mut dep: Deployment = serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "open5gs-upf1-000001"},
            "spec": {
                "selector": {"matchLabels": {}},
                "template": {"spec": {"containers": []}}
            }
        }))
        .unwrap();
        assert!(apply_play_to_deployment(&mut dep, &test_play()).is_err());
    }
}
