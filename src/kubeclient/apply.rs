use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{pinned_kind, Scope};
use kube::ResourceExt;
use serde::Deserialize;

use super::{KubeClient, FIELD_MANAGER};

/// Splits `---`-separated multi-document YAML into JSON objects; empty
/// documents are dropped.
pub fn split_documents(yaml: &str) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        docs.push(serde_json::to_value(value)?);
    }
    Ok(docs)
}

impl KubeClient {
    /// Server-side apply of every document in a manifest, with a fixed field
    /// manager and forced conflict resolution. Applying the same manifest
    /// twice converges to the same cluster state.
    pub async fn apply(&self, yaml: &str, namespace: &str) -> anyhow::Result<()> {
        for doc in split_documents(yaml)? {
            self.apply_object(doc, namespace).await?;
        }
        Ok(())
    }

    /// Deletes every document in a manifest; a resource that is already gone
    /// is a success.
    pub async fn delete(&self, yaml: &str, namespace: &str) -> anyhow::Result<()> {
        for doc in split_documents(yaml)?.into_iter().rev() {
            self.delete_object(doc, namespace).await?;
        }
        Ok(())
    }

    pub async fn apply_multi(&self, docs: &[String], namespace: &str) -> anyhow::Result<()> {
        for doc in docs {
            self.apply(doc, namespace).await?;
        }
        Ok(())
    }

    /// Deletion runs in reverse document order so dependents go first.
    pub async fn delete_multi(&self, docs: &[String], namespace: &str) -> anyhow::Result<()> {
        for doc in docs.iter().rev() {
            self.delete(doc, namespace).await?;
        }
        Ok(())
    }

    async fn dynamic_api(
        &self,
        obj: &DynamicObject,
        namespace: &str,
    ) -> anyhow::Result<Api<DynamicObject>> {
        let types = obj
            .types
            .clone()
            .ok_or_else(|| anyhow::anyhow!("manifest object missing apiVersion/kind"))?;
        let gvk = GroupVersionKind::try_from(&types)?;
        let (resource, caps) = pinned_kind(&self.client(), &gvk).await?;

        Ok(if caps.scope == Scope::Namespaced {
            Api::namespaced_with(self.client(), namespace, &resource)
        } else {
            Api::all_with(self.client(), &resource)
        })
    }

    async fn apply_object(&self, doc: serde_json::Value, namespace: &str) -> anyhow::Result<()> {
        let obj: DynamicObject = serde_json::from_value(doc)?;
        let api = self.dynamic_api(&obj, namespace).await?;
        let name = obj.name_any();

        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&obj),
        )
        .await?;
        tracing::debug!(name = %name, namespace, "applied manifest object");
        Ok(())
    }

    async fn delete_object(&self, doc: serde_json::Value, namespace: &str) -> anyhow::Result<()> {
        let obj: DynamicObject = serde_json::from_value(doc)?;
        let api = self.dynamic_api(&obj, namespace).await?;
        let name = obj.name_any();

        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                tracing::debug!(name = %name, namespace, "deleted manifest object");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_documents_handles_separators() {
        let yaml = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: Service\nmetadata:\n  name: b\n";
        let docs = split_documents(yaml).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "ConfigMap");
        assert_eq!(docs[1]["kind"], "Service");
    }

    #[test]
    fn test_split_documents_skips_empty_documents() {
        let yaml = "---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\n";
        let docs = split_documents(yaml).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_split_documents_rejects_invalid_yaml() {
        assert!(split_documents("kind: [unclosed").is_err());
    }

    #[test]
    fn test_split_documents_parse_as_dynamic_objects() {
        let yaml = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: open5gs-upf1-000001\nspec:\n  replicas: 1\n";
        let docs = split_documents(yaml).unwrap();
        let obj: DynamicObject = serde_json::from_value(docs[0].clone()).unwrap();
        assert_eq!(obj.name_any(), "open5gs-upf1-000001");
        assert_eq!(obj.types.as_ref().unwrap().kind, "Deployment");
    }
}
