use std::sync::Arc;

use async_trait::async_trait;

use super::ipam::{IpamError, IpamService};
use crate::render::Renderer;
use crate::store::{MongoStore, StoreError};
use crate::types::{AddressValue, Slice, SliceRecord};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("slice {0} already exists")]
    Conflict(String),
    #[error("slice {0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    BadInput(String),
    #[error("address allocation failed: {0}")]
    AllocFailure(#[source] IpamError),
    #[error("persistence failed: {0}")]
    StoreFailure(#[source] StoreError),
    #[error("rendering failed: {0}")]
    RenderFailure(#[source] anyhow::Error),
    #[error("cluster apply failed: {0}")]
    ApplyFailure(#[source] anyhow::Error),
    #[error("slice deletion incomplete: {0}")]
    DeleteFailure(String),
}

/// Persistence seam for the lifecycle saga.
#[async_trait]
pub trait SliceStore: Send + Sync {
    async fn create_slice(&self, record: SliceRecord) -> Result<SliceRecord, StoreError>;
    async fn get_slice_by_slice_id(&self, slice_id: &str) -> Result<SliceRecord, StoreError>;
    async fn delete_slice(&self, id: &str) -> Result<(), StoreError>;
    async fn create_manifests(
        &self,
        slice_id: &str,
        manifests: Vec<String>,
    ) -> Result<(), StoreError>;
    async fn get_manifests_by_slice_id(&self, slice_id: &str) -> Result<Vec<String>, StoreError>;
    async fn delete_manifests_by_slice_id(&self, slice_id: &str) -> Result<(), StoreError>;
}

/// IPAM seam for the lifecycle saga.
#[async_trait]
pub trait AddressAllocator: Send + Sync {
    async fn allocate_session_subnet(&self) -> Result<String, IpamError>;
    async fn allocate_n3_addr(&self) -> Result<String, IpamError>;
    async fn allocate_n4_addr(&self) -> Result<String, IpamError>;
    async fn release_session_subnet(&self, subnet: &str) -> Result<(), IpamError>;
    async fn release_n3_addr(&self, addr: &str) -> Result<(), IpamError>;
    async fn release_n4_addr(&self, addr: &str) -> Result<(), IpamError>;
}

/// Cluster seam for the lifecycle saga.
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    async fn apply_slice(&self, docs: &[String]) -> anyhow::Result<()>;
    async fn delete_slice(&self, docs: &[String]) -> anyhow::Result<()>;
}

#[async_trait]
impl SliceStore for MongoStore {
    async fn create_slice(&self, record: SliceRecord) -> Result<SliceRecord, StoreError> {
        MongoStore::create_slice(self, record).await
    }

    async fn get_slice_by_slice_id(&self, slice_id: &str) -> Result<SliceRecord, StoreError> {
        MongoStore::get_slice_by_slice_id(self, slice_id).await
    }

    async fn delete_slice(&self, id: &str) -> Result<(), StoreError> {
        MongoStore::delete_slice(self, id).await
    }

    async fn create_manifests(
        &self,
        slice_id: &str,
        manifests: Vec<String>,
    ) -> Result<(), StoreError> {
        MongoStore::create_manifests(self, slice_id, manifests).await?;
        Ok(())
    }

    async fn get_manifests_by_slice_id(&self, slice_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(MongoStore::get_manifests_by_slice_id(self, slice_id)
            .await?
            .manifests)
    }

    async fn delete_manifests_by_slice_id(&self, slice_id: &str) -> Result<(), StoreError> {
        MongoStore::delete_manifests_by_slice_id(self, slice_id).await
    }
}

#[async_trait]
impl AddressAllocator for IpamService {
    async fn allocate_session_subnet(&self) -> Result<String, IpamError> {
        IpamService::allocate_session_subnet(self).await
    }

    async fn allocate_n3_addr(&self) -> Result<String, IpamError> {
        IpamService::allocate_n3_addr(self).await
    }

    async fn allocate_n4_addr(&self) -> Result<String, IpamError> {
        IpamService::allocate_n4_addr(self).await
    }

    async fn release_session_subnet(&self, subnet: &str) -> Result<(), IpamError> {
        IpamService::release_session_subnet(self, subnet).await
    }

    async fn release_n3_addr(&self, addr: &str) -> Result<(), IpamError> {
        IpamService::release_n3_addr(self, addr).await
    }

    async fn release_n4_addr(&self, addr: &str) -> Result<(), IpamError> {
        IpamService::release_n4_addr(self, addr).await
    }
}

#[async_trait]
impl ManifestApplier for crate::kubeclient::KubeClient {
    async fn apply_slice(&self, docs: &[String]) -> anyhow::Result<()> {
        crate::kubeclient::KubeClient::apply_slice(self, docs).await
    }

    async fn delete_slice(&self, docs: &[String]) -> anyhow::Result<()> {
        crate::kubeclient::KubeClient::delete_slice(self, docs).await
    }
}

/// Undo steps for a partially executed create, run newest-first. A failing
/// compensation is logged and never masks the originating error.
enum Compensation {
    ReleaseAddresses(AddressValue),
    DeleteRecord(String),
    DeleteManifests(Vec<String>),
}

/// Orchestrates slice creation and deletion across the four owned resources:
/// IP allocations, the persisted record, the rendered manifests and the
/// applied cluster objects.
pub struct SliceLifecycle {
    store: Arc<dyn SliceStore>,
    ipam: Arc<dyn AddressAllocator>,
    renderer: Arc<Renderer>,
    cluster: Arc<dyn ManifestApplier>,
}

impl SliceLifecycle {
    pub fn new(
        store: Arc<dyn SliceStore>,
        ipam: Arc<dyn AddressAllocator>,
        renderer: Arc<Renderer>,
        cluster: Arc<dyn ManifestApplier>,
    ) -> Self {
        Self {
            store,
            ipam,
            renderer,
            cluster,
        }
    }

    /// Creates a slice end to end. Any failing stage rolls back every stage
    /// before it; a successful return means all four resources exist.
    pub async fn create(&self, slice: Slice) -> Result<SliceRecord, LifecycleError> {
        let slice_id = slice.slice_id();

        match self.store.get_slice_by_slice_id(&slice_id).await {
            Ok(_) => return Err(LifecycleError::Conflict(slice_id)),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(LifecycleError::StoreFailure(e)),
        }

        let mut compensations: Vec<Compensation> = Vec::new();

        // Stage 1: addresses.
        let mut address = AddressValue::default();
        if let Err(e) = self.fill_addresses(&slice, &mut address).await {
            self.release_addresses(&address).await;
            return Err(LifecycleError::AllocFailure(e));
        }
        compensations.push(Compensation::ReleaseAddresses(address.clone()));

        // Stage 2: persisted record.
        let record = match self
            .store
            .create_slice(SliceRecord::new(slice, address))
            .await
        {
            Ok(record) => record,
            Err(e) => {
                self.compensate(compensations).await;
                return Err(LifecycleError::StoreFailure(e));
            }
        };
        if let Some(id) = record.id {
            compensations.push(Compensation::DeleteRecord(id.to_hex()));
        }

        // Stage 3: rendered manifests.
        let docs = match self.renderer.render_slice(&record) {
            Ok(docs) => docs,
            Err(e) => {
                self.compensate(compensations).await;
                return Err(LifecycleError::RenderFailure(e));
            }
        };

        // Stage 4: applied cluster objects. Deleting a missing object is a
        // success, so a partial apply is cleaned by deleting everything.
        if let Err(e) = self.cluster.apply_slice(&docs).await {
            compensations.push(Compensation::DeleteManifests(docs));
            self.compensate(compensations).await;
            return Err(LifecycleError::ApplyFailure(e));
        }
        compensations.push(Compensation::DeleteManifests(docs.clone()));

        if let Err(e) = self.store.create_manifests(&slice_id, docs).await {
            self.compensate(compensations).await;
            return Err(LifecycleError::StoreFailure(e));
        }

        tracing::info!(slice_id = %slice_id, "slice created");
        Ok(record)
    }

    /// Tears a slice down. Cluster deletion failure aborts so addresses are
    /// not reused while workloads still hold them; release and record errors
    /// are joined and deletion continues.
    pub async fn delete(&self, slice_id: &str) -> Result<(), LifecycleError> {
        let record = match self.store.get_slice_by_slice_id(slice_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                return Err(LifecycleError::NotFound(slice_id.to_string()))
            }
            Err(StoreError::BadId(id)) => return Err(LifecycleError::BadInput(id)),
            Err(e) => return Err(LifecycleError::StoreFailure(e)),
        };

        // Prefer the manifests that were actually applied; re-render if the
        // record is gone.
        let docs = match self.store.get_manifests_by_slice_id(slice_id).await {
            Ok(docs) => docs,
            Err(_) => self
                .renderer
                .render_slice(&record)
                .map_err(LifecycleError::RenderFailure)?,
        };

        self.cluster
            .delete_slice(&docs)
            .await
            .map_err(LifecycleError::ApplyFailure)?;

        let mut errs = self.release_addresses(&record.address).await;

        if let Err(e) = self.store.delete_manifests_by_slice_id(slice_id).await {
            errs.push(format!("delete manifest record: {}", e));
        }
        if let Some(id) = record.id {
            if let Err(e) = self.store.delete_slice(&id.to_hex()).await {
                errs.push(format!("delete slice record: {}", e));
            }
        }

        if errs.is_empty() {
            tracing::info!(slice_id, "slice deleted");
            Ok(())
        } else {
            Err(LifecycleError::DeleteFailure(errs.join("; ")))
        }
    }

    /// One subnet per session, then the four host addresses. `address`
    /// accumulates what succeeded so the caller can release on failure.
    async fn fill_addresses(
        &self,
        slice: &Slice,
        address: &mut AddressValue,
    ) -> Result<(), IpamError> {
        for _ in &slice.sessions {
            let subnet = self.ipam.allocate_session_subnet().await?;
            address.session_subnets.push(subnet);
        }
        address.upf_n3_addr = self.ipam.allocate_n3_addr().await?;
        address.upf_n4_addr = self.ipam.allocate_n4_addr().await?;
        address.smf_n3_addr = self.ipam.allocate_n3_addr().await?;
        address.smf_n4_addr = self.ipam.allocate_n4_addr().await?;
        Ok(())
    }

    /// Best-effort release of whatever `address` holds; collected errors are
    /// returned for the caller to join or log. An already-released address is
    /// acceptable here.
    async fn release_addresses(&self, address: &AddressValue) -> Vec<String> {
        let mut errs = Vec::new();

        if !address.smf_n3_addr.is_empty() {
            if let Err(e) = self.ipam.release_n3_addr(&address.smf_n3_addr).await {
                record_release_error(&mut errs, "SMF N3", &address.smf_n3_addr, e);
            }
        }
        if !address.upf_n3_addr.is_empty() {
            if let Err(e) = self.ipam.release_n3_addr(&address.upf_n3_addr).await {
                record_release_error(&mut errs, "UPF N3", &address.upf_n3_addr, e);
            }
        }
        if !address.smf_n4_addr.is_empty() {
            if let Err(e) = self.ipam.release_n4_addr(&address.smf_n4_addr).await {
                record_release_error(&mut errs, "SMF N4", &address.smf_n4_addr, e);
            }
        }
        if !address.upf_n4_addr.is_empty() {
            if let Err(e) = self.ipam.release_n4_addr(&address.upf_n4_addr).await {
                record_release_error(&mut errs, "UPF N4", &address.upf_n4_addr, e);
            }
        }
        for subnet in &address.session_subnets {
            if let Err(e) = self.ipam.release_session_subnet(subnet).await {
                record_release_error(&mut errs, "session subnet", subnet, e);
            }
        }

        errs
    }

    /// Runs compensations LIFO. Failures are logged; the originating error
    /// has already been decided by the caller.
    async fn compensate(&self, compensations: Vec<Compensation>) {
        for compensation in compensations.into_iter().rev() {
            match compensation {
                Compensation::ReleaseAddresses(address) => {
                    for err in self.release_addresses(&address).await {
                        tracing::error!(error = %err, "rollback: address release failed");
                    }
                }
                Compensation::DeleteRecord(id) => {
                    if let Err(e) = self.store.delete_slice(&id).await {
                        tracing::error!(error = %e, id = %id, "rollback: record delete failed");
                    }
                }
                Compensation::DeleteManifests(docs) => {
                    if let Err(e) = self.cluster.delete_slice(&docs).await {
                        tracing::error!(error = %e, "rollback: manifest delete failed");
                    }
                }
            }
        }
    }
}

fn record_release_error(errs: &mut Vec<String>, what: &str, addr: &str, err: IpamError) {
    // Double releases happen when a rollback races a delete; not worth
    // surfacing.
    if matches!(err, IpamError::NotAllocated(_)) {
        tracing::debug!(addr, what, "release of unallocated address ignored");
        return;
    }
    errs.push(format!("release {} {}: {}", what, addr, err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use mongodb::bson::oid::ObjectId;
    use crate::types::{Ambr, Arp, BitRate, Qos, Session};

    #[derive(Default)]
    struct FakeStore {
        slices: Mutex<HashMap<String, SliceRecord>>,
        manifests: Mutex<HashMap<String, Vec<String>>>,
    }

    #[async_trait]
    impl SliceStore for FakeStore {
        async fn create_slice(&self, mut record: SliceRecord) -> Result<SliceRecord, StoreError> {
            record.id = Some(ObjectId::new());
            self.slices
                .lock()
                .unwrap()
                .insert(record.slice_id(), record.clone());
            Ok(record)
        }

        async fn get_slice_by_slice_id(&self, slice_id: &str) -> Result<SliceRecord, StoreError> {
            self.slices
                .lock()
                .unwrap()
                .get(slice_id)
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn delete_slice(&self, id: &str) -> Result<(), StoreError> {
            self.slices
                .lock()
                .unwrap()
                .retain(|_, r| r.id.map(|oid| oid.to_hex()) != Some(id.to_string()));
            Ok(())
        }

        async fn create_manifests(
            &self,
            slice_id: &str,
            manifests: Vec<String>,
        ) -> Result<(), StoreError> {
            self.manifests
                .lock()
                .unwrap()
                .insert(slice_id.to_string(), manifests);
            Ok(())
        }

        async fn get_manifests_by_slice_id(
            &self,
            slice_id: &str,
        ) -> Result<Vec<String>, StoreError> {
            self.manifests
                .lock()
                .unwrap()
                .get(slice_id)
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn delete_manifests_by_slice_id(&self, slice_id: &str) -> Result<(), StoreError> {
            self.manifests.lock().unwrap().remove(slice_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeIpam {
        live: Mutex<Vec<String>>,
        subnet_counter: AtomicUsize,
        n3_counter: AtomicUsize,
        n4_counter: AtomicUsize,
        fail_n4: AtomicBool,
    }

    impl FakeIpam {
        fn live_count(&self) -> usize {
            self.live.lock().unwrap().len()
        }

        async fn alloc(&self, value: String) -> Result<String, IpamError> {
            self.live.lock().unwrap().push(value.clone());
            Ok(value)
        }

        async fn release(&self, value: &str) -> Result<(), IpamError> {
            let mut live = self.live.lock().unwrap();
            match live.iter().position(|v| v == value) {
                Some(idx) => {
                    live.remove(idx);
                    Ok(())
                }
                None => Err(IpamError::NotAllocated(value.to_string())),
            }
        }
    }

    #[async_trait]
    impl AddressAllocator for FakeIpam {
        async fn allocate_session_subnet(&self) -> Result<String, IpamError> {
            let n = self.subnet_counter.fetch_add(1, Ordering::SeqCst);
            self.alloc(format!("10.{}.0.0/16", 40 + n)).await
        }

        async fn allocate_n3_addr(&self) -> Result<String, IpamError> {
            let n = self.n3_counter.fetch_add(1, Ordering::SeqCst);
            self.alloc(format!("10.10.3.{}/24", 3 + n)).await
        }

        async fn allocate_n4_addr(&self) -> Result<String, IpamError> {
            if self.fail_n4.load(Ordering::SeqCst) {
                return Err(IpamError::PoolExhausted("n4".to_string()));
            }
            let n = self.n4_counter.fetch_add(1, Ordering::SeqCst);
            self.alloc(format!("10.10.4.{}/24", 3 + n)).await
        }

        async fn release_session_subnet(&self, subnet: &str) -> Result<(), IpamError> {
            self.release(subnet).await
        }

        async fn release_n3_addr(&self, addr: &str) -> Result<(), IpamError> {
            self.release(addr).await
        }

        async fn release_n4_addr(&self, addr: &str) -> Result<(), IpamError> {
            self.release(addr).await
        }
    }

    #[derive(Default)]
    struct FakeCluster {
        applied: Mutex<Vec<String>>,
        fail_apply: AtomicBool,
    }

    #[async_trait]
    impl ManifestApplier for FakeCluster {
        async fn apply_slice(&self, docs: &[String]) -> anyhow::Result<()> {
            // Apply the first few documents, then fail, to model a partial
            // apply that rollback must clean up.
            if self.fail_apply.load(Ordering::SeqCst) {
                let mut applied = self.applied.lock().unwrap();
                applied.extend(docs.iter().take(2).cloned());
                anyhow::bail!("injected apply failure");
            }
            self.applied.lock().unwrap().extend(docs.iter().cloned());
            Ok(())
        }

        async fn delete_slice(&self, docs: &[String]) -> anyhow::Result<()> {
            let mut applied = self.applied.lock().unwrap();
            applied.retain(|doc| !docs.contains(doc));
            Ok(())
        }
    }

    struct Harness {
        store: Arc<FakeStore>,
        ipam: Arc<FakeIpam>,
        cluster: Arc<FakeCluster>,
        lifecycle: SliceLifecycle,
    }

    fn harness() -> Harness {
        let store = Arc::new(FakeStore::default());
        let ipam = Arc::new(FakeIpam::default());
        let cluster = Arc::new(FakeCluster::default());
        let lifecycle = SliceLifecycle::new(
            store.clone(),
            ipam.clone(),
            Arc::new(Renderer::with_defaults(1, "http://thanos:10902")),
            cluster.clone(),
        );
        Harness {
            store,
            ipam,
            cluster,
            lifecycle,
        }
    }

    fn test_slice(sessions: usize) -> Slice {
        Slice {
            sst: 1,
            sd: "000001".to_string(),
            default_indicator: true,
            sessions: (0..sessions)
                .map(|i| Session {
                    name: format!("dnn{}", i),
                    session_type: 1,
                    pcc_rules: vec![],
                    ambr: Ambr {
                        uplink: BitRate { value: 100, unit: 2 },
                        downlink: BitRate { value: 200, unit: 2 },
                    },
                    qos: Qos {
                        index: 9,
                        arp: Arp {
                            priority_level: 8,
                            pre_emption_capability: 1,
                            pre_emption_vulnerability: 1,
                        },
                        mbr: None,
                        gbr: None,
                    },
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_allocates_persists_and_applies() {
        let h = harness();
        let record = h.lifecycle.create(test_slice(2)).await.unwrap();

        assert!(record.id.is_some());
        assert_eq!(record.address.session_subnets.len(), 2);
        // 2 subnets + 2 N3 + 2 N4.
        assert_eq!(h.ipam.live_count(), 6);
        assert_eq!(h.cluster.applied.lock().unwrap().len(), 5);
        assert!(h.store.slices.lock().unwrap().contains_key("1-000001"));
        assert!(h.store.manifests.lock().unwrap().contains_key("1-000001"));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_slice_id() {
        let h = harness();
        h.lifecycle.create(test_slice(1)).await.unwrap();
        let err = h.lifecycle.create(test_slice(1)).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_allocation_failure_releases_partial_allocations() {
        let h = harness();
        h.ipam.fail_n4.store(true, Ordering::SeqCst);

        let err = h.lifecycle.create(test_slice(2)).await.unwrap_err();
        assert!(matches!(err, LifecycleError::AllocFailure(_)));
        assert_eq!(h.ipam.live_count(), 0);
        assert!(h.store.slices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_failure_rolls_back_everything() {
        let h = harness();
        h.cluster.fail_apply.store(true, Ordering::SeqCst);

        let err = h.lifecycle.create(test_slice(1)).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ApplyFailure(_)));

        // Pre-create state: no live allocations, no record, no residue.
        assert_eq!(h.ipam.live_count(), 0);
        assert!(h.store.slices.lock().unwrap().is_empty());
        assert!(h.cluster.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_delete_restores_pre_create_state() {
        let h = harness();
        h.lifecycle.create(test_slice(2)).await.unwrap();
        h.lifecycle.delete("1-000001").await.unwrap();

        assert_eq!(h.ipam.live_count(), 0);
        assert!(h.store.slices.lock().unwrap().is_empty());
        assert!(h.store.manifests.lock().unwrap().is_empty());
        assert!(h.cluster.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_slice_is_not_found() {
        let h = harness();
        let err = h.lifecycle.delete("2-000002").await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }
}
