use std::sync::Arc;

use crate::config::Config;
use crate::controller::Controller;
use crate::kubeclient::KubeClient;
use crate::render::Renderer;
use crate::services::lifecycle::SliceLifecycle;
use crate::services::monarch::MonarchClient;
use crate::store::MongoStore;

/// Shared handler state; everything in here is immutable or internally
/// synchronized.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<MongoStore>,
    pub kube: Arc<KubeClient>,
    pub renderer: Arc<Renderer>,
    pub monarch: Arc<MonarchClient>,
    pub lifecycle: Arc<SliceLifecycle>,
    pub controller: Arc<Controller>,
}
