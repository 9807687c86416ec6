use std::sync::Arc;

use orgtree_core::repositories::HierarchyStore;
use orgtree_core::services::HierarchyService;
use orgtree_shared::config::AppSettings;

pub struct AppState<S: HierarchyStore> {
    pub service: Arc<HierarchyService<S>>,
    pub app: AppSettings,
}

impl<S: HierarchyStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            app: self.app.clone(),
        }
    }
}
