use std::sync::Arc;

use super::Backend;

/// A metrics backend and a logs backend, exposed through separate accessors.
/// Either side may be absent.
#[derive(Clone, Default)]
pub struct CombinedBackend {
    metrics: Option<Arc<dyn Backend>>,
    logs: Option<Arc<dyn Backend>>,
}

impl CombinedBackend {
    pub fn new(metrics: Option<Arc<dyn Backend>>, logs: Option<Arc<dyn Backend>>) -> Self {
        Self { metrics, logs }
    }

    pub fn metrics(&self) -> Option<&Arc<dyn Backend>> {
        self.metrics.as_ref()
    }

    pub fn logs(&self) -> Option<&Arc<dyn Backend>> {
        self.logs.as_ref()
    }

    /// Names of the configured backends, metrics first.
    pub fn names(&self) -> Vec<String> {
        self.metrics
            .iter()
            .chain(self.logs.iter())
            .map(|b| b.name().to_string())
            .collect()
    }
}

impl std::fmt::Debug for CombinedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinedBackend")
            .field("metrics", &self.metrics.as_ref().map(|b| b.name().to_string()))
            .field("logs", &self.logs.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}
