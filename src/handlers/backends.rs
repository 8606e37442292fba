use axum::{Json, extract::State};

use crate::AppState;
use crate::factory::BackendType;
use crate::models::api::{BackendTypeInfo, BackendsResponse};

pub async fn list_backends(State(state): State<AppState>) -> Json<BackendsResponse> {
    let stack = state.orchestrator.stack();
    Json(BackendsResponse {
        active: stack.backend_type().to_string(),
        configured: stack.backends().names(),
        cache_enabled: stack.is_cached(),
        supported: BackendType::ALL
            .iter()
            .map(|t| BackendTypeInfo {
                backend_type: t.as_str().to_string(),
                description: t.describe().to_string(),
            })
            .collect(),
    })
}
