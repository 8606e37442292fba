pub mod backends;
pub mod chat;
pub mod health;
pub mod query;
pub mod slack;

use axum::http::StatusCode;

use crate::models::envelope::{EnvelopeStatus, ErrorKind, ResponseEnvelope};

pub(crate) fn status_for_error(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Configuration | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Translation | ErrorKind::Provider => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Query => StatusCode::BAD_GATEWAY,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Partial answers are still answers; only a fully failed envelope maps to an error status.
pub(crate) fn status_for_envelope(envelope: &ResponseEnvelope) -> StatusCode {
    match envelope.status {
        EnvelopeStatus::Completed | EnvelopeStatus::Partial => StatusCode::OK,
        EnvelopeStatus::Failed => envelope
            .errors()
            .next()
            .map(|e| status_for_error(e.kind))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
