//! Opaque operations submitted by the host application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An operation addressed to one service.
///
/// The payload is opaque to this layer. For request-response services it is
/// POSTed to `route` (or `/`); for persistent sockets it is written as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub route: Option<String>,
    pub payload: Vec<u8>,
    pub submitted_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            route: None,
            payload: payload.into(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Route with a leading slash, defaulting to `/`
    pub fn route_or_root(&self) -> &str {
        self.route.as_deref().unwrap_or("/")
    }
}

/// Result of executing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub operation_id: Uuid,
    /// HTTP status for request-response services
    pub status: Option<u16>,
    pub body: Vec<u8>,
}

impl OperationResponse {
    /// Response for a fire-and-forget write with no reply body
    pub fn accepted(operation_id: Uuid) -> Self {
        Self {
            operation_id,
            status: None,
            body: Vec::new(),
        }
    }
}
