//! Request/session correlation.
//!
//! The tenant is not part of the correlation context: claims are
//! not known yet when correlation runs, so each consuming stage resolves the
//! tenant from whatever claims it has at that point.

use serde::{Deserialize, Serialize};

use crate::{RequestId, SessionId};

/// Inbound header carrying the request correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inbound header carrying the session correlation ID.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Per-request identifiers, always present once resolved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationContext {
    request_id: RequestId,
    session_id: SessionId,
}

impl CorrelationContext {
    pub fn new(request_id: RequestId, session_id: SessionId) -> Self {
        Self {
            request_id,
            session_id,
        }
    }

    /// Resolve from raw inbound header values.
    ///
    /// Each ID is kept when it parses as a UUID and synthesized otherwise;
    /// the two are resolved independently.
    pub fn resolve(request_id: Option<&str>, session_id: Option<&str>) -> Self {
        Self {
            request_id: RequestId::parse_or_new(request_id),
            session_id: SessionId::parse_or_new(session_id),
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}
