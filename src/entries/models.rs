use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Published content bound to a feed. Times are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: String,
    pub feed_id: String,
    /// Content address used for the payment-instruction mapping
    pub cid: Option<String>,
    /// Payment instruction currently bound to `cid`
    pub piid: Option<String>,
    /// Deadline after which paid access is revoked; `None` never expires
    pub expires_at: Option<i64>,
    pub is_active: bool,
    pub is_free: bool,
    pub updated_at: i64,
}

impl Entry {
    /// The content address and current instruction, when both are bound
    pub fn payment_binding(&self) -> Option<(&str, &str)> {
        match (self.cid.as_deref(), self.piid.as_deref()) {
            (Some(cid), Some(piid)) if !cid.is_empty() && !piid.is_empty() => Some((cid, piid)),
            _ => None,
        }
    }
}
