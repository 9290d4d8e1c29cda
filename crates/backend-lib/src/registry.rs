// ============================
// crates/backend-lib/src/registry.rs
// ============================
//! Connection registry: maps a user identity to its live outbound
//! session. A user has at most one binding; a later connection for the
//! same identity supersedes the earlier one.
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::room_actor::Outbound;

#[derive(Clone)]
struct ConnEntry {
    conn_id: Uuid,
    tx: Outbound,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<String, ConnEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an identity to a connection, superseding any earlier one.
    pub fn bind(&self, user_id: &str, conn_id: Uuid, tx: Outbound) {
        self.inner
            .insert(user_id.to_string(), ConnEntry { conn_id, tx });
    }

    /// Drop the binding, but only if it still belongs to `conn_id`: a
    /// stale disconnect must never evict a newer session.
    pub fn unbind(&self, user_id: &str, conn_id: Uuid) {
        self.inner
            .remove_if(user_id, |_, entry| entry.conn_id == conn_id);
    }

    /// The outbound channel of the user's live session, if any. Room
    /// actors use this to reach users whose lobby sender went stale.
    pub fn sender_for(&self, user_id: &str) -> Option<Outbound> {
        self.inner.get(user_id).map(|entry| entry.tx.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
