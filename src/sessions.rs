//! Keyed store for live conversation sessions.
//!
//! The store is the only shared mutable state in the system. Every
//! read-decide-write sequence, in both the conversation engine and the
//! payment reconciliation engine, runs while holding the per-phone lock
//! handed out by [`SessionStore::lock`], so concurrent deliveries for the
//! same shopper are applied one at a time.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::models::Session;

/// Lockable cell for one phone number's session.
///
/// `session == None` is the `New` state: the shopper has no live
/// conversation. A retired slot (after terminal completion) is flagged so a
/// task that was already waiting on its mutex re-enters through the map
/// instead of mutating a removed session.
pub struct SessionSlot {
    pub session: Option<Session>,
    closed: bool,
}

impl SessionSlot {
    fn vacant() -> Self {
        Self {
            session: None,
            closed: false,
        }
    }
}

/// In-memory session store keyed by normalized phone number, plus the
/// order-id index used to route payment notifications back to a session.
#[derive(Default)]
pub struct SessionStore {
    slots: DashMap<String, Arc<Mutex<SessionSlot>>>,
    orders: DashMap<String, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the single-writer lock for a phone number, creating an empty
    /// slot if the shopper has no session yet.
    pub async fn lock(&self, phone: &str) -> OwnedMutexGuard<SessionSlot> {
        loop {
            let slot = self
                .slots
                .entry(phone.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionSlot::vacant())))
                .clone();
            let guard = slot.lock_owned().await;
            if !guard.closed {
                return guard;
            }
            // The slot was retired while we were queued on it; go back
            // through the map for a fresh one.
            debug!(phone, "session slot retired while waiting; reacquiring");
        }
    }

    /// Snapshot of the current session, if any.
    pub async fn get(&self, phone: &str) -> Option<Session> {
        let slot = self.slots.get(phone)?.clone();
        let guard = slot.lock().await;
        guard.session.clone()
    }

    /// Removes the session whose lock is held, retiring the slot and
    /// unbinding any pending order. The guard keeps serializing until drop.
    pub fn retire(&self, phone: &str, guard: &mut OwnedMutexGuard<SessionSlot>) {
        if let Some(order_id) = guard
            .session
            .as_ref()
            .and_then(|s| s.pending_order.as_ref())
            .map(|p| p.order_id.clone())
        {
            self.orders.remove(&order_id);
        }
        guard.session = None;
        guard.closed = true;
        self.slots.remove(phone);
    }

    /// Registers `order_id` as belonging to `phone`'s session. Order ids are
    /// unique per session lifetime, so binding is insert-only.
    pub fn bind_order(&self, order_id: &str, phone: &str) {
        self.orders.insert(order_id.to_string(), phone.to_string());
    }

    pub fn unbind_order(&self, order_id: &str) {
        self.orders.remove(order_id);
    }

    /// Resolves a payment notification's order id to the owning phone.
    pub fn resolve_order(&self, order_id: &str) -> Option<String> {
        self.orders.get(order_id).map(|v| v.value().clone())
    }

    pub fn live_sessions(&self) -> usize {
        self.slots.len()
    }
}
