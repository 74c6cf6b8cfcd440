//! In-memory session registry.
//!
//! Maps each session id to at most one bound environment. State lives in
//! process memory only and is lost on restart.
//!
//! Every session has its own async lock. Holding a [`SessionGuard`] is the
//! only way to bind or unbind, so check-then-create-then-bind for one session
//! cannot interleave with another request for the same session, while
//! unrelated sessions proceed in parallel.
//!
//! A session's lock lives in the map only while it is bound or a request for
//! it is in flight; the last guard to leave an empty slot removes it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use shellbox_core::SessionId;
use shellbox_executor::EnvironmentHandle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

use crate::error::GatewayError;

/// A capacity slot held by a session while it has a bound environment.
#[derive(Debug)]
pub struct Reservation {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
struct Binding {
    environment: Arc<EnvironmentHandle>,
    reservation: Reservation,
}

type Slot = Arc<AsyncMutex<Option<Binding>>>;
type SlotMap = Arc<Mutex<HashMap<SessionId, Slot>>>;

/// Thread-safe registry of session bindings with a fixed environment budget.
#[derive(Debug)]
pub struct SessionRegistry {
    slots: SlotMap,
    capacity: Arc<Semaphore>,
    max_environments: usize,
}

/// Exclusive access to one session's binding.
#[derive(Debug)]
pub struct SessionGuard {
    session_id: SessionId,
    slot: OwnedMutexGuard<Option<Binding>>,
    slots: SlotMap,
    capacity: Arc<Semaphore>,
    max_environments: usize,
}

impl SessionRegistry {
    /// Create an empty registry allowing at most `max_environments` bound
    /// environments at once.
    #[must_use]
    pub fn new(max_environments: usize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            capacity: Arc::new(Semaphore::new(max_environments)),
            max_environments,
        }
    }

    /// Acquire exclusive access to a session's binding, waiting for any
    /// in-flight provisioning or reset of the same session.
    pub async fn lock(&self, session_id: &SessionId) -> SessionGuard {
        let slot = self.slot(session_id);
        SessionGuard {
            session_id: session_id.clone(),
            slot: slot.lock_owned().await,
            slots: Arc::clone(&self.slots),
            capacity: Arc::clone(&self.capacity),
            max_environments: self.max_environments,
        }
    }

    /// The environment currently bound to `session_id`, if any.
    pub async fn resolve(&self, session_id: &SessionId) -> Option<Arc<EnvironmentHandle>> {
        let slot = self.existing_slot(session_id)?;
        let binding = slot.lock().await;
        binding.as_ref().map(|b| Arc::clone(&b.environment))
    }

    /// Number of sessions with a bound environment.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.max_environments - self.capacity.available_permits()
    }

    /// Number of sessions the registry is tracking: bound sessions plus
    /// sessions with a request holding or waiting for their lock.
    ///
    /// # Panics
    /// Panics if the internal `Mutex` is poisoned.
    #[must_use]
    pub fn session_count(&self) -> usize {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let map = self.slots.lock().expect("session registry lock poisoned");
        map.len()
    }

    /// The environment budget.
    #[must_use]
    pub fn max_environments(&self) -> usize {
        self.max_environments
    }

    /// Unbind every session and return the environments that were bound.
    ///
    /// # Panics
    /// Panics if the internal `Mutex` is poisoned.
    pub async fn drain(&self) -> Vec<Arc<EnvironmentHandle>> {
        let slots: Vec<Slot> = {
            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            let mut map = self.slots.lock().expect("session registry lock poisoned");
            map.drain().map(|(_, slot)| slot).collect()
        };
        let mut drained = Vec::new();
        for slot in slots {
            if let Some(binding) = slot.lock().await.take() {
                drained.push(binding.environment);
            }
        }
        drained
    }

    fn slot(&self, session_id: &SessionId) -> Slot {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut map = self.slots.lock().expect("session registry lock poisoned");
        Arc::clone(map.entry(session_id.clone()).or_default())
    }

    fn existing_slot(&self, session_id: &SessionId) -> Option<Slot> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let map = self.slots.lock().expect("session registry lock poisoned");
        map.get(session_id).map(Arc::clone)
    }
}

impl SessionGuard {
    /// The session this guard covers.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The environment currently bound to this session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<EnvironmentHandle>> {
        self.slot.as_ref().map(|b| Arc::clone(&b.environment))
    }

    /// Reserve capacity for a new environment.
    ///
    /// # Errors
    /// Returns [`GatewayError::CapacityExhausted`] if every slot is taken.
    pub fn reserve(&self) -> Result<Reservation, GatewayError> {
        Arc::clone(&self.capacity)
            .try_acquire_owned()
            .map(|permit| Reservation { _permit: permit })
            .map_err(|_| GatewayError::CapacityExhausted {
                limit: self.max_environments,
            })
    }

    /// Bind `environment` to this session.
    ///
    /// Returns the new handle and, if one was bound, the superseded handle,
    /// which the caller must tear down.
    pub fn bind(
        &mut self,
        environment: EnvironmentHandle,
        reservation: Reservation,
    ) -> (Arc<EnvironmentHandle>, Option<Arc<EnvironmentHandle>>) {
        let environment = Arc::new(environment);
        let previous = self.slot.replace(Binding {
            environment: Arc::clone(&environment),
            reservation,
        });
        (environment, previous.map(|b| b.environment))
    }

    /// Remove this session's binding, returning the environment and its
    /// reservation so a replacement can reuse the slot.
    pub fn unbind(&mut self) -> Option<(Arc<EnvironmentHandle>, Reservation)> {
        self.slot.take().map(|b| (b.environment, b.reservation))
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.slot.is_some() {
            return;
        }
        let Ok(mut map) = self.slots.lock() else {
            return;
        };
        // One reference is the map entry, the other is this guard. Any waiter
        // took its own clone under the map lock, so a count of two is final.
        let slot = OwnedMutexGuard::mutex(&self.slot);
        let idle = Arc::strong_count(slot) == 2
            && map
                .get(&self.session_id)
                .is_some_and(|entry| Arc::ptr_eq(entry, slot));
        if idle {
            map.remove(&self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use shellbox_core::{EnvironmentId, ResourceLimits};

    use super::*;

    fn session(id: &str) -> SessionId {
        match SessionId::parse(id) {
            Ok(s) => s,
            Err(e) => panic!("valid session id rejected: {e}"),
        }
    }

    fn environment(id: &str, session_id: &SessionId) -> EnvironmentHandle {
        EnvironmentHandle::new(
            EnvironmentId::new(id),
            format!("terminal-session-{session_id}-0"),
            session_id.clone(),
            ResourceLimits::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn session_registry_bind_and_unbind_lifecycle() {
        let registry = SessionRegistry::new(4);
        let sid = session("s1");

        let mut guard = registry.lock(&sid).await;
        assert!(guard.current().is_none());
        let reservation = match guard.reserve() {
            Ok(r) => r,
            Err(e) => panic!("reserve failed: {e}"),
        };
        let (bound, previous) = guard.bind(environment("env-1", &sid), reservation);
        assert!(previous.is_none());
        assert_eq!(bound.id.as_str(), "env-1");
        drop(guard);

        let resolved = registry.resolve(&sid).await;
        assert_eq!(resolved.map(|e| e.id.clone()), Some(EnvironmentId::new("env-1")));
        assert_eq!(registry.bound_count(), 1);

        let mut guard = registry.lock(&sid).await;
        let unbound = guard.unbind();
        assert!(unbound.is_some(), "unbind should return the bound environment");
        drop(unbound);
        drop(guard);
        assert!(registry.resolve(&sid).await.is_none());
        assert_eq!(registry.bound_count(), 0, "unbinding must release capacity");
    }

    #[tokio::test]
    async fn session_registry_unknown_session_resolves_to_none() {
        let registry = SessionRegistry::new(1);
        assert!(registry.resolve(&session("nobody")).await.is_none());
    }

    #[tokio::test]
    async fn session_registry_reserve_fails_when_full() {
        let registry = SessionRegistry::new(1);
        let a = session("a");
        let b = session("b");

        let mut guard = registry.lock(&a).await;
        let reservation = match guard.reserve() {
            Ok(r) => r,
            Err(e) => panic!("first reserve failed: {e}"),
        };
        let _ = guard.bind(environment("env-a", &a), reservation);
        drop(guard);

        let guard = registry.lock(&b).await;
        assert!(matches!(
            guard.reserve(),
            Err(GatewayError::CapacityExhausted { limit: 1 })
        ));
    }

    #[tokio::test]
    async fn session_registry_lock_serializes_same_session() {
        let registry = Arc::new(SessionRegistry::new(2));
        let sid = session("shared");

        let guard = registry.lock(&sid).await;
        let waiter = {
            let registry = Arc::clone(&registry);
            let sid = sid.clone();
            tokio::spawn(async move { registry.lock(&sid).await.current().is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second lock must wait for the first");

        let mut guard = guard;
        let reservation = match guard.reserve() {
            Ok(r) => r,
            Err(e) => panic!("reserve failed: {e}"),
        };
        let _ = guard.bind(environment("env-shared", &sid), reservation);
        drop(guard);

        let saw_binding = match waiter.await {
            Ok(v) => v,
            Err(e) => panic!("waiter panicked: {e}"),
        };
        assert!(saw_binding, "waiter must observe the binding made under the first lock");
    }

    #[tokio::test]
    async fn session_registry_forgets_sessions_left_unbound() {
        let registry = SessionRegistry::new(2);
        let kept = session("kept");
        let passing = session("passing");

        let mut guard = registry.lock(&kept).await;
        let reservation = match guard.reserve() {
            Ok(r) => r,
            Err(e) => panic!("reserve failed: {e}"),
        };
        let _ = guard.bind(environment("env-kept", &kept), reservation);
        drop(guard);

        drop(registry.lock(&passing).await);
        assert_eq!(registry.session_count(), 1, "an empty slot must not outlive its guard");

        let mut guard = registry.lock(&kept).await;
        drop(guard.unbind());
        drop(guard);
        assert_eq!(registry.session_count(), 0, "unbinding must forget the session");
    }

    #[tokio::test]
    async fn session_registry_keeps_slot_while_another_request_waits() {
        let registry = Arc::new(SessionRegistry::new(1));
        let sid = session("contended");

        let guard = registry.lock(&sid).await;
        let waiter = {
            let registry = Arc::clone(&registry);
            let sid = sid.clone();
            tokio::spawn(async move {
                let mut guard = registry.lock(&sid).await;
                let reservation = match guard.reserve() {
                    Ok(r) => r,
                    Err(e) => panic!("reserve failed: {e}"),
                };
                let _ = guard.bind(environment("env-late", &sid), reservation);
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(registry.session_count(), 1, "the waiter still needs the slot");

        if let Err(e) = waiter.await {
            panic!("waiter panicked: {e}");
        }
        let resolved = registry.resolve(&sid).await;
        assert_eq!(resolved.map(|e| e.id.clone()), Some(EnvironmentId::new("env-late")));
    }

    #[tokio::test]
    async fn session_registry_drain_returns_every_binding() {
        let registry = SessionRegistry::new(3);
        for id in ["x", "y"] {
            let sid = session(id);
            let mut guard = registry.lock(&sid).await;
            let reservation = match guard.reserve() {
                Ok(r) => r,
                Err(e) => panic!("reserve failed: {e}"),
            };
            let _ = guard.bind(environment(&format!("env-{id}"), &sid), reservation);
        }
        let drained = registry.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.bound_count(), 0);
    }
}
