//! Ticket → session map shared by concurrent Web Connector calls.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use qbsync_core::Ticket;
use qbsync_jobs::{IssuedRequest, Session};

pub(crate) struct SessionSlot {
    pub(crate) session: Session,
    /// Request already taken from the session (to compute progress) but not
    /// yet sent to the client.
    pub(crate) buffered: Option<IssuedRequest>,
    last_seen: Instant,
}

#[derive(Default)]
pub(crate) struct SessionStore {
    slots: Mutex<HashMap<Ticket, SessionSlot>>,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a session for the same ticket was replaced.
    pub(crate) fn insert(&self, session: Session) -> bool {
        let ticket = session.ticket().clone();
        let slot = SessionSlot {
            session,
            buffered: None,
            last_seen: Instant::now(),
        };
        self.lock().insert(ticket, slot).is_some()
    }

    /// Run `f` on the ticket's slot, marking it as recently used.
    pub(crate) fn with_slot<R>(&self, ticket: &Ticket, f: impl FnOnce(&mut SessionSlot) -> R) -> Option<R> {
        let mut slots = self.lock();
        let slot = slots.get_mut(ticket)?;
        slot.last_seen = Instant::now();
        Some(f(slot))
    }

    pub(crate) fn remove(&self, ticket: &Ticket) -> Option<SessionSlot> {
        self.lock().remove(ticket)
    }

    /// Drop sessions idle for at least `timeout` as of `now`.
    pub(crate) fn evict_idle(&self, timeout: Duration, now: Instant) -> Vec<Ticket> {
        let mut slots = self.lock();
        let expired: Vec<Ticket> = slots
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.last_seen) >= timeout)
            .map(|(ticket, _)| ticket.clone())
            .collect();
        for ticket in &expired {
            slots.remove(ticket);
        }
        expired
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// A panic inside one call must not take every other ticket down with it.
    fn lock(&self) -> MutexGuard<'_, HashMap<Ticket, SessionSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
