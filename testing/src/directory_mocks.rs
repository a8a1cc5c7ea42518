//! In-memory event and user directory.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use admission_core::{
    EventDirectory, EventDescriptor, EventId, EventState, StoreError, StoreResult, UserDirectory,
    UserId,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// In-memory stand-in for the event and user services.
///
/// Cloning shares the underlying maps, so a test can keep a handle and edit
/// events (e.g. unpublish one) after handing the directory to a controller.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    events: Arc<RwLock<HashMap<EventId, EventDescriptor>>>,
    users: Arc<RwLock<HashSet<UserId>>>,
    unavailable: Arc<RwLock<bool>>,
}

impl InMemoryDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an event. Its owner is registered as a user.
    pub fn add_event(&self, event: EventDescriptor) {
        self.users.write().unwrap().insert(event.owner_id);
        self.events.write().unwrap().insert(event.id, event);
    }

    /// Register users by raw ID
    pub fn add_users(&self, ids: impl IntoIterator<Item = i64>) {
        let mut users = self.users.write().unwrap();
        users.extend(ids.into_iter().map(UserId::new));
    }

    /// Change an event's publication state
    pub fn set_state(&self, event_id: EventId, state: EventState) {
        if let Some(event) = self.events.write().unwrap().get_mut(&event_id) {
            event.state = state;
        }
    }

    /// Make every lookup fail with a database error
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().unwrap() = unavailable;
    }

    fn check_available(&self) -> StoreResult<()> {
        if *self.unavailable.read().unwrap() {
            return Err(StoreError::Database("directory unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventDirectory for InMemoryDirectory {
    async fn get_event(&self, event_id: EventId) -> StoreResult<Option<EventDescriptor>> {
        self.check_available()?;
        Ok(self.events.read().unwrap().get(&event_id).cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.users.read().unwrap().contains(&user_id))
    }
}
