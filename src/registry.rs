//! Tracks which entities exist and which have been decorated.
//!
//! The registry is the idempotence key for initialization: an entity is
//! claimed once, decorated once, and stays Initialized until it leaves the
//! tree. Presentation state is never consulted.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::models::{Entity, EntityId, LifecycleState};

/// What a discovery notification means for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// Carries an exclusion marker; never decorated.
    Excluded,
    AlreadyInitialized,
    /// Another caller holds the claim and is decorating it right now.
    InProgress,
    /// The host has not finished building it; a later pass will retry.
    NotReady,
    /// The caller now owns initialization and must `complete` or `abandon`.
    Claimed,
}

#[derive(Default)]
struct Entries {
    states: HashMap<EntityId, LifecycleState>,
    claimed: HashSet<EntityId>,
}

#[derive(Default)]
pub struct GroupRegistry {
    entries: Mutex<Entries>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting of `entity` and decide whether it should be initialized.
    pub fn claim(&self, entity: &Entity) -> Discovery {
        let mut entries = self.entries.lock();
        let state = entries
            .states
            .entry(entity.id.clone())
            .or_insert(LifecycleState::Discovered);
        if *state == LifecycleState::Destroyed {
            // same id back in the tree: a new life
            *state = LifecycleState::Discovered;
        }
        if *state == LifecycleState::Initialized {
            return Discovery::AlreadyInitialized;
        }
        if entity.is_excluded() {
            return Discovery::Excluded;
        }
        if entries.claimed.contains(&entity.id) {
            return Discovery::InProgress;
        }
        if !entity.structure_ready {
            return Discovery::NotReady;
        }
        entries.claimed.insert(entity.id.clone());
        Discovery::Claimed
    }

    /// Finish a claimed initialization.
    pub fn complete(&self, id: &EntityId) {
        let mut entries = self.entries.lock();
        if entries.claimed.remove(id) {
            entries.states.insert(id.clone(), LifecycleState::Initialized);
        }
    }

    /// Give up a claim; the entity stays Discovered for the next pass.
    pub fn abandon(&self, id: &EntityId) {
        self.entries.lock().claimed.remove(id);
    }

    pub fn mark_destroyed(&self, id: &EntityId) {
        let mut entries = self.entries.lock();
        entries.claimed.remove(id);
        if let Some(state) = entries.states.get_mut(id) {
            *state = LifecycleState::Destroyed;
        }
    }

    /// Mark every tracked entity missing from `live` as Destroyed.
    ///
    /// Returns the ids that changed state.
    pub fn retain_live(&self, live: &HashSet<EntityId>) -> Vec<EntityId> {
        let mut entries = self.entries.lock();
        let mut gone = Vec::new();
        for (id, state) in entries.states.iter_mut() {
            if *state != LifecycleState::Destroyed && !live.contains(id) {
                *state = LifecycleState::Destroyed;
                gone.push(id.clone());
            }
        }
        gone.sort();
        gone
    }

    /// Forget every Destroyed entity. Returns how many were dropped.
    pub fn prune_destroyed(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.states.len();
        entries
            .states
            .retain(|_, state| *state != LifecycleState::Destroyed);
        before - entries.states.len()
    }

    /// Number of entities with a recorded state.
    pub fn len(&self) -> usize {
        self.entries.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self, id: &EntityId) -> Option<LifecycleState> {
        self.entries.lock().states.get(id).copied()
    }

    pub fn is_initialized(&self, id: &EntityId) -> bool {
        self.state(id) == Some(LifecycleState::Initialized)
    }

    pub fn initialized(&self) -> Vec<EntityId> {
        let entries = self.entries.lock();
        let mut ids: Vec<EntityId> = entries
            .states
            .iter()
            .filter(|(_, state)| **state == LifecycleState::Initialized)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.states.clear();
        entries.claimed.clear();
    }
}
