//! In-place rename of a group label.
//!
//! One session at most: `start` while another entity is being edited is
//! ignored, and every way out of `Editing` clears the host's edit markers.

use parking_lot::Mutex;

use crate::host::EntityHost;
use crate::models::EntityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameState {
    Idle,
    Editing {
        entity: EntityId,
        /// Label as it was when the session started.
        original: String,
        buffer: String,
        select_all: bool,
    },
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed(String),
    /// Confirmed with an empty or identical label.
    Unchanged,
    Cancelled,
    /// There was no session to end.
    NotEditing,
}

pub struct RenameSession {
    state: Mutex<RenameState>,
}

impl Default for RenameSession {
    fn default() -> Self {
        Self {
            state: Mutex::new(RenameState::Idle),
        }
    }
}

impl RenameSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin editing `id`. Returns false when a session is already active or
    /// the entity is gone or not yet built.
    pub fn start(&self, host: &dyn EntityHost, id: &EntityId, select_all: bool) -> bool {
        let mut state = self.state.lock();
        if let RenameState::Editing { entity, .. } = &*state {
            tracing::debug!("Rename of {} ignored, already editing {}", id, entity);
            return false;
        }
        let Some(entity) = host.entity(id).filter(|e| e.structure_ready) else {
            tracing::debug!("Rename of {} skipped, label not available", id);
            return false;
        };

        host.set_rename_marker(id, true);
        *state = RenameState::Editing {
            entity: id.clone(),
            original: entity.label.clone(),
            buffer: entity.label,
            select_all,
        };
        tracing::debug!("Started renaming group {}", id);
        true
    }

    /// Replace the edit buffer. Ignored when idle.
    pub fn set_buffer(&self, text: &str) {
        if let RenameState::Editing { buffer, .. } = &mut *self.state.lock() {
            *buffer = text.to_string();
        }
    }

    pub fn is_editing(&self) -> bool {
        matches!(*self.state.lock(), RenameState::Editing { .. })
    }

    pub fn target(&self) -> Option<EntityId> {
        match &*self.state.lock() {
            RenameState::Editing { entity, .. } => Some(entity.clone()),
            RenameState::Idle => None,
        }
    }

    pub fn buffer(&self) -> Option<String> {
        match &*self.state.lock() {
            RenameState::Editing { buffer, .. } => Some(buffer.clone()),
            RenameState::Idle => None,
        }
    }

    pub fn state(&self) -> RenameState {
        self.state.lock().clone()
    }

    /// Confirm the edit: a trimmed, non-empty label different from the
    /// current one is assigned.
    pub fn commit(&self, host: &dyn EntityHost) -> RenameOutcome {
        let RenameState::Editing { entity, buffer, .. } = self.take() else {
            return RenameOutcome::NotEditing;
        };
        host.set_rename_marker(&entity, false);

        let label = buffer.trim();
        let current = host.entity(&entity).map(|e| e.label);
        if label.is_empty() || current.as_deref() == Some(label) {
            return RenameOutcome::Unchanged;
        }
        match host.set_label(&entity, label) {
            Ok(()) => {
                tracing::info!("Renamed group {} to {:?}", entity, label);
                RenameOutcome::Renamed(label.to_string())
            }
            Err(e) => {
                tracing::warn!("Could not rename group {}: {}", entity, e);
                RenameOutcome::Unchanged
            }
        }
    }

    /// Discard the edit. The label is left untouched.
    pub fn cancel(&self, host: &dyn EntityHost) -> RenameOutcome {
        let RenameState::Editing { entity, .. } = self.take() else {
            return RenameOutcome::NotEditing;
        };
        host.set_rename_marker(&entity, false);
        tracing::debug!("Cancelled renaming group {}", entity);
        RenameOutcome::Cancelled
    }

    /// Focus left the editor without confirm or abort.
    pub fn halt_on_focus_loss(&self, host: &dyn EntityHost) -> RenameOutcome {
        self.cancel(host)
    }

    /// Drop any session, clearing markers if the host still has the entity.
    pub fn reset(&self, host: &dyn EntityHost) {
        if let RenameState::Editing { entity, .. } = self.take() {
            host.set_rename_marker(&entity, false);
        }
    }

    fn take(&self) -> RenameState {
        std::mem::replace(&mut *self.state.lock(), RenameState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;

    fn setup() -> (MemoryHost, EntityId, EntityId) {
        let host = MemoryHost::new();
        let a = host.add_group("a", "Alpha");
        let b = host.add_group("b", "Beta");
        (host, a, b)
    }

    #[test]
    fn second_start_keeps_first_target() {
        let (host, a, b) = setup();
        let session = RenameSession::new();

        assert!(session.start(&host, &a, true));
        assert!(!session.start(&host, &b, false));

        assert_eq!(session.target(), Some(a.clone()));
        assert_eq!(session.buffer().as_deref(), Some("Alpha"));
        assert!(host.has_rename_marker(&a));
        assert!(!host.has_rename_marker(&b));
    }

    #[test]
    fn commit_trims_and_assigns() {
        let (host, a, _) = setup();
        let session = RenameSession::new();
        session.start(&host, &a, false);
        session.set_buffer("  Research  ");

        assert_eq!(session.commit(&host), RenameOutcome::Renamed("Research".to_string()));
        assert_eq!(host.entity(&a).unwrap().label, "Research");
        assert!(!session.is_editing());
        assert!(!host.has_rename_marker(&a));
    }

    #[test]
    fn blank_or_identical_commit_changes_nothing() {
        let (host, a, _) = setup();
        let session = RenameSession::new();

        session.start(&host, &a, false);
        session.set_buffer("   ");
        assert_eq!(session.commit(&host), RenameOutcome::Unchanged);

        session.start(&host, &a, false);
        session.set_buffer("Alpha ");
        assert_eq!(session.commit(&host), RenameOutcome::Unchanged);

        assert_eq!(host.entity(&a).unwrap().label, "Alpha");
        assert!(!host.has_rename_marker(&a));
    }

    #[test]
    fn cancel_and_focus_loss_leave_label() {
        let (host, a, b) = setup();
        let session = RenameSession::new();

        session.start(&host, &a, false);
        session.set_buffer("Changed");
        assert_eq!(session.cancel(&host), RenameOutcome::Cancelled);
        assert_eq!(session.state(), RenameState::Idle);

        session.start(&host, &b, false);
        session.set_buffer("Changed");
        assert_eq!(session.halt_on_focus_loss(&host), RenameOutcome::Cancelled);

        assert_eq!(host.entity(&a).unwrap().label, "Alpha");
        assert_eq!(host.entity(&b).unwrap().label, "Beta");
        assert!(!host.has_rename_marker(&b));
        assert_eq!(session.cancel(&host), RenameOutcome::NotEditing);
    }

    #[test]
    fn unready_entity_cannot_be_renamed() {
        let (host, a, _) = setup();
        host.set_structure_ready(&a, false);
        let session = RenameSession::new();

        assert!(!session.start(&host, &a, false));
        assert!(!session.is_editing());
    }
}
