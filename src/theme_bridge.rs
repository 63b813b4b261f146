//! Borrowing the theme color picker for a single group.
//!
//! The picker normally applies its dots to the global theme. While a session is
//! active its hooks are swapped for [`RedirectToEntity`], which assigns the
//! picked color to one group and persists it. The swap lives in a
//! [`ThemeOverride`] guard: dropping it puts the picker's own hooks back and
//! clears the per-dot markers, whichever way the session ends.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::host::{EntityHost, PickerHooks, ThemePicker};
use crate::models::{color_value_from_samples, EntityId, Namespace, PickerSample};
use crate::store::PersistentStore;

/// Hooks that send picker updates to one group instead of the theme.
pub struct RedirectToEntity {
    entity: EntityId,
    host: Arc<dyn EntityHost>,
    store: PersistentStore,
    last_applied: Mutex<Option<String>>,
}

impl RedirectToEntity {
    pub fn new(entity: EntityId, host: Arc<dyn EntityHost>, store: PersistentStore) -> Self {
        Self {
            entity,
            host,
            store,
            last_applied: Mutex::new(None),
        }
    }

    pub fn entity(&self) -> &EntityId {
        &self.entity
    }

    pub fn last_applied(&self) -> Option<String> {
        self.last_applied.lock().clone()
    }

    fn apply(&self, samples: &[PickerSample]) -> Option<String> {
        let value = color_value_from_samples(samples)?;
        if let Err(e) = self.host.set_color(&self.entity, Some(&value)) {
            tracing::warn!("Could not apply picked color to group {}: {}", self.entity, e);
            return None;
        }
        if let Err(e) = self.store.put(Namespace::Colors, &self.entity, &value) {
            tracing::warn!("Could not save picked color for group {}: {}", self.entity, e);
        }
        *self.last_applied.lock() = Some(value.clone());
        Some(value)
    }
}

impl PickerHooks for RedirectToEntity {
    fn update_current_workspace(&self, samples: &[PickerSample]) {
        self.apply(samples);
    }

    fn on_workspace_change(&self, workspace: &str) {
        // switching workspaces would re-theme the window under the session
        tracing::debug!(
            "Ignoring workspace change to {} while coloring group {}",
            workspace,
            self.entity
        );
    }
}

/// Active swap of picker hooks. Restores the originals on drop.
pub struct ThemeOverride {
    picker: Arc<dyn ThemePicker>,
    original: Arc<dyn PickerHooks>,
    redirect: Arc<RedirectToEntity>,
}

impl ThemeOverride {
    pub fn install(picker: Arc<dyn ThemePicker>, redirect: Arc<RedirectToEntity>) -> Self {
        let original = picker.hooks();
        picker.install_hooks(redirect.clone());
        Self {
            picker,
            original,
            redirect,
        }
    }

    pub fn entity(&self) -> &EntityId {
        self.redirect.entity()
    }

    /// Apply whatever the picker currently shows.
    fn flush(&self) -> Option<String> {
        let samples = self.picker.samples();
        self.redirect.apply(&samples).or_else(|| self.redirect.last_applied())
    }
}

impl Drop for ThemeOverride {
    fn drop(&mut self) {
        self.picker.install_hooks(self.original.clone());
        self.picker.clear_sample_markers();
        tracing::debug!("Restored color picker hooks after group {}", self.redirect.entity());
    }
}

pub struct ThemeBridge {
    host: Arc<dyn EntityHost>,
    store: PersistentStore,
    session: Mutex<Option<ThemeOverride>>,
}

impl ThemeBridge {
    pub fn new(host: Arc<dyn EntityHost>, store: PersistentStore) -> Self {
        Self {
            host,
            store,
            session: Mutex::new(None),
        }
    }

    /// Open `picker` with its updates redirected to `entity`.
    ///
    /// Returns false when a session is already active, the entity is gone, or
    /// the picker fails to open. In the last case the hooks are already back.
    pub fn bind_temporary_override(&self, entity: &EntityId, picker: Arc<dyn ThemePicker>) -> bool {
        let mut session = self.session.lock();
        if let Some(active) = session.as_ref() {
            tracing::debug!(
                "Color picker already bound to group {}, ignoring {}",
                active.entity(),
                entity
            );
            return false;
        }
        if !self.host.contains(entity) {
            tracing::debug!("Cannot color missing group {}", entity);
            return false;
        }

        let redirect = Arc::new(RedirectToEntity::new(
            entity.clone(),
            self.host.clone(),
            self.store.clone(),
        ));
        let guard = ThemeOverride::install(picker.clone(), redirect);
        if let Err(e) = picker.open() {
            tracing::warn!("Could not open color picker for group {}: {}", entity, e);
            return false;
        }
        *session = Some(guard);
        tracing::debug!("Color picker bound to group {}", entity);
        true
    }

    /// The picker closed: apply its final state, then restore it.
    ///
    /// Returns the color the group ended up with, if any was picked.
    pub fn on_picker_closed(&self) -> Option<String> {
        let guard = self.session.lock().take()?;
        let applied = guard.flush();
        if let Some(value) = &applied {
            tracing::info!("Group {} colored {} from picker", guard.entity(), value);
        }
        applied
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn active_entity(&self) -> Option<EntityId> {
        self.session.lock().as_ref().map(|guard| guard.entity().clone())
    }

    /// End any session without a final apply and clear stale markers.
    pub fn reset(&self, picker: Option<&dyn ThemePicker>) {
        let guard = self.session.lock().take();
        drop(guard);
        if let Some(picker) = picker {
            picker.clear_sample_markers();
        }
    }
}
