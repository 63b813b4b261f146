//! The group coordinator.
//!
//! [`TabGroups`] owns one of each component (registry, rename session, shared
//! menu, theme bridge, color aggregator) and the persistent store, and routes
//! host notifications and user actions between them. It is cheap to clone;
//! clones share state.
//!
//! Every public operation absorbs host and storage failures: they are logged
//! and the operation degrades to a no-op.

mod runtime;

pub use runtime::Runtime;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::aggregator::{AggregationOutcome, ColorAggregator};
use crate::config::Settings;
use crate::context_menu::{ContextMenuCoordinator, MenuAction};
use crate::host::memory::{MemoryHost, MemoryIconPicker, MemoryThemePicker};
use crate::host::{
    EntityHost, HostEvent, IconPicker, ImageLoader, MenuSurface, ScreenPosition, ThemePicker,
};
use crate::models::{
    Entity, EntityId, EntityKind, IconChoice, LifecycleState, Namespace, NewFolder, NewGroup,
};
use crate::registry::{Discovery, GroupRegistry};
use crate::rename::{RenameOutcome, RenameSession};
use crate::store::PersistentStore;
use crate::theme_bridge::ThemeBridge;

/// The host-side implementations tabdeck works through.
#[derive(Clone)]
pub struct Collaborators {
    pub host: Arc<dyn EntityHost>,
    pub images: Arc<dyn ImageLoader>,
    pub menu: Arc<dyn MenuSurface>,
    pub theme_picker: Option<Arc<dyn ThemePicker>>,
    pub icon_picker: Option<Arc<dyn IconPicker>>,
}

impl Collaborators {
    /// Tree, images and menu from one in-memory host; no pickers.
    pub fn memory(host: &MemoryHost) -> Self {
        Self {
            host: Arc::new(host.clone()),
            images: Arc::new(host.clone()),
            menu: Arc::new(host.clone()),
            theme_picker: None,
            icon_picker: None,
        }
    }

    pub fn with_theme_picker(mut self, picker: &MemoryThemePicker) -> Self {
        self.theme_picker = Some(Arc::new(picker.clone()));
        self
    }

    pub fn with_icon_picker(mut self, picker: &MemoryIconPicker) -> Self {
        self.icon_picker = Some(Arc::new(picker.clone()));
        self
    }
}

/// Result of a full reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entities initialized during this pass.
    pub initialized: Vec<EntityId>,
    /// Tracked entities no longer in the tree.
    pub destroyed: Vec<EntityId>,
}

struct Inner {
    host: Arc<dyn EntityHost>,
    theme_picker: Option<Arc<dyn ThemePicker>>,
    icon_picker: Option<Arc<dyn IconPicker>>,
    store: PersistentStore,
    settings: Settings,
    registry: GroupRegistry,
    rename: RenameSession,
    menu: ContextMenuCoordinator,
    theme: ThemeBridge,
    aggregator: ColorAggregator,
    color_jobs: Mutex<JoinSet<AggregationOutcome>>,
}

#[derive(Clone)]
pub struct TabGroups {
    inner: Arc<Inner>,
}

impl TabGroups {
    pub fn new(collaborators: Collaborators, store: PersistentStore, settings: Settings) -> Self {
        let Collaborators {
            host,
            images,
            menu,
            theme_picker,
            icon_picker,
        } = collaborators;

        let inner = Inner {
            registry: GroupRegistry::new(),
            rename: RenameSession::new(),
            menu: ContextMenuCoordinator::new(menu),
            theme: ThemeBridge::new(host.clone(), store.clone()),
            aggregator: ColorAggregator::new(host.clone(), images, store.clone()),
            color_jobs: Mutex::new(JoinSet::new()),
            host,
            theme_picker,
            icon_picker,
            store,
            settings,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn host(&self) -> &Arc<dyn EntityHost> {
        &self.inner.host
    }

    pub fn store(&self) -> &PersistentStore {
        &self.inner.store
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.inner.registry
    }

    pub fn rename_session(&self) -> &RenameSession {
        &self.inner.rename
    }

    pub fn context_menu(&self) -> &ContextMenuCoordinator {
        &self.inner.menu
    }

    pub fn theme_bridge(&self) -> &ThemeBridge {
        &self.inner.theme
    }

    pub fn aggregator(&self) -> &ColorAggregator {
        &self.inner.aggregator
    }

    pub fn entity_state(&self, id: &EntityId) -> Option<LifecycleState> {
        self.inner.registry.state(id)
    }

    // ============================================================
    // Discovery
    // ============================================================

    /// Initialize `id` if it is new, eligible and fully built.
    ///
    /// Repeated and out-of-order calls are harmless: an entity is decorated
    /// once, and one that is not ready yet is left for a later pass.
    pub fn on_entity_discovered(&self, id: &EntityId) -> Discovery {
        let Some(entity) = self.inner.host.entity(id) else {
            tracing::debug!("Discovered entity {} is no longer in the tree", id);
            return Discovery::NotReady;
        };
        self.discover(&entity)
    }

    fn discover(&self, entity: &Entity) -> Discovery {
        let inner = &self.inner;
        let id = &entity.id;
        let discovery = inner.registry.claim(entity);
        if discovery != Discovery::Claimed {
            return discovery;
        }

        if let Err(e) = inner.host.attach_affordances(id) {
            tracing::debug!("Deferring group {}: {}", id, e);
            inner.registry.abandon(id);
            return Discovery::NotReady;
        }
        inner.menu.bind(id);
        inner.registry.complete(id);
        tracing::debug!("Initialized group {}", id);

        let has_saved_color = self.apply_saved(id);
        if entity.has_default_label() {
            inner.rename.start(inner.host.as_ref(), id, false);
            if !has_saved_color {
                self.spawn_favicon_color(id.clone(), Duration::ZERO);
            }
        }
        Discovery::Claimed
    }

    /// Discover every entity in the tree and retire the ones that left it.
    ///
    /// Entities retired by earlier passes or events are forgotten first.
    pub fn reconcile(&self) -> ReconcileReport {
        self.inner.registry.prune_destroyed();
        let entities = self.inner.host.entities();
        let mut report = ReconcileReport::default();
        for entity in &entities {
            if self.discover(entity) == Discovery::Claimed {
                report.initialized.push(entity.id.clone());
            }
        }

        let live: HashSet<EntityId> = entities.into_iter().map(|e| e.id).collect();
        report.destroyed = self.inner.registry.retain_live(&live);
        for id in &report.destroyed {
            self.forget(id);
        }
        if !report.initialized.is_empty() || !report.destroyed.is_empty() {
            tracing::debug!(
                "Reconciled groups: {} initialized, {} gone",
                report.initialized.len(),
                report.destroyed.len()
            );
        }
        report
    }

    /// The host reported `id` removed. Saved records are kept.
    pub fn on_entity_removed(&self, id: &EntityId) {
        if self.inner.host.contains(id) {
            // removal arrived after a re-add
            return;
        }
        self.inner.registry.mark_destroyed(id);
        self.forget(id);
    }

    /// The user created a new group through the platform.
    pub fn on_group_created(&self, id: &EntityId) {
        self.on_entity_discovered(id);
        let Some(entity) = self.inner.host.entity(id) else {
            return;
        };
        if !self.inner.registry.is_initialized(id) || !entity.has_default_label() {
            return;
        }
        self.inner.rename.start(self.inner.host.as_ref(), id, false);
        if self.has_saved_color(id) {
            return;
        }
        self.spawn_favicon_color(id.clone(), self.inner.settings.new_group_color_delay());
    }

    pub fn handle_event(&self, event: HostEvent) {
        match event {
            HostEvent::EntityAdded(id) => {
                self.on_entity_discovered(&id);
            }
            HostEvent::EntityRemoved(id) => self.on_entity_removed(&id),
            HostEvent::GroupCreated(id) => self.on_group_created(&id),
            HostEvent::PickerClosed => {
                self.picker_closed();
            }
        }
    }

    fn forget(&self, id: &EntityId) {
        let inner = &self.inner;
        inner.menu.unbind(id);
        if inner.rename.target().as_ref() == Some(id) {
            inner.rename.reset(inner.host.as_ref());
        }
        if inner.theme.active_entity().as_ref() == Some(id) {
            inner.theme.reset(None);
        }
    }

    // ============================================================
    // Persistence
    // ============================================================

    /// Apply saved colors and icons to every live entity.
    pub fn restore_saved(&self) -> usize {
        let host = &self.inner.host;
        let store = &self.inner.store;
        let is_live = |id: &EntityId| host.entity(id).is_some_and(|e| !e.is_excluded());

        let colors = store.apply_all(Namespace::Colors, is_live, |id, value| {
            if let Err(e) = host.set_color(id, Some(value)) {
                tracing::warn!("Could not restore color of group {}: {}", id, e);
            }
        });
        let icons = store.apply_all(Namespace::Icons, is_live, |id, value| {
            if let Err(e) = host.set_icon(id, Some(value)) {
                tracing::warn!("Could not restore icon of group {}: {}", id, e);
            }
        });
        tracing::debug!("Restored {} colors and {} icons", colors, icons);
        colors + icons
    }

    /// Apply saved records for one entity. Returns whether a color was saved.
    fn apply_saved(&self, id: &EntityId) -> bool {
        let host = &self.inner.host;
        let store = &self.inner.store;
        if let Some(icon) = store.get(Namespace::Icons).get(id.as_str()) {
            if let Err(e) = host.set_icon(id, Some(icon)) {
                tracing::warn!("Could not restore icon of group {}: {}", id, e);
            }
        }
        let Some(color) = store.get(Namespace::Colors).remove(id.as_str()) else {
            return false;
        };
        if let Err(e) = host.set_color(id, Some(&color)) {
            tracing::warn!("Could not restore color of group {}: {}", id, e);
        }
        true
    }

    fn has_saved_color(&self, id: &EntityId) -> bool {
        self.inner.store.get(Namespace::Colors).contains_key(id.as_str())
    }

    /// Save the current color of every live, non-excluded group.
    ///
    /// Merges into the saved mapping; records of groups not in the tree stay.
    pub fn sweep_colors(&self) -> usize {
        let colored: Vec<(EntityId, String)> = self
            .inner
            .host
            .entities()
            .into_iter()
            .filter(|e| !e.is_excluded())
            .filter_map(|e| e.color.map(|color| (e.id, color)))
            .collect();
        if colored.is_empty() {
            return 0;
        }
        let entries = colored.iter().map(|(id, color)| (id, color.as_str()));
        if let Err(e) = self.inner.store.put_many(Namespace::Colors, entries) {
            tracing::warn!("Periodic color save failed: {}", e);
            return 0;
        }
        colored.len()
    }

    // ============================================================
    // Context menu
    // ============================================================

    pub fn open_context_menu(&self, id: &EntityId, position: ScreenPosition) -> bool {
        self.inner.menu.open(id, position)
    }

    pub fn close_context_menu(&self) {
        self.inner.menu.on_close();
    }

    /// Run a menu action on the menu's current target.
    ///
    /// Returns false when the menu has no target.
    pub async fn handle_menu_action(&self, action: MenuAction) -> bool {
        let Some(id) = self.inner.menu.target_for(action) else {
            return false;
        };
        tracing::debug!("Menu action {} on group {}", action.as_str(), id);
        match action {
            MenuAction::SetGroupColor => {
                self.set_group_color(&id);
            }
            MenuAction::UseFaviconColor => {
                self.use_favicon_color(&id).await;
            }
            MenuAction::Rename => {
                self.start_rename(&id, true);
            }
            MenuAction::ChangeIcon => {
                self.change_group_icon(&id).await;
            }
            MenuAction::Ungroup => self.ungroup(&id),
            MenuAction::ConvertToFolder => {
                self.convert_group_to_folder(&id);
            }
            MenuAction::Close => self.close_group(&id),
            MenuAction::ToggleCollapsed => {
                self.toggle_collapsed(&id);
            }
            MenuAction::Expand => self.expand(&id),
        }
        true
    }

    // ============================================================
    // Rename
    // ============================================================

    pub fn start_rename(&self, id: &EntityId, select_all: bool) -> bool {
        self.inner.rename.start(self.inner.host.as_ref(), id, select_all)
    }

    pub fn set_rename_buffer(&self, text: &str) {
        self.inner.rename.set_buffer(text);
    }

    pub fn commit_rename(&self) -> RenameOutcome {
        self.inner.rename.commit(self.inner.host.as_ref())
    }

    pub fn cancel_rename(&self) -> RenameOutcome {
        self.inner.rename.cancel(self.inner.host.as_ref())
    }

    pub fn rename_focus_lost(&self) -> RenameOutcome {
        self.inner.rename.halt_on_focus_loss(self.inner.host.as_ref())
    }

    // ============================================================
    // Group actions
    // ============================================================

    /// Remove the group and its saved records.
    pub fn close_group(&self, id: &EntityId) {
        self.remove_records(id);
        if let Err(e) = self.inner.host.remove_group(id) {
            tracing::warn!("Could not remove group {}: {}", id, e);
        }
        self.inner.registry.mark_destroyed(id);
        self.forget(id);
        tracing::info!("Closed group {}", id);
    }

    /// Flip the collapsed flag. Returns the new value.
    pub fn toggle_collapsed(&self, id: &EntityId) -> Option<bool> {
        let entity = self.inner.host.entity(id)?;
        let collapsed = !entity.collapsed;
        match self.inner.host.set_collapsed(id, collapsed) {
            Ok(()) => Some(collapsed),
            Err(e) => {
                tracing::warn!("Could not toggle group {}: {}", id, e);
                None
            }
        }
    }

    pub fn expand(&self, id: &EntityId) {
        if let Err(e) = self.inner.host.set_collapsed(id, false) {
            tracing::warn!("Could not expand group {}: {}", id, e);
        }
    }

    pub fn ungroup(&self, id: &EntityId) {
        if let Err(e) = self.inner.host.ungroup(id) {
            tracing::warn!("Could not ungroup {}: {}", id, e);
            return;
        }
        self.inner.registry.mark_destroyed(id);
        self.forget(id);
    }

    pub async fn use_favicon_color(&self, id: &EntityId) -> AggregationOutcome {
        self.inner.aggregator.run(id).await
    }

    /// Open the color picker bound to `id`.
    pub fn set_group_color(&self, id: &EntityId) -> bool {
        let Some(picker) = self.inner.theme_picker.clone() else {
            tracing::warn!("Color picker unavailable, cannot color group {}", id);
            return false;
        };
        self.inner.theme.bind_temporary_override(id, picker)
    }

    /// The color picker closed. Returns the color applied, if any.
    pub fn picker_closed(&self) -> Option<String> {
        self.inner.theme.on_picker_closed()
    }

    /// Ask the icon picker for a new icon and apply the answer.
    pub async fn change_group_icon(&self, id: &EntityId) -> Option<IconChoice> {
        let Some(picker) = self.inner.icon_picker.clone() else {
            tracing::warn!("Icon picker unavailable, cannot change icon of group {}", id);
            return None;
        };
        let choice = picker.pick(id).await;
        let host = &self.inner.host;
        let store = &self.inner.store;
        match &choice {
            IconChoice::Selected(icon) => match host.set_icon(id, Some(icon)) {
                Ok(()) => {
                    if let Err(e) = store.put(Namespace::Icons, id, icon) {
                        tracing::warn!("Could not save icon of group {}: {}", id, e);
                    }
                    tracing::info!("Group {} icon set to {}", id, icon);
                }
                Err(e) => tracing::warn!("Could not set icon of group {}: {}", id, e),
            },
            IconChoice::Remove => {
                if let Err(e) = host.set_icon(id, None) {
                    tracing::warn!("Could not clear icon of group {}: {}", id, e);
                }
                if let Err(e) = store.remove(Namespace::Icons, id) {
                    tracing::warn!("Could not delete icon of group {}: {}", id, e);
                }
                tracing::info!("Group {} icon removed", id);
            }
            IconChoice::Cancelled => {}
        }
        Some(choice)
    }

    /// Replace a group with a folder holding the same items.
    pub fn convert_group_to_folder(&self, id: &EntityId) -> Option<EntityId> {
        let host = &self.inner.host;
        if !host.supports_folders() {
            tracing::warn!("Folders unavailable, cannot convert group {}", id);
            return None;
        }
        let group = host.entity(id).filter(|e| e.kind == EntityKind::Group)?;
        let items: Vec<String> = host.members(id).into_iter().map(|item| item.id).collect();
        if items.is_empty() {
            tracing::debug!("Group {} is empty, nothing to convert", id);
            return None;
        }

        let label = if group.label.trim().is_empty() {
            self.inner.settings.default_folder_label.clone()
        } else {
            group.label
        };
        let folder = match host.create_folder(NewFolder {
            label,
            items,
            workspace_id: group.workspace_id,
        }) {
            Ok(folder) => folder,
            Err(e) => {
                tracing::warn!("Could not convert group {} to a folder: {}", id, e);
                return None;
            }
        };

        if let Err(e) = host.remove_group(id) {
            tracing::warn!("Could not remove converted group {}: {}", id, e);
        }
        self.remove_records(id);
        self.inner.registry.mark_destroyed(id);
        self.forget(id);
        tracing::info!("Converted group {} to folder {}", id, folder);
        Some(folder)
    }

    /// Replace a folder with a new group holding its tabs.
    ///
    /// A folder with only placeholders is just deleted.
    pub async fn convert_folder_to_group(&self, folder_id: &EntityId) -> Option<EntityId> {
        let host = self.inner.host.clone();
        let folder = host
            .entity(folder_id)
            .filter(|e| e.kind == EntityKind::Folder)?;
        let tabs: Vec<_> = host
            .members(folder_id)
            .into_iter()
            .filter(|item| !item.empty_placeholder)
            .collect();

        if tabs.is_empty() {
            self.delete_folder(folder_id);
            return None;
        }

        for tab in tabs.iter().filter(|tab| tab.pinned) {
            if let Err(e) = host.unpin(&tab.id) {
                tracing::warn!("Could not unpin {}: {}", tab.id, e);
            }
        }
        let delay = self.inner.settings.folder_convert_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let label = if folder.label.trim().is_empty() {
            self.inner.settings.default_group_label.clone()
        } else {
            folder.label
        };
        let group_id = EntityId::generate();
        let created = host.create_group(NewGroup {
            id: group_id.clone(),
            label,
            items: tabs.into_iter().map(|tab| tab.id).collect(),
        });
        if let Err(e) = created {
            tracing::warn!("Could not convert folder {} to a group: {}", folder_id, e);
            return None;
        }

        self.delete_folder(folder_id);
        self.on_entity_discovered(&group_id);
        tracing::info!("Converted folder {} to group {}", folder_id, group_id);
        Some(group_id)
    }

    fn delete_folder(&self, id: &EntityId) {
        if let Err(e) = self.inner.host.delete_folder(id) {
            tracing::warn!("Could not delete folder {}: {}", id, e);
            return;
        }
        self.inner.registry.mark_destroyed(id);
    }

    fn remove_records(&self, id: &EntityId) {
        for namespace in Namespace::ALL {
            if let Err(e) = self.inner.store.remove(namespace, id) {
                tracing::warn!("Could not delete saved {} of {}: {}", namespace.as_str(), id, e);
            }
        }
    }

    // ============================================================
    // Queries
    // ============================================================

    /// Drop folders from a list of "move tab to group" candidates.
    pub fn visible_move_targets(&self, candidates: &[EntityId]) -> Vec<EntityId> {
        candidates
            .iter()
            .filter(|id| {
                self.inner
                    .host
                    .entity(id)
                    .map_or(true, |e| e.kind != EntityKind::Folder)
            })
            .cloned()
            .collect()
    }

    // ============================================================
    // Background color jobs
    // ============================================================

    fn spawn_favicon_color(&self, id: EntityId, delay: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime, skipping favicon color for group {}", id);
            return;
        };
        let aggregator = self.inner.aggregator.clone();
        let mut jobs = self.inner.color_jobs.lock();
        reap_finished(&mut jobs);
        jobs.spawn_on(
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                aggregator.run(&id).await
            },
            &handle,
        );
    }

    /// Wait for every background color job started so far.
    pub async fn settle(&self) -> Vec<AggregationOutcome> {
        let mut jobs = std::mem::take(&mut *self.inner.color_jobs.lock());
        let mut outcomes = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!("Favicon color job failed: {}", e),
            }
        }
        outcomes
    }

    /// Background color jobs still running. Finished ones are dropped.
    pub fn color_jobs_in_flight(&self) -> usize {
        let mut jobs = self.inner.color_jobs.lock();
        reap_finished(&mut jobs);
        jobs.len()
    }

    /// Drop bookkeeping for finished color jobs and retired entities.
    pub fn collect_garbage(&self) {
        reap_finished(&mut self.inner.color_jobs.lock());
        let pruned = self.inner.registry.prune_destroyed();
        if pruned > 0 {
            tracing::debug!("Forgot {} retired groups", pruned);
        }
    }

    fn abort_color_jobs(&self) {
        self.inner.color_jobs.lock().abort_all();
    }
}

fn reap_finished(jobs: &mut JoinSet<AggregationOutcome>) {
    while let Some(joined) = jobs.try_join_next() {
        if let Err(e) = joined {
            tracing::warn!("Favicon color job failed: {}", e);
        }
    }
}
