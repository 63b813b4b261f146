//! In-process host: a document tree, image source, menu surface and pickers
//! held entirely in memory.
//!
//! Used by the test suites and by embedders that want to drive tabdeck
//! without a real browser shell. Inspection helpers report what tabdeck did
//! to the tree.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    EntityHost, IconPicker, ImageLoader, MenuSurface, PickerHooks, ScreenPosition, ThemePicker,
};
use crate::error::HostError;
use crate::models::{
    color_value_from_samples, Entity, EntityId, EntityKind, IconChoice, Item, NewFolder,
    NewGroup, PickerSample,
};

/// Placeholder label the in-memory host gives to new groups.
pub const PLACEHOLDER_GROUP_LABEL: &str = "Unnamed Group";

#[derive(Default)]
struct Tree {
    entities: Vec<Entity>,
    members: HashMap<EntityId, Vec<Item>>,
    loose_items: Vec<Item>,
    affordances: HashMap<EntityId, usize>,
    rename_markers: HashSet<EntityId>,
    broken: HashSet<EntityId>,
    color_writes: HashMap<EntityId, usize>,
    images: HashMap<String, Vec<u8>>,
    image_loads: usize,
    folders_unsupported: bool,
    menu_builds: usize,
    menu_shows: Vec<ScreenPosition>,
}

impl Tree {
    fn entity_mut(&mut self, id: &EntityId) -> Result<&mut Entity, HostError> {
        self.entities
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| HostError::NotFound(id.clone()))
    }

    fn remove_entity(&mut self, id: &EntityId) -> Option<Entity> {
        let index = self.entities.iter().position(|e| &e.id == id)?;
        Some(self.entities.remove(index))
    }

    /// Detach items from wherever they currently live.
    fn take_items(&mut self, ids: &[String]) -> Vec<Item> {
        let mut taken = Vec::new();
        for id in ids {
            let owned = self
                .members
                .values_mut()
                .chain(std::iter::once(&mut self.loose_items))
                .find_map(|items| {
                    let index = items.iter().position(|item| &item.id == id)?;
                    Some(items.remove(index))
                });
            if let Some(item) = owned {
                taken.push(item);
            }
        }
        taken
    }

    fn item_mut(&mut self, item_id: &str) -> Option<&mut Item> {
        self.members
            .values_mut()
            .flat_map(|items| items.iter_mut())
            .chain(self.loose_items.iter_mut())
            .find(|item| item.id == item_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryHost {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that has no folder containers.
    pub fn without_folders() -> Self {
        let host = Self::default();
        host.tree.lock().folders_unsupported = true;
        host
    }

    pub fn add_entity(&self, entity: Entity) {
        let mut tree = self.tree.lock();
        tree.members.entry(entity.id.clone()).or_default();
        tree.entities.push(entity);
    }

    pub fn add_group(&self, id: &str, label: &str) -> EntityId {
        let id = EntityId::new(id);
        self.add_entity(Entity {
            id: id.clone(),
            kind: EntityKind::Group,
            label: label.to_string(),
            default_label: Some(PLACEHOLDER_GROUP_LABEL.to_string()),
            split_view: false,
            structure_ready: true,
            collapsed: false,
            color: None,
            icon: None,
            workspace_id: Some("workspace-1".to_string()),
        });
        id
    }

    pub fn add_split_view(&self, id: &str) -> EntityId {
        let id = self.add_group(id, "Split");
        if let Ok(entity) = self.tree.lock().entity_mut(&id) {
            entity.split_view = true;
        }
        id
    }

    pub fn add_folder(&self, id: &str, label: &str) -> EntityId {
        let id = EntityId::new(id);
        self.add_entity(Entity {
            id: id.clone(),
            kind: EntityKind::Folder,
            label: label.to_string(),
            default_label: None,
            split_view: false,
            structure_ready: true,
            collapsed: false,
            color: None,
            icon: None,
            workspace_id: Some("workspace-1".to_string()),
        });
        id
    }

    pub fn add_item(&self, owner: &EntityId, item: Item) {
        self.tree
            .lock()
            .members
            .entry(owner.clone())
            .or_default()
            .push(item);
    }

    /// Add an unpinned tab with an optional favicon location.
    pub fn add_tab(&self, owner: &EntityId, item_id: &str, favicon: Option<&str>) {
        self.add_item(
            owner,
            Item {
                id: item_id.to_string(),
                pinned: false,
                empty_placeholder: false,
                favicon: favicon.map(str::to_string),
            },
        );
    }

    pub fn add_image(&self, url: &str, bytes: Vec<u8>) {
        self.tree.lock().images.insert(url.to_string(), bytes);
    }

    /// Drop an entity from the tree as if the host removed it on its own.
    pub fn remove_entity(&self, id: &EntityId) {
        let mut tree = self.tree.lock();
        tree.remove_entity(id);
        tree.members.remove(id);
    }

    pub fn set_structure_ready(&self, id: &EntityId, ready: bool) {
        if let Ok(entity) = self.tree.lock().entity_mut(id) {
            entity.structure_ready = ready;
        }
    }

    /// Make affordance construction fail for `id`.
    pub fn break_affordances(&self, id: &EntityId) {
        self.tree.lock().broken.insert(id.clone());
    }

    pub fn affordance_count(&self, id: &EntityId) -> usize {
        self.tree.lock().affordances.get(id).copied().unwrap_or(0)
    }

    pub fn has_rename_marker(&self, id: &EntityId) -> bool {
        self.tree.lock().rename_markers.contains(id)
    }

    pub fn color_writes(&self, id: &EntityId) -> usize {
        self.tree.lock().color_writes.get(id).copied().unwrap_or(0)
    }

    pub fn image_loads(&self) -> usize {
        self.tree.lock().image_loads
    }

    pub fn menu_builds(&self) -> usize {
        self.tree.lock().menu_builds
    }

    pub fn menu_shows(&self) -> Vec<ScreenPosition> {
        self.tree.lock().menu_shows.clone()
    }

    pub fn loose_items(&self) -> Vec<Item> {
        self.tree.lock().loose_items.clone()
    }
}

impl EntityHost for MemoryHost {
    fn entities(&self) -> Vec<Entity> {
        self.tree.lock().entities.clone()
    }

    fn entity(&self, id: &EntityId) -> Option<Entity> {
        self.tree.lock().entities.iter().find(|e| &e.id == id).cloned()
    }

    fn members(&self, id: &EntityId) -> Vec<Item> {
        self.tree.lock().members.get(id).cloned().unwrap_or_default()
    }

    fn set_label(&self, id: &EntityId, label: &str) -> Result<(), HostError> {
        self.tree.lock().entity_mut(id)?.label = label.to_string();
        Ok(())
    }

    fn set_collapsed(&self, id: &EntityId, collapsed: bool) -> Result<(), HostError> {
        self.tree.lock().entity_mut(id)?.collapsed = collapsed;
        Ok(())
    }

    fn set_color(&self, id: &EntityId, color: Option<&str>) -> Result<(), HostError> {
        let mut tree = self.tree.lock();
        tree.entity_mut(id)?.color = color.map(str::to_string);
        *tree.color_writes.entry(id.clone()).or_default() += 1;
        Ok(())
    }

    fn set_icon(&self, id: &EntityId, icon: Option<&str>) -> Result<(), HostError> {
        self.tree.lock().entity_mut(id)?.icon = icon.map(str::to_string);
        Ok(())
    }

    fn set_rename_marker(&self, id: &EntityId, editing: bool) {
        let mut tree = self.tree.lock();
        if editing {
            tree.rename_markers.insert(id.clone());
        } else {
            tree.rename_markers.remove(id);
        }
    }

    fn attach_affordances(&self, id: &EntityId) -> Result<(), HostError> {
        let mut tree = self.tree.lock();
        let ready = tree.entity_mut(id)?.structure_ready;
        if !ready || tree.broken.contains(id) {
            return Err(HostError::MissingStructure(id.clone()));
        }
        *tree.affordances.entry(id.clone()).or_default() += 1;
        Ok(())
    }

    fn remove_group(&self, id: &EntityId) -> Result<(), HostError> {
        let mut tree = self.tree.lock();
        tree.remove_entity(id)
            .ok_or_else(|| HostError::NotFound(id.clone()))?;
        tree.members.remove(id);
        Ok(())
    }

    fn ungroup(&self, id: &EntityId) -> Result<(), HostError> {
        let mut tree = self.tree.lock();
        tree.remove_entity(id)
            .ok_or_else(|| HostError::NotFound(id.clone()))?;
        let items = tree.members.remove(id).unwrap_or_default();
        tree.loose_items.extend(items);
        Ok(())
    }

    fn supports_folders(&self) -> bool {
        !self.tree.lock().folders_unsupported
    }

    fn create_folder(&self, folder: NewFolder) -> Result<EntityId, HostError> {
        if !self.supports_folders() {
            return Err(HostError::Unavailable("folders"));
        }
        let id = EntityId::generate();
        let mut tree = self.tree.lock();
        let items = tree.take_items(&folder.items);
        tree.entities.push(Entity {
            id: id.clone(),
            kind: EntityKind::Folder,
            label: folder.label,
            default_label: None,
            split_view: false,
            structure_ready: true,
            collapsed: false,
            color: None,
            icon: None,
            workspace_id: folder.workspace_id,
        });
        tree.members.insert(id.clone(), items);
        Ok(id)
    }

    fn delete_folder(&self, id: &EntityId) -> Result<(), HostError> {
        let mut tree = self.tree.lock();
        match tree.entities.iter().find(|e| &e.id == id) {
            Some(e) if e.kind == EntityKind::Folder => {}
            Some(_) => return Err(HostError::Failed(format!("{id} is not a folder"))),
            None => return Err(HostError::NotFound(id.clone())),
        }
        tree.remove_entity(id);
        tree.members.remove(id);
        Ok(())
    }

    fn unpin(&self, item_id: &str) -> Result<(), HostError> {
        let mut tree = self.tree.lock();
        let item = tree
            .item_mut(item_id)
            .ok_or_else(|| HostError::Failed(format!("no item {item_id}")))?;
        item.pinned = false;
        Ok(())
    }

    fn create_group(&self, group: NewGroup) -> Result<(), HostError> {
        let mut tree = self.tree.lock();
        if tree.entities.iter().any(|e| e.id == group.id) {
            return Err(HostError::Failed(format!("{} already exists", group.id)));
        }
        let items = tree.take_items(&group.items);
        tree.entities.push(Entity {
            id: group.id.clone(),
            kind: EntityKind::Group,
            label: group.label,
            default_label: Some(PLACEHOLDER_GROUP_LABEL.to_string()),
            split_view: false,
            structure_ready: true,
            collapsed: false,
            color: None,
            icon: None,
            workspace_id: Some("workspace-1".to_string()),
        });
        tree.members.insert(group.id, items);
        Ok(())
    }
}

#[async_trait]
impl ImageLoader for MemoryHost {
    async fn load(&self, url: &str) -> Result<Vec<u8>, HostError> {
        tokio::task::yield_now().await;
        let mut tree = self.tree.lock();
        tree.image_loads += 1;
        tree.images
            .get(url)
            .cloned()
            .ok_or_else(|| HostError::Failed(format!("no image at {url}")))
    }
}

impl MenuSurface for MemoryHost {
    fn build(&self) -> Result<(), HostError> {
        self.tree.lock().menu_builds += 1;
        Ok(())
    }

    fn show(&self, position: ScreenPosition) {
        self.tree.lock().menu_shows.push(position);
    }
}

/// Icon picker answering from a script of choices; `Cancelled` once exhausted.
#[derive(Clone, Default)]
pub struct MemoryIconPicker {
    choices: Arc<Mutex<VecDeque<IconChoice>>>,
    requests: Arc<Mutex<Vec<EntityId>>>,
}

impl MemoryIconPicker {
    pub fn new(choices: impl IntoIterator<Item = IconChoice>) -> Self {
        Self {
            choices: Arc::new(Mutex::new(choices.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<EntityId> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl IconPicker for MemoryIconPicker {
    async fn pick(&self, entity: &EntityId) -> IconChoice {
        self.requests.lock().push(entity.clone());
        self.choices
            .lock()
            .pop_front()
            .unwrap_or(IconChoice::Cancelled)
    }
}

/// The picker's own hooks: picks go to the global theme.
#[derive(Default)]
pub struct GlobalThemeHooks {
    applied: Mutex<Vec<String>>,
    workspace_changes: Mutex<Vec<String>>,
}

impl PickerHooks for GlobalThemeHooks {
    fn update_current_workspace(&self, samples: &[PickerSample]) {
        if let Some(value) = color_value_from_samples(samples) {
            self.applied.lock().push(value);
        }
    }

    fn on_workspace_change(&self, workspace: &str) {
        self.workspace_changes.lock().push(workspace.to_string());
    }
}

#[derive(Clone)]
pub struct MemoryThemePicker {
    global: Arc<GlobalThemeHooks>,
    hooks: Arc<Mutex<Arc<dyn PickerHooks>>>,
    samples: Arc<Mutex<Vec<PickerSample>>>,
    markers: Arc<Mutex<bool>>,
    opens: Arc<Mutex<usize>>,
    fail_open: Arc<Mutex<bool>>,
}

impl Default for MemoryThemePicker {
    fn default() -> Self {
        let global = Arc::new(GlobalThemeHooks::default());
        let hooks: Arc<dyn PickerHooks> = global.clone();
        Self {
            global,
            hooks: Arc::new(Mutex::new(hooks)),
            samples: Arc::default(),
            markers: Arc::default(),
            opens: Arc::default(),
            fail_open: Arc::default(),
        }
    }
}

impl MemoryThemePicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place dots on the picker, leaving color markers on them.
    pub fn set_samples(&self, samples: Vec<PickerSample>) {
        *self.samples.lock() = samples;
        *self.markers.lock() = true;
    }

    /// The user moved a dot: the widget calls whatever hooks are installed.
    pub fn simulate_update(&self) {
        let hooks = self.hooks.lock().clone();
        let samples = self.samples.lock().clone();
        hooks.update_current_workspace(&samples);
    }

    pub fn simulate_workspace_change(&self, workspace: &str) {
        let hooks = self.hooks.lock().clone();
        hooks.on_workspace_change(workspace);
    }

    pub fn fail_next_open(&self) {
        *self.fail_open.lock() = true;
    }

    pub fn uses_own_hooks(&self) -> bool {
        let current = self.hooks.lock().clone();
        std::ptr::addr_eq(Arc::as_ptr(&current), Arc::as_ptr(&self.global))
    }

    pub fn has_markers(&self) -> bool {
        *self.markers.lock()
    }

    pub fn opens(&self) -> usize {
        *self.opens.lock()
    }

    pub fn global_colors(&self) -> Vec<String> {
        self.global.applied.lock().clone()
    }

    pub fn global_workspace_changes(&self) -> Vec<String> {
        self.global.workspace_changes.lock().clone()
    }
}

impl ThemePicker for MemoryThemePicker {
    fn hooks(&self) -> Arc<dyn PickerHooks> {
        self.hooks.lock().clone()
    }

    fn install_hooks(&self, hooks: Arc<dyn PickerHooks>) {
        *self.hooks.lock() = hooks;
    }

    fn samples(&self) -> Vec<PickerSample> {
        self.samples.lock().clone()
    }

    fn clear_sample_markers(&self) {
        *self.markers.lock() = false;
    }

    fn open(&self) -> Result<(), HostError> {
        let mut fail = self.fail_open.lock();
        if *fail {
            *fail = false;
            return Err(HostError::Failed("picker panel did not open".to_string()));
        }
        *self.opens.lock() += 1;
        Ok(())
    }
}
