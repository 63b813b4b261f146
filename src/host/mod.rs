//! Boundary to the host browser shell.
//!
//! Everything tabdeck does to the outside world goes through these traits: the
//! entity tree, image loading, the shared popup menu and the two pickers. The
//! [`memory`] module implements all of them in process.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::models::{Entity, EntityId, IconChoice, Item, NewFolder, NewGroup, PickerSample};

/// Host entity API: the document tree and the operations on its groups and folders.
pub trait EntityHost: Send + Sync {
    /// Every group-like entity currently in the tree, excluded ones included.
    fn entities(&self) -> Vec<Entity>;

    fn entity(&self, id: &EntityId) -> Option<Entity>;

    fn contains(&self, id: &EntityId) -> bool {
        self.entity(id).is_some()
    }

    /// Member items of a group or folder, in display order.
    fn members(&self, id: &EntityId) -> Vec<Item>;

    fn set_label(&self, id: &EntityId, label: &str) -> Result<(), HostError>;

    fn set_collapsed(&self, id: &EntityId, collapsed: bool) -> Result<(), HostError>;

    /// Set or clear the group's color property.
    fn set_color(&self, id: &EntityId, color: Option<&str>) -> Result<(), HostError>;

    /// Set or clear the group's icon.
    fn set_icon(&self, id: &EntityId, icon: Option<&str>) -> Result<(), HostError>;

    /// Show or hide the in-place label editor markers.
    fn set_rename_marker(&self, id: &EntityId, editing: bool);

    /// Build the close/collapse/icon/color affordances on the group.
    fn attach_affordances(&self, id: &EntityId) -> Result<(), HostError>;

    fn remove_group(&self, id: &EntityId) -> Result<(), HostError>;

    /// Dissolve the group, leaving its items in place.
    fn ungroup(&self, id: &EntityId) -> Result<(), HostError>;

    /// Whether the host offers folder containers at all.
    fn supports_folders(&self) -> bool;

    fn create_folder(&self, folder: NewFolder) -> Result<EntityId, HostError>;

    fn delete_folder(&self, id: &EntityId) -> Result<(), HostError>;

    fn unpin(&self, item_id: &str) -> Result<(), HostError>;

    fn create_group(&self, group: NewGroup) -> Result<(), HostError>;
}

/// Fetches raw image bytes (favicons) by location.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Vec<u8>, HostError>;
}

/// Screen coordinates where a popup should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPosition {
    pub x: i32,
    pub y: i32,
}

impl ScreenPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// The host side of the shared group context menu.
pub trait MenuSurface: Send + Sync {
    /// Construct the popup. Called at most once per coordinator.
    fn build(&self) -> Result<(), HostError>;

    fn show(&self, position: ScreenPosition);
}

/// Icon picker widget.
#[async_trait]
pub trait IconPicker: Send + Sync {
    async fn pick(&self, entity: &EntityId) -> IconChoice;
}

/// Update hooks of the color picker widget.
///
/// The widget's own hooks apply picks to the global theme; tabdeck swaps in
/// hooks that redirect them to one group for the duration of a session.
pub trait PickerHooks: Send + Sync {
    fn update_current_workspace(&self, samples: &[PickerSample]);

    fn on_workspace_change(&self, workspace: &str);
}

/// Color picker widget.
pub trait ThemePicker: Send + Sync {
    fn hooks(&self) -> Arc<dyn PickerHooks>;

    fn install_hooks(&self, hooks: Arc<dyn PickerHooks>);

    /// Current color dots.
    fn samples(&self) -> Vec<PickerSample>;

    /// Remove per-dot color markers left on the widget's elements.
    fn clear_sample_markers(&self);

    fn open(&self) -> Result<(), HostError>;
}

/// Notifications from the host's change feed.
///
/// Duplicates and out-of-order delivery are expected and harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    EntityAdded(EntityId),
    EntityRemoved(EntityId),
    /// Platform-level signal that the user created a new group.
    GroupCreated(EntityId),
    /// The color picker popup closed.
    PickerClosed,
}
