use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a group-like entity in the host tree.
///
/// The id doubles as the key under which color and icon records are persisted,
/// so it must stay stable for the lifetime of the entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate an id for an entity this crate creates itself (folder to group conversion).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What kind of container the host reports for an entity.
///
/// - `Group`: a tab group, the only kind this crate decorates
/// - `Folder`: a folder container; convertible to and from a group but never decorated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Group,
    Folder,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Folder => "folder",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "group" => Some(Self::Group),
            "folder" => Some(Self::Folder),
            _ => None,
        }
    }
}

/// Point-in-time view of a host entity.
///
/// The host owns the real object; this crate only ever sees snapshots and
/// mutates the entity through [`crate::host::EntityHost`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// User-visible name. May be empty for a freshly created group.
    pub label: String,
    /// Host placeholder label given to new groups, if the host has one.
    pub default_label: Option<String>,
    /// Linked/split views are groups the host manages itself.
    pub split_view: bool,
    /// Whether the host has finished building the entity's label container.
    pub structure_ready: bool,
    pub collapsed: bool,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub workspace_id: Option<String>,
}

impl Entity {
    /// Entities carrying an exclusion marker are never decorated.
    pub fn is_excluded(&self) -> bool {
        self.split_view || self.kind == EntityKind::Folder
    }

    /// A group counts as new while it still has no name of its own.
    pub fn has_default_label(&self) -> bool {
        self.label.is_empty() || self.default_label.as_deref() == Some(self.label.as_str())
    }
}

/// Registry view of where an entity is in its lifecycle.
///
/// - `Discovered`: seen in the host tree but not decorated (yet, or ever if excluded)
/// - `Initialized`: decorated exactly once
/// - `Destroyed`: removed from the tree or converted into another kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Discovered,
    Initialized,
    Destroyed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Initialized => "initialized",
            Self::Destroyed => "destroyed",
        }
    }
}

/// A member item (tab) of a group or folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub pinned: bool,
    /// Placeholder tabs that only exist to keep an empty folder open.
    pub empty_placeholder: bool,
    /// Favicon location; `None` when the tab has no icon source yet.
    pub favicon: Option<String>,
}

/// Input for creating a folder from a group's items.
#[derive(Debug, Clone)]
pub struct NewFolder {
    pub label: String,
    pub items: Vec<String>,
    pub workspace_id: Option<String>,
}

/// Input for creating a group from a folder's items.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub id: EntityId,
    pub label: String,
    pub items: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(label: &str) -> Entity {
        Entity {
            id: EntityId::new("g1"),
            kind: EntityKind::Group,
            label: label.to_string(),
            default_label: Some("Unnamed Group".to_string()),
            split_view: false,
            structure_ready: true,
            collapsed: false,
            color: None,
            icon: None,
            workspace_id: None,
        }
    }

    #[test]
    fn empty_or_placeholder_label_is_default() {
        assert!(group("").has_default_label());
        assert!(group("Unnamed Group").has_default_label());
        assert!(!group("Research").has_default_label());
    }

    #[test]
    fn folders_and_split_views_are_excluded() {
        let mut entity = group("Work");
        assert!(!entity.is_excluded());

        entity.split_view = true;
        assert!(entity.is_excluded());

        entity.split_view = false;
        entity.kind = EntityKind::Folder;
        assert!(entity.is_excluded());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(EntityId::generate(), EntityId::generate());
    }
}
