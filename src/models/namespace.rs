use serde::{Deserialize, Serialize};

/// One of the two independent persisted record sets.
///
/// Both map an entity id to a value string; a missing key means "no override".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Colors,
    Icons,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Colors, Namespace::Icons];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Colors => "colors",
            Self::Icons => "icons",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "colors" => Some(Self::Colors),
            "icons" => Some(Self::Icons),
            _ => None,
        }
    }

    /// File name used by the file backend.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Colors => "tab_group_colors.json",
            Self::Icons => "tab_group_icons.json",
        }
    }

    /// Key used by the key-value backend.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Self::Colors => "tab_groups.colors",
            Self::Icons => "tab_groups.icons",
        }
    }
}

/// Result of an icon picker interaction.
///
/// - `Selected`: the user chose an icon resource
/// - `Remove`: the user asked to clear the icon
/// - `Cancelled`: the picker closed without a choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconChoice {
    Selected(String),
    Remove,
    Cancelled,
}
