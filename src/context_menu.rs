//! The shared group context menu.
//!
//! One popup serves every group. The coordinator remembers which group it was
//! opened for; actions read that target and the close handler clears it.
//! Actions fire before close, so they always see the target they were opened on.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::host::{MenuSurface, ScreenPosition};
use crate::models::EntityId;

/// Entries of the group context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    SetGroupColor,
    UseFaviconColor,
    Rename,
    ChangeIcon,
    Ungroup,
    ConvertToFolder,
    Close,
    ToggleCollapsed,
    Expand,
}

impl MenuAction {
    pub const ALL: [MenuAction; 9] = [
        MenuAction::SetGroupColor,
        MenuAction::UseFaviconColor,
        MenuAction::Rename,
        MenuAction::ChangeIcon,
        MenuAction::Ungroup,
        MenuAction::ConvertToFolder,
        MenuAction::Close,
        MenuAction::ToggleCollapsed,
        MenuAction::Expand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetGroupColor => "set_group_color",
            Self::UseFaviconColor => "use_favicon_color",
            Self::Rename => "rename",
            Self::ChangeIcon => "change_icon",
            Self::Ungroup => "ungroup",
            Self::ConvertToFolder => "convert_to_folder",
            Self::Close => "close",
            Self::ToggleCollapsed => "toggle_collapsed",
            Self::Expand => "expand",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == s)
    }
}

#[derive(Default)]
struct MenuState {
    built: bool,
    open: bool,
    target: Option<EntityId>,
    bound: HashSet<EntityId>,
}

pub struct ContextMenuCoordinator {
    surface: Arc<dyn MenuSurface>,
    state: Mutex<MenuState>,
}

impl ContextMenuCoordinator {
    pub fn new(surface: Arc<dyn MenuSurface>) -> Self {
        Self {
            surface,
            state: Mutex::new(MenuState::default()),
        }
    }

    /// Wire the shared menu to `id`, building the popup on first use.
    pub fn bind(&self, id: &EntityId) -> bool {
        let mut state = self.state.lock();
        if !state.built {
            if let Err(e) = self.surface.build() {
                tracing::warn!("Could not build group context menu: {}", e);
                return false;
            }
            state.built = true;
            tracing::debug!("Built shared group context menu");
        }
        state.bound.insert(id.clone());
        true
    }

    pub fn unbind(&self, id: &EntityId) {
        let mut state = self.state.lock();
        state.bound.remove(id);
        if state.target.as_ref() == Some(id) {
            state.target = None;
        }
    }

    pub fn is_bound(&self, id: &EntityId) -> bool {
        self.state.lock().bound.contains(id)
    }

    pub fn is_built(&self) -> bool {
        self.state.lock().built
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Show the menu for `id`. Ignored while the menu is already showing or
    /// when `id` was never bound.
    pub fn open(&self, id: &EntityId, position: ScreenPosition) -> bool {
        let mut state = self.state.lock();
        if state.open {
            tracing::debug!("Context menu already open, ignoring request for {}", id);
            return false;
        }
        if !state.bound.contains(id) {
            tracing::debug!("Context menu not bound to {}", id);
            return false;
        }
        state.open = true;
        state.target = Some(id.clone());
        drop(state);

        self.surface.show(position);
        true
    }

    /// Group an action should apply to, if the menu has one.
    pub fn target_for(&self, action: MenuAction) -> Option<EntityId> {
        let target = self.current_target();
        if target.is_none() {
            tracing::debug!("Menu action {} fired with no target", action.as_str());
        }
        target
    }

    pub fn current_target(&self) -> Option<EntityId> {
        self.state.lock().target.clone()
    }

    /// The popup closed, whether or not an action fired.
    pub fn on_close(&self) {
        let mut state = self.state.lock();
        state.open = false;
        state.target = None;
    }

    /// Forget targets and bindings. The built popup is kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.open = false;
        state.target = None;
        state.bound.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;

    fn coordinator() -> (MemoryHost, ContextMenuCoordinator) {
        let host = MemoryHost::new();
        let menu = ContextMenuCoordinator::new(Arc::new(host.clone()));
        (host, menu)
    }

    #[test]
    fn builds_popup_once() {
        let (host, menu) = coordinator();
        assert!(!menu.is_built());

        menu.bind(&EntityId::new("a"));
        menu.bind(&EntityId::new("b"));
        menu.bind(&EntityId::new("a"));

        assert_eq!(host.menu_builds(), 1);
        assert!(menu.is_bound(&EntityId::new("b")));
    }

    #[test]
    fn close_without_action_clears_target() {
        let (host, menu) = coordinator();
        let a = EntityId::new("a");
        let b = EntityId::new("b");
        menu.bind(&a);
        menu.bind(&b);

        assert!(menu.open(&a, ScreenPosition::new(10, 20)));
        menu.on_close();
        assert_eq!(menu.current_target(), None);

        assert!(menu.open(&b, ScreenPosition::new(30, 40)));
        assert_eq!(menu.target_for(MenuAction::Close), Some(b));
        assert_eq!(
            host.menu_shows(),
            vec![ScreenPosition::new(10, 20), ScreenPosition::new(30, 40)]
        );
    }

    #[test]
    fn refuses_second_open() {
        let (_host, menu) = coordinator();
        let a = EntityId::new("a");
        let b = EntityId::new("b");
        menu.bind(&a);
        menu.bind(&b);

        assert!(menu.open(&a, ScreenPosition::new(0, 0)));
        assert!(!menu.open(&b, ScreenPosition::new(0, 0)));
        assert_eq!(menu.current_target(), Some(a));
    }

    #[test]
    fn unbound_entities_have_no_menu() {
        let (_host, menu) = coordinator();
        assert!(!menu.open(&EntityId::new("x"), ScreenPosition::new(0, 0)));
        assert_eq!(menu.target_for(MenuAction::Rename), None);
    }

    #[test]
    fn action_names_round_trip() {
        for action in MenuAction::ALL {
            assert_eq!(MenuAction::from_str(action.as_str()), Some(action));
        }
        assert_eq!(MenuAction::from_str("explode"), None);
    }
}
