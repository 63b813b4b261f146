//! Per-group customization and lifecycle coordination for tabbed browsing shells.
//!
//! Build a [`TabGroups`] from the host collaborators, a [`PersistentStore`] and
//! [`Settings`], then call [`TabGroups::start`] inside a tokio runtime.

pub mod aggregator;
pub mod config;
pub mod context_menu;
pub mod error;
pub mod host;
pub mod models;
pub mod registry;
pub mod rename;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod theme_bridge;

pub use config::Settings;
pub use error::{HostError, StoreError};
pub use service::{Collaborators, Runtime, TabGroups};
pub use store::PersistentStore;
