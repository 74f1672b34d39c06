//! Menu tree, per-user navigation and rendering.

pub mod navigator;
pub mod render;
pub mod session;
pub mod tree;

pub use navigator::{NavResponse, Navigator};
pub use session::InMemorySessionStore;
pub use tree::{build_menu_tree, CacheLookup, TreeCache};
