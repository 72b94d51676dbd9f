//! # Scene — Entity Arena, Composition, and Hierarchy
//!
//! The scene is an arena of entity records indexed by id, with parent/child
//! relations stored as id references rather than object cycles. "Does this
//! entity exist" means "is it reachable from the root", which the arena
//! tracks with a per-record flag maintained at link and destroy time.
//!
//! - [`entity`] — ids, the allocator, and the per-entity record
//! - [`world`] — the [`World`] container: arena, event hubs, resources,
//!   frame dispatch
//! - `attach` — property binder and dependency checker (`use_comp`/`unuse`,
//!   fields, tags)
//! - `hierarchy` — scene-graph linking, destruction cascade, traversal

pub mod entity;
pub mod world;

mod attach;
mod hierarchy;

pub use entity::EntityId;
pub use world::World;
