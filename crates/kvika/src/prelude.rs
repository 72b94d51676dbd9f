//! Convenience re-exports — `use kvika::prelude::*` for the common items.
//!
//! Types only — all functionality is discoverable through methods on
//! [`World`] and the builders.

pub use crate::comp::{Comp, Item, Op};
pub use crate::error::{Error, Result};
pub use crate::events::{channel, Event, EventController, Outcome};
pub use crate::game::{Game, Plugin};
pub use crate::query::{DistanceOp, GetOpts, Hierarchy, LiveQuery, Only, QueryFilter};
pub use crate::scene::{EntityId, World};
pub use crate::time::Time;

pub use glam::Vec2;
