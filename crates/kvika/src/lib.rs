//! # Kvika — Dynamic Entity/Component Composition Runtime
//!
//! A scene-graph runtime where entities are assembled at runtime from
//! component bundles ([`Comp`]) whose data fields bind directly onto the
//! entity surface, with collision and dependency checking at attach time.
//! Event hubs (per-entity and process-wide) carry all lifecycle and
//! gameplay signals; queries come in one-shot and self-updating flavors.
//!
//! Start with `use kvika::prelude::*`, build a [`Game`](game::Game), and
//! compose entities:
//!
//! ```ignore
//! use kvika::prelude::*;
//!
//! let mut world = World::new();
//! let player = world.add([
//!     Comp::new("pos").field("pos", Vec2::ZERO).into(),
//!     Comp::new("health")
//!         .field("hp", 100i32)
//!         .on("hurt", |world, ev| {
//!             let dmg = ev.payload::<i32>().copied().unwrap_or(0);
//!             *world.field_mut::<i32>(ev.entity, "hp").unwrap() -= dmg;
//!             Outcome::Continue
//!         })
//!         .into(),
//!     "player".into(),
//! ])?;
//! world.trigger(player, "hurt", &25i32)?;
//! ```

pub mod comp;
pub mod error;
pub mod events;
pub mod game;
pub mod prelude;
pub mod query;
pub mod scene;
pub mod time;

pub use comp::{Comp, Item, Op};
pub use error::{Error, Result};
pub use events::{channel, Event, EventController, EventHub, Outcome};
pub use game::{Game, Plugin};
pub use query::{DistanceOp, GetOpts, Hierarchy, LiveQuery, Only, QueryFilter};
pub use scene::{EntityId, World};
pub use time::Time;
