//! # Comp — The Normalized Component Shape
//!
//! A component is a bundle of data fields and lifecycle behavior with no
//! common base type. Instead of introspecting arbitrary objects at attach
//! time, the runtime works on one closed shape built up front:
//!
//! ```text
//! Comp {
//!     id:       Option<String>        // None = anonymous
//!     requires: [component ids]       // must already be attached
//!     fields:   [(name, Box<dyn Any>)] // become the entity's own surface
//!     hooks:    [(channel, Handler)]  // become event listeners, not fields
//! }
//! ```
//!
//! Fields are bound onto the owning entity by the property binder (see
//! [`World::use_comp`](crate::World::use_comp)); hooks are routed through
//! the entity's event hub so several components can each contribute an
//! `update` without colliding.
//!
//! ## Example
//!
//! ```ignore
//! let body = Comp::new("body")
//!     .require("pos")
//!     .field("vel", Vec2::ZERO)
//!     .on_update(|world, e, dt| {
//!         let vel = *world.field::<Vec2>(e, "vel").unwrap();
//!         *world.field_mut::<Vec2>(e, "pos").unwrap() += vel * dt;
//!     });
//! let player = world.add([body.into(), "player".into()])?;
//! ```

use std::any::Any;

use smallvec::SmallVec;

use crate::events::{channel, Event, Handler, Outcome};
use crate::scene::{EntityId, World};

/// Names a component may not use for plain data fields: the descriptor
/// keys and every channel the runtime triggers itself. Behavior for these
/// goes through [`Comp::on`] instead.
pub(crate) const RESERVED_FIELDS: &[&str] = &[
    "id",
    "require",
    channel::ADD,
    channel::DESTROY,
    channel::USE,
    channel::UNUSE,
    channel::TAG,
    channel::UNTAG,
    channel::UPDATE,
    channel::FIXED_UPDATE,
    channel::DRAW,
];

/// Boolean mode for multi-name matching in `has`/`is`/queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Op {
    /// Every name must match.
    #[default]
    And,
    /// At least one name must match.
    Or,
}

/// A component under construction. Built with the fluent methods below and
/// consumed by [`World::use_comp`](crate::World::use_comp) or an
/// [`add`](crate::World::add) item list.
pub struct Comp {
    pub(crate) id: Option<String>,
    pub(crate) requires: SmallVec<[String; 2]>,
    pub(crate) fields: Vec<(String, Box<dyn Any>)>,
    pub(crate) hooks: Vec<(String, Handler)>,
}

impl Comp {
    /// A named component. The id is what `require`, `has`, `unuse`, and the
    /// `use`/`unuse` channels refer to.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            requires: SmallVec::new(),
            fields: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// An anonymous component: it can contribute fields and hooks but
    /// cannot be looked up, required, or detached by id.
    pub fn anonymous() -> Self {
        Self {
            id: None,
            requires: SmallVec::new(),
            fields: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Declare a dependency: `id` must already be attached to the entity
    /// when this component attaches, and cannot be detached while this
    /// component remains.
    pub fn require(mut self, id: impl Into<String>) -> Self {
        self.requires.push(id.into());
        self
    }

    /// A data field, bound onto the entity surface at attach time. The name
    /// must be unique across all components on one entity.
    pub fn field<T: 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.fields.push((name.into(), Box::new(value)));
        self
    }

    /// Subscribe a handler to a channel on the owning entity's hub for as
    /// long as this component stays attached. The `add` channel is special:
    /// its hook fires exactly once, when the entity is (or becomes) linked
    /// into the scene graph.
    pub fn on(
        mut self,
        event: impl Into<String>,
        handler: impl FnMut(&mut World, &Event<'_>) -> Outcome + 'static,
    ) -> Self {
        self.hooks.push((event.into(), Box::new(handler)));
        self
    }

    /// One-shot hook for when the entity enters the scene graph.
    pub fn on_add(self, mut f: impl FnMut(&mut World, EntityId) + 'static) -> Self {
        self.on(channel::ADD, move |world, ev| {
            f(world, ev.entity);
            Outcome::Continue
        })
    }

    /// Hook for when the entity is removed from the scene graph.
    pub fn on_destroy(self, mut f: impl FnMut(&mut World, EntityId) + 'static) -> Self {
        self.on(channel::DESTROY, move |world, ev| {
            f(world, ev.entity);
            Outcome::Continue
        })
    }

    /// Per-frame variable-rate hook. Receives delta seconds.
    pub fn on_update(self, mut f: impl FnMut(&mut World, EntityId, f32) + 'static) -> Self {
        self.on(channel::UPDATE, move |world, ev| {
            let dt = ev.payload::<f32>().copied().unwrap_or(0.0);
            f(world, ev.entity, dt);
            Outcome::Continue
        })
    }

    /// Fixed-rate hook. Receives the fixed step in seconds.
    pub fn on_fixed_update(self, mut f: impl FnMut(&mut World, EntityId, f32) + 'static) -> Self {
        self.on(channel::FIXED_UPDATE, move |world, ev| {
            let dt = ev.payload::<f32>().copied().unwrap_or(0.0);
            f(world, ev.entity, dt);
            Outcome::Continue
        })
    }

    /// Render-phase hook.
    pub fn on_draw(self, mut f: impl FnMut(&mut World, EntityId) + 'static) -> Self {
        self.on(channel::DRAW, move |world, ev| {
            f(world, ev.entity);
            Outcome::Continue
        })
    }

    /// The id, or a placeholder for anonymous components (error messages).
    pub(crate) fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("<anonymous>")
    }
}

/// One element of the heterogeneous list passed to
/// [`World::add`](crate::World::add): a component or a plain string tag.
pub enum Item {
    Comp(Comp),
    Tag(String),
}

impl From<Comp> for Item {
    fn from(comp: Comp) -> Self {
        Item::Comp(comp)
    }
}

impl From<&str> for Item {
    fn from(tag: &str) -> Self {
        Item::Tag(tag.to_string())
    }
}

impl From<String> for Item {
    fn from(tag: String) -> Self {
        Item::Tag(tag)
    }
}
