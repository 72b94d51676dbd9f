//! # Event Hub — Name-Keyed Publish/Subscribe
//!
//! Two hub tiers share this one implementation: every entity owns a hub for
//! its own lifecycle and gameplay events, and the [`World`] owns a
//! process-wide hub that mirrors entity lifecycle transitions
//! (`add`/`destroy`/`use`/`unuse`/`tag`/`untag`). They behave identically;
//! only their lifetimes differ — an entity's hub is cancelled wholesale when
//! the entity is destroyed, the world hub lives as long as the world.
//!
//! ## Dispatch semantics
//!
//! Triggering a channel snapshots its handler list first. Handlers
//! subscribed *during* the trigger are not invoked by that trigger, and a
//! handler that was already scheduled runs even if another handler cancels
//! its controller mid-call. Liveness (cancelled/paused) is evaluated once,
//! at snapshot time. A handler detaches itself by returning
//! [`Outcome::Unsubscribe`] — an explicit result type rather than a magic
//! sentinel value.
//!
//! ## Hot-path channels
//!
//! The per-frame channels (`update`, `fixed_update`, `draw`) are dispatched
//! to every entity every frame, so they live in dedicated lists instead of
//! the name-keyed table. The subscribe/cancel contract is identical.
//!
//! The hub only *stores* handlers; invocation happens through
//! [`World::trigger`](crate::World::trigger) and friends, because every
//! handler receives `&mut World`.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::scene::{EntityId, World};

/// Well-known channel names used by the runtime itself.
pub mod channel {
    /// Entity linked into the scene graph (fires once per entity).
    pub const ADD: &str = "add";
    /// Entity removed from the scene graph (fires once per entity).
    pub const DESTROY: &str = "destroy";
    /// Named component attached. Payload: the component id (`String`).
    pub const USE: &str = "use";
    /// Named component detached. Payload: the component id (`String`).
    pub const UNUSE: &str = "unuse";
    /// Tag added. Payload: the tag (`String`).
    pub const TAG: &str = "tag";
    /// Tag removed. Payload: the tag (`String`).
    pub const UNTAG: &str = "untag";
    /// Variable-rate frame phase. Payload: delta seconds (`f32`).
    pub const UPDATE: &str = "update";
    /// Fixed-rate frame phase. Payload: the fixed step in seconds (`f32`).
    pub const FIXED_UPDATE: &str = "fixed_update";
    /// Render phase. No payload.
    pub const DRAW: &str = "draw";
}

/// What a handler wants the hub to do with it after this invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Keep the subscription.
    Continue,
    /// Drop the subscription; the handler will not run again.
    Unsubscribe,
}

/// A delivered event: the subject entity, the channel name, and a
/// type-erased payload.
pub struct Event<'a> {
    /// The entity the event is about (for entity hubs, the owner; for the
    /// world hub, the entity the lifecycle transition happened to).
    pub entity: EntityId,
    /// Channel name the event was triggered on.
    pub name: &'a str,
    /// Type-erased payload. Use [`payload`](Event::payload) to downcast.
    pub data: &'a dyn Any,
}

impl<'a> Event<'a> {
    /// Downcast the payload. Returns `None` on a type mismatch or when the
    /// event carries no payload (`&()`).
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

/// The handler shape for every channel. Handlers get full world access —
/// all dispatch is single-threaded and runs to completion.
pub type Handler = Box<dyn FnMut(&mut World, &Event<'_>) -> Outcome>;

#[derive(Default)]
struct ControlFlags {
    cancelled: Cell<bool>,
    paused: Cell<bool>,
}

/// Cancellable, pausable handle returned by every subscription.
///
/// Cloning yields another handle to the same subscription. Dropping a
/// controller does *not* unsubscribe — cancellation is always explicit
/// (or implicit through entity destruction).
#[derive(Clone)]
pub struct EventController {
    flags: Rc<ControlFlags>,
}

impl EventController {
    /// Permanently remove the listener. Idempotent.
    pub fn cancel(&self) {
        self.flags.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.get()
    }

    /// Suppress delivery without unsubscribing.
    pub fn pause(&self) {
        self.flags.paused.set(true);
    }

    /// Resume delivery after [`pause`](EventController::pause).
    pub fn resume(&self) {
        self.flags.paused.set(false);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.get()
    }
}

/// One stored subscription: the handler plus the flags shared with its
/// controller(s).
pub(crate) struct HandlerSlot {
    pub(crate) func: RefCell<Handler>,
    flags: Rc<ControlFlags>,
}

impl HandlerSlot {
    pub(crate) fn cancel(&self) {
        self.flags.cancelled.set(true);
    }

    fn cancelled(&self) -> bool {
        self.flags.cancelled.get()
    }

    fn paused(&self) -> bool {
        self.flags.paused.get()
    }
}

/// An owned snapshot of a channel, safe to iterate while handlers mutate
/// the world (and the hub) underneath it.
pub(crate) type Snapshot = SmallVec<[Rc<HandlerSlot>; 8]>;

/// Listener registry keyed by channel name, with dedicated lists for the
/// per-frame phases.
pub struct EventHub {
    channels: FxHashMap<String, Vec<Rc<HandlerSlot>>>,
    update: Vec<Rc<HandlerSlot>>,
    fixed_update: Vec<Rc<HandlerSlot>>,
    draw: Vec<Rc<HandlerSlot>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            channels: FxHashMap::default(),
            update: Vec::new(),
            fixed_update: Vec::new(),
            draw: Vec::new(),
        }
    }

    /// Subscribe a handler to a channel, in subscription order.
    pub fn on(&mut self, name: &str, handler: Handler) -> EventController {
        let flags = Rc::new(ControlFlags::default());
        let slot = Rc::new(HandlerSlot {
            func: RefCell::new(handler),
            flags: Rc::clone(&flags),
        });
        self.list_mut(name).push(slot);
        EventController { flags }
    }

    /// Drop every handler without running any teardown side effects.
    /// Used on scene transitions. Snapshots already taken keep running.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.update.clear();
        self.fixed_update.clear();
        self.draw.clear();
    }

    /// Number of live (non-cancelled) handlers on a channel.
    pub fn handler_count(&self, name: &str) -> usize {
        self.list(name).map_or(0, |l| {
            l.iter().filter(|s| !s.cancelled()).count()
        })
    }

    /// Snapshot a channel for dispatch: compact cancelled entries, then
    /// clone the live, non-paused slots. Liveness is not re-checked during
    /// the trigger — snapshot-at-trigger-start semantics.
    pub(crate) fn snapshot(&mut self, name: &str) -> Snapshot {
        let list = self.list_mut(name);
        list.retain(|s| !s.cancelled());
        list.iter().filter(|s| !s.paused()).cloned().collect()
    }

    /// Mark every handler cancelled. Entity destruction runs this so no
    /// listener on a dead entity's hub ever fires again.
    pub(crate) fn cancel_all(&self) {
        for list in self
            .channels
            .values()
            .chain([&self.update, &self.fixed_update, &self.draw])
        {
            for slot in list {
                slot.cancel();
            }
        }
    }

    fn list(&self, name: &str) -> Option<&Vec<Rc<HandlerSlot>>> {
        match name {
            channel::UPDATE => Some(&self.update),
            channel::FIXED_UPDATE => Some(&self.fixed_update),
            channel::DRAW => Some(&self.draw),
            _ => self.channels.get(name),
        }
    }

    fn list_mut(&mut self, name: &str) -> &mut Vec<Rc<HandlerSlot>> {
        match name {
            channel::UPDATE => &mut self.update,
            channel::FIXED_UPDATE => &mut self.fixed_update,
            channel::DRAW => &mut self.draw,
            _ => self.channels.entry(name.to_string()).or_default(),
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
