//! # World — The Central Container
//!
//! The [`World`] owns every entity record, the process-wide event hub, the
//! tag index, and global resources. It is the single source of truth and
//! the only thing handlers receive besides the event itself.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ World                                                  │
//! │                                                        │
//! │  arena: FxHashMap<EntityId, EntityRecord>              │
//! │    components, fields, tags, children, per-entity hub  │
//! │                                                        │
//! │  hub: EventHub (process-wide)                          │
//! │    add / destroy / use / unuse / tag / untag mirrors   │
//! │                                                        │
//! │  tag_index: tag -> set of entities                     │
//! │  resources: TypeId -> Box<dyn Any>                     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is single-threaded and cooperative: component hooks, event
//! handlers, and live-query updates run to completion before the next one
//! starts, so no locking exists anywhere. The one mutation-during-iteration
//! hazard — a handler editing the very channel being dispatched — is
//! defended by snapshotting the channel at trigger start.

use std::any::{Any, TypeId};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::events::{channel, Event, EventController, EventHub, Outcome, Snapshot};

use super::entity::{EntityAllocator, EntityId, EntityRecord};

/// Subtree pruning applied during a frame-phase walk.
#[derive(Clone, Copy)]
enum Gate {
    /// Generic dispatch: visit everything.
    None,
    /// Skip paused subtrees (update / fixed_update).
    Paused,
    /// Skip hidden subtrees (draw).
    Hidden,
}

/// The scene container: entity arena, event hubs, tag index, resources.
pub struct World {
    pub(crate) arena: FxHashMap<EntityId, EntityRecord>,
    pub(crate) allocator: EntityAllocator,
    pub(crate) root: EntityId,
    /// The process-wide hub. Explicitly owned here — never ambient state —
    /// so its lifetime is the world's lifetime.
    pub(crate) hub: EventHub,
    pub(crate) tag_index: FxHashMap<String, FxHashSet<EntityId>>,
    resources: FxHashMap<TypeId, Box<dyn Any>>,
}

impl World {
    /// Create an empty world with a root entity already linked.
    pub fn new() -> Self {
        let mut allocator = EntityAllocator::new();
        let root = allocator.allocate();
        let mut arena = FxHashMap::default();
        arena.insert(root, EntityRecord::new(true));
        Self {
            arena,
            allocator,
            root,
            hub: EventHub::new(),
            tag_index: FxHashMap::default(),
            resources: FxHashMap::default(),
        }
    }

    /// The root of the scene graph. Always exists; cannot be destroyed.
    pub fn root(&self) -> EntityId {
        self.root
    }

    /// Number of entity records in the arena (including detached prefabs).
    pub fn entity_count(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn record(&self, e: EntityId) -> Result<&EntityRecord> {
        self.arena.get(&e).ok_or(Error::NoSuchEntity(e))
    }

    pub(crate) fn record_mut(&mut self, e: EntityId) -> Result<&mut EntityRecord> {
        self.arena.get_mut(&e).ok_or(Error::NoSuchEntity(e))
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Subscribe to a channel on an entity's own hub. The subscription dies
    /// with the entity; cancel earlier through the returned controller.
    pub fn on(
        &mut self,
        e: EntityId,
        name: &str,
        handler: impl FnMut(&mut World, &Event<'_>) -> Outcome + 'static,
    ) -> Result<EventController> {
        Ok(self.record_mut(e)?.hub.on(name, Box::new(handler)))
    }

    /// Trigger a channel on an entity's hub. Delivery follows subscription
    /// order over a snapshot taken before the first handler runs.
    pub fn trigger(&mut self, e: EntityId, name: &str, data: &dyn Any) -> Result<()> {
        let slots = self.record_mut(e)?.hub.snapshot(name);
        self.run_slots(e, name, data, slots);
        Ok(())
    }

    /// Subscribe to a channel on the process-wide hub. Persists until
    /// cancelled; pair with [`hold`](World::hold) to tie it to an entity.
    pub fn on_global(
        &mut self,
        name: &str,
        handler: impl FnMut(&mut World, &Event<'_>) -> Outcome + 'static,
    ) -> EventController {
        self.hub.on(name, Box::new(handler))
    }

    /// Trigger a channel on the process-wide hub, naming a subject entity.
    pub fn trigger_global(&mut self, subject: EntityId, name: &str, data: &dyn Any) {
        let slots = self.hub.snapshot(name);
        self.run_slots(subject, name, data, slots);
    }

    /// Tie a subscriber-side controller to an entity: destroying the entity
    /// cancels it. This is how an entity "owns" listeners it registered on
    /// the world hub or on other entities.
    pub fn hold(&mut self, owner: EntityId, controller: EventController) -> Result<()> {
        self.record_mut(owner)?.subscriptions.push(controller);
        Ok(())
    }

    /// Drop every handler on the process-wide hub without teardown.
    pub fn clear_global_handlers(&mut self) {
        self.hub.clear();
    }

    /// Drop every handler on one entity's hub without teardown.
    pub fn clear_handlers(&mut self, e: EntityId) -> Result<()> {
        self.record_mut(e)?.hub.clear();
        Ok(())
    }

    /// Invoke a snapshot of handlers. A handler returning
    /// [`Outcome::Unsubscribe`] is cancelled after its invocation.
    /// Re-entrant invocation of the *same* handler is suppressed.
    pub(crate) fn run_slots(
        &mut self,
        e: EntityId,
        name: &str,
        data: &dyn Any,
        slots: Snapshot,
    ) {
        for slot in slots {
            let outcome = match slot.func.try_borrow_mut() {
                Ok(mut f) => (*f)(self, &Event { entity: e, name, data }),
                Err(_) => {
                    log::warn!("skipping re-entrant invocation of a `{name}` handler on {e}");
                    continue;
                }
            };
            if outcome == Outcome::Unsubscribe {
                slot.cancel();
            }
        }
    }

    // ── Process-wide lifecycle mirrors ───────────────────────────────

    /// Run `f` whenever an entity is linked into the scene graph. With a
    /// filter, only for entities carrying that tag.
    pub fn on_add(
        &mut self,
        filter: Option<&str>,
        f: impl FnMut(&mut World, EntityId) + 'static,
    ) -> EventController {
        self.mirror_subject(channel::ADD, filter, f)
    }

    /// Run `f` whenever an entity is destroyed. With a filter, only for
    /// entities carrying that tag.
    pub fn on_destroy(
        &mut self,
        filter: Option<&str>,
        f: impl FnMut(&mut World, EntityId) + 'static,
    ) -> EventController {
        self.mirror_subject(channel::DESTROY, filter, f)
    }

    /// Run `f` whenever a named component is attached anywhere. With a
    /// filter, only for that component id.
    pub fn on_use(
        &mut self,
        filter: Option<&str>,
        f: impl FnMut(&mut World, EntityId, &str) + 'static,
    ) -> EventController {
        self.mirror_payload(channel::USE, filter, f)
    }

    /// Run `f` whenever a named component is detached anywhere.
    pub fn on_unuse(
        &mut self,
        filter: Option<&str>,
        f: impl FnMut(&mut World, EntityId, &str) + 'static,
    ) -> EventController {
        self.mirror_payload(channel::UNUSE, filter, f)
    }

    /// Run `f` whenever a tag is added anywhere. With a filter, only for
    /// that tag.
    pub fn on_tag(
        &mut self,
        filter: Option<&str>,
        f: impl FnMut(&mut World, EntityId, &str) + 'static,
    ) -> EventController {
        self.mirror_payload(channel::TAG, filter, f)
    }

    /// Run `f` whenever a tag is removed anywhere.
    pub fn on_untag(
        &mut self,
        filter: Option<&str>,
        f: impl FnMut(&mut World, EntityId, &str) + 'static,
    ) -> EventController {
        self.mirror_payload(channel::UNTAG, filter, f)
    }

    fn mirror_subject(
        &mut self,
        ch: &'static str,
        filter: Option<&str>,
        mut f: impl FnMut(&mut World, EntityId) + 'static,
    ) -> EventController {
        let filter = filter.map(str::to_string);
        self.hub.on(
            ch,
            Box::new(move |world: &mut World, ev: &Event<'_>| {
                if let Some(tag) = &filter {
                    if !world.is_tagged(ev.entity, tag) {
                        return Outcome::Continue;
                    }
                }
                f(world, ev.entity);
                Outcome::Continue
            }),
        )
    }

    fn mirror_payload(
        &mut self,
        ch: &'static str,
        filter: Option<&str>,
        mut f: impl FnMut(&mut World, EntityId, &str) + 'static,
    ) -> EventController {
        let filter = filter.map(str::to_string);
        self.hub.on(
            ch,
            Box::new(move |world: &mut World, ev: &Event<'_>| {
                let Some(value) = ev.payload::<String>() else {
                    return Outcome::Continue;
                };
                if let Some(want) = &filter {
                    if want != value {
                        return Outcome::Continue;
                    }
                }
                f(world, ev.entity, value);
                Outcome::Continue
            }),
        )
    }

    // ── Frame dispatch ───────────────────────────────────────────────

    /// Dispatch the `fixed_update` channel over the scene graph, pre-order
    /// in child-list order. Paused subtrees are skipped. Within a frame,
    /// run all fixed steps before [`update`](World::update).
    pub fn fixed_update(&mut self, dt: f32) {
        self.dispatch(channel::FIXED_UPDATE, &dt, Gate::Paused);
    }

    /// Dispatch the `update` channel over the scene graph.
    pub fn update(&mut self, dt: f32) {
        self.dispatch(channel::UPDATE, &dt, Gate::Paused);
    }

    /// Dispatch the `draw` channel over the scene graph. Hidden subtrees
    /// are skipped.
    pub fn draw(&mut self) {
        self.dispatch(channel::DRAW, &(), Gate::Hidden);
    }

    /// Dispatch an arbitrary channel to every entity in the scene graph,
    /// with no pruning.
    pub fn broadcast(&mut self, name: &str, data: &dyn Any) {
        self.dispatch(name, data, Gate::None);
    }

    fn dispatch(&mut self, name: &str, data: &dyn Any, gate: Gate) {
        let mut stack = vec![self.root];
        while let Some(e) = stack.pop() {
            // Entities destroyed earlier in this walk just miss.
            let Some(rec) = self.arena.get_mut(&e) else {
                continue;
            };
            let pruned = match gate {
                Gate::None => false,
                Gate::Paused => rec.paused,
                Gate::Hidden => rec.hidden,
            };
            if pruned {
                continue;
            }
            let slots = rec.hub.snapshot(name);
            for child in rec.children.iter().rev() {
                stack.push(*child);
            }
            self.run_slots(e, name, data, slots);
        }
    }

    // ── Resources ────────────────────────────────────────────────────

    /// Insert a resource (singleton value). Replaces any existing resource
    /// of the same type.
    pub fn insert_resource<T: 'static>(&mut self, value: T) {
        self.resources.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a shared reference to a resource.
    ///
    /// # Panics
    ///
    /// Panics if the resource hasn't been inserted.
    pub fn resource<T: 'static>(&self) -> &T {
        self.get_resource::<T>().unwrap_or_else(|| {
            panic!(
                "Resource `{}` not found. Did you forget to insert it?",
                std::any::type_name::<T>()
            )
        })
    }

    /// Get a mutable reference to a resource.
    ///
    /// # Panics
    ///
    /// Panics if the resource hasn't been inserted.
    pub fn resource_mut<T: 'static>(&mut self) -> &mut T {
        match self.get_resource_mut::<T>() {
            Some(r) => r,
            None => panic!(
                "Resource `{}` not found. Did you forget to insert it?",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Try to get a shared reference to a resource.
    pub fn get_resource<T: 'static>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|r| r.downcast_ref::<T>())
    }

    /// Try to get a mutable reference to a resource.
    pub fn get_resource_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|r| r.downcast_mut::<T>())
    }

    /// Remove a resource, taking ownership.
    pub fn remove_resource<T: 'static>(&mut self) -> Option<T> {
        self.resources
            .remove(&TypeId::of::<T>())
            .and_then(|r| r.downcast::<T>().ok())
            .map(|b| *b)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::comp::Comp;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn trigger_delivers_in_subscription_order() {
        let mut world = World::new();
        let e = world.add([]).unwrap();
        let l = log();
        for name in ["first", "second", "third"] {
            let l2 = Rc::clone(&l);
            world
                .on(e, "ping", move |_w, _ev| {
                    l2.borrow_mut().push(name);
                    Outcome::Continue
                })
                .unwrap();
        }
        world.trigger(e, "ping", &()).unwrap();
        assert_eq!(*l.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn payload_downcasts() {
        let mut world = World::new();
        let e = world.add([]).unwrap();
        let l = log();
        let l2 = Rc::clone(&l);
        world
            .on(e, "hurt", move |_w, ev| {
                assert_eq!(ev.payload::<i32>(), Some(&7));
                assert_eq!(ev.payload::<String>(), None);
                l2.borrow_mut().push("hit");
                Outcome::Continue
            })
            .unwrap();
        world.trigger(e, "hurt", &7i32).unwrap();
        assert_eq!(l.borrow().len(), 1);
    }

    #[test]
    fn handler_added_mid_trigger_waits_for_the_next_trigger() {
        let mut world = World::new();
        let e = world.add([]).unwrap();
        let l = log();
        let l2 = Rc::clone(&l);
        world
            .on(e, "ping", move |w, ev| {
                l2.borrow_mut().push("outer");
                let l3 = Rc::clone(&l2);
                w.on(ev.entity, "ping", move |_w, _ev| {
                    l3.borrow_mut().push("inner");
                    Outcome::Continue
                })
                .unwrap();
                Outcome::Continue
            })
            .unwrap();

        world.trigger(e, "ping", &()).unwrap();
        assert_eq!(*l.borrow(), vec!["outer"]);

        world.trigger(e, "ping", &()).unwrap();
        assert_eq!(*l.borrow(), vec!["outer", "outer", "inner"]);
    }

    #[test]
    fn cancelling_mid_trigger_does_not_unschedule_this_call() {
        // A handler already scheduled for this trigger still runs when an
        // earlier handler cancels it, and never runs again afterwards.
        let mut world = World::new();
        let e = world.add([]).unwrap();
        let l = log();

        let victim_ctl: Rc<RefCell<Option<EventController>>> = Rc::new(RefCell::new(None));
        let vc = Rc::clone(&victim_ctl);
        let l2 = Rc::clone(&l);
        world
            .on(e, "ping", move |_w, _ev| {
                l2.borrow_mut().push("assassin");
                if let Some(ctl) = vc.borrow().as_ref() {
                    ctl.cancel();
                }
                Outcome::Continue
            })
            .unwrap();
        let l3 = Rc::clone(&l);
        let ctl = world
            .on(e, "ping", move |_w, _ev| {
                l3.borrow_mut().push("victim");
                Outcome::Continue
            })
            .unwrap();
        *victim_ctl.borrow_mut() = Some(ctl);

        world.trigger(e, "ping", &()).unwrap();
        assert_eq!(*l.borrow(), vec!["assassin", "victim"]);

        world.trigger(e, "ping", &()).unwrap();
        assert_eq!(*l.borrow(), vec!["assassin", "victim", "assassin"]);
    }

    #[test]
    fn unsubscribe_outcome_detaches_synchronously() {
        let mut world = World::new();
        let e = world.add([]).unwrap();
        let l = log();
        let l2 = Rc::clone(&l);
        world
            .on(e, "ping", move |_w, _ev| {
                l2.borrow_mut().push("once");
                Outcome::Unsubscribe
            })
            .unwrap();
        world.trigger(e, "ping", &()).unwrap();
        world.trigger(e, "ping", &()).unwrap();
        assert_eq!(*l.borrow(), vec!["once"]);
    }

    #[test]
    fn paused_controller_suppresses_delivery_without_unsubscribing() {
        let mut world = World::new();
        let e = world.add([]).unwrap();
        let l = log();
        let l2 = Rc::clone(&l);
        let ctl = world
            .on(e, "ping", move |_w, _ev| {
                l2.borrow_mut().push("ping");
                Outcome::Continue
            })
            .unwrap();

        ctl.pause();
        world.trigger(e, "ping", &()).unwrap();
        assert!(l.borrow().is_empty());

        ctl.resume();
        world.trigger(e, "ping", &()).unwrap();
        assert_eq!(*l.borrow(), vec!["ping"]);
    }

    #[test]
    fn re_entrant_trigger_runs_other_handlers_but_not_itself() {
        let mut world = World::new();
        let e = world.add([]).unwrap();
        let l = log();
        let depth = Rc::new(RefCell::new(0));
        let l2 = Rc::clone(&l);
        world
            .on(e, "ping", move |w, ev| {
                l2.borrow_mut().push("recursive");
                let mut d = depth.borrow_mut();
                if *d == 0 {
                    *d += 1;
                    drop(d);
                    w.trigger(ev.entity, "ping", &()).unwrap();
                }
                Outcome::Continue
            })
            .unwrap();
        let l3 = Rc::clone(&l);
        world
            .on(e, "ping", move |_w, _ev| {
                l3.borrow_mut().push("plain");
                Outcome::Continue
            })
            .unwrap();

        world.trigger(e, "ping", &()).unwrap();
        // The nested trigger skips the handler that is mid-invocation and
        // delivers to the other one.
        assert_eq!(*l.borrow(), vec!["recursive", "plain", "plain"]);
    }

    #[test]
    fn global_mirrors_filter_by_tag() {
        let mut world = World::new();
        let l = log();
        let l2 = Rc::clone(&l);
        world.on_add(Some("enemy"), move |_w, _e| {
            l2.borrow_mut().push("enemy added");
        });
        world.add(["enemy".into()]).unwrap();
        world.add(["friend".into()]).unwrap();
        assert_eq!(*l.borrow(), vec!["enemy added"]);
    }

    #[test]
    fn update_dispatch_is_pre_order_in_child_list_order() {
        let mut world = World::new();
        let l = log();
        let mark = |l: &Log, name: &'static str| {
            let l2 = Rc::clone(l);
            Comp::anonymous().on_update(move |_w, _e, _dt| l2.borrow_mut().push(name))
        };
        let parent = world.add([mark(&l, "parent").into()]).unwrap();
        world.add_child(parent, [mark(&l, "first").into()]).unwrap();
        world.add_child(parent, [mark(&l, "second").into()]).unwrap();

        world.update(0.016);
        assert_eq!(*l.borrow(), vec!["parent", "first", "second"]);
    }

    #[test]
    fn paused_prunes_update_but_not_draw() {
        let mut world = World::new();
        let l = log();
        let l2 = Rc::clone(&l);
        let l3 = Rc::clone(&l);
        let comp = Comp::anonymous()
            .on_update(move |_w, _e, _dt| l2.borrow_mut().push("update"))
            .on_draw(move |_w, _e| l3.borrow_mut().push("draw"));
        let e = world.add([comp.into()]).unwrap();

        world.set_paused(e, true).unwrap();
        world.update(0.016);
        world.draw();
        assert_eq!(*l.borrow(), vec!["draw"]);

        l.borrow_mut().clear();
        world.set_paused(e, false).unwrap();
        world.set_hidden(e, true).unwrap();
        world.update(0.016);
        world.draw();
        assert_eq!(*l.borrow(), vec!["update"]);
    }

    #[test]
    fn paused_parent_prunes_descendants() {
        let mut world = World::new();
        let l = log();
        let l2 = Rc::clone(&l);
        let parent = world.add([]).unwrap();
        world
            .add_child(
                parent,
                [Comp::anonymous()
                    .on_update(move |_w, _e, _dt| l2.borrow_mut().push("child"))
                    .into()],
            )
            .unwrap();
        world.set_paused(parent, true).unwrap();
        world.update(0.016);
        assert!(l.borrow().is_empty());
    }

    #[test]
    fn broadcast_reaches_paused_and_hidden_entities() {
        let mut world = World::new();
        let l = log();
        let l2 = Rc::clone(&l);
        let e = world.add([]).unwrap();
        world
            .on(e, "level_over", move |_w, _ev| {
                l2.borrow_mut().push("heard");
                Outcome::Continue
            })
            .unwrap();
        world.set_paused(e, true).unwrap();
        world.set_hidden(e, true).unwrap();
        world.broadcast("level_over", &());
        assert_eq!(*l.borrow(), vec!["heard"]);
    }

    #[test]
    fn clear_handlers_drops_without_teardown() {
        let mut world = World::new();
        let e = world.add([]).unwrap();
        let l = log();
        let l2 = Rc::clone(&l);
        let ctl = world
            .on(e, "ping", move |_w, _ev| {
                l2.borrow_mut().push("ping");
                Outcome::Continue
            })
            .unwrap();
        world.clear_handlers(e).unwrap();
        world.trigger(e, "ping", &()).unwrap();
        assert!(l.borrow().is_empty());
        assert!(!ctl.is_cancelled());
    }

    #[test]
    fn clear_global_handlers_drops_mirrors_without_teardown() {
        let mut world = World::new();
        let l = log();
        let l2 = Rc::clone(&l);
        world.on_add(None, move |_w, _e| l2.borrow_mut().push("added"));
        let l3 = Rc::clone(&l);
        let ctl = world.on_global("level_over", move |_w, _ev| {
            l3.borrow_mut().push("over");
            Outcome::Continue
        });

        world.clear_global_handlers();
        let e = world.add([]).unwrap();
        world.trigger_global(e, "level_over", &());
        assert!(l.borrow().is_empty());
        // clear() runs no teardown: the controller was not cancelled.
        assert!(!ctl.is_cancelled());
    }

    #[test]
    fn resources_round_trip() {
        let mut world = World::new();
        world.insert_resource(42u32);
        world.insert_resource(String::from("hello"));

        assert_eq!(*world.resource::<u32>(), 42);
        *world.resource_mut::<u32>() = 99;
        assert_eq!(*world.resource::<u32>(), 99);

        assert_eq!(world.remove_resource::<String>(), Some("hello".into()));
        assert!(world.get_resource::<String>().is_none());
    }

    #[test]
    #[should_panic(expected = "not found")]
    fn missing_resource_panics() {
        let world = World::new();
        world.resource::<f64>();
    }
}
