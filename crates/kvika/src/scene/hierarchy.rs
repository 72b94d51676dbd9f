//! # Hierarchy — Scene Graph Linking and Destruction
//!
//! Entities form a tree rooted at [`World::root`]. "Exists" means "linked
//! under the root": [`World::make`] builds detached prefabs whose `add`
//! hooks wait until [`World::attach_to`] links them, at which point the
//! whole subtree is announced pre-order. Destruction is the exact inverse,
//! children first, and guarantees that nothing owned by a destroyed entity
//! ever fires again.

use crate::comp::Item;
use crate::error::{Error, Result};
use crate::events::channel;

use super::entity::{EntityId, EntityRecord};
use super::world::World;

impl World {
    // ── Creation ─────────────────────────────────────────────────────

    /// Create an entity under the root from a list of components and tags,
    /// applied in caller order, and link it immediately.
    pub fn add(&mut self, items: impl IntoIterator<Item = Item>) -> Result<EntityId> {
        let root = self.root;
        self.add_child(root, items)
    }

    /// Create an entity under an explicit parent.
    pub fn add_child(
        &mut self,
        parent: EntityId,
        items: impl IntoIterator<Item = Item>,
    ) -> Result<EntityId> {
        self.record(parent)?;
        let e = self.make(items)?;
        self.attach_to(parent, e)?;
        Ok(e)
    }

    /// Create a detached entity: `exists()` is false, `add` hooks and
    /// lifecycle events are deferred until it is linked. Useful for
    /// building subtrees before announcing any of them.
    ///
    /// A failed item (collision, missing dependency) discards the partial
    /// entity entirely.
    pub fn make(&mut self, items: impl IntoIterator<Item = Item>) -> Result<EntityId> {
        let e = self.allocator.allocate();
        self.arena.insert(e, EntityRecord::new(false));
        for item in items {
            let applied = match item {
                Item::Comp(comp) => self.use_comp(e, comp),
                Item::Tag(tag) => self.tag(e, tag),
            };
            if let Err(err) = applied {
                self.remove_record(e);
                return Err(err);
            }
        }
        Ok(e)
    }

    /// Link a detached entity (and its subtree) under a parent. Rejects
    /// entities that are already parented (or the root) and links that
    /// would make an entity its own ancestor.
    pub fn attach_to(&mut self, parent: EntityId, entity: EntityId) -> Result<()> {
        self.record(parent)?;
        let rec = self.record(entity)?;
        if entity == self.root || rec.parent.is_some() || rec.linked {
            return Err(Error::AlreadyParented(entity));
        }
        if entity == parent || self.is_ancestor_of(entity, parent) {
            return Err(Error::HierarchyCycle { parent, child: entity });
        }

        let parent_linked = self.record(parent)?.linked;
        self.record_mut(parent)?.children.push(entity);
        self.record_mut(entity)?.parent = Some(parent);
        if parent_linked {
            self.link_subtree(entity);
        }
        Ok(())
    }

    /// Announce a freshly linked subtree, pre-order: per-component `add`
    /// hooks and `use` events, `tag` events, then the entity's own `add`
    /// event and the global `add` channel.
    fn link_subtree(&mut self, top: EntityId) {
        let mut stack = vec![top];
        while let Some(e) = stack.pop() {
            let Some(rec) = self.arena.get_mut(&e) else {
                continue;
            };
            rec.linked = true;
            let keys: Vec<u32> = rec.comps.iter().map(|s| s.key).collect();
            let tags = rec.tag_order.clone();
            for child in rec.children.iter().rev() {
                stack.push(*child);
            }

            for key in keys {
                self.fire_comp_added(e, key);
            }
            for tag in tags {
                let _ = self.trigger(e, channel::TAG, &tag);
                self.trigger_global(e, channel::TAG, &tag);
            }
            let _ = self.trigger(e, channel::ADD, &());
            self.trigger_global(e, channel::ADD, &());
        }
    }

    // ── Destruction ──────────────────────────────────────────────────

    /// Destroy an entity and its whole subtree, children first. The root
    /// cannot be destroyed; destroying an id twice is an error.
    ///
    /// For each destroyed entity: its `destroy` event fires (per-entity,
    /// then global, with `exists()` already false for the global pass),
    /// then every listener on its hub and every subscription it holds are
    /// cancelled and its tags leave the index.
    pub fn destroy(&mut self, entity: EntityId) -> Result<()> {
        if entity == self.root {
            return Err(Error::DestroyRoot);
        }
        let parent = self.record(entity)?.parent;
        if let Some(p) = parent {
            if let Some(rec) = self.arena.get_mut(&p) {
                rec.children.retain(|&c| c != entity);
            }
        }
        self.destroy_inner(entity);
        Ok(())
    }

    fn destroy_inner(&mut self, e: EntityId) {
        let Some(rec) = self.arena.get_mut(&e) else {
            return;
        };
        let was_linked = rec.linked;
        let children = rec.children.clone();
        for child in children {
            self.destroy_inner(child);
        }

        if was_linked {
            let _ = self.trigger(e, channel::DESTROY, &());
            // Unlink before the global pass so `exists()` is already false
            // inside destroy handlers and live queries splice the entity
            // out synchronously.
            if let Some(rec) = self.arena.get_mut(&e) {
                rec.linked = false;
            }
            self.trigger_global(e, channel::DESTROY, &());
        }
        self.remove_record(e);
    }

    /// Drop a record and cancel everything it owns. No events.
    fn remove_record(&mut self, e: EntityId) {
        let Some(rec) = self.arena.remove(&e) else {
            return;
        };
        rec.hub.cancel_all();
        for ctl in &rec.subscriptions {
            ctl.cancel();
        }
        for slot in &rec.comps {
            for ctl in &slot.state.controllers {
                ctl.cancel();
            }
        }
        for tag in &rec.tags {
            if let Some(set) = self.tag_index.get_mut(tag) {
                set.remove(&e);
                if set.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
    }

    /// Move an entity to the end of its parent's child list, changing its
    /// dispatch and draw order. No `add` or `destroy` events fire.
    pub fn readd(&mut self, entity: EntityId) -> Result<()> {
        let Some(parent) = self.record(entity)?.parent else {
            return Err(Error::NotInScene(entity));
        };
        let rec = self.record_mut(parent)?;
        rec.children.retain(|&c| c != entity);
        rec.children.push(entity);
        Ok(())
    }

    // ── Traversal and flags ──────────────────────────────────────────

    /// Is this entity linked into the scene graph? False for detached
    /// prefabs and destroyed ids.
    pub fn exists(&self, e: EntityId) -> bool {
        self.record(e).map(|rec| rec.linked).unwrap_or(false)
    }

    pub fn parent(&self, e: EntityId) -> Option<EntityId> {
        self.record(e).ok().and_then(|rec| rec.parent)
    }

    /// Direct children, in dispatch order.
    pub fn children(&self, e: EntityId) -> Vec<EntityId> {
        self.record(e).map(|rec| rec.children.clone()).unwrap_or_default()
    }

    /// True when `ancestor` is a strict ancestor of `e`.
    pub fn is_ancestor_of(&self, ancestor: EntityId, e: EntityId) -> bool {
        let mut cursor = self.parent(e);
        while let Some(p) = cursor {
            if p == ancestor {
                return true;
            }
            cursor = self.parent(p);
        }
        false
    }

    /// Suppress `update`/`fixed_update` for this entity and its subtree.
    pub fn set_paused(&mut self, e: EntityId, paused: bool) -> Result<()> {
        self.record_mut(e)?.paused = paused;
        Ok(())
    }

    pub fn paused(&self, e: EntityId) -> bool {
        self.record(e).map(|rec| rec.paused).unwrap_or(false)
    }

    /// Suppress `draw` for this entity and its subtree.
    pub fn set_hidden(&mut self, e: EntityId, hidden: bool) -> Result<()> {
        self.record_mut(e)?.hidden = hidden;
        Ok(())
    }

    pub fn hidden(&self, e: EntityId) -> bool {
        self.record(e).map(|rec| rec.hidden).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::comp::Comp;
    use crate::events::Outcome;

    type Log = Rc<RefCell<Vec<String>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn marker(l: &Log, name: &str) -> Comp {
        let on_add = Rc::clone(l);
        let on_destroy = Rc::clone(l);
        let add_name = format!("+{name}");
        let destroy_name = format!("-{name}");
        Comp::anonymous()
            .on_add(move |_w, _e| on_add.borrow_mut().push(add_name.clone()))
            .on_destroy(move |_w, _e| on_destroy.borrow_mut().push(destroy_name.clone()))
    }

    #[test]
    fn add_links_immediately_and_fires_hooks() {
        let mut world = World::new();
        let l = log();
        let e = world.add([marker(&l, "e").into()]).unwrap();
        assert!(world.exists(e));
        assert_eq!(world.parent(e), Some(world.root()));
        assert_eq!(*l.borrow(), vec!["+e"]);
    }

    #[test]
    fn make_defers_hooks_until_attach() {
        let mut world = World::new();
        let l = log();
        let e = world.make([marker(&l, "e").into()]).unwrap();
        assert!(!world.exists(e));
        assert!(l.borrow().is_empty());

        let root = world.root();
        world.attach_to(root, e).unwrap();
        assert!(world.exists(e));
        assert_eq!(*l.borrow(), vec!["+e"]);
    }

    #[test]
    fn prebuilt_subtree_announces_pre_order_on_link() {
        let mut world = World::new();
        let l = log();
        let parent = world.make([marker(&l, "parent").into()]).unwrap();
        let child = world.make([marker(&l, "child").into()]).unwrap();
        world.attach_to(parent, child).unwrap();
        assert!(l.borrow().is_empty());

        let root = world.root();
        world.attach_to(root, parent).unwrap();
        assert_eq!(*l.borrow(), vec!["+parent", "+child"]);
        assert!(world.exists(child));
    }

    #[test]
    fn link_announces_tags_in_application_order() {
        let mut world = World::new();
        let l = log();
        let l2 = Rc::clone(&l);
        world.on_tag(None, move |_w, _e, t| l2.borrow_mut().push(format!("{t}")));

        // "zeta" before "alpha": announcement follows the caller, not any
        // sorted or hashed order.
        let e = world.make(["zeta".into(), "alpha".into()]).unwrap();
        world.tag(e, "mid").unwrap();
        assert!(l.borrow().is_empty());

        let root = world.root();
        world.attach_to(root, e).unwrap();
        assert_eq!(*l.borrow(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(world.tags(e).unwrap(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn add_hooks_fire_once_even_across_readd() {
        let mut world = World::new();
        let l = log();
        let sibling_before = world.add([]).unwrap();
        let e = world.add([marker(&l, "e").into()]).unwrap();
        world.readd(sibling_before).unwrap();
        world.readd(e).unwrap();
        assert_eq!(*l.borrow(), vec!["+e"]);
        let root = world.root();
        assert_eq!(world.children(root), vec![sibling_before, e]);
    }

    #[test]
    fn attach_rejects_parented_root_and_cycles() {
        let mut world = World::new();
        let root = world.root();
        let a = world.add([]).unwrap();
        let b = world.make([]).unwrap();
        let c = world.make([]).unwrap();
        world.attach_to(b, c).unwrap();

        assert!(matches!(
            world.attach_to(a, root),
            Err(Error::AlreadyParented(_))
        ));
        assert!(matches!(
            world.attach_to(root, a),
            Err(Error::AlreadyParented(_))
        ));
        assert!(matches!(
            world.attach_to(c, b),
            Err(Error::HierarchyCycle { .. })
        ));
        assert!(matches!(
            world.attach_to(b, b),
            Err(Error::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn make_discards_partial_entities_on_failure() {
        let mut world = World::new();
        let count = world.entity_count();
        let err = world.make([Comp::new("body").require("pos").into()]);
        assert!(err.is_err());
        assert_eq!(world.entity_count(), count);
    }

    #[test]
    fn destroy_cascades_children_first() {
        let mut world = World::new();
        let l = log();
        let parent = world.add([marker(&l, "parent").into()]).unwrap();
        let child = world.add_child(parent, [marker(&l, "child").into()]).unwrap();
        let grandchild = world
            .add_child(child, [marker(&l, "grandchild").into()])
            .unwrap();
        l.borrow_mut().clear();

        world.destroy(parent).unwrap();
        assert_eq!(*l.borrow(), vec!["-grandchild", "-child", "-parent"]);
        for e in [parent, child, grandchild] {
            assert!(!world.exists(e));
            assert!(matches!(world.destroy(e), Err(Error::NoSuchEntity(_))));
        }
    }

    #[test]
    fn destroying_n_descendants_fires_n_plus_one_global_events() {
        let mut world = World::new();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        world.on_destroy(None, move |_w, _e| *c.borrow_mut() += 1);

        let parent = world.add([]).unwrap();
        let child = world.add_child(parent, []).unwrap();
        world.add_child(child, []).unwrap();
        world.add_child(parent, []).unwrap();

        world.destroy(parent).unwrap();
        assert_eq!(*count.borrow(), 4);
    }

    #[test]
    fn exists_is_already_false_during_global_destroy_dispatch() {
        let mut world = World::new();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        world.on_destroy(None, move |w, e| {
            *s.borrow_mut() = Some(w.exists(e));
        });
        let e = world.add([]).unwrap();
        world.destroy(e).unwrap();
        assert_eq!(*seen.borrow(), Some(false));
    }

    #[test]
    fn destroy_cancels_held_subscriptions() {
        let mut world = World::new();
        let count = Rc::new(RefCell::new(0));
        let listener = world.add([]).unwrap();
        let target = world.add([]).unwrap();
        let c = Rc::clone(&count);
        let ctl = world
            .on(target, "ping", move |_w, _ev| {
                *c.borrow_mut() += 1;
                Outcome::Continue
            })
            .unwrap();
        world.hold(listener, ctl).unwrap();

        world.trigger(target, "ping", &()).unwrap();
        world.destroy(listener).unwrap();
        world.trigger(target, "ping", &()).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn destroy_cancels_component_update_hooks() {
        let mut world = World::new();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let e = world
            .add([Comp::anonymous()
                .on_update(move |_w, _e, _dt| *c.borrow_mut() += 1)
                .into()])
            .unwrap();
        world.update(0.016);
        world.destroy(e).unwrap();
        world.update(0.016);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn root_is_indestructible() {
        let mut world = World::new();
        let root = world.root();
        assert!(matches!(world.destroy(root), Err(Error::DestroyRoot)));
    }

    #[test]
    fn readd_requires_a_parent() {
        let mut world = World::new();
        let prefab = world.make([]).unwrap();
        assert!(matches!(world.readd(prefab), Err(Error::NotInScene(_))));
        let root = world.root();
        assert!(matches!(world.readd(root), Err(Error::NotInScene(_))));
    }

    #[test]
    fn stale_ids_never_alias_new_entities() {
        let mut world = World::new();
        let old = world.add([]).unwrap();
        world.destroy(old).unwrap();
        let new = world.add([]).unwrap();
        assert_ne!(old, new);
        assert!(!world.exists(old));
        assert!(world.exists(new));
    }
}
