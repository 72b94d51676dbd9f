//! # Attach — Property Binder and Dependency Checker
//!
//! Attaching a [`Comp`] binds its fields onto the owning entity's surface:
//! afterwards the entity, not the component, answers `field("vel")`. Every
//! field name on one entity has exactly one owning component, tracked in a
//! single ownership table, which makes the attach contract atomic — all
//! validation (reserved names, collisions, dependencies) happens before the
//! first field is bound, so a failed attach leaves no partial state.
//!
//! Tags live here too. A tag is a bare label with no data or behavior; tags
//! and component ids are distinct namespaces and never observe each other.

use std::cell::RefCell;
use std::rc::Rc;

use crate::comp::{Comp, Op, RESERVED_FIELDS};
use crate::error::{Error, Result};
use crate::events::channel;

use super::entity::{CompSlot, CompState, EntityId};
use super::world::World;

impl World {
    // ── Components ───────────────────────────────────────────────────

    /// Attach a component. Validates dependencies and field names first;
    /// on success the component's fields become part of the entity surface
    /// and its hooks subscribe to the entity's hub. Attaching a named
    /// component whose id is already present replaces the old one.
    ///
    /// If the entity is linked, `add` hooks fire and the `use` channels
    /// trigger before this returns.
    pub fn use_comp(&mut self, e: EntityId, comp: Comp) -> Result<()> {
        self.record(e)?;

        // Re-attaching the same id is a replace: the outgoing copy skips
        // the still-required check because its successor satisfies it.
        if let Some(id) = comp.id.as_deref() {
            if self.record(e)?.comp_index.contains_key(id) {
                self.detach(e, id, true)?;
            }
        }

        let rec = self.record_mut(e)?;

        if let Some(missing) = comp
            .requires
            .iter()
            .find(|r| !rec.comp_index.contains_key(r.as_str()))
        {
            return Err(Error::MissingDependency {
                entity: e,
                comp: comp.label().to_string(),
                missing: missing.clone(),
            });
        }

        for (name, _) in &comp.fields {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(Error::ReservedField {
                    field: name.clone(),
                    comp: comp.label().to_string(),
                });
            }
            if let Some(&owner) = rec.field_owner.get(name) {
                return Err(Error::FieldCollision {
                    entity: e,
                    field: name.clone(),
                    owner: rec.owner_label(owner).to_string(),
                    comp: comp.label().to_string(),
                });
            }
        }

        // Validation passed; from here on nothing can fail.
        let key = rec.next_slot;
        rec.next_slot += 1;

        let mut state = CompState {
            id: comp.id.clone(),
            requires: comp.requires,
            fields: Default::default(),
            field_order: Vec::with_capacity(comp.fields.len()),
            add_hooks: Default::default(),
            add_fired: false,
            controllers: Vec::new(),
        };
        for (name, value) in comp.fields {
            rec.field_owner.insert(name.clone(), key);
            state.field_order.push(name.clone());
            state.fields.insert(name, value);
        }
        for (event, handler) in comp.hooks {
            if event == channel::ADD {
                state.add_hooks.push(Rc::new(RefCell::new(handler)));
            } else {
                state.controllers.push(rec.hub.on(&event, handler));
            }
        }
        if let Some(id) = &comp.id {
            rec.comp_index.insert(id.clone(), key);
        }
        let linked = rec.linked;
        rec.comps.push(CompSlot { key, state });

        if linked {
            self.fire_comp_added(e, key);
        }
        Ok(())
    }

    /// Fire a freshly attached (or freshly linked) component's one-shot
    /// `add` hooks, then announce the attach on the `use` channels.
    pub(crate) fn fire_comp_added(&mut self, e: EntityId, key: u32) {
        let Ok(rec) = self.record_mut(e) else {
            return;
        };
        let Some(slot) = rec.slot_mut(key) else {
            return;
        };
        let (hooks, id) = if slot.state.add_fired {
            (Default::default(), slot.state.id.clone())
        } else {
            slot.state.add_fired = true;
            (slot.state.add_hooks.clone(), slot.state.id.clone())
        };

        for hook in hooks {
            match hook.try_borrow_mut() {
                Ok(mut f) => {
                    (*f)(
                        self,
                        &crate::events::Event {
                            entity: e,
                            name: channel::ADD,
                            data: &(),
                        },
                    );
                }
                Err(_) => log::warn!("skipping re-entrant `add` hook on {e}"),
            }
        }
        if let Some(id) = id {
            let _ = self.trigger(e, channel::USE, &id);
            self.trigger_global(e, channel::USE, &id);
        }
    }

    /// Detach a named component. Fails if another attached component still
    /// requires it; detaching an id that isn't attached is a no-op.
    ///
    /// On success the component's fields leave the entity surface and its
    /// hub listeners are cancelled, then the `unuse` channels trigger.
    pub fn unuse(&mut self, e: EntityId, id: &str) -> Result<()> {
        self.detach(e, id, false)
    }

    fn detach(&mut self, e: EntityId, id: &str, replace: bool) -> Result<()> {
        let rec = self.record_mut(e)?;
        let Some(&key) = rec.comp_index.get(id) else {
            return Ok(());
        };

        if !replace {
            if let Some(dependent) = rec
                .comps
                .iter()
                .filter(|s| s.key != key)
                .find(|s| s.state.requires.iter().any(|r| r == id))
            {
                return Err(Error::StillRequired {
                    entity: e,
                    comp: id.to_string(),
                    dependent: dependent.state.label().to_string(),
                });
            }
        }

        let pos = rec
            .comps
            .iter()
            .position(|s| s.key == key)
            .unwrap_or_else(|| unreachable!("comp_index points at a live slot"));
        let slot = rec.comps.remove(pos);
        rec.comp_index.remove(id);
        for field in &slot.state.field_order {
            if rec.field_owner.get(field) == Some(&key) {
                rec.field_owner.remove(field);
            }
        }
        for ctl in &slot.state.controllers {
            ctl.cancel();
        }

        if rec.linked {
            let id = id.to_string();
            let _ = self.trigger(e, channel::UNUSE, &id);
            self.trigger_global(e, channel::UNUSE, &id);
        }
        Ok(())
    }

    /// Is this named component attached?
    pub fn has_comp(&self, e: EntityId, id: &str) -> bool {
        self.record(e)
            .map(|rec| rec.comp_index.contains_key(id))
            .unwrap_or(false)
    }

    /// Multi-id component check with And/Or semantics.
    pub fn has(&self, e: EntityId, ids: &[&str], op: Op) -> bool {
        match op {
            Op::And => ids.iter().all(|id| self.has_comp(e, id)),
            Op::Or => ids.iter().any(|id| self.has_comp(e, id)),
        }
    }

    /// Ids of the named components on an entity, in attach order.
    pub fn comps(&self, e: EntityId) -> Result<Vec<String>> {
        Ok(self
            .record(e)?
            .comps
            .iter()
            .filter_map(|s| s.state.id.clone())
            .collect())
    }

    // ── The entity surface ───────────────────────────────────────────

    /// Read a field off the entity surface, whichever component owns it.
    pub fn field<T: 'static>(&self, e: EntityId, name: &str) -> Option<&T> {
        let rec = self.record(e).ok()?;
        let key = *rec.field_owner.get(name)?;
        rec.slot(key)?.state.fields.get(name)?.downcast_ref::<T>()
    }

    /// Mutate a field on the entity surface.
    pub fn field_mut<T: 'static>(&mut self, e: EntityId, name: &str) -> Option<&mut T> {
        let rec = self.record_mut(e).ok()?;
        let key = *rec.field_owner.get(name)?;
        rec.slot_mut(key)?
            .state
            .fields
            .get_mut(name)?
            .downcast_mut::<T>()
    }

    /// Does the entity surface expose this field?
    pub fn has_field(&self, e: EntityId, name: &str) -> bool {
        self.record(e)
            .map(|rec| rec.field_owner.contains_key(name))
            .unwrap_or(false)
    }

    /// Read a field out of one specific component, bypassing the surface.
    pub fn comp_field<T: 'static>(&self, e: EntityId, id: &str, name: &str) -> Option<&T> {
        let rec = self.record(e).ok()?;
        let key = *rec.comp_index.get(id)?;
        rec.slot(key)?.state.fields.get(name)?.downcast_ref::<T>()
    }

    // ── Tags ─────────────────────────────────────────────────────────

    /// Add a tag. Idempotent; the `tag` channels fire only on an actual
    /// transition, and only once the entity is linked.
    pub fn tag(&mut self, e: EntityId, tag: impl Into<String>) -> Result<()> {
        let tag = tag.into();
        let rec = self.record_mut(e)?;
        if !rec.tags.insert(tag.clone()) {
            return Ok(());
        }
        rec.tag_order.push(tag.clone());
        let linked = rec.linked;
        self.tag_index.entry(tag.clone()).or_default().insert(e);
        if linked {
            let _ = self.trigger(e, channel::TAG, &tag);
            self.trigger_global(e, channel::TAG, &tag);
        }
        Ok(())
    }

    /// Remove a tag. Idempotent, mirroring [`tag`](World::tag).
    pub fn untag(&mut self, e: EntityId, tag: &str) -> Result<()> {
        let rec = self.record_mut(e)?;
        if !rec.tags.remove(tag) {
            return Ok(());
        }
        rec.tag_order.retain(|t| t != tag);
        let linked = rec.linked;
        if let Some(set) = self.tag_index.get_mut(tag) {
            set.remove(&e);
            if set.is_empty() {
                self.tag_index.remove(tag);
            }
        }
        if linked {
            let tag = tag.to_string();
            let _ = self.trigger(e, channel::UNTAG, &tag);
            self.trigger_global(e, channel::UNTAG, &tag);
        }
        Ok(())
    }

    /// Add several tags at once, in iteration order. Each behaves exactly
    /// like [`tag`](World::tag).
    pub fn tag_all<I, S>(&mut self, e: EntityId, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for t in tags {
            self.tag(e, t)?;
        }
        Ok(())
    }

    /// Remove several tags at once. Each behaves exactly like
    /// [`untag`](World::untag).
    pub fn untag_all<'a>(&mut self, e: EntityId, tags: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for t in tags {
            self.untag(e, t)?;
        }
        Ok(())
    }

    /// Does the entity carry this tag?
    pub fn is_tagged(&self, e: EntityId, tag: &str) -> bool {
        self.record(e)
            .map(|rec| rec.tags.contains(tag))
            .unwrap_or(false)
    }

    /// Multi-tag check with And/Or semantics.
    pub fn is(&self, e: EntityId, tags: &[&str], op: Op) -> bool {
        match op {
            Op::And => tags.iter().all(|t| self.is_tagged(e, t)),
            Op::Or => tags.iter().any(|t| self.is_tagged(e, t)),
        }
    }

    /// The entity's tags, in application order.
    pub fn tags(&self, e: EntityId) -> Result<Vec<String>> {
        Ok(self.record(e)?.tag_order.clone())
    }

    /// Every linked entity carrying a tag, in id order. One-shot; for a
    /// self-updating list see [`get_live`](World::get_live).
    pub fn tagged(&self, tag: &str) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self
            .tag_index
            .get(tag)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&e| self.exists(e))
            .collect();
        out.sort();
        out
    }
}
