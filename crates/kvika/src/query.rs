//! # Query — One-Shot and Live Entity Selection
//!
//! Two flavors:
//!
//! - **One-shot** ([`World::get`], [`World::query`]): evaluate now, return a
//!   plain `Vec<EntityId>`.
//! - **Live** ([`World::get_live`]): evaluate now *and* keep the result
//!   current by listening on the global lifecycle channels. The shared list
//!   is spliced synchronously inside the mutation that changed membership,
//!   so between any two statements it is exactly correct — no frame-end
//!   batching, no duplicates.
//!
//! Tags and component ids are distinct namespaces; [`Only`] picks which one
//! a name list is matched against.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

use crate::comp::Op;
use crate::error::{Error, Result};
use crate::events::{channel, Outcome};
use crate::scene::{EntityId, World};

/// Which namespace a name list matches against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Only {
    /// Match the tag set (default).
    #[default]
    Tags,
    /// Match attached component ids.
    Comps,
}

/// Options for [`World::get`] and [`World::get_live`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GetOpts {
    /// Search all descendants instead of direct children.
    pub recursive: bool,
    pub only: Only,
    pub op: Op,
}

/// Which relatives [`World::query`] considers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Hierarchy {
    Children,
    Siblings,
    Ancestors,
    #[default]
    Descendants,
}

/// Comparison direction for the distance filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DistanceOp {
    /// Keep targets within the distance (default).
    #[default]
    Near,
    /// Keep targets at or beyond the distance.
    Far,
}

/// Structural filter for [`World::query`]. Start from `default()` and set
/// what you need; unset filters match everything.
#[derive(Default)]
pub struct QueryFilter {
    pub hierarchy: Hierarchy,
    /// Tags the target must carry, combined with `include_op`.
    pub include: Vec<String>,
    pub include_op: Op,
    /// Tags that disqualify a target (any one suffices).
    pub exclude: Vec<String>,
    /// Require a specific effective visibility (no hidden ancestor).
    pub visible: Option<bool>,
    /// Distance from the caller's `pos` field. Targets without `pos` are
    /// excluded.
    pub distance: Option<f32>,
    pub distance_op: DistanceOp,
    /// Exact match against a `name` field of type `String`.
    pub name: Option<String>,
}

/// A self-updating entity list returned by [`World::get_live`].
///
/// Cheap to clone; all clones observe the same list. The maintaining
/// subscriptions are held by the querying entity and die with it — after
/// that the list simply stops updating.
#[derive(Clone)]
pub struct LiveQuery {
    entities: Rc<RefCell<Vec<EntityId>>>,
}

impl LiveQuery {
    /// Copy out the current membership, in insertion order.
    pub fn entities(&self) -> Vec<EntityId> {
        self.entities.borrow().clone()
    }

    pub fn contains(&self, e: EntityId) -> bool {
        self.entities.borrow().contains(&e)
    }

    pub fn len(&self) -> usize {
        self.entities.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.borrow().is_empty()
    }
}

impl World {
    /// Does the entity match a name list in the given namespace?
    fn matches(&self, e: EntityId, names: &[String], op: Op, only: Only) -> bool {
        let one = |name: &String| match only {
            Only::Tags => self.is_tagged(e, name),
            Only::Comps => self.has_comp(e, name),
        };
        match op {
            Op::And => names.iter().all(one),
            Op::Or => names.iter().any(one),
        }
    }

    /// All descendants of an entity, pre-order. Does not include `e`.
    pub fn descendants(&self, e: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack: Vec<EntityId> = self.children(e);
        stack.reverse();
        while let Some(d) = stack.pop() {
            out.push(d);
            let children = self.children(d);
            for c in children.into_iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// One-shot query over an entity's children (or, with
    /// `opts.recursive`, all descendants) by tag or component id.
    pub fn get(&self, e: EntityId, names: &[&str], opts: GetOpts) -> Vec<EntityId> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let candidates = if opts.recursive {
            self.descendants(e)
        } else {
            self.children(e)
        };
        candidates
            .into_iter()
            .filter(|&c| self.matches(c, &names, opts.op, opts.only))
            .collect()
    }

    /// Like [`get`](World::get), but the returned list keeps itself
    /// current: entities entering or leaving scope (linked, destroyed,
    /// tagged, untagged, component attached or detached) are spliced in
    /// and out synchronously, inside the mutation itself.
    ///
    /// The maintaining subscriptions are held by `owner` and cancelled
    /// when it is destroyed.
    pub fn get_live(
        &mut self,
        owner: EntityId,
        names: &[&str],
        opts: GetOpts,
    ) -> Result<LiveQuery> {
        self.record(owner)?;
        let entities = Rc::new(RefCell::new(self.get(owner, names, opts)));
        let names: Rc<Vec<String>> = Rc::new(names.iter().map(|s| s.to_string()).collect());

        let channels: [&'static str; 4] = match opts.only {
            Only::Tags => [channel::ADD, channel::DESTROY, channel::TAG, channel::UNTAG],
            Only::Comps => [channel::ADD, channel::DESTROY, channel::USE, channel::UNUSE],
        };
        for ch in channels {
            let list = Rc::clone(&entities);
            let names = Rc::clone(&names);
            let ctl = self.on_global(ch, move |world, ev| {
                let subject = ev.entity;
                let in_scope = subject != owner
                    && world.exists(subject)
                    && if opts.recursive {
                        world.is_ancestor_of(owner, subject)
                    } else {
                        world.parent(subject) == Some(owner)
                    };
                let matched = in_scope && world.matches(subject, &names, opts.op, opts.only);
                let mut list = list.borrow_mut();
                if matched {
                    if !list.contains(&subject) {
                        list.push(subject);
                    }
                } else {
                    list.retain(|&x| x != subject);
                }
                Outcome::Continue
            });
            self.hold(owner, ctl)?;
        }
        Ok(LiveQuery { entities })
    }

    /// Structural one-shot query: pick a set of relatives, then narrow it
    /// by tags, visibility, distance, and name.
    ///
    /// A distance filter measures from this entity's `pos` field and is an
    /// error if the field is missing; *targets* without `pos` are silently
    /// excluded instead.
    pub fn query(&self, e: EntityId, filter: &QueryFilter) -> Result<Vec<EntityId>> {
        self.record(e)?;
        let candidates = match filter.hierarchy {
            Hierarchy::Children => self.children(e),
            Hierarchy::Descendants => self.descendants(e),
            Hierarchy::Siblings => match self.parent(e) {
                Some(p) => self
                    .children(p)
                    .into_iter()
                    .filter(|&c| c != e)
                    .collect(),
                None => Vec::new(),
            },
            Hierarchy::Ancestors => {
                let mut out = Vec::new();
                let mut cursor = self.parent(e);
                while let Some(p) = cursor {
                    out.push(p);
                    cursor = self.parent(p);
                }
                out
            }
        };

        let origin = match filter.distance {
            Some(_) => Some(
                self.field::<Vec2>(e, "pos")
                    .copied()
                    .ok_or(Error::NoPosition(e))?,
            ),
            None => None,
        };

        Ok(candidates
            .into_iter()
            .filter(|&t| {
                if !filter.include.is_empty()
                    && !self.matches(t, &filter.include, filter.include_op, Only::Tags)
                {
                    return false;
                }
                if filter
                    .exclude
                    .iter()
                    .any(|tag| self.is_tagged(t, tag))
                {
                    return false;
                }
                if let Some(want) = filter.visible {
                    if self.effective_visible(t) != want {
                        return false;
                    }
                }
                if let (Some(limit), Some(origin)) = (filter.distance, origin) {
                    let Some(pos) = self.field::<Vec2>(t, "pos") else {
                        return false;
                    };
                    let d = origin.distance(*pos);
                    let keep = match filter.distance_op {
                        DistanceOp::Near => d <= limit,
                        DistanceOp::Far => d >= limit,
                    };
                    if !keep {
                        return false;
                    }
                }
                if let Some(name) = &filter.name {
                    if self.field::<String>(t, "name") != Some(name) {
                        return false;
                    }
                }
                true
            })
            .collect())
    }

    /// Visible and without a hidden ancestor.
    pub fn effective_visible(&self, e: EntityId) -> bool {
        if self.hidden(e) {
            return false;
        }
        let mut cursor = self.parent(e);
        while let Some(p) = cursor {
            if self.hidden(p) {
                return false;
            }
            cursor = self.parent(p);
        }
        true
    }
}
