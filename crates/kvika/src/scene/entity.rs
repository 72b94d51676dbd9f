//! Entity identity and per-entity storage.
//!
//! Ids are monotonically increasing and never reused while the process
//! runs, so a stale id can never silently alias a newer entity — lookups
//! against the arena just miss.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::events::{EventController, EventHub, Handler};

/// Unique identity of an entity. Immutable once assigned, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity #{}", self.0)
    }
}

/// Hands out fresh ids. A plain counter — no recycling.
pub(crate) struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    pub(crate) fn new() -> Self {
        Self { next: 0 }
    }

    pub(crate) fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }
}

/// The normalized state of one attached component.
pub(crate) struct CompState {
    pub(crate) id: Option<String>,
    pub(crate) requires: SmallVec<[String; 2]>,
    /// Field storage. The entity surface resolves here through the
    /// ownership table on the record.
    pub(crate) fields: FxHashMap<String, Box<dyn Any>>,
    /// Field names in declaration order, for exact teardown.
    pub(crate) field_order: Vec<String>,
    /// One-shot `add` hooks, fired when the entity is (or becomes) linked.
    /// Kept out of the hub so they cannot fire twice.
    pub(crate) add_hooks: SmallVec<[Rc<RefCell<Handler>>; 1]>,
    pub(crate) add_fired: bool,
    /// Controllers for every hub listener this component registered;
    /// cancelled on detach.
    pub(crate) controllers: Vec<EventController>,
}

impl CompState {
    pub(crate) fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("<anonymous>")
    }
}

/// An attached component plus its stable per-entity slot key. Keys are
/// never reused within an entity, so the field-ownership table stays valid
/// across detaches.
pub(crate) struct CompSlot {
    pub(crate) key: u32,
    pub(crate) state: CompState,
}

/// Everything the arena stores per entity.
pub(crate) struct EntityRecord {
    /// Attached components in attach order.
    pub(crate) comps: Vec<CompSlot>,
    /// Component id -> slot key, for named components only.
    pub(crate) comp_index: FxHashMap<String, u32>,
    /// Field name -> owning slot key. The single ownership table that
    /// makes "assign if absent, else collision" atomic.
    pub(crate) field_owner: FxHashMap<String, u32>,
    pub(crate) next_slot: u32,
    pub(crate) tags: FxHashSet<String>,
    /// Tags in application order, for link-time announcement.
    pub(crate) tag_order: Vec<String>,
    /// Child ids in dispatch order.
    pub(crate) children: Vec<EntityId>,
    /// Weak back-reference: the parent owns the child, not vice versa.
    pub(crate) parent: Option<EntityId>,
    pub(crate) hub: EventHub,
    /// Controllers this entity holds as a *subscriber* (world-hub
    /// listeners, cross-entity listeners). All cancelled on destroy.
    pub(crate) subscriptions: Vec<EventController>,
    /// Suppresses update/fixed_update dispatch for the whole subtree.
    pub(crate) paused: bool,
    /// Suppresses draw dispatch for the whole subtree.
    pub(crate) hidden: bool,
    /// Reachable from the root. Maintained by link/destroy.
    pub(crate) linked: bool,
}

impl EntityRecord {
    pub(crate) fn new(linked: bool) -> Self {
        Self {
            comps: Vec::new(),
            comp_index: FxHashMap::default(),
            field_owner: FxHashMap::default(),
            next_slot: 0,
            tags: FxHashSet::default(),
            tag_order: Vec::new(),
            children: Vec::new(),
            parent: None,
            hub: EventHub::new(),
            subscriptions: Vec::new(),
            paused: false,
            hidden: false,
            linked,
        }
    }

    pub(crate) fn slot(&self, key: u32) -> Option<&CompSlot> {
        self.comps.iter().find(|s| s.key == key)
    }

    pub(crate) fn slot_mut(&mut self, key: u32) -> Option<&mut CompSlot> {
        self.comps.iter_mut().find(|s| s.key == key)
    }

    /// Label of the component owning a slot key, for collision errors.
    pub(crate) fn owner_label(&self, key: u32) -> &str {
        self.slot(key).map_or("<anonymous>", |s| s.state.label())
    }
}
