//! Error taxonomy for the composition runtime.
//!
//! Every violation is reported synchronously at the call site — nothing is
//! deferred or batched. Callers either prevent the condition up front (check
//! [`has`](crate::World::has) before relying on a dependency) or let the
//! error surface as a construction-time bug. The runtime does not attempt
//! silent recovery; the only "recovered" condition is a handler's
//! self-unsubscribe, which is normal control flow
//! ([`Outcome::Unsubscribe`](crate::events::Outcome)).

use thiserror::Error;

use crate::scene::EntityId;

/// Everything that can go wrong while composing, querying, or tearing down
/// entities.
#[derive(Debug, Error)]
pub enum Error {
    /// Two components tried to define the same non-lifecycle field on one
    /// entity. The attach aborts with no partial state; the original owner
    /// keeps the field.
    #[error("field `{field}` on {entity} is already owned by component `{owner}` (while attaching `{comp}`)")]
    FieldCollision {
        entity: EntityId,
        field: String,
        owner: String,
        comp: String,
    },

    /// A component's `require` list names an id that is not attached to the
    /// entity. Raised before any field is bound.
    #[error("component `{comp}` requires `{missing}`, which is not attached to {entity}")]
    MissingDependency {
        entity: EntityId,
        comp: String,
        missing: String,
    },

    /// Detaching `comp` would break another attached component's `require`
    /// list. The detach is rejected; both components are named.
    #[error("cannot detach `{comp}` from {entity}: component `{dependent}` still requires it")]
    StillRequired {
        entity: EntityId,
        comp: String,
        dependent: String,
    },

    /// A component declared a data field using a reserved name (`id`,
    /// `require`, or a lifecycle channel). Lifecycle behavior is registered
    /// with [`Comp::on`](crate::Comp::on), not as a field.
    #[error("`{field}` is reserved and cannot be used as a data field (component `{comp}`)")]
    ReservedField { field: String, comp: String },

    /// The entity id was never allocated or has been destroyed.
    #[error("{0} does not exist")]
    NoSuchEntity(EntityId),

    /// The entity is already linked under a parent (or is the root).
    #[error("{0} already has a parent")]
    AlreadyParented(EntityId),

    /// Linking would make an entity its own ancestor.
    #[error("linking {child} under {parent} would create a cycle")]
    HierarchyCycle { parent: EntityId, child: EntityId },

    /// The operation needs the entity to be linked into the scene graph.
    #[error("{0} is not linked into the scene")]
    NotInScene(EntityId),

    /// The root entity outlives the world; it cannot be destroyed.
    #[error("the root entity cannot be destroyed")]
    DestroyRoot,

    /// A distance query was issued from an entity with no `pos` field.
    #[error("{0} has no `pos` field for a distance query")]
    NoPosition(EntityId),
}

pub type Result<T> = std::result::Result<T, Error>;
