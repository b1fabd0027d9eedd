//! Shared record model and typed identifiers for Loomboard.
//!
//! This crate is the relational foundation: record ids, the `Record`
//! discriminated union (document / page / shape / binding), and the shape
//! patch + merge policy used by the room actor's `update_shapes` surface.
//! It has **no internal loomboard dependencies** — a pure leaf crate that
//! other crates build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Document (RecordId) ← one per session
//!     └── contains Page
//!
//! Page (RecordId)
//!     └── owns Shape via parentId (fractional `index` orders siblings)
//!
//! Shape (RecordId) ← "geo", "text", "link", "rich-text", "prediction", "arrow"
//!     └── props: opaque payload (the core reads only props.arrowId)
//!
//! Binding (RecordId)
//!     └── relates two shapes (fromId → toId)
//! ```

pub mod ids;
pub mod patch;
pub mod record;

// Re-export primary types at crate root for convenience.
pub use ids::{ClientId, RecordId, SessionCode};
pub use patch::{MergeKeys, ShapePatch, UpdateShapesOptions};
pub use record::{
    BindingRecord, DocumentRecord, JsonMap, PageRecord, Record, RecordKind, ShapeRecord,
};
