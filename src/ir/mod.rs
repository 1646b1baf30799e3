//! Canonical type model shared by the builder, archive, and diff engine.

pub mod environment;
pub mod render;
pub mod types;

pub use environment::{Environment, Reservation};
pub use types::{Enumerator, Field, Qualifiers, RecordKind, Type, TypeRef};
