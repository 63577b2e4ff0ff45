//! Host-side document access for tether.
//!
//! - [`document`]: the [`HostDocument`] capability trait and native call types
//! - [`memory`]: [`MemoryDocument`], a YAML-persisted reference document
//! - [`tagger`]: identity tags stored on elements
//! - [`catalog`]: family / type / parameter listings

pub mod catalog;
pub mod document;
mod error;
pub mod memory;
pub mod tagger;

pub use document::{
    ElementClass, ElementId, Entity, HostCurve, HostDocument, HostingBehavior, Level, NativeCreate,
    Schema, StructuralUse, SystemKind,
};
pub use error::HostError;
pub use memory::MemoryDocument;
