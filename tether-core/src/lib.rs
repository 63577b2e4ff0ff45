//! Tether core library: domain types, bridge configuration, errors.
//!
//! Public API surface:
//! - [`types`]: incoming objects, placements, parameters, identity tags
//! - [`geometry`]: points, vectors, bounding boxes
//! - [`config`]: [`BridgeConfig`] load / save
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod geometry;
pub mod types;

pub use config::{BridgeConfig, CommitPolicy};
pub use error::CoreError;
pub use geometry::{BoundingBox, Point3, Vector3};
pub use types::{
    Category, CurveBehavior, CurveSegment, CurveType, ExternalObject, FamilyRef, GeometryError,
    IdentityTag, ParameterAssignment, ParameterInfo, ParameterValue, Placement, PlacementKind,
    StorageKind,
};
