//! The host-document capability interface.
//!
//! Everything the reconciler and the catalog need from the host goes through
//! [`HostDocument`]. Implementations are only ever touched from the host
//! thread, so the trait is deliberately not `Sync`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tether_core::{
    Category, FamilyRef, ParameterInfo, ParameterValue, Point3, Vector3,
};
use uuid::Uuid;

use crate::error::HostError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub i64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// System type families drawn by host routines rather than placed as instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    Wall,
    Floor,
    Roof,
}

impl SystemKind {
    pub fn for_category(category: &Category) -> Option<SystemKind> {
        match category {
            Category::Walls => Some(SystemKind::Wall),
            Category::Floors => Some(SystemKind::Floor),
            Category::Roofs => Some(SystemKind::Roof),
            Category::Family(_) => None,
        }
    }
}

/// Element classes the document can enumerate and intersect against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementClass {
    Walls,
    Floors,
    Roofs,
    Ceilings,
    FamilyInstances,
    /// Every model element; used for face-based hosting.
    Model,
}

impl ElementClass {
    /// The class scanned when looking up tagged elements of `category`.
    pub fn for_category(category: &Category) -> ElementClass {
        match category {
            Category::Walls => ElementClass::Walls,
            Category::Floors => ElementClass::Floors,
            Category::Roofs => ElementClass::Roofs,
            Category::Family(_) => ElementClass::FamilyInstances,
        }
    }
}

/// How a point-placed family attaches to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostingBehavior {
    #[default]
    Free,
    WallHosted,
    FloorHosted,
    CeilingHosted,
    RoofHosted,
    FaceBased,
}

impl HostingBehavior {
    /// Host class probed for this behavior, `None` when free-standing.
    pub fn host_class(&self) -> Option<ElementClass> {
        match self {
            HostingBehavior::Free => None,
            HostingBehavior::WallHosted => Some(ElementClass::Walls),
            HostingBehavior::FloorHosted => Some(ElementClass::Floors),
            HostingBehavior::CeilingHosted => Some(ElementClass::Ceilings),
            HostingBehavior::RoofHosted => Some(ElementClass::Roofs),
            HostingBehavior::FaceBased => Some(ElementClass::Model),
        }
    }

    /// Sign of the vertical probe nudge: above the point for walls and
    /// ceilings, below it for floors and roofs.
    pub fn probe_direction(&self) -> f64 {
        match self {
            HostingBehavior::FloorHosted | HostingBehavior::RoofHosted => -1.0,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub id: ElementId,
    pub name: String,
    pub elevation: f64,
}

// ---------------------------------------------------------------------------
// Native geometry and creation calls
// ---------------------------------------------------------------------------

/// Host-native curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCurve {
    Line {
        start: Point3,
        end: Point3,
    },
    Arc {
        start: Point3,
        end: Point3,
        through: Point3,
    },
    /// Interpolating spline through its points.
    Hermite { points: Vec<Point3> },
    Nurbs {
        points: Vec<Point3>,
        weights: Vec<f64>,
        knots: Vec<f64>,
        degree: u32,
    },
}

impl HostCurve {
    pub fn start(&self) -> Option<Point3> {
        match self {
            HostCurve::Line { start, .. } | HostCurve::Arc { start, .. } => Some(*start),
            HostCurve::Hermite { points } | HostCurve::Nurbs { points, .. } => {
                points.first().copied()
            }
        }
    }

    pub fn end(&self) -> Option<Point3> {
        match self {
            HostCurve::Line { end, .. } | HostCurve::Arc { end, .. } => Some(*end),
            HostCurve::Hermite { points } | HostCurve::Nurbs { points, .. } => {
                points.last().copied()
            }
        }
    }

    /// Defining points; used for extents.
    pub fn points(&self) -> Vec<Point3> {
        match self {
            HostCurve::Line { start, end } => vec![*start, *end],
            HostCurve::Arc {
                start,
                end,
                through,
            } => vec![*start, *through, *end],
            HostCurve::Hermite { points } | HostCurve::Nurbs { points, .. } => points.clone(),
        }
    }
}

/// Structural role requested for a placed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralUse {
    #[default]
    NonStructural,
    Column,
    /// Column whose axis follows its location curve end point.
    SlantedColumn,
    Beam,
}

/// The closed set of native creation calls.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCreate {
    Wall {
        curve: HostCurve,
        wall_type: String,
        level: ElementId,
        height: f64,
        base_offset: f64,
    },
    ProfileWall {
        profile: Vec<HostCurve>,
        wall_type: String,
        level: ElementId,
    },
    Floor {
        profile: Vec<HostCurve>,
        floor_type: String,
        level: ElementId,
    },
    FootprintRoof {
        profile: Vec<HostCurve>,
        roof_type: String,
        level: ElementId,
    },
    Instance {
        family: FamilyRef,
        type_name: String,
        origin: Point3,
        level: Option<ElementId>,
        host: Option<ElementId>,
        reference_direction: Option<Vector3>,
        structural: StructuralUse,
    },
    CurveInstance {
        family: FamilyRef,
        type_name: String,
        curve: HostCurve,
        level: Option<ElementId>,
        structural: StructuralUse,
    },
    ViewInstance {
        family: FamilyRef,
        type_name: String,
        curve: HostCurve,
        view: ElementId,
    },
    AdaptiveInstance {
        family: FamilyRef,
        type_name: String,
    },
}

// ---------------------------------------------------------------------------
// Extensible storage
// ---------------------------------------------------------------------------

/// A structured-record definition that can be attached to elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub guid: Uuid,
    pub vendor: String,
    pub name: String,
    pub fields: Vec<String>,
}

/// One record of a [`Schema`] attached to an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub schema: Uuid,
    pub fields: BTreeMap<String, String>,
}

impl Entity {
    pub fn new(schema: &Schema) -> Self {
        Self {
            schema: schema.guid,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// Capability surface of the host's live document.
pub trait HostDocument {
    // --- queries ---------------------------------------------------------

    fn title(&self) -> String;

    /// Loaded (non-system) families in document order.
    fn families(&self) -> Vec<FamilyRef>;

    fn system_types(&self, kind: SystemKind) -> Vec<String>;

    fn family_types(&self, family: &str) -> Result<Vec<String>, HostError>;

    /// Type- and instance-level parameter definitions, unsorted.
    fn parameter_definitions(
        &self,
        family: &FamilyRef,
        type_name: &str,
    ) -> Result<Vec<ParameterInfo>, HostError>;

    fn hosting_behavior(&self, family: &str) -> Result<HostingBehavior, HostError>;

    fn levels(&self) -> Vec<Level>;

    fn active_view(&self) -> Option<ElementId>;

    /// Elements of `class` in document (creation) order.
    fn elements(&self, class: ElementClass) -> Vec<ElementId>;

    fn contains(&self, id: ElementId) -> bool;

    // --- mutation --------------------------------------------------------

    fn create(&mut self, request: NativeCreate) -> Result<ElementId, HostError>;

    fn delete(&mut self, id: ElementId) -> Result<(), HostError>;

    fn parameter(&self, id: ElementId, name: &str) -> Result<ParameterValue, HostError>;

    fn set_parameter(
        &mut self,
        id: ElementId,
        name: &str,
        value: &ParameterValue,
    ) -> Result<(), HostError>;

    fn rotate_about_z(&mut self, id: ElementId, angle: f64) -> Result<(), HostError>;

    fn set_location_curve(&mut self, id: ElementId, curve: HostCurve) -> Result<(), HostError>;

    fn move_to(&mut self, id: ElementId, point: Point3) -> Result<(), HostError>;

    fn placement_points(&self, id: ElementId) -> Result<Vec<Point3>, HostError>;

    fn translate_placement_point(
        &mut self,
        id: ElementId,
        index: usize,
        by: Vector3,
    ) -> Result<(), HostError>;

    // --- probe -----------------------------------------------------------

    /// Load the probe marker family and return a reference to it.
    fn load_probe_family(&mut self) -> Result<FamilyRef, HostError>;

    /// Remove a family and every instance of it.
    fn unload_family(&mut self, family: &str) -> Result<(), HostError>;

    /// Elements of `class` whose extents meet `probe`'s, in document order.
    fn intersecting(
        &self,
        probe: ElementId,
        class: ElementClass,
    ) -> Result<Vec<ElementId>, HostError>;

    // --- extensible storage ---------------------------------------------

    fn has_schema(&self, guid: Uuid) -> bool;

    fn register_schema(&mut self, schema: Schema) -> Result<(), HostError>;

    /// The element's record for `schema`, if any.
    fn read_entity(&self, id: ElementId, schema: &Schema) -> Result<Option<Entity>, HostError>;

    fn write_entity(&mut self, id: ElementId, entity: Entity) -> Result<(), HostError>;

    // --- transactions ----------------------------------------------------

    fn begin(&mut self, name: &str) -> Result<(), HostError>;

    /// Keep the open transaction's work. On error the document is back where
    /// it was at [`begin`](Self::begin) and no transaction is open.
    fn commit(&mut self) -> Result<(), HostError>;

    fn rollback(&mut self) -> Result<(), HostError>;
}
