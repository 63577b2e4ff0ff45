//! Domain types exchanged between the authoring client and the host bridge.
//!
//! Everything here is produced by the client, serialized over the wire, and
//! treated as immutable once received by the host.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point3, Vector3, TOLERANCE};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identity string correlating host objects with the logical client
/// component that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityTag(pub String);

impl fmt::Display for IdentityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for IdentityTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdentityTag {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

pub const WALLS: &str = "Walls";
pub const FLOORS: &str = "Floors";
pub const ROOFS: &str = "Roofs";
pub const STRUCTURAL_COLUMNS: &str = "Structural Columns";
pub const STRUCTURAL_FRAMING: &str = "Structural Framing";
pub const DETAIL_ITEMS: &str = "Detail Items";

/// Host category of an object, as labelled by the client.
///
/// Walls, floors and roofs are drawn by the host's system routines; every
/// other label names a loadable-family category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Walls,
    Floors,
    Roofs,
    Family(String),
}

/// How a single-curve placement is realised for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveBehavior {
    Wall,
    SlantedColumn,
    Beam,
    Annotation,
    Generic,
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Walls => WALLS,
            Category::Floors => FLOORS,
            Category::Roofs => ROOFS,
            Category::Family(name) => name,
        }
    }

    pub fn is_system(&self) -> bool {
        !matches!(self, Category::Family(_))
    }

    pub fn curve_behavior(&self) -> CurveBehavior {
        match self {
            Category::Walls => CurveBehavior::Wall,
            Category::Family(name) if name == STRUCTURAL_COLUMNS => CurveBehavior::SlantedColumn,
            Category::Family(name) if name == STRUCTURAL_FRAMING => CurveBehavior::Beam,
            Category::Family(name) if name == DETAIL_ITEMS => CurveBehavior::Annotation,
            _ => CurveBehavior::Generic,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.as_str() {
            WALLS => Category::Walls,
            FLOORS => Category::Floors,
            ROOFS => Category::Roofs,
            _ => Category::Family(s),
        }
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Category::from(s.to_owned())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        match c {
            Category::Family(name) => name,
            other => other.as_str().to_owned(),
        }
    }
}

/// `{category, family-name}` pair as listed by `GetFamilyNames`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FamilyRef {
    pub category: Category,
    pub family_name: String,
}

impl FamilyRef {
    pub fn new(category: impl Into<Category>, family_name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            family_name: family_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Storage kind of a host parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageKind {
    Double,
    Integer,
    String,
    ElementId,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Double => "Double",
            StorageKind::Integer => "Integer",
            StorageKind::String => "String",
            StorageKind::ElementId => "ElementId",
        }
    }

    /// Convert a wire string into a typed value of this kind.
    pub fn parse(&self, raw: &str) -> Result<ParameterValue, ParameterParseError> {
        let invalid = || ParameterParseError {
            kind: *self,
            value: raw.to_owned(),
        };
        match self {
            StorageKind::Double => raw
                .trim()
                .parse::<f64>()
                .map(ParameterValue::Double)
                .map_err(|_| invalid()),
            StorageKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(ParameterValue::Integer)
                .map_err(|_| invalid()),
            StorageKind::ElementId => raw
                .trim()
                .parse::<i64>()
                .map(ParameterValue::ElementId)
                .map_err(|_| invalid()),
            StorageKind::String => Ok(ParameterValue::String(raw.to_owned())),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StorageKind {
    /// Unknown kinds are treated as plain strings.
    fn from(s: String) -> Self {
        s.parse().unwrap_or(StorageKind::String)
    }
}

impl From<StorageKind> for String {
    fn from(k: StorageKind) -> Self {
        k.as_str().to_owned()
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "double" => Ok(StorageKind::Double),
            "integer" | "int" => Ok(StorageKind::Integer),
            "string" => Ok(StorageKind::String),
            "elementid" | "element_id" => Ok(StorageKind::ElementId),
            other => Err(format!(
                "unknown storage kind '{other}'; expected: Double, Integer, String, ElementId"
            )),
        }
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage", content = "value")]
pub enum ParameterValue {
    Double(f64),
    Integer(i64),
    String(String),
    ElementId(i64),
}

impl ParameterValue {
    pub fn kind(&self) -> StorageKind {
        match self {
            ParameterValue::Double(_) => StorageKind::Double,
            ParameterValue::Integer(_) => StorageKind::Integer,
            ParameterValue::String(_) => StorageKind::String,
            ParameterValue::ElementId(_) => StorageKind::ElementId,
        }
    }

    /// Zero value of a storage kind, used for freshly placed instances.
    pub fn default_for(kind: StorageKind) -> ParameterValue {
        match kind {
            StorageKind::Double => ParameterValue::Double(0.0),
            StorageKind::Integer => ParameterValue::Integer(0),
            StorageKind::String => ParameterValue::String(String::new()),
            StorageKind::ElementId => ParameterValue::ElementId(-1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot read '{value}' as a {kind} parameter value")]
pub struct ParameterParseError {
    pub kind: StorageKind,
    pub value: String,
}

/// One `(name, storage-kind, value)` triple sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterAssignment {
    pub name: String,
    pub storage: StorageKind,
    pub value: String,
}

impl ParameterAssignment {
    pub fn new(name: impl Into<String>, storage: StorageKind, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage,
            value: value.into(),
        }
    }

    pub fn typed_value(&self) -> Result<ParameterValue, ParameterParseError> {
        self.storage.parse(&self.value)
    }
}

/// Parameter definition as listed by `GetParameters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub storage: StorageKind,
    pub is_type: bool,
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    Line,
    Arc,
    Spline,
}

impl fmt::Display for CurveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveType::Line => write!(f, "line"),
            CurveType::Arc => write!(f, "arc"),
            CurveType::Spline => write!(f, "spline"),
        }
    }
}

/// Geometry problems found while validating a placement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("{curve_type} needs {expected} control points, got {found}")]
    TooFewPoints {
        curve_type: CurveType,
        expected: usize,
        found: usize,
    },

    #[error("{curve_type} has coincident control points")]
    Degenerate { curve_type: CurveType },

    #[error("spline has {points} control points but {weights} weights")]
    WeightCount { points: usize, weights: usize },

    #[error("spline degree {degree} needs more than {degree} control points, got {points}")]
    Degree { degree: u32, points: usize },

    #[error("spline needs {expected} knots, got {found}")]
    KnotCount { expected: usize, found: usize },

    #[error("profile is not closed: segment {segment} does not start where the previous one ends")]
    OpenProfile { segment: usize },

    #[error("profile is not planar")]
    NonPlanar,

    #[error("placement has no geometry")]
    Empty,
}

/// Degree used for splines that do not carry one.
pub const DEFAULT_SPLINE_DEGREE: u32 = 3;

/// One curve of a curve-driven placement.
///
/// Arcs carry `[start, point-on-arc, end]`; lines carry `[start, end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSegment {
    #[serde(rename = "type")]
    pub curve_type: CurveType,
    pub points: Vec<Point3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knots: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<u32>,
}

impl CurveSegment {
    pub fn line(start: Point3, end: Point3) -> Self {
        Self {
            curve_type: CurveType::Line,
            points: vec![start, end],
            weights: None,
            knots: None,
            degree: None,
        }
    }

    pub fn arc(start: Point3, through: Point3, end: Point3) -> Self {
        Self {
            curve_type: CurveType::Arc,
            points: vec![start, through, end],
            weights: None,
            knots: None,
            degree: None,
        }
    }

    pub fn spline(points: Vec<Point3>, degree: u32) -> Self {
        Self {
            curve_type: CurveType::Spline,
            points,
            weights: None,
            knots: None,
            degree: Some(degree),
        }
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        let expected = match self.curve_type {
            CurveType::Line => 2,
            CurveType::Arc => 3,
            CurveType::Spline => 2,
        };
        if self.points.len() < expected {
            return Err(GeometryError::TooFewPoints {
                curve_type: self.curve_type,
                expected,
                found: self.points.len(),
            });
        }
        match self.curve_type {
            CurveType::Line => {
                if self.points[0].almost_eq(&self.points[1]) {
                    return Err(GeometryError::Degenerate {
                        curve_type: self.curve_type,
                    });
                }
            }
            CurveType::Arc => {
                let a = self.points[1] - self.points[0];
                let b = self.points[2] - self.points[0];
                if a.cross(&b).length() <= TOLERANCE {
                    return Err(GeometryError::Degenerate {
                        curve_type: self.curve_type,
                    });
                }
            }
            CurveType::Spline => {
                let count = self.points.len();
                if let Some(weights) = &self.weights {
                    if weights.len() != count {
                        return Err(GeometryError::WeightCount {
                            points: count,
                            weights: weights.len(),
                        });
                    }
                }
                let degree = self.spline_degree();
                if degree == 0 || degree as usize >= count {
                    return Err(GeometryError::Degree {
                        degree,
                        points: count,
                    });
                }
                if let Some(knots) = &self.knots {
                    let expected = count + degree as usize + 1;
                    if knots.len() != expected {
                        return Err(GeometryError::KnotCount {
                            expected,
                            found: knots.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Declared spline degree, or [`DEFAULT_SPLINE_DEGREE`].
    pub fn spline_degree(&self) -> u32 {
        self.degree.unwrap_or(DEFAULT_SPLINE_DEGREE)
    }

    pub fn start(&self) -> Option<Point3> {
        self.points.first().copied()
    }

    pub fn end(&self) -> Option<Point3> {
        self.points.last().copied()
    }

    /// Lowest control point by elevation.
    pub fn lowest(&self) -> Option<Point3> {
        lowest_point(self.points.iter())
    }
}

/// Lowest point by elevation; ties keep the first.
pub fn lowest_point<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Option<Point3> {
    points.into_iter().fold(None, |best: Option<Point3>, p| match best {
        Some(b) if b.z <= p.z => Some(b),
        _ => Some(*p),
    })
}

/// Where and how the host object is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    /// Single origin plus optional orientation.
    Point {
        origin: Point3,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        orientation: Option<Vector3>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        face_orientation: Option<Vector3>,
    },
    /// Ordered adaptive placement points.
    Adaptive { points: Vec<Point3> },
    /// One curve, or a closed planar profile of several.
    Curves { segments: Vec<CurveSegment> },
}

/// The four placement paths a creation request can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    Point,
    Adaptive,
    SingleCurve,
    ClosedCurve,
}

impl Placement {
    pub fn point(origin: Point3) -> Self {
        Placement::Point {
            origin,
            orientation: None,
            face_orientation: None,
        }
    }

    pub fn kind(&self) -> Result<PlacementKind, GeometryError> {
        match self {
            Placement::Point { .. } => Ok(PlacementKind::Point),
            Placement::Adaptive { points } if points.is_empty() => Err(GeometryError::Empty),
            Placement::Adaptive { .. } => Ok(PlacementKind::Adaptive),
            Placement::Curves { segments } => match segments.len() {
                0 => Err(GeometryError::Empty),
                1 => Ok(PlacementKind::SingleCurve),
                _ => Ok(PlacementKind::ClosedCurve),
            },
        }
    }

    /// Every coordinate carried by the placement.
    pub fn all_points(&self) -> Vec<Point3> {
        match self {
            Placement::Point { origin, .. } => vec![*origin],
            Placement::Adaptive { points } => points.clone(),
            Placement::Curves { segments } => segments
                .iter()
                .flat_map(|s| s.points.iter().copied())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// External object
// ---------------------------------------------------------------------------

/// One object produced by the client to be created in, or synchronized with,
/// the host document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalObject {
    pub category: Category,
    pub family_name: String,
    pub type_name: String,
    pub placement: Placement,
    #[serde(default)]
    pub parameters: Vec<ParameterAssignment>,
}

impl ExternalObject {
    pub fn new(
        category: impl Into<Category>,
        family_name: impl Into<String>,
        type_name: impl Into<String>,
        placement: Placement,
    ) -> Self {
        Self {
            category: category.into(),
            family_name: family_name.into(),
            type_name: type_name.into(),
            placement,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterAssignment) -> Self {
        self.parameters.push(parameter);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
