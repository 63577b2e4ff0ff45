//! In-memory, YAML-persisted host document.
//!
//! `MemoryDocument` behaves like the real host where it matters to the
//! reconciler: mutations need an open transaction, rollback restores the
//! element table exactly, parameters are typed, and intersection is tested
//! against each element's axis-aligned extent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{
    BoundingBox, Category, FamilyRef, ParameterInfo, ParameterValue, Point3, StorageKind, Vector3,
};
use uuid::Uuid;

use crate::document::{
    ElementClass, ElementId, Entity, HostCurve, HostDocument, HostingBehavior, Level, NativeCreate,
    Schema, StructuralUse, SystemKind,
};
use crate::error::{io_err, HostError};

pub const PROBE_FAMILY: &str = "Tether Probe";
pub const PROBE_TYPE: &str = "Probe";

const INSTANCE_PAD: f64 = 0.5;
const PROBE_PAD: f64 = 0.01;
const WALL_HALF_THICKNESS: f64 = 0.5;
const SLAB_THICKNESS: f64 = 1.0;

// ---------------------------------------------------------------------------
// 1. Model records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub storage: StorageKind,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, storage: StorageKind) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyType {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
}

/// How instances of a loadable family are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FamilyPlacement {
    Point,
    Curve,
    Adaptive { points: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyDef {
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub hosting: HostingBehavior,
    pub placement: FamilyPlacement,
    pub types: Vec<FamilyType>,
    #[serde(default)]
    pub instance_parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub probe: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemFamily {
    pub kind: SystemKind,
    pub name: String,
    pub types: Vec<FamilyType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: ElementId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    Point { origin: Point3 },
    Curve { curve: HostCurve },
    Profile { curves: Vec<HostCurve> },
    Points { points: Vec<Point3> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub class: ElementClass,
    pub category: Category,
    pub family: String,
    pub type_name: String,
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ElementId>,
    #[serde(default)]
    pub structural: StructuralUse,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing: Option<Vector3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<BoundingBox>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Model {
    title: String,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    next_id: i64,
    levels: Vec<Level>,
    #[serde(default)]
    views: Vec<View>,
    #[serde(default)]
    active_view: Option<ElementId>,
    system_families: Vec<SystemFamily>,
    #[serde(default)]
    system_parameters: BTreeMap<SystemKind, Vec<ParameterDef>>,
    #[serde(default)]
    families: Vec<FamilyDef>,
    #[serde(default)]
    elements: Vec<Element>,
    #[serde(default)]
    schemas: Vec<Schema>,
}

struct OpenTransaction {
    name: String,
    snapshot: Model,
}

// ---------------------------------------------------------------------------
// 2. Document
// ---------------------------------------------------------------------------

pub struct MemoryDocument {
    model: Model,
    transaction: Option<OpenTransaction>,
    path: Option<PathBuf>,
}

impl MemoryDocument {
    /// An empty document with no levels, types or families.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            model: Model {
                title: title.into(),
                saved_at: None,
                next_id: 1,
                levels: Vec::new(),
                views: Vec::new(),
                active_view: None,
                system_families: Vec::new(),
                system_parameters: BTreeMap::new(),
                families: Vec::new(),
                elements: Vec::new(),
                schemas: Vec::new(),
            },
            transaction: None,
            path: None,
        }
    }

    /// Load a model file and keep it attached; commits write back to it.
    pub fn open(path: &Path) -> Result<Self, HostError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let model: Model = serde_yaml::from_str(&contents).map_err(|e| HostError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            model,
            transaction: None,
            path: Some(path.to_path_buf()),
        })
    }

    /// Atomically write the committed model to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), HostError> {
        let model = match &self.transaction {
            Some(open) => &open.snapshot,
            None => &self.model,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model.yaml".to_string());
        let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
        let yaml = serde_yaml::to_string(model)?;
        std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
        std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    pub fn attach(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.model.saved_at
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.model.elements.iter().find(|e| e.id == id)
    }

    pub fn element_count(&self) -> usize {
        self.model.elements.len()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    // --- builders (no transaction needed; used to set up a model) --------

    pub fn add_level(&mut self, name: impl Into<String>, elevation: f64) -> ElementId {
        let id = self.allocate();
        self.model.levels.push(Level {
            id,
            name: name.into(),
            elevation,
        });
        id
    }

    pub fn add_view(&mut self, name: impl Into<String>, active: bool) -> ElementId {
        let id = self.allocate();
        self.model.views.push(View {
            id,
            name: name.into(),
        });
        if active {
            self.model.active_view = Some(id);
        }
        id
    }

    pub fn add_system_family(&mut self, family: SystemFamily) {
        self.model.system_families.push(family);
    }

    pub fn set_system_parameters(&mut self, kind: SystemKind, parameters: Vec<ParameterDef>) {
        self.model.system_parameters.insert(kind, parameters);
    }

    pub fn add_family(&mut self, family: FamilyDef) {
        self.model.families.retain(|f| f.name != family.name);
        self.model.families.push(family);
    }

    // --- sample model ----------------------------------------------------

    /// A starter model covering every placement path.
    pub fn sample() -> Self {
        use StorageKind::{Double, Integer, String as Text};

        let mut doc = MemoryDocument::new("Sample Project");
        doc.add_level("Level 1", 0.0);
        doc.add_level("Level 2", 10.0);
        doc.add_view("Level 1", true);

        let comments = ParameterDef::new("Comments", Text);
        let mark = ParameterDef::new("Mark", Text);

        doc.add_system_family(SystemFamily {
            kind: SystemKind::Wall,
            name: "Basic Wall".into(),
            types: vec![FamilyType {
                name: "Generic - 8\"".into(),
                parameters: vec![ParameterDef::new("Width", Double)],
            }],
        });
        doc.add_system_family(SystemFamily {
            kind: SystemKind::Floor,
            name: "Floor".into(),
            types: vec![FamilyType {
                name: "Generic 12\"".into(),
                parameters: vec![ParameterDef::new("Default Thickness", Double)],
            }],
        });
        doc.add_system_family(SystemFamily {
            kind: SystemKind::Roof,
            name: "Basic Roof".into(),
            types: vec![FamilyType {
                name: "Generic - 9\"".into(),
                parameters: vec![ParameterDef::new("Default Thickness", Double)],
            }],
        });
        doc.set_system_parameters(
            SystemKind::Wall,
            vec![
                ParameterDef::new("Base Offset", Double),
                ParameterDef::new("Unconnected Height", Double),
                comments.clone(),
                mark.clone(),
            ],
        );
        doc.set_system_parameters(
            SystemKind::Floor,
            vec![
                ParameterDef::new("Height Offset From Level", Double),
                comments.clone(),
                mark.clone(),
            ],
        );
        doc.set_system_parameters(
            SystemKind::Roof,
            vec![
                ParameterDef::new("Base Offset From Level", Double),
                comments.clone(),
                mark.clone(),
            ],
        );

        let simple_type = |name: &str| FamilyType {
            name: name.into(),
            parameters: vec![],
        };

        doc.add_family(FamilyDef {
            name: "Table".into(),
            category: Category::from("Furniture"),
            hosting: HostingBehavior::Free,
            placement: FamilyPlacement::Point,
            types: vec![FamilyType {
                name: "60\" x 30\"".into(),
                parameters: vec![
                    ParameterDef::new("Width", Double),
                    ParameterDef::new("Manufacturer", Text),
                ],
            }],
            instance_parameters: vec![
                comments.clone(),
                mark.clone(),
                ParameterDef::new("Seats", Integer),
            ],
            probe: false,
        });
        doc.add_family(FamilyDef {
            name: "Single Flush".into(),
            category: Category::from("Doors"),
            hosting: HostingBehavior::WallHosted,
            placement: FamilyPlacement::Point,
            types: vec![simple_type("36\" x 84\"")],
            instance_parameters: vec![comments.clone(), ParameterDef::new("Sill Height", Double)],
            probe: false,
        });
        doc.add_family(FamilyDef {
            name: "Floor Drain".into(),
            category: Category::from("Plumbing Fixtures"),
            hosting: HostingBehavior::FloorHosted,
            placement: FamilyPlacement::Point,
            types: vec![simple_type("4\" Round")],
            instance_parameters: vec![comments.clone()],
            probe: false,
        });
        doc.add_family(FamilyDef {
            name: "Face Sign".into(),
            category: Category::from("Generic Models"),
            hosting: HostingBehavior::FaceBased,
            placement: FamilyPlacement::Point,
            types: vec![simple_type("Small")],
            instance_parameters: vec![comments.clone()],
            probe: false,
        });
        doc.add_family(FamilyDef {
            name: "Adaptive Panel".into(),
            category: Category::from("Generic Models"),
            hosting: HostingBehavior::Free,
            placement: FamilyPlacement::Adaptive { points: 4 },
            types: vec![simple_type("Panel")],
            instance_parameters: vec![comments.clone()],
            probe: false,
        });
        doc.add_family(FamilyDef {
            name: "Concrete-Rectangular-Column".into(),
            category: Category::from(tether_core::types::STRUCTURAL_COLUMNS),
            hosting: HostingBehavior::Free,
            placement: FamilyPlacement::Point,
            types: vec![simple_type("12 x 18")],
            instance_parameters: vec![comments.clone(), mark.clone()],
            probe: false,
        });
        doc.add_family(FamilyDef {
            name: "W Shapes".into(),
            category: Category::from(tether_core::types::STRUCTURAL_FRAMING),
            hosting: HostingBehavior::Free,
            placement: FamilyPlacement::Curve,
            types: vec![simple_type("W12X26")],
            instance_parameters: vec![comments.clone(), mark.clone()],
            probe: false,
        });
        doc.add_family(FamilyDef {
            name: "Break Line".into(),
            category: Category::from(tether_core::types::DETAIL_ITEMS),
            hosting: HostingBehavior::Free,
            placement: FamilyPlacement::Curve,
            types: vec![simple_type("Break Line")],
            instance_parameters: vec![comments.clone()],
            probe: false,
        });
        doc.add_family(FamilyDef {
            name: "Handrail Segment".into(),
            category: Category::from("Generic Models"),
            hosting: HostingBehavior::Free,
            placement: FamilyPlacement::Curve,
            types: vec![simple_type("Round")],
            instance_parameters: vec![comments],
            probe: false,
        });
        doc
    }

    // --- internals -------------------------------------------------------

    fn allocate(&mut self) -> ElementId {
        let id = ElementId(self.model.next_id);
        self.model.next_id += 1;
        id
    }

    fn require_transaction(&self) -> Result<(), HostError> {
        if self.transaction.is_none() {
            return Err(HostError::ReadOnly);
        }
        Ok(())
    }

    fn element_mut(&mut self, id: ElementId) -> Result<&mut Element, HostError> {
        self.model
            .elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(HostError::UnknownElement(id))
    }

    fn element_ref(&self, id: ElementId) -> Result<&Element, HostError> {
        self.element(id).ok_or(HostError::UnknownElement(id))
    }

    fn family_def(&self, name: &str) -> Result<&FamilyDef, HostError> {
        self.model
            .families
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| HostError::UnknownFamily(name.to_string()))
    }

    fn level(&self, id: ElementId) -> Result<&Level, HostError> {
        self.model
            .levels
            .iter()
            .find(|l| l.id == id)
            .ok_or(HostError::UnknownLevel(id))
    }

    /// The system family owning `type_name` of `kind`.
    fn system_family_for(&self, kind: SystemKind, type_name: &str) -> Result<&SystemFamily, HostError> {
        self.model
            .system_families
            .iter()
            .filter(|f| f.kind == kind)
            .find(|f| f.types.iter().any(|t| t.name == type_name))
            .ok_or_else(|| HostError::UnknownType {
                family: system_label(kind).to_string(),
                type_name: type_name.to_string(),
            })
    }

    fn check_type(&self, family: &FamilyDef, type_name: &str) -> Result<(), HostError> {
        if family.types.iter().any(|t| t.name == type_name) {
            Ok(())
        } else {
            Err(HostError::UnknownType {
                family: family.name.clone(),
                type_name: type_name.to_string(),
            })
        }
    }

    fn default_parameters(defs: &[ParameterDef]) -> BTreeMap<String, ParameterValue> {
        defs.iter()
            .map(|d| (d.name.clone(), ParameterValue::default_for(d.storage)))
            .collect()
    }

    fn system_element(
        &mut self,
        kind: SystemKind,
        type_name: &str,
        level: ElementId,
        geometry: Geometry,
        extent: Option<BoundingBox>,
    ) -> Result<ElementId, HostError> {
        self.level(level)?;
        let family = self.system_family_for(kind, type_name)?.name.clone();
        let parameters = Self::default_parameters(
            self.model
                .system_parameters
                .get(&kind)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        );
        let (class, category) = match kind {
            SystemKind::Wall => (ElementClass::Walls, Category::Walls),
            SystemKind::Floor => (ElementClass::Floors, Category::Floors),
            SystemKind::Roof => (ElementClass::Roofs, Category::Roofs),
        };
        let id = self.allocate();
        self.model.elements.push(Element {
            id,
            class,
            category,
            family,
            type_name: type_name.to_string(),
            geometry,
            level: Some(level),
            host: None,
            view: None,
            structural: StructuralUse::NonStructural,
            rotation: 0.0,
            facing: None,
            extent,
            parameters,
            entities: Vec::new(),
        });
        Ok(id)
    }

    fn instance_element(
        &mut self,
        family: &FamilyRef,
        type_name: &str,
        geometry: Geometry,
        extent: Option<BoundingBox>,
        placement: InstanceLinks,
    ) -> Result<ElementId, HostError> {
        let def = self.family_def(&family.family_name)?;
        self.check_type(def, type_name)?;
        let class = if def.category.as_str() == "Ceilings" {
            ElementClass::Ceilings
        } else {
            ElementClass::FamilyInstances
        };
        let category = def.category.clone();
        let family_name = def.name.clone();
        let parameters = Self::default_parameters(&def.instance_parameters);
        let id = self.allocate();
        self.model.elements.push(Element {
            id,
            class,
            category,
            family: family_name,
            type_name: type_name.to_string(),
            geometry,
            level: placement.level,
            host: placement.host,
            view: placement.view,
            structural: placement.structural,
            rotation: 0.0,
            facing: placement.facing,
            extent,
            parameters,
            entities: Vec::new(),
        });
        Ok(id)
    }
}

#[derive(Default)]
struct InstanceLinks {
    level: Option<ElementId>,
    host: Option<ElementId>,
    view: Option<ElementId>,
    structural: StructuralUse,
    facing: Option<Vector3>,
}

fn system_label(kind: SystemKind) -> &'static str {
    match kind {
        SystemKind::Wall => tether_core::types::WALLS,
        SystemKind::Floor => tether_core::types::FLOORS,
        SystemKind::Roof => tether_core::types::ROOFS,
    }
}

fn profile_points(profile: &[HostCurve]) -> Vec<Point3> {
    profile.iter().flat_map(HostCurve::points).collect()
}

fn padded(points: &[Point3], pad: f64) -> Option<BoundingBox> {
    BoundingBox::from_points(points).map(|b| b.expand(pad, pad, pad))
}

fn curve_is_degenerate(curve: &HostCurve) -> bool {
    match (curve.start(), curve.end()) {
        (Some(s), Some(e)) => {
            matches!(curve, HostCurve::Line { .. }) && s.almost_eq(&e)
        }
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// 3. HostDocument implementation
// ---------------------------------------------------------------------------

impl HostDocument for MemoryDocument {
    fn title(&self) -> String {
        self.model.title.clone()
    }

    fn families(&self) -> Vec<FamilyRef> {
        self.model
            .families
            .iter()
            .filter(|f| !f.probe)
            .map(|f| FamilyRef::new(f.category.clone(), f.name.clone()))
            .collect()
    }

    fn system_types(&self, kind: SystemKind) -> Vec<String> {
        self.model
            .system_families
            .iter()
            .filter(|f| f.kind == kind)
            .flat_map(|f| f.types.iter().map(|t| t.name.clone()))
            .collect()
    }

    fn family_types(&self, family: &str) -> Result<Vec<String>, HostError> {
        if let Some(def) = self.model.families.iter().find(|f| f.name == family) {
            return Ok(def.types.iter().map(|t| t.name.clone()).collect());
        }
        self.model
            .system_families
            .iter()
            .find(|f| f.name == family)
            .map(|f| f.types.iter().map(|t| t.name.clone()).collect())
            .ok_or_else(|| HostError::UnknownFamily(family.to_string()))
    }

    fn parameter_definitions(
        &self,
        family: &FamilyRef,
        type_name: &str,
    ) -> Result<Vec<ParameterInfo>, HostError> {
        let (type_defs, instance_defs): (&[ParameterDef], &[ParameterDef]) =
            match SystemKind::for_category(&family.category) {
                Some(kind) => {
                    let sys = self.system_family_for(kind, type_name)?;
                    let ty = sys
                        .types
                        .iter()
                        .find(|t| t.name == type_name)
                        .ok_or_else(|| HostError::UnknownType {
                            family: sys.name.clone(),
                            type_name: type_name.to_string(),
                        })?;
                    let instance = self
                        .model
                        .system_parameters
                        .get(&kind)
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    (ty.parameters.as_slice(), instance)
                }
                None => {
                    let def = self.family_def(&family.family_name)?;
                    let ty = def
                        .types
                        .iter()
                        .find(|t| t.name == type_name)
                        .ok_or_else(|| HostError::UnknownType {
                            family: def.name.clone(),
                            type_name: type_name.to_string(),
                        })?;
                    (ty.parameters.as_slice(), def.instance_parameters.as_slice())
                }
            };
        let info = |d: &ParameterDef, is_type: bool| ParameterInfo {
            name: d.name.clone(),
            storage: d.storage,
            is_type,
        };
        Ok(type_defs
            .iter()
            .map(|d| info(d, true))
            .chain(instance_defs.iter().map(|d| info(d, false)))
            .collect())
    }

    fn hosting_behavior(&self, family: &str) -> Result<HostingBehavior, HostError> {
        Ok(self.family_def(family)?.hosting)
    }

    fn levels(&self) -> Vec<Level> {
        self.model.levels.clone()
    }

    fn active_view(&self) -> Option<ElementId> {
        self.model.active_view
    }

    fn elements(&self, class: ElementClass) -> Vec<ElementId> {
        self.model
            .elements
            .iter()
            .filter(|e| match class {
                ElementClass::Model => e.view.is_none(),
                other => e.class == other,
            })
            .map(|e| e.id)
            .collect()
    }

    fn contains(&self, id: ElementId) -> bool {
        self.element(id).is_some()
    }

    fn create(&mut self, request: NativeCreate) -> Result<ElementId, HostError> {
        self.require_transaction()?;
        match request {
            NativeCreate::Wall {
                curve,
                wall_type,
                level,
                height,
                base_offset,
            } => {
                if curve_is_degenerate(&curve) {
                    return Err(HostError::Creation("wall curve is too short".into()));
                }
                if height <= 0.0 {
                    return Err(HostError::Creation(format!(
                        "wall height must be positive, got {height}"
                    )));
                }
                let base = self.level(level)?.elevation + base_offset;
                let footprint: Vec<Point3> = curve
                    .points()
                    .into_iter()
                    .map(|p| Point3::new(p.x, p.y, base))
                    .collect();
                let extent = BoundingBox::from_points(&footprint)
                    .map(|b| b.expand(WALL_HALF_THICKNESS, 0.0, height));
                let id = self.system_element(
                    SystemKind::Wall,
                    &wall_type,
                    level,
                    Geometry::Curve { curve },
                    extent,
                )?;
                let wall = self.element_mut(id)?;
                for (name, value) in [("Unconnected Height", height), ("Base Offset", base_offset)] {
                    if let Some(slot) = wall.parameters.get_mut(name) {
                        *slot = ParameterValue::Double(value);
                    }
                }
                Ok(id)
            }
            NativeCreate::ProfileWall {
                profile,
                wall_type,
                level,
            } => {
                if profile.len() < 3 {
                    return Err(HostError::Creation(
                        "wall profile needs at least three curves".into(),
                    ));
                }
                let extent = BoundingBox::from_points(&profile_points(&profile))
                    .map(|b| b.expand(WALL_HALF_THICKNESS, 0.0, 0.0));
                self.system_element(
                    SystemKind::Wall,
                    &wall_type,
                    level,
                    Geometry::Profile { curves: profile },
                    extent,
                )
            }
            NativeCreate::Floor {
                profile,
                floor_type,
                level,
            } => {
                if profile.len() < 3 {
                    return Err(HostError::Creation(
                        "floor boundary needs at least three curves".into(),
                    ));
                }
                let extent = BoundingBox::from_points(&profile_points(&profile))
                    .map(|b| b.expand(0.0, SLAB_THICKNESS, 0.0));
                self.system_element(
                    SystemKind::Floor,
                    &floor_type,
                    level,
                    Geometry::Profile { curves: profile },
                    extent,
                )
            }
            NativeCreate::FootprintRoof {
                profile,
                roof_type,
                level,
            } => {
                if profile.len() < 3 {
                    return Err(HostError::Creation(
                        "roof footprint needs at least three curves".into(),
                    ));
                }
                let extent = BoundingBox::from_points(&profile_points(&profile))
                    .map(|b| b.expand(0.0, SLAB_THICKNESS, 0.0));
                self.system_element(
                    SystemKind::Roof,
                    &roof_type,
                    level,
                    Geometry::Profile { curves: profile },
                    extent,
                )
            }
            NativeCreate::Instance {
                family,
                type_name,
                origin,
                level,
                host,
                reference_direction,
                structural,
            } => {
                let def = self.family_def(&family.family_name)?;
                let placeable = match def.placement {
                    FamilyPlacement::Point => true,
                    FamilyPlacement::Curve => structural != StructuralUse::NonStructural,
                    FamilyPlacement::Adaptive { .. } => false,
                };
                if !placeable {
                    return Err(HostError::Creation(format!(
                        "family '{}' cannot be placed at a point",
                        def.name
                    )));
                }
                let needs_host = !matches!(def.hosting, HostingBehavior::Free);
                if needs_host && host.is_none() {
                    return Err(HostError::Creation(format!(
                        "family '{}' requires a host",
                        def.name
                    )));
                }
                let pad = if def.probe { PROBE_PAD } else { INSTANCE_PAD };
                if let Some(level) = level {
                    self.level(level)?;
                }
                if let Some(host) = host {
                    self.element_ref(host)?;
                }
                self.instance_element(
                    &family,
                    &type_name,
                    Geometry::Point { origin },
                    padded(&[origin], pad),
                    InstanceLinks {
                        level,
                        host,
                        structural,
                        facing: reference_direction,
                        ..InstanceLinks::default()
                    },
                )
            }
            NativeCreate::CurveInstance {
                family,
                type_name,
                curve,
                level,
                structural,
            } => {
                let def = self.family_def(&family.family_name)?;
                if def.placement != FamilyPlacement::Curve {
                    return Err(HostError::Creation(format!(
                        "family '{}' is not curve-based",
                        def.name
                    )));
                }
                if curve_is_degenerate(&curve) {
                    return Err(HostError::Creation("curve is too short".into()));
                }
                if let Some(level) = level {
                    self.level(level)?;
                }
                let extent = padded(&curve.points(), INSTANCE_PAD);
                self.instance_element(
                    &family,
                    &type_name,
                    Geometry::Curve { curve },
                    extent,
                    InstanceLinks {
                        level,
                        structural,
                        ..InstanceLinks::default()
                    },
                )
            }
            NativeCreate::ViewInstance {
                family,
                type_name,
                curve,
                view,
            } => {
                if !self.model.views.iter().any(|v| v.id == view) {
                    return Err(HostError::UnknownView(view));
                }
                let def = self.family_def(&family.family_name)?;
                if def.placement != FamilyPlacement::Curve {
                    return Err(HostError::Creation(format!(
                        "family '{}' is not line-based",
                        def.name
                    )));
                }
                let extent = padded(&curve.points(), INSTANCE_PAD);
                self.instance_element(
                    &family,
                    &type_name,
                    Geometry::Curve { curve },
                    extent,
                    InstanceLinks {
                        view: Some(view),
                        ..InstanceLinks::default()
                    },
                )
            }
            NativeCreate::AdaptiveInstance { family, type_name } => {
                let def = self.family_def(&family.family_name)?;
                let FamilyPlacement::Adaptive { points: count } = def.placement else {
                    return Err(HostError::Creation(format!(
                        "family '{}' is not adaptive",
                        def.name
                    )));
                };
                let points: Vec<Point3> = (0..count)
                    .map(|i| Point3::new(i as f64, 0.0, 0.0))
                    .collect();
                let extent = padded(&points, INSTANCE_PAD);
                self.instance_element(
                    &family,
                    &type_name,
                    Geometry::Points { points },
                    extent,
                    InstanceLinks::default(),
                )
            }
        }
    }

    fn delete(&mut self, id: ElementId) -> Result<(), HostError> {
        self.require_transaction()?;
        self.element_ref(id)?;
        // Hosted dependents go with their host.
        self.model
            .elements
            .retain(|e| e.id != id && e.host != Some(id));
        Ok(())
    }

    fn parameter(&self, id: ElementId, name: &str) -> Result<ParameterValue, HostError> {
        self.element_ref(id)?
            .parameters
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::ParameterMissing {
                element: id,
                name: name.to_string(),
            })
    }

    fn set_parameter(
        &mut self,
        id: ElementId,
        name: &str,
        value: &ParameterValue,
    ) -> Result<(), HostError> {
        self.require_transaction()?;
        let element = self.element_mut(id)?;
        let slot = element
            .parameters
            .get_mut(name)
            .ok_or_else(|| HostError::ParameterMissing {
                element: id,
                name: name.to_string(),
            })?;
        if slot.kind() != value.kind() {
            return Err(HostError::StorageMismatch {
                name: name.to_string(),
                expected: slot.kind(),
                found: value.kind(),
            });
        }
        *slot = value.clone();
        Ok(())
    }

    fn rotate_about_z(&mut self, id: ElementId, angle: f64) -> Result<(), HostError> {
        self.require_transaction()?;
        let element = self.element_mut(id)?;
        element.rotation = (element.rotation + angle) % std::f64::consts::TAU;
        Ok(())
    }

    fn set_location_curve(&mut self, id: ElementId, curve: HostCurve) -> Result<(), HostError> {
        self.require_transaction()?;
        let element = self.element_mut(id)?;
        match (&element.geometry, element.structural) {
            (Geometry::Curve { .. }, _) => {}
            (Geometry::Point { .. }, StructuralUse::NonStructural) => {
                return Err(HostError::Creation(format!(
                    "element {id} has no location curve"
                )));
            }
            (Geometry::Point { .. }, _) => {}
            _ => {
                return Err(HostError::Creation(format!(
                    "element {id} has no location curve"
                )));
            }
        }
        element.extent = padded(&curve.points(), INSTANCE_PAD);
        element.geometry = Geometry::Curve { curve };
        Ok(())
    }

    fn move_to(&mut self, id: ElementId, point: Point3) -> Result<(), HostError> {
        self.require_transaction()?;
        let element = self.element_mut(id)?;
        let Geometry::Point { origin } = &mut element.geometry else {
            return Err(HostError::Creation(format!(
                "element {id} is not point-placed"
            )));
        };
        let delta = point - *origin;
        *origin = point;
        if let Some(extent) = element.extent.as_mut() {
            extent.min = extent.min + delta;
            extent.max = extent.max + delta;
        }
        Ok(())
    }

    fn placement_points(&self, id: ElementId) -> Result<Vec<Point3>, HostError> {
        match &self.element_ref(id)?.geometry {
            Geometry::Points { points } => Ok(points.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn translate_placement_point(
        &mut self,
        id: ElementId,
        index: usize,
        by: Vector3,
    ) -> Result<(), HostError> {
        self.require_transaction()?;
        let element = self.element_mut(id)?;
        let Geometry::Points { points } = &mut element.geometry else {
            return Err(HostError::PlacementIndex {
                element: id,
                index,
                count: 0,
            });
        };
        let count = points.len();
        let point = points.get_mut(index).ok_or(HostError::PlacementIndex {
            element: id,
            index,
            count,
        })?;
        *point = *point + by;
        element.extent = padded(points, INSTANCE_PAD);
        Ok(())
    }

    fn load_probe_family(&mut self) -> Result<FamilyRef, HostError> {
        self.require_transaction()?;
        if !self.model.families.iter().any(|f| f.name == PROBE_FAMILY) {
            self.model.families.push(FamilyDef {
                name: PROBE_FAMILY.to_string(),
                category: Category::from("Generic Models"),
                hosting: HostingBehavior::Free,
                placement: FamilyPlacement::Point,
                types: vec![FamilyType {
                    name: PROBE_TYPE.to_string(),
                    parameters: vec![],
                }],
                instance_parameters: vec![],
                probe: true,
            });
        }
        Ok(FamilyRef::new("Generic Models", PROBE_FAMILY))
    }

    fn unload_family(&mut self, family: &str) -> Result<(), HostError> {
        self.require_transaction()?;
        self.family_def(family)?;
        self.model.elements.retain(|e| e.family != family);
        self.model.families.retain(|f| f.name != family);
        Ok(())
    }

    fn intersecting(
        &self,
        probe: ElementId,
        class: ElementClass,
    ) -> Result<Vec<ElementId>, HostError> {
        let Some(probe_extent) = self.element_ref(probe)?.extent else {
            return Ok(Vec::new());
        };
        let candidates = self.elements(class);
        Ok(self
            .model
            .elements
            .iter()
            .filter(|e| e.id != probe && candidates.contains(&e.id))
            .filter(|e| e.extent.is_some_and(|x| x.intersects(&probe_extent)))
            .map(|e| e.id)
            .collect())
    }

    fn has_schema(&self, guid: Uuid) -> bool {
        self.model.schemas.iter().any(|s| s.guid == guid)
    }

    fn register_schema(&mut self, schema: Schema) -> Result<(), HostError> {
        if !self.has_schema(schema.guid) {
            tracing::debug!(schema = %schema.name, "registering schema");
            self.model.schemas.push(schema);
        }
        Ok(())
    }

    fn read_entity(&self, id: ElementId, schema: &Schema) -> Result<Option<Entity>, HostError> {
        if !self.has_schema(schema.guid) {
            return Err(HostError::SchemaNotRegistered(schema.guid));
        }
        Ok(self
            .element_ref(id)?
            .entities
            .iter()
            .find(|e| e.schema == schema.guid)
            .cloned())
    }

    fn write_entity(&mut self, id: ElementId, entity: Entity) -> Result<(), HostError> {
        self.require_transaction()?;
        let schema = self
            .model
            .schemas
            .iter()
            .find(|s| s.guid == entity.schema)
            .ok_or(HostError::SchemaNotRegistered(entity.schema))?;
        if let Some(field) = entity.fields.keys().find(|f| !schema.fields.contains(f)) {
            return Err(HostError::SchemaField {
                schema: entity.schema,
                field: field.clone(),
            });
        }
        let element = self.element_mut(id)?;
        element.entities.retain(|e| e.schema != entity.schema);
        element.entities.push(entity);
        Ok(())
    }

    fn begin(&mut self, name: &str) -> Result<(), HostError> {
        if let Some(open) = &self.transaction {
            return Err(HostError::TransactionActive(open.name.clone()));
        }
        tracing::debug!(transaction = name, "begin");
        self.transaction = Some(OpenTransaction {
            name: name.to_string(),
            snapshot: self.model.clone(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), HostError> {
        let open = self.transaction.take().ok_or(HostError::NoTransaction)?;
        tracing::debug!(transaction = %open.name, "commit");
        if let Some(path) = self.path.clone() {
            self.model.saved_at = Some(Utc::now());
            if let Err(err) = self.save_to(&path) {
                // An unsaved commit leaves the model as it was at begin.
                tracing::warn!(transaction = %open.name, error = %err, "commit not saved; restoring");
                self.model = open.snapshot;
                return Err(err);
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), HostError> {
        let open = self.transaction.take().ok_or(HostError::NoTransaction)?;
        tracing::debug!(transaction = %open.name, "rollback");
        self.model = open.snapshot;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn line(a: (f64, f64, f64), b: (f64, f64, f64)) -> HostCurve {
        HostCurve::Line {
            start: Point3::new(a.0, a.1, a.2),
            end: Point3::new(b.0, b.1, b.2),
        }
    }

    fn level_1(doc: &MemoryDocument) -> ElementId {
        doc.levels()[0].id
    }

    fn wall(doc: &mut MemoryDocument) -> ElementId {
        let level = level_1(doc);
        doc.create(NativeCreate::Wall {
            curve: line((0.0, 0.0, 0.0), (10.0, 0.0, 0.0)),
            wall_type: "Generic - 8\"".into(),
            level,
            height: 10.0,
            base_offset: 0.0,
        })
        .expect("wall")
    }

    #[test]
    fn mutation_requires_transaction() {
        let mut doc = MemoryDocument::sample();
        let level = level_1(&doc);
        let err = doc
            .create(NativeCreate::Wall {
                curve: line((0.0, 0.0, 0.0), (1.0, 0.0, 0.0)),
                wall_type: "Generic - 8\"".into(),
                level,
                height: 10.0,
                base_offset: 0.0,
            })
            .unwrap_err();
        assert!(matches!(err, HostError::ReadOnly));
    }

    #[test]
    fn nested_begin_is_rejected() {
        let mut doc = MemoryDocument::sample();
        doc.begin("outer").expect("begin");
        assert!(matches!(
            doc.begin("inner"),
            Err(HostError::TransactionActive(name)) if name == "outer"
        ));
    }

    #[test]
    fn rollback_restores_element_table() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        wall(&mut doc);
        assert_eq!(doc.elements(ElementClass::Walls).len(), 1);
        doc.rollback().expect("rollback");
        assert!(doc.elements(ElementClass::Walls).is_empty());
    }

    #[test]
    fn set_parameter_checks_name_and_storage() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        let id = wall(&mut doc);
        assert!(matches!(
            doc.set_parameter(id, "Nope", &ParameterValue::Double(1.0)),
            Err(HostError::ParameterMissing { .. })
        ));
        assert!(matches!(
            doc.set_parameter(id, "Comments", &ParameterValue::Integer(1)),
            Err(HostError::StorageMismatch { .. })
        ));
        doc.set_parameter(id, "Comments", &ParameterValue::String("x".into()))
            .expect("set");
        assert_eq!(
            doc.parameter(id, "Comments").expect("get"),
            ParameterValue::String("x".into())
        );
    }

    #[test]
    fn wall_height_is_recorded() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        let id = wall(&mut doc);
        assert_eq!(
            doc.parameter(id, "Unconnected Height").expect("height"),
            ParameterValue::Double(10.0)
        );
    }

    #[test]
    fn probe_intersects_wall() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        let wall_id = wall(&mut doc);
        let probe_family = doc.load_probe_family().expect("probe family");
        let probe = doc
            .create(NativeCreate::Instance {
                family: probe_family,
                type_name: PROBE_TYPE.into(),
                origin: Point3::new(50.0, 50.0, 0.0),
                level: None,
                host: None,
                reference_direction: None,
                structural: StructuralUse::NonStructural,
            })
            .expect("probe");
        assert!(doc
            .intersecting(probe, ElementClass::Walls)
            .expect("miss")
            .is_empty());
        doc.move_to(probe, Point3::new(5.0, 0.0, 0.1)).expect("move");
        assert_eq!(
            doc.intersecting(probe, ElementClass::Walls).expect("hit"),
            vec![wall_id]
        );
        doc.unload_family(PROBE_FAMILY).expect("unload");
        assert!(!doc.contains(probe));
        assert!(doc.families().iter().all(|f| f.family_name != PROBE_FAMILY));
    }

    #[test]
    fn hosted_family_without_host_fails() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        let err = doc
            .create(NativeCreate::Instance {
                family: FamilyRef::new("Doors", "Single Flush"),
                type_name: "36\" x 84\"".into(),
                origin: Point3::ORIGIN,
                level: None,
                host: None,
                reference_direction: None,
                structural: StructuralUse::NonStructural,
            })
            .unwrap_err();
        assert!(matches!(err, HostError::Creation(_)));
    }

    #[test]
    fn adaptive_points_translate_and_reject_out_of_range() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        let id = doc
            .create(NativeCreate::AdaptiveInstance {
                family: FamilyRef::new("Generic Models", "Adaptive Panel"),
                type_name: "Panel".into(),
            })
            .expect("adaptive");
        assert_eq!(doc.placement_points(id).expect("points").len(), 4);
        doc.translate_placement_point(id, 1, Vector3::new(0.0, 2.0, 0.0))
            .expect("translate");
        assert_eq!(
            doc.placement_points(id).expect("points")[1],
            Point3::new(1.0, 2.0, 0.0)
        );
        assert!(matches!(
            doc.translate_placement_point(id, 9, Vector3::BASIS_Z),
            Err(HostError::PlacementIndex { count: 4, .. })
        ));
    }

    #[test]
    fn entities_overwrite_per_schema() {
        let mut doc = MemoryDocument::sample();
        let schema = Schema {
            guid: Uuid::new_v4(),
            vendor: "TEST".into(),
            name: "Tag".into(),
            fields: vec!["Value".into()],
        };
        doc.begin("t").expect("begin");
        let id = wall(&mut doc);
        assert!(doc.read_entity(id, &schema).is_err());
        doc.register_schema(schema.clone()).expect("register");
        doc.write_entity(id, Entity::new(&schema).with("Value", "a"))
            .expect("write");
        doc.write_entity(id, Entity::new(&schema).with("Value", "b"))
            .expect("write");
        let entity = doc.read_entity(id, &schema).expect("read").expect("some");
        assert_eq!(entity.get("Value"), Some("b"));
        assert_eq!(doc.element(id).expect("el").entities.len(), 1);

        let undeclared = doc.write_entity(id, Entity::new(&schema).with("Other", "c"));
        assert!(matches!(undeclared, Err(HostError::SchemaField { field, .. }) if field == "Other"));
    }

    #[test]
    fn commit_persists_to_attached_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("model.yaml");
        let mut doc = MemoryDocument::sample();
        doc.save_to(&path).expect("save");
        doc.attach(&path);
        doc.begin("t").expect("begin");
        wall(&mut doc);
        doc.commit().expect("commit");
        assert!(doc.saved_at().is_some());

        let reopened = MemoryDocument::open(&path).expect("open");
        assert_eq!(reopened.elements(ElementClass::Walls).len(), 1);
        assert!(!path.with_file_name("model.yaml.tmp").exists());
    }

    #[test]
    fn failed_save_undoes_the_commit() {
        let dir = TempDir::new().expect("tempdir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").expect("blocker");
        let mut doc = MemoryDocument::sample();
        doc.attach(blocker.join("model.yaml"));
        let before = doc.element_count();

        doc.begin("t").expect("begin");
        wall(&mut doc);
        assert!(matches!(doc.commit(), Err(HostError::Io { .. })));
        assert!(!doc.in_transaction());
        assert_eq!(doc.element_count(), before);
        assert!(doc.elements(ElementClass::Walls).is_empty());
    }
}
