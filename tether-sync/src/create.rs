//! Category-dispatched creation of one incoming object.
//!
//! Each placement kind has one routine. Every routine either returns the new
//! element, skips the object (a prerequisite such as a level, host, view or
//! family type was not found), or fails with the host error raised by a
//! native call. Created elements then go through the shared epilogue:
//! parameters first, identity tag last.

use tether_core::geometry::TOLERANCE;
use tether_core::{
    CurveBehavior, CurveSegment, CurveType, ExternalObject, FamilyRef, IdentityTag,
    ParameterValue, Placement, PlacementKind, Point3, Vector3,
};
use tether_core::types::lowest_point;
use tether_host::{
    tagger, ElementId, HostCurve, HostDocument, HostError, HostingBehavior, NativeCreate,
    StructuralUse, SystemKind,
};

use crate::decision::Diagnostic;
use crate::levels::{nearest_level, offset_from};
use crate::params::apply_parameters;
use crate::probe::ProbeScope;
use crate::profile::{closed_profile, to_host_curve};

/// Offset parameter written for closed profiles drawn away from their level.
pub const WALL_BASE_OFFSET: &str = "Base Offset";
pub const FLOOR_LEVEL_OFFSET: &str = "Height Offset From Level";
pub const ROOF_LEVEL_OFFSET: &str = "Base Offset From Level";

/// Settings shared by every object of a batch.
#[derive(Debug, Clone, Copy)]
pub struct CreateSettings {
    pub wall_height: f64,
}

/// Result of one creation attempt that did not hit a native failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    Element(ElementId),
    Skipped,
}

enum Failure {
    Skip(String),
    Host(HostError),
}

impl From<HostError> for Failure {
    fn from(err: HostError) -> Self {
        Failure::Host(err)
    }
}

type Attempt<T> = Result<T, Failure>;

fn skip<T>(reason: impl Into<String>) -> Attempt<T> {
    Err(Failure::Skip(reason.into()))
}

/// Create `object` (batch position `index`), apply its parameters and tag it.
///
/// Skips are recorded in `diagnostics`; native failures are returned.
pub fn create_object<D: HostDocument + ?Sized>(
    doc: &mut D,
    probe: &mut ProbeScope,
    settings: &CreateSettings,
    index: usize,
    object: &ExternalObject,
    identity: &IdentityTag,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Created, HostError> {
    match place(doc, probe, settings, index, object, diagnostics) {
        Ok(id) => {
            apply_parameters(doc, id, index, &object.parameters, diagnostics);
            if let Err(err) = tagger::tag(doc, id, identity) {
                tracing::warn!(element = %id, index, error = %err, "tagging failed");
                diagnostics.push(Diagnostic::error(Some(index), err.to_string()));
                discard(doc, id);
                return Err(err);
            }
            tracing::debug!(element = %id, index, category = %object.category, "created");
            Ok(Created::Element(id))
        }
        Err(Failure::Skip(reason)) => {
            tracing::warn!(index, category = %object.category, %reason, "object skipped");
            diagnostics.push(Diagnostic::warning(Some(index), reason));
            Ok(Created::Skipped)
        }
        Err(Failure::Host(err)) => {
            tracing::warn!(index, category = %object.category, error = %err, "native creation failed");
            diagnostics.push(Diagnostic::error(Some(index), err.to_string()));
            Err(err)
        }
    }
}

fn place<D: HostDocument + ?Sized>(
    doc: &mut D,
    probe: &mut ProbeScope,
    settings: &CreateSettings,
    index: usize,
    object: &ExternalObject,
    diagnostics: &mut Vec<Diagnostic>,
) -> Attempt<ElementId> {
    let kind = match object.placement.kind() {
        Ok(kind) => kind,
        Err(err) => return skip(err.to_string()),
    };
    match (kind, &object.placement) {
        (
            PlacementKind::Point,
            Placement::Point {
                origin,
                orientation,
                face_orientation,
            },
        ) => place_point(doc, probe, object, *origin, *orientation, *face_orientation),
        (PlacementKind::Adaptive, Placement::Adaptive { points }) => {
            place_adaptive(doc, index, object, points, diagnostics)
        }
        (PlacementKind::SingleCurve, Placement::Curves { segments }) => {
            place_curve(doc, settings, object, &segments[0])
        }
        (PlacementKind::ClosedCurve, Placement::Curves { segments }) => {
            place_profile(doc, index, object, segments, diagnostics)
        }
        _ => skip("placement does not match its kind"),
    }
}

// ---------------------------------------------------------------------------
// Resolution helpers
// ---------------------------------------------------------------------------

/// Run the native calls that complete element `id`; the element is deleted
/// if one of them fails, so no untagged element outlives the attempt.
fn finish<D, F>(doc: &mut D, id: ElementId, steps: F) -> Attempt<ElementId>
where
    D: HostDocument + ?Sized,
    F: FnOnce(&mut D) -> Result<(), HostError>,
{
    match steps(doc) {
        Ok(()) => Ok(id),
        Err(err) => {
            discard(doc, id);
            Err(Failure::Host(err))
        }
    }
}

fn discard<D: HostDocument + ?Sized>(doc: &mut D, id: ElementId) {
    if let Err(err) = doc.delete(id) {
        tracing::warn!(element = %id, error = %err, "incomplete element not removed");
    }
}

/// The loadable family and type named by `object`.
fn resolve_family_type<D: HostDocument + ?Sized>(
    doc: &D,
    object: &ExternalObject,
) -> Attempt<(FamilyRef, String)> {
    if object.category.is_system() {
        return skip(format!(
            "{} cannot be placed as a family instance",
            object.category
        ));
    }
    let types = match doc.family_types(&object.family_name) {
        Ok(types) => types,
        Err(_) => return skip(format!("family '{}' is not loaded", object.family_name)),
    };
    if !types.iter().any(|t| t == &object.type_name) {
        return skip(format!(
            "family '{}' has no type '{}'",
            object.family_name, object.type_name
        ));
    }
    Ok((
        FamilyRef::new(object.category.clone(), object.family_name.clone()),
        object.type_name.clone(),
    ))
}

/// The system type named by `object`, checked against the document.
fn resolve_system_type<D: HostDocument + ?Sized>(
    doc: &D,
    kind: SystemKind,
    object: &ExternalObject,
) -> Attempt<String> {
    if doc.system_types(kind).iter().any(|t| t == &object.type_name) {
        Ok(object.type_name.clone())
    } else {
        skip(format!(
            "{} type '{}' not found",
            object.category, object.type_name
        ))
    }
}

fn level_near<D: HostDocument + ?Sized>(doc: &D, z: f64) -> Attempt<tether_host::Level> {
    match nearest_level(&doc.levels(), z) {
        Some(level) => Ok(level.clone()),
        None => skip("document has no levels"),
    }
}

// ---------------------------------------------------------------------------
// 1. Point placement
// ---------------------------------------------------------------------------

fn place_point<D: HostDocument + ?Sized>(
    doc: &mut D,
    probe: &mut ProbeScope,
    object: &ExternalObject,
    origin: Point3,
    orientation: Option<Vector3>,
    face_orientation: Option<Vector3>,
) -> Attempt<ElementId> {
    let (family, type_name) = resolve_family_type(doc, object)?;
    let hosting = doc.hosting_behavior(&family.family_name)?;
    let structural = match object.category.curve_behavior() {
        CurveBehavior::SlantedColumn => StructuralUse::Column,
        _ => StructuralUse::NonStructural,
    };

    let (level, host, reference_direction) = match hosting {
        HostingBehavior::Free => (nearest_level(&doc.levels(), origin.z).map(|l| l.id), None, None),
        HostingBehavior::FaceBased => {
            let host = find_host(doc, probe, origin, hosting)?;
            (None, Some(host), Some(face_orientation.unwrap_or(Vector3::BASIS_Z)))
        }
        _ => {
            let level = level_near(doc, origin.z)?;
            let host = find_host(doc, probe, origin, hosting)?;
            (Some(level.id), Some(host), None)
        }
    };

    let id = doc.create(NativeCreate::Instance {
        family,
        type_name,
        origin,
        level,
        host,
        reference_direction,
        structural,
    })?;

    let turn = match (hosting, orientation) {
        (HostingBehavior::Free, Some(dir)) if dir.is_horizontal() && dir.length() > TOLERANCE => {
            Some(dir.plan_angle())
        }
        _ => None,
    };
    finish(doc, id, |doc| match turn {
        Some(angle) => doc.rotate_about_z(id, angle),
        None => Ok(()),
    })
}

fn find_host<D: HostDocument + ?Sized>(
    doc: &mut D,
    probe: &mut ProbeScope,
    at: Point3,
    hosting: HostingBehavior,
) -> Attempt<ElementId> {
    match probe.find_host(doc, at, hosting) {
        Ok(Some(host)) => Ok(host),
        Ok(None) => skip(format!("no host found for {hosting:?} placement at {at:?}")),
        Err(err) => skip(format!("host probe failed: {err}")),
    }
}

// ---------------------------------------------------------------------------
// 2. Single-curve placement
// ---------------------------------------------------------------------------

fn place_curve<D: HostDocument + ?Sized>(
    doc: &mut D,
    settings: &CreateSettings,
    object: &ExternalObject,
    segment: &CurveSegment,
) -> Attempt<ElementId> {
    let curve = match to_host_curve(segment) {
        Ok(curve) => curve,
        Err(err) => return skip(err.to_string()),
    };
    let lowest = segment.lowest().unwrap_or(Point3::ORIGIN);

    match object.category.curve_behavior() {
        CurveBehavior::Wall => {
            if segment.curve_type == CurveType::Spline {
                return skip("walls can only follow lines and arcs");
            }
            let wall_type = resolve_system_type(doc, SystemKind::Wall, object)?;
            let level = level_near(doc, lowest.z)?;
            Ok(doc.create(NativeCreate::Wall {
                curve,
                wall_type,
                level: level.id,
                height: settings.wall_height,
                base_offset: offset_from(&level, lowest.z),
            })?)
        }
        CurveBehavior::SlantedColumn => {
            if segment.curve_type != CurveType::Line {
                return skip("slanted columns need a straight axis");
            }
            let (family, type_name) = resolve_family_type(doc, object)?;
            let start = curve.start().unwrap_or(lowest);
            let level = level_near(doc, start.z)?;
            let id = doc.create(NativeCreate::Instance {
                family,
                type_name,
                origin: start,
                level: Some(level.id),
                host: None,
                reference_direction: None,
                structural: StructuralUse::SlantedColumn,
            })?;
            finish(doc, id, |doc| doc.set_location_curve(id, curve))
        }
        CurveBehavior::Beam => {
            let (family, type_name) = resolve_family_type(doc, object)?;
            let level = nearest_level(&doc.levels(), lowest.z).map(|l| l.id);
            if segment.curve_type == CurveType::Arc {
                let start = curve.start().unwrap_or(lowest);
                let id = doc.create(NativeCreate::Instance {
                    family,
                    type_name,
                    origin: start,
                    level,
                    host: None,
                    reference_direction: None,
                    structural: StructuralUse::Beam,
                })?;
                finish(doc, id, |doc| doc.set_location_curve(id, curve))
            } else {
                Ok(doc.create(NativeCreate::CurveInstance {
                    family,
                    type_name,
                    curve,
                    level,
                    structural: StructuralUse::Beam,
                })?)
            }
        }
        CurveBehavior::Annotation => {
            if segment.curve_type != CurveType::Line {
                return skip("detail items can only follow lines");
            }
            let (family, type_name) = resolve_family_type(doc, object)?;
            let Some(view) = doc.active_view() else {
                return skip("no active view for detail item");
            };
            Ok(doc.create(NativeCreate::ViewInstance {
                family,
                type_name,
                curve,
                view,
            })?)
        }
        CurveBehavior::Generic => {
            if object.category.is_system() {
                return skip(format!(
                    "{} need a closed profile, not a single curve",
                    object.category
                ));
            }
            let (family, type_name) = resolve_family_type(doc, object)?;
            let level = nearest_level(&doc.levels(), lowest.z).map(|l| l.id);
            Ok(doc.create(NativeCreate::CurveInstance {
                family,
                type_name,
                curve,
                level,
                structural: StructuralUse::NonStructural,
            })?)
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Closed-profile placement
// ---------------------------------------------------------------------------

fn place_profile<D: HostDocument + ?Sized>(
    doc: &mut D,
    index: usize,
    object: &ExternalObject,
    segments: &[CurveSegment],
    diagnostics: &mut Vec<Diagnostic>,
) -> Attempt<ElementId> {
    let kind = match SystemKind::for_category(&object.category) {
        Some(kind) => kind,
        None => {
            return skip(format!(
                "closed profiles are only drawn for walls, floors and roofs, not {}",
                object.category
            ))
        }
    };
    let profile = match closed_profile(segments) {
        Ok(profile) => profile,
        Err(err) => return skip(err.to_string()),
    };
    let lowest = lowest_point(segments.iter().flat_map(|s| s.points.iter()))
        .unwrap_or(Point3::ORIGIN);
    let type_name = resolve_system_type(doc, kind, object)?;
    let level = level_near(doc, lowest.z)?;
    let offset = offset_from(&level, lowest.z);

    let (id, offset_parameter) = match kind {
        SystemKind::Wall => (
            doc.create(NativeCreate::ProfileWall {
                profile,
                wall_type: type_name,
                level: level.id,
            })?,
            WALL_BASE_OFFSET,
        ),
        SystemKind::Floor => (
            doc.create(NativeCreate::Floor {
                profile,
                floor_type: type_name,
                level: level.id,
            })?,
            FLOOR_LEVEL_OFFSET,
        ),
        SystemKind::Roof => (
            doc.create(NativeCreate::FootprintRoof {
                profile,
                roof_type: type_name,
                level: level.id,
            })?,
            ROOF_LEVEL_OFFSET,
        ),
    };

    if offset.abs() > TOLERANCE {
        if let Err(err) = doc.set_parameter(id, offset_parameter, &ParameterValue::Double(offset)) {
            tracing::warn!(element = %id, error = %err, "level offset not applied");
            diagnostics.push(Diagnostic::warning(
                Some(index),
                format!("level offset not applied: {err}"),
            ));
        }
    }
    Ok(id)
}

// ---------------------------------------------------------------------------
// 4. Adaptive placement
// ---------------------------------------------------------------------------

fn place_adaptive<D: HostDocument + ?Sized>(
    doc: &mut D,
    index: usize,
    object: &ExternalObject,
    targets: &[Point3],
    diagnostics: &mut Vec<Diagnostic>,
) -> Attempt<ElementId> {
    let (family, type_name) = resolve_family_type(doc, object)?;
    let id = doc.create(NativeCreate::AdaptiveInstance { family, type_name })?;
    let current = match doc.placement_points(id) {
        Ok(points) => points,
        Err(err) => {
            discard(doc, id);
            return Err(err.into());
        }
    };

    for (i, target) in targets.iter().enumerate() {
        let moved = match current.get(i) {
            Some(from) => doc.translate_placement_point(id, i, *target - *from),
            None => Err(HostError::PlacementIndex {
                element: id,
                index: i,
                count: current.len(),
            }),
        };
        if let Err(err) = moved {
            tracing::warn!(element = %id, point = i, error = %err, "adaptive point skipped");
            diagnostics.push(Diagnostic::warning(
                Some(index),
                format!("adaptive point {i} skipped: {err}"),
            ));
        }
    }
    Ok(id)
}
