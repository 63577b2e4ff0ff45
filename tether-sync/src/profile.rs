//! Conversion of client curve segments into host curves.

use tether_core::geometry::TOLERANCE;
use tether_core::{CurveSegment, CurveType, GeometryError, Point3, Vector3};
use tether_host::HostCurve;

/// Splines below this degree are drawn as interpolating curves.
const NURBS_MIN_DEGREE: u32 = 3;

pub fn to_host_curve(segment: &CurveSegment) -> Result<HostCurve, GeometryError> {
    segment.validate()?;
    let p = &segment.points;
    Ok(match segment.curve_type {
        CurveType::Line => HostCurve::Line {
            start: p[0],
            end: p[1],
        },
        CurveType::Arc => HostCurve::Arc {
            start: p[0],
            through: p[1],
            end: p[2],
        },
        CurveType::Spline => {
            let degree = segment.spline_degree();
            if degree < NURBS_MIN_DEGREE {
                HostCurve::Hermite { points: p.clone() }
            } else {
                let weights = segment
                    .weights
                    .clone()
                    .unwrap_or_else(|| vec![1.0; p.len()]);
                let knots = segment
                    .knots
                    .clone()
                    .unwrap_or_else(|| clamped_knots(p.len(), degree));
                HostCurve::Nurbs {
                    points: p.clone(),
                    weights,
                    knots,
                    degree,
                }
            }
        }
    })
}

/// Uniform clamped knot vector for `count` control points.
fn clamped_knots(count: usize, degree: u32) -> Vec<f64> {
    let degree = degree as usize;
    let total = count + degree + 1;
    let spans = count.saturating_sub(degree).max(1);
    (0..total)
        .map(|i| {
            if i <= degree {
                0.0
            } else if i >= count {
                1.0
            } else {
                (i - degree) as f64 / spans as f64
            }
        })
        .collect()
}

/// Convert and check that `segments` chain end-to-start and close on a plane.
pub fn closed_profile(segments: &[CurveSegment]) -> Result<Vec<HostCurve>, GeometryError> {
    let curves = segments
        .iter()
        .map(to_host_curve)
        .collect::<Result<Vec<_>, _>>()?;
    for (i, curve) in curves.iter().enumerate() {
        let next = &curves[(i + 1) % curves.len()];
        let joined = match (curve.end(), next.start()) {
            (Some(end), Some(start)) => end.almost_eq(&start),
            _ => false,
        };
        if !joined {
            return Err(GeometryError::OpenProfile {
                segment: (i + 1) % curves.len(),
            });
        }
    }
    let points: Vec<Point3> = curves.iter().flat_map(HostCurve::points).collect();
    if !is_planar(&points) {
        return Err(GeometryError::NonPlanar);
    }
    Ok(curves)
}

fn is_planar(points: &[Point3]) -> bool {
    let Some(origin) = points.first() else {
        return true;
    };
    let mut normal: Option<Vector3> = None;
    'outer: for (i, a) in points.iter().enumerate().skip(1) {
        for b in &points[i + 1..] {
            let n = (*a - *origin).cross(&(*b - *origin));
            if n.length() > TOLERANCE {
                normal = Some(n);
                break 'outer;
            }
        }
    }
    let Some(n) = normal else {
        return true;
    };
    let len = n.length();
    points
        .iter()
        .all(|p| ((*p - *origin).dot(&n) / len).abs() <= 1e-4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn square(z: f64) -> Vec<CurveSegment> {
        vec![
            CurveSegment::line(pt(0.0, 0.0, z), pt(10.0, 0.0, z)),
            CurveSegment::line(pt(10.0, 0.0, z), pt(10.0, 10.0, z)),
            CurveSegment::line(pt(10.0, 10.0, z), pt(0.0, 10.0, z)),
            CurveSegment::line(pt(0.0, 10.0, z), pt(0.0, 0.0, z)),
        ]
    }

    #[test]
    fn closed_square_is_accepted() {
        assert_eq!(closed_profile(&square(2.0)).expect("closed").len(), 4);
    }

    #[test]
    fn gap_is_reported_at_segment() {
        let mut segs = square(0.0);
        segs[2] = CurveSegment::line(pt(10.0, 11.0, 0.0), pt(0.0, 10.0, 0.0));
        assert_eq!(
            closed_profile(&segs),
            Err(GeometryError::OpenProfile { segment: 2 })
        );
    }

    #[test]
    fn warped_profile_is_rejected() {
        let segs = vec![
            CurveSegment::line(pt(0.0, 0.0, 0.0), pt(10.0, 0.0, 0.0)),
            CurveSegment::line(pt(10.0, 0.0, 0.0), pt(10.0, 10.0, 5.0)),
            CurveSegment::line(pt(10.0, 10.0, 5.0), pt(0.0, 10.0, 0.0)),
            CurveSegment::line(pt(0.0, 10.0, 0.0), pt(0.0, 0.0, 0.0)),
        ];
        assert_eq!(closed_profile(&segs), Err(GeometryError::NonPlanar));
    }

    #[test]
    fn oversized_spline_degree_is_refused_before_knots_are_built() {
        let mut spline = CurveSegment::spline(vec![pt(0.0, 0.0, 0.0), pt(1.0, 1.0, 0.0)], 3);
        spline.degree = Some(u32::MAX);
        assert_eq!(
            to_host_curve(&spline),
            Err(GeometryError::Degree {
                degree: u32::MAX,
                points: 2
            })
        );
    }

    #[test]
    fn spline_degree_selects_curve_kind() {
        let points = vec![pt(0.0, 0.0, 0.0), pt(1.0, 1.0, 0.0), pt(2.0, 0.0, 0.0), pt(3.0, 1.0, 0.0)];
        let low = CurveSegment::spline(points.clone(), 2);
        assert!(matches!(to_host_curve(&low), Ok(HostCurve::Hermite { .. })));
        let high = CurveSegment::spline(points, 3);
        match to_host_curve(&high).expect("nurbs") {
            HostCurve::Nurbs { knots, weights, .. } => {
                assert_eq!(knots.len(), 4 + 3 + 1);
                assert_eq!(weights, vec![1.0; 4]);
            }
            other => panic!("expected nurbs, got {other:?}"),
        }
    }
}
