//! Per-object parameter application.

use tether_core::ParameterAssignment;
use tether_host::{ElementId, HostDocument};

use crate::decision::Diagnostic;

/// Parse and set each assignment in order. Failures become diagnostics and
/// never stop the remaining assignments. Returns how many were applied.
pub fn apply_parameters<D: HostDocument + ?Sized>(
    doc: &mut D,
    element: ElementId,
    object: usize,
    parameters: &[ParameterAssignment],
    diagnostics: &mut Vec<Diagnostic>,
) -> usize {
    let mut applied = 0;
    for assignment in parameters {
        let result = assignment
            .typed_value()
            .map_err(|e| e.to_string())
            .and_then(|value| {
                doc.set_parameter(element, &assignment.name, &value)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => applied += 1,
            Err(reason) => {
                tracing::warn!(
                    element = %element,
                    parameter = %assignment.name,
                    %reason,
                    "parameter not applied"
                );
                diagnostics.push(Diagnostic::warning(
                    Some(object),
                    format!("parameter '{}' not applied: {reason}", assignment.name),
                ));
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{ParameterValue, Point3, StorageKind};
    use tether_host::{HostCurve, MemoryDocument, NativeCreate};

    #[test]
    fn bad_parameters_do_not_block_good_ones() {
        let mut doc = MemoryDocument::sample();
        doc.begin("t").expect("begin");
        let level = doc.levels()[0].id;
        let wall = doc
            .create(NativeCreate::Wall {
                curve: HostCurve::Line {
                    start: Point3::ORIGIN,
                    end: Point3::new(5.0, 0.0, 0.0),
                },
                wall_type: "Generic - 8\"".into(),
                level,
                height: 10.0,
                base_offset: 0.0,
            })
            .expect("wall");

        let params = vec![
            ParameterAssignment::new("Missing", StorageKind::String, "x"),
            ParameterAssignment::new("Base Offset", StorageKind::Double, "not a number"),
            ParameterAssignment::new("Comments", StorageKind::Integer, "3"),
            ParameterAssignment::new("Mark", StorageKind::String, "W-1"),
        ];
        let mut diagnostics = Vec::new();
        let applied = apply_parameters(&mut doc, wall, 0, &params, &mut diagnostics);

        assert_eq!(applied, 1);
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(
            doc.parameter(wall, "Mark").expect("mark"),
            ParameterValue::String("W-1".into())
        );
    }
}
