//! Identity-based reconciliation of an incoming batch against the document.

use serde::Serialize;
use tether_core::{BridgeConfig, CommitPolicy, ExternalObject, IdentityTag};
use tether_host::{tagger, HostDocument};

use crate::classify::{classify, Classification};
use crate::create::{create_object, CreateSettings, Created};
use crate::decision::{Choice, DecisionPrompt, DecisionRequest, Diagnostic};
use crate::error::SyncError;
use crate::params::apply_parameters;
use crate::plan::{plan, SyncPlan};
use crate::probe::with_probe;

/// Name of the single transaction each batch runs in.
pub const TRANSACTION_NAME: &str = "Tether Sync";

/// Outcome of one [`Reconciler::sync`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub classification: Classification,
    pub choice: Choice,
    /// The user confirmed and the chosen mutations were attempted and kept.
    pub accepted: bool,
    pub committed: bool,
    pub modified: usize,
    pub created: usize,
    pub deleted: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl SyncReport {
    fn new(classification: Classification, choice: Choice) -> Self {
        Self {
            classification,
            choice,
            accepted: false,
            committed: false,
            modified: 0,
            created: 0,
            deleted: 0,
            diagnostics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    pub policy: CommitPolicy,
    pub wall_height: f64,
    pub probe_offset: f64,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Counts gathered while applying a plan.
#[derive(Default)]
struct Applied {
    modified: usize,
    created: usize,
    deleted: usize,
    native_failures: usize,
}

impl Reconciler {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            policy: config.commit_policy,
            wall_height: config.default_wall_height,
            probe_offset: config.probe_offset,
        }
    }

    /// Reconcile `incoming` with the elements already tagged `identity`.
    ///
    /// Nothing is mutated until `prompt` confirms. The confirmed plan runs in
    /// one transaction; whether a batch with native failures is kept depends
    /// on the commit policy.
    pub fn sync<D: HostDocument + ?Sized>(
        &self,
        doc: &mut D,
        prompt: &mut dyn DecisionPrompt,
        incoming: &[ExternalObject],
        identity: &IdentityTag,
    ) -> Result<SyncReport, SyncError> {
        let first = incoming.first().ok_or(SyncError::EmptyBatch)?;
        let existing = tagger::lookup_by_identity(doc, &first.category, identity);
        let classification = classify(incoming.len(), existing.len());
        let request = DecisionRequest {
            classification,
            category: first.category.clone(),
            identity: identity.clone(),
        };
        tracing::info!(
            %identity,
            incoming = incoming.len(),
            existing = existing.len(),
            decision = ?classification.decision,
            "reconciling"
        );

        let choice = request.sanitize(prompt.choose(&request));
        let mut report = SyncReport::new(classification, choice);
        if choice == Choice::Cancel {
            tracing::info!(%identity, "sync cancelled");
            return Ok(report);
        }

        let work = plan(choice, incoming.len(), &existing);
        if let Err(err) = doc.begin(TRANSACTION_NAME) {
            tracing::warn!(error = %err, "could not open transaction");
            report.diagnostics.push(Diagnostic::error(None, err.to_string()));
            prompt.report(&report.diagnostics);
            return Ok(report);
        }

        let settings = CreateSettings {
            wall_height: self.wall_height,
        };
        let stop_on_failure = self.policy == CommitPolicy::OnSuccess;
        let mut diagnostics = Vec::new();
        let applied = with_probe(doc, self.probe_offset, |doc, probe| {
            let mut applied = Applied::default();
            self.apply_head(doc, &work, incoming, &mut applied, &mut diagnostics);
            for &id in &work.delete {
                // Already gone if an earlier delete removed its host.
                if doc.contains(id) {
                    doc.delete(id)?;
                }
                applied.deleted += 1;
            }
            for &index in &work.create {
                match create_object(
                    doc,
                    probe,
                    &settings,
                    index,
                    &incoming[index],
                    identity,
                    &mut diagnostics,
                ) {
                    Ok(Created::Element(_)) => applied.created += 1,
                    Ok(Created::Skipped) => {}
                    Err(_) => {
                        applied.native_failures += 1;
                        if stop_on_failure {
                            break;
                        }
                    }
                }
            }
            Ok(applied)
        });
        report.diagnostics = diagnostics;

        let applied = match applied {
            Ok(applied) => applied,
            Err(err) => {
                tracing::warn!(error = %err, "sync aborted; rolling back");
                report.diagnostics.push(Diagnostic::error(None, err.to_string()));
                self.rollback(doc, &mut report);
                prompt.report(&report.diagnostics);
                return Ok(report);
            }
        };

        if applied.native_failures > 0 && stop_on_failure {
            tracing::warn!(
                %identity,
                failures = applied.native_failures,
                "native creation failed; rolling back batch"
            );
            self.rollback(doc, &mut report);
            prompt.report(&report.diagnostics);
            return Ok(report);
        }

        match doc.commit() {
            Ok(()) => {
                report.accepted = true;
                report.committed = true;
                report.modified = applied.modified;
                report.created = applied.created;
                report.deleted = applied.deleted;
            }
            Err(err) => {
                tracing::warn!(error = %err, "commit failed");
                report.diagnostics.push(Diagnostic::error(None, err.to_string()));
                self.rollback(doc, &mut report);
            }
        }

        tracing::info!(
            %identity,
            accepted = report.accepted,
            modified = report.modified,
            created = report.created,
            deleted = report.deleted,
            diagnostics = report.diagnostics.len(),
            "sync finished"
        );
        if !report.diagnostics.is_empty() {
            prompt.report(&report.diagnostics);
        }
        Ok(report)
    }

    /// Re-apply parameters to the paired existing elements; geometry is kept.
    fn apply_head<D: HostDocument + ?Sized>(
        &self,
        doc: &mut D,
        work: &SyncPlan,
        incoming: &[ExternalObject],
        applied: &mut Applied,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for &(index, id) in &work.modify {
            apply_parameters(doc, id, index, &incoming[index].parameters, diagnostics);
            applied.modified += 1;
        }
    }

    fn rollback<D: HostDocument + ?Sized>(&self, doc: &mut D, report: &mut SyncReport) {
        report.accepted = false;
        report.committed = false;
        report.modified = 0;
        report.created = 0;
        report.deleted = 0;
        if let Err(err) = doc.rollback() {
            tracing::debug!(error = %err, "nothing to roll back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{AlwaysCancel, AutoApprove, FixedChoice};
    use tether_core::{CurveSegment, Placement, Point3};
    use tether_host::{ElementClass, MemoryDocument};

    fn wall(y: f64) -> ExternalObject {
        ExternalObject::new(
            "Walls",
            "Basic Wall",
            "Generic - 8\"",
            Placement::Curves {
                segments: vec![CurveSegment::line(
                    Point3::new(0.0, y, 0.0),
                    Point3::new(10.0, y, 0.0),
                )],
            },
        )
    }

    #[test]
    fn empty_batch_is_rejected() {
        let mut doc = MemoryDocument::sample();
        let err = Reconciler::default()
            .sync(&mut doc, &mut AutoApprove, &[], &"x".into())
            .unwrap_err();
        assert!(matches!(err, SyncError::EmptyBatch));
    }

    #[test]
    fn cancel_leaves_document_alone() {
        let mut doc = MemoryDocument::sample();
        let report = Reconciler::default()
            .sync(&mut doc, &mut AlwaysCancel, &[wall(0.0)], &"x".into())
            .expect("sync");
        assert!(!report.accepted);
        assert_eq!(report.choice, Choice::Cancel);
        assert!(doc.elements(ElementClass::Walls).is_empty());
        assert!(!doc.in_transaction());
    }

    #[test]
    fn unoffered_choice_counts_as_cancel() {
        let mut doc = MemoryDocument::sample();
        let report = Reconciler::default()
            .sync(
                &mut doc,
                &mut FixedChoice(Choice::ModifyAndDeleteExtras),
                &[wall(0.0)],
                &"x".into(),
            )
            .expect("sync");
        assert_eq!(report.choice, Choice::Cancel);
        assert!(doc.elements(ElementClass::Walls).is_empty());
    }

    #[test]
    fn create_then_modify_keeps_count() {
        let mut doc = MemoryDocument::sample();
        let identity = IdentityTag::from("walls-1");
        let batch = vec![wall(0.0), wall(5.0), wall(10.0)];
        let reconciler = Reconciler::default();

        let first = reconciler
            .sync(&mut doc, &mut AutoApprove, &batch, &identity)
            .expect("first");
        assert!(first.accepted && first.committed);
        assert_eq!(first.created, 3);

        let second = reconciler
            .sync(&mut doc, &mut AutoApprove, &batch, &identity)
            .expect("second");
        assert_eq!(second.choice, Choice::ModifyExisting);
        assert_eq!(second.modified, 3);
        assert_eq!(
            tagger::lookup_by_identity(&doc, &tether_core::Category::Walls, &identity).len(),
            3
        );
    }
}
