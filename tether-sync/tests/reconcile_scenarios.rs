//! End-to-end reconciliation scenarios against the in-memory document.

use tether_core::{
    Category, CommitPolicy, CurveSegment, ExternalObject, IdentityTag, ParameterAssignment,
    ParameterValue, Placement, Point3, StorageKind,
};
use tether_host::memory::PROBE_FAMILY;
use tether_host::{tagger, ElementClass, ElementId, HostDocument, MemoryDocument};
use tether_sync::{AutoApprove, Choice, Decision, FixedChoice, Reconciler, Severity};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn wall(y: f64, comment: &str) -> ExternalObject {
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
    .with_parameter(ParameterAssignment::new(
        "Comments",
        StorageKind::String,
        comment,
    ))
}

fn walls(n: usize, comment: &str) -> Vec<ExternalObject> {
    (0..n).map(|i| wall(i as f64 * 5.0, comment)).collect()
}

fn table(x: f64) -> ExternalObject {
    ExternalObject::new(
        "Furniture",
        "Table",
        "60\" x 30\"",
        Placement::point(Point3::new(x, 0.0, 0.0)),
    )
}

fn tagged_walls(doc: &MemoryDocument, identity: &IdentityTag) -> Vec<ElementId> {
    tagger::lookup_by_identity(doc, &Category::Walls, identity)
}

fn seed(doc: &mut MemoryDocument, identity: &IdentityTag, n: usize) -> Vec<ElementId> {
    let report = Reconciler::default()
        .sync(doc, &mut AutoApprove, &walls(n, "seed"), identity)
        .expect("seed sync");
    assert_eq!(report.created, n);
    tagged_walls(doc, identity)
}

// ---------------------------------------------------------------------------
// 1. Classification branches
// ---------------------------------------------------------------------------

#[test]
fn three_new_objects_are_created() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("c-3-0");
    let report = Reconciler::default()
        .sync(&mut doc, &mut AutoApprove, &walls(3, "a"), &identity)
        .expect("sync");
    assert_eq!(report.classification.decision, Decision::CreateAll);
    assert_eq!(report.created, 3);
    assert!(report.accepted);
    assert_eq!(tagged_walls(&doc, &identity).len(), 3);
}

#[test]
fn equal_counts_modify_in_place() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("c-3-3");
    let before = seed(&mut doc, &identity, 3);

    let report = Reconciler::default()
        .sync(&mut doc, &mut AutoApprove, &walls(3, "updated"), &identity)
        .expect("sync");
    assert_eq!(report.classification.decision, Decision::ModifyAll);
    assert_eq!(report.modified, 3);
    assert_eq!(tagged_walls(&doc, &identity), before);
    for id in before {
        assert_eq!(
            doc.parameter(id, "Comments").expect("comments"),
            ParameterValue::String("updated".into())
        );
    }
}

#[test]
fn more_incoming_modifies_then_creates() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("c-5-3");
    let before = seed(&mut doc, &identity, 3);

    let report = Reconciler::default()
        .sync(&mut doc, &mut AutoApprove, &walls(5, "b"), &identity)
        .expect("sync");
    assert_eq!(report.classification.decision, Decision::ModifyAndCreate);
    assert_eq!((report.modified, report.created), (3, 2));
    let after = tagged_walls(&doc, &identity);
    assert_eq!(after.len(), 5);
    assert_eq!(&after[..3], &before[..]);
}

#[test]
fn fewer_incoming_modifies_then_deletes_tail() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("c-2-5");
    let before = seed(&mut doc, &identity, 5);

    let report = Reconciler::default()
        .sync(
            &mut doc,
            &mut FixedChoice(Choice::ModifyAndDeleteExtras),
            &walls(2, "c"),
            &identity,
        )
        .expect("sync");
    assert_eq!(report.classification.decision, Decision::ModifyAndDelete);
    assert_eq!((report.modified, report.deleted), (2, 3));
    assert_eq!(tagged_walls(&doc, &identity), before[..2].to_vec());
    for id in &before[2..] {
        assert!(!doc.contains(*id));
    }
}

#[test]
fn ignoring_extras_keeps_them() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("c-2-5-keep");
    seed(&mut doc, &identity, 5);
    Reconciler::default()
        .sync(
            &mut doc,
            &mut FixedChoice(Choice::ModifyIgnoreExtras),
            &walls(2, "d"),
            &identity,
        )
        .expect("sync");
    assert_eq!(tagged_walls(&doc, &identity).len(), 5);
}

#[test]
fn create_ignoring_existing_adds_a_second_set() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("c-dup");
    seed(&mut doc, &identity, 2);
    Reconciler::default()
        .sync(
            &mut doc,
            &mut FixedChoice(Choice::CreateIgnoringExisting),
            &walls(2, "e"),
            &identity,
        )
        .expect("sync");
    assert_eq!(tagged_walls(&doc, &identity).len(), 4);
}

#[test]
fn resync_is_idempotent_in_count() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("idem");
    let batch = walls(4, "same");
    let reconciler = Reconciler::default();
    for _ in 0..3 {
        reconciler
            .sync(&mut doc, &mut AutoApprove, &batch, &identity)
            .expect("sync");
    }
    assert_eq!(tagged_walls(&doc, &identity).len(), 4);
    assert_eq!(doc.elements(ElementClass::Walls).len(), 4);
}

#[test]
fn identities_do_not_cross() {
    let mut doc = MemoryDocument::sample();
    seed(&mut doc, &IdentityTag::from("one"), 2);
    seed(&mut doc, &IdentityTag::from("two"), 3);
    assert_eq!(tagged_walls(&doc, &IdentityTag::from("one")).len(), 2);
    assert_eq!(tagged_walls(&doc, &IdentityTag::from("two")).len(), 3);
    assert!(tagged_walls(&doc, &IdentityTag::from("on")).is_empty());
}

// ---------------------------------------------------------------------------
// 2. Commit policy
// ---------------------------------------------------------------------------

fn batch_with_native_failure() -> Vec<ExternalObject> {
    vec![
        table(0.0),
        // Curve-based family placed at a point: the host refuses it.
        ExternalObject::new(
            "Generic Models",
            "Handrail Segment",
            "Round",
            Placement::point(Point3::new(5.0, 0.0, 0.0)),
        ),
        table(10.0),
    ]
}

#[test]
fn on_success_rolls_back_whole_batch() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("partial");
    let before = doc.element_count();

    let report = Reconciler {
        policy: CommitPolicy::OnSuccess,
        ..Reconciler::default()
    }
    .sync(&mut doc, &mut AutoApprove, &batch_with_native_failure(), &identity)
    .expect("sync");

    assert!(!report.accepted);
    assert!(!report.committed);
    assert_eq!(report.created, 0);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error && d.object == Some(1)));
    assert_eq!(doc.element_count(), before);
    assert!(tagger::lookup_by_identity(&doc, &Category::from("Furniture"), &identity).is_empty());
    assert!(!doc.in_transaction());
}

#[test]
fn always_commits_partial_work() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("partial");

    let report = Reconciler {
        policy: CommitPolicy::Always,
        ..Reconciler::default()
    }
    .sync(&mut doc, &mut AutoApprove, &batch_with_native_failure(), &identity)
    .expect("sync");

    assert!(report.accepted);
    assert!(report.committed);
    assert_eq!(report.created, 2);
    assert_eq!(
        report
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count(),
        1
    );
    assert_eq!(
        tagger::lookup_by_identity(&doc, &Category::from("Furniture"), &identity).len(),
        2
    );
}

#[test]
fn lookup_skips_do_not_fail_the_batch() {
    let mut doc = MemoryDocument::sample();
    let identity = IdentityTag::from("skips");
    let mut batch = vec![table(0.0)];
    batch.push(ExternalObject::new(
        "Furniture",
        "Sofa",
        "Three Seat",
        Placement::point(Point3::ORIGIN),
    ));
    let report = Reconciler::default()
        .sync(&mut doc, &mut AutoApprove, &batch, &identity)
        .expect("sync");
    assert!(report.accepted);
    assert_eq!(report.created, 1);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].severity, Severity::Warning);
}

// ---------------------------------------------------------------------------
// 3. Probe lifetime
// ---------------------------------------------------------------------------

#[test]
fn probe_never_survives_a_batch() {
    let mut doc = MemoryDocument::sample();
    let reconciler = Reconciler::default();
    reconciler
        .sync(&mut doc, &mut AutoApprove, &walls(1, "host"), &"host".into())
        .expect("wall");

    let door = |x: f64| {
        ExternalObject::new(
            "Doors",
            "Single Flush",
            "36\" x 84\"",
            Placement::point(Point3::new(x, 0.0, 0.0)),
        )
    };
    // One door lands on the wall, one misses every host.
    let report = reconciler
        .sync(&mut doc, &mut AutoApprove, &[door(4.0), door(40.0)], &"doors".into())
        .expect("doors");
    assert_eq!(report.created, 1);
    assert_eq!(report.diagnostics.len(), 1);

    assert!(doc.family_types(PROBE_FAMILY).is_err());
    assert!(doc
        .elements(ElementClass::FamilyInstances)
        .iter()
        .all(|id| doc.element(*id).map(|e| e.family != PROBE_FAMILY).unwrap_or(false)));
}

#[test]
fn deleting_a_host_and_its_dependent_in_one_batch() {
    let mut doc = MemoryDocument::sample();
    let reconciler = Reconciler::default();
    let identity = IdentityTag::from("furniture");
    let sign = ExternalObject::new(
        "Generic Models",
        "Face Sign",
        "Small",
        Placement::point(Point3::new(0.0, 0.0, 0.0)),
    );

    let first = reconciler
        .sync(
            &mut doc,
            &mut AutoApprove,
            &[table(20.0), table(0.0), sign],
            &identity,
        )
        .expect("first");
    assert_eq!(first.created, 3);
    let tagged = tagger::lookup_by_identity(&doc, &Category::from("Furniture"), &identity);
    let sign_id = tagged[2];
    assert_eq!(doc.element(sign_id).and_then(|e| e.host), Some(tagged[1]));

    // The tail holds the second table and the sign it hosts.
    let second = reconciler
        .sync(
            &mut doc,
            &mut FixedChoice(Choice::ModifyAndDeleteExtras),
            &[table(20.0)],
            &identity,
        )
        .expect("second");
    assert!(second.accepted && second.committed, "{:?}", second.diagnostics);
    assert_eq!(second.modified, 1);
    assert_eq!(second.deleted, 2);
    assert_eq!(
        tagger::lookup_by_identity(&doc, &Category::from("Furniture"), &identity),
        vec![tagged[0]]
    );
    assert!(!doc.contains(sign_id));
}

// ---------------------------------------------------------------------------
// 4. Persistence and reporting
// ---------------------------------------------------------------------------

#[test]
fn unsaved_commit_leaves_the_document_untouched() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").expect("blocker");
    let mut doc = MemoryDocument::sample();
    doc.attach(blocker.join("model.yaml"));
    let before = doc.element_count();
    let identity = IdentityTag::from("unsaved");

    let report = Reconciler::default()
        .sync(&mut doc, &mut AutoApprove, &walls(1, "lost"), &identity)
        .expect("sync");
    assert!(!report.accepted);
    assert!(!report.committed);
    assert_eq!(report.created, 0);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error));
    assert_eq!(doc.element_count(), before);
    assert!(tagged_walls(&doc, &identity).is_empty());
    assert!(!doc.in_transaction());
}

#[test]
fn committed_batch_is_written_to_the_model_file() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("model.yaml");
    MemoryDocument::sample().save_to(&path).expect("save");

    let mut doc = MemoryDocument::open(&path).expect("open");
    let identity = IdentityTag::from("persisted");
    seed(&mut doc, &identity, 2);

    let reopened = MemoryDocument::open(&path).expect("reopen");
    assert_eq!(tagged_walls(&reopened, &identity).len(), 2);
}

#[test]
fn report_serializes_with_snake_case_choice() {
    let mut doc = MemoryDocument::sample();
    let report = Reconciler::default()
        .sync(&mut doc, &mut AutoApprove, &walls(1, "json"), &"json".into())
        .expect("sync");
    let value = serde_json::to_value(&report).expect("encode");
    assert_eq!(value["choice"], "create_new");
    assert_eq!(value["classification"]["decision"], "create_all");
    assert_eq!(value["accepted"], true);
    assert_eq!(value["created"], 1);
}
