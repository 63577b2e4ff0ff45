//! # tether-sync
//!
//! Identity-based reconciliation of client objects into a host document.
//!
//! Call [`Reconciler::sync`] with the live document, a [`DecisionPrompt`], the
//! incoming batch and its identity. The reconciler classifies the batch against
//! the elements already carrying that identity, asks the prompt to confirm, and
//! applies the confirmed plan in one transaction.

pub mod classify;
pub mod create;
pub mod decision;
pub mod error;
pub mod levels;
pub mod params;
pub mod plan;
pub mod probe;
pub mod profile;
pub mod reconcile;

pub use classify::{classify, Classification, Decision};
pub use decision::{
    AlwaysCancel, AutoApprove, Choice, DecisionPrompt, DecisionRequest, Diagnostic, FixedChoice,
    Severity,
};
pub use error::SyncError;
pub use plan::{plan, SyncPlan};
pub use reconcile::{Reconciler, SyncReport, TRANSACTION_NAME};
