//! The human confirmation step and the diagnostics shown afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};
use tether_core::{Category, IdentityTag};

use crate::classify::{Classification, Decision};

/// A user's answer to a [`DecisionRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    CreateNew,
    ModifyExisting,
    ModifyAndCreate,
    ModifyAndDeleteExtras,
    ModifyIgnoreExtras,
    CreateIgnoringExisting,
    Cancel,
}

impl Choice {
    pub fn label(&self) -> &'static str {
        match self {
            Choice::CreateNew => "Create new elements",
            Choice::ModifyExisting => "Modify existing elements",
            Choice::ModifyAndCreate => "Modify existing and create the remainder",
            Choice::ModifyAndDeleteExtras => "Modify existing and delete the extras",
            Choice::ModifyIgnoreExtras => "Modify existing and keep the extras",
            Choice::CreateIgnoringExisting => "Create new elements, leave existing alone",
            Choice::Cancel => "Cancel",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the user is asked to confirm before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRequest {
    pub classification: Classification,
    pub category: Category,
    pub identity: IdentityTag,
}

impl DecisionRequest {
    /// Choices offered for this classification, in display order.
    pub fn options(&self) -> Vec<Choice> {
        match self.classification.decision {
            Decision::CreateAll => vec![Choice::CreateNew, Choice::Cancel],
            Decision::ModifyAll => vec![
                Choice::ModifyExisting,
                Choice::CreateIgnoringExisting,
                Choice::Cancel,
            ],
            Decision::ModifyAndCreate => vec![
                Choice::ModifyAndCreate,
                Choice::CreateIgnoringExisting,
                Choice::Cancel,
            ],
            Decision::ModifyAndDelete => vec![
                Choice::ModifyAndDeleteExtras,
                Choice::ModifyIgnoreExtras,
                Choice::CreateIgnoringExisting,
                Choice::Cancel,
            ],
        }
    }

    pub fn message(&self) -> String {
        let c = &self.classification;
        match c.decision {
            Decision::CreateAll => format!(
                "{} new {} element(s) will be created.",
                c.create, self.category
            ),
            Decision::ModifyAll => format!(
                "{} existing {} element(s) tagged '{}' will be modified.",
                c.modify, self.category, self.identity
            ),
            Decision::ModifyAndCreate => format!(
                "{} existing {} element(s) tagged '{}' will be modified and {} created.",
                c.modify, self.category, self.identity, c.create
            ),
            Decision::ModifyAndDelete => format!(
                "{} existing {} element(s) tagged '{}' will be modified and {} deleted.",
                c.modify, self.category, self.identity, c.delete
            ),
        }
    }

    /// `choice` if it was offered, otherwise `Cancel`.
    pub fn sanitize(&self, choice: Choice) -> Choice {
        if self.options().contains(&choice) {
            choice
        } else {
            Choice::Cancel
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// A per-object problem surfaced to the user after the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Index into the incoming batch, when the problem belongs to one object.
    pub object: Option<usize>,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(object: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            object,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(object: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            object,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.object {
            Some(i) => write!(f, "{level}: object {i}: {}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// The external confirmation UI.
pub trait DecisionPrompt: Send {
    fn choose(&mut self, request: &DecisionRequest) -> Choice;

    fn report(&mut self, diagnostics: &[Diagnostic]) {
        for d in diagnostics {
            tracing::warn!("{d}");
        }
    }
}

/// Accepts the first offered option.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl DecisionPrompt for AutoApprove {
    fn choose(&mut self, request: &DecisionRequest) -> Choice {
        request.options().first().copied().unwrap_or(Choice::Cancel)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysCancel;

impl DecisionPrompt for AlwaysCancel {
    fn choose(&mut self, _request: &DecisionRequest) -> Choice {
        Choice::Cancel
    }
}

/// Always answers the same choice.
#[derive(Debug, Clone, Copy)]
pub struct FixedChoice(pub Choice);

impl DecisionPrompt for FixedChoice {
    fn choose(&mut self, _request: &DecisionRequest) -> Choice {
        self.0
    }
}
