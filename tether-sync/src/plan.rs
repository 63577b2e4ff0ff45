//! Positional partition of a batch into modify / create / delete work.

use tether_host::ElementId;

use crate::decision::Choice;

/// Work derived from a confirmed [`Choice`].
///
/// `modify` pairs incoming index *i* with the *i*-th existing element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub modify: Vec<(usize, ElementId)>,
    pub create: Vec<usize>,
    pub delete: Vec<ElementId>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.modify.is_empty() && self.create.is_empty() && self.delete.is_empty()
    }
}

pub fn plan(choice: Choice, incoming: usize, existing: &[ElementId]) -> SyncPlan {
    let head = incoming.min(existing.len());
    let paired = || existing[..head].iter().copied().enumerate().collect::<Vec<_>>();
    match choice {
        Choice::Cancel => SyncPlan::default(),
        Choice::CreateNew | Choice::CreateIgnoringExisting => SyncPlan {
            create: (0..incoming).collect(),
            ..SyncPlan::default()
        },
        Choice::ModifyExisting | Choice::ModifyIgnoreExtras => SyncPlan {
            modify: paired(),
            ..SyncPlan::default()
        },
        Choice::ModifyAndCreate => SyncPlan {
            modify: paired(),
            create: (head..incoming).collect(),
            ..SyncPlan::default()
        },
        Choice::ModifyAndDeleteExtras => SyncPlan {
            modify: paired(),
            delete: existing[head..].to_vec(),
            ..SyncPlan::default()
        },
    }
}
