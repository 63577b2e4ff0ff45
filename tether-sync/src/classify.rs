//! Create / modify / delete classification by count.

use serde::{Deserialize, Serialize};

/// What comparing incoming and existing counts implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    CreateAll,
    ModifyAll,
    ModifyAndCreate,
    ModifyAndDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub decision: Decision,
    pub modify: usize,
    pub create: usize,
    pub delete: usize,
}

/// Classify `incoming` objects against `existing` tagged elements.
pub fn classify(incoming: usize, existing: usize) -> Classification {
    let (decision, modify, create, delete) = if existing == 0 {
        (Decision::CreateAll, 0, incoming, 0)
    } else if incoming == existing {
        (Decision::ModifyAll, existing, 0, 0)
    } else if incoming > existing {
        (Decision::ModifyAndCreate, existing, incoming - existing, 0)
    } else {
        (Decision::ModifyAndDelete, incoming, 0, existing - incoming)
    };
    Classification {
        decision,
        modify,
        create,
        delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(3, 0, Decision::CreateAll, 0, 3, 0)]
    #[case(3, 3, Decision::ModifyAll, 3, 0, 0)]
    #[case(5, 3, Decision::ModifyAndCreate, 3, 2, 0)]
    #[case(2, 5, Decision::ModifyAndDelete, 2, 0, 3)]
    fn concrete_branches(
        #[case] n: usize,
        #[case] m: usize,
        #[case] decision: Decision,
        #[case] modify: usize,
        #[case] create: usize,
        #[case] delete: usize,
    ) {
        assert_eq!(
            classify(n, m),
            Classification {
                decision,
                modify,
                create,
                delete
            }
        );
    }

    proptest! {
        #[test]
        fn counts_partition_both_sides(n in 1usize..200, m in 0usize..200) {
            let c = classify(n, m);
            prop_assert_eq!(c.modify + c.create, n);
            if m > 0 {
                prop_assert_eq!(c.modify + c.delete, m);
                prop_assert_eq!(c.modify, n.min(m));
            }
            let expected = match (m, n.cmp(&m)) {
                (0, _) => Decision::CreateAll,
                (_, std::cmp::Ordering::Equal) => Decision::ModifyAll,
                (_, std::cmp::Ordering::Greater) => Decision::ModifyAndCreate,
                (_, std::cmp::Ordering::Less) => Decision::ModifyAndDelete,
            };
            prop_assert_eq!(c.decision, expected);
        }
    }
}
