//! Property-based tests for capability masks.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{Action, CapabilityMask};

    fn mask_strategy() -> impl Strategy<Value = CapabilityMask> {
        (any::<bool>(), any::<bool>(), any::<bool>())
            .prop_map(|(r, w, m)| CapabilityMask::new(r, w, m))
    }

    proptest! {
        #[test]
        fn test_intersection_is_subset_of_both(a in mask_strategy(), b in mask_strategy()) {
            let i = a.intersect(&b);
            prop_assert!(i.is_subset_of(&a));
            prop_assert!(i.is_subset_of(&b));
        }

        #[test]
        fn test_union_is_superset_of_both(a in mask_strategy(), b in mask_strategy()) {
            let u = a.union(&b);
            prop_assert!(a.is_subset_of(&u));
            prop_assert!(b.is_subset_of(&u));
        }

        #[test]
        fn test_levels_are_ordered_like_minimum_and_maximum(a in 0u8..=3, b in 0u8..=3) {
            let ma = CapabilityMask::from_level(a);
            let mb = CapabilityMask::from_level(b);
            prop_assert_eq!(ma.intersect(&mb).level(), a.min(b));
            prop_assert_eq!(ma.union(&mb).level(), a.max(b));
        }

        #[test]
        fn test_level_masks_follow_manage_write_read_convention(level in 0u8..=3) {
            let mask = CapabilityMask::from_level(level);
            if mask.grants(&Action::Manage) {
                prop_assert!(mask.grants(&Action::Write));
            }
            if mask.grants(&Action::Write) {
                prop_assert!(mask.grants(&Action::Read));
            }
        }

        #[test]
        fn test_unknown_actions_are_never_granted(name in "[a-z_]{1,12}", mask in mask_strategy()) {
            prop_assume!(!["read", "write", "manage"].contains(&name.as_str()));
            prop_assert!(!mask.grants(&Action::from(name.as_str())));
        }
    }
}
