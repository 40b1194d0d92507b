//! Property-based tests for set reconciliation
//!
//! Uses proptest to verify the diff laws and that applying a plan to the
//! in-memory service lands exactly on the desired membership.

use policy_attach::{
    diff, reconcile, InMemoryIdentityService, MemberSet, PolicyAttachment, PrincipalKind,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

const ARN: &str = "arn:aws:iam::123456789012:policy/prop";

fn names() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-f][0-9]", 0..8)
}

fn member_set() -> impl Strategy<Value = MemberSet> {
    (names(), names(), names()).prop_map(|(users, roles, groups)| MemberSet {
        users,
        roles,
        groups,
    })
}

/// Service where every generated name exists as every kind
fn service_with(attached: &MemberSet) -> InMemoryIdentityService {
    let iam = InMemoryIdentityService::new().with_policy(ARN);
    for kind in PrincipalKind::ALL {
        for a in 'a'..='f' {
            for d in '0'..='9' {
                iam.create_principal(kind, &format!("{a}{d}"));
            }
        }
    }
    for (kind, name) in attached.iter() {
        iam.seed_attachment(kind, name, ARN);
    }
    iam
}

proptest! {
    #[test]
    fn prop_diff_laws(prior in names(), desired in names()) {
        let delta = diff(&prior, &desired);

        prop_assert!(delta.remove.is_disjoint(&delta.add));
        prop_assert!(delta.remove.is_subset(&prior));
        prop_assert!(delta.add.is_subset(&desired));
        prop_assert_eq!(delta.apply_to(&prior), desired.clone());

        // Names in both sets are never touched
        for name in prior.intersection(&desired) {
            prop_assert!(!delta.remove.contains(name));
            prop_assert!(!delta.add.contains(name));
        }
    }

    #[test]
    fn prop_diff_of_equal_sets_is_empty(set in names()) {
        prop_assert!(diff(&set, &set).is_empty());
    }

    #[test]
    fn prop_update_reaches_desired(prior in member_set(), desired in member_set()) {
        let iam = service_with(&prior);
        let attachment = PolicyAttachment::new("prop-attach", ARN);

        let report = reconcile::update(&iam, &attachment, &prior, &desired).unwrap();

        prop_assert_eq!(iam.attached(ARN).unwrap(), desired.clone());
        prop_assert_eq!(report.calls_issued(), reconcile::plan(&prior, &desired).len());
    }

    #[test]
    fn prop_second_update_issues_no_calls(prior in member_set(), desired in member_set()) {
        let iam = service_with(&prior);
        let attachment = PolicyAttachment::new("prop-attach", ARN);

        reconcile::update(&iam, &attachment, &prior, &desired).unwrap();
        iam.clear_calls();
        reconcile::update(&iam, &attachment, &desired, &desired).unwrap();

        prop_assert!(iam.calls().is_empty());
    }
}
