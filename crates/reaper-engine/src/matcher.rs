//! # Policy Matcher
//!
//! Decides whether one instance satisfies one policy's selectors. Pure and
//! total: no I/O, no clock, never fails. Runtime is not considered here.
//!
//! Checks short-circuit cheapest first:
//!
//! 1. instance type (exact, when constrained)
//! 2. `Name` tag against the glob pattern (missing tag reads as `""`)
//! 3. required tags (all present, values equal, case-sensitive)

use reaper_core::{Instance, Policy};

/// Whether `instance` satisfies every selector of `policy`.
pub fn matches(instance: &Instance, policy: &Policy) -> bool {
    if let Some(required) = policy.instance_type() {
        if required != instance.instance_type {
            return false;
        }
    }

    if let Some(pattern) = policy.name_pattern() {
        if !pattern.matches(instance.display_name().unwrap_or("")) {
            return false;
        }
    }

    policy
        .tags()
        .iter()
        .all(|(key, value)| instance.tags.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use reaper_core::PolicyRecord;
    use std::collections::BTreeMap;

    fn policy(instance_type: Option<&str>, name: Option<&str>, tags: &[(&str, &str)]) -> Policy {
        Policy::from_record(
            PolicyRecord {
                instance_type: instance_type.map(String::from),
                name: name.map(String::from),
                tags: tags
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                max_runtime_hours: 1.0,
            },
            1,
        )
        .unwrap()
    }

    fn instance(instance_type: &str) -> Instance {
        Instance::running("i-1", instance_type, Utc::now())
    }

    #[test]
    fn type_mismatch_fails() {
        let p = policy(Some("t3.large"), None, &[]);
        assert!(matches(&instance("t3.large"), &p));
        assert!(!matches(&instance("t3.micro"), &p));
    }

    #[test]
    fn glob_selects_by_name_tag() {
        let p = policy(None, Some("dev-*"), &[]);
        assert!(matches(&instance("t3.micro").with_tag("Name", "dev-instance-01"), &p));
        assert!(!matches(&instance("t3.micro").with_tag("Name", "prod-instance-01"), &p));
    }

    #[test]
    fn missing_name_tag_reads_as_empty() {
        let star = policy(None, Some("*"), &[]);
        assert!(matches(&instance("t3.micro"), &star));

        let prefixed = policy(None, Some("dev-*"), &[]);
        assert!(!matches(&instance("t3.micro"), &prefixed));
    }

    #[test]
    fn tag_requirements_are_a_conjunction() {
        let p = policy(None, None, &[("Environment", "dev"), ("Team", "backend")]);

        let both = instance("t3.micro")
            .with_tag("Environment", "dev")
            .with_tag("Team", "backend")
            .with_tag("Owner", "someone");
        assert!(matches(&both, &p));

        let missing_team = instance("t3.micro").with_tag("Environment", "dev");
        assert!(!matches(&missing_team, &p));

        let missing_env = instance("t3.micro").with_tag("Team", "backend");
        assert!(!matches(&missing_env, &p));

        let wrong_env = instance("t3.micro")
            .with_tag("Environment", "prod")
            .with_tag("Team", "backend");
        assert!(!matches(&wrong_env, &p));

        let wrong_team = instance("t3.micro")
            .with_tag("Environment", "dev")
            .with_tag("Team", "frontend");
        assert!(!matches(&wrong_team, &p));
    }

    #[test]
    fn tag_values_are_case_sensitive() {
        let p = policy(None, None, &[("Environment", "dev")]);
        assert!(!matches(&instance("t3.micro").with_tag("Environment", "Dev"), &p));
        assert!(!matches(&instance("t3.micro").with_tag("environment", "dev"), &p));
    }

    #[test]
    fn empty_policy_matches_everything() {
        let p = policy(None, None, &[]);
        assert!(matches(&instance("anything"), &p));
    }

    #[test]
    fn all_selectors_must_hold_together() {
        let p = policy(Some("t3.large"), Some("etl-*"), &[("Team", "data")]);
        let ok = instance("t3.large")
            .with_tag("Name", "etl-7")
            .with_tag("Team", "data");
        assert!(matches(&ok, &p));

        let mut wrong_type = ok.clone();
        wrong_type.instance_type = "t3.small".into();
        assert!(!matches(&wrong_type, &p));
    }

    fn arb_instance() -> impl Strategy<Value = Instance> {
        (
            prop::sample::select(vec!["t3.micro", "t3.large", "m5.xlarge"]),
            prop::collection::btree_map(
                prop::sample::select(vec!["Name", "Team", "Environment"]),
                prop::sample::select(vec!["dev-1", "prod-1", "backend", "dev"]),
                0..3,
            ),
        )
            .prop_map(|(t, tags)| {
                let mut inst = Instance::running("i-prop", t, Utc::now());
                inst.tags = tags
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>();
                inst
            })
    }

    fn arb_policy() -> impl Strategy<Value = Policy> {
        (
            prop::option::of(prop::sample::select(vec!["t3.micro", "t3.large"])),
            prop::option::of(prop::sample::select(vec!["dev-*", "*-1", "prod-1"])),
            prop::collection::btree_map(
                prop::sample::select(vec!["Team", "Environment"]),
                prop::sample::select(vec!["backend", "dev"]),
                0..2,
            ),
        )
            .prop_map(|(t, n, tags)| {
                let tags: Vec<(&str, &str)> = tags.into_iter().collect();
                policy(t, n, &tags)
            })
    }

    proptest! {
        #[test]
        fn matching_is_deterministic(inst in arb_instance(), p in arb_policy()) {
            let first = matches(&inst, &p);
            let second = matches(&inst.clone(), &p.clone());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn extra_unrelated_tags_never_break_a_match(inst in arb_instance(), p in arb_policy()) {
            let before = matches(&inst, &p);
            let after = matches(&inst.clone().with_tag("CostCenter", "42"), &p);
            prop_assert_eq!(before, after);
        }
    }
}
