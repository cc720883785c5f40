//! `input_topic` wildcard syntax checks, grounded in
//! [`re_core::topic::subtopic_matches`]'s matching rules: `*` stands for
//! exactly one dot-delimited segment, `>` for the remaining segments and
//! short-circuits the match, so anything after it is never evaluated.

use re_core::rule::Rule;

use super::ValidationResult;

fn is_well_formed_segment(segment: &str) -> bool {
    if segment == "*" || segment == ">" {
        return true;
    }
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub(super) fn validate(rule: &Rule, result: &mut ValidationResult) {
    if rule.input_topic.is_empty() {
        return;
    }

    let segments: Vec<&str> = rule.input_topic.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if !is_well_formed_segment(segment) {
            result.error(
                "input_topic",
                format!("segment '{segment}' is not valid: use alphanumerics, '_', '-', '*' or '>'"),
            );
        }
        if *segment == ">" && i != segments.len() - 1 {
            result.warn(
                "input_topic",
                "'>' matches all remaining segments; anything after it is never evaluated",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_rule;
    use re_core::rule::{Logic, LogicType, Output, RuleStatus};
    use uuid::Uuid;

    fn rule_with_topic(input_topic: &str) -> Rule {
        let now = chrono::Utc::now();
        Rule {
            id: Uuid::new_v4(),
            domain_id: "d1".into(),
            name: "r".into(),
            tags: vec![],
            metadata: Default::default(),
            input_channel: "sensors".into(),
            input_topic: input_topic.into(),
            logic: Logic { logic_type: LogicType::Lua, source: "return true".into() },
            outputs: vec![Output::SenmlSave],
            schedule: None,
            status: RuleStatus::Enabled,
            created_at: now,
            created_by: "u".into(),
            updated_at: now,
            updated_by: "u".into(),
            last_run_status: Default::default(),
        }
    }

    #[test]
    fn wildcard_segments_are_accepted() {
        assert!(validate_rule(&rule_with_topic("*.temperature")).valid);
        assert!(validate_rule(&rule_with_topic("fleet.>")).valid);
    }

    #[test]
    fn empty_segment_is_rejected() {
        assert!(!validate_rule(&rule_with_topic("fleet..temperature")).valid);
    }

    #[test]
    fn non_final_gt_produces_a_warning() {
        let result = validate_rule(&rule_with_topic("fleet.>.temperature"));
        assert!(result.warnings.iter().any(|w| w.path == "input_topic"));
    }

    #[test]
    fn empty_topic_is_allowed() {
        assert!(validate_rule(&rule_with_topic("")).valid);
    }
}
