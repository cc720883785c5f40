//! Schedule invariant checks (spec §3 "Schedule").

use re_core::rule::{Recurring, Rule};

use super::ValidationResult;

pub(super) fn validate(rule: &Rule, result: &mut ValidationResult) {
    let Some(schedule) = &rule.schedule else {
        return;
    };

    if schedule.recurring != Recurring::None && schedule.recurring_period == 0 {
        result.error(
            "schedule.recurring_period",
            "recurring_period must be greater than 0 when recurring is set",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_rule;
    use re_core::rule::{Logic, LogicType, Output, RuleStatus, Schedule};
    use uuid::Uuid;

    fn rule_with(schedule: Schedule) -> Rule {
        let now = chrono::Utc::now();
        Rule {
            id: Uuid::new_v4(),
            domain_id: "d1".into(),
            name: "r".into(),
            tags: vec![],
            metadata: Default::default(),
            input_channel: "sensors".into(),
            input_topic: "".into(),
            logic: Logic { logic_type: LogicType::Lua, source: "return true".into() },
            outputs: vec![Output::SenmlSave],
            schedule: Some(schedule),
            status: RuleStatus::Enabled,
            created_at: now,
            created_by: "u".into(),
            updated_at: now,
            updated_by: "u".into(),
            last_run_status: Default::default(),
        }
    }

    #[test]
    fn zero_period_with_recurrence_is_rejected() {
        let now = chrono::Utc::now();
        let rule = rule_with(Schedule {
            start: now,
            time_of_day: now,
            recurring: Recurring::Daily,
            recurring_period: 0,
            next_due: None,
        });
        assert!(!validate_rule(&rule).valid);
    }

    #[test]
    fn non_recurring_schedule_ignores_period() {
        let now = chrono::Utc::now();
        let rule = rule_with(Schedule {
            start: now,
            time_of_day: now,
            recurring: Recurring::None,
            recurring_period: 0,
            next_due: None,
        });
        assert!(validate_rule(&rule).valid);
    }
}
