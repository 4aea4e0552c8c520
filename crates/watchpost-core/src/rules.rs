//! Deterministic alarm rules, used as the fallback decision path

use crate::types::{
    AlarmLevel, Analysis, BadgeStatus, Decision, DecisionSource, ReasoningResult,
    ResultMetadata, RetrievalCounts, VisionFacts,
};
use crate::validate::DEFAULT_CONFIDENCE;

/// Model name recorded on decisions made by the rule engine
pub const FALLBACK_MODEL: &str = "fallback rule engine";

/// Which rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    EnvironmentalHazard,
    NobodyPresent,
    RestrictedAreaEntry,
    BadgeAnomaly,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub is_alarm: bool,
    pub level: AlarmLevel,
    pub reason: &'static str,
    pub rule: Rule,
}

const fn verdict(is_alarm: bool, level: AlarmLevel, reason: &'static str, rule: Rule) -> Verdict {
    Verdict {
        is_alarm,
        level,
        reason,
        rule,
    }
}

/// Evaluate the rules top to bottom; the first match wins
pub fn decide(facts: &VisionFacts) -> Verdict {
    // Environmental hazards alarm whether or not anyone is in frame.
    if facts.has_fire_or_smoke || facts.has_electric_risk {
        return verdict(
            true,
            AlarmLevel::Critical,
            "environmental safety hazard detected",
            Rule::EnvironmentalHazard,
        );
    }

    if !facts.has_person {
        return verdict(
            false,
            AlarmLevel::None,
            "no person detected in frame",
            Rule::NobodyPresent,
        );
    }

    if facts.enters_restricted_area {
        return if facts.badge_status == BadgeStatus::NotWorn {
            verdict(
                true,
                AlarmLevel::Critical,
                "entered restricted area without a badge",
                Rule::RestrictedAreaEntry,
            )
        } else {
            verdict(
                true,
                AlarmLevel::Severe,
                "person entered restricted area",
                Rule::RestrictedAreaEntry,
            )
        };
    }

    if facts.badge_status.is_anomalous() {
        return verdict(
            true,
            AlarmLevel::General,
            "badge not worn or could not be confirmed",
            Rule::BadgeAnomaly,
        );
    }

    verdict(false, AlarmLevel::None, "no security anomaly found", Rule::Clear)
}

/// Build the full fallback result for when the reasoning stage is unusable
pub fn fallback_result(facts: &VisionFacts, counts: RetrievalCounts) -> ReasoningResult {
    let verdict = decide(facts);
    ReasoningResult {
        decision: Decision {
            is_alarm: verdict.is_alarm,
            alarm_level: verdict.level,
            reason: verdict.reason.to_string(),
            confidence: DEFAULT_CONFIDENCE,
        },
        analysis: Analysis {
            risk_assessment: "decided by the fallback rule engine".to_string(),
            recommendation: "check the reasoning model".to_string(),
            rules_applied: vec![FALLBACK_MODEL.to_string()],
        },
        metadata: ResultMetadata::new(FALLBACK_MODEL, DecisionSource::RuleEngine, counts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(
        has_person: bool,
        badge: BadgeStatus,
        restricted: bool,
        fire: bool,
        electric: bool,
    ) -> VisionFacts {
        VisionFacts {
            has_person,
            badge_status: badge,
            enters_restricted_area: restricted,
            has_fire_or_smoke: fire,
            has_electric_risk: electric,
            ..VisionFacts::empty()
        }
    }

    #[test]
    fn test_fire_without_person_is_critical() {
        let v = decide(&facts(false, BadgeStatus::NotApplicable, false, true, false));
        assert!(v.is_alarm);
        assert_eq!(v.level, AlarmLevel::Critical);
        assert_eq!(v.rule, Rule::EnvironmentalHazard);
    }

    #[test]
    fn test_nobody_present() {
        let v = decide(&facts(false, BadgeStatus::NotWorn, true, false, false));
        assert!(!v.is_alarm);
        assert_eq!(v.level, AlarmLevel::None);
    }

    #[test]
    fn test_restricted_area() {
        let without_badge = decide(&facts(true, BadgeStatus::NotWorn, true, false, false));
        assert_eq!(without_badge.level, AlarmLevel::Critical);

        let unconfirmed = decide(&facts(true, BadgeStatus::Unconfirmed, true, false, false));
        assert_eq!(unconfirmed.level, AlarmLevel::Severe);

        let worn = decide(&facts(true, BadgeStatus::Worn, true, false, false));
        assert_eq!(worn.level, AlarmLevel::Severe);
    }

    #[test]
    fn test_badge_anomaly_outside_restricted_area() {
        for badge in [BadgeStatus::NotWorn, BadgeStatus::Unconfirmed] {
            let v = decide(&facts(true, badge, false, false, false));
            assert!(v.is_alarm);
            assert_eq!(v.level, AlarmLevel::General);
        }
        let clear = decide(&facts(true, BadgeStatus::Worn, false, false, false));
        assert_eq!(clear.rule, Rule::Clear);
        assert!(!clear.is_alarm);
    }

    #[test]
    fn test_total_over_all_inputs() {
        let flags = [false, true];
        for &person in &flags {
            for badge in BadgeStatus::ALL {
                for &restricted in &flags {
                    for &fire in &flags {
                        for &electric in &flags {
                            let v = decide(&facts(person, badge, restricted, fire, electric));
                            // Alarm iff the level is above none.
                            assert_eq!(v.is_alarm, v.level != AlarmLevel::None);
                            if fire || electric {
                                assert_eq!(v.level, AlarmLevel::Critical);
                            } else if !person {
                                assert_eq!(v.rule, Rule::NobodyPresent);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_fallback_result_shape() {
        let counts = RetrievalCounts {
            total: 2,
            rules: 0,
            cases: 2,
        };
        let result = fallback_result(
            &facts(true, BadgeStatus::Unconfirmed, false, false, false),
            counts,
        );
        assert_eq!(result.decision.confidence, 0.5);
        assert_eq!(result.metadata.model, FALLBACK_MODEL);
        assert_eq!(result.metadata.source, DecisionSource::RuleEngine);
        assert_eq!(result.metadata.counts(), counts);
        assert!(result.is_actionable());
    }
}
