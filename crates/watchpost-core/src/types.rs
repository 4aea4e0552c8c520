//! Core types flowing through one inference cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Badge observation for the people in frame.
///
/// The Chinese labels are accepted on input since vision models prompted in
/// either language answer with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BadgeStatus {
    #[serde(rename = "worn", alias = "佩戴")]
    Worn,
    #[serde(rename = "not_worn", alias = "未佩戴")]
    NotWorn,
    #[serde(rename = "unconfirmed", alias = "无法确认")]
    Unconfirmed,
    #[serde(rename = "n/a", alias = "不适用")]
    NotApplicable,
}

impl BadgeStatus {
    pub const ALL: [BadgeStatus; 4] = [
        BadgeStatus::Worn,
        BadgeStatus::NotWorn,
        BadgeStatus::Unconfirmed,
        BadgeStatus::NotApplicable,
    ];

    /// Lenient parse of a model-supplied label
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "worn" | "wearing" | "佩戴" => Some(BadgeStatus::Worn),
            "not_worn" | "missing" | "未佩戴" => Some(BadgeStatus::NotWorn),
            "unconfirmed" | "unknown" | "uncertain" | "无法确认" => {
                Some(BadgeStatus::Unconfirmed)
            }
            "n/a" | "na" | "not_applicable" | "none" | "不适用" => {
                Some(BadgeStatus::NotApplicable)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeStatus::Worn => "worn",
            BadgeStatus::NotWorn => "not_worn",
            BadgeStatus::Unconfirmed => "unconfirmed",
            BadgeStatus::NotApplicable => "n/a",
        }
    }

    /// Not worn, or impossible to confirm
    pub fn is_anomalous(&self) -> bool {
        matches!(self, BadgeStatus::NotWorn | BadgeStatus::Unconfirmed)
    }
}

/// Alarm severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlarmLevel {
    #[serde(rename = "none", alias = "无")]
    None,
    #[serde(rename = "general", alias = "一般")]
    General,
    #[serde(rename = "severe", alias = "严重")]
    Severe,
    #[serde(rename = "critical", alias = "紧急")]
    Critical,
}

impl AlarmLevel {
    pub const ALL: [AlarmLevel; 4] = [
        AlarmLevel::None,
        AlarmLevel::General,
        AlarmLevel::Severe,
        AlarmLevel::Critical,
    ];

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "none" | "无" => Some(AlarmLevel::None),
            "general" | "normal" | "一般" => Some(AlarmLevel::General),
            "severe" | "严重" => Some(AlarmLevel::Severe),
            "critical" | "紧急" => Some(AlarmLevel::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmLevel::None => "none",
            AlarmLevel::General => "general",
            AlarmLevel::Severe => "severe",
            AlarmLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlarmLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured scene facts extracted by the vision stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionFacts {
    pub has_person: bool,
    pub badge_status: BadgeStatus,
    #[serde(default, alias = "enter_restricted_area")]
    pub enters_restricted_area: bool,
    #[serde(default)]
    pub has_fire_or_smoke: bool,
    #[serde(default)]
    pub has_electric_risk: bool,
    #[serde(default)]
    pub scene_summary: String,
    #[serde(default)]
    pub object_details: serde_json::Value,
}

impl VisionFacts {
    /// An empty scene: nobody present, no hazards
    pub fn empty() -> Self {
        Self {
            has_person: false,
            badge_status: BadgeStatus::NotApplicable,
            enters_restricted_area: false,
            has_fire_or_smoke: false,
            has_electric_risk: false,
            scene_summary: String::new(),
            object_details: serde_json::Value::Null,
        }
    }

    /// Keyword query used to pull related rules and cases from the index
    pub fn retrieval_query(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.has_person {
            parts.push("person");
            if self.badge_status.is_anomalous() {
                parts.push("badge anomaly");
            }
            if self.enters_restricted_area {
                parts.push("restricted area entry");
            }
        }
        if self.has_fire_or_smoke {
            parts.push("fire smoke");
        }
        if self.has_electric_risk {
            parts.push("electrical risk");
        }

        let mut query = parts.join(" ");
        if !self.scene_summary.is_empty() {
            if !query.is_empty() {
                query.push(' ');
            }
            query.push_str(&self.scene_summary);
        }
        query
    }
}

/// Whether a knowledge document is a policy rule or a past case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Rule,
    Case,
}

impl DocKind {
    /// `case_` anywhere in the source marks a case; other `.md` sources are
    /// rules; anything unrecognised counts as a case.
    pub fn from_source(source_id: &str) -> Self {
        if source_id.contains("case_") {
            DocKind::Case
        } else if source_id.ends_with(".md") {
            DocKind::Rule
        } else {
            DocKind::Case
        }
    }
}

/// One retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub source_id: String,
    /// Similarity in [0, 1]
    pub similarity: f32,
    pub kind: DocKind,
}

impl RetrievedDocument {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>, similarity: f32) -> Self {
        let source_id = source_id.into();
        let similarity = if similarity.is_nan() {
            0.0
        } else {
            similarity.clamp(0.0, 1.0)
        };
        Self {
            text: text.into(),
            kind: DocKind::from_source(&source_id),
            source_id,
            similarity,
        }
    }
}

/// Retrieval counters reported with every decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalCounts {
    pub total: usize,
    pub rules: usize,
    pub cases: usize,
}

impl RetrievalCounts {
    pub fn from_documents(documents: &[RetrievedDocument]) -> Self {
        let rules = documents.iter().filter(|d| d.kind == DocKind::Rule).count();
        Self {
            total: documents.len(),
            rules,
            cases: documents.len() - rules,
        }
    }
}

/// The alarm decision itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub is_alarm: bool,
    pub alarm_level: AlarmLevel,
    #[serde(rename = "alarm_reason")]
    pub reason: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub risk_assessment: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub rules_applied: Vec<String>,
}

/// Who produced the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Model,
    RuleEngine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub model: String,
    pub timestamp: DateTime<Utc>,
    pub source: DecisionSource,
    #[serde(default)]
    pub kb_total_references: usize,
    #[serde(default)]
    pub kb_rule_files: usize,
    #[serde(default)]
    pub kb_history_cases: usize,
    /// Model name the reasoning output claimed for itself, when it differs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_timestamp: Option<String>,
}

impl ResultMetadata {
    pub fn new(model: &str, source: DecisionSource, counts: RetrievalCounts) -> Self {
        Self {
            model: model.to_string(),
            timestamp: Utc::now(),
            source,
            kb_total_references: counts.total,
            kb_rule_files: counts.rules,
            kb_history_cases: counts.cases,
            original_model: None,
            original_timestamp: None,
        }
    }

    pub fn counts(&self) -> RetrievalCounts {
        RetrievalCounts {
            total: self.kb_total_references,
            rules: self.kb_rule_files,
            cases: self.kb_history_cases,
        }
    }
}

/// Validated outcome of the reasoning stage or of the fallback rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    #[serde(rename = "final_decision")]
    pub decision: Decision,
    pub analysis: Analysis,
    pub metadata: ResultMetadata,
}

impl ReasoningResult {
    /// Alarming decisions with a real severity are persisted as cases
    pub fn is_actionable(&self) -> bool {
        self.decision.is_alarm && self.decision.alarm_level != AlarmLevel::None
    }
}

/// Build a case id: `YYYYmmdd_HHMMSS_mmm_<8 hex of the scene summary hash>`
pub fn case_id_for(at: DateTime<Utc>, scene_summary: &str) -> String {
    let digest = Sha256::digest(scene_summary.as_bytes());
    let hash = hex::encode(digest);
    format!("{}_{}", at.format("%Y%m%d_%H%M%S_%3f"), &hash[..8])
}

/// Persisted record of one alarming decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    /// Empty until the case store assigns one
    #[serde(default)]
    pub case_id: String,
    pub vision_facts: VisionFacts,
    pub result: ReasoningResult,
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed: bool,
    #[serde(default)]
    pub review_result: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Case {
    pub fn new(vision_facts: VisionFacts, result: ReasoningResult) -> Self {
        Self {
            case_id: String::new(),
            vision_facts,
            result,
            image_path: None,
            created_at: Utc::now(),
            reviewed: false,
            review_result: None,
            reviewed_at: None,
        }
    }

    pub fn with_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = case_id.into();
        self
    }

    pub fn with_image(mut self, path: PathBuf) -> Self {
        self.image_path = Some(path);
        self
    }
}

/// Flattened result published to notifiers and kept in the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSummary {
    #[serde(default)]
    pub frame_sequence: Option<u64>,
    pub scene_summary: String,
    pub is_alarm: bool,
    pub alarm_level: AlarmLevel,
    pub alarm_reason: String,
    pub confidence: f64,
    #[serde(default)]
    pub risk_assessment: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub kb_total_references: usize,
    #[serde(default)]
    pub kb_rule_files: usize,
    #[serde(default)]
    pub kb_history_cases: usize,
    #[serde(default)]
    pub case_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub source: DecisionSource,
}

impl AlarmSummary {
    pub fn new(facts: &VisionFacts, result: &ReasoningResult, case_id: Option<String>) -> Self {
        Self {
            frame_sequence: None,
            scene_summary: facts.scene_summary.clone(),
            is_alarm: result.decision.is_alarm,
            alarm_level: result.decision.alarm_level,
            alarm_reason: result.decision.reason.clone(),
            confidence: result.decision.confidence,
            risk_assessment: result.analysis.risk_assessment.clone(),
            recommendation: result.analysis.recommendation.clone(),
            kb_total_references: result.metadata.kb_total_references,
            kb_rule_files: result.metadata.kb_rule_files,
            kb_history_cases: result.metadata.kb_history_cases,
            case_id,
            timestamp: Utc::now(),
            model: result.metadata.model.clone(),
            source: result.metadata.source,
        }
    }

    pub fn with_frame(mut self, sequence: u64) -> Self {
        self.frame_sequence = Some(sequence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_doc_kind_from_source() {
        assert_eq!(DocKind::from_source("case_20250101_x.md"), DocKind::Case);
        assert_eq!(DocKind::from_source("cases/case_1.json"), DocKind::Case);
        assert_eq!(DocKind::from_source("badge_policy.md"), DocKind::Rule);
        assert_eq!(DocKind::from_source("notes.txt"), DocKind::Case);
        assert_eq!(DocKind::from_source(""), DocKind::Case);
    }

    #[test]
    fn test_counts_two_cases_one_rule() {
        let docs = vec![
            RetrievedDocument::new("a", "case_1.md", 0.9),
            RetrievedDocument::new("b", "case_2.md", 0.8),
            RetrievedDocument::new("c", "restricted_areas.md", 0.7),
        ];
        let counts = RetrievalCounts::from_documents(&docs);
        assert_eq!(
            counts,
            RetrievalCounts {
                total: 3,
                rules: 1,
                cases: 2
            }
        );
    }

    #[test]
    fn test_similarity_clamped() {
        assert_eq!(RetrievedDocument::new("", "a.md", 1.3).similarity, 1.0);
        assert_eq!(RetrievedDocument::new("", "a.md", -0.2).similarity, 0.0);
        assert_eq!(RetrievedDocument::new("", "a.md", f32::NAN).similarity, 0.0);
    }

    #[test]
    fn test_badge_parse_accepts_both_vocabularies() {
        assert_eq!(BadgeStatus::parse("Not worn"), Some(BadgeStatus::NotWorn));
        assert_eq!(BadgeStatus::parse("未佩戴"), Some(BadgeStatus::NotWorn));
        assert_eq!(BadgeStatus::parse("无法确认"), Some(BadgeStatus::Unconfirmed));
        assert_eq!(BadgeStatus::parse("N/A"), Some(BadgeStatus::NotApplicable));
        assert_eq!(BadgeStatus::parse("sideways"), None);
        for badge in BadgeStatus::ALL {
            assert_eq!(BadgeStatus::parse(badge.as_str()), Some(badge));
        }
    }

    #[test]
    fn test_alarm_level_order_and_aliases() {
        assert!(AlarmLevel::Critical > AlarmLevel::Severe);
        assert!(AlarmLevel::General > AlarmLevel::None);
        let parsed: AlarmLevel = serde_json::from_str("\"紧急\"").unwrap();
        assert_eq!(parsed, AlarmLevel::Critical);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"critical\"");
    }

    #[test]
    fn test_retrieval_query_keywords() {
        let facts = VisionFacts {
            has_person: true,
            badge_status: BadgeStatus::Unconfirmed,
            enters_restricted_area: true,
            has_fire_or_smoke: true,
            has_electric_risk: false,
            scene_summary: "worker near server rack".to_string(),
            object_details: serde_json::Value::Null,
        };
        assert_eq!(
            facts.retrieval_query(),
            "person badge anomaly restricted area entry fire smoke worker near server rack"
        );
        assert_eq!(VisionFacts::empty().retrieval_query(), "");
    }

    #[test]
    fn test_case_id_shape() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::milliseconds(89);
        let id = case_id_for(at, "smoke near panel");
        assert!(id.starts_with("20250304_050607_089_"));
        let hash = id.rsplit('_').next().unwrap();
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, case_id_for(at, "different scene"));
    }

    #[test]
    fn test_vision_facts_accepts_original_field_name() {
        let json = r#"{"has_person":true,"badge_status":"佩戴","enter_restricted_area":true}"#;
        let facts: VisionFacts = serde_json::from_str(json).unwrap();
        assert!(facts.enters_restricted_area);
        assert_eq!(facts.badge_status, BadgeStatus::Worn);
        assert!(!facts.has_fire_or_smoke);
    }
}
