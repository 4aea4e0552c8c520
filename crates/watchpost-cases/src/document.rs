//! Markdown rendering of a case for the knowledge corpus

use serde_json::json;
use std::fmt::Write;
use watchpost_core::{Case, RetrievalCounts};

fn reference_line(counts: RetrievalCounts) -> String {
    match (counts.cases, counts.rules) {
        _ if counts.total == 0 => "no knowledge base references".to_string(),
        (0, 0) => format!("{} knowledge base references", counts.total),
        (cases, 0) => format!("referenced {} past cases", cases),
        (0, rules) => format!("referenced {} rule documents", rules),
        (cases, rules) => format!("referenced {} past cases and {} rule documents", cases, rules),
    }
}

fn first_chars(text: &str, n: usize) -> String {
    text.chars().take(n).filter(|c| *c != ',').collect()
}

/// Render the corpus document for `case`. Section headings use `## ` so
/// the chunker splits them into separate retrievable chunks.
pub fn render_case_document(case: &Case) -> String {
    let decision = &case.result.decision;
    let analysis = &case.result.analysis;
    let metadata = &case.result.metadata;
    let level = decision.alarm_level.as_str();
    let created = case.created_at.format("%Y-%m-%d %H:%M:%S");

    let facts = serde_json::to_string_pretty(&case.vision_facts).unwrap_or_default();
    let final_decision = serde_json::to_string_pretty(&json!({
        "is_alarm": if decision.is_alarm { "yes" } else { "no" },
        "alarm_level": level,
        "alarm_reason": decision.reason,
        "confidence": decision.confidence,
    }))
    .unwrap_or_default();
    let image = case
        .image_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "none".to_string());

    let mut doc = String::new();
    let _ = writeln!(doc, "# Alarm case: {} alarm", level);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Case information");
    let _ = writeln!(doc, "- **Case ID**: {}", case.case_id);
    let _ = writeln!(doc, "- **Triggered at**: {}", created);
    let _ = writeln!(doc, "- **Alarm level**: {}", level);
    let _ = writeln!(doc, "- **Alarm**: {}", if decision.is_alarm { "yes" } else { "no" });
    let _ = writeln!(doc, "- **Confidence**: {:.4}", decision.confidence);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Knowledge base references");
    let _ = writeln!(doc, "{}", reference_line(metadata.counts()));
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Scene summary");
    let _ = writeln!(doc, "{}", case.vision_facts.scene_summary);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Alarm reason");
    let _ = writeln!(doc, "{}", decision.reason);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Vision analysis");
    let _ = writeln!(doc, "```json\n{}\n```", facts);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Final decision");
    let _ = writeln!(doc, "```json\n{}\n```", final_decision);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Risk assessment");
    let _ = writeln!(doc, "{}", analysis.risk_assessment);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Recommendation");
    let _ = writeln!(doc, "{}", analysis.recommendation);
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## System information");
    let _ = writeln!(doc, "- Model: {}", metadata.model);
    let _ = writeln!(doc, "- Image: {}", image);
    let _ = writeln!(doc, "- Analysed at: {}", metadata.timestamp.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Keywords");
    let _ = writeln!(doc, "{} alarm", level);
    let _ = writeln!(doc, "{}", first_chars(&case.vision_facts.scene_summary, 50));
    let _ = writeln!(doc, "{}", first_chars(&decision.reason, 50));
    let _ = writeln!(doc, "{}", metadata.model);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchpost_core::{fallback_result, BadgeStatus, VisionFacts};

    #[test]
    fn test_document_sections() {
        let facts = VisionFacts {
            has_person: true,
            badge_status: BadgeStatus::NotWorn,
            scene_summary: "worker at gate, no badge".to_string(),
            ..VisionFacts::empty()
        };
        let counts = RetrievalCounts {
            total: 3,
            rules: 1,
            cases: 2,
        };
        let case = Case::new(facts.clone(), fallback_result(&facts, counts)).with_id("abc");
        let doc = render_case_document(&case);

        assert!(doc.starts_with("# Alarm case: general alarm"));
        assert!(doc.contains("- **Case ID**: abc"));
        assert!(doc.contains("referenced 2 past cases and 1 rule documents"));
        assert!(doc.contains("\"badge_status\": \"not_worn\""));
        assert!(doc.contains("worker at gate no badge"));
        assert!(doc.contains("- **Confidence**: 0.5000"));
    }

    #[test]
    fn test_reference_line() {
        let line = |total, rules, cases| reference_line(RetrievalCounts { total, rules, cases });
        assert_eq!(line(0, 0, 0), "no knowledge base references");
        assert_eq!(line(2, 0, 2), "referenced 2 past cases");
        assert_eq!(line(1, 1, 0), "referenced 1 rule documents");
    }
}
