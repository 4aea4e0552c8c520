//! Prompt text for both stages

use std::fmt::Write;
use watchpost_core::{RetrievedDocument, VisionFacts};

/// Hits quoted in the reasoning prompt
const PROMPT_HITS: usize = 3;
/// Characters of each hit quoted in the reasoning prompt
const HIT_EXCERPT_CHARS: usize = 150;

pub const VISION_PROMPT: &str = r#"You are the visual perception module of a site security system.
Output JSON only. No explanation, no extra text.
Use exactly this shape:
{
  "has_person": true/false,
  "badge_status": "worn" / "not_worn" / "unconfirmed" / "n/a",
  "enters_restricted_area": true/false,
  "has_fire_or_smoke": true/false,
  "has_electric_risk": true/false,
  "scene_summary": "one sentence describing the frame",
  "object_details": {
    "person_count": number,
    "person_positions": ["position description"],
    "environment_status": "environment description"
  }
}
"#;

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Reasoning prompt: the vision facts, up to three retrieved documents and
/// the required output format
pub fn reasoning_prompt(facts: &VisionFacts, documents: &[RetrievedDocument], model: &str) -> String {
    let mut context = String::new();
    if documents.is_empty() {
        context.push_str("Related knowledge: none\n");
    } else {
        context.push_str("Related knowledge:\n");
        for (i, doc) in documents.iter().take(PROMPT_HITS).enumerate() {
            let excerpt: String = doc.text.chars().take(HIT_EXCERPT_CHARS).collect();
            let _ = writeln!(context, "{}. Source: {}", i + 1, doc.source_id);
            let _ = writeln!(context, "   Content: {}...", excerpt);
            let _ = writeln!(context, "   Similarity: {:.4}", doc.similarity);
        }
    }

    format!(
        r#"You are a security expert analysing a surveillance frame and deciding whether to raise an alarm.

## Instructions
- Output JSON only, with no other text
- The JSON must follow the format below exactly
- confidence must be a plain number between 0.0 and 1.0
- Do not explain, comment or do arithmetic

## Vision analysis
- Person present: {person}
- Badge status: {badge}
- Entering restricted area: {restricted}
- Fire or smoke: {fire}
- Electrical risk: {electric}
- Scene: {summary}

{context}
## Output format
{{
  "final_decision": {{
    "is_alarm": "yes" or "no",
    "alarm_level": "none" or "general" or "severe" or "critical",
    "alarm_reason": "why the alarm is or is not raised",
    "confidence": 0.85
  }},
  "analysis": {{
    "risk_assessment": "risk assessment",
    "recommendation": "recommended action",
    "rules_applied": ["rule 1", "rule 2"]
  }},
  "metadata": {{
    "model": "{model}",
    "timestamp": "2024-01-01T00:00:00"
  }}
}}

Now output the decision JSON:"#,
        person = yes_no(facts.has_person),
        badge = facts.badge_status.as_str(),
        restricted = yes_no(facts.enters_restricted_area),
        fire = yes_no(facts.has_fire_or_smoke),
        electric = yes_no(facts.has_electric_risk),
        summary = if facts.scene_summary.is_empty() {
            "no description"
        } else {
            facts.scene_summary.as_str()
        },
        context = context,
        model = model,
    )
}
