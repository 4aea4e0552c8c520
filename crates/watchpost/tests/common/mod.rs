#![allow(dead_code)]

use image::{Rgb, RgbImage};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use watchpost_core::Frame;
use watchpost_index::{build_index, BuildOptions, BuildReport, HashingEmbedder, Retriever};
use watchpost_models::{ModelError, ReasoningModel, VisionModel};
use watchpost_pipeline::CycleSettings;
use watchpost_telemetry::Paths;

/// Vision model returning a fixed reply after an optional delay
pub struct ScriptedVision {
    pub reply: String,
    pub delay: Duration,
}

impl ScriptedVision {
    pub fn new(reply: String) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
        }
    }
}

impl VisionModel for ScriptedVision {
    fn name(&self) -> &str {
        "qwen-vl-max"
    }

    async fn describe(&self, _prompt: &str, _image: &str) -> Result<String, ModelError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

/// Reasoning model that records every prompt it receives
pub struct ScriptedReasoning {
    pub reply: String,
    pub delay: Duration,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoning {
    pub fn new(reply: String) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(reply: String, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(reply)
        }
    }
}

impl ReasoningModel for ScriptedReasoning {
    fn name(&self) -> &str {
        "qwen3-max"
    }

    async fn reason(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

pub fn vision_reply(
    has_person: bool,
    badge_status: &str,
    enters_restricted_area: bool,
    has_fire_or_smoke: bool,
    scene_summary: &str,
) -> String {
    json!({
        "has_person": if has_person { "yes" } else { "no" },
        "badge_status": badge_status,
        "enters_restricted_area": enters_restricted_area,
        "has_fire_or_smoke": has_fire_or_smoke,
        "has_electric_risk": false,
        "scene_summary": scene_summary,
        "object_details": {"people": []},
    })
    .to_string()
}

pub fn reasoning_reply(is_alarm: &str, level: &str, reason: &str) -> String {
    json!({
        "final_decision": {
            "is_alarm": is_alarm,
            "alarm_level": level,
            "alarm_reason": reason,
            "confidence": 0.92,
        },
        "analysis": {
            "risk_assessment": "assessed",
            "recommendation": "dispatch a guard",
            "rules_applied": ["restricted area policy"],
        },
        "metadata": {"model": "qwen3-max", "timestamp": "2025-01-01T00:00:00"},
    })
    .to_string()
}

pub fn frame(sequence: u64) -> Frame {
    Frame::new(
        RgbImage::from_fn(64, 36, |x, y| Rgb([(x * 4) as u8, (y * 7) as u8, 90])),
        sequence,
    )
}

pub fn settings() -> CycleSettings {
    CycleSettings {
        vision_timeout: Duration::from_secs(5),
        reasoning_timeout: Duration::from_secs(5),
        top_k: 3,
        threshold: 0.3,
        infer_size: (32, 18),
        jpeg_quality: 80,
    }
}

pub const RULE_DOC: &str = "# Badge policy\n\nEveryone on site must wear a visible badge. \
Entering the server room without a badge is a critical incident.\n";

/// Write `(file name, contents)` pairs into the corpus directory
pub fn seed_corpus(paths: &Paths, documents: &[(&str, &str)]) {
    paths.ensure_dirs().unwrap();
    for (name, contents) in documents {
        std::fs::write(paths.kb_source_dir().join(name), contents).unwrap();
    }
}

pub fn embedder() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(64))
}

pub fn build(paths: &Paths, embedder: &HashingEmbedder) -> BuildReport {
    build_index(
        &paths.kb_source_dir(),
        &paths.index_path(),
        embedder,
        BuildOptions::default(),
    )
    .unwrap()
}

pub fn retriever(paths: &Paths, embedder: Arc<HashingEmbedder>) -> Arc<Retriever> {
    Arc::new(Retriever::with_embedder(paths.index_path(), "", embedder))
}

/// Poll `check` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
