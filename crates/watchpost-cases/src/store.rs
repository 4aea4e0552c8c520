//! CaseStore: raw case records plus corpus documents

use crate::document::render_case_document;
use crate::error::CaseError;
use crate::reindex::ReindexHandle;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use watchpost_core::{case_id_for, AlarmLevel, Case, DocKind, Frame};
use watchpost_index::corpus_files;
use watchpost_telemetry::{write_json_atomic, Paths};

/// Where a newly added case landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredCase {
    pub case_id: String,
    pub record_path: PathBuf,
    pub document_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaseStats {
    pub cases: usize,
    pub reviewed: usize,
    pub by_level: BTreeMap<String, usize>,
    pub documents: usize,
    pub rule_documents: usize,
    pub case_documents: usize,
}

pub struct CaseStore {
    cases_dir: PathBuf,
    source_dir: PathBuf,
    alarms_dir: PathBuf,
    reindex: Option<ReindexHandle>,
}

impl CaseStore {
    pub fn new(paths: &Paths) -> Result<Self, CaseError> {
        let store = Self {
            cases_dir: paths.cases_dir(),
            source_dir: paths.kb_source_dir(),
            alarms_dir: paths.alarms_dir(),
            reindex: None,
        };
        std::fs::create_dir_all(&store.cases_dir)?;
        std::fs::create_dir_all(&store.source_dir)?;
        std::fs::create_dir_all(&store.alarms_dir)?;
        Ok(store)
    }

    /// Request a re-index after every added case
    pub fn with_reindex(mut self, handle: ReindexHandle) -> Self {
        self.reindex = Some(handle);
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Persist `case` and its corpus document, then schedule re-indexing.
    ///
    /// An empty case id is filled from the creation time and scene summary;
    /// a taken id gets a `_v{n}` suffix.
    pub fn add_case(&self, case: Case) -> Result<StoredCase, CaseError> {
        self.insert(case, None)
    }

    /// [`add_case`](Self::add_case) plus the alarm frame, saved under the
    /// case id once it is reserved. A failed snapshot is logged and the case
    /// is kept without an image.
    pub fn add_case_with_snapshot(
        &self,
        case: Case,
        frame: &Frame,
        quality: u8,
    ) -> Result<StoredCase, CaseError> {
        self.insert(case, Some((frame, quality)))
    }

    fn insert(
        &self,
        mut case: Case,
        snapshot: Option<(&Frame, u8)>,
    ) -> Result<StoredCase, CaseError> {
        if case.case_id.is_empty() {
            case.case_id = case_id_for(case.created_at, &case.vision_facts.scene_summary);
        }
        validate_id(&case.case_id)?;

        let (case_id, record_path) = self.reserve(&case.case_id)?;
        case.case_id = case_id;

        if let Some((frame, quality)) = snapshot {
            let level = case.result.decision.alarm_level;
            match self.save_snapshot(frame, &case.case_id, level, quality) {
                Ok(path) => case.image_path = Some(path),
                Err(err) => {
                    warn!(case_id = %case.case_id, error = %err, "failed to save alarm snapshot")
                }
            }
        }

        if let Err(err) = write_json_atomic(&record_path, &case) {
            let _ = std::fs::remove_file(&record_path);
            return Err(err.into());
        }

        let document_path = self.document_path(&case.case_id);
        std::fs::write(&document_path, render_case_document(&case))?;

        info!(
            case_id = %case.case_id,
            level = %case.result.decision.alarm_level,
            document = %document_path.display(),
            "case stored"
        );

        if let Some(reindex) = &self.reindex {
            reindex.request();
        }

        Ok(StoredCase {
            case_id: case.case_id,
            record_path,
            document_path,
        })
    }

    pub fn get_case(&self, case_id: &str) -> Result<Option<Case>, CaseError> {
        validate_id(case_id)?;
        let path = self.record_path(case_id);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Cases newest first. Unreadable records are skipped.
    pub fn list_cases(&self, limit: Option<usize>) -> Result<Vec<Case>, CaseError> {
        let mut cases = Vec::new();
        for entry in std::fs::read_dir(&self.cases_dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(CaseError::from)
                .and_then(|c| serde_json::from_str::<Case>(&c).map_err(CaseError::from));
            match parsed {
                Ok(case) => cases.push(case),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping case record"),
            }
        }
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.case_id.cmp(&a.case_id)));
        if let Some(limit) = limit {
            cases.truncate(limit);
        }
        Ok(cases)
    }

    /// Record a human review; the only change a case sees after creation
    pub fn review_case(&self, case_id: &str, review_result: &str) -> Result<Case, CaseError> {
        let mut case = self
            .get_case(case_id)?
            .ok_or_else(|| CaseError::NotFound(case_id.to_string()))?;
        case.reviewed = true;
        case.review_result = Some(review_result.to_string());
        case.reviewed_at = Some(Utc::now());
        write_json_atomic(&self.record_path(case_id), &case)?;
        info!(case_id, review = review_result, "case reviewed");
        Ok(case)
    }

    pub fn stats(&self) -> Result<CaseStats, CaseError> {
        let mut stats = CaseStats::default();
        for case in self.list_cases(None)? {
            stats.cases += 1;
            if case.reviewed {
                stats.reviewed += 1;
            }
            *stats
                .by_level
                .entry(case.result.decision.alarm_level.as_str().to_string())
                .or_default() += 1;
        }

        let documents = corpus_files(&self.source_dir)?;
        for path in &documents {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            match DocKind::from_source(&name) {
                DocKind::Rule => stats.rule_documents += 1,
                DocKind::Case => stats.case_documents += 1,
            }
        }
        stats.documents = documents.len();
        Ok(stats)
    }

    /// Save the alarm frame as `{case_id}_{level}.jpg` under the alarms
    /// directory
    pub fn save_snapshot(
        &self,
        frame: &Frame,
        case_id: &str,
        level: AlarmLevel,
        quality: u8,
    ) -> Result<PathBuf, CaseError> {
        validate_id(case_id)?;
        let path = self
            .alarms_dir
            .join(format!("{}_{}.jpg", case_id, level.as_str()));
        frame.save_jpeg(&path, quality)?;
        Ok(path)
    }

    fn record_path(&self, case_id: &str) -> PathBuf {
        self.cases_dir.join(format!("{}.json", case_id))
    }

    /// Claim a record file for `case_id`, suffixing `_v{n}` while taken
    fn reserve(&self, case_id: &str) -> Result<(String, PathBuf), CaseError> {
        let mut candidate = case_id.to_string();
        let mut version = 0u32;
        loop {
            let path = self.record_path(&candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok((candidate, path)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    version += 1;
                    candidate = format!("{}_v{}", case_id, version);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn document_path(&self, case_id: &str) -> PathBuf {
        let mut path = self.source_dir.join(format!("case_{}.md", case_id));
        let mut version = 0u32;
        while path.exists() {
            version += 1;
            path = self
                .source_dir
                .join(format!("case_{}_v{}.md", case_id, version));
        }
        path
    }
}

fn validate_id(case_id: &str) -> Result<(), CaseError> {
    let ok = !case_id.is_empty()
        && case_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !case_id.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(CaseError::InvalidId(case_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use watchpost_core::{fallback_result, BadgeStatus, RetrievalCounts, VisionFacts};

    fn store() -> (TempDir, CaseStore) {
        let dir = TempDir::new().unwrap();
        let store = CaseStore::new(&Paths::with_root(dir.path())).unwrap();
        (dir, store)
    }

    fn alarm_case(summary: &str) -> Case {
        let facts = VisionFacts {
            has_person: true,
            badge_status: BadgeStatus::NotWorn,
            enters_restricted_area: true,
            scene_summary: summary.to_string(),
            ..VisionFacts::empty()
        };
        let result = fallback_result(&facts, RetrievalCounts::default());
        Case::new(facts, result)
    }

    #[test]
    fn test_add_assigns_id_and_writes_both_files() {
        let (_dir, store) = store();
        let stored = store.add_case(alarm_case("no badge at gate")).unwrap();

        assert!(!stored.case_id.is_empty());
        assert!(stored.record_path.exists());
        assert!(stored.document_path.exists());
        let name = stored.document_path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("case_{}.md", stored.case_id));

        let loaded = store.get_case(&stored.case_id).unwrap().unwrap();
        assert_eq!(loaded.case_id, stored.case_id);
        assert_eq!(loaded.result.decision.alarm_level, AlarmLevel::Critical);
        assert!(!loaded.reviewed);
    }

    #[test]
    fn test_id_collision_gets_version_suffix() {
        let (_dir, store) = store();
        let first = store.add_case(alarm_case("a").with_id("fixed")).unwrap();
        let second = store.add_case(alarm_case("b").with_id("fixed")).unwrap();
        let third = store.add_case(alarm_case("c").with_id("fixed")).unwrap();

        assert_eq!(first.case_id, "fixed");
        assert_eq!(second.case_id, "fixed_v1");
        assert_eq!(third.case_id, "fixed_v2");
        assert_eq!(store.list_cases(None).unwrap().len(), 3);
    }

    #[test]
    fn test_document_collision_gets_version_suffix() {
        let (_dir, store) = store();
        std::fs::write(store.source_dir().join("case_taken.md"), "existing").unwrap();
        let stored = store.add_case(alarm_case("x").with_id("taken")).unwrap();
        assert_eq!(stored.case_id, "taken");
        assert!(stored.document_path.ends_with("case_taken_v1.md"));
        assert_eq!(
            std::fs::read_to_string(store.source_dir().join("case_taken.md")).unwrap(),
            "existing"
        );
    }

    #[test]
    fn test_review_case() {
        let (_dir, store) = store();
        let stored = store.add_case(alarm_case("gate")).unwrap();
        let reviewed = store.review_case(&stored.case_id, "confirmed").unwrap();
        assert!(reviewed.reviewed);
        assert_eq!(reviewed.review_result.as_deref(), Some("confirmed"));
        assert!(reviewed.reviewed_at.is_some());

        let reloaded = store.get_case(&stored.case_id).unwrap().unwrap();
        assert!(reloaded.reviewed);

        assert!(matches!(
            store.review_case("missing", "x"),
            Err(CaseError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let (_dir, store) = store();
        for id in ["../etc/passwd", "a/b", ".hidden", ""] {
            assert!(matches!(store.get_case(id), Err(CaseError::InvalidId(_))), "{}", id);
        }
        assert!(matches!(
            store.add_case(alarm_case("x").with_id("a/b")),
            Err(CaseError::InvalidId(_))
        ));
    }

    #[test]
    fn test_list_newest_first_and_stats() {
        let (_dir, store) = store();
        let mut older = alarm_case("older");
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        store.add_case(older.with_id("older")).unwrap();
        store.add_case(alarm_case("newer").with_id("newer")).unwrap();
        std::fs::write(store.cases_dir.join("broken.json"), "{").unwrap();
        std::fs::write(store.source_dir().join("badge_rules.md"), "# rules").unwrap();

        let cases = store.list_cases(None).unwrap();
        let ids: Vec<&str> = cases.iter().map(|c| c.case_id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
        assert_eq!(store.list_cases(Some(1)).unwrap().len(), 1);

        store.review_case("older", "false alarm").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.cases, 2);
        assert_eq!(stats.reviewed, 1);
        assert_eq!(stats.by_level.get("critical"), Some(&2));
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.rule_documents, 1);
        assert_eq!(stats.case_documents, 2);
    }

    #[test]
    fn test_save_snapshot_name() {
        let (_dir, store) = store();
        let frame = Frame::new(image::RgbImage::new(8, 8), 1);
        let path = store
            .save_snapshot(&frame, "20240101_000000_000_abcd1234", AlarmLevel::Severe, 80)
            .unwrap();
        assert!(path.ends_with("20240101_000000_000_abcd1234_severe.jpg"));
        assert!(path.exists());
    }

    #[test]
    fn test_colliding_cases_keep_their_own_snapshots() {
        let (_dir, store) = store();
        let first = alarm_case("same scene");
        let mut second = alarm_case("same scene");
        second.created_at = first.created_at;

        let a = store
            .add_case_with_snapshot(first, &Frame::new(image::RgbImage::new(8, 8), 1), 80)
            .unwrap();
        let b = store
            .add_case_with_snapshot(second, &Frame::new(image::RgbImage::new(16, 4), 2), 80)
            .unwrap();
        assert_eq!(b.case_id, format!("{}_v1", a.case_id));

        let a_image = store.get_case(&a.case_id).unwrap().unwrap().image_path.unwrap();
        let b_image = store.get_case(&b.case_id).unwrap().unwrap().image_path.unwrap();
        assert_ne!(a_image, b_image);
        assert!(a_image.ends_with(format!("{}_critical.jpg", a.case_id)));

        // The first frame survives the second case.
        let a_frame = Frame::decode(&std::fs::read(&a_image).unwrap(), 0).unwrap();
        let b_frame = Frame::decode(&std::fs::read(&b_image).unwrap(), 0).unwrap();
        assert_eq!(a_frame.dimensions(), (8, 8));
        assert_eq!(b_frame.dimensions(), (16, 4));
    }

    #[test]
    fn test_concurrent_adds_never_share_an_id() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.add_case(alarm_case("same").with_id("dup")).unwrap())
            })
            .collect();
        let mut ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap().case_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}
