//! Path resolution for the knowledge base, alarm snapshots and logs

use std::path::PathBuf;

/// Environment variable overriding the data root
pub const HOME_ENV: &str = "WATCHPOST_HOME";

/// Resolves every on-disk location under one data root
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    /// Resolve the data root from `WATCHPOST_HOME`, else `<data_dir>/watchpost`
    pub fn new() -> std::io::Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(root));
        }

        let data = dirs::data_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "data directory not found")
        })?;
        Ok(Self::with_root(data.join("watchpost")))
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn kb_dir(&self) -> PathBuf {
        self.root.join("kb")
    }

    /// Corpus of rule documents and case documents that gets indexed
    pub fn kb_source_dir(&self) -> PathBuf {
        self.kb_dir().join("source")
    }

    /// Raw case records, one JSON file per case
    pub fn cases_dir(&self) -> PathBuf {
        self.kb_dir().join("cases")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.kb_dir().join("index")
    }

    /// Knowledge index file (vectors plus chunk metadata)
    pub fn index_path(&self) -> PathBuf {
        self.index_dir().join("knowledge.db")
    }

    pub fn alarms_dir(&self) -> PathBuf {
        self.root.join("alarms")
    }

    /// Append-only feed of published alarms
    pub fn alarm_feed(&self) -> PathBuf {
        self.alarms_dir().join("alarms.jsonl")
    }

    /// Drop directory watched by `watchpost run`
    pub fn spool_dir(&self) -> PathBuf {
        self.root.join("spool")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Raw model responses, before any repair
    pub fn raw_outputs_file(&self) -> PathBuf {
        self.logs_dir().join("model_outputs.jsonl")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("watchpost.json")
    }

    /// Create every directory the pipeline writes into
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.kb_source_dir(),
            self.cases_dir(),
            self.index_dir(),
            self.alarms_dir(),
            self.spool_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_paths_from_env() {
        let dir = TempDir::new().unwrap();
        std::env::set_var(HOME_ENV, dir.path());
        let paths = Paths::new().unwrap();
        std::env::remove_var(HOME_ENV);

        assert_eq!(paths.root, dir.path());
    }

    #[test]
    #[serial]
    fn test_paths_default_root() {
        std::env::remove_var(HOME_ENV);
        if let Ok(paths) = Paths::new() {
            assert!(paths.root.ends_with("watchpost"));
        }
    }

    #[test]
    fn test_layout() {
        let paths = Paths::with_root("/srv/wp");
        assert!(paths.kb_source_dir().ends_with("kb/source"));
        assert!(paths.cases_dir().ends_with("kb/cases"));
        assert!(paths.index_path().ends_with("kb/index/knowledge.db"));
        assert!(paths.alarm_feed().ends_with("alarms/alarms.jsonl"));
        assert!(paths.raw_outputs_file().ends_with("logs/model_outputs.jsonl"));
        assert!(paths.config_file().ends_with("watchpost.json"));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_root(dir.path());
        paths.ensure_dirs().unwrap();

        assert!(paths.kb_source_dir().is_dir());
        assert!(paths.cases_dir().is_dir());
        assert!(paths.index_dir().is_dir());
        assert!(paths.alarms_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
