// ABOUTME: Append-only log of module outcomes across deployment runs.
// ABOUTME: One `module:status:timestamp` line per transition, grouped by run header comments.

use crate::context::DeploymentRun;
use crate::modules::ModuleKind;
use crate::types::DeploymentId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const RUN_PREFIX: &str = "# run ";
const ROLLBACK_PREFIX: &str = "# rollback ";

/// Status of a module. `Pending` is never written; it is what a module
/// with no record reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Pending,
    Success,
    Failed,
}

impl ModuleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleStatus::Pending => "pending",
            ModuleStatus::Success => "success",
            ModuleStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ModuleStatus::Pending),
            "success" => Ok(ModuleStatus::Success),
            "failed" => Ok(ModuleStatus::Failed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// One line of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    pub module: ModuleKind,
    pub status: ModuleStatus,
    pub timestamp: DateTime<Utc>,
}

impl ModuleRecord {
    fn to_line(&self) -> String {
        format!(
            "{}:{}:{}",
            self.module,
            self.status,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    fn parse(line: &str) -> Option<Self> {
        // The timestamp itself contains colons.
        let mut parts = line.splitn(3, ':');
        let module = parts.next()?.parse().ok()?;
        let status = parts.next()?.parse().ok()?;
        let timestamp = DateTime::parse_from_rfc3339(parts.next()?)
            .ok()?
            .with_timezone(&Utc);
        Some(Self {
            module,
            status,
            timestamp,
        })
    }
}

/// Segment header written once per deploy attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunHeader {
    pub deployment_id: DeploymentId,
    pub environment: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
}

impl RunHeader {
    fn to_line(&self) -> String {
        format!(
            "{RUN_PREFIX}{} env={} version={} started={}",
            self.deployment_id,
            self.environment,
            self.version,
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    fn parse(line: &str) -> Option<Self> {
        let mut words = line.strip_prefix(RUN_PREFIX)?.split_whitespace();
        let deployment_id = DeploymentId::parse(words.next()?).ok()?;
        let (mut environment, mut version, mut started_at) = (None, None, None);
        for word in words {
            match word.split_once('=') {
                Some(("env", v)) => environment = Some(v.to_string()),
                Some(("version", v)) => version = Some(v.to_string()),
                Some(("started", v)) => {
                    started_at = DateTime::parse_from_rfc3339(v)
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                }
                _ => {}
            }
        }
        Some(Self {
            deployment_id,
            environment: environment?,
            version: version?,
            started_at: started_at?,
        })
    }
}

impl From<&DeploymentRun> for RunHeader {
    fn from(run: &DeploymentRun) -> Self {
        Self {
            deployment_id: run.deployment_id.clone(),
            environment: run.environment.to_string(),
            version: run.version.to_string(),
            started_at: run.started_at,
        }
    }
}

/// A parsed line of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Run(RunHeader),
    Record(ModuleRecord),
    Note,
}

#[derive(Debug, Error)]
pub enum StateLogError {
    #[error("failed to read state log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append to state log {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove state log {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The on-disk state log. Lines are only ever appended.
#[derive(Debug, Clone)]
pub struct StateLog {
    path: PathBuf,
}

impl StateLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new run segment.
    pub fn begin_run(&self, run: &DeploymentRun) -> Result<RunHeader, StateLogError> {
        let header = RunHeader::from(run);
        self.append(&header.to_line())?;
        Ok(header)
    }

    /// Append a module transition stamped with the current time.
    pub fn record(
        &self,
        module: ModuleKind,
        status: ModuleStatus,
    ) -> Result<ModuleRecord, StateLogError> {
        let record = ModuleRecord {
            module,
            status,
            timestamp: Utc::now(),
        };
        self.append(&record.to_line())?;
        tracing::debug!("state: {}", record.to_line());
        Ok(record)
    }

    /// Note a rollback to `deployment_id`. Notes are comments, not records.
    pub fn note_rollback(&self, deployment_id: &DeploymentId) -> Result<(), StateLogError> {
        self.append(&format!(
            "{ROLLBACK_PREFIX}{} {}",
            deployment_id,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }

    /// Every module record, oldest first.
    pub fn records(&self) -> Result<Vec<ModuleRecord>, StateLogError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|e| match e {
                Entry::Record(r) => Some(r),
                _ => None,
            })
            .collect())
    }

    /// Every run header, oldest first.
    pub fn runs(&self) -> Result<Vec<RunHeader>, StateLogError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|e| match e {
                Entry::Run(h) => Some(h),
                _ => None,
            })
            .collect())
    }

    /// The most recent run header, if any.
    pub fn latest_run(&self) -> Result<Option<RunHeader>, StateLogError> {
        Ok(self.runs()?.pop())
    }

    /// Records appended between the header of `deployment_id` and the next header.
    pub fn records_for_run(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<Vec<ModuleRecord>, StateLogError> {
        let mut inside = false;
        let mut records = Vec::new();
        for entry in self.entries()? {
            match entry {
                Entry::Run(h) => inside = &h.deployment_id == deployment_id,
                Entry::Record(r) if inside => records.push(r),
                _ => {}
            }
        }
        Ok(records)
    }

    /// Status of the last record for `module`, or `Pending` when there is none.
    pub fn current_status(&self, module: ModuleKind) -> Result<ModuleStatus, StateLogError> {
        Ok(self
            .records()?
            .into_iter()
            .rev()
            .find(|r| r.module == module)
            .map(|r| r.status)
            .unwrap_or(ModuleStatus::Pending))
    }

    /// The most recent successful record, across all modules.
    pub fn last_success(&self) -> Result<Option<ModuleRecord>, StateLogError> {
        Ok(self
            .records()?
            .into_iter()
            .rev()
            .find(|r| r.status == ModuleStatus::Success))
    }

    /// The last `n` raw lines, comments included.
    pub fn tail(&self, n: usize) -> Result<Vec<String>, StateLogError> {
        let lines: Vec<String> = self.lines()?;
        let skip = lines.len().saturating_sub(n);
        Ok(lines.into_iter().skip(skip).collect())
    }

    /// Delete the log. Only `clean` does this.
    pub fn remove(&self) -> Result<(), StateLogError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateLogError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn append(&self, line: &str) -> Result<(), StateLogError> {
        let append_err = |source| StateLogError::Append {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(append_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(append_err)?;
        file.write_all(format!("{line}\n").as_bytes())
            .map_err(append_err)?;
        file.sync_data().map_err(append_err)
    }

    fn lines(&self) -> Result<Vec<String>, StateLogError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(StateLogError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn entries(&self) -> Result<Vec<Entry>, StateLogError> {
        let mut entries = Vec::new();
        for (n, line) in self.lines()?.iter().enumerate() {
            let entry = if line.starts_with(RUN_PREFIX) {
                RunHeader::parse(line).map(Entry::Run)
            } else if line.starts_with('#') {
                Some(Entry::Note)
            } else {
                ModuleRecord::parse(line).map(Entry::Record)
            };
            match entry {
                Some(e) => entries.push(e),
                None => tracing::warn!(
                    "{}:{}: ignoring unparseable line",
                    self.path.display(),
                    n + 1
                ),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AppVersion, EnvironmentName};
    use tempfile::TempDir;

    fn run_at(id: &str) -> DeploymentRun {
        DeploymentRun {
            deployment_id: DeploymentId::parse(id).unwrap(),
            version: AppVersion::new("1.2.0").unwrap(),
            environment: EnvironmentName::production(),
            started_at: Utc::now(),
        }
    }

    fn log() -> (TempDir, StateLog) {
        let dir = TempDir::new().unwrap();
        let log = StateLog::new(dir.path().join(".deploy/state.log"));
        (dir, log)
    }

    #[test]
    fn record_line_format() {
        let record = ModuleRecord {
            module: ModuleKind::Database,
            status: ModuleStatus::Success,
            timestamp: DateTime::parse_from_rfc3339("2026-03-01T10:20:30Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        assert_eq!(record.to_line(), "database:success:2026-03-01T10:20:30Z");
        assert_eq!(ModuleRecord::parse(&record.to_line()), Some(record));
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let (_dir, log) = log();
        assert!(log.records().unwrap().is_empty());
        assert_eq!(
            log.current_status(ModuleKind::Init).unwrap(),
            ModuleStatus::Pending
        );
    }

    #[test]
    fn records_are_grouped_by_run() {
        let (_dir, log) = log();
        let first = run_at("20260301-100000-aaaaaa");
        let second = run_at("20260302-100000-bbbbbb");

        log.begin_run(&first).unwrap();
        log.record(ModuleKind::Init, ModuleStatus::Success).unwrap();
        log.record(ModuleKind::Secrets, ModuleStatus::Failed).unwrap();
        log.begin_run(&second).unwrap();
        log.record(ModuleKind::Init, ModuleStatus::Success).unwrap();

        assert_eq!(log.records().unwrap().len(), 3);
        assert_eq!(log.runs().unwrap().len(), 2);
        assert_eq!(log.records_for_run(&first.deployment_id).unwrap().len(), 2);
        assert_eq!(log.records_for_run(&second.deployment_id).unwrap().len(), 1);
        assert_eq!(
            log.latest_run().unwrap().unwrap().deployment_id,
            second.deployment_id
        );
    }

    #[test]
    fn current_status_is_last_record() {
        let (_dir, log) = log();
        log.record(ModuleKind::Cache, ModuleStatus::Failed).unwrap();
        log.record(ModuleKind::Cache, ModuleStatus::Success).unwrap();
        assert_eq!(
            log.current_status(ModuleKind::Cache).unwrap(),
            ModuleStatus::Success
        );
        assert_eq!(
            log.last_success().unwrap().map(|r| r.module),
            Some(ModuleKind::Cache)
        );
    }

    #[test]
    fn appending_never_rewrites_earlier_lines() {
        let (_dir, log) = log();
        log.record(ModuleKind::Init, ModuleStatus::Success).unwrap();
        let before = fs::read_to_string(log.path()).unwrap();
        log.note_rollback(&DeploymentId::parse("20260301-100000-aaaaaa").unwrap())
            .unwrap();
        log.record(ModuleKind::Init, ModuleStatus::Failed).unwrap();
        let after = fs::read_to_string(log.path()).unwrap();
        assert!(after.starts_with(&before));
        assert_eq!(log.records().unwrap().len(), 2);
    }

    #[test]
    fn tail_includes_comments() {
        let (_dir, log) = log();
        log.begin_run(&run_at("20260301-100000-aaaaaa")).unwrap();
        log.record(ModuleKind::Init, ModuleStatus::Success).unwrap();
        let tail = log.tail(5).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].starts_with("# run 20260301-100000-aaaaaa env=production"));
        assert_eq!(log.tail(1).unwrap().len(), 1);
    }

    #[test]
    fn unparseable_lines_are_skipped() {
        let (_dir, log) = log();
        fs::create_dir_all(log.path().parent().unwrap()).unwrap();
        fs::write(
            log.path(),
            "garbage\nbogus:success:2026-03-01T10:20:30Z\ninit:success:2026-03-01T10:20:30Z\n",
        )
        .unwrap();
        assert_eq!(log.records().unwrap().len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, log) = log();
        log.record(ModuleKind::Init, ModuleStatus::Success).unwrap();
        log.remove().unwrap();
        log.remove().unwrap();
        assert!(!log.path().exists());
    }
}
