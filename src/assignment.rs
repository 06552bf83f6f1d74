//! Mapping annotators to the slice of the dataset they label.
//!
//! Three deployments exist:
//! - everyone labels the whole dataset,
//! - a static username -> range table from configuration,
//! - round-robin buckets of fixed size, persisted to a shared table file so a
//!   returning annotator always gets the same bucket.
//!
//! The bucket table and the completed-annotator list are shared by every
//! annotator process. Each read-modify-write of either file holds an
//! exclusive lock on a sidecar `.lock` file.

use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::config::{AssignmentConfig, AssignmentMode};
use crate::csv::{parse_records, write_record};
use crate::error::{AnnotatorError, Result};
use crate::state::{clamp_range, CaseIndex};
use crate::utils::write_atomically;

/// Exclusive advisory lock held until dropped.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(target: &Path) -> Result<Self> {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        let lock_path = target.with_file_name(name);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AnnotatorError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| AnnotatorError::io(&lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| AnnotatorError::io(&lock_path, e))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AnnotatorError::io(path, e)),
    }
}

/// What an annotator is asked to label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub username: String,
    pub range: Range<CaseIndex>,
    pub bucket: Option<usize>,
}

/// Round-robin bucket assignment with a per-bucket occupancy cap.
#[derive(Debug, Clone)]
pub struct BucketAssigner {
    table_path: PathBuf,
    max_buckets: usize,
    max_occupancy: usize,
    cases_per_bucket: usize,
}

impl BucketAssigner {
    pub fn new(
        table_path: impl Into<PathBuf>,
        max_buckets: usize,
        max_occupancy: usize,
        cases_per_bucket: usize,
    ) -> Self {
        Self {
            table_path: table_path.into(),
            max_buckets,
            max_occupancy,
            cases_per_bucket,
        }
    }

    pub fn from_config(config: &AssignmentConfig) -> Self {
        Self::new(
            PathBuf::from(shellexpand::tilde(&config.table_path).into_owned()),
            config.max_buckets,
            config.max_occupancy,
            config.cases_per_bucket,
        )
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    /// Buckets that hold at least one case of a `dataset_len`-case dataset.
    pub fn usable_buckets(&self, dataset_len: usize) -> usize {
        if self.cases_per_bucket == 0 {
            return 0;
        }
        self.max_buckets.min(dataset_len.div_ceil(self.cases_per_bucket))
    }

    /// Bucket for `username`, claiming the first bucket with spare room if
    /// the username is new. Only buckets that hold at least one case of the
    /// dataset are handed out.
    pub fn assign(&self, username: &str, dataset_len: usize) -> Result<usize> {
        let _lock = FileLock::acquire(&self.table_path)?;
        let mut table = self.read_table()?;

        if let Some((_, bucket)) = table.iter().find(|(user, _)| user == username) {
            tracing::debug!(username, bucket, "Returning existing bucket");
            return Ok(*bucket);
        }

        let usable = self.usable_buckets(dataset_len);
        let occupancy = occupancy(&table, usable);
        let Some(bucket) = occupancy.iter().position(|&n| n < self.max_occupancy) else {
            tracing::error!(username, usable_buckets = usable, "All buckets are full");
            return Err(AnnotatorError::NoCapacity {
                max_buckets: usable,
                max_occupancy: self.max_occupancy,
            });
        };

        table.push((username.to_string(), bucket));
        self.write_table(&table)?;
        tracing::info!(username, bucket, "Assigned new bucket");
        Ok(bucket)
    }

    /// Bucket already held by `username`, without claiming one.
    pub fn lookup(&self, username: &str) -> Result<Option<usize>> {
        let _lock = FileLock::acquire(&self.table_path)?;
        Ok(self
            .read_table()?
            .into_iter()
            .find(|(user, _)| user == username)
            .map(|(_, bucket)| bucket))
    }

    /// Cases covered by `bucket`, clipped to the dataset.
    pub fn bucket_range(&self, bucket: usize, dataset_len: usize) -> Range<CaseIndex> {
        let start = bucket.saturating_mul(self.cases_per_bucket);
        clamp_range(start..start.saturating_add(self.cases_per_bucket), dataset_len)
    }

    /// Current `(username, bucket)` rows in assignment order.
    pub fn read_table(&self) -> Result<Vec<(String, usize)>> {
        let Some(text) = read_if_exists(&self.table_path)? else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for (line, record) in parse_records(&text).into_iter().enumerate().skip(1) {
            let [user, bucket] = record.as_slice() else {
                return Err(self.malformed(format!("row {line} has {} columns", record.len())));
            };
            let bucket = bucket
                .trim()
                .parse()
                .map_err(|_| self.malformed(format!("row {line} has bucket '{bucket}'")))?;
            rows.push((user.clone(), bucket));
        }
        Ok(rows)
    }

    fn write_table(&self, table: &[(String, usize)]) -> Result<()> {
        let mut out = write_record(&["username", "bucket"]);
        for (user, bucket) in table {
            out.push_str(&write_record(&[user.clone(), bucket.to_string()]));
        }
        write_atomically(&self.table_path, out.as_bytes())
    }

    fn malformed(&self, reason: String) -> AnnotatorError {
        AnnotatorError::MalformedTable {
            path: self.table_path.clone(),
            reason,
        }
    }
}

/// Annotators per bucket, derived from the table. Rows naming buckets
/// beyond `max_buckets` are ignored.
fn occupancy(table: &[(String, usize)], max_buckets: usize) -> Vec<usize> {
    let mut counts = vec![0; max_buckets];
    for (_, bucket) in table {
        if let Some(count) = counts.get_mut(*bucket) {
            *count += 1;
        }
    }
    counts
}

/// Fixed username -> range table.
#[derive(Debug, Clone, Default)]
pub struct StaticRangeMap {
    ranges: BTreeMap<String, Range<CaseIndex>>,
}

impl StaticRangeMap {
    pub fn new(ranges: impl IntoIterator<Item = (String, Range<CaseIndex>)>) -> Self {
        Self {
            ranges: ranges.into_iter().collect(),
        }
    }

    pub fn from_config(config: &AssignmentConfig) -> Self {
        Self::new(
            config
                .ranges
                .iter()
                .map(|(user, [start, end])| (user.clone(), *start..*end)),
        )
    }

    pub fn range_for(&self, username: &str) -> Result<Range<CaseIndex>> {
        self.ranges
            .get(username)
            .cloned()
            .ok_or_else(|| AnnotatorError::UnrecognizedIdentifier(username.to_string()))
    }
}

/// Usernames whose annotations were submitted successfully.
#[derive(Debug, Clone)]
pub struct CompletedRegistry {
    path: PathBuf,
}

impl CompletedRegistry {
    const HEADER: &'static str = "username";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_completed(&self, username: &str) -> Result<bool> {
        let _lock = FileLock::acquire(&self.path)?;
        Ok(self.read()?.iter().any(|u| u == username))
    }

    /// Record `username`. Recording the same name twice is a no-op.
    pub fn mark_completed(&self, username: &str) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        let existing = self.read()?;
        if existing.iter().any(|u| u == username) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AnnotatorError::io(&self.path, e))?;
        let mut chunk = String::new();
        if file.metadata().map(|m| m.len() == 0).unwrap_or(true) {
            chunk.push_str(&write_record(&[Self::HEADER]));
        }
        chunk.push_str(&write_record(&[username]));
        file.write_all(chunk.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| AnnotatorError::io(&self.path, e))?;

        tracing::info!(username, "Marked annotator as completed");
        Ok(())
    }

    fn read(&self) -> Result<Vec<String>> {
        let Some(text) = read_if_exists(&self.path)? else {
            return Ok(Vec::new());
        };
        Ok(parse_records(&text)
            .into_iter()
            .skip(1)
            .filter_map(|record| record.into_iter().next())
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect())
    }
}

/// Work out which cases `username` labels under the configured mode.
pub fn resolve_assignment(
    config: &AssignmentConfig,
    username: &str,
    dataset_len: usize,
) -> Result<Assignment> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AnnotatorError::UnrecognizedIdentifier(String::new()));
    }

    let (range, bucket) = match config.mode {
        AssignmentMode::All => (0..dataset_len, None),
        AssignmentMode::Static => {
            let range = StaticRangeMap::from_config(config).range_for(username)?;
            (clamp_range(range, dataset_len), None)
        }
        AssignmentMode::Buckets => {
            let assigner = BucketAssigner::from_config(config);
            let bucket = assigner.assign(username, dataset_len)?;
            (assigner.bucket_range(bucket, dataset_len), Some(bucket))
        }
    };

    Ok(Assignment {
        username: username.to_string(),
        range,
        bucket,
    })
}

/// Like `resolve_assignment`, but never claims a bucket. Returns `None`
/// for a bucket-mode username that has not been assigned yet.
pub fn lookup_assignment(
    config: &AssignmentConfig,
    username: &str,
    dataset_len: usize,
) -> Result<Option<Assignment>> {
    if config.mode != AssignmentMode::Buckets {
        return resolve_assignment(config, username, dataset_len).map(Some);
    }

    let username = username.trim();
    let assigner = BucketAssigner::from_config(config);
    Ok(assigner.lookup(username)?.map(|bucket| Assignment {
        username: username.to_string(),
        range: assigner.bucket_range(bucket, dataset_len),
        bucket: Some(bucket),
    }))
}
