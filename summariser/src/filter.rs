use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A simulation log that may be selected for summarising
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCandidate {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl LogCandidate {
    pub fn new(path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    /// Read the modification time from the file system
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(Self::new(path, modified))
    }
}

/// Log files that belong to the same logical run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunGroup {
    pub root_key: String,
    pub candidates: Vec<LogCandidate>,
}

impl RunGroup {
    /// The most recently modified candidate, ties going to the greatest path
    pub fn latest(&self) -> Option<&LogCandidate> {
        self.candidates.iter().max_by(|a, b| {
            a.modified
                .cmp(&b.modified)
                .then_with(|| a.path.cmp(&b.path))
        })
    }
}

type RunKeyFn = dyn Fn(&Path) -> String + Send + Sync;

/// Keeps only the latest log of each logical run.
///
/// Grouping is a function of the path alone, file contents are never read. The key function can
/// be replaced with [RunSelector::with_key], the default is [run_key].
pub struct RunSelector {
    key_fn: Box<RunKeyFn>,
}

impl Default for RunSelector {
    fn default() -> Self {
        Self::with_key(run_key)
    }
}

impl std::fmt::Debug for RunSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSelector").finish_non_exhaustive()
    }
}

impl RunSelector {
    pub fn with_key<F>(key_fn: F) -> Self
    where
        F: Fn(&Path) -> String + Send + Sync + 'static,
    {
        Self {
            key_fn: Box::new(key_fn),
        }
    }

    /// Group candidates by run, ordered by root key
    pub fn group(&self, candidates: Vec<LogCandidate>) -> Vec<RunGroup> {
        candidates
            .into_iter()
            .into_group_map_by(|candidate| (self.key_fn)(&candidate.path))
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(root_key, candidates)| RunGroup {
                root_key,
                candidates,
            })
            .collect()
    }

    /// Select the latest candidate of every run, ordered by root key
    pub fn select(&self, candidates: Vec<LogCandidate>) -> Vec<LogCandidate> {
        self.group(candidates)
            .into_iter()
            .filter_map(|group| {
                let latest = group.latest().cloned();
                if let Some(latest) = &latest {
                    if group.candidates.len() > 1 {
                        log::info!(
                            "Selected {} as the latest of {} logs for run {}",
                            latest.path.display(),
                            group.candidates.len(),
                            group.root_key
                        );
                    }
                }
                latest
            })
            .collect()
    }
}

/// Default run identity.
///
/// Strips a trailing run timestamp from both the parent directory name and the file stem, so
/// `results/shop-20240101120000/simulation.log` and `logs/run-2024-01-01-120000.log` are keyed as
/// `results/shop/simulation` and `logs/run`. Only trailing dash separated segments made of digits
/// are removed, dashes embedded in the name are kept.
pub fn run_key(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let stem = file_name.strip_suffix(".gz").unwrap_or(&*file_name);
    let stem = stem.strip_suffix(".log").unwrap_or(stem);
    let stem = strip_run_timestamp(stem);

    let dir = match path.parent() {
        Some(parent) => match parent.file_name() {
            Some(dir_name) => {
                parent.with_file_name(strip_run_timestamp(&dir_name.to_string_lossy()))
            }
            None => parent.to_path_buf(),
        },
        None => PathBuf::new(),
    };

    dir.join(stem).to_string_lossy().into_owned()
}

fn strip_run_timestamp(name: &str) -> &str {
    let mut end = name.len();
    while let Some(idx) = name[..end].rfind('-') {
        let segment = &name[idx + 1..end];
        if idx == 0 || segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
        end = idx;
    }
    &name[..end]
}
