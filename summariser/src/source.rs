use crate::error::SummariseError;
use crate::filter::LogCandidate;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use walkdir::WalkDir;

const GZ_EXTENSION: &str = "gz";
const LOG_EXTENSION: &str = "log";

/// Whether the file name looks like a simulation log, `*.log` or `*.log.gz`
pub fn is_simulation_log(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name
        .strip_suffix(&format!(".{GZ_EXTENSION}"))
        .unwrap_or(name);

    Path::new(name).extension().and_then(|e| e.to_str()) == Some(LOG_EXTENSION)
}

/// Expand a requested source into candidate simulation logs.
///
/// A file is its own single candidate, whatever its name. A directory is searched recursively for
/// simulation logs. Finding nothing is an error for the source.
pub fn find_candidates(source: &Path) -> Result<Vec<LogCandidate>, SummariseError> {
    let metadata = match std::fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SummariseError::InputNotFound {
                path: source.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(SummariseError::Unreadable {
                path: source.to_path_buf(),
                source: e,
            });
        }
    };

    if metadata.is_file() {
        let candidate = LogCandidate::from_path(source).map_err(|e| SummariseError::Unreadable {
            path: source.to_path_buf(),
            source: e,
        })?;
        return Ok(vec![candidate]);
    }

    let mut candidates = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| SummariseError::Unreadable {
            path: e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.to_path_buf()),
            source: e.into(),
        })?;

        if entry.file_type().is_file() && is_simulation_log(entry.path()) {
            let candidate =
                LogCandidate::from_path(entry.path()).map_err(|e| SummariseError::Unreadable {
                    path: entry.path().to_path_buf(),
                    source: e,
                })?;
            candidates.push(candidate);
        }
    }

    if candidates.is_empty() {
        return Err(SummariseError::InputNotFound {
            path: source.to_path_buf(),
        });
    }

    log::debug!(
        "Found {} simulation logs in {}",
        candidates.len(),
        source.display()
    );

    Ok(candidates)
}

/// Open a simulation log for streaming, decompressing it when it has a `.gz` extension
pub fn open_simulation_log(path: &Path) -> Result<Box<dyn BufRead + Send>, SummariseError> {
    let file = File::open(path).map_err(|e| SummariseError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    if path.extension().and_then(|e| e.to_str()) == Some(GZ_EXTENSION) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
