//! Best-effort external re-compression of generated image files.
//!
//! Each strategy invokes an external tool (`pngquant`, `jpegoptim`,
//! `gifsicle`) against a randomized temp copy and replaces the original only
//! when the tool's output is strictly smaller; otherwise the temp output is
//! discarded and the original stays. Strategies run after a successful render
//! and their failures are swallowed by the caller (logged, never propagated) —
//! optimization is opportunistic, not part of the rendering contract.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("no such file: {0}")]
    Missing(PathBuf),
    #[error("not an optimizable image: {0}")]
    NotImage(PathBuf),
    #[error("cannot run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} produced no output for {path} (exit code {code:?})")]
    NoOutput {
        tool: &'static str,
        path: PathBuf,
        code: Option<i32>,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a strategy did with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptOutcome {
    /// Replaced with a smaller file.
    Optimized { original: u64, optimized: u64 },
    /// The tool could not improve on the original.
    Kept { size: u64 },
}

/// A post-processing strategy the renderer runs after each successful write.
pub trait PostProcess: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, path: &Path) -> Result<OptOutcome, OptimizeError>;
}

/// File kinds the external tools understand, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    Png,
    Jpeg,
    Gif,
}

fn kind_for(path: &Path) -> Option<ToolKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some(ToolKind::Png),
        "jpg" | "jpeg" => Some(ToolKind::Jpeg),
        "gif" => Some(ToolKind::Gif),
        _ => None,
    }
}

/// A randomized sibling path for the tool to write into.
fn temp_output_path(path: &Path) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    PathBuf::from(format!(
        "{}.opt-{}-{:08x}.tmp",
        path.display(),
        std::process::id(),
        nonce
    ))
}

/// The stock optimizer: dispatches on file extension to the matching tool.
#[derive(Debug, Clone, Default)]
pub struct ExternalOptimizer;

impl ExternalOptimizer {
    pub fn new() -> Self {
        Self
    }
}

impl PostProcess for ExternalOptimizer {
    fn name(&self) -> &'static str {
        "external-optimizer"
    }

    fn process(&self, path: &Path) -> Result<OptOutcome, OptimizeError> {
        let original = std::fs::metadata(path)
            .map_err(|_| OptimizeError::Missing(path.to_path_buf()))?
            .len();
        let kind = kind_for(path).ok_or_else(|| OptimizeError::NotImage(path.to_path_buf()))?;

        let output = temp_output_path(path);
        let (tool, status) = match kind {
            ToolKind::Png => {
                let status = Command::new("pngquant")
                    .args(["--quality", "60-80", "--speed", "3", "--force", "--output"])
                    .arg(&output)
                    .arg(path)
                    .stdout(Stdio::null())
                    .status();
                ("pngquant", status)
            }
            ToolKind::Jpeg => {
                // jpegoptim works in place, so it runs on a copy.
                std::fs::copy(path, &output)?;
                let status = Command::new("jpegoptim")
                    .args(["-qso", "-m90"])
                    .arg(&output)
                    .stdout(Stdio::null())
                    .status();
                ("jpegoptim", status)
            }
            ToolKind::Gif => {
                let status = Command::new("gifsicle")
                    .args(["-O3", "-o"])
                    .arg(&output)
                    .arg(path)
                    .stdout(Stdio::null())
                    .status();
                ("gifsicle", status)
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(source) => {
                let _ = std::fs::remove_file(&output);
                return Err(OptimizeError::Spawn { tool, source });
            }
        };

        if kind == ToolKind::Png {
            // pngquant exit 99: the result would fall below the quality
            // floor. Exit 25: libpng could not read the file at all. Both
            // mean "keep the original".
            if matches!(status.code(), Some(99) | Some(25)) {
                let _ = std::fs::remove_file(&output);
                return Ok(OptOutcome::Kept { size: original });
            }
        }

        if !output.is_file() {
            return Err(OptimizeError::NoOutput {
                tool,
                path: path.to_path_buf(),
                code: status.code(),
            });
        }

        let optimized = std::fs::metadata(&output)?.len();
        if optimized > 0 && optimized < original {
            std::fs::rename(&output, path)?;
            Ok(OptOutcome::Optimized {
                original,
                optimized,
            })
        } else {
            let _ = std::fs::remove_file(&output);
            Ok(OptOutcome::Kept { size: original })
        }
    }
}

/// Expand files and directory trees into the list of optimizable images.
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
                if entry.file_type().is_file() && kind_for(entry.path()).is_some() {
                    images.push(entry.path().to_path_buf());
                }
            }
        } else if kind_for(path).is_some() {
            images.push(path.clone());
        }
    }
    images
}

/// Run a strategy over many files in parallel, logging per-file outcomes.
/// Returns `(optimized, kept, failed)` counts.
pub fn optimize_all(processor: &dyn PostProcess, paths: &[PathBuf]) -> (usize, usize, usize) {
    let results: Vec<_> = paths
        .par_iter()
        .map(|path| match processor.process(path) {
            Ok(OptOutcome::Optimized {
                original,
                optimized,
            }) => {
                debug!(path = %path.display(), original, optimized, "optimized");
                Ok(true)
            }
            Ok(OptOutcome::Kept { size }) => {
                debug!(path = %path.display(), size, "kept original");
                Ok(false)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "optimization failed");
                Err(())
            }
        })
        .collect();

    let optimized = results.iter().filter(|r| matches!(r, Ok(true))).count();
    let kept = results.iter().filter(|r| matches!(r, Ok(false))).count();
    let failed = results.iter().filter(|r| r.is_err()).count();
    (optimized, kept, failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_dispatches_on_extension() {
        assert_eq!(kind_for(Path::new("a.png")), Some(ToolKind::Png));
        assert_eq!(kind_for(Path::new("a.JPG")), Some(ToolKind::Jpeg));
        assert_eq!(kind_for(Path::new("a.jpeg")), Some(ToolKind::Jpeg));
        assert_eq!(kind_for(Path::new("a.gif")), Some(ToolKind::Gif));
        assert_eq!(kind_for(Path::new("a.webp")), None);
        assert_eq!(kind_for(Path::new("noext")), None);
    }

    #[test]
    fn temp_paths_stay_in_the_same_directory() {
        let tmp = temp_output_path(Path::new("/some/dir/a.png"));
        assert_eq!(tmp.parent(), Some(Path::new("/some/dir")));
        assert!(tmp.to_string_lossy().ends_with(".tmp"));
    }

    #[test]
    fn missing_file_is_a_typed_error() {
        let optimizer = ExternalOptimizer::new();
        let err = optimizer
            .process(Path::new("/no/such/file.png"))
            .unwrap_err();
        assert!(matches!(err, OptimizeError::Missing(_)));
    }

    #[test]
    fn non_image_is_a_typed_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"text").unwrap();
        let err = ExternalOptimizer::new().process(&path).unwrap_err();
        assert!(matches!(err, OptimizeError::NotImage(_)));
    }

    #[test]
    fn collect_walks_directories_and_filters() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["a.png", "b.txt", "sub/c.gif", "sub/d.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let mut found = collect_images(&[dir.path().to_path_buf()]);
        found.sort();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.png", "sub/c.gif", "sub/d.jpeg"]);
    }
}
