//! Resolves a Download path or glob pattern into the concrete set of
//! files and directories to archive, and the byte total a caller can
//! preview before the transfer starts.
//!
//! New: the teacher doesn't ship a bulk file transfer, so this is built
//! against `walkdir`/`glob`, both already present elsewhere in the pack
//! (`casparian_worker`'s directory walks, `casparian`'s `cli/tag.rs` glob
//! expansion).

use crate::error::{AgentError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Clone, Debug)]
pub struct ResolvedEntry {
    pub disk_path: PathBuf,
    pub archive_name: String,
    pub is_dir: bool,
    pub size: u64,
}

pub fn total_bytes(entries: &[ResolvedEntry]) -> u64 {
    entries.iter().filter(|e| !e.is_dir).map(|e| e.size).sum()
}

/// Resolves `path` per spec §6's three Download cases: glob pattern,
/// bare directory, or single file.
pub fn resolve(path: &str) -> Result<Vec<ResolvedEntry>> {
    if path.contains('*') || path.contains('?') || path.contains('[') {
        resolve_glob(path)
    } else {
        let p = Path::new(path);
        if p.is_dir() {
            resolve_directory_contents(p)
        } else if p.is_file() {
            let root = p.parent().unwrap_or_else(|| Path::new(""));
            Ok(vec![file_entry(p, root)?])
        } else {
            Err(AgentError::PermissionDenied(format!(
                "path not found: {path}"
            )))
        }
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<ResolvedEntry>> {
    let root = Path::new(pattern).parent().unwrap_or_else(|| Path::new(""));
    let mut out = Vec::new();
    let matches = glob::glob(pattern).map_err(|e| AgentError::TransferProtocol(e.to_string()))?;
    for matched in matches {
        let matched = matched.map_err(|e| AgentError::TransferProtocol(e.to_string()))?;
        if matched.is_dir() {
            out.push(dir_entry(&matched, root)?);
            out.extend(walk_descendants(&matched, root)?);
        } else if matched.is_file() {
            out.push(file_entry(&matched, root)?);
        }
    }
    Ok(out)
}

/// Descendants of `dir` only, named relative to `dir` itself (the "bare
/// directory" Download case doesn't carry the directory's own name).
fn resolve_directory_contents(dir: &Path) -> Result<Vec<ResolvedEntry>> {
    walk_descendants(dir, dir)
}

fn walk_descendants(dir: &Path, root: &Path) -> Result<Vec<ResolvedEntry>> {
    let mut out = Vec::new();
    for walked in WalkDir::new(dir).min_depth(1).follow_links(true) {
        let walked = walked.map_err(|e| AgentError::TransferProtocol(e.to_string()))?;
        let p = walked.path();
        if walked.file_type().is_dir() {
            out.push(dir_entry(p, root)?);
        } else if walked.file_type().is_file() {
            out.push(file_entry(p, root)?);
        }
    }
    Ok(out)
}

fn dir_entry(path: &Path, root: &Path) -> Result<ResolvedEntry> {
    Ok(ResolvedEntry {
        disk_path: path.to_path_buf(),
        archive_name: archive_name(path, root, true),
        is_dir: true,
        size: 0,
    })
}

fn file_entry(path: &Path, root: &Path) -> Result<ResolvedEntry> {
    let size = path
        .metadata()
        .map_err(|e| AgentError::TransferProtocol(e.to_string()))?
        .len();
    Ok(ResolvedEntry {
        disk_path: path.to_path_buf(),
        archive_name: archive_name(path, root, false),
        is_dir: false,
        size,
    })
}

fn archive_name(path: &Path, root: &Path, is_dir: bool) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut name = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
    if is_dir && !name.ends_with('/') {
        name.push('/');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn single_file_is_named_relative_to_its_parent() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("report.txt");
        fs::write(&file, b"hi").unwrap();

        let entries = resolve(file.to_str().unwrap()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].archive_name, "report.txt");
        assert_eq!(total_bytes(&entries), 2);
    }

    #[test]
    fn bare_directory_excludes_its_own_name() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("foo.txt"), b"abc").unwrap();
        fs::write(dir.path().join("sub/baz.txt"), b"abcd").unwrap();

        let entries = resolve(dir.path().to_str().unwrap()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.archive_name.clone()).collect();
        assert!(names.contains(&"foo.txt".to_string()));
        assert!(names.contains(&"sub/".to_string()));
        assert!(names.contains(&"sub/baz.txt".to_string()));
        assert!(!names.iter().any(|n| n.starts_with(
            dir.path().file_name().unwrap().to_str().unwrap()
        )));
        assert_eq!(total_bytes(&entries), 7);
    }

    #[test]
    fn glob_expands_matching_directories_and_files() {
        let dir = tempdir().unwrap();
        let send = dir.path().join("send");
        fs::create_dir(&send).unwrap();
        fs::create_dir(send.join("bar")).unwrap();
        fs::write(send.join("bar/baz.txt"), b"xx").unwrap();
        fs::write(send.join("bat.txt"), b"y").unwrap();
        fs::write(send.join("foo.txt"), b"z").unwrap();

        let pattern = format!("{}/ba*", send.display());
        let entries = resolve(&pattern).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.archive_name.clone()).collect();
        assert!(names.contains(&"bar/baz.txt".to_string()));
        assert!(names.contains(&"bat.txt".to_string()));
        assert!(!names.contains(&"foo.txt".to_string()));
    }

    #[test]
    fn missing_path_is_permission_denied() {
        let err = resolve("/no/such/path/at/all").unwrap_err();
        assert!(matches!(err, AgentError::PermissionDenied(_)));
    }
}
