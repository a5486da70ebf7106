use crate::storage::models::NodeType;
use glob::Pattern;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{error, trace};
use walkdir::WalkDir;

/// One directory entry as seen by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub path: PathBuf,
    pub name: String,
    pub node_type: NodeType,
    pub size: u64,
    pub modified: i64,
    pub readable: bool,
}

/// The scanner's view of the filesystem.
pub trait FileSystem {
    fn is_dir(&self, path: &Path) -> bool;

    /// Describes `path` itself without following a final symlink.
    fn stat(&self, path: &Path) -> io::Result<ChildEntry>;

    /// Immediate children of `dir`, sorted by name.
    fn list_children(&self, dir: &Path) -> io::Result<Vec<ChildEntry>>;
}

/// The local disk, with optional glob ignore patterns.
#[derive(Debug, Default)]
pub struct LocalFs {
    ignore_patterns: Vec<Pattern>,
}

impl LocalFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalid globs are logged and dropped.
    pub fn with_ignore_patterns(ignore_globs: &[String]) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        Self { ignore_patterns }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}

fn modified_secs(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Directories must be listable and regular files openable. Other kinds are
/// never opened: a fifo would block.
fn is_readable(path: &Path, node_type: NodeType) -> bool {
    match node_type {
        NodeType::Dir => fs::read_dir(path).is_ok(),
        NodeType::File => File::open(path).is_ok(),
        _ => true,
    }
}

fn describe(path: &Path, metadata: &Metadata) -> ChildEntry {
    let node_type = NodeType::from_file_type(&metadata.file_type());
    ChildEntry {
        path: path.to_path_buf(),
        name: entry_name(path),
        node_type,
        size: if node_type == NodeType::File { metadata.len() } else { 0 },
        modified: modified_secs(metadata),
        readable: is_readable(path, node_type),
    }
}

impl FileSystem for LocalFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn stat(&self, path: &Path) -> io::Result<ChildEntry> {
        let metadata = fs::symlink_metadata(path)?;
        Ok(describe(path, &metadata))
    }

    fn list_children(&self, dir: &Path) -> io::Result<Vec<ChildEntry>> {
        let mut children = Vec::new();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    let message = format!("Error reading directory {}: {}", dir.display(), err);
                    let kind = err
                        .io_error()
                        .map(|e| e.kind())
                        .unwrap_or(io::ErrorKind::Other);
                    return Err(io::Error::new(kind, message));
                }
                Err(err) => {
                    // Entry vanished or cannot be stat'ed: report it as unreadable.
                    if let Some(path) = err.path() {
                        children.push(ChildEntry {
                            path: path.to_path_buf(),
                            name: entry_name(path),
                            node_type: NodeType::Unknown,
                            size: 0,
                            modified: 0,
                            readable: false,
                        });
                    }
                    continue;
                }
            };

            if self.is_ignored(entry.path()) {
                trace!("Ignoring {}", entry.path().display());
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => children.push(describe(entry.path(), &metadata)),
                Err(_) => children.push(ChildEntry {
                    path: entry.path().to_path_buf(),
                    name: entry.file_name().to_string_lossy().into_owned(),
                    node_type: NodeType::Unknown,
                    size: 0,
                    modified: 0,
                    readable: false,
                }),
            }
        }

        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_children_is_shallow_and_sorted() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::write(root.join("a.txt"), "0123456789").unwrap();
        fs::write(root.join("b/nested/deep.txt"), "deep").unwrap();

        let children = LocalFs::new().list_children(root).unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b"]);

        assert_eq!(children[0].node_type, NodeType::File);
        assert_eq!(children[0].size, 10);
        assert!(children[0].readable);
        assert_eq!(children[1].node_type, NodeType::Dir);
        assert_eq!(children[1].size, 0);
    }

    #[test]
    fn test_ignore_patterns_skip_matching_children() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("keep.txt"), "k").unwrap();
        fs::write(root.join("skip.log"), "s").unwrap();

        let fs_view = LocalFs::with_ignore_patterns(&["*.log".to_string(), "[".to_string()]);
        let children = fs_view.list_children(root).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "keep.txt");
    }

    #[test]
    fn test_list_children_of_missing_dir_fails() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("missing");
        assert!(LocalFs::new().list_children(&missing).is_err());
        assert!(!LocalFs::new().is_dir(&missing));
    }
}
