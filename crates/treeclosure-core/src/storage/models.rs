use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::FileType;

/// Kind of filesystem entry a node was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Dir,
    Link,
    Socket,
    Unknown,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Dir => "dir",
            NodeType::Link => "link",
            NodeType::Socket => "socket",
            NodeType::Unknown => "unknown",
        }
    }

    /// Anything unrecognized becomes `Unknown`.
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "file" => NodeType::File,
            "dir" => NodeType::Dir,
            "link" => NodeType::Link,
            "socket" => NodeType::Socket,
            _ => NodeType::Unknown,
        }
    }

    /// Maps an un-followed file type. Fifos and devices land in `Unknown`.
    pub fn from_file_type(file_type: &FileType) -> Self {
        if file_type.is_symlink() {
            NodeType::Link
        } else if file_type.is_dir() {
            NodeType::Dir
        } else if file_type.is_file() {
            NodeType::File
        } else if is_socket(file_type) {
            NodeType::Socket
        } else {
            NodeType::Unknown
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, NodeType::Dir)
    }
}

#[cfg(unix)]
fn is_socket(file_type: &FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_socket()
}

#[cfg(not(unix))]
fn is_socket(_file_type: &FileType) -> bool {
    false
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted filesystem entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: i64,
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub size: i64,
    pub node_count: i64,
    pub parent_id: Option<i64>,
    pub last_modified: Option<i64>,
    pub last_scanned: String,
}

/// Row data for a node about to be inserted.
#[derive(Debug, Clone)]
pub struct NewNode<'a> {
    pub path: &'a str,
    pub name: &'a str,
    pub node_type: NodeType,
    pub size: i64,
    pub last_modified: i64,
    pub parent_id: Option<i64>,
}

/// One ancestor of a node being inserted, with the depth of the node below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureLink {
    pub ancestor_id: i64,
    pub depth: u32,
}

/// A raw row of the closure table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClosureRow {
    pub ancestor: i64,
    pub descendant: i64,
    pub depth: i64,
}

/// A node together with its distance from the queried ancestor or descendant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtreeEntry {
    #[serde(flatten)]
    pub node: Node,
    pub depth: i64,
}
