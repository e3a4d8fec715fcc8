use crate::core::models::{ContentHash, FileStatus, TranslationStatus};
use crate::core::path_utils;
use serde::Serialize;

/*
 * Builds the presentation tree from the flat per-file status list produced by batch
 * reconciliation. The transformation is pure. Directory nodes are synthesized from path
 * prefixes and carry `untranslated` as a placeholder status with no meaning.
 */

/// One reconciled file, as fed to the tree builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTreeEntry {
    pub status: FileStatus,
    pub size: u64,
    pub exists_locally: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTreeNode {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub status: TranslationStatus,
    pub modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_hash: Option<ContentHash>,
    pub size: u64,
    pub exists_locally: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileTreeNode>,
}

impl FileTreeNode {
    fn directory(name: &str, path: &str) -> Self {
        FileTreeNode {
            name: name.to_string(),
            path: path.to_string(),
            is_dir: true,
            status: TranslationStatus::Untranslated,
            modified: false,
            last_hash: None,
            size: 0,
            exists_locally: true,
            children: Vec::new(),
        }
    }

    fn file(name: &str, entry: FileTreeEntry) -> Self {
        FileTreeNode {
            name: name.to_string(),
            path: entry.status.path,
            is_dir: false,
            status: entry.status.status,
            modified: entry.status.modified,
            last_hash: entry.status.last_hash,
            size: entry.size,
            exists_locally: entry.exists_locally,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub translated: usize,
    pub outdated: usize,
    pub untranslated: usize,
    pub modified: usize,
}

impl StatusSummary {
    pub fn from_entries(entries: &[FileTreeEntry]) -> Self {
        let mut summary = StatusSummary::default();
        for entry in entries {
            match entry.status.status {
                TranslationStatus::Translated => summary.translated += 1,
                TranslationStatus::Outdated => summary.outdated += 1,
                TranslationStatus::Untranslated => summary.untranslated += 1,
            }
            if entry.status.modified {
                summary.modified += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTree {
    pub nodes: Vec<FileTreeNode>,
    pub summary: StatusSummary,
}

/*
 * Entries are inserted by ascending depth so every parent directory exists before its
 * children. Siblings end up directories first, then by name.
 */
pub fn build_file_tree(mut entries: Vec<FileTreeEntry>) -> Vec<FileTreeNode> {
    entries.sort_by(|a, b| {
        path_utils::path_depth(&a.status.path)
            .cmp(&path_utils::path_depth(&b.status.path))
            .then_with(|| a.status.path.cmp(&b.status.path))
    });

    let mut roots: Vec<FileTreeNode> = Vec::new();
    for entry in entries {
        insert_entry(&mut roots, entry);
    }
    sort_tree_nodes_recursively(&mut roots);
    roots
}

fn insert_entry(roots: &mut Vec<FileTreeNode>, entry: FileTreeEntry) {
    let path = entry.status.path.clone();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((file_name, directories)) = segments.split_last() else {
        log::warn!("FileTreeBuilder: Skipping entry with empty path.");
        return;
    };

    let mut level = roots;
    let mut prefix = String::new();
    for directory in directories {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(directory);
        let position = match level
            .iter()
            .position(|node| node.is_dir && node.name == *directory)
        {
            Some(position) => position,
            None => {
                level.push(FileTreeNode::directory(directory, &prefix));
                level.len() - 1
            }
        };
        level = &mut level[position].children;
    }
    level.push(FileTreeNode::file(file_name, entry));
}

fn sort_tree_nodes_recursively(nodes: &mut [FileTreeNode]) {
    nodes.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    for node in nodes.iter_mut() {
        if node.is_dir && !node.children.is_empty() {
            sort_tree_nodes_recursively(&mut node.children);
        }
    }
}
