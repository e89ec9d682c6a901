use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    File,
}

/// One entry of a course's material tree
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialNode {
    pub name: String,
    pub kind: NodeKind,
    /// Module id for folders, download URL for files
    pub remote: String,
    pub type_label: Option<String>,
    pub children: Vec<MaterialNode>,
    /// Download location relative to the destination root
    pub target: PathBuf,
    /// Set when the folder's contents could not be resolved
    pub warning: Option<String>,
}

impl MaterialNode {
    pub fn folder(name: impl Into<String>, module_id: impl Into<String>, target: PathBuf) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Folder,
            remote: module_id.into(),
            type_label: None,
            children: Vec::new(),
            target,
            warning: None,
        }
    }

    pub fn file(
        name: impl Into<String>,
        url: impl Into<String>,
        type_label: Option<String>,
        target: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            remote: url.into(),
            type_label,
            children: Vec::new(),
            target,
            warning: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// All file nodes under (and including) this node, depth first in listing order
    pub fn files(&self) -> Vec<&MaterialNode> {
        let mut out = Vec::new();
        self.collect_files(&mut out);
        out
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a MaterialNode>) {
        match self.kind {
            NodeKind::File => out.push(self),
            NodeKind::Folder => {
                for child in &self.children {
                    child.collect_files(out);
                }
            }
        }
    }

    /// `(target, warning)` for every node that carries a warning
    pub fn warnings(&self) -> Vec<(&Path, &str)> {
        let mut out = Vec::new();
        self.collect_warnings(&mut out);
        out
    }

    fn collect_warnings<'a>(&'a self, out: &mut Vec<(&'a Path, &'a str)>) {
        if let Some(warning) = &self.warning {
            out.push((self.target.as_path(), warning.as_str()));
        }
        for child in &self.children {
            child.collect_warnings(out);
        }
    }
}
