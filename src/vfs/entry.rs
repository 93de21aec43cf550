//! Synthetic directory entries published by a mount.

use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Dir,
}

/// One item of the virtual directory listing.
///
/// Equality and hashing ignore `size`: an entry's identity is its location,
/// while its size may be re-estimated when options change.
#[derive(Debug, Clone, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    /// Ancestor directory names, outermost first.
    pub path_parts: Vec<String>,
    pub name: String,
    /// Published byte size; for frames an upper bound on any render.
    pub size: u64,
    /// Output frame index for frame entries.
    pub frame_index: Option<u32>,
}

impl Entry {
    pub fn dir(path_parts: Vec<String>, name: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Dir,
            path_parts,
            name: name.into(),
            size: 0,
            frame_index: None,
        }
    }

    pub fn file(path_parts: Vec<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            path_parts,
            name: name.into(),
            size,
            frame_index: None,
        }
    }

    /// Slash-joined path of this entry, no leading separator.
    pub fn full_path(&self) -> String {
        let mut path = String::new();
        for part in &self.path_parts {
            path.push_str(part);
            path.push('/');
        }
        path.push_str(&self.name);
        path
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.path_parts == other.path_parts && self.name == other.name
    }
}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.path_parts.hash(state);
        self.name.hash(state);
    }
}
