//! The virtual directory a mount publishes: one `.dng` per output frame plus
//! the audio track, all under a directory named after the source clip.

use crate::vfs::entry::Entry;

pub const AUDIO_FILE_NAME: &str = "audio.wav";

/// File name of an output frame: `<base>_<NNNNNN>.dng`.
pub fn frame_file_name(base_name: &str, output_index: u32) -> String {
    format!("{base_name}_{output_index:06}.dng")
}

/// Immutable snapshot of a mount's listing; rebuilt when options change.
#[derive(Debug)]
pub struct VirtualDirectory {
    base_name: String,
    entries: Vec<Entry>,
    case_insensitive: bool,
}

impl VirtualDirectory {
    /// Enumerate entries for `frame_count` output frames. Audio comes first
    /// in listing order, then frames ascending.
    pub fn new(
        base_name: &str,
        frame_count: usize,
        typical_dng_size: u64,
        audio_size: Option<u64>,
        case_insensitive: bool,
    ) -> Self {
        let mut entries = Vec::with_capacity(frame_count + 2);
        entries.push(Entry::dir(Vec::new(), base_name));

        let parts = vec![base_name.to_string()];
        if let Some(size) = audio_size {
            entries.push(Entry::file(parts.clone(), AUDIO_FILE_NAME, size));
        }

        for index in 0..frame_count {
            let mut entry = Entry::file(
                parts.clone(),
                frame_file_name(base_name, index as u32),
                typical_dng_size,
            );
            entry.frame_index = Some(index as u32);
            entries.push(entry);
        }

        Self {
            base_name: base_name.to_string(),
            entries,
            case_insensitive,
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// All entries, directories included, in listing order.
    pub fn list(&self, filter: &str) -> Vec<Entry> {
        if filter.is_empty() {
            return self.entries.clone();
        }
        self.entries
            .iter()
            .filter(|e| e.name.contains(filter))
            .cloned()
            .collect()
    }

    fn path_matches(&self, entry_path: &str, query: &str) -> bool {
        if self.case_insensitive {
            entry_path.eq_ignore_ascii_case(query)
        } else {
            entry_path == query
        }
    }

    /// Resolve a full path (either slash style, leading separator allowed).
    pub fn find_entry(&self, full_path: &str) -> Option<&Entry> {
        let normalized = full_path.replace('\\', "/");
        let trimmed = normalized.trim_matches('/');
        self.entries
            .iter()
            .find(|e| self.path_matches(&e.full_path(), trimmed))
    }
}
