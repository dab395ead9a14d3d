//! Open-file table
//!
//! One entry per open file, indexed by handle. An entry records where the
//! cursor is and where the file's data ends; the size is implied by the end
//! marker. Closed entries carry an empty name and are reused by `open`.

use crate::error::{CartError, Result};
use crate::geometry::{FrameSlot, FRAME_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of simultaneously open files
pub const DEFAULT_MAX_FILES: usize = 1024;

/// Default maximum file name length in bytes
pub const DEFAULT_MAX_NAME_LEN: usize = 128;

/// Index of an entry in the file table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileHandle(pub u16);

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of one open file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name (empty when the entry is closed)
    pub name: String,
    /// Frame holding the cursor
    pub cursor: FrameSlot,
    /// Byte offset of the cursor within its frame (0..=1024)
    pub cursor_offset: usize,
    /// Position of the cursor frame in the chain
    pub cursor_index: usize,
    /// Last frame of the chain
    pub end: FrameSlot,
    /// Valid bytes in the end frame (0..=1024)
    pub end_offset: usize,
    /// Frames in the chain
    pub frame_count: usize,
}

impl FileEntry {
    fn closed() -> Self {
        FileEntry {
            name: String::new(),
            cursor: FrameSlot::new(0, 0),
            cursor_offset: 0,
            cursor_index: 0,
            end: FrameSlot::new(0, 0),
            end_offset: 0,
            frame_count: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.name.is_empty()
    }

    /// Make `first` the only frame of the chain, with cursor and end on it
    pub fn start_chain(&mut self, first: FrameSlot) {
        self.cursor = first;
        self.cursor_offset = 0;
        self.cursor_index = 0;
        self.end = first;
        self.end_offset = 0;
        self.frame_count = 1;
    }

    /// Append a newly allocated frame as the end of the chain
    pub fn extend_chain(&mut self, next: FrameSlot) {
        self.end = next;
        self.end_offset = 0;
        self.frame_count += 1;
    }

    /// Move the cursor to the start of the following chain frame
    pub fn advance_cursor(&mut self, next: FrameSlot) {
        self.cursor = next;
        self.cursor_offset = 0;
        self.cursor_index += 1;
    }

    pub fn cursor_at_end_frame(&self) -> bool {
        self.cursor == self.end
    }

    /// File size in bytes
    pub fn length(&self) -> u64 {
        match self.frame_count {
            0 => 0,
            n => (n as u64 - 1) * FRAME_SIZE as u64 + self.end_offset as u64,
        }
    }

    /// Cursor position in bytes from the start of the file
    pub fn position(&self) -> u64 {
        self.cursor_index as u64 * FRAME_SIZE as u64 + self.cursor_offset as u64
    }
}

/// Table of open files
#[derive(Debug, Clone)]
pub struct FileTable {
    entries: Vec<FileEntry>,
    max_files: usize,
    max_name_len: usize,
}

impl FileTable {
    pub fn new(max_files: usize, max_name_len: usize) -> Self {
        FileTable {
            entries: Vec::new(),
            max_files,
            max_name_len,
        }
    }

    /// Claim an entry for `name`, reusing the lowest closed entry
    ///
    /// The returned entry has no frames yet; the caller starts its chain.
    pub fn open(&mut self, name: &str) -> Result<FileHandle> {
        if name.is_empty() || name.len() > self.max_name_len {
            return Err(CartError::InvalidName(name.to_string()));
        }
        if self.find(name).is_some() {
            return Err(CartError::AlreadyOpen(name.to_string()));
        }

        let index = match self.entries.iter().position(|entry| !entry.is_open()) {
            Some(index) => index,
            None if self.entries.len() < self.max_files => {
                self.entries.push(FileEntry::closed());
                self.entries.len() - 1
            }
            None => return Err(CartError::TableFull),
        };

        let entry = &mut self.entries[index];
        *entry = FileEntry::closed();
        entry.name = name.to_string();
        Ok(FileHandle(index as u16))
    }

    /// Mark an entry closed
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        let entry = self.get_mut(handle)?;
        *entry = FileEntry::closed();
        Ok(())
    }

    pub fn get(&self, handle: FileHandle) -> Result<&FileEntry> {
        self.entries
            .get(handle.0 as usize)
            .filter(|entry| entry.is_open())
            .ok_or(CartError::InvalidHandle(handle.0))
    }

    pub fn get_mut(&mut self, handle: FileHandle) -> Result<&mut FileEntry> {
        self.entries
            .get_mut(handle.0 as usize)
            .filter(|entry| entry.is_open())
            .ok_or(CartError::InvalidHandle(handle.0))
    }

    /// Handle of the open file called `name`
    pub fn find(&self, name: &str) -> Option<FileHandle> {
        self.entries
            .iter()
            .position(|entry| entry.is_open() && entry.name == name)
            .map(|index| FileHandle(index as u16))
    }

    /// Handles of all open files
    pub fn open_handles(&self) -> Vec<FileHandle> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_open())
            .map(|(index, _)| FileHandle(index as u16))
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }
}

impl Default for FileTable {
    fn default() -> Self {
        FileTable::new(DEFAULT_MAX_FILES, DEFAULT_MAX_NAME_LEN)
    }
}
