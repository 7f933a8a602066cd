use crate::buffer::BinaryBuffer;
use crate::message::Event;
use crate::registry::ResourceFile;

/// File-position priorities. Lower values serialize earlier; insertion is
/// stable among equal priorities.
pub mod priority {
    pub const HEADER: u32 = 0;
    pub const JAVA_HEADER: u32 = 10;
    pub const JAVA_CLASS: u32 = 11;
    pub const WAVE: u32 = 20;
    pub const BITMAP: u32 = 30;
    pub const FONT: u32 = 30;
    pub const STRING: u32 = 40;
    pub const BINARY: u32 = 50;
    pub const LINKER_SCRIPT: u32 = 1000;
}

/// Per-entry bookkeeping shared by every resource type.
#[derive(Debug)]
pub struct EntryInfo {
    class_id: u32,
    class_name: &'static str,
    file_pos: u32,
    buffer: BinaryBuffer,
}

impl EntryInfo {
    pub fn new(class_id: u32, class_name: &'static str) -> EntryInfo {
        EntryInfo {
            class_id,
            class_name,
            file_pos: 0,
            buffer: BinaryBuffer::new(),
        }
    }

    pub fn class_id(&self) -> u32 {
        self.class_id
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn file_pos(&self) -> u32 {
        self.file_pos
    }

    pub fn set_file_pos(&mut self, file_pos: u32) {
        self.file_pos = file_pos;
    }

    pub fn buffer(&self) -> &BinaryBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut BinaryBuffer {
        &mut self.buffer
    }
}

/// Capability contract for everything living in the resource file: header,
/// resource entries and command-line factories alike. An entry sizes its
/// buffer on Prepare, resolves cross-references on Link and fills the
/// buffer on Serialize; a factory reacts to CommandLine/Help instead.
pub trait Entry {
    fn info(&self) -> &EntryInfo;

    fn info_mut(&mut self) -> &mut EntryInfo;

    fn priority(&self) -> u32;

    /// Resource identifier for cross-type duplicate detection.
    fn identifier(&self) -> Option<&str> {
        None
    }

    /// Source file name for per-type duplicate-file suppression.
    fn source_name(&self) -> Option<&str> {
        None
    }

    fn on_event(&mut self, file: &ResourceFile, event: &mut Event);
}
