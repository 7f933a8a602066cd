use crate::crc::Crc16;
use crate::entry::{priority, Entry, EntryInfo};
use crate::message::Event;
use crate::registry::{EntryCell, ResourceFile};

const MAGIC: u16 = 0x5244;
const VERSION: u16 = 0x0001;
const PREAMBLE_SIZE: usize = 12;
const CRC_POS: usize = 4;

struct ChunkEntry {
    id: u32,
    priority: u32,
    entry: EntryCell,
}

/// The file header: a 12-byte preamble (magic, version, crc, total size,
/// chunk count) followed by the chunk table mapping each registered chunk
/// id to the absolute file position of its entry.
pub struct Header {
    info: EntryInfo,
    chunks: Vec<ChunkEntry>,
    crc: u16,
}

impl Header {
    pub fn new() -> Header {
        Header {
            info: EntryInfo::new(0, "header"),
            chunks: Vec::new(),
            crc: 0,
        }
    }

    /// Registers a chunk. Each id is registered at most once; the table is
    /// ordered by the referenced entries' file-position priorities, stable
    /// among equals.
    pub fn register(&mut self, id: u32, priority: u32, entry: EntryCell) {
        if self.chunks.iter().any(|chunk| chunk.id == id) {
            return;
        }
        let mut index = 0;
        while index < self.chunks.len() && self.chunks[index].priority <= priority {
            index += 1;
        }
        self.chunks.insert(index, ChunkEntry { id, priority, entry });
    }

    fn serialize(&mut self, file: &ResourceFile) {
        let total_size = file.binary_size();
        let positions: Vec<(u32, u32)> = self
            .chunks
            .iter()
            .map(|chunk| (chunk.id, chunk.entry.borrow().info().file_pos()))
            .collect();
        let crc = self.crc;
        let buffer = self.info.buffer_mut();
        let mut pos = buffer.write_u16(MAGIC, 0);
        pos = buffer.write_u16(VERSION, pos);
        pos = buffer.write_u16(crc, pos);
        pos = buffer.write_u32(total_size, pos);
        pos = buffer.write_u16(positions.len() as u16, pos);
        for (id, file_pos) in positions {
            pos = buffer.write_u32(id, pos);
            pos = buffer.write_u32(file_pos, pos);
        }
    }

    /// CRC over the preamble from the size field onward, then every chunk
    /// entry's serialized buffer in table order; patched in place at the
    /// crc field.
    fn update_crc(&mut self) {
        let mut crc = Crc16::new();
        crc.accumulate(&self.info.buffer().as_slice()[6..PREAMBLE_SIZE]);
        for chunk in &self.chunks {
            crc.accumulate(chunk.entry.borrow().info().buffer().as_slice());
        }
        self.crc = crc.value();
        let value = self.crc;
        self.info.buffer_mut().write_u16(value, CRC_POS);
    }
}

impl Default for Header {
    fn default() -> Header {
        Header::new()
    }
}

impl Entry for Header {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::HEADER
    }

    fn on_event(&mut self, file: &ResourceFile, event: &mut Event) {
        match event {
            Event::Prepare { .. } => {
                let length = PREAMBLE_SIZE + 8 * self.chunks.len();
                self.info.buffer_mut().set_len(length);
            }
            Event::Serialize => self.serialize(file),
            Event::UpdateCrc => self.update_crc(),
            _ => {}
        }
    }
}
