use crate::entry::{priority, Entry, EntryInfo};
use crate::java::CHUNK_ID;
use crate::message::Event;
use crate::registry::ResourceFile;

/// The java chunk header: the callback dispatch table mapping the script's
/// callback indices to chunk-relative method positions, followed by the
/// class records of every linked class.
pub struct JavaHeader {
    info: EntryInfo,
    callback_table: Vec<u16>,
}

impl JavaHeader {
    pub fn new() -> JavaHeader {
        JavaHeader {
            info: EntryInfo::new(CHUNK_ID, "javaheader"),
            callback_table: Vec::new(),
        }
    }

    pub fn set_callback(&mut self, index: u16, method_pos: u16) {
        if let Some(slot) = self.callback_table.get_mut(index as usize) {
            *slot = method_pos;
        }
    }

    pub fn callback_table(&self) -> &[u16] {
        &self.callback_table
    }
}

impl Default for JavaHeader {
    fn default() -> JavaHeader {
        JavaHeader::new()
    }
}

impl Entry for JavaHeader {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::JAVA_HEADER
    }

    fn on_event(&mut self, file: &ResourceFile, event: &mut Event) {
        match event {
            Event::Prepare { .. } => {
                let count = file.script().borrow().max_callback_index() as usize + 1;
                self.callback_table = vec![0; count];
                self.info.buffer_mut().set_len(4 + 2 * count);
            }
            Event::Serialize => {
                let table = self.callback_table.clone();
                let buffer = self.info.buffer_mut();
                let mut pos = buffer.write_u16(4, 0);
                pos = buffer.write_u16(4 + 2 * table.len() as u16, pos);
                for value in table {
                    pos = buffer.write_u16(value, pos);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn serialized_layout() {
        let file = ResourceFile::new();
        let mut header = JavaHeader::new();
        header.on_event(&file, &mut Event::Prepare { file_pos: 0 });
        // no callbacks configured: one table slot
        assert_eq!(header.info().buffer().len(), 6);
        header.set_callback(0, 0x46);
        header.on_event(&file, &mut Event::Serialize);
        assert_eq!(header.info().buffer().as_slice(), &[4, 0, 6, 0, 0x46, 0]);
    }

    #[test]
    fn out_of_range_callback_ignored() {
        let file = ResourceFile::new();
        let mut header = JavaHeader::new();
        header.on_event(&file, &mut Event::Prepare { file_pos: 0 });
        header.set_callback(9, 0x10);
        assert_eq!(header.callback_table(), &[0]);
    }
}
