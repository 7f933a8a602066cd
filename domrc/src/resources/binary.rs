use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use crate::entry::{priority, Entry, EntryInfo};
use crate::error::prelude::*;
use crate::message::Event;
use crate::registry::ResourceFile;

pub const CLASS_ID: u32 = 0x414E_4942; // "BINA"

// lengths above this use the two-word extended form
const SHORT_LENGTH_MAX: usize = 32767;

const USAGE: &str = " -binary:<filename>[,<identifier>] : Adds a raw binary file to the resource file";

/// A raw binary resource: u16 length (extended two-word form for large
/// files) followed by the file bytes.
pub struct Binary {
    info: EntryInfo,
    file_name: String,
    resource_id: String,
    data: Vec<u8>,
}

impl Binary {
    pub fn new() -> Binary {
        Binary {
            info: EntryInfo::new(CLASS_ID, "binary"),
            file_name: String::new(),
            resource_id: String::new(),
            data: Vec::new(),
        }
    }

    fn load(&mut self, file: &ResourceFile, name: &str) -> BuildResult<()> {
        self.data =
            fs::read(name).map_err(|_| BuildError::ResourceFileOpen(name.to_string()))?;
        self.file_name = name.to_string();
        if file.verbose() {
            println!("{} - Binary file loaded ({} bytes).", name, self.data.len());
        }
        Ok(())
    }

    fn length_field_size(&self) -> usize {
        if self.data.len() > SHORT_LENGTH_MAX {
            4
        } else {
            2
        }
    }

    fn add_resource(&self, file: &ResourceFile, parameter: &str, identifier: &str) {
        if !file.check_identifier(identifier) {
            return;
        }
        let mut binary = Binary::new();
        match binary.load(file, parameter) {
            Ok(()) => {
                binary.resource_id = identifier.to_string();
                let binary = Rc::new(RefCell::new(binary));
                file.add(binary.clone());
                file.register_chunk(CLASS_ID, priority::BINARY, binary);
            }
            Err(error) => file.set_error(error),
        }
    }
}

impl Default for Binary {
    fn default() -> Binary {
        Binary::new()
    }
}

impl Entry for Binary {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::BINARY
    }

    fn identifier(&self) -> Option<&str> {
        if self.resource_id.is_empty() {
            None
        } else {
            Some(&self.resource_id)
        }
    }

    fn source_name(&self) -> Option<&str> {
        if self.file_name.is_empty() {
            None
        } else {
            Some(&self.file_name)
        }
    }

    fn on_event(&mut self, file: &ResourceFile, event: &mut Event) {
        match event {
            Event::Prepare { .. } => {
                let length = self.length_field_size() + self.data.len();
                self.info.buffer_mut().set_len(length);
            }
            Event::Serialize => {
                let length = self.data.len();
                let data = std::mem::take(&mut self.data);
                let buffer = self.info.buffer_mut();
                let pos = if length > SHORT_LENGTH_MAX {
                    let pos =
                        buffer.write_u16(((length % SHORT_LENGTH_MAX) | 0x8000) as u16, 0);
                    buffer.write_u16((length / SHORT_LENGTH_MAX) as u16, pos)
                } else {
                    buffer.write_u16(length as u16, 0)
                };
                buffer.write_bytes(&data, pos);
                self.data = data;
            }
            Event::Help => println!("{}", USAGE),
            Event::CommandLine {
                command,
                parameter,
                identifier,
                used,
                ..
            } => {
                if command.as_deref() == Some("binary")
                    && !file.source_exists(CLASS_ID, parameter)
                {
                    self.add_resource(file, parameter, identifier);
                    *used = true;
                }
            }
            _ => {}
        }
    }
}
