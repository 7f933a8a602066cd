use std::cell::RefCell;
use std::rc::Rc;

use crate::entry::{priority, Entry, EntryInfo};
use crate::message::Event;
use crate::registry::ResourceFile;

pub const CLASS_ID: u32 = 0x4752_5453; // "STRG"

const USAGE: &str = " -string:<text>[,<identifier>] : Adds a text to the resource file";

/// A text resource: UTF-8 bytes behind a 7-bit-groups length prefix.
pub struct StringResource {
    info: EntryInfo,
    resource_id: String,
    text: String,
}

/// Length prefix: low seven bits first, bit 7 set on every byte except the
/// last.
pub fn encode_length(length: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut length = length;
    while length > 0x7F {
        bytes.push(((length & 0x7F) | 0x80) as u8);
        length >>= 7;
    }
    bytes.push((length & 0x7F) as u8);
    bytes
}

impl StringResource {
    pub fn new() -> StringResource {
        StringResource {
            info: EntryInfo::new(CLASS_ID, "string"),
            resource_id: String::new(),
            text: String::new(),
        }
    }

    fn add_resource(&self, file: &ResourceFile, parameter: &str, identifier: &str) {
        if !file.check_identifier(identifier) {
            return;
        }
        let mut string = StringResource::new();
        string.text = parameter.to_string();
        string.resource_id = identifier.to_string();
        let string = Rc::new(RefCell::new(string));
        file.add(string.clone());
        file.register_chunk(CLASS_ID, priority::STRING, string);
    }
}

impl Default for StringResource {
    fn default() -> StringResource {
        StringResource::new()
    }
}

impl Entry for StringResource {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::STRING
    }

    fn identifier(&self) -> Option<&str> {
        if self.resource_id.is_empty() {
            None
        } else {
            Some(&self.resource_id)
        }
    }

    fn on_event(&mut self, file: &ResourceFile, event: &mut Event) {
        match event {
            Event::Prepare { .. } => {
                let text_length = self.text.as_bytes().len();
                let length = encode_length(text_length).len() + text_length;
                self.info.buffer_mut().set_len(length);
            }
            Event::Serialize => {
                let prefix = encode_length(self.text.as_bytes().len());
                let text = self.text.clone();
                let buffer = self.info.buffer_mut();
                let pos = buffer.write_bytes(&prefix, 0);
                buffer.write_bytes(text.as_bytes(), pos);
            }
            Event::Help => println!("{}", USAGE),
            Event::CommandLine {
                command,
                parameter,
                identifier,
                used,
                ..
            } => {
                if command.as_deref() == Some("string") {
                    self.add_resource(file, parameter, identifier);
                    *used = true;
                }
            }
            _ => {}
        }
    }
}
