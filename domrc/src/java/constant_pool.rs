use crate::buffer::ByteReader;
use crate::error::prelude::*;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;

/// Resolution state of a Methodref entry, written once during Link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MethodrefLink {
    /// Not (or not successfully) resolved; serializes as 0xFFFF.
    Unresolved,
    /// `java/lang/Object.<init>`; serializes as 0.
    ObjectInit,
    /// Chunk-relative position of the target method record.
    Resolved(u16),
}

#[derive(Debug, Clone)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String { string_index: u16 },
    Class { name_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
        link: MethodrefLink,
    },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    /// Second slot of a Long/Double entry.
    Unused,
}

/// The class-file constant pool. Indices are 1-based as in the class file;
/// slot 0 and the trailing slot of Long/Double entries hold `Unused`.
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<PoolEntry>,
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool { entries: Vec::new() }
    }

    pub fn parse(reader: &mut ByteReader) -> BuildResult<ConstantPool> {
        let count = reader.read_u16()? as usize;
        if count == 0 {
            return Err(BuildError::UnexpectedEndOfData);
        }
        let mut entries = Vec::with_capacity(count);
        entries.push(PoolEntry::Unused);
        while entries.len() < count {
            let tag = reader.read_u8()?;
            let entry = match tag {
                TAG_UTF8 => {
                    let length = reader.read_u16()? as usize;
                    let bytes = reader.read_bytes(length)?;
                    PoolEntry::Utf8(decode_modified_utf8(bytes)?)
                }
                TAG_INTEGER => PoolEntry::Integer(reader.read_i32()?),
                TAG_FLOAT => PoolEntry::Float(reader.read_f32()?),
                TAG_LONG => PoolEntry::Long(reader.read_i64()?),
                TAG_DOUBLE => PoolEntry::Double(reader.read_f64()?),
                TAG_STRING => PoolEntry::String {
                    string_index: reader.read_u16()?,
                },
                TAG_CLASS => PoolEntry::Class {
                    name_index: reader.read_u16()?,
                },
                TAG_FIELDREF => PoolEntry::Fieldref {
                    class_index: reader.read_u16()?,
                    name_and_type_index: reader.read_u16()?,
                },
                TAG_METHODREF => PoolEntry::Methodref {
                    class_index: reader.read_u16()?,
                    name_and_type_index: reader.read_u16()?,
                    link: MethodrefLink::Unresolved,
                },
                TAG_INTERFACE_METHODREF => PoolEntry::InterfaceMethodref {
                    class_index: reader.read_u16()?,
                    name_and_type_index: reader.read_u16()?,
                },
                TAG_NAME_AND_TYPE => PoolEntry::NameAndType {
                    name_index: reader.read_u16()?,
                    descriptor_index: reader.read_u16()?,
                },
                tag => return Err(BuildError::UnsupportedPoolTag(tag)),
            };
            let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
            entries.push(entry);
            if wide {
                entries.push(PoolEntry::Unused);
            }
        }
        Ok(ConstantPool { entries })
    }

    /// Number of pool slots, including slot 0 and Long/Double trailers.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn get(&self, index: u16) -> Option<&PoolEntry> {
        self.entries.get(index as usize)
    }

    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(PoolEntry::Utf8(string)) => Some(string),
            _ => None,
        }
    }

    /// Class name behind a Class pool entry.
    pub fn class_name(&self, class_index: u16) -> Option<&str> {
        match self.get(class_index) {
            Some(PoolEntry::Class { name_index }) => self.utf8(*name_index),
            _ => None,
        }
    }

    /// Method name behind a NameAndType pool entry.
    pub fn name_and_type_name(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(PoolEntry::NameAndType { name_index, .. }) => self.utf8(*name_index),
            _ => None,
        }
    }

    /// Every Methodref as (pool index, class index, name-and-type index).
    pub fn methodref_targets(&self) -> Vec<(u16, u16, u16)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                PoolEntry::Methodref {
                    class_index,
                    name_and_type_index,
                    ..
                } => Some((index as u16, *class_index, *name_and_type_index)),
                _ => None,
            })
            .collect()
    }

    pub fn set_methodref_link(&mut self, pool_index: u16, value: MethodrefLink) {
        if let Some(PoolEntry::Methodref { link, .. }) =
            self.entries.get_mut(pool_index as usize)
        {
            *link = value;
        }
    }

    /// Bytes of constant storage the serialized form needs (Integer
    /// constants are materialized there, 4 bytes each).
    pub fn storage_size(&self) -> u32 {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, PoolEntry::Integer(_)))
            .count() as u32
            * 4
    }
}

/// Decodes the class-file modified UTF-8 form (1/2/3-byte sequences; no
/// 4-byte form, U+0000 encoded as 0xC0 0x80).
pub fn decode_modified_utf8(bytes: &[u8]) -> BuildResult<String> {
    let mut string = String::new();
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        let code = if byte & 0x80 == 0 {
            index += 1;
            byte as u32
        } else if byte & 0xE0 == 0xC0 {
            if index + 1 >= bytes.len() {
                return Err(BuildError::UnexpectedEndOfData);
            }
            let second = bytes[index + 1];
            index += 2;
            (((byte & 0x1F) as u32) << 6) | (second & 0x3F) as u32
        } else if byte & 0xF0 == 0xE0 {
            if index + 2 >= bytes.len() {
                return Err(BuildError::UnexpectedEndOfData);
            }
            let second = bytes[index + 1];
            let third = bytes[index + 2];
            index += 3;
            (((byte & 0x0F) as u32) << 12)
                | (((second & 0x3F) as u32) << 6)
                | (third & 0x3F) as u32
        } else {
            return Err(BuildError::UnexpectedEndOfData);
        };
        match std::char::from_u32(code) {
            Some(character) => string.push(character),
            None => return Err(BuildError::UnexpectedEndOfData),
        }
    }
    Ok(string)
}

pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(string.len());
    for character in string.chars() {
        let code = character as u32;
        if code != 0 && code < 0x80 {
            bytes.push(code as u8);
        } else if code < 0x800 {
            bytes.push(0xC0 | (code >> 6) as u8);
            bytes.push(0x80 | (code & 0x3F) as u8);
        } else {
            bytes.push(0xE0 | (code >> 12) as u8);
            bytes.push(0x80 | ((code >> 6) & 0x3F) as u8);
            bytes.push(0x80 | (code & 0x3F) as u8);
        }
    }
    bytes
}

#[cfg(test)]
mod test {
    use super::*;

    fn pool_bytes() -> Vec<u8> {
        let mut data: Vec<u8> = Vec::new();
        data.extend_from_slice(&7u16.to_be_bytes()); // count
        // 1: Utf8 "Main"
        data.push(TAG_UTF8);
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(b"Main");
        // 2: Class -> 1
        data.push(TAG_CLASS);
        data.extend_from_slice(&1u16.to_be_bytes());
        // 3: Integer
        data.push(TAG_INTEGER);
        data.extend_from_slice(&0x11223344i32.to_be_bytes());
        // 4: Long (consumes slots 4 and 5)
        data.push(TAG_LONG);
        data.extend_from_slice(&(-2i64).to_be_bytes());
        // 6: NameAndType 1, 1
        data.push(TAG_NAME_AND_TYPE);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data
    }

    #[test]
    fn pool_parse() {
        let mut reader = ByteReader::new(pool_bytes());
        let pool = ConstantPool::parse(&mut reader).unwrap();
        assert_eq!(pool.entry_count(), 7);
        assert_eq!(pool.utf8(1), Some("Main"));
        assert_eq!(pool.class_name(2), Some("Main"));
        assert!(matches!(pool.get(3), Some(PoolEntry::Integer(0x11223344))));
        assert!(matches!(pool.get(4), Some(PoolEntry::Long(-2))));
        assert!(matches!(pool.get(5), Some(PoolEntry::Unused)));
        assert_eq!(pool.name_and_type_name(6), Some("Main"));
        assert_eq!(pool.storage_size(), 4);
    }

    #[test]
    fn unsupported_tag_rejected() {
        let mut reader = ByteReader::new(vec![0x00, 0x02, 0xFE]);
        assert_eq!(
            ConstantPool::parse(&mut reader).unwrap_err(),
            BuildError::UnsupportedPoolTag(0xFE)
        );
    }

    #[test]
    fn methodref_link_storage() {
        let mut data: Vec<u8> = vec![0x00, 0x02];
        data.push(TAG_METHODREF);
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        let mut reader = ByteReader::new(data);
        let mut pool = ConstantPool::parse(&mut reader).unwrap();
        assert_eq!(pool.methodref_targets(), vec![(1, 2, 3)]);
        pool.set_methodref_link(1, MethodrefLink::Resolved(0x46));
        assert!(matches!(
            pool.get(1),
            Some(PoolEntry::Methodref {
                link: MethodrefLink::Resolved(0x46),
                ..
            })
        ));
    }

    #[test]
    fn modified_utf8_round_trip() {
        for text in &["Hello", "héllo", "€uro \u{20AC}", "járműipar"] {
            let encoded = encode_modified_utf8(text);
            assert_eq!(decode_modified_utf8(&encoded).unwrap(), *text);
        }
    }

    #[test]
    fn modified_utf8_three_byte_form() {
        // U+20AC -> 0xE2 0x82 0xAC
        assert_eq!(encode_modified_utf8("\u{20AC}"), vec![0xE2, 0x82, 0xAC]);
        assert_eq!(
            decode_modified_utf8(&[0xE2, 0x82, 0xAC]).unwrap(),
            "\u{20AC}"
        );
    }

    #[test]
    fn modified_utf8_nul_form() {
        assert_eq!(encode_modified_utf8("\u{0}"), vec![0xC0, 0x80]);
        assert_eq!(decode_modified_utf8(&[0xC0, 0x80]).unwrap(), "\u{0}");
    }

    #[test]
    fn modified_utf8_truncated_sequence() {
        assert_eq!(
            decode_modified_utf8(&[0xC3]),
            Err(BuildError::UnexpectedEndOfData)
        );
        assert_eq!(
            decode_modified_utf8(&[0xE2, 0x82]),
            Err(BuildError::UnexpectedEndOfData)
        );
    }
}
