use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::buffer::ByteReader;
use crate::entry::{priority, Entry, EntryInfo};
use crate::error::prelude::*;
use crate::message::Event;
use crate::registry::ResourceFile;

pub const CLASS_ID: u32 = 0x544E_4F46; // "FONT"

const FONT_TYPE_MONOCHROME: u8 = 0;

const FF_DONTCARE: u8 = 1;
const FF_ROMAN: u8 = 2;
const FF_SWISS: u8 = 3;
const FF_MODERN: u8 = 4;
const FF_SCRIPT: u8 = 5;
const FF_DECORATIVE: u8 = 6;
const FF_FIXED: u8 = 1 << 7;
const FF_BOLD: u8 = 1 << 6;
const FF_ITALIC: u8 = 1 << 5;

const FNT_VERSION_2: u16 = 0x0200;
const FNT_HEADER_SIZE: usize = 118;

const FNA_ATTRIBUTES: [&str; 15] = [
    "name",
    "family",
    "isfixed",
    "width",
    "height",
    "minchar",
    "maxchar",
    "baseline",
    "undwidth",
    "avgwidth",
    "minwidth",
    "maxwidth",
    "defchar",
    "note",
    "horizontalchargap",
];

// attributes 0..7 are mandatory; avgwidth substitutes for width
const REQUIRED_ATTRIBUTES: u32 = 0xFF;

const USAGE: &str = " -font:<filename.fna|.fnt>[,<identifier>] : Adds a font to the resource file";

#[derive(Debug)]
struct Glyph {
    code: u32,
    width: u32,
    bitmap: Vec<u8>,
}

/// A monochrome bitmap font, loadable from the FNA text format or a
/// Windows 2.0 FNT file.
pub struct Font {
    info: EntryInfo,
    file_name: String,
    resource_id: String,
    name: String,
    flags: u8,
    font_type: u8,
    horizontal_char_gap: u8,
    width: i32,
    height: i32,
    baseline: i32,
    default_character: i32,
    glyphs: Vec<Glyph>,
}

impl Font {
    pub fn new() -> Font {
        Font {
            info: EntryInfo::new(CLASS_ID, "font"),
            file_name: String::new(),
            resource_id: String::new(),
            name: String::new(),
            flags: 0,
            font_type: FONT_TYPE_MONOCHROME,
            horizontal_char_gap: 0,
            width: -1,
            height: -1,
            baseline: -1,
            default_character: 0,
            glyphs: Vec::new(),
        }
    }

    fn load(&mut self, file: &ResourceFile, name: &str) -> BuildResult<()> {
        let extension = Path::new(name)
            .extension()
            .map(|extension| extension.to_string_lossy().to_uppercase())
            .unwrap_or_default();
        match extension.as_str() {
            "FNA" => {
                let text = fs::read_to_string(name)
                    .map_err(|_| BuildError::ResourceFileOpen(name.to_string()))?;
                self.parse_fna(name, &text)?;
            }
            "FNT" => {
                let data = fs::read(name)
                    .map_err(|_| BuildError::ResourceFileOpen(name.to_string()))?;
                self.parse_fnt(data)
                    .map_err(|_| BuildError::ResourceFileOpen(name.to_string()))?;
            }
            _ => return Err(BuildError::ResourceFileOpen(name.to_string())),
        }
        self.file_name = name.to_string();
        if file.verbose() {
            println!(
                "{} - Font file loaded ({}(w)x{}(h), {} bytes).",
                name,
                self.width,
                self.height,
                self.binary_size()
            );
        }
        Ok(())
    }

    fn parse_fna(&mut self, name: &str, text: &str) -> BuildResult<()> {
        let invalid = |line: usize| BuildError::InvalidFnaFile(name.to_string(), line);
        // content lines only; `;` starts a comment line
        let content: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with(';'))
            .collect();
        let mut cursor = 0;
        let mut attributes: u32 = 0;
        let mut min_char: i32 = 0;
        let mut max_char: i32 = 0;
        let mut default_char: i32 = -1;
        let mut last_line = 1;

        while cursor < content.len() {
            let (line_number, line) = content[cursor];
            let starts_alphanumeric = line
                .chars()
                .next()
                .map(|character| character.is_alphanumeric())
                .unwrap_or(false);
            if !starts_alphanumeric {
                break;
            }
            cursor += 1;
            last_line = line_number;
            let mut parts = line.split(' ');
            let attribute = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            let index = FNA_ATTRIBUTES
                .iter()
                .position(|&known| known == attribute)
                .ok_or_else(|| invalid(line_number))?;
            if attributes & (1 << index) != 0 {
                return Err(invalid(line_number));
            }
            let numeric = (index > 1 && index < 13) || index == 14;
            let number = if numeric {
                let number: i32 = value.parse().map_err(|_| invalid(line_number))?;
                if number < 0 {
                    return Err(invalid(line_number));
                }
                number
            } else {
                0
            };
            match index {
                0 => self.name = value.to_string(),
                1 => {
                    self.flags += match value {
                        "roman" => FF_ROMAN,
                        "swiss" => FF_SWISS,
                        "modern" => FF_MODERN,
                        "script" => FF_SCRIPT,
                        "decorative" => FF_DECORATIVE,
                        _ => FF_DONTCARE,
                    }
                }
                2 => {
                    if number != 0 {
                        self.flags |= FF_FIXED;
                    }
                }
                3 => self.width = number,
                4 => self.height = number,
                5 => min_char = number,
                6 => max_char = number,
                7 => self.baseline = number,
                9 => {
                    // average width given: proportional font
                    attributes |= 1 << 3;
                    self.width = 0;
                }
                12 => default_char = number,
                14 => self.horizontal_char_gap = number as u8,
                _ => {}
            }
            attributes |= 1 << index;
        }

        if attributes & REQUIRED_ATTRIBUTES != REQUIRED_ATTRIBUTES {
            return Err(invalid(last_line));
        }
        if max_char - min_char + 1 <= 0 {
            return Err(invalid(last_line));
        }
        self.default_character = if default_char == -1 { min_char } else { default_char };

        let bytes_per_row = |width: i32| (width as usize + 7) / 8;
        let mut glyphs = Vec::with_capacity((max_char - min_char + 1) as usize);
        for code in min_char..=max_char {
            let mut width: i32 = -1;
            let mut bitmap: Vec<u8> = Vec::new();
            for row in 0..self.height {
                let (line_number, line) = *content.get(cursor).ok_or_else(|| invalid(last_line))?;
                cursor += 1;
                last_line = line_number;
                let line_width = line.chars().count() as i32;
                if width == -1 {
                    if self.flags & FF_FIXED != 0 && line_width != self.width {
                        return Err(invalid(line_number));
                    }
                    width = line_width;
                    bitmap = vec![0u8; bytes_per_row(width) * self.height as usize];
                }
                if line_width != width {
                    return Err(invalid(line_number));
                }
                for (column, character) in line.chars().enumerate() {
                    match character {
                        '#' => {
                            bitmap[row as usize * bytes_per_row(width) + (column >> 3)] |=
                                1u8 << (7 - (column & 7))
                        }
                        '.' => {}
                        _ => return Err(invalid(line_number)),
                    }
                }
            }
            glyphs.push(Glyph {
                code: code as u32,
                width: width.max(0) as u32,
                bitmap,
            });
        }
        self.glyphs = glyphs;
        Ok(())
    }

    fn parse_fnt(&mut self, data: Vec<u8>) -> BuildResult<()> {
        let mut reader = ByteReader::new(data);
        let version = reader.read_u16_le()?;
        reader.seek(66);
        let font_type = reader.read_u16_le()?;
        if version != FNT_VERSION_2 || font_type != 0 {
            return Err(BuildError::UnexpectedEndOfData);
        }
        reader.seek(74);
        let ascent = reader.read_u16_le()?;
        reader.seek(80);
        let italic = reader.read_u8()?;
        reader.seek(83);
        let weight = reader.read_u16_le()?;
        reader.seek(86);
        let pixel_width = reader.read_u16_le()?;
        let pixel_height = reader.read_u16_le()?;
        reader.seek(90);
        let pitch_and_family = reader.read_u8()?;
        let average_width = reader.read_u16_le()?;
        reader.seek(95);
        let first_char = reader.read_u8()?;
        let last_char = reader.read_u8()?;
        if last_char < first_char {
            return Err(BuildError::UnexpectedEndOfData);
        }
        reader.seek(105);
        let face_offset = reader.read_u32_le()?;

        reader.seek(face_offset as usize);
        let mut face = String::new();
        loop {
            let byte = reader.read_u8()?;
            if byte == 0 {
                break;
            }
            face.push(byte as char);
        }
        self.name = face;
        self.flags = match pitch_and_family & 0xF0 {
            0x10 => FF_ROMAN,
            0x20 => FF_SWISS,
            0x30 => FF_MODERN,
            0x40 => FF_SCRIPT,
            0x50 => FF_DECORATIVE,
            _ => FF_DONTCARE,
        };
        if italic != 0 {
            self.flags |= FF_ITALIC;
        }
        if weight > 400 {
            self.flags |= FF_BOLD;
        }
        if pixel_width == 0 {
            self.flags |= FF_FIXED;
            self.width = average_width as i32;
        } else {
            self.width = pixel_width as i32;
        }
        self.height = pixel_height as i32;
        self.baseline = ascent as i32;
        self.font_type = FONT_TYPE_MONOCHROME;
        self.horizontal_char_gap = 0;

        let mut glyphs = Vec::with_capacity((last_char - first_char) as usize + 1);
        for code in first_char..=last_char {
            reader.seek(FNT_HEADER_SIZE + (code - first_char) as usize * 4);
            let width = reader.read_u16_le()? as usize;
            let offset = reader.read_u16_le()? as usize;
            let bytes_per_row = (width + 7) / 8;
            let mut bitmap = vec![0u8; bytes_per_row * self.height as usize];
            reader.seek(offset);
            // FNT glyph data is column-major
            for column in 0..bytes_per_row {
                for row in 0..self.height as usize {
                    bitmap[bytes_per_row * row + column] = reader.read_u8()?;
                }
            }
            glyphs.push(Glyph {
                code: code as u32,
                width: width as u32,
                bitmap,
            });
        }
        self.glyphs = glyphs;
        Ok(())
    }

    fn binary_size(&self) -> u32 {
        let mut size = 9 + 2;
        for glyph in &self.glyphs {
            size += if glyph.code <= 0xFF { 2 } else { 4 };
            size += 1 + glyph.bitmap.len() as u32;
        }
        size
    }

    fn serialize(&mut self) {
        let mut min_ascii: i32 = -1;
        let mut max_ascii: i32 = -1;
        let mut unicode_count: u32 = 0;
        for glyph in &self.glyphs {
            if glyph.code <= 0xFF {
                if min_ascii == -1 {
                    min_ascii = glyph.code as i32;
                }
                max_ascii = glyph.code as i32;
            } else {
                unicode_count += 1;
            }
        }
        let ascii_count = if min_ascii == -1 {
            0
        } else {
            (max_ascii - min_ascii + 1) as usize
        };
        let glyphs = &self.glyphs;
        let buffer = self.info.buffer_mut();
        let mut pos = buffer.write_u8(self.font_type, 0);
        pos = buffer.write_u8(self.flags, pos);
        pos = buffer.write_u8(self.width as u8, pos);
        pos = buffer.write_u8(self.height as u8, pos);
        pos = buffer.write_u8(self.baseline as u8, pos);
        pos = buffer.write_u8(self.horizontal_char_gap, pos);
        pos = buffer.write_u8(min_ascii as u8, pos);
        pos = buffer.write_u8(max_ascii as u8, pos);
        pos = buffer.write_u8(self.default_character as u8, pos);
        pos = buffer.write_u16(unicode_count as u16, pos);
        // ascii offset table, then (code, offset) pairs for the rest
        let table_pos = pos;
        let mut unicode_pos = table_pos + ascii_count * 2;
        let mut char_data_pos = unicode_pos + unicode_count as usize * 4;
        for glyph in glyphs {
            if glyph.code <= 0xFF {
                let slot = table_pos + (glyph.code as i32 - min_ascii) as usize * 2;
                buffer.write_u16(char_data_pos as u16, slot);
            } else {
                unicode_pos = buffer.write_u16(glyph.code as u16, unicode_pos);
                unicode_pos = buffer.write_u16(char_data_pos as u16, unicode_pos);
            }
            char_data_pos = buffer.write_u8(glyph.width as u8, char_data_pos);
            char_data_pos = buffer.write_bytes(&glyph.bitmap, char_data_pos);
        }
    }

    fn add_resource(&self, file: &ResourceFile, parameter: &str, identifier: &str) {
        if !file.check_identifier(identifier) {
            return;
        }
        let mut font = Font::new();
        match font.load(file, parameter) {
            Ok(()) => {
                font.resource_id = identifier.to_string();
                let font = Rc::new(RefCell::new(font));
                file.add(font.clone());
                file.register_chunk(CLASS_ID, priority::FONT, font);
            }
            Err(error) => file.set_error(error),
        }
    }
}

impl Default for Font {
    fn default() -> Font {
        Font::new()
    }
}

impl Entry for Font {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::FONT
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
                let length = self.binary_size() as usize;
                self.info.buffer_mut().set_len(length);
            }
            Event::Serialize => self.serialize(),
            Event::Help => println!("{}", USAGE),
            Event::CommandLine {
                command,
                parameter,
                identifier,
                used,
                ..
            } => {
                if command.as_deref() == Some("font")
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

#[cfg(test)]
mod test {
    use super::*;

    const FNA: &str = "\
; tiny two-glyph font
name tiny
family modern
isfixed 1
width 8
height 2
minchar 65
maxchar 66
baseline 1
; glyph A
####....
....####
; glyph B
#.#.#.#.
.#.#.#.#
";

    #[test]
    fn fna_parse() {
        let mut font = Font::new();
        font.parse_fna("tiny.fna", FNA).unwrap();
        assert_eq!(font.name, "tiny");
        assert_eq!(font.flags, FF_MODERN | FF_FIXED);
        assert_eq!(font.width, 8);
        assert_eq!(font.height, 2);
        assert_eq!(font.baseline, 1);
        assert_eq!(font.default_character, 65);
        assert_eq!(font.glyphs.len(), 2);
        assert_eq!(font.glyphs[0].code, 65);
        assert_eq!(font.glyphs[0].bitmap, vec![0xF0, 0x0F]);
        assert_eq!(font.glyphs[1].bitmap, vec![0xAA, 0x55]);
    }

    #[test]
    fn fna_missing_attribute_is_invalid() {
        let mut font = Font::new();
        let result = font.parse_fna("short.fna", "name x\nfamily roman\n");
        assert_eq!(
            result,
            Err(BuildError::InvalidFnaFile(String::from("short.fna"), 2))
        );
    }

    #[test]
    fn fna_duplicate_attribute_is_invalid() {
        let mut font = Font::new();
        let result = font.parse_fna("dup.fna", "name x\nname y\n");
        assert_eq!(
            result,
            Err(BuildError::InvalidFnaFile(String::from("dup.fna"), 2))
        );
    }

    #[test]
    fn fna_bad_glyph_character_is_invalid() {
        let source = FNA.replace("####....", "####...x");
        let mut font = Font::new();
        let result = font.parse_fna("bad.fna", &source);
        assert_eq!(
            result,
            Err(BuildError::InvalidFnaFile(String::from("bad.fna"), 11))
        );
    }

    #[test]
    fn fna_wrong_row_width_is_invalid() {
        let source = FNA.replace("....####", "....###");
        let mut font = Font::new();
        let result = font.parse_fna("narrow.fna", &source);
        assert_eq!(
            result,
            Err(BuildError::InvalidFnaFile(String::from("narrow.fna"), 12))
        );
    }

    #[test]
    fn serialized_layout() {
        let mut font = Font::new();
        font.parse_fna("tiny.fna", FNA).unwrap();
        let file = ResourceFile::new();
        font.on_event(&file, &mut Event::Prepare { file_pos: 0 });
        // 11 header bytes + 2 table words + 2 * (1 + 2) glyph records
        assert_eq!(font.info().buffer().len(), 21);
        font.on_event(&file, &mut Event::Serialize);
        let data = font.info().buffer().as_slice();
        assert_eq!(
            &data[..11],
            &[
                FONT_TYPE_MONOCHROME,
                FF_MODERN | FF_FIXED,
                8, // width
                2, // height
                1, // baseline
                0, // horizontal char gap
                65,
                66,
                65, // default character
                0,
                0, // no unicode glyphs
            ]
        );
        // offset table and glyph records
        assert_eq!(&data[11..15], &[15, 0, 18, 0]);
        assert_eq!(&data[15..18], &[8, 0xF0, 0x0F]);
        assert_eq!(&data[18..21], &[8, 0xAA, 0x55]);
    }

    #[test]
    fn unicode_glyph_table_entries() {
        let mut font = Font::new();
        font.width = 0;
        font.height = 1;
        font.baseline = 0;
        font.glyphs.push(Glyph {
            code: 0x150,
            width: 8,
            bitmap: vec![0x81],
        });
        let file = ResourceFile::new();
        font.on_event(&file, &mut Event::Prepare { file_pos: 0 });
        // 11 header bytes + one 4-byte pair + 2-byte glyph record
        assert_eq!(font.info().buffer().len(), 17);
        font.on_event(&file, &mut Event::Serialize);
        let data = font.info().buffer().as_slice();
        assert_eq!(&data[9..11], &[1, 0]);
        assert_eq!(&data[11..15], &[0x50, 0x01, 15, 0]);
        assert_eq!(&data[15..17], &[8, 0x81]);
    }

    fn fnt_bytes() -> Vec<u8> {
        let glyph_offset: u16 = FNT_HEADER_SIZE as u16 + 2 * 4;
        let face_offset: u32 = glyph_offset as u32 + 2 * 2;
        let mut data = vec![0u8; face_offset as usize + 5];
        data[0..2].copy_from_slice(&FNT_VERSION_2.to_le_bytes());
        data[66..68].copy_from_slice(&0u16.to_le_bytes()); // raster
        data[74..76].copy_from_slice(&7u16.to_le_bytes()); // ascent
        data[80] = 1; // italic
        data[83..85].copy_from_slice(&700u16.to_le_bytes()); // bold
        data[86..88].copy_from_slice(&0u16.to_le_bytes()); // fixed
        data[88..90].copy_from_slice(&2u16.to_le_bytes()); // height
        data[90] = 0x30; // modern
        data[91..93].copy_from_slice(&8u16.to_le_bytes()); // average width
        data[95] = 65;
        data[96] = 66;
        data[105..109].copy_from_slice(&face_offset.to_le_bytes());
        // glyph table: width + data offset per char
        let table = FNT_HEADER_SIZE;
        data[table..table + 2].copy_from_slice(&8u16.to_le_bytes());
        data[table + 2..table + 4].copy_from_slice(&glyph_offset.to_le_bytes());
        data[table + 4..table + 6].copy_from_slice(&8u16.to_le_bytes());
        data[table + 6..table + 8].copy_from_slice(&(glyph_offset + 2).to_le_bytes());
        // column-major glyph bytes
        data[glyph_offset as usize] = 0xF0;
        data[glyph_offset as usize + 1] = 0x0F;
        data[glyph_offset as usize + 2] = 0xAA;
        data[glyph_offset as usize + 3] = 0x55;
        data[face_offset as usize..face_offset as usize + 4].copy_from_slice(b"tiny");
        data
    }

    #[test]
    fn fnt_parse() {
        let mut font = Font::new();
        font.parse_fnt(fnt_bytes()).unwrap();
        assert_eq!(font.name, "tiny");
        assert_eq!(font.flags, FF_MODERN | FF_FIXED | FF_BOLD | FF_ITALIC);
        assert_eq!(font.width, 8);
        assert_eq!(font.height, 2);
        assert_eq!(font.baseline, 7);
        assert_eq!(font.glyphs.len(), 2);
        assert_eq!(font.glyphs[0].code, 65);
        assert_eq!(font.glyphs[0].width, 8);
        assert_eq!(font.glyphs[0].bitmap, vec![0xF0, 0x0F]);
        assert_eq!(font.glyphs[1].bitmap, vec![0xAA, 0x55]);
        // FNT input never sets a default character
        assert_eq!(font.default_character, 0);
    }

    #[test]
    fn fnt_reversed_char_range_rejected() {
        let mut data = fnt_bytes();
        data[95] = 66;
        data[96] = 65;
        let mut font = Font::new();
        assert!(font.parse_fnt(data).is_err());
    }

    #[test]
    fn fnt_wrong_version_rejected() {
        let mut data = fnt_bytes();
        data[0] = 0x00;
        data[1] = 0x03;
        let mut font = Font::new();
        assert!(font.parse_fnt(data).is_err());
    }
}
