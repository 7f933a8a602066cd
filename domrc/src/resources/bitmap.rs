use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use crate::buffer::ByteReader;
use crate::entry::{priority, Entry, EntryInfo};
use crate::error::prelude::*;
use crate::message::Event;
use crate::registry::ResourceFile;

pub const CLASS_ID: u32 = 0x5350_4D42; // "BMPS"

const BMP_MAGIC: u16 = 0x4D42; // "BM"
const INFO_HEADER_SIZE: u32 = 40;
const BI_RGB: u32 = 0;

const HEADER_LENGTH: u32 = 5;
const ALIGNMENT_SHIFT: u8 = 6;

const USAGE: &str = " -bitmap:<filename.bmp>[,<identifier>[,RGB565|RGB565REV]] : Adds a bitmap to the resource file";

#[derive(Debug, Clone, Copy, PartialEq)]
enum ByteOrder {
    LowFirst,
    HighFirst,
}

/// A bitmap resource: pixel rows top-down without padding, serialized as
/// width/height/depth plus alignment filler so multi-byte pixels start
/// aligned in the target image.
pub struct Bitmap {
    info: EntryInfo,
    file_name: String,
    resource_id: String,
    width: i32,
    height: i32,
    source_bpp: u16,
    target_bpp: u16,
    alignment_bytes: u32,
    byte_order: ByteOrder,
    palette: Vec<[u8; 4]>,
    pixels: Vec<u8>,
}

impl Bitmap {
    pub fn new() -> Bitmap {
        Bitmap {
            info: EntryInfo::new(CLASS_ID, "bitmap"),
            file_name: String::new(),
            resource_id: String::new(),
            width: 0,
            height: 0,
            source_bpp: 0,
            target_bpp: 0,
            alignment_bytes: 0,
            byte_order: ByteOrder::LowFirst,
            palette: Vec::new(),
            pixels: Vec::new(),
        }
    }

    fn load(&mut self, file: &ResourceFile, name: &str) -> BuildResult<()> {
        let data =
            fs::read(name).map_err(|_| BuildError::ResourceFileOpen(name.to_string()))?;
        self.parse_bmp(data)
            .map_err(|_| BuildError::ResourceFileOpen(name.to_string()))?;
        self.file_name = name.to_string();
        if file.verbose() {
            println!(
                "{} - Bitmap file loaded ({}(w)x{}(h), {}bpp).",
                name, self.width, self.height, self.source_bpp
            );
        }
        Ok(())
    }

    fn parse_bmp(&mut self, data: Vec<u8>) -> BuildResult<()> {
        let mut reader = ByteReader::new(data);
        let magic = reader.read_u16_le()?;
        if magic != BMP_MAGIC {
            return Err(BuildError::UnexpectedEndOfData);
        }
        let _file_size = reader.read_u32_le()?;
        let _reserved1 = reader.read_u16_le()?;
        let _reserved2 = reader.read_u16_le()?;
        let pixel_offset = reader.read_u32_le()?;
        let info_size = reader.read_u32_le()?;
        if info_size != INFO_HEADER_SIZE {
            return Err(BuildError::UnexpectedEndOfData);
        }
        let width = reader.read_i32_le()?;
        let raw_height = reader.read_i32_le()?;
        let _planes = reader.read_u16_le()?;
        let bit_count = reader.read_u16_le()?;
        let compression = reader.read_u32_le()?;
        if compression != BI_RGB {
            return Err(BuildError::UnexpectedEndOfData);
        }
        let _image_size = reader.read_u32_le()?;
        let _x_pixels_per_meter = reader.read_i32_le()?;
        let _y_pixels_per_meter = reader.read_i32_le()?;
        let colors_used = reader.read_u32_le()?;
        let _colors_important = reader.read_u32_le()?;
        if width <= 0 || raw_height == 0 || bit_count == 0 {
            return Err(BuildError::UnexpectedEndOfData);
        }
        self.width = width;
        self.height = raw_height.abs();
        self.source_bpp = bit_count;
        self.palette = Vec::with_capacity(colors_used as usize);
        for _ in 0..colors_used {
            let blue = reader.read_u8()?;
            let green = reader.read_u8()?;
            let red = reader.read_u8()?;
            let reserved = reader.read_u8()?;
            self.palette.push([blue, green, red, reserved]);
        }
        let bits_in_line = bit_count as i32 * width;
        let bytes_in_line = ((bits_in_line + 7) / 8) as usize;
        // BMP rows are padded to 32-bit boundaries and stored bottom-up
        // unless the height is negative
        let stride = ((bits_in_line + 31) / 32 * 4) as usize;
        self.pixels = vec![0; bytes_in_line * self.height as usize];
        reader.seek(pixel_offset as usize);
        for row in 0..self.height {
            let line = reader.read_bytes(stride)?.to_vec();
            let target_row = if raw_height < 0 {
                row as usize
            } else {
                (self.height - 1 - row) as usize
            };
            let pos = target_row * bytes_in_line;
            self.pixels[pos..pos + bytes_in_line].copy_from_slice(&line[..bytes_in_line]);
        }
        Ok(())
    }

    /// Filler bytes so that pixels wider than a byte start on a matching
    /// boundary at `data_pos` in the output image.
    fn alignment_byte_count(&self, data_pos: u32) -> u32 {
        if self.target_bpp <= 8 {
            0
        } else if self.target_bpp <= 16 {
            data_pos & 1
        } else {
            (4 - (data_pos & 3)) & 3
        }
    }

    fn convert_colors(&mut self) {
        if self.source_bpp == self.target_bpp {
            return;
        }
        let width = self.width as usize;
        let height = self.height as usize;
        let source_bytes_in_line = (self.source_bpp as usize * width + 7) / 8;
        let target_bytes_in_line = (self.target_bpp as usize * width + 7) / 8;
        let mut target = vec![0u8; target_bytes_in_line * height];
        for y in 0..height {
            for x in 0..width {
                let address = source_bytes_in_line * y + x * self.source_bpp as usize / 8;
                let (red, green, blue) = if self.source_bpp == 8 {
                    let index = self.pixels[address] as usize;
                    let color = self.palette.get(index).copied().unwrap_or([0; 4]);
                    (color[2], color[1], color[0])
                } else {
                    (
                        self.pixels[address + 2],
                        self.pixels[address + 1],
                        self.pixels[address],
                    )
                };
                if self.target_bpp == 16 {
                    let pixel = (((red & 0xF8) as u16) << 8)
                        + (((green & 0xFC) as u16) << 3)
                        + (((blue & 0xF8) as u16) >> 3);
                    let index = target_bytes_in_line * y + x * 2;
                    match self.byte_order {
                        ByteOrder::LowFirst => {
                            target[index] = pixel as u8;
                            target[index + 1] = (pixel >> 8) as u8;
                        }
                        ByteOrder::HighFirst => {
                            target[index] = (pixel >> 8) as u8;
                            target[index + 1] = pixel as u8;
                        }
                    }
                }
            }
        }
        self.pixels = target;
    }

    fn add_resource(
        &self,
        file: &ResourceFile,
        parameter: &str,
        identifier: &str,
        options: &Option<Vec<String>>,
    ) {
        if !file.check_identifier(identifier) {
            return;
        }
        let mut bitmap = Bitmap::new();
        if let Err(error) = bitmap.load(file, parameter) {
            file.set_error(error);
            return;
        }
        bitmap.target_bpp = bitmap.source_bpp;
        if let Some(options) = options {
            if options.len() == 1 {
                match options[0].to_uppercase().as_str() {
                    "RGB565" => bitmap.target_bpp = 16,
                    "RGB565REV" => {
                        bitmap.target_bpp = 16;
                        bitmap.byte_order = ByteOrder::HighFirst;
                    }
                    other => file.set_error(BuildError::InvalidOption(other.to_string())),
                }
            }
        }
        bitmap.convert_colors();
        bitmap.resource_id = identifier.to_string();
        let bitmap = Rc::new(RefCell::new(bitmap));
        file.add(bitmap.clone());
        file.register_chunk(CLASS_ID, priority::BITMAP, bitmap);
    }
}

impl Default for Bitmap {
    fn default() -> Bitmap {
        Bitmap::new()
    }
}

impl Entry for Bitmap {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::BITMAP
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
            Event::Prepare { file_pos } => {
                self.alignment_bytes = self.alignment_byte_count(*file_pos + HEADER_LENGTH);
                let length = HEADER_LENGTH + self.alignment_bytes + self.pixels.len() as u32;
                self.info.buffer_mut().set_len(length as usize);
            }
            Event::Serialize => {
                let width = self.width as u16;
                let height = self.height as u16;
                let depth = self.target_bpp as u8 | (self.alignment_bytes as u8) << ALIGNMENT_SHIFT;
                let data_pos = (HEADER_LENGTH + self.alignment_bytes) as usize;
                let pixels = &self.pixels;
                let buffer = self.info.buffer_mut();
                let mut pos = buffer.write_u16(width, 0);
                pos = buffer.write_u16(height, pos);
                buffer.write_u8(depth, pos);
                buffer.write_bytes(pixels, data_pos);
            }
            Event::Help => println!("{}", USAGE),
            Event::CommandLine {
                command,
                parameter,
                identifier,
                options,
                used,
            } => {
                if command.as_deref() == Some("bitmap")
                    && !file.source_exists(CLASS_ID, parameter)
                {
                    self.add_resource(file, parameter, identifier, options);
                    *used = true;
                }
            }
            _ => {}
        }
    }
}
