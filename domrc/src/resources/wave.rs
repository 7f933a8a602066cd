use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use crate::buffer::ByteReader;
use crate::entry::{priority, Entry, EntryInfo};
use crate::error::prelude::*;
use crate::message::Event;
use crate::registry::ResourceFile;

pub const CLASS_ID: u32 = 0x4556_4157; // "WAVE"

const RIFF_CHUNK_ID: u32 = 0x4646_4952; // "RIFF"
const WAVE_FORMAT_ID: u32 = 0x4556_4157; // "WAVE"
const FMT_CHUNK_ID: u32 = 0x2074_6D66; // "fmt "
const DATA_CHUNK_ID: u32 = 0x6174_6164; // "data"

const PCM_FORMAT: u16 = 1;

// packed format byte: low nibble = format-field length, high nibble = rate
const RATE_8000: u8 = 0x00;
const RATE_11025: u8 = 0x10;
const RATE_22050: u8 = 0x20;
const RATE_44100: u8 = 0x30;
const RATE_CUSTOM: u8 = 0xF0;
const STEREO: u8 = 1 << 2;
const BITS_16: u8 = 1 << 3;

const USAGE: &str = " -wave:<filename.wav> : Adds a Wave file to the resource file";

/// A PCM wave resource: packed format descriptor, sample data length and
/// the raw samples.
pub struct Wave {
    info: EntryInfo,
    file_name: String,
    resource_id: String,
    samples: Vec<u8>,
    sample_rate: u32,
    channels: u16,
    resolution: u16,
    sample_count: u32,
}

impl Wave {
    pub fn new() -> Wave {
        Wave {
            info: EntryInfo::new(CLASS_ID, "wave"),
            file_name: String::new(),
            resource_id: String::new(),
            samples: Vec::new(),
            sample_rate: 0,
            channels: 0,
            resolution: 0,
            sample_count: 0,
        }
    }

    fn load(&mut self, file: &ResourceFile, name: &str) -> BuildResult<()> {
        let data =
            fs::read(name).map_err(|_| BuildError::ResourceFileOpen(name.to_string()))?;
        self.parse_riff(data)?;
        self.file_name = name.to_string();
        if file.verbose() {
            println!(
                "{} - Wave file loaded ({}Hz/{}ch/{}bit/{}samples).",
                name, self.sample_rate, self.channels, self.resolution, self.sample_count
            );
        }
        Ok(())
    }

    fn parse_riff(&mut self, data: Vec<u8>) -> BuildResult<()> {
        let mut reader = ByteReader::new(data);
        let chunk_id = reader.read_u32_le()?;
        let _riff_length = reader.read_u32_le()?;
        let format = reader.read_u32_le()?;
        if chunk_id != RIFF_CHUNK_ID || format != WAVE_FORMAT_ID {
            return Err(BuildError::InvalidWaveFile);
        }
        loop {
            let chunk_id = match reader.read_u32_le() {
                Ok(chunk_id) => chunk_id,
                Err(_) => break,
            };
            let chunk_length = match reader.read_u32_le() {
                Ok(chunk_length) => chunk_length,
                Err(_) => break,
            };
            let next_chunk = reader.position() + chunk_length as usize;
            match chunk_id {
                FMT_CHUNK_ID => {
                    let audio_format = reader.read_u16_le()?;
                    self.channels = reader.read_u16_le()?;
                    self.sample_rate = reader.read_u32_le()?;
                    let _byte_rate = reader.read_u32_le()?;
                    let _block_align = reader.read_u16_le()?;
                    self.resolution = reader.read_u16_le()?;
                    if audio_format != PCM_FORMAT {
                        return Err(BuildError::InvalidWaveFile);
                    }
                }
                DATA_CHUNK_ID => {
                    self.samples = reader.read_bytes(chunk_length as usize)?.to_vec();
                    let sample_bytes = (self.resolution as u32 / 8).max(1);
                    let channels = (self.channels as u32).max(1);
                    self.sample_count = chunk_length / sample_bytes / channels;
                }
                _ => {}
            }
            reader.seek(next_chunk);
        }
        Ok(())
    }

    /// Packed format descriptor: one byte for the standard rates, a
    /// three-byte form carrying the rate for anything else.
    fn format_bytes(&self) -> Vec<u8> {
        let mut buffer;
        let mut format_byte;
        match self.sample_rate {
            8000 => {
                format_byte = 1 | RATE_8000;
                buffer = vec![0u8; 1];
            }
            11025 => {
                format_byte = 1 | RATE_11025;
                buffer = vec![0u8; 1];
            }
            22050 => {
                format_byte = 1 | RATE_22050;
                buffer = vec![0u8; 1];
            }
            44100 => {
                format_byte = 1 | RATE_44100;
                buffer = vec![0u8; 1];
            }
            rate => {
                format_byte = RATE_CUSTOM | 3;
                buffer = vec![0u8; 3];
                buffer[1] = (rate % 256) as u8;
                buffer[2] = (rate / 256) as u8;
            }
        }
        if self.channels == 2 {
            format_byte |= STEREO;
        }
        if self.resolution == 16 {
            format_byte |= BITS_16;
        }
        buffer[0] = format_byte;
        buffer
    }

    fn add_resource(&self, file: &ResourceFile, parameter: &str, identifier: &str) {
        if !file.check_identifier(identifier) {
            return;
        }
        let mut wave = Wave::new();
        match wave.load(file, parameter) {
            Ok(()) => {
                wave.resource_id = identifier.to_string();
                let wave = Rc::new(RefCell::new(wave));
                file.add(wave.clone());
                file.register_chunk(CLASS_ID, priority::WAVE, wave);
            }
            Err(error) => file.set_error(error),
        }
    }
}

impl Default for Wave {
    fn default() -> Wave {
        Wave::new()
    }
}

impl Entry for Wave {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::WAVE
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
                let length = self.format_bytes().len() + 4 + self.samples.len();
                self.info.buffer_mut().set_len(length);
            }
            Event::Serialize => {
                let format = self.format_bytes();
                let samples = &self.samples;
                let buffer = self.info.buffer_mut();
                let mut pos = buffer.write_bytes(&format, 0);
                pos = buffer.write_u32(samples.len() as u32, pos);
                buffer.write_bytes(samples, pos);
            }
            Event::Help => println!("{}", USAGE),
            Event::CommandLine {
                command,
                parameter,
                identifier,
                used,
                ..
            } => {
                if command.as_deref() == Some("wave")
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

    fn riff_bytes(rate: u32, channels: u16, resolution: u16, samples: &[u8]) -> Vec<u8> {
        let mut data: Vec<u8> = Vec::new();
        data.extend_from_slice(b"RIFF");
        data.extend_from_slice(&(36 + samples.len() as u32).to_le_bytes());
        data.extend_from_slice(b"WAVE");
        data.extend_from_slice(b"fmt ");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes()); // PCM
        data.extend_from_slice(&channels.to_le_bytes());
        data.extend_from_slice(&rate.to_le_bytes());
        data.extend_from_slice(&(rate * channels as u32 * resolution as u32 / 8).to_le_bytes());
        data.extend_from_slice(&(channels * resolution / 8).to_le_bytes());
        data.extend_from_slice(&resolution.to_le_bytes());
        data.extend_from_slice(b"data");
        data.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        data.extend_from_slice(samples);
        data
    }

    #[test]
    fn parse_and_serialize_standard_rate() {
        let mut wave = Wave::new();
        wave.parse_riff(riff_bytes(8000, 1, 8, &[1, 2, 3, 4])).unwrap();
        assert_eq!(wave.sample_rate, 8000);
        assert_eq!(wave.sample_count, 4);
        let file = ResourceFile::new();
        wave.on_event(&file, &mut Event::Prepare { file_pos: 0 });
        wave.on_event(&file, &mut Event::Serialize);
        assert_eq!(
            wave.info().buffer().as_slice(),
            &[0x01, 4, 0, 0, 0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn format_byte_packing() {
        let mut wave = Wave::new();
        wave.sample_rate = 22050;
        wave.channels = 2;
        wave.resolution = 16;
        assert_eq!(wave.format_bytes(), vec![0x21 | STEREO | BITS_16]);
        wave.sample_rate = 44100;
        wave.channels = 1;
        wave.resolution = 8;
        assert_eq!(wave.format_bytes(), vec![0x31]);
    }

    #[test]
    fn custom_rate_three_byte_form() {
        let mut wave = Wave::new();
        wave.sample_rate = 16000;
        wave.channels = 1;
        wave.resolution = 8;
        // 16000 = 0x3E80
        assert_eq!(wave.format_bytes(), vec![0xF3, 0x80, 0x3E]);
    }

    #[test]
    fn non_pcm_rejected() {
        let mut data = riff_bytes(8000, 1, 8, &[0]);
        data[20] = 2; // audio format
        let mut wave = Wave::new();
        assert_eq!(wave.parse_riff(data), Err(BuildError::InvalidWaveFile));
    }

    #[test]
    fn bad_riff_header_rejected() {
        let mut wave = Wave::new();
        assert_eq!(
            wave.parse_riff(b"RIFX\x00\x00\x00\x00WAVE".to_vec()),
            Err(BuildError::InvalidWaveFile)
        );
    }

    #[test]
    fn stereo_sixteen_bit_sample_count() {
        let mut wave = Wave::new();
        wave.parse_riff(riff_bytes(44100, 2, 16, &[0; 16])).unwrap();
        assert_eq!(wave.sample_count, 4);
    }
}
