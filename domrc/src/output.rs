use std::fs;

use crate::error::prelude::*;
use crate::registry::ResourceFile;

/// Writes the finished resource file in the format the linker script
/// selects: raw binary, a C array source file, or Intel-Hex.
pub fn save(file: &ResourceFile) -> BuildResult<()> {
    let script = file.script();
    let script = script.borrow();
    let name = script.output_file_name().to_string();
    let format = script.output_file_format().to_string();
    if name.is_empty() || format.is_empty() {
        return Err(BuildError::OutputNotSpecified);
    }
    match format.as_str() {
        "binary" => {
            let mut data = Vec::with_capacity(file.binary_size() as usize);
            for buffer in file.buffers() {
                data.extend_from_slice(&buffer);
            }
            write_output(&name, &data)
        }
        "c-array" => {
            let text = render_c_array(
                &file.buffers(),
                file.binary_size(),
                script.type_name(),
                script.variable(),
            );
            write_output(&name, text.as_bytes())
        }
        "hex" => {
            let text = render_intel_hex(script.start_address());
            write_output(&name, text.as_bytes())
        }
        _ => Err(BuildError::OutputNotSpecified),
    }
}

fn write_output(name: &str, data: &[u8]) -> BuildResult<()> {
    fs::write(name, data).map_err(|_| BuildError::OutputFileCreate(name.to_string()))
}

/// C source initializer: eight hex bytes per line.
fn render_c_array(buffers: &[Vec<u8>], total_size: u32, type_name: &str, variable: &str) -> String {
    let mut text = format!("{} {}[{}] =\n{{\n", type_name, variable, total_size);
    let mut line = String::new();
    let mut count = 0;
    for buffer in buffers {
        for &byte in buffer {
            if line.is_empty() {
                line.push_str(" 0x");
            } else {
                line.push_str(", 0x");
            }
            line.push_str(&format!("{:02X}", byte));
            count += 1;
            if count == 8 {
                count = 0;
                text.push_str(&line);
                text.push_str(",\n");
                line.clear();
            }
        }
    }
    if !line.is_empty() {
        text.push_str(&line);
        text.push('\n');
    }
    text.push_str("};\n");
    text
}

/// Intel-Hex skeleton. Data records are not emitted for the image payload;
/// the hex form carries the extended-segment record for the configured
/// start address and the end-of-file terminator.
fn render_intel_hex(start_address: &str) -> String {
    let mut address_text = start_address.trim().to_lowercase();
    if let Some(stripped) = address_text.strip_prefix("0x") {
        address_text = stripped.to_string();
    }
    let address = u32::from_str_radix(&address_text, 16).unwrap_or(0);
    let mut text = String::new();
    let segment = (address >> 16) as u16;
    if segment != 0 {
        let value = segment.wrapping_shl(12);
        let sum = 0x02u8
            .wrapping_add(0x02)
            .wrapping_add((value >> 8) as u8)
            .wrapping_add(value as u8);
        let checksum = (0x100u16.wrapping_sub(sum as u16) & 0xFF) as u8;
        text.push_str(&format!(":02000002{:04X}{:02X}\n", value, checksum));
    }
    text.push_str(":00000001FF\n");
    text
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn c_array_shape() {
        let buffers = vec![vec![0x00, 0x11, 0x22, 0x33, 0x44], vec![0x55, 0x66, 0x77, 0x88, 0x99]];
        let text = render_c_array(&buffers, 10, "const unsigned char", "resource_data");
        assert_eq!(
            text,
            "const unsigned char resource_data[10] =\n\
             {\n\
             \u{20}0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77,\n\
             \u{20}0x88, 0x99\n\
             };\n"
        );
    }

    #[test]
    fn c_array_full_last_line_keeps_comma() {
        let buffers = vec![vec![0xAB; 8]];
        let text = render_c_array(&buffers, 8, "const unsigned char", "data");
        assert!(text.ends_with("0xAB,\n};\n"));
    }

    #[test]
    fn intel_hex_terminator_only_for_low_addresses() {
        assert_eq!(render_intel_hex(""), ":00000001FF\n");
        assert_eq!(render_intel_hex("0x1234"), ":00000001FF\n");
    }

    #[test]
    fn intel_hex_segment_record() {
        // 0x20000 -> segment 2 -> paragraph 0x2000
        assert_eq!(
            render_intel_hex("0x20000"),
            ":020000022000DC\n:00000001FF\n"
        );
    }

    #[test]
    fn intel_hex_bad_address_falls_back_to_zero() {
        assert_eq!(render_intel_hex("garbage"), ":00000001FF\n");
    }

    #[test]
    fn save_without_configuration_fails() {
        let file = ResourceFile::new();
        assert_eq!(save(&file), Err(BuildError::OutputNotSpecified));
    }

    #[test]
    fn binary_output_concatenates_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let file = ResourceFile::new();
        file.broadcast(&mut crate::message::Event::Prepare { file_pos: 0 });
        file.broadcast(&mut crate::message::Event::Serialize);
        let mut data = Vec::new();
        for buffer in file.buffers() {
            data.extend_from_slice(&buffer);
        }
        write_output(path.to_str().unwrap(), &data).unwrap();
        assert_eq!(fs::read(&path).unwrap(), data);
        assert_eq!(data.len(), 12);
    }
}
