use crate::buffer::ByteReader;
use crate::error::prelude::*;
use crate::java::constant_pool::ConstantPool;

pub const ACC_NATIVE: u16 = 0x0100;

const NATIVE_RECORD_SIZE: u32 = 8;
const CODE_RECORD_HEADER_SIZE: u32 = 10;

#[derive(Debug, Clone)]
pub struct AttributeEntry {
    pub name_index: u16,
    pub info: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone)]
pub enum MethodBody {
    /// Native stub: slots to rewind from the operand stack on return and
    /// the index into the target's native dispatch table, both filled in
    /// during Link.
    Native { stack_rewind: i16, native_index: u16 },
    Code {
        max_stack: u16,
        max_locals: u16,
        bytecode: Vec<u8>,
        exception_table: Vec<ExceptionHandler>,
        attributes: Vec<AttributeEntry>,
    },
}

#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub body: MethodBody,
    pub attributes: Vec<AttributeEntry>,
}

impl Method {
    pub fn parse(reader: &mut ByteReader, pool: &ConstantPool) -> BuildResult<Method> {
        let access_flags = reader.read_u16()?;
        let name_index = reader.read_u16()?;
        let descriptor_index = reader.read_u16()?;
        let native = access_flags & ACC_NATIVE != 0;
        let mut body = if native {
            MethodBody::Native {
                stack_rewind: 0,
                native_index: 0,
            }
        } else {
            MethodBody::Code {
                max_stack: 0,
                max_locals: 0,
                bytecode: Vec::new(),
                exception_table: Vec::new(),
                attributes: Vec::new(),
            }
        };
        let mut attributes = Vec::new();
        let attribute_count = reader.read_u16()?;
        for _ in 0..attribute_count {
            let attribute_name_index = reader.read_u16()?;
            if !native && pool.utf8(attribute_name_index) == Some("Code") {
                reader.skip(4); // attribute length
                let max_stack = reader.read_u16()?;
                let max_locals = reader.read_u16()?;
                let code_length = reader.read_u32()? as usize;
                let bytecode = reader.read_bytes(code_length)?.to_vec();
                let handler_count = reader.read_u16()?;
                let mut exception_table = Vec::with_capacity(handler_count as usize);
                for _ in 0..handler_count {
                    exception_table.push(ExceptionHandler {
                        start_pc: reader.read_u16()?,
                        end_pc: reader.read_u16()?,
                        handler_pc: reader.read_u16()?,
                        catch_type: reader.read_u16()?,
                    });
                }
                let code_attributes = read_attributes(reader)?;
                body = MethodBody::Code {
                    max_stack,
                    max_locals,
                    bytecode,
                    exception_table,
                    attributes: code_attributes,
                };
            } else {
                let length = reader.read_u32()? as usize;
                let info = reader.read_bytes(length)?.to_vec();
                attributes.push(AttributeEntry {
                    name_index: attribute_name_index,
                    info,
                });
            }
        }
        Ok(Method {
            access_flags,
            name_index,
            descriptor_index,
            body,
            attributes,
        })
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    /// Size of this method's record in the serialized class chunk.
    pub fn binary_size(&self) -> u32 {
        match &self.body {
            MethodBody::Native { .. } => NATIVE_RECORD_SIZE,
            MethodBody::Code { bytecode, .. } => {
                CODE_RECORD_HEADER_SIZE + bytecode.len() as u32
            }
        }
    }
}

/// Reads a `{name_index, length, bytes}` attribute list.
pub fn read_attributes(reader: &mut ByteReader) -> BuildResult<Vec<AttributeEntry>> {
    let count = reader.read_u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_index = reader.read_u16()?;
        let length = reader.read_u32()? as usize;
        let info = reader.read_bytes(length)?.to_vec();
        attributes.push(AttributeEntry { name_index, info });
    }
    Ok(attributes)
}

/// Operand-stack slots an invocation of `descriptor` rewinds: each argument
/// counts positive (two for long/double, one for a class reference), the
/// return value negative.
pub fn stack_rewind(descriptor: &str) -> i16 {
    let mut rewind: i16 = 0;
    let mut sign: i16 = 0;
    let mut characters = descriptor.chars();
    while let Some(character) = characters.next() {
        match character {
            '(' => sign = 1,
            ')' => sign = -1,
            'B' | 'C' | 'F' | 'I' | 'S' | 'Z' => rewind += sign,
            'D' | 'J' => rewind += 2 * sign,
            'L' => {
                rewind += sign;
                for skipped in characters.by_ref() {
                    if skipped == ';' {
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    rewind
}
