use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::buffer::ByteReader;
use crate::entry::{priority, Entry, EntryInfo};
use crate::error::prelude::*;
use crate::message::Event;
use crate::registry::ResourceFile;

pub mod constant_pool;
pub mod header;
pub mod method;

use self::constant_pool::{ConstantPool, MethodrefLink, PoolEntry};
use self::header::JavaHeader;
use self::method::{read_attributes, stack_rewind, AttributeEntry, Method, MethodBody};

/// Chunk id shared by the java header and every linked class ("JCLS").
pub const CHUNK_ID: u32 = 0x534C_434A;

const CLASS_MAGIC: u32 = 0xCAFE_BABE;
const OBJECT_CLASS: &str = "java/lang/Object";
const CONSTRUCTOR: &str = "<init>";

const USAGE: &str = " -class:<filename.class> : Adds a Java class to the resource file";

#[derive(Debug)]
pub struct FieldEntry {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeEntry>,
}

/// One Java class: parsed from a standard class file, linked against the
/// linker script and the other classes in the registry, serialized into
/// the compact runtime form.
pub struct JavaClass {
    info: EntryInfo,
    reader: Option<ByteReader>,
    class_path: PathBuf,
    minor_version: u16,
    major_version: u16,
    constant_pool: ConstantPool,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldEntry>,
    methods: Vec<Method>,
    attributes: Vec<AttributeEntry>,
    java_header: Option<Rc<RefCell<JavaHeader>>>,
    methods_pos: u32,
    main_class: bool,
}

impl JavaClass {
    pub fn new() -> JavaClass {
        JavaClass {
            info: EntryInfo::new(CHUNK_ID, "class"),
            reader: None,
            class_path: PathBuf::new(),
            minor_version: 0,
            major_version: 0,
            constant_pool: ConstantPool::new(),
            access_flags: 0,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            java_header: None,
            methods_pos: 0,
            main_class: false,
        }
    }

    pub fn set_main_class(&mut self) {
        self.main_class = true;
    }

    pub fn set_java_header(&mut self, header: Rc<RefCell<JavaHeader>>) {
        self.java_header = Some(header);
    }

    pub fn version(&self) -> (u16, u16) {
        (self.major_version, self.minor_version)
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn interfaces(&self) -> &[u16] {
        &self.interfaces
    }

    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    pub fn attributes(&self) -> &[AttributeEntry] {
        &self.attributes
    }

    pub fn this_class_name(&self) -> Option<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Option<&str> {
        if self.super_class == 0 {
            return None;
        }
        self.constant_pool.class_name(self.super_class)
    }

    fn invalid(path: &Path) -> BuildError {
        BuildError::InvalidClassFile(path.display().to_string())
    }

    /// Reads the class file and checks the magic number.
    pub fn load(&mut self, path: &Path) -> BuildResult<()> {
        let data =
            fs::read(path).map_err(|_| BuildError::ResourceFileOpen(path.display().to_string()))?;
        let mut reader = ByteReader::new(data);
        let magic = reader.read_u32().map_err(|_| JavaClass::invalid(path))?;
        if magic != CLASS_MAGIC {
            return Err(JavaClass::invalid(path));
        }
        self.class_path = path.to_path_buf();
        self.reader = Some(reader);
        Ok(())
    }

    pub fn parse(&mut self) -> BuildResult<()> {
        let mut reader = self
            .reader
            .take()
            .ok_or_else(|| JavaClass::invalid(&self.class_path))?;
        let path = self.class_path.clone();
        self.parse_from(&mut reader)
            .map_err(|_| JavaClass::invalid(&path))
    }

    fn parse_from(&mut self, reader: &mut ByteReader) -> BuildResult<()> {
        reader.seek(0);
        reader.read_u32()?; // magic, checked at load
        self.minor_version = reader.read_u16()?;
        self.major_version = reader.read_u16()?;
        self.constant_pool = ConstantPool::parse(reader)?;
        self.access_flags = reader.read_u16()?;
        self.this_class = reader.read_u16()?;
        self.super_class = reader.read_u16()?;
        let interface_count = reader.read_u16()?;
        self.interfaces = (0..interface_count)
            .map(|_| reader.read_u16())
            .collect::<BuildResult<Vec<u16>>>()?;
        let field_count = reader.read_u16()?;
        self.fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            self.fields.push(FieldEntry {
                access_flags: reader.read_u16()?,
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
                attributes: read_attributes(reader)?,
            });
        }
        let method_count = reader.read_u16()?;
        self.methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            self.methods.push(Method::parse(reader, &self.constant_pool)?);
        }
        self.attributes = read_attributes(reader)?;
        Ok(())
    }

    fn find_method(&self, name: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|method| self.constant_pool.utf8(method.name_index) == Some(name))
    }

    fn header_file_pos(&self) -> u32 {
        self.java_header
            .as_ref()
            .map(|header| header.borrow().info().file_pos())
            .unwrap_or(0)
    }

    /// Chunk-relative position of a method's serialized record.
    pub fn method_chunk_pos(&self, method_index: usize) -> u32 {
        let mut pos = self.info.file_pos() - self.header_file_pos() + self.methods_pos;
        for method in &self.methods[..method_index] {
            pos += method.binary_size();
        }
        pos
    }

    fn prepare(&mut self) {
        let mut size = 8u32 + 2 * self.constant_pool.entry_count() as u32;
        size += self.constant_pool.storage_size();
        self.methods_pos = size;
        for method in &self.methods {
            size += method.binary_size();
        }
        self.info.buffer_mut().set_len(size as usize);
    }

    fn link(&mut self, file: &ResourceFile) {
        let script = file.script();

        for index in 0..self.methods.len() {
            let name = match self.constant_pool.utf8(self.methods[index].name_index) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if self.methods[index].is_native() {
                let native_index = script
                    .borrow()
                    .native_method(&name)
                    .map(|binding| binding.index);
                let native_index = match native_index {
                    Some(native_index) => native_index,
                    None => {
                        file.set_error(BuildError::JavaNativeMethodNotFound(name));
                        return;
                    }
                };
                let descriptor = self
                    .constant_pool
                    .utf8(self.methods[index].descriptor_index)
                    .unwrap_or("");
                let rewind = stack_rewind(descriptor);
                if let MethodBody::Native {
                    stack_rewind: slot_rewind,
                    native_index: slot_index,
                } = &mut self.methods[index].body
                {
                    *slot_rewind = rewind;
                    *slot_index = native_index;
                }
            } else if self.main_class {
                let callback_index = script
                    .borrow()
                    .callback_method(&name)
                    .map(|binding| binding.index);
                if let Some(callback_index) = callback_index {
                    let method_pos = self.method_chunk_pos(index) as u16;
                    if let Some(header) = &self.java_header {
                        header.borrow_mut().set_callback(callback_index, method_pos);
                    }
                }
            }
        }

        for (pool_index, class_index, name_and_type_index) in
            self.constant_pool.methodref_targets()
        {
            let class_name = self
                .constant_pool
                .class_name(class_index)
                .unwrap_or("")
                .to_string();
            let method_name = self
                .constant_pool
                .name_and_type_name(name_and_type_index)
                .unwrap_or("")
                .to_string();
            let link = if class_name == OBJECT_CLASS && method_name == CONSTRUCTOR {
                MethodrefLink::ObjectInit
            } else {
                match self.resolve_method(file, &class_name, &method_name) {
                    Ok(method_pos) => MethodrefLink::Resolved(method_pos),
                    Err(error) => {
                        file.set_error(error);
                        return;
                    }
                }
            };
            self.constant_pool.set_methodref_link(pool_index, link);
        }

        if let Some(header) = &self.java_header {
            file.register_chunk(CHUNK_ID, priority::JAVA_HEADER, header.clone());
        }
    }

    fn resolve_method(
        &self,
        file: &ResourceFile,
        class_name: &str,
        method_name: &str,
    ) -> BuildResult<u16> {
        let mut seen: Vec<String> = Vec::new();
        if self.this_class_name() == Some(class_name) {
            if let Some(index) = self.find_method(method_name) {
                return Ok(self.method_chunk_pos(index) as u16);
            }
            seen.push(class_name.to_string());
            return match self.super_class_name() {
                Some(super_name) if !super_name.is_empty() => {
                    let super_name = super_name.to_string();
                    self.resolve_in(file, &super_name, method_name, &mut seen)
                }
                _ => Err(BuildError::JavaMethodNotFound(
                    class_name.to_string(),
                    method_name.to_string(),
                )),
            };
        }
        self.resolve_in(file, class_name, method_name, &mut seen)
    }

    /// Resolves a method in the named class, loading it (and climbing its
    /// superclass chain) on demand. `seen` guards against class cycles.
    fn resolve_in(
        &self,
        file: &ResourceFile,
        class_name: &str,
        method_name: &str,
        seen: &mut Vec<String>,
    ) -> BuildResult<u16> {
        if seen.iter().any(|name| name == class_name) {
            return Err(BuildError::JavaClassCycle(class_name.to_string()));
        }
        seen.push(class_name.to_string());
        let class = match file.find_java_class(class_name) {
            Some(class) => class,
            None => file.load_java_dependency(
                &self.dependency_path(class_name),
                self.java_header.clone(),
            )?,
        };
        let (found, super_name) = {
            let class = class.borrow();
            (
                class.find_method(method_name),
                class.super_class_name().map(str::to_string),
            )
        };
        if let Some(index) = found {
            return Ok(class.borrow().method_chunk_pos(index) as u16);
        }
        match super_name {
            Some(super_name) if !super_name.is_empty() => {
                self.resolve_in(file, &super_name, method_name, seen)
            }
            _ => Err(BuildError::JavaMethodNotFound(
                class_name.to_string(),
                method_name.to_string(),
            )),
        }
    }

    /// Dependencies load from the directory of the class that needs them.
    fn dependency_path(&self, class_name: &str) -> PathBuf {
        let dir = self.class_path.parent().unwrap_or_else(|| Path::new(""));
        dir.join(format!("{}.class", class_name))
    }

    fn serialize(&mut self) {
        let pool_count = self.constant_pool.entry_count() as u32;
        let pool_table_pos = 8u32;
        let storage_pos = pool_table_pos + 2 * pool_count;
        let methods_pos = self.methods_pos;

        let mut values: Vec<u16> = Vec::with_capacity(pool_count as usize);
        let mut storage: Vec<u8> = Vec::new();
        let mut storage_cursor = storage_pos;
        for entry in self.constant_pool.entries() {
            match entry {
                PoolEntry::Integer(value) => {
                    values.push(storage_cursor as u16);
                    storage.extend_from_slice(&value.to_le_bytes());
                    storage_cursor += 4;
                }
                PoolEntry::Methodref { link, .. } => values.push(match link {
                    MethodrefLink::ObjectInit => 0,
                    MethodrefLink::Resolved(method_pos) => *method_pos,
                    MethodrefLink::Unresolved => 0xFFFF,
                }),
                _ => values.push(0xFFFF),
            }
        }

        let class_address = (self.info.file_pos() - self.header_file_pos()) as u16;
        let methods = &self.methods;
        let buffer = self.info.buffer_mut();
        let mut pos = 2usize;
        pos = buffer.write_u16(pool_table_pos as u16, pos);
        pos = buffer.write_u16(storage_pos as u16, pos);
        pos = buffer.write_u16(methods_pos as u16, pos);
        for value in values {
            pos = buffer.write_u16(value, pos);
        }
        pos = buffer.write_bytes(&storage, pos);
        for method in methods {
            pos = buffer.write_u16(class_address, pos);
            pos = buffer.write_u16(method.access_flags, pos);
            match &method.body {
                MethodBody::Native {
                    stack_rewind,
                    native_index,
                } => {
                    pos = buffer.write_u16(*stack_rewind as u16, pos);
                    pos = buffer.write_u16(*native_index, pos);
                }
                MethodBody::Code {
                    max_stack,
                    max_locals,
                    bytecode,
                    ..
                } => {
                    pos = buffer.write_u16(*max_stack, pos);
                    pos = buffer.write_u16(*max_locals, pos);
                    pos = buffer.write_u16(bytecode.len() as u16, pos);
                    pos = buffer.write_bytes(bytecode, pos);
                }
            }
        }
        buffer.write_u16(pos as u16, 0);
    }

    /// Factory action for `-class`: a fresh java header plus the main class
    /// itself, both inserted and the shared chunk id registered.
    fn add_main_class(&self, file: &ResourceFile, parameter: &str) {
        let java_header = Rc::new(RefCell::new(JavaHeader::new()));
        file.add(java_header.clone());
        file.register_chunk(CHUNK_ID, priority::JAVA_HEADER, java_header.clone());

        let mut class = JavaClass::new();
        class.set_main_class();
        class.set_java_header(java_header);
        let loaded = class
            .load(Path::new(parameter))
            .and_then(|()| class.parse());
        match loaded {
            Ok(()) => {
                file.add_java_class(Rc::new(RefCell::new(class)));
            }
            Err(error) => file.set_error(error),
        }
    }
}

impl Default for JavaClass {
    fn default() -> JavaClass {
        JavaClass::new()
    }
}

impl Entry for JavaClass {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::JAVA_CLASS
    }

    fn on_event(&mut self, file: &ResourceFile, event: &mut Event) {
        match event {
            Event::Prepare { .. } => self.prepare(),
            Event::Link => self.link(file),
            Event::Serialize => self.serialize(),
            Event::Help => println!("{}", USAGE),
            Event::CommandLine {
                command,
                parameter,
                used,
                ..
            } => {
                if command.as_deref() == Some("class") {
                    self.add_main_class(file, parameter);
                    *used = true;
                }
            }
            _ => {}
        }
    }
}
