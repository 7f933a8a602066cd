use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::entry::{priority, Entry, EntryInfo};
use crate::error::prelude::*;
use crate::message::Event;
use crate::registry::ResourceFile;

const DEFAULT_SCRIPT: &str = "lsdefault.json";

const USAGE: &str = " -linkerscript:<filename.json> : Sets the linker script file\n \
-output:<filename> : Sets the output file name\n \
-verbose : Prints resource details while loading";

/// One native or callback method binding from the linker script.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodBinding {
    pub name: String,
    pub index: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkerSettings {
    pub fileformat: String,
    pub variable: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub startaddress: String,
}

impl Default for LinkerSettings {
    fn default() -> LinkerSettings {
        LinkerSettings {
            fileformat: String::new(),
            variable: String::from("resource_data"),
            type_name: String::from("const unsigned char"),
            startaddress: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ScriptFile {
    linker: LinkerSettings,
    java_native_methods: Vec<MethodBinding>,
    java_callback_methods: Vec<MethodBinding>,
}

/// Linker configuration. Lives in the factory list: claims the
/// `-linkerscript`, `-output` and `-verbose` switches and loads the script
/// file when the command line closes.
pub struct LinkerScript {
    info: EntryInfo,
    output_file_name: String,
    script_file_name: String,
    script: ScriptFile,
}

impl LinkerScript {
    pub fn new() -> LinkerScript {
        LinkerScript {
            info: EntryInfo::new(0, "linkerscript"),
            output_file_name: String::new(),
            script_file_name: String::new(),
            script: ScriptFile::default(),
        }
    }

    pub fn output_file_name(&self) -> &str {
        &self.output_file_name
    }

    pub fn output_file_format(&self) -> &str {
        &self.script.linker.fileformat
    }

    pub fn variable(&self) -> &str {
        &self.script.linker.variable
    }

    pub fn type_name(&self) -> &str {
        &self.script.linker.type_name
    }

    pub fn start_address(&self) -> &str {
        &self.script.linker.startaddress
    }

    pub fn native_method(&self, name: &str) -> Option<&MethodBinding> {
        self.script
            .java_native_methods
            .iter()
            .find(|binding| binding.name == name)
    }

    pub fn callback_method(&self, name: &str) -> Option<&MethodBinding> {
        self.script
            .java_callback_methods
            .iter()
            .find(|binding| binding.name == name)
    }

    pub fn max_callback_index(&self) -> u16 {
        self.script
            .java_callback_methods
            .iter()
            .map(|binding| binding.index)
            .max()
            .unwrap_or(0)
    }

    fn load(path: &Path) -> BuildResult<ScriptFile> {
        let text = fs::read_to_string(path).map_err(|_| BuildError::LinkerScriptLoad)?;
        serde_json::from_str(&text).map_err(|_| BuildError::LinkerScriptLoad)
    }

    fn close_command_line(&mut self, file: &ResourceFile) {
        let name = if self.script_file_name.is_empty() {
            String::from(DEFAULT_SCRIPT)
        } else {
            self.script_file_name.clone()
        };
        match LinkerScript::load(Path::new(&name)) {
            Ok(script) => self.script = script,
            Err(error) => file.set_error(error),
        }
    }
}

impl Default for LinkerScript {
    fn default() -> LinkerScript {
        LinkerScript::new()
    }
}

impl Entry for LinkerScript {
    fn info(&self) -> &EntryInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut EntryInfo {
        &mut self.info
    }

    fn priority(&self) -> u32 {
        priority::LINKER_SCRIPT
    }

    fn on_event(&mut self, file: &ResourceFile, event: &mut Event) {
        match event {
            Event::Help => println!("{}", USAGE),
            Event::CommandLine {
                command,
                parameter,
                used,
                ..
            } => match command.as_deref() {
                Some("linkerscript") => {
                    self.script_file_name = parameter.clone();
                    *used = true;
                }
                Some("output") => {
                    self.output_file_name = parameter.clone();
                    *used = true;
                }
                Some("verbose") => {
                    file.set_verbose(true);
                    *used = true;
                }
                None => self.close_command_line(file),
                _ => {}
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SCRIPT: &str = r#"{
        "linker": {
            "fileformat": "c-array",
            "variable": "boot_resources",
            "type": "const unsigned char",
            "startaddress": "0x20000"
        },
        "java_native_methods": [
            { "name": "beep", "index": 7 },
            { "name": "lcdWrite", "index": 12 }
        ],
        "java_callback_methods": [
            { "name": "run", "index": 1 },
            { "name": "onTimer", "index": 4 }
        ]
    }"#;

    fn parsed() -> LinkerScript {
        let mut script = LinkerScript::new();
        script.script = serde_json::from_str(SCRIPT).unwrap();
        script
    }

    #[test]
    fn settings_lookup() {
        let script = parsed();
        assert_eq!(script.output_file_format(), "c-array");
        assert_eq!(script.variable(), "boot_resources");
        assert_eq!(script.type_name(), "const unsigned char");
        assert_eq!(script.start_address(), "0x20000");
    }

    #[test]
    fn method_lookup() {
        let script = parsed();
        assert_eq!(script.native_method("beep").map(|b| b.index), Some(7));
        assert_eq!(script.native_method("lcdWrite").map(|b| b.index), Some(12));
        assert!(script.native_method("missing").is_none());
        assert_eq!(script.callback_method("onTimer").map(|b| b.index), Some(4));
        assert_eq!(script.max_callback_index(), 4);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let mut script = LinkerScript::new();
        script.script = serde_json::from_str(r#"{ "linker": { "fileformat": "binary" } }"#).unwrap();
        assert_eq!(script.output_file_format(), "binary");
        assert_eq!(script.variable(), "resource_data");
        assert_eq!(script.type_name(), "const unsigned char");
        assert_eq!(script.max_callback_index(), 0);
        assert!(script.native_method("beep").is_none());
    }

    #[test]
    fn empty_script_is_valid() {
        let script: ScriptFile = serde_json::from_str("{}").unwrap();
        assert!(script.linker.fileformat.is_empty());
        assert!(script.java_native_methods.is_empty());
    }
}
