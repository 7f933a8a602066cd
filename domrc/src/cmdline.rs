use std::env;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::prelude::*;

/// One parsed switch: `-command:parameter,identifier,opt1,opt2`.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub command: String,
    pub parameter: String,
    pub identifier: String,
    pub options: Option<Vec<String>>,
    pub used: bool,
}

struct ResponseFile {
    name: String,
    lines: std::vec::IntoIter<String>,
}

/// Command-line tokenizer. Switches start with `-`; a bare argument names a
/// response file holding one switch per line (`;` starts a comment line).
/// Response files may nest; while one is open the working directory follows
/// it, so file parameters inside resolve relative to it.
pub struct CommandLine {
    parameters: Vec<Parameter>,
    switch_pattern: Regex,
}

impl CommandLine {
    pub fn new() -> CommandLine {
        CommandLine {
            parameters: Vec::new(),
            switch_pattern: Regex::new(r"^-(?P<command>[^:]*)(?::(?P<rest>.*))?$").unwrap(),
        }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.parameters
    }

    pub fn help_requested(&self) -> bool {
        self.parameters
            .iter()
            .any(|parameter| parameter.command == "help" || parameter.command == "?")
    }

    pub fn process(&mut self, arguments: &[String]) -> BuildResult<()> {
        let original_dir = env::current_dir().ok();
        let result = self.process_arguments(arguments, &original_dir);
        if let Some(dir) = original_dir {
            let _ = env::set_current_dir(dir);
        }
        result
    }

    fn process_arguments(
        &mut self,
        arguments: &[String],
        original_dir: &Option<PathBuf>,
    ) -> BuildResult<()> {
        let mut open_files: Vec<ResponseFile> = Vec::new();
        let mut argument_index = 0;
        loop {
            let argument = if let Some(file) = open_files.last_mut() {
                match file.lines.next() {
                    Some(line) => line,
                    None => {
                        open_files.pop();
                        let dir = match open_files.last() {
                            Some(previous) => Path::new(&previous.name)
                                .parent()
                                .map(|p| p.to_path_buf()),
                            None => original_dir.clone(),
                        };
                        if let Some(dir) = dir {
                            if !dir.as_os_str().is_empty() {
                                let _ = env::set_current_dir(dir);
                            }
                        }
                        continue;
                    }
                }
            } else if argument_index < arguments.len() {
                argument_index += 1;
                arguments[argument_index - 1].clone()
            } else {
                break;
            };

            let argument = argument.trim();
            if argument.is_empty() || argument.starts_with(';') {
                continue;
            }
            if argument.starts_with('-') {
                self.process_switch(argument);
            } else {
                self.open_response_file(argument, &mut open_files)?;
            }
        }
        Ok(())
    }

    fn process_switch(&mut self, argument: &str) {
        let captures = match self.switch_pattern.captures(argument) {
            Some(captures) => captures,
            None => return,
        };
        let command = captures
            .name("command")
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        let rest = captures.name("rest").map(|m| m.as_str()).unwrap_or("");
        let (parameter, identifier, options) = split_fields(rest);
        self.parameters.push(Parameter {
            command,
            parameter,
            identifier,
            options,
            used: false,
        });
    }

    fn open_response_file(
        &mut self,
        name: &str,
        open_files: &mut Vec<ResponseFile>,
    ) -> BuildResult<()> {
        if open_files.iter().any(|file| file.name == name) {
            return Err(BuildError::DuplicatedParameterFile(name.to_string()));
        }
        let mut file =
            File::open(name).map_err(|_| BuildError::ParameterFileOpen(name.to_string()))?;
        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|_| BuildError::FileRead(name.to_string()))?;
        let lines: Vec<String> = text.lines().map(|line| line.to_string()).collect();
        if let Some(dir) = Path::new(name).parent() {
            if !dir.as_os_str().is_empty() {
                let _ = env::set_current_dir(dir);
            }
        }
        open_files.push(ResponseFile {
            name: name.to_string(),
            lines: lines.into_iter(),
        });
        Ok(())
    }
}

impl Default for CommandLine {
    fn default() -> CommandLine {
        CommandLine::new()
    }
}

/// Splits the text after `-command:` into parameter, identifier and
/// options. The scan up to the first unquoted comma strips `"` quote
/// characters; the identifier and option fields split on plain commas.
fn split_fields(rest: &str) -> (String, String, Option<Vec<String>>) {
    let mut buffer: Vec<char> = rest.chars().collect();
    let mut inside_quote = false;
    let mut index = 0;
    let mut comma = None;
    while index < buffer.len() {
        if buffer[index] == '"' {
            buffer.remove(index);
            inside_quote = !inside_quote;
        } else if !inside_quote && buffer[index] == ',' {
            comma = Some(index);
            break;
        } else {
            index += 1;
        }
    }
    let comma = match comma {
        Some(comma) => comma,
        None => {
            let parameter: String = buffer.into_iter().collect();
            return (parameter.trim().to_string(), String::new(), None);
        }
    };
    let parameter: String = buffer[..comma].iter().collect::<String>().trim().to_string();
    let rest: Vec<char> = buffer[comma + 1..].to_vec();
    match rest.iter().position(|&c| c == ',') {
        Some(separator) => {
            let identifier: String =
                rest[..separator].iter().collect::<String>().trim().to_string();
            let options: Vec<String> = rest[separator + 1..]
                .iter()
                .collect::<String>()
                .split(',')
                .map(|option| option.trim().to_string())
                .collect();
            (parameter, identifier, Some(options))
        }
        None => {
            let identifier: String = rest.iter().collect::<String>().trim().to_string();
            (parameter, identifier, None)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn switch_with_parameter_only() {
        let mut cmdline = CommandLine::new();
        cmdline.process(&[String::from("-output:boot.bin")]).unwrap();
        assert_eq!(cmdline.parameters().len(), 1);
        assert_eq!(cmdline.parameters()[0].command, "output");
        assert_eq!(cmdline.parameters()[0].parameter, "boot.bin");
        assert_eq!(cmdline.parameters()[0].identifier, "");
        assert!(cmdline.parameters()[0].options.is_none());
    }

    #[test]
    fn switch_with_identifier_and_options() {
        let mut cmdline = CommandLine::new();
        cmdline
            .process(&[String::from("-bitmap:logo.bmp, logo, RGB565")])
            .unwrap();
        let parameter = &cmdline.parameters()[0];
        assert_eq!(parameter.command, "bitmap");
        assert_eq!(parameter.parameter, "logo.bmp");
        assert_eq!(parameter.identifier, "logo");
        assert_eq!(parameter.options, Some(vec![String::from("RGB565")]));
    }

    #[test]
    fn quoted_parameter_keeps_comma() {
        let mut cmdline = CommandLine::new();
        cmdline
            .process(&[String::from("-string:\"Hello, world\",msg")])
            .unwrap();
        let parameter = &cmdline.parameters()[0];
        assert_eq!(parameter.parameter, "Hello, world");
        assert_eq!(parameter.identifier, "msg");
    }

    #[test]
    fn command_is_lowercased() {
        let mut cmdline = CommandLine::new();
        cmdline.process(&[String::from("-WAVE:beep.wav")]).unwrap();
        assert_eq!(cmdline.parameters()[0].command, "wave");
    }

    #[test]
    fn help_detection() {
        let mut cmdline = CommandLine::new();
        cmdline.process(&[String::from("-?")]).unwrap();
        assert!(cmdline.help_requested());
        let mut cmdline = CommandLine::new();
        cmdline.process(&[String::from("-HELP")]).unwrap();
        assert!(cmdline.help_requested());
        let mut cmdline = CommandLine::new();
        cmdline.process(&[String::from("-verbose")]).unwrap();
        assert!(!cmdline.help_requested());
    }

    #[test]
    fn response_file_lines_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switches.txt");
        fs::write(
            &path,
            "; build switches\n-output:boot.bin\n\n-string:hello,greet\n",
        )
        .unwrap();
        let mut cmdline = CommandLine::new();
        cmdline
            .process(&[path.to_str().unwrap().to_string()])
            .unwrap();
        assert_eq!(cmdline.parameters().len(), 2);
        assert_eq!(cmdline.parameters()[0].command, "output");
        assert_eq!(cmdline.parameters()[1].command, "string");
    }

    #[test]
    fn nested_response_files() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner.txt");
        fs::write(&inner, "-verbose\n").unwrap();
        let outer = dir.path().join("outer.txt");
        fs::write(
            &outer,
            format!("-output:boot.bin\n{}\n-string:hi,greet\n", inner.display()),
        )
        .unwrap();
        let mut cmdline = CommandLine::new();
        cmdline
            .process(&[outer.to_str().unwrap().to_string()])
            .unwrap();
        let commands: Vec<&str> = cmdline
            .parameters()
            .iter()
            .map(|parameter| parameter.command.as_str())
            .collect();
        assert_eq!(commands, vec!["output", "verbose", "string"]);
    }

    #[test]
    fn duplicated_response_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.txt");
        fs::write(&path, format!("{}\n", path.display())).unwrap();
        let mut cmdline = CommandLine::new();
        let result = cmdline.process(&[path.to_str().unwrap().to_string()]);
        assert_eq!(
            result,
            Err(BuildError::DuplicatedParameterFile(
                path.display().to_string()
            ))
        );
    }

    #[test]
    fn missing_response_file() {
        let mut cmdline = CommandLine::new();
        let result = cmdline.process(&[String::from("/nonexistent/switches.txt")]);
        assert_eq!(
            result,
            Err(BuildError::ParameterFileOpen(String::from(
                "/nonexistent/switches.txt"
            )))
        );
    }

    #[test]
    fn field_splitting() {
        assert_eq!(
            split_fields("file.bin"),
            (String::from("file.bin"), String::new(), None)
        );
        assert_eq!(
            split_fields("file.bin,res"),
            (String::from("file.bin"), String::from("res"), None)
        );
        assert_eq!(
            split_fields("file.bmp,res,RGB565REV"),
            (
                String::from("file.bmp"),
                String::from("res"),
                Some(vec![String::from("RGB565REV")])
            )
        );
        assert_eq!(
            split_fields("a.bmp,r,opt1, opt2"),
            (
                String::from("a.bmp"),
                String::from("r"),
                Some(vec![String::from("opt1"), String::from("opt2")])
            )
        );
    }
}
