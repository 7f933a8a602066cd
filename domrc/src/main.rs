use std::env;
use std::process::exit;

use console::style;

use domrc::cmdline::CommandLine;
use domrc::error::BuildError;
use domrc::message::Event;
use domrc::output;
use domrc::registry::ResourceFile;

fn main() {
    exit(run());
}

fn run() -> i32 {
    println!("{}", domrc::PROGRAM_TITLE);

    let file = ResourceFile::new();
    file.register_factories();

    let mut command_line = CommandLine::new();
    let arguments: Vec<String> = env::args().skip(1).collect();
    if let Err(error) = command_line.process(&arguments) {
        file.set_error(error);
    }

    if !file.is_error() && command_line.help_requested() {
        println!("{}", domrc::USAGE);
        file.broadcast_factory(&mut Event::Help);
        return 0;
    }

    if !file.is_error() {
        for index in 0..command_line.parameters().len() {
            let parameter = command_line.parameters()[index].clone();
            let mut event = Event::CommandLine {
                command: Some(parameter.command),
                parameter: parameter.parameter,
                identifier: parameter.identifier,
                options: parameter.options,
                used: parameter.used,
            };
            file.broadcast_factory(&mut event);
            if let Event::CommandLine { used, .. } = event {
                command_line.parameters_mut()[index].used = used;
            }
        }
        for parameter in command_line.parameters() {
            if !parameter.used {
                file.set_error(BuildError::UnusedParameter(
                    parameter.command.clone(),
                    parameter.parameter.clone(),
                ));
            }
        }
    }

    if !file.is_error() {
        // closing event: the linker script loads here
        file.broadcast_factory(&mut Event::CommandLine {
            command: None,
            parameter: String::new(),
            identifier: String::new(),
            options: None,
            used: false,
        });
    }

    if !file.is_error() {
        file.broadcast(&mut Event::Prepare { file_pos: 0 });
    }
    if !file.is_error() {
        file.broadcast(&mut Event::Link);
    }
    if !file.is_error() {
        file.broadcast(&mut Event::Serialize);
    }
    if !file.is_error() {
        file.broadcast(&mut Event::UpdateCrc);
    }
    if !file.is_error() {
        if let Err(error) = output::save(&file) {
            file.set_error(error);
        }
    }

    if file.is_error() {
        println!(
            "{} {}",
            style("ERROR:").red().bright(),
            file.error_message().unwrap_or_default()
        );
        return 1;
    }

    let script = file.script();
    let script = script.borrow();
    println!(
        "{} File name:{}, type:{}, size:{} bytes",
        style("Success.").green().bright(),
        script.output_file_name(),
        script.output_file_format(),
        file.binary_size()
    );
    0
}
