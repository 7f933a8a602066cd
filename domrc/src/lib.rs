pub mod buffer;
pub mod cmdline;
pub mod crc;
pub mod entry;
pub mod error;
pub mod header;
pub mod java;
pub mod message;
pub mod output;
pub mod registry;
pub mod resources;
pub mod script;

pub const PROGRAM_TITLE: &str = "*** domrc Embedded Resource Linker ***";

pub const USAGE: &str = "Usage: domrc <-switches> <switchfile>\n \
The 'switchfile' is a text file and one line of this file must contain one\n \
command line switch.\n \
Supported switches:\n \
-help or -? - Displays help message";
