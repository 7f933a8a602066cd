use thiserror::Error;

pub mod prelude {
    pub use super::{BuildError, BuildResult};
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Every user-facing failure of the link pipeline. The messages are printed
/// verbatim behind a single `ERROR: ` prefix in `main`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("Unused or unknown parameter: -{0}:{1}")]
    UnusedParameter(String, String),
    #[error("Can't open parameter file. ({0})")]
    ParameterFileOpen(String),
    #[error("Can't open resource file. ({0})")]
    ResourceFileOpen(String),
    #[error("Can't read file. ({0})")]
    FileRead(String),
    #[error("Duplicated parameter file: ({0}).")]
    DuplicatedParameterFile(String),
    #[error("Linker script load error")]
    LinkerScriptLoad,
    #[error("Java method not found ({0}.{1})")]
    JavaMethodNotFound(String, String),
    #[error("Java native method not found ({0})")]
    JavaNativeMethodNotFound(String),
    #[error("Java class dependency cycle detected ({0})")]
    JavaClassCycle(String),
    #[error("Invalid Java class file ({0})")]
    InvalidClassFile(String),
    #[error("Unsupported constant pool tag ({0})")]
    UnsupportedPoolTag(u8),
    #[error("Resource file format or name not specified")]
    OutputNotSpecified,
    #[error("Invalid WAV file parameters (only 8kHz, 8bit, mono supported)")]
    InvalidWaveFile,
    #[error("Resource identifier already exists. ({0})")]
    DuplicateIdentifier(String),
    #[error("FNA file ({0}) is invalid at line {1}.")]
    InvalidFnaFile(String, usize),
    #[error("Invalid option ({0}).")]
    InvalidOption(String),
    #[error("Unexpected end of data")]
    UnexpectedEndOfData,
    #[error("Can't create output file. ({0})")]
    OutputFileCreate(String),
}
