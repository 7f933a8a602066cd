/// One broadcast event. The pipeline phases carry their cursor/state in the
/// variant payload so every handler sees the value left by the previous one.
#[derive(Debug)]
pub enum Event {
    /// Sizing pass; `file_pos` is the running absolute position counter.
    Prepare { file_pos: u32 },
    /// Cross-entry resolution (method references, callback table).
    Link,
    /// Fill the prepared buffers.
    Serialize,
    /// Recompute and patch the whole-file checksum.
    UpdateCrc,
    /// Factory event: print per-switch usage.
    Help,
    /// Factory event: one command-line switch. `command` is `None` for the
    /// closing event sent after the last switch.
    CommandLine {
        command: Option<String>,
        parameter: String,
        identifier: String,
        options: Option<Vec<String>>,
        used: bool,
    },
}
