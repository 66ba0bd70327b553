use std::io::IsTerminal;

/// Reports whether the process streams are attached to a terminal.
pub trait TerminalClient {
    /// Returns whether stdout is a terminal.
    fn stdout_is_terminal(&self) -> bool;

    /// Returns whether stderr is a terminal.
    fn stderr_is_terminal(&self) -> bool;
}

/// Terminal client backed by the real process streams.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        std::io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        std::io::stderr().is_terminal()
    }
}
