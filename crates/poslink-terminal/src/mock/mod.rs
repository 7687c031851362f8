//! Mock terminal for testing and development without hardware.

mod terminal;

pub use terminal::{MockCall, MockTerminal, MockTerminalHandle};
