//! Terminal collaborators: the renderer the session writes replies to and the
//! line source the command loop reads from.

use std::io;

use async_trait::async_trait;

pub mod input;
pub mod terminal;

pub use input::StdinInput;
pub use terminal::TerminalView;

#[async_trait]
pub trait InputSource: Send {
    /// Reads one logical line after showing `prompt`. `None` means input has
    /// ended.
    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}
