//! Slash commands: parsing into a closed [`Command`] set and execution against
//! a [`SessionController`].

mod registry;

pub use registry::{all_commands, find_command, CommandSpec};

use tokio_util::sync::CancellationToken;

use crate::core::options::OptionKind;
use crate::core::reply::ResponseView;
use crate::core::session::SessionController;
use crate::ui::InputSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelArg {
    /// List models and prompt for a choice.
    Choose,
    Reset,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Reset,
    Clear,
    Stock,
    Persona(Option<String>),
    Custom(Option<String>),
    Model(ModelArg),
    Tools,
    SetOption(OptionKind, Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Message(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    ClearScreen,
    Quit,
}

/// Classifies one line of user input. Anything that is not a known slash
/// command is a chat message.
pub fn parse_input(input: &str) -> Input {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Input::Message(input.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return Input::Message(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    match find_command(name) {
        Some(spec) => Input::Command((spec.parse)(args)),
        None => Input::Message(input.to_string()),
    }
}

pub fn help_text() -> String {
    let width = all_commands()
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);
    let mut text = String::from("Commands:\n");
    for command in all_commands() {
        text.push_str(&format!("  {:width$}  {}\n", command.usage, command.help));
    }
    text.push_str("\nEnd a line with \\ to continue typing on the next line.");
    text
}

/// Uses `provided` or asks for the value; `None` when input ended.
async fn argument_or_prompt<I: InputSource + ?Sized>(
    provided: Option<String>,
    input: &mut I,
    prompt: &str,
) -> Option<String> {
    match provided {
        Some(value) => Some(value),
        None => input.read_line(prompt).await.ok().flatten(),
    }
}

pub async fn execute<V, I>(
    command: Command,
    session: &mut SessionController<V>,
    input: &mut I,
    cancel: &CancellationToken,
) -> CommandResult
where
    V: ResponseView,
    I: InputSource + ?Sized,
{
    // Turn failures are reported through the view by the session itself.
    match command {
        Command::Help => session.view_mut().notice(&help_text()),
        Command::Quit => return CommandResult::Quit,
        Command::Clear => return CommandResult::ClearScreen,
        Command::Reset => {
            session.view_mut().notice("Please wait while the model loads...");
            let _ = session.reset(cancel).await;
        }
        Command::Stock => session.stock(),
        Command::Persona(persona) => {
            if let Some(persona) = argument_or_prompt(persona, input, "Persona: ").await {
                let _ = session.set_persona(&persona, cancel).await;
            }
        }
        Command::Custom(prompt) => {
            if let Some(prompt) = argument_or_prompt(prompt, input, "System prompt: ").await {
                let _ = session.set_custom_prompt(&prompt, cancel).await;
            }
        }
        Command::Model(ModelArg::Reset) => {
            session.reset_model();
        }
        Command::Model(ModelArg::Name(name)) => {
            let _ = session.change_model(&name);
        }
        Command::Model(ModelArg::Choose) => {
            let current = format!("Current model: {}", session.model());
            let available = format!(
                "Available models: {}",
                session
                    .models()
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            session.view_mut().notice(&current);
            session.view_mut().notice(&available);
            if let Some(name) = argument_or_prompt(None, input, "Enter model name: ").await {
                if !name.trim().is_empty() {
                    let _ = session.change_model(&name);
                }
            }
        }
        Command::Tools => {
            session.toggle_tools();
        }
        Command::SetOption(kind, value) => {
            let value = argument_or_prompt(value, input, "Input new value: ")
                .await
                .unwrap_or_default();
            let _ = session.change_option(kind, &value);
        }
    }
    CommandResult::Continue
}
