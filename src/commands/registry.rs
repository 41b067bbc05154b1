use super::{Command, ModelArg};
use crate::core::options::OptionKind;

pub type CommandParser = fn(&str) -> Command;

pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub help: &'static str,
    pub parse: CommandParser,
}

pub fn all_commands() -> &'static [CommandSpec] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    all_commands().iter().find(|command| {
        command.name.eq_ignore_ascii_case(name)
            || command
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    })
}

fn optional_arg(args: &str) -> Option<String> {
    let args = args.trim();
    (!args.is_empty()).then(|| args.to_string())
}

fn parse_model(args: &str) -> Command {
    match args.trim() {
        "" => Command::Model(ModelArg::Choose),
        "reset" => Command::Model(ModelArg::Reset),
        name => Command::Model(ModelArg::Name(name.to_string())),
    }
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        aliases: &[],
        usage: "/help",
        help: "Show this list of commands.",
        parse: |_| Command::Help,
    },
    CommandSpec {
        name: "quit",
        aliases: &["exit"],
        usage: "/quit, /exit",
        help: "Exit the program.",
        parse: |_| Command::Quit,
    },
    CommandSpec {
        name: "reset",
        aliases: &[],
        usage: "/reset",
        help: "Restore the default model, options, and personality, then start over.",
        parse: |_| Command::Reset,
    },
    CommandSpec {
        name: "clear",
        aliases: &[],
        usage: "/clear",
        help: "Clear the screen. The conversation is kept.",
        parse: |_| Command::Clear,
    },
    CommandSpec {
        name: "stock",
        aliases: &["default"],
        usage: "/stock, /default",
        help: "Drop the system prompt and talk to the model with stock settings.",
        parse: |_| Command::Stock,
    },
    CommandSpec {
        name: "persona",
        aliases: &[],
        usage: "/persona [text]",
        help: "Adopt a persona. Prompts for one when omitted.",
        parse: |args| Command::Persona(optional_arg(args)),
    },
    CommandSpec {
        name: "custom",
        aliases: &[],
        usage: "/custom [text]",
        help: "Use a custom system prompt verbatim.",
        parse: |args| Command::Custom(optional_arg(args)),
    },
    CommandSpec {
        name: "model",
        aliases: &[],
        usage: "/model [name|reset]",
        help: "Switch models, or return to the default with `reset`.",
        parse: parse_model,
    },
    CommandSpec {
        name: "tools",
        aliases: &[],
        usage: "/tools",
        help: "Toggle tool calling for new messages.",
        parse: |_| Command::Tools,
    },
    CommandSpec {
        name: "temperature",
        aliases: &[],
        usage: "/temperature [0-1]",
        help: "Set the sampling temperature.",
        parse: |args| Command::SetOption(OptionKind::Temperature, optional_arg(args)),
    },
    CommandSpec {
        name: "top_p",
        aliases: &[],
        usage: "/top_p [0-1]",
        help: "Set nucleus sampling top_p.",
        parse: |args| Command::SetOption(OptionKind::TopP, optional_arg(args)),
    },
    CommandSpec {
        name: "repeat_penalty",
        aliases: &[],
        usage: "/repeat_penalty [0-2]",
        help: "Set the repetition penalty.",
        parse: |args| Command::SetOption(OptionKind::RepeatPenalty, optional_arg(args)),
    },
];
