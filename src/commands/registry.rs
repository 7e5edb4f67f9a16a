use super::{CommandContext, CommandResult};

pub type CommandHandler = fn(&mut CommandContext<'_>, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

/// Arguments after the command name, trimmed.
#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "model",
        usage: "/model <provider>:<model>",
        help: "Show or switch the active provider and model.",
        handler: super::handle_model,
    },
    Command {
        name: "key",
        usage: "/key <provider>",
        help: "Store the credential for a provider; it is typed without echo.",
        handler: super::handle_key,
    },
    Command {
        name: "config",
        usage: "/config",
        help: "Print the active configuration.",
        handler: super::handle_config,
    },
    Command {
        name: "exit",
        usage: "/exit",
        help: "Leave the session.",
        handler: super::handle_exit,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave the session.",
        handler: super::handle_exit,
    },
];
