//! Slash commands typed at the session prompt.
//!
//! Commands run synchronously between responses and never start a stream.

mod registry;

pub use registry::{all_commands, find_command, Command, CommandInvocation};

use std::io::{self, Write};

use tracing::{info, warn};

use crate::core::config::SettingsStore;
use crate::core::credentials::CredentialStore;
use crate::core::error::SessionError;
use crate::core::providers::{find_builtin_provider, known_provider_ids, ModelSelection};
use crate::core::session::Session;

/// Asks the user for a secret without echoing it.
pub trait SecretPrompt: Send + Sync {
    /// `None` when nothing was entered.
    fn read_secret(&self, prompt: &str) -> io::Result<Option<String>>;
}

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    pub session: &'a mut Session,
    pub credentials: &'a dyn CredentialStore,
    pub secrets: &'a dyn SecretPrompt,
    pub settings_store: &'a SettingsStore,
    pub out: &'a mut dyn Write,
    pub dev: bool,
}

impl CommandContext<'_> {
    fn say(&mut self, message: impl AsRef<str>) {
        if let Err(err) = writeln!(self.out, "{}", message.as_ref()) {
            warn!(error = %err, "failed to write command output");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    Exit,
    ProcessAsMessage(String),
}

/// Whether `input` is handled here rather than sent to the model.
pub fn is_command(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.starts_with('/') || is_bare_exit(trimmed)
}

fn is_bare_exit(trimmed: &str) -> bool {
    trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit")
}

pub fn process_input(ctx: &mut CommandContext<'_>, input: &str) -> CommandResult {
    let trimmed = input.trim();

    if is_bare_exit(trimmed) {
        ctx.session.request_exit();
        return CommandResult::Exit;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let (command_name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match find_command(command_name) {
        Some(command) => {
            (command.handler)(ctx, CommandInvocation { args })
        }
        None => {
            ctx.say(format!(
                "Unknown command: /{command_name}. Type /help for the list of commands."
            ));
            CommandResult::Continue
        }
    }
}

pub(super) fn handle_help(
    ctx: &mut CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let mut help = String::from("Commands:");
    for command in all_commands() {
        help.push_str(&format!("\n  {:<28} {}", command.usage, command.help));
    }
    help.push_str("\nAny other line is sent to the model. Press any key to interrupt a response.");
    ctx.say(help);
    CommandResult::Continue
}

pub(super) fn handle_model(
    ctx: &mut CommandContext<'_>,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    if invocation.args.is_empty() {
        let current = ctx
            .session
            .settings()
            .model_label()
            .unwrap_or_else(|| "(none)".to_string());
        ctx.say(format!(
            "Current model: {current}\nUsage: /model <provider>:<model> or /model <provider> <model>"
        ));
        return CommandResult::Continue;
    }

    let Some(selection) = ModelSelection::parse(invocation.args) else {
        ctx.say("Usage: /model <provider>:<model> or /model <provider> <model>");
        return CommandResult::Continue;
    };
    let Some(provider) = find_builtin_provider(&selection.provider) else {
        ctx.say(format!(
            "Unknown provider '{}'. Known providers: {}",
            selection.provider,
            known_provider_ids().join(", ")
        ));
        return CommandResult::Continue;
    };

    let selection = ModelSelection {
        provider: provider.id,
        model: selection.model,
    };
    ctx.session.set_model(&selection);
    info!(model = %selection, "model selected");

    match ctx.settings_store.save(ctx.session.settings()) {
        Ok(()) => ctx.say(format!("Model set to {selection}.")),
        Err(err) => {
            warn!(error = %err, "failed to persist model selection");
            let message = SessionError::Persistence(err.to_string()).user_message();
            ctx.say(format!("Model set to {selection} for this session. {message}"));
        }
    }
    CommandResult::Continue
}

pub(super) fn handle_key(
    ctx: &mut CommandContext<'_>,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let mut parts = invocation.args.split_whitespace();
    let (Some(provider_id), inline_secret, None) = (parts.next(), parts.next(), parts.next()) else {
        ctx.say("Usage: /key <provider>");
        return CommandResult::Continue;
    };
    let Some(provider) = find_builtin_provider(provider_id) else {
        ctx.say(format!(
            "Unknown provider '{provider_id}'. Known providers: {}",
            known_provider_ids().join(", ")
        ));
        return CommandResult::Continue;
    };

    let secret = match inline_secret {
        Some(secret) => secret.to_string(),
        None => match ctx
            .secrets
            .read_secret(&format!("{} credential", provider.display_name))
        {
            Ok(Some(secret)) => secret,
            Ok(None) => {
                ctx.say("No credential entered; nothing stored.");
                return CommandResult::Continue;
            }
            Err(err) => {
                warn!(provider = %provider.id, error = %err, "could not read credential");
                ctx.say(format!(
                    "Could not read the credential ({err}). Use /key {} <secret> instead.",
                    provider.id
                ));
                return CommandResult::Continue;
            }
        },
    };

    match ctx.credentials.set(&provider.id, &secret) {
        Ok(()) => {
            info!(provider = %provider.id, store = ctx.credentials.describe(), "credential stored");
            ctx.say(format!("Stored credential for {}.", provider.display_name));
        }
        Err(err) => {
            warn!(provider = %provider.id, error = %err, "failed to store credential");
            ctx.say(SessionError::Persistence(err.to_string()).user_message());
        }
    }
    CommandResult::Continue
}

pub(super) fn handle_config(
    ctx: &mut CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let summary = ctx
        .session
        .settings()
        .summary("chat", ctx.dev, ctx.settings_store.path());
    ctx.say(summary);
    CommandResult::Continue
}

pub(super) fn handle_exit(
    ctx: &mut CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    ctx.session.request_exit();
    CommandResult::Exit
}
