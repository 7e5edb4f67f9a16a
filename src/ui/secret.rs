//! Reads credentials from the terminal without echoing them.

use std::io::{self, IsTerminal};

use dialoguer::Password;

use crate::commands::SecretPrompt;

pub struct HiddenSecretPrompt;

impl SecretPrompt for HiddenSecretPrompt {
    fn read_secret(&self, prompt: &str) -> io::Result<Option<String>> {
        if !io::stdin().is_terminal() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "input is not a terminal",
            ));
        }
        let secret = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(io::Error::other)?;
        let secret = secret.trim();
        Ok((!secret.is_empty()).then(|| secret.to_string()))
    }
}
