use std::error::Error;
use std::fmt;

use keyring::Entry;

use super::credentials::{CredentialResult, CredentialStore};

const KEYRING_SERVICE: &str = "subconscious";
const PROBE_ACCOUNT: &str = "__probe__";

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked or inaccessible). Permanent errors surface the underlying
/// cause directly so callers can report them to the user.
#[derive(Debug)]
pub enum KeyringAccessError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl KeyringAccessError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringAccessError::Recoverable(err) | KeyringAccessError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<keyring::Error> for KeyringAccessError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

impl fmt::Display for KeyringAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner())
    }
}

impl Error for KeyringAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

/// Secrets stored under the `subconscious` service, one entry per provider.
#[derive(Debug, Default)]
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(provider_id: &str) -> Result<Entry, KeyringAccessError> {
        Entry::new(KEYRING_SERVICE, &provider_id.to_ascii_lowercase()).map_err(Into::into)
    }

    /// Reads a sentinel entry; a missing entry still proves the backend works.
    pub fn probe(&self) -> Result<(), KeyringAccessError> {
        match Self::entry(PROBE_ACCOUNT)?.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, provider_id: &str) -> CredentialResult<Option<String>> {
        match Self::entry(provider_id)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(Box::new(KeyringAccessError::from(err))),
        }
    }

    fn set(&self, provider_id: &str, secret: &str) -> CredentialResult<()> {
        Self::entry(provider_id)?
            .set_password(secret)
            .map_err(|err| KeyringAccessError::from(err).into())
    }

    fn describe(&self) -> &'static str {
        "system keyring"
    }
}
