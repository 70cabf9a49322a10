use anyhow::{Context, Result};
use tracing::debug;

/// Keychain service all FastEdge values are stored under
pub const SERVICE: &str = "fastedge";

/// Keychain entry holding the FastEdge API key
pub const API_KEY_ENTRY: &str = "apiKey";

/// Reads a value from the system keychain, `None` when no entry exists
///
/// # Errors
/// This function fails if keyring is unable to access the local system's keychain
pub fn read_from_keychain(key: &str) -> Result<Option<String>> {
    let entry = keyring::Entry::new(SERVICE, key).context("Failed to create keychain entry")?;

    match entry.get_password() {
        Ok(val) => Ok(Some(val)),
        Err(keyring::Error::NoEntry) => {
            debug!("No value stored in keychain matching service=\"{SERVICE}\", user=\"{key}\"");
            Ok(None)
        }
        Err(e) => Err(e).context(format!(
            "Failed to retrieve password from keychain (service: '{SERVICE}', user: '{key}')"
        )),
    }
}

/// Store a value in the system keychain as a password
///
/// # Errors
/// This function fails if keyring is unable to store a password
/// in the local system's keychain
pub fn write_to_keychain(key: &str, val: &str) -> Result<()> {
    let entry = keyring::Entry::new(SERVICE, key).context("Failed to create keychain entry")?;

    entry
        .set_password(val)
        .context("Failed to store password in keychain")?;

    debug!("Value stored in keychain service=\"{SERVICE}\", user=\"{key}\"");

    Ok(())
}

/// Removes a value stored in the system keychain as a password
///
/// # Errors
/// This function fails if keyring is unable to build the keychain entry
pub fn remove_from_keychain(key: &str) -> Result<()> {
    let entry = keyring::Entry::new(SERVICE, key).context("Failed to create keychain entry")?;

    match entry.delete_credential() {
        Ok(()) => (),
        Err(keyring::Error::NoEntry) => {
            debug!("No value stored in keychain matching service=\"{SERVICE}\", user=\"{key}\"");
        }
        Err(e) => anyhow::bail!(e),
    }

    Ok(())
}
