use anyhow::Result;
use fastedge_config::DebugContext;
use fastedge_debug::ContextPrompt;

use crate::utils::styles::fmt_dimmed;

/// Asks on the terminal which context to debug
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct InquirePrompt;

impl ContextPrompt for InquirePrompt {
    fn choose_debug_context(&self) -> Option<DebugContext> {
        let options = vec![DebugContext::File, DebugContext::Workspace];
        match inquire::Select::new("What would you like to debug?", options)
            .with_help_message("file builds the active file's crate or entry point, workspace builds the project root")
            .prompt_skippable()
        {
            Ok(choice) => choice,
            Err(e) => {
                tracing::debug!("Debug context prompt failed: {e}");
                None
            }
        }
    }
}

/// Prompts for a secret value, the input is masked
pub(crate) fn prompt_secret(msg: &str, default: Option<&str>) -> Result<String> {
    let mut prompt = inquire::Password::new(msg)
        .with_display_mode(inquire::PasswordDisplayMode::Masked)
        .without_confirmation();
    if default.is_some() {
        prompt = prompt.with_help_message("leave empty to use the token stored in the system keychain");
    } else {
        prompt = prompt.with_validator(inquire::required!("a value is required"));
    }

    let value = prompt.prompt()?;
    match default {
        Some(stored) if value.is_empty() => Ok(stored.to_string()),
        _ => Ok(value),
    }
}

pub(crate) fn prompt_url(msg: &str, default: &str) -> Result<String> {
    Ok(inquire::Text::new(msg)
        .with_default(default)
        .with_help_message(&fmt_dimmed("must be a valid url"))
        .with_validator(validators::url)
        .prompt()?)
}

pub(crate) mod validators {
    #[allow(clippy::unnecessary_wraps)]
    pub(crate) fn url(
        val: &str,
    ) -> Result<inquire::validator::Validation, inquire::CustomUserError> {
        if url::Url::parse(val).is_ok() {
            Ok(inquire::validator::Validation::Valid)
        } else {
            Ok(inquire::validator::Validation::Invalid(
                "invalid url".into(),
            ))
        }
    }
}
