//! Interactive confirmations and value prompts.

use dialoguer::{theme::ColorfulTheme, Confirm, Input};

use crate::adapter::inbound::cli::output;
use crate::error::{ConfigError, Error, Result};

/// Ask a yes/no question; answering no aborts the command.
///
/// Skipped when `assume_yes` is set. Prompting is refused in JSON mode,
/// where nobody is there to answer.
pub fn ask_yes_no(question: &str, assume_yes: bool) -> Result<()> {
    if assume_yes {
        return Ok(());
    }
    require_interactive()?;

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .interact()?;

    if confirmed {
        Ok(())
    } else {
        Err(Error::Aborted)
    }
}

/// Ask for the initial value of a testdata variable.
pub fn ask_value(variable: &str) -> Result<String> {
    require_interactive()?;

    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("initial value for \"{variable}\""))
        .allow_empty(true)
        .interact_text()?;

    Ok(value.trim().to_string())
}

fn require_interactive() -> Result<()> {
    if output::is_json() {
        return Err(ConfigError::Other(
            "cannot prompt in JSON mode; pass --yes and -T KEY=VALUE".into(),
        )
        .into());
    }
    Ok(())
}
