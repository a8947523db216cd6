//! Config command handler.

use anyhow::Result;

use chatdeck::config::Settings;

/// Print the settings path, or the effective settings with secrets masked.
pub(crate) fn cmd_config(settings: &Settings, path_only: bool) -> Result<()> {
    if path_only {
        println!("{}", Settings::path().display());
        return Ok(());
    }

    let mut shown = settings.clone();
    if !shown.llama_cpp.api_key.is_empty() {
        shown.llama_cpp.api_key = "********".to_string();
    }
    println!("# {}", Settings::path().display());
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}
