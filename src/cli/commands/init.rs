//! Init command: write a default configuration file.

use crate::cli::Output;
use crate::config::Settings;

/// Write the default configuration, refusing to overwrite an existing one.
pub fn run_init(settings: &Settings) -> anyhow::Result<()> {
    let path = Settings::default_config_path();

    if path.exists() {
        Output::warning(&format!("Configuration already exists at {:?}", path));
        return Ok(());
    }

    settings.save_to(&path)?;
    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.uploads_dir())?;

    Output::success(&format!("Wrote default configuration to {:?}", path));
    Output::info("Set OPENAI_API_KEY (or GEMINI_API_KEY) before starting the server.");
    Ok(())
}
