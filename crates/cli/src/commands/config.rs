//! `switchyard config`: show or initialize configuration.

use switchyard_config::AppConfig;

use super::{CmdResult, load_config};

/// Print the effective configuration; secrets stay redacted.
pub async fn show() -> CmdResult {
    let config = load_config()?;
    println!("{config:#?}");
    Ok(())
}

/// Write the default config file unless one exists.
pub async fn init(force: bool) -> CmdResult {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("   Use --force to overwrite it.");
        return Ok(());
    }
    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
