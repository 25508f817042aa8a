use std::path::PathBuf;

const APP_DIR_NAME: &str = "billing-ingest";

/// `$XDG_DATA_HOME/billing-ingest`, falling back to
/// `$HOME/.local/share/billing-ingest`.
pub fn default_data_home() -> Result<PathBuf, String> {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME")
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir).join(APP_DIR_NAME));
    }
    let home = std::env::var("HOME").map_err(|err| format!("resolve HOME: {}", err))?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join(APP_DIR_NAME))
}

/// `$XDG_CONFIG_HOME/billing-ingest`, falling back to
/// `$HOME/.config/billing-ingest`.
pub fn default_config_dir() -> Result<PathBuf, String> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME")
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir).join(APP_DIR_NAME));
    }
    let home = std::env::var("HOME").map_err(|err| format!("resolve HOME: {}", err))?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR_NAME))
}
