use std::fs;
use std::path::{Path, PathBuf};

use billing_core::Source;
use serde::{Deserialize, Serialize};

use crate::dirs;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_MONTHS: u32 = 2;
const DEFAULT_BATCH_SIZE: usize = 2_000;

/// Run settings plus the source list handed over by account discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Tenant databases live here, one file per schema.
    pub data_dir: PathBuf,
    pub staging_dir: PathBuf,
    #[serde(default = "default_months")]
    pub months: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub sources: Vec<Source>,
}

fn default_months() -> u32 {
    DEFAULT_MONTHS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl CliConfig {
    fn with_base(base: &Path) -> Self {
        Self {
            data_dir: base.join("data"),
            staging_dir: base.join("staging"),
            months: DEFAULT_MONTHS,
            batch_size: DEFAULT_BATCH_SIZE,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: CliConfig,
    pub file: PathBuf,
    pub created: bool,
}

pub fn load_or_create(path: Option<&Path>) -> Result<ConfigLoad, String> {
    let file = match path {
        Some(path) => path.to_path_buf(),
        None => dirs::default_config_dir()?.join(CONFIG_FILE_NAME),
    };
    let base = dirs::default_data_home()?;
    load_or_create_at(&file, &base)
}

fn load_or_create_at(file: &Path, base: &Path) -> Result<ConfigLoad, String> {
    if file.exists() {
        let contents = fs::read_to_string(file)
            .map_err(|err| format!("read config {}: {}", file.display(), err))?;
        let config: CliConfig = toml::from_str(&contents)
            .map_err(|err| format!("parse config {}: {}", file.display(), err))?;
        return Ok(ConfigLoad {
            config,
            file: file.to_path_buf(),
            created: false,
        });
    }

    if let Some(dir) = file.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .map_err(|err| format!("create config dir {}: {}", dir.display(), err))?;
    }
    let config = CliConfig::with_base(base);
    let contents =
        toml::to_string_pretty(&config).map_err(|err| format!("serialize config: {}", err))?;
    fs::write(file, contents).map_err(|err| format!("write config {}: {}", file.display(), err))?;

    Ok(ConfigLoad {
        config,
        file: file.to_path_buf(),
        created: true,
    })
}
