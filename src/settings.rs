use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdfpane";

pub const API_URL_ENV: &str = "PDFPANE_API_URL";
pub const SESSION_TOKEN_ENV: &str = "PDFPANE_SESSION_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Base URL of the file API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Value of the API's `token` session cookie
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// Where rendered pages are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub render_annotations: bool,

    /// Optional `"INK:PAPER"` hex recoloring, e.g. `"DCD7BA:1F1F28"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_tint: Option<String>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("pdfpane-out")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            api_url: default_api_url(),
            session_token: None,
            output_dir: default_output_dir(),
            render_annotations: false,
            page_tint: None,
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));
/// File the settings were last loaded from; saves go back there
static LOADED_FROM: RwLock<Option<PathBuf>> = RwLock::new(None);

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from the platform config directory, creating the file with
/// defaults on first run
pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };

    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

pub fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
                if let Ok(mut loaded_from) = LOADED_FROM.write() {
                    *loaded_from = Some(path.to_path_buf());
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Future migrations go here:
    // if settings.version < 2 {
    //     migrate_v1_to_v2(settings);
    // }

    settings.version = CURRENT_VERSION;
}

/// Write the current settings back to the file they came from
pub fn save_settings() {
    let path = LOADED_FROM
        .read()
        .ok()
        .and_then(|path| path.clone())
        .or_else(preferred_config_path);
    let Some(path) = path else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };

    if let Ok(settings) = SETTINGS.read() {
        save_settings_to_file(&settings, &path);
    }
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let body = match serde_yaml::to_string(settings) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };

    match fs::write(path, format!("{SETTINGS_HEADER}{body}")) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

const SETTINGS_HEADER: &str = "# pdfpane settings
#
# api_url            base URL of the file API (overridden by PDFPANE_API_URL)
# session_token      value of the API `token` cookie (overridden by PDFPANE_SESSION_TOKEN)
# output_dir         where rendered pages are written
# render_annotations draw annotations and form widgets
# page_tint          optional \"INK:PAPER\" hex recoloring, e.g. \"DCD7BA:1F1F28\"

";

// Public API for accessing settings

/// Snapshot of the loaded settings
pub fn current() -> Settings {
    SETTINGS
        .read()
        .map(|s| s.clone())
        .unwrap_or_default()
}

/// API base URL; a non-empty `PDFPANE_API_URL` wins over the file
pub fn get_api_url() -> String {
    env_override(API_URL_ENV).unwrap_or_else(|| {
        SETTINGS
            .read()
            .map(|s| s.api_url.clone())
            .unwrap_or_else(|_| default_api_url())
    })
}

pub fn get_session_token() -> Option<String> {
    env_override(SESSION_TOKEN_ENV).or_else(|| {
        SETTINGS
            .read()
            .ok()
            .and_then(|s| s.session_token.clone())
    })
}

/// Store (or clear) the session token after a login or logout
pub fn set_session_token(token: Option<String>) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.session_token = token;
    }
    save_settings();
}

pub fn get_output_dir() -> PathBuf {
    SETTINGS
        .read()
        .map(|s| s.output_dir.clone())
        .unwrap_or_else(|_| default_output_dir())
}

/// Unset, blank and the literal `undefined` all count as missing
fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != "undefined")
}
