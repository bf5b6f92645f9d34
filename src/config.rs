use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted application settings.
///
/// Loaded in precedence order: built-in defaults, then the user-level
/// config file, then a project-level `tubefydl.json`, then `TUBEFYDL_*`
/// environment variables. Explicit CLI flags override everything and are
/// applied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub output_dir: String,
    pub quality: String,
    pub parallel_workers: usize,
    pub max_retries: u32,
    pub theme: String,
    pub cookies_from_browser: Option<String>,
    pub use_parallel: bool,

    // "Don't ask again" flags for the interactive front end.
    pub ask_quality: bool,
    pub ask_output_dir: bool,
    pub ask_workers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: "downloads".to_string(),
            quality: "best".to_string(),
            parallel_workers: 3,
            max_retries: 3,
            theme: "dark".to_string(),
            cookies_from_browser: None,
            use_parallel: true,
            ask_quality: true,
            ask_output_dir: true,
            ask_workers: true,
        }
    }
}

/// A partial settings document, every field optional, so config files can
/// set only what they care about.
#[derive(Debug, Default, Deserialize)]
struct SettingsPatch {
    output_dir: Option<String>,
    quality: Option<String>,
    parallel_workers: Option<usize>,
    max_retries: Option<u32>,
    theme: Option<String>,
    cookies_from_browser: Option<String>,
    use_parallel: Option<bool>,
    ask_quality: Option<bool>,
    ask_output_dir: Option<bool>,
    ask_workers: Option<bool>,
}

impl SettingsPatch {
    fn apply(self, settings: &mut Settings) {
        if let Some(value) = self.output_dir {
            settings.output_dir = value;
        }
        if let Some(value) = self.quality {
            settings.quality = value;
        }
        if let Some(value) = self.parallel_workers {
            settings.parallel_workers = value;
        }
        if let Some(value) = self.max_retries {
            settings.max_retries = value;
        }
        if let Some(value) = self.theme {
            settings.theme = value;
        }
        if let Some(value) = self.cookies_from_browser {
            settings.cookies_from_browser = Some(value);
        }
        if let Some(value) = self.use_parallel {
            settings.use_parallel = value;
        }
        if let Some(value) = self.ask_quality {
            settings.ask_quality = value;
        }
        if let Some(value) = self.ask_output_dir {
            settings.ask_output_dir = value;
        }
        if let Some(value) = self.ask_workers {
            settings.ask_workers = value;
        }
    }
}

impl Settings {
    /// Loads settings from every source in precedence order.
    pub fn load() -> Self {
        let mut settings = Self::default();

        if let Some(path) = Self::user_config_path() {
            settings.merge_file(&path);
        }
        settings.merge_file(&Self::project_config_path());
        settings.merge_env_pairs(std::env::vars());

        settings
    }

    /// The user-level config file, `<config_dir>/tubefydl/config.json`.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tubefydl").join("config.json"))
    }

    /// The project-level override, `./tubefydl.json`.
    pub fn project_config_path() -> PathBuf {
        PathBuf::from("tubefydl.json")
    }

    /// Saves the current settings to the user-level config file.
    pub fn save_user(&self) -> std::io::Result<PathBuf> {
        let path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not find a valid config directory",
            )
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let value = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, value)?;
        Ok(path)
    }

    /// Saves the current settings to the project-level override file.
    pub fn save_project(&self) -> std::io::Result<PathBuf> {
        let path = Self::project_config_path();
        let value = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, value)?;
        Ok(path)
    }

    fn merge_file(&mut self, path: &Path) {
        if !path.is_file() {
            return;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Could not read config file {:?}: {}", path, e);
                return;
            }
        };

        match serde_json::from_str::<SettingsPatch>(&content) {
            Ok(patch) => patch.apply(self),
            Err(e) => log::warn!("Skipping malformed config file {:?}: {}", path, e),
        }
    }

    fn merge_env_pairs(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            match key.as_str() {
                "TUBEFYDL_OUTPUT_DIR" => self.output_dir = value,
                "TUBEFYDL_QUALITY" => self.quality = value,
                "TUBEFYDL_WORKERS" => {
                    if let Ok(workers) = value.parse() {
                        self.parallel_workers = workers;
                    }
                }
                "TUBEFYDL_RETRIES" => {
                    if let Ok(retries) = value.parse() {
                        self.max_retries = retries;
                    }
                }
                "TUBEFYDL_THEME" => self.theme = value,
                "TUBEFYDL_COOKIES" => self.cookies_from_browser = Some(value),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = Settings::default();
        assert_eq!(settings.output_dir, "downloads");
        assert_eq!(settings.quality, "best");
        assert_eq!(settings.parallel_workers, 3);
        assert!(settings.use_parallel);
        assert!(settings.ask_quality);
    }

    #[test]
    fn patch_only_overrides_present_fields() {
        let mut settings = Settings::default();
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"quality": "720p", "parallel_workers": 5}"#).unwrap();
        patch.apply(&mut settings);

        assert_eq!(settings.quality, "720p");
        assert_eq!(settings.parallel_workers, 5);
        assert_eq!(settings.output_dir, "downloads");
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn unknown_keys_in_config_files_are_ignored() {
        let patch: Result<SettingsPatch, _> =
            serde_json::from_str(r#"{"quality": "480p", "no_such_setting": 42}"#);
        assert!(patch.is_ok());
    }

    #[test]
    fn env_overrides_apply_with_type_checking() {
        let mut settings = Settings::default();
        let vars = vec![
            ("TUBEFYDL_QUALITY".to_string(), "1080p".to_string()),
            ("TUBEFYDL_WORKERS".to_string(), "8".to_string()),
            ("TUBEFYDL_RETRIES".to_string(), "not-a-number".to_string()),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ];
        settings.merge_env_pairs(vars.into_iter());

        assert_eq!(settings.quality, "1080p");
        assert_eq!(settings.parallel_workers, 8);
        assert_eq!(settings.max_retries, 3);
    }

    #[test]
    fn settings_round_trip_through_json() {
        let mut settings = Settings::default();
        settings.quality = "720p".to_string();
        settings.cookies_from_browser = Some("firefox".to_string());

        let json = serde_json::to_string(&settings).unwrap();
        let restored: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, restored);
    }
}
