use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use gpui::*;
use gpui_component::{Theme, ThemeMode, ThemeRegistry};
use parley_backend::BackendEndpoints;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_REGION: &str = "ap-south-1";
pub const SETTINGS_DIRECTORY_NAME: &str = "parley";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "PARLEY_";

/// Connection and appearance settings for the client.
///
/// `auth_url` / `graphql_url` take precedence over the hosted URLs derived from
/// `subdomain` and `region`, which is how a local Nhost stack is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default)]
    pub subdomain: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub graphql_url: Option<String>,
    #[serde(
        default = "default_theme_mode",
        serialize_with = "serialize_theme_mode",
        deserialize_with = "deserialize_theme_mode"
    )]
    pub theme_mode: ThemeMode,
    #[serde(default)]
    pub theme_name: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            subdomain: String::new(),
            region: default_region(),
            auth_url: None,
            graphql_url: None,
            theme_mode: default_theme_mode(),
            theme_name: String::new(),
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        self.subdomain = self.subdomain.trim().to_string();
        self.region = if self.region.trim().is_empty() {
            default_region()
        } else {
            self.region.trim().to_string()
        };
        self.auth_url = non_blank(self.auth_url);
        self.graphql_url = non_blank(self.graphql_url);
        self.theme_name = self.theme_name.trim().to_string();
        self
    }

    /// Resolves the service URLs, preferring explicit overrides per service.
    pub fn endpoints(&self) -> Result<BackendEndpoints, SettingsError> {
        let hosted = (!self.subdomain.is_empty())
            .then(|| BackendEndpoints::from_subdomain(&self.subdomain, &self.region));

        let auth_url = self
            .auth_url
            .clone()
            .or_else(|| hosted.as_ref().map(|endpoints| endpoints.auth_url.clone()));
        let graphql_url = self
            .graphql_url
            .clone()
            .or_else(|| hosted.as_ref().map(|endpoints| endpoints.graphql_url.clone()));

        match (auth_url, graphql_url) {
            (Some(auth_url), Some(graphql_url)) => Ok(BackendEndpoints::new(auth_url, graphql_url)),
            _ => MissingProjectSnafu {
                stage: "resolve-endpoints",
            }
            .fail(),
        }
    }

    pub fn apply_theme(&self, window: Option<&mut Window>, cx: &mut App) {
        if let Some(theme_config) = ThemeRegistry::global(cx)
            .themes()
            .get(&SharedString::from(self.theme_name.clone()))
            .cloned()
        {
            let mode = theme_config.mode;
            let theme = Theme::global_mut(cx);
            if mode.is_dark() {
                theme.dark_theme = theme_config;
            } else {
                theme.light_theme = theme_config;
            }
            Theme::change(mode, window, cx);
            return;
        }

        Theme::change(self.theme_mode, window, cx);
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads settings from `config_path`, falling back to defaults when the file is
    /// unreadable.
    pub fn new(config_path: PathBuf) -> Self {
        let settings = match Self::load_from_disk(&config_path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(path = ?config_path, %error, "using default settings");
                ClientSettings::default()
            }
        };

        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ClientSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Defaults, then the JSON file (when present), then `PARLEY_*` variables.
    fn load_from_disk(path: &Path) -> Result<ClientSettings, SettingsError> {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let settings = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract::<ClientSettings>()
            .context(ExtractSnafu {
                stage: "extract-settings",
                path: path.to_path_buf(),
            })?;

        Ok(settings.normalized())
    }

    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to read settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: figment::Error,
    },
    #[snafu(display(
        "no backend configured on `{stage}`: set `subdomain` or both `auth_url` and `graphql_url`"
    ))]
    MissingProject { stage: &'static str },
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_theme_mode() -> ThemeMode {
    ThemeMode::Light
}

fn serialize_theme_mode<S>(value: &ThemeMode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.name())
}

fn deserialize_theme_mode<'de, D>(deserializer: D) -> Result<ThemeMode, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(parse_theme_mode(&value))
}

fn parse_theme_mode(value: &str) -> ThemeMode {
    if value.trim().eq_ignore_ascii_case("dark") {
        ThemeMode::Dark
    } else {
        ThemeMode::Light
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults_without_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE_NAME));

        let settings = store.settings();
        assert_eq!(settings.region, DEFAULT_REGION);
        assert!(matches!(
            settings.endpoints(),
            Err(SettingsError::MissingProject { .. })
        ));
    }

    #[test]
    fn file_values_are_normalized_and_resolve_hosted_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{ "subdomain": " abcxyz ", "region": "eu-central-1", "theme_mode": "dark" }"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).settings();
        assert_eq!(settings.subdomain, "abcxyz");
        assert_eq!(settings.theme_mode, ThemeMode::Dark);

        let endpoints = settings.endpoints().unwrap();
        assert_eq!(
            endpoints.auth_url,
            "https://abcxyz.auth.eu-central-1.nhost.run/v1"
        );
        assert_eq!(
            endpoints.graphql_url,
            "https://abcxyz.graphql.eu-central-1.nhost.run/v1"
        );
    }

    #[test]
    fn explicit_urls_override_the_hosted_ones() {
        let settings = ClientSettings {
            subdomain: "abcxyz".to_string(),
            auth_url: Some("http://localhost:1337/v1/auth/".to_string()),
            graphql_url: Some("http://localhost:1337/v1/graphql".to_string()),
            ..ClientSettings::default()
        };

        let endpoints = settings.endpoints().unwrap();
        assert_eq!(endpoints.auth_url, "http://localhost:1337/v1/auth");
        assert_eq!(endpoints.graphql_ws_url(), "ws://localhost:1337/v1/graphql");
    }

    #[test]
    fn update_persists_atomically_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        store
            .update(ClientSettings {
                subdomain: "abcxyz".to_string(),
                auth_url: Some("   ".to_string()),
                ..ClientSettings::default()
            })
            .unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(store.settings().auth_url, None);

        let reloaded = SettingsStore::new(path).settings();
        assert_eq!(reloaded.subdomain, "abcxyz");
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(*SettingsStore::new(path).settings(), ClientSettings::default());
    }
}
