//! App name to platform identifier mapping.
//!
//! The map is a YAML document with `android`, `harmony` and `ios` sections keyed
//! by canonical app name. Each entry carries a list of aliases (localized names,
//! nicknames). Lookups are case-insensitive and go through a combined alias
//! index, so `"微信"`, `"WeChat"` and `"wechat"` all resolve the same app.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::device::Platform;

/// Bundled default app map.
const BUNDLED_APP_MAP: &str = include_str!("app_map.yaml");

/// App map loading errors.
#[derive(Error, Debug)]
pub enum AppMapError {
    #[error("Failed to read app map: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid app map: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndroidAppConfig {
    pub package: String,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonyAppConfig {
    pub bundle: String,
    #[serde(default = "default_module")]
    pub module: String,
    #[serde(default = "default_ability")]
    pub ability: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_module() -> String {
    "entry".to_string()
}

fn default_ability() -> String {
    "MainAbility".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IosAppConfig {
    pub bundle_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A resolved app record for one platform.
#[derive(Debug, Clone, PartialEq)]
pub enum AppConfig {
    Android(AndroidAppConfig),
    Harmony(HarmonyAppConfig),
    Ios(IosAppConfig),
}

impl AppConfig {
    /// `(app id, sub id)` pair to hand to a controller's `open_app`.
    ///
    /// HarmonyOS targets are addressed as `module/ability`.
    pub fn launch_target(&self) -> (String, Option<String>) {
        match self {
            AppConfig::Android(app) => (app.package.clone(), app.activity.clone()),
            AppConfig::Harmony(app) => (
                app.bundle.clone(),
                Some(format!("{}/{}", app.module, app.ability)),
            ),
            AppConfig::Ios(app) => (app.bundle_id.clone(), None),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AppMapFile {
    #[serde(default)]
    android: BTreeMap<String, AndroidAppConfig>,
    #[serde(default)]
    harmony: BTreeMap<String, HarmonyAppConfig>,
    #[serde(default)]
    ios: BTreeMap<String, IosAppConfig>,
}

/// Resolves free-text app names to platform-specific app records.
#[derive(Debug, Default)]
pub struct AppMapper {
    android: BTreeMap<String, AndroidAppConfig>,
    harmony: BTreeMap<String, HarmonyAppConfig>,
    ios: BTreeMap<String, IosAppConfig>,
    /// lowercased alias -> (platform, canonical name), in registration order
    aliases: HashMap<String, Vec<(Platform, String)>>,
}

impl AppMapper {
    /// Mapper over the bundled app map.
    pub fn bundled() -> Result<Self, AppMapError> {
        Self::from_yaml_str(BUNDLED_APP_MAP)
    }

    /// Load a mapper from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AppMapError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, AppMapError> {
        // An empty document deserializes to unit, not a map.
        let file: AppMapFile = if yaml.trim().is_empty() {
            AppMapFile::default()
        } else {
            serde_yaml::from_str(yaml)?
        };

        let mut mapper = AppMapper {
            android: file.android,
            harmony: file.harmony,
            ios: file.ios,
            aliases: HashMap::new(),
        };

        let android: Vec<_> = mapper
            .android
            .iter()
            .map(|(name, app)| (name.clone(), app.aliases.clone()))
            .collect();
        let harmony: Vec<_> = mapper
            .harmony
            .iter()
            .map(|(name, app)| (name.clone(), app.aliases.clone()))
            .collect();
        let ios: Vec<_> = mapper
            .ios
            .iter()
            .map(|(name, app)| (name.clone(), app.aliases.clone()))
            .collect();

        for (platform, entries) in [
            (Platform::Android, android),
            (Platform::Harmony, harmony),
            (Platform::Ios, ios),
        ] {
            for (name, aliases) in entries {
                mapper.register(platform, &name, &aliases);
            }
        }

        Ok(mapper)
    }

    fn register(&mut self, platform: Platform, name: &str, aliases: &[String]) {
        for key in std::iter::once(name).chain(aliases.iter().map(String::as_str)) {
            let entries = self.aliases.entry(key.trim().to_lowercase()).or_default();
            let entry = (platform, name.to_string());
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }

    fn lookup(&self, platform: Platform, name: &str) -> Option<AppConfig> {
        match platform {
            Platform::Android => self.android.get(name).cloned().map(AppConfig::Android),
            Platform::Harmony => self.harmony.get(name).cloned().map(AppConfig::Harmony),
            Platform::Ios => self.ios.get(name).cloned().map(AppConfig::Ios),
        }
    }

    /// Resolve an app name or alias.
    ///
    /// With a platform filter only that platform's record is returned; without
    /// one, the first registered match wins (Android before HarmonyOS before iOS).
    pub fn resolve(&self, name: &str, platform: Option<Platform>) -> Option<(Platform, AppConfig)> {
        let entries = self.aliases.get(&name.trim().to_lowercase())?;
        let (resolved, canonical) = match platform {
            Some(wanted) => entries.iter().find(|(p, _)| *p == wanted)?,
            None => entries.first()?,
        };
        self.lookup(*resolved, canonical).map(|config| (*resolved, config))
    }

    pub fn get_android_app(&self, name: &str) -> Option<AndroidAppConfig> {
        match self.resolve(name, Some(Platform::Android))? {
            (_, AppConfig::Android(app)) => Some(app),
            _ => None,
        }
    }

    pub fn get_harmony_app(&self, name: &str) -> Option<HarmonyAppConfig> {
        match self.resolve(name, Some(Platform::Harmony))? {
            (_, AppConfig::Harmony(app)) => Some(app),
            _ => None,
        }
    }

    pub fn get_ios_app(&self, name: &str) -> Option<IosAppConfig> {
        match self.resolve(name, Some(Platform::Ios))? {
            (_, AppConfig::Ios(app)) => Some(app),
            _ => None,
        }
    }

    /// Canonical app names per platform, optionally filtered to one platform.
    pub fn list_apps(&self, platform: Option<Platform>) -> BTreeMap<Platform, Vec<String>> {
        let mut result = BTreeMap::new();
        let wanted = |p: Platform| platform.map_or(true, |f| f == p);
        if wanted(Platform::Android) {
            result.insert(Platform::Android, self.android.keys().cloned().collect());
        }
        if wanted(Platform::Harmony) {
            result.insert(Platform::Harmony, self.harmony.keys().cloned().collect());
        }
        if wanted(Platform::Ios) {
            result.insert(Platform::Ios, self.ios.keys().cloned().collect());
        }
        result
    }
}
