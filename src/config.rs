use crate::error::ResourceError;
use crate::extract::DEFAULT_COVER_SIZE;
use crate::quality::QualityTier;
use crate::resource::GameProfile;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    /// Game executable, or the `.app` bundle on macOS.
    pub gd_path: PathBuf,
}

impl ProfileConfig {
    pub fn to_profile(&self) -> GameProfile {
        GameProfile::from_gd_path(self.name.clone(), &self.gd_path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "BrowserConfig::default_quality")]
    pub quality: String,
    #[serde(default)]
    pub current_profile: Option<String>,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
    /// Mod project roots, each containing a `mod.json`.
    #[serde(default)]
    pub mods: Vec<PathBuf>,
    #[serde(default = "BrowserConfig::default_cover_size")]
    pub cover_size: u32,
    #[serde(default)]
    pub favorites_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct BrowserConfigOverrides {
    pub quality: Option<String>,
    pub profile: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            quality: Self::default_quality(),
            current_profile: None,
            profiles: Vec::new(),
            mods: Vec::new(),
            cover_size: Self::default_cover_size(),
            favorites_path: None,
        }
    }
}

impl BrowserConfig {
    fn default_quality() -> String {
        "high".to_string()
    }

    const fn default_cover_size() -> u32 {
        DEFAULT_COVER_SIZE
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &BrowserConfigOverrides) {
        if let Some(quality) = &overrides.quality {
            self.quality = quality.clone();
        }
        if let Some(profile) = &overrides.profile {
            self.current_profile = Some(profile.clone());
        }
    }

    pub fn quality_setting(&self) -> &str {
        &self.quality
    }

    pub fn quality_tier(&self) -> Result<QualityTier, ResourceError> {
        QualityTier::from_setting(&self.quality)
    }

    /// The named current profile, else the first configured one.
    pub fn current_profile(&self) -> Result<GameProfile, ResourceError> {
        let profile = match &self.current_profile {
            Some(name) => self
                .profiles
                .iter()
                .find(|profile| &profile.name == name)
                .ok_or_else(|| ResourceError::Config(format!("profile '{name}' is not configured")))?,
            None => self
                .profiles
                .first()
                .ok_or_else(|| ResourceError::Config("no Geometry Dash profile configured".to_string()))?,
        };
        Ok(profile.to_profile())
    }
}

impl BrowserConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.quality.is_none() && self.profile.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.quality.is_some() {
            fields.push("quality");
        }
        if self.profile.is_some() {
            fields.push("profile");
        }
        fields
    }
}
