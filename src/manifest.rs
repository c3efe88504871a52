use crate::error::{ResourceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE_NAME: &str = "mod.json";

/// The subset of a Geode `mod.json` the resource index reads.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModManifest {
    pub id: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub developer: Option<String>,
    pub dependencies: Vec<ModDependency>,
    pub resources: ModResources,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModDependency {
    pub id: String,
    pub version: Option<String>,
    pub required: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModResources {
    /// Glob patterns, relative to the mod root, for loose files of any kind.
    pub files: Vec<String>,
    /// Glob patterns for loose sprites.
    pub sprites: Vec<String>,
    /// Sheet name to the glob patterns of its member images.
    pub spritesheets: BTreeMap<String, Vec<String>>,
    pub fonts: BTreeMap<String, ModFont>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ModFont {
    pub path: String,
    pub size: Option<u32>,
    pub charset: Option<String>,
    pub outline: Option<bool>,
}

impl ModManifest {
    pub fn parse(text: &str) -> Result<Self> {
        let manifest: ModManifest =
            serde_json::from_str(text).map_err(|err| ResourceError::format("manifest", err.to_string()))?;
        if manifest.id.trim().is_empty() {
            return Err(ResourceError::format("manifest", "mod id is missing"));
        }
        Ok(manifest)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE_NAME);
        let text = fs::read_to_string(&path).map_err(|err| ResourceError::io(&path, err))?;
        Self::parse(&text).map_err(|err| match err {
            ResourceError::Format { kind, message } => {
                ResourceError::Format { kind, message: format!("{}: {message}", path.display()) }
            }
            other => other,
        })
    }

    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|dep| dep.id == id)
    }
}
