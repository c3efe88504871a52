use crate::error::{ResourceError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

const DECORATIONS: [&str; 2] = ["-uhd", "-hd"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityTier {
    #[default]
    High,
    Medium,
    Low,
}

impl QualityTier {
    pub fn from_setting(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "uhd" => Ok(QualityTier::High),
            "medium" | "hd" => Ok(QualityTier::Medium),
            "low" | "sd" => Ok(QualityTier::Low),
            other => Err(ResourceError::Config(format!(
                "invalid texture quality '{other}'. Use high, medium or low."
            ))),
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            QualityTier::High => "-uhd",
            QualityTier::Medium => "-hd",
            QualityTier::Low => "",
        }
    }

    /// Best on-disk variant of an undecorated path for this tier. Paths that already carry a
    /// quality decoration are returned unchanged.
    pub fn resolve(self, path: &Path) -> PathBuf {
        let suffix = self.suffix();
        if suffix.is_empty() || is_decorated(path) {
            return path.to_path_buf();
        }
        let decorated = decorate(path, suffix);
        if decorated.exists() {
            decorated
        } else {
            path.to_path_buf()
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        };
        f.write_str(label)
    }
}

/// Strips a `-hd`/`-uhd` decoration from the file stem, keeping the directory and extension.
pub fn collapse(path: &Path) -> PathBuf {
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => path.with_file_name(collapse_name(name)),
        None => path.to_path_buf(),
    }
}

pub fn collapse_name(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    for decoration in DECORATIONS {
        if let Some(base) = stem.strip_suffix(decoration) {
            if !base.is_empty() {
                return format!("{base}{ext}");
            }
        }
    }
    name.to_string()
}

pub fn is_decorated(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()).is_some_and(|name| collapse_name(name) != name)
}

fn decorate(path: &Path, suffix: &str) -> PathBuf {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return path.to_path_buf();
    };
    let (stem, ext) = split_extension(name);
    path.with_file_name(format!("{stem}{suffix}{ext}"))
}

// Returns the stem and the extension including its dot.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(index) => name.split_at(index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collapse_strips_every_decoration() {
        assert_eq!(collapse_name("sprite-uhd.png"), "sprite.png");
        assert_eq!(collapse_name("sprite-hd.png"), "sprite.png");
        assert_eq!(collapse_name("sprite.png"), "sprite.png");
        assert_eq!(collapse(Path::new("res/GJ_GameSheet-uhd.plist")), PathBuf::from("res/GJ_GameSheet.plist"));
    }

    #[test]
    fn collapse_leaves_bare_decoration_names_alone() {
        assert_eq!(collapse_name("-hd.png"), "-hd.png");
        assert_eq!(collapse_name("shd.png"), "shd.png");
    }

    #[test]
    fn resolve_prefers_existing_variant() {
        let dir = tempfile::tempdir().expect("temp dir");
        let base = dir.path().join("icon.png");
        fs::write(&base, b"sd").expect("write base");
        fs::write(dir.path().join("icon-hd.png"), b"hd").expect("write hd");

        assert_eq!(QualityTier::Medium.resolve(&base), dir.path().join("icon-hd.png"));
        assert_eq!(QualityTier::High.resolve(&base), base, "missing -uhd falls back to the original");
        assert_eq!(QualityTier::Low.resolve(&base), base);
    }

    #[test]
    fn resolve_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("icon-hd.png"), b"hd").expect("write hd");
        fs::write(dir.path().join("icon-hd-hd.png"), b"odd").expect("write doubled");
        let resolved = dir.path().join("icon-hd.png");
        assert_eq!(QualityTier::Medium.resolve(&resolved), resolved);
    }

    #[test]
    fn parses_settings_case_insensitively() {
        assert_eq!(QualityTier::from_setting("High").expect("high"), QualityTier::High);
        assert_eq!(QualityTier::from_setting(" medium ").expect("medium"), QualityTier::Medium);
        assert_eq!(QualityTier::from_setting("LOW").expect("low"), QualityTier::Low);
        assert!(QualityTier::from_setting("ultra").is_err());
    }
}
