//! Resource model: where resources come from ([`Source`]), what they are ([`Resource`]) and how
//! they are grouped per source ([`Collection`]).

use crate::error::{ResourceError, Result};
use crate::manifest::ModManifest;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn game(profile: &str) -> Self {
        Self(format!("gd:{profile}"))
    }

    pub fn modification(id: &str) -> Self {
        Self(format!("mod:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProfile {
    pub name: String,
    pub install_dir: PathBuf,
    pub executable: PathBuf,
}

impl GameProfile {
    /// `gd_path` is either the game executable or a macOS `.app` bundle.
    pub fn from_gd_path(name: impl Into<String>, gd_path: &Path) -> Self {
        let is_bundle = gd_path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("app"));
        if is_bundle {
            let stem = gd_path.file_stem().map(|stem| stem.to_os_string()).unwrap_or_default();
            return Self {
                name: name.into(),
                install_dir: gd_path.to_path_buf(),
                executable: gd_path.join("Contents").join("MacOS").join(stem),
            };
        }
        Self {
            name: name.into(),
            install_dir: gd_path.parent().map(Path::to_path_buf).unwrap_or_default(),
            executable: gd_path.to_path_buf(),
        }
    }

    pub fn resources_dir(&self) -> Result<PathBuf> {
        [self.install_dir.join("Resources"), self.install_dir.join("Contents").join("Resources")]
            .into_iter()
            .find(|dir| dir.is_dir())
            .ok_or_else(|| {
                ResourceError::Config(format!(
                    "profile '{}' has no Resources directory under {}",
                    self.name,
                    self.install_dir.display()
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub struct ModProject {
    pub id: String,
    pub root: PathBuf,
    pub manifest: ModManifest,
    /// Ids of registered mods that declare a dependency on this one.
    pub dependants: Vec<String>,
}

impl ModProject {
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let manifest = ModManifest::load(&root)?;
        Ok(Self { id: manifest.id.clone(), root, manifest, dependants: Vec::new() })
    }
}

#[derive(Debug, Clone)]
pub enum Source {
    Game(GameProfile),
    Mod(ModProject),
}

impl Source {
    pub fn id(&self) -> SourceId {
        match self {
            Source::Game(profile) => SourceId::game(&profile.name),
            Source::Mod(project) => SourceId::modification(&project.id),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Source::Game(profile) => format!("Geometry Dash ({})", profile.name),
            Source::Mod(project) => project.manifest.name.clone().unwrap_or_else(|| project.id.clone()),
        }
    }

    /// Directory whose contents this source indexes.
    pub fn root(&self) -> PathBuf {
        match self {
            Source::Game(profile) => profile.resources_dir().unwrap_or_else(|_| profile.install_dir.clone()),
            Source::Mod(project) => project.root.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ResourceHeader {
    id: String,
    display_name: String,
    source: SourceId,
    favorite: AtomicBool,
}

impl ResourceHeader {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, source: SourceId) -> Self {
        Self { id: id.into(), display_name: display_name.into(), source, favorite: AtomicBool::new(false) }
    }
}

#[derive(Debug)]
pub struct SpriteResource {
    pub header: ResourceHeader,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetBacking {
    /// Built atlas: geometry file plus bitmap.
    Physical { plist: PathBuf, bitmap: PathBuf },
    /// Declared by a mod manifest; frames are still loose files.
    Virtual,
}

#[derive(Debug)]
pub struct SpriteSheetResource {
    pub header: ResourceHeader,
    pub name: String,
    pub backing: SheetBacking,
    frames: Vec<Arc<Resource>>,
    cover: OnceCell<Arc<RgbaImage>>,
}

impl SpriteSheetResource {
    pub fn new(header: ResourceHeader, name: impl Into<String>, backing: SheetBacking) -> Self {
        Self { header, name: name.into(), backing, frames: Vec::new(), cover: OnceCell::new() }
    }

    pub fn push_frame(&mut self, frame: SpriteFrameResource) {
        self.frames.push(Arc::new(Resource::SpriteFrame(frame)));
    }

    pub fn frames(&self) -> &[Arc<Resource>] {
        &self.frames
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.backing, SheetBacking::Virtual)
    }

    pub(crate) fn cover_cell(&self) -> &OnceCell<Arc<RgbaImage>> {
        &self.cover
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOrigin {
    /// Named slice of a built atlas.
    Atlas { sheet: String, plist: PathBuf, bitmap: PathBuf, name: String },
    /// Standalone image that will be packed into a sheet later.
    Loose { path: PathBuf },
}

#[derive(Debug)]
pub struct SpriteFrameResource {
    pub header: ResourceHeader,
    pub origin: FrameOrigin,
}

#[derive(Debug)]
pub struct FontResource {
    pub header: ResourceHeader,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct AudioResource {
    pub header: ResourceHeader,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct UnknownResource {
    pub header: ResourceHeader,
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum Resource {
    Sprite(SpriteResource),
    SpriteSheet(SpriteSheetResource),
    SpriteFrame(SpriteFrameResource),
    Font(FontResource),
    Audio(AudioResource),
    Unknown(UnknownResource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Sprite,
    SpriteSheet,
    SpriteFrame,
    Font,
    Audio,
    Unknown,
}

impl ResourceKind {
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Sprite => "sprite",
            ResourceKind::SpriteSheet => "spritesheet",
            ResourceKind::SpriteFrame => "frame",
            ResourceKind::Font => "font",
            ResourceKind::Audio => "audio",
            ResourceKind::Unknown => "unknown",
        }
    }
}

impl Resource {
    fn header(&self) -> &ResourceHeader {
        match self {
            Resource::Sprite(res) => &res.header,
            Resource::SpriteSheet(res) => &res.header,
            Resource::SpriteFrame(res) => &res.header,
            Resource::Font(res) => &res.header,
            Resource::Audio(res) => &res.header,
            Resource::Unknown(res) => &res.header,
        }
    }

    pub fn id(&self) -> &str {
        &self.header().id
    }

    pub fn display_name(&self) -> &str {
        &self.header().display_name
    }

    pub fn source(&self) -> &SourceId {
        &self.header().source
    }

    pub fn is_favorite(&self) -> bool {
        self.header().favorite.load(Ordering::Relaxed)
    }

    pub fn set_favorite(&self, favorite: bool) {
        self.header().favorite.store(favorite, Ordering::Relaxed);
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Sprite(_) => ResourceKind::Sprite,
            Resource::SpriteSheet(_) => ResourceKind::SpriteSheet,
            Resource::SpriteFrame(_) => ResourceKind::SpriteFrame,
            Resource::Font(_) => ResourceKind::Font,
            Resource::Audio(_) => ResourceKind::Audio,
            Resource::Unknown(_) => ResourceKind::Unknown,
        }
    }

    /// File backing the resource, when there is exactly one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Resource::Sprite(res) => Some(&res.path),
            Resource::SpriteSheet(res) => match &res.backing {
                SheetBacking::Physical { plist, .. } => Some(plist),
                SheetBacking::Virtual => None,
            },
            Resource::SpriteFrame(res) => match &res.origin {
                FrameOrigin::Atlas { .. } => None,
                FrameOrigin::Loose { path } => Some(path),
            },
            Resource::Font(res) => Some(&res.path),
            Resource::Audio(res) => Some(&res.path),
            Resource::Unknown(res) => Some(&res.path),
        }
    }

    pub fn frames(&self) -> &[Arc<Resource>] {
        match self {
            Resource::SpriteSheet(sheet) => sheet.frames(),
            _ => &[],
        }
    }

    pub fn as_sheet(&self) -> Option<&SpriteSheetResource> {
        match self {
            Resource::SpriteSheet(sheet) => Some(sheet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFilter {
    All,
    Favorites,
    Sprites,
    Frames,
    SpriteSheets,
    Fonts,
    Audio,
    Unknown,
}

impl ResourceFilter {
    pub fn matches(self, resource: &Resource) -> bool {
        match self {
            ResourceFilter::All => true,
            ResourceFilter::Favorites => resource.is_favorite(),
            ResourceFilter::Sprites => resource.kind() == ResourceKind::Sprite,
            ResourceFilter::Frames => resource.kind() == ResourceKind::SpriteFrame,
            ResourceFilter::SpriteSheets => resource.kind() == ResourceKind::SpriteSheet,
            ResourceFilter::Fonts => resource.kind() == ResourceKind::Font,
            ResourceFilter::Audio => resource.kind() == ResourceKind::Audio,
            ResourceFilter::Unknown => resource.kind() == ResourceKind::Unknown,
        }
    }
}

impl FromStr for ResourceFilter {
    type Err = ResourceError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "all" => Ok(ResourceFilter::All),
            "favorites" => Ok(ResourceFilter::Favorites),
            "sprites" => Ok(ResourceFilter::Sprites),
            "frames" => Ok(ResourceFilter::Frames),
            "spritesheets" => Ok(ResourceFilter::SpriteSheets),
            "fonts" => Ok(ResourceFilter::Fonts),
            "audio" => Ok(ResourceFilter::Audio),
            "unknown" => Ok(ResourceFilter::Unknown),
            _ => Err(ResourceError::UnknownFilter(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub sprites: usize,
    pub frames: usize,
    pub sheets: usize,
    pub fonts: usize,
    pub audio: usize,
    pub unknown: usize,
    pub favorites: usize,
    pub total: usize,
}

impl std::ops::AddAssign for CollectionStats {
    fn add_assign(&mut self, other: Self) {
        self.sprites += other.sprites;
        self.frames += other.frames;
        self.sheets += other.sheets;
        self.fonts += other.fonts;
        self.audio += other.audio;
        self.unknown += other.unknown;
        self.favorites += other.favorites;
        self.total += other.total;
    }
}

impl CollectionStats {
    fn record(&mut self, resource: &Resource) {
        match resource.kind() {
            ResourceKind::Sprite => self.sprites += 1,
            ResourceKind::SpriteSheet => self.sheets += 1,
            ResourceKind::SpriteFrame => self.frames += 1,
            ResourceKind::Font => self.fonts += 1,
            ResourceKind::Audio => self.audio += 1,
            ResourceKind::Unknown => self.unknown += 1,
        }
        if resource.is_favorite() {
            self.favorites += 1;
        }
        self.total += 1;
    }
}

/// Every resource discovered for one source. Replaced wholesale on reload.
#[derive(Debug)]
pub struct Collection {
    source: SourceId,
    resources: Vec<Arc<Resource>>,
}

impl Collection {
    pub fn new(source: SourceId, resources: Vec<Arc<Resource>>) -> Self {
        Self { source, resources }
    }

    pub fn empty(source: SourceId) -> Self {
        Self::new(source, Vec::new())
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Top-level resources; sheet frames are reachable through their sheet.
    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    /// Top-level resources with each sheet followed by its frames.
    pub fn iter_all(&self) -> impl Iterator<Item = &Arc<Resource>> + '_ {
        self.resources.iter().flat_map(|resource| std::iter::once(resource).chain(resource.frames()))
    }

    pub fn query(&self, filter: ResourceFilter) -> Vec<Arc<Resource>> {
        self.iter_all().filter(|resource| filter.matches(resource)).cloned().collect()
    }

    pub fn stats(&self) -> CollectionStats {
        let mut stats = CollectionStats::default();
        self.iter_all().for_each(|resource| stats.record(resource));
        stats
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Arc<Resource>> {
        self.iter_all().find(|resource| resource.id() == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Arc<Resource>> {
        self.iter_all().find(|resource| resource.display_name() == name)
    }
}
