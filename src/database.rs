//! The resource index: owns one [`Collection`] per registered [`Source`], the decode caches that
//! back previews, and the favorites snapshot.

use crate::atlas::AtlasData;
use crate::cache::{load_bitmap, read_bytes, read_text, BitmapLoader, FsBitmapLoader, InflightCache};
use crate::config::BrowserConfig;
use crate::discovery::discover;
use crate::error::{ResourceError, Result};
use crate::extract::{compose_cover, extract_region, DEFAULT_COVER_SIZE};
use crate::favorites::{FavoriteEntry, FavoritesSnapshot};
use crate::font::FontData;
use crate::preview::{Preview, PreviewIcon};
use crate::quality::{collapse_name, QualityTier};
use crate::resource::{
    Collection, CollectionStats, FontResource, FrameOrigin, ModProject, Resource, ResourceFilter, Source, SourceId,
    SpriteFrameResource, SpriteSheetResource,
};
use image::RgbaImage;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseOptions {
    pub quality: QualityTier,
    pub cover_size: u32,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self { quality: QualityTier::default(), cover_size: DEFAULT_COVER_SIZE }
    }
}

/// Which collection a query runs against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CollectionScope {
    /// Every source, in registration order. Always recomputed.
    #[default]
    All,
    Source(SourceId),
}

impl From<Option<SourceId>> for CollectionScope {
    fn from(value: Option<SourceId>) -> Self {
        value.map_or(CollectionScope::All, CollectionScope::Source)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub bitmaps: usize,
    pub atlases: usize,
    pub fonts: usize,
}

pub struct ResourceDatabase {
    options: DatabaseOptions,
    loader: Arc<dyn BitmapLoader>,
    sources: Vec<Source>,
    collections: HashMap<SourceId, Arc<Collection>>,
    bitmaps: InflightCache<RgbaImage>,
    atlases: InflightCache<AtlasData>,
    fonts: InflightCache<FontData>,
    favorites: FavoritesSnapshot,
}

impl ResourceDatabase {
    pub fn new(options: DatabaseOptions) -> Self {
        Self::with_loader(options, Arc::new(FsBitmapLoader))
    }

    pub fn with_loader(options: DatabaseOptions, loader: Arc<dyn BitmapLoader>) -> Self {
        Self {
            options,
            loader,
            sources: Vec::new(),
            collections: HashMap::new(),
            bitmaps: InflightCache::new(),
            atlases: InflightCache::new(),
            fonts: InflightCache::new(),
            favorites: FavoritesSnapshot::default(),
        }
    }

    /// Registers the configured game profile and mod projects. Sources that cannot be set up are
    /// logged and left out. Nothing is discovered until [`Self::reload_all`].
    pub fn from_config(config: &BrowserConfig) -> Result<Self> {
        let options = DatabaseOptions { quality: config.quality_tier()?, cover_size: config.cover_size };
        let mut database = Self::new(options);
        match config.current_profile() {
            Ok(profile) => {
                database.add_source(Source::Game(profile));
            }
            Err(err) => warn!("[database] {err}"),
        }
        for root in &config.mods {
            match ModProject::load(root) {
                Ok(project) => {
                    database.add_source(Source::Mod(project));
                }
                Err(err) => warn!("[database] skipping mod at {}: {err}", root.display()),
            }
        }
        if let Some(path) = &config.favorites_path {
            database.apply_favorites(FavoritesSnapshot::load_or_default(path));
        }
        Ok(database)
    }

    pub fn options(&self) -> DatabaseOptions {
        self.options
    }

    /// Changes the texture tier used by later reloads. Loaded collections keep the variants they
    /// were discovered with until then.
    pub fn set_quality(&mut self, quality: QualityTier) {
        if self.options.quality != quality {
            info!("[database] texture quality set to {quality}");
            self.options.quality = quality;
        }
    }

    /// Registers `source`, replacing any source with the same id.
    pub fn add_source(&mut self, source: Source) -> SourceId {
        let id = source.id();
        match self.sources.iter_mut().find(|existing| existing.id() == id) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
        self.refresh_dependants();
        id
    }

    pub fn remove_source(&mut self, id: &SourceId) -> bool {
        let before = self.sources.len();
        self.sources.retain(|source| &source.id() != id);
        if let Some(collection) = self.collections.remove(id) {
            self.favorites.replace_source(id, favorite_entries(&collection));
        }
        self.refresh_dependants();
        before != self.sources.len()
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn source(&self, id: &SourceId) -> Option<&Source> {
        self.sources.iter().find(|source| &source.id() == id)
    }

    fn refresh_dependants(&mut self) {
        let edges: Vec<(String, String)> = self
            .sources
            .iter()
            .filter_map(|source| match source {
                Source::Mod(project) => Some(project),
                Source::Game(_) => None,
            })
            .flat_map(|project| {
                project.manifest.dependencies.iter().map(|dep| (project.id.clone(), dep.id.clone()))
            })
            .collect();
        for source in &mut self.sources {
            if let Source::Mod(project) = source {
                project.dependants = edges
                    .iter()
                    .filter(|(_, dependency)| dependency == &project.id)
                    .map(|(dependant, _)| dependant.clone())
                    .collect();
            }
        }
    }

    pub async fn reload_all(&mut self) -> CollectionStats {
        let ids: Vec<SourceId> = self.sources.iter().map(Source::id).collect();
        let mut total = CollectionStats::default();
        for id in ids {
            if let Ok(stats) = self.reload_source(&id).await {
                total += stats;
            }
        }
        info!("[database] reloaded {} sources, {} resources", self.collections.len(), total.total);
        total
    }

    /// Rebuilds the collection of one source. Mod sources re-read their manifest first. Other
    /// collections and their caches are untouched. A failed discovery leaves an empty collection
    /// behind.
    pub async fn reload_source(&mut self, id: &SourceId) -> Result<CollectionStats> {
        let registered = self.source(id).cloned().ok_or_else(|| ResourceError::ResourceNotFound(id.to_string()))?;
        let manifest = self.refresh_manifest(&registered);
        let source = self.source(id).cloned().unwrap_or(registered);
        if let Some(previous) = self.collections.remove(id) {
            self.favorites.replace_source(id, favorite_entries(&previous));
        }
        let root = source.root();
        let dropped = self.bitmaps.invalidate_under(&root)
            + self.atlases.invalidate_under(&root)
            + self.fonts.invalidate_under(&root);
        if dropped > 0 {
            debug!("[database] {id}: dropped {dropped} cached decodes");
        }

        let quality = self.options.quality;
        let discovered = match manifest {
            Ok(()) => tokio::task::spawn_blocking(move || discover(&source, quality))
                .await
                .map_err(|err| ResourceError::io(&root, std::io::Error::other(err)))
                .and_then(|result| result),
            Err(err) => Err(err),
        };
        let collection = match discovered {
            Ok(resources) => Collection::new(id.clone(), resources),
            Err(err) => {
                warn!("[database] discovery failed for {id}: {err}");
                Collection::empty(id.clone())
            }
        };
        apply_to_collection(&self.favorites, &collection);
        let stats = collection.stats();
        self.collections.insert(id.clone(), Arc::new(collection));
        Ok(stats)
    }

    /// Re-reads `mod.json` of a mod source and stores the fresh project. Game sources have nothing
    /// to refresh.
    fn refresh_manifest(&mut self, source: &Source) -> Result<()> {
        let Source::Mod(project) = source else {
            return Ok(());
        };
        let fresh = ModProject::load(&project.root)?;
        if fresh.id != project.id {
            return Err(ResourceError::format(
                "manifest",
                format!("mod id changed from '{}' to '{}'; register the mod again", project.id, fresh.id),
            ));
        }
        self.add_source(Source::Mod(fresh));
        Ok(())
    }

    /// Drops every collection, cache and source.
    pub fn dispose(&mut self) {
        self.collections.clear();
        self.sources.clear();
        self.bitmaps.clear();
        self.atlases.clear();
        self.fonts.clear();
        info!("[database] disposed");
    }

    pub fn collection(&self, id: &SourceId) -> Option<&Arc<Collection>> {
        self.collections.get(id)
    }

    /// Loaded collections in source registration order.
    pub fn collections(&self) -> Vec<&Arc<Collection>> {
        self.sources.iter().filter_map(|source| self.collections.get(&source.id())).collect()
    }

    fn scoped(&self, scope: &CollectionScope) -> Vec<&Arc<Collection>> {
        match scope {
            CollectionScope::All => self.collections(),
            CollectionScope::Source(id) => self.collections.get(id).into_iter().collect(),
        }
    }

    pub fn resources(&self, scope: &CollectionScope, filter: ResourceFilter) -> Vec<Arc<Resource>> {
        self.scoped(scope).into_iter().flat_map(|collection| collection.query(filter)).collect()
    }

    /// First resource whose display name matches `name` once quality decorations are collapsed.
    pub fn find(&self, name: &str, scope: Option<&SourceId>) -> Option<Arc<Resource>> {
        let wanted = collapse_name(name);
        let scope = CollectionScope::from(scope.cloned());
        self.scoped(&scope)
            .into_iter()
            .find_map(|collection| collection.iter_all().find(|res| res.display_name() == wanted).cloned())
    }

    pub fn find_by_id(&self, source: &SourceId, id: &str) -> Option<Arc<Resource>> {
        self.collections.get(source).and_then(|collection| collection.find_by_id(id).cloned())
    }

    /// Case-insensitive substring match on display names.
    pub fn search(&self, text: &str, scope: &CollectionScope, filter: ResourceFilter) -> Vec<Arc<Resource>> {
        let needle = text.to_lowercase();
        self.resources(scope, filter)
            .into_iter()
            .filter(|resource| resource.display_name().to_lowercase().contains(&needle))
            .collect()
    }

    pub fn stats(&self, scope: &CollectionScope) -> CollectionStats {
        let mut stats = CollectionStats::default();
        for collection in self.scoped(scope) {
            stats += collection.stats();
        }
        stats
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats { bitmaps: self.bitmaps.len(), atlases: self.atlases.len(), fonts: self.fonts.len() }
    }

    pub fn set_favorite(&self, resource: &Resource, favorite: bool) {
        resource.set_favorite(favorite);
    }

    pub fn toggle_favorite(&self, resource: &Resource) -> bool {
        let favorite = !resource.is_favorite();
        resource.set_favorite(favorite);
        favorite
    }

    /// Current favorite flags of every loaded collection, plus stored entries of sources that are
    /// not loaded.
    pub fn favorites_snapshot(&self) -> FavoritesSnapshot {
        let mut snapshot = self.favorites.clone();
        for (id, collection) in &self.collections {
            snapshot.replace_source(id, favorite_entries(collection));
        }
        snapshot
    }

    /// Stores `snapshot` and applies it to the loaded collections; later reloads apply it too.
    pub fn apply_favorites(&mut self, snapshot: FavoritesSnapshot) {
        self.favorites = snapshot;
        for collection in self.collections.values() {
            apply_to_collection(&self.favorites, collection);
        }
    }

    pub async fn fetch_preview(&self, resource: &Resource) -> Result<Preview> {
        match resource {
            Resource::Sprite(sprite) => Ok(Preview::Image(Arc::new(load_bitmap(&self.loader, &sprite.path).await?))),
            Resource::SpriteFrame(frame) => Ok(Preview::Image(Arc::new(self.frame_image(frame).await?))),
            Resource::SpriteSheet(sheet) => Ok(Preview::Image(self.sheet_cover(sheet).await?)),
            Resource::Font(font) => self.font_preview(font, resource.display_name()).await,
            Resource::Audio(_) => Ok(Preview::Icon(PreviewIcon::Audio)),
            Resource::Unknown(_) => Ok(Preview::Icon(PreviewIcon::Unknown)),
        }
    }

    async fn shared_bitmap(&self, path: &Path) -> Result<Arc<RgbaImage>> {
        self.bitmaps.get_or_load(path, || load_bitmap(&self.loader, path)).await
    }

    async fn atlas(&self, plist: &Path) -> Result<Arc<AtlasData>> {
        self.atlases
            .get_or_load(plist, || async move {
                let bytes = read_bytes(plist).await?;
                AtlasData::parse(&bytes).map_err(|err| with_file(err, plist))
            })
            .await
    }

    async fn frame_image(&self, frame: &SpriteFrameResource) -> Result<RgbaImage> {
        match &frame.origin {
            FrameOrigin::Atlas { sheet, plist, bitmap, name } => {
                let atlas = self.atlas(plist).await?;
                let entry = atlas
                    .frame(name)
                    .ok_or_else(|| ResourceError::FrameNotFound { frame: name.clone(), sheet: sheet.clone() })?;
                let base = self.shared_bitmap(bitmap).await?;
                extract_region(&base, entry.rect, entry.rotated)
            }
            FrameOrigin::Loose { path } => load_bitmap(&self.loader, path).await,
        }
    }

    async fn sheet_cover(&self, sheet: &SpriteSheetResource) -> Result<Arc<RgbaImage>> {
        let cover = sheet
            .cover_cell()
            .get_or_try_init(|| async {
                let frames = sheet.frames();
                let cover = compose_cover(frames.len(), self.options.cover_size, |index| async move {
                    match frames[index].as_ref() {
                        Resource::SpriteFrame(frame) => self.frame_image(frame).await,
                        other => Err(ResourceError::ResourceNotFound(other.id().to_string())),
                    }
                })
                .await?;
                debug!("[database] composed cover for sheet '{}'", sheet.name);
                Ok::<_, ResourceError>(Arc::new(cover))
            })
            .await?;
        Ok(Arc::clone(cover))
    }

    async fn font_preview(&self, font: &FontResource, display_name: &str) -> Result<Preview> {
        let is_descriptor = font.path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("fnt"));
        if !is_descriptor {
            return Ok(Preview::Icon(PreviewIcon::Font));
        }
        let path = font.path.as_path();
        let data = self
            .fonts
            .get_or_load(path, || async move {
                let text = read_text(path).await?;
                FontData::parse(&text).map_err(|err| with_file(err, path))
            })
            .await?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut pages = BTreeMap::new();
        for (id, file) in &data.pages {
            pages.insert(*id, self.shared_bitmap(&dir.join(file)).await?);
        }
        let sample = Path::new(display_name).file_stem().and_then(|stem| stem.to_str()).unwrap_or(display_name);
        Ok(Preview::Image(Arc::new(data.render_text(&pages, sample)?)))
    }
}

fn with_file(err: ResourceError, path: &Path) -> ResourceError {
    match err {
        ResourceError::Format { kind, message } => {
            ResourceError::Format { kind, message: format!("{}: {message}", path.display()) }
        }
        other => other,
    }
}

fn favorite_entries(collection: &Collection) -> BTreeMap<String, FavoriteEntry> {
    collection
        .iter_all()
        .filter(|resource| resource.is_favorite())
        .map(|resource| (resource.id().to_string(), FavoriteEntry { is_favorite: true }))
        .collect()
}

fn apply_to_collection(snapshot: &FavoritesSnapshot, collection: &Collection) {
    let source = collection.source();
    for resource in collection.iter_all() {
        resource.set_favorite(snapshot.is_favorite(source, resource.id()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ModDependency, ModManifest};
    use image::Rgba;
    use std::fs;
    use std::path::PathBuf;

    fn mod_source(root: PathBuf, id: &str, deps: &[&str]) -> Source {
        let manifest = ModManifest {
            id: id.to_string(),
            dependencies: deps.iter().map(|dep| ModDependency { id: dep.to_string(), ..Default::default() }).collect(),
            ..Default::default()
        };
        Source::Mod(ModProject { id: id.to_string(), root, manifest, dependants: Vec::new() })
    }

    #[test]
    fn dependants_follow_registered_mods() {
        let mut db = ResourceDatabase::new(DatabaseOptions::default());
        db.add_source(mod_source("/mods/base".into(), "dev.base", &[]));
        db.add_source(mod_source("/mods/icons".into(), "dev.icons", &["dev.base"]));
        db.add_source(mod_source("/mods/extra".into(), "dev.extra", &["dev.base", "dev.icons"]));
        fn dependants(db: &ResourceDatabase, id: &str) -> Vec<String> {
            match db.source(&SourceId::modification(id)) {
                Some(Source::Mod(project)) => project.dependants.clone(),
                _ => panic!("mod {id} missing"),
            }
        }
        assert_eq!(dependants(&db, "dev.base"), vec!["dev.icons".to_string(), "dev.extra".to_string()]);
        assert_eq!(dependants(&db, "dev.icons"), vec!["dev.extra".to_string()]);
        assert!(db.remove_source(&SourceId::modification("dev.extra")));
        assert_eq!(dependants(&db, "dev.base"), vec!["dev.icons".to_string()]);
    }

    #[tokio::test]
    async fn failed_discovery_yields_empty_collection() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut db = ResourceDatabase::new(DatabaseOptions::default());
        let id = db.add_source(mod_source(dir.path().join("missing"), "dev.gone", &[]));
        let stats = db.reload_source(&id).await.expect("reload");
        assert_eq!(stats.total, 0);
        assert!(db.collection(&id).expect("collection").resources().is_empty());
        assert!(matches!(
            db.reload_source(&SourceId::modification("dev.unknown")).await,
            Err(ResourceError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn scoped_reload_reads_edited_manifest() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("res")).expect("res dir");
        fs::write(root.join("res/a.png"), b"").expect("png");
        fs::write(root.join("res/b.png"), b"").expect("png");
        fs::write(root.join("mod.json"), r#"{ "id": "dev.edit", "resources": {} }"#).expect("manifest");

        let mut db = ResourceDatabase::new(DatabaseOptions::default());
        let id = db.add_source(Source::Mod(ModProject::load(root).expect("project")));
        db.add_source(mod_source(dir.path().join("other"), "dev.other", &["dev.edit"]));
        db.reload_all().await;
        assert_eq!(db.stats(&CollectionScope::Source(id.clone())).total, 0);

        fs::write(
            root.join("mod.json"),
            r#"{ "id": "dev.edit", "resources": { "spritesheets": { "s": ["res/*.png"] } } }"#,
        )
        .expect("edited manifest");
        let stats = db.reload_source(&id).await.expect("reload");
        assert_eq!((stats.sheets, stats.frames), (1, 2));
        let sheet = db.find("s", Some(&id)).expect("declared sheet");
        assert_eq!(sheet.id(), "mod:dev.edit/s");
        match db.source(&id) {
            Some(Source::Mod(project)) => {
                assert_eq!(project.manifest.resources.spritesheets.len(), 1);
                assert_eq!(project.dependants, vec!["dev.other".to_string()]);
            }
            _ => panic!("mod source missing"),
        }

        fs::write(root.join("mod.json"), "{ not json").expect("broken manifest");
        let stats = db.reload_source(&id).await.expect("reload with broken manifest");
        assert_eq!(stats.total, 0, "a manifest that no longer parses leaves an empty collection");

        fs::write(root.join("mod.json"), r#"{ "id": "dev.renamed" }"#).expect("renamed manifest");
        assert_eq!(db.reload_source(&id).await.expect("reload").total, 0);
        assert!(db.source(&SourceId::modification("dev.renamed")).is_none());
    }

    #[tokio::test]
    async fn quality_change_applies_on_next_reload() {
        let dir = tempfile::tempdir().expect("temp dir");
        let res = dir.path().join("Resources");
        fs::create_dir_all(&res).expect("res dir");
        fs::write(res.join("icon.png"), b"").expect("png");
        fs::write(res.join("icon-hd.png"), b"").expect("hd png");

        let mut db = ResourceDatabase::new(DatabaseOptions { quality: QualityTier::Low, cover_size: 100 });
        let exe = dir.path().join("GeometryDash.exe");
        let id = db.add_source(Source::Game(crate::resource::GameProfile::from_gd_path("Test", &exe)));
        db.reload_all().await;
        let low = db.find("icon.png", Some(&id)).expect("icon");
        assert_eq!(low.path(), Some(res.join("icon.png").as_path()));

        db.set_quality(QualityTier::Medium);
        assert_eq!(db.options().quality, QualityTier::Medium);
        let unchanged = db.find("icon.png", Some(&id)).expect("icon");
        assert_eq!(unchanged.path(), low.path(), "loaded collections keep their tier");
        db.reload_all().await;
        let medium = db.find("icon.png", Some(&id)).expect("icon");
        assert_eq!(medium.path(), Some(res.join("icon-hd.png").as_path()));
        assert_eq!(medium.id(), low.id());
    }

    #[tokio::test]
    async fn previews_dispatch_by_kind() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("res")).expect("res dir");
        RgbaImage::from_pixel(4, 2, Rgba([9, 9, 9, 255])).save(root.join("res/logo.png")).expect("png");
        fs::write(root.join("res/jump.ogg"), b"").expect("ogg");
        fs::write(root.join("res/notes.txt"), b"").expect("txt");
        fs::write(root.join("mod.json"), r#"{ "id": "dev.kinds", "resources": { "files": ["res/*"] } }"#)
            .expect("manifest");

        let mut db = ResourceDatabase::new(DatabaseOptions::default());
        db.add_source(Source::Mod(ModProject::load(root).expect("project")));
        db.reload_all().await;

        let logo = db.find("logo.png", None).expect("logo");
        let preview = db.fetch_preview(&logo).await.expect("sprite preview");
        assert_eq!(preview.dimensions(), Some((4, 2)));
        let audio = db.find("jump.ogg", None).expect("audio");
        assert!(matches!(db.fetch_preview(&audio).await, Ok(Preview::Icon(PreviewIcon::Audio))));
        let unknown = db.find("notes.txt", None).expect("unknown");
        assert!(matches!(db.fetch_preview(&unknown).await, Ok(Preview::Icon(PreviewIcon::Unknown))));
        assert_eq!(db.search("LOG", &CollectionScope::All, ResourceFilter::All).len(), 1);

        db.dispose();
        assert!(db.collections().is_empty());
        assert_eq!(db.stats(&CollectionScope::All), CollectionStats::default());
    }

    #[tokio::test]
    async fn font_preview_renders_glyph_strip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let res = dir.path().join("Resources");
        fs::create_dir_all(&res).expect("res dir");
        let mut page = RgbaImage::new(16, 8);
        for x in 0..4 {
            for y in 0..6 {
                page.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        page.save(res.join("tiny.png")).expect("page");
        let mut descriptor = String::from(
            "info face=\"Tiny\" size=8\ncommon lineHeight=8 base=6 scaleW=16 scaleH=8 pages=1\npage id=0 file=\"tiny.png\"\n",
        );
        for ch in ['t', 'i', 'n', 'y'] {
            descriptor.push_str(&format!(
                "char id={} x=0 y=0 width=4 height=6 xoffset=0 yoffset=1 xadvance=5 page=0\n",
                ch as u32
            ));
        }
        fs::write(res.join("tiny.fnt"), descriptor).expect("fnt");

        let mut db = ResourceDatabase::new(DatabaseOptions { quality: QualityTier::Low, cover_size: 100 });
        let exe = dir.path().join("GeometryDash.exe");
        db.add_source(Source::Game(crate::resource::GameProfile::from_gd_path("Test", &exe)));
        db.reload_all().await;

        let font = db.find("tiny.fnt", None).expect("font");
        let preview = db.fetch_preview(&font).await.expect("font preview");
        assert_eq!(preview.dimensions(), Some((20, 8)));
        assert_eq!(db.cache_stats().fonts, 1);
        assert!(db.find("tiny.png", None).is_none(), "font page must not surface as a sprite");
    }
}
