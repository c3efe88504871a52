//! Builds the resource list of a source: a classified walk of a game installation's resource
//! directory, or the resources a mod project declares in its manifest.

use crate::atlas::scan_frame_bytes;
use crate::error::{ResourceError, Result};
use crate::quality::{collapse, collapse_name, QualityTier};
use crate::resource::{
    AudioResource, FontResource, FrameOrigin, ModProject, Resource, ResourceHeader, SheetBacking, Source,
    SourceId, SpriteFrameResource, SpriteResource, SpriteSheetResource, UnknownResource,
};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub fn discover(source: &Source, quality: QualityTier) -> Result<Vec<Arc<Resource>>> {
    let source_id = source.id();
    let resources = match source {
        Source::Game(profile) => discover_directory(&profile.resources_dir()?, &source_id, quality)?,
        Source::Mod(project) => discover_mod(project, &source_id)?,
    };
    info!("[discovery] {source_id}: {} resources", resources.len());
    Ok(resources)
}

/// All files under `root`, depth first, sorted by name within each directory.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            ResourceError::io(path, std::io::Error::other(err))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Files matching any of `patterns` (relative to `root`), in pattern order without duplicates.
pub fn expand_globs(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for pattern in patterns {
        let full = root.join(pattern);
        let full = full.to_string_lossy();
        let matches = glob::glob(&full)
            .map_err(|err| ResourceError::format("manifest", format!("invalid glob '{pattern}': {err}")))?;
        for entry in matches {
            match entry {
                Ok(path) if path.is_file() => {
                    if seen.insert(path.clone()) {
                        files.push(path);
                    }
                }
                Ok(_) => {}
                Err(err) => warn!("[discovery] skipping unreadable match for '{pattern}': {err}"),
            }
        }
    }
    Ok(files)
}

fn extension_of(path: &Path) -> String {
    path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).unwrap_or_default()
}

fn file_name_of(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

fn canonical_id(path: &Path) -> String {
    collapse(path).to_string_lossy().into_owned()
}

// Resolved variant of `canonical`, or the file actually found when the tier's variant is missing.
fn resolve_variant(canonical: &Path, quality: QualityTier, discovered: &Path) -> PathBuf {
    let resolved = quality.resolve(canonical);
    if resolved.exists() {
        resolved
    } else {
        discovered.to_path_buf()
    }
}

fn group_by_directory(files: Vec<PathBuf>) -> Vec<(PathBuf, Vec<PathBuf>)> {
    let mut groups: Vec<(PathBuf, Vec<PathBuf>)> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();
    for file in files {
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        match index.get(&dir) {
            Some(&slot) => groups[slot].1.push(file),
            None => {
                index.insert(dir.clone(), groups.len());
                groups.push((dir, vec![file]));
            }
        }
    }
    groups
}

#[derive(Default)]
struct Registered {
    sheets: HashSet<String>,
    fonts: HashSet<String>,
    audio: HashSet<String>,
    sprites: HashSet<String>,
}

/// Classifies a game resource directory. Per directory: `.plist` files with a same-stem `.png`
/// become sheets, `.fnt` fonts, `.ogg`/`.mp3` audio, and `.png` files not claimed by a sheet or a
/// font become sprites. Each category keeps the first entry per collapsed name; other extensions
/// are ignored.
pub fn discover_directory(root: &Path, source: &SourceId, quality: QualityTier) -> Result<Vec<Arc<Resource>>> {
    let mut registered = Registered::default();
    let mut resources = Vec::new();
    for (dir, files) in group_by_directory(walk_files(root)?) {
        let names: HashSet<String> = files.iter().map(|file| file_name_of(file)).collect();
        let mut claimed: HashSet<String> = HashSet::new();

        for file in &files {
            let name = file_name_of(file);
            let collapsed = collapse_name(&name);
            let stem = file.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
            match extension_of(file).as_str() {
                "plist" => {
                    let texture = format!("{stem}.png");
                    if !names.contains(&texture) {
                        continue;
                    }
                    claimed.insert(collapse_name(&texture));
                    if !registered.sheets.insert(collapsed.clone()) {
                        debug!("[discovery] duplicate sheet '{}' skipped", file.display());
                        continue;
                    }
                    resources.push(Arc::new(build_physical_sheet(&dir, file, &collapsed, source, quality)));
                }
                "fnt" => {
                    claimed.insert(collapse_name(&format!("{stem}.png")));
                    if registered.fonts.insert(collapsed.clone()) {
                        let canonical = dir.join(&collapsed);
                        let path = resolve_variant(&canonical, quality, file);
                        resources.push(Arc::new(Resource::Font(FontResource {
                            header: ResourceHeader::new(canonical_id(&canonical), collapsed, source.clone()),
                            path,
                        })));
                    }
                }
                "ogg" | "mp3" => {
                    if registered.audio.insert(collapsed.clone()) {
                        resources.push(Arc::new(Resource::Audio(AudioResource {
                            header: ResourceHeader::new(canonical_id(file), collapsed, source.clone()),
                            path: file.clone(),
                        })));
                    }
                }
                _ => {}
            }
        }

        for file in files.iter().filter(|file| extension_of(file) == "png") {
            let collapsed = collapse_name(&file_name_of(file));
            if claimed.contains(&collapsed) || !registered.sprites.insert(collapsed.clone()) {
                continue;
            }
            let canonical = dir.join(&collapsed);
            let path = resolve_variant(&canonical, quality, file);
            resources.push(Arc::new(Resource::Sprite(SpriteResource {
                header: ResourceHeader::new(canonical_id(&canonical), collapsed, source.clone()),
                path,
            })));
        }
    }
    Ok(resources)
}

fn build_physical_sheet(
    dir: &Path,
    discovered: &Path,
    collapsed: &str,
    source: &SourceId,
    quality: QualityTier,
) -> Resource {
    let canonical = dir.join(collapsed);
    let plist = resolve_variant(&canonical, quality, discovered);
    let mut bitmap = plist.with_extension("png");
    if !bitmap.exists() {
        bitmap = discovered.with_extension("png");
    }
    let sheet_id = canonical_id(&canonical);
    let name = Path::new(collapsed).file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
    let mut sheet = SpriteSheetResource::new(
        ResourceHeader::new(sheet_id.clone(), collapsed, source.clone()),
        name,
        SheetBacking::Physical { plist: plist.clone(), bitmap: bitmap.clone() },
    );
    let frame_names = match fs::read(&plist)
        .map_err(|err| ResourceError::io(&plist, err))
        .and_then(|bytes| scan_frame_bytes(&bytes, &file_name_of(&bitmap)))
    {
        Ok(names) => names,
        Err(err) => {
            warn!("[discovery] could not scan frames of '{}': {err}", plist.display());
            Vec::new()
        }
    };
    for frame in frame_names {
        sheet.push_frame(SpriteFrameResource {
            header: ResourceHeader::new(format!("{sheet_id}::{frame}"), collapse_name(&frame), source.clone()),
            origin: FrameOrigin::Atlas {
                sheet: sheet_id.clone(),
                plist: plist.clone(),
                bitmap: bitmap.clone(),
                name: frame,
            },
        });
    }
    Resource::SpriteSheet(sheet)
}

fn classify_loose(path: PathBuf, source: &SourceId) -> Resource {
    let header = ResourceHeader::new(canonical_id(&path), collapse_name(&file_name_of(&path)), source.clone());
    match extension_of(&path).as_str() {
        "png" => Resource::Sprite(SpriteResource { header, path }),
        "ogg" | "mp3" => Resource::Audio(AudioResource { header, path }),
        "fnt" => Resource::Font(FontResource { header, path }),
        _ => Resource::Unknown(UnknownResource { header, path }),
    }
}

/// Resources declared by a mod manifest. Declared sheets are virtual: their frames are the loose
/// files matched by the sheet's patterns.
pub fn discover_mod(project: &ModProject, source: &SourceId) -> Result<Vec<Arc<Resource>>> {
    if !project.root.is_dir() {
        return Err(ResourceError::io(
            &project.root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "mod root is not a directory"),
        ));
    }
    let declared = &project.manifest.resources;
    let mut resources = Vec::new();

    let loose_patterns: Vec<String> = declared.files.iter().chain(&declared.sprites).cloned().collect();
    for path in expand_globs(&project.root, &loose_patterns)? {
        resources.push(Arc::new(classify_loose(path, source)));
    }

    for (name, patterns) in &declared.spritesheets {
        let mut sheet = SpriteSheetResource::new(
            ResourceHeader::new(format!("{source}/{name}"), name.clone(), source.clone()),
            name.clone(),
            SheetBacking::Virtual,
        );
        for path in expand_globs(&project.root, patterns)? {
            sheet.push_frame(SpriteFrameResource {
                header: ResourceHeader::new(canonical_id(&path), collapse_name(&file_name_of(&path)), source.clone()),
                origin: FrameOrigin::Loose { path },
            });
        }
        resources.push(Arc::new(Resource::SpriteSheet(sheet)));
    }

    for (name, font) in &declared.fonts {
        let path = project.root.join(&font.path);
        if !path.is_file() {
            debug!("[discovery] {source}: font '{name}' points at missing '{}'", path.display());
        }
        resources.push(Arc::new(Resource::Font(FontResource {
            header: ResourceHeader::new(canonical_id(&path), name.clone(), source.clone()),
            path,
        })));
    }
    Ok(resources)
}
