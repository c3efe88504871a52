//! Property-list texture atlases (cocos2d/TexturePacker `.plist`).

use crate::error::{ResourceError, Result};
use crate::quality::collapse_name;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Rectangle of a frame's footprint on the atlas bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtlasFrame {
    pub rect: FrameRect,
    pub rotated: bool,
    pub offset: [f32; 2],
    /// Logical (unrotated) frame size.
    pub size: [u32; 2],
    pub source_size: [u32; 2],
}

#[derive(Debug, Clone, Default)]
pub struct AtlasData {
    pub frames: HashMap<String, AtlasFrame>,
    pub texture_file: Option<String>,
    pub format: Option<i64>,
}

#[derive(Deserialize)]
struct AtlasFile {
    frames: BTreeMap<String, FrameFile>,
    #[serde(default)]
    metadata: Option<MetadataFile>,
}

#[derive(Deserialize)]
struct FrameKeysFile {
    frames: BTreeMap<String, plist::Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct FrameFile {
    texture_rect: Option<String>,
    frame: Option<String>,
    texture_rotated: Option<bool>,
    rotated: Option<bool>,
    sprite_offset: Option<String>,
    offset: Option<String>,
    sprite_size: Option<String>,
    sprite_source_size: Option<String>,
    source_size: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct MetadataFile {
    format: Option<i64>,
    texture_file_name: Option<String>,
    real_texture_file_name: Option<String>,
}

impl AtlasData {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let file: AtlasFile =
            plist::from_bytes(bytes).map_err(|err| ResourceError::format("atlas", err.to_string()))?;
        let mut frames = HashMap::with_capacity(file.frames.len());
        for (name, raw) in file.frames {
            let frame = build_frame(&raw).map_err(|err| match err {
                ResourceError::Format { message, .. } => {
                    ResourceError::format("atlas", format!("frame '{name}': {message}"))
                }
                other => other,
            })?;
            frames.insert(name, frame);
        }
        let metadata = file.metadata.unwrap_or_default();
        Ok(Self {
            frames,
            texture_file: metadata.real_texture_file_name.or(metadata.texture_file_name),
            format: metadata.format,
        })
    }

    pub fn frame(&self, name: &str) -> Option<&AtlasFrame> {
        self.frames.get(name)
    }

    pub fn frame_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.frames.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn build_frame(raw: &FrameFile) -> Result<AtlasFrame> {
    let rect_text = raw
        .texture_rect
        .as_deref()
        .or(raw.frame.as_deref())
        .ok_or_else(|| ResourceError::format("atlas", "missing textureRect/frame"))?;
    let rotated = raw.texture_rotated.or(raw.rotated).unwrap_or(false);
    let rect = parse_rect(rect_text, rotated)?;
    let logical = if rotated { [rect.h, rect.w] } else { [rect.w, rect.h] };
    let offset = match raw.sprite_offset.as_deref().or(raw.offset.as_deref()) {
        Some(text) => {
            let values = parse_numbers(text)?;
            match values.as_slice() {
                [x, y] => [*x as f32, *y as f32],
                _ => return Err(ResourceError::format("atlas", format!("offset '{text}' is not a pair"))),
            }
        }
        None => [0.0, 0.0],
    };
    let size = match raw.sprite_size.as_deref() {
        Some(text) => parse_size(text)?,
        None => logical,
    };
    let source_size = match raw.sprite_source_size.as_deref().or(raw.source_size.as_deref()) {
        Some(text) => parse_size(text)?,
        None => size,
    };
    Ok(AtlasFrame { rect, rotated, offset, size, source_size })
}

/// Parses a `{{x,y},{w,h}}` rectangle string. A rotated frame stores its logical size, so the
/// on-atlas footprint swaps width and height.
pub fn parse_rect(text: &str, rotated: bool) -> Result<FrameRect> {
    let values = parse_numbers(text)?;
    let [x, y, w, h] = values.as_slice() else {
        return Err(ResourceError::format("atlas", format!("rect '{text}' needs four numbers")));
    };
    let (x, y, w, h) = (to_u32(*x, text)?, to_u32(*y, text)?, to_u32(*w, text)?, to_u32(*h, text)?);
    Ok(if rotated { FrameRect { x, y, w: h, h: w } } else { FrameRect { x, y, w, h } })
}

fn parse_size(text: &str) -> Result<[u32; 2]> {
    match parse_numbers(text)?.as_slice() {
        [w, h] => Ok([to_u32(*w, text)?, to_u32(*h, text)?]),
        _ => Err(ResourceError::format("atlas", format!("size '{text}' is not a pair"))),
    }
}

// Brace notation is rewritten to JSON arrays and flattened.
fn parse_numbers(text: &str) -> Result<Vec<f64>> {
    let json: String = text
        .chars()
        .map(|ch| match ch {
            '{' => '[',
            '}' => ']',
            other => other,
        })
        .collect();
    let value: serde_json::Value = serde_json::from_str(&json)
        .map_err(|err| ResourceError::format("atlas", format!("invalid geometry '{text}': {err}")))?;
    let mut out = Vec::new();
    flatten_numbers(&value, &mut out, text)?;
    Ok(out)
}

fn flatten_numbers(value: &serde_json::Value, out: &mut Vec<f64>, source: &str) -> Result<()> {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                flatten_numbers(item, out, source)?;
            }
            Ok(())
        }
        serde_json::Value::Number(number) => {
            let value = number
                .as_f64()
                .ok_or_else(|| ResourceError::format("atlas", format!("invalid number in '{source}'")))?;
            out.push(value);
            Ok(())
        }
        _ => Err(ResourceError::format("atlas", format!("unexpected value in geometry '{source}'"))),
    }
}

fn to_u32(value: f64, source: &str) -> Result<u32> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(ResourceError::format("atlas", format!("coordinate {value} out of range in '{source}'")));
    }
    Ok(value.round() as u32)
}

/// Cheap scan for `[\w-]+\.png` names in raw atlas text, used to list frames without decoding the
/// atlas geometry. Names that collapse to `own_texture` are skipped; order of first appearance is
/// kept and duplicates dropped.
pub fn scan_frame_names(text: &str, own_texture: &str) -> Vec<String> {
    let own = collapse_name(own_texture);
    let bytes = text.as_bytes();
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for (index, _) in text.match_indices(".png") {
        let mut start = index;
        while start > 0 && is_word_byte(bytes[start - 1]) {
            start -= 1;
        }
        if start == index {
            continue;
        }
        let name = &text[start..index + 4];
        if collapse_name(name) == own {
            continue;
        }
        if seen.insert(name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Frame names of an atlas file in either plist encoding. Text plists go through
/// [`scan_frame_names`]; binary plists pack length markers against their strings, so their frame
/// keys are read through the plist decoder without building any geometry.
pub fn scan_frame_bytes(bytes: &[u8], own_texture: &str) -> Result<Vec<String>> {
    if !bytes.starts_with(b"bplist") {
        return Ok(scan_frame_names(&String::from_utf8_lossy(bytes), own_texture));
    }
    let file: FrameKeysFile =
        plist::from_bytes(bytes).map_err(|err| ResourceError::format("atlas", err.to_string()))?;
    let own = collapse_name(own_texture);
    Ok(file.frames.into_keys().filter(|name| collapse_name(name) != own).collect())
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>frames</key>
    <dict>
        <key>button_001.png</key>
        <dict>
            <key>aliases</key><array/>
            <key>spriteOffset</key><string>{0,-1}</string>
            <key>spriteSize</key><string>{30,40}</string>
            <key>spriteSourceSize</key><string>{32,42}</string>
            <key>textureRect</key><string>{{10,20},{30,40}}</string>
            <key>textureRotated</key><true/>
        </dict>
        <key>legacy_002.png</key>
        <dict>
            <key>frame</key><string>{{0,0},{8,4}}</string>
            <key>offset</key><string>{0.5,0}</string>
            <key>rotated</key><false/>
            <key>sourceSize</key><string>{8,4}</string>
        </dict>
    </dict>
    <key>metadata</key>
    <dict>
        <key>format</key><integer>3</integer>
        <key>textureFileName</key><string>GJ_GameSheet-hd.png</string>
    </dict>
</dict>
</plist>"#;

    #[test]
    fn unrotated_rect_keeps_axes() {
        let rect = parse_rect("{{10,20},{30,40}}", false).expect("rect");
        assert_eq!(rect, FrameRect { x: 10, y: 20, w: 30, h: 40 });
    }

    #[test]
    fn rotated_rect_swaps_axes() {
        let rect = parse_rect("{{10,20},{30,40}}", true).expect("rect");
        assert_eq!(rect, FrameRect { x: 10, y: 20, w: 40, h: 30 });
    }

    #[test]
    fn rect_with_wrong_arity_is_a_format_error() {
        let err = parse_rect("{{10,20},{30}}", false).unwrap_err();
        assert!(matches!(err, ResourceError::Format { kind: "atlas", .. }));
        assert!(parse_rect("{{a,b},{c,d}}", false).is_err());
    }

    #[test]
    fn parses_both_frame_formats() {
        let atlas = AtlasData::parse(SHEET.as_bytes()).expect("parse atlas");
        assert_eq!(atlas.frames.len(), 2);
        assert_eq!(atlas.texture_file.as_deref(), Some("GJ_GameSheet-hd.png"));
        assert_eq!(atlas.format, Some(3));

        let button = atlas.frame("button_001.png").expect("button frame");
        assert!(button.rotated);
        assert_eq!(button.rect, FrameRect { x: 10, y: 20, w: 40, h: 30 });
        assert_eq!(button.size, [30, 40]);
        assert_eq!(button.source_size, [32, 42]);
        assert_eq!(button.offset, [0.0, -1.0]);

        let legacy = atlas.frame("legacy_002.png").expect("legacy frame");
        assert!(!legacy.rotated);
        assert_eq!(legacy.rect, FrameRect { x: 0, y: 0, w: 8, h: 4 });
        assert_eq!(legacy.offset, [0.5, 0.0]);
        assert_eq!(atlas.frame_names(), vec!["button_001.png", "legacy_002.png"]);
    }

    #[test]
    fn malformed_plist_fails() {
        assert!(AtlasData::parse(b"<plist><dict><key>frames</key>").is_err());
    }

    #[test]
    fn scan_excludes_own_texture_and_duplicates() {
        let names = scan_frame_names(SHEET, "GJ_GameSheet.png");
        assert_eq!(names, vec!["button_001.png".to_string(), "legacy_002.png".to_string()]);

        let repeated = scan_frame_names("a_1.png b_2.png a_1.png .png", "sheet.png");
        assert_eq!(repeated, vec!["a_1.png".to_string(), "b_2.png".to_string()]);
    }

    #[test]
    fn binary_sheet_frames_are_scanned_by_key() {
        let value = plist::Value::from_reader_xml(SHEET.as_bytes()).expect("xml plist");
        let mut binary = Vec::new();
        value.to_writer_binary(&mut binary).expect("binary plist");
        assert!(binary.starts_with(b"bplist"));

        let names = scan_frame_bytes(&binary, "GJ_GameSheet.png").expect("scan binary");
        assert_eq!(names, vec!["button_001.png".to_string(), "legacy_002.png".to_string()]);
        assert_eq!(AtlasData::parse(&binary).expect("parse binary").frames.len(), 2);

        let text = scan_frame_bytes(SHEET.as_bytes(), "GJ_GameSheet.png").expect("scan text");
        assert_eq!(text, names);
        assert!(scan_frame_bytes(b"bplist00garbage", "sheet.png").is_err());
    }
}
