//! BMFont text descriptor (`.fnt`) parsing and glyph-strip rendering.
//!
//! Parsing is all-or-nothing: any structurally invalid line aborts with
//! [`ResourceError::Format`] and no partially populated [`FontData`] is returned.

use crate::error::{ResourceError, Result};
use image::{imageops, RgbaImage};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontInfo {
    pub face: String,
    pub size: i32,
    pub bold: bool,
    pub italic: bool,
    pub charset: String,
    pub unicode: bool,
    pub padding: [i32; 4],
    pub spacing: [i32; 2],
    pub outline: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FontCommon {
    pub line_height: i32,
    pub base: i32,
    pub scale_w: i32,
    pub scale_h: i32,
    pub pages: i32,
    pub packed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FontChar {
    pub id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub xoffset: i32,
    pub yoffset: i32,
    pub xadvance: i32,
    pub page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kerning {
    pub first: u32,
    pub second: u32,
    pub amount: i32,
}

#[derive(Debug, Clone, Default)]
pub struct FontData {
    pub info: FontInfo,
    pub common: FontCommon,
    /// Texture file names keyed by page id.
    pub pages: BTreeMap<u32, String>,
    pub chars: BTreeMap<u32, FontChar>,
    pub kernings: Vec<Kerning>,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Text(String),
    Int(i64),
    List(Vec<i64>),
}

struct Pairs {
    tag: String,
    entries: Vec<(String, Value)>,
}

impl Pairs {
    fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().rev().find(|(name, _)| *name == key).map(|(_, value)| value)
    }

    fn int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Int(value)) => Ok(Some(*value)),
            Some(other) => Err(ResourceError::format(
                "font",
                format!("'{}' field '{key}' expects an integer, got {other:?}", self.tag),
            )),
        }
    }

    fn i32_or_zero(&self, key: &str) -> Result<i32> {
        let value = self.int(key)?.unwrap_or(0);
        i32::try_from(value)
            .map_err(|_| ResourceError::format("font", format!("'{}' field '{key}' out of range", self.tag)))
    }

    fn u32_or_zero(&self, key: &str) -> Result<u32> {
        let value = self.int(key)?.unwrap_or(0);
        u32::try_from(value)
            .map_err(|_| ResourceError::format("font", format!("'{}' field '{key}' out of range", self.tag)))
    }

    fn flag(&self, key: &str) -> Result<bool> {
        Ok(self.int(key)?.unwrap_or(0) != 0)
    }

    fn text(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::Text(text)) => Some(text.clone()),
            Some(Value::Int(value)) => Some(value.to_string()),
            _ => None,
        }
    }

    fn list<const N: usize>(&self, key: &str) -> Result<[i32; N]> {
        let mut out = [0; N];
        let values = match self.get(key) {
            None => return Ok(out),
            Some(Value::List(values)) => values.clone(),
            Some(Value::Int(value)) => vec![*value],
            Some(Value::Text(text)) => {
                return Err(ResourceError::format(
                    "font",
                    format!("'{}' field '{key}' expects a number list, got '{text}'", self.tag),
                ))
            }
        };
        for (dst, value) in out.iter_mut().zip(values) {
            *dst = i32::try_from(value).map_err(|_| {
                ResourceError::format("font", format!("'{}' field '{key}' out of range", self.tag))
            })?;
        }
        Ok(out)
    }
}

impl FontData {
    pub fn parse(text: &str) -> Result<Self> {
        let mut font = FontData::default();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let pairs = parse_line(line)
                .map_err(|err| ResourceError::format("font", format!("line {}: {}", index + 1, describe(err))))?;
            font.apply(&pairs)
                .map_err(|err| ResourceError::format("font", format!("line {}: {}", index + 1, describe(err))))?;
        }
        Ok(font)
    }

    fn apply(&mut self, pairs: &Pairs) -> Result<()> {
        match pairs.tag.as_str() {
            "info" => {
                self.info = FontInfo {
                    face: pairs.text("face").unwrap_or_default(),
                    size: pairs.i32_or_zero("size")?,
                    bold: pairs.flag("bold")?,
                    italic: pairs.flag("italic")?,
                    charset: pairs.text("charset").unwrap_or_default(),
                    unicode: pairs.flag("unicode")?,
                    padding: pairs.list("padding")?,
                    spacing: pairs.list("spacing")?,
                    outline: pairs.i32_or_zero("outline")?,
                };
            }
            "common" => {
                self.common = FontCommon {
                    line_height: pairs.i32_or_zero("lineHeight")?,
                    base: pairs.i32_or_zero("base")?,
                    scale_w: pairs.i32_or_zero("scaleW")?,
                    scale_h: pairs.i32_or_zero("scaleH")?,
                    pages: pairs.i32_or_zero("pages")?,
                    packed: pairs.flag("packed")?,
                };
            }
            "page" => {
                let (Some(id), Some(Value::Text(file))) = (pairs.int("id")?, pairs.get("file")) else {
                    return Err(ResourceError::format("font", "page line requires both id and file"));
                };
                let id = u32::try_from(id)
                    .map_err(|_| ResourceError::format("font", format!("invalid page id {id}")))?;
                if file.is_empty() {
                    return Err(ResourceError::format("font", format!("page {id} has an empty file name")));
                }
                self.pages.insert(id, file.clone());
            }
            "char" => {
                let glyph = FontChar {
                    id: pairs.u32_or_zero("id")?,
                    x: pairs.u32_or_zero("x")?,
                    y: pairs.u32_or_zero("y")?,
                    width: pairs.u32_or_zero("width")?,
                    height: pairs.u32_or_zero("height")?,
                    xoffset: pairs.i32_or_zero("xoffset")?,
                    yoffset: pairs.i32_or_zero("yoffset")?,
                    xadvance: pairs.i32_or_zero("xadvance")?,
                    page: pairs.u32_or_zero("page")?,
                };
                self.chars.insert(glyph.id, glyph);
            }
            "kerning" => {
                self.kernings.push(Kerning {
                    first: pairs.u32_or_zero("first")?,
                    second: pairs.u32_or_zero("second")?,
                    amount: pairs.i32_or_zero("amount")?,
                });
            }
            // count announcements only
            "chars" | "kernings" => {}
            other => log::debug!("[font] ignoring unknown tag '{other}'"),
        }
        Ok(())
    }

    pub fn glyph(&self, ch: char) -> Option<&FontChar> {
        self.chars.get(&(ch as u32))
    }

    pub fn kerning(&self, first: char, second: char) -> i32 {
        self.kernings
            .iter()
            .find(|k| k.first == first as u32 && k.second == second as u32)
            .map(|k| k.amount)
            .unwrap_or(0)
    }

    /// Draws `text` left to right using glyph regions cut from `pages`. Characters without a glyph
    /// or whose page is missing are skipped.
    pub fn render_text(&self, pages: &BTreeMap<u32, Arc<RgbaImage>>, text: &str) -> Result<RgbaImage> {
        let mut placements = Vec::new();
        let mut cursor = 0_i64;
        let mut bottom = i64::from(self.common.line_height.max(1));
        let mut previous: Option<char> = None;
        for ch in text.chars() {
            let Some(glyph) = self.glyph(ch) else {
                continue;
            };
            if let Some(prev) = previous {
                cursor += i64::from(self.kerning(prev, ch));
            }
            if glyph.width > 0 && glyph.height > 0 {
                if let Some(page) = pages.get(&glyph.page) {
                    let x = cursor + i64::from(glyph.xoffset);
                    let y = i64::from(glyph.yoffset);
                    bottom = bottom.max(y + i64::from(glyph.height));
                    placements.push((page, *glyph, x, y));
                }
            }
            cursor += i64::from(glyph.xadvance);
            previous = Some(ch);
        }
        if placements.is_empty() {
            return Err(ResourceError::format("font", format!("no renderable glyphs for '{text}'")));
        }
        let width = placements
            .iter()
            .map(|(_, glyph, x, _)| x + i64::from(glyph.width))
            .max()
            .unwrap_or(0)
            .max(cursor)
            .max(1);
        let mut canvas = RgbaImage::new(clamp_dimension(width), clamp_dimension(bottom));
        for (page, glyph, x, y) in placements {
            let region = imageops::crop_imm(page.as_ref(), glyph.x, glyph.y, glyph.width, glyph.height).to_image();
            imageops::overlay(&mut canvas, &region, x, y);
        }
        Ok(canvas)
    }
}

fn clamp_dimension(value: i64) -> u32 {
    u32::try_from(value.clamp(1, 4096)).unwrap_or(1)
}

fn describe(err: ResourceError) -> String {
    match err {
        ResourceError::Format { message, .. } => message,
        other => other.to_string(),
    }
}

fn parse_line(line: &str) -> Result<Pairs> {
    let line = strip_letter_field(line);
    let (tag, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| ResourceError::format("font", format!("line '{line}' has no fields")))?;
    let mut entries = Vec::new();
    for token in tokenize(rest)? {
        let (key, raw) = token
            .split_once('=')
            .ok_or_else(|| ResourceError::format("font", format!("expected key=value, got '{token}'")))?;
        entries.push((key.to_string(), parse_value(raw)?));
    }
    Ok(Pairs { tag: tag.to_string(), entries })
}

// `letter="x"` may quote a space or a quote character, which the generic tokenizer cannot handle.
fn strip_letter_field(line: &str) -> std::borrow::Cow<'_, str> {
    const MARKER: &str = "letter=\"";
    let Some(start) = line.find(MARKER) else {
        return std::borrow::Cow::Borrowed(line);
    };
    let content = start + MARKER.len();
    let mut end = line.len();
    let mut chars = line[content..].char_indices();
    // the first character is always part of the letter, even when it is a quote
    chars.next();
    for (offset, ch) in chars {
        let at = content + offset;
        if ch == '"' && line[at + 1..].chars().next().map_or(true, char::is_whitespace) {
            end = at + 1;
            break;
        }
    }
    let mut stripped = String::with_capacity(line.len());
    stripped.push_str(line[..start].trim_end());
    stripped.push(' ');
    stripped.push_str(line[end..].trim_start());
    std::borrow::Cow::Owned(stripped.trim_end().to_string())
}

fn tokenize(rest: &str) -> Result<Vec<&str>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut quoted = false;
    for (index, ch) in rest.char_indices() {
        match ch {
            '"' => {
                quoted = !quoted;
                start.get_or_insert(index);
            }
            c if c.is_whitespace() && !quoted => {
                if let Some(begin) = start.take() {
                    tokens.push(&rest[begin..index]);
                }
            }
            _ => {
                start.get_or_insert(index);
            }
        }
    }
    if quoted {
        return Err(ResourceError::format("font", "unterminated quoted value"));
    }
    if let Some(begin) = start {
        tokens.push(&rest[begin..]);
    }
    Ok(tokens)
}

fn parse_value(raw: &str) -> Result<Value> {
    if let Some(inner) = raw.strip_prefix('"') {
        let inner = inner
            .strip_suffix('"')
            .ok_or_else(|| ResourceError::format("font", format!("unterminated string {raw}")))?;
        return Ok(Value::Text(inner.to_string()));
    }
    if raw.contains(',') {
        let values = raw
            .split(',')
            .map(|part| part.trim().parse::<i64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| ResourceError::format("font", format!("invalid number list '{raw}'")))?;
        return Ok(Value::List(values));
    }
    Ok(match raw.parse::<i64>() {
        Ok(value) => Value::Int(value),
        Err(_) => Value::Text(raw.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const SAMPLE: &str = r#"info face="Pusab Regular" size=32 bold=0 italic=0 charset="" unicode=1 stretchH=100 smooth=1 aa=1 padding=0,0,0,0 spacing=2,2
common lineHeight=36 base=29 scaleW=256 scaleH=128 pages=1 packed=0
page id=0 file="bigFont.png"
chars count=3
char id=32   x=0     y=0     width=0     height=0     xoffset=0     yoffset=29    xadvance=9     page=0  chnl=15 letter="space"
char id=65   x=2     y=2     width=4     height=6     xoffset=1     yoffset=3     xadvance=6     page=0  chnl=15 letter="A"
char id=34   x=8     y=2     width=3     height=3     xoffset=0     yoffset=2     xadvance=4     page=0  chnl=15 letter="""
kernings count=1
kerning first=65  second=65  amount=-1
"#;

    #[test]
    fn parses_common_metrics_and_pages() {
        let font = FontData::parse(SAMPLE).expect("parse font");
        assert_eq!(font.common.line_height, 36);
        assert_eq!(font.common.base, 29);
        assert_eq!(font.common.scale_w, 256);
        assert_eq!(font.pages, BTreeMap::from([(0, "bigFont.png".to_string())]));
        assert_eq!(font.info.face, "Pusab Regular");
        assert_eq!(font.info.spacing, [2, 2]);
        assert!(font.info.unicode);
    }

    #[test]
    fn parses_chars_including_quoted_letters() {
        let font = FontData::parse(SAMPLE).expect("parse font");
        assert_eq!(font.chars.len(), 3);
        let a = font.glyph('A').expect("glyph A");
        assert_eq!((a.x, a.y, a.width, a.height), (2, 2, 4, 6));
        assert_eq!((a.xoffset, a.yoffset, a.xadvance), (1, 3, 6));
        assert!(font.glyph('"').is_some());
        assert_eq!(font.kerning('A', 'A'), -1);
    }

    #[test]
    fn page_without_file_fails_whole_parse() {
        let text = "common lineHeight=10 base=8\npage id=0\n";
        let err = FontData::parse(text).unwrap_err();
        assert!(matches!(err, ResourceError::Format { kind: "font", .. }));
        assert!(err.to_string().contains("page line"), "unexpected error: {err}");
    }

    #[test]
    fn out_of_range_page_id_is_a_format_error() {
        for line in [
            "page id=9223372036854775807 file=\"a.png\"",
            "page id=-1 file=\"a.png\"",
            "page id=4294967296 file=\"a.png\"",
        ] {
            let err = FontData::parse(&format!("{line}\n")).unwrap_err();
            assert!(matches!(err, ResourceError::Format { kind: "font", .. }), "{line}: {err}");
            assert!(err.to_string().contains("invalid page id"), "unexpected error: {err}");
        }
    }

    #[test]
    fn sparse_page_ids_leave_no_empty_slots() {
        let font = FontData::parse("page id=0 file=\"a.png\"\npage id=3 file=\"b.png\"\n").expect("parse font");
        assert_eq!(font.pages.len(), 2);
        assert_eq!(font.pages.get(&3).map(String::as_str), Some("b.png"));
        assert!(font.pages.values().all(|file| !file.is_empty()));
        assert!(FontData::parse("page id=1 file=\"\"\n").is_err());
    }

    #[test]
    fn line_without_fields_fails() {
        let err = FontData::parse("common lineHeight=10\ngarbage\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "unexpected error: {err}");
    }

    #[test]
    fn renders_glyph_strip() {
        let font = FontData::parse(SAMPLE).expect("parse font");
        let mut page = RgbaImage::new(16, 16);
        for y in 2..8 {
            for x in 2..6 {
                page.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        let rendered = font.render_text(&BTreeMap::from([(0, Arc::new(page))]), "A A").expect("render");
        assert_eq!(rendered.height(), 36);
        assert_eq!(rendered.get_pixel(1, 3), &Rgba([255, 0, 0, 255]));
        assert_eq!(rendered.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn rendering_without_glyphs_is_an_error() {
        let font = FontData::parse(SAMPLE).expect("parse font");
        assert!(font.render_text(&BTreeMap::new(), "A").is_err());
    }
}
