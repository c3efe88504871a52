use crate::error::{ResourceError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

/// Static icon shown for resources that have no image of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewIcon {
    Font,
    Audio,
    Unknown,
}

impl PreviewIcon {
    pub fn name(self) -> &'static str {
        match self {
            PreviewIcon::Font => "font",
            PreviewIcon::Audio => "audio",
            PreviewIcon::Unknown => "file",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Preview {
    Image(Arc<RgbaImage>),
    Icon(PreviewIcon),
}

impl Preview {
    pub fn image(&self) -> Option<&Arc<RgbaImage>> {
        match self {
            Preview::Image(image) => Some(image),
            Preview::Icon(_) => None,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image().map(|image| image.dimensions())
    }

    /// PNG bytes of the image; `None` for icons.
    pub fn encode_png(&self) -> Option<Result<Vec<u8>>> {
        self.image().map(|image| encode_png(image))
    }

    pub fn to_data_url(&self) -> Option<Result<String>> {
        self.encode_png().map(|bytes| bytes.map(|bytes| format!("data:image/png;base64,{}", STANDARD.encode(bytes))))
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|err| ResourceError::format("png", format!("encode failed: {err}")))?;
    Ok(bytes.into_inner())
}
