//! Output format descriptors for screenshot requests.

/// Image file type written by an encode task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFileType {
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
    WebP,
}

impl ImageFileType {
    pub const ALL: [ImageFileType; 6] = [
        Self::Png,
        Self::Jpeg,
        Self::Bmp,
        Self::Tga,
        Self::Tiff,
        Self::WebP,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
            Self::Tga => "tga",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
        }
    }

    /// Accepted file extensions, preferred one first. Lowercase, with dot.
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Png => &[".png"],
            Self::Jpeg => &[".jpg", ".jpeg"],
            Self::Bmp => &[".bmp"],
            Self::Tga => &[".tga"],
            Self::Tiff => &[".tif", ".tiff"],
            Self::WebP => &[".webp"],
        }
    }

    pub fn preferred_extension(self) -> &'static str {
        self.extensions()[0]
    }

    /// Whether the codec can store an alpha channel.
    pub const fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg | Self::Bmp)
    }
}

/// Extensions of image files that get replaced rather than appended to when
/// a template's extension disagrees with the requested file type.
pub(crate) const KNOWN_IMAGE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".bmp", ".tga", ".tif", ".tiff", ".webp", ".exr", ".hdr", ".dpx",
    ".cin", ".jp2", ".j2c", ".rgb", ".sgi", ".gif", ".ppm", ".pgm", ".qoi",
];

/// Channel layout of the written image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorMode {
    /// Alpha dropped. The default, since render targets rarely carry
    /// meaningful alpha.
    #[default]
    Rgb,
    Rgba,
}

impl ColorMode {
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// PNG compression effort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

/// Everything an encode task needs to know about the file it writes. Owned
/// by its request and dropped when the task finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShotFormat {
    pub file_type: ImageFileType,
    pub color_mode: ColorMode,
    /// JPEG quality in `1..=100`; ignored by other file types.
    pub quality: u8,
    pub png_compression: PngCompression,
}

impl ShotFormat {
    pub const fn new(file_type: ImageFileType) -> Self {
        Self {
            file_type,
            color_mode: ColorMode::Rgb,
            quality: 90,
            png_compression: PngCompression::Default,
        }
    }

    pub const fn png() -> Self {
        Self::new(ImageFileType::Png)
    }

    pub fn jpeg(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            ..Self::new(ImageFileType::Jpeg)
        }
    }

    pub fn with_color_mode(mut self, color_mode: ColorMode) -> Self {
        self.color_mode = color_mode;
        self
    }

    pub fn with_png_compression(mut self, compression: PngCompression) -> Self {
        self.png_compression = compression;
        self
    }

    /// Color mode actually written: alpha is dropped for codecs that
    /// cannot store it.
    pub fn effective_color_mode(&self) -> ColorMode {
        if self.file_type.supports_alpha() {
            self.color_mode
        } else {
            ColorMode::Rgb
        }
    }
}

impl Default for ShotFormat {
    fn default() -> Self {
        Self::png()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preferred_extension_is_known() {
        for file_type in ImageFileType::ALL {
            for ext in file_type.extensions() {
                assert!(
                    KNOWN_IMAGE_EXTENSIONS.contains(ext),
                    "{ext} missing from known extensions"
                );
            }
        }
    }

    #[test]
    fn jpeg_drops_alpha_and_clamps_quality() {
        let format = ShotFormat::jpeg(0).with_color_mode(ColorMode::Rgba);
        assert_eq!(format.quality, 1);
        assert_eq!(format.effective_color_mode(), ColorMode::Rgb);
        let png = ShotFormat::png().with_color_mode(ColorMode::Rgba);
        assert_eq!(png.effective_color_mode(), ColorMode::Rgba);
    }
}
