//! Encode tasks: turn one mapped frame plus one request into one file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::tga::TgaEncoder;
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::backend::PixelView;
use crate::convert;
use crate::error::{ShotError, ShotResult};
use crate::format::{ColorMode, ImageFileType, PngCompression, ShotFormat};
use crate::path_template;
use crate::request::ScreenshotRequest;
use crate::stats::ShotStats;

/// Sink for encoded screenshots.
///
/// `pixels` is tightly packed, top-down, with `mode.channels()` bytes per
/// pixel. Called concurrently from every encode worker.
pub trait ImageWriter: Send + Sync {
    fn write(
        &self,
        path: &Path,
        pixels: &[u8],
        width: u32,
        height: u32,
        mode: ColorMode,
        format: &ShotFormat,
    ) -> ShotResult<()>;
}

/// Writes files with the `image` crate's encoders.
#[derive(Clone, Copy, Debug)]
pub struct ImageCrateWriter {
    create_parent_dirs: bool,
}

impl ImageCrateWriter {
    pub fn new(create_parent_dirs: bool) -> Self {
        Self { create_parent_dirs }
    }
}

impl Default for ImageCrateWriter {
    fn default() -> Self {
        Self::new(true)
    }
}

fn extended_color_type(mode: ColorMode) -> ExtendedColorType {
    match mode {
        ColorMode::Rgb => ExtendedColorType::Rgb8,
        ColorMode::Rgba => ExtendedColorType::Rgba8,
    }
}

fn png_compression(compression: PngCompression) -> CompressionType {
    match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    }
}

impl ImageWriter for ImageCrateWriter {
    fn write(
        &self,
        path: &Path,
        pixels: &[u8],
        width: u32,
        height: u32,
        mode: ColorMode,
        format: &ShotFormat,
    ) -> ShotResult<()> {
        if self.create_parent_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let color = extended_color_type(mode);
        let mut out = BufWriter::new(File::create(path)?);
        match format.file_type {
            ImageFileType::Png => PngEncoder::new_with_quality(
                &mut out,
                png_compression(format.png_compression),
                FilterType::Adaptive,
            )
            .write_image(pixels, width, height, color)?,
            ImageFileType::Jpeg => JpegEncoder::new_with_quality(&mut out, format.quality)
                .write_image(pixels, width, height, color)?,
            ImageFileType::Bmp => {
                BmpEncoder::new(&mut out).write_image(pixels, width, height, color)?
            }
            ImageFileType::Tga => {
                TgaEncoder::new(&mut out).write_image(pixels, width, height, color)?
            }
            ImageFileType::Tiff => {
                TiffEncoder::new(&mut out).write_image(pixels, width, height, color)?
            }
            ImageFileType::WebP => {
                WebPEncoder::new_lossless(&mut out).write_image(pixels, width, height, color)?
            }
        }
        out.flush()?;
        Ok(())
    }
}

/// Outcome of one encode task, delivered to subscribers.
#[derive(Clone, Debug)]
pub enum ShotEvent {
    Written {
        frame: u64,
        path: PathBuf,
    },
    Failed {
        frame: u64,
        path: PathBuf,
        error: Arc<ShotError>,
    },
}

impl ShotEvent {
    pub fn frame(&self) -> u64 {
        match self {
            Self::Written { frame, .. } | Self::Failed { frame, .. } => *frame,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Written { path, .. } | Self::Failed { path, .. } => path,
        }
    }
}

/// Fan-out of [`ShotEvent`]s to every live subscriber.
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<ShotEvent>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self, tx: Sender<ShotEvent>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
    }

    pub(crate) fn publish(&self, event: ShotEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Shared state every encode task reports to.
#[derive(Clone)]
pub(crate) struct EncodeContext {
    pub(crate) writer: Arc<dyn ImageWriter>,
    pub(crate) stats: Arc<ShotStats>,
    pub(crate) events: Arc<EventHub>,
}

/// One pending file write. Holds its own clone of the slot's pixels and its
/// own request; both are released when `run` returns.
pub struct EncodeTask {
    pixels: PixelView,
    request: ScreenshotRequest,
    frame: u64,
}

impl EncodeTask {
    pub fn new(pixels: PixelView, request: ScreenshotRequest, frame: u64) -> Self {
        Self {
            pixels,
            request,
            frame,
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Destination after frame substitution and extension normalization.
    pub fn output_path(&self) -> PathBuf {
        path_template::resolve_output_path(
            self.request.template(),
            self.frame,
            self.request.format().file_type,
        )
    }

    pub(crate) fn run(self, ctx: &EncodeContext) {
        let path = self.output_path();
        let EncodeTask {
            pixels,
            request,
            frame,
        } = self;
        let result = encode_view(&pixels, request.format(), &path, ctx.writer.as_ref());
        drop(pixels);

        match result {
            Ok(()) => {
                ShotStats::bump(&ctx.stats.files_written);
                log::debug!("wrote screenshot frame {frame} to {}", path.display());
                ctx.events.publish(ShotEvent::Written { frame, path });
            }
            Err(err) => {
                ShotStats::bump(&ctx.stats.encode_failures);
                log::error!(
                    "failed to write screenshot frame {frame} to {}: {err}",
                    path.display()
                );
                ctx.events.publish(ShotEvent::Failed {
                    frame,
                    path,
                    error: Arc::new(err),
                });
            }
        }
    }
}

impl std::fmt::Debug for EncodeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeTask")
            .field("frame", &self.frame)
            .field("template", &self.request.template())
            .field("width", &self.pixels.width())
            .field("height", &self.pixels.height())
            .finish()
    }
}

fn encode_view(
    pixels: &PixelView,
    format: &ShotFormat,
    path: &Path,
    writer: &dyn ImageWriter,
) -> ShotResult<()> {
    let mode = format.effective_color_mode();
    let buffer = convert::convert_to_encodable(pixels, mode)?;
    writer.write(path, &buffer, pixels.width(), pixels.height(), mode, format)
}
