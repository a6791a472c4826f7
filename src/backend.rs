use std::sync::Arc;

use crate::error::{ShotError, ShotResult};
use crate::rect::CaptureRect;

/// Pixel encoding of the storage behind a mapped frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourcePixelFormat {
    Rgba8,
    Bgra8,
    /// Linear-light half floats, as read back from an HDR render target.
    Rgba16Float,
}

impl SourcePixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Rgba16Float => 8,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rgba8 => "rgba8",
            Self::Bgra8 => "bgra8",
            Self::Rgba16Float => "rgba16f",
        }
    }
}

/// Order in which rows are stored. GL-style readback produces bottom-up
/// rows; image files are written top-down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RowOrder {
    #[default]
    TopDown,
    BottomUp,
}

/// Shape of the pixels behind a [`PixelView`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelLayout {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of two consecutive rows.
    pub stride: usize,
    pub format: SourcePixelFormat,
    pub row_order: RowOrder,
}

impl PixelLayout {
    /// Tightly packed layout for `area`.
    pub fn packed(
        area: CaptureRect,
        format: SourcePixelFormat,
        row_order: RowOrder,
    ) -> ShotResult<Self> {
        let width = usize::try_from(area.width).map_err(|_| ShotError::BufferOverflow)?;
        let stride = width
            .checked_mul(format.bytes_per_pixel())
            .ok_or(ShotError::BufferOverflow)?;
        Ok(Self {
            width: area.width,
            height: area.height,
            stride,
            format,
            row_order,
        })
    }

    pub fn row_bytes(&self) -> ShotResult<usize> {
        usize::try_from(self.width)
            .ok()
            .and_then(|w| w.checked_mul(self.format.bytes_per_pixel()))
            .ok_or(ShotError::BufferOverflow)
    }

    /// Minimum storage length able to hold every row.
    pub fn required_len(&self) -> ShotResult<usize> {
        if self.height == 0 {
            return Ok(0);
        }
        let rows = usize::try_from(self.height - 1).map_err(|_| ShotError::BufferOverflow)?;
        self.stride
            .checked_mul(rows)
            .and_then(|base| base.checked_add(self.row_bytes().ok()?))
            .ok_or(ShotError::BufferOverflow)
    }
}

/// Read-only, reference-counted view of a mapped frame buffer.
///
/// Encode tasks hold clones of the view; the storage is only reclaimed by
/// its frame buffer once every clone has been dropped, which the ring
/// guarantees by waiting on the slot's task group before the next copy.
#[derive(Clone)]
pub struct PixelView {
    data: Arc<Vec<u8>>,
    layout: PixelLayout,
}

impl PixelView {
    pub fn new(data: Arc<Vec<u8>>, layout: PixelLayout) -> ShotResult<Self> {
        let row_bytes = layout.row_bytes()?;
        if layout.stride < row_bytes {
            return Err(ShotError::InvalidConfig(format!(
                "row stride {} is smaller than a {}-pixel {} row",
                layout.stride,
                layout.width,
                layout.format.as_str()
            )));
        }
        let required = layout.required_len()?;
        if data.len() < required {
            return Err(ShotError::InvalidConfig(format!(
                "pixel storage too small: got {} bytes, need {} for {}x{}",
                data.len(),
                required,
                layout.width,
                layout.height
            )));
        }
        Ok(Self { data, layout })
    }

    pub fn layout(&self) -> &PixelLayout {
        &self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    /// Row `index` in storage order, without trailing stride padding.
    pub fn storage_row(&self, index: usize) -> &[u8] {
        let start = index * self.layout.stride;
        let len = self.layout.width as usize * self.layout.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    /// Row `y` counted from the top of the image, whatever the storage order.
    pub fn image_row(&self, y: usize) -> &[u8] {
        match self.layout.row_order {
            RowOrder::TopDown => self.storage_row(y),
            RowOrder::BottomUp => self.storage_row(self.layout.height as usize - 1 - y),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for PixelView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelView")
            .field("layout", &self.layout)
            .field("data_len", &self.data.len())
            .field("shared", &Arc::strong_count(&self.data))
            .finish()
    }
}

/// One mappable readback target. A ring slot owns exactly one.
///
/// Sequencing is the caller's job: `copy` must have completed before `map`,
/// and `copy` must not run while views handed out by `map` are alive.
pub trait FrameBuffer: Send {
    /// Schedule a copy of `area` of the current render target into this
    /// buffer's storage.
    fn copy(&mut self, area: CaptureRect) -> ShotResult<()>;

    /// Expose the copied pixels. Called at most once per copy.
    fn map(&mut self) -> ShotResult<PixelView>;

    /// Release the mapping so the buffer can receive the next copy.
    fn unmap(&mut self);
}

/// Renderer-side collaborator that owns the render target.
pub trait ReadbackBackend: Send + Sync {
    /// Visible area of the frame that has just been rendered.
    fn window_area(&self) -> CaptureRect;

    fn create_frame_buffer(&self) -> ShotResult<Box<dyn FrameBuffer>>;
}
