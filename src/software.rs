//! CPU reference backend: a shared RGBA8 surface standing in for a render
//! target, and frame buffers that copy out of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{
    FrameBuffer, PixelLayout, PixelView, ReadbackBackend, RowOrder, SourcePixelFormat,
};
use crate::error::{ShotError, ShotResult};
use crate::rect::CaptureRect;

struct SurfaceState {
    width: u32,
    height: u32,
    /// Top-down RGBA8.
    pixels: Vec<u8>,
}

/// A resizable RGBA8 image the render loop draws into.
pub struct SoftwareSurface {
    state: Mutex<SurfaceState>,
}

fn surface_len(width: u32, height: u32) -> ShotResult<usize> {
    CaptureRect::full(width, height).byte_len(4)
}

impl SoftwareSurface {
    pub fn new(width: u32, height: u32) -> ShotResult<Self> {
        Ok(Self {
            state: Mutex::new(SurfaceState {
                width,
                height,
                pixels: vec![0; surface_len(width, height)?],
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> (u32, u32) {
        let state = self.lock();
        (state.width, state.height)
    }

    /// Resize, clearing to transparent black.
    pub fn resize(&self, width: u32, height: u32) -> ShotResult<()> {
        let len = surface_len(width, height)?;
        let mut state = self.lock();
        state.width = width;
        state.height = height;
        state.pixels.clear();
        state.pixels.resize(len, 0);
        Ok(())
    }

    pub fn fill(&self, rgba: [u8; 4]) {
        let mut state = self.lock();
        for px in state.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    pub fn put_pixel(&self, x: u32, y: u32, rgba: [u8; 4]) -> ShotResult<()> {
        let mut state = self.lock();
        if x >= state.width || y >= state.height {
            return Err(ShotError::BufferOverflow);
        }
        let offset = (y as usize * state.width as usize + x as usize) * 4;
        state.pixels[offset..offset + 4].copy_from_slice(&rgba);
        Ok(())
    }

    /// Run `draw` over the raw top-down RGBA8 pixels.
    pub fn draw<R>(&self, draw: impl FnOnce(u32, u32, &mut [u8]) -> R) -> R {
        let mut state = self.lock();
        let (width, height) = (state.width, state.height);
        draw(width, height, &mut state.pixels)
    }
}

/// [`ReadbackBackend`] over a [`SoftwareSurface`].
///
/// The readback format and row order are configurable so the conversion
/// paths a GPU backend would hit (BGRA, bottom-up) can be exercised on the
/// CPU.
#[derive(Clone)]
pub struct SoftwareBackend {
    surface: Arc<SoftwareSurface>,
    format: SourcePixelFormat,
    row_order: RowOrder,
}

impl SoftwareBackend {
    pub fn new(surface: Arc<SoftwareSurface>) -> Self {
        Self {
            surface,
            format: SourcePixelFormat::Rgba8,
            row_order: RowOrder::TopDown,
        }
    }

    pub fn with_readback_format(mut self, format: SourcePixelFormat) -> ShotResult<Self> {
        if format == SourcePixelFormat::Rgba16Float {
            return Err(ShotError::UnsupportedFormat(format.as_str().into()));
        }
        self.format = format;
        Ok(self)
    }

    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    pub fn surface(&self) -> &Arc<SoftwareSurface> {
        &self.surface
    }
}

impl ReadbackBackend for SoftwareBackend {
    fn window_area(&self) -> CaptureRect {
        let (width, height) = self.surface.size();
        CaptureRect::full(width, height)
    }

    fn create_frame_buffer(&self) -> ShotResult<Box<dyn FrameBuffer>> {
        Ok(Box::new(SoftwareFrameBuffer {
            surface: Arc::clone(&self.surface),
            format: self.format,
            row_order: self.row_order,
            storage: Arc::new(Vec::new()),
            layout: None,
        }))
    }
}

/// Readback target of a [`SoftwareBackend`]. The allocation is reused from
/// copy to copy.
pub struct SoftwareFrameBuffer {
    surface: Arc<SoftwareSurface>,
    format: SourcePixelFormat,
    row_order: RowOrder,
    storage: Arc<Vec<u8>>,
    layout: Option<PixelLayout>,
}

impl FrameBuffer for SoftwareFrameBuffer {
    fn copy(&mut self, area: CaptureRect) -> ShotResult<()> {
        self.layout = None;
        if area.is_empty() {
            return Err(ShotError::EmptyArea);
        }
        let layout = PixelLayout::packed(area, self.format, self.row_order)?;
        let len = layout.required_len()?;

        let state = self.surface.lock();
        if !area.fits_within(state.width, state.height) {
            return Err(ShotError::SurfaceLost);
        }
        let storage = Arc::get_mut(&mut self.storage).ok_or(ShotError::BufferInUse)?;
        storage.clear();
        storage.resize(len, 0);

        let src_stride = state.width as usize * 4;
        let x_offset = area.x as usize * 4;
        let rows = area.height as usize;
        for (i, dst_row) in storage.chunks_exact_mut(layout.stride).enumerate() {
            let y = match self.row_order {
                RowOrder::TopDown => area.y as usize + i,
                RowOrder::BottomUp => area.y as usize + rows - 1 - i,
            };
            let start = y * src_stride + x_offset;
            let src_row = &state.pixels[start..start + layout.stride];
            match self.format {
                SourcePixelFormat::Bgra8 => {
                    for (src, dst) in src_row.chunks_exact(4).zip(dst_row.chunks_exact_mut(4)) {
                        dst.copy_from_slice(&[src[2], src[1], src[0], src[3]]);
                    }
                }
                _ => dst_row.copy_from_slice(src_row),
            }
        }

        self.layout = Some(layout);
        Ok(())
    }

    fn map(&mut self) -> ShotResult<PixelView> {
        let layout = self.layout.ok_or(ShotError::NotCopied)?;
        PixelView::new(Arc::clone(&self.storage), layout)
    }

    fn unmap(&mut self) {}
}
