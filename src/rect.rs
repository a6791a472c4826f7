//! Screen-space rectangles handed to frame buffer copies.

use crate::error::{ShotError, ShotResult};

/// A rectangle in render-target pixel coordinates, origin at the top-left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> ShotResult<Self> {
        if width == 0 || height == 0 {
            return Err(ShotError::InvalidConfig(
                "capture rectangle width and height must be > 0".into(),
            ));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Rectangle covering a whole `width`x`height` surface.
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Whether this rectangle lies entirely inside a `width`x`height`
    /// surface anchored at the origin.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.right() <= i64::from(width)
            && self.bottom() <= i64::from(height)
    }

    pub fn pixel_count(&self) -> ShotResult<usize> {
        let w = usize::try_from(self.width).map_err(|_| ShotError::BufferOverflow)?;
        let h = usize::try_from(self.height).map_err(|_| ShotError::BufferOverflow)?;
        w.checked_mul(h).ok_or(ShotError::BufferOverflow)
    }

    /// Byte length of this rectangle at `bytes_per_pixel`, tightly packed.
    pub fn byte_len(&self, bytes_per_pixel: usize) -> ShotResult<usize> {
        self.pixel_count()?
            .checked_mul(bytes_per_pixel)
            .ok_or(ShotError::BufferOverflow)
    }
}
