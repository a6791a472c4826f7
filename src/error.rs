use std::fmt;

#[derive(Debug)]
pub enum ShotError {
    InvalidConfig(String),

    /// The path template handed to `request_screenshot` cannot name a file.
    InvalidRequest(String),

    /// The render surface no longer covers the requested area (resized or
    /// destroyed between frames).
    SurfaceLost,

    /// `map` was called on a frame buffer that has not received a copy.
    NotCopied,

    /// The visible area reported by the backend has zero width or height.
    EmptyArea,

    /// A frame buffer was asked to copy while readers still hold its pixels.
    BufferInUse,

    UnsupportedFormat(String),

    BufferOverflow,

    /// The coordinator owning the request channel has been dropped.
    CoordinatorGone,

    Encode(image::ImageError),

    Io(std::io::Error),

    Platform(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShotErrorClass {
    InvalidInput,
    Capture,
    Encode,
    Misuse,
    Fatal,
}

impl ShotError {
    pub fn class(&self) -> ShotErrorClass {
        match self {
            Self::InvalidConfig(_) | Self::InvalidRequest(_) => ShotErrorClass::InvalidInput,
            Self::SurfaceLost | Self::NotCopied | Self::EmptyArea => ShotErrorClass::Capture,
            Self::Encode(_) | Self::Io(_) | Self::UnsupportedFormat(_) => ShotErrorClass::Encode,
            Self::BufferInUse => ShotErrorClass::Misuse,
            Self::BufferOverflow | Self::CoordinatorGone | Self::Platform(_) => {
                ShotErrorClass::Fatal
            }
        }
    }

    /// Whether skipping the current cycle is enough to recover.
    pub fn is_transient(&self) -> bool {
        matches!(self.class(), ShotErrorClass::Capture)
    }
}

impl fmt::Display for ShotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(message) => {
                write!(f, "invalid screenshot configuration: {message}")
            }
            Self::InvalidRequest(message) => write!(f, "invalid screenshot request: {message}"),
            Self::SurfaceLost => write!(f, "render surface no longer covers the capture area"),
            Self::NotCopied => write!(f, "frame buffer mapped before any copy completed"),
            Self::EmptyArea => write!(f, "capture area is empty"),
            Self::BufferInUse => write!(f, "frame buffer reused while encode tasks still read it"),
            Self::UnsupportedFormat(name) => write!(f, "unsupported pixel or image format: {name}"),
            Self::BufferOverflow => write!(f, "pixel buffer size overflow"),
            Self::CoordinatorGone => write!(f, "screenshot coordinator is no longer running"),
            Self::Encode(inner) => write!(f, "image encoding failed: {inner}"),
            Self::Io(inner) => write!(f, "{inner}"),
            Self::Platform(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for ShotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(inner) => Some(inner),
            Self::Io(inner) => Some(inner),
            Self::Platform(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ShotError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for ShotError {
    fn from(err: image::ImageError) -> Self {
        Self::Encode(err)
    }
}

pub type ShotResult<T> = Result<T, ShotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_errors_are_transient_and_misuse_is_not() {
        assert!(ShotError::SurfaceLost.is_transient());
        assert!(ShotError::EmptyArea.is_transient());
        assert!(!ShotError::BufferInUse.is_transient());
        assert_eq!(ShotError::BufferInUse.class(), ShotErrorClass::Misuse);
        assert_eq!(
            ShotError::InvalidRequest("empty".into()).class(),
            ShotErrorClass::InvalidInput
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = ShotError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only volume",
        ));
        assert_eq!(err.class(), ShotErrorClass::Encode);
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "read-only volume");
    }
}
