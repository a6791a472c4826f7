use crate::error::ShotResult;
use crate::format::ShotFormat;
use crate::path_template;

/// A pending screenshot: where to write it and how to encode it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenshotRequest {
    template: String,
    format: ShotFormat,
}

impl ScreenshotRequest {
    /// Build a request, rejecting templates that cannot name a file.
    pub fn new(template: impl Into<String>, format: ShotFormat) -> ShotResult<Self> {
        let template = template.into();
        path_template::validate_template(&template)?;
        Ok(Self { template, format })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn format(&self) -> &ShotFormat {
        &self.format
    }
}

/// FIFO of requests waiting for their slot to be drained.
#[derive(Debug, Default)]
pub struct ScreenshotQueue {
    requests: Vec<ScreenshotRequest>,
}

impl ScreenshotQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: ScreenshotRequest) {
        self.requests.push(request);
    }

    /// Take every queued request in arrival order, leaving the queue empty.
    pub fn drain_all(&mut self) -> Vec<ScreenshotRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}
