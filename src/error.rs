use std::time::Duration;

use thiserror::Error;

use crate::gpu::FramebufferStatus;

/// Failures the render core can observe. Only setup surfaces these to the
/// caller; inside a frame they are logged and the offending draw or pass is
/// dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Missing resource: {resource}")]
    ResourceMissing { resource: String },

    #[error("Framebuffer '{framebuffer}' is incomplete: {status:?}")]
    FramebufferIncomplete {
        framebuffer: String,
        status: FramebufferStatus,
    },

    #[error("Buffer '{buffer}' overflow: requested {requested} bytes, slot capacity {capacity} bytes")]
    BufferOverflow {
        buffer: String,
        requested: u64,
        capacity: u64,
    },

    #[error("Fence for frame slot {slot} did not signal within {timeout:?}")]
    FenceTimeout { slot: usize, timeout: Duration },

    #[error("Failed to compile shader '{label}'")]
    ShaderCompilation { label: String },

    #[error("Settings error: {0}")]
    Settings(String),
}

impl RenderError {
    pub fn missing(resource: impl Into<String>) -> Self {
        Self::ResourceMissing {
            resource: resource.into(),
        }
    }

    /// Whether the error only costs the current frame.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Self::ResourceMissing { .. } | Self::FramebufferIncomplete { .. } | Self::FenceTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffer_error_names_category() {
        let err = RenderError::FramebufferIncomplete {
            framebuffer: "Prepass".into(),
            status: FramebufferStatus::MissingAttachment,
        };
        let message = err.to_string();
        assert!(message.contains("Prepass"));
        assert!(message.contains("MissingAttachment"));
        assert!(err.is_frame_local());
    }

    #[test]
    fn overflow_is_not_frame_local() {
        let err = RenderError::BufferOverflow {
            buffer: "ActorData".into(),
            requested: 2048,
            capacity: 1024,
        };
        assert!(!err.is_frame_local());
    }
}
