//! Error types for the batching pipeline.

use crate::device::DeviceError;
use crate::raster::RasterShapeType;
use crate::state::{BatchState, LifecycleError};

/// Errors raised by batch preparation, combination and issue.
///
/// None of these are retried; a failed prepare or issue drops that batch's
/// output for the frame and the frame driver decides whether to abort.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A compare-and-swap lifecycle transition failed.
    Lifecycle(LifecycleError),
    /// The batch was caught mid-prepare or mid-issue by another caller.
    BatchInUse { state: BatchState },
    /// The batch was released (or never initialized) and cannot be used.
    BatchInvalid,
    /// The batch's draw calls were combined into another batch.
    BatchCombined,
    /// A degenerate or malformed draw call was rejected.
    InvalidDrawCall {
        index: Option<usize>,
        reason: &'static str,
    },
    /// Prepare artifacts are missing; `prepare` was skipped or `issue` ran twice.
    MissingSoftwareBuffer,
    /// The batch was never given a material.
    MissingMaterial,
    /// Depth buffering was requested but the device has it disabled.
    DepthBufferDisabled,
    /// The device could not provide a hardware buffer or resource.
    Device(DeviceError),
    /// No shader variant matched the requested raster configuration, even
    /// after the degradation ladder.
    ShaderNotFound {
        shape: Option<RasterShapeType>,
        shadowed: bool,
        textured: bool,
        simple: bool,
        has_ramp: bool,
    },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lifecycle(e) => write!(f, "{}", e),
            Self::BatchInUse { state } => {
                write!(f, "This batch is currently in use ({})", state)
            }
            Self::BatchInvalid => write!(f, "This batch is not valid"),
            Self::BatchCombined => write!(f, "Batch was combined into another batch"),
            Self::InvalidDrawCall { index, reason } => match index {
                Some(i) => write!(f, "Invalid draw call at index {}: {}", i, reason),
                None => write!(f, "Invalid draw call: {}", reason),
            },
            Self::MissingSoftwareBuffer => {
                write!(f, "Could not get a software buffer for this batch")
            }
            Self::MissingMaterial => write!(f, "Batch has no material"),
            Self::DepthBufferDisabled => {
                write!(f, "Depth buffering requested but the depth buffer is disabled")
            }
            Self::Device(e) => write!(f, "{}", e),
            Self::ShaderNotFound {
                shape,
                shadowed,
                textured,
                simple,
                has_ramp,
            } => write!(
                f,
                "Shader not found for raster shape {:?} (shadowed={}, textured={}, simple={}, ramp={})",
                shape, shadowed, textured, simple, has_ramp
            ),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<LifecycleError> for RenderError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}

impl From<DeviceError> for RenderError {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}
