//! Fixed-function state of each pass.

use crate::gpu::{BlendFactor, BlendState, CullMode, DepthFunction, PipelineState};

pub(crate) fn shadow() -> PipelineState {
    PipelineState {
        depth_function: DepthFunction::LessEqual,
        cull_mode: CullMode::None,
        ..PipelineState::default()
    }
}

pub(crate) fn prepass() -> PipelineState {
    PipelineState {
        depth_function: DepthFunction::LessEqual,
        ..PipelineState::default()
    }
}

/// First light: overwrite whatever the target held. Only fragments that won
/// the prepass depth test are shaded.
pub(crate) fn lighting_replace() -> PipelineState {
    PipelineState {
        depth_function: DepthFunction::Equal,
        depth_write: false,
        blend: Some(BlendState::uniform(BlendFactor::One, BlendFactor::Zero)),
        ..PipelineState::default()
    }
}

/// Every further light is summed on top.
pub(crate) fn lighting_accumulate() -> PipelineState {
    PipelineState {
        depth_function: DepthFunction::Equal,
        depth_write: false,
        blend: Some(BlendState::uniform(BlendFactor::One, BlendFactor::One)),
        ..PipelineState::default()
    }
}

pub(crate) fn skybox() -> PipelineState {
    PipelineState {
        depth_function: DepthFunction::LessEqual,
        depth_write: false,
        cull_mode: CullMode::None,
        ..PipelineState::default()
    }
}

pub(crate) fn fullscreen() -> PipelineState {
    PipelineState {
        depth_test: false,
        depth_write: false,
        cull_mode: CullMode::None,
        ..PipelineState::default()
    }
}

pub(crate) fn hit_map() -> PipelineState {
    PipelineState {
        depth_function: DepthFunction::LessEqual,
        ..PipelineState::default()
    }
}
