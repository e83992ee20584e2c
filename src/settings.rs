use std::time::Duration;

use glam::UVec2;
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const SHADOW_QUALITY_TIERS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "RenderSettings::default_gamma")]
    pub gamma: f32,
    #[serde(default = "RenderSettings::default_ambient_strength")]
    pub ambient_strength: f32,
    #[serde(default = "RenderSettings::default_pcf_samples")]
    pub pcf_samples: u32,
    #[serde(default = "RenderSettings::default_parallax_height_scale")]
    pub parallax_height_scale: f32,
    #[serde(default)]
    pub ssao: SsaoSettings,
    #[serde(default)]
    pub shadows: ShadowSettings,
    #[serde(default)]
    pub streaming: StreamingSettings,
    /// Renders actor ids into a readback target for picking.
    #[serde(default)]
    pub hit_map: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            gamma: Self::default_gamma(),
            ambient_strength: Self::default_ambient_strength(),
            pcf_samples: Self::default_pcf_samples(),
            parallax_height_scale: Self::default_parallax_height_scale(),
            ssao: SsaoSettings::default(),
            shadows: ShadowSettings::default(),
            streaming: StreamingSettings::default(),
            hit_map: false,
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RenderSettings>(contents).map(Self::validate)
    }

    pub fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            warn!("Gamma must be positive. Using {}.", Self::default_gamma());
            self.gamma = Self::default_gamma();
        }

        if !(0.0..=1.0).contains(&self.ambient_strength) {
            warn!("Ambient strength must be within [0, 1]. Using default value.");
            self.ambient_strength = Self::default_ambient_strength();
        }

        if self.pcf_samples == 0 {
            warn!("PCF sample count must be greater than zero. Using default value.");
            self.pcf_samples = Self::default_pcf_samples();
        }

        self.ssao = self.ssao.validate();
        self.shadows = self.shadows.validate();
        self.streaming = self.streaming.validate();
        self
    }

    pub fn framebuffer_size(&self) -> UVec2 {
        UVec2::new(self.resolution.width, self.resolution.height)
    }

    const fn default_gamma() -> f32 {
        2.2
    }

    const fn default_ambient_strength() -> f32 {
        0.1
    }

    const fn default_pcf_samples() -> u32 {
        5
    }

    const fn default_parallax_height_scale() -> f32 {
        0.1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    pub enabled: bool,
    pub samples: u32,
    pub radius: f32,
    pub bias: f32,
    pub blur_offset: i32,
    /// Seed for the sample kernel and noise texture. Both are generated once
    /// at setup, so equal seeds give identical frames.
    pub seed: u64,
}

impl SsaoSettings {
    pub const MAX_SAMPLES: u32 = 64;

    fn validate(mut self) -> Self {
        if self.samples == 0 || self.samples > Self::MAX_SAMPLES {
            warn!(
                "SSAO sample count must be within 1..={}. Using default value.",
                Self::MAX_SAMPLES
            );
            self.samples = Self::default().samples;
        }
        if !(self.radius > 0.0) {
            warn!("SSAO radius must be positive. Using default value.");
            self.radius = Self::default().radius;
        }
        if self.blur_offset < 0 {
            warn!("SSAO blur offset must not be negative. Using default value.");
            self.blur_offset = Self::default().blur_offset;
        }
        self
    }
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: Self::MAX_SAMPLES,
            radius: 0.5,
            bias: 0.025,
            blur_offset: 2,
            seed: 0x55A0,
        }
    }
}

/// Frustum and resolution of one shadow quality level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowTier {
    pub map_size: u32,
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl ShadowTier {
    const fn new(map_size: u32, far: f32) -> Self {
        Self {
            map_size,
            left: -10.0,
            right: 10.0,
            bottom: -10.0,
            top: 10.0,
            near: 1.0,
            far,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub default_quality: u8,
    pub tiers: [ShadowTier; SHADOW_QUALITY_TIERS],
    pub point_near: f32,
    pub point_far: f32,
}

impl ShadowSettings {
    /// Clamps out-of-range quality levels to the highest tier.
    pub fn tier(&self, quality: u8) -> &ShadowTier {
        &self.tiers[(quality as usize).min(SHADOW_QUALITY_TIERS - 1)]
    }

    fn validate(mut self) -> Self {
        if self.default_quality as usize >= SHADOW_QUALITY_TIERS {
            warn!("Shadow quality {} does not exist. Using default.", self.default_quality);
            self.default_quality = Self::default().default_quality;
        }
        let defaults = Self::default().tiers;
        for (tier, fallback) in self.tiers.iter_mut().zip(defaults) {
            if tier.map_size == 0 || !(tier.far > tier.near) {
                warn!("Invalid shadow tier {:?}. Using default tier.", tier);
                *tier = fallback;
            }
        }
        if !(self.point_far > self.point_near && self.point_near > 0.0) {
            warn!("Invalid point light shadow range. Using default range.");
            self.point_near = Self::default().point_near;
            self.point_far = Self::default().point_far;
        }
        self
    }
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            default_quality: 1,
            tiers: [
                ShadowTier::new(512, 10.0),
                ShadowTier::new(1024, 35.0),
                ShadowTier::new(2048, 70.0),
            ],
            point_near: 1.0,
            point_far: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    pub frames_in_flight: usize,
    pub fence_timeout_ms: u64,
    pub max_actors: u32,
    pub max_instances: u32,
    pub material_bytes: u64,
}

impl StreamingSettings {
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if self.frames_in_flight == 0 {
            warn!("At least one frame in flight is required. Using default value.");
            self.frames_in_flight = defaults.frames_in_flight;
        }
        if self.fence_timeout_ms == 0 {
            warn!("Fence timeout must be greater than zero. Using default value.");
            self.fence_timeout_ms = defaults.fence_timeout_ms;
        }
        if self.max_actors == 0 || self.max_instances == 0 || self.material_bytes == 0 {
            warn!("Per-frame buffer capacities must be greater than zero. Using defaults.");
            self.max_actors = defaults.max_actors;
            self.max_instances = defaults.max_instances;
            self.material_bytes = defaults.material_bytes;
        }
        self
    }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            fence_timeout_ms: 50,
            max_actors: 4096,
            max_instances: 16384,
            material_bytes: 1 << 20,
        }
    }
}
