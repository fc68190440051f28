//! Frequency-reactive mesh deformation
//!
//! Each frame displaces every vertex of the reference mesh along its base
//! position by 4D noise, scaled by a boost derived from the mean analyser
//! magnitude. Positions are always recomputed from the snapshot taken on
//! the first frame, so nothing accumulates across frames.

use crate::config::DeformationConfig;
use crate::dsp::mean_magnitude;
use crate::visual::lerp;
use crate::visual::mesh::{Mesh, Vec3};
use crate::visual::noise::Simplex4;

/// Midpoint of the 0..=255 byte magnitude range
const MAGNITUDE_MIDPOINT: f32 = 128.0;

/// Whole-mesh motion independent of the audio
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshTransform {
    /// Euler angles in radians
    pub rotation: Vec3,
    pub position: Vec3,
}

/// Per-frame diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub mean_magnitude: f32,
    pub boost: f32,
}

#[derive(Debug)]
pub struct FrequencyDeformer {
    config: DeformationConfig,
    noise: Simplex4,
    base: Option<Vec<Vec3>>,
    time: f32,
    boost: f32,
    spin_velocity: f32,
    transform: MeshTransform,
    color: Vec3,
    hovered: bool,
}

impl FrequencyDeformer {
    pub fn new(config: DeformationConfig, seed: u64) -> Self {
        Self {
            spin_velocity: config.base_spin,
            color: config.idle_color,
            config,
            noise: Simplex4::new(seed),
            base: None,
            time: 0.0,
            boost: 1.0,
            transform: MeshTransform::default(),
            hovered: false,
        }
    }

    pub fn noise(&self) -> &Simplex4 {
        &self.noise
    }

    /// Accumulated animation time in seconds
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub fn transform(&self) -> MeshTransform {
        self.transform
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Base positions, captured on the first frame
    pub fn base_positions(&self) -> Option<&[Vec3]> {
        self.base.as_deref()
    }

    pub fn set_hovered(&mut self, hovered: bool) {
        self.hovered = hovered;
    }

    /// Add angular velocity that decays back to the resting spin
    pub fn spin_impulse(&mut self, radians_per_sec: f32) {
        self.spin_velocity += radians_per_sec;
    }

    /// Noise displacement factor for a base position at the current time
    pub fn displacement(&self, base: Vec3) -> f32 {
        let k = self.config.noise_frequency;
        self.noise.sample(
            base[0] * k,
            base[1] * k,
            base[2] * k,
            self.time * self.config.time_frequency,
        ) * self.config.strength
            * self.boost
    }

    fn target_boost(&self, frequency_data: Option<&[u8]>) -> (f32, f32) {
        let Some(data) = frequency_data else {
            return (0.0, 1.0);
        };
        let mean = mean_magnitude(data);
        let normalized = mean / MAGNITUDE_MIDPOINT;
        let target = if normalized > self.config.deadband {
            1.0 + normalized * self.config.gain
        } else {
            1.0
        };
        (mean, target)
    }

    /// Advance one animation frame of `dt` seconds
    pub fn frame(&mut self, mesh: &mut Mesh, frequency_data: Option<&[u8]>, dt: f32) -> FrameStats {
        let dt = dt.max(0.0);
        if self.base.is_none() {
            self.base = Some(mesh.positions.clone());
        }
        self.time += dt;

        let (mean, target) = self.target_boost(frequency_data);
        self.boost = lerp(self.boost, target, self.config.boost_smoothing);

        if let Some(base) = self.base.as_ref() {
            let positions = base
                .iter()
                .map(|&b| {
                    let scale = 1.0 + self.displacement(b);
                    [b[0] * scale, b[1] * scale, b[2] * scale]
                })
                .collect();
            mesh.positions = positions;
        }
        mesh.recompute_normals();

        self.animate_transform(dt);
        self.animate_color(dt);

        FrameStats {
            mean_magnitude: mean,
            boost: self.boost,
        }
    }

    fn animate_transform(&mut self, dt: f32) {
        let c = &self.config;
        let decay = 1.0 - (-c.spin_decay * dt).exp();
        self.spin_velocity = lerp(self.spin_velocity, c.base_spin, decay);

        let phase = std::f32::consts::TAU * c.bob_frequency * self.time;
        self.transform.rotation[1] =
            (self.transform.rotation[1] + self.spin_velocity * dt) % std::f32::consts::TAU;
        self.transform.rotation[0] = c.wobble_amplitude * (phase * 0.5).sin();
        self.transform.rotation[2] = c.wobble_amplitude * (phase * 0.3).cos();
        self.transform.position[1] = c.bob_amplitude * phase.sin();
    }

    fn animate_color(&mut self, dt: f32) {
        let target = if self.hovered {
            self.config.hover_color
        } else {
            self.config.idle_color
        };
        let t = 1.0 - (-self.config.color_rate * dt).exp();
        for (channel, goal) in self.color.iter_mut().zip(target) {
            *channel = lerp(*channel, goal, t);
        }
    }
}
