//! Host-side particle state, stored column-wise.
//!
//! [`ParticleState`] is the single source of truth for the physical state of a
//! run and [`VisualizationFrame`] is the render-facing view derived from it.
//! Both are plain owned values: one run owns one of each.

use std::fmt::Display;

/// Positions, masses, velocities and accelerations of every body.
///
/// Three-component arrays are laid out `[x0, y0, z0, x1, y1, z1, ...]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleState {
    pub points: Vec<f32>,
    pub masses: Vec<f32>,
    pub accel: Vec<f32>,
    pub speed: Vec<f32>,
}

impl ParticleState {
    /// All-zero state for `body_count` bodies.
    pub fn zeroed(body_count: usize) -> Self {
        Self {
            points: vec![0.0; body_count * 3],
            masses: vec![0.0; body_count],
            accel: vec![0.0; body_count * 3],
            speed: vec![0.0; body_count * 3],
        }
    }

    pub fn body_count(&self) -> usize {
        self.masses.len()
    }
}


/// Per-body normalized positions and mass-banded colors, both flattened to
/// three floats per body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualizationFrame {
    pub positions: Vec<f32>,
    pub colors: Vec<f32>,
}

impl VisualizationFrame {
    pub fn zeroed(body_count: usize) -> Self {
        Self {
            positions: vec![0.0; body_count * 3],
            colors: vec![0.0; body_count * 3],
        }
    }

    pub fn body_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// The five arrays mirrored on the compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Points,
    Masses,
    Accel,
    Speed,
    Vertex,
}

impl BufferRole {
    /// Mirrors in kernel binding order.
    pub const ALL: [BufferRole; 5] = [
        BufferRole::Points,
        BufferRole::Masses,
        BufferRole::Accel,
        BufferRole::Speed,
        BufferRole::Vertex,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BufferRole::Points => "points",
            BufferRole::Masses => "masses",
            BufferRole::Accel => "accel",
            BufferRole::Speed => "speed",
            BufferRole::Vertex => "vertex",
        }
    }

    /// Number of floats in this mirror for `body_count` bodies.
    pub fn float_len(self, body_count: usize) -> usize {
        match self {
            BufferRole::Masses => body_count,
            _ => body_count * 3,
        }
    }

    pub fn host_slice<'a>(
        self,
        state: &'a ParticleState,
        frame: &'a VisualizationFrame,
    ) -> &'a [f32] {
        match self {
            BufferRole::Points => &state.points,
            BufferRole::Masses => &state.masses,
            BufferRole::Accel => &state.accel,
            BufferRole::Speed => &state.speed,
            BufferRole::Vertex => &frame.positions,
        }
    }

    pub fn host_slice_mut<'a>(
        self,
        state: &'a mut ParticleState,
        frame: &'a mut VisualizationFrame,
    ) -> &'a mut [f32] {
        match self {
            BufferRole::Points => &mut state.points,
            BufferRole::Masses => &mut state.masses,
            BufferRole::Accel => &mut state.accel,
            BufferRole::Speed => &mut state.speed,
            BufferRole::Vertex => &mut frame.positions,
        }
    }
}

impl Display for BufferRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_lengths_follow_body_count() {
        let state = ParticleState::zeroed(4);
        let frame = VisualizationFrame::zeroed(4);
        for role in BufferRole::ALL {
            assert_eq!(role.host_slice(&state, &frame).len(), role.float_len(4), "{role}");
        }
        assert_eq!(state.body_count(), 4);
        assert_eq!(frame.body_count(), 4);
    }
}
