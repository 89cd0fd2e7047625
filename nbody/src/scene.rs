use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

use crate::{
    config::SimulationConfig,
    constants::BODIES_PER_CHUNK,
    state::{ParticleState, VisualizationFrame},
};

/// Mass tercile a body is colored by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MassBand {
    Low,
    Mid,
    High,
}

impl MassBand {
    /// Band boundaries use integer division of the mass ceiling and are
    /// inclusive: with a ceiling of 10, masses 0..=3 are low, 4..=6 mid.
    pub fn classify(mass: f32, mass_constraint: u32) -> Self {
        let mass = mass as u64;
        let mass_constraint = mass_constraint as u64;
        if mass <= mass_constraint / 3 {
            MassBand::Low
        } else if mass <= 2 * mass_constraint / 3 {
            MassBand::Mid
        } else {
            MassBand::High
        }
    }

    pub fn color(self) -> [f32; 3] {
        match self {
            MassBand::Low => [0.0, 0.0, 1.0],
            MassBand::Mid => [0.0, 1.0, 0.0],
            MassBand::High => [1.0, 0.0, 0.0],
        }
    }
}

/// Scatters bodies at rest inside the configured cube.
///
/// Each axis is the difference of two uniform draws on `[0, metres)`, which
/// gives a triangular distribution peaking at the origin. Masses are uniform
/// integers below the mass ceiling.
///
/// Bodies are generated in fixed-size chunks, each with its own RNG stream
/// derived from the seed, so a seeded scene is identical for any rayon thread
/// count. Unseeded runs draw their seed from the OS.
#[derive(Debug, Clone)]
pub struct SceneInitializer {
    metres_constraint: f32,
    mass_constraint: u32,
    seed: u64,
}

impl SceneInitializer {
    pub fn new(config: &SimulationConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        log::info!("Scene seed: {seed}");
        Self {
            metres_constraint: config.metres_constraint,
            mass_constraint: config.mass_constraint,
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Allocate and populate the state and first frame for `body_count` bodies.
    pub fn generate(&self, body_count: usize) -> (ParticleState, VisualizationFrame) {
        let mut state = ParticleState::zeroed(body_count);
        let mut frame = VisualizationFrame::zeroed(body_count);
        self.populate(&mut state, &mut frame);
        (state, frame)
    }

    /// Overwrite `state` and `frame` in place with a fresh scene.
    pub fn populate(&self, state: &mut ParticleState, frame: &mut VisualizationFrame) {
        debug_assert_eq!(state.body_count(), frame.body_count());

        state.accel.fill(0.0);
        state.speed.fill(0.0);

        let metres = self.metres_constraint;
        let mass_constraint = self.mass_constraint;
        let seed = self.seed;

        state
            .points
            .par_chunks_mut(BODIES_PER_CHUNK * 3)
            .zip(state.masses.par_chunks_mut(BODIES_PER_CHUNK))
            .zip(frame.positions.par_chunks_mut(BODIES_PER_CHUNK * 3))
            .zip(frame.colors.par_chunks_mut(BODIES_PER_CHUNK * 3))
            .enumerate()
            .for_each(|(chunk, (((points, masses), positions), colors))| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(chunk as u64));
                for (body, mass) in masses.iter_mut().enumerate() {
                    let base = body * 3;
                    for axis in base..base + 3 {
                        let p = rng.random_range(0.0..metres) - rng.random_range(0.0..metres);
                        points[axis] = p;
                        positions[axis] = p / metres;
                    }
                    *mass = rng.random_range(0..mass_constraint) as f32;
                    colors[base..base + 3]
                        .copy_from_slice(&MassBand::classify(*mass, mass_constraint).color());
                }
            });
    }
}

/// Initialize a scene for `config` in one call.
pub fn initialize(config: &SimulationConfig) -> (ParticleState, VisualizationFrame) {
    SceneInitializer::new(config).generate(config.body_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_split_on_integer_thirds() {
        let bands: Vec<_> = (0..10)
            .map(|m| MassBand::classify(m as f32, 10))
            .collect();
        use MassBand::*;
        assert_eq!(
            bands,
            vec![Low, Low, Low, Low, Mid, Mid, Mid, High, High, High]
        );
    }

    #[test]
    fn bands_hold_for_the_largest_ceilings() {
        let top = u32::MAX;
        assert_eq!(MassBand::classify(1.0e9, top), MassBand::Low);
        assert_eq!(MassBand::classify(2.0e9, top), MassBand::Mid);
        assert_eq!(MassBand::classify(4.0e9, top), MassBand::High);
        assert_eq!(MassBand::classify(3.0e9, 3_000_000_000), MassBand::High);
    }

    #[test]
    fn single_mass_ceiling_is_all_low() {
        assert_eq!(MassBand::classify(0.0, 1), MassBand::Low);
    }
}
