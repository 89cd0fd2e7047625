use std::path::PathBuf;

use crate::{
    constants::{
        BODY_COUNT, DELTA, DEVICE_INDEX, G, MASS_CONSTRAINT, MAX_MASS_CONSTRAINT,
        METRES_CONSTRAINT, REPORT_INTERVAL, TIME_BUDGET, WORKGROUP_SIZE,
    },
    error::{Result, SimError},
};

/// Parameters of one simulation run. Fixed once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub body_count: usize,
    /// Gravitational constant handed to the kernel.
    pub g: f32,
    /// Simulated seconds per step.
    pub dt: f64,
    /// The run stops once simulated time reaches this.
    pub time_budget: f64,
    pub metres_constraint: f32,
    pub mass_constraint: u32,
    pub device_index: usize,
    pub workgroup_size: u32,
    /// `None` draws a fresh seed from the OS.
    pub seed: Option<u64>,
    pub kernel_name: String,
    /// Directory searched for `<kernel_name>.wgsl` before the bundled kernels.
    pub kernel_dir: Option<PathBuf>,
    pub report_interval: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            body_count: BODY_COUNT,
            g: G,
            dt: DELTA,
            time_budget: TIME_BUDGET,
            metres_constraint: METRES_CONSTRAINT,
            mass_constraint: MASS_CONSTRAINT,
            device_index: DEVICE_INDEX,
            workgroup_size: WORKGROUP_SIZE,
            seed: None,
            kernel_name: shaders::NBODY_KERNEL.to_owned(),
            kernel_dir: None,
            report_interval: REPORT_INTERVAL,
        }
    }
}

impl SimulationConfig {
    /// Build a config from a flattened float count, three floats per body.
    pub fn from_float_count(float_count: usize) -> Result<Self> {
        if float_count % 3 != 0 {
            return Err(SimError::InvalidConfig(format!(
                "float count {float_count} is not a multiple of 3"
            )));
        }
        Ok(Self {
            body_count: float_count / 3,
            ..Default::default()
        })
    }

    /// Number of floats in each per-axis state array.
    pub fn float_count(&self) -> usize {
        self.body_count * 3
    }

    /// Number of whole steps needed to exhaust the time budget.
    pub fn expected_steps(&self) -> u64 {
        (self.time_budget / self.dt).ceil().max(1.0) as u64
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SimError::InvalidConfig(msg));

        if self.body_count == 0 {
            return invalid("body count must be at least 1".to_owned());
        }
        let floats = self.body_count.checked_mul(3);
        if floats.and_then(|n| u32::try_from(n).ok()).is_none() {
            return invalid(format!(
                "{} bodies exceed the addressable work-item range",
                self.body_count
            ));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return invalid(format!("time step must be positive, got {}", self.dt));
        }
        if !(self.time_budget.is_finite() && self.time_budget > 0.0) {
            return invalid(format!(
                "time budget must be positive, got {}",
                self.time_budget
            ));
        }
        if !(self.metres_constraint.is_finite() && self.metres_constraint > 0.0) {
            return invalid(format!(
                "spatial extent must be positive, got {}",
                self.metres_constraint
            ));
        }
        if self.mass_constraint == 0 {
            return invalid("mass constraint must be at least 1".to_owned());
        }
        if self.mass_constraint > MAX_MASS_CONSTRAINT {
            return invalid(format!(
                "mass constraint {} above {MAX_MASS_CONSTRAINT}, masses would not be exact",
                self.mass_constraint
            ));
        }
        if self.workgroup_size == 0 {
            return invalid("work-group size must be at least 1".to_owned());
        }
        if !self.g.is_finite() {
            return invalid(format!("gravitational constant must be finite, got {}", self.g));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.float_count(), 12800 * 3);
        assert_eq!(config.expected_steps(), 64);
    }

    #[test]
    fn float_count_must_be_divisible_by_three() {
        assert!(SimulationConfig::from_float_count(38400).is_ok());
        assert!(matches!(
            SimulationConfig::from_float_count(38401),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_degenerate_values() {
        let base = SimulationConfig::default();
        let cases = [
            SimulationConfig {
                body_count: 0,
                ..base.clone()
            },
            SimulationConfig {
                dt: 0.0,
                ..base.clone()
            },
            SimulationConfig {
                dt: f64::NAN,
                ..base.clone()
            },
            SimulationConfig {
                time_budget: -1.0,
                ..base.clone()
            },
            SimulationConfig {
                metres_constraint: 0.0,
                ..base.clone()
            },
            SimulationConfig {
                mass_constraint: 0,
                ..base.clone()
            },
            SimulationConfig {
                workgroup_size: 0,
                ..base.clone()
            },
        ];
        for case in cases {
            assert!(
                matches!(case.validate(), Err(SimError::InvalidConfig(_))),
                "{case:?}"
            );
        }
    }

    #[test]
    fn huge_body_count_is_rejected_not_overflowed() {
        for body_count in [usize::MAX, usize::MAX / 3 + 1, u32::MAX as usize / 3 + 1] {
            let config = SimulationConfig {
                body_count,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(SimError::InvalidConfig(_))
            ));
        }
        let config = SimulationConfig {
            body_count: u32::MAX as usize / 3,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn mass_constraint_is_capped_where_f32_stays_exact() {
        let config = SimulationConfig {
            mass_constraint: MAX_MASS_CONSTRAINT,
            ..Default::default()
        };
        config.validate().unwrap();
        for mass_constraint in [MAX_MASS_CONSTRAINT + 1, 3_000_000_000, u32::MAX] {
            let config = SimulationConfig {
                mass_constraint,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(SimError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn expected_steps_rounds_up() {
        let config = SimulationConfig {
            dt: 1.0,
            time_budget: 3.0,
            ..Default::default()
        };
        assert_eq!(config.expected_steps(), 3);
        let config = SimulationConfig {
            dt: 2.0,
            time_budget: 3.0,
            ..Default::default()
        };
        assert_eq!(config.expected_steps(), 2);
    }
}
