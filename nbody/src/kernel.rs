//! The contract between the host and the n-body kernel.
//!
//! The kernel takes nine arguments in a fixed order: five buffers followed by
//! four scalars. Nothing checks that order across the host/device boundary,
//! so [`KernelBinding`] checks it on the host side before the first dispatch.

use std::{fmt::Display, path::Path};

use shaders::StepParams;

use crate::{
    config::SimulationConfig,
    error::{Result, SimError},
    state::BufferRole,
};

/// Kernel source text and the entry point to build from it.
#[derive(Debug, Clone)]
pub struct KernelSource {
    pub name: String,
    pub entry_point: String,
    pub text: String,
}

impl KernelSource {
    /// Resolve `name` to source text. `dir/<name>.wgsl` takes precedence over
    /// the kernels bundled with the `shaders` crate.
    pub fn load(name: &str, dir: Option<&Path>) -> Result<Self> {
        if let Some(dir) = dir {
            let path = dir.join(format!("{name}.wgsl"));
            if path.is_file() {
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    SimError::kernel_build(name, format!("reading {}: {e}", path.display()))
                })?;
                log::info!("Loaded kernel `{name}` from {}", path.display());
                return Ok(Self::new(name, text));
            }
            log::debug!("{} not found, using bundled kernel", path.display());
        }
        let text = shaders::source(name).ok_or_else(|| {
            SimError::kernel_build(
                name,
                format!(
                    "no kernel source named `{name}` (bundled: {})",
                    shaders::kernel_names().join(", ")
                ),
            )
        })?;
        Ok(Self::new(name, text.to_owned()))
    }

    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_point: shaders::NBODY_ENTRY_POINT.to_owned(),
            text: text.into(),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Buffer(BufferRole, Access),
    U32,
    F32,
}

impl Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgKind::Buffer(role, Access::ReadOnly) => write!(f, "read-only buffer `{role}`"),
            ArgKind::Buffer(role, Access::ReadWrite) => write!(f, "read-write buffer `{role}`"),
            ArgKind::U32 => f.write_str("u32"),
            ArgKind::F32 => f.write_str("f32"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
}

/// Ordered argument list of a kernel entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSignature {
    pub args: &'static [ArgSpec],
}

const NBODY_ARGS: [ArgSpec; 9] = [
    ArgSpec {
        name: "points",
        kind: ArgKind::Buffer(BufferRole::Points, Access::ReadWrite),
    },
    ArgSpec {
        name: "masses",
        kind: ArgKind::Buffer(BufferRole::Masses, Access::ReadOnly),
    },
    ArgSpec {
        name: "accel",
        kind: ArgKind::Buffer(BufferRole::Accel, Access::ReadWrite),
    },
    ArgSpec {
        name: "speed",
        kind: ArgKind::Buffer(BufferRole::Speed, Access::ReadWrite),
    },
    ArgSpec {
        name: "vertex",
        kind: ArgKind::Buffer(BufferRole::Vertex, Access::ReadWrite),
    },
    ArgSpec {
        name: "body_count",
        kind: ArgKind::U32,
    },
    ArgSpec {
        name: "dt",
        kind: ArgKind::F32,
    },
    ArgSpec {
        name: "g",
        kind: ArgKind::F32,
    },
    ArgSpec {
        name: "metres_constraint",
        kind: ArgKind::F32,
    },
];

impl KernelSignature {
    pub const NBODY: KernelSignature = KernelSignature { args: &NBODY_ARGS };

    pub fn buffer_args(&self) -> impl Iterator<Item = (BufferRole, Access)> + '_ {
        self.args.iter().filter_map(|a| match a.kind {
            ArgKind::Buffer(role, access) => Some((role, access)),
            _ => None,
        })
    }
}

/// A value supplied for one kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Buffer(BufferRole),
    U32(u32),
    F32(f32),
}

impl KernelArg {
    fn matches(&self, kind: ArgKind) -> bool {
        match (self, kind) {
            (KernelArg::Buffer(role), ArgKind::Buffer(expected, _)) => *role == expected,
            (KernelArg::U32(_), ArgKind::U32) => true,
            (KernelArg::F32(_), ArgKind::F32) => true,
            _ => false,
        }
    }
}

impl Display for KernelArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelArg::Buffer(role) => write!(f, "buffer `{role}`"),
            KernelArg::U32(v) => write!(f, "u32 {v}"),
            KernelArg::F32(v) => write!(f, "f32 {v}"),
        }
    }
}

/// Arguments that passed [`KernelBinding::bind`]. Buffers are referenced by
/// role and stay valid for the whole run; scalars are packed for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgs {
    pub signature: KernelSignature,
    pub buffers: Vec<(BufferRole, Access)>,
    pub params: StepParams,
}

pub struct KernelBinding {
    signature: KernelSignature,
}

impl KernelBinding {
    pub fn new(signature: KernelSignature) -> Self {
        Self { signature }
    }

    /// The argument list every run binds, in signature order.
    pub fn nbody_args(config: &SimulationConfig) -> Vec<KernelArg> {
        let mut args: Vec<KernelArg> = BufferRole::ALL.into_iter().map(KernelArg::Buffer).collect();
        args.extend([
            KernelArg::U32(config.body_count as u32),
            KernelArg::F32(config.dt as f32),
            KernelArg::F32(config.g),
            KernelArg::F32(config.metres_constraint),
        ]);
        args
    }

    pub fn bind(&self, args: &[KernelArg]) -> Result<BoundArgs> {
        let expected = self.signature.args;
        if args.len() != expected.len() {
            return Err(SimError::KernelBinding(format!(
                "expected {} arguments, got {}",
                expected.len(),
                args.len()
            )));
        }
        for (idx, (arg, spec)) in args.iter().zip(expected).enumerate() {
            if !arg.matches(spec.kind) {
                return Err(SimError::KernelBinding(format!(
                    "argument {idx} (`{}`) expects {}, got {arg}",
                    spec.name, spec.kind
                )));
            }
        }

        let mut scalars = args.iter().filter_map(|a| match a {
            KernelArg::Buffer(_) => None,
            scalar => Some(*scalar),
        });
        let params = match (scalars.next(), scalars.next(), scalars.next(), scalars.next()) {
            (
                Some(KernelArg::U32(body_count)),
                Some(KernelArg::F32(dt)),
                Some(KernelArg::F32(g)),
                Some(KernelArg::F32(metres_constraint)),
            ) => StepParams {
                body_count,
                dt,
                g,
                metres_constraint,
            },
            _ => {
                return Err(SimError::KernelBinding(
                    "signature does not end in (u32, f32, f32, f32)".to_owned(),
                ));
            }
        };
        if params.metres_constraint == 0.0 {
            return Err(SimError::KernelBinding(
                "spatial extent of 0 would divide by zero".to_owned(),
            ));
        }

        Ok(BoundArgs {
            signature: self.signature,
            buffers: self.signature.buffer_args().collect(),
            params,
        })
    }
}

/// Global and local work sizes of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchShape {
    pub global: u32,
    pub local: u32,
}

impl DispatchShape {
    /// One work-item per flattened float of the position array.
    pub fn for_config(config: &SimulationConfig) -> Self {
        Self {
            global: config.float_count() as u32,
            local: config.workgroup_size,
        }
    }

    /// Work-groups needed to cover `global`; the last may be partly idle.
    pub fn workgroups(&self) -> u32 {
        self.global.div_ceil(self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig {
            body_count: 4,
            dt: 1.0,
            metres_constraint: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn binds_nbody_arguments() {
        let bound = KernelBinding::new(KernelSignature::NBODY)
            .bind(&KernelBinding::nbody_args(&config()))
            .unwrap();
        assert_eq!(bound.buffers.len(), 5);
        assert_eq!(bound.buffers[1], (BufferRole::Masses, Access::ReadOnly));
        assert_eq!(bound.params.body_count, 4);
        assert_eq!(bound.params.dt, 1.0);
        assert_eq!(bound.params.metres_constraint, 10.0);
    }

    #[test]
    fn rejects_wrong_count() {
        let mut args = KernelBinding::nbody_args(&config());
        args.pop();
        let err = KernelBinding::new(KernelSignature::NBODY)
            .bind(&args)
            .unwrap_err();
        assert!(matches!(err, SimError::KernelBinding(_)));
    }

    #[test]
    fn rejects_swapped_buffers() {
        let mut args = KernelBinding::nbody_args(&config());
        args.swap(2, 3);
        let err = KernelBinding::new(KernelSignature::NBODY)
            .bind(&args)
            .unwrap_err();
        assert!(err.to_string().contains("argument 2"), "{err}");
    }

    #[test]
    fn rejects_scalar_type_mismatch() {
        let mut args = KernelBinding::nbody_args(&config());
        args[5] = KernelArg::F32(4.0);
        assert!(
            KernelBinding::new(KernelSignature::NBODY)
                .bind(&args)
                .is_err()
        );
    }

    #[test]
    fn dispatch_covers_every_float() {
        let shape = DispatchShape::for_config(&config());
        assert_eq!(shape.global, 12);
        assert_eq!(shape.local, 256);
        assert_eq!(shape.workgroups(), 1);

        let shape = DispatchShape::for_config(&SimulationConfig::default());
        assert_eq!(shape.workgroups(), 150);
    }

    #[test]
    fn loads_bundled_source() {
        let source = KernelSource::load(shaders::NBODY_KERNEL, None).unwrap();
        assert_eq!(source.entry_point, "nbody_step");
        assert!(source.text.contains("@compute"));
        assert!(matches!(
            KernelSource::load("nope", None),
            Err(SimError::KernelBuild { .. })
        ));
    }
}
