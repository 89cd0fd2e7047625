//! Compute kernels dispatched by the `nbody` host.
//!
//! Kernels ship as WGSL source text and are compiled by the host at startup.
//! The host and the kernels agree on the [`StepParams`] block layout and on
//! [`SOFTENING_SQ`]; changing either here requires the same change in the
//! WGSL source.

use bytemuck::{Pod, Zeroable};

/// Name the n-body kernel is registered under.
pub const NBODY_KERNEL: &str = "nbody_step";
/// Entry point of the n-body kernel.
pub const NBODY_ENTRY_POINT: &str = "nbody_step";
/// Work-group width declared by `@workgroup_size` in the n-body kernel.
pub const NBODY_WORKGROUP_SIZE: u32 = 256;
/// Squared softening length added to every pairwise distance, in m^2.
pub const SOFTENING_SQ: f32 = 1.0e-2;

const NBODY_STEP_WGSL: &str = include_str!("nbody_step.wgsl");

/// Scalar kernel arguments, bound as a uniform block after the buffers.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StepParams {
    pub body_count: u32,
    pub dt: f32,
    pub g: f32,
    pub metres_constraint: f32,
}

const _: () = assert!(std::mem::size_of::<StepParams>() == 16);

/// Look up bundled kernel source text by name.
pub fn source(name: &str) -> Option<&'static str> {
    match name {
        NBODY_KERNEL => Some(NBODY_STEP_WGSL),
        _ => None,
    }
}

/// Names of all bundled kernels.
pub fn kernel_names() -> &'static [&'static str] {
    &[NBODY_KERNEL]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_kernel_declares_its_entry_point() {
        let text = source(NBODY_KERNEL).unwrap();
        assert!(text.contains(&format!("fn {NBODY_ENTRY_POINT}(")));
        assert!(text.contains(&format!("@workgroup_size({NBODY_WORKGROUP_SIZE})")));
    }

    #[test]
    fn softening_matches_wgsl() {
        let text = source(NBODY_KERNEL).unwrap();
        assert!(text.contains("const SOFTENING_SQ: f32 = 1.0e-2;"));
        assert_eq!(SOFTENING_SQ, 1.0e-2);
    }

    #[test]
    fn unknown_kernel_is_none() {
        assert!(source("missing").is_none());
        assert_eq!(kernel_names(), &[NBODY_KERNEL]);
    }
}
