//! CPU reference device.
//!
//! Runs the n-body kernel contract with rayon, using the same work-item
//! mapping and work-group partitioning as the GPU kernel. Accelerations are
//! computed from a snapshot of all positions before any body moves, so unlike
//! the GPU kernel the result does not depend on scheduling.

use std::sync::{Arc, Mutex, MutexGuard};

use cgmath::{InnerSpace, Vector3};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;
use shaders::{SOFTENING_SQ, StepParams};

use crate::{
    backend::{ComputeBackend, DeviceBufferSet},
    error::{Result, SimError},
    kernel::{BoundArgs, DispatchShape, KernelSource},
    state::{BufferRole, ParticleState, VisualizationFrame},
};

type HostKernelFn = fn(&mut DeviceMemory, &StepParams, DispatchShape);

/// Entry points the host device can execute, by name.
const ENTRY_POINTS: &[(&str, HostKernelFn)] = &[(shaders::NBODY_ENTRY_POINT, nbody_step)];

#[derive(Debug, Clone, Default)]
pub struct HostBackend {
    /// Bytes of "device memory". `None` is unbounded.
    capacity: Option<u64>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity: Some(capacity),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceMemory {
    points: Vec<f32>,
    masses: Vec<f32>,
    accel: Vec<f32>,
    speed: Vec<f32>,
    vertex: Vec<f32>,
}

impl DeviceMemory {
    pub fn mirror(&self, role: BufferRole) -> &[f32] {
        match role {
            BufferRole::Points => &self.points,
            BufferRole::Masses => &self.masses,
            BufferRole::Accel => &self.accel,
            BufferRole::Speed => &self.speed,
            BufferRole::Vertex => &self.vertex,
        }
    }

    fn mirror_mut(&mut self, role: BufferRole) -> &mut Vec<f32> {
        match role {
            BufferRole::Points => &mut self.points,
            BufferRole::Masses => &mut self.masses,
            BufferRole::Accel => &mut self.accel,
            BufferRole::Speed => &mut self.speed,
            BufferRole::Vertex => &mut self.vertex,
        }
    }
}

/// Handle to the mirrors. The bound kernel holds a second handle to the same
/// memory, the way a GPU bind group references its buffers.
#[derive(Debug, Clone)]
pub struct HostBufferSet {
    memory: Arc<Mutex<DeviceMemory>>,
    lens: [usize; 5],
}

impl HostBufferSet {
    fn lock(&self) -> Result<MutexGuard<'_, DeviceMemory>> {
        lock(&self.memory)
    }
}

fn lock(memory: &Mutex<DeviceMemory>) -> Result<MutexGuard<'_, DeviceMemory>> {
    memory
        .lock()
        .map_err(|_| SimError::DeviceExecution("host device memory poisoned".to_owned()))
}

impl DeviceBufferSet for HostBufferSet {
    fn float_len(&self, role: BufferRole) -> usize {
        let idx = BufferRole::ALL
            .iter()
            .position(|r| *r == role)
            .unwrap_or_default();
        self.lens[idx]
    }

    fn release(self) {
        if let Ok(mut memory) = self.memory.lock() {
            *memory = DeviceMemory::default();
        }
    }
}

pub struct HostProgram {
    entry_point: String,
    entry: HostKernelFn,
}

pub struct HostKernel {
    entry: HostKernelFn,
    memory: Arc<Mutex<DeviceMemory>>,
    params: StepParams,
}

impl ComputeBackend for HostBackend {
    type Program = HostProgram;
    type Buffers = HostBufferSet;
    type Kernel = HostKernel;

    fn device_name(&self) -> String {
        format!("host ({} rayon threads)", rayon::current_num_threads())
    }

    fn build_program(&self, source: &KernelSource) -> Result<HostProgram> {
        if source.text.trim().is_empty() {
            return Err(SimError::kernel_build(&source.name, "empty source"));
        }
        let entry = ENTRY_POINTS
            .iter()
            .find(|(name, _)| *name == source.entry_point)
            .map(|(_, entry)| *entry)
            .ok_or_else(|| {
                SimError::kernel_build(
                    &source.name,
                    format!("host device has no entry point `{}`", source.entry_point),
                )
            })?;
        Ok(HostProgram {
            entry_point: source.entry_point.clone(),
            entry,
        })
    }

    fn create_buffers(
        &self,
        state: &ParticleState,
        frame: &VisualizationFrame,
    ) -> Result<HostBufferSet> {
        let body_count = state.body_count();
        let mut lens = [0; 5];
        for (len, role) in lens.iter_mut().zip(BufferRole::ALL) {
            *len = role.float_len(body_count);
        }
        let requested: u64 = lens
            .iter()
            .map(|len| (len * std::mem::size_of::<f32>()) as u64)
            .sum();
        if let Some(capacity) = self.capacity {
            if requested > capacity {
                return Err(SimError::DeviceAllocation(format!(
                    "requested {requested} bytes, host device holds {capacity}"
                )));
            }
        }

        let mut memory = DeviceMemory::default();
        for role in BufferRole::ALL {
            let host = role.host_slice(state, frame);
            if host.len() != role.float_len(body_count) {
                return Err(SimError::DeviceAllocation(format!(
                    "host array `{role}` has {} floats, expected {}",
                    host.len(),
                    role.float_len(body_count)
                )));
            }
            *memory.mirror_mut(role) = host.to_vec();
        }

        Ok(HostBufferSet {
            memory: Arc::new(Mutex::new(memory)),
            lens,
        })
    }

    fn bind_kernel(
        &self,
        program: &HostProgram,
        buffers: &HostBufferSet,
        args: &BoundArgs,
        _shape: DispatchShape,
    ) -> Result<HostKernel> {
        if args.params.body_count as usize * 3 != buffers.float_len(BufferRole::Points) {
            return Err(SimError::KernelBinding(format!(
                "body count {} does not match the `points` mirror",
                args.params.body_count
            )));
        }
        log::debug!("Bound host kernel `{}`", program.entry_point);
        Ok(HostKernel {
            entry: program.entry,
            memory: buffers.memory.clone(),
            params: args.params,
        })
    }

    fn dispatch(&self, kernel: &HostKernel, shape: DispatchShape) -> Result<()> {
        let mut memory = lock(&kernel.memory)?;
        (kernel.entry)(&mut memory, &kernel.params, shape);
        Ok(())
    }

    fn read_back(
        &self,
        buffers: &HostBufferSet,
        state: &mut ParticleState,
        frame: &mut VisualizationFrame,
    ) -> Result<()> {
        let memory = buffers.lock()?;
        for role in BufferRole::ALL {
            let src = memory.mirror(role);
            let dst = role.host_slice_mut(state, frame);
            if src.len() != dst.len() {
                return Err(SimError::DeviceExecution(format!(
                    "readback of `{role}`: device has {} floats, host {}",
                    src.len(),
                    dst.len()
                )));
            }
            dst.copy_from_slice(src);
        }
        Ok(())
    }
}

#[inline]
fn body_at(points: &[f32], body: usize) -> Vector3<f32> {
    let base = body * 3;
    Vector3::new(points[base], points[base + 1], points[base + 2])
}

/// Axis `i % 3` of the acceleration of body `i / 3`.
fn acceleration_component(points: &[f32], masses: &[f32], i: usize, g: f32) -> f32 {
    let body = i / 3;
    let axis = i % 3;
    let own = body_at(points, body);
    let mut acc = 0.0;
    for (other, mass) in masses.iter().enumerate() {
        if other == body {
            continue;
        }
        let rel = body_at(points, other) - own;
        let inv_dist = (rel.magnitude2() + SOFTENING_SQ).sqrt().recip();
        acc += g * mass * rel[axis] * inv_dist * inv_dist * inv_dist;
    }
    acc
}

fn nbody_step(memory: &mut DeviceMemory, params: &StepParams, shape: DispatchShape) {
    let active = (params.body_count as usize * 3).min(shape.global as usize);
    let local = shape.local as usize;
    let dt = params.dt;
    let DeviceMemory {
        points,
        masses,
        accel,
        speed,
        vertex,
    } = memory;

    {
        let points: &[f32] = points;
        let masses: &[f32] = masses;
        accel
            .par_chunks_mut(local)
            .enumerate()
            .for_each(|(group, items)| {
                for (lane, a) in items.iter_mut().enumerate() {
                    let i = group * local + lane;
                    if i >= active {
                        break;
                    }
                    *a = acceleration_component(points, masses, i, params.g);
                }
            });
    }

    points[..active]
        .par_iter_mut()
        .zip(speed[..active].par_iter_mut())
        .zip(vertex[..active].par_iter_mut())
        .zip(&accel[..active])
        .for_each(|(((p, v), out), a)| {
            *v += a * dt;
            *p += *v * dt;
            *out = *p / params.metres_constraint;
        });
}
