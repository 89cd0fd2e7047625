use pollster::FutureExt;
use wgpu::{Buffer, BufferUsages, Device, Queue, util::DeviceExt};

use crate::{
    backend::{DeviceBufferSet, gpu::device::scoped},
    error::{Result, SimError},
    state::{BufferRole, ParticleState, VisualizationFrame},
};

struct Mirror {
    role: BufferRole,
    storage: Buffer,
    staging: Buffer,
    len: usize,
}

impl Mirror {
    fn size(&self) -> u64 {
        (self.len * std::mem::size_of::<f32>()) as u64
    }
}

/// Storage buffers for the five mirrors, each paired with a mappable staging
/// buffer of the same size for readback.
pub struct GpuBufferSet {
    mirrors: Vec<Mirror>,
}

impl GpuBufferSet {
    pub fn new(device: &Device, state: &ParticleState, frame: &VisualizationFrame) -> Result<Self> {
        let limits = device.limits();
        let body_count = state.body_count();

        for role in BufferRole::ALL {
            let len = role.host_slice(state, frame).len();
            if len != role.float_len(body_count) {
                return Err(SimError::DeviceAllocation(format!(
                    "host array `{role}` has {len} floats, expected {}",
                    role.float_len(body_count)
                )));
            }
            let size = (len * std::mem::size_of::<f32>()) as u64;
            if size > limits.max_storage_buffer_binding_size as u64 || size > limits.max_buffer_size
            {
                return Err(SimError::DeviceAllocation(format!(
                    "`{role}` needs {size} bytes, device allows {} per storage binding",
                    limits.max_storage_buffer_binding_size
                )));
            }
        }

        let (mirrors, error) = scoped(device, || {
            BufferRole::ALL
                .into_iter()
                .map(|role| {
                    let host = role.host_slice(state, frame);
                    let label = format!("{role} mirror");
                    let storage = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(label.as_str()),
                        contents: bytemuck::cast_slice(host),
                        usage: BufferUsages::STORAGE
                            | BufferUsages::COPY_SRC
                            | BufferUsages::COPY_DST,
                    });
                    let label = format!("{role} staging");
                    let staging = device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(label.as_str()),
                        size: storage.size(),
                        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    });
                    Mirror {
                        role,
                        storage,
                        staging,
                        len: host.len(),
                    }
                })
                .collect::<Vec<_>>()
        });
        if let Some(error) = error {
            return Err(SimError::DeviceAllocation(error.to_string()));
        }

        let set = Self { mirrors };
        log::info!(
            "Allocated {} bytes of device mirrors for {body_count} bodies",
            set.size_bytes()
        );
        Ok(set)
    }

    pub fn storage(&self, role: BufferRole) -> Option<&Buffer> {
        self.mirrors
            .iter()
            .find(|m| m.role == role)
            .map(|m| &m.storage)
    }

    /// Copy every mirror into its staging buffer, wait for the copies, and
    /// write the results into the host arrays.
    pub fn read_back(
        &self,
        device: &Device,
        queue: &Queue,
        state: &mut ParticleState,
        frame: &mut VisualizationFrame,
    ) -> Result<()> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        for mirror in &self.mirrors {
            encoder.copy_buffer_to_buffer(&mirror.storage, 0, &mirror.staging, 0, mirror.size());
        }
        queue.submit(Some(encoder.finish()));

        let receivers: Vec<_> = self
            .mirrors
            .iter()
            .map(|mirror| {
                let (tx, rx) = futures::channel::oneshot::channel();
                mirror
                    .staging
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = tx.send(result);
                    });
                rx
            })
            .collect();

        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| SimError::DeviceExecution(format!("waiting for readback: {e}")))?;

        for (mirror, rx) in self.mirrors.iter().zip(receivers) {
            match rx.block_on() {
                Ok(Ok(())) => (),
                Ok(Err(e)) => {
                    return Err(SimError::DeviceExecution(format!(
                        "mapping `{}`: {e}",
                        mirror.role
                    )));
                }
                Err(_) => {
                    return Err(SimError::DeviceExecution(format!(
                        "mapping `{}` was abandoned",
                        mirror.role
                    )));
                }
            }
        }

        for mirror in &self.mirrors {
            {
                let view = mirror.staging.slice(..).get_mapped_range();
                let dst = mirror.role.host_slice_mut(state, frame);
                dst.copy_from_slice(bytemuck::cast_slice(&view));
            }
            mirror.staging.unmap();
        }
        Ok(())
    }
}

impl DeviceBufferSet for GpuBufferSet {
    fn float_len(&self, role: BufferRole) -> usize {
        self.mirrors
            .iter()
            .find(|m| m.role == role)
            .map_or(0, |m| m.len)
    }

    fn release(self) {
        for mirror in self.mirrors {
            mirror.storage.destroy();
            mirror.staging.destroy();
        }
    }
}
