use std::borrow::Cow;

use wgpu::{
    BindGroup, BindGroupLayout, Buffer, ComputePipeline, Device, ShaderModule, util::DeviceExt,
};

use crate::{
    backend::gpu::{buffers::GpuBufferSet, device::scoped},
    error::{Result, SimError},
    kernel::{Access, BoundArgs, DispatchShape, KernelSource},
};

pub struct GpuProgram {
    name: String,
    entry_point: String,
    module: ShaderModule,
}

/// Compile `source` and check its entry point resolves.
pub fn build_program(device: &Device, source: &KernelSource) -> Result<GpuProgram> {
    let (module, error) = scoped(device, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.name.as_str()),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source.text.as_str())),
        })
    });
    if let Some(error) = error {
        return Err(SimError::kernel_build(&source.name, error.to_string()));
    }

    // Let the device derive the layout from the shader; this only fails when
    // the entry point is missing or not a compute stage.
    let (_, error) = scoped(device, || {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("entry point probe"),
            layout: None,
            module: &module,
            entry_point: Some(source.entry_point.as_str()),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    });
    if let Some(error) = error {
        return Err(SimError::kernel_build(
            &source.name,
            format!("entry point `{}`: {error}", source.entry_point),
        ));
    }

    log::info!("Built kernel `{}` ({})", source.name, source.entry_point);
    Ok(GpuProgram {
        name: source.name.clone(),
        entry_point: source.entry_point.clone(),
        module,
    })
}

pub struct GpuKernel {
    pipeline: ComputePipeline,
    bind_group: BindGroup,
    _params: Buffer,
}

fn create_bind_group_layout(device: &Device, args: &BoundArgs) -> BindGroupLayout {
    let mut entries: Vec<_> = args
        .buffers
        .iter()
        .enumerate()
        .map(|(binding, (_, access))| wgpu::BindGroupLayoutEntry {
            binding: binding as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: *access == Access::ReadOnly,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect();
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: args.buffers.len() as u32,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("nbody bind group layout"),
        entries: &entries,
    })
}

/// Build the pipeline against a layout derived from the kernel signature, so a
/// kernel whose bindings disagree with it is rejected by shader validation.
pub fn bind_kernel(
    device: &Device,
    program: &GpuProgram,
    buffers: &GpuBufferSet,
    args: &BoundArgs,
    shape: DispatchShape,
) -> Result<GpuKernel> {
    let limits = device.limits();
    if shape.local != shaders::NBODY_WORKGROUP_SIZE {
        return Err(SimError::KernelBinding(format!(
            "kernel declares work-groups of {}, dispatch asks for {}",
            shaders::NBODY_WORKGROUP_SIZE,
            shape.local
        )));
    }
    if shape.local > limits.max_compute_invocations_per_workgroup {
        return Err(SimError::KernelBinding(format!(
            "work-group of {} exceeds the device limit of {}",
            shape.local, limits.max_compute_invocations_per_workgroup
        )));
    }
    if shape.workgroups() > limits.max_compute_workgroups_per_dimension {
        return Err(SimError::DeviceExecution(format!(
            "{} work-groups exceed the device limit of {}",
            shape.workgroups(),
            limits.max_compute_workgroups_per_dimension
        )));
    }

    let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("step params"),
        contents: bytemuck::bytes_of(&args.params),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let mut resources = Vec::with_capacity(args.buffers.len() + 1);
    for (role, _) in &args.buffers {
        let buffer = buffers.storage(*role).ok_or_else(|| {
            SimError::KernelBinding(format!("no device mirror for `{role}`"))
        })?;
        resources.push(buffer.as_entire_binding());
    }
    resources.push(params.as_entire_binding());

    let (bound, error) = scoped(device, || {
        let layout = create_bind_group_layout(device, args);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nbody pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(program.name.as_str()),
            layout: Some(&pipeline_layout),
            module: &program.module,
            entry_point: Some(program.entry_point.as_str()),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let entries: Vec<_> = resources
            .into_iter()
            .enumerate()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            })
            .collect();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nbody bind group"),
            layout: &layout,
            entries: &entries,
        });
        (pipeline, bind_group)
    });
    if let Some(error) = error {
        return Err(SimError::KernelBinding(error.to_string()));
    }

    let (pipeline, bind_group) = bound;
    Ok(GpuKernel {
        pipeline,
        bind_group,
        _params: params,
    })
}

/// Submit one dispatch and wait for the queue to drain.
pub fn dispatch(
    device: &Device,
    queue: &wgpu::Queue,
    kernel: &GpuKernel,
    shape: DispatchShape,
) -> Result<()> {
    let (_, error) = scoped(device, || {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nbody step encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("nbody step"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &kernel.bind_group, &[]);
            pass.dispatch_workgroups(shape.workgroups(), 1, 1);
        }
        queue.submit(Some(encoder.finish()));
    });
    if let Some(error) = error {
        return Err(SimError::DeviceExecution(error.to_string()));
    }

    device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| SimError::DeviceExecution(format!("waiting for dispatch: {e}")))?;
    Ok(())
}
