use pollster::FutureExt;
use wgpu::{Adapter, AdapterInfo, Device, DeviceType, Queue};

use crate::error::{Result, SimError};

pub struct DeviceState {
    pub info: AdapterInfo,
    pub device: Device,
    pub queue: Queue,
}

fn is_gpu_class(device_type: DeviceType) -> bool {
    matches!(
        device_type,
        DeviceType::DiscreteGpu | DeviceType::IntegratedGpu | DeviceType::VirtualGpu
    )
}

/// GPU-class adapters on the platform, in enumeration order. `WGPU_BACKEND`
/// narrows the platform to specific backends.
pub fn gpu_adapters() -> Vec<Adapter> {
    let backends = wgpu::Backends::from_env().unwrap_or(wgpu::Backends::PRIMARY);
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    });
    instance
        .enumerate_adapters(backends)
        .into_iter()
        .filter(|adapter| is_gpu_class(adapter.get_info().device_type))
        .collect()
}

/// Select the `device_index`-th GPU-class adapter and open a device with a
/// single queue on it.
pub fn open_device(device_index: usize) -> Result<DeviceState> {
    let adapters = gpu_adapters();
    if adapters.is_empty() {
        return Err(SimError::PlatformDiscovery(
            "no GPU-class adapters found".to_owned(),
        ));
    }
    for (idx, adapter) in adapters.iter().enumerate() {
        let info = adapter.get_info();
        log::info!(
            "[{idx}] {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );
    }

    let count = adapters.len();
    let adapter = adapters.into_iter().nth(device_index).ok_or_else(|| {
        SimError::PlatformDiscovery(format!(
            "device index {device_index} out of range, {count} GPU-class adapters found"
        ))
    })?;
    let info = adapter.get_info();

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("nbody compute device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            ..Default::default()
        })
        .block_on()
        .map_err(|e| SimError::PlatformDiscovery(format!("opening {}: {e}", info.name)))?;

    device.on_uncaptured_error(Box::new(|error| {
        log::error!("Uncaptured device error: {error}");
    }));

    log::info!("Selected device: {} ({:?})", info.name, info.backend);
    Ok(DeviceState {
        info,
        device,
        queue,
    })
}

/// Run `f` inside a validation and an out-of-memory error scope and return the
/// first error either scope caught.
pub(crate) fn scoped<T>(device: &Device, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = f();
    let out_of_memory = device.pop_error_scope().block_on();
    let validation = device.pop_error_scope().block_on();
    (value, out_of_memory.or(validation))
}
