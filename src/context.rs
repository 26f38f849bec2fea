use std::sync::Arc;

use wgpu::{Adapter, Device, DeviceDescriptor, Instance, Queue, Surface};

use crate::error::ContextError;

/// Shared GPU device and queue.
///
/// Cloning is cheap (Arc); every resource constructor in this crate takes a
/// `&GpuContext` rather than raw wgpu handles.
#[derive(Clone)]
pub struct GpuContext {
    adapter: Arc<Adapter>,
    device: Arc<Device>,
    queue: Arc<Queue>,
}

impl GpuContext {
    /// Request an adapter and device. Pass the surface the context will
    /// present to so the adapter is compatible with it; `None` gives a
    /// headless context.
    pub async fn new(
        instance: &Instance,
        surface: Option<&Surface<'_>>,
    ) -> Result<Self, ContextError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await?;

        let (device, queue) = Self::request_device(&adapter).await?;

        Ok(Self {
            adapter: Arc::new(adapter),
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    async fn request_device(adapter: &Adapter) -> Result<(Device, Queue), ContextError> {
        let device = adapter
            .request_device(&DeviceDescriptor {
                label: Some("Viewer Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await?;
        Ok(device)
    }
}
