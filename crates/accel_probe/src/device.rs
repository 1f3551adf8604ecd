//! wgpu context factory
//!
//! Production [`ContextFactory`]: requests an adapter and device through
//! wgpu, either for an existing winit window or for a 1x1 off-screen target,
//! and renders one cleared frame so the driver does its real initialization
//! inside the crash bracket rather than on first use.

use crate::backend::{BackendSelection, Directive};
use crate::capabilities::{Feature, NegotiatedFormat, Profile, Renderable};
use crate::probe::{ContextFactory, DriverInfo, ProbeContext, ProbeError, SurfaceRequest};
use crate::shader::ShaderProgram;
use std::sync::Arc;
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;

/// Format of the synthetic off-screen target.
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Variable ANGLE's libEGL reads to pick its default platform.
pub const ANGLE_PLATFORM_VAR: &str = "ANGLE_DEFAULT_PLATFORM";

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

pub struct WgpuContextFactory {
    backend: BackendSelection,
}

impl WgpuContextFactory {
    /// Reads `directive` once. The backend preference must already have
    /// been configured.
    pub fn new(directive: &Directive) -> Self {
        let backend = directive
            .value()
            .and_then(|token| BackendSelection::from_token(token.as_bytes()))
            .unwrap_or_default();

        if let Some(platform) = angle_platform(backend) {
            if cfg!(windows) {
                std::env::set_var(ANGLE_PLATFORM_VAR, platform);
            }
            tracing::debug!("ANGLE: requesting {platform} platform for {backend:?}");
        }
        Self { backend }
    }

    /// Backend taken from the directive.
    pub fn backend(&self) -> BackendSelection {
        self.backend
    }

    fn backends(&self) -> wgpu::Backends {
        match self.backend {
            BackendSelection::Auto => wgpu::Backends::all(),
            // A pinned ANGLE backend only exists on the GL path.
            _ => wgpu::Backends::GL,
        }
    }
}

/// ANGLE platform name for a pinned backend. ANGLE has no separate
/// environment name for 11-on-12, so it shares the D3D11 platform.
fn angle_platform(backend: BackendSelection) -> Option<&'static str> {
    match backend {
        BackendSelection::Auto => None,
        BackendSelection::OpenGl => Some("gl"),
        BackendSelection::D3D9 => Some("d3d9"),
        BackendSelection::D3D11 | BackendSelection::D3D11On12 => Some("d3d11"),
    }
}

impl ContextFactory for WgpuContextFactory {
    type Target = Arc<Window>;
    type Context = WgpuContext;

    fn check_target(&self, target: &Arc<Window>) -> Result<(), &'static str> {
        if target.window_handle().is_err() || target.display_handle().is_err() {
            return Err("Could not create window for widget.");
        }
        Ok(())
    }

    fn create_context(
        &mut self,
        target: Option<&Arc<Window>>,
        request: SurfaceRequest,
    ) -> Result<WgpuContext, ProbeError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: self.backends(),
            ..Default::default()
        });

        let surface = target
            .map(|window| instance.create_surface(Arc::clone(window)))
            .transpose()?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: surface.as_ref(),
            force_fallback_adapter: false,
        }))
        .ok_or(ProbeError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Capability Probe Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))?;
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            tracing::warn!("OpenGL: device error during probe: {err}");
        }));

        let (format, alpha_bits) = match (&surface, target) {
            (Some(surface), Some(window)) => {
                configure_surface(surface, window, &adapter, &device, request)?
            }
            _ => (OFFSCREEN_FORMAT, alpha_bits(OFFSCREEN_FORMAT)),
        };

        let context = WgpuContext {
            adapter,
            device,
            queue,
            format,
            alpha_bits,
            _surface: surface,
        };
        context.clear_frame();
        Ok(context)
    }
}

/// Applies the requested alpha channel to the window's surface.
fn configure_surface(
    surface: &wgpu::Surface<'static>,
    window: &Window,
    adapter: &wgpu::Adapter,
    device: &wgpu::Device,
    request: SurfaceRequest,
) -> Result<(wgpu::TextureFormat, u8), ProbeError> {
    let caps = surface.get_capabilities(adapter);
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| alpha_bits(*f) >= request.alpha_bits)
        .or_else(|| caps.formats.first().copied())
        .ok_or(ProbeError::IncompatibleSurface)?;

    let blended = caps.alpha_modes.iter().copied().find(|mode| {
        matches!(
            mode,
            wgpu::CompositeAlphaMode::PreMultiplied | wgpu::CompositeAlphaMode::PostMultiplied
        )
    });

    let size = window.inner_size();
    surface.configure(
        device,
        &wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: blended
                .or_else(|| caps.alpha_modes.first().copied())
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        },
    );

    // An opaque composite mode discards whatever alpha the format carries.
    let alpha = if blended.is_some() { alpha_bits(format) } else { 0 };
    Ok((format, alpha))
}

/// A device created by the probe. Dropped as soon as the probe is done.
pub struct WgpuContext {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    alpha_bits: u8,
    _surface: Option<wgpu::Surface<'static>>,
}

impl WgpuContext {
    /// Clears a 1x1 target and waits for the GPU to finish.
    fn clear_frame(&self) {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Capability Probe Target"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capability Probe Encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Capability Probe Clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

impl ProbeContext for WgpuContext {
    fn has_feature(&self, feature: Feature) -> bool {
        let downlevel = self.adapter.get_downlevel_capabilities();
        match feature {
            Feature::NpotTextures => downlevel
                .flags
                .contains(wgpu::DownlevelFlags::NON_POWER_OF_TWO_MIPMAPPED_TEXTURES),
            Feature::Framebuffers => self
                .adapter
                .get_texture_format_features(self.format)
                .allowed_usages
                .contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
            // Sm2 adapters cannot sample textures in the fragment stage the
            // way the renderer needs.
            Feature::Shaders => !matches!(downlevel.shader_model, wgpu::ShaderModel::Sm2),
        }
    }

    fn link_program(&self, program: &ShaderProgram) -> Result<(), ProbeError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.label),
                source: wgpu::ShaderSource::Wgsl(program.source.into()),
            });

        let _pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.label),
                layout: None,
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(program.vertex_entry),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: 16,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(program.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(()),
            Some(err) => Err(ProbeError::Link {
                label: program.label,
                message: err.to_string(),
            }),
        }
    }

    fn format(&self) -> NegotiatedFormat {
        let info = self.adapter.get_info();
        let (profile, renderable) = classify(info.device_type, info.backend);
        let (major, minor) = context_version(info.backend, &info.driver_info);
        NegotiatedFormat {
            profile,
            renderable,
            alpha_bits: self.alpha_bits,
            major,
            minor,
        }
    }

    fn driver_info(&self) -> DriverInfo {
        let info = self.adapter.get_info();
        DriverInfo {
            renderer: info.name,
            vendor: format!("{:#06x} ({})", info.vendor, info.driver),
            version: if info.driver_info.is_empty() {
                "[unknown]".to_string()
            } else {
                info.driver_info
            },
            extensions: self
                .adapter
                .features()
                .iter_names()
                .map(|(name, _)| name.to_string())
                .collect(),
        }
    }
}

/// Maps what wgpu reports onto the profile classification. A CPU device is
/// a software rasterizer no matter which API fronts it.
fn classify(device_type: wgpu::DeviceType, backend: wgpu::Backend) -> (Profile, Renderable) {
    match (device_type, backend) {
        (wgpu::DeviceType::Cpu, _) => (Profile::NoProfile, Renderable::Desktop),
        (_, wgpu::Backend::Gl) => (Profile::NoProfile, Renderable::Embedded),
        _ => (Profile::Core, Renderable::Desktop),
    }
}

fn alpha_bits(format: wgpu::TextureFormat) -> u8 {
    use wgpu::TextureFormat as F;
    match format {
        F::Rgba8Unorm | F::Rgba8UnormSrgb | F::Bgra8Unorm | F::Bgra8UnormSrgb => 8,
        F::Rgba16Float | F::Rgba16Unorm => 16,
        F::Rgb10a2Unorm => 2,
        _ => 0,
    }
}

/// Only the GL driver string carries the context version; on other backends
/// it is the driver's own release number.
fn context_version(backend: wgpu::Backend, driver_info: &str) -> (u32, u32) {
    match backend {
        wgpu::Backend::Gl => parse_version(driver_info).unwrap_or((0, 0)),
        _ => (0, 0),
    }
}

/// First `major.minor` pair found in a driver version string.
fn parse_version(text: &str) -> Option<(u32, u32)> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find_map(|word| {
            let mut parts = word.split('.');
            let major = parts.next()?.parse().ok()?;
            let minor = parts.next()?.parse().ok()?;
            Some((major, minor))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_driver_versions() {
        assert_eq!(parse_version("OpenGL ES 3.2 Mesa 23.1.4"), Some((3, 2)));
        assert_eq!(parse_version("550.54.14"), Some((550, 54)));
        assert_eq!(parse_version("Metal"), None);
        assert_eq!(parse_version(""), None);
        assert_eq!(parse_version("v1 build 7"), None);
    }

    #[test]
    fn context_version_comes_from_gl_only() {
        assert_eq!(
            context_version(wgpu::Backend::Gl, "OpenGL ES 3.0 (ANGLE 2.1)"),
            (3, 0)
        );
        assert_eq!(context_version(wgpu::Backend::Vulkan, "Mesa 23.1.4"), (0, 0));
        assert_eq!(context_version(wgpu::Backend::Dx12, "31.0.15.5222"), (0, 0));
    }

    #[test]
    fn classifies_adapters() {
        assert_eq!(
            classify(wgpu::DeviceType::Cpu, wgpu::Backend::Vulkan),
            (Profile::NoProfile, Renderable::Desktop)
        );
        assert_eq!(
            classify(wgpu::DeviceType::IntegratedGpu, wgpu::Backend::Gl),
            (Profile::NoProfile, Renderable::Embedded)
        );
        assert_eq!(
            classify(wgpu::DeviceType::DiscreteGpu, wgpu::Backend::Dx12),
            (Profile::Core, Renderable::Desktop)
        );
    }

    #[test]
    fn alpha_depth_per_format() {
        assert_eq!(alpha_bits(wgpu::TextureFormat::Bgra8UnormSrgb), 8);
        assert_eq!(alpha_bits(wgpu::TextureFormat::Rgb10a2Unorm), 2);
        assert_eq!(alpha_bits(wgpu::TextureFormat::R8Unorm), 0);
    }

    #[test]
    fn pinned_backend_restricts_to_gl() {
        use crate::backend::{AnglePreference, BackendPreference, ResolvedBackend};
        use accel_store::{DurableMarker, MemoryMarker};

        let directive = Directive::new("ACCEL_TEST_DEVICE_PIN");
        let store = MemoryMarker::new();
        let pref =
            AnglePreference::new(store.clone(), directive.clone(), ResolvedBackend::new());

        pref.configure();
        let factory = WgpuContextFactory::new(&directive);
        assert_eq!(factory.backend(), BackendSelection::Auto);
        assert_eq!(factory.backends(), wgpu::Backends::all());

        store.write(b"d3d11on12").unwrap();
        pref.configure();
        let factory = WgpuContextFactory::new(&directive);
        assert_eq!(factory.backend(), BackendSelection::D3D11On12);
        assert_eq!(factory.backends(), wgpu::Backends::GL);
    }

    #[test]
    fn angle_platform_names() {
        assert_eq!(angle_platform(BackendSelection::Auto), None);
        assert_eq!(angle_platform(BackendSelection::OpenGl), Some("gl"));
        assert_eq!(angle_platform(BackendSelection::D3D9), Some("d3d9"));
        assert_eq!(angle_platform(BackendSelection::D3D11On12), Some("d3d11"));
    }

    #[test]
    #[ignore = "needs a GPU or software adapter"]
    fn offscreen_probe_on_this_machine() {
        let mut factory = WgpuContextFactory::new(&Directive::new("ACCEL_TEST_GPU_UNSET"));
        let context = factory
            .create_context(None, SurfaceRequest::default())
            .expect("context");
        assert_eq!(context.format().alpha_bits, 8);
        context
            .link_program(&crate::shader::SMOKE_PROGRAM)
            .expect("smoke shader links");
    }
}
