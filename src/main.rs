use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use clap::Parser;
use glam::{Mat3, Mat4, Vec3};
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use mesh_viewer::cli::Cli;
use mesh_viewer::{Camera, GpuContext, GpuProgram, InputState, Model, PipelineConfig, Vertex};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.05,
    b: 0.05,
    a: 1.0,
};

// Spotlight parameters: the light rides on the camera like a headlamp.
const SPOT_CUT_OFF_DEG: f32 = 12.5;
const SPOT_OUTER_CUT_OFF_DEG: f32 = 17.5;
const SHININESS: f32 = 32.0;

/// Surface, depth buffer, program, and model for one window.
struct Viewer {
    ctx: GpuContext,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    program: GpuProgram,
    model: Model,
}

impl Viewer {
    fn new(window: Arc<Window>, cli: &Cli) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;
        let ctx = pollster::block_on(GpuContext::new(&instance, Some(&surface)))?;

        let caps = surface.get_capabilities(ctx.adapter());
        let surface_format = caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(ctx.device(), &config);

        let depth_view = Self::create_depth_view(&ctx, config.width, config.height);

        let program = GpuProgram::from_files(
            &ctx,
            &cli.vertex_shader,
            &cli.fragment_shader,
            &PipelineConfig {
                color_format: surface_format,
                depth_format: Some(DEPTH_FORMAT),
                vertex_layouts: &[Vertex::layout()],
            },
        )
        .context("failed to build shader program")?;

        let model = Model::load(&ctx, &program, &cli.model)
            .with_context(|| format!("failed to load model {:?}", cli.model))?;

        Ok(Self {
            ctx,
            surface,
            config,
            depth_view,
            program,
            model,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(self.ctx.device(), &self.config);
        self.depth_view = Self::create_depth_view(&self.ctx, width, height);
    }

    fn render(&mut self, camera: &Camera) -> anyhow::Result<()> {
        let aspect_ratio = self.config.width as f32 / self.config.height as f32;
        // Nudge the model down and shrink it so typical assets sit in view.
        let model_matrix = Mat4::from_translation(Vec3::new(0.0, -1.75, 0.0))
            * Mat4::from_scale(Vec3::splat(0.2));

        let normal_matrix = Mat3::from_mat4(model_matrix).inverse().transpose();

        self.program.set_uniform("model", model_matrix);
        self.program.set_uniform("normal_matrix", normal_matrix);
        self.program.set_uniform("view", camera.view_matrix());
        self.program
            .set_uniform("projection", camera.projection_matrix(aspect_ratio));
        self.program.set_uniform("view_pos", camera.position);

        self.program.set_uniform("light.position", camera.position);
        self.program.set_uniform("light.direction", camera.front());
        // Cosines, not angles: the fragment shader compares against a dot
        // product.
        self.program
            .set_uniform("light.cut_off", SPOT_CUT_OFF_DEG.to_radians().cos());
        self.program.set_uniform(
            "light.outer_cut_off",
            SPOT_OUTER_CUT_OFF_DEG.to_radians().cos(),
        );
        self.program.set_uniform("light.ambient", Vec3::splat(0.1));
        self.program.set_uniform("light.diffuse", Vec3::splat(0.8));
        self.program.set_uniform("light.specular", Vec3::splat(1.0));
        self.program.set_uniform("light.k_constant", 1.0f32);
        self.program.set_uniform("light.k_linear", 0.09f32);
        self.program.set_uniform("light.k_quadratic", 0.032f32);
        self.program.set_uniform("shininess", SHININESS);

        self.program.flush(self.ctx.queue());

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.ctx.device(), &self.config);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Viewer Render Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Viewer Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.program.bind(&mut pass);
            self.model.draw(&mut pass);
        }

        self.ctx.queue().submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn create_depth_view(ctx: &GpuContext, width: u32, height: u32) -> wgpu::TextureView {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }
}

// === Application ===

struct App {
    cli: Cli,
    window: Option<Arc<Window>>,
    viewer: Option<Viewer>,
    camera: Camera,
    input: InputState,
    last_frame: Instant,
}

impl App {
    fn new(cli: Cli) -> Self {
        Self {
            cli,
            window: None,
            viewer: None,
            camera: Camera::new(Vec3::new(0.0, 0.0, 3.0)),
            input: InputState::default(),
            last_frame: Instant::now(),
        }
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        let pressed = event.state == ElementState::Pressed;
        if let PhysicalKey::Code(code) = event.physical_key {
            match code {
                KeyCode::KeyW | KeyCode::ArrowUp => self.input.forward = pressed,
                KeyCode::KeyS | KeyCode::ArrowDown => self.input.backward = pressed,
                KeyCode::KeyA | KeyCode::ArrowLeft => self.input.left = pressed,
                KeyCode::KeyD | KeyCode::ArrowRight => self.input.right = pressed,
                _ => {}
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match event_loop.create_window(
            Window::default_attributes()
                .with_title("Mesh Viewer")
                .with_inner_size(winit::dpi::LogicalSize::new(self.cli.width, self.cli.height)),
        ) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                eprintln!("Failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        // First-person mouse look wants a captured cursor; not every
        // platform supports locking, so fall back to confining it.
        window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
            .ok();
        window.set_cursor_visible(false);

        match Viewer::new(window.clone(), &self.cli) {
            Ok(viewer) => {
                self.window = Some(window);
                self.viewer = Some(viewer);
                self.last_frame = Instant::now();
            }
            Err(err) => {
                eprintln!("Failed to initialize viewer: {err:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::MouseWheel { delta, .. } => {
                let y_offset = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                };
                self.camera.process_mouse_scroll(y_offset);
            }
            WindowEvent::Resized(size) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let delta_time = now.duration_since(self.last_frame).as_secs_f32();
                self.last_frame = now;

                self.camera.apply_input(&self.input, delta_time);

                if let Some(viewer) = &mut self.viewer {
                    if let Err(err) = viewer.render(&self.camera) {
                        eprintln!("Render error: {err:#}");
                    }
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            // Window deltas grow downward; the camera wants "up is
            // positive".
            self.camera
                .process_mouse_movement(dx as f32, -dy as f32, true);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let event_loop = EventLoop::new()?;
    let mut app = App::new(cli);

    println!("Mesh Viewer - Controls: WASD to move, mouse to look, scroll to zoom, Escape to quit");
    event_loop.run_app(&mut app)?;

    Ok(())
}
