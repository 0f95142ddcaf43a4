//! Windowed runner.
//!
//! Drives a [`Viewer`] from a winit event loop: one tick per redraw, pointer
//! drag and scroll forwarded to the viewer, resize and teardown wired
//! through. Embedders that bring their own loop can skip this module and
//! call [`Viewer::tick`] themselves.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::error::Error;
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::scene::{SourceConfig, Viewer};
use crate::wgpu_backend::WgpuBackend;

/// Window configuration for [`run_viewer`].
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Panorama".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Open a window and run a viewer over the given source until the window
/// closes. `setup` runs once after the viewer is built, before the first
/// frame — install plugins and subscriptions there.
pub fn run_viewer<S>(config: AppConfig, source: SourceConfig, setup: S) -> Result<(), Error>
where
    S: FnOnce(&mut Viewer) + 'static,
{
    let _ = env_logger::try_init();

    let event_loop = EventLoop::new()
        .map_err(|e| Error::Config(format!("failed to create event loop: {}", e)))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::Pending {
        config,
        source,
        setup: Some(Box::new(setup)),
    };
    event_loop
        .run_app(&mut app)
        .map_err(|e| Error::Config(format!("event loop failed: {}", e)))
}

enum App {
    Pending {
        config: AppConfig,
        source: SourceConfig,
        setup: Option<Box<dyn FnOnce(&mut Viewer)>>,
    },
    Running {
        window: Arc<Window>,
        viewer: Viewer,
        input: Input,
        last_frame: Instant,
    },
    Failed,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let App::Pending {
            config,
            source,
            setup,
        } = self
        {
            let window_attrs = WindowAttributes::default()
                .with_title(&config.title)
                .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
            let window = match event_loop.create_window(window_attrs) {
                Ok(window) => Arc::new(window),
                Err(e) => {
                    log::error!("failed to create window: {}", e);
                    event_loop.exit();
                    *self = App::Failed;
                    return;
                }
            };

            let gpu = GpuContext::new(window.clone());
            let backend = WgpuBackend::new(gpu);
            let mut viewer = match Viewer::new(Box::new(backend), source.clone()) {
                Ok(viewer) => viewer,
                Err(e) => {
                    log::error!("failed to build viewer: {}", e);
                    event_loop.exit();
                    *self = App::Failed;
                    return;
                }
            };

            let size = window.inner_size();
            viewer.resize(size.width, size.height);

            if let Some(setup) = setup.take() {
                setup(&mut viewer);
            }
            viewer.run();
            // Without an entrance-animation plugin the scene is immediately
            // stable.
            viewer.no_timeline();

            *self = App::Running {
                window,
                viewer,
                input: Input::new(),
                last_frame: Instant::now(),
            };
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let App::Running {
            window,
            viewer,
            input,
            last_frame,
        } = self
        else {
            return;
        };

        input.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                viewer.dispose();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                viewer.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt_ms = now.duration_since(*last_frame).as_secs_f32() * 1000.0;
                *last_frame = now;

                let drag = input.drag_delta();
                if drag != glam::Vec2::ZERO {
                    viewer.pointer_drag(drag.x, drag.y);
                }
                let scroll = input.scroll_delta();
                if scroll != 0.0 {
                    viewer.pointer_zoom(scroll);
                }

                viewer.tick(dt_ms);

                input.begin_frame();
                window.request_redraw();
            }
            _ => {}
        }
    }
}
