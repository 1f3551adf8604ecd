//! Probe window
//!
//! A hidden winit window for hosts that want the probe to run against a real
//! native surface instead of the synthetic off-screen target.

use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    error::EventLoopError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Capability Probe".to_string(),
            width: 64,
            height: 64,
        }
    }
}

/// Attributes for an invisible probe window.
pub fn probe_window_attributes(config: &WindowConfig) -> winit::window::WindowAttributes {
    Window::default_attributes()
        .with_title(config.title.clone())
        .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height))
        .with_visible(false)
}

/// Creates a hidden window once the event loop is live, hands it to
/// `on_window`, then leaves the loop.
///
/// In winit 0.30+ windows can only be created inside `resumed`.
pub struct ProbeWindowApp<F> {
    config: WindowConfig,
    on_window: Option<F>,
    failed: bool,
}

impl<F: FnOnce(Arc<Window>)> ProbeWindowApp<F> {
    pub fn new(config: WindowConfig, on_window: F) -> Self {
        Self {
            config,
            on_window: Some(on_window),
            failed: false,
        }
    }

    /// Whether the callback never ran, either because the window could not
    /// be created or because the loop ended before `resumed`.
    pub fn failed(&self) -> bool {
        self.failed || self.on_window.is_some()
    }
}

impl<F: FnOnce(Arc<Window>)> ApplicationHandler for ProbeWindowApp<F> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(on_window) = self.on_window.take() else {
            return;
        };

        match event_loop.create_window(probe_window_attributes(&self.config)) {
            Ok(window) => on_window(Arc::new(window)),
            Err(err) => {
                tracing::warn!("OpenGL: Could not create window for probe: {err}");
                self.failed = true;
            }
        }
        event_loop.exit();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let WindowEvent::CloseRequested = event {
            event_loop.exit();
        }
    }
}

/// Runs `on_window` against a hidden window on the current thread.
/// Returns `Ok(false)` when no window could be created.
pub fn with_probe_window<F>(config: WindowConfig, on_window: F) -> Result<bool, EventLoopError>
where
    F: FnOnce(Arc<Window>),
{
    let event_loop = EventLoop::new()?;
    let mut app = ProbeWindowApp::new(config, on_window);
    event_loop.run_app(&mut app)?;
    Ok(!app.failed())
}
