//! Pointer input state for the windowed runner.

use glam::Vec2;
use winit::event::{ElementState, MouseButton, WindowEvent};

/// Tracks the pointer state the viewer consumes: drag deltas and scroll.
pub struct Input {
    dragging: bool,
    mouse_position: Vec2,
    mouse_delta: Vec2,
    scroll_delta: f32,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            dragging: false,
            mouse_position: Vec2::ZERO,
            mouse_delta: Vec2::ZERO,
            scroll_delta: 0.0,
        }
    }
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-frame accumulators. Call at the end of each frame.
    pub fn begin_frame(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }

    /// Fold a window event into the state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                if *button == MouseButton::Left {
                    self.dragging = *state == ElementState::Pressed;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let new_pos = Vec2::new(position.x as f32, position.y as f32);
                if self.dragging {
                    self.mouse_delta += new_pos - self.mouse_position;
                }
                self.mouse_position = new_pos;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_delta += match delta {
                    winit::event::MouseScrollDelta::LineDelta(_, y) => *y,
                    winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                };
            }
            _ => {}
        }
    }

    /// True while the primary button is held.
    pub fn dragging(&self) -> bool {
        self.dragging
    }

    /// Accumulated drag delta this frame, in pixels.
    pub fn drag_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// Accumulated scroll delta this frame, in lines.
    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }
}
