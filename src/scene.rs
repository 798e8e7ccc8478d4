// scene.rs: per-frame planning of what the draw loop renders
//
// Flat mode draws one monocular pass with the fused touch + sensor view.
// Headset mode splits the window side by side, one pass per eye, each
// sampling its own half of a stereo frame; touch does not apply there.

use crate::mesh::Eye;
use crate::orientation::OrientationCompositor;
use glam::Mat4;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Flat,
    Headset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct EyePass {
    pub eye: Eye,
    pub viewport: Viewport,
    pub view_projection: Mat4,
}

#[derive(Debug, Clone, Copy)]
pub struct Projection {
    pub fov_y_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y_degrees: 90.0,
            z_near: 0.1,
            z_far: 100.0,
        }
    }
}

impl Projection {
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        Mat4::perspective_rh(
            self.fov_y_degrees.clamp(1.0, 179.0).to_radians(),
            aspect,
            self.z_near,
            self.z_far,
        )
    }
}

pub struct SceneRenderer {
    compositor: Arc<OrientationCompositor>,
    projection: Projection,
}

impl SceneRenderer {
    pub fn new(compositor: Arc<OrientationCompositor>, projection: Projection) -> Self {
        Self {
            compositor,
            projection,
        }
    }

    /// Passes for one frame on a `width x height` target.
    pub fn frame_passes(&self, mode: DisplayMode, width: u32, height: u32) -> Vec<EyePass> {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        match mode {
            DisplayMode::Flat => {
                let view = self.compositor.view_matrix();
                vec![EyePass {
                    eye: Eye::Monocular,
                    viewport: Viewport { x: 0.0, y: 0.0, width: w, height: h },
                    view_projection: self.projection.matrix(w / h) * view,
                }]
            }
            DisplayMode::Headset => {
                let view = self.compositor.device_view_matrix();
                let half = (w / 2.0).floor().max(1.0);
                let view_projection = self.projection.matrix(half / h) * view;
                vec![
                    EyePass {
                        eye: Eye::LeftEye,
                        viewport: Viewport { x: 0.0, y: 0.0, width: half, height: h },
                        view_projection,
                    },
                    EyePass {
                        eye: Eye::RightEye,
                        viewport: Viewport { x: half, y: 0.0, width: (w - half).max(1.0), height: h },
                        view_projection,
                    },
                ]
            }
        }
    }
}
