// orientation.rs: fuses device orientation with touch yaw/pitch into one view matrix
//
// view = touch_pitch * device_orientation * touch_yaw
//
// The order matters: yaw spins the world around its own up axis before the
// device rotation, pitch tilts around the real horizon after it.
// Device samples arrive on the sensor thread, touch offsets on the input
// thread, and the render thread reads the result; all of it sits behind one
// mutex held only for the copy or the two multiplies.

use glam::{Mat4, Vec3};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct Inputs {
    device_orientation: Mat4,
    /// Negated device roll, radians.
    device_roll: f32,
    touch_pitch_degrees: f32,
    touch_yaw_degrees: f32,
    pitch_matrix: Mat4,
    yaw_matrix: Mat4,
}

impl Inputs {
    // Pitch axis stays parallel to the real horizon: <1, 0, 0> after undoing roll.
    fn update_pitch_matrix(&mut self) {
        self.pitch_matrix = Mat4::from_axis_angle(
            pitch_axis(self.device_roll),
            (-self.touch_pitch_degrees).to_radians(),
        );
    }
}

fn pitch_axis(device_roll: f32) -> Vec3 {
    Vec3::new(device_roll.cos(), device_roll.sin(), 0.0)
}

pub struct OrientationCompositor {
    inputs: Mutex<Inputs>,
}

impl Default for OrientationCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationCompositor {
    pub fn new() -> Self {
        Self {
            inputs: Mutex::new(Inputs {
                device_orientation: Mat4::IDENTITY,
                device_roll: 0.0,
                touch_pitch_degrees: 0.0,
                touch_yaw_degrees: 0.0,
                pitch_matrix: Mat4::IDENTITY,
                yaw_matrix: Mat4::IDENTITY,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inputs> {
        // a panic elsewhere leaves plain matrices behind, still usable
        self.inputs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sensor thread: replace the device matrix wholesale. `roll` in radians.
    pub fn set_device_orientation(&self, matrix: Mat4, roll: f32) {
        let mut inputs = self.lock();
        inputs.device_orientation = matrix;
        inputs.device_roll = -roll;
        inputs.update_pitch_matrix();
    }

    /// Input thread: accumulated touch pitch in degrees.
    pub fn set_pitch_offset(&self, pitch_degrees: f32) {
        let mut inputs = self.lock();
        inputs.touch_pitch_degrees = pitch_degrees;
        inputs.update_pitch_matrix();
    }

    /// Input thread: accumulated touch yaw in degrees.
    pub fn set_yaw_offset(&self, yaw_degrees: f32) {
        let mut inputs = self.lock();
        inputs.touch_yaw_degrees = yaw_degrees;
        inputs.yaw_matrix = Mat4::from_rotation_y((-yaw_degrees).to_radians());
    }

    /// Render thread, once per frame.
    pub fn view_matrix(&self) -> Mat4 {
        let inputs = *self.lock();
        inputs.pitch_matrix * (inputs.device_orientation * inputs.yaw_matrix)
    }

    /// Device orientation alone, used when touch does not apply (headset mode).
    pub fn device_view_matrix(&self) -> Mat4 {
        self.lock().device_orientation
    }

    #[cfg(test)]
    pub fn current_pitch_axis(&self) -> Vec3 {
        pitch_axis(self.lock().device_roll)
    }

    /// `(yaw, pitch)` touch offsets in degrees.
    #[cfg(test)]
    pub fn touch_offsets(&self) -> (f32, f32) {
        let inputs = self.lock();
        (inputs.touch_yaw_degrees, inputs.touch_pitch_degrees)
    }

    /// Device roll in radians as last reported by the sensor.
    pub fn device_roll(&self) -> f32 {
        -self.lock().device_roll
    }
}
