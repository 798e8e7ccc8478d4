// sensors.rs: rotation-vector samples to device orientation + roll
//
// A sample (device->world quaternion, world Z up) becomes a GL-style view
// matrix (Y up) plus the device roll, consumed by both the touch tracker and
// the compositor. Desktops have no gyroscope, so `VirtualGyro` integrates
// keyboard-driven angular rates on its own thread.

use crate::orientation::OrientationCompositor;
use crate::touch::SharedRoll;
use glam::{Mat3, Mat4, Quat, Vec3};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Device orientation matrix and roll (radians) for one sample.
pub fn device_orientation(rotation: Quat) -> (Mat4, f32) {
    let rotation = rotation.normalize();
    let r = Mat3::from_quat(rotation);

    // Roll after remapping device Y to -Z, so it does not depend on pitch or
    // yaw: row 2 of the remapped matrix is [R20, -R22, R21].
    let roll = (-r.x_axis.z).atan2(r.y_axis.z);

    // Transposed rotation is world→device; then swing world Z-up into GL Y-up.
    let matrix = Mat4::from_mat3(r.transpose()) * Mat4::from_rotation_x(90f32.to_radians());
    (matrix, roll)
}

/// Routes samples to everything that depends on device orientation.
#[derive(Clone)]
pub struct OrientationListener {
    compositor: Arc<OrientationCompositor>,
    roll: Arc<SharedRoll>,
}

impl OrientationListener {
    pub fn new(compositor: Arc<OrientationCompositor>, roll: Arc<SharedRoll>) -> Self {
        Self { compositor, roll }
    }

    pub fn on_rotation_vector(&self, rotation: Quat) {
        let (matrix, roll) = device_orientation(rotation);
        self.roll.store(roll);
        self.compositor.set_device_orientation(matrix, roll);
    }
}

/// Angular rates in rad/s around the device's own axes.
#[derive(Debug, Default)]
pub struct AngularRates {
    x: AtomicU32,
    y: AtomicU32,
    z: AtomicU32,
    reset: AtomicBool,
}

impl AngularRates {
    pub fn set(&self, rates: Vec3) {
        self.x.store(rates.x.to_bits(), Ordering::Relaxed);
        self.y.store(rates.y.to_bits(), Ordering::Relaxed);
        self.z.store(rates.z.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> Vec3 {
        Vec3::new(
            f32::from_bits(self.x.load(Ordering::Relaxed)),
            f32::from_bits(self.y.load(Ordering::Relaxed)),
            f32::from_bits(self.z.load(Ordering::Relaxed)),
        )
    }

    /// Ask the gyro thread to return to the upright pose.
    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::Relaxed);
    }
}

/// Phone held upright facing the horizon: device Y along world Z.
pub fn upright() -> Quat {
    Quat::from_rotation_x(90f32.to_radians())
}

pub struct VirtualGyro {
    rates: Arc<AngularRates>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

const SAMPLE_PERIOD: Duration = Duration::from_millis(5);

impl VirtualGyro {
    pub fn spawn(listener: OrientationListener) -> Self {
        let rates = Arc::new(AngularRates::default());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let rates = rates.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("sensor".into())
                .spawn(move || {
                    let mut orientation = upright();
                    let mut last = Instant::now();
                    listener.on_rotation_vector(orientation);

                    while running.load(Ordering::Relaxed) {
                        thread::sleep(SAMPLE_PERIOD);
                        let now = Instant::now();
                        let dt = (now - last).as_secs_f32();
                        last = now;

                        if rates.reset.swap(false, Ordering::Relaxed) {
                            orientation = upright();
                        } else {
                            let rate = rates.get();
                            if rate == Vec3::ZERO {
                                continue;
                            }
                            orientation = integrate(orientation, rate, dt);
                        }
                        listener.on_rotation_vector(orientation);
                    }
                    debug!("sensor thread stopped");
                })
                .ok()
        };

        if handle.is_some() {
            info!("virtual gyroscope running at {} Hz", 1000 / SAMPLE_PERIOD.as_millis());
        }

        Self {
            rates,
            running,
            handle,
        }
    }

    pub fn rates(&self) -> Arc<AngularRates> {
        self.rates.clone()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for VirtualGyro {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One gyroscope step: body-frame rates applied on the right.
pub fn integrate(orientation: Quat, rate: Vec3, dt: f32) -> Quat {
    (orientation * Quat::from_scaled_axis(rate * dt)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-5, "{a} != {b}");
    }

    #[test]
    fn upright_phone_gives_identity_view() {
        let (matrix, roll) = device_orientation(upright());
        assert!(matrix.abs_diff_eq(Mat4::IDENTITY, 1e-5), "{matrix:?}");
        assert_close(roll, 0.0);
    }

    #[test]
    fn rolling_the_phone_is_reported_as_roll() {
        let theta = 0.4;
        let rolled = upright() * Quat::from_rotation_z(theta);
        let (_, roll) = device_orientation(rolled);
        assert_close(roll.abs(), theta);
    }

    #[test]
    fn roll_is_independent_of_yaw() {
        let theta = 0.3;
        let yawed = Quat::from_rotation_z(1.1) * upright() * Quat::from_rotation_z(theta);
        let (_, roll) = device_orientation(yawed);
        assert_close(roll.abs(), theta);
    }

    #[test]
    fn listener_feeds_roll_and_compositor() {
        let compositor = Arc::new(OrientationCompositor::new());
        let roll = Arc::new(SharedRoll::default());
        let listener = OrientationListener::new(compositor.clone(), roll.clone());
        listener.on_rotation_vector(upright() * Quat::from_rotation_z(0.25));
        assert_close(roll.load().abs(), 0.25);
        assert_close(compositor.device_roll(), roll.load());
    }

    #[test]
    fn integration_follows_rate() {
        let q = integrate(Quat::IDENTITY, Vec3::new(0.0, 0.0, 1.0), 0.5);
        assert!(q.abs_diff_eq(Quat::from_rotation_z(0.5), 1e-5));
    }

    #[test]
    fn virtual_gyro_publishes_an_initial_sample() {
        let compositor = Arc::new(OrientationCompositor::new());
        let roll = Arc::new(SharedRoll::default());
        compositor.set_device_orientation(Mat4::from_rotation_y(1.0), 0.0);
        let mut gyro = VirtualGyro::spawn(OrientationListener::new(compositor.clone(), roll));
        let deadline = Instant::now() + Duration::from_secs(2);
        while !compositor.device_view_matrix().abs_diff_eq(Mat4::IDENTITY, 1e-5) {
            assert!(Instant::now() < deadline, "sensor thread never reported");
            thread::sleep(Duration::from_millis(1));
        }
        gyro.stop();
    }
}
