// touch.rs: drag gestures to accumulated yaw/pitch, compensated for device roll

use crate::orientation::OrientationCompositor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Arbitrary touch speed; tune so the scene follows the finger.
pub const PX_PER_DEGREE: f32 = 25.0;

/// Touch pitch is limited so it cannot fight the sensor pitch near the poles.
pub const MAX_PITCH_DEGREES: f32 = 45.0;

/// Roll written by the sensor thread and read by the input thread as one
/// word, so a reader never sees half an update.
#[derive(Debug, Default)]
pub struct SharedRoll(AtomicU32);

impl SharedRoll {
    pub fn store(&self, radians: f32) {
        self.0.store(radians.to_bits(), Ordering::Release);
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Pressed { x: f32, y: f32 },
    Moved { x: f32, y: f32 },
    Released,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TouchOffset {
    pub yaw_degrees: f32,
    pub pitch_degrees: f32,
}

pub struct TouchTracker {
    compositor: Arc<OrientationCompositor>,
    roll: Arc<SharedRoll>,
    px_per_degree: f32,
    anchor: (f32, f32),
    /// A press was seen and not yet released; moves without one are ignored.
    active: bool,
    accumulated: TouchOffset,
}

impl TouchTracker {
    pub fn new(compositor: Arc<OrientationCompositor>, roll: Arc<SharedRoll>) -> Self {
        Self::with_speed(compositor, roll, PX_PER_DEGREE)
    }

    pub fn with_speed(
        compositor: Arc<OrientationCompositor>,
        roll: Arc<SharedRoll>,
        px_per_degree: f32,
    ) -> Self {
        Self {
            compositor,
            roll,
            px_per_degree: if px_per_degree > 0.0 { px_per_degree } else { PX_PER_DEGREE },
            anchor: (0.0, 0.0),
            active: false,
            accumulated: TouchOffset::default(),
        }
    }

    /// Returns whether the event was consumed.
    pub fn on_event(&mut self, event: PointerEvent) -> bool {
        match event {
            PointerEvent::Pressed { x, y } => {
                self.anchor = (x, y);
                self.active = true;
                true
            }
            PointerEvent::Moved { .. } if !self.active => false,
            PointerEvent::Moved { x, y } => {
                let dx = (x - self.anchor.0) / self.px_per_degree;
                let dy = (y - self.anchor.1) / self.px_per_degree;
                self.anchor = (x, y);

                // rotate the drag by -roll; screen y points down, hence the sign layout
                let r = -self.roll.load();
                let (sr, cr) = r.sin_cos();
                self.accumulated.yaw_degrees -= cr * dx - sr * dy;
                self.accumulated.pitch_degrees = (self.accumulated.pitch_degrees
                    + sr * dx
                    + cr * dy)
                    .clamp(-MAX_PITCH_DEGREES, MAX_PITCH_DEGREES);

                self.compositor.set_pitch_offset(self.accumulated.pitch_degrees);
                self.compositor.set_yaw_offset(self.accumulated.yaw_degrees);
                true
            }
            PointerEvent::Released | PointerEvent::Cancelled => {
                self.active = false;
                false
            }
        }
    }

    pub fn offset(&self) -> TouchOffset {
        self.accumulated
    }

    /// Back to the sensor-only view.
    pub fn reset(&mut self) {
        self.accumulated = TouchOffset::default();
        self.compositor.set_pitch_offset(0.0);
        self.compositor.set_yaw_offset(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-4, "{a} != {b}");
    }

    fn tracker() -> (TouchTracker, Arc<OrientationCompositor>, Arc<SharedRoll>) {
        let compositor = Arc::new(OrientationCompositor::new());
        let roll = Arc::new(SharedRoll::default());
        (TouchTracker::new(compositor.clone(), roll.clone()), compositor, roll)
    }

    #[test]
    fn horizontal_drag_turns_yaw() {
        let (mut t, compositor, _) = tracker();
        assert!(t.on_event(PointerEvent::Pressed { x: 100.0, y: 100.0 }));
        assert!(t.on_event(PointerEvent::Moved { x: 350.0, y: 100.0 }));
        assert_close(t.offset().yaw_degrees, -10.0);
        assert_close(t.offset().pitch_degrees, 0.0);
        let (yaw, pitch) = compositor.touch_offsets();
        assert_close(yaw, -10.0);
        assert_close(pitch, 0.0);
    }

    #[test]
    fn press_only_moves_the_anchor() {
        let (mut t, _, _) = tracker();
        t.on_event(PointerEvent::Pressed { x: 0.0, y: 0.0 });
        t.on_event(PointerEvent::Moved { x: 50.0, y: 0.0 });
        t.on_event(PointerEvent::Pressed { x: 500.0, y: 500.0 });
        assert_close(t.offset().yaw_degrees, -2.0);
        t.on_event(PointerEvent::Moved { x: 525.0, y: 500.0 });
        assert_close(t.offset().yaw_degrees, -3.0);
    }

    #[test]
    fn pitch_saturates_at_limit() {
        let (mut t, _, _) = tracker();
        t.on_event(PointerEvent::Pressed { x: 0.0, y: 0.0 });
        t.on_event(PointerEvent::Moved { x: 0.0, y: 2000.0 });
        assert_eq!(t.offset().pitch_degrees, MAX_PITCH_DEGREES);
        t.on_event(PointerEvent::Moved { x: 0.0, y: 2500.0 });
        assert_eq!(t.offset().pitch_degrees, MAX_PITCH_DEGREES);
        t.on_event(PointerEvent::Moved { x: 0.0, y: -5000.0 });
        assert_eq!(t.offset().pitch_degrees, -MAX_PITCH_DEGREES);
    }

    #[test]
    fn roll_rotates_the_drag_vector() {
        let (mut t, _, roll) = tracker();
        roll.store(std::f32::consts::FRAC_PI_2);
        t.on_event(PointerEvent::Pressed { x: 0.0, y: 0.0 });
        t.on_event(PointerEvent::Moved { x: 250.0, y: 0.0 });
        // with the phone rolled 90 degrees a horizontal swipe is a pitch gesture
        assert_close(t.offset().yaw_degrees, 0.0);
        assert_close(t.offset().pitch_degrees, -10.0);
    }

    #[test]
    fn release_is_not_handled() {
        let (mut t, _, _) = tracker();
        assert!(!t.on_event(PointerEvent::Released));
        assert!(!t.on_event(PointerEvent::Cancelled));
        assert_eq!(t.offset(), TouchOffset::default());
    }

    #[test]
    fn moves_without_a_press_are_ignored() {
        let (mut t, compositor, _) = tracker();
        assert!(!t.on_event(PointerEvent::Moved { x: 400.0, y: 300.0 }));
        assert_eq!(t.offset(), TouchOffset::default());

        t.on_event(PointerEvent::Pressed { x: 0.0, y: 0.0 });
        t.on_event(PointerEvent::Moved { x: 25.0, y: 0.0 });
        t.on_event(PointerEvent::Released);
        // the anchor from the finished drag must not make the view jump
        assert!(!t.on_event(PointerEvent::Moved { x: 900.0, y: 900.0 }));
        assert_close(t.offset().yaw_degrees, -1.0);
        assert_close(compositor.touch_offsets().0, -1.0);

        t.on_event(PointerEvent::Pressed { x: 10.0, y: 10.0 });
        t.on_event(PointerEvent::Cancelled);
        assert!(!t.on_event(PointerEvent::Moved { x: 60.0, y: 10.0 }));
        assert_close(t.offset().yaw_degrees, -1.0);
    }

    #[test]
    fn reset_clears_offsets() {
        let (mut t, compositor, _) = tracker();
        t.on_event(PointerEvent::Pressed { x: 0.0, y: 0.0 });
        t.on_event(PointerEvent::Moved { x: 100.0, y: 100.0 });
        t.reset();
        assert_eq!(t.offset(), TouchOffset::default());
        assert_eq!(compositor.touch_offsets(), (0.0, 0.0));
    }
}
