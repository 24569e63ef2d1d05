use foundation::bounds::LngLat;
use serde::{Deserialize, Serialize};

/// Map camera: center and fractional zoom.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub center: LngLat,
    pub zoom: f64,
}

impl Camera {
    pub fn new(center: LngLat, zoom: f64) -> Self {
        Self { center, zoom }
    }

    pub fn with_zoom(self, zoom: f64) -> Self {
        Self { zoom, ..self }
    }

    /// Zoom clamped to `[0, max_zoom]`.
    pub fn clamped(self, max_zoom: u8) -> Self {
        let zoom = if self.zoom.is_finite() { self.zoom } else { 0.0 };
        Self {
            center: self.center,
            zoom: zoom.clamp(0.0, f64::from(max_zoom)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraOptions {
    pub animate: bool,
    pub duration_ms: u32,
}

impl CameraOptions {
    pub fn jump() -> Self {
        Self {
            animate: false,
            duration_ms: 0,
        }
    }

    pub fn fly(duration_ms: u32) -> Self {
        Self {
            animate: true,
            duration_ms,
        }
    }
}

/// Identifier of one camera motion. Only the latest motion ever completes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MotionId(pub u64);

#[derive(Debug, Clone, Copy)]
struct Motion {
    id: MotionId,
    from: Camera,
    to: Camera,
    duration_s: f64,
    elapsed_s: f64,
}

/// Eased camera transitions.
///
/// Starting a motion while another is in flight replaces it; the replaced
/// motion never completes.
#[derive(Debug, Clone)]
pub struct CameraAnimator {
    camera: Camera,
    motion: Option<Motion>,
    next_id: u64,
}

impl CameraAnimator {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            motion: None,
            next_id: 1,
        }
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn in_motion(&self) -> bool {
        self.motion.is_some()
    }

    pub fn current_motion(&self) -> Option<MotionId> {
        self.motion.map(|m| m.id)
    }

    /// Places the camera without a motion.
    pub fn reset(&mut self, camera: Camera) {
        self.camera = camera;
        self.motion = None;
    }

    pub fn start(&mut self, to: Camera, options: CameraOptions) -> MotionId {
        let id = MotionId(self.next_id);
        self.next_id += 1;
        let duration_s = if options.animate {
            f64::from(options.duration_ms) / 1000.0
        } else {
            0.0
        };
        self.motion = Some(Motion {
            id,
            from: self.camera,
            to,
            duration_s,
            elapsed_s: 0.0,
        });
        id
    }

    /// Steps the active motion. Returns the motion that settled this step.
    pub fn advance(&mut self, dt_s: f64) -> Option<(MotionId, Camera)> {
        let motion = self.motion.as_mut()?;
        motion.elapsed_s += dt_s.max(0.0);
        let t = if motion.duration_s <= 0.0 {
            1.0
        } else {
            (motion.elapsed_s / motion.duration_s).min(1.0)
        };
        if t >= 1.0 {
            let done = (motion.id, motion.to);
            self.camera = motion.to;
            self.motion = None;
            return Some(done);
        }
        self.camera = interpolate(motion.from, motion.to, ease_in_out(t));
        None
    }
}

fn ease_in_out(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn interpolate(a: Camera, b: Camera, t: f64) -> Camera {
    let mut dlng = b.center.lng - a.center.lng;
    if dlng > 180.0 {
        dlng -= 360.0;
    } else if dlng < -180.0 {
        dlng += 360.0;
    }
    Camera {
        center: LngLat::new(
            a.center.lng + dlng * t,
            a.center.lat + (b.center.lat - a.center.lat) * t,
        ),
        zoom: a.zoom + (b.zoom - a.zoom) * t,
    }
}
