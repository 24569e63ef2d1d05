use foundation::time::Time;

/// Cooperative frame metadata.
///
/// Every dispatch of the map session (a host tick, a camera call, a marker
/// click) runs inside one frame. Frames are pure values so a session can be
/// replayed with the same `dt` sequence.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Delta time of this frame (seconds).
    pub dt_s: f64,
    /// Session time at the end of the frame (seconds).
    pub time: Time,
}

impl Frame {
    pub fn start() -> Self {
        Self {
            index: 0,
            dt_s: 0.0,
            time: Time::ZERO,
        }
    }

    /// Next frame after `dt_s` seconds. Negative deltas are treated as zero.
    pub fn advance(self, dt_s: f64) -> Self {
        let dt_s = if dt_s.is_finite() { dt_s.max(0.0) } else { 0.0 };
        Self {
            index: self.index + 1,
            dt_s,
            time: self.time.after(dt_s),
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::start()
    }
}
