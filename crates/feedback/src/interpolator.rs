//! Turns discrete pose updates into evenly spaced sub-positions.

use std::collections::VecDeque;

/// A position in device pixels, origin top-left.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
}

impl Pose {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn delta(&self, other: &Pose) -> [f32; 2] {
        [other.x - self.x, other.y - self.y]
    }

    fn distance(&self, other: &Pose) -> f32 {
        let [dx, dy] = self.delta(other);
        dx.hypot(dy)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Linear,
    /// Quadratic Bezier whose control point continues the previous segment's
    /// heading.
    Bezier,
}

/// Produced/consumed counters; both are reset by [`FrameInterpolator::drain`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterpolatorStats {
    pub produced: usize,
    pub consumed: usize,
}

#[derive(Debug)]
pub struct FrameInterpolator {
    step_px: f32,
    mode: Interpolation,
    last: Option<Pose>,
    heading: Option<[f32; 2]>,
    queue: VecDeque<Pose>,
    produced: usize,
    max_steps: usize,
}

impl FrameInterpolator {
    pub fn new(step_px: f32, mode: Interpolation) -> Self {
        Self {
            step_px: sanitize_step(step_px),
            mode,
            last: None,
            heading: None,
            queue: VecDeque::new(),
            produced: 0,
            max_steps: usize::MAX,
        }
    }

    pub fn set_step_px(&mut self, step_px: f32) {
        self.step_px = sanitize_step(step_px);
    }

    pub fn step_px(&self) -> f32 {
        self.step_px
    }

    /// Upper bound on sub-positions per update. Longer segments are split
    /// into this many evenly spaced points instead of one per `step_px`.
    pub fn set_max_steps(&mut self, max_steps: usize) {
        self.max_steps = max_steps.max(1);
    }

    pub fn set_mode(&mut self, mode: Interpolation) {
        self.mode = mode;
    }

    /// Forgets the last processed pose so the next update enqueues nothing.
    pub fn reset(&mut self, pose: Option<Pose>) {
        self.last = pose;
        self.heading = None;
        self.queue.clear();
    }

    /// Records the latest external pose and enqueues the sub-positions between
    /// it and the previously processed one. Returns how many were enqueued.
    pub fn update(&mut self, pose: Pose) -> usize {
        let Some(last) = self.last else {
            self.last = Some(pose);
            return 0;
        };
        let distance = last.distance(&pose);
        if distance == 0.0 || !distance.is_finite() {
            return 0;
        }

        // `as usize` saturates, so a huge jump lands on the cap.
        let steps = ((distance / self.step_px).ceil() as usize).clamp(1, self.max_steps);
        let control = match (self.mode, self.heading) {
            (Interpolation::Bezier, Some(heading)) => bezier_control(&last, &pose, heading, distance),
            _ => None,
        };
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            let point = match control {
                Some(control) => quadratic(&last, &control, &pose, t),
                None => Pose::new(last.x + (pose.x - last.x) * t, last.y + (pose.y - last.y) * t),
            };
            self.queue.push_back(point);
        }

        let [dx, dy] = last.delta(&pose);
        self.heading = Some([dx / distance, dy / distance]);
        self.last = Some(pose);
        self.produced += steps;
        steps
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Takes every queued sub-position, oldest first.
    pub fn drain(&mut self) -> (Vec<Pose>, InterpolatorStats) {
        let poses: Vec<Pose> = self.queue.drain(..).collect();
        let stats = InterpolatorStats {
            produced: std::mem::take(&mut self.produced),
            consumed: poses.len(),
        };
        (poses, stats)
    }
}

fn sanitize_step(step_px: f32) -> f32 {
    if step_px.is_finite() && step_px >= 1.0 {
        step_px
    } else {
        1.0
    }
}

/// Control point half a chord along the previous heading; falls back to a
/// straight segment when the new segment turns back on itself.
fn bezier_control(start: &Pose, end: &Pose, heading: [f32; 2], distance: f32) -> Option<Pose> {
    let [dx, dy] = start.delta(end);
    let alignment = (dx * heading[0] + dy * heading[1]) / distance;
    if alignment < 0.0 {
        return None;
    }
    let reach = distance * 0.5;
    Some(Pose::new(
        start.x + heading[0] * reach,
        start.y + heading[1] * reach,
    ))
}

fn quadratic(p0: &Pose, p1: &Pose, p2: &Pose, t: f32) -> Pose {
    let u = 1.0 - t;
    Pose::new(
        u * u * p0.x + 2.0 * u * t * p1.x + t * t * p2.x,
        u * u * p0.y + 2.0 * u * t * p1.y + t * t * p2.y,
    )
}
