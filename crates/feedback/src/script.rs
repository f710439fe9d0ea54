//! Scripted pose sources for headless renders.

use std::f32::consts::TAU;

use crate::interpolator::Pose;
use crate::pipeline::PoseSample;

/// Pose for a given frame index.
pub trait DragScript {
    fn pose(&self, frame: u64) -> PoseSample;
}

/// One grab that drags the content around a circle, then lets go and holds
/// still for the remaining frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularDrag {
    pub center: Pose,
    pub radius: f32,
    /// Frames per revolution.
    pub period: u64,
    /// Frames spent dragging before release.
    pub drag_frames: u64,
}

impl CircularDrag {
    /// Circle centred in a `width` x `height` device-pixel viewport.
    pub fn centered(width: u32, height: u32, drag_frames: u64) -> Self {
        let radius = width.min(height) as f32 * 0.3;
        Self {
            center: Pose::new(width as f32 * 0.5, height as f32 * 0.5),
            radius,
            period: 120,
            drag_frames,
        }
    }

    fn point(&self, frame: u64) -> Pose {
        let period = self.period.max(1);
        let angle = (frame % period) as f32 / period as f32 * TAU;
        Pose::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y + self.radius * angle.sin(),
        )
    }
}

impl DragScript for CircularDrag {
    fn pose(&self, frame: u64) -> PoseSample {
        let active = frame < self.drag_frames;
        let held = frame.min(self.drag_frames.saturating_sub(1));
        PoseSample {
            position: self.point(held),
            active,
            session_id: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_starts_on_the_right_of_center() {
        let script = CircularDrag::centered(200, 100, 10);
        let pose = script.pose(0);
        assert_eq!(pose.position, Pose::new(130.0, 50.0));
        assert!(pose.active);
    }

    #[test]
    fn released_content_holds_its_last_position() {
        let script = CircularDrag::centered(200, 100, 10);
        let last = script.pose(9);
        let after = script.pose(50);
        assert!(!after.active);
        assert_eq!(after.position, last.position);
        assert_eq!(after.session_id, last.session_id);
    }
}
