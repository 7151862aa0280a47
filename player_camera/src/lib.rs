//! Third-person orbit camera that trails the character.
#![forbid(unsafe_code)]

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;

/// Orbit keeps the eye at least this far above the target's horizon.
const MIN_PITCH: Real = 0.05;
const MAX_PITCH: Real = 1.54;
pub const MIN_DISTANCE: Real = 2.0;
pub const MAX_DISTANCE: Real = 15.0;

/// What the frame loop needs from a camera.
pub trait CameraRig {
    /// Heading of the view direction, radians about +Y (0 looks down +Z).
    fn azimuth(&self) -> Real;
    /// Re-target `target` after the character moved by `shift` horizontally.
    fn follow(&mut self, target: Point<Real>, shift: Vector<Real>);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub eye: Point<Real>,
    pub target: Point<Real>,
    pub azimuth: Real,
}

#[derive(Clone, Copy, Debug)]
pub struct FollowCamera {
    eye: Point<Real>,
    target: Point<Real>,
}

impl FollowCamera {
    pub fn new(eye: Point<Real>, target: Point<Real>) -> Self {
        let mut camera = Self { eye, target };
        camera.set_distance(camera.distance());
        camera
    }

    /// Camera `distance` behind `target` along -Z, raised by `height`.
    pub fn behind(target: Point<Real>, distance: Real, height: Real) -> Self {
        Self::new(target + Vector::new(0.0, height, -distance), target)
    }

    pub fn eye(&self) -> Point<Real> {
        self.eye
    }

    pub fn target(&self) -> Point<Real> {
        self.target
    }

    pub fn distance(&self) -> Real {
        (self.eye - self.target).norm()
    }

    pub fn set_distance(&mut self, distance: Real) {
        let distance = distance.clamp(MIN_DISTANCE, MAX_DISTANCE);
        let offset = self.eye - self.target;
        let dir = offset
            .try_normalize(1.0e-6)
            .unwrap_or_else(|| Vector::new(0.0, 0.0, -1.0));
        self.eye = self.target + dir * distance;
    }

    pub fn zoom(&mut self, delta: Real) {
        self.set_distance(self.distance() + delta);
    }

    /// Rotates the eye about the target: `delta[0]` yaw, `delta[1]` pitch.
    pub fn orbit(&mut self, delta: [Real; 2]) {
        let offset = self.eye - self.target;
        let distance = offset.norm();
        if distance <= 1.0e-6 {
            return;
        }
        let yaw = offset.x.atan2(offset.z) + delta[0];
        let pitch = ((offset.y / distance).clamp(-1.0, 1.0).asin() + delta[1])
            .clamp(MIN_PITCH, MAX_PITCH);
        let horizontal = distance * pitch.cos();
        self.eye = self.target
            + Vector::new(
                horizontal * yaw.sin(),
                distance * pitch.sin(),
                horizontal * yaw.cos(),
            );
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            eye: self.eye,
            target: self.target,
            azimuth: self.azimuth(),
        }
    }
}

impl CameraRig for FollowCamera {
    fn azimuth(&self) -> Real {
        let view = self.target - self.eye;
        view.x.atan2(view.z)
    }

    fn follow(&mut self, target: Point<Real>, shift: Vector<Real>) {
        self.eye.x += shift.x;
        self.eye.z += shift.z;
        self.target = target;
    }
}
