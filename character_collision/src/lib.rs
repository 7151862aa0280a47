//! Capsule-versus-world collision resolution against a static triangle BVH.
//!
//! The character is a vertical segment swept by a sphere. Each frame the
//! segment is pushed out of every triangle it penetrates, then the total
//! correction decides whether the character is standing on something.
#![forbid(unsafe_code)]

pub mod contact;

use collision_world::{Aabb, Triangle, TriangleBvh};
use rapier3d::math::{Isometry, Point, Vector};
use rapier3d::parry::shape::Segment;
use rapier3d::prelude::Real;

pub use contact::{capsule_penetration, Penetration};

/// Correction is shortened by this much so a resolved capsule stays put on the next pass.
pub const CONTACT_SKIN: Real = 1.0e-5;
/// Grounded when the upward correction exceeds this fraction of last frame's fall distance.
pub const GROUND_CORRECTION_RATIO: Real = 0.25;
const DIRECTION_EPS: Real = 1.0e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapsuleProfile {
    /// Sphere radius in world units.
    pub radius: Real,
    /// Distance from the foot sphere centre to the head sphere centre.
    pub segment_height: Real,
}

impl Default for CapsuleProfile {
    fn default() -> Self {
        Self {
            radius: 0.5,
            segment_height: 1.0,
        }
    }
}

impl CapsuleProfile {
    /// World-space segment for a character standing at `position`.
    pub fn segment_at(&self, position: Point<Real>) -> Segment {
        Segment::new(position, position + Vector::y() * self.segment_height)
    }
}

/// Static world geometry placed in the scene.
#[derive(Clone, Debug)]
pub struct WorldCollider {
    index: TriangleBvh,
    transform: Isometry<Real>,
}

impl WorldCollider {
    pub fn new(index: TriangleBvh, transform: Isometry<Real>) -> Self {
        Self { index, transform }
    }

    pub fn from_triangles(triangles: impl IntoIterator<Item = Triangle>) -> Self {
        Self::new(TriangleBvh::build(triangles), Isometry::identity())
    }

    pub fn index(&self) -> &TriangleBvh {
        &self.index
    }

    pub fn transform(&self) -> &Isometry<Real> {
        &self.transform
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionState {
    pub position: Point<Real>,
    pub velocity: Vector<Real>,
    pub grounded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionResult {
    pub position: Point<Real>,
    /// Total positional correction applied this frame.
    pub correction: Vector<Real>,
    pub velocity: Vector<Real>,
    pub grounded: bool,
    /// Number of triangles that pushed the capsule.
    pub contacts: usize,
}

impl CollisionResult {
    fn untouched(state: CollisionState) -> Self {
        Self {
            position: state.position,
            correction: Vector::zeros(),
            velocity: state.velocity,
            grounded: state.grounded,
            contacts: 0,
        }
    }
}

pub struct CapsuleResolver {
    profile: CapsuleProfile,
}

impl CapsuleResolver {
    pub fn new(profile: CapsuleProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> CapsuleProfile {
        self.profile
    }

    pub fn set_profile(&mut self, profile: CapsuleProfile) {
        self.profile = profile;
    }

    /// Pushes the capsule out of `world` and derives the grounded flag.
    ///
    /// Without a world the frame is a no-collision pass: nothing moves and
    /// `grounded` keeps its previous value.
    pub fn resolve(
        &self,
        world: Option<&WorldCollider>,
        state: CollisionState,
        dt: Real,
    ) -> CollisionResult {
        let Some(world) = world else {
            return CollisionResult::untouched(state);
        };
        let radius = self.profile.radius.max(0.0);
        let to_local = world.transform.inverse();
        let world_segment = self.profile.segment_at(state.position);
        let mut segment = Segment::new(to_local * world_segment.a, to_local * world_segment.b);
        let query = Aabb::from_points(segment.a, segment.b).expanded(radius);

        // Contacts are resolved one triangle at a time and each push moves the
        // segment before the next test. The result depends on query order and
        // is not the minimal simultaneous push-out, which is acceptable for the
        // small displacements of a single frame.
        let mut contacts = 0;
        for (triangle_index, triangle) in world.index.query(query) {
            let Some(Penetration { direction, depth }) =
                capsule_penetration(&segment, triangle, radius)
            else {
                continue;
            };
            segment.a += direction * depth;
            segment.b += direction * depth;
            contacts += 1;
            log::trace!(
                "capsule contact with triangle {}: depth {:.5} along {:?}",
                triangle_index,
                depth,
                direction
            );
        }
        if contacts == 0 {
            return CollisionResult {
                grounded: false,
                ..CollisionResult::untouched(state)
            };
        }

        let corrected = world.transform * segment.a;
        let raw = corrected - state.position;
        let grounded = raw.y > (dt * state.velocity.y * GROUND_CORRECTION_RATIO).abs();
        let length = raw.norm();
        let correction = if length > 0.0 {
            raw * ((length - CONTACT_SKIN).max(0.0) / length)
        } else {
            Vector::zeros()
        };

        let velocity = if grounded {
            Vector::zeros()
        } else {
            slide_velocity(state.velocity, raw)
        };
        CollisionResult {
            position: state.position + correction,
            correction,
            velocity,
            grounded,
            contacts,
        }
    }
}

/// Removes the part of `velocity` that drives into the surface that pushed back.
fn slide_velocity(velocity: Vector<Real>, correction: Vector<Real>) -> Vector<Real> {
    let Some(normal) = correction.try_normalize(DIRECTION_EPS) else {
        return velocity;
    };
    let dot = velocity.dot(&normal);
    if dot < 0.0 {
        velocity - normal * dot
    } else {
        velocity
    }
}
