//! Capsule-versus-triangle penetration through parry's narrow phase.

use collision_world::Triangle;
use rapier3d::math::{Isometry, Vector};
use rapier3d::parry::query;
use rapier3d::parry::shape::{Segment, Triangle as ParryTriangle};
use rapier3d::prelude::Real;

/// How far and which way a swept sphere must move to clear one triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Penetration {
    /// Unit direction that moves the segment away from the triangle.
    pub direction: Vector<Real>,
    pub depth: Real,
}

/// Penetration of a sphere of `radius` swept along `segment` into `triangle`.
/// Degenerate triangles never report contact.
pub fn capsule_penetration(
    segment: &Segment,
    triangle: &Triangle,
    radius: Real,
) -> Option<Penetration> {
    triangle.normal()?;
    let shape = ParryTriangle::new(triangle.a, triangle.b, triangle.c);
    let identity = Isometry::identity();
    let contact = query::contact(&identity, segment, &identity, &shape, radius)
        .ok()
        .flatten()?;
    let depth = radius - contact.dist;
    if depth <= 0.0 {
        return None;
    }
    Some(Penetration {
        direction: -contact.normal1.into_inner(),
        depth,
    })
}
