use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::plugins::physics::*;

use super::{geometry::location_from_impact, PORTAL_HALF_EXTENT};

/// Where a portal shot from `viewer` lands, if it hits a surface.
pub fn portal_location(viewer: &GlobalTransform, rapier: &RapierContext) -> Option<Transform> {
    let (_entity, intersection) = rapier.cast_ray_and_get_normal(
        viewer.translation(),
        viewer.forward(),
        Real::MAX,
        true,
        placement_filter(),
    )?;
    let portal = location_from_impact(intersection.point, intersection.normal);
    Some(adjust_portal_origin_to_obstacles(portal, rapier))
}

/// Slide a portal away from the walls, floor or ceiling it overlaps so it fits on its surface.
///
/// Each in-plane axis is probed in both directions; the first obstacle closer than the portal
/// half extent pushes the origin back by the overlap.
pub fn adjust_portal_origin_to_obstacles(portal: Transform, rapier: &RapierContext) -> Transform {
    let mut corrected = portal;
    for axis in [portal.up(), portal.right()] {
        for direction in [-axis, axis] {
            if let Some((_entity, distance)) = rapier.cast_ray(
                corrected.translation,
                direction,
                PORTAL_HALF_EXTENT,
                false,
                placement_filter(),
            ) {
                corrected.translation -= direction * (PORTAL_HALF_EXTENT - distance);
                break;
            }
        }
    }
    corrected
}
