//! Pure portal math: surface frames, the cross-portal transfer and portal placement poses.
//!
//! Surfaces follow the placement convention used by [`location_from_impact`]: a surface's local
//! `+Z` axis is its facing direction (the normal pointing out of the wall it sits on) and its
//! local `X` axis is the lateral axis. Bodies head along their local `-Z` axis, which is what
//! [`Transform::forward`] returns.

use bevy::prelude::*;

/// Offset along the surface normal keeping a portal quad from Z fighting with its wall.
pub const Z_FIGHTING_OFFSET: f32 = 0.001;

/// Direction a surface faces, out of the wall it is placed on.
pub fn surface_facing(surface: &Transform) -> Vec3 {
    surface.back()
}

/// Flip a surface-local point on the lateral axis, so that something entering on the left side
/// of one portal comes out on the right side of the other.
pub fn mirror_lateral(local: Vec3) -> Vec3 {
    Vec3::new(-local.x, local.y, local.z)
}

/// Express a world space point in the local frame of `surface`.
pub fn world_to_local(surface: &Transform, point: Vec3) -> Vec3 {
    surface.compute_matrix().inverse().transform_point3(point)
}

/// Rotation whose forward direction (`-Z`) is `direction`.
///
/// `Y` is used as the up hint unless `direction` is (nearly) vertical, in which case `Z` is used
/// so that floor and ceiling portals still get a well formed frame.
pub fn look_rotation(direction: Vec3) -> Quat {
    let back = -direction.normalize();
    let up_hint = if back.dot(Vec3::Y).abs() > 0.999 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let right = up_hint.cross(back).normalize();
    let up = back.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, back))
}

/// Pose and linear velocity of a body after going through a portal pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferredMotion {
    pub transform: Transform,
    pub linvel: Vec3,
}

/// Compute where a body coming through `entry` at `local_contact` (entry-local coordinates)
/// with velocity `linvel` comes out of `exit`.
///
/// With `match_exit_rotation`, the angle of approach relative to the entry surface is carried
/// over to the exit surface. Otherwise the body simply leaves along the exit surface facing.
/// Speed is preserved and the new velocity points along the new heading. The body's scale is
/// left untouched.
pub fn transfer_motion(
    body: &Transform,
    linvel: Vec3,
    entry: &Transform,
    exit: &Transform,
    local_contact: Vec3,
    match_exit_rotation: bool,
) -> TransferredMotion {
    let translation = exit.transform_point(mirror_lateral(local_contact));

    let exit_rotation = look_rotation(surface_facing(exit));
    let speed = linvel.length();
    let rotation = if match_exit_rotation && speed > f32::EPSILON {
        let approach = Quat::from_rotation_arc(
            -surface_facing(entry).normalize(),
            linvel / speed,
        );
        (approach.inverse() * exit_rotation).normalize()
    } else {
        exit_rotation
    };

    let transform = Transform {
        translation,
        rotation,
        scale: body.scale,
    };
    TransferredMotion {
        linvel: transform.forward() * speed,
        transform,
    }
}

/// Pose of a portal placed at a ray impact on a surface.
pub fn location_from_impact(point: Vec3, normal: Vec3) -> Transform {
    // We place the portal at the ray intersection point, plus a small offset
    // along the surface normal to prevent Z fighting.
    Transform {
        translation: point + normal * Z_FIGHTING_OFFSET,
        rotation: look_rotation(-normal),
        ..default()
    }
}

/// New pose for `other` so that it faces `anchor` from the same distance as before.
///
/// Looking through one portal then shows the other one endlessly, which gives the infinite fall
/// arrangement.
pub fn align_facing(anchor: &Transform, other: &Transform) -> Transform {
    let distance = anchor.translation.distance(other.translation);
    let facing = surface_facing(anchor);
    Transform {
        translation: anchor.translation + facing * distance,
        rotation: look_rotation(facing),
        scale: other.scale,
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn mirror_flips_lateral_axis_only() {
        assert_eq!(
            mirror_lateral(Vec3::new(0.3, -0.2, 0.05)),
            Vec3::new(-0.3, -0.2, 0.05)
        );
    }

    #[test]
    fn look_rotation_points_forward_along_direction() {
        for dir in [Vec3::X, Vec3::NEG_Z, Vec3::new(1., 2., -3.), Vec3::Y, Vec3::NEG_Y] {
            let forward = look_rotation(dir) * Vec3::NEG_Z;
            assert!(
                forward.abs_diff_eq(dir.normalize(), EPS),
                "{forward} != {dir}"
            );
        }
    }

    #[test]
    fn placed_portal_faces_out_of_the_wall() {
        let portal = location_from_impact(Vec3::new(2., 1., -5.), Vec3::Z);
        assert!(surface_facing(&portal).abs_diff_eq(Vec3::Z, EPS));
        assert!(portal
            .translation
            .abs_diff_eq(Vec3::new(2., 1., -5. + Z_FIGHTING_OFFSET), EPS));

        let floor = location_from_impact(Vec3::ZERO, Vec3::Y);
        assert!(surface_facing(&floor).abs_diff_eq(Vec3::Y, EPS));
    }

    #[test]
    fn local_point_round_trips_through_surface_frame() {
        let surface = Transform::from_xyz(1., 2., 3.).with_rotation(Quat::from_rotation_y(0.7));
        let local = Vec3::new(0.25, -0.5, 0.);
        let world = surface.transform_point(local);
        assert!(world_to_local(&surface, world).abs_diff_eq(local, EPS));
    }

    #[test]
    fn head_on_entry_leaves_along_exit_facing() {
        let entry = Transform::IDENTITY;
        let exit = Transform::from_xyz(5., 0., 0.).with_rotation(Quat::from_rotation_y(PI / 2.));
        let body = Transform::from_xyz(0., 0., 2.);
        let motion = transfer_motion(&body, Vec3::NEG_Z * 2., &entry, &exit, Vec3::ZERO, true);

        assert!(motion.transform.translation.abs_diff_eq(exit.translation, EPS));
        assert!(motion
            .linvel
            .abs_diff_eq(surface_facing(&exit) * 2., EPS));
    }

    #[test]
    fn oblique_entry_keeps_angle_of_approach() {
        let entry = Transform::IDENTITY;
        let exit = Transform::from_xyz(0., 0., 10.).with_rotation(Quat::from_rotation_y(PI));
        let incoming = Vec3::new(1., 0., -1.).normalize() * 3.;
        let body = Transform::IDENTITY;
        let matched = transfer_motion(&body, incoming, &entry, &exit, Vec3::ZERO, true);
        let plain = transfer_motion(&body, incoming, &entry, &exit, Vec3::ZERO, false);

        let exit_facing = surface_facing(&exit);
        let approach = (-Vec3::Z).angle_between(incoming);
        assert!((matched.linvel.normalize().angle_between(exit_facing) - approach).abs() < EPS);
        assert!((matched.linvel.length() - 3.).abs() < EPS);
        assert!(plain.linvel.abs_diff_eq(exit_facing * 3., EPS));
    }

    #[test]
    fn transfer_keeps_body_scale() {
        let body = Transform::from_scale(Vec3::splat(0.5));
        let exit = Transform::from_xyz(0., 0., 4.);
        let motion = transfer_motion(
            &body,
            Vec3::NEG_Z,
            &Transform::IDENTITY,
            &exit,
            Vec3::ZERO,
            false,
        );
        assert_eq!(motion.transform.scale, Vec3::splat(0.5));
    }

    #[test]
    fn aligned_portal_faces_anchor_at_same_distance() {
        let anchor = Transform::from_xyz(0., 1., 0.);
        let other = Transform::from_xyz(3., 1., 4.);
        let aligned = align_facing(&anchor, &other);

        assert!(aligned.translation.abs_diff_eq(Vec3::new(0., 1., 5.), EPS));
        assert!(surface_facing(&aligned).abs_diff_eq(-surface_facing(&anchor), EPS));
    }
}
