use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::plugins::physics::*;

const PANEL_THICKNESS: f32 = 0.2;

/// Half extents of a room panel lying in the local XY plane.
fn panel_half_extents(width: f32, height: f32) -> Vec3 {
    Vec3::new(width / 2., height / 2., PANEL_THICKNESS / 2.)
}

/// Poses of the four walls of a square room of the given side length, floor at y = 0.
/// Each wall is turned so its local +Z points into the room.
fn wall_transforms(side: f32, height: f32) -> [Transform; 4] {
    let offset = side / 2. + PANEL_THICKNESS / 2.;
    [0., 1., 2., 3.].map(|i| {
        let rotation = Quat::from_rotation_y(i * FRAC_PI_2);
        Transform::from_translation(rotation * Vec3::new(0., height / 2., -offset))
            .with_rotation(rotation)
    })
}

/// Box room standing in for the planes detected around the viewer: four walls, a floor
/// and a ceiling, all with fixed colliders portals can be placed on.
pub fn make_room(
    commands: &mut Commands,
    meshes: &mut ResMut<Assets<Mesh>>,
    materials: &mut ResMut<Assets<StandardMaterial>>,
    side: f32,
    height: f32,
) {
    let wall_extents = panel_half_extents(side, height);
    let floor_extents = panel_half_extents(side, side);
    let wall_mesh = meshes.add(shape::Box::new(side, height, PANEL_THICKNESS).into());
    let floor_mesh = meshes.add(shape::Box::new(side, side, PANEL_THICKNESS).into());
    let wall_material = materials.add(StandardMaterial::from(Color::rgb(0.75, 0.72, 0.68)));
    let floor_material = materials.add(StandardMaterial::from(Color::DARK_GRAY));

    let mut spawn_panel = |name: String,
                           mesh: &Handle<Mesh>,
                           material: &Handle<StandardMaterial>,
                           transform: Transform,
                           extents: Vec3,
                           group: Group| {
        commands.spawn((
            PbrBundle {
                mesh: mesh.clone(),
                material: material.clone(),
                transform,
                ..default()
            },
            Name::from(name),
            RigidBody::Fixed,
            Collider::cuboid(extents.x, extents.y, extents.z),
            static_collision_groups(group),
        ));
    };

    for (i, transform) in wall_transforms(side, height).into_iter().enumerate() {
        spawn_panel(
            format!("Wall_{}", i),
            &wall_mesh,
            &wall_material,
            transform,
            wall_extents,
            WALLS_GROUP,
        );
    }
    spawn_panel(
        "Floor".to_string(),
        &floor_mesh,
        &floor_material,
        Transform::from_xyz(0., -PANEL_THICKNESS / 2., 0.)
            .with_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
        floor_extents,
        GROUND_GROUP,
    );
    spawn_panel(
        "Ceiling".to_string(),
        &floor_mesh,
        &floor_material,
        Transform::from_xyz(0., height + PANEL_THICKNESS / 2., 0.)
            .with_rotation(Quat::from_rotation_x(FRAC_PI_2)),
        floor_extents,
        GROUND_GROUP,
    );
}
