use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use euclid::Angle;
use leafwing_input_manager::prelude::*;

use super::input::{default_input_map, Actions};

#[derive(Debug)]
pub struct ViewerPlugin;

impl Plugin for ViewerPlugin {
    fn build(&self, app: &mut App) {
        app.add_startup_system(spawn_viewer)
            .add_system(steer_viewer.label(ViewerLabels::Steer));
    }
}

#[derive(Debug, SystemLabel)]
pub enum ViewerLabels {
    Steer,
}

#[derive(Debug, Component)]
/// Viewer orientation, kept as angles so pitch can be clamped.
pub struct Viewer {
    pub yaw: Angle<f32>,
    pub pitch: Angle<f32>,
}

const VIEWER_START: Vec3 = Vec3::new(0., 1.5, 2.5);
const VIEWER_SPEED: f32 = 3.;
const LOOK_SPEED: f32 = 1.5;

fn spawn_viewer(mut commands: Commands) {
    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_translation(VIEWER_START),
            ..default()
        },
        InputManagerBundle::<Actions> {
            action_state: ActionState::default(),
            input_map: default_input_map(),
        },
        Viewer {
            yaw: Angle::zero(),
            pitch: Angle::zero(),
        },
        Name::from("Viewer"),
    ));
}

pub fn viewer_spawned(viewer_query: Query<(), With<Viewer>>) -> bool {
    !viewer_query.is_empty()
}

/// Net input on one axis, from a pair of opposite actions.
fn axis(input: &ActionState<Actions>, positive: Actions, negative: Actions) -> f32 {
    match (input.pressed(positive), input.pressed(negative)) {
        (true, false) => 1.,
        (false, true) => -1.,
        _ => 0.,
    }
}

fn steer_viewer(
    time: Res<Time>,
    mut viewer_query: Query<(&ActionState<Actions>, &mut Viewer, &mut Transform)>,
) {
    let dt = time.delta_seconds();
    for (input, mut viewer, mut transform) in &mut viewer_query {
        let turn = axis(input, Actions::LookLeft, Actions::LookRight) * LOOK_SPEED * dt;
        let tilt = axis(input, Actions::LookUp, Actions::LookDown) * LOOK_SPEED * dt;
        viewer.yaw += Angle::radians(turn);
        viewer.pitch += Angle::radians(tilt);
        viewer.pitch.radians = viewer.pitch.radians.clamp(-FRAC_PI_2, FRAC_PI_2);
        transform.rotation = Quat::from_euler(
            EulerRot::YXZ,
            viewer.yaw.radians,
            viewer.pitch.radians,
            0.,
        );

        let forward = transform.forward();
        let right = transform.right();
        let movement = forward * axis(input, Actions::Forward, Actions::Backwards)
            + right * axis(input, Actions::StrafeRight, Actions::StrafeLeft);
        transform.translation += movement.normalize_or_zero() * VIEWER_SPEED * dt;
    }
}
