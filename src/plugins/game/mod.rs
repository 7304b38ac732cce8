use std::path::PathBuf;

use crate::{config::PortalConfig, plugins::*, util::scenes::make_room};

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

const ROOM_SIDE: f32 = 8.;
const ROOM_HEIGHT: f32 = 3.;

#[derive(Debug)]
/// Main plugin, responsible for loading the other plugins and bootstrapping the scene.
pub struct GamePlugin {
    /// JSON configuration, defaults are used when it cannot be loaded.
    pub config_path: PathBuf,
}

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            window: WindowDescriptor {
                title: "Portal Transfer".to_string(),
                width: 1280.,
                height: 720.,
                ..default()
            },
            ..default()
        }));

        // Read by the portal and spawner plugins when they are built.
        app.insert_resource(PortalConfig::load_or_default(&self.config_path));

        app.add_plugin(RapierPhysicsPlugin::<NoUserData>::default());
        #[cfg(feature = "devel")]
        {
            app.add_plugins(debug::DeveloperPlugins);
        }
        app.add_plugin(physics::PhysicsPlugin);
        app.add_plugin(input::InputPlugin);
        app.add_plugin(viewer::ViewerPlugin);
        app.add_plugin(portal::PortalPlugin);
        app.add_plugin(spawner::SpawnerPlugin);

        app.add_startup_system(setup);
    }
}

/// Perform scene initialization
fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    make_room(&mut commands, &mut meshes, &mut materials, ROOM_SIDE, ROOM_HEIGHT);

    // Light, kept under the ceiling
    commands.spawn(PointLightBundle {
        point_light: PointLight {
            color: Color::ANTIQUE_WHITE,
            intensity: 2_000.,
            range: ROOM_SIDE * 2.,
            shadows_enabled: true,
            ..default()
        },
        transform: Transform::from_xyz(0., ROOM_HEIGHT * 0.8, 0.),
        ..default()
    });
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 0.3,
    });
}
