use std::time::Duration;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::*;

use super::{
    input::Actions,
    physics::*,
    portal::{geometry::look_rotation, PortalTeleport},
    viewer::{viewer_spawned, Viewer, ViewerLabels},
};
use crate::config::{PortalConfig, SpawnerConfig};

const PROP_HALF_EXTENT: f32 = 0.15;

#[derive(Debug)]
pub struct SpawnerPlugin;

impl Plugin for SpawnerPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world
            .get_resource::<PortalConfig>()
            .map(|config| config.spawner.clone())
            .unwrap_or_default();

        app.insert_resource(SpawnedObjects::new(&config))
            .add_startup_system(load_prop_assets)
            .add_system_set(
                ConditionSet::new()
                    .run_if(viewer_spawned)
                    .after(ViewerLabels::Steer)
                    .with_system(fire_objects)
                    .with_system(place_objects)
                    .with_system(clear_objects)
                    .with_system(despawn_distant_objects)
                    .into(),
            );
    }
}

#[derive(Debug, Component, Default)]
pub struct SpawnedProp;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PropShape {
    #[default]
    Sphere,
    Cube,
}

impl PropShape {
    fn next(self) -> Self {
        match self {
            PropShape::Sphere => PropShape::Cube,
            PropShape::Cube => PropShape::Sphere,
        }
    }

    fn collider(self) -> Collider {
        match self {
            PropShape::Sphere => Collider::ball(PROP_HALF_EXTENT),
            PropShape::Cube => {
                Collider::cuboid(PROP_HALF_EXTENT, PROP_HALF_EXTENT, PROP_HALF_EXTENT)
            }
        }
    }
}

#[derive(Debug, Resource)]
struct PropAssets {
    sphere: Handle<Mesh>,
    cube: Handle<Mesh>,
    material: Handle<StandardMaterial>,
}

impl PropAssets {
    fn mesh(&self, shape: PropShape) -> Handle<Mesh> {
        match shape {
            PropShape::Sphere => self.sphere.clone(),
            PropShape::Cube => self.cube.clone(),
        }
    }
}

#[derive(Debug, Resource)]
pub struct SpawnedObjects {
    objects: Vec<Entity>,
    limit: usize,
    next_shape: PropShape,
    creation_cooldown: Duration,
    creation_lock: Option<Timer>,
    distance_check: Timer,
    pub launch_speed: f32,
    pub max_distance: f32,
    pub allow_midair: bool,
}

impl SpawnedObjects {
    pub fn new(config: &SpawnerConfig) -> Self {
        SpawnedObjects {
            objects: Vec::new(),
            limit: config.spawn_limit,
            next_shape: PropShape::default(),
            creation_cooldown: config.creation_cooldown(),
            creation_lock: None,
            distance_check: Timer::new(config.distance_check_interval(), TimerMode::Repeating),
            launch_speed: config.launch_speed,
            max_distance: config.max_distance,
            allow_midair: config.allow_midair,
        }
    }

    /// Shape of the next prop, or `None` if creation is locked or the limit is reached.
    pub fn try_create(&mut self) -> Option<PropShape> {
        if self.creation_lock.is_some() || self.objects.len() >= self.limit {
            return None;
        }
        if !self.creation_cooldown.is_zero() {
            self.creation_lock = Some(Timer::new(self.creation_cooldown, TimerMode::Once));
        }
        let shape = self.next_shape;
        self.next_shape = shape.next();
        Some(shape)
    }

    pub fn track(&mut self, entity: Entity) {
        self.objects.push(entity);
    }

    /// Advance the timers, returns whether distant props should be looked for.
    pub fn tick(&mut self, delta: Duration) -> bool {
        if let Some(lock) = self.creation_lock.as_mut() {
            if lock.tick(delta).finished() {
                self.creation_lock = None;
            }
        }
        self.distance_check.tick(delta).just_finished()
    }

    pub fn retain(&mut self, mut alive: impl FnMut(Entity) -> bool) {
        self.objects.retain(|entity| alive(*entity));
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Entity> + '_ {
        self.objects.drain(..)
    }

    fn len(&self) -> usize {
        self.objects.len()
    }
}

fn load_prop_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.insert_resource(PropAssets {
        sphere: meshes.add(
            shape::UVSphere {
                radius: PROP_HALF_EXTENT,
                sectors: 16,
                stacks: 8,
            }
            .into(),
        ),
        cube: meshes.add(shape::Cube::new(PROP_HALF_EXTENT * 2.).into()),
        material: materials.add(StandardMaterial::from(Color::ALICE_BLUE)),
    });
}

fn spawn_prop(
    commands: &mut Commands,
    prop_assets: &PropAssets,
    shape: PropShape,
    transform: Transform,
    linvel: Vec3,
) -> Entity {
    commands
        .spawn((
            PbrBundle {
                mesh: prop_assets.mesh(shape),
                material: prop_assets.material.clone(),
                transform,
                ..default()
            },
            RigidBody::Dynamic,
            shape.collider(),
            Velocity::linear(linvel),
            GravityScale(0.),
            Ccd::enabled(),
            ActiveEvents::COLLISION_EVENTS,
            prop_collision_groups(),
            PortalTeleport,
            SpawnedProp,
            Name::from(format!("Prop {:?}", shape)),
        ))
        .id()
}

fn fire_objects(
    mut commands: Commands,
    viewer_query: Query<(&ActionState<Actions>, &GlobalTransform), With<Viewer>>,
    mut spawned: ResMut<SpawnedObjects>,
    prop_assets: Res<PropAssets>,
) {
    let (input, viewer) = match viewer_query.get_single() {
        Ok(viewer) => viewer,
        Err(_) => return,
    };
    if !input.just_pressed(Actions::FireObject) {
        return;
    }
    let shape = match spawned.try_create() {
        Some(shape) => shape,
        None => {
            debug!("Prop creation refused, {} props alive", spawned.len());
            return;
        }
    };

    let transform = viewer.compute_transform().with_scale(Vec3::ONE);
    let linvel = transform.forward() * spawned.launch_speed;
    let entity = spawn_prop(&mut commands, &prop_assets, shape, transform, linvel);
    spawned.track(entity);
    info!("Fired {:?} {:?}", shape, entity);
}

/// Pose of a prop put down on the surface `hit` (point and normal), or in midair at the viewer.
fn placed_prop_pose(
    hit: Option<(Vec3, Vec3)>,
    viewer: &Transform,
    allow_midair: bool,
) -> Option<Transform> {
    match hit {
        Some((point, normal)) => Some(
            Transform::from_translation(point + normal * PROP_HALF_EXTENT)
                .with_rotation(look_rotation(normal)),
        ),
        None if allow_midair => {
            Some(Transform::from_translation(viewer.translation).with_rotation(viewer.rotation))
        }
        None => None,
    }
}

fn place_objects(
    mut commands: Commands,
    viewer_query: Query<(&ActionState<Actions>, &GlobalTransform), With<Viewer>>,
    rapier: Res<RapierContext>,
    mut spawned: ResMut<SpawnedObjects>,
    prop_assets: Res<PropAssets>,
) {
    let (input, viewer) = match viewer_query.get_single() {
        Ok(viewer) => viewer,
        Err(_) => return,
    };
    if !input.just_pressed(Actions::PlaceObject) {
        return;
    }

    let hit = rapier
        .cast_ray_and_get_normal(
            viewer.translation(),
            viewer.forward(),
            Real::MAX,
            true,
            placement_filter(),
        )
        .map(|(_entity, intersection)| (intersection.point, intersection.normal));
    let viewer = viewer.compute_transform();
    let transform = match placed_prop_pose(hit, &viewer, spawned.allow_midair) {
        Some(transform) => transform,
        None => {
            debug!("No surface to place a prop on");
            return;
        }
    };
    let shape = match spawned.try_create() {
        Some(shape) => shape,
        None => {
            debug!("Prop creation refused, {} props alive", spawned.len());
            return;
        }
    };

    let entity = spawn_prop(&mut commands, &prop_assets, shape, transform, Vec3::ZERO);
    spawned.track(entity);
    info!("Placed {:?} {:?} at {}", shape, entity, transform.translation);
}

fn clear_objects(
    mut commands: Commands,
    viewer_query: Query<&ActionState<Actions>, With<Viewer>>,
    mut spawned: ResMut<SpawnedObjects>,
) {
    if viewer_query
        .get_single()
        .map_or(false, |input| input.just_pressed(Actions::ClearObjects))
    {
        info!("Clearing {} props", spawned.len());
        for entity in spawned.drain() {
            commands.entity(entity).despawn_recursive();
        }
    }
}

fn distant_objects(
    viewer: Vec3,
    props: impl IntoIterator<Item = (Entity, Vec3)>,
    max_distance: f32,
) -> Vec<Entity> {
    props
        .into_iter()
        .filter(|(_, position)| position.distance(viewer) > max_distance)
        .map(|(entity, _)| entity)
        .collect()
}

fn despawn_distant_objects(
    mut commands: Commands,
    time: Res<Time>,
    viewer_query: Query<&GlobalTransform, With<Viewer>>,
    props: Query<(Entity, &GlobalTransform), With<SpawnedProp>>,
    mut spawned: ResMut<SpawnedObjects>,
) {
    spawned.retain(|entity| props.contains(entity));
    if !spawned.tick(time.delta()) {
        return;
    }
    let viewer = match viewer_query.get_single() {
        Ok(viewer) => viewer.translation(),
        Err(_) => return,
    };

    let distant = distant_objects(
        viewer,
        props
            .iter()
            .map(|(entity, transform)| (entity, transform.translation())),
        spawned.max_distance,
    );
    for entity in distant {
        debug!("Despawning distant prop {:?}", entity);
        commands.entity(entity).despawn_recursive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawner(cooldown: f32, limit: usize) -> SpawnedObjects {
        SpawnedObjects::new(&SpawnerConfig {
            spawn_limit: limit,
            creation_cooldown_secs: cooldown,
            ..default()
        })
    }

    #[test]
    fn shapes_alternate() {
        let mut spawned = spawner(0., 10);
        let shapes = (0..3).filter_map(|_| spawned.try_create()).collect::<Vec<_>>();
        assert_eq!(
            shapes,
            vec![PropShape::Sphere, PropShape::Cube, PropShape::Sphere]
        );
    }

    #[test]
    fn cooldown_locks_creation() {
        let mut spawned = spawner(1., 10);
        assert!(spawned.try_create().is_some());
        assert!(spawned.try_create().is_none());

        spawned.tick(Duration::from_millis(999));
        assert!(spawned.try_create().is_none());
        spawned.tick(Duration::from_millis(1));
        assert_eq!(spawned.try_create(), Some(PropShape::Cube));
    }

    #[test]
    fn limit_is_enforced_until_props_go_away() {
        let mut world = World::new();
        let mut spawned = spawner(0., 2);
        let props = (0..2)
            .map(|_| {
                assert!(spawned.try_create().is_some());
                let entity = world.spawn_empty().id();
                spawned.track(entity);
                entity
            })
            .collect::<Vec<_>>();
        assert!(spawned.try_create().is_none());

        spawned.retain(|entity| entity != props[0]);
        assert_eq!(spawned.len(), 1);
        assert!(spawned.try_create().is_some());

        assert_eq!(spawned.drain().count(), 1);
        assert_eq!(spawned.len(), 0);
    }

    #[test]
    fn distance_check_runs_periodically() {
        let mut spawned = spawner(0., 10);
        assert!(!spawned.tick(Duration::from_secs(4)));
        assert!(spawned.tick(Duration::from_secs(1)));
        assert!(!spawned.tick(Duration::from_secs(1)));
        assert!(spawned.tick(Duration::from_secs(4)));
    }

    #[test]
    fn placed_prop_rests_on_the_surface() {
        let viewer = Transform::from_xyz(0., 1.5, 0.);
        let transform =
            placed_prop_pose(Some((Vec3::new(0., 1., -4.), Vec3::Z)), &viewer, false).unwrap();

        assert!(transform
            .translation
            .abs_diff_eq(Vec3::new(0., 1., -4. + PROP_HALF_EXTENT), 1e-5));
        assert!(transform.forward().abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn midair_placement_needs_opting_in() {
        let viewer = Transform::from_xyz(0., 1.5, 0.).with_rotation(Quat::from_rotation_y(0.3));
        assert_eq!(placed_prop_pose(None, &viewer, false), None);
        assert_eq!(placed_prop_pose(None, &viewer, true), Some(viewer));
    }

    #[test]
    fn huge_distance_check_interval_does_not_panic() {
        let mut spawned = SpawnedObjects::new(&SpawnerConfig {
            distance_check_secs: 1e30,
            ..default()
        });
        assert!(!spawned.tick(Duration::from_secs(60)));
    }

    #[test]
    fn only_far_props_are_distant() {
        let mut world = World::new();
        let near = world.spawn_empty().id();
        let far = world.spawn_empty().id();

        let distant = distant_objects(
            Vec3::new(0., 1.5, 0.),
            [
                (near, Vec3::new(0., 1.5, -5.)),
                (far, Vec3::new(0., 1.5, -5.1)),
            ],
            5.,
        );
        assert_eq!(distant, vec![far]);
    }
}
