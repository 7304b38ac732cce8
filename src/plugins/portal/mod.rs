use bevy::{prelude::*, reflect::FromReflect};
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::*;

pub mod geometry;
mod placement;
pub mod scene;
pub mod transfer;

use scene::{scan_active_portals, ActivePortals, RapierProbe, TransferMarkers};
use transfer::{ContactProbe, EnterOutcome, ExitOutcome, TransferContext, TransferEngine};

use super::{
    input::Actions,
    physics::*,
    viewer::{viewer_spawned, Viewer, ViewerLabels},
};
use crate::config::PortalConfig;

/// Half width and height of a portal.
pub const PORTAL_HALF_EXTENT: f32 = 1.;
/// Half thickness of the portal sensor volume.
pub const PORTAL_MESH_DEPTH: f32 = 0.1;

#[derive(Debug)]
pub struct PortalPlugin;

#[derive(Debug, Resource)]
struct PortalAssets {
    mesh: Handle<Mesh>,
    open_materials: [Handle<StandardMaterial>; 2],
    closed_materials: [Handle<StandardMaterial>; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Reflect, FromReflect)]
pub enum PortalSlot {
    #[default]
    First,
    Second,
}

impl PortalSlot {
    pub const ALL: [PortalSlot; 2] = [PortalSlot::First, PortalSlot::Second];

    const fn index(self) -> usize {
        match self {
            PortalSlot::First => 0,
            PortalSlot::Second => 1,
        }
    }

    const fn place_action(self) -> Actions {
        match self {
            PortalSlot::First => Actions::PlaceFirstPortal,
            PortalSlot::Second => Actions::PlaceSecondPortal,
        }
    }
}

#[derive(Debug, Default, Component, Reflect, FromReflect)]
#[reflect(Component)]
pub struct Portal {
    pub slot: PortalSlot,
}

/// Marker for bodies able to go through portals.
#[derive(Debug, Component, Clone, Default, Reflect, FromReflect)]
#[reflect(Component)]
pub struct PortalTeleport;

/// The transfer engine, keyed by body entity.
#[derive(Debug, Default, Resource, Deref, DerefMut)]
pub struct PortalTransfers(pub TransferEngine<Entity>);

#[derive(Debug, SystemLabel)]
pub enum PortalLabels {
    ScanPortals,
    PortalCommands,
    DispatchTriggers,
}

#[derive(Bundle)]
pub struct PortalBundle {
    #[bundle]
    mesh_bundle: PbrBundle,
    portal: Portal,
    collider: Collider,
    active_events: ActiveEvents,
    sensor: Sensor,
    collision_groups: CollisionGroups,
    name: Name,
}

impl Default for PortalBundle {
    fn default() -> Self {
        PortalBundle {
            collider: Collider::cuboid(PORTAL_HALF_EXTENT, PORTAL_HALF_EXTENT, PORTAL_MESH_DEPTH),
            sensor: Sensor,
            active_events: ActiveEvents::COLLISION_EVENTS,
            collision_groups: portal_collision_groups(),
            mesh_bundle: PbrBundle::default(),
            portal: Portal::default(),
            name: Name::from("Portal"),
        }
    }
}

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world
            .get_resource::<PortalConfig>()
            .cloned()
            .unwrap_or_default();

        app.register_type::<Portal>()
            .register_type::<PortalSlot>()
            .register_type::<PortalTeleport>()
            .insert_resource(PortalTransfers(TransferEngine::new(
                config.transfer_settings(),
            )))
            .insert_resource(TransferMarkers::new(
                config.markers.enabled,
                config.markers.limit,
            ))
            .init_resource::<ActivePortals>()
            .add_startup_system(load_portal_assets)
            .add_system_set(
                ConditionSet::new()
                    .label(PortalLabels::PortalCommands)
                    .after(ViewerLabels::Steer)
                    .run_if(viewer_spawned)
                    .with_system(place_portals)
                    .with_system(portal_commands)
                    .into(),
            )
            .add_system(
                scan_active_portals
                    .label(PortalLabels::ScanPortals)
                    .after(PortalLabels::PortalCommands),
            )
            .add_system(update_portal_appearance.after(PortalLabels::ScanPortals))
            .add_system(
                dispatch_portal_triggers
                    .label(PortalLabels::DispatchTriggers)
                    .after(PortalLabels::ScanPortals),
            )
            .add_system(tick_portal_transfers.after(PortalLabels::DispatchTriggers))
            .add_system_to_stage(CoreStage::PostUpdate, forget_despawned_bodies);
    }
}

impl PortalPlugin {
    fn spawn_portal(
        commands: &mut Commands,
        slot: PortalSlot,
        viewer: &GlobalTransform,
        portal_query: &Query<(Entity, &Portal)>,
        rapier: &RapierContext,
        portal_assets: &PortalAssets,
    ) -> Option<Entity> {
        let portal_pos = placement::portal_location(viewer, rapier)?;
        info!("Spawning portal {:?} at {}", slot, portal_pos.translation);
        for (entity, previous_portal) in portal_query {
            if previous_portal.slot == slot {
                info!("Despawning previous portal");
                commands.entity(entity).despawn_recursive();
            }
        }
        Some(
            commands
                .spawn(PortalBundle {
                    mesh_bundle: PbrBundle {
                        mesh: portal_assets.mesh.clone(),
                        material: portal_assets.closed_materials[slot.index()].clone(),
                        transform: portal_pos,
                        ..default()
                    },
                    portal: Portal { slot },
                    name: Name::from(format!("Portal {:?}", slot)),
                    ..default()
                })
                .id(),
        )
    }
}

/// Load the assets required to render the portals.
fn load_portal_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let mesh = meshes.add(
        shape::Quad {
            size: Vec2::splat(PORTAL_HALF_EXTENT * 2.),
            flip: false,
        }
        .into(),
    );
    let mut unlit = |base_color: Color| {
        materials.add(StandardMaterial {
            base_color,
            unlit: true,
            ..default()
        })
    };
    let open_materials = [
        unlit(Color::rgb(0.1, 0.45, 1.)),
        unlit(Color::rgb(1., 0.55, 0.1)),
    ];
    let closed_materials = [
        unlit(Color::rgb(0.04, 0.15, 0.35)),
        unlit(Color::rgb(0.35, 0.2, 0.04)),
    ];

    commands.insert_resource(PortalAssets {
        mesh,
        open_materials,
        closed_materials,
    });
}

/// On left click/right click, shoot a portal.
fn place_portals(
    mut commands: Commands,
    viewer_query: Query<(&ActionState<Actions>, &GlobalTransform), With<Viewer>>,
    portal_query: Query<(Entity, &Portal)>,
    rapier: Res<RapierContext>,
    portal_assets: Res<PortalAssets>,
) {
    if let Ok((input, viewer)) = viewer_query.get_single() {
        for slot in PortalSlot::ALL {
            if input.just_pressed(slot.place_action()) {
                info!("Shooting portal {:?}", slot);
                PortalPlugin::spawn_portal(
                    &mut commands,
                    slot,
                    viewer,
                    &portal_query,
                    &rapier,
                    &portal_assets,
                );
            }
        }
    }
}

/// Clearing, aligning and transfer options.
fn portal_commands(
    mut commands: Commands,
    viewer_query: Query<&ActionState<Actions>, With<Viewer>>,
    mut portal_query: Query<(Entity, &Portal, &mut Transform)>,
    mut transfers: ResMut<PortalTransfers>,
    mut markers: ResMut<TransferMarkers>,
) {
    let input = match viewer_query.get_single() {
        Ok(input) => input,
        Err(_) => return,
    };

    if input.just_pressed(Actions::ClearPortals) {
        info!("Clearing portals");
        for (entity, _, _) in &portal_query {
            commands.entity(entity).despawn_recursive();
        }
    } else if input.just_pressed(Actions::AlignPortals) {
        align_portals(&mut portal_query);
    }

    if input.just_pressed(Actions::ToggleMatchRotation) {
        let settings = transfers.settings_mut();
        settings.match_exit_rotation = !settings.match_exit_rotation;
        info!("Matching exit rotation: {}", settings.match_exit_rotation);
    }
    if input.just_pressed(Actions::ToggleMarkers) {
        markers.toggle();
        info!("Transfer markers: {}", markers.enabled);
    }
}

/// Make the second portal face the first one, keeping their distance.
fn align_portals(portal_query: &mut Query<(Entity, &Portal, &mut Transform)>) {
    let anchor = portal_query
        .iter()
        .find(|(_, portal, _)| portal.slot == PortalSlot::First)
        .map(|(_, _, transform)| *transform);
    if let Some(anchor) = anchor {
        for (_, portal, mut transform) in portal_query.iter_mut() {
            if portal.slot == PortalSlot::Second {
                *transform = geometry::align_facing(&anchor, &transform);
                info!("Aligned portal {:?} to face {:?}", portal.slot, PortalSlot::First);
            }
        }
    }
}

/// Portals look closed until both of them are placed.
fn update_portal_appearance(
    active: Res<ActivePortals>,
    portal_assets: Option<Res<PortalAssets>>,
    mut portal_query: Query<(&Portal, &mut Handle<StandardMaterial>)>,
) {
    let portal_assets = match portal_assets {
        Some(assets) => assets,
        None => return,
    };
    let materials = if active.is_open() {
        &portal_assets.open_materials
    } else {
        &portal_assets.closed_materials
    };
    for (portal, mut material) in &mut portal_query {
        let wanted = &materials[portal.slot.index()];
        if *material != *wanted {
            *material = wanted.clone();
        }
    }
}

type TeleportBodies<'w, 's> =
    Query<'w, 's, (&'static mut Transform, &'static mut Velocity), With<PortalTeleport>>;

fn dispatch_portal_triggers(
    mut collisions: EventReader<CollisionEvent>,
    mut transfers: ResMut<PortalTransfers>,
    portals: Res<ActivePortals>,
    rapier: Res<RapierContext>,
    mut markers: ResMut<TransferMarkers>,
    mut bodies: TeleportBodies,
) {
    route_collisions(
        collisions.iter(),
        &mut transfers,
        &portals,
        &RapierProbe(&rapier),
        &mut markers,
        &mut bodies,
    );
}

/// Feed portal sensor contacts to the transfer engine. Either collider may be the portal, and
/// contacts with anything but a teleportable body are skipped.
fn route_collisions<'a, P: ContactProbe>(
    collisions: impl IntoIterator<Item = &'a CollisionEvent>,
    transfers: &mut TransferEngine<Entity>,
    portals: &ActivePortals,
    probe: &P,
    markers: &mut TransferMarkers,
    bodies: &mut TeleportBodies<'_, '_>,
) {
    for collision in collisions {
        let (collider_a, collider_b, started) = match collision {
            CollisionEvent::Started(collider_a, collider_b, _flags) => {
                (*collider_a, *collider_b, true)
            }
            CollisionEvent::Stopped(collider_a, collider_b, _flags) => {
                (*collider_a, *collider_b, false)
            }
        };
        let (surface, body) = if portals.contains(collider_a) {
            (collider_a, collider_b)
        } else if portals.contains(collider_b) {
            (collider_b, collider_a)
        } else {
            continue;
        };
        if bodies.get(body).is_err() {
            continue;
        }

        if started {
            let mut ctx = TransferContext {
                surfaces: portals,
                probe,
                bodies: &mut *bodies,
                markers: &mut *markers,
            };
            match transfers.on_enter(surface, body, &mut ctx) {
                EnterOutcome::Transferred(_) | EnterOutcome::InFlight => {}
                outcome => debug!("{:?} touched portal {:?}: {:?}", body, surface, outcome),
            }
        } else if transfers.on_exit(surface, body, &*bodies) == ExitOutcome::Confirming {
            debug!("{:?} slowly leaving portal {:?}", body, surface);
        }
    }
}

fn tick_portal_transfers(
    time: Res<Time>,
    mut transfers: ResMut<PortalTransfers>,
    mut bodies: TeleportBodies,
) {
    transfers.tick(time.delta(), &mut bodies);
}
/// Drop the transfer state of despawned bodies.
fn forget_despawned_bodies(
    removed: RemovedComponents<PortalTeleport>,
    mut transfers: ResMut<PortalTransfers>,
) {
    for entity in removed.iter() {
        if transfers.forget(entity) {
            debug!("Forgot transfer state of {:?}", entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::SystemState;
    use bevy_rapier3d::rapier::geometry::CollisionEventFlags;

    use super::transfer::TransferPhase;
    use super::*;

    struct ProbeAtOrigin;

    impl ContactProbe for ProbeAtOrigin {
        fn first_surface_hit(&self, origin: Vec3, _direction: Vec3, _max: f32) -> Option<Vec3> {
            Some(origin)
        }
    }

    fn spawn_body(world: &mut World) -> Entity {
        world
            .spawn((
                Transform::IDENTITY,
                Velocity::linear(Vec3::NEG_Z),
                PortalTeleport,
            ))
            .id()
    }

    #[test]
    fn despawned_bodies_are_forgotten() {
        let mut app = App::new();
        app.add_system(forget_despawned_bodies);

        let body = spawn_body(&mut app.world);
        let bystander = spawn_body(&mut app.world);
        let entry = app.world.spawn_empty().id();
        let exit = app.world.spawn_empty().id();
        let mut portals = ActivePortals::default();
        portals.rebuild([
            (entry, PortalSlot::First, Transform::IDENTITY),
            (exit, PortalSlot::Second, Transform::from_xyz(0., 0., 10.)),
        ]);

        let mut transfers = PortalTransfers::default();
        let mut system_state: SystemState<
            Query<(&mut Transform, &mut Velocity), With<PortalTeleport>>,
        > = SystemState::new(&mut app.world);
        let mut bodies = system_state.get_mut(&mut app.world);
        for id in [body, bystander] {
            let mut ctx = TransferContext {
                surfaces: &portals,
                probe: &ProbeAtOrigin,
                bodies: &mut bodies,
                markers: &mut (),
            };
            assert!(matches!(
                transfers.on_enter(entry, id, &mut ctx),
                EnterOutcome::Transferred(_)
            ));
        }
        assert_eq!(transfers.tracked(), 2);
        app.insert_resource(transfers);

        app.world.despawn(body);
        app.update();

        let transfers = app.world.resource::<PortalTransfers>();
        assert_eq!(transfers.tracked(), 1);
        assert!(transfers.state(bystander).is_some());
        assert!(transfers.state(body).is_none());
    }

    #[test]
    fn second_slot_portal_faces_the_first() {
        let mut app = App::new();
        app.add_system(|mut portals: Query<(Entity, &Portal, &mut Transform)>| {
            align_portals(&mut portals)
        });
        app.world.spawn((
            Portal {
                slot: PortalSlot::First,
            },
            Transform::IDENTITY,
        ));
        let second = app
            .world
            .spawn((
                Portal {
                    slot: PortalSlot::Second,
                },
                Transform::from_xyz(3., 0., 4.),
            ))
            .id();

        app.update();

        let transform = app.world.get::<Transform>(second).copied().unwrap_or_default();
        assert!(transform
            .translation
            .abs_diff_eq(Vec3::new(0., 0., 5.), 1e-4));
        assert!(geometry::surface_facing(&transform).abs_diff_eq(Vec3::NEG_Z, 1e-4));
    }

    fn route_with_probe(
        mut collisions: EventReader<CollisionEvent>,
        mut transfers: ResMut<PortalTransfers>,
        portals: Res<ActivePortals>,
        mut markers: ResMut<TransferMarkers>,
        mut bodies: TeleportBodies,
    ) {
        route_collisions(
            collisions.iter(),
            &mut transfers,
            &portals,
            &ProbeAtOrigin,
            &mut markers,
            &mut bodies,
        );
    }

    struct TriggerScene {
        app: App,
        entry: Entity,
        exit: Entity,
    }

    impl TriggerScene {
        fn new() -> Self {
            let mut app = App::new();
            app.add_event::<CollisionEvent>()
                .init_resource::<PortalTransfers>()
                .init_resource::<TransferMarkers>()
                .add_system(route_with_probe);
            let entry = app.world.spawn_empty().id();
            let exit = app.world.spawn_empty().id();
            let mut portals = ActivePortals::default();
            portals.rebuild([
                (entry, PortalSlot::First, Transform::IDENTITY),
                (exit, PortalSlot::Second, Transform::from_xyz(0., 0., 10.)),
            ]);
            app.insert_resource(portals);
            TriggerScene { app, entry, exit }
        }

        fn send(&mut self, events: impl IntoIterator<Item = CollisionEvent>) {
            let mut queue = self.app.world.resource_mut::<Events<CollisionEvent>>();
            for event in events {
                queue.send(event);
            }
            self.app.update();
        }

        fn transfers(&self) -> &PortalTransfers {
            self.app.world.resource::<PortalTransfers>()
        }
    }

    fn started(a: Entity, b: Entity) -> CollisionEvent {
        CollisionEvent::Started(a, b, CollisionEventFlags::SENSOR)
    }

    fn stopped(a: Entity, b: Entity) -> CollisionEvent {
        CollisionEvent::Stopped(a, b, CollisionEventFlags::SENSOR)
    }

    #[test]
    fn portal_may_be_either_collider() {
        let mut scene = TriggerScene::new();
        let first = spawn_body(&mut scene.app.world);
        let second = spawn_body(&mut scene.app.world);

        scene.send([started(scene.entry, first), started(second, scene.entry)]);

        for body in [first, second] {
            assert_eq!(scene.transfers().phase(body), TransferPhase::Captured);
            assert_eq!(
                scene.transfers().state(body).and_then(|s| s.exit()),
                Some(scene.exit)
            );
        }
    }

    #[test]
    fn contacts_without_portal_or_body_are_skipped() {
        let mut scene = TriggerScene::new();
        let body = spawn_body(&mut scene.app.world);
        let wall = scene.app.world.spawn_empty().id();
        let stranger = scene
            .app
            .world
            .spawn((Transform::IDENTITY, Velocity::linear(Vec3::NEG_Z)))
            .id();

        scene.send([started(body, wall), started(stranger, scene.entry)]);

        assert_eq!(scene.transfers().tracked(), 0);
        assert_eq!(
            scene.app.world.get::<Transform>(body).copied(),
            Some(Transform::IDENTITY)
        );
    }

    #[test]
    fn stopped_contacts_reach_the_exit_handling() {
        let mut scene = TriggerScene::new();
        let body = spawn_body(&mut scene.app.world);
        scene
            .app
            .world
            .entity_mut(body)
            .insert(Velocity::linear(Vec3::NEG_Z * 5.));

        scene.send([started(body, scene.entry)]);
        assert_eq!(scene.transfers().phase(body), TransferPhase::Captured);

        // Leaving the entry portal does not count.
        scene.send([stopped(scene.entry, body)]);
        assert_eq!(scene.transfers().phase(body), TransferPhase::Captured);

        scene.send([stopped(body, scene.exit)]);
        assert_eq!(scene.transfers().phase(body), TransferPhase::Idle);
    }
}
