use bevy::prelude::*;
use bevy_rapier3d::prelude::{
    CollisionGroups, Group, InteractionGroups, QueryFilter, RapierConfiguration, TimestepMode,
};

pub const WALLS_GROUP: Group = Group::GROUP_1;
pub const PROPS_GROUP: Group = Group::GROUP_2;
pub const PORTAL_GROUP: Group = Group::GROUP_3;
pub const RAYCAST_GROUP: Group = Group::GROUP_5;
pub const GROUND_GROUP: Group = Group::GROUP_6;
pub const ALL_GROUPS: Group = Group::ALL;

/// Surfaces portals can be placed on.
pub const PLACEMENT_GROUPS: Group = WALLS_GROUP.union(GROUND_GROUP);

/// Portal sensors only report props, and are found by the contact rays.
pub fn portal_collision_groups() -> CollisionGroups {
    CollisionGroups::new(PORTAL_GROUP, PROPS_GROUP.union(RAYCAST_GROUP))
}

/// Ray casts looking for a surface to put something on.
pub fn placement_filter() -> QueryFilter<'static> {
    QueryFilter {
        groups: Some(InteractionGroups::from(CollisionGroups::new(RAYCAST_GROUP, PLACEMENT_GROUPS))),
        ..default()
    }
}

pub fn prop_collision_groups() -> CollisionGroups {
    CollisionGroups::new(PROPS_GROUP, ALL_GROUPS)
}

/// Fixed room geometry in `group`, colliding with everything.
pub fn static_collision_groups(group: Group) -> CollisionGroups {
    CollisionGroups::new(group, ALL_GROUPS)
}

pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.add_startup_system(configure_rapier);
    }
}

fn configure_rapier(mut config: ResMut<RapierConfiguration>) {
    // Extra CCD substeps because props come out of portals at full speed
    config.timestep_mode = TimestepMode::Variable {
        max_dt: 1. / 30.,
        time_scale: 1.,
        substeps: 4,
    }
}
