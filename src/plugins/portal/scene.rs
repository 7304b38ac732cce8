use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::plugins::physics::*;

use super::{
    transfer::{BodyAccess, ContactProbe, MarkerSink, Surface, SurfaceRegistry},
    Portal, PortalSlot, PortalTeleport,
};

/// Portals open this frame, ordered by slot then entity.
#[derive(Debug, Default, Resource)]
pub struct ActivePortals {
    surfaces: Vec<Surface<Entity>>,
}

impl ActivePortals {
    pub fn rebuild(&mut self, portals: impl IntoIterator<Item = (Entity, PortalSlot, Transform)>) {
        let mut portals = portals.into_iter().collect::<Vec<_>>();
        portals.sort_by_key(|(entity, slot, _)| (*slot, *entity));
        self.surfaces = portals
            .into_iter()
            .map(|(id, _, transform)| Surface { id, transform })
            .collect();
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.surfaces.iter().any(|surface| surface.id == entity)
    }

    pub fn is_open(&self) -> bool {
        self.surfaces.len() >= 2
    }
}

impl SurfaceRegistry<Entity> for ActivePortals {
    fn active_surfaces(&self) -> &[Surface<Entity>] {
        &self.surfaces
    }
}

pub fn scan_active_portals(
    mut active: ResMut<ActivePortals>,
    portals: Query<(Entity, &Portal, &Transform)>,
) {
    active.rebuild(
        portals
            .iter()
            .map(|(entity, portal, transform)| (entity, portal.slot, *transform)),
    );
}

/// A ray starting inside a sensor hits it at its origin.
pub struct RapierProbe<'a>(pub &'a RapierContext);

impl ContactProbe for RapierProbe<'_> {
    fn first_surface_hit(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<Vec3> {
        let (_entity, toi) = self.0.cast_ray(
            origin,
            direction,
            max_distance,
            true,
            QueryFilter {
                groups: Some(InteractionGroups::from(CollisionGroups::new(RAYCAST_GROUP, PORTAL_GROUP))),
                ..default()
            },
        )?;
        Some(origin + direction * toi)
    }
}

impl BodyAccess<Entity> for Query<'_, '_, (&mut Transform, &mut Velocity), With<PortalTeleport>> {
    fn transform(&self, body: Entity) -> Option<Transform> {
        self.get(body).ok().map(|(transform, _)| *transform)
    }

    fn linear_velocity(&self, body: Entity) -> Option<Vec3> {
        self.get(body).ok().map(|(_, velocity)| velocity.linvel)
    }

    fn set_motion(&mut self, body: Entity, transform: Transform, linvel: Vec3) {
        if let Ok((mut body_transform, mut velocity)) = self.get_mut(body) {
            *body_transform = transform;
            velocity.linvel = linvel;
        }
    }

    fn add_linear_velocity(&mut self, body: Entity, delta: Vec3) {
        if let Ok((_, mut velocity)) = self.get_mut(body) {
            velocity.linvel += delta;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferMarker {
    pub position: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Default, Resource)]
pub struct TransferMarkers {
    pub enabled: bool,
    pub limit: usize,
    markers: Vec<TransferMarker>,
}

impl TransferMarkers {
    pub fn new(enabled: bool, limit: usize) -> Self {
        TransferMarkers {
            enabled,
            limit,
            markers: Vec::new(),
        }
    }

    /// Also drops every recorded marker.
    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
        self.markers.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransferMarker> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl MarkerSink for TransferMarkers {
    fn mark(&mut self, position: Vec3, direction: Vec3) {
        if self.enabled && self.markers.len() < self.limit {
            self.markers.push(TransferMarker {
                position,
                direction,
            });
        }
    }
}
