//! Transfer engine: decides when a body goes through a portal pair and applies the transfer.
//!
//! The engine is independent of the ECS. Everything it needs from the outside world (which
//! portals are open, where a ray hits them, reading and moving bodies, debug markers) goes
//! through the small traits below, so it can run against the Rapier world in the game and
//! against an in-memory scene in tests.

use std::{fmt::Debug, hash::Hash, time::Duration};

use bevy::{prelude::*, utils::HashMap};

use super::geometry::{transfer_motion, world_to_local};

/// An active portal surface, valid for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface<Id> {
    pub id: Id,
    pub transform: Transform,
}

/// Currently active surfaces, in pairing order.
pub trait SurfaceRegistry<Id> {
    fn active_surfaces(&self) -> &[Surface<Id>];
}

/// Ray queries against portal surfaces.
pub trait ContactProbe {
    /// World point of the first portal surface hit by the ray, if any. `direction` is normalized.
    fn first_surface_hit(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<Vec3>;
}

/// Read and write access to the bodies able to go through portals.
pub trait BodyAccess<Id> {
    fn transform(&self, body: Id) -> Option<Transform>;
    fn linear_velocity(&self, body: Id) -> Option<Vec3>;
    fn set_motion(&mut self, body: Id, transform: Transform, linvel: Vec3);
    fn add_linear_velocity(&mut self, body: Id, delta: Vec3);
}

/// Receives the entry and exit points of every transfer, for debugging.
pub trait MarkerSink {
    fn mark(&mut self, position: Vec3, direction: Vec3);
}

impl MarkerSink for () {
    fn mark(&mut self, _position: Vec3, _direction: Vec3) {}
}

/// The collaborators an entry signal needs.
pub struct TransferContext<'a, R, P, B, M> {
    pub surfaces: &'a R,
    pub probe: &'a P,
    pub bodies: &'a mut B,
    pub markers: &'a mut M,
}

/// Tunables of the transfer engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSettings {
    /// Carry the angle of approach over to the exit portal.
    pub match_exit_rotation: bool,
    /// At or above this speed, an exit signal releases the body right away.
    pub fast_exit_speed: f32,
    /// Quiet period without exit signals after which a slow body is released.
    pub exit_debounce: Duration,
    /// A captured body is force released after this long.
    pub capture_timeout: Duration,
    /// Length of the ray used to find the contact point on the entry portal.
    pub contact_ray_length: f32,
    /// Speed given to a body found motionless when force released.
    pub stuck_nudge_speed: f32,
}

impl Default for TransferSettings {
    fn default() -> Self {
        TransferSettings {
            match_exit_rotation: true,
            fast_exit_speed: 1.3,
            exit_debounce: Duration::from_millis(500),
            capture_timeout: Duration::from_secs(10),
            contact_ray_length: 20.,
            stuck_nudge_speed: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// No entry or exit portal recorded, free to go through a portal.
    Idle,
    /// Transferred, waiting for the body to leave the exit portal.
    Captured,
    /// Slow exit signals seen, waiting for them to stop.
    ConfirmingExit,
}

/// Transfer bookkeeping for a single body.
#[derive(Debug, Clone)]
pub struct TransferState<Id> {
    entry: Option<Id>,
    exit: Option<Id>,
    age_since_capture: Timer,
    exit_debounce: Option<Timer>,
}

impl<Id: Copy> TransferState<Id> {
    fn new(capture_timeout: Duration) -> Self {
        TransferState {
            entry: None,
            exit: None,
            age_since_capture: Timer::new(capture_timeout, TimerMode::Once),
            exit_debounce: None,
        }
    }

    pub fn entry(&self) -> Option<Id> {
        self.entry
    }

    pub fn exit(&self) -> Option<Id> {
        self.exit
    }

    pub fn age_since_capture(&self) -> Duration {
        self.age_since_capture.elapsed()
    }

    pub fn is_confirming_exit(&self) -> bool {
        self.exit_debounce.is_some()
    }

    pub fn phase(&self) -> TransferPhase {
        match (self.entry, self.exit, &self.exit_debounce) {
            (Some(_), Some(_), None) => TransferPhase::Captured,
            (Some(_), Some(_), Some(_)) => TransferPhase::ConfirmingExit,
            _ => TransferPhase::Idle,
        }
    }

    fn capture(&mut self, entry: Id, exit: Id) {
        self.entry = Some(entry);
        self.exit = Some(exit);
        self.exit_debounce = None;
        self.age_since_capture.reset();
    }

    /// Allow the body to go through portals again.
    fn release(&mut self) {
        self.entry = None;
        self.exit = None;
        self.exit_debounce = None;
        self.age_since_capture.reset();
    }
}

/// What an entry signal resulted in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnterOutcome {
    /// The body was moved to the exit portal.
    Transferred(Transform),
    /// The body is already going through the pair.
    InFlight,
    /// No other portal to exit from.
    Unpaired,
    /// The body only grazed the portal trigger volume.
    Grazed,
    /// The body cannot be read.
    UnknownBody,
}

/// What an exit signal resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Ignored,
    /// Fast exit, the body is free again.
    Released,
    /// Slow exit, waiting for exit signals to stop.
    Confirming,
}

/// Tracks every body going through the portal pair.
#[derive(Debug)]
pub struct TransferEngine<Id> {
    settings: TransferSettings,
    states: HashMap<Id, TransferState<Id>>,
}

impl<Id> Default for TransferEngine<Id>
where
    Id: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new(TransferSettings::default())
    }
}

impl<Id> TransferEngine<Id>
where
    Id: Copy + Eq + Hash + Debug,
{
    pub fn new(settings: TransferSettings) -> Self {
        TransferEngine {
            settings,
            states: HashMap::default(),
        }
    }

    pub fn settings_mut(&mut self) -> &mut TransferSettings {
        &mut self.settings
    }

    pub fn state(&self, body: Id) -> Option<&TransferState<Id>> {
        self.states.get(&body)
    }

    pub fn phase(&self, body: Id) -> TransferPhase {
        self.states
            .get(&body)
            .map_or(TransferPhase::Idle, TransferState::phase)
    }

    /// Number of bodies with transfer bookkeeping, idle ones included.
    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Handle `body` starting to touch `surface`.
    pub fn on_enter<R, P, B, M>(
        &mut self,
        surface: Id,
        body: Id,
        ctx: &mut TransferContext<R, P, B, M>,
    ) -> EnterOutcome
    where
        R: SurfaceRegistry<Id>,
        P: ContactProbe,
        B: BodyAccess<Id>,
        M: MarkerSink,
    {
        if self
            .states
            .get(&body)
            .map_or(false, |state| state.entry.is_some())
        {
            return EnterOutcome::InFlight;
        }

        let surfaces = ctx.surfaces.active_surfaces();
        if surfaces.len() < 2 {
            return EnterOutcome::Unpaired;
        }
        let (entry, exit) = match (
            surfaces.iter().find(|s| s.id == surface),
            surfaces.iter().find(|s| s.id != surface),
        ) {
            (Some(entry), Some(exit)) => (*entry, *exit),
            _ => return EnterOutcome::Unpaired,
        };

        let (body_transform, linvel) = match (
            ctx.bodies.transform(body),
            ctx.bodies.linear_velocity(body),
        ) {
            (Some(transform), Some(linvel)) => (transform, linvel),
            _ => return EnterOutcome::UnknownBody,
        };

        // A motionless body has no direction to probe along, which we treat as a graze.
        let direction = linvel.normalize_or_zero();
        if direction == Vec3::ZERO {
            return EnterOutcome::Grazed;
        }
        let contact = match ctx.probe.first_surface_hit(
            body_transform.translation,
            direction,
            self.settings.contact_ray_length,
        ) {
            Some(point) => world_to_local(&entry.transform, point),
            None => return EnterOutcome::Grazed,
        };

        let capture_timeout = self.settings.capture_timeout;
        self.states
            .entry(body)
            .or_insert_with(|| TransferState::new(capture_timeout))
            .capture(entry.id, exit.id);

        ctx.markers
            .mark(body_transform.translation, body_transform.forward());
        let motion = transfer_motion(
            &body_transform,
            linvel,
            &entry.transform,
            &exit.transform,
            contact,
            self.settings.match_exit_rotation,
        );
        ctx.bodies.set_motion(body, motion.transform, motion.linvel);
        ctx.markers
            .mark(motion.transform.translation, motion.transform.forward());

        info!(
            "Transferred {:?} from portal {:?} to portal {:?}",
            body, entry.id, exit.id
        );
        EnterOutcome::Transferred(motion.transform)
    }

    /// Handle `body` no longer touching `surface`.
    ///
    /// Only signals from the exit portal matter. Slow bodies may emit several exit signals as
    /// they leave, so they are only released once the signals stop for a full debounce period.
    pub fn on_exit<B>(&mut self, surface: Id, body: Id, bodies: &B) -> ExitOutcome
    where
        B: BodyAccess<Id>,
    {
        let state = match self.states.get_mut(&body) {
            Some(state) if state.entry.is_some() && state.exit == Some(surface) => state,
            _ => return ExitOutcome::Ignored,
        };

        let speed = bodies
            .linear_velocity(body)
            .map_or(0., |linvel| linvel.length());
        if speed >= self.settings.fast_exit_speed {
            debug!("{:?} left portal {:?} at speed {}", body, surface, speed);
            state.release();
            return ExitOutcome::Released;
        }

        let interval = self.settings.exit_debounce;
        state
            .exit_debounce
            .get_or_insert_with(|| Timer::new(interval, TimerMode::Once))
            .reset();
        ExitOutcome::Confirming
    }

    /// Advance debounce and capture timers by `delta`.
    pub fn tick<B>(&mut self, delta: Duration, bodies: &mut B)
    where
        B: BodyAccess<Id>,
    {
        for (&body, state) in self.states.iter_mut() {
            if state.phase() == TransferPhase::Idle {
                continue;
            }

            if let Some(debounce) = state.exit_debounce.as_mut() {
                if debounce.tick(delta).finished() {
                    debug!("Confirmed {:?} left its exit portal", body);
                    state.release();
                    continue;
                }
            }

            if state.age_since_capture.tick(delta).finished() {
                warn!("{:?} never left its exit portal, releasing it", body);
                state.release();
                if let (Some(linvel), Some(transform)) =
                    (bodies.linear_velocity(body), bodies.transform(body))
                {
                    if linvel == Vec3::ZERO {
                        bodies.add_linear_velocity(
                            body,
                            transform.forward() * self.settings.stuck_nudge_speed,
                        );
                    }
                }
            }
        }
    }

    /// Drop the bookkeeping of a destroyed body.
    pub fn forget(&mut self, body: Id) -> bool {
        self.states.remove(&body).is_some()
    }
}
