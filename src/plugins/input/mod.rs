use bevy::prelude::*;
use leafwing_input_manager::prelude::*;

#[derive(Debug)]
pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(InputManagerPlugin::<Actions>::default());
    }
}

#[derive(Actionlike, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Actions {
    // Viewer movement
    Forward,
    Backwards,
    StrafeLeft,
    StrafeRight,
    LookLeft,
    LookRight,
    LookUp,
    LookDown,
    // Portals
    PlaceFirstPortal,
    PlaceSecondPortal,
    ClearPortals,
    AlignPortals,
    ToggleMatchRotation,
    ToggleMarkers,
    // Props
    FireObject,
    PlaceObject,
    ClearObjects,
}

pub fn default_input_map() -> InputMap<Actions> {
    let mut input_map = InputMap::new([
        (KeyCode::W, Actions::Forward),
        (KeyCode::S, Actions::Backwards),
        (KeyCode::A, Actions::StrafeLeft),
        (KeyCode::D, Actions::StrafeRight),
        (KeyCode::Left, Actions::LookLeft),
        (KeyCode::Right, Actions::LookRight),
        (KeyCode::Up, Actions::LookUp),
        (KeyCode::Down, Actions::LookDown),
        (KeyCode::Back, Actions::ClearPortals),
        (KeyCode::P, Actions::AlignPortals),
        (KeyCode::R, Actions::ToggleMatchRotation),
        (KeyCode::M, Actions::ToggleMarkers),
        (KeyCode::Space, Actions::FireObject),
        (KeyCode::Escape, Actions::ClearObjects),
    ]);
    input_map
        .insert(MouseButton::Left, Actions::PlaceFirstPortal)
        .insert(MouseButton::Right, Actions::PlaceSecondPortal)
        .insert(MouseButton::Middle, Actions::PlaceObject);
    input_map
}
