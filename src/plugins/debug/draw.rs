use bevy::prelude::*;
use bevy_prototype_debug_lines::DebugLines;

use crate::plugins::portal::scene::TransferMarkers;

const MARKER_LENGTH: f32 = 0.3;
const MARKER_SIZE: f32 = 0.05;

/// Draw a small cross at every transfer marker, with a tail along the body heading.
pub fn draw_transfer_markers(markers: Res<TransferMarkers>, mut lines: ResMut<DebugLines>) {
    const TAIL_COLOR: Color = Color::YELLOW;
    const HEAD_COLOR: Color = Color::RED;

    for marker in markers.iter() {
        let position = marker.position;
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            lines.line_colored(
                position - axis * MARKER_SIZE,
                position + axis * MARKER_SIZE,
                0.,
                HEAD_COLOR,
            );
        }
        lines.line_gradient(
            position - marker.direction * MARKER_LENGTH,
            position,
            0.,
            TAIL_COLOR,
            HEAD_COLOR,
        );
    }
}
