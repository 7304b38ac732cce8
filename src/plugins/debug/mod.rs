pub mod draw;

use bevy::{app::PluginGroupBuilder, prelude::*};
use bevy_prototype_debug_lines::DebugLinesPlugin;
use iyes_loopless::prelude::*;

use super::portal::{scene::TransferMarkers, PortalLabels};

#[derive(Debug)]
/// Development plugins intended for debug builds use.
pub struct DeveloperPlugins;

impl PluginGroup for DeveloperPlugins {
    fn build(self) -> PluginGroupBuilder {
        let group = PluginGroupBuilder::start::<Self>()
            .add(DebugLinesPlugin::default())
            .add(TransferMarkersPlugin);
        #[cfg(feature = "editor")]
        let group = group
            .add(bevy_editor_pls::prelude::EditorPlugin)
            .add(bevy_inspector_egui_rapier::InspectableRapierPlugin);
        group
    }
}

#[derive(Debug)]
pub struct TransferMarkersPlugin;

impl Plugin for TransferMarkersPlugin {
    fn build(&self, app: &mut App) {
        app.add_system(
            draw::draw_transfer_markers
                .run_if(markers_enabled)
                .after(PortalLabels::DispatchTriggers),
        );
    }
}

fn markers_enabled(markers: Option<Res<TransferMarkers>>) -> bool {
    markers.map_or(false, |markers| markers.enabled)
}
