use bevy::prelude::*;

use portal_transfer::{config::PortalConfig, plugins::game::GamePlugin};

fn main() {
    App::new()
        .add_plugin(GamePlugin {
            config_path: PortalConfig::path_from_env(),
        })
        .run();
}
