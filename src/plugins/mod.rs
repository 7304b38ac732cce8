#[cfg(feature = "devel")]
pub mod debug;

pub mod game;
pub mod input;
pub mod physics;
pub mod portal;
pub mod spawner;
pub mod viewer;
