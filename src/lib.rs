#![allow(clippy::type_complexity)]

pub mod config;
pub mod plugins;
pub mod util;
