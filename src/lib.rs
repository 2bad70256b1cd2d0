pub mod api;
pub mod catalog;
pub mod controller;
pub mod export;
pub mod logging;
pub mod playback;
pub mod render;
pub mod selection;
pub mod state;
pub mod submit;
pub mod summary;
pub mod terminal;
