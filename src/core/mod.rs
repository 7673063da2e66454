pub mod actions;
pub mod background;
pub mod condition;
pub mod config;
pub mod engine;
pub mod presenter;
pub mod reveal;
pub mod session;
pub mod sprites;
pub mod store;
pub mod tags;
pub mod variables;
