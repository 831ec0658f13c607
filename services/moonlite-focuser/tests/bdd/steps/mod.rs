pub mod connection_steps;
pub mod movement_steps;
pub mod settings_steps;
