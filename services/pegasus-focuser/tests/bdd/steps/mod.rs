pub mod connection_steps;
pub mod motion_steps;
