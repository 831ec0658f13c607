pub mod rotation_steps;
