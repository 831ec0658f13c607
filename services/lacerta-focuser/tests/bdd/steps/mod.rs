pub mod focuser_steps;
