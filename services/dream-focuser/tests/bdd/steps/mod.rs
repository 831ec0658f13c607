pub mod focusing_steps;
