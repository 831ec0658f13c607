pub mod nightcrawler_steps;
