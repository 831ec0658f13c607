#[path = "bdd/world.rs"]
mod world;

#[path = "bdd/steps/mod.rs"]
mod steps;

use cucumber::World as _;
use world::NightCrawlerWorld;

// current_thread keeps the background poller from interleaving with steps
#[tokio::main(flavor = "current_thread")]
async fn main() {
    NightCrawlerWorld::run("tests/features").await;
}
