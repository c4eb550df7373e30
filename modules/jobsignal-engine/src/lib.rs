pub mod enrich;
pub mod events;
pub mod greenhouse;
pub mod handlers;
pub mod markdown;
pub mod normalize;
pub mod payload;
pub mod queue;
pub mod scrapers;
pub mod sites;
pub mod storing;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod webhooks;
pub mod worker;
