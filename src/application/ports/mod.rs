pub mod feed_gateway;
pub mod story_gateway;

pub use feed_gateway::FeedGateway;
pub use story_gateway::StoryGateway;
