pub mod feed;
pub mod mutation;
pub mod story_bar;
pub mod story_session;
pub mod story_upload;

pub use feed::FeedService;
pub use mutation::{MutationPipeline, OptimisticTransaction};
pub use story_bar::StoryBarService;
pub use story_session::{KeyInput, SessionState, StorySessionController};
pub use story_upload::StoryUploadService;
