pub mod post;
pub mod story;
pub mod user;

pub use post::{Comment, Post};
pub use story::{MediaSelection, MediaType, Story};
pub use user::UserSummary;
