pub mod view_model;

pub use view_model::{PostView, StoryView, AVATAR_PLACEHOLDER};
