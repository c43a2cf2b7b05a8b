use crate::domain::entities::{Post, Story};

/// プロフィール画像が未設定のときに使う画像パス。
pub const AVATAR_PLACEHOLDER: &str = "/avatar-placeholder.png";

const UNKNOWN_FULL_NAME: &str = "Unknown User";
const UNKNOWN_USERNAME: &str = "unknown";

/// 投稿1件の表示用データ。欠けた作者情報の補完と、閲覧者視点の
/// 派生値（いいね済みか等）をここで一度だけ解決する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostView {
    pub id: String,
    pub author_name: String,
    pub author_username: String,
    pub author_avatar: String,
    pub text: String,
    pub img: Option<String>,
    pub like_count: usize,
    pub comment_count: usize,
    pub liked_by_viewer: bool,
    pub owned_by_viewer: bool,
}

impl PostView {
    pub fn resolve(post: &Post, viewer_id: Option<&str>) -> Self {
        Self {
            id: post.id.clone(),
            author_name: non_empty_or(Some(&post.user.full_name), UNKNOWN_FULL_NAME),
            author_username: non_empty_or(Some(&post.user.username), UNKNOWN_USERNAME),
            author_avatar: non_empty_or(post.user.profile_img.as_deref(), AVATAR_PLACEHOLDER),
            text: post.text.clone(),
            img: post.img.clone(),
            like_count: post.likes.len(),
            comment_count: post.comments.len(),
            liked_by_viewer: viewer_id.is_some_and(|id| post.has_liked(id)),
            owned_by_viewer: viewer_id.is_some_and(|id| post.user.id == id),
        }
    }
}

/// ストーリー1件の表示用データ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryView {
    pub id: String,
    pub author_username: String,
    pub author_avatar: String,
    pub media_url: String,
    pub is_video: bool,
    pub caption: Option<String>,
    pub can_delete: bool,
}

impl StoryView {
    pub fn resolve(story: &Story, viewer_id: Option<&str>) -> Self {
        Self {
            id: story.id.clone(),
            author_username: non_empty_or(Some(&story.user.username), UNKNOWN_USERNAME),
            author_avatar: non_empty_or(story.user.profile_img.as_deref(), AVATAR_PLACEHOLDER),
            media_url: story.media_url.clone(),
            is_video: story.media_type == crate::domain::entities::MediaType::Video,
            caption: story.caption.clone(),
            can_delete: viewer_id.is_some_and(|id| story.is_owned_by(id)),
        }
    }
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{MediaType, UserSummary};

    fn bare_post() -> Post {
        Post {
            id: "p1".into(),
            user: UserSummary {
                id: "u1".into(),
                username: String::new(),
                full_name: String::new(),
                profile_img: None,
            },
            text: "hello".into(),
            img: None,
            likes: vec!["viewer".into()],
            comments: Vec::new(),
            created_at: None,
        }
    }

    #[test]
    fn missing_author_fields_get_placeholders() {
        let view = PostView::resolve(&bare_post(), None);
        assert_eq!(view.author_name, "Unknown User");
        assert_eq!(view.author_username, "unknown");
        assert_eq!(view.author_avatar, AVATAR_PLACEHOLDER);
        assert!(!view.liked_by_viewer);
    }

    #[test]
    fn viewer_perspective_is_resolved() {
        let view = PostView::resolve(&bare_post(), Some("viewer"));
        assert!(view.liked_by_viewer);
        assert!(!view.owned_by_viewer);

        let view = PostView::resolve(&bare_post(), Some("u1"));
        assert!(view.owned_by_viewer);
    }

    #[test]
    fn story_view_marks_video_and_ownership() {
        let story = Story {
            id: "s1".into(),
            user: UserSummary::new("u1", "alice"),
            media_url: "https://cdn.example/s1.mp4".into(),
            media_type: MediaType::Video,
            caption: Some("trip".into()),
            created_at: None,
        };

        let view = StoryView::resolve(&story, Some("u1"));
        assert!(view.is_video);
        assert!(view.can_delete);

        let view = StoryView::resolve(&story, Some("someone_else"));
        assert!(!view.can_delete);
    }
}
