//! Model builders shared by the unit tests.

use chrono::Utc;
use quill_db::entities::{group, post, user};

pub fn user(id: &str, username: &str) -> user::Model {
    user::Model {
        id: id.to_string(),
        username: username.to_string(),
        username_lower: username.to_lowercase(),
        name: None,
        email: None,
        token: Some(format!("token-{id}")),
        created_at: Utc::now().into(),
    }
}

pub fn post(id: &str, author_id: &str, group_id: Option<&str>) -> post::Model {
    post::Model {
        id: id.to_string(),
        text: format!("Post {id}"),
        author_id: author_id.to_string(),
        group_id: group_id.map(str::to_string),
        image: None,
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

pub fn group(id: &str, slug: &str) -> group::Model {
    group::Model {
        id: id.to_string(),
        title: format!("Group {slug}"),
        slug: slug.to_string(),
        description: String::new(),
        created_at: Utc::now().into(),
    }
}
