//! Business logic services.

#![allow(missing_docs)]

pub mod comment;
pub mod feed;
pub mod following;
pub mod group;
pub mod media;
pub mod post;
pub mod user;

pub use comment::{CommentService, CommentView, CreateCommentInput, MAX_COMMENT_TEXT_LEN};
pub use feed::{FeedService, GroupFeed, GroupRef, PostView, PostViewAssembler, ProfileFeed};
pub use following::{FollowResult, FollowingService, UnfollowResult};
pub use group::{CreateGroupInput, GroupService};
pub use media::{ImageFormat, ImageUpload, MAX_IMAGE_BYTES, decode_image};
pub use post::{
    CreatePostInput, MAX_POST_TEXT_LEN, PostDetail, PostService, UpdatePostInput,
};
pub use user::{RegisterInput, UserService};
