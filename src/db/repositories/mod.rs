//! Database repositories
//!
//! One trait per aggregate, each with an sqlx implementation that works on
//! both SQLite and MySQL. Services hold them as `Arc<dyn ...>`.

pub mod category;
pub mod chat;
pub mod comment;
pub mod photo;
pub mod social;
pub mod user;
pub mod verification;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use chat::{ChatRepository, SqlxChatRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use photo::{PhotoRepository, SqlxPhotoRepository};
pub use social::{SocialRepository, SqlxSocialRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use verification::{SqlxVerificationRepository, VerificationRepository};
