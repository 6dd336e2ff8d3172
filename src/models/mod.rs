//! Data models
//!
//! Database entities plus the small projections the services hand to the
//! API layer (stats, conversation summaries, comment threads).

mod category;
mod chat;
mod comment;
mod photo;
mod social;
mod user;
mod verification;

pub use category::Category;
pub use chat::{ChatMessage, Conversation};
pub use comment::{Comment, CommentThread, CreateCommentInput};
pub use photo::{CreatePhotoInput, Photo, PhotoFilter, PhotoLike};
pub use social::{Block, Follow, UserStats};
pub use user::{AuthProvider, User};
pub use verification::{EmailVerification, PasswordReset};
