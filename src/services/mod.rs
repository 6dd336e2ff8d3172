//! Services layer
//!
//! Business rules on top of the repositories. Each service owns an error
//! enum whose messages are what API clients see.

pub mod auth;
pub mod chat;
pub mod comment;
pub mod email;
pub mod image;
pub mod jobs;
pub mod oauth;
pub mod password;
pub mod photo;
pub mod rate_limiter;
pub mod social;
pub mod token;
pub mod user;

pub use auth::{AuthService, AuthServiceError, RegisterInput};
pub use chat::{ChatHub, ChatService, ChatServiceError, ServerFrame};
pub use comment::{CommentService, CommentServiceError};
pub use email::EmailService;
pub use image::{ImageError, ImageService};
pub use jobs::{Job, JobQueue};
pub use oauth::{GoogleOAuth, GoogleProfile, OAuthError};
pub use password::{hash_password, verify_password};
pub use photo::{PhotoDetails, PhotoService, PhotoServiceError, UploadPhotoInput};
pub use rate_limiter::RateLimiter;
pub use social::{SocialService, SocialServiceError};
pub use token::{TokenPair, TokenService, TokenType};
pub use user::{PublicProfile, UpdateProfileInput, UserProfile, UserService, UserServiceError};
