//! Database migrations
//!
//! Migrations are embedded as SQL strings with one variant per backend and
//! recorded in the `_migrations` table once applied.
//!
//! Timestamp columns carry no defaults: every write binds the value from
//! Rust so both backends store comparable values.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, ascending version number
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                hashed_password VARCHAR(255),
                bio TEXT,
                profile_picture VARCHAR(500),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                is_verified BOOLEAN NOT NULL DEFAULT 0,
                is_oauth BOOLEAN NOT NULL DEFAULT 0,
                oauth_provider VARCHAR(50),
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                hashed_password VARCHAR(255),
                bio TEXT,
                profile_picture VARCHAR(500),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                is_verified BOOLEAN NOT NULL DEFAULT FALSE,
                is_oauth BOOLEAN NOT NULL DEFAULT FALSE,
                oauth_provider VARCHAR(50),
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NULL
            );
            CREATE INDEX idx_users_username ON users(username);
            CREATE INDEX idx_users_email ON users(email);
        "#,
    },
    Migration {
        version: 2,
        name: "create_email_verifications",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS email_verifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                email VARCHAR(255) NOT NULL,
                code VARCHAR(6) NOT NULL,
                is_used BOOLEAN NOT NULL DEFAULT 0,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_email_verifications_user_id ON email_verifications(user_id);
            CREATE INDEX IF NOT EXISTS idx_email_verifications_email ON email_verifications(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS email_verifications (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                email VARCHAR(255) NOT NULL,
                code VARCHAR(6) NOT NULL,
                is_used BOOLEAN NOT NULL DEFAULT FALSE,
                expires_at DATETIME(6) NOT NULL,
                created_at DATETIME(6) NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_email_verifications_email ON email_verifications(email);
        "#,
    },
    Migration {
        version: 3,
        name: "create_password_resets",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS password_resets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                email VARCHAR(255) NOT NULL,
                token VARCHAR(255) NOT NULL UNIQUE,
                is_used BOOLEAN NOT NULL DEFAULT 0,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_password_resets_token ON password_resets(token);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS password_resets (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                email VARCHAR(255) NOT NULL,
                token VARCHAR(255) NOT NULL UNIQUE,
                is_used BOOLEAN NOT NULL DEFAULT FALSE,
                expires_at DATETIME(6) NOT NULL,
                created_at DATETIME(6) NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                slug VARCHAR(50) NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_categories_slug ON categories(slug);
            INSERT OR IGNORE INTO categories (name, slug, description, created_at) VALUES
                ('Nature', 'nature', 'Landscapes, plants and the outdoors', '1970-01-01T00:00:00+00:00'),
                ('Portrait', 'portrait', 'People and faces', '1970-01-01T00:00:00+00:00'),
                ('Architecture', 'architecture', 'Buildings and structures', '1970-01-01T00:00:00+00:00'),
                ('Street', 'street', 'Everyday life in public places', '1970-01-01T00:00:00+00:00'),
                ('Travel', 'travel', 'Places around the world', '1970-01-01T00:00:00+00:00'),
                ('Animals', 'animals', 'Pets and wildlife', '1970-01-01T00:00:00+00:00'),
                ('Food', 'food', 'Dishes, drinks and ingredients', '1970-01-01T00:00:00+00:00'),
                ('Abstract', 'abstract', 'Shapes, textures and colour', '1970-01-01T00:00:00+00:00');
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                slug VARCHAR(50) NOT NULL UNIQUE,
                description TEXT,
                created_at DATETIME(6) NOT NULL
            );
            INSERT IGNORE INTO categories (name, slug, description, created_at) VALUES
                ('Nature', 'nature', 'Landscapes, plants and the outdoors', '1970-01-01 00:00:01'),
                ('Portrait', 'portrait', 'People and faces', '1970-01-01 00:00:01'),
                ('Architecture', 'architecture', 'Buildings and structures', '1970-01-01 00:00:01'),
                ('Street', 'street', 'Everyday life in public places', '1970-01-01 00:00:01'),
                ('Travel', 'travel', 'Places around the world', '1970-01-01 00:00:01'),
                ('Animals', 'animals', 'Pets and wildlife', '1970-01-01 00:00:01'),
                ('Food', 'food', 'Dishes, drinks and ingredients', '1970-01-01 00:00:01'),
                ('Abstract', 'abstract', 'Shapes, textures and colour', '1970-01-01 00:00:01');
        "#,
    },
    Migration {
        version: 5,
        name: "create_photos",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS photos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                file_path VARCHAR(500) NOT NULL,
                file_name VARCHAR(255) NOT NULL,
                file_size INTEGER NOT NULL,
                width INTEGER,
                height INTEGER,
                owner_id INTEGER NOT NULL,
                views_count INTEGER NOT NULL DEFAULT 0,
                likes_count INTEGER NOT NULL DEFAULT 0,
                comments_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_photos_owner_id ON photos(owner_id);
            CREATE INDEX IF NOT EXISTS idx_photos_created_at ON photos(created_at);
            CREATE TABLE IF NOT EXISTS photo_categories (
                photo_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                PRIMARY KEY (photo_id, category_id),
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_photo_categories_category_id ON photo_categories(category_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS photos (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                file_path VARCHAR(500) NOT NULL,
                file_name VARCHAR(255) NOT NULL,
                file_size BIGINT NOT NULL,
                width BIGINT,
                height BIGINT,
                owner_id BIGINT NOT NULL,
                views_count BIGINT NOT NULL DEFAULT 0,
                likes_count BIGINT NOT NULL DEFAULT 0,
                comments_count BIGINT NOT NULL DEFAULT 0,
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_photos_created_at ON photos(created_at);
            CREATE TABLE IF NOT EXISTS photo_categories (
                photo_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                PRIMARY KEY (photo_id, category_id),
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_photo_likes",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS photo_likes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                photo_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (photo_id, user_id),
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_photo_likes_user_id ON photo_likes(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS photo_likes (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                photo_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                created_at DATETIME(6) NOT NULL,
                UNIQUE KEY unique_like (photo_id, user_id),
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 7,
        name: "create_comments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                photo_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                parent_id INTEGER,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP,
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_comments_photo_id ON comments(photo_id);
            CREATE INDEX IF NOT EXISTS idx_comments_parent_id ON comments(parent_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS comments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                content TEXT NOT NULL,
                photo_id BIGINT NOT NULL,
                author_id BIGINT NOT NULL,
                parent_id BIGINT NULL,
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NULL,
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 8,
        name: "create_follows",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS follows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                follower_id INTEGER NOT NULL,
                followed_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (follower_id, followed_id),
                FOREIGN KEY (follower_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (followed_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_follows_followed_id ON follows(followed_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS follows (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                follower_id BIGINT NOT NULL,
                followed_id BIGINT NOT NULL,
                created_at DATETIME(6) NOT NULL,
                UNIQUE KEY unique_follow (follower_id, followed_id),
                FOREIGN KEY (follower_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (followed_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 9,
        name: "create_blocks",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                blocker_id INTEGER NOT NULL,
                blocked_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL,
                UNIQUE (blocker_id, blocked_id),
                FOREIGN KEY (blocker_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (blocked_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_blocks_blocked_id ON blocks(blocked_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blocks (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                blocker_id BIGINT NOT NULL,
                blocked_id BIGINT NOT NULL,
                created_at DATETIME(6) NOT NULL,
                UNIQUE KEY unique_block (blocker_id, blocked_id),
                FOREIGN KEY (blocker_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (blocked_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 10,
        name: "create_chat_messages",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                sender_id INTEGER NOT NULL,
                receiver_id INTEGER NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT 0,
                is_deleted_by_sender BOOLEAN NOT NULL DEFAULT 0,
                is_deleted_by_receiver BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                read_at TIMESTAMP,
                FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_sender_id ON chat_messages(sender_id);
            CREATE INDEX IF NOT EXISTS idx_chat_messages_receiver_id ON chat_messages(receiver_id);
            CREATE INDEX IF NOT EXISTS idx_chat_messages_created_at ON chat_messages(created_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                content TEXT NOT NULL,
                sender_id BIGINT NOT NULL,
                receiver_id BIGINT NOT NULL,
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                is_deleted_by_sender BOOLEAN NOT NULL DEFAULT FALSE,
                is_deleted_by_receiver BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME(6) NOT NULL,
                read_at DATETIME(6) NULL,
                FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_chat_messages_created_at ON chat_messages(created_at);
        "#,
    },
];

/// Apply every pending migration in version order.
///
/// Returns the number of migrations applied by this call.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if applied_versions.contains(&(migration.version as i64)) {
            continue;
        }
        tracing::info!(
            "Applying migration {}: {}",
            migration.version,
            migration.name
        );
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at DATETIME(6) NOT NULL
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// List applied migrations, oldest first
pub async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    let records = with_pool!(pool, db => {
        sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
            .fetch_all(db)
            .await
            .context("Failed to read applied migrations")?
            .iter()
            .map(|row| MigrationRecord {
                version: row.get("version"),
                name: row.get("name"),
                applied_at: row.get("applied_at"),
            })
            .collect()
    });
    Ok(records)
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    with_pool!(pool, db => {
        for statement in split_sql_statements(sql) {
            sqlx::query(statement)
                .execute(db)
                .await
                .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
        }

        sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version as i64)
            .bind(migration.name)
            .bind(Utc::now())
            .execute(db)
            .await
            .context("Failed to record migration")?;
    });

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut current_start = 0;
    let mut in_statement = false;

    for (i, c) in sql.char_indices() {
        match c {
            ';' => {
                if in_statement {
                    let stmt = sql[current_start..i].trim();
                    if !stmt.is_empty() && !is_comment_only(stmt) {
                        statements.push(stmt);
                    }
                    in_statement = false;
                }
                current_start = i + 1;
            }
            _ if !c.is_whitespace() && !in_statement => {
                current_start = i;
                in_statement = true;
            }
            _ => {}
        }
    }

    if in_statement {
        let stmt = sql[current_start..].trim();
        if !stmt.is_empty() && !is_comment_only(stmt) {
            statements.push(stmt);
        }
    }

    statements
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}
