//! Background work
//!
//! Emails are pushed onto an in-process queue and sent by a single worker
//! task, so HTTP handlers never wait on SMTP. Periodic maintenance (chat
//! retention, expired tokens, rate limiter state) runs on tokio intervals.

use crate::config::ChatConfig;
use crate::db::repositories::{ChatRepository, VerificationRepository};
use crate::services::email::EmailService;
use crate::services::rate_limiter::RateLimiter;
use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    SendVerificationEmail {
        email: String,
        username: String,
        code: String,
    },
    SendWelcomeEmail {
        email: String,
        username: String,
    },
    SendPasswordResetEmail {
        email: String,
        username: String,
        reset_link: String,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::SendVerificationEmail { .. } => "send_verification_email",
            Job::SendWelcomeEmail { .. } => "send_welcome_email",
            Job::SendPasswordResetEmail { .. } => "send_password_reset_email",
        }
    }
}

/// Handle for enqueueing jobs; cheap to clone
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl JobQueue {
    /// Queue plus its receiving end, for callers that drive the worker themselves
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Spawn the email worker and return a queue feeding it
    pub fn start(email: Arc<EmailService>) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = Self::channel();
        let handle = tokio::spawn(run_worker(receiver, email));
        (queue, handle)
    }

    /// Fire and forget. A stopped worker is logged, never surfaced.
    pub fn enqueue(&self, job: Job) {
        let name = job.name();
        if self.sender.send(job).is_err() {
            tracing::error!("Job worker is not running, dropped {}", name);
        } else {
            tracing::debug!("Queued {}", name);
        }
    }
}

async fn run_worker(mut receiver: mpsc::UnboundedReceiver<Job>, email: Arc<EmailService>) {
    tracing::info!("Job worker started");
    while let Some(job) = receiver.recv().await {
        let name = job.name();
        if let Err(e) = process_job(&email, job).await {
            tracing::error!("Job {} failed: {:#}", name, e);
        }
    }
    tracing::info!("Job worker stopped");
}

pub async fn process_job(email: &EmailService, job: Job) -> Result<()> {
    match job {
        Job::SendVerificationEmail {
            email: to,
            username,
            code,
        } => {
            let content = email.verification_email(&username, &code);
            email.send(&to, &content).await
        }
        Job::SendWelcomeEmail { email: to, username } => {
            let content = email.welcome_email(&username);
            email.send(&to, &content).await
        }
        Job::SendPasswordResetEmail {
            email: to,
            username,
            reset_link,
        } => {
            let content = email.password_reset_email(&username, &reset_link);
            email.send(&to, &content).await
        }
    }
}

/// Delete chat messages past the retention period; returns how many
pub async fn clean_old_chat_messages(chat: &dyn ChatRepository, retention_days: i64) -> Result<u64> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let removed = chat.delete_older_than(cutoff).await?;
    if removed > 0 {
        tracing::info!("Removed {} chat messages older than {} days", removed, retention_days);
    }
    Ok(removed)
}

/// Chat retention plus expired verification codes and reset tokens
pub fn spawn_maintenance(
    chat: Arc<dyn ChatRepository>,
    verifications: Arc<dyn VerificationRepository>,
    config: &ChatConfig,
) -> JoinHandle<()> {
    let retention_days = config.message_retention_days;
    let period = std::time::Duration::from_secs(config.cleanup_interval_hours.max(1) * 3600);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = clean_old_chat_messages(chat.as_ref(), retention_days).await {
                tracing::error!("Chat retention cleanup failed: {:#}", e);
            }
            match verifications.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Purged {} expired verification records", n),
                Err(e) => tracing::error!("Verification cleanup failed: {:#}", e),
            }
        }
    })
}

pub fn spawn_rate_limiter_cleanup(limiter: Arc<RateLimiter<i64>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    })
}
