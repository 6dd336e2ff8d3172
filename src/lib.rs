//! Photosocial - a photo sharing backend
//!
//! Users upload photos, follow each other, like and comment, and chat in
//! real time. This crate holds the HTTP API plus the services and storage
//! behind it.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
