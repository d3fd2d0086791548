//! Topic forum library.
//!
//! A discussion forum organized as topics holding tags and posts, with
//! per-user upvotes, admin moderation (pinning, hiding) and OAuth2 login.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod web;
