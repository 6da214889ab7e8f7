//! Media content jobs.
//!
//! Uploads of audio, video or images become jobs that a pool of workers
//! drives through transcription and AI content generation (captions,
//! descriptions and hashtags) using Cloudflare Workers AI. Clients poll the
//! job endpoints for progress and results.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod store;
