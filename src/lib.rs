//! Quillfeed: a small community blog.
//!
//! Authors publish short posts, optionally into a group and with an image;
//! readers browse paginated listings, comment, and follow authors to get a
//! personal feed.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
