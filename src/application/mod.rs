//! Application services: listings, posting, comments, follows and accounts.

pub mod auth;
pub mod authz;
pub mod comments;
pub mod error;
pub mod feed;
pub mod follows;
pub mod forms;
pub mod groups;
pub mod pagination;
pub mod posts;
pub mod repos;
