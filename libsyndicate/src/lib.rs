//! Syndicate - social publishing engine
//!
//! This library stores third-party OAuth credentials encrypted at rest, wraps
//! each social platform's REST API behind a common client trait, and fans a
//! single authored post out to every connected account with per-account
//! result tracking and evergreen recycling.

pub mod accounts;
pub mod cipher;
pub mod config;
pub mod db;
pub mod error;
pub mod evergreen;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod publisher;
pub mod refresh;
pub mod scheduling;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use cipher::TokenCipher;
pub use config::Config;
pub use db::Database;
pub use error::{Result, SyndicateError};
pub use platforms::{PlatformClient, PlatformRegistry};
pub use publisher::{PublishReport, Publisher};
pub use scheduling::{DispatchSummary, Dispatcher};
pub use service::SyndicateService;
pub use store::SocialStore;
pub use types::{
    MediaItem, Platform, PlatformPostResult, PostStatus, PublishOutcome, SocialAccount,
    SocialPost, TokenPair,
};
