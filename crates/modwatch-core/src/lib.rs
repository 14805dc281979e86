//! Shared configuration, domain types and the tabular file format used by
//! every `modwatch` stage.

pub mod app_config;
pub mod config;
pub mod error;
pub mod table;
pub mod targeting;
pub mod types;

pub use app_config::{AppConfig, RedditCredentials};
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{ConfigError, TableError};
pub use table::{Record, Table};
pub use targeting::{load_targeting, TargetingFile};
pub use types::{
    AttributeScore, Comment, CommentRow, Cutoff, FlatScores, ParentRef, Post, PostRow, SearchSort,
    TableKind,
};
