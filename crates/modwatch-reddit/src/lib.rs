//! Client for the Reddit search and comment APIs.
//!
//! [`RedditClient`] exchanges script-app credentials for an OAuth token,
//! pages through subreddit search results, and fetches comment trees with a
//! bounded number of "load more" expansions.

pub mod client;
pub mod error;
mod wire;

pub use client::RedditClient;
pub use error::RedditError;
