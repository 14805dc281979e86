//! Response shapes for the Reddit listing endpoints.

use chrono::{DateTime, Utc};
use modwatch_core::{Comment, ParentRef, Post};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Listing {
    pub(crate) data: ListingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData {
    #[serde(default)]
    pub(crate) children: Vec<Thing>,
    pub(crate) after: Option<String>,
}

/// A tagged listing entry: `t3` post, `t1` comment, or `more` stub.
#[derive(Debug, Deserialize)]
pub(crate) struct Thing {
    pub(crate) kind: String,
    pub(crate) data: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostData {
    pub(crate) id: String,
    pub(crate) subreddit: Option<String>,
    pub(crate) created_utc: f64,
    pub(crate) title: Option<String>,
    pub(crate) selftext: Option<String>,
    pub(crate) author: Option<String>,
    #[serde(default)]
    pub(crate) score: i64,
    #[serde(default)]
    pub(crate) upvote_ratio: f64,
    #[serde(default)]
    pub(crate) num_comments: u64,
    #[serde(default)]
    pub(crate) permalink: String,
    #[serde(default)]
    pub(crate) url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentData {
    pub(crate) id: String,
    pub(crate) parent_id: String,
    pub(crate) created_utc: f64,
    pub(crate) body: Option<String>,
    pub(crate) author: Option<String>,
    #[serde(default)]
    pub(crate) score: i64,
    /// Either an empty string or a nested listing.
    #[serde(default)]
    pub(crate) replies: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreData {
    #[serde(default)]
    pub(crate) children: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenResponse {
    pub(crate) json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenJson {
    pub(crate) data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenData {
    #[serde(default)]
    pub(crate) things: Vec<Thing>,
}

pub(crate) fn timestamp(epoch_secs: f64) -> DateTime<Utc> {
    #[allow(clippy::cast_possible_truncation)]
    let secs = epoch_secs.trunc() as i64;
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

impl PostData {
    pub(crate) fn into_post(self, community: &str) -> Post {
        Post {
            id: self.id,
            community: self.subreddit.unwrap_or_else(|| community.to_string()),
            created_utc: timestamp(self.created_utc),
            title: self.title.unwrap_or_default(),
            selftext: self.selftext.unwrap_or_default(),
            author: self.author,
            score: self.score,
            upvote_ratio: self.upvote_ratio,
            num_comments: self.num_comments,
            permalink: self.permalink,
            url: self.url,
        }
    }
}

impl CommentData {
    /// `None` when the parent id carries an unknown type prefix.
    pub(crate) fn to_comment(&self, post_id: &str) -> Option<Comment> {
        Some(Comment {
            id: self.id.clone(),
            post_id: post_id.to_string(),
            parent: ParentRef::parse(&self.parent_id)?,
            created_utc: timestamp(self.created_utc),
            body: self.body.clone().unwrap_or_default(),
            author: self.author.clone(),
            score: self.score,
        })
    }

    /// Child entries when `replies` holds a listing.
    pub(crate) fn take_replies(&mut self) -> Vec<Thing> {
        match serde_json::from_value::<Listing>(self.replies.take()) {
            Ok(listing) => listing.data.children,
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_replies_string_yields_no_children() {
        let mut data: CommentData = serde_json::from_value(json!({
            "id": "c1",
            "parent_id": "t3_p1",
            "created_utc": 1_700_000_000.0,
            "body": "hi",
            "author": "someone",
            "replies": ""
        }))
        .unwrap();
        assert!(data.take_replies().is_empty());
    }

    #[test]
    fn post_falls_back_to_requested_community() {
        let data: PostData = serde_json::from_value(json!({
            "id": "p1",
            "created_utc": 1_700_000_000.5,
            "title": null
        }))
        .unwrap();
        let post = data.into_post("news");
        assert_eq!(post.community, "news");
        assert_eq!(post.title, "");
        assert_eq!(post.created_utc.timestamp(), 1_700_000_000);
    }

    #[test]
    fn unknown_parent_prefix_is_rejected() {
        let data: CommentData = serde_json::from_value(json!({
            "id": "c1",
            "parent_id": "t9_zzz",
            "created_utc": 1.0
        }))
        .unwrap();
        assert!(data.to_comment("p1").is_none());
    }
}
