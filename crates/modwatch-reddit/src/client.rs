//! HTTP client for the Reddit OAuth API.
//!
//! Authentication uses the client-credentials grant. The bearer token is
//! fetched lazily, cached, and refreshed once when the API answers 401.

use std::time::Duration;

use modwatch_core::{Comment, Cutoff, Post, RedditCredentials, SearchSort};
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::RedditError;
use crate::wire::{
    CommentData, Listing, MoreChildrenResponse, MoreData, PostData, Thing, TokenResponse,
};

const DEFAULT_AUTH_BASE: &str = "https://www.reddit.com/";
const DEFAULT_API_BASE: &str = "https://oauth.reddit.com/";
const SEARCH_PAGE_MAX: usize = 100;
const MORE_CHILDREN_BATCH: usize = 100;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Client for subreddit search and comment retrieval.
///
/// Use [`RedditClient::new`] for production or
/// [`RedditClient::with_base_urls`] to point at a mock server in tests.
pub struct RedditClient {
    client: Client,
    credentials: RedditCredentials,
    auth_base: Url,
    api_base: Url,
    token: Mutex<Option<String>>,
    expansion_pacing: Duration,
}

impl RedditClient {
    /// Creates a client pointed at the production endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(credentials: RedditCredentials, timeout_secs: u64) -> Result<Self, RedditError> {
        Self::with_base_urls(credentials, timeout_secs, DEFAULT_AUTH_BASE, DEFAULT_API_BASE)
    }

    /// Creates a client with custom token and API base URLs.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Http`] if the HTTP client cannot be built, or
    /// [`RedditError::InvalidBaseUrl`] if either URL does not parse.
    pub fn with_base_urls(
        credentials: RedditCredentials,
        timeout_secs: u64,
        auth_base: &str,
        api_base: &str,
    ) -> Result<Self, RedditError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(credentials.user_agent())
            .build()?;

        Ok(Self {
            client,
            credentials,
            auth_base: normalise_base(auth_base)?,
            api_base: normalise_base(api_base)?,
            token: Mutex::new(None),
            expansion_pacing: Duration::ZERO,
        })
    }

    /// Waits `interval` before each "load more" request of a comment fetch.
    #[must_use]
    pub fn with_expansion_pacing(mut self, interval: Duration) -> Self {
        self.expansion_pacing = interval;
        self
    }

    /// Searches one subreddit, following `after` cursors until `limit`
    /// results have been requested or the listing is exhausted.
    ///
    /// A subreddit that does not exist (404) yields an empty result. Posts
    /// older than `cutoff` are dropped.
    ///
    /// # Errors
    ///
    /// - [`RedditError::RateLimited`] on HTTP 429.
    /// - [`RedditError::Auth`] if the token exchange fails.
    /// - [`RedditError::UnexpectedStatus`], [`RedditError::Http`] or
    ///   [`RedditError::Deserialize`] on other failures.
    pub async fn search_community(
        &self,
        community: &str,
        query: &str,
        limit: usize,
        cutoff: Cutoff,
        sort: SearchSort,
    ) -> Result<Vec<Post>, RedditError> {
        let path = format!("r/{community}/search");
        let mut posts = Vec::new();
        let mut requested = 0usize;
        let mut after: Option<String> = None;

        while requested < limit {
            let page_limit = (limit - requested).min(SEARCH_PAGE_MAX);
            let mut params: Vec<(&str, String)> = vec![
                ("q", query.to_string()),
                ("restrict_sr", "true".to_string()),
                ("sort", sort.as_str().to_string()),
                ("t", "all".to_string()),
                ("limit", page_limit.to_string()),
                ("raw_json", "1".to_string()),
            ];
            if let Some(cursor) = &after {
                params.push(("after", cursor.clone()));
            }

            let body = match self.get_json(&path, &params).await {
                Ok(body) => body,
                Err(RedditError::NotFound { url }) => {
                    tracing::debug!(community, %url, "subreddit not found; treating as empty");
                    return Ok(posts);
                }
                Err(e) => return Err(e),
            };
            let listing: Listing =
                serde_json::from_value(body).map_err(|e| RedditError::Deserialize {
                    context: format!("search(r/{community}, q={query})"),
                    source: e,
                })?;
            requested += page_limit;

            let page_len = listing.data.children.len();
            for thing in listing.data.children {
                if thing.kind != "t3" {
                    continue;
                }
                match serde_json::from_value::<PostData>(thing.data) {
                    Ok(data) => {
                        let post = data.into_post(community);
                        if cutoff.admits(post.created_utc) {
                            posts.push(post);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(community, error = %e, "skipping malformed search result");
                    }
                }
            }

            after = listing.data.after;
            if after.is_none() || page_len == 0 {
                break;
            }
        }

        tracing::debug!(community, query, returned = posts.len(), "search complete");
        Ok(posts)
    }

    /// Fetches the flattened comment tree of `post`.
    ///
    /// Comments are returned in pre-order. At most `expansion_cap`
    /// "load more" requests are issued, each after the expansion pacing
    /// interval; stubs left after that are dropped.
    ///
    /// # Errors
    ///
    /// - [`RedditError::RateLimited`] on HTTP 429.
    /// - [`RedditError::NotFound`] if the post no longer exists.
    /// - [`RedditError::Deserialize`] if the listing pair does not parse.
    pub async fn fetch_comments(
        &self,
        post: &Post,
        cutoff: Cutoff,
        expansion_cap: usize,
    ) -> Result<Vec<Comment>, RedditError> {
        let path = format!("comments/{}", post.id);
        let params = [
            ("raw_json", "1".to_string()),
            ("limit", "500".to_string()),
        ];
        let body = self.get_json(&path, &params).await?;
        let listings: Vec<Listing> =
            serde_json::from_value(body).map_err(|e| RedditError::Deserialize {
                context: format!("comments({})", post.id),
                source: e,
            })?;

        let top_level = listings
            .into_iter()
            .nth(1)
            .map(|listing| listing.data.children)
            .unwrap_or_default();

        let mut comments = Vec::new();
        let mut pending_more = Vec::new();
        flatten(top_level, &post.id, &mut comments, &mut pending_more);

        let mut expansions = 0usize;
        while !pending_more.is_empty() && expansions < expansion_cap {
            let take = pending_more.len().min(MORE_CHILDREN_BATCH);
            let batch: Vec<String> = pending_more.drain(..take).collect();
            if !self.expansion_pacing.is_zero() {
                tokio::time::sleep(self.expansion_pacing).await;
            }
            let things = self.more_children(&post.id, &batch).await?;
            flatten(things, &post.id, &mut comments, &mut pending_more);
            expansions += 1;
        }
        if !pending_more.is_empty() {
            tracing::debug!(
                post_id = %post.id,
                dropped = pending_more.len(),
                "expansion cap reached; remaining comment stubs dropped"
            );
        }

        comments.retain(|c| cutoff.admits(c.created_utc));
        Ok(comments)
    }

    async fn more_children(
        &self,
        post_id: &str,
        children: &[String],
    ) -> Result<Vec<Thing>, RedditError> {
        let params = [
            ("api_type", "json".to_string()),
            ("link_id", format!("t3_{post_id}")),
            ("children", children.join(",")),
            ("raw_json", "1".to_string()),
        ];
        let body = self.get_json("api/morechildren", &params).await?;
        let response: MoreChildrenResponse =
            serde_json::from_value(body).map_err(|e| RedditError::Deserialize {
                context: format!("morechildren({post_id})"),
                source: e,
            })?;
        Ok(response.json.data.map(|d| d.things).unwrap_or_default())
    }

    async fn bearer_token(&self) -> Result<String, RedditError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.fetch_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<String, RedditError> {
        let url = self
            .auth_base
            .join("api/v1/access_token")
            .map_err(|e| RedditError::InvalidBaseUrl {
                url: self.auth_base.to_string(),
                reason: e.to_string(),
            })?;
        let response = self
            .client
            .post(url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RedditError::RateLimited {
                retry_after_secs: retry_after_secs(&response),
            });
        }
        if !status.is_success() {
            return Err(RedditError::Auth(format!(
                "token exchange failed with status {status}"
            )));
        }

        let body = response.text().await?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| RedditError::Deserialize {
                context: "access_token".to_string(),
                source: e,
            })?;
        tracing::debug!("obtained Reddit access token");
        Ok(token.access_token)
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, RedditError> {
        let url = self
            .api_base
            .join(path)
            .map_err(|e| RedditError::InvalidBaseUrl {
                url: self.api_base.to_string(),
                reason: e.to_string(),
            })?;

        let mut refreshed = false;
        loop {
            let token = self.bearer_token().await?;
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(&token)
                .query(params)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    return Err(RedditError::Auth(format!(
                        "token rejected by {}",
                        url.path()
                    )));
                }
                self.invalidate_token().await;
                refreshed = true;
                continue;
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(RedditError::RateLimited {
                    retry_after_secs: retry_after_secs(&response),
                });
            }
            if status == StatusCode::NOT_FOUND {
                return Err(RedditError::NotFound {
                    url: url.to_string(),
                });
            }
            if !status.is_success() {
                return Err(RedditError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let body = response.text().await?;
            return serde_json::from_str(&body).map_err(|e| RedditError::Deserialize {
                context: url.path().to_string(),
                source: e,
            });
        }
    }
}

fn normalise_base(base: &str) -> Result<Url, RedditError> {
    let normalised = format!("{}/", base.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| RedditError::InvalidBaseUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })
}

/// Seconds to wait from `Retry-After` or `x-ratelimit-reset`, defaulting to 60.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn retry_after_secs(response: &Response) -> u64 {
    ["retry-after", "x-ratelimit-reset"]
        .iter()
        .filter_map(|name| response.headers().get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| raw.trim().parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map_or(DEFAULT_RETRY_AFTER_SECS, |secs| secs.ceil() as u64)
}

/// Appends comments from `things` to `out` in pre-order and collects the ids
/// behind "more" stubs into `pending_more`.
fn flatten(things: Vec<Thing>, post_id: &str, out: &mut Vec<Comment>, pending_more: &mut Vec<String>) {
    let mut stack: Vec<Thing> = things.into_iter().rev().collect();
    while let Some(thing) = stack.pop() {
        match thing.kind.as_str() {
            "t1" => {
                let mut data: CommentData = match serde_json::from_value(thing.data) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::debug!(post_id, error = %e, "skipping malformed comment");
                        continue;
                    }
                };
                let replies = data.take_replies();
                if let Some(comment) = data.to_comment(post_id) {
                    out.push(comment);
                }
                stack.extend(replies.into_iter().rev());
            }
            "more" => {
                if let Ok(more) = serde_json::from_value::<MoreData>(thing.data) {
                    pending_more.extend(more.children);
                }
            }
            _ => {}
        }
    }
}
