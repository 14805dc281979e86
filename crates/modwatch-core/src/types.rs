use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::table::Record;

/// Date threshold below which fetched posts and comments are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    AllTime,
    Since(DateTime<Utc>),
}

impl Cutoff {
    /// Cutoff `days` before `now`. Collapses to [`Cutoff::AllTime`] when the
    /// resulting instant is not representable.
    #[must_use]
    pub fn days_back(days: u32, now: DateTime<Utc>) -> Self {
        chrono::Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
            .map_or(Cutoff::AllTime, Cutoff::Since)
    }

    /// Inclusive: an item created exactly at the threshold is kept.
    #[must_use]
    pub fn admits(&self, created: DateTime<Utc>) -> bool {
        match self {
            Cutoff::AllTime => true,
            Cutoff::Since(since) => created >= *since,
        }
    }
}

/// Result ordering requested from the upstream search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    #[default]
    New,
    Relevance,
    Hot,
    Top,
    Comments,
}

impl SearchSort {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SearchSort::New => "new",
            SearchSort::Relevance => "relevance",
            SearchSort::Hot => "hot",
            SearchSort::Top => "top",
            SearchSort::Comments => "comments",
        }
    }
}

/// A post returned by a community search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub community: String,
    pub created_utc: DateTime<Utc>,
    pub title: String,
    pub selftext: String,
    pub author: Option<String>,
    pub score: i64,
    pub upvote_ratio: f64,
    pub num_comments: u64,
    pub permalink: String,
    pub url: String,
}

impl Post {
    /// Text submitted to the toxicity scorer for this post.
    #[must_use]
    pub fn scoring_text(&self) -> String {
        format!("{} {}", self.title, self.selftext)
    }
}

/// What a comment replies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentRef {
    Post(String),
    Comment(String),
}

impl ParentRef {
    /// Parse a type-prefixed id (`t3_<post>` or `t1_<comment>`).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(id) = raw.strip_prefix("t3_") {
            Some(ParentRef::Post(id.to_string()))
        } else {
            raw.strip_prefix("t1_")
                .map(|id| ParentRef::Comment(id.to_string()))
        }
    }

    /// The id without its type prefix.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            ParentRef::Post(id) | ParentRef::Comment(id) => id,
        }
    }
}

impl std::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParentRef::Post(id) => write!(f, "t3_{id}"),
            ParentRef::Comment(id) => write!(f, "t1_{id}"),
        }
    }
}

/// A comment fetched transitively from a [`Post`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub parent: ParentRef,
    pub created_utc: DateTime<Utc>,
    pub body: String,
    pub author: Option<String>,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeScore {
    pub score: f64,
    pub span_begin: Option<u64>,
    pub span_end: Option<u64>,
}

/// Flattened toxicity scores for one piece of text.
///
/// Attribute keys are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatScores {
    pub languages: Vec<String>,
    pub detected_languages: Vec<String>,
    pub attributes: BTreeMap<String, AttributeScore>,
}

impl FlatScores {
    /// Column names produced for the given requested attributes.
    #[must_use]
    pub fn columns(attributes: &[String]) -> Vec<String> {
        let mut columns = vec!["languages".to_string(), "detected_languages".to_string()];
        for attribute in attributes {
            let lower = attribute.to_lowercase();
            columns.push(format!("{lower}_score"));
            columns.push(format!("{lower}_max_span_begin"));
            columns.push(format!("{lower}_max_span_end"));
        }
        columns
    }

    /// Attribute with the highest summary score.
    #[must_use]
    pub fn highest(&self) -> Option<(&str, &AttributeScore)> {
        self.attributes
            .iter()
            .max_by(|a, b| a.1.score.total_cmp(&b.1.score))
            .map(|(name, score)| (name.as_str(), score))
    }

    pub fn write_into(&self, record: &mut Record) {
        record.insert(
            "languages".to_string(),
            Value::from(self.languages.join(" ")),
        );
        record.insert(
            "detected_languages".to_string(),
            Value::from(self.detected_languages.join(" ")),
        );
        for (attribute, score) in &self.attributes {
            record.insert(format!("{attribute}_score"), Value::from(score.score));
            record.insert(
                format!("{attribute}_max_span_begin"),
                score.span_begin.map_or(Value::Null, Value::from),
            );
            record.insert(
                format!("{attribute}_max_span_end"),
                score.span_end.map_or(Value::Null, Value::from),
            );
        }
    }
}

/// Output row for the `posts` table.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRow {
    pub post: Post,
    pub query: String,
    pub scores: Option<FlatScores>,
}

impl PostRow {
    const BASE_COLUMNS: [&'static str; 12] = [
        "post_id",
        "community",
        "created_utc",
        "title",
        "selftext",
        "author",
        "score",
        "upvote_ratio",
        "num_comments",
        "permalink",
        "url",
        "query",
    ];

    #[must_use]
    pub fn columns(attributes: &[String]) -> Vec<String> {
        let mut columns: Vec<String> = Self::BASE_COLUMNS.iter().map(ToString::to_string).collect();
        columns.extend(FlatScores::columns(attributes));
        columns
    }

    #[must_use]
    pub fn into_record(self) -> Record {
        let Post {
            id,
            community,
            created_utc,
            title,
            selftext,
            author,
            score,
            upvote_ratio,
            num_comments,
            permalink,
            url,
        } = self.post;

        let mut record = Record::new();
        record.insert("post_id".to_string(), Value::from(id));
        record.insert("community".to_string(), Value::from(community));
        record.insert(
            "created_utc".to_string(),
            Value::from(created_utc.to_rfc3339()),
        );
        record.insert("title".to_string(), Value::from(title));
        record.insert("selftext".to_string(), Value::from(selftext));
        record.insert("author".to_string(), author.map_or(Value::Null, Value::from));
        record.insert("score".to_string(), Value::from(score));
        record.insert("upvote_ratio".to_string(), Value::from(upvote_ratio));
        record.insert("num_comments".to_string(), Value::from(num_comments));
        record.insert("permalink".to_string(), Value::from(permalink));
        record.insert("url".to_string(), Value::from(url));
        record.insert("query".to_string(), Value::from(self.query));
        if let Some(scores) = &self.scores {
            scores.write_into(&mut record);
        }
        record
    }
}

/// Output row for the `comments` table.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRow {
    pub comment: Comment,
    pub query: String,
    pub scores: Option<FlatScores>,
}

impl CommentRow {
    const BASE_COLUMNS: [&'static str; 8] = [
        "comment_id",
        "post_id",
        "parent_id",
        "created_utc",
        "body",
        "author",
        "score",
        "query",
    ];

    #[must_use]
    pub fn columns(attributes: &[String]) -> Vec<String> {
        let mut columns: Vec<String> = Self::BASE_COLUMNS.iter().map(ToString::to_string).collect();
        columns.extend(FlatScores::columns(attributes));
        columns
    }

    #[must_use]
    pub fn into_record(self) -> Record {
        let Comment {
            id,
            post_id,
            parent,
            created_utc,
            body,
            author,
            score,
        } = self.comment;

        let mut record = Record::new();
        record.insert("comment_id".to_string(), Value::from(id));
        record.insert("post_id".to_string(), Value::from(post_id));
        record.insert("parent_id".to_string(), Value::from(parent.to_string()));
        record.insert(
            "created_utc".to_string(),
            Value::from(created_utc.to_rfc3339()),
        );
        record.insert("body".to_string(), Value::from(body));
        record.insert("author".to_string(), author.map_or(Value::Null, Value::from));
        record.insert("score".to_string(), Value::from(score));
        record.insert("query".to_string(), Value::from(self.query));
        if let Some(scores) = &self.scores {
            scores.write_into(&mut record);
        }
        record
    }
}

/// Entity kinds persisted as separate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Posts,
    Comments,
    Conversations,
    Perspectives,
    Ranked,
    Assessments,
}

impl TableKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Posts => "posts",
            TableKind::Comments => "comments",
            TableKind::Conversations => "conversations",
            TableKind::Perspectives => "perspectives",
            TableKind::Ranked => "ranked",
            TableKind::Assessments => "assessments",
        }
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.jsonl", self.as_str())
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
