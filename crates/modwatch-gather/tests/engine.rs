//! Scenario tests for the gathering engine using in-process fakes and paused time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use modwatch_core::table::str_field;
use modwatch_core::{
    AttributeScore, Comment, Cutoff, FlatScores, ParentRef, Post, Record, SearchSort, TableError,
    TableKind,
};
use modwatch_gather::{
    BatchSink, GatherError, GatherSettings, GatherSummary, GatherSupervisor, MemorySink,
    ProgressSnapshot, Push, QueryBuilder, RunLog, Scorer, SearchSource, WorkerOutcome,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Page {
    Posts(Vec<Post>),
    RateLimited,
    Unauthorized,
}

#[derive(Debug, Clone)]
struct SearchCall {
    entity: String,
    query: String,
    page_size: usize,
    at: Instant,
}

#[derive(Default)]
struct FakeSource {
    pages: Mutex<HashMap<String, VecDeque<Page>>>,
    comments: HashMap<String, Vec<Comment>>,
    failing_comments: HashSet<String>,
    /// Remaining rate-limited comment fetches per post.
    limited_comments: Mutex<HashMap<String, u32>>,
    searches: Mutex<Vec<SearchCall>>,
    comment_fetches: Mutex<Vec<(String, Instant)>>,
}

impl FakeSource {
    fn with_pages(self, entity: &str, pages: Vec<Page>) -> Self {
        self.pages.lock().insert(entity.to_string(), pages.into());
        self
    }

    fn with_comments(mut self, post_id: &str, comments: Vec<Comment>) -> Self {
        self.comments.insert(post_id.to_string(), comments);
        self
    }

    fn with_failing_comments(mut self, post_id: &str) -> Self {
        self.failing_comments.insert(post_id.to_string());
        self
    }

    fn with_rate_limited_comments(self, post_id: &str, times: u32) -> Self {
        self.limited_comments.lock().insert(post_id.to_string(), times);
        self
    }

    fn comment_fetches_for(&self, post_id: &str) -> Vec<Instant> {
        self.comment_fetches
            .lock()
            .iter()
            .filter(|(id, _)| id == post_id)
            .map(|(_, at)| *at)
            .collect()
    }

    fn searches_for(&self, entity: &str) -> Vec<SearchCall> {
        self.searches
            .lock()
            .iter()
            .filter(|c| c.entity == entity)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SearchSource for FakeSource {
    async fn search(
        &self,
        entity: &str,
        query: &str,
        page_size: usize,
        _cutoff: Cutoff,
        _sort: SearchSort,
    ) -> Result<Vec<Post>, GatherError> {
        self.searches.lock().push(SearchCall {
            entity: entity.to_string(),
            query: query.to_string(),
            page_size,
            at: Instant::now(),
        });
        let next = self
            .pages
            .lock()
            .get_mut(entity)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Page::Posts(posts)) => Ok(posts),
            Some(Page::RateLimited) => Err(GatherError::RateLimited {
                retry_after_secs: Some(60),
            }),
            Some(Page::Unauthorized) => Err(GatherError::Unauthorized("token refused".into())),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_comments(
        &self,
        post: &Post,
        _cutoff: Cutoff,
        _expansion_cap: usize,
    ) -> Result<Vec<Comment>, GatherError> {
        self.comment_fetches
            .lock()
            .push((post.id.clone(), Instant::now()));
        if let Some(left) = self.limited_comments.lock().get_mut(&post.id) {
            if *left > 0 {
                *left -= 1;
                return Err(GatherError::RateLimited {
                    retry_after_secs: None,
                });
            }
        }
        if self.failing_comments.contains(&post.id) {
            return Err(GatherError::Upstream("comment tree unavailable".into()));
        }
        Ok(self.comments.get(&post.id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeScorer {
    limited: HashSet<String>,
    unscorable: HashSet<String>,
    rejected: HashSet<String>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeScorer {
    fn calls_for(&self, text: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(t, _)| t == text)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl Scorer for FakeScorer {
    async fn score(&self, text: &str) -> Result<Option<FlatScores>, GatherError> {
        self.calls.lock().push((text.to_string(), Instant::now()));
        if self.limited.contains(text) {
            return Err(GatherError::RateLimited {
                retry_after_secs: None,
            });
        }
        if self.unscorable.contains(text) {
            return Ok(None);
        }
        if self.rejected.contains(text) {
            return Err(GatherError::Rejected("unsupported language".into()));
        }
        let mut scores = FlatScores {
            languages: vec!["en".to_string()],
            detected_languages: vec!["en".to_string()],
            ..FlatScores::default()
        };
        scores.attributes.insert(
            "toxicity".to_string(),
            AttributeScore {
                score: 0.5,
                span_begin: Some(0),
                span_end: Some(4),
            },
        );
        Ok(Some(scores))
    }
}

/// Rejects every batch containing a post or comment from one community.
struct RejectCommunity {
    inner: MemorySink,
    community: &'static str,
}

#[async_trait]
impl BatchSink for RejectCommunity {
    async fn ensure_header(
        &self,
        kind: TableKind,
        default_columns: &[String],
    ) -> Result<Vec<String>, GatherError> {
        self.inner.ensure_header(kind, default_columns).await
    }

    async fn append_rows(
        &self,
        kind: TableKind,
        rows: &[Record],
        columns: &[String],
    ) -> Result<(), GatherError> {
        if rows
            .iter()
            .any(|r| str_field(r, "community") == Some(self.community))
        {
            return Err(GatherError::Sink {
                kind,
                source: TableError::Io {
                    path: "posts.jsonl".to_string(),
                    source: std::io::Error::other("disk full"),
                },
            });
        }
        self.inner.append_rows(kind, rows, columns).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn post(id: &str, community: &str) -> Post {
    Post {
        id: id.to_string(),
        community: community.to_string(),
        created_utc: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        title: format!("title {id}"),
        selftext: format!("body {id}"),
        author: Some("poster".to_string()),
        score: 3,
        upvote_ratio: 0.9,
        num_comments: 0,
        permalink: format!("/r/{community}/comments/{id}/"),
        url: String::new(),
    }
}

fn comment(id: &str, post_id: &str, parent: ParentRef) -> Comment {
    Comment {
        id: id.to_string(),
        post_id: post_id.to_string(),
        parent,
        created_utc: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap(),
        body: format!("reply {id}"),
        author: Some("replier".to_string()),
        score: 1,
    }
}

fn settings() -> GatherSettings {
    GatherSettings {
        per_query_cap: 40,
        pacing_interval: Duration::from_millis(600),
        rate_limit_cooldown: Duration::from_secs(60),
        scoring_pacing_interval: Duration::from_millis(1100),
        scoring_cooldown: Duration::from_secs(10),
        grace_period: Duration::from_secs(5),
        ..GatherSettings::default()
    }
}

fn entities(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

fn column(push: &Push, name: &str) -> usize {
    push.columns
        .iter()
        .position(|c| c == name)
        .unwrap_or_else(|| panic!("missing column {name}"))
}

async fn run_gather(
    settings: GatherSettings,
    source: Arc<FakeSource>,
    scorer: Option<Arc<FakeScorer>>,
    sink: Arc<dyn BatchSink>,
    communities: &[&str],
    target: u64,
) -> (GatherSummary, Vec<String>) {
    let (log, lines) = RunLog::in_memory();
    let queries = QueryBuilder::new(&["alpha".to_string()], &["news".to_string()]).unwrap();
    let mut supervisor = GatherSupervisor::new(settings, source, sink, queries, log);
    if let Some(scorer) = scorer {
        supervisor = supervisor.with_scorer(scorer);
    }
    let run = supervisor
        .start(&entities(communities), target)
        .await
        .expect("run should start");
    let summary = run.wait().await;
    let lines = lines.lock().clone();
    (summary, lines)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn empty_page_consumes_whole_target_in_one_query() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(MemorySink::new());

    let (summary, _) = run_gather(settings(), Arc::clone(&source), None, sink.clone(), &["A"], 40).await;

    let report = &summary.reports[0];
    assert_eq!(report.queries, 1);
    assert_eq!(report.requested, 40);
    assert_eq!(report.outcome, WorkerOutcome::Completed);
    assert_eq!(summary.progress.per_entity["A"], 40);
    assert_eq!(source.searches_for("A").len(), 1);
    assert!(sink.pushes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn full_page_without_comments_is_one_post_push() {
    let posts: Vec<Post> = (0..10).map(|i| post(&format!("b{i}"), "B")).collect();
    let source = Arc::new(FakeSource::default().with_pages("B", vec![Page::Posts(posts)]));
    let sink = Arc::new(MemorySink::new());

    let (summary, _) = run_gather(settings(), Arc::clone(&source), None, sink.clone(), &["B"], 10).await;

    let post_pushes = sink.pushes_of(TableKind::Posts);
    assert_eq!(post_pushes.len(), 1);
    assert_eq!(post_pushes[0].rows.len(), 10);
    assert!(sink.pushes_of(TableKind::Comments).is_empty());
    assert_eq!(source.searches_for("B")[0].page_size, 10);
    assert_eq!(summary.reports[0].posts_saved, 10);
}

#[tokio::test(start_paused = true)]
async fn rows_carry_the_originating_query() {
    let source = Arc::new(
        FakeSource::default()
            .with_pages("C", vec![Page::Posts(vec![post("p1", "C")])])
            .with_comments(
                "p1",
                vec![
                    comment("c1", "p1", ParentRef::Post("p1".into())),
                    comment("c2", "p1", ParentRef::Comment("c1".into())),
                ],
            ),
    );
    let sink = Arc::new(MemorySink::new());

    run_gather(settings(), Arc::clone(&source), None, sink.clone(), &["C"], 5).await;

    let query = source.searches_for("C")[0].query.clone();
    assert_eq!(query, "alpha news");

    let posts = &sink.pushes_of(TableKind::Posts)[0];
    assert_eq!(posts.rows[0][column(posts, "query")], Value::from(query.clone()));

    let comments = &sink.pushes_of(TableKind::Comments)[0];
    assert_eq!(comments.rows.len(), 2);
    let parent = column(comments, "parent_id");
    assert_eq!(comments.rows[0][parent], Value::from("t3_p1"));
    assert_eq!(comments.rows[1][parent], Value::from("t1_c1"));
    for row in &comments.rows {
        assert_eq!(row[column(comments, "query")], Value::from(query.clone()));
    }
}

#[tokio::test(start_paused = true)]
async fn requested_count_reaches_target_over_partial_pages() {
    let few = |tag: &str| Page::Posts((0..3).map(|i| post(&format!("{tag}{i}"), "D")).collect());
    let source = Arc::new(FakeSource::default().with_pages("D", vec![few("x"), few("y"), few("z")]));
    let sink = Arc::new(MemorySink::new());

    let (summary, _) = run_gather(settings(), Arc::clone(&source), None, sink.clone(), &["D"], 100).await;

    let sizes: Vec<usize> = source.searches_for("D").iter().map(|c| c.page_size).collect();
    assert_eq!(sizes, vec![40, 40, 20]);
    assert!(summary.reports[0].requested >= 100);
    assert_eq!(summary.reports[0].posts_saved, 9);
    assert_eq!(sink.pushes_of(TableKind::Posts).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn scoring_rate_limited_twice_skips_only_that_post() {
    let source = Arc::new(FakeSource::default().with_pages(
        "E",
        vec![Page::Posts(vec![post("x", "E"), post("y", "E")])],
    ));
    let scorer = Arc::new(FakeScorer {
        limited: HashSet::from(["title x body x".to_string()]),
        ..FakeScorer::default()
    });
    let sink = Arc::new(MemorySink::new());

    let (_, lines) = run_gather(
        settings(),
        source,
        Some(Arc::clone(&scorer)),
        sink.clone(),
        &["E"],
        2,
    )
    .await;

    let posts = &sink.pushes_of(TableKind::Posts)[0];
    assert_eq!(posts.rows.len(), 1);
    assert_eq!(posts.rows[0][column(posts, "post_id")], Value::from("y"));
    assert_eq!(posts.rows[0][column(posts, "toxicity_score")], Value::from(0.5));

    let x_calls = scorer.calls_for("title x body x");
    assert_eq!(x_calls.len(), 2);
    let y_calls = scorer.calls_for("title y body y");
    let waited = y_calls[0] - x_calls[0];
    assert!(waited >= Duration::from_secs(20), "waited {waited:?}");
    assert!(waited < Duration::from_millis(20_500), "waited {waited:?}");

    let rate_limit_lines = lines
        .iter()
        .filter(|l| l.contains("Rate limited") && l.contains("post x"))
        .count();
    assert_eq!(rate_limit_lines, 2);
}

#[tokio::test(start_paused = true)]
async fn unscorable_text_keeps_the_row_without_scores() {
    let source = Arc::new(FakeSource::default().with_pages("F", vec![Page::Posts(vec![post("u", "F")])]));
    let scorer = Arc::new(FakeScorer {
        unscorable: HashSet::from(["title u body u".to_string()]),
        ..FakeScorer::default()
    });
    let sink = Arc::new(MemorySink::new());

    run_gather(settings(), source, Some(scorer), sink.clone(), &["F"], 1).await;

    let posts = &sink.pushes_of(TableKind::Posts)[0];
    assert_eq!(posts.rows.len(), 1);
    assert_eq!(posts.rows[0][column(posts, "toxicity_score")], Value::Null);
}

#[tokio::test(start_paused = true)]
async fn per_item_failure_drops_that_post_and_continues() {
    let source = Arc::new(
        FakeSource::default()
            .with_pages("G", vec![Page::Posts(vec![post("bad", "G"), post("good", "G")])])
            .with_failing_comments("bad"),
    );
    let sink = Arc::new(MemorySink::new());

    let (summary, lines) = run_gather(settings(), source, None, sink.clone(), &["G"], 2).await;

    let posts = &sink.pushes_of(TableKind::Posts)[0];
    assert_eq!(posts.rows.len(), 1);
    assert_eq!(posts.rows[0][column(posts, "post_id")], Value::from("good"));
    assert_eq!(summary.reports[0].outcome, WorkerOutcome::Completed);
    assert!(lines
        .iter()
        .any(|l| l.contains("LEVEL: ERROR") && l.contains("post bad")));
}

#[tokio::test(start_paused = true)]
async fn search_rate_limited_twice_skips_the_page() {
    let source = Arc::new(
        FakeSource::default().with_pages("H", vec![Page::RateLimited, Page::RateLimited]),
    );
    let sink = Arc::new(MemorySink::new());

    let (summary, lines) = run_gather(settings(), Arc::clone(&source), None, sink.clone(), &["H"], 40).await;

    let calls = source.searches_for("H");
    assert_eq!(calls.len(), 2);
    assert!(calls[1].at - calls[0].at >= Duration::from_secs(60));
    assert_eq!(summary.reports[0].requested, 40);
    assert_eq!(summary.reports[0].outcome, WorkerOutcome::Completed);
    assert_eq!(lines.iter().filter(|l| l.contains("Rate limited")).count(), 2);
    assert!(lines
        .iter()
        .filter(|l| l.contains("Rate limited"))
        .all(|l| l.contains("upstream asked for 60s")));
    assert!(sink.pushes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fatal_sink_error_ends_only_that_worker() {
    let source = Arc::new(
        FakeSource::default()
            .with_pages("bad", vec![Page::Posts(vec![post("b1", "bad")])])
            .with_pages("good", vec![Page::Posts(vec![post("g1", "good"), post("g2", "good")])]),
    );
    let sink = Arc::new(RejectCommunity {
        inner: MemorySink::new(),
        community: "bad",
    });

    let (summary, _) = run_gather(settings(), source, None, sink.clone(), &["bad", "good"], 40).await;

    assert_eq!(summary.failed, vec!["bad".to_string()]);
    assert!(!summary.all_failed());
    let good = summary
        .reports
        .iter()
        .find(|r| r.entity == "good")
        .unwrap();
    assert_eq!(good.outcome, WorkerOutcome::Completed);
    assert_eq!(good.posts_saved, 2);
    assert_eq!(sink.inner.pushes_of(TableKind::Posts).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_search_fails_every_worker() {
    let source = Arc::new(
        FakeSource::default()
            .with_pages("I", vec![Page::Unauthorized])
            .with_pages("J", vec![Page::Unauthorized]),
    );
    let sink = Arc::new(MemorySink::new());

    let (summary, _) = run_gather(settings(), source, None, sink, &["I", "J"], 40).await;

    assert!(summary.all_failed());
    assert!(summary
        .reports
        .iter()
        .all(|r| matches!(r.outcome, WorkerOutcome::Failed(_))));
}

#[tokio::test(start_paused = true)]
async fn consecutive_searches_are_paced_by_active_workers() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(MemorySink::new());

    run_gather(settings(), Arc::clone(&source), None, sink, &["K", "L"], 120).await;

    for entity in ["K", "L"] {
        let calls = source.searches_for(entity);
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            let gap = pair[1].at - pair[0].at;
            assert!(gap >= Duration::from_millis(1200), "{entity} gap {gap:?}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_workers_within_grace_period() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(MemorySink::new());
    let (log, _lines) = RunLog::in_memory();
    let queries = QueryBuilder::new(&["alpha".to_string()], &[]).unwrap();

    let run = GatherSupervisor::new(settings(), Arc::clone(&source) as Arc<dyn SearchSource>, sink, queries, log)
        .start(&entities(&["M", "N", "O"]), 1_000_000)
        .await
        .unwrap();

    let signal = run.shutdown_signal();
    let triggered_at = Arc::new(Mutex::new(None));
    let recorded = Arc::clone(&triggered_at);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        *recorded.lock() = Some(Instant::now());
        signal.trigger();
    });

    let summary = run.wait().await;
    let triggered_at = triggered_at.lock().expect("signal was sent");

    assert!(summary.cancelled);
    assert!(summary.unfinished.is_empty());
    assert_eq!(summary.reports.len(), 3);
    assert!(summary
        .reports
        .iter()
        .all(|r| r.outcome == WorkerOutcome::Cancelled));
    assert!(Instant::now() - triggered_at <= Duration::from_secs(5));
    assert!(source.searches.lock().iter().all(|c| c.at <= triggered_at));
}

#[tokio::test(start_paused = true)]
async fn comment_fetch_rate_limited_once_retries_after_cooldown() {
    let source = Arc::new(
        FakeSource::default()
            .with_pages("P", vec![Page::Posts(vec![post("p1", "P"), post("p2", "P")])])
            .with_comments("p1", vec![comment("c1", "p1", ParentRef::Post("p1".into()))])
            .with_rate_limited_comments("p1", 1),
    );
    let sink = Arc::new(MemorySink::new());

    let (summary, lines) = run_gather(settings(), Arc::clone(&source), None, sink.clone(), &["P"], 2).await;

    let fetches = source.comment_fetches_for("p1");
    assert_eq!(fetches.len(), 2);
    assert!(fetches[1] - fetches[0] >= Duration::from_secs(60));
    let posts = &sink.pushes_of(TableKind::Posts)[0];
    assert_eq!(posts.rows.len(), 2);
    let comments = &sink.pushes_of(TableKind::Comments)[0];
    assert_eq!(comments.rows.len(), 1);
    assert_eq!(comments.rows[0][column(comments, "comment_id")], Value::from("c1"));
    assert_eq!(summary.reports[0].comments_saved, 1);
    assert_eq!(
        lines
            .iter()
            .filter(|l| l.contains("Rate limited while fetching comments for post p1"))
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn comment_fetch_rate_limited_twice_drops_only_that_post() {
    let source = Arc::new(
        FakeSource::default()
            .with_pages("Q", vec![Page::Posts(vec![post("q1", "Q"), post("q2", "Q")])])
            .with_comments("q1", vec![comment("c1", "q1", ParentRef::Post("q1".into()))])
            .with_comments("q2", vec![comment("c2", "q2", ParentRef::Post("q2".into()))])
            .with_rate_limited_comments("q1", 2),
    );
    let sink = Arc::new(MemorySink::new());

    let (summary, lines) = run_gather(settings(), Arc::clone(&source), None, sink.clone(), &["Q"], 2).await;

    let q1 = source.comment_fetches_for("q1");
    let q2 = source.comment_fetches_for("q2");
    assert_eq!(q1.len(), 2);
    assert_eq!(q2.len(), 1);
    let waited = q2[0] - q1[0];
    assert!(waited >= Duration::from_secs(120), "waited {waited:?}");
    assert!(waited < Duration::from_secs(121), "waited {waited:?}");

    let posts = &sink.pushes_of(TableKind::Posts)[0];
    assert_eq!(posts.rows.len(), 1);
    assert_eq!(posts.rows[0][column(posts, "post_id")], Value::from("q2"));
    let comments = &sink.pushes_of(TableKind::Comments)[0];
    assert_eq!(comments.rows.len(), 1);
    assert_eq!(comments.rows[0][column(comments, "comment_id")], Value::from("c2"));
    assert_eq!(summary.reports[0].outcome, WorkerOutcome::Completed);
    assert!(lines
        .iter()
        .any(|l| l.contains("Skipping post q1 after repeated rate limiting")));
}

#[tokio::test(start_paused = true)]
async fn rejected_text_is_skipped_without_retry() {
    let source = Arc::new(
        FakeSource::default()
            .with_pages("R", vec![Page::Posts(vec![post("r1", "R"), post("r2", "R")])])
            .with_comments(
                "r2",
                vec![
                    comment("c1", "r2", ParentRef::Post("r2".into())),
                    comment("c2", "r2", ParentRef::Post("r2".into())),
                ],
            ),
    );
    let scorer = Arc::new(FakeScorer {
        rejected: HashSet::from(["title r1 body r1".to_string(), "reply c1".to_string()]),
        ..FakeScorer::default()
    });
    let sink = Arc::new(MemorySink::new());

    let (summary, lines) = run_gather(
        settings(),
        Arc::clone(&source),
        Some(Arc::clone(&scorer)),
        sink.clone(),
        &["R"],
        2,
    )
    .await;

    assert_eq!(scorer.calls_for("title r1 body r1").len(), 1);
    assert_eq!(scorer.calls_for("reply c1").len(), 1);
    assert!(source.comment_fetches_for("r1").is_empty());

    let posts = &sink.pushes_of(TableKind::Posts)[0];
    assert_eq!(posts.rows.len(), 1);
    assert_eq!(posts.rows[0][column(posts, "post_id")], Value::from("r2"));
    let comments = &sink.pushes_of(TableKind::Comments)[0];
    assert_eq!(comments.rows.len(), 1);
    assert_eq!(comments.rows[0][column(comments, "comment_id")], Value::from("c2"));
    assert_eq!(summary.reports[0].outcome, WorkerOutcome::Completed);
    assert!(lines
        .iter()
        .any(|l| l.contains("LEVEL: WARNING") && l.contains("Skipping post r1")));
    assert!(!lines.iter().any(|l| l.contains("Rate limited")));
}

#[tokio::test(start_paused = true)]
async fn duplicate_communities_are_rejected_before_any_worker_starts() {
    let source = Arc::new(FakeSource::default().with_pages("news", vec![Page::Unauthorized]));
    let (log, _lines) = RunLog::in_memory();
    let queries = QueryBuilder::new(&["alpha".to_string()], &[]).unwrap();

    let result = GatherSupervisor::new(
        settings(),
        Arc::clone(&source) as Arc<dyn SearchSource>,
        Arc::new(MemorySink::new()),
        queries,
        log,
    )
    .start(&entities(&["news", "News"]), 40)
    .await;

    assert!(matches!(result, Err(GatherError::Config(ref m)) if m.contains("duplicate")));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(source.searches.lock().is_empty());
}

#[test]
fn all_failed_compares_against_started_workers() {
    let summary = GatherSummary {
        workers: 2,
        reports: Vec::new(),
        failed: vec!["news".to_string()],
        unfinished: Vec::new(),
        progress: ProgressSnapshot {
            total: 40,
            target_total: 80,
            per_entity: [("news".to_string(), 40)].into_iter().collect(),
        },
        elapsed: Duration::from_secs(1),
        cancelled: false,
    };
    assert!(!summary.all_failed());

    let summary = GatherSummary {
        failed: vec!["news".to_string(), "science".to_string()],
        ..summary
    };
    assert!(summary.all_failed());
}
