//! End-to-end crawl tests driving the real worker pool, probe gateway and
//! store against a fake rendering probe implemented as a shell script.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use vantage::config::{Options, OutputMode};
use vantage::crawler::{self, SeedContext};
use vantage::model::{CrawlResult, Request, RequestType};
use vantage::storage::CrawlStore;

/// Writes a fake probe script; the crawler invokes it through `sh`, so no
/// executable bit is needed. The page URL is always the last argument.
fn write_probe(dir: &Path, body: &str) -> PathBuf {
    let script = dir.join("probe.sh");
    let content = format!("#!/bin/sh\nfor last; do :; done\n{body}\n");
    std::fs::write(&script, content).unwrap();
    script
}

fn options_for(probe_script: &Path, allowed_domain: &str) -> Options {
    Options {
        probe_cmd: vec![
            "sh".to_string(),
            probe_script.to_string_lossy().into_owned(),
        ],
        allowed_domains: vec![allowed_domain.to_string()],
        num_workers: 2,
        process_timeout: 20,
        fallback_fetch: false,
        ..Options::default()
    }
}

fn seed_request(url: &str) -> Request {
    Request::root(RequestType::Link, "GET", url)
}

async fn crawl(
    options: Options,
    store: &CrawlStore,
    seed_url: &str,
    start: Vec<Request>,
    done: Vec<Request>,
) -> crawler::CrawlSummary {
    let seed_ctx = Arc::new(SeedContext::new(Url::parse(seed_url).unwrap()));
    crawler::run_crawl(Arc::new(options), store, seed_ctx, start, done)
        .await
        .unwrap()
}

fn row_flags(store: &CrawlStore, url: &str) -> Option<(bool, bool, String)> {
    let conn = Connection::open(store.path()).unwrap();
    conn.query_row(
        "SELECT crawled, out_of_scope, IFNULL(crawler_errors, '') FROM request WHERE url = ?1",
        [url],
        |row| {
            Ok((
                row.get::<_, i64>(0)? != 0,
                row.get::<_, i64>(1)? != 0,
                row.get::<_, String>(2)?,
            ))
        },
    )
    .ok()
}

#[tokio::test(flavor = "multi_thread")]
async fn crawl_explores_graph_and_terminates() {
    let dir = TempDir::new().unwrap();
    let probe = write_probe(
        dir.path(),
        r#"case "$last" in
  */a) cat <<'EOF'
[["html", "<html>page a</html>"],
 ["cookies", [{"name": "sid", "value": "abc"}]],
 ["request", {"type": "link", "method": "GET", "url": "http://spider.test/b"}],
 ["request", {"type": "xhr", "method": "POST", "url": "http://spider.test/api", "data": "q=1"}],
 ["user", {"note": "saw a login form"}],
 {"status": "ok"}]
EOF
  ;;
  */b) cat <<'EOF'
[["request", {"type": "link", "method": "GET", "url": "http://spider.test/c"}],
 ["request", {"type": "link", "method": "GET", "url": "http://evil.test/x"}],
 {"status": "ok"}]
EOF
  ;;
  *) echo '[{"status":"ok"}]' ;;
esac"#,
    );

    let store = CrawlStore::prepare(&dir.path().join("crawl.db"), OutputMode::Rename).unwrap();
    let options = options_for(&probe, "spider.test");

    let summary = crawl(
        options,
        &store,
        "http://spider.test/a",
        vec![seed_request("http://spider.test/a")],
        vec![],
    )
    .await;

    // a, b and c are dispatched; the xhr is recorded but never navigated,
    // the out-of-scope link is recorded but never enqueued
    assert_eq!(summary.completed, 3);
    assert!(!summary.interrupted);
    assert_eq!(summary.end_cookies.len(), 1);
    assert_eq!(store.count_requests().unwrap(), 5);

    let (crawled, oos, _) = row_flags(&store, "http://spider.test/c").unwrap();
    assert!(crawled);
    assert!(!oos);

    let (crawled, oos, _) = row_flags(&store, "http://evil.test/x").unwrap();
    assert!(!crawled);
    assert!(oos);

    let (crawled, oos, _) = row_flags(&store, "http://spider.test/api").unwrap();
    assert!(!crawled);
    assert!(!oos);

    // lineage: b's parent edge points at a
    let conn = Connection::open(store.path()).unwrap();
    let edges: i64 = conn
        .query_row("SELECT COUNT(*) FROM request_child", [], |row| row.get(0))
        .unwrap();
    assert_eq!(edges, 4);

    // the annotation emitted by the probe survived into a's row
    let user_output: String = conn
        .query_row(
            "SELECT user_output FROM request WHERE url = 'http://spider.test/a'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(user_output.contains("login form"));
}

#[tokio::test(flavor = "multi_thread")]
async fn depth_bound_forces_termination_on_infinite_graph() {
    let dir = TempDir::new().unwrap();
    let probe = write_probe(
        dir.path(),
        r#"n=${last##*/d}
next=$((n+1))
printf '[["request",{"type":"link","method":"GET","url":"http://spider.test/d%s"}],{"status":"ok"}]' "$next""#,
    );

    let store = CrawlStore::prepare(&dir.path().join("crawl.db"), OutputMode::Rename).unwrap();
    let options = Options {
        max_depth: 3,
        ..options_for(&probe, "spider.test")
    };

    let summary = crawl(
        options,
        &store,
        "http://spider.test/d0",
        vec![seed_request("http://spider.test/d0")],
        vec![],
    )
    .await;

    // d0..d3 crawled, d4 rejected at admission with a terminal result
    assert_eq!(summary.completed, 4);
    let (crawled, _, errors) = row_flags(&store, "http://spider.test/d4").unwrap();
    assert!(!crawled);
    assert!(errors.contains("crawler_depth_limit_reached"));
    assert!(row_flags(&store, "http://spider.test/d5").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn redirect_bound_rejects_chain() {
    let dir = TempDir::new().unwrap();
    let probe = write_probe(
        dir.path(),
        r#"n=${last##*/r}
next=$((n+1))
printf '[{"status":"ok","redirect":"http://spider.test/r%s"}]' "$next""#,
    );

    let store = CrawlStore::prepare(&dir.path().join("crawl.db"), OutputMode::Rename).unwrap();
    let options = Options {
        max_redirects: 2,
        ..options_for(&probe, "spider.test")
    };

    let summary = crawl(
        options,
        &store,
        "http://spider.test/r0",
        vec![seed_request("http://spider.test/r0")],
        vec![],
    )
    .await;

    // r0 -> r1 (1 hop) -> r2 (2 hops) crawled; r3 exceeds the bound
    assert_eq!(summary.completed, 3);
    let (crawled, _, errors) = row_flags(&store, "http://spider.test/r3").unwrap();
    assert!(!crawled);
    assert!(errors.contains("too_many_redirects"));
    assert!(row_flags(&store, "http://spider.test/r4").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_start_set_terminates_immediately() {
    let dir = TempDir::new().unwrap();
    let probe = write_probe(dir.path(), r#"echo '[{"status":"ok"}]'"#);
    let store = CrawlStore::prepare(&dir.path().join("crawl.db"), OutputMode::Rename).unwrap();

    let summary = crawl(
        options_for(&probe, "spider.test"),
        &store,
        "http://spider.test/",
        vec![],
        vec![],
    )
    .await;

    assert_eq!(summary.completed, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn probe_failure_falls_back_to_direct_fetch() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"<a href="/found-by-fallback">next</a>"#.as_bytes(), "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/found-by-fallback"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    // this probe never produces decodable output
    let probe = write_probe(dir.path(), "echo 'not json at all'; exit 1");

    let store = CrawlStore::prepare(&dir.path().join("crawl.db"), OutputMode::Rename).unwrap();
    let options = Options {
        fallback_fetch: true,
        ..options_for(&probe, "127.0.0.1")
    };

    let seed_url = format!("{}/start", server.uri());
    let summary = crawl(
        options,
        &store,
        &seed_url,
        vec![seed_request(&seed_url)],
        vec![],
    )
    .await;

    assert_eq!(summary.completed, 2);
    let (crawled, _, errors) = row_flags(&store, &seed_url).unwrap();
    assert!(crawled);
    assert!(errors.contains("probe_failure"));
    assert!(row_flags(&store, &format!("{}/found-by-fallback", server.uri())).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn resume_reseeds_unfinished_work_without_duplicating_rows() {
    let dir = TempDir::new().unwrap();
    let store = CrawlStore::prepare(&dir.path().join("crawl.db"), OutputMode::Overwrite).unwrap();

    // simulate an interrupted earlier run: A crawled, B discovered but
    // never dispatched
    let mut a = seed_request("http://spider.test/a");
    {
        let batch = store.batch().unwrap();
        batch.save_request(&mut a).unwrap();
        let result = CrawlResult::new(Arc::new(a.clone()));
        batch.save_result(&result, true).unwrap();

        let mut b = Request::child(&a, RequestType::Link, "GET", "http://spider.test/b");
        batch.save_request(&mut b).unwrap();
        batch.commit().unwrap();
    }
    assert_eq!(store.count_requests().unwrap(), 2);

    let (start, done) = crawler::reopen_start_set(
        &store,
        OutputMode::Resume,
        seed_request("http://spider.test/a"),
    )
    .unwrap();

    // exactly the unfinished request plus the reopened seed, nothing done
    let urls: Vec<&str> = start.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(start.len(), 2);
    assert!(urls.contains(&"http://spider.test/a"));
    assert!(urls.contains(&"http://spider.test/b"));
    assert!(done.is_empty());

    // now actually crawl: B leads to C, everything else is a leaf
    let probe = write_probe(
        dir.path(),
        r#"case "$last" in
  */b) echo '[["request",{"type":"link","method":"GET","url":"http://spider.test/c"}],{"status":"ok"}]' ;;
  *) echo '[{"status":"ok"}]' ;;
esac"#,
    );
    let summary = crawl(
        options_for(&probe, "spider.test"),
        &store,
        "http://spider.test/a",
        start,
        done,
    )
    .await;

    assert_eq!(summary.completed, 3);
    // A's row was reused, not duplicated
    let conn = Connection::open(store.path()).unwrap();
    let a_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM request WHERE url = 'http://spider.test/a'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(a_rows, 1);
    let (crawled, _, _) = row_flags(&store, "http://spider.test/c").unwrap();
    assert!(crawled);
}

#[tokio::test(flavor = "multi_thread")]
async fn complete_mode_ignores_previously_discovered_requests() {
    let dir = TempDir::new().unwrap();
    let store = CrawlStore::prepare(&dir.path().join("crawl.db"), OutputMode::Overwrite).unwrap();

    let mut a = seed_request("http://spider.test/a");
    {
        let batch = store.batch().unwrap();
        batch.save_request(&mut a).unwrap();
        let result = CrawlResult::new(Arc::new(a.clone()));
        batch.save_result(&result, true).unwrap();

        let mut b = Request::child(&a, RequestType::Link, "GET", "http://spider.test/b");
        batch.save_request(&mut b).unwrap();
        batch.commit().unwrap();
    }

    let (start, _done) = crawler::reopen_start_set(
        &store,
        OutputMode::Complete,
        seed_request("http://spider.test/a"),
    )
    .unwrap();

    // only the supplied seed comes back, not the leftover B
    assert_eq!(start.len(), 1);
    assert_eq!(start[0].url, "http://spider.test/a");
}

#[tokio::test(flavor = "multi_thread")]
async fn near_duplicate_pages_have_their_children_suppressed() {
    let dir = TempDir::new().unwrap();
    // every page renders the same template but links to a fresh target
    let probe = write_probe(
        dir.path(),
        r#"n=${last##*/p}
next=$((n+1))
printf '[["html","<html><body>identical catalogue page with many shared words</body></html>"],["request",{"type":"link","method":"GET","url":"http://spider.test/p%s"}],{"status":"ok"}]' "$next""#,
    );

    let store = CrawlStore::prepare(&dir.path().join("crawl.db"), OutputMode::Rename).unwrap();
    let options = Options {
        skip_duplicate_content: true,
        ..options_for(&probe, "spider.test")
    };

    let summary = crawl(
        options,
        &store,
        "http://spider.test/p0",
        vec![seed_request("http://spider.test/p0")],
        vec![],
    )
    .await;

    // p0 is fresh and spawns p1; p1 renders the same page, so its child
    // is cut and the crawl stops
    assert_eq!(summary.completed, 2);
    assert!(row_flags(&store, "http://spider.test/p2").is_none());
}
