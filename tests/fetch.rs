use reqwest::StatusCode;
use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};
use tile_prefetcher::{
    fetch_with, BoundingBox, Config, FetchOptions, FetchOutcome, Preset, RemoteError, Tile,
    TileClient, TileResponse, TransportError, UrlFormat,
};
use walkdir::WalkDir;

const URL: &str = "http://tiles.test/{z}/{x}/{y}.{ext}";
const PNG: &[u8] = b"\x89PNG fake tile";

type Reply = Result<TileResponse, TransportError>;

/// Tile server answering from per-URL scripts, falling back to a fixed reply.
struct ScriptedServer {
    fallback: Reply,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedServer {
    fn new(fallback: Reply) -> Self {
        Self {
            fallback,
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn serving_tiles() -> Self {
        Self::new(ok())
    }

    fn script(&self, url: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_owned(), replies.into());
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl TileClient for ScriptedServer {
    async fn get(&self, url: &str) -> Reply {
        self.requests.lock().unwrap().push(url.to_owned());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|replies| replies.pop_front());
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

fn ok() -> Reply {
    Ok(TileResponse {
        status: StatusCode::OK,
        body: PNG.to_vec(),
    })
}

fn status(status: StatusCode) -> Reply {
    Ok(TileResponse {
        status,
        body: Vec::new(),
    })
}

fn unreachable_host() -> Reply {
    Err(TransportError("connection refused".to_owned()))
}

/// Antananarivo city centre at zoom 10 to 12, nine tiles.
fn config(root: &Path) -> Config {
    let mut cfg = Config::new(BoundingBox::from(Preset::Antananarivo), 10, 12);
    cfg.output_folder = root.to_owned();
    cfg.url = UrlFormat::with_subdomains(URL.to_owned(), Vec::new());
    cfg.delay = Duration::ZERO;
    cfg.retry_delay = Duration::ZERO;
    cfg
}

fn opts(max_attempts: u8) -> FetchOptions<'static> {
    FetchOptions {
        extension: "png",
        max_attempts,
        retry_delay: Duration::ZERO,
        force: false,
    }
}

fn url_of(tile: &Tile) -> String {
    format!("http://tiles.test/{}/{}/{}.png", tile.z, tile.x, tile.y)
}

fn temp_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "tmp"))
        .count()
}

#[tokio::test]
async fn second_run_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let server = ScriptedServer::serving_tiles();

    let first = fetch_with(&server, &cfg).await.unwrap();
    assert_eq!(first.downloaded, 9);
    assert_eq!(first.total() as u64, cfg.tile_count());
    assert_eq!(first.bytes_written, 9 * PNG.len() as u64);
    assert_eq!(server.request_count(), 9);

    for tile in cfg.tiles() {
        assert_eq!(std::fs::read(tile.path(dir.path(), "png")).unwrap(), PNG);
    }

    let second = fetch_with(&server, &cfg).await.unwrap();
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 9);
    assert_eq!(server.request_count(), 9, "cached tiles must not be requested");
}

#[tokio::test]
async fn empty_file_is_fetched_again() {
    let dir = tempfile::tempdir().unwrap();
    let server = ScriptedServer::serving_tiles();
    let tile = Tile::new(647, 566, 10);
    let path = tile.path(dir.path(), "png");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"").unwrap();

    let url_fmt = UrlFormat::with_subdomains(URL.to_owned(), Vec::new());
    let report = tile
        .fetch_from(&server, &url_fmt, dir.path(), opts(3))
        .await
        .unwrap();

    assert_eq!(report.outcome, FetchOutcome::Downloaded);
    assert_eq!(std::fs::read(&path).unwrap(), PNG);
}

#[tokio::test]
async fn force_refetches_cached_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    let server = ScriptedServer::serving_tiles();

    fetch_with(&server, &cfg).await.unwrap();
    cfg.force = true;
    let again = fetch_with(&server, &cfg).await.unwrap();

    assert_eq!(again.downloaded, 9);
    assert_eq!(server.request_count(), 18);
}

#[tokio::test]
async fn missing_tile_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let server = ScriptedServer::new(status(StatusCode::NOT_FOUND));
    let tile = Tile::new(1294, 1133, 11);
    let url_fmt = UrlFormat::with_subdomains(URL.to_owned(), Vec::new());

    let report = tile
        .fetch_from(&server, &url_fmt, dir.path(), opts(3))
        .await
        .unwrap();

    assert_eq!(report.outcome, FetchOutcome::NotFound);
    assert_eq!(server.request_count(), 1, "404 is never retried");
    assert!(!tile.path(dir.path(), "png").exists());
}

#[tokio::test]
async fn transient_failure_then_success() {
    let dir = tempfile::tempdir().unwrap();
    let server = ScriptedServer::serving_tiles();
    let tile = Tile::new(2588, 2265, 12);
    server.script(
        &url_of(&tile),
        vec![status(StatusCode::SERVICE_UNAVAILABLE), unreachable_host()],
    );
    let url_fmt = UrlFormat::with_subdomains(URL.to_owned(), Vec::new());

    let report = tile
        .fetch_from(&server, &url_fmt, dir.path(), opts(3))
        .await
        .unwrap();

    assert_eq!(report.outcome, FetchOutcome::Downloaded);
    assert_eq!(server.request_count(), 3);
    assert_eq!(std::fs::read(tile.path(dir.path(), "png")).unwrap(), PNG);
}

#[tokio::test]
async fn exhausted_retries_leave_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let server = ScriptedServer::new(status(StatusCode::BAD_GATEWAY));
    let tile = Tile::new(2588, 2265, 12);
    let url_fmt = UrlFormat::with_subdomains(URL.to_owned(), Vec::new());

    let report = tile
        .fetch_from(&server, &url_fmt, dir.path(), opts(3))
        .await
        .unwrap();

    assert_eq!(report.outcome, FetchOutcome::Error);
    assert!(matches!(report.error, Some(RemoteError::Transient(_))));
    assert_eq!(server.request_count(), 3);
    assert!(!tile.path(dir.path(), "png").exists());
    assert_eq!(temp_files(dir.path()), 0);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let server = ScriptedServer::new(status(StatusCode::FORBIDDEN));
    let tile = Tile::new(647, 566, 10);
    let url_fmt = UrlFormat::with_subdomains(URL.to_owned(), Vec::new());

    let report = tile
        .fetch_from(&server, &url_fmt, dir.path(), opts(3))
        .await
        .unwrap();

    assert_eq!(report.outcome, FetchOutcome::Error);
    assert_eq!(report.error, Some(RemoteError::Client(StatusCode::FORBIDDEN)));
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn remote_failures_do_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let server = ScriptedServer::serving_tiles();
    let mut tiles = cfg.tiles();
    let missing = tiles.next().unwrap();
    let broken = tiles.next().unwrap();
    server.script(&url_of(&missing), vec![status(StatusCode::NOT_FOUND)]);
    server.script(
        &url_of(&broken),
        vec![unreachable_host(), unreachable_host(), unreachable_host()],
    );

    let summary = fetch_with(&server, &cfg).await.unwrap();

    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.downloaded, 7);
    assert!(!broken.path(dir.path(), "png").exists());
}

#[tokio::test]
async fn concurrency_bound_holds() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::new(BoundingBox::from(Preset::Antananarivo), 10, 13);
    cfg.output_folder = dir.path().to_owned();
    cfg.url = UrlFormat::with_subdomains(URL.to_owned(), Vec::new());
    cfg.delay = Duration::from_millis(5);
    cfg.concurrency = 2;

    let mut server = ScriptedServer::serving_tiles();
    server.latency = Duration::from_millis(20);

    let summary = fetch_with(&server, &cfg).await.unwrap();

    assert_eq!(summary.downloaded, 24);
    let peak = server.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "at most two requests in flight, saw {}", peak);
}

#[tokio::test]
async fn throttle_follows_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.delay = Duration::from_millis(20);

    let started = std::time::Instant::now();
    fetch_with(&ScriptedServer::serving_tiles(), &cfg)
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(9 * 20));
}

#[tokio::test]
async fn throttle_is_per_worker() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::new(BoundingBox::from(Preset::Antananarivo), 10, 13);
    cfg.output_folder = dir.path().to_owned();
    cfg.url = UrlFormat::with_subdomains(URL.to_owned(), Vec::new());
    cfg.retry_delay = Duration::ZERO;
    cfg.delay = Duration::from_millis(40);
    cfg.concurrency = 2;

    let started = std::time::Instant::now();
    let summary = fetch_with(&ScriptedServer::serving_tiles(), &cfg)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // 24 downloads over two workers: twelve pauses each
    assert_eq!(summary.downloaded, 24);
    assert!(elapsed >= Duration::from_millis(12 * 40), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(24 * 40), "took {:?}", elapsed);
}

#[tokio::test]
async fn no_throttle_without_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.delay = Duration::from_secs(30);
    let server = ScriptedServer::new(status(StatusCode::NOT_FOUND));

    let summary = tokio::time::timeout(Duration::from_secs(10), fetch_with(&server, &cfg))
        .await
        .expect("404s must not be throttled")
        .unwrap();
    assert_eq!(summary.not_found, 9);
}

#[tokio::test]
async fn unwritable_output_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    // a file where the zoom directory belongs
    std::fs::write(dir.path().join("10"), b"in the way").unwrap();

    let res = fetch_with(&ScriptedServer::serving_tiles(), &cfg).await;
    assert!(res.is_err());
}

#[tokio::test]
async fn output_root_must_be_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("tiles");
    std::fs::write(&root, b"").unwrap();

    let res = fetch_with(&ScriptedServer::serving_tiles(), &config(&root)).await;
    assert!(res.is_err());
}
