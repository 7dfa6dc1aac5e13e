//! Request gate and HTTP source against a mock server

use comic_updater::config::HttpConfig;
use comic_updater::storage::{PageStore, SqliteStorage, UpdatePolicy};
use comic_updater::updater::{HttpSource, UpdateMode, Updater, WebSource};
use comic_updater::webpage::decode_image;
use comic_updater::{normalize_url, FetchError, RequestGate, UpdateResponse};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GIF_DATA_URI: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

fn source() -> (HttpSource, Arc<RequestGate>) {
    let gate = Arc::new(RequestGate::new(&HttpConfig::default()).unwrap());
    (HttpSource::new(Arc::clone(&gate)), gate)
}

/// PNG of the given size; different sizes give different digests
fn png(size: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::new_rgb8(size, size)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn comic_page(n: u32, last: u32) -> String {
    let mut html = String::from("<html><body>\n<a href=\"/\">Home</a>\n");
    if n > 0 {
        html.push_str(&format!("<a href=\"/comic/{}\" rel=\"prev\">Prev</a>\n", n - 1));
    }
    html.push_str(&format!("<img src=\"/img/{}.png\">\n", n));
    if n < last {
        html.push_str(&format!("<a href=\"/comic/{}\" rel=\"next\">Next</a>\n", n + 1));
    }
    html.push_str("</body></html>");
    html
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn mount_image(server: &MockServer, route: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(bytes),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_webpage_resolves_links() {
    let server = MockServer::start().await;
    mount_page(&server, "/comic/1", comic_page(1, 2)).await;
    let (source, gate) = source();

    let webpage = source
        .fetch_webpage(&format!("{}/comic/1", server.uri()))
        .await
        .unwrap();

    assert_eq!(webpage.url, format!("{}/comic/1", server.uri()));
    assert!(webpage
        .link_hrefs()
        .contains(&format!("{}/comic/2", server.uri())));
    assert_eq!(webpage.images, vec![format!("{}/img/1.png", server.uri())]);
    assert_eq!(gate.active_tokens(), 0);
}

#[tokio::test]
async fn test_fetch_webpage_reports_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/comic/2"))
        .mount(&server)
        .await;
    mount_page(&server, "/comic/2", comic_page(2, 2)).await;
    let (source, _gate) = source();

    let webpage = source
        .fetch_webpage(&format!("{}/latest", server.uri()))
        .await
        .unwrap();

    assert_eq!(webpage.url, format!("{}/comic/2", server.uri()));
}

#[tokio::test]
async fn test_fetch_webpage_not_found() {
    let server = MockServer::start().await;
    let (source, gate) = source();

    let result = source
        .fetch_webpage(&format!("{}/missing", server.uri()))
        .await;

    assert_eq!(result, Err(FetchError::Http { status_code: 404 }));
    assert_eq!(gate.active_tokens(), 0);
}

#[tokio::test]
async fn test_fetch_images_skips_failures() {
    let server = MockServer::start().await;
    mount_image(&server, "/img/good.png", png(3)).await;
    Mock::given(method("GET"))
        .and(path("/img/broken.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_image(&server, "/img/garbage.png", b"not an image".to_vec()).await;
    let (source, _gate) = source();

    let urls = vec![
        format!("{}/img/broken.png", server.uri()),
        format!("{}/img/good.png", server.uri()),
        format!("{}/img/garbage.png", server.uri()),
        GIF_DATA_URI.to_string(),
    ];
    let images = source.fetch_images(&urls).await.unwrap();

    assert_eq!(images.len(), 2);
    assert_eq!(images[0].src, urls[1]);
    assert_eq!(images[0].mime, "image/png");
    assert_eq!((images[0].width, images[0].height), (3, 3));
    assert_eq!(images[0].hash.len(), 64);
    assert_eq!(images[1].mime, "image/gif");
    assert_eq!((images[1].width, images[1].height), (1, 1));
}

#[tokio::test]
async fn test_cacheable_response_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/comic/0"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "public, max-age=600")
                .set_body_string(comic_page(0, 1)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let (source, gate) = source();
    let url = format!("{}/comic/0", server.uri());

    let first = source.fetch_webpage(&url).await.unwrap();
    let second = source.fetch_webpage(&url).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(gate.cache().len(), 1);
}

#[tokio::test]
async fn test_single_page_update_over_http() {
    let server = MockServer::start().await;
    for n in 0..=2 {
        mount_page(&server, &format!("/comic/{}", n), comic_page(n, 2)).await;
        mount_image(&server, &format!("/img/{}.png", n), png(n + 4)).await;
    }

    let mut store = SqliteStorage::open_in_memory().unwrap();
    let comic_url = normalize_url(&format!("{}/comic/0", server.uri())).unwrap();
    let comic = store
        .create_comic(comic_url.as_str(), UpdatePolicy::default())
        .unwrap();
    for n in 0..=1 {
        let url = normalize_url(&format!("{}/comic/{}", server.uri(), n)).unwrap();
        let src = format!("{}/img/{}.png", server.uri(), n);
        let image = decode_image(&src, png(n + 4)).unwrap();
        store.insert_page(comic.id, url.as_str(), &image).unwrap();
    }

    let (source, gate) = source();
    let settings = comic_updater::config::UpdaterConfig {
        probe_delay_ms: 0,
        page_delay_ms: 0,
        ..Default::default()
    };
    let updater = Updater::new(Arc::new(source), Arc::new(Mutex::new(store)), settings);

    let response = updater.run(comic.id, UpdateMode::SinglePage).await.unwrap();

    assert_eq!(response, UpdateResponse::success("Successfully fetched page 3"));
    let pages = updater.store().lock().unwrap().get_pages(comic.id).unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[2].url, format!("{}/comic/2", server.uri()));
    assert_eq!(pages[2].image.src, format!("{}/img/2.png", server.uri()));
    assert_eq!(pages[2].image.mime, "image/png");
    assert_eq!((pages[2].image.width, pages[2].image.height), (6, 6));
    assert_eq!(gate.active_tokens(), 0);
}

/// An updater over a real gate with one comic rooted at `/comic/0` and no
/// stored pages
fn updater_over_gate(
    server: &MockServer,
    http: &HttpConfig,
) -> (Updater, Arc<RequestGate>, i64) {
    let gate = Arc::new(RequestGate::new(http).unwrap());
    let mut store = SqliteStorage::open_in_memory().unwrap();
    let comic_url = normalize_url(&format!("{}/comic/0", server.uri())).unwrap();
    let comic = store
        .create_comic(comic_url.as_str(), UpdatePolicy::default())
        .unwrap();

    let updater = Updater::new(
        Arc::new(HttpSource::new(Arc::clone(&gate))),
        Arc::new(Mutex::new(store)),
        Default::default(),
    );
    (updater, gate, comic.id)
}

async fn mount_slow_page(server: &MockServer, route: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(comic_page(0, 1))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_slow_server_times_out_run() {
    let server = MockServer::start().await;
    mount_slow_page(&server, "/comic/0", Duration::from_secs(5)).await;
    let http = HttpConfig {
        timeout_secs: 1,
        ..HttpConfig::default()
    };
    let (updater, gate, comic) = updater_over_gate(&server, &http);

    let response = updater.run(comic, UpdateMode::SinglePage).await.unwrap();

    assert_eq!(response, UpdateResponse::Timeout);
    assert!(updater.store().lock().unwrap().get_pages(comic).unwrap().is_empty());
    assert_eq!(gate.active_tokens(), 0);
}

#[tokio::test]
async fn test_stop_aborts_in_flight_fetch() {
    let server = MockServer::start().await;
    mount_slow_page(&server, "/comic/0", Duration::from_secs(5)).await;
    let (updater, gate, comic) = updater_over_gate(&server, &HttpConfig::default());

    let started = Instant::now();
    let handle = updater.start(comic, UpdateMode::SinglePage).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(gate.active_tokens(), 1);
    assert!(updater.stop(comic));

    let response = handle.await.unwrap();

    assert_eq!(response, UpdateResponse::Canceled);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(gate.active_tokens(), 0);
    assert!(!updater.is_running(comic));
}
