//! End-to-end enrichment scenarios over real HTTP (httpmock) and mock
//! rendering.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use link_preview::testing::jpeg_fixture;
use link_preview::{
    EnrichConfig, EnrichOutcome, Enricher, EnrichmentWorker, ErrorClass, FsBlobStore, HttpFetcher,
    ImageRef, ImageSource, LinkRecord, MemoryBlobStore, MemoryStore, MockFetcher, MockRenderer,
    RecordId, RecordStore, Stage, WorkerConfig,
};
use tokio_util::sync::CancellationToken;

type HttpEnricher = Enricher<MemoryStore, MemoryBlobStore, HttpFetcher, MockRenderer>;

fn http_enricher(records: Vec<LinkRecord>, renderer: MockRenderer, config: EnrichConfig) -> HttpEnricher {
    Enricher::with_config(
        Arc::new(MemoryStore::with_records(records)),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(HttpFetcher::new().unwrap()),
        Arc::new(renderer),
        config,
    )
}

fn dimensions(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}

const OG_PAGE: &str = r#"<!doctype html>
<html><head>
  <title>Document Title</title>
  <meta property="og:title" content="Hello">
  <meta property="og:description" content="A page about things">
  <meta property="og:image" content="/img.jpg">
</head><body><p>content</p></body></html>"#;

#[tokio::test]
async fn lightweight_path_produces_bounded_thumbnail_without_rendering() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body(OG_PAGE);
        })
        .await;
    let image_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/img.jpg");
            then.status(200)
                .header("content-type", "image/jpeg")
                .body(jpeg_fixture(2000, 1000));
        })
        .await;

    let record = LinkRecord::new(1, server.url("/post"));
    let enricher = http_enricher(vec![record.clone()], MockRenderer::new(), EnrichConfig::default());

    let outcome = enricher.process(&record).await;

    image_mock.assert_async().await;
    assert_eq!(
        outcome,
        EnrichOutcome::Lightweight {
            image: ImageRef("preview_1.jpg".into())
        }
    );

    let saved = enricher.store().get(RecordId(1)).await.unwrap().unwrap();
    assert_eq!(saved.title.as_deref(), Some("Hello"));
    assert_eq!(saved.description.as_deref(), Some("A page about things"));
    assert!(saved.domain.is_some());
    assert!(saved.processed_at.is_some());
    assert_eq!(saved.image, Some(ImageRef("preview_1.jpg".into())));

    let bytes = enricher.blobs().get(&ImageRef("preview_1.jpg".into())).unwrap();
    assert_eq!(dimensions(&bytes), (600, 300));
    assert_eq!(enricher.renderer().call_count(), 0);
}

#[tokio::test]
async fn legacy_charset_page_stores_decoded_title() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/latin1");
            then.status(200)
                .header("content-type", "text/html; charset=iso-8859-1")
                .body(&b"<html><head><title>Caf\xE9 M\xFCller</title>\
                    <meta property=\"og:image\" content=\"/img.jpg\"></head></html>"[..]);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/img.jpg");
            then.status(200)
                .header("content-type", "image/jpeg")
                .body(jpeg_fixture(320, 200));
        })
        .await;

    let record = LinkRecord::new(6, server.url("/latin1"));
    let enricher = http_enricher(vec![record.clone()], MockRenderer::new(), EnrichConfig::default());

    let outcome = enricher.process(&record).await;

    assert!(matches!(outcome, EnrichOutcome::Lightweight { .. }));
    let saved = enricher.store().get(RecordId(6)).await.unwrap().unwrap();
    assert_eq!(saved.title.as_deref(), Some("Café Müller"));
}

#[tokio::test]
async fn missing_og_image_falls_back_and_overwrites_metadata() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post");
            then.status(200)
                .header("content-type", "text/html")
                .body(OG_PAGE);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/img.jpg");
            then.status(404);
        })
        .await;

    let url = server.url("/post");
    let record = LinkRecord::new(2, url.clone());
    let renderer = MockRenderer::new().with_screenshot(&url, "Rendered Title", 1200, 630);
    let enricher = http_enricher(vec![record.clone()], renderer, EnrichConfig::default());

    let outcome = enricher.process(&record).await;

    assert_eq!(
        outcome,
        EnrichOutcome::Fallback {
            image: ImageRef("pageimg_2.jpg".into()),
            source: ImageSource::Screenshot,
        }
    );

    let saved = enricher.store().get(RecordId(2)).await.unwrap().unwrap();
    assert_eq!(saved.title.as_deref(), Some("Rendered Title"));
    assert_eq!(saved.description.as_deref(), Some(""));
    assert!(saved.processed_at.is_some());

    let bytes = enricher.blobs().get(&ImageRef("pageimg_2.jpg".into())).unwrap();
    assert_eq!(dimensions(&bytes), (600, 315));
    assert_eq!(enricher.renderer().call_count(), 1);
}

#[tokio::test]
async fn timeouts_on_both_paths_leave_record_pending() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(2)).body(OG_PAGE);
        })
        .await;

    let url = server.url("/slow");
    let record = LinkRecord::new(3, url.clone());
    let renderer = MockRenderer::new().timeout_url(url.clone());
    let config = EnrichConfig::default().with_page_timeout(Duration::from_millis(200));
    let enricher = http_enricher(vec![record.clone()], renderer, config);

    let outcome = enricher.process(&record).await;

    match outcome {
        EnrichOutcome::Pending { stage, class, .. } => {
            assert_eq!(stage, Stage::Render);
            assert_eq!(class, ErrorClass::Render);
        }
        other => panic!("expected pending, got {other:?}"),
    }

    let saved = enricher.store().get(RecordId(3)).await.unwrap().unwrap();
    assert!(saved.is_pending());
    assert!(saved.image.is_none());
    assert!(saved.domain.is_some());
    assert!(enricher.blobs().is_empty());
}

#[tokio::test]
async fn processed_record_is_not_touched_again() {
    let url = "https://example.org/article";
    let fetcher = MockFetcher::new()
        .with_page(url, OG_PAGE)
        .with_bytes("https://example.org/img.jpg", "image/jpeg", jpeg_fixture(800, 400));
    let record = LinkRecord::new(4, url);
    let enricher = Enricher::new(
        Arc::new(MemoryStore::with_records(vec![record])),
        Arc::new(MemoryBlobStore::new()),
        Arc::new(fetcher),
        Arc::new(MockRenderer::new()),
    );

    let first = enricher.process_by_id(RecordId(4)).await.unwrap();
    assert!(first.is_committed());
    let after_first = enricher.store().snapshot(RecordId(4)).unwrap();
    let fetches = enricher.fetcher().calls().len();

    let second = enricher.process_by_id(RecordId(4)).await.unwrap();
    assert_eq!(second, EnrichOutcome::Skipped);
    assert_eq!(enricher.store().snapshot(RecordId(4)).unwrap(), after_first);
    assert_eq!(enricher.fetcher().calls().len(), fetches);
}

#[tokio::test]
async fn worker_writes_thumbnails_under_media_root() {
    let media = tempfile::tempdir().unwrap();

    let fetcher = MockFetcher::new()
        .with_page("https://a.example/", OG_PAGE)
        .with_bytes("https://a.example/img.jpg", "image/jpeg", jpeg_fixture(1200, 630))
        .with_page("https://b.example/", "<html><head><title>Bare</title></head></html>");
    let renderer = MockRenderer::new().with_screenshot("https://b.example/", "Bare", 1200, 630);
    let records = vec![
        LinkRecord::new(1, "https://a.example/"),
        LinkRecord::new(2, "https://b.example/"),
        LinkRecord::new(3, "https://gone.example/"),
    ];

    let enricher = Enricher::new(
        Arc::new(MemoryStore::with_records(records)),
        Arc::new(FsBlobStore::new(media.path(), "link_previews")),
        Arc::new(fetcher),
        Arc::new(renderer),
    );
    let worker = EnrichmentWorker::with_config(
        Arc::new(enricher),
        WorkerConfig::with_worker_id("test-worker").with_concurrency(2),
    );

    let summary = worker.run(false, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.claimed, 3);
    assert_eq!(summary.lightweight, 1);
    assert_eq!(summary.fallback, 1);
    assert_eq!(summary.pending, 1);

    let store = worker.enricher().store();
    assert_eq!(
        store.snapshot(RecordId(1)).unwrap().image,
        Some(ImageRef("link_previews/preview_1.jpg".into()))
    );
    assert_eq!(
        store.snapshot(RecordId(2)).unwrap().image,
        Some(ImageRef("link_previews/pageimg_2.jpg".into()))
    );
    assert!(store.snapshot(RecordId(3)).unwrap().is_pending());

    let thumb = std::fs::read(media.path().join("link_previews/preview_1.jpg")).unwrap();
    assert_eq!(dimensions(&thumb), (600, 315));
    assert!(media.path().join("link_previews/pageimg_2.jpg").exists());
}
