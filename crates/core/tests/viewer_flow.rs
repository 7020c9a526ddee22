//! End-to-end viewer behaviour against the fake renderer and in-memory
//! backend

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use apostila_cache::ScaleToken;
use apostila_core::testing::{MemoryBackend, RecordingHost};
use apostila_core::{
    BackendError, CommandOutcome, DocumentMeta, RenderPhase, RenderRequest, SearchHit,
    SearchOutcome, SearchStatus, ViewerCommand, ViewerConfig, ViewerController, ViewerError,
    ViewerStatus,
};
use apostila_render::testing::{FakeOpener, FakeRenderer};
use apostila_render::{DocumentOpenError, DocumentSource};
use tokio::task::LocalSet;

type TestViewer = ViewerController<FakeRenderer, MemoryBackend, RecordingHost>;

async fn local<F: Future>(future: F) -> F::Output {
    LocalSet::new().run_until(future).await
}

/// Viewer over a fresh backend whose progress record points at `start`
fn viewer_with(config: ViewerConfig, start: Option<u32>) -> (TestViewer, RecordingHost) {
    let host = RecordingHost::new();
    let backend = MemoryBackend::new();
    backend.set_progress(start);
    (ViewerController::new(config, backend, host.clone()), host)
}

fn viewer(start: Option<u32>) -> (TestViewer, RecordingHost) {
    viewer_with(ViewerConfig::default(), start)
}

#[tokio::test]
async fn sequential_navigation_keeps_the_last_window() {
    local(async {
        let (viewer, host) = viewer(Some(5));
        let renderer = FakeRenderer::new(10);

        viewer.open_document(renderer.clone()).await.unwrap();
        viewer.settle().await;
        assert_eq!(viewer.cache().cached_pages(), vec![4, 5, 6]);

        viewer.next_page();
        viewer.settle().await;
        viewer.next_page();
        viewer.settle().await;

        assert_eq!(host.presented_pages(), vec![5, 6, 7]);
        assert_eq!(viewer.cache().cached_pages(), vec![6, 7, 8]);
        assert!(!viewer.cache().contains(5));
        // 6 and 7 were prefetched, so only the window edges were rendered.
        assert_eq!(renderer.rendered_pages(), vec![5, 4, 6, 7, 8]);
        assert_eq!(
            host.last_status(),
            Some(ViewerStatus::PageShown {
                page: 7,
                total: 10,
                zoom_percent: Some(100)
            })
        );
    })
    .await;
}

#[tokio::test]
async fn requests_during_a_render_keep_only_the_latest() {
    local(async {
        let (viewer, host) = viewer(None);
        let renderer = FakeRenderer::new(10);
        viewer.open_document(renderer.clone()).await.unwrap();
        viewer.settle().await;
        renderer.clear_calls();

        renderer.pause();
        assert_eq!(viewer.request_page(4), RenderRequest::Started);
        while renderer.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(viewer.request_page(7), RenderRequest::Queued);
        assert_eq!(viewer.request_page(9), RenderRequest::Queued);
        assert_eq!(viewer.phase(), RenderPhase::RenderQueued);
        assert_eq!(viewer.page(), 4);

        renderer.resume();
        viewer.settle().await;

        assert_eq!(host.presented_pages(), vec![1, 4, 9]);
        assert_eq!(renderer.render_count(7), 0);
        assert_eq!(viewer.page(), 9);
        assert_eq!(viewer.phase(), RenderPhase::Idle);
    })
    .await;
}

#[tokio::test]
async fn prefetch_follows_the_reader_to_the_newest_page() {
    local(async {
        let (viewer, host) = viewer(None);
        let renderer = FakeRenderer::new(10);
        viewer.open_document(renderer.clone()).await.unwrap();
        viewer.settle().await;
        renderer.clear_calls();

        viewer.goto_page("5").unwrap();
        while !host.presented_pages().contains(&5) {
            tokio::task::yield_now().await;
        }
        renderer.pause();
        while renderer.render_count(4) == 0 {
            tokio::task::yield_now().await;
        }

        // Jump away while page 4 is still being prefetched for page 5.
        viewer.goto_page("9").unwrap();
        renderer.resume();
        viewer.settle().await;

        assert_eq!(host.presented_pages(), vec![1, 5, 9]);
        assert_eq!(viewer.cache().cached_pages(), vec![8, 9, 10]);
        assert!(!viewer.is_prefetching());
    })
    .await;
}

#[tokio::test]
async fn unusable_widths_leave_the_viewer_responsive() {
    local(async {
        let (viewer, host) = viewer(None);
        viewer.open_document(FakeRenderer::new(10)).await.unwrap();
        viewer.settle().await;
        let token = viewer.cache().scale_token();

        for width in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, 0.0] {
            assert_eq!(viewer.resize(width), RenderRequest::Ignored);
        }
        host.set_width(Some(f64::INFINITY));
        assert_eq!(viewer.viewer_width(), 800.0);
        assert!("resize:inf".parse::<ViewerCommand>().is_err());

        // Finite, but far too wide to allocate a bitmap for.
        assert_eq!(viewer.resize(1e12), RenderRequest::Started);
        viewer.settle().await;
        assert_eq!(host.last_status(), Some(ViewerStatus::RenderFailed));
        assert_eq!(viewer.phase(), RenderPhase::Idle);
        assert_eq!(host.presented_pages(), vec![1]);

        assert_eq!(viewer.resize(800.0), RenderRequest::Started);
        viewer.settle().await;
        assert_eq!(host.presented_pages(), vec![1, 1]);
        assert_eq!(viewer.cache().scale_token(), token);
    })
    .await;
}

#[tokio::test]
async fn keys_swipes_and_pinches_drive_the_viewer() {
    local(async {
        let (viewer, host) = viewer(Some(3));
        viewer.open_document(FakeRenderer::new(10)).await.unwrap();
        viewer.settle().await;

        assert_eq!(viewer.handle_key("ArrowRight"), Some(RenderRequest::Started));
        viewer.settle().await;
        assert_eq!(viewer.handle_key("Enter"), None);
        assert_eq!(viewer.handle_swipe(120.0, 5.0, 200), Some(RenderRequest::Started));
        viewer.settle().await;
        assert_eq!(viewer.handle_swipe(30.0, 0.0, 200), None);
        assert_eq!(host.presented_pages(), vec![3, 4, 3]);

        let mut pinch = viewer.begin_pinch(100.0);
        assert_eq!(viewer.update_pinch(&mut pinch, 150.0), 1.5);
        assert_eq!(viewer.zoom(), 1.0);
        assert_eq!(viewer.end_pinch(pinch), Some(RenderRequest::Started));
        viewer.settle().await;
        assert_eq!(viewer.zoom(), 1.5);

        // Zoomed in, dragging pans instead of turning the page.
        assert_eq!(viewer.handle_swipe(-120.0, 0.0, 200), None);
        assert_eq!(viewer.handle_key("0"), Some(RenderRequest::Started));
        viewer.settle().await;
        assert_eq!(viewer.zoom(), 1.0);
        assert_eq!(viewer.handle_swipe(-120.0, 0.0, 200), Some(RenderRequest::Started));
        viewer.settle().await;
        assert_eq!(viewer.page(), 4);

        let mut pinch = viewer.begin_pinch(200.0);
        viewer.update_pinch(&mut pinch, 202.0);
        assert_eq!(viewer.end_pinch(pinch), None);
    })
    .await;
}

#[tokio::test]
async fn zoom_invalidates_every_cached_page() {
    local(async {
        let (viewer, host) = viewer(Some(3));
        let renderer = FakeRenderer::new(10);
        viewer.open_document(renderer.clone()).await.unwrap();
        viewer.settle().await;
        let before = viewer.cache().scale_token().unwrap();
        assert_eq!(viewer.cache().cached_pages(), vec![2, 3, 4]);

        viewer.set_zoom(1.5);
        viewer.settle().await;

        let after = viewer.cache().scale_token().unwrap();
        assert_ne!(before, after);
        for page in viewer.cache().cached_pages() {
            assert_eq!(viewer.cache().entry_token(page), Some(after));
        }
        // The old bitmap of page 3 was not reused.
        assert_eq!(renderer.render_count(3), 2);
        let rerender = renderer.calls().into_iter().filter(|c| c.page == 3).last().unwrap();
        assert_eq!(ScaleToken::from_scale(rerender.scale), after);
        assert_eq!(after.thousandths(), 11550);

        let shown = host.presented().last().cloned().unwrap();
        assert_eq!(shown.page, 3);
        assert_eq!(shown.pixel, Some(FakeRenderer::colour_for(3, rerender.scale)));
        assert!(viewer.cache().stats().invalidations >= 1);
    })
    .await;
}

#[tokio::test]
async fn render_failure_keeps_the_previous_page() {
    local(async {
        let (viewer, host) = viewer(None);
        let renderer = FakeRenderer::new(10);
        renderer.fail_page(2);

        viewer.open_document(renderer.clone()).await.unwrap();
        viewer.settle().await;
        viewer.next_page();
        viewer.settle().await;

        assert_eq!(host.last_status(), Some(ViewerStatus::RenderFailed));
        assert_eq!(host.presented_pages(), vec![1]);
        assert_eq!(host.hidden_count(), 0);
        assert!(!viewer.cache().contains(2));

        // Not retried on its own; asking again renders it.
        renderer.heal_page(2);
        viewer.goto_page("2").unwrap();
        viewer.settle().await;
        assert_eq!(host.presented_pages(), vec![1, 2]);
    })
    .await;
}

#[tokio::test]
async fn navigation_clamps_to_the_document() {
    local(async {
        let (viewer, host) = viewer(Some(99));
        viewer.open_document(FakeRenderer::new(4)).await.unwrap();
        viewer.settle().await;
        assert_eq!(viewer.page(), 4);

        viewer.next_page();
        viewer.settle().await;
        viewer.goto_page("-3").unwrap();
        viewer.settle().await;
        viewer.prev_page();
        viewer.settle().await;

        assert_eq!(host.presented_pages(), vec![4, 4, 1, 1]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn progress_is_saved_once_navigation_goes_quiet() {
    local(async {
        let (viewer, _host) = viewer(None);
        viewer.open_document(FakeRenderer::new(10)).await.unwrap();
        viewer.settle().await;
        for _ in 0..2 {
            viewer.next_page();
            viewer.settle().await;
        }
        assert!(viewer.backend().saved_pages().is_empty());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(viewer.backend().saved_pages(), vec![3]);
        assert_eq!(viewer.progress().last_persisted(), Some(3));

        // Re-showing the saved page does not save it again.
        viewer.goto_page("3").unwrap();
        viewer.settle().await;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(viewer.backend().saved_pages(), vec![3]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn start_page_counts_as_persisted() {
    local(async {
        let (viewer, _host) = viewer(Some(6));
        viewer.open_document(FakeRenderer::new(10)).await.unwrap();
        viewer.settle().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(viewer.backend().saved_pages().is_empty());
    })
    .await;
}

#[tokio::test]
async fn search_reports_hits_and_jumps_to_them() {
    local(async {
        let (viewer, host) = viewer(None);
        viewer.open_document(FakeRenderer::new(10)).await.unwrap();
        viewer.settle().await;
        let hit = SearchHit {
            page: 8,
            excerpt: "placa de pare".to_string(),
        };
        viewer
            .backend()
            .set_search_results(Ok(vec![hit.clone()]));

        let outcome = viewer.search("  placa ").await;

        assert_eq!(
            outcome,
            SearchOutcome::Hits {
                term: "placa".to_string(),
                hits: vec![hit.clone()]
            }
        );
        assert_eq!(viewer.backend().searches(), vec!["placa".to_string()]);
        assert_eq!(
            host.search_statuses(),
            vec![
                SearchStatus::Searching("placa".to_string()),
                SearchStatus::Found {
                    count: 1,
                    term: "placa".to_string()
                },
            ]
        );
        assert_eq!(host.search_results(), vec![vec![hit.clone()]]);

        viewer.open_search_hit(&hit);
        viewer.settle().await;
        assert_eq!(viewer.page(), 8);
    })
    .await;
}

#[tokio::test]
async fn search_edge_cases() {
    local(async {
        let (viewer, host) = viewer(None);
        viewer.open_document(FakeRenderer::new(10)).await.unwrap();
        viewer.settle().await;

        assert_eq!(viewer.search("   ").await, SearchOutcome::EmptyTerm);
        assert_eq!(host.search_statuses(), vec![SearchStatus::EmptyTerm]);
        assert!(viewer.backend().searches().is_empty());

        viewer.backend().set_search_results(Err(BackendError::Rejected {
            endpoint: "search",
            message: None,
        }));
        assert_eq!(viewer.search("placa").await, SearchOutcome::Rejected(None));
        assert_eq!(
            host.search_statuses().last().unwrap().to_string(),
            "Falha na busca."
        );

        viewer.backend().set_search_results(Ok(Vec::new()));
        viewer.backend().pause();
        let running = {
            let viewer = viewer.clone();
            tokio::task::spawn_local(async move { viewer.search("sinal").await })
        };
        while viewer.backend().searches().len() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(viewer.controls().search_in_progress);
        assert!(!viewer.controls().search_enabled);
        assert_eq!(viewer.search("outra").await, SearchOutcome::Busy);

        viewer.backend().resume();
        let outcome = running.await.unwrap();
        assert_eq!(outcome.status(), Some(SearchStatus::NoResults("sinal".to_string())));
        assert!(viewer.controls().search_enabled);
    })
    .await;
}

#[tokio::test]
async fn search_needs_an_endpoint() {
    let viewer: TestViewer = ViewerController::new(
        ViewerConfig::default(),
        MemoryBackend::new().without_search_endpoint(),
        RecordingHost::new(),
    );
    local(async {
        viewer.open_document(FakeRenderer::new(2)).await.unwrap();
        viewer.settle().await;
        assert_eq!(viewer.search("placa").await, SearchOutcome::Unavailable);
        assert!(!viewer.controls().search_enabled);
    })
    .await;
}

fn meta(pdf_url: Option<&str>) -> DocumentMeta {
    DocumentMeta {
        title: "Apostila CNH".to_string(),
        total_pages: 10,
        pdf_url: pdf_url.map(str::to_string),
    }
}

#[tokio::test]
async fn load_document_from_metadata() {
    local(async {
        let (viewer, host) = viewer(Some(2));
        viewer.backend().set_document(meta(Some("/media/apostila.pdf")));
        let opener = FakeOpener::new(FakeRenderer::new(10));

        let request = viewer.load_document(&opener).await.unwrap();
        viewer.settle().await;

        assert_eq!(request, RenderRequest::Started);
        assert_eq!(host.titles(), vec!["Apostila CNH (10 paginas)".to_string()]);
        assert_eq!(viewer.title().as_deref(), Some("Apostila CNH (10 paginas)"));
        assert_eq!(
            opener.opened(),
            vec![DocumentSource::Path(PathBuf::from("/media/apostila.pdf"))]
        );
        let statuses: Vec<String> = host.statuses().iter().map(ToString::to_string).collect();
        assert_eq!(
            statuses,
            vec![
                "Buscando metadados do documento...",
                "Abrindo PDF...",
                "Renderizando pagina 2...",
                "Pagina 2 de 10 | Zoom 100%",
            ]
        );
        assert_eq!(host.presented_pages(), vec![2]);
    })
    .await;
}

#[tokio::test]
async fn load_document_falls_back_to_configured_pdf_url() {
    local(async {
        let mut config = ViewerConfig::default();
        config.endpoints.pdf_url = Some("/apostila/api/documento-ativo/pdf/".to_string());
        let (viewer, _host) = viewer_with(config, None);
        viewer.backend().set_document(meta(None));
        let opener = FakeOpener::new(FakeRenderer::new(10));

        viewer.load_document(&opener).await.unwrap();
        viewer.settle().await;

        assert_eq!(
            viewer.backend().fetched_urls(),
            vec!["/apostila/api/documento-ativo/pdf/".to_string()]
        );
    })
    .await;
}

#[tokio::test]
async fn load_document_failures_are_reported() {
    local(async {
        let (viewer, host) = viewer(None);
        let opener = FakeOpener::new(FakeRenderer::new(10));

        viewer.backend().fail_document(BackendError::Rejected {
            endpoint: "document",
            message: Some("Nenhuma apostila ativa.".to_string()),
        });
        assert!(viewer.load_document(&opener).await.is_err());
        assert_eq!(
            host.last_status().unwrap().to_string(),
            "Nenhuma apostila ativa."
        );

        viewer
            .backend()
            .fail_document(BackendError::Network("connection reset".to_string()));
        assert!(viewer.load_document(&opener).await.is_err());
        assert_eq!(host.last_status(), Some(ViewerStatus::OpenFailed));

        viewer.backend().set_document(meta(None));
        let err = viewer.load_document(&opener).await.unwrap_err();
        assert!(matches!(err, ViewerError::MissingPdfUrl));
        assert_eq!(host.last_status(), Some(ViewerStatus::PdfUrlMissing));
        assert!(opener.opened().is_empty());

        viewer.backend().set_document(meta(Some("/a.pdf")));
        let broken = FakeOpener::failing(DocumentOpenError::Load("not a PDF".to_string()));
        let err = viewer.load_document(&broken).await.unwrap_err();
        assert!(matches!(err, ViewerError::Open(_)));
        assert_eq!(host.last_status(), Some(ViewerStatus::OpenFailed));
        assert_eq!(viewer.total_pages(), None);
    })
    .await;
}

#[tokio::test]
async fn opening_another_document_starts_clean() {
    local(async {
        let (viewer, host) = viewer(None);
        viewer.open_document(FakeRenderer::new(10)).await.unwrap();
        viewer.settle().await;
        viewer.goto_page("6").unwrap();
        viewer.settle().await;

        let second = FakeRenderer::new(3);
        viewer.open_document(second.clone()).await.unwrap();
        viewer.settle().await;

        assert_eq!(viewer.total_pages(), Some(3));
        assert_eq!(viewer.page(), 1);
        assert_eq!(viewer.cache().cached_pages(), vec![1, 2]);
        assert_eq!(second.rendered_pages(), vec![1, 2]);
        assert_eq!(host.presented_pages(), vec![1, 6, 1]);
    })
    .await;
}

#[tokio::test]
async fn commands_drive_the_viewer() {
    local(async {
        let (viewer, _host) = viewer(None);
        viewer.open_document(FakeRenderer::new(10)).await.unwrap();
        viewer.settle().await;

        for token in ["next", "next", "zoom-in", "goto:9", "prev"] {
            let command: ViewerCommand = token.parse().unwrap();
            viewer.dispatch(command).await.unwrap();
            viewer.settle().await;
        }
        assert_eq!(viewer.page(), 8);
        assert!(viewer.is_zoom_active());

        let outcome = viewer.dispatch(ViewerCommand::ResetZoom).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Render(RenderRequest::Started));
        viewer.settle().await;
        assert!(!viewer.is_zoom_active());

        let err = viewer
            .dispatch(ViewerCommand::GoTo("dez".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::InvalidPageInput(_)));
    })
    .await;
}
