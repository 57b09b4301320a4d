//! Remote print engine against a local browserless-style `/pdf` endpoint.

use edgequake_svg2pdf::pipeline::engine::Paper;
use edgequake_svg2pdf::{
    EngineError, Length, Margins, PrintOptions, RemoteChrome, RenderEngine, Renderer,
    TemplateBuilder, WatermarkOverrides,
};
use edgequake_svg2pdf::{PageOverrides, RenderError};
use std::io::Read;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server, StatusCode};

fn serve_once(
    status: u16,
    reply: &'static [u8],
) -> (String, mpsc::Receiver<(String, serde_json::Value)>, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let base = format!("http://{}/", server.server_addr());
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let mut raw = String::new();
            request.as_reader().read_to_string(&mut raw).expect("read body");
            tx.send((
                request.url().to_string(),
                serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
            ))
            .expect("send capture");
            let response = Response::from_data(reply.to_vec())
                .with_status_code(StatusCode(status))
                .with_header(Header::from_bytes("Content-Type", "application/pdf").unwrap());
            request.respond(response).expect("respond");
        }
    });
    (base, rx, handle)
}

fn options() -> PrintOptions {
    PrintOptions {
        paper: Paper::A4,
        margins: Margins::symmetric(Length::mm(50.0), Length::mm(20.0)),
        print_background: true,
        prefer_css_page_size: false,
        settle: Duration::from_millis(1000),
    }
}

#[tokio::test]
async fn posts_html_and_print_options_to_pdf_endpoint() {
    let (base, rx, handle) = serve_once(200, b"%PDF-1.7 remote");
    // A trailing slash on the base URL must not double up.
    let engine = RemoteChrome::new(&base).unwrap();

    let pdf = engine
        .print_to_pdf("<html><body>hi</body></html>", &options())
        .await
        .unwrap();
    handle.join().unwrap();
    assert_eq!(pdf, b"%PDF-1.7 remote");

    let (url, body) = rx.recv().unwrap();
    assert_eq!(url, "/pdf");
    assert_eq!(body["html"], "<html><body>hi</body></html>");
    assert_eq!(body["options"]["format"], "A4");
    assert_eq!(body["options"]["printBackground"], true);
    assert_eq!(body["options"]["preferCSSPageSize"], false);
    assert_eq!(body["options"]["margin"]["top"], "50mm");
    assert_eq!(body["options"]["margin"]["left"], "20mm");
    assert_eq!(body["gotoOptions"]["waitUntil"], "networkidle0");
    assert_eq!(body["waitForTimeout"], 1000);
}

#[tokio::test]
async fn error_status_is_remote_error() {
    let (base, _rx, handle) = serve_once(500, b"browser crashed");
    let engine = RemoteChrome::new(&base).unwrap();

    let err = engine.print_to_pdf("<html></html>", &options()).await.unwrap_err();
    handle.join().unwrap();
    match err {
        EngineError::Remote(msg) => {
            assert!(msg.contains("500"), "{msg}");
            assert!(msg.contains("browser crashed"), "{msg}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_unavailable() {
    // Bind then drop to get a port nobody listens on.
    let addr = Server::http("127.0.0.1:0").unwrap().server_addr().to_string();
    let engine = RemoteChrome::new(&format!("http://{addr}")).unwrap();

    let err = engine.print_to_pdf("<html></html>", &options()).await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)), "{err:?}");
}

#[tokio::test]
async fn renderer_rejects_empty_remote_pdf() {
    let (base, _rx, handle) = serve_once(200, b"");
    let renderer = Renderer::new(
        Arc::new(RemoteChrome::new(&base).unwrap()),
        TemplateBuilder::default(),
    );

    let err = renderer
        .render(
            b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>",
            &WatermarkOverrides::text("Endurance"),
            &PageOverrides::default(),
        )
        .await
        .unwrap_err();
    handle.join().unwrap();
    assert!(matches!(err, RenderError::EmptyOutput));
}
