//! Rendering engine backends: HTML in, PDF bytes out.
//!
//! ```text
//!                 ┌──────────────┐  --print-to-pdf   ┌──────────────────┐
//! Renderer ──────▶│ LocalChrome  │──────────────────▶│ chromium process │
//!    │            └──────────────┘                   └──────────────────┘
//!    │            ┌──────────────┐  POST /pdf        ┌──────────────────┐
//!    └───────────▶│ RemoteChrome │──────────────────▶│ browserless etc. │
//!                 └──────────────┘                   └──────────────────┘
//! ```
//!
//! Which one is used is decided once from [`EngineTarget`]; callers only see
//! [`RenderEngine`]. Neither backend enforces the hard timeout itself: the
//! [`crate::pipeline::render::Renderer`] wraps every call in one, and both
//! backends clean up when their future is dropped (the child process is
//! killed, the HTTP request is aborted).

use crate::config::{EngineTarget, Length, Margins};
use crate::error::EngineError;
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Paper size in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paper {
    pub name: &'static str,
    pub width_in: f64,
    pub height_in: f64,
}

impl Paper {
    pub const A4: Paper = Paper {
        name: "A4",
        width_in: 8.27,
        height_in: 11.69,
    };
}

/// Everything an engine needs besides the HTML itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    pub paper: Paper,
    pub margins: Margins,
    pub print_background: bool,
    /// Let a CSS `@page size` override `paper`.
    pub prefer_css_page_size: bool,
    /// Time allowed for fonts, images and other resources to settle.
    pub settle: Duration,
}

/// A black-box HTML → PDF printer.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn print_to_pdf(&self, html: &str, options: &PrintOptions) -> Result<Vec<u8>, EngineError>;
}

/// Build the engine selected by `target`.
pub fn engine_from_target(target: &EngineTarget) -> Result<Arc<dyn RenderEngine>, EngineError> {
    match target {
        EngineTarget::Local { binary } => Ok(Arc::new(LocalChrome::new(binary.clone()))),
        EngineTarget::Remote { endpoint } => Ok(Arc::new(RemoteChrome::new(endpoint)?)),
    }
}

// ── Local ────────────────────────────────────────────────────────────────────

/// Headless Chrome/Chromium launched per render.
///
/// The binary is located through `chrome-locate` on first use, so building
/// a `LocalChrome` never fails even on machines without a browser.
/// `--print-to-pdf` has no margin or background switches: margins are
/// injected as an `@page` rule, and background colours rely on the page
/// asking for exact colour printing.
#[derive(Debug, Clone, Default)]
pub struct LocalChrome {
    binary: Option<PathBuf>,
}

impl LocalChrome {
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }

    fn resolve(&self) -> Result<PathBuf, EngineError> {
        chrome_locate::locate_chrome_from(self.binary.as_deref())
            .map_err(|e| EngineError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl RenderEngine for LocalChrome {
    fn name(&self) -> &str {
        "local-chrome"
    }

    async fn print_to_pdf(&self, html: &str, options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
        let binary = self.resolve()?;
        let work = tempfile::TempDir::new()?;
        let page = work.path().join("page.html");
        let out = work.path().join("out.pdf");

        tokio::fs::write(&page, with_page_rule(html, options)).await?;
        let url = reqwest::Url::from_file_path(&page).map_err(|_| {
            EngineError::Process(format!("cannot build a file URL for {}", page.display()))
        })?;

        debug!("Launching {} for {}", binary.display(), url);
        let output = Command::new(&binary)
            .args(chrome_args(options, &out))
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(5)..].join("\n");
            return Err(EngineError::Process(format!(
                "{} exited with {}: {}",
                binary.display(),
                output.status,
                tail
            )));
        }

        match tokio::fs::read(&out).await {
            Ok(bytes) => {
                info!("Local engine produced {} bytes", bytes.len());
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::Process(
                "engine exited successfully but wrote no PDF".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

fn chrome_args(options: &PrintOptions, out: &std::path::Path) -> Vec<String> {
    vec![
        "--headless=new".into(),
        "--disable-gpu".into(),
        "--no-sandbox".into(),
        "--hide-scrollbars".into(),
        "--no-pdf-header-footer".into(),
        "--run-all-compositor-stages-before-draw".into(),
        format!("--virtual-time-budget={}", options.settle.as_millis()),
        format!("--print-to-pdf={}", out.display()),
    ]
}

fn css_margins(m: &Margins) -> String {
    let fmt = |l: &Length| l.to_string();
    format!("{} {} {} {}", fmt(&m.top), fmt(&m.right), fmt(&m.bottom), fmt(&m.left))
}

/// Prepend an `@page` rule carrying paper size and margins.
///
/// Placed before the page's own styles so a page-level `@page size` still
/// wins when `prefer_css_page_size` is set.
fn with_page_rule(html: &str, options: &PrintOptions) -> String {
    let size = if options.prefer_css_page_size {
        String::new()
    } else {
        format!(" size: {}in {}in;", options.paper.width_in, options.paper.height_in)
    };
    let rule = format!(
        "<style>@page {{{size} margin: {}; }}</style>\n",
        css_margins(&options.margins)
    );
    match html.find("<head>") {
        Some(pos) => {
            let at = pos + "<head>".len();
            format!("{}\n{}{}", &html[..at], rule, &html[at..])
        }
        None => format!("{rule}{html}"),
    }
}

// ── Remote ───────────────────────────────────────────────────────────────────

/// An HTTP print service speaking the browserless `/pdf` contract.
#[derive(Debug, Clone)]
pub struct RemoteChrome {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteChrome {
    pub fn new(endpoint: &str) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn request_body(html: &str, options: &PrintOptions) -> serde_json::Value {
        let m = &options.margins;
        json!({
            "html": html,
            "options": {
                "format": options.paper.name,
                "printBackground": options.print_background,
                "preferCSSPageSize": options.prefer_css_page_size,
                "margin": {
                    "top": m.top.to_string(),
                    "right": m.right.to_string(),
                    "bottom": m.bottom.to_string(),
                    "left": m.left.to_string(),
                },
            },
            "gotoOptions": { "waitUntil": "networkidle0" },
            "waitForTimeout": options.settle.as_millis() as u64,
        })
    }
}

#[async_trait]
impl RenderEngine for RemoteChrome {
    fn name(&self) -> &str {
        "remote-chrome"
    }

    async fn print_to_pdf(&self, html: &str, options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
        let url = format!("{}/pdf", self.endpoint);
        debug!("POST {} ({} bytes of HTML)", url, html.len());

        let response = self
            .client
            .post(&url)
            .json(&Self::request_body(html, options))
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Remote engine answered HTTP {}", status.as_u16());
            return Err(EngineError::Remote(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::Remote(e.to_string()))?;
        info!("Remote engine produced {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> PrintOptions {
        PrintOptions {
            paper: Paper::A4,
            margins: Margins::symmetric(Length::mm(50.0), Length::mm(20.0)),
            print_background: true,
            prefer_css_page_size: false,
            settle: Duration::from_millis(1000),
        }
    }

    #[test]
    fn page_rule_goes_inside_head() {
        let html = "<!DOCTYPE html><html><head><title>t</title></head><body></body></html>";
        let out = with_page_rule(html, &options());
        let rule_at = out.find("@page").unwrap();
        assert!(out.find("<head>").unwrap() < rule_at);
        assert!(rule_at < out.find("<title>").unwrap());
        assert!(out.contains("margin: 50mm 20mm 50mm 20mm;"));
        assert!(out.contains("size: 8.27in 11.69in;"));
    }

    #[test]
    fn page_rule_without_head_is_prepended() {
        let mut opts = options();
        opts.prefer_css_page_size = true;
        let out = with_page_rule("<p>x</p>", &opts);
        assert!(out.starts_with("<style>@page {"));
        assert!(!out.contains("size:"));
    }

    #[test]
    fn chrome_args_carry_settle_and_output() {
        let args = chrome_args(&options(), std::path::Path::new("/tmp/x/out.pdf"));
        assert!(args.contains(&"--virtual-time-budget=1000".to_string()));
        assert!(args.contains(&"--print-to-pdf=/tmp/x/out.pdf".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn remote_body_matches_print_contract() {
        let body = RemoteChrome::request_body("<html/>", &options());
        assert_eq!(body["html"], "<html/>");
        assert_eq!(body["options"]["format"], "A4");
        assert_eq!(body["options"]["printBackground"], true);
        assert_eq!(body["options"]["preferCSSPageSize"], false);
        assert_eq!(body["options"]["margin"]["top"], "50mm");
        assert_eq!(body["options"]["margin"]["left"], "20mm");
        assert_eq!(body["gotoOptions"]["waitUntil"], "networkidle0");
        assert_eq!(body["waitForTimeout"], 1000);
    }

    #[tokio::test]
    async fn missing_explicit_binary_is_unavailable() {
        let engine = LocalChrome::new(Some(PathBuf::from("/definitely/not/chrome")));
        let err = engine.print_to_pdf("<html></html>", &options()).await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)), "{err}");
    }

    #[test]
    fn target_selects_backend() {
        let local = engine_from_target(&EngineTarget::default()).unwrap();
        assert_eq!(local.name(), "local-chrome");
        let remote = engine_from_target(&EngineTarget::Remote {
            endpoint: "http://localhost:3000/".into(),
        })
        .unwrap();
        assert_eq!(remote.name(), "remote-chrome");
    }

    #[cfg(unix)]
    mod fake_binary {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &std::path::Path, body: &str) -> PathBuf {
            let path = dir.join("fake-chrome");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn local_engine_reads_back_the_printed_file() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(
                dir.path(),
                r#"for arg in "$@"; do
  case "$arg" in
    --print-to-pdf=*) printf '%%PDF-1.4 fake' > "${arg#--print-to-pdf=}" ;;
  esac
done"#,
            );
            let pdf = LocalChrome::new(Some(bin))
                .print_to_pdf("<html><head></head></html>", &options())
                .await
                .unwrap();
            assert_eq!(pdf, b"%PDF-1.4 fake");
        }

        #[tokio::test]
        async fn failing_process_is_a_process_error() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "echo 'cannot open display' >&2\nexit 3");
            let err = LocalChrome::new(Some(bin))
                .print_to_pdf("<html></html>", &options())
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Process(ref m) if m.contains("cannot open display")), "{err}");
        }

        #[tokio::test]
        async fn silent_success_without_file_is_a_process_error() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "exit 0");
            let err = LocalChrome::new(Some(bin))
                .print_to_pdf("<html></html>", &options())
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Process(_)));
        }
    }
}
