//! Printable HTML page composition.
//!
//! The page stacks three things: a header with title and description, the
//! SVG centred and scaled to fit the space left between header and footer,
//! and a footer line. A full-page overlay above all of it carries the
//! watermark tile as a repeating background.

use crate::config::{PageChrome, WatermarkConfig, WatermarkOverrides};
use crate::error::BuildError;
use crate::pipeline::watermark::WatermarkPattern;
use chrono::Datelike;
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::Regex;
use std::fmt::Write as _;
use tracing::debug;

/// Leading XML declaration, comments and DOCTYPE; none of them belong
/// inside an HTML body.
static PROLOG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\s*<\?xml[^>]*\?>|\s*<!--[\s\S]*?-->|\s*<!DOCTYPE[^>\[]*(?:\[[\s\S]*?\])?\s*>)*\s*")
        .unwrap()
});

/// Builds the HTML page handed to the rendering engine.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    defaults: WatermarkConfig,
    chrome: PageChrome,
    year: i32,
}

impl Default for TemplateBuilder {
    fn default() -> Self {
        Self::new(WatermarkConfig::default(), PageChrome::default())
    }
}

impl TemplateBuilder {
    pub fn new(defaults: WatermarkConfig, chrome: PageChrome) -> Self {
        Self {
            defaults,
            chrome,
            year: chrono::Utc::now().year(),
        }
    }

    /// Pin the footer year.
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    /// The watermark settings a build with `overrides` would use.
    pub fn resolve(&self, overrides: &WatermarkOverrides) -> WatermarkConfig {
        self.defaults.merged(overrides)
    }

    /// Compose the page for `content` with `overrides` merged onto the
    /// builder's watermark defaults.
    ///
    /// # Errors
    /// - [`BuildError::EmptyContent`] for blank content
    /// - [`BuildError::EmptyWatermarkText`] when the resolved text is blank
    /// - [`BuildError::Composition`] for anything else that goes wrong
    pub fn build(
        &self,
        content: &[u8],
        overrides: &WatermarkOverrides,
    ) -> Result<String, BuildError> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(BuildError::EmptyContent);
        }
        let watermark = self.resolve(overrides);
        if watermark.text.trim().is_empty() {
            return Err(BuildError::EmptyWatermarkText);
        }

        let svg = std::str::from_utf8(content)
            .map_err(|e| BuildError::Composition(format!("SVG content is not UTF-8: {e}")))?;
        let svg = strip_prolog(svg);

        let html = self
            .compose(svg, &watermark)
            .map_err(|e| BuildError::Composition(e.to_string()))?;
        debug!(
            "Composed HTML page: {} bytes, watermark '{}'",
            html.len(),
            watermark.text
        );
        Ok(html)
    }

    fn compose(&self, svg: &str, watermark: &WatermarkConfig) -> Result<String, std::fmt::Error> {
        let data_uri = WatermarkPattern::new(watermark).to_data_uri();
        let mut html = String::with_capacity(svg.len() + data_uri.len() + 4096);

        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html>")?;
        writeln!(html, "<head>")?;
        writeln!(html, "  <meta charset=\"utf-8\">")?;
        writeln!(html, "  <title>{}</title>", escape(self.chrome.title.as_str()))?;
        writeln!(html, "  <style>")?;
        write_css(&mut html, &data_uri, watermark)?;
        writeln!(html, "  </style>")?;
        writeln!(html, "</head>")?;
        writeln!(html, "<body>")?;
        writeln!(html, "  <div class=\"page-wrapper\">")?;
        writeln!(html, "    <div class=\"page-content\">")?;
        writeln!(html, "      <div class=\"header-section\">")?;
        writeln!(
            html,
            "        <h1 class=\"main-title\">{}</h1>",
            escape(self.chrome.title.as_str())
        )?;
        writeln!(
            html,
            "        <p class=\"description\">{}</p>",
            escape(self.chrome.description.as_str())
        )?;
        writeln!(html, "      </div>")?;
        writeln!(html, "      <div class=\"svg-wrapper\">")?;
        writeln!(html, "        <div class=\"content\">")?;
        writeln!(html, "{svg}")?;
        writeln!(html, "        </div>")?;
        writeln!(html, "      </div>")?;
        writeln!(html, "      <div class=\"footer-section\">")?;
        writeln!(
            html,
            "        <p class=\"footer-text\">{} {}</p>",
            escape(self.chrome.footer.as_str()),
            self.year
        )?;
        writeln!(html, "      </div>")?;
        writeln!(html, "    </div>")?;
        writeln!(html, "    <div class=\"watermark-overlay\"></div>")?;
        writeln!(html, "  </div>")?;
        writeln!(html, "</body>")?;
        writeln!(html, "</html>")?;
        Ok(html)
    }
}

fn strip_prolog(svg: &str) -> &str {
    match PROLOG_RE.find(svg) {
        Some(m) => &svg[m.end()..],
        None => svg,
    }
}

fn write_css(out: &mut String, data_uri: &str, watermark: &WatermarkConfig) -> std::fmt::Result {
    out.push_str(
        r#"    @page { size: A4; }
    * { margin: 0; padding: 0; box-sizing: border-box; }
    html, body {
      width: 100%;
      height: 100%;
      overflow: hidden;
      position: relative;
      font-family: 'Arial', sans-serif;
      background-color: white;
    }
    .page-wrapper { position: relative; width: 100%; height: 100%; }
    .page-content {
      position: relative;
      z-index: 1;
      height: 100%;
      display: flex;
      flex-direction: column;
      justify-content: space-between;
      align-items: center;
    }
    .header-section { width: 100%; margin-bottom: 20px; }
    .main-title { text-align: center; font-size: 28px; color: #333; margin-bottom: 15px; }
    .description { text-align: center; font-size: 14px; color: #666; max-width: 80%; margin: 0 auto 20px; }
    .svg-wrapper {
      display: flex;
      justify-content: center;
      align-items: center;
      flex-grow: 1;
      min-height: 0;
      width: 100%;
      overflow: hidden;
    }
    .content {
      display: flex;
      justify-content: center;
      align-items: center;
      width: 100%;
      height: 100%;
    }
    .content svg {
      max-width: 100%;
      max-height: 100%;
      height: auto;
      width: auto;
      object-fit: contain;
      display: block;
    }
    .footer-section { width: 100%; margin-top: 20px; }
    .footer-text { text-align: center; font-size: 12px; color: #999; }
"#,
    );
    writeln!(out, "    .watermark-overlay {{")?;
    writeln!(out, "      position: fixed;")?;
    writeln!(out, "      top: 0; left: 0; right: 0; bottom: 0;")?;
    writeln!(out, "      pointer-events: none;")?;
    writeln!(out, "      z-index: 9999;")?;
    writeln!(out, "      background-image: url('{data_uri}');")?;
    writeln!(out, "      background-repeat: repeat;")?;
    writeln!(out, "      background-position: 0 0;")?;
    writeln!(
        out,
        "      background-size: {}px {}px;",
        watermark.tile.width, watermark.tile.height
    )?;
    writeln!(out, "      print-color-adjust: exact;")?;
    writeln!(out, "      -webkit-print-color-adjust: exact;")?;
    writeln!(out, "    }}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Size, SizeOverrides};
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    const SVG: &[u8] = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10"/></svg>"#;

    fn builder() -> TemplateBuilder {
        TemplateBuilder::default().with_year(2024)
    }

    fn embedded_tile(html: &str) -> String {
        let start = html.find("base64,").expect("data URI") + "base64,".len();
        let end = start + html[start..].find('\'').expect("closing quote");
        String::from_utf8(STANDARD.decode(&html[start..end]).unwrap()).unwrap()
    }

    #[test]
    fn page_embeds_svg_chrome_and_overlay() {
        let html = builder().build(SVG, &WatermarkOverrides::default()).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<rect width=\"10\" height=\"10\"/>"));
        assert!(html.contains("Generated PDF from SVG"));
        assert!(html.contains("© 2024"));
        assert!(html.contains("background-repeat: repeat;"));
        assert!(html.contains("background-size: 250px 150px;"));
        assert!(html.contains("print-color-adjust: exact;"));
    }

    #[test]
    fn blank_content_is_rejected() {
        let err = builder().build(b"  \n\t", &WatermarkOverrides::default()).unwrap_err();
        assert_eq!(err, BuildError::EmptyContent);
    }

    #[test]
    fn blank_watermark_text_is_rejected() {
        let err = builder()
            .build(SVG, &WatermarkOverrides::text("   "))
            .unwrap_err();
        assert_eq!(err, BuildError::EmptyWatermarkText);
    }

    #[test]
    fn non_utf8_content_is_a_composition_failure() {
        let err = builder()
            .build(&[0x3c, 0x73, 0xff, 0xfe], &WatermarkOverrides::default())
            .unwrap_err();
        assert!(matches!(err, BuildError::Composition(ref m) if m.contains("UTF-8")));
    }

    #[test]
    fn text_override_reaches_the_tile() {
        let html = builder()
            .build(SVG, &WatermarkOverrides::text("Endurance"))
            .unwrap();
        let tile = embedded_tile(&html);
        assert!(tile.contains(">Endurance</text>"));
        assert!(tile.contains(r#"font-size="48""#));
        assert!(tile.contains("rotate(-40 125 125)"));
    }

    #[test]
    fn tile_override_changes_background_size_only() {
        let overrides = WatermarkOverrides {
            tile: Some(SizeOverrides {
                width: Some(300),
                height: None,
            }),
            ..Default::default()
        };
        let html = builder().build(SVG, &overrides).unwrap();
        assert!(html.contains("background-size: 300px 150px;"));
        assert_eq!(builder().resolve(&overrides).size, Size::new(250, 250));
    }

    #[test]
    fn hostile_watermark_text_cannot_inject_markup() {
        let html = builder()
            .build(SVG, &WatermarkOverrides::text("</text><script>x()</script>"))
            .unwrap();
        let tile = embedded_tile(&html);
        assert!(!tile.contains("<script>"));
        assert!(tile.contains("&lt;script&gt;"));
    }

    #[test]
    fn prolog_and_doctype_are_stripped() {
        let svg = br#"<?xml version="1.0" encoding="UTF-8"?>
<!-- exported -->
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd">
<svg xmlns="http://www.w3.org/2000/svg"/>"#;
        let html = builder().build(svg, &WatermarkOverrides::default()).unwrap();
        assert!(!html.contains("<?xml"));
        assert!(!html.contains("<!DOCTYPE svg"));
        assert!(html.contains(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#));
    }

    #[test]
    fn tall_svg_is_confined_to_one_page() {
        let tall = br#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="2000"/>"#;
        let html = builder().build(tall, &WatermarkOverrides::default()).unwrap();
        let css = &html[html.find("<style>").unwrap()..html.find("</style>").unwrap()];
        // Every ancestor of the svg needs a definite height for max-height: 100% to apply.
        assert!(css.contains(".page-wrapper { position: relative; width: 100%; height: 100%; }"));
        assert!(!css.contains("min-height: 100%"));
        let rule = |selector: &str| {
            let start = css.find(&format!("{selector} {{")).unwrap_or_else(|| panic!("{selector}"));
            &css[start..start + css[start..].find('}').unwrap()]
        };
        assert!(rule("html, body").contains("overflow: hidden;"));
        assert!(rule(".page-content").contains("height: 100%;"));
        assert!(rule(".svg-wrapper").contains("min-height: 0;"));
        assert!(rule(".content").contains("height: 100%;"));
        assert!(rule(".content svg").contains("max-height: 100%;"));
    }

    #[test]
    fn strip_prolog_leaves_plain_svg_alone() {
        assert_eq!(strip_prolog("<svg/>"), "<svg/>");
    }
}
