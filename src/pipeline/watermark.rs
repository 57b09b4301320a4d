//! Watermark tile: a small SVG canvas with rotated, translucent text, wrapped
//! as a base64 `data:` URI so the page can use it as a repeating CSS
//! background without any extra network fetch.
//!
//! The text is XML-escaped before it is placed in the tile. A watermark such
//! as `<script>` ends up as literal characters, never as markup.

use crate::config::WatermarkConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::escape::escape;
use tracing::debug;

/// A resolved watermark ready to be serialised.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkPattern<'a> {
    config: &'a WatermarkConfig,
}

impl<'a> WatermarkPattern<'a> {
    pub fn new(config: &'a WatermarkConfig) -> Self {
        Self { config }
    }

    /// The tile as standalone SVG markup.
    ///
    /// Text is centred on the canvas and rotated about the canvas centre.
    pub fn to_svg(&self) -> String {
        let c = self.config;
        let (w, h) = (c.size.width, c.size.height);
        format!(
            r#"<svg width="{w}" height="{h}" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg">
    <text x="50%" y="50%" font-family="Arial, sans-serif" font-size="{font}" font-weight="900"
          fill="rgba(0,0,0,{opacity})" text-anchor="middle" dominant-baseline="middle"
          transform="rotate({rotation} {cx} {cy})">{text}</text>
</svg>
"#,
            font = c.font_size,
            opacity = c.opacity,
            rotation = c.rotation,
            cx = w / 2,
            cy = h / 2,
            text = escape(c.text.as_str()),
        )
    }

    /// `data:image/svg+xml;base64,…` form of [`Self::to_svg`].
    pub fn to_data_uri(&self) -> String {
        let b64 = STANDARD.encode(self.to_svg());
        debug!("Encoded watermark tile → {} bytes base64", b64.len());
        format!("data:image/svg+xml;base64,{b64}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Size, WatermarkOverrides};

    #[test]
    fn default_tile_geometry() {
        let config = WatermarkConfig::default();
        let svg = WatermarkPattern::new(&config).to_svg();
        assert!(svg.contains(r#"width="250" height="250""#));
        assert!(svg.contains(r#"viewBox="0 0 250 250""#));
        assert!(svg.contains(r#"font-size="48""#));
        assert!(svg.contains("rgba(0,0,0,0.1)"));
        assert!(svg.contains("rotate(-40 125 125)"));
    }

    #[test]
    fn rotation_centre_uses_integer_halves() {
        let config = WatermarkConfig {
            size: Size::new(301, 151),
            ..Default::default()
        };
        let svg = WatermarkPattern::new(&config).to_svg();
        assert!(svg.contains("150 75)"), "{svg}");
    }

    #[test]
    fn text_is_escaped() {
        let config =
            WatermarkConfig::default().merged(&WatermarkOverrides::text(r#"<b>"A&B"</b>"#));
        let svg = WatermarkPattern::new(&config).to_svg();
        assert!(!svg.contains("<b>"));
        assert!(svg.contains("&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;"));
    }

    #[test]
    fn data_uri_decodes_back_to_svg() {
        let config = WatermarkConfig::default();
        let pattern = WatermarkPattern::new(&config);
        let uri = pattern.to_data_uri();
        let b64 = uri
            .strip_prefix("data:image/svg+xml;base64,")
            .expect("data URI prefix");
        let decoded = STANDARD.decode(b64).expect("valid base64");
        assert_eq!(String::from_utf8(decoded).unwrap(), pattern.to_svg());
    }
}
