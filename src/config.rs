//! Configuration types for SVG-to-PDF conversion.
//!
//! Everything a deployment can tune lives in [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. Per-run composition settings use a pair of
//! types: a complete struct with documented defaults ([`WatermarkConfig`],
//! [`PageConfig`]) and a partial "overrides" struct whose `Some` fields
//! replace the matching default one at a time. Nested sizes merge the same
//! way, so overriding only `size.width` keeps the default height.

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ── Watermark ────────────────────────────────────────────────────────────────

/// Width × height in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn merged(self, overrides: &SizeOverrides) -> Self {
        Self {
            width: overrides.width.unwrap_or(self.width),
            height: overrides.height.unwrap_or(self.height),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl From<Size> for SizeOverrides {
    fn from(size: Size) -> Self {
        Self {
            width: Some(size.width),
            height: Some(size.height),
        }
    }
}

/// Fully-resolved watermark parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    pub text: String,
    /// Canvas the text is drawn on. Default: 250×250.
    pub size: Size,
    /// Default: 48.
    pub font_size: u32,
    /// 0.0–1.0. Default: 0.1.
    pub opacity: f32,
    /// Degrees, negative is counter-clockwise. Default: −40.
    pub rotation: f32,
    /// Size each tile is painted at on the page. Default: 250×150.
    pub tile: Size,
}

impl WatermarkConfig {
    pub const DEFAULT_TEXT: &'static str = "Watermark";
    pub const DEFAULT_SIZE: Size = Size::new(250, 250);
    pub const DEFAULT_FONT_SIZE: u32 = 48;
    pub const DEFAULT_OPACITY: f32 = 0.1;
    pub const DEFAULT_ROTATION: f32 = -40.0;
    pub const DEFAULT_TILE: Size = Size::new(250, 150);

    /// Apply `overrides` field by field on top of `self`.
    pub fn merged(&self, overrides: &WatermarkOverrides) -> Self {
        let size_overrides = overrides.size.unwrap_or_default();
        let tile_overrides = overrides.tile.unwrap_or_default();
        Self {
            text: overrides.text.clone().unwrap_or_else(|| self.text.clone()),
            size: self.size.merged(&size_overrides),
            font_size: overrides.font_size.unwrap_or(self.font_size),
            opacity: overrides.opacity.unwrap_or(self.opacity).clamp(0.0, 1.0),
            rotation: overrides.rotation.unwrap_or(self.rotation),
            tile: self.tile.merged(&tile_overrides),
        }
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: Self::DEFAULT_TEXT.to_string(),
            size: Self::DEFAULT_SIZE,
            font_size: Self::DEFAULT_FONT_SIZE,
            opacity: Self::DEFAULT_OPACITY,
            rotation: Self::DEFAULT_ROTATION,
            tile: Self::DEFAULT_TILE,
        }
    }
}

/// Caller-supplied partial watermark settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkOverrides {
    pub text: Option<String>,
    pub size: Option<SizeOverrides>,
    pub font_size: Option<u32>,
    pub opacity: Option<f32>,
    pub rotation: Option<f32>,
    #[serde(alias = "repeat_size")]
    pub tile: Option<SizeOverrides>,
}

impl WatermarkOverrides {
    /// Only the text set.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

// ── Page ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Mm,
    Cm,
    In,
    Px,
    Pt,
}

impl LengthUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::In => "in",
            LengthUnit::Px => "px",
            LengthUnit::Pt => "pt",
        }
    }

    fn per_inch(self) -> f64 {
        match self {
            LengthUnit::Mm => 25.4,
            LengthUnit::Cm => 2.54,
            LengthUnit::In => 1.0,
            LengthUnit::Px => 96.0,
            LengthUnit::Pt => 72.0,
        }
    }
}

/// A CSS length such as `20mm`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Length {
    pub value: f64,
    pub unit: LengthUnit,
}

impl Length {
    pub const fn mm(value: f64) -> Self {
        Self {
            value,
            unit: LengthUnit::Mm,
        }
    }

    pub fn to_inches(self) -> f64 {
        self.value / self.unit.per_inch()
    }
}

static LENGTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(mm|cm|in|px|pt)\s*$").unwrap());

impl FromStr for Length {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidLength(s.to_string());
        let caps = LENGTH_RE.captures(s).ok_or_else(invalid)?;
        let value: f64 = caps[1].parse().map_err(|_| invalid())?;
        let unit = match &caps[2] {
            "mm" => LengthUnit::Mm,
            "cm" => LengthUnit::Cm,
            "in" => LengthUnit::In,
            "px" => LengthUnit::Px,
            _ => LengthUnit::Pt,
        };
        Ok(Self { value, unit })
    }
}

impl TryFrom<String> for Length {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Length> for String {
    fn from(l: Length) -> Self {
        l.to_string()
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: Length,
    pub right: Length,
    pub bottom: Length,
    pub left: Length,
}

impl Margins {
    pub const fn uniform(length: Length) -> Self {
        Self {
            top: length,
            right: length,
            bottom: length,
            left: length,
        }
    }

    /// Top/bottom and left/right pairs.
    pub const fn symmetric(vertical: Length, horizontal: Length) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }

    fn merged(self, o: &MarginOverrides) -> Self {
        Self {
            top: o.top.unwrap_or(self.top),
            right: o.right.unwrap_or(self.right),
            bottom: o.bottom.unwrap_or(self.bottom),
            left: o.left.unwrap_or(self.left),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginOverrides {
    pub top: Option<Length>,
    pub right: Option<Length>,
    pub bottom: Option<Length>,
    pub left: Option<Length>,
}

impl From<Margins> for MarginOverrides {
    fn from(m: Margins) -> Self {
        Self {
            top: Some(m.top),
            right: Some(m.right),
            bottom: Some(m.bottom),
            left: Some(m.left),
        }
    }
}

/// Fully-resolved page settings for a render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    pub margins: Margins,
}

impl PageConfig {
    pub const DEFAULT_MARGIN: Length = Length::mm(20.0);

    pub fn merged(&self, overrides: &PageOverrides) -> Self {
        Self {
            margins: self
                .margins
                .merged(&overrides.margins.unwrap_or_default()),
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            margins: Margins::uniform(Self::DEFAULT_MARGIN),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageOverrides {
    pub margins: Option<MarginOverrides>,
}

impl From<PageConfig> for PageOverrides {
    fn from(p: PageConfig) -> Self {
        Self {
            margins: Some(p.margins.into()),
        }
    }
}

/// Decorative header and footer text on the composed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageChrome {
    pub title: String,
    pub description: String,
    /// Footer prefix; the year is appended.
    pub footer: String,
}

impl Default for PageChrome {
    fn default() -> Self {
        Self {
            title: "Generated PDF from SVG".into(),
            description: "This document was generated from an SVG file with a watermark applied."
                .into(),
            footer: "©".into(),
        }
    }
}

// ── Oracle ───────────────────────────────────────────────────────────────────

/// Settings for the AI repair oracle.
#[derive(Clone, PartialEq)]
pub struct OracleConfig {
    /// Chat-completions endpoint. Default: OpenRouter.
    pub endpoint: String,
    /// Bearer credential. `None` means the AI path is unconfigured.
    pub api_key: Option<String>,
    pub model: String,
    /// When set, use this `edgequake-llm` provider instead of the raw endpoint.
    pub provider_name: Option<String>,
    /// Default: 0.7.
    pub temperature: f32,
    /// Default: 4000.
    pub max_tokens: usize,
    /// Default: 30.
    pub timeout_secs: u64,
}

impl OracleConfig {
    pub const DEFAULT_ENDPOINT: &'static str = "https://openrouter.ai/api/v1/chat/completions";
    pub const DEFAULT_MODEL: &'static str = "anthropic/claude-3.5-sonnet";
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: Self::DEFAULT_MODEL.to_string(),
            provider_name: None,
            temperature: 0.7,
            max_tokens: 4000,
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Which rendering engine to drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineTarget {
    /// A local Chrome/Chromium process. `None` discovers the binary.
    Local { binary: Option<PathBuf> },
    /// A browserless-compatible HTTP endpoint.
    Remote { endpoint: String },
}

impl Default for EngineTarget {
    fn default() -> Self {
        EngineTarget::Local { binary: None }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Configuration for the whole conversion pipeline.
///
/// # Example
/// ```rust
/// use edgequake_svg2pdf::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .watermark_text("Confidential")
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.watermark.text.as_deref(), Some("Confidential"));
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub engine: EngineTarget,
    /// Hard timeout around one engine call, in seconds. Default: 30.
    pub engine_timeout_secs: u64,
    /// How long the engine waits for network activity to settle. Default: 1000.
    pub settle_ms: u64,
    pub oracle: OracleConfig,
    /// What the orchestrator passes to the renderer on every run.
    pub watermark: WatermarkOverrides,
    pub page: PageOverrides,
    /// Base watermark defaults the overrides merge onto.
    pub watermark_defaults: WatermarkConfig,
    pub chrome: PageChrome,
    /// Documents converted at the same time by the dispatcher. Default: 4.
    pub concurrency: usize,
}

impl PipelineConfig {
    pub const RUN_WATERMARK_TEXT: &'static str = "Endurance";

    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Margins the orchestrator asks for: room for header and footer.
    pub fn run_page() -> PageConfig {
        PageConfig {
            margins: Margins::symmetric(Length::mm(50.0), Length::mm(20.0)),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: EngineTarget::default(),
            engine_timeout_secs: 30,
            settle_ms: 1000,
            oracle: OracleConfig::default(),
            watermark: WatermarkOverrides::text(Self::RUN_WATERMARK_TEXT),
            page: Self::run_page().into(),
            watermark_defaults: WatermarkConfig::default(),
            chrome: PageChrome::default(),
            concurrency: 4,
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Start from defaults, then apply the deployment environment variables.
    pub fn from_env() -> Self {
        let mut builder = PipelineConfig::builder();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(url) = var("REMOTE_CHROME_URL") {
            builder = builder.remote_engine(url);
        } else if let Some(path) = var(chrome_locate::CHROME_PATH_ENV) {
            builder = builder.local_engine(Some(PathBuf::from(path)));
        }
        if let Some(key) = var("OPENROUTER_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Some(model) = var("OPENROUTER_MODEL") {
            builder = builder.model(model);
        }
        if let Some(endpoint) = var("OPENROUTER_ENDPOINT") {
            builder = builder.oracle_endpoint(endpoint);
        }
        if let Some(provider) = var("SVG2PDF_REPAIR_PROVIDER") {
            builder = builder.provider_name(provider);
        }
        builder
    }

    pub fn local_engine(mut self, binary: Option<PathBuf>) -> Self {
        self.config.engine = EngineTarget::Local { binary };
        self
    }

    pub fn remote_engine(mut self, endpoint: impl Into<String>) -> Self {
        self.config.engine = EngineTarget::Remote {
            endpoint: endpoint.into(),
        };
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout_secs = secs;
        self
    }

    pub fn settle_ms(mut self, ms: u64) -> Self {
        self.config.settle_ms = ms;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.oracle.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.oracle.model = model.into();
        self
    }

    pub fn oracle_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.oracle.endpoint = endpoint.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.oracle.provider_name = Some(name.into());
        self
    }

    pub fn oracle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.oracle.timeout_secs = secs;
        self
    }

    pub fn watermark_text(mut self, text: impl Into<String>) -> Self {
        self.config.watermark.text = Some(text.into());
        self
    }

    pub fn watermark(mut self, overrides: WatermarkOverrides) -> Self {
        self.config.watermark = overrides;
        self
    }

    pub fn page(mut self, overrides: PageOverrides) -> Self {
        self.config.page = overrides;
        self
    }

    pub fn page_chrome(mut self, chrome: PageChrome) -> Self {
        self.config.chrome = chrome;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let c = &self.config;
        if c.engine_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Engine timeout must be ≥ 1 second".into(),
            ));
        }
        if let EngineTarget::Remote { endpoint } = &c.engine {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Remote engine endpoint must be an http(s) URL, got '{endpoint}'"
                )));
            }
        }
        if let Some(opacity) = c.watermark.opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Watermark opacity must be 0.0–1.0, got {opacity}"
                )));
            }
        }
        if !(0.0..=2.0).contains(&c.oracle.temperature) {
            return Err(ConfigError::InvalidConfig(format!(
                "Oracle temperature must be 0.0–2.0, got {}",
                c.oracle.temperature
            )));
        }
        Ok(self.config)
    }
}
