//! Pipeline stages for SVG-to-PDF conversion.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the engine or oracle backend can change without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! validate | repair ──▶ template ──▶ render ──▶ engine
//!  (quick-xml) (LLM)   (watermark)   (timeout)  (Chrome)
//! ```
//!
//! 1. [`validate`]  — strict XML well-formedness, content returned unchanged
//! 2. [`repair`]    — alternative to `validate`: an LLM checks and may rewrite the SVG
//! 3. [`watermark`] — the rotated, translucent text tile as a `data:` URI
//! 4. [`template`]  — the printable HTML page around the SVG
//! 5. [`render`]    — runs the engine under a hard timeout, rejects empty output
//! 6. [`engine`]    — local headless Chrome or a remote print service

pub mod engine;
pub mod render;
pub mod repair;
pub mod template;
pub mod validate;
pub mod watermark;
