//! Template-matching OCR for ticker symbols on screen captures.
//!
//! Pipeline: binarize the capture, label connected glyph-sized regions,
//! group them into left-to-right runs and classify every region against an
//! immutable set of glyph templates. Only runs of 3-5 confidently matched
//! characters come out as [`TickerString`]s.

pub mod font;
pub mod matcher;
pub mod preprocess;
pub mod segmenter;
pub mod templates;

pub use matcher::{CharacterMatcher, GlyphMatch, MatcherConfig};
pub use segmenter::{CandidateRegion, CandidateRun, SegmenterConfig, TickerSegmenter, TickerString};
pub use templates::{GlyphTemplate, TemplateStore, DEFAULT_TEMPLATE_HEIGHT, DEFAULT_TEMPLATE_WIDTH, TEMPLATE_ALPHABET};
