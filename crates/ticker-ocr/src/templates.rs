use std::path::Path;

use analysis_core::AnalysisError;
use image::GrayImage;

use crate::font;
use crate::matcher::zero_mean;
use crate::preprocess::{ink_mask, normalize_glyph};

pub const DEFAULT_TEMPLATE_WIDTH: u32 = 30;
pub const DEFAULT_TEMPLATE_HEIGHT: u32 = 40;

/// Characters a ticker may contain, in built-in registration order
pub const TEMPLATE_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Font cell size used when rasterising built-in glyphs before normalization
const BUILTIN_RENDER_SCALE: u32 = 8;

/// Reference bitmap for one character, already normalized to store dimensions
#[derive(Debug, Clone)]
pub struct GlyphTemplate {
    character: char,
    bitmap: GrayImage,
    centered: Vec<f64>,
    energy: f64,
}

impl GlyphTemplate {
    pub fn new(character: char, bitmap: GrayImage) -> Result<Self, AnalysisError> {
        let (centered, energy) = zero_mean(&bitmap);
        if energy <= 0.0 {
            return Err(AnalysisError::Template(format!(
                "Template for '{}' is uniform",
                character
            )));
        }
        Ok(Self {
            character,
            bitmap,
            centered,
            energy,
        })
    }

    pub fn character(&self) -> char {
        self.character
    }

    pub fn bitmap(&self) -> &GrayImage {
        &self.bitmap
    }

    pub(crate) fn centered(&self) -> &[f64] {
        &self.centered
    }

    pub(crate) fn energy(&self) -> f64 {
        self.energy
    }
}

/// Immutable-after-load set of glyph templates.
///
/// Iteration follows registration order, which is also the tie-break order
/// used by the matcher.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    width: u32,
    height: u32,
    templates: Vec<GlyphTemplate>,
}

impl TemplateStore {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            templates: Vec::new(),
        }
    }

    /// Built-in templates at the default 30x40 size
    pub fn builtin() -> Result<Self, AnalysisError> {
        Self::builtin_with_size(DEFAULT_TEMPLATE_WIDTH, DEFAULT_TEMPLATE_HEIGHT)
    }

    /// Built-in templates at a custom size
    pub fn builtin_with_size(width: u32, height: u32) -> Result<Self, AnalysisError> {
        let mut store = Self::new(width, height);
        for ch in TEMPLATE_ALPHABET.chars() {
            store.insert_builtin(ch)?;
        }
        Ok(store)
    }

    /// Load `A.png` .. `9.png` from `dir`, falling back to the built-in glyph
    /// for any character without a file.
    pub fn from_dir(dir: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, AnalysisError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(AnalysisError::Template(format!(
                "Template directory not found: {}",
                dir.display()
            )));
        }

        let mut store = Self::new(width, height);
        let mut loaded = 0;
        for ch in TEMPLATE_ALPHABET.chars() {
            let path = dir.join(format!("{}.png", ch));
            if path.is_file() {
                let img = image::open(&path).map_err(|e| {
                    AnalysisError::Template(format!("{}: {}", path.display(), e))
                })?;
                store.insert(ch, &ink_mask(&img))?;
                loaded += 1;
            } else {
                tracing::debug!("No template file for '{}', using built-in glyph", ch);
                store.insert_builtin(ch)?;
            }
        }

        tracing::info!(
            "Loaded {} character templates ({} from {})",
            store.len(),
            loaded,
            dir.display()
        );
        Ok(store)
    }

    /// Normalize an ink mask to store dimensions and register it
    pub fn insert(&mut self, character: char, mask: &GrayImage) -> Result<(), AnalysisError> {
        let bitmap = normalize_glyph(mask, self.width, self.height).ok_or_else(|| {
            AnalysisError::Template(format!("Template for '{}' has no ink", character))
        })?;
        self.templates.push(GlyphTemplate::new(character, bitmap)?);
        Ok(())
    }

    /// Register a bitmap that is already at store dimensions, as-is
    pub fn insert_normalized(&mut self, character: char, bitmap: GrayImage) -> Result<(), AnalysisError> {
        if bitmap.dimensions() != (self.width, self.height) {
            return Err(AnalysisError::Template(format!(
                "Template for '{}' is {:?}, expected {}x{}",
                character,
                bitmap.dimensions(),
                self.width,
                self.height
            )));
        }
        self.templates.push(GlyphTemplate::new(character, bitmap)?);
        Ok(())
    }

    fn insert_builtin(&mut self, character: char) -> Result<(), AnalysisError> {
        let glyph = font::render_glyph(character, BUILTIN_RENDER_SCALE).ok_or_else(|| {
            AnalysisError::Template(format!("No built-in glyph for '{}'", character))
        })?;
        self.insert(character, &glyph)
    }

    /// First registered template for `character`
    pub fn get(&self, character: char) -> Option<&GlyphTemplate> {
        self.templates.iter().find(|t| t.character == character)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlyphTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
