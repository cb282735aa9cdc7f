//! Text width measurement.
//!
//! Sizing only ever needs the advance width of a single line of text, so the
//! measurer contract is one method. [`SystemFontMeasurer`] resolves real
//! system fonts through fontdb and reads glyph advances with ttf-parser;
//! [`HeuristicMeasurer`] uses per-character width factors and is fully
//! deterministic.

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;
use ttf_parser::Face;

pub trait TextMeasurer {
    /// Rendered width in pixels of `text` set on one line in `font`.
    fn text_width(&self, text: &str, font: &FontSpec) -> f32;
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for &T {
    fn text_width(&self, text: &str, font: &FontSpec) -> f32 {
        (**self).text_width(text, font)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontWeight {
    Normal,
    Bold,
}

/// A font descriptor, written in configuration as CSS-like shorthand such as
/// `bold 20px system-ui`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FontSpec {
    pub family: String,
    pub size: f32,
    pub weight: FontWeight,
}

impl FontSpec {
    pub fn new(family: impl Into<String>, size: f32, weight: FontWeight) -> Self {
        Self {
            family: family.into(),
            size,
            weight,
        }
    }

    pub fn regular(family: impl Into<String>, size: f32) -> Self {
        Self::new(family, size, FontWeight::Normal)
    }

    pub fn bold(family: impl Into<String>, size: f32) -> Self {
        Self::new(family, size, FontWeight::Bold)
    }

    /// Parses `[weight] <size>px <family...>`.
    pub fn parse(shorthand: &str) -> Option<Self> {
        let mut weight = FontWeight::Normal;
        let mut rest = shorthand.trim();
        if let Some((first, tail)) = rest.split_once(char::is_whitespace) {
            match first {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => {
                    weight = FontWeight::Bold;
                    rest = tail.trim_start();
                }
                "normal" | "400" => rest = tail.trim_start(),
                _ => {}
            }
        }
        let (size_token, family) = rest.split_once(char::is_whitespace)?;
        let size: f32 = size_token.strip_suffix("px")?.parse().ok()?;
        let family = family.trim();
        if family.is_empty() || size <= 0.0 {
            return None;
        }
        Some(Self::new(family, size, weight))
    }
}

impl fmt::Display for FontSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weight == FontWeight::Bold {
            write!(f, "bold ")?;
        }
        write!(f, "{}px {}", self.size, self.family)
    }
}

impl TryFrom<String> for FontSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid font shorthand `{value}`"))
    }
}

impl From<FontSpec> for String {
    fn from(value: FontSpec) -> Self {
        value.to_string()
    }
}

/// Measures with fonts installed on the host, falling back to
/// [`HeuristicMeasurer`] when the requested family cannot be resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFontMeasurer;

impl TextMeasurer for SystemFontMeasurer {
    fn text_width(&self, text: &str, font: &FontSpec) -> f32 {
        measure_text_width(text, font)
            .unwrap_or_else(|| HeuristicMeasurer.text_width(text, font))
    }
}

/// Font-free estimate from calibrated per-character width factors.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicMeasurer;

const BOLD_WIDTH_FACTOR: f32 = 1.07;

impl TextMeasurer for HeuristicMeasurer {
    fn text_width(&self, text: &str, font: &FontSpec) -> f32 {
        let base: f32 = text.chars().map(char_width_factor).sum::<f32>() * font.size;
        match font.weight {
            FontWeight::Bold => base * BOLD_WIDTH_FACTOR,
            FontWeight::Normal => base,
        }
    }
}

fn char_width_factor(ch: char) -> f32 {
    match ch {
        ' ' => 0.28,
        'i' | 'j' | 'l' | 'I' | '\'' | '|' | '!' | '.' | ',' | ':' | ';' => 0.25,
        'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '{' | '}' | '-' => 0.34,
        'm' | 'w' => 0.84,
        'M' | 'W' => 0.92,
        '@' | '%' | '&' | '#' => 0.9,
        '0'..='9' => 0.6,
        'A'..='Z' => 0.68,
        'a'..='z' => 0.56,
        c if is_wide(c) => 1.0,
        _ => 0.6,
    }
}

fn is_wide(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6)
}

static FONT_CACHE: Lazy<Mutex<FontCache>> = Lazy::new(|| Mutex::new(FontCache::new()));

/// Width of `text` using a system font, or `None` if no face resolves.
pub fn measure_text_width(text: &str, font: &FontSpec) -> Option<f32> {
    if text.is_empty() || font.size <= 0.0 {
        return Some(0.0);
    }
    let mut guard = FONT_CACHE.lock().ok()?;
    guard.measure(text, font)
}

struct FontCache {
    db: Database,
    loaded_system_fonts: bool,
    faces: HashMap<String, Option<FontFace>>,
}

impl FontCache {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            faces: HashMap::new(),
        }
    }

    fn measure(&mut self, text: &str, font: &FontSpec) -> Option<f32> {
        let key = face_key(&font.family, font.weight);
        if !self.faces.contains_key(&key) {
            let face = self.load_face(&font.family, font.weight, &key);
            if face.is_none() {
                tracing::debug!(family = %font.family, "no system font resolved; using heuristic widths");
            }
            self.faces.insert(key.clone(), face);
        }
        let face = self.faces.get_mut(&key)?.as_mut()?;
        face.measure_width(&text.replace('\t', "    "), font.size)
    }

    fn load_face(&mut self, font_family: &str, weight: FontWeight, key: &str) -> Option<FontFace> {
        if let Some(face) = load_cached_face(key) {
            return Some(face);
        }

        let names: Vec<String> = font_family
            .split(',')
            .map(|part| part.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|name| !name.is_empty())
            .collect();
        let mut families: Vec<Family<'_>> = names.iter().map(|name| generic_family(name)).collect();
        if families.is_empty() {
            families.push(Family::SansSerif);
        }

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: match weight {
                FontWeight::Bold => Weight::BOLD,
                FontWeight::Normal => Weight::NORMAL,
            },
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        let mut loaded: Option<FontFace> = None;
        self.db.with_face_data(id, |data, index| {
            let bytes = data.to_vec();
            if let Some(face) = FontFace::new(bytes, index) {
                store_cached_face(key, &face);
                loaded = Some(face);
            }
        });
        loaded
    }
}

fn generic_family(name: &str) -> Family<'_> {
    match name.to_ascii_lowercase().as_str() {
        "serif" => Family::Serif,
        "sans-serif" | "system-ui" | "-apple-system" | "ui-sans-serif" => Family::SansSerif,
        "monospace" | "ui-monospace" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        _ => Family::Name(name),
    }
}

struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    ascii_advances: [u16; 128],
    advance_cache: HashMap<char, Option<u16>>,
}

impl FontFace {
    fn new(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let units_per_em = face.units_per_em().max(1);
        let mut ascii_advances = [0u16; 128];
        for byte in 0u8..=127 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii_advances[byte as usize] = face.glyph_hor_advance(glyph).unwrap_or(0);
            }
        }
        Some(Self {
            data,
            index,
            units_per_em,
            ascii_advances,
            advance_cache: HashMap::new(),
        })
    }

    fn measure_width(&mut self, text: &str, font_size: f32) -> Option<f32> {
        let scale = font_size / self.units_per_em as f32;
        let fallback = font_size * 0.56;
        let mut width = 0.0f32;
        let mut face: Option<Face<'_>> = None;

        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let advance = if ch.is_ascii() {
                Some(self.ascii_advances[ch as usize]).filter(|adv| *adv > 0)
            } else if let Some(cached) = self.advance_cache.get(&ch) {
                *cached
            } else {
                if face.is_none() {
                    face = Face::parse(&self.data, self.index).ok();
                }
                let value = face.as_ref().and_then(|parsed| {
                    let glyph = parsed.glyph_index(ch)?;
                    parsed.glyph_hor_advance(glyph)
                });
                self.advance_cache.insert(ch, value);
                value
            };
            match advance {
                Some(units) => width += units as f32 * scale,
                None => width += fallback,
            }
        }

        Some(width.max(0.0))
    }
}

fn face_key(font_family: &str, weight: FontWeight) -> String {
    let trimmed = font_family.trim();
    let family = if trimmed.is_empty() { "sans-serif" } else { trimmed };
    match weight {
        FontWeight::Bold => format!("{family}#bold"),
        FontWeight::Normal => family.to_string(),
    }
}

fn cache_paths(key: &str) -> Option<(PathBuf, PathBuf)> {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    let dir = base.join("crmviz").join("font-cache");
    Some((dir.join(format!("{hash:x}.font")), dir.join(format!("{hash:x}.meta"))))
}

fn load_cached_face(key: &str) -> Option<FontFace> {
    let (font_path, meta_path) = cache_paths(key)?;
    if !font_path.exists() || !meta_path.exists() {
        return None;
    }
    let bytes = fs::read(font_path).ok()?;
    let index: u32 = fs::read_to_string(meta_path).ok()?.trim().parse().ok()?;
    FontFace::new(bytes, index)
}

fn store_cached_face(key: &str, face: &FontFace) {
    let Some((font_path, meta_path)) = cache_paths(key) else {
        return;
    };
    if font_path.exists() {
        return;
    }
    if let Some(parent) = font_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    // Best effort; a failed write only costs a font lookup next run.
    let _ = fs::write(&font_path, &face.data);
    let _ = fs::write(&meta_path, face.index.to_string());
}
