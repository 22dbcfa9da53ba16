//! Keyboard layout descriptions.
//!
//! A layout lists the keyboard's zones; each zone is a rectangle split into
//! rows of keys. Keys are numbered in document order and that number is the
//! key's index in every color buffer and directive.
//!
//! ```toml
//! name = "compact"
//!
//! [[zone]]
//! zone = 0
//! x = 0
//! y = 0
//! width = 1500
//! height = 200
//! rows = [
//!   [ { code = 0x29, glyph = "esc" }, { width = 0.5 }, { code = 0x3a, glyph = "f1" } ],
//! ]
//! ```
//!
//! Key widths are relative: a key takes `width / row_total` of its zone's
//! width. An entry without a `code` is a spacer and only moves the next key.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Spanned;
use tracing::{debug, info, warn};

use crate::error::LayoutError;

/// Fixed-point scale for relative key widths
const WIDTH_SCALE: f64 = 1000.0;

/// Largest accepted relative key width
const MAX_KEY_WIDTH: f64 = 1000.0;

/// Inclusive rectangle in layout coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x0..=self.x1).contains(&x) && (self.y0..=self.y1).contains(&y)
    }
}

/// One physical key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Position in color buffers
    pub index: usize,
    /// Scan code
    pub code: u32,
    /// Upper-cased label, if any
    pub glyph: Option<String>,
    /// Block id of the zone the key belongs to
    pub zone: u32,
    pub rect: Rect,
}

/// Parsed keyboard layout
#[derive(Debug, Clone, Default)]
pub struct LayoutDescription {
    pub name: String,
    keys: Vec<Key>,
}

#[derive(Deserialize)]
struct LayoutDoc {
    #[serde(default)]
    name: String,
    #[serde(default)]
    zone: Vec<ZoneDoc>,
}

#[derive(Deserialize)]
struct ZoneDoc {
    zone: u32,
    x: u32,
    y: u32,
    width: Spanned<u32>,
    height: Spanned<u32>,
    rows: Spanned<Vec<Vec<KeyDoc>>>,
}

#[derive(Deserialize)]
struct KeyDoc {
    code: Option<u32>,
    glyph: Option<String>,
    width: Option<Spanned<f64>>,
}

impl LayoutDescription {
    /// Parse a layout document
    pub fn parse(content: &str) -> Result<Self, LayoutError> {
        let doc: LayoutDoc = toml::from_str(content).map_err(|e| LayoutError::Parse {
            line: e.span().map_or(1, |span| line_of(content, span.start)),
            message: e.message().to_string(),
        })?;

        let mut keys = Vec::new();
        for zone in &doc.zone {
            build_zone(zone, content, &mut keys)?;
        }
        debug!(name = %doc.name, keys = keys.len(), "parsed layout");
        Ok(Self {
            name: doc.name,
            keys,
        })
    }

    /// Read and parse a layout file
    pub fn from_path(path: &Path) -> Result<Self, LayoutError> {
        let content = std::fs::read_to_string(path).map_err(|source| LayoutError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut layout = Self::parse(&content)?;
        if layout.name.is_empty() {
            if let Some(stem) = path.file_stem() {
                layout.name = stem.to_string_lossy().into_owned();
            }
        }
        Ok(layout)
    }

    /// Load a layout by file name.
    ///
    /// A name containing a path separator is opened as is. Otherwise it is
    /// looked up under `keylight/layouts` in the user data directory, then in
    /// each of `$XDG_DATA_DIRS`. The first candidate that parses wins.
    pub fn load_file(name: &str) -> Result<Self, LayoutError> {
        if name.contains(std::path::MAIN_SEPARATOR) {
            return Self::from_path(Path::new(name));
        }
        Self::search(name, &layout_dirs())
    }

    /// Load `name` from the first of `dirs` holding a valid layout.
    ///
    /// Unreadable and malformed candidates are logged and skipped.
    pub fn search(name: &str, dirs: &[PathBuf]) -> Result<Self, LayoutError> {
        for dir in dirs {
            let candidate = dir.join(name);
            match Self::from_path(&candidate) {
                Ok(layout) => {
                    info!(path = %candidate.display(), keys = layout.len(), "loaded layout");
                    return Ok(layout);
                }
                Err(LayoutError::Io { path, source }) => {
                    debug!(path = %path.display(), error = %source, "layout candidate unavailable");
                }
                Err(LayoutError::Parse { line, message }) => {
                    warn!(
                        path = %candidate.display(),
                        line,
                        %message,
                        "skipping malformed layout"
                    );
                }
                Err(e) => {
                    warn!(path = %candidate.display(), error = %e, "skipping layout");
                }
            }
        }
        Err(LayoutError::NotFound(name.to_string()))
    }

    /// All keys, in index order
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn key(&self, index: usize) -> Option<&Key> {
        self.keys.get(index)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Look a key up by glyph, ignoring case
    pub fn find(&self, glyph: &str) -> Option<&Key> {
        self.keys.iter().find(|k| {
            k.glyph
                .as_deref()
                .is_some_and(|g| g.eq_ignore_ascii_case(glyph))
        })
    }

    /// Per-key labels for display; keys without a glyph show their code
    pub fn labels(&self) -> Vec<String> {
        self.keys
            .iter()
            .map(|k| k.glyph.clone().unwrap_or_else(|| format!("{:02x}", k.code)))
            .collect()
    }
}

const OUT_OF_RANGE: &str = "zone extends past the coordinate range";

fn build_zone(zone: &ZoneDoc, content: &str, keys: &mut Vec<Key>) -> Result<(), LayoutError> {
    let width = *zone.width.get_ref();
    let height = *zone.height.get_ref();
    if zone.x.checked_add(width).is_none() {
        return Err(parse_error(content, zone.width.span(), OUT_OF_RANGE));
    }
    if zone.y.checked_add(height).is_none() {
        return Err(parse_error(content, zone.height.span(), OUT_OF_RANGE));
    }

    let rows = zone.rows.get_ref();
    if rows.is_empty() {
        return Err(parse_error(content, zone.rows.span(), "zone has no rows"));
    }
    let row_count = u32::try_from(rows.len()).unwrap_or(u32::MAX);
    let row_height = height / row_count;

    for (row_index, row) in rows.iter().enumerate() {
        let mut widths = Vec::with_capacity(row.len());
        for entry in row {
            widths.push(width_milli(entry, content)?);
        }
        let total: u64 = widths.iter().sum();
        if total == 0 {
            continue;
        }

        let y0 = zone.y + row_index as u32 * row_height;
        let mut offset: u64 = 0;
        for (entry, w) in row.iter().zip(widths) {
            // w <= MAX_KEY_WIDTH * WIDTH_SCALE; keys never extend past the zone
            let key_width = u64::from(width) * w / total;
            let x0 = zone.x + offset as u32;
            offset += key_width;

            let Some(code) = entry.code else {
                continue;
            };
            keys.push(Key {
                index: keys.len(),
                code,
                glyph: entry
                    .glyph
                    .as_deref()
                    .filter(|g| !g.is_empty())
                    .map(str::to_uppercase),
                zone: zone.zone,
                rect: Rect {
                    x0,
                    y0,
                    x1: x0 + (key_width as u32).saturating_sub(1),
                    y1: y0 + row_height.saturating_sub(1),
                },
            });
        }
    }
    Ok(())
}

/// Relative width scaled to an integer; default 1.0
fn width_milli(entry: &KeyDoc, content: &str) -> Result<u64, LayoutError> {
    let Some(width) = &entry.width else {
        return Ok(WIDTH_SCALE as u64);
    };
    let value = *width.get_ref();
    if !value.is_finite() || value <= 0.0 {
        return Err(parse_error(
            content,
            width.span(),
            &format!("key width must be positive, got {value}"),
        ));
    }
    if value > MAX_KEY_WIDTH {
        return Err(parse_error(
            content,
            width.span(),
            &format!("key width {value} is larger than {MAX_KEY_WIDTH}"),
        ));
    }
    Ok((value * WIDTH_SCALE).round() as u64)
}

fn parse_error(content: &str, span: Range<usize>, message: &str) -> LayoutError {
    LayoutError::Parse {
        line: line_of(content, span.start),
        message: message.to_string(),
    }
}

/// 1-based line containing byte `offset`
fn line_of(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// Directories searched by [`LayoutDescription::load_file`], in order
pub fn layout_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(data) = dirs::data_dir() {
        dirs.push(data);
    }
    let system = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    dirs.extend(system.split(':').filter(|d| !d.is_empty()).map(PathBuf::from));
    dirs.into_iter()
        .map(|d| d.join("keylight").join("layouts"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPACT: &str = r#"
name = "compact"

[[zone]]
zone = 0
x = 0
y = 0
width = 1500
height = 200
rows = [
  [ { code = 0x29, glyph = "esc" }, { width = 0.5 }, { code = 0x3a, glyph = "f1", width = 1.5 } ],
  [ { code = 0x04, glyph = "a" }, { code = 0x05, glyph = "b" }, { code = 0x06 } ],
]

[[zone]]
zone = 1
x = 1600
y = 0
width = 100
height = 100
rows = [ [ { code = 0x4b, glyph = "PgUp" } ] ]
"#;

    #[test]
    fn test_parse_compact() {
        let layout = LayoutDescription::parse(COMPACT).unwrap();
        assert_eq!(layout.name, "compact");
        assert_eq!(layout.len(), 6);
        for (i, key) in layout.keys().iter().enumerate() {
            assert_eq!(key.index, i);
        }

        // Row widths 1 + 0.5 + 1.5 = 3 over 1500 units
        let esc = layout.key(0).unwrap();
        assert_eq!(esc.rect, Rect { x0: 0, y0: 0, x1: 499, y1: 99 });
        let f1 = layout.key(1).unwrap();
        assert_eq!(f1.glyph.as_deref(), Some("F1"));
        assert_eq!(f1.rect, Rect { x0: 750, y0: 0, x1: 1499, y1: 99 });
        assert_eq!(f1.rect.width(), 750);

        let b = layout.find("B").unwrap();
        assert_eq!(b.rect, Rect { x0: 500, y0: 100, x1: 999, y1: 199 });
        assert!(b.rect.contains(500, 150));
        assert!(!b.rect.contains(1000, 150));

        let pgup = layout.key(5).unwrap();
        assert_eq!(pgup.zone, 1);
        assert_eq!(pgup.rect, Rect { x0: 1600, y0: 0, x1: 1699, y1: 99 });
    }

    #[test]
    fn test_find_ignores_case() {
        let layout = LayoutDescription::parse(COMPACT).unwrap();
        assert_eq!(layout.find("esc").unwrap().code, 0x29);
        assert_eq!(layout.find("pgup").unwrap().index, 5);
        assert!(layout.find("f12").is_none());
    }

    #[test]
    fn test_labels() {
        let layout = LayoutDescription::parse(COMPACT).unwrap();
        assert_eq!(layout.labels(), vec!["ESC", "F1", "A", "B", "06", "PGUP"]);
    }

    #[test]
    fn test_non_numeric_code_reports_line() {
        let doc = "[[zone]]\nzone = 0\nx = 0\ny = 0\nwidth = 10\nheight = 10\nrows = [\n  [ { code = \"esc\" } ],\n]\n";
        let err = LayoutDescription::parse(doc).unwrap_err();
        assert_eq!(err.line(), Some(8), "{err}");
    }

    #[test]
    fn test_missing_attribute_is_parse_error() {
        let doc = "[[zone]]\nzone = 0\nx = 0\ny = 0\nwidth = 10\nrows = [ [ { code = 1 } ] ]\n";
        let err = LayoutDescription::parse(doc).unwrap_err();
        assert!(matches!(err, LayoutError::Parse { .. }));
        assert!(err.to_string().contains("height"), "{err}");
    }

    #[test]
    fn test_bad_width_reports_line() {
        let doc = "[[zone]]\nzone = 0\nx = 0\ny = 0\nwidth = 10\nheight = 10\nrows = [\n  [ { code = 1 } ],\n  [ { code = 2, width = -1.0 } ],\n]\n";
        let err = LayoutDescription::parse(doc).unwrap_err();
        assert_eq!(err.line(), Some(9), "{err}");
    }

    #[test]
    fn test_empty_rows_rejected() {
        let doc = "[[zone]]\nzone = 0\nx = 0\ny = 0\nwidth = 10\nheight = 10\nrows = []\n";
        let err = LayoutDescription::parse(doc).unwrap_err();
        assert_eq!(err.line(), Some(7));
    }

    #[test]
    fn test_not_found() {
        let err = LayoutDescription::load_file("definitely-not-a-layout-5f3a.toml").unwrap_err();
        assert!(matches!(err, LayoutError::NotFound(_)));
    }

    #[test]
    fn test_huge_key_width_rejected() {
        let doc = "[[zone]]\nzone = 0\nx = 0\ny = 0\nwidth = 4000000000\nheight = 10\nrows = [\n  [ { code = 1, width = 1e20 }, { code = 2 } ],\n]\n";
        let err = LayoutDescription::parse(doc).unwrap_err();
        assert!(matches!(err, LayoutError::Parse { .. }));
        assert_eq!(err.line(), Some(8), "{err}");
    }

    #[test]
    fn test_widest_accepted_key() {
        let doc = "[[zone]]\nzone = 0\nx = 0\ny = 0\nwidth = 4000000000\nheight = 10\nrows = [\n  [ { code = 1, width = 1000.0 }, { code = 2, width = 1000.0 } ],\n]\n";
        let layout = LayoutDescription::parse(doc).unwrap();
        assert_eq!(layout.key(0).unwrap().rect.width(), 2_000_000_000);
        assert_eq!(layout.key(1).unwrap().rect.x1, 3_999_999_999);
    }

    #[test]
    fn test_zone_past_coordinate_range() {
        let doc = "[[zone]]\nzone = 0\nx = 4000000000\ny = 0\nwidth = 400000000\nheight = 10\nrows = [ [ { code = 1 } ] ]\n";
        let err = LayoutDescription::parse(doc).unwrap_err();
        assert_eq!(err.line(), Some(5), "{err}");

        let doc = "[[zone]]\nzone = 0\nx = 0\ny = 4294967295\nwidth = 10\nheight = 1\nrows = [ [ { code = 1 } ] ]\n";
        let err = LayoutDescription::parse(doc).unwrap_err();
        assert_eq!(err.line(), Some(6), "{err}");
    }

    #[test]
    fn test_search_skips_malformed_candidate() {
        let broken = tempfile::tempdir().unwrap();
        let valid = tempfile::tempdir().unwrap();
        std::fs::write(broken.path().join("compact.toml"), "[[zone]]\nzone = \"x\"\n").unwrap();
        std::fs::write(valid.path().join("compact.toml"), COMPACT).unwrap();

        let dirs = vec![broken.path().to_path_buf(), valid.path().to_path_buf()];
        let layout = LayoutDescription::search("compact.toml", &dirs).unwrap();
        assert_eq!(layout.name, "compact");
        assert_eq!(layout.len(), 6);
    }

    #[test]
    fn test_search_all_malformed_is_not_found() {
        let broken = tempfile::tempdir().unwrap();
        std::fs::write(broken.path().join("compact.toml"), "rows = [").unwrap();

        let dirs = vec![broken.path().to_path_buf()];
        let err = LayoutDescription::search("compact.toml", &dirs).unwrap_err();
        assert!(matches!(err, LayoutError::NotFound(ref n) if n == "compact.toml"));
    }

    #[test]
    fn test_line_of() {
        assert_eq!(line_of("a\nb\nc", 0), 1);
        assert_eq!(line_of("a\nb\nc", 2), 2);
        assert_eq!(line_of("a\nb\nc", 100), 3);
    }
}
