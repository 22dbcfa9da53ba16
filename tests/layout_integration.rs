//! Integration tests for layout loading using the bundled layouts.

use std::path::Path;

use keylight::layout::Rect;
use keylight::{LayoutDescription, LayoutError};

fn compact() -> LayoutDescription {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("layouts/compact.toml");
    LayoutDescription::from_path(&path).unwrap()
}

#[test]
fn compact_layout_key_numbering() {
    let layout = compact();
    assert_eq!(layout.name, "compact");
    assert_eq!(layout.len(), 29);
    assert_eq!(layout.find("W").unwrap().index, 13);
    assert_eq!(layout.find("a").unwrap().index, 18);
    assert_eq!(layout.find("D").unwrap().index, 20);
    assert_eq!(layout.find("ins").unwrap().index, 23);
}

#[test]
fn compact_layout_proportional_widths() {
    let layout = compact();

    // Row 0: esc 1 + spacer 0.5 + 4 x 1 = 5.5 units over 1500
    let esc = layout.find("esc").unwrap();
    assert_eq!(esc.rect, Rect { x0: 0, y0: 0, x1: 271, y1: 99 });
    let f1 = layout.find("f1").unwrap();
    assert_eq!(f1.rect.x0, 272 + 136);
    assert_eq!(f1.rect.width(), 272);

    // Row 1: 5 x 1 + 1.5 = 6.5 units
    let bksp = layout.find("bksp").unwrap();
    assert_eq!(bksp.rect, Rect { x0: 1150, y0: 100, x1: 1495, y1: 199 });

    // Row 3: caps 1.75 + 5 x 1 = 6.75 units
    let caps = layout.find("caps").unwrap();
    assert_eq!(caps.rect.width(), 388);
    let a = layout.find("a").unwrap();
    assert_eq!(a.rect, Rect { x0: 388, y0: 300, x1: 609, y1: 399 });
}

#[test]
fn compact_layout_second_zone() {
    let layout = compact();
    let pgdn = layout.find("pgdn").unwrap();
    assert_eq!(pgdn.zone, 1);
    assert_eq!(pgdn.index, 28);
    assert_eq!(pgdn.rect, Rect { x0: 1800, y0: 200, x1: 1899, y1: 299 });
}

#[test]
fn missing_file_is_io_error() {
    let err = LayoutDescription::from_path(Path::new("/nonexistent/compact.toml")).unwrap_err();
    assert!(matches!(err, LayoutError::Io { .. }));
    assert_eq!(err.line(), None);
}
