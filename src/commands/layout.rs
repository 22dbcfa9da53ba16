use std::path::Path;

use anyhow::{Context, Result};
use keylight::layout::LayoutDescription;

/// Parse a layout and print its key table
pub fn show(file: &str) -> Result<()> {
    let path = Path::new(file);
    let layout = if path.is_file() {
        LayoutDescription::from_path(path)
    } else {
        LayoutDescription::load_file(file)
    }
    .with_context(|| format!("layout {file}"))?;

    let name = if layout.name.is_empty() {
        file
    } else {
        layout.name.as_str()
    };
    println!("Layout: {name} ({} keys)", layout.len());
    println!();
    println!(
        "{:<6} {:<6} {:<10} {:<5} Rect (x0,y0)-(x1,y1)",
        "Index", "Code", "Glyph", "Zone"
    );
    println!("{}", "-".repeat(60));

    for key in layout.keys() {
        println!(
            "{:<6} 0x{:<4x} {:<10} {:<5} ({},{})-({},{})",
            key.index,
            key.code,
            key.glyph.as_deref().unwrap_or("-"),
            key.zone,
            key.rect.x0,
            key.rect.y0,
            key.rect.x1,
            key.rect.y1
        );
    }

    Ok(())
}
