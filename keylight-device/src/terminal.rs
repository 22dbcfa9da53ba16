//! Terminal preview device using crossterm.
//!
//! Draws the keys as a grid of true-color cells in an alternate screen.
//! Directives update an in-memory color model; `commit` redraws and flushes.

use std::io::{self, Stdout, Write};

use crossterm::{
    cursor,
    style::{self, Color, Stylize},
    terminal, ExecutableCommand, QueueableCommand,
};
use tracing::debug;

use crate::{check_directives, ColorDirective, Device, DeviceError, RgbaColor};

/// Width of each cell in characters.
const CELL_W: usize = 5;
/// Header line plus a blank line.
const GRID_TOP: u16 = 2;

/// Keyboard preview drawn in the terminal
pub struct TerminalDevice<W: Write = Stdout> {
    colors: Vec<RgbaColor>,
    staged: Vec<ColorDirective>,
    labels: Vec<String>,
    columns: usize,
    commits: u64,
    out: W,
}

impl TerminalDevice {
    /// Enter the alternate screen and draw `key_count` black keys,
    /// `columns` per row.
    pub fn open(key_count: usize, columns: usize) -> Result<Self, DeviceError> {
        let labels = (0..key_count).map(|i| i.to_string()).collect();
        Self::open_with_labels(labels, columns)
    }

    /// Like [`open`](Self::open) with one label per key (truncated to 3 chars)
    pub fn open_with_labels(labels: Vec<String>, columns: usize) -> Result<Self, DeviceError> {
        Self::with_writer(io::stdout(), labels, columns)
    }
}

impl<W: Write> TerminalDevice<W> {
    /// Draw the preview to `out` instead of stdout.
    ///
    /// If setting up the screen fails, the alternate screen is left again.
    pub fn with_writer(out: W, labels: Vec<String>, columns: usize) -> Result<Self, DeviceError> {
        let mut dev = Self {
            colors: vec![RgbaColor::BLACK; labels.len()],
            staged: Vec::new(),
            labels: labels
                .into_iter()
                .map(|l| l.chars().take(3).collect())
                .collect(),
            columns: columns.max(1),
            commits: 0,
            out,
        };
        // From here on Drop restores the terminal
        dev.out
            .execute(terminal::EnterAlternateScreen)?
            .execute(cursor::Hide)?
            .execute(terminal::Clear(terminal::ClearType::All))?;
        dev.draw()?;
        Ok(dev)
    }

    /// The writer the preview is drawn to
    pub fn writer(&self) -> &W {
        &self.out
    }

    fn draw(&mut self) -> io::Result<()> {
        self.out.queue(cursor::MoveTo(0, 0))?;
        self.out.queue(style::PrintStyledContent(
            format!(
                " keylight preview  |  {} keys  |  commit #{}  |  Ctrl+C to quit ",
                self.colors.len(),
                self.commits
            )
            .with(Color::White)
            .on(Color::DarkGrey),
        ))?;

        for (idx, color) in self.colors.iter().enumerate() {
            let row = idx / self.columns;
            let col = idx % self.columns;
            self.out.queue(cursor::MoveTo(
                (col * CELL_W) as u16,
                GRID_TOP + row as u16,
            ))?;

            // Readable label on any background
            let lum = (color.r as u16 + color.g as u16 + color.b as u16) / 3;
            let fg = if lum > 128 { Color::Black } else { Color::White };
            let bg = Color::Rgb {
                r: color.r,
                g: color.g,
                b: color.b,
            };
            self.out.queue(style::PrintStyledContent(
                format!("{:^width$}", self.labels[idx], width = CELL_W)
                    .with(fg)
                    .on(bg),
            ))?;
        }
        self.out.flush()
    }
}

impl<W: Write + Send> Device for TerminalDevice<W> {
    fn name(&self) -> &str {
        "terminal preview"
    }

    fn key_count(&self) -> usize {
        self.colors.len()
    }

    fn read_current_state(&mut self) -> Result<Vec<RgbaColor>, DeviceError> {
        Ok(self.colors.clone())
    }

    fn apply_directives(&mut self, directives: &[ColorDirective]) -> Result<(), DeviceError> {
        check_directives(directives, self.colors.len())?;
        self.staged.extend_from_slice(directives);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DeviceError> {
        for directive in std::mem::take(&mut self.staged) {
            self.colors[directive.keys()].fill(directive.color);
        }
        self.commits += 1;
        self.draw()?;
        Ok(())
    }
}

impl<W: Write> Drop for TerminalDevice<W> {
    fn drop(&mut self) {
        debug!(commits = self.commits, "closing terminal preview");
        self.out.execute(cursor::Show).ok();
        self.out.execute(terminal::LeaveAlternateScreen).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const ENTER_ALT: &str = "\x1b[?1049h";
    const LEAVE_ALT: &str = "\x1b[?1049l";
    const HIDE_CURSOR: &str = "\x1b[?25l";

    /// Shared output; optionally rejects writes containing `fail_on`
    #[derive(Clone, Default)]
    struct Screen {
        bytes: Arc<Mutex<Vec<u8>>>,
        fail_on: Option<&'static str>,
    }

    impl Screen {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.bytes.lock()).into_owned()
        }
    }

    impl Write for Screen {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(pattern) = self.fail_on {
                if String::from_utf8_lossy(buf).contains(pattern) {
                    return Err(io::Error::other("terminal gone"));
                }
            }
            self.bytes.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key{i}")).collect()
    }

    #[test]
    fn test_failed_setup_leaves_alternate_screen() {
        let screen = Screen {
            fail_on: Some(HIDE_CURSOR),
            ..Screen::default()
        };
        let result = TerminalDevice::with_writer(screen.clone(), labels(4), 2);
        assert!(result.is_err());

        let text = screen.text();
        let enter = text.find(ENTER_ALT).unwrap();
        let leave = text.find(LEAVE_ALT).unwrap();
        assert!(leave > enter);
    }

    #[test]
    fn test_drop_leaves_alternate_screen() {
        let screen = Screen::default();
        let dev = TerminalDevice::with_writer(screen.clone(), labels(3), 3).unwrap();
        assert!(!screen.text().contains(LEAVE_ALT));
        drop(dev);
        assert!(screen.text().ends_with(LEAVE_ALT));
    }

    #[test]
    fn test_commit_applies_staged_directives() {
        let screen = Screen::default();
        let mut dev = TerminalDevice::with_writer(screen.clone(), labels(4), 2).unwrap();
        assert_eq!(dev.key_count(), 4);
        assert_eq!(dev.writer().text().matches("commit #0").count(), 1);

        dev.apply_directives(&[ColorDirective::new(1, 2, RgbaColor::RED)])
            .unwrap();
        assert_eq!(dev.read_current_state().unwrap()[1], RgbaColor::BLACK);

        dev.commit().unwrap();
        let state = dev.read_current_state().unwrap();
        assert_eq!(
            state,
            vec![RgbaColor::BLACK, RgbaColor::RED, RgbaColor::RED, RgbaColor::BLACK]
        );
        assert!(screen.text().contains("commit #1"));
    }

    #[test]
    fn test_out_of_range_directive_rejected() {
        let mut dev = TerminalDevice::with_writer(Screen::default(), labels(2), 2).unwrap();
        assert!(dev
            .apply_directives(&[ColorDirective::single(2, RgbaColor::RED)])
            .is_err());
    }
}
