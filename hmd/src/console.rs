use crate::data::OrientationSample;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{cursor, execute, queue};
use hmd_traits::HmdError;
use std::io::{self, Stdout, Write};
use std::time::Duration;

/// Number of console lines one sample occupies.
pub const DISPLAY_LINES: u16 = 3;

pub trait OrientationDisplay {
    fn render(&mut self, sample: &OrientationSample) -> Result<(), HmdError>;
}

/// Non-blocking check for a request to stop polling.
pub trait ExitSignal {
    fn exit_requested(&mut self) -> Result<bool, HmdError>;
}

/// Redraws the three angle lines in place, starting at a fixed anchor.
pub struct ConsoleDisplay<W: Write> {
    out: W,
    column: u16,
    row: u16,
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn with_anchor(out: W, column: u16, row: u16) -> Self {
        ConsoleDisplay { out, column, row }
    }

    /// Reserves the display lines below the cursor, so the anchor stays on
    /// screen even when the terminal has to scroll, and anchors there.
    pub fn anchored(mut out: W) -> Result<Self, HmdError> {
        for _ in 0..DISPLAY_LINES {
            queue!(out, Print("\r\n"))?;
        }
        out.flush()?;
        let (_, row) = cursor::position()?;
        Ok(Self::with_anchor(out, 0, row.saturating_sub(DISPLAY_LINES)))
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn format_line(label: &str, value: f32) -> String {
    format!("{:<7}{: >10.3}", format!("{}:", label), value)
}

impl<W: Write> OrientationDisplay for ConsoleDisplay<W> {
    fn render(&mut self, sample: &OrientationSample) -> Result<(), HmdError> {
        let lines = [("yaw", sample.yaw), ("pitch", sample.pitch), ("roll", sample.roll)];
        for (offset, (label, value)) in (0u16..).zip(lines) {
            queue!(
                self.out,
                cursor::MoveTo(self.column, self.row.saturating_add(offset)),
                Print(format_line(label, value)),
                Clear(ClearType::UntilNewLine)
            )?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Raw mode for the lifetime of the guard, so single key presses are seen
/// without waiting for Enter.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn enter() -> Result<Self, HmdError> {
        terminal::enable_raw_mode()?;
        let guard = TerminalGuard { _private: () };
        execute!(io::stdout(), cursor::Hide)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Print("\r\n"), cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

/// Log sink for `read_hmd`. Raw mode stops the terminal from returning the
/// carriage on `\n`, so line feeds are expanded while it is on.
pub struct StderrLog;

impl Write for StderrLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut err = io::stderr().lock();
        if terminal::is_raw_mode_enabled().unwrap_or(false) {
            write_crlf(&mut err, buf)?;
        } else {
            err.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn write_crlf<W: Write>(out: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut lines = buf.split(|&b| b == b'\n');
    if let Some(first) = lines.next() {
        out.write_all(first)?;
    }
    for line in lines {
        out.write_all(b"\r\n")?;
        out.write_all(line)?;
    }
    Ok(())
}

/// The stdout display used by `read_hmd`: raw mode plus an anchored console.
pub struct TerminalDisplay {
    console: ConsoleDisplay<Stdout>,
    _guard: TerminalGuard,
}

impl TerminalDisplay {
    pub fn open() -> Result<Self, HmdError> {
        let guard = TerminalGuard::enter()?;
        let console = ConsoleDisplay::anchored(io::stdout())?;
        Ok(TerminalDisplay { console, _guard: guard })
    }
}

impl OrientationDisplay for TerminalDisplay {
    fn render(&mut self, sample: &OrientationSample) -> Result<(), HmdError> {
        self.console.render(sample)
    }
}

/// Any key press, Ctrl+C included since raw mode swallows the signal.
pub struct KeyboardExit;

impl ExitSignal for KeyboardExit {
    fn exit_requested(&mut self) -> Result<bool, HmdError> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(sample: OrientationSample, column: u16, row: u16) -> String {
        let mut display = ConsoleDisplay::with_anchor(Vec::new(), column, row);
        display.render(&sample).unwrap();
        String::from_utf8(display.into_inner()).unwrap()
    }

    #[test]
    fn test_lines_are_padded_and_aligned() {
        assert_eq!(format_line("yaw", 12.5), "yaw:       12.500");
        assert_eq!(format_line("pitch", -3.25), "pitch:     -3.250");
        assert_eq!(format_line("roll", 0.0).len(), format_line("yaw", -179.999).len());
    }

    #[test]
    fn test_render_overwrites_at_anchor() {
        let out = rendered(OrientationSample { yaw: 12.5, pitch: -3.25, roll: 90.0 }, 0, 5);

        // Cursor positions are 1-based on the wire.
        let yaw_at = out.find("\x1b[6;1H").unwrap();
        let pitch_at = out.find("\x1b[7;1H").unwrap();
        let roll_at = out.find("\x1b[8;1H").unwrap();
        assert!(yaw_at < pitch_at && pitch_at < roll_at);

        assert!(out.contains("yaw:       12.500"));
        assert!(out.contains("pitch:     -3.250"));
        assert!(out.contains("roll:      90.000"));
        // Each line clears whatever a longer previous value left behind.
        assert_eq!(out.matches("\x1b[K").count(), 3);
    }

    #[test]
    fn test_same_anchor_every_render() {
        let mut display = ConsoleDisplay::with_anchor(Vec::new(), 2, 0);
        display.render(&OrientationSample::default()).unwrap();
        display.render(&OrientationSample { yaw: 1.0, ..OrientationSample::default() }).unwrap();

        let out = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(out.matches("\x1b[1;3H").count(), 2);
    }

    #[test]
    fn test_log_lines_return_the_carriage() {
        let mut out = Vec::new();
        write_crlf(&mut out, b"WARN first\nWARN second\n").unwrap();
        assert_eq!(out, b"WARN first\r\nWARN second\r\n");

        let mut out = Vec::new();
        write_crlf(&mut out, b"no newline").unwrap();
        assert_eq!(out, b"no newline");
    }
}
