//! Live terminal rendering of the visible history.
//!
//! The turn loop publishes a full copy of the history after every delta. Most updates
//! only extend the bot text of the last row (streaming narration), which is printed as
//! a suffix. When the text changes in place (the in-progress code block is replaced by
//! the finished one) the row is erased and reprinted.
//!
//! User halves of rows are not printed: the prompt already echoed them.

use std::io::{self, Write};

use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use nu_ansi_term::Color as AnsiColor;

use crate::conversation::{DisplayContent, DisplayEntry, DisplayHistory};

const DEFAULT_WIDTH: usize = 80;

/// Text printed for the bot half of a row.
fn row_text(entry: &DisplayEntry) -> String {
    match &entry.bot {
        Some(DisplayContent::Markdown(text)) => text.clone(),
        Some(DisplayContent::Image(path)) => AnsiColor::DarkGray
            .paint(format!("🖼  {}", path.display()))
            .to_string(),
        None => String::new(),
    }
}

/// Terminal rows `text` occupies at `width` columns, minus one (the cursor row).
fn rows_above_cursor(text: &str, width: usize) -> usize {
    let width = width.max(1);
    let rows: usize = text
        .split('\n')
        .map(|line| line.chars().count().max(1).div_ceil(width))
        .sum();
    rows.saturating_sub(1)
}

/// Streams history updates to a terminal.
pub struct HistoryRenderer<W: Write> {
    out: W,
    width: usize,
    /// Rows already printed in full.
    rows_done: usize,
    /// What is on screen for the row in progress.
    current: String,
}

impl HistoryRenderer<io::Stdout> {
    /// Render to stdout at the current terminal width.
    pub fn stdout() -> Self {
        let width = terminal::size()
            .map(|(w, _)| w as usize)
            .unwrap_or(DEFAULT_WIDTH);
        Self::new(io::stdout(), width)
    }
}

impl<W: Write> HistoryRenderer<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width: width.max(1),
            rows_done: 0,
            current: String::new(),
        }
    }

    /// Line up with a history whose rows are already on screen, except the last one
    /// which is about to receive a reply.
    pub fn begin(&mut self, history: &DisplayHistory) {
        self.rows_done = history.len().saturating_sub(1);
        self.current = history.last().map(row_text).unwrap_or_default();
    }

    /// Bring the screen up to date with `history`.
    pub fn update(&mut self, history: &DisplayHistory) -> io::Result<()> {
        let entries = history.entries();
        if entries.len() < self.rows_done {
            self.rows_done = entries.len();
            self.current.clear();
            return Ok(());
        }

        while self.rows_done + 1 < entries.len() {
            self.paint(&row_text(&entries[self.rows_done]))?;
            if !self.current.is_empty() {
                queue!(self.out, Print("\n"))?;
            }
            self.rows_done += 1;
            self.current.clear();
        }

        if let Some(last) = entries.get(self.rows_done) {
            self.paint(&row_text(last))?;
        }
        self.out.flush()
    }

    /// End the turn: finish the current row.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.current.is_empty() {
            queue!(self.out, Print("\n"))?;
        }
        self.current.clear();
        self.out.flush()
    }

    /// Print a one-off notice line outside of the history.
    pub fn notice(&mut self, color: Color, text: &str) -> io::Result<()> {
        queue!(
            self.out,
            SetForegroundColor(color),
            Print(text),
            Print("\n"),
            ResetColor
        )?;
        self.out.flush()
    }

    /// Print a whole history, e.g. after loading a saved conversation.
    pub fn replay(&mut self, history: &DisplayHistory) -> io::Result<()> {
        for entry in history.entries() {
            if let Some(user) = &entry.user {
                queue!(
                    self.out,
                    Print(AnsiColor::Cyan.bold().paint(format!("› {}", user)).to_string()),
                    Print("\n")
                )?;
            }
            let text = row_text(entry);
            if !text.is_empty() {
                queue!(self.out, Print(text), Print("\n"))?;
            }
        }
        self.rows_done = history.len();
        self.current.clear();
        self.out.flush()
    }

    fn paint(&mut self, text: &str) -> io::Result<()> {
        if text == self.current {
            return Ok(());
        }

        if let Some(suffix) = text.strip_prefix(self.current.as_str()) {
            queue!(self.out, Print(suffix))?;
        } else {
            let up = rows_above_cursor(&self.current, self.width);
            queue!(self.out, MoveToColumn(0))?;
            if up > 0 {
                queue!(self.out, MoveUp(up as u16))?;
            }
            queue!(self.out, Clear(ClearType::FromCursorDown), Print(text))?;
        }

        self.current = text.to_string();
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
