use ropey::Rope;
use anyhow::Context;
use std::path::Path;

/// A text document the completion request points into.
pub struct Document {
    rope: Rope,
}

impl Document {
    #[cfg(test)]
    fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Create a document from file contents.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Self {
            rope: Rope::from_str(&text),
        })
    }

    /// Total number of lines in the document.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Get the text of a specific line (without trailing newline).
    pub fn line_text(&self, idx: usize) -> Option<String> {
        if idx >= self.rope.len_lines() {
            return None;
        }
        let line = self.rope.line(idx);
        let mut s: String = line.chunks().collect();
        if s.ends_with('\n') {
            s.pop();
        }
        if s.ends_with('\r') {
            s.pop();
        }
        Some(s)
    }

    /// Text from the start of `row` up to the cursor, which is a character
    /// column clamped to the line length.
    pub fn prefix_at(&self, row: usize, col: usize) -> Option<String> {
        let line = self.line_text(row)?;
        Some(line.chars().take(col).collect())
    }
}
