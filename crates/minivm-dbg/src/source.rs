//! Source-file display for the debugger's source layout.

use std::fs;

/// A source file split into lines for window display.
pub struct SourceFile {
    lines: Vec<String>,
}

impl SourceFile {
    /// Read and split a source file; `None` when unreadable.
    pub fn load(path: &str) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        Some(Self {
            lines: text.lines().map(str::to_owned).collect(),
        })
    }

    #[cfg(test)]
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_owned).collect(),
        }
    }

    /// The 1-based line `n`.
    pub fn line(&self, n: u32) -> Option<&str> {
        self.lines.get(n.checked_sub(1)? as usize).map(String::as_str)
    }

    /// Render a window of `radius` lines around `line`, marking it.
    pub fn window(&self, line: u32, radius: u32) -> String {
        let first = line.saturating_sub(radius).max(1);
        let last = (line + radius).min(self.lines.len() as u32);
        let mut out = String::new();
        for n in first..=last {
            let marker = if n == line { "-> " } else { "   " };
            let text = self.line(n).unwrap_or("");
            out.push_str(&format!("{marker}{n:>5}  {text}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_one_based() {
        let src = SourceFile::from_text("first\nsecond\nthird\n");
        assert_eq!(src.line(1), Some("first"));
        assert_eq!(src.line(3), Some("third"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(4), None);
    }

    #[test]
    fn window_marks_the_current_line() {
        let src = SourceFile::from_text("a\nb\nc\nd\ne\n");
        let w = src.window(3, 1);
        assert!(w.contains("->     3  c"));
        assert!(w.contains("       2  b"));
        assert!(w.contains("       4  d"));
        assert!(!w.contains("  1  a"));
    }

    #[test]
    fn window_clamps_at_the_edges() {
        let src = SourceFile::from_text("a\nb\n");
        let w = src.window(1, 3);
        assert_eq!(w.lines().count(), 2);
    }
}
