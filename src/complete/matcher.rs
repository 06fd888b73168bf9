use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::sync::LazyLock;

// Each pattern is anchored at the cursor (`$`) and forbids its own closing
// delimiter between the opener and the cursor.
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:transclude|import|export|ref)\{([^}]*)$").expect("valid command regex")
});
static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\[]*\]\(([^)]*)$").expect("valid markdown link regex"));
static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]*)$").expect("valid wikilink regex"));

/// Which syntax opened the completion context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Syntax {
    /// `\transclude{`, `\import{`, `\export{` or `\ref{`.
    Command,
    /// `[text](`
    MarkdownLink,
    /// `[[`
    WikiLink,
}

impl Syntax {
    /// Tried in this order; the first hit wins.
    pub const ALL: [Syntax; 3] = [Syntax::Command, Syntax::MarkdownLink, Syntax::WikiLink];

    fn pattern(self) -> &'static Regex {
        match self {
            Syntax::Command => &COMMAND_RE,
            Syntax::MarkdownLink => &MARKDOWN_LINK_RE,
            Syntax::WikiLink => &WIKILINK_RE,
        }
    }
}

/// A completion context: `start..end` (character offsets within the line)
/// is what an accepted candidate replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerMatch {
    pub start: usize,
    pub end: usize,
    pub partial: String,
    pub syntax: Syntax,
}

impl TriggerMatch {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Decide whether the text before `cursor` (a character offset into
/// `line`) is inside a tree reference.
///
/// Only the current line is looked at; references never span lines.
pub fn match_trigger(line: &str, cursor: usize) -> Option<TriggerMatch> {
    let byte_end = line
        .char_indices()
        .nth(cursor)
        .map_or(line.len(), |(idx, _)| idx);
    let prefix = &line[..byte_end];

    Syntax::ALL.into_iter().find_map(|syntax| {
        let partial = syntax.pattern().captures(prefix)?.get(1)?;
        let start = prefix[..partial.start()].chars().count();
        let end = start + partial.as_str().chars().count();
        Some(TriggerMatch {
            start,
            end,
            partial: partial.as_str().to_string(),
            syntax,
        })
    })
}
