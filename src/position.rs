//! Source positions.
//!
//! A [`SourceFile`] owns the line-start table of one buffer plus an overlay of
//! remapping entries added by line directives. Positions are raw byte offsets
//! ([`Pos`]); resolving one yields a [`Position`] with filename, line and
//! column, where the overlay (if any) has been applied.

use std::fmt;
use std::path::Path;

// =============================================================================
// Pos / Span
// =============================================================================

/// Raw byte offset into a source buffer.
///
/// Ordering is always by offset and never affected by line directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pos(u32);

impl Pos {
    #[inline]
    pub const fn new(offset: usize) -> Self {
        // Clamp rather than panic on >4GiB inputs.
        if offset > u32::MAX as usize {
            Pos(u32::MAX)
        } else {
            Pos(offset as u32)
        }
    }

    #[inline]
    pub const fn offset(self) -> usize {
        self.0 as usize
    }

    /// Position `n` bytes further on.
    #[inline]
    pub const fn add(self, n: usize) -> Self {
        Pos::new(self.offset() + n)
    }
}

/// Compact half-open byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Pos,
    pub end: Pos, // exclusive
}

impl Span {
    #[inline]
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    #[inline]
    pub const fn empty_at(pos: Pos) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.end.offset().saturating_sub(self.start.offset())
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Position
// =============================================================================

/// A resolved source position.
///
/// `line` is 1-based and 0 means invalid; `column` is 1-based and 0 means
/// unknown (possible after a `file:line` directive).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Position {
    pub filename: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = self.filename.clone();
        if self.is_valid() {
            if !s.is_empty() {
                s.push(':');
            }
            s.push_str(&self.line.to_string());
            if self.column != 0 {
                s.push(':');
                s.push_str(&self.column.to_string());
            }
        }
        if s.is_empty() {
            s.push('-');
        }
        f.write_str(&s)
    }
}

// =============================================================================
// SourceFile
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct LineInfo {
    offset: usize,
    filename: String,
    line: usize,
    column: usize,
}

/// Line table and remapping overlay for one registered buffer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    size: usize,
    lines: Vec<usize>,
    infos: Vec<LineInfo>,
}

impl SourceFile {
    /// Registers a buffer of `size` bytes under `name`.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            lines: vec![0],
            infos: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Directory part of the file name, used to resolve relative directive
    /// filenames.
    pub fn dir(&self) -> &str {
        match self.name.rfind(['/', '\\']) {
            Some(i) => &self.name[..=i],
            None => "",
        }
    }

    /// Records a line start. Offsets must grow and stay inside the file.
    pub fn add_line(&mut self, offset: usize) {
        let last = self.lines.last().copied();
        if last.map_or(true, |l| l < offset) && offset < self.size {
            self.lines.push(offset);
        }
    }

    /// Rebuilds the line table from the buffer contents.
    pub fn set_lines_for_content(&mut self, content: &[u8]) {
        self.lines.clear();
        self.lines.push(0);
        let mut at = 0;
        while let Some(i) = memchr::memchr(b'\n', &content[at..]) {
            let start = at + i + 1;
            if start < content.len() {
                self.lines.push(start);
            }
            at = start;
        }
    }

    /// Splices in a remapping entry: positions from `offset` on report
    /// `filename`/`line`/`column` as established by a line directive.
    pub fn add_line_column_info(
        &mut self,
        offset: usize,
        filename: impl Into<String>,
        line: usize,
        column: usize,
    ) {
        let grows = self.infos.last().map_or(true, |i| i.offset < offset);
        if offset < self.size && grows {
            self.infos.push(LineInfo {
                offset,
                filename: filename.into(),
                line,
                column,
            });
        }
    }

    #[inline]
    pub fn pos(&self, offset: usize) -> Pos {
        Pos::new(offset.min(self.size))
    }

    /// Start offset of the raw line holding `pos`.
    pub fn line_start(&self, pos: Pos) -> usize {
        self.lines[line_index(&self.lines, pos.offset())]
    }

    /// Raw (unremapped) 1-based line number.
    #[inline]
    pub fn line(&self, pos: Pos) -> usize {
        line_index(&self.lines, pos.offset()) + 1
    }

    pub fn unadjusted_position(&self, pos: Pos) -> Position {
        self.unpack(pos.offset(), false)
    }

    /// Resolves `pos`, applying line directives.
    pub fn position(&self, pos: Pos) -> Position {
        self.unpack(pos.offset(), true)
    }

    fn unpack(&self, offset: usize, adjusted: bool) -> Position {
        let li = line_index(&self.lines, offset);
        let mut out = Position {
            filename: self.name.clone(),
            offset,
            line: li + 1,
            column: offset - self.lines[li] + 1,
        };
        if !adjusted {
            return out;
        }

        let at = self.infos.partition_point(|i| i.offset <= offset);
        let Some(alt) = at.checked_sub(1).map(|i| &self.infos[i]) else {
            return out;
        };
        out.filename = alt.filename.clone();
        let base = line_index(&self.lines, alt.offset) + 1;
        let d = out.line - base;
        out.line = alt.line + d;
        if alt.column == 0 {
            out.column = 0;
        } else if d == 0 {
            out.column = alt.column + (offset - alt.offset);
        }
        out
    }
}

/// Index of the last line start at or before `offset`.
#[inline]
fn line_index(lines: &[usize], offset: usize) -> usize {
    lines.partition_point(|&l| l <= offset).saturating_sub(1)
}

// =============================================================================
// Path helpers for line directives
// =============================================================================

/// Lexically cleans a slash-separated path.
pub(crate) fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            _ => parts.push(seg),
        }
    }
    let body = parts.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

pub(crate) fn is_abs(path: &str) -> bool {
    Path::new(path).is_absolute() || path.starts_with('/')
}

/// Joins a directive filename onto the source file's directory.
pub(crate) fn join_dir(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        clean_path(name)
    } else {
        clean_path(&format!("{dir}/{name}"))
    }
}
