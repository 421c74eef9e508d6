//! Output buffer and per-scope formatting state.

use std::collections::BTreeSet;

/// Extra indentation for continuation lines inside collection literals.
pub const INDENT_PER_LEVEL: &str = " ";

/// Formatting state of one code-object scope being rendered.
///
/// Each nested code object (function body, lambda, comprehension) renders
/// into its own scope; the finished text is spliced into the parent.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    out: String,
    pub indent: String,
    pub is_lambda: bool,
    pub globals: BTreeSet<String>,
    pub nonlocals: BTreeSet<String>,
    pending_newlines: usize,
    /// Longest newline run requested by a single write since the last
    /// completed line.
    max_newline_run: usize,
}

impl Scope {
    pub fn new(indent: impl Into<String>, is_lambda: bool) -> Self {
        Self {
            indent: indent.into(),
            is_lambda,
            ..Self::default()
        }
    }

    fn flush_newlines(&mut self) {
        for _ in 0..self.pending_newlines {
            self.out.push('\n');
        }
        self.pending_newlines = 0;
    }

    /// Newline-only writes accumulate, but never beyond the longest run a
    /// single write has asked for.
    fn request_newlines(&mut self, n: usize) {
        self.max_newline_run = self.max_newline_run.max(n);
        self.pending_newlines = (self.pending_newlines + n).min(self.max_newline_run);
    }

    fn finish(mut self) -> String {
        self.flush_newlines();
        self.out
    }
}

/// The render state of one top-level pass: the active scope, the scopes it
/// is nested in, and the logical source line reached so far.
#[derive(Debug, Clone)]
pub struct RenderState {
    scope: Scope,
    enclosing: Vec<Scope>,
    pub line_number: u32,
}

impl RenderState {
    pub fn new() -> Self {
        Self {
            scope: Scope::new("", false),
            enclosing: Vec::new(),
            line_number: 1,
        }
    }

    /// Number of scopes entered and not yet left.
    pub fn depth(&self) -> usize {
        self.enclosing.len()
    }

    pub fn indent(&self) -> &str {
        &self.scope.indent
    }

    pub fn is_lambda(&self) -> bool {
        self.scope.is_lambda
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    pub fn indent_more(&mut self, step: &str) {
        self.scope.indent.push_str(step);
    }

    pub fn indent_less(&mut self, step: &str) {
        let keep = self.scope.indent.len().saturating_sub(step.len());
        self.scope.indent.truncate(keep);
    }

    pub fn pending_newlines(&self) -> usize {
        self.scope.pending_newlines
    }

    /// Writes text. Leading newlines are held back and coalesced with any
    /// already pending; trailing newlines are held back until the next
    /// non-newline text.
    pub fn write(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        let scope = &mut self.scope;

        let leading = data.len() - data.trim_start_matches('\n').len();
        if leading == data.len() {
            scope.request_newlines(leading);
            return;
        }
        if leading > 0 {
            scope.request_newlines(leading);
        }
        scope.flush_newlines();

        let body = &data[leading..];
        let text = body.trim_end_matches('\n');
        let trailing = body.len() - text.len();
        scope.out.push_str(text);
        scope.pending_newlines = trailing;
        // a finished line starts a fresh run
        if trailing > 0 || text.contains('\n') {
            scope.max_newline_run = trailing;
        }
    }

    /// Writes `data` and makes sure the line ends.
    pub fn println(&mut self, data: &str) {
        self.write(data);
        self.scope.pending_newlines = self.scope.pending_newlines.max(1);
    }

    /// Characters written since the last line break.
    pub fn column(&self) -> usize {
        if self.scope.pending_newlines > 0 {
            return 0;
        }
        let out = &self.scope.out;
        let line_start = out.rfind('\n').map_or(0, |i| i + 1);
        out[line_start..].chars().count()
    }

    /// Starts rendering into a fresh, isolated scope.
    pub fn enter(&mut self, indent: impl Into<String>, is_lambda: bool) {
        let inner = Scope::new(indent, is_lambda);
        let outer = std::mem::replace(&mut self.scope, inner);
        self.enclosing.push(outer);
    }

    /// Finishes the current scope and returns its text, reactivating the
    /// enclosing scope untouched.
    pub fn leave(&mut self) -> String {
        debug_assert!(!self.enclosing.is_empty(), "leave() without enter()");
        let outer = self.enclosing.pop().unwrap_or_default();
        std::mem::replace(&mut self.scope, outer).finish()
    }

    /// Text of the outermost scope, pending newlines included.
    pub fn finish(mut self) -> String {
        while !self.enclosing.is_empty() {
            self.leave();
        }
        self.scope.finish()
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newline_coalescing() {
        let mut state = RenderState::new();
        state.write("\n\n");
        state.write("a");
        state.write("\n");
        state.write("\n");
        assert_eq!(state.finish(), "\n\na\n\n");
    }

    #[test]
    fn test_newlines_never_exceed_longest_request() {
        let mut state = RenderState::new();
        state.write("x\n");
        state.write("\n\n");
        state.write("\n\n");
        state.write("\n");
        state.write("y");
        assert_eq!(state.finish(), "x\n\ny");
    }

    #[test]
    fn test_blank_line_cap_resets_after_line() {
        let mut state = RenderState::new();
        state.write("return x\n");
        state.write("\n\n\n");
        state.write("x = 1\n");
        state.write("\n\n");
        state.write("y");
        assert_eq!(state.finish(), "return x\n\n\nx = 1\n\ny");
    }

    #[test]
    fn test_println_ends_line_once() {
        let mut state = RenderState::new();
        state.println("a = 1");
        state.println("");
        state.println("b = 2");
        assert_eq!(state.finish(), "a = 1\nb = 2\n");
    }

    #[test]
    fn test_leading_and_trailing_newlines() {
        let mut state = RenderState::new();
        state.write("\n\ndef f():\n");
        state.write("    pass\n");
        assert_eq!(state.finish(), "\n\ndef f():\n    pass\n");
    }

    #[test]
    fn test_indent() {
        let mut state = RenderState::new();
        state.indent_more("    ");
        state.indent_more("    ");
        assert_eq!(state.indent(), "        ");
        state.indent_less("    ");
        assert_eq!(state.indent(), "    ");
        state.indent_less("    ");
        state.indent_less("    ");
        assert_eq!(state.indent(), "");
    }

    #[test]
    fn test_scopes_are_isolated() {
        let mut state = RenderState::new();
        state.write("outer\n");
        state.enter("  ", true);
        assert_eq!(state.depth(), 1);
        assert!(state.is_lambda());
        assert_eq!(state.pending_newlines(), 0);
        state.write("inner\n\n");
        let inner = state.leave();
        assert_eq!(inner, "inner\n\n");
        assert_eq!(state.depth(), 0);
        assert!(!state.is_lambda());
        // the outer pending newline survived the nested scope
        assert_eq!(state.pending_newlines(), 1);
        state.write("after");
        assert_eq!(state.finish(), "outer\nafter");
    }

    #[test]
    fn test_column() {
        let mut state = RenderState::new();
        state.write("ab\ncde");
        assert_eq!(state.column(), 3);
        state.write("\n");
        assert_eq!(state.column(), 0);
    }
}