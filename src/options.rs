use crate::parse::CompileMode;

/// Knobs for one render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DeparseOptions {
    pub compile_mode: CompileMode,
    /// Keep going after shape diagnostics and report them at the end.
    pub tolerate_errors: bool,
    /// Drop compiler-internal statements: the implicit trailing `return None`
    /// and the class-body `__module__`/`__qualname__` assignments.
    pub hide_internal: bool,
    /// Render an explicit `return None` instead of a bare `return`.
    pub return_none: bool,
    /// Ask the parser for reduction traces on failure.
    pub debug_reduce: bool,
    /// One level of indentation.
    pub indent: String,
}

impl Default for DeparseOptions {
    fn default() -> Self {
        DeparseOptions {
            compile_mode: CompileMode::Exec,
            tolerate_errors: false,
            hide_internal: true,
            return_none: false,
            debug_reduce: false,
            indent: "    ".to_string(),
        }
    }
}

impl DeparseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compile_mode(mut self, mode: CompileMode) -> Self {
        self.compile_mode = mode;
        self
    }

    pub fn with_tolerate_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_errors = tolerate;
        self
    }

    pub fn with_hide_internal(mut self, hide: bool) -> Self {
        self.hide_internal = hide;
        self
    }

    pub fn with_return_none(mut self, keep: bool) -> Self {
        self.return_none = keep;
        self
    }

    pub fn with_debug_reduce(mut self, debug: bool) -> Self {
        self.debug_reduce = debug;
        self
    }

    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = DeparseOptions::default();
        assert_eq!(opts.compile_mode, CompileMode::Exec);
        assert!(opts.hide_internal);
        assert!(!opts.return_none);
        assert!(!opts.tolerate_errors);
        assert_eq!(opts.indent, "    ");
    }

    #[test]
    fn test_builders_chain() {
        let opts = DeparseOptions::new()
            .with_compile_mode(CompileMode::Lambda)
            .with_tolerate_errors(true)
            .with_hide_internal(false)
            .with_indent("  ");
        assert_eq!(opts.compile_mode, CompileMode::Lambda);
        assert!(opts.tolerate_errors);
        assert!(!opts.hide_internal);
        assert_eq!(opts.indent, "  ");
    }
}