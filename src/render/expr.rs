//! Expression handlers: the cases a flat template cannot express.

use super::state::INDENT_PER_LEVEL;
use super::tables::NO_PARENTHESIS_EVER;
use super::walker::SourceWalker;
use crate::error::{DeparseError, Result};
use crate::lang::{Node, Token, Tree, Value};

/// Column past which constant tuples wrap.
const LINE_LENGTH: usize = 80;

/// Argument precedence: just below `yield`, which needs parentheses there.
const ARG_PREC: i32 = 29;

fn child<'n>(node: &'n Node, index: isize) -> Result<&'n Tree> {
    node.get(index).ok_or_else(|| {
        DeparseError::template(
            &node.kind,
            format!("child {}", index),
            format!("{} children", node.len()),
        )
    })
}

/// The operator glyph of a `bin_op`: `bin_op[-1]`, unwrapped from its
/// `binary_operator` node when there is one.
fn operator_of(bin_op: &Tree) -> &Tree {
    match bin_op.get(-1) {
        Some(op @ Tree::Node(_)) => op.get(0).unwrap_or(op),
        Some(op) => op,
        None => bin_op,
    }
}

/// `LOAD_CONST`, bare or wrapped in `expr`.
fn is_constant(tree: &Tree) -> bool {
    tree.is("LOAD_CONST") || (tree.is("expr") && tree.get(0).is_some_and(|c| c.is("LOAD_CONST")))
}

/// Elements of a collection, with the `expr32`/`expr1024` batches the
/// scanner uses for long literals spliced in.
fn flatten_list(elems: &[Tree]) -> Vec<&Tree> {
    let mut flat = Vec::new();
    for elem in elems {
        match elem.kind() {
            "expr1024" => flat.extend(elem.children().iter().flat_map(Tree::children)),
            "expr32" => flat.extend(elem.children()),
            _ => flat.push(elem),
        }
    }
    flat
}

/// `(before, after)` star-target counts of an `UNPACK_EX` operand.
fn unpack_ex_counts(attr: &Value) -> Option<(usize, usize)> {
    match attr {
        Value::Int(n) if *n >= 0 => Some(((*n & 0xFF) as usize, (*n >> 8) as usize)),
        Value::Tuple(items) => match items.as_slice() {
            [Value::Int(b), Value::Int(a)] if *b >= 0 && *a >= 0 => {
                Some((*b as usize, *a as usize))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Names carried by a constant tuple operand (keyword names, dict keys).
fn const_tuple(tree: &Tree) -> Option<&[Value]> {
    tree.unwrap_single(&["expr"]).attr().and_then(Value::as_tuple)
}

impl SourceWalker<'_> {
    // =========================================================================
    // Operators
    // =========================================================================

    pub(crate) fn n_expr(&mut self, node: &Node) -> Result<()> {
        let first = child(node, 0)?;
        let op = if first.kind().starts_with("bin_op") {
            operator_of(first)
        } else {
            first
        };
        let mut prec = self.tables.precedence(op.kind());
        if op.as_token().is_some_and(|t| t.is("LOAD_CONST") && t.pattr.starts_with('-')) {
            prec = self.tables.precedence("unary_op");
        }

        let outer = self.prec;
        self.prec = prec;
        if outer < prec {
            self.write("(");
            self.preorder(first)?;
            self.write(")");
        } else {
            self.preorder(first)?;
        }
        Ok(())
    }

    /// Left operand, operator, then the right operand one notch tighter so
    /// equal-precedence right operands keep their parentheses.
    pub(crate) fn n_bin_op(&mut self, node: &Node) -> Result<()> {
        self.preorder(child(node, 0)?)?;
        self.write(" ");
        self.preorder(child(node, -1)?)?;
        self.write(" ");
        let prec = self.prec - 1;
        self.with_prec(prec, |w| w.preorder(child(node, 1)?))
    }

    pub(crate) fn n_return_expr(&mut self, node: &Node) -> Result<()> {
        match (node.len(), node.get(0)) {
            (1, Some(Tree::Node(expr))) if expr.is("expr") => {
                self.prec = self.tables.precedence("yield") - 1;
                self.n_expr(expr)
            }
            _ => self.n_expr(node),
        }
    }

    // =========================================================================
    // Slices, yield, constants
    // =========================================================================

    /// `lo:hi`, leaving out `None` bounds.
    pub(crate) fn n_slice2(&mut self, node: &Node) -> Result<()> {
        self.with_prec(NO_PARENTHESIS_EVER, |w| w.slice_bounds(node, 2))
    }

    /// `lo:hi:step`, leaving out `None` bounds.
    pub(crate) fn n_slice3(&mut self, node: &Node) -> Result<()> {
        self.with_prec(NO_PARENTHESIS_EVER, |w| w.slice_bounds(node, 3))
    }

    fn slice_bounds(&mut self, node: &Node, parts: usize) -> Result<()> {
        for i in 0..parts {
            if i > 0 {
                self.write(":");
            }
            let bound = child(node, i as isize)?;
            if !bound.is_none_const() {
                self.preorder(bound)?;
            }
        }
        Ok(())
    }

    pub(crate) fn n_yield(&mut self, node: &Node) -> Result<()> {
        let value = child(node, 0)?;
        if value.is_none_const() {
            self.write("yield");
            Ok(())
        } else {
            self.write("yield ");
            self.preorder(value)
        }
    }

    pub(crate) fn n_load_const(&mut self, token: &Token) -> Result<()> {
        match &token.attr {
            // decimal would read back as a negated positive constant
            Value::Int(i64::MIN) => self.write("-0x8000000000000000"),
            Value::Tuple(items) => self.pp_tuple(items),
            other => {
                let text = other.repr();
                self.write(&text);
            }
        }
        Ok(())
    }

    /// Writes a constant tuple, wrapping lines past [`LINE_LENGTH`] and
    /// aligning continuation lines under the first element.
    fn pp_tuple(&mut self, items: &[Value]) {
        let indent = " ".repeat(self.state.column() + 1);
        let mut column = indent.len();
        self.write("(");
        let mut sep = String::new();
        for item in items {
            self.write(&sep);
            column += sep.len();
            let text = item.repr();
            column += text.len();
            self.write(&text);
            sep = ",".to_string();
            if column > LINE_LENGTH {
                column = indent.len();
                sep.push('\n');
                sep.push_str(&indent);
            } else {
                sep.push(' ');
            }
        }
        if items.len() == 1 {
            self.write(",");
        }
        self.write(")");
    }

    // =========================================================================
    // Targets
    // =========================================================================

    /// A constant base needs parentheses before `.name` (`(-1).real`).
    pub(crate) fn n_attribute(&mut self, node: &Node) -> Result<()> {
        if node.get(0).is_some_and(is_constant) {
            self.default_as(node, "attribute_w_parens")
        } else {
            self.default(node)
        }
    }

    pub(crate) fn n_store(&mut self, node: &Node) -> Result<()> {
        let constant_base = node.get(0).is_some_and(|e| e.is("expr") && is_constant(e));
        if constant_base && node.get(1).is_some_and(|t| t.is("STORE_ATTR")) {
            self.default_as(node, "store_w_parens")
        } else {
            self.default(node)
        }
    }

    /// A tuple index renders bare: `a[1, 2]`, not `a[(1, 2)]`.
    pub(crate) fn n_subscript(&mut self, node: &Node) -> Result<()> {
        let tuple = node.get(-2).and_then(|index| index.get(0));
        let bare = tuple.is_some_and(|t| {
            t.is_any(&["tuple", "build_list"])
                && t.last_token().is_some_and(|last| {
                    last.kind.starts_with("BUILD_TUPLE")
                        && !matches!(last.kind.as_str(), "BUILD_TUPLE_0" | "BUILD_TUPLE_1")
                })
        });
        if bare {
            self.default(&node.with_kind_at(&[-2, 0], "build_tuple2"))
        } else {
            self.default(node)
        }
    }

    pub(crate) fn n_unpack(&mut self, node: &Node) -> Result<()> {
        let op = child(node, 0)?;
        if op.kind().starts_with("UNPACK_EX") {
            return self.unpack_ex(node, op);
        }
        if op.is("UNPACK_SEQUENCE_0") {
            self.write("[]");
            return Ok(());
        }

        let nested: Vec<isize> = (1..node.len())
            .filter(|&i| node.children[i].get(0).is_some_and(|t| t.is("unpack")))
            .map(|i| i as isize)
            .collect();
        if nested.is_empty() {
            return self.default(node);
        }
        let mut copy = node.clone();
        for i in nested {
            copy.relabel(&[i, 0], "unpack_w_parens");
        }
        self.default(&copy)
    }

    /// `a, *b, c`: the star goes on the target right after the `before`
    /// plain targets.
    fn unpack_ex(&mut self, node: &Node, op: &Tree) -> Result<()> {
        let (before, after) = op.attr().and_then(unpack_ex_counts).ok_or_else(|| {
            DeparseError::template(
                &node.kind,
                "UNPACK_EX with a (before, after) operand",
                op.kind(),
            )
        })?;
        let targets = &node.children[1..];
        if targets.len() != before + after + 1 {
            return Err(DeparseError::template(
                &node.kind,
                format!("{} targets", before + after + 1),
                format!("{} targets", targets.len()),
            ));
        }
        let parens = node.is("unpack_w_parens");
        if parens {
            self.write("(");
        }
        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            if i == before {
                self.write("*");
            }
            self.preorder(target)?;
        }
        if parens {
            self.write(")");
        }
        Ok(())
    }

    /// `a, (b, c) = ...`: unpack targets of a multi-assignment get
    /// parentheses.
    pub(crate) fn n_assign_n(&mut self, node: &Node) -> Result<()> {
        let targets = if node.is("assign3") { 3 } else { 2 };
        let indexes: Vec<isize> = (1..=targets).map(|k| -(k as isize)).collect();
        self.default_with_unpack_parens(node, &indexes)
    }

    pub(crate) fn n_except_cond2(&mut self, node: &Node) -> Result<()> {
        let store = if node.get(-1).is_some_and(|t| t.is("come_from_opt")) {
            -3
        } else {
            -2
        };
        self.default_with_unpack_parens(node, &[store])
    }

    fn default_with_unpack_parens(&mut self, node: &Node, stores: &[isize]) -> Result<()> {
        let hits: Vec<isize> = stores
            .iter()
            .copied()
            .filter(|&i| node.get(i).and_then(|s| s.get(0)).is_some_and(|t| t.is("unpack")))
            .collect();
        if hits.is_empty() {
            return self.default(node);
        }
        let mut copy = node.clone();
        for i in hits {
            copy.relabel(&[i, 0], "unpack_w_parens");
        }
        self.default(&copy)
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// List, tuple and set displays. The trailing `BUILD_*` terminal picks
    /// the brackets; source line breaks between elements are kept.
    pub(crate) fn n_list(&mut self, node: &Node) -> Result<()> {
        let Some((last, elems)) = node.children.split_last() else {
            return Err(DeparseError::template(&node.kind, "a BUILD_* terminal", "no children"));
        };
        let last_kind = last.kind();
        let flat = flatten_list(elems);

        let (open, close, star) = if last_kind.starts_with("BUILD_LIST_UNPACK") {
            ("[", "]", true)
        } else if last_kind.starts_with("BUILD_LIST") {
            ("[", "]", false)
        } else if last_kind.starts_with("BUILD_SET_UNPACK") {
            ("{", "}", true)
        } else if last_kind.starts_with("BUILD_SET") {
            ("{", "}", false)
        } else if last_kind.starts_with("BUILD_TUPLE_UNPACK") {
            ("(", ")", true)
        } else if last_kind.starts_with("BUILD_TUPLE") || node.is("tuple") {
            // a tuple holding slices is a subscript index and cannot take
            // parentheses
            let slices = flat.iter().any(|elem| {
                let elem = if elem.is("arg") { elem.get(0).unwrap_or(elem) } else { elem };
                elem.is("expr") && elem.get(0).is_some_and(|c| c.kind().starts_with("slice"))
            });
            if slices { ("", "", false) } else { ("(", ")", false) }
        } else if last_kind.starts_with("ROT_TWO") {
            ("(", ")", false)
        } else {
            return Err(DeparseError::internal(format!(
                "collection display ends in {}, expected a list, tuple or set builder",
                last_kind
            )));
        };

        self.prec = ARG_PREC;
        self.write(open);
        self.state.indent_more(INDENT_PER_LEVEL);
        let mut written = 0;
        for elem in &flat {
            if elem.is_any(&["ROT_THREE", "EXTENDED_ARG"]) {
                continue;
            }
            let line = self.state.line_number;
            let value = self.traverse(elem, None, false);
            let value = match value {
                Ok(v) => v,
                Err(e) => {
                    self.state.indent_less(INDENT_PER_LEVEL);
                    return Err(e);
                }
            };
            if written > 0 {
                if line != self.state.line_number {
                    let brk = format!(",\n{}", self.state.indent());
                    self.write(&brk);
                } else {
                    self.write(", ");
                }
            }
            if star {
                self.write("*");
            }
            self.write(&value);
            written += 1;
        }
        if written == 1 && last_kind.starts_with("BUILD_TUPLE") && !close.is_empty() {
            self.write(",");
        }
        self.write(close);
        self.state.indent_less(INDENT_PER_LEVEL);
        Ok(())
    }

    /// Dict displays: key/value lists, constant-key maps and `**` merges.
    pub(crate) fn n_dict(&mut self, node: &Node) -> Result<()> {
        self.prec = NO_PARENTHESIS_EVER;
        let is_entry = node.get(0).is_some_and(|t| t.is("dict_entry"));
        if !is_entry {
            self.write("{");
        }
        self.state.indent_more(INDENT_PER_LEVEL);
        let result = self.dict_items(node);
        self.state.indent_less(INDENT_PER_LEVEL);
        result?;
        if !is_entry {
            self.write("}");
        }
        Ok(())
    }

    fn dict_items(&mut self, node: &Node) -> Result<()> {
        let first = child(node, 0)?;
        let last = child(node, -1)?;

        if first.kind().starts_with("kvlist") {
            let items = first.children();
            let items = match items.split_last() {
                Some((tail, rest)) if tail.kind().starts_with("BUILD_MAP") => rest,
                _ => items,
            };
            return self.dict_pairs(items);
        }
        if last.kind().starts_with("BUILD_CONST_KEY_MAP") {
            let keys = node.get(-2).and_then(const_tuple).ok_or_else(|| {
                DeparseError::template(
                    &node.kind,
                    "a constant key tuple before the map builder",
                    "none",
                )
            })?;
            let values = &node.children[..node.len().saturating_sub(2)];
            for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                let line = self.state.line_number;
                let text = self.traverse(value, None, false)?;
                if i > 0 {
                    if line != self.state.line_number {
                        let brk = format!(",\n{}", self.state.indent());
                        self.write(&brk);
                    } else {
                        self.write(", ");
                    }
                }
                let entry = format!("{}: {}", key.repr(), text);
                self.write(&entry);
            }
            return Ok(());
        }
        if first.is("dict_entry") {
            let entries = first.children();
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    self.write(", **");
                }
                self.preorder(entry)?;
            }
            return Ok(());
        }
        if last.kind().starts_with("BUILD_MAP_UNPACK") {
            let count = last.attr().and_then(Value::as_int).map_or(node.len() - 1, |n| n as usize);
            self.write("**");
            for (i, part) in node.children.iter().take(count).enumerate() {
                if i > 0 {
                    self.write(", **");
                }
                self.preorder(part)?;
            }
            return Ok(());
        }
        if last.kind().starts_with("BUILD_MAP") {
            return self.dict_pairs(&node.children[..node.len() - 1]);
        }
        Err(DeparseError::internal(format!(
            "dict display of unknown shape ending in {}",
            last.kind()
        )))
    }

    /// Alternating key, value children.
    fn dict_pairs(&mut self, items: &[Tree]) -> Result<()> {
        for (i, pair) in items.chunks(2).enumerate() {
            let [key, value] = pair else {
                return Err(DeparseError::internal("dict display with a key and no value"));
            };
            let line = self.state.line_number;
            let name = self.traverse(key, Some(""), false)?;
            if i > 0 {
                if line != self.state.line_number {
                    let brk = format!(",\n{}", self.state.indent());
                    self.write(&brk);
                } else {
                    self.write(", ");
                }
            }
            self.write(&name);
            self.write(": ");
            let indent = format!("{}{}", self.state.indent(), " ".repeat(name.len() + 2));
            let text = self.traverse(value, Some(&indent), false)?;
            self.write(&text);
        }
        Ok(())
    }

    /// `f(a, b, k=v)`: positional arguments, then the keyword names taken
    /// from the constant tuple before `CALL_FUNCTION_KW`.
    pub(crate) fn n_call_kw(&mut self, node: &Node) -> Result<()> {
        let names = node.get(-2).and_then(const_tuple).ok_or_else(|| {
            DeparseError::template(&node.kind, "keyword-name tuple at child -2", "none")
        })?;
        let n = node.len();
        if n < names.len() + 3 {
            return Err(DeparseError::template(
                &node.kind,
                format!("at least {} children", names.len() + 3),
                n.to_string(),
            ));
        }
        let positional = n - (names.len() + 2);

        self.preorder(child(node, 0)?)?;
        self.write("(");
        self.with_prec(ARG_PREC, |w| {
            let mut sep = String::new();
            let mut line = w.state.line_number;
            for arg in &node.children[1..positional] {
                w.write(&sep);
                w.preorder(arg)?;
                sep = if line != w.state.line_number {
                    format!(",\n{}  ", w.state.indent())
                } else {
                    ", ".to_string()
                };
                line = w.state.line_number;
            }
            for (name, arg) in names.iter().zip(&node.children[positional..n - 2]) {
                w.write(&sep);
                w.write(&name.to_string());
                w.write("=");
                w.preorder(arg)?;
                sep = ", ".to_string();
            }
            Ok(())
        })?;
        self.write(")");
        Ok(())
    }
}
