//! Function definitions and lambdas: parameter layout from the code
//! object and `MAKE_FUNCTION` operands, then the nested body.

use super::walker::SourceWalker;
use crate::error::{DeparseError, Result};
use crate::lang::{CodeObject, Node, Tree, Value};
use crate::normalize;
use std::collections::{BTreeMap, BTreeSet};

/// `MAKE_FUNCTION` flag bits, in stack order of their operands. The
/// closure tuple (0x08) comes last and carries no source text.
const HAS_DEFAULTS: i64 = 0x01;
const HAS_KW_DEFAULTS: i64 = 0x02;
const HAS_ANNOTATIONS: i64 = 0x04;

const ARG_PREC: i32 = 29;

/// The code object a `mkfunc`-like node builds.
pub(crate) fn code_of(node: &Node) -> Option<&CodeObject> {
    node.children
        .iter()
        .rev()
        .filter_map(Tree::as_token)
        .find_map(|t| t.attr.as_code())
}

fn make_function_flags(node: &Node) -> i64 {
    let Some(op) = node
        .children
        .iter()
        .rev()
        .filter_map(Tree::as_token)
        .find(|t| t.kind.starts_with("MAKE_FUNCTION"))
    else {
        return 0;
    };
    op.attr.as_int().unwrap_or_else(|| {
        op.kind
            .rsplit('_')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    })
}

/// Rendered operands of one `MAKE_FUNCTION`.
#[derive(Debug, Default)]
struct FunctionOperands {
    defaults: Vec<String>,
    kw_defaults: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl SourceWalker<'_> {
    /// `def` or `async def`, depending on the code object.
    pub(crate) fn n_function_def(&mut self, node: &Node) -> Result<()> {
        let is_async = node
            .get(-2)
            .and_then(Tree::as_node)
            .and_then(code_of)
            .is_some_and(|c| c.has_flag(CodeObject::COROUTINE | CodeObject::ASYNC_GENERATOR));
        if is_async {
            self.default_as(node, "async_function_def")
        } else {
            self.default(node)
        }
    }

    /// `name(params):` and the indented body. The `def` keyword comes from
    /// the enclosing template.
    pub(crate) fn n_mkfunc(&mut self, node: &Node) -> Result<()> {
        let code = code_of(node)
            .ok_or_else(|| DeparseError::template(&node.kind, "a code object operand", "none"))?;
        let operands = self.function_operands(node)?;
        let params = self.param_list(code, &operands, true);

        let mut header = format!("{}({})", code.name, params);
        if let Some(ret) = operands.annotations.get("return") {
            header.push_str(" -> ");
            header.push_str(ret);
        }
        header.push(':');
        self.println(&header);

        let tree = self.build_nested(code, false)?;
        let (globals, nonlocals) = normalize::find_globals_and_nonlocals(&tree, code);
        let indent = format!("{}{}", self.state.indent(), self.opts.indent);
        self.state.enter(indent, false);
        let result = self.function_body(code, &tree, &globals, &nonlocals);
        let body = self.state.leave();
        result?;
        self.write(&body);

        if self.state.depth() > 0 {
            self.write("\n\n");
        } else {
            self.write("\n\n\n");
        }
        Ok(())
    }

    fn function_body(
        &mut self,
        code: &CodeObject,
        tree: &Node,
        globals: &BTreeSet<String>,
        nonlocals: &BTreeSet<String>,
    ) -> Result<()> {
        if let Some(doc) = &code.docstring {
            self.write_docstring(doc);
        }
        self.declarations(globals, nonlocals);
        self.gen_source(tree, code)
    }

    /// `global`/`nonlocal` lines at the top of a body.
    pub(crate) fn declarations(
        &mut self,
        globals: &BTreeSet<String>,
        nonlocals: &BTreeSet<String>,
    ) {
        for name in globals {
            let line = format!("{}global {}", self.state.indent(), name);
            self.println(&line);
        }
        for name in nonlocals {
            let line = format!("{}nonlocal {}", self.state.indent(), name);
            self.println(&line);
        }
        let scope = self.state.scope_mut();
        scope.globals.extend(globals.iter().cloned());
        scope.nonlocals.extend(nonlocals.iter().cloned());
    }

    /// `lambda params: body`.
    pub(crate) fn n_lambda_body(&mut self, node: &Node) -> Result<()> {
        let code = code_of(node)
            .ok_or_else(|| DeparseError::template(&node.kind, "a code object operand", "none"))?;
        let operands = self.function_operands(node)?;
        let params = self.param_list(code, &operands, false);

        let tree = self.build_nested(code, true)?;
        let body = self.traverse(&Tree::Node(tree), Some(""), true)?;

        self.write("lambda");
        if !params.is_empty() {
            self.write(" ");
            self.write(&params);
        }
        self.write(": ");
        self.write(body.trim());
        Ok(())
    }

    /// Renders the operands `MAKE_FUNCTION` pops, matched to its flag bits.
    fn function_operands(&mut self, node: &Node) -> Result<FunctionOperands> {
        let flags = make_function_flags(node);
        let code_at = node
            .children
            .iter()
            .rposition(|c| c.attr().and_then(Value::as_code).is_some())
            .unwrap_or(0);
        let mut operands = node.children[..code_at].iter();
        let mut out = FunctionOperands::default();

        if flags & HAS_DEFAULTS != 0 {
            if let Some(defaults) = operands.next() {
                out.defaults = self.value_list(defaults)?;
            }
        }
        if flags & HAS_KW_DEFAULTS != 0 {
            if let Some(kw) = operands.next() {
                out.kw_defaults = self.name_map(kw)?.into_iter().collect();
            }
        }
        if flags & HAS_ANNOTATIONS != 0 {
            if let Some(ann) = operands.next() {
                out.annotations = self.name_map(ann)?.into_iter().collect();
            }
        }
        Ok(out)
    }

    /// Each element of a tuple operand, rendered.
    fn value_list(&mut self, tree: &Tree) -> Result<Vec<String>> {
        let tree = tree.unwrap_single(&["expr"]);
        if let Some(items) = tree.attr().and_then(Value::as_tuple) {
            return Ok(items.iter().map(Value::repr).collect());
        }
        match tree {
            Tree::Node(n) if n.is("tuple") || n.is("build_list") => {
                let elems = n.children.split_last().map_or(&[][..], |(_, rest)| rest);
                elems
                    .iter()
                    .map(|e| self.with_prec(ARG_PREC, |w| w.traverse(e, Some(""), false)))
                    .collect()
            }
            other => Ok(vec![self.with_prec(ARG_PREC, |w| w.traverse(other, Some(""), false))?]),
        }
    }

    /// Name to rendered value, from a dict operand.
    fn name_map(&mut self, tree: &Tree) -> Result<Vec<(String, String)>> {
        let tree = tree.unwrap_single(&["expr"]);
        let Tree::Node(dict) = tree else {
            return Err(DeparseError::template(tree.kind(), "a dict of names", "a terminal"));
        };
        let mut pairs = Vec::new();
        if dict.get(-1).is_some_and(|t| t.kind().starts_with("BUILD_CONST_KEY_MAP")) {
            let keys = dict
                .get(-2)
                .map(|k| k.unwrap_single(&["expr"]))
                .and_then(Tree::attr)
                .and_then(Value::as_tuple)
                .ok_or_else(|| DeparseError::template(&dict.kind, "constant key names", "none"))?;
            let values = &dict.children[..dict.len().saturating_sub(2)];
            for (key, value) in keys.iter().zip(values) {
                let text = self.with_prec(ARG_PREC, |w| w.traverse(value, Some(""), false))?;
                pairs.push((key.to_string(), text));
            }
            return Ok(pairs);
        }

        let items = match dict.get(0) {
            Some(kv) if kv.kind().starts_with("kvlist") => kv.children(),
            _ => &dict.children[..],
        };
        let items: Vec<&Tree> =
            items.iter().filter(|c| !c.kind().starts_with("BUILD_MAP")).collect();
        for pair in items.chunks(2) {
            let [key, value] = pair else {
                return Err(DeparseError::template(&dict.kind, "name/value pairs", "an odd count"));
            };
            let key = key.unwrap_single(&["expr"]);
            let name = key
                .attr()
                .and_then(Value::as_str)
                .map_or_else(|| key.kind().to_string(), str::to_string);
            let text = self.with_prec(ARG_PREC, |w| w.traverse(value, Some(""), false))?;
            pairs.push((name, text));
        }
        Ok(pairs)
    }

    /// Positional, positional-only, `*args`, keyword-only and `**kwargs`
    /// parameters with their defaults and annotations.
    fn param_list(&self, code: &CodeObject, operands: &FunctionOperands, annotate: bool) -> String {
        let argc = code.argcount as usize;
        let kwonly = code.kwonly_argcount as usize;
        let name_at = |i: usize| code.varnames.get(i).cloned().unwrap_or_else(|| format!("_{}", i));
        let annotated = |name: &str| {
            if annotate {
                operands.annotations.get(name).map(|a| format!("{}: {}", name, a))
            } else {
                None
            }
        };
        let with_default = |name: &str, default: Option<&String>| {
            let head = annotated(name).unwrap_or_else(|| name.to_string());
            match default {
                // PEP 8 spacing around `=` only with an annotation
                Some(d) if head.len() > name.len() => format!("{} = {}", head, d),
                Some(d) => format!("{}={}", head, d),
                None => head,
            }
        };

        let mut params = Vec::new();
        let first_default = argc.saturating_sub(operands.defaults.len());
        for i in 0..argc {
            let default = i.checked_sub(first_default).and_then(|d| operands.defaults.get(d));
            params.push(with_default(&name_at(i), default));
            if code.posonly_argcount > 0 && i + 1 == code.posonly_argcount as usize {
                params.push("/".to_string());
            }
        }

        let mut next = argc + kwonly;
        if code.has_flag(CodeObject::VARARGS) {
            let name = name_at(next);
            params.push(format!("*{}", annotated(&name).unwrap_or(name)));
            next += 1;
        } else if kwonly > 0 {
            params.push("*".to_string());
        }
        for i in argc..argc + kwonly {
            let name = name_at(i);
            params.push(with_default(&name, operands.kw_defaults.get(&name)));
        }
        if code.has_flag(CodeObject::VARKEYWORDS) {
            let name = name_at(next);
            params.push(format!("**{}", annotated(&name).unwrap_or(name)));
        }
        params.join(", ")
    }
}
