use deparse::lang::{CodeObject, Node, Token, Tree, Value};
use deparse::parse::{CompileMode, ReplayParser};
use deparse::{Bundle, DeparseError, DeparseOptions, code_deparse, deparse_to_string};

fn tok(kind: &str, offset: usize) -> Token {
    Token::new(kind, offset)
}

fn node(kind: &str, children: Vec<Tree>) -> Tree {
    Tree::node(kind, children)
}

fn name(kind: &str, n: &str) -> Tree {
    Tree::Token(Token::name(kind, n, 0))
}

fn constant(value: Value) -> Tree {
    Tree::Token(Token::constant("LOAD_CONST", value, 0))
}

fn stmt(inner: Tree) -> Tree {
    node("sstmt", vec![inner])
}

fn assign(value: Tree, target: &str) -> Tree {
    stmt(node(
        "assign",
        vec![node("expr", vec![value]), node("store", vec![name("STORE_NAME", target)])],
    ))
}

fn function(n: &str, args: &[&str]) -> CodeObject {
    let mut code = CodeObject::new(n).with_tokens(vec![
        Token::name("LOAD_FAST", args.first().copied().unwrap_or("x"), 0),
        tok("RETURN_VALUE", 2),
    ]);
    code.argcount = args.len() as u32;
    code.varnames = args.iter().map(|a| a.to_string()).collect();
    code
}

fn function_def(code: &CodeObject) -> Tree {
    stmt(node(
        "function_def",
        vec![
            node(
                "mkfunc",
                vec![
                    Tree::Token(Token::constant(
                        "LOAD_CODE",
                        Value::Code(Box::new(code.clone())),
                        4,
                    )),
                    Tree::Token(Token::constant("LOAD_STR", Value::Str(code.name.clone()), 6)),
                    Tree::Token(Token::constant("MAKE_FUNCTION_0", Value::Int(0), 8)),
                ],
            ),
            node("store", vec![name("STORE_NAME", &code.name)]),
        ],
    ))
}

fn returns_first_arg(code: &CodeObject) -> Node {
    let arg = code.varnames.first().cloned().unwrap_or_default();
    Node::new(
        "stmts",
        vec![stmt(node(
            "return",
            vec![
                node("return_expr", vec![node("expr", vec![name("LOAD_FAST", &arg)])]),
                Tree::Token(tok("RETURN_LAST", 2)),
            ],
        ))],
    )
}

/// A module with a docstring, one function and one assignment.
fn module_bundle() -> Bundle {
    let f = function("identity", &["value"]);
    let module = CodeObject::new("<module>").with_tokens(vec![
        Token::constant("LOAD_STR", Value::Str("Helpers.".into()), 0),
        Token::name("STORE_NAME", "__doc__", 2),
        Token::constant("LOAD_CODE", Value::Code(Box::new(f.clone())), 4),
        Token::constant("LOAD_STR", Value::Str("identity".into()), 6),
        Token::constant("MAKE_FUNCTION_0", Value::Int(0), 8),
        Token::name("STORE_NAME", "identity", 10),
        Token::constant("LOAD_CONST", Value::Int(2), 12),
        Token::name("STORE_NAME", "y", 14),
        Token::constant("LOAD_CONST", Value::None, 16),
        tok("RETURN_VALUE", 18),
    ]);
    let tree = Node::new(
        "stmts",
        vec![
            assign(
                Tree::Token(Token::constant("LOAD_STR", Value::Str("Helpers.".into()), 0)),
                "__doc__",
            ),
            function_def(&f),
            assign(constant(Value::Int(2)), "y"),
        ],
    );
    Bundle::new(module)
        .with_tree("<module>", tree)
        .with_tree("identity", returns_first_arg(&f))
}

#[test]
fn test_module_renders_in_order() {
    let bundle = module_bundle();
    let mut parser = bundle.parser();
    let text = deparse_to_string(&bundle.code, &mut parser, &DeparseOptions::default()).unwrap();

    let doc = text.find("\"\"\"Helpers.\"\"\"\n").expect("docstring");
    let def = text.find("def identity(value):\n    return value\n").expect("function");
    let assign = text.find("y = 2\n").expect("assignment");
    assert!(doc < def && def < assign, "{:?}", text);
    assert!(!text.contains("__doc__"));
    assert!(!text.contains("return None"));
    assert_eq!(parser.served(), ["<module>".to_string(), "identity".to_string()]);
}

#[test]
fn test_bundle_bytes_render_the_same() {
    let bundle = module_bundle();
    let opts = DeparseOptions::default();
    let direct = deparse_to_string(&bundle.code, &mut bundle.parser(), &opts).unwrap();

    let stored = Bundle::from_bytes(&bundle.to_bytes().unwrap()).unwrap();
    let replayed = deparse_to_string(&stored.code, &mut stored.parser(), &opts).unwrap();
    assert_eq!(direct, replayed);
}

#[test]
fn test_missing_nested_parse() {
    let mut bundle = module_bundle();
    bundle.trees.remove("identity");

    let strict = DeparseOptions::default();
    let err = code_deparse(&bundle.code, &mut bundle.parser(), &strict).unwrap_err();
    assert!(matches!(err, DeparseError::Parse(_)), "{}", err);

    let tolerant = DeparseOptions::default().with_tolerate_errors(true);
    let err = code_deparse(&bundle.code, &mut bundle.parser(), &tolerant).unwrap_err();
    let partial = err.partial().expect("partial text").to_string();
    assert!(
        partial.contains("def identity(value):\n    # parse error in identity"),
        "{:?}",
        partial
    );
    assert!(partial.contains("y = 2\n"));
    assert!(partial.contains("# NOTE: have internal decompilation grammar errors.\n"));
}

#[test]
fn test_lambda_mode() {
    let code = CodeObject::new("<lambda>")
        .with_tokens(vec![Token::name("LOAD_FAST", "x", 0), tok("RETURN_VALUE", 2)]);
    let tree = Node::new(
        "lambda_start",
        vec![
            node(
                "return_expr_lambda",
                vec![
                    node("expr", vec![name("LOAD_FAST", "x")]),
                    Tree::Token(tok("RETURN_VALUE_LAMBDA", 2)),
                ],
            ),
            Tree::Token(tok("LAMBDA_MARKER", 2)),
        ],
    );
    let mut parser = ReplayParser::default().with_tree("<lambda>", tree);
    let opts = DeparseOptions::default().with_compile_mode(CompileMode::Lambda);
    assert_eq!(deparse_to_string(&code, &mut parser, &opts).unwrap(), "x");
}

#[test]
fn test_wrong_start_symbol_rejected() {
    let code = CodeObject::new("<expr>")
        .with_tokens(vec![Token::name("LOAD_NAME", "x", 0), tok("RETURN_VALUE", 2)]);
    let mut parser = ReplayParser::default().with_tree("<expr>", Node::new("stmts", vec![]));
    let opts = DeparseOptions::default().with_compile_mode(CompileMode::Eval);
    assert!(code_deparse(&code, &mut parser, &opts).is_err());
}