use std::fmt::Write;

use notation::{ElementKind, EntityId, Notation, ParseError, Parser, Position, parse};
use pretty_assertions::assert_eq;

fn children(tree: &Notation, expression: EntityId) -> Vec<(ElementKind, String)> {
    let root = tree.entity(expression).as_expression().unwrap().root();
    tree.element(root)
        .children()
        .iter()
        .map(|&id| {
            let element = tree.element(id);
            (element.kind(), element.text().to_string())
        })
        .collect()
}

#[test]
fn arithmetic_member() {
    let tree = parse("#root{ a = 1+2*3; }").unwrap();
    assert_eq!(tree.root_section().name(), Some("root"));
    assert_eq!(tree.root_section().len(), 1);

    let a = tree.find("a").unwrap();
    assert_eq!(
        children(&tree, a),
        vec![
            (ElementKind::Number, "1".to_string()),
            (ElementKind::Operator, "+".to_string()),
            (ElementKind::Number, "2".to_string()),
            (ElementKind::Operator, "*".to_string()),
            (ElementKind::Number, "3".to_string()),
        ]
    );
}

#[test]
fn nested_arrays() {
    let tree = parse(r#"#root{ arr = ["x", ["y","z"]]; }"#).unwrap();
    assert_eq!(tree.root_section().len(), 1);

    let arr = tree.entity(tree.find("arr").unwrap());
    let items = arr.as_array().unwrap().items();
    assert_eq!(items.len(), 2);
    assert!(tree.entity(items[0]).is_expression());

    let inner = tree.entity(items[1]).as_array().unwrap();
    assert_eq!(inner.len(), 2);
    assert_eq!(
        children(&tree, inner.items()[1]),
        vec![(ElementKind::String, "z".to_string())]
    );
}

#[test]
fn comments_do_not_shift_positions() {
    let commented = parse("#r{ // note\n a=1; }").unwrap();
    let plain = parse("#r{ a=1; }").unwrap();
    assert_eq!(commented.to_string(), plain.to_string());

    let a = commented.entity(commented.find("a").unwrap());
    assert_eq!(a.position(), Position::new(15, 2, 4));
}

#[test]
fn block_comments_keep_line_numbers() {
    let tree = parse("#r{ /* one\ntwo */ a = 1;\n b = 2; }").unwrap();
    let b = tree.entity(tree.find("b").unwrap());
    assert_eq!(b.position().line, 3);
}

#[test]
fn tree_rendering() {
    let tree = parse(r#"#r{ a = f(1, "s") + 2; list = [1, #s{ b = x; }]; }"#).unwrap();
    let expected = "\
SECTION 'r' {
  a = EXPRESSION
    FUNCTION 'f'
      ARGUMENT ''
        NUMBER '1'
      ARGUMENT ''
        STRING 's'
    OPERATOR '+'
    NUMBER '2'
  list = ARRAY [
    EXPRESSION
      NUMBER '1'
    SECTION 's' {
      b = EXPRESSION
        IDENTIFIER 'x'
    }
  ]
}
";
    assert_eq!(tree.to_string(), expected);
}

/// Counts rendered output without keeping it.
#[derive(Default)]
struct Tally {
    bytes: usize,
    lines: usize,
}

impl Write for Tally {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.bytes += s.len();
        self.lines += s.matches('\n').count();
        Ok(())
    }
}

#[test]
fn deeply_nested_calls_render() {
    let depth = 17_000;
    let source = format!("#r{{ a = {}1{}; }}", "math.abs(".repeat(depth), ")".repeat(depth));
    let tree = parse(&source).unwrap();

    let mut tally = Tally::default();
    write!(tally, "{tree}").unwrap();
    // a FUNCTION and an ARGUMENT line per level
    assert_eq!(tally.lines, 2 * depth + 4);
}

#[test]
fn deeply_nested_sections_render() {
    let depth = 33_000;
    let source = format!("#r{{{} b = 1;{} }}", " a = #s{".repeat(depth), " };".repeat(depth));
    let tree = parse(&source).unwrap();

    let mut tally = Tally::default();
    write!(tally, "{tree}").unwrap();
    assert_eq!(tally.lines, 2 * depth + 4);
    assert!(tally.bytes > 2 * depth * depth);
}

#[test]
fn empty_call_has_one_empty_argument() {
    let tree = parse("#r{ a = f(); }").unwrap();
    let root = tree
        .entity(tree.find("a").unwrap())
        .as_expression()
        .unwrap()
        .root();
    let call = tree.element(tree.element(root).children()[0]);
    assert_eq!(call.kind(), ElementKind::Function);
    assert_eq!(call.children().len(), 1);

    let argument = tree.element(call.children()[0]);
    assert_eq!(argument.kind(), ElementKind::FunctionArgument);
    assert!(argument.children().is_empty());
}

#[test]
fn nested_sections_resolve_by_path() {
    let source = r#"
        #config{
            db = #database{
                host = "localhost";
                port = 5432;
            };
            name = "app";
        }
    "#;
    let tree = parse(source).unwrap();

    let db = tree.entity(tree.find("db").unwrap());
    assert_eq!(db.as_section().unwrap().name(), Some("database"));
    assert_eq!(
        children(&tree, tree.find("db.port").unwrap()),
        vec![(ElementKind::Number, "5432".to_string())]
    );
    assert!(tree.find("db.user").is_none());
    assert!(tree.find("name.host").is_none());
}

#[test]
fn duplicate_members_are_kept() {
    let tree = parse("#r{ a = 1; a = 2; }").unwrap();
    assert_eq!(tree.root_section().len(), 2);
    assert_eq!(
        children(&tree, tree.find("a").unwrap()),
        vec![(ElementKind::Number, "1".to_string())]
    );
}

#[test]
fn string_escapes() {
    let tree = parse(r#"#r{ a = "say \"hi\"\t\\"; }"#).unwrap();
    assert_eq!(
        children(&tree, tree.find("a").unwrap()),
        vec![(ElementKind::String, "say \"hi\"\t\\".to_string())]
    );
}

#[test]
fn comment_markers_inside_strings_are_text() {
    let tree = parse(r#"#r{ a = "http://x/*y*/"; }"#).unwrap();
    assert_eq!(
        children(&tree, tree.find("a").unwrap()),
        vec![(ElementKind::String, "http://x/*y*/".to_string())]
    );
}

#[test]
fn negative_and_fractional_numbers() {
    let tree = parse("#r{ a = -10.5 - -2; }").unwrap();
    assert_eq!(
        children(&tree, tree.find("a").unwrap()),
        vec![
            (ElementKind::Number, "-10.5".to_string()),
            (ElementKind::Operator, "-".to_string()),
            (ElementKind::Number, "-2".to_string()),
        ]
    );
}

#[test]
fn grouping_parentheses_become_symbols() {
    let tree = parse("#r{ a = (1 + 2) * 3; }").unwrap();
    let kinds: Vec<_> = children(&tree, tree.find("a").unwrap())
        .into_iter()
        .map(|(kind, _)| kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ElementKind::Symbol,
            ElementKind::Number,
            ElementKind::Operator,
            ElementKind::Number,
            ElementKind::Symbol,
            ElementKind::Operator,
            ElementKind::Number,
        ]
    );
}

#[test]
fn windows_line_endings() {
    let tree = parse("#r{\r\n a = 1;\r\n b = 2;\r\n}").unwrap();
    let b = tree.entity(tree.find("b").unwrap());
    assert_eq!(b.position().line, 3);
}

#[test]
fn explicit_terminator_is_accepted() {
    assert!(parse("#r{ a = 1; }.").is_ok());
    assert!(parse("#r{ a = 1; }.\n").is_ok());
}

#[test]
fn custom_operator_set() {
    let source = "#r{ a = x ** y; }";
    assert!(parse(source).is_err());

    let tree = Parser::with_operators(None, source, ["**", "+"]).parse().unwrap();
    assert_eq!(
        children(&tree, tree.find("a").unwrap()),
        vec![
            (ElementKind::Identifier, "x".to_string()),
            (ElementKind::Operator, "**".to_string()),
            (ElementKind::Identifier, "y".to_string()),
        ]
    );
}

#[test]
fn whitespace_separates_identifiers() {
    let Err(ParseError::Syntax(error)) = parse("#r{ a = foo bar; }") else {
        panic!("adjacent identifiers must not fuse");
    };
    assert_eq!(error.token, Some('b'));
}

#[test]
fn unterminated_string_reports_end_of_input() {
    let source = "#root{\n a = \"oops;\n}";
    let Err(ParseError::Syntax(error)) = parse(source) else {
        panic!("expected a syntax error");
    };
    assert_eq!(error.message(), "unterminated string literal");
    assert_eq!(error.line(), 3);
    assert_eq!(error.column(), 2);
}

#[test]
fn unexpected_character_position() {
    let Err(ParseError::Syntax(error)) = parse("#r{ a = 1 ? 2; }") else {
        panic!("expected a syntax error");
    };
    assert_eq!(error.message(), "syntax error, unexpected character '?'");
    assert_eq!(error.token, Some('?'));
    assert_eq!(error.position(), Position::new(10, 1, 11));
}

#[test]
fn invalid_escape_is_a_syntax_error() {
    let Err(ParseError::Syntax(error)) = parse(r#"#r{ a = "x\q"; }"#) else {
        panic!("expected a syntax error");
    };
    assert!(error.message().starts_with("invalid escape sequence"));
}

#[test]
fn partial_operator_is_rejected() {
    let Err(ParseError::Syntax(error)) = parse("#r{ a = x & y; }") else {
        panic!("expected a syntax error");
    };
    assert_eq!(error.message(), "unknown operator '&'");
}

#[test]
fn truncated_input() {
    for source in ["#r{ a = 1;", "#r{ a = 1", "#r{ a = (1 + 2", "#r{", "#r{ a = [1, 2"] {
        let result = parse(source);
        assert!(
            matches!(result, Err(ParseError::UnexpectedEnd(_))),
            "{source:?} gave {result:?}"
        );
    }
}

#[test]
fn nothing_but_the_terminator_after_the_root() {
    let cases = [
        ("#r{};", ';'),
        ("#r{} , x", ','),
        ("#r{ a = 1; } ; ", ';'),
        ("#r{}; x = 1;", ';'),
    ];
    for (source, token) in cases {
        let Err(ParseError::Syntax(error)) = parse(source) else {
            panic!("{source:?} must be a syntax error");
        };
        assert_eq!(error.token, Some(token), "{source:?}");
    }
}

#[test]
fn missing_semicolon() {
    assert!(matches!(
        parse("#r{ a = x }"),
        Err(ParseError::Syntax(ref error)) if error.token == Some('}')
    ));
}

#[test]
fn number_needs_digits_after_the_dot() {
    assert!(parse("#r{ a = 1.; }").is_err());
}

#[test]
fn rendered_listing() {
    let error = parse("#r{\n a = 1 ? 2;\n}").unwrap_err();
    assert_eq!(
        error.render_source(),
        "PARSER ERROR:\n\t'syntax error, unexpected character '?''\n\tat line 2 and column 8.\n  1: #r{\n  2:  a = 1 ? 2;\n     -------^\n  3: }\n"
    );
}

#[test]
fn listing_for_input_ending_in_a_line_break() {
    let error = parse("#r{\n a = 1;\n").unwrap_err();
    assert!(matches!(error, ParseError::UnexpectedEnd(_)));
    assert_eq!(
        error.render_source(),
        "PARSER ERROR:\n\t'unexpected end of script'\n\tat line 3 and column 1.\n  1: #r{\n  2:  a = 1;\n  3: \n     ^\n"
    );
}

#[test]
fn parsing_is_idempotent() {
    let source = r#"#r{ a = sysout(1 + 2) * (3 - x.y); b = [#s{ c = "d"; }, [], -1.25]; }"#;
    assert_eq!(parse(source).unwrap(), parse(source).unwrap());
}
