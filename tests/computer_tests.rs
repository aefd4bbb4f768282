use std::sync::{Arc, Mutex};

use notation::{
    Computer, EvalError, Library, LibraryError, MemberKind, MemberTable, Notation, ParamType,
    Parser, Signature, Variant, VariantType, parse::DEFAULT_OPERATORS,
};
use miette::Diagnostic;
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Result<Variant, EvalError> {
    let tree = notation::parse(source).unwrap();
    Computer::new().compute_path(&tree, "a")
}

fn member(expression: &str) -> Variant {
    eval(&format!("#r{{ a = {expression}; }}")).unwrap()
}

#[test]
fn multiplication_binds_tighter() {
    let value = eval("#root{ a = 1+2*3; }").unwrap();
    assert_eq!(value.variant_type(), VariantType::Double);
    assert_eq!(value.as_double(), 7.0);
}

#[test]
fn math_uses_double_arithmetic() {
    let value = eval("#root{ a = 1/2 + math.abs(-10.5); }").unwrap();
    assert_eq!(value.as_double(), 11.0);
    assert_eq!(value.as_string(), "11.0");
}

#[test]
fn precedence_and_grouping() {
    assert_eq!(member("(1 + 2) * 3").as_double(), 9.0);
    assert_eq!(member("8 - 3 - 2").as_double(), 3.0);
    assert_eq!(member("2 * 3 + 4 * 5").as_double(), 26.0);
    assert_eq!(member("2 * ((1 + 2) - 4)").as_double(), -2.0);
    assert_eq!(member("12 / 2 / 3").as_double(), 2.0);
}

#[test]
fn division_by_zero_is_infinite() {
    assert!(member("1 / 0").as_double().is_infinite());
}

#[test]
fn plus_concatenates_strings() {
    assert_eq!(member(r#""n=" + 1"#).as_string(), "n=1.0");
    assert_eq!(member(r#""a" + "b""#).as_string(), "ab");
}

#[test]
fn comparisons_and_logic() {
    assert!(member("2 > 1").as_boolean());
    assert!(member("1 >= 1").as_boolean());
    assert!(!member("1 <= 0.5").as_boolean());
    assert!(!member(r#""b" < "a""#).as_boolean());
    assert!(member(r#""10" < "9""#).as_boolean());
    assert!(member("1 + 1 == 2").as_boolean());
    assert!(member("1 != 2").as_boolean());
    assert!(!member("true && 1 > 2").as_boolean());
    assert!(member("false || 2 > 1").as_boolean());
    assert!(member("not(1 > 2)").as_boolean());
}

#[test]
fn dates_compare_chronologically() {
    let later = member(
        r#"toDate("2024-03-01 10:00:00", "%Y-%m-%d %H:%M:%S") > system.toDate("2024-02-01", "%Y-%m-%d")"#,
    );
    assert!(later.as_boolean());
}

#[test]
fn system_variables() {
    let value = member("true");
    assert!(value.as_boolean());
    assert_eq!(value.name(), Some("system.true"));

    let value = member("system.null");
    assert!(value.is_null());
    assert_eq!(value.as_string(), "null");

    assert_eq!(member("sysdate").variant_type(), VariantType::Date);
}

#[test]
fn sysout_returns_its_argument() {
    assert_eq!(member(r#"sysout("hello")"#).as_string(), "hello");
}

#[test]
fn unknown_library_is_named() {
    let error = eval("#root{ a = foo.bar; }").unwrap_err();
    assert!(matches!(
        error.root_cause(),
        EvalError::UnknownLibrary { name } if name == "foo"
    ));
}

#[test]
fn errors_carry_the_failing_element() {
    let error = eval("#r{ a = 1 + foo.bar; }").unwrap_err();
    assert_eq!(
        error.to_string(),
        "runtime error evaluating an identifier 'foo.bar' at line 1 column 13"
    );
    assert_eq!(error.position().map(|p| p.column), Some(13));
}

#[test]
fn source_code_is_attached_once() {
    let error = eval("#r{ a = math.abs(foo.bar); }").unwrap_err();
    assert!(error.source_code().is_some());

    let EvalError::Element { source: inner, .. } = &error else {
        panic!("expected an element layer, got {error:?}");
    };
    assert!(matches!(**inner, EvalError::Element { .. }));
    assert!(inner.source_code().is_none());
    assert!(matches!(inner.root_cause(), EvalError::UnknownLibrary { .. }));
}

#[test]
fn computed_values_carry_their_type_name() {
    assert_eq!(member("1 + 1").type_name(), Some("Double"));
    assert_eq!(member("true").type_name(), Some("Boolean"));
    assert_eq!(member(r#""x""#).type_name(), Some("String"));
    assert_eq!(member("sysdate").type_name(), Some("Date"));
}

struct Recorder {
    calls: Arc<Mutex<Vec<usize>>>,
}

impl Library for Recorder {
    fn register(&self, members: &mut MemberTable) {
        let calls = Arc::clone(&self.calls);
        members.method(
            "f",
            Signature::variadic(Vec::<ParamType>::new(), ParamType::Variant),
            move |args| {
                calls.lock().unwrap().push(args.len());
                Ok(Variant::from("called"))
            },
        );
    }
}

#[test]
fn empty_call_passes_no_arguments() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut computer = Computer::new();
    computer.add_library(
        "rec",
        Recorder {
            calls: Arc::clone(&calls),
        },
    );

    let tree = notation::parse("#root{ a = rec.f(); b = rec.f(1, (2), \"x\"); }").unwrap();
    assert_eq!(computer.compute_path(&tree, "a").unwrap().as_string(), "called");
    computer.compute_path(&tree, "b").unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![0, 3]);
}

#[test]
fn default_handlers() {
    let mut env = MemberTable::new();
    env.default_variable(|name| Ok(Variant::string(format!("${name}"))))
        .default_method(|name, args| Ok(Variant::string(format!("{name}#{}", args.len()))));

    let mut computer = Computer::new();
    computer.add_library("env", env);

    let tree = notation::parse("#r{ a = env.HOME + env.anything(1, 2); }").unwrap();
    let value = computer.compute_path(&tree, "a").unwrap();
    assert_eq!(value.as_string(), "$HOMEanything#2");
    assert!(computer.has_library("env"));
}

#[test]
fn missing_members() {
    let error = eval("#r{ a = math.nope(1); }").unwrap_err();
    assert!(matches!(
        error.root_cause(),
        EvalError::MemberNotFound { library, kind: MemberKind::Method, name }
            if library == "math" && name == "nope"
    ));

    let error = eval("#r{ a = math.abs(1, 2); }").unwrap_err();
    assert!(matches!(
        error.root_cause(),
        EvalError::MemberNotFound { kind: MemberKind::Method, .. }
    ));

    let error = eval("#r{ a = undefined; }").unwrap_err();
    assert!(matches!(
        error.root_cause(),
        EvalError::MemberNotFound { library, kind: MemberKind::Variable, .. } if library == "system"
    ));
}

#[test]
fn failing_handler_keeps_its_cause() {
    let error = eval(r#"#r{ a = toDate("soon", "%Y-%m-%d"); }"#).unwrap_err();
    let EvalError::Invocation { kind, name, source, .. } = error.root_cause() else {
        panic!("expected an invocation error, got {error:?}");
    };
    assert_eq!(*kind, MemberKind::Method);
    assert_eq!(name, "toDate");
    assert!(matches!(source, LibraryError::DateParse { value, .. } if value == "soon"));
}

#[test]
fn unregistered_operator_dispatches_to_system() {
    let operators = DEFAULT_OPERATORS.iter().copied().chain(["%"]);
    let tree = Parser::with_operators(None, "#r{ a = 7 % 4; }", operators)
        .parse()
        .unwrap();

    let error = Computer::new().compute_path(&tree, "a").unwrap_err();
    assert!(matches!(
        error.root_cause(),
        EvalError::MemberNotFound { library, kind: MemberKind::Operator, name }
            if library == "system" && name == "%"
    ));
}

#[test]
fn custom_operator_registration() {
    let operators = DEFAULT_OPERATORS.iter().copied().chain(["%"]);
    let tree = Parser::with_operators(None, "#r{ a = 10 - 7 % 4; }", operators)
        .parse()
        .unwrap();

    let mut ext = MemberTable::new();
    ext.operator("%", [ParamType::Double, ParamType::Double], |args| {
        Ok(Variant::double(args[0].as_double() % args[1].as_double()))
    });
    let mut computer = Computer::new();
    computer
        .add_library("ext", ext)
        .register_operator("%", "ext", 6);

    assert_eq!(computer.operator_priority("%"), 6);
    assert_eq!(computer.compute_path(&tree, "a").unwrap().as_double(), 7.0);
}

#[test]
fn operator_library_must_exist() {
    let tree = notation::parse("#r{ a = 1 + 2; }").unwrap();
    let mut computer = Computer::new();
    computer.register_operator("+", "nowhere", 5);
    let error = computer.compute_path(&tree, "a").unwrap_err();
    assert!(matches!(
        error.root_cause(),
        EvalError::UnknownLibrary { name } if name == "nowhere"
    ));
}

#[test]
fn nesting_limit() {
    let tree = notation::parse("#r{ a = math.abs(math.abs(math.abs(-1))); }").unwrap();

    let error = Computer::new()
        .with_max_depth(2)
        .compute_path(&tree, "a")
        .unwrap_err();
    assert!(matches!(error.root_cause(), EvalError::DepthExceeded { limit: 2 }));

    let value = Computer::new()
        .with_max_depth(3)
        .compute_path(&tree, "a")
        .unwrap();
    assert_eq!(value.as_double(), 1.0);
}

#[test]
fn paths_and_entity_kinds() {
    let tree = notation::parse(r#"#r{ s = #inner{ x = 2 * 2; }; arr = [1 + 1, "x"]; }"#).unwrap();
    let computer = Computer::new();

    assert_eq!(computer.compute_path(&tree, "s.x").unwrap().as_double(), 4.0);
    assert!(matches!(
        computer.compute_path(&tree, "missing"),
        Err(EvalError::PathNotFound { .. })
    ));
    assert!(matches!(
        computer.compute_path(&tree, "s"),
        Err(EvalError::NotAnExpression { name }) if name == "s"
    ));

    let arr = tree.entity(tree.find("arr").unwrap()).as_array().unwrap();
    assert_eq!(computer.compute(&tree, arr.items()[0]).unwrap().as_double(), 2.0);
    assert_eq!(computer.compute(&tree, arr.items()[1]).unwrap().as_string(), "x");
}

#[test]
fn computer_is_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Computer>();
    assert_send_sync::<Notation>();

    let tree = notation::parse("#r{ a = 6 * 7; }").unwrap();
    let computer = Computer::new();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| computer.compute_path(&tree, "a").unwrap().as_double()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42.0);
        }
    });
}
