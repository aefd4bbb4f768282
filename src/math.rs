use crate::{
    library::{Args, HandlerResult, Library, MemberTable, ParamType, Signature},
    value::Variant,
};

const DOUBLES: [ParamType; 2] = [ParamType::Double, ParamType::Double];

/// Arithmetic over doubles. `+` concatenates when either side is a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathLibrary;

impl Library for MathLibrary {
    fn register(&self, members: &mut MemberTable) {
        members
            .operator("+", [ParamType::Variant, ParamType::Variant], plus)
            .operator("-", DOUBLES, |args| {
                Ok(Variant::double(args[0].as_double() - args[1].as_double()))
            })
            .operator("*", DOUBLES, |args| {
                Ok(Variant::double(args[0].as_double() * args[1].as_double()))
            })
            .operator("/", DOUBLES, |args| {
                Ok(Variant::double(args[0].as_double() / args[1].as_double()))
            })
            .method("abs", Signature::fixed([ParamType::Double]), |args| {
                Ok(Variant::double(args[0].as_double().abs()))
            });
    }
}

fn plus(args: Args<'_>) -> HandlerResult {
    let (lhs, rhs) = (&args[0], &args[1]);
    if lhs.is_string() || rhs.is_string() {
        return Ok(Variant::string(format!("{lhs}{rhs}")));
    }
    Ok(Variant::double(lhs.as_double() + rhs.as_double()))
}
