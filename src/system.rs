use std::{
    cmp::Ordering,
    io::{Write, stderr, stdout},
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::{
    library::{Args, HandlerResult, Library, LibraryError, MemberTable, ParamType, Signature},
    value::Variant,
};

const VARIANTS: [ParamType; 2] = [ParamType::Variant, ParamType::Variant];
const BOOLEANS: [ParamType; 2] = [ParamType::Boolean, ParamType::Boolean];

/// Constants, comparisons, logic and console output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLibrary;

impl Library for SystemLibrary {
    fn register(&self, members: &mut MemberTable) {
        members
            .constant("true", Variant::boolean(true))
            .constant("false", Variant::boolean(false))
            .constant("null", Variant::null())
            .producer("sysdate", || Ok(Variant::date(Utc::now())))
            .operator("==", VARIANTS, |args| {
                Ok(Variant::boolean(compare(&args[0], &args[1]) == Some(Ordering::Equal)))
            })
            .operator("!=", VARIANTS, |args| {
                Ok(Variant::boolean(compare(&args[0], &args[1]) != Some(Ordering::Equal)))
            })
            .operator(">", VARIANTS, |args| {
                Ok(Variant::boolean(compare(&args[0], &args[1]).is_some_and(Ordering::is_gt)))
            })
            .operator("<", VARIANTS, |args| {
                Ok(Variant::boolean(compare(&args[0], &args[1]).is_some_and(Ordering::is_lt)))
            })
            .operator(">=", VARIANTS, |args| {
                Ok(Variant::boolean(compare(&args[0], &args[1]).is_some_and(Ordering::is_ge)))
            })
            .operator("<=", VARIANTS, |args| {
                Ok(Variant::boolean(compare(&args[0], &args[1]).is_some_and(Ordering::is_le)))
            })
            .operator("&&", BOOLEANS, |args| {
                Ok(Variant::boolean(args[0].as_boolean() && args[1].as_boolean()))
            })
            .operator("||", BOOLEANS, |args| {
                Ok(Variant::boolean(args[0].as_boolean() || args[1].as_boolean()))
            })
            .method("sysout", Signature::fixed([ParamType::Variant]), sysout)
            .method("syserr", Signature::fixed([ParamType::Variant]), syserr)
            .method("not", Signature::fixed([ParamType::Boolean]), |args| {
                Ok(Variant::boolean(!args[0].as_boolean()))
            })
            .method(
                "toDate",
                Signature::fixed([ParamType::String, ParamType::String]),
                to_date,
            );
    }
}

/// Text order when either side is a string, otherwise numeric order.
///
/// Integral kinds compare exactly as 64-bit integers; anything involving a
/// double compares as doubles and is unordered against NaN.
pub fn compare(lhs: &Variant, rhs: &Variant) -> Option<Ordering> {
    if lhs.is_string() || rhs.is_string() {
        return Some(lhs.as_string().cmp(&rhs.as_string()));
    }
    if lhs.variant_type().is_integral() && rhs.variant_type().is_integral() {
        return Some(lhs.as_long().cmp(&rhs.as_long()));
    }
    lhs.as_double().partial_cmp(&rhs.as_double())
}

fn sysout(args: Args<'_>) -> HandlerResult {
    writeln!(stdout(), "{}", args[0])?;
    Ok(args[0].clone())
}

fn syserr(args: Args<'_>) -> HandlerResult {
    writeln!(stderr(), "{}", args[0])?;
    Ok(args[0].clone())
}

/// Parses a date with a chrono format string. Date-only formats yield midnight UTC.
fn to_date(args: Args<'_>) -> HandlerResult {
    let value = args[0].as_string();
    let format = args[1].as_string();
    let parsed = NaiveDateTime::parse_from_str(&value, &format).or_else(|_| {
        NaiveDate::parse_from_str(&value, &format).map(|date| date.and_time(NaiveTime::MIN))
    });
    match parsed {
        Ok(naive) => Ok(Variant::date(naive.and_utc())),
        Err(source) => Err(LibraryError::DateParse {
            value,
            format,
            source,
        }),
    }
}
