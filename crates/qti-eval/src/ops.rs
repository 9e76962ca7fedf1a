//! Operators over runtime values.
//!
//! Every operator returns Null when any operand is Null. Numeric operators
//! require matching base types: mixing Integer and Float is a type error,
//! and `integerToFloat` is the only promotion.

use qti_types::{BaseType, Cardinality, Identifier, SingleValue, TypeError, Value};

type OpResult = Result<Value, TypeError>;

fn operand_error(operator: &'static str, value: &Value) -> TypeError {
    TypeError::Operand {
        operator,
        found: value.describe(),
    }
}

fn any_null(values: &[Value]) -> bool {
    values.iter().any(Value::is_null)
}

/// A single-cardinality operand.
fn single<'a>(operator: &'static str, value: &'a Value) -> Result<&'a SingleValue, TypeError> {
    value.as_single().ok_or_else(|| operand_error(operator, value))
}

enum Numbers {
    Integers(Vec<i64>),
    Floats(Vec<f64>),
}

/// Flatten numeric operands (singles and containers) of one base type.
fn numbers(operator: &'static str, values: &[Value]) -> Result<Numbers, TypeError> {
    let mut flat: Vec<&SingleValue> = Vec::new();
    for value in values {
        match value {
            Value::Single(v) => flat.push(v),
            Value::Multiple(_) | Value::Ordered(_) => {
                flat.extend(value.list_values().unwrap_or_default().iter());
            }
            _ => return Err(operand_error(operator, value)),
        }
    }
    let base_type = flat.first().map(|v| v.base_type());
    match base_type {
        Some(BaseType::Integer) | None => {
            let mut ints = Vec::with_capacity(flat.len());
            for v in flat {
                match v {
                    SingleValue::Integer(i) => ints.push(*i),
                    other => {
                        return Err(TypeError::Operand {
                            operator,
                            found: format!("mixed integer and {}", other.base_type()),
                        })
                    }
                }
            }
            Ok(Numbers::Integers(ints))
        }
        Some(BaseType::Float) => {
            let mut floats = Vec::with_capacity(flat.len());
            for v in flat {
                match v {
                    SingleValue::Float(f) => floats.push(*f),
                    other => {
                        return Err(TypeError::Operand {
                            operator,
                            found: format!("mixed float and {}", other.base_type()),
                        })
                    }
                }
            }
            Ok(Numbers::Floats(floats))
        }
        Some(other) => Err(TypeError::Operand {
            operator,
            found: format!("single {other}"),
        }),
    }
}

enum Pair {
    Integers(i64, i64),
    Floats(f64, f64),
}

fn numeric_pair(operator: &'static str, a: &Value, b: &Value) -> Result<Pair, TypeError> {
    match (single(operator, a)?, single(operator, b)?) {
        (SingleValue::Integer(x), SingleValue::Integer(y)) => Ok(Pair::Integers(*x, *y)),
        (SingleValue::Float(x), SingleValue::Float(y)) => Ok(Pair::Floats(*x, *y)),
        (x, y) => Err(TypeError::Operand {
            operator,
            found: format!("{} and {}", x.base_type(), y.base_type()),
        }),
    }
}

fn integer_operand(operator: &'static str, value: &Value) -> Result<i64, TypeError> {
    single(operator, value)?
        .as_integer()
        .ok_or_else(|| operand_error(operator, value))
}

fn float_operand(operator: &'static str, value: &Value) -> Result<f64, TypeError> {
    match single(operator, value)? {
        SingleValue::Float(f) => Ok(*f),
        _ => Err(operand_error(operator, value)),
    }
}

fn finite_or_null(f: f64) -> Value {
    if f.is_finite() {
        Value::float(f)
    } else {
        Value::Null
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic
// ══════════════════════════════════════════════════════════════════════════════

/// Sum of all operands; containers contribute their elements.
/// Integer overflow yields Null.
pub fn sum(values: &[Value]) -> OpResult {
    if any_null(values) {
        return Ok(Value::Null);
    }
    Ok(match numbers("sum", values)? {
        Numbers::Integers(ints) => ints
            .into_iter()
            .try_fold(0i64, |acc, i| acc.checked_add(i))
            .map_or(Value::Null, Value::integer),
        Numbers::Floats(floats) => finite_or_null(floats.into_iter().sum()),
    })
}

pub fn product(values: &[Value]) -> OpResult {
    if any_null(values) {
        return Ok(Value::Null);
    }
    Ok(match numbers("product", values)? {
        Numbers::Integers(ints) => ints
            .into_iter()
            .try_fold(1i64, |acc, i| acc.checked_mul(i))
            .map_or(Value::Null, Value::integer),
        Numbers::Floats(floats) => finite_or_null(floats.into_iter().product()),
    })
}

pub fn subtract(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    Ok(match numeric_pair("subtract", a, b)? {
        Pair::Integers(x, y) => x.checked_sub(y).map_or(Value::Null, Value::integer),
        Pair::Floats(x, y) => finite_or_null(x - y),
    })
}

/// Always a float; division by zero yields Null.
pub fn divide(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = match numeric_pair("divide", a, b)? {
        Pair::Integers(x, y) => (x as f64, y as f64),
        Pair::Floats(x, y) => (x, y),
    };
    if y == 0.0 {
        return Ok(Value::Null);
    }
    Ok(finite_or_null(x / y))
}

/// Always a float; non-finite results yield Null.
pub fn power(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = match numeric_pair("power", a, b)? {
        Pair::Integers(x, y) => (x as f64, y as f64),
        Pair::Floats(x, y) => (x, y),
    };
    Ok(finite_or_null(x.powf(y)))
}

/// Quotient rounded towards negative infinity.
pub fn integer_divide(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let x = integer_operand("integerDivide", a)?;
    let y = integer_operand("integerDivide", b)?;
    let Some(q) = x.checked_div(y) else {
        return Ok(Value::Null);
    };
    let floored = if x % y != 0 && ((x < 0) != (y < 0)) {
        q - 1
    } else {
        q
    };
    Ok(Value::integer(floored))
}

pub fn integer_modulus(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let x = integer_operand("integerModulus", a)?;
    let y = integer_operand("integerModulus", b)?;
    Ok(x.checked_rem(y).map_or(Value::Null, Value::integer))
}

pub fn integer_to_float(a: &Value) -> OpResult {
    if a.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::float(integer_operand("integerToFloat", a)? as f64))
}

/// Nearest integer, halves rounded up.
pub fn round(a: &Value) -> OpResult {
    if a.is_null() {
        return Ok(Value::Null);
    }
    let f = float_operand("round", a)?;
    Ok(float_to_integer((f + 0.5).floor()))
}

pub fn truncate(a: &Value) -> OpResult {
    if a.is_null() {
        return Ok(Value::Null);
    }
    let f = float_operand("truncate", a)?;
    Ok(float_to_integer(f.trunc()))
}

fn float_to_integer(f: f64) -> Value {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Value::integer(f as i64)
    } else {
        Value::Null
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Comparison
// ══════════════════════════════════════════════════════════════════════════════

fn compare(
    operator: &'static str,
    a: &Value,
    b: &Value,
    int_cmp: fn(i64, i64) -> bool,
    float_cmp: fn(f64, f64) -> bool,
) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::boolean(match numeric_pair(operator, a, b)? {
        Pair::Integers(x, y) => int_cmp(x, y),
        Pair::Floats(x, y) => float_cmp(x, y),
    }))
}

pub fn lt(a: &Value, b: &Value) -> OpResult {
    compare("lt", a, b, |x, y| x < y, |x, y| x < y)
}

pub fn lte(a: &Value, b: &Value) -> OpResult {
    compare("lte", a, b, |x, y| x <= y, |x, y| x <= y)
}

pub fn gt(a: &Value, b: &Value) -> OpResult {
    compare("gt", a, b, |x, y| x > y, |x, y| x > y)
}

pub fn gte(a: &Value, b: &Value) -> OpResult {
    compare("gte", a, b, |x, y| x >= y, |x, y| x >= y)
}

/// Numeric equality, within `tolerance` when given.
pub fn equal(a: &Value, b: &Value, tolerance: Option<f64>) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = match numeric_pair("equal", a, b)? {
        Pair::Integers(x, y) if tolerance.is_none() => return Ok(Value::boolean(x == y)),
        Pair::Integers(x, y) => (x as f64, y as f64),
        Pair::Floats(x, y) => (x, y),
    };
    let t = tolerance.unwrap_or(0.0).abs();
    Ok(Value::boolean((x - y).abs() <= t))
}

fn duration_pair(operator: &'static str, a: &Value, b: &Value) -> Result<(f64, f64), TypeError> {
    match (single(operator, a)?, single(operator, b)?) {
        (SingleValue::Duration(x), SingleValue::Duration(y)) => Ok((*x, *y)),
        (x, y) => Err(TypeError::Operand {
            operator,
            found: format!("{} and {}", x.base_type(), y.base_type()),
        }),
    }
}

pub fn duration_lt(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = duration_pair("durationLT", a, b)?;
    Ok(Value::boolean(x < y))
}

pub fn duration_gte(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (x, y) = duration_pair("durationGTE", a, b)?;
    Ok(Value::boolean(x >= y))
}

// ══════════════════════════════════════════════════════════════════════════════
// Boolean
// ══════════════════════════════════════════════════════════════════════════════

fn booleans(operator: &'static str, values: &[Value]) -> Result<Vec<Option<bool>>, TypeError> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => Ok(None),
            other => single(operator, other)?
                .as_bool()
                .map(Some)
                .ok_or_else(|| operand_error(operator, other)),
        })
        .collect()
}

/// False if any operand is false, else Null if any is Null, else true.
pub fn and(values: &[Value]) -> OpResult {
    let bools = booleans("and", values)?;
    if bools.contains(&Some(false)) {
        Ok(Value::boolean(false))
    } else if bools.contains(&None) {
        Ok(Value::Null)
    } else {
        Ok(Value::boolean(true))
    }
}

/// True if any operand is true, else Null if any is Null, else false.
pub fn or(values: &[Value]) -> OpResult {
    let bools = booleans("or", values)?;
    if bools.contains(&Some(true)) {
        Ok(Value::boolean(true))
    } else if bools.contains(&None) {
        Ok(Value::Null)
    } else {
        Ok(Value::boolean(false))
    }
}

pub fn not(a: &Value) -> OpResult {
    match booleans("not", std::slice::from_ref(a))?[0] {
        Some(b) => Ok(Value::boolean(!b)),
        None => Ok(Value::Null),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Containers
// ══════════════════════════════════════════════════════════════════════════════

pub fn is_null(a: &Value) -> Value {
    Value::boolean(a.is_null())
}

/// Number of elements; Null counts as an empty container.
pub fn container_size(a: &Value) -> OpResult {
    match a {
        Value::Null => Ok(Value::integer(0)),
        Value::Multiple(_) | Value::Ordered(_) => Ok(Value::integer(
            a.list_values().map_or(0, |v| v.len()) as i64,
        )),
        other => Err(operand_error("containerSize", other)),
    }
}

/// Build a multiple container from single and multiple operands.
/// Null operands are ignored.
pub fn multiple(values: Vec<Value>) -> OpResult {
    collect_container("multiple", values, Cardinality::Multiple)
}

/// Build an ordered container from single and ordered operands.
/// Null operands are ignored.
pub fn ordered(values: Vec<Value>) -> OpResult {
    collect_container("ordered", values, Cardinality::Ordered)
}

fn collect_container(
    operator: &'static str,
    values: Vec<Value>,
    cardinality: Cardinality,
) -> OpResult {
    let mut flat = Vec::new();
    for value in values {
        match value {
            Value::Null => {}
            Value::Single(v) => flat.push(v),
            Value::Multiple(m) if cardinality == Cardinality::Multiple => {
                flat.extend(m.into_values())
            }
            Value::Ordered(o) if cardinality == Cardinality::Ordered => {
                flat.extend(o.into_values())
            }
            other => return Err(operand_error(operator, &other)),
        }
    }
    if cardinality == Cardinality::Multiple {
        Value::multiple(flat)
    } else {
        Value::ordered(flat)
    }
}

/// 1-based element of an ordered container; out of range yields Null.
pub fn index(a: &Value, n: usize) -> OpResult {
    match a {
        Value::Null => Ok(Value::Null),
        Value::Ordered(o) => Ok(n
            .checked_sub(1)
            .and_then(|i| o.values().get(i))
            .cloned()
            .map_or(Value::Null, Value::Single)),
        other => Err(operand_error("index", other)),
    }
}

/// A record field; missing fields yield Null.
pub fn field_value(a: &Value, field: &Identifier) -> OpResult {
    match a {
        Value::Null => Ok(Value::Null),
        Value::Record(fields) => Ok(fields
            .get(field)
            .cloned()
            .map_or(Value::Null, Value::Single)),
        other => Err(operand_error("fieldValue", other)),
    }
}

fn same_shape(operator: &'static str, a: &Value, b: &Value) -> Result<(), TypeError> {
    if a.cardinality() == b.cardinality() && a.base_type() == b.base_type() {
        Ok(())
    } else {
        Err(TypeError::Operand {
            operator,
            found: format!("{} and {}", a.describe(), b.describe()),
        })
    }
}

/// Same shape and equal values.
pub fn match_values(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if matches!(a, Value::Record(_)) {
        return Err(operand_error("match", a));
    }
    same_shape("match", a, b)?;
    Ok(Value::boolean(a == b))
}

/// Whether the single value `a` occurs in container `b`.
pub fn member(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let needle = single("member", a)?;
    let haystack = b.list_values().ok_or_else(|| operand_error("member", b))?;
    if b.base_type() != Some(needle.base_type()) {
        return Err(TypeError::Operand {
            operator: "member",
            found: format!("{} and {}", a.describe(), b.describe()),
        });
    }
    Ok(Value::boolean(haystack.contains(needle)))
}

/// Multiple: `b` is a sub-bag of `a`. Ordered: `b` is a contiguous run in `a`.
pub fn contains(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    same_shape("contains", a, b)?;
    let (outer, inner) = match (a.list_values(), b.list_values()) {
        (Some(outer), Some(inner)) => (outer, inner),
        _ => return Err(operand_error("contains", a)),
    };
    let found = match a {
        Value::Ordered(_) => outer.windows(inner.len()).any(|w| w == inner),
        _ => {
            let mut used = vec![false; outer.len()];
            inner.iter().all(|v| {
                match outer
                    .iter()
                    .enumerate()
                    .position(|(i, w)| !used[i] && w == v)
                {
                    Some(i) => {
                        used[i] = true;
                        true
                    }
                    None => false,
                }
            })
        }
    };
    Ok(Value::boolean(found))
}

/// Container `b` with every occurrence of the single value `a` removed.
pub fn delete(a: &Value, b: &Value) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let needle = single("delete", a)?;
    let values = b.list_values().ok_or_else(|| operand_error("delete", b))?;
    let kept: Vec<SingleValue> = values.iter().filter(|v| *v != needle).cloned().collect();
    match b {
        Value::Ordered(_) => Value::ordered(kept),
        _ => Value::multiple(kept),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════════════

pub fn string_match(a: &Value, b: &Value, case_sensitive: bool) -> OpResult {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match (single("stringMatch", a)?, single("stringMatch", b)?) {
        (SingleValue::String(x), SingleValue::String(y)) => Ok(Value::boolean(if case_sensitive {
            x == y
        } else {
            x.to_lowercase() == y.to_lowercase()
        })),
        (x, y) => Err(TypeError::Operand {
            operator: "stringMatch",
            found: format!("{} and {}", x.base_type(), y.base_type()),
        }),
    }
}
