//! Operator dispatch. Maps each binary operator to its numeric implementation
//! and the metamethod consulted when an operand is not a number.
//!
//! Operands are coerced through `DynValue::to_number`, so numbers, numeric
//! strings and primitive wrappers all share one path.

use std::collections::HashMap;

use crate::error::ScriptError;
use crate::runtime::table::metamethod;
use crate::runtime::value::DynValue;
use crate::Script;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinOp {
    pub const ALL: [BinOp; 6] = [Self::Add, Self::Sub, Self::Mul, Self::Div, Self::Mod, Self::Pow];
}

// ─── Function pointer ─────────────────────────────────────────────────────────

pub type ArithFn = fn(f64, f64) -> f64;

pub struct BinopDesc {
    pub symbol:     &'static str,
    pub metamethod: &'static str,
    pub apply:      ArithFn,
}

// ─── Registry ─────────────────────────────────────────────────────────────────

pub struct BinopRegistry {
    ops: HashMap<BinOp, BinopDesc>,
}

impl BinopRegistry {
    pub fn new() -> Self {
        Self { ops: HashMap::new() }
    }

    pub fn register(&mut self, op: BinOp, symbol: &'static str, metamethod: &'static str, apply: ArithFn) {
        self.ops.insert(op, BinopDesc { symbol, metamethod, apply });
    }

    pub fn get(&self, op: BinOp) -> Option<&BinopDesc> {
        self.ops.get(&op)
    }

    /// Evaluate `l op r`: numeric when both operands coerce to numbers, otherwise
    /// through the operator's metamethod on either operand.
    pub fn eval(&self, script: &Script, op: BinOp, l: &DynValue, r: &DynValue) -> Result<DynValue, ScriptError> {
        let desc = self
            .get(op)
            .ok_or_else(|| ScriptError::runtime(format!("operator {op:?} is not registered")))?;

        if let (Some(a), Some(b)) = (l.to_number(), r.to_number()) {
            return Ok(DynValue::number((desc.apply)(a, b)));
        }
        if let Some(m) = metamethod(l, desc.metamethod).or_else(|| metamethod(r, desc.metamethod)) {
            return Ok(script.call(&m, vec![l.clone(), r.clone()])?.first());
        }
        let culprit = if l.to_number().is_none() { l } else { r };
        Err(ScriptError::runtime(format!(
            "attempt to perform arithmetic ({}) on a {} value",
            desc.symbol,
            culprit.type_name()
        )))
    }
}

impl Default for BinopRegistry {
    fn default() -> Self {
        let mut r = Self::new();
        r.register(BinOp::Add, "+", "__add", |a, b| a + b);
        r.register(BinOp::Sub, "-", "__sub", |a, b| a - b);
        r.register(BinOp::Mul, "*", "__mul", |a, b| a * b);
        r.register(BinOp::Div, "/", "__div", |a, b| a / b);
        r.register(BinOp::Mod, "%", "__mod", floored_mod);
        r.register(BinOp::Pow, "^", "__pow", f64::powf);
        r
    }
}

/// `a - b * floor(a / b)`: the result takes the sign of the divisor.
pub fn floored_mod(a: f64, b: f64) -> f64 {
    a - b * (a / b).floor()
}

// ─── Unary and string operators ───────────────────────────────────────────────

pub fn negate(script: &Script, v: &DynValue) -> Result<DynValue, ScriptError> {
    if let Some(n) = v.to_number() {
        return Ok(DynValue::number(-n));
    }
    if let Some(m) = metamethod(v, "__unm") {
        return Ok(script.call(&m, vec![v.clone(), v.clone()])?.first());
    }
    Err(ScriptError::runtime(format!("attempt to perform arithmetic (unary -) on a {} value", v.type_name())))
}

pub fn concat(script: &Script, l: &DynValue, r: &DynValue) -> Result<DynValue, ScriptError> {
    if let (Some(a), Some(b)) = (l.to_concat_string(), r.to_concat_string()) {
        return Ok(DynValue::string(a + &b));
    }
    if let Some(m) = metamethod(l, "__concat").or_else(|| metamethod(r, "__concat")) {
        return Ok(script.call(&m, vec![l.clone(), r.clone()])?.first());
    }
    let culprit = if l.to_concat_string().is_none() { l } else { r };
    Err(ScriptError::runtime(format!("attempt to concatenate a {} value", culprit.type_name())))
}

// ─── Comparison ───────────────────────────────────────────────────────────────

pub fn equals(script: &Script, l: &DynValue, r: &DynValue) -> Result<bool, ScriptError> {
    if l == r {
        return Ok(true);
    }
    let eligible = |v: &DynValue| matches!(v, DynValue::Table(_) | DynValue::UserData(_));
    if !eligible(l) && !eligible(r) {
        return Ok(false);
    }
    match metamethod(l, "__eq").or_else(|| metamethod(r, "__eq")) {
        Some(m) => Ok(script.call(&m, vec![l.clone(), r.clone()])?.is_truthy()),
        None => Ok(false),
    }
}

pub fn less_than(script: &Script, l: &DynValue, r: &DynValue) -> Result<bool, ScriptError> {
    match (l, r) {
        (DynValue::Number(a), DynValue::Number(b)) => return Ok(a < b),
        (DynValue::String(a), DynValue::String(b)) => return Ok(a < b),
        _ => {}
    }
    match metamethod(l, "__lt").or_else(|| metamethod(r, "__lt")) {
        Some(m) => Ok(script.call(&m, vec![l.clone(), r.clone()])?.is_truthy()),
        None => Err(compare_error(l, r)),
    }
}

pub fn less_equal(script: &Script, l: &DynValue, r: &DynValue) -> Result<bool, ScriptError> {
    match (l, r) {
        (DynValue::Number(a), DynValue::Number(b)) => return Ok(a <= b),
        (DynValue::String(a), DynValue::String(b)) => return Ok(a <= b),
        _ => {}
    }
    if let Some(m) = metamethod(l, "__le").or_else(|| metamethod(r, "__le")) {
        return Ok(script.call(&m, vec![l.clone(), r.clone()])?.is_truthy());
    }
    // a <= b  ==  not (b < a)
    if let Some(m) = metamethod(r, "__lt").or_else(|| metamethod(l, "__lt")) {
        return Ok(!script.call(&m, vec![r.clone(), l.clone()])?.is_truthy());
    }
    Err(compare_error(l, r))
}

fn compare_error(l: &DynValue, r: &DynValue) -> ScriptError {
    ScriptError::runtime(format!("attempt to compare {} with {}", l.type_name(), r.type_name()))
}
