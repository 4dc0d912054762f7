//! Purpose: Bridge `serde_json::Value` events into the value model `jaq-core` evaluates.
//! Exports: `ScriptValue`.
//! Role: Owned JSON tree implementing `jaq_core::ValT` and `jaq_std::ValT`.
//! Invariants: Truthiness follows jq: only `null` and `false` are falsy.
//! Invariants: Numbers are f64; integral values convert back to JSON integers.
//! Invariants: Ordering follows jq's type rank (null < bool < number < string < array < object).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use jaq_core::ops::Math;
use jaq_core::path::Opt;
use jaq_core::val::Range;
use jaq_core::{Error as JaqError, ValX};
use serde_json::{Number, Value};

type ValR = Result<ScriptValue, JaqError<ScriptValue>>;

#[derive(Clone, Debug)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Arr(Vec<ScriptValue>),
    Obj(BTreeMap<String, ScriptValue>),
}

impl ScriptValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Num(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::Str(s.clone()),
            Value::Array(items) => Self::Arr(items.iter().map(Self::from_json).collect()),
            Value::Object(fields) => Self::Obj(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Num(n) => integral(*n)
                .map(Value::from)
                .or_else(|| Number::from_f64(*n).map(Value::Number))
                .unwrap_or(Value::Null),
            Self::Str(s) => Value::String(s.clone()),
            Self::Arr(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Obj(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Num(_) => 2,
            Self::Str(_) => 3,
            Self::Arr(_) => 4,
            Self::Obj(_) => 5,
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    fn string(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    fn index_of(&self) -> Result<isize, JaqError<Self>> {
        self.number()
            .and_then(integral)
            .and_then(|n| isize::try_from(n).ok())
            .ok_or_else(|| JaqError::typ(self.clone(), "integer"))
    }

    fn arithmetic(self, op: Math, rhs: Self) -> ValR {
        match (self, op, rhs) {
            (Self::Num(a), Math::Add, Self::Num(b)) => Ok(Self::Num(a + b)),
            (Self::Num(a), Math::Sub, Self::Num(b)) => Ok(Self::Num(a - b)),
            (Self::Num(a), Math::Mul, Self::Num(b)) => Ok(Self::Num(a * b)),
            (Self::Num(a), Math::Div, Self::Num(b)) => Ok(Self::Num(a / b)),
            (Self::Num(a), Math::Rem, Self::Num(b)) => Ok(Self::Num(a % b)),
            (Self::Str(a), Math::Add, Self::Str(b)) => Ok(Self::Str(a + &b)),
            (Self::Arr(mut a), Math::Add, Self::Arr(b)) => {
                a.extend(b);
                Ok(Self::Arr(a))
            }
            (Self::Obj(mut a), Math::Add, Self::Obj(b)) => {
                a.extend(b);
                Ok(Self::Obj(a))
            }
            (Self::Null, Math::Add, other) | (other, Math::Add, Self::Null) => Ok(other),
            (lhs, op, rhs) => Err(JaqError::math(lhs, op, rhs)),
        }
    }
}

/// Returns `n` as an integer when it is finite, whole, and inside i64 range.
fn integral(n: f64) -> Option<i64> {
    if !n.is_finite() || n.fract() != 0.0 || n.abs() > i64::MAX as f64 {
        return None;
    }
    Some(n as i64)
}

/// Runs a path-update callback and keeps its first output, `null` when it yields nothing.
fn first_update<'a, I>(mut outputs: I) -> ValX<'a, ScriptValue>
where
    I: Iterator<Item = ValX<'a, ScriptValue>>,
{
    outputs.next().unwrap_or(Ok(ScriptValue::Null))
}

fn missing<'a>(opt: Opt, value: ScriptValue, err: JaqError<ScriptValue>) -> ValX<'a, ScriptValue> {
    match opt {
        Opt::Optional => Ok(value),
        Opt::Essential => Err(err.into()),
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<isize> for ScriptValue {
    fn from(value: isize) -> Self {
        Self::Num(value as f64)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        Self::Num(value)
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl FromIterator<Self> for ScriptValue {
    fn from_iter<T: IntoIterator<Item = Self>>(iter: T) -> Self {
        Self::Arr(iter.into_iter().collect())
    }
}

// Numbers compare with IEEE `==` (`-0 == 0`, `nan != nan`); `Ord` keeps `total_cmp` for sorting.
impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Arr(a), Self::Arr(b)) => a == b,
            (Self::Obj(a), Self::Obj(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScriptValue {}

impl PartialOrd for ScriptValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScriptValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Num(a), Self::Num(b)) => a.total_cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Arr(a), Self::Arr(b)) => a.cmp(b),
            (Self::Obj(a), Self::Obj(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl std::ops::Add for ScriptValue {
    type Output = ValR;

    fn add(self, rhs: Self) -> ValR {
        self.arithmetic(Math::Add, rhs)
    }
}

impl std::ops::Sub for ScriptValue {
    type Output = ValR;

    fn sub(self, rhs: Self) -> ValR {
        self.arithmetic(Math::Sub, rhs)
    }
}

impl std::ops::Mul for ScriptValue {
    type Output = ValR;

    fn mul(self, rhs: Self) -> ValR {
        self.arithmetic(Math::Mul, rhs)
    }
}

impl std::ops::Div for ScriptValue {
    type Output = ValR;

    fn div(self, rhs: Self) -> ValR {
        self.arithmetic(Math::Div, rhs)
    }
}

impl std::ops::Rem for ScriptValue {
    type Output = ValR;

    fn rem(self, rhs: Self) -> ValR {
        self.arithmetic(Math::Rem, rhs)
    }
}

impl std::ops::Neg for ScriptValue {
    type Output = ValR;

    fn neg(self) -> ValR {
        match self {
            Self::Num(n) => Ok(Self::Num(-n)),
            other => Err(JaqError::typ(other, "number")),
        }
    }
}

impl jaq_core::ValT for ScriptValue {
    fn from_num(n: &str) -> ValR {
        n.parse::<f64>().map(Self::Num).map_err(JaqError::str)
    }

    fn from_map<I: IntoIterator<Item = (Self, Self)>>(iter: I) -> ValR {
        let mut fields = BTreeMap::new();
        for (key, value) in iter {
            match key {
                Self::Str(key) => {
                    fields.insert(key, value);
                }
                other => return Err(JaqError::typ(other, "string")),
            }
        }
        Ok(Self::Obj(fields))
    }

    fn values(self) -> Box<dyn Iterator<Item = ValR>> {
        match self {
            Self::Arr(items) => Box::new(items.into_iter().map(Ok)),
            Self::Obj(fields) => Box::new(fields.into_values().map(Ok)),
            other => Box::new(std::iter::once(Err(JaqError::typ(other, "iterable")))),
        }
    }

    fn index(self, index: &Self) -> ValR {
        match (self, index) {
            (Self::Null, _) => Ok(Self::Null),
            (Self::Obj(mut fields), Self::Str(key)) => Ok(fields.remove(key).unwrap_or(Self::Null)),
            (Self::Arr(items), Self::Num(_)) => {
                let at = index.index_of()?;
                let len = items.len() as isize;
                let at = if at < 0 { len + at } else { at };
                Ok(usize::try_from(at)
                    .ok()
                    .and_then(|at| items.into_iter().nth(at))
                    .unwrap_or(Self::Null))
            }
            (value, index) => Err(JaqError::index(value, index.clone())),
        }
    }

    fn range(self, range: Range<&Self>) -> ValR {
        let items = match self {
            Self::Arr(items) => items,
            other => return Err(JaqError::typ(other, "array")),
        };
        let len = items.len() as isize;
        let clamp = |at: isize| (if at < 0 { len + at } else { at }).clamp(0, len) as usize;
        let start = match range.start {
            Some(start) => clamp(start.index_of()?),
            None => 0,
        };
        let end = match range.end {
            Some(end) => clamp(end.index_of()?),
            None => items.len(),
        };
        Ok(Self::Arr(
            items
                .into_iter()
                .skip(start)
                .take(end.saturating_sub(start))
                .collect(),
        ))
    }

    fn map_values<'a, I: Iterator<Item = ValX<'a, Self>>>(
        self,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> ValX<'a, Self> {
        match self {
            Self::Arr(items) => items
                .into_iter()
                .map(|item| first_update(f(item)))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Arr),
            Self::Obj(fields) => fields
                .into_iter()
                .map(|(key, value)| first_update(f(value)).map(|value| (key, value)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Obj),
            other => missing(opt, other.clone(), JaqError::typ(other, "iterable")),
        }
    }

    fn map_index<'a, I: Iterator<Item = ValX<'a, Self>>>(
        self,
        index: &Self,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> ValX<'a, Self> {
        match (self, index) {
            (Self::Obj(mut fields), Self::Str(key)) => {
                let current = fields.remove(key).unwrap_or(Self::Null);
                fields.insert(key.clone(), first_update(f(current))?);
                Ok(Self::Obj(fields))
            }
            (Self::Arr(mut items), Self::Num(_)) => {
                let at = index.index_of()?;
                let len = items.len() as isize;
                let slot = usize::try_from(if at < 0 { len + at } else { at })
                    .ok()
                    .filter(|slot| *slot < items.len());
                match slot {
                    Some(slot) => {
                        let current = std::mem::replace(&mut items[slot], Self::Null);
                        items[slot] = first_update(f(current))?;
                        Ok(Self::Arr(items))
                    }
                    None => {
                        let arr = Self::Arr(items);
                        missing(opt, arr.clone(), JaqError::index(arr, index.clone()))
                    }
                }
            }
            (other, index) => missing(opt, other.clone(), JaqError::index(other, index.clone())),
        }
    }

    fn map_range<'a, I: Iterator<Item = ValX<'a, Self>>>(
        self,
        range: Range<&Self>,
        opt: Opt,
        f: impl Fn(Self) -> I,
    ) -> ValX<'a, Self> {
        match self {
            Self::Arr(_) => first_update(f(jaq_core::ValT::range(self, range)?)),
            other => missing(opt, other.clone(), JaqError::typ(other, "array")),
        }
    }

    fn as_bool(&self) -> bool {
        self.is_truthy()
    }

    fn as_str(&self) -> Option<&str> {
        self.string()
    }
}

impl jaq_std::ValT for ScriptValue {
    fn into_seq<S: FromIterator<Self>>(self) -> Result<S, Self> {
        match self {
            Self::Arr(items) => Ok(items.into_iter().collect()),
            other => Err(other),
        }
    }

    fn as_isize(&self) -> Option<isize> {
        self.number()
            .and_then(integral)
            .and_then(|n| isize::try_from(n).ok())
    }

    fn as_f64(&self) -> Result<f64, JaqError<Self>> {
        self.number()
            .ok_or_else(|| JaqError::typ(self.clone(), "number"))
    }
}
