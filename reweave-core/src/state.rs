use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Scalar value stored in a fluent.
///
/// Deterministic hashing (floats hashed by bit pattern) so ground action
/// calls can key hash sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Bool(b) => {
                0u8.hash(state);
                b.hash(state);
            }
            Value::Int(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Value::Str(s) => {
                3u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a bare token written by `Display`: bool, then integer, then
    /// float, else string.
    pub fn parse_token(token: &str) -> Value {
        match token {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = token.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = token.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(token.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            // {:?} keeps a trailing ".0" so the token re-parses as a float
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// One named slot of a state: a mapping from entity to value, a set of
/// entities, or a single scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fluent {
    Map(BTreeMap<String, Value>),
    Set(BTreeSet<String>),
    Scalar(Value),
}

impl Fluent {
    pub fn map() -> Self {
        Fluent::Map(BTreeMap::new())
    }

    pub fn set() -> Self {
        Fluent::Set(BTreeSet::new())
    }
}

/// World state: a named, extensible record of fluents.
///
/// The planner imposes no schema; domain actions and methods read and
/// mutate fluents by name. `Clone` is the deep copy, `PartialEq` the
/// whole-state structural equality the branch-cycle check relies on.
/// BTreeMap keeps iteration order deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    name: String,
    fluents: BTreeMap<String, Fluent>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fluents: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install or replace a whole fluent.
    pub fn insert_fluent(&mut self, name: impl Into<String>, fluent: Fluent) {
        self.fluents.insert(name.into(), fluent);
    }

    pub fn fluent(&self, name: &str) -> Option<&Fluent> {
        self.fluents.get(name)
    }

    pub fn fluent_mut(&mut self, name: &str) -> Option<&mut Fluent> {
        self.fluents.get_mut(name)
    }

    pub fn fluent_names(&self) -> impl Iterator<Item = &str> {
        self.fluents.keys().map(String::as_str)
    }

    /// Look up an entry of a map fluent.
    pub fn get(&self, fluent: &str, key: &str) -> Option<&Value> {
        match self.fluents.get(fluent)? {
            Fluent::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Set an entry of a map fluent, creating the map if absent.
    pub fn set(&mut self, fluent: &str, key: impl Into<String>, value: impl Into<Value>) {
        let entry = self
            .fluents
            .entry(fluent.to_string())
            .or_insert_with(Fluent::map);
        if let Fluent::Map(m) = entry {
            m.insert(key.into(), value.into());
        }
    }

    /// True when a map fluent holds exactly `value` under `key`.
    pub fn matches(&self, fluent: &str, key: &str, value: &Value) -> bool {
        self.get(fluent, key) == Some(value)
    }

    pub fn scalar(&self, fluent: &str) -> Option<&Value> {
        match self.fluents.get(fluent)? {
            Fluent::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn set_scalar(&mut self, fluent: &str, value: impl Into<Value>) {
        self.fluents
            .insert(fluent.to_string(), Fluent::Scalar(value.into()));
    }

    pub fn set_contains(&self, fluent: &str, member: &str) -> bool {
        matches!(self.fluents.get(fluent), Some(Fluent::Set(s)) if s.contains(member))
    }

    pub fn set_insert(&mut self, fluent: &str, member: impl Into<String>) {
        let entry = self
            .fluents
            .entry(fluent.to_string())
            .or_insert_with(Fluent::set);
        if let Fluent::Set(s) = entry {
            s.insert(member.into());
        }
    }

    pub fn set_remove(&mut self, fluent: &str, member: &str) {
        if let Some(Fluent::Set(s)) = self.fluents.get_mut(fluent) {
            s.remove(member);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_fluent_roundtrip() {
        let mut state = State::new("s0");
        state.set("pos", "b1", "table");
        state.set("pos", "b2", "b1");
        state.set("clear", "b2", true);

        assert_eq!(state.get("pos", "b1"), Some(&Value::from("table")));
        assert!(state.matches("clear", "b2", &Value::Bool(true)));
        assert_eq!(state.get("pos", "b3"), None);
        assert_eq!(state.get("holding", "hand"), None);
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut a = State::new("s0");
        a.set("at", "r", "base");
        let b = a.clone();
        a.set("at", "r", "depot");

        assert_eq!(b.get("at", "r"), Some(&Value::from("base")));
        assert_ne!(a, b);
    }

    #[test]
    fn structural_equality_ignores_insertion_order() {
        let mut a = State::new("s");
        a.set("f", "x", 1);
        a.set("f", "y", 2);
        let mut b = State::new("s");
        b.set("f", "y", 2);
        b.set("f", "x", 1);
        assert_eq!(a, b);
    }

    #[test]
    fn set_and_scalar_fluents() {
        let mut state = State::new("s");
        state.set_insert("available", "r1");
        state.set_insert("available", "r2");
        state.set_remove("available", "r1");
        state.set_scalar("fuel", 7.5);

        assert!(!state.set_contains("available", "r1"));
        assert!(state.set_contains("available", "r2"));
        assert_eq!(state.scalar("fuel"), Some(&Value::Float(7.5)));
    }

    #[test]
    fn value_token_roundtrip() {
        for v in [
            Value::Bool(true),
            Value::Int(-3),
            Value::Float(2.0),
            Value::Float(1.25),
            Value::from("depot_a"),
        ] {
            let token = v.to_string();
            assert_eq!(Value::parse_token(&token), v, "token `{}`", token);
        }
    }

    #[test]
    fn serde_roundtrip() {
        let mut state = State::new("s0");
        state.set("pos", "b1", "table");
        state.set_scalar("steps", 3);
        let json = serde_json::to_string(&state).unwrap();
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
