// src/core/space.rs

//! The command space: an ordered set of argument axes over a base program.
//!
//! Each axis contributes one dimension to the sweep. Axes are rendered left to right in
//! registration order, and the last registered axis varies fastest during enumeration.

use crate::core::{
    error::SweepError,
    radix::{self, MixedRadix, MultiRange},
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

// --- VALUES ---

/// A primitive value that can be used as an axis value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Used verbatim.
    Str(String),
    /// Rendered in decimal.
    Int(i64),
    /// Rendered with at least one fractional digit (`1.0`, `0.25`). Very large or
    /// very small magnitudes use a signed exponent (`1e+20`, `1e-05`), and non-finite
    /// values render as `nan`, `inf` and `-inf`.
    Float(f64),
    /// Rendered as `true` / `false`.
    Bool(bool),
}

impl Scalar {
    /// Converts a value read from a sweep file, rejecting arrays, tables and datetimes.
    pub fn from_toml(value: &toml::Value) -> Result<Self, SweepError> {
        match value {
            toml::Value::String(s) => Ok(Self::Str(s.clone())),
            toml::Value::Integer(i) => Ok(Self::Int(*i)),
            toml::Value::Float(f) => Ok(Self::Float(*f)),
            toml::Value::Boolean(b) => Ok(Self::Bool(*b)),
            other => Err(SweepError::TypeKind(format!(
                "value {} should be a string, integer, float or boolean, found {}",
                other,
                other.type_str()
            ))),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write_float(f, *v),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("nan");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "inf" } else { "-inf" });
    }
    let magnitude = v.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let scientific = format!("{:e}", v);
        return match scientific
            .split_once('e')
            .and_then(|(mantissa, exp)| Some((mantissa, exp.parse::<i32>().ok()?)))
        {
            Some((mantissa, exp)) => write!(
                f,
                "{}e{}{:02}",
                mantissa,
                if exp < 0 { '-' } else { '+' },
                exp.unsigned_abs()
            ),
            None => f.write_str(&scientific),
        };
    }
    if v.fract() == 0.0 {
        write!(f, "{:.1}", v)
    } else {
        write!(f, "{}", v)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// --- AXES ---

/// How an axis contributes tokens to the rendered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    /// A single value, with or without a flag.
    Fixed,
    /// A flag followed by one of several values.
    Named,
    /// One of several values, without a flag.
    Positional,
    /// A flag that is either present or absent.
    Switch,
}

impl AxisKind {
    fn slug(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Named => "named",
            Self::Positional => "positional",
            Self::Switch => "switch",
        }
    }
}

/// Identifies an axis inside a [`CommandSpace`].
///
/// User flags and generated placeholders live in separate variants, so a flag spelled
/// `positional_0` never collides with the placeholder of the same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AxisId {
    /// A real flag, rendered before the selected value.
    Flag(String),
    /// A generated placeholder for an axis without a flag. Only its value is rendered.
    Internal {
        /// Kind the ordinal counter belongs to.
        kind: AxisKind,
        /// Per-kind registration counter.
        ordinal: usize,
    },
}

impl AxisId {
    /// Whether this identifier is a generated placeholder rather than a flag.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => f.write_str(flag),
            Self::Internal { kind, ordinal } => write!(f, "{}_{}", kind.slug(), ordinal),
        }
    }
}

/// One dimension of the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    id: AxisId,
    kind: AxisKind,
    values: Vec<String>,
}

impl Axis {
    /// The identifier the axis was registered under.
    pub fn id(&self) -> &AxisId {
        &self.id
    }

    /// The kind of the axis.
    pub fn kind(&self) -> AxisKind {
        self.kind
    }

    /// The candidate values, in enumeration order. An empty string means "no token".
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Per-kind counters for generated axis identifiers. They only ever increase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InternalCounters {
    fixed: usize,
    positional: usize,
    switch: usize,
}

impl InternalCounters {
    fn next(&mut self, kind: AxisKind) -> AxisId {
        let counter = match kind {
            AxisKind::Fixed => &mut self.fixed,
            AxisKind::Switch => &mut self.switch,
            AxisKind::Positional | AxisKind::Named => &mut self.positional,
        };
        let ordinal = *counter;
        *counter += 1;
        AxisId::Internal { kind, ordinal }
    }
}

// --- RENDERED SELECTIONS ---

/// The value selected on every axis for one point of the space, in axis order.
///
/// Placeholder identifiers are included; this is meant for logging and introspection,
/// not for building the process command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgDict {
    entries: Vec<(AxisId, String)>,
}

impl ArgDict {
    /// Value selected for `id`.
    pub fn get(&self, id: &AxisId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, value)| value.as_str())
    }

    /// Value selected for the user flag `flag`.
    pub fn get_flag(&self, flag: &str) -> Option<&str> {
        self.get(&AxisId::Flag(flag.to_string()))
    }

    /// Iterates over `(identifier, value)` pairs in axis order.
    pub fn iter(&self) -> impl Iterator<Item = (&AxisId, &str)> {
        self.entries.iter().map(|(id, value)| (id, value.as_str()))
    }

    /// Number of entries (one per axis).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the space had no axes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ArgDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (id, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:?}", id, value)?;
        }
        f.write_str("}")
    }
}

impl Serialize for ArgDict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, value) in &self.entries {
            map.serialize_entry(&id.to_string(), value)?;
        }
        map.end()
    }
}

// --- COMMAND SPACE ---

/// An ordered set of argument axes plus the base program they are appended to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpace {
    program: Vec<String>,
    axes: Vec<Axis>,
    counters: InternalCounters,
}

impl CommandSpace {
    /// Creates a space over `template`, shell-lexed into the base program tokens.
    ///
    /// An empty template gives a space without a base program.
    pub fn new(template: &str) -> Result<Self, SweepError> {
        Ok(Self {
            program: lex(template)?,
            ..Self::default()
        })
    }

    /// The base program tokens prepended to every rendered command.
    pub fn program(&self) -> &[String] {
        &self.program
    }

    /// The registered axes, in registration order.
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Registers a single-valued axis. Without a key, only the value is rendered.
    pub fn fixed(
        &mut self,
        key: Option<&str>,
        value: impl Into<Scalar>,
    ) -> Result<&mut Self, SweepError> {
        let id = match key {
            Some(flag) => AxisId::Flag(flag.to_string()),
            None => self.counters.next(AxisKind::Fixed),
        };
        self.insert(Axis {
            id,
            kind: AxisKind::Fixed,
            values: vec![value.into().to_string()],
        })
    }

    /// Registers a multi-valued axis: named when `key` is given, positional otherwise.
    pub fn arg<I, V>(&mut self, key: Option<&str>, values: I) -> Result<&mut Self, SweepError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let (id, kind) = match key {
            Some(flag) => (AxisId::Flag(flag.to_string()), AxisKind::Named),
            None => (self.counters.next(AxisKind::Positional), AxisKind::Positional),
        };
        self.insert(Axis {
            id,
            kind,
            values: values.into_iter().map(|v| v.into().to_string()).collect(),
        })
    }

    /// Registers a switch: index 0 renders `flag`, index 1 renders nothing.
    pub fn switch(&mut self, flag: &str) -> Result<&mut Self, SweepError> {
        if flag.trim().is_empty() {
            return Err(SweepError::TypeKind(
                "switch flag should be a non-empty string".to_string(),
            ));
        }
        let id = self.counters.next(AxisKind::Switch);
        self.insert(Axis {
            id,
            kind: AxisKind::Switch,
            values: vec![flag.to_string(), String::new()],
        })
    }

    /// [`fixed`](Self::fixed) for a dynamically typed value.
    pub fn fixed_value(
        &mut self,
        key: Option<&str>,
        value: &toml::Value,
    ) -> Result<&mut Self, SweepError> {
        let scalar = Scalar::from_toml(value)?;
        self.fixed(key, scalar)
    }

    /// [`arg`](Self::arg) for a dynamically typed value, which must be an array of scalars.
    pub fn arg_value(
        &mut self,
        key: Option<&str>,
        values: &toml::Value,
    ) -> Result<&mut Self, SweepError> {
        let items = values.as_array().ok_or_else(|| {
            SweepError::TypeKind(format!(
                "values {} should be an array, found {}",
                values,
                values.type_str()
            ))
        })?;
        let scalars = items
            .iter()
            .map(Scalar::from_toml)
            .collect::<Result<Vec<_>, _>>()?;
        self.arg(key, scalars)
    }

    /// [`switch`](Self::switch) for a dynamically typed value, which must be a string.
    pub fn switch_value(&mut self, flag: &toml::Value) -> Result<&mut Self, SweepError> {
        let flag = flag.as_str().ok_or_else(|| {
            SweepError::TypeKind(format!(
                "switch {} should be a string, found {}",
                flag,
                flag.type_str()
            ))
        })?;
        self.switch(flag)
    }

    /// Prepends `outer` (e.g. `"gdb --args"`) to the base program.
    pub fn wrap(&mut self, outer: &str) -> Result<&mut Self, SweepError> {
        let mut wrapped = lex(outer)?;
        wrapped.append(&mut self.program);
        self.program = wrapped;
        Ok(self)
    }

    /// Number of values per axis, in registration order.
    pub fn dimensions(&self) -> Vec<usize> {
        self.axes.iter().map(|axis| axis.values.len()).collect()
    }

    /// Number of tasks in the sweep.
    pub fn count_total(&self) -> usize {
        // Registration keeps the product in range.
        radix::checked_total(&self.dimensions()).unwrap_or(usize::MAX)
    }

    /// The radix used to enumerate this space.
    pub fn radix(&self) -> Result<MixedRadix, SweepError> {
        MixedRadix::new(self.dimensions())
    }

    /// Linear position of `index` in the enumeration order.
    pub fn linear_index(&self, index: &[usize]) -> Result<usize, SweepError> {
        self.radix()?
            .to_linear(index)
            .ok_or_else(|| self.invalid_index(index))
    }

    /// Renders the full argument list for `index`: base program, then every axis in order.
    pub fn render_args(&self, index: &[usize]) -> Result<Vec<String>, SweepError> {
        let mut command = self.program.clone();
        for (axis, value) in self.select(index)? {
            match &axis.id {
                AxisId::Internal { .. } => {
                    // A switch in its "off" position contributes no token at all.
                    if !value.is_empty() {
                        command.push(value.to_string());
                    }
                }
                AxisId::Flag(flag) => {
                    command.push(flag.clone());
                    command.push(value.to_string());
                }
            }
        }
        Ok(command)
    }

    /// The value selected on every axis for `index`.
    pub fn render_dict(&self, index: &[usize]) -> Result<ArgDict, SweepError> {
        let entries = self
            .select(index)?
            .into_iter()
            .map(|(axis, value)| (axis.id.clone(), value.to_string()))
            .collect();
        Ok(ArgDict { entries })
    }

    /// Enumerates raw multi-indices from linear position `start`.
    pub fn index_loop(&self, start: usize) -> MultiRange {
        // Registration keeps the product in range, so the fallback is never taken.
        let radix = self.radix().unwrap_or_else(|_| MixedRadix::empty());
        radix.iter_from(start)
    }

    /// Enumerates rendered argument lists from linear position `start`.
    pub fn cmd_loop(&self, start: usize) -> impl Iterator<Item = Vec<String>> + '_ {
        self.index_loop(start)
            .filter_map(move |index| self.render_args(&index).ok())
    }

    /// Enumerates rendered key/value selections from linear position `start`.
    pub fn dict_loop(&self, start: usize) -> impl Iterator<Item = ArgDict> + '_ {
        self.index_loop(start)
            .filter_map(move |index| self.render_dict(&index).ok())
    }

    // --- internals ---

    /// Adds `axis`, or replaces the axis registered under the same flag in place.
    fn insert(&mut self, axis: Axis) -> Result<&mut Self, SweepError> {
        let position = self.axes.iter().position(|existing| existing.id == axis.id);

        let mut dims = self.dimensions();
        match position.and_then(|i| dims.get_mut(i)) {
            Some(dim) => *dim = axis.values.len(),
            None => dims.push(axis.values.len()),
        }
        if radix::checked_total(&dims).is_none() {
            return Err(SweepError::SpaceTooLarge {
                axis: axis.id.to_string(),
            });
        }

        match position.and_then(|i| self.axes.get_mut(i)) {
            Some(slot) => {
                log::debug!("Replacing values of axis '{}'", axis.id);
                *slot = axis;
            }
            None => {
                log::trace!("Registered axis '{}' ({:?})", axis.id, axis.kind);
                self.axes.push(axis);
            }
        }
        Ok(self)
    }

    /// Pairs every axis with the value `index` selects on it.
    fn select(&self, index: &[usize]) -> Result<Vec<(&Axis, &str)>, SweepError> {
        if index.len() != self.axes.len() {
            return Err(self.invalid_index(index));
        }
        self.axes
            .iter()
            .zip(index)
            .map(|(axis, &i)| {
                axis.values
                    .get(i)
                    .map(|value| (axis, value.as_str()))
                    .ok_or_else(|| self.invalid_index(index))
            })
            .collect()
    }

    fn invalid_index(&self, index: &[usize]) -> SweepError {
        SweepError::InvalidIndex {
            index: index.to_vec(),
            dims: self.dimensions(),
        }
    }
}

/// Splits a command template using shell word-splitting rules.
fn lex(template: &str) -> Result<Vec<String>, SweepError> {
    shlex::split(template).ok_or_else(|| SweepError::CommandParse(template.to_string()))
}

// MARK: --- UNIT TESTS ---
