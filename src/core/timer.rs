// src/core/timer.rs

//! A nested stopwatch for profiling phases of a sweep.
//!
//! `start` opens a record under the innermost open one, `stop` closes the innermost
//! open record. The result is a forest that can be printed, flattened for tabular
//! output, or serialized to JSON.

use crate::core::error::SweepError;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

const UNNAMED: &str = "unnamed";

/// One timed section.
#[derive(Debug, Clone)]
pub struct TimeRecord {
    name: String,
    start: DateTime<Local>,
    end: Option<DateTime<Local>>,
    opened: Instant,
    elapsed: Option<Duration>,
    children: Vec<TimeRecord>,
}

impl TimeRecord {
    fn open(name: String) -> Self {
        Self {
            name: if name.is_empty() {
                UNNAMED.to_string()
            } else {
                name
            },
            start: Local::now(),
            end: None,
            opened: Instant::now(),
            elapsed: None,
            children: Vec::new(),
        }
    }

    fn close(&mut self) -> Duration {
        let elapsed = self.opened.elapsed();
        self.end = Some(Local::now());
        self.elapsed = Some(elapsed);
        elapsed
    }

    /// The name given to `start`, or `"unnamed"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock time the record was opened.
    pub fn start(&self) -> DateTime<Local> {
        self.start
    }

    /// `None` while the record is still open.
    pub fn end(&self) -> Option<DateTime<Local>> {
        self.end
    }

    /// `None` while the record is still open.
    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Records opened while this one was innermost, in start order.
    pub fn children(&self) -> &[TimeRecord] {
        &self.children
    }

    fn flatten_into(&self, depth: usize, out: &mut Vec<FlatRecord>) {
        out.push(FlatRecord {
            depth,
            name: self.name.clone(),
            start: self.start,
            end: self.end,
            duration_secs: self.elapsed.map(|d| d.as_secs_f64()),
        });
        for child in &self.children {
            child.flatten_into(depth + 1, out);
        }
    }
}

impl fmt::Display for TimeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Open records show their running time.
        let secs = self
            .elapsed
            .unwrap_or_else(|| self.opened.elapsed())
            .as_secs_f64();
        write!(f, "('{}'={:.3}s", self.name, secs)?;
        if !self.children.is_empty() {
            f.write_str(", [")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", child)?;
            }
            f.write_str("]")?;
        }
        f.write_str(")")
    }
}

impl Serialize for TimeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TimeRecord", 5)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("start", &self.start)?;
        state.serialize_field("end", &self.end)?;
        state.serialize_field("duration_secs", &self.elapsed.map(|d| d.as_secs_f64()))?;
        state.serialize_field("children", &self.children)?;
        state.end()
    }
}

/// A record in pre-order, with its nesting depth (0 for roots).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRecord {
    /// Nesting depth.
    pub depth: usize,
    /// See [`TimeRecord::name`].
    pub name: String,
    /// See [`TimeRecord::start`].
    pub start: DateTime<Local>,
    /// `None` while the record is still open.
    pub end: Option<DateTime<Local>>,
    /// Elapsed seconds, `None` while the record is still open.
    pub duration_secs: Option<f64>,
}

/// Stack of nested, named stopwatches.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    roots: Vec<TimeRecord>,
    /// Child positions from a root down to the innermost open record.
    open: Vec<usize>,
}

impl Timer {
    /// A timer with no records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a record under the innermost open one, or as a new root.
    /// An empty name becomes `"unnamed"`.
    pub fn start(&mut self, name: impl Into<String>) {
        let record = TimeRecord::open(name.into());
        let position = if self.open.is_empty() {
            self.roots.push(record);
            self.roots.len() - 1
        } else if let Some(parent) = descend(&mut self.roots, &self.open) {
            parent.children.push(record);
            parent.children.len() - 1
        } else {
            // The open path always points at a live record; recover as a root anyway.
            self.open.clear();
            self.roots.push(record);
            self.roots.len() - 1
        };
        self.open.push(position);
    }

    /// Closes the innermost open record and returns its duration.
    pub fn stop(&mut self) -> Result<Duration, SweepError> {
        let record = descend(&mut self.roots, &self.open)
            .ok_or_else(|| SweepError::InvalidState("no timer is running".to_string()))?;
        let elapsed = record.close();
        self.open.pop();
        Ok(elapsed)
    }

    /// Opens a record that closes when the returned guard is dropped.
    pub fn scope(&mut self, name: impl Into<String>) -> TimerScope<'_> {
        let name = name.into();
        self.start(name.clone());
        TimerScope { timer: self, name }
    }

    /// Number of records currently open.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Top-level records, in start order.
    pub fn records(&self) -> &[TimeRecord] {
        &self.roots
    }

    /// Every record in pre-order.
    pub fn flatten(&self) -> Vec<FlatRecord> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.flatten_into(0, &mut out);
        }
        out
    }

    /// The whole forest as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.roots)
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Timer [")?;
        for root in &self.roots {
            writeln!(f, "  {}", root)?;
        }
        write!(f, "]")
    }
}

fn descend<'r>(roots: &'r mut [TimeRecord], path: &[usize]) -> Option<&'r mut TimeRecord> {
    let (first, rest) = path.split_first()?;
    let mut node = roots.get_mut(*first)?;
    for &i in rest {
        node = node.children.get_mut(i)?;
    }
    Some(node)
}

/// Guard returned by [`Timer::scope`]. Stops its record when dropped.
///
/// It dereferences to the timer so nested scopes can be opened from it.
#[derive(Debug)]
pub struct TimerScope<'t> {
    timer: &'t mut Timer,
    name: String,
}

impl Deref for TimerScope<'_> {
    type Target = Timer;

    fn deref(&self) -> &Timer {
        self.timer
    }
}

impl DerefMut for TimerScope<'_> {
    fn deref_mut(&mut self) -> &mut Timer {
        self.timer
    }
}

impl Drop for TimerScope<'_> {
    fn drop(&mut self) {
        match self.timer.stop() {
            Ok(elapsed) => log::debug!("PROFILE [{}]: {} µs", self.name, elapsed.as_micros()),
            Err(e) => log::warn!("Scope '{}' ended without an open record: {}", self.name, e),
        }
    }
}

// MARK: --- UNIT TESTS ---
