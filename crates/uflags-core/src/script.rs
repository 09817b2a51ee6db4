//! # Route Actions
//!
//! The scripting surface of the registry: `set_uflag`, `reset_uflag` and
//! `is_uflag`.
//!
//! Each action takes one load-time argument, a flag index. Fixup validates it
//! and shifts it into a mask once, so a bad index fails the configuration load
//! instead of every request. At run time an action takes no arguments and
//! returns an [`ActionResult`].

use crate::config::parse_decimal;
use crate::{FlagError, FlagMask, FlagRegistry, FlagWord, RegistryCell};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// ROUTE KINDS
// =============================================================================

/// The kinds of route an action can be called from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Request,
    Failure,
    #[serde(rename = "onreply")]
    OnReply,
    Branch,
    Local,
    Startup,
    Timer,
}

impl RouteKind {
    pub const ALL: [RouteKind; 7] = [
        RouteKind::Request,
        RouteKind::Failure,
        RouteKind::OnReply,
        RouteKind::Branch,
        RouteKind::Local,
        RouteKind::Startup,
        RouteKind::Timer,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RouteKind::Request => "request",
            RouteKind::Failure => "failure",
            RouteKind::OnReply => "onreply",
            RouteKind::Branch => "branch",
            RouteKind::Local => "local",
            RouteKind::Startup => "startup",
            RouteKind::Timer => "timer",
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RouteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RouteKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown route kind: {}", s))
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

/// A route action exported by the flag module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptAction {
    #[serde(rename = "set_uflag")]
    SetFlag,
    #[serde(rename = "reset_uflag")]
    ResetFlag,
    #[serde(rename = "is_uflag")]
    IsFlag,
}

impl ScriptAction {
    pub const ALL: [ScriptAction; 3] = [
        ScriptAction::SetFlag,
        ScriptAction::ResetFlag,
        ScriptAction::IsFlag,
    ];

    /// The name used in route scripts.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ScriptAction::SetFlag => "set_uflag",
            ScriptAction::ResetFlag => "reset_uflag",
            ScriptAction::IsFlag => "is_uflag",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.name() == name)
    }

    /// Number of load-time arguments.
    #[must_use]
    pub fn arity(self) -> usize {
        1
    }

    /// Route kinds the action may be called from.
    #[must_use]
    pub fn allowed_routes(self) -> &'static [RouteKind] {
        &RouteKind::ALL
    }

    #[must_use]
    pub fn is_allowed_in(self, route: RouteKind) -> bool {
        self.allowed_routes().contains(&route)
    }

    /// Convert the textual flag index into a bound action.
    ///
    /// The index must be a plain decimal below the registry width. Text that
    /// does not fit an unsigned 32-bit number is a bad number; a number that
    /// fits but reaches the width is out of range.
    pub fn fixup<W: FlagWord>(self, arg: &str) -> Result<BoundAction<W>, FlagError> {
        let index: u32 = parse_decimal(arg)?;
        let mask = FlagMask::from_index(i64::from(index))?;
        Ok(BoundAction { action: self, mask })
    }
}

impl fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of running an action.
///
/// `Matched` and `Unmatched` are both normal completions; only
/// `ExecutionError` means the action could not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum ActionResult {
    Matched,
    Unmatched,
    ExecutionError(String),
}

impl ActionResult {
    /// The host return-code convention: `1` true, `-1` false, `0` error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            ActionResult::Matched => 1,
            ActionResult::Unmatched => -1,
            ActionResult::ExecutionError(_) => 0,
        }
    }

    #[must_use]
    pub fn is_matched(&self) -> bool {
        matches!(self, ActionResult::Matched)
    }
}

impl From<bool> for ActionResult {
    fn from(matched: bool) -> Self {
        if matched {
            ActionResult::Matched
        } else {
            ActionResult::Unmatched
        }
    }
}

/// An action with its mask resolved at fixup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct BoundAction<W: FlagWord = u32> {
    pub action: ScriptAction,
    pub mask: FlagMask<W>,
}

impl<W: FlagWord> BoundAction<W> {
    /// Run against a live registry.
    pub fn run(&self, registry: &FlagRegistry<W>) -> ActionResult {
        match self.action {
            ScriptAction::SetFlag => {
                registry.set(self.mask);
                ActionResult::Matched
            }
            ScriptAction::ResetFlag => {
                registry.reset(self.mask);
                ActionResult::Matched
            }
            ScriptAction::IsFlag => registry.contains_any(self.mask).into(),
        }
    }

    /// Run from a route of the given kind, resolving the registry from its cell.
    pub fn run_in(&self, route: RouteKind, cell: &RegistryCell<W>) -> ActionResult {
        if !self.action.is_allowed_in(route) {
            return ActionResult::ExecutionError(format!(
                "{} not allowed in {} route",
                self.action, route
            ));
        }
        match cell.get() {
            Ok(registry) => self.run(&registry),
            Err(err) => ActionResult::ExecutionError(err.to_string()),
        }
    }
}

impl<W: FlagWord> fmt::Display for BoundAction<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mask.index() {
            Some(index) => write!(f, "{}({})", self.action, index),
            None => write!(f, "{}({})", self.action, self.mask),
        }
    }
}

// =============================================================================
// ROUTE SCRIPTS
// =============================================================================

/// A route script that failed to load.
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("line {line}: expected `name(arg)`, found `{text}`")]
    Syntax { line: usize, text: String },

    #[error("line {line}: unknown function `{name}`")]
    UnknownAction { line: usize, name: String },

    #[error("line {line}: `{name}` takes {expected} argument(s), {found} given")]
    ArgumentCount {
        line: usize,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: `{name}` not allowed in {route} route")]
    NotAllowed {
        line: usize,
        name: String,
        route: RouteKind,
    },

    #[error("line {line}: {source}")]
    Fixup { line: usize, source: FlagError },
}

impl ScriptError {
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Syntax { line, .. }
            | ScriptError::UnknownAction { line, .. }
            | ScriptError::ArgumentCount { line, .. }
            | ScriptError::NotAllowed { line, .. }
            | ScriptError::Fixup { line, .. } => *line,
        }
    }
}

/// A compiled list of actions for one route.
///
/// Source format: one call per line, `name(arg)` with an optional trailing
/// `;`. The argument may be wrapped in double quotes. Blank lines and lines
/// starting with `#` are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteScript<W: FlagWord = u32> {
    route: RouteKind,
    actions: Vec<BoundAction<W>>,
}

impl<W: FlagWord> RouteScript<W> {
    /// Parse and fix up every call. Stops at the first error.
    pub fn compile(route: RouteKind, source: &str) -> Result<Self, ScriptError> {
        let mut actions = Vec::new();

        for (offset, raw) in source.lines().enumerate() {
            let line = offset + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let (name, args) = split_call(text).ok_or_else(|| ScriptError::Syntax {
                line,
                text: text.to_string(),
            })?;

            let action = ScriptAction::from_name(name).ok_or_else(|| {
                ScriptError::UnknownAction {
                    line,
                    name: name.to_string(),
                }
            })?;

            if args.len() != action.arity() {
                return Err(ScriptError::ArgumentCount {
                    line,
                    name: name.to_string(),
                    expected: action.arity(),
                    found: args.len(),
                });
            }

            if !action.is_allowed_in(route) {
                return Err(ScriptError::NotAllowed {
                    line,
                    name: name.to_string(),
                    route,
                });
            }

            let arg = args.first().copied().unwrap_or_default();
            let bound = action
                .fixup(arg)
                .map_err(|source| ScriptError::Fixup { line, source })?;
            actions.push(bound);
        }

        Ok(Self { route, actions })
    }

    #[must_use]
    pub fn route(&self) -> RouteKind {
        self.route
    }

    #[must_use]
    pub fn actions(&self) -> &[BoundAction<W>] {
        &self.actions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in order and collect the results.
    ///
    /// The registry is resolved from `cell` once per run. Route kinds were
    /// checked at compile time, so each action runs lock-free.
    pub fn run(&self, cell: &RegistryCell<W>) -> Vec<ActionResult> {
        match cell.get() {
            Ok(registry) => self
                .actions
                .iter()
                .map(|action| action.run(&registry))
                .collect(),
            Err(err) => {
                let reason = err.to_string();
                self.actions
                    .iter()
                    .map(|_| ActionResult::ExecutionError(reason.clone()))
                    .collect()
            }
        }
    }
}

/// Split `name(a, b)` into the name and its trimmed, unquoted arguments.
fn split_call(text: &str) -> Option<(&str, Vec<&str>)> {
    let text = text.strip_suffix(';').unwrap_or(text).trim_end();
    let (name, rest) = text.split_once('(')?;
    let inner = rest.strip_suffix(')')?;
    let name = name.trim();
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return None;
    }

    let inner = inner.trim();
    if inner.is_empty() {
        return Some((name, Vec::new()));
    }

    let args = inner
        .split(',')
        .map(|arg| {
            let arg = arg.trim();
            arg.strip_prefix('"')
                .and_then(|a| a.strip_suffix('"'))
                .unwrap_or(arg)
        })
        .collect();
    Some((name, args))
}

// =============================================================================
// TESTS
// =============================================================================
