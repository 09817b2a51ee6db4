//! # Management Commands
//!
//! The administrative surface of the registry: `set_uflag`, `reset_uflag`,
//! `is_uflag` and `get_uflags`.
//!
//! Unlike route actions, these commands take an already-shifted mask at run
//! time, and `is_uflag` asks whether ALL bits of the mask are set.
//!
//! Replies are small trees: a status code, a reason phrase and a flat list of
//! string children. Encoding them for a transport is the caller's job.

use crate::{ClientError, FlagMask, FlagRegistry, FlagWord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reason phrase of a successful reply.
pub const MI_OK: &str = "OK";

/// Reason phrase when the argument is missing.
pub const MI_MISSING_PARM: &str = "Too few or too many arguments";

/// Reason phrase when the argument is unparseable or zero.
pub const MI_BAD_PARM: &str = "Bad parameter";

/// Reason phrase for a command name nobody exports.
pub const MI_NOT_FOUND: &str = "Command not found";

// =============================================================================
// REPLY TREE
// =============================================================================

/// A child of the reply root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiNode {
    pub value: String,
}

impl MiNode {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// A management reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiReply {
    pub code: u16,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MiNode>,
}

impl MiReply {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            children: Vec::new(),
        }
    }

    /// `200 OK` with no children.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(200, MI_OK)
    }

    /// `404 Command not found`.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(404, MI_NOT_FOUND)
    }

    #[must_use]
    pub fn with_child(mut self, value: impl Into<String>) -> Self {
        self.children.push(MiNode::new(value));
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Values of the children, in order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|node| node.value.as_str())
    }
}

impl From<ClientError> for MiReply {
    fn from(err: ClientError) -> Self {
        let reason = match err {
            ClientError::MissingParameter => MI_MISSING_PARM,
            ClientError::BadParameter { .. } => MI_BAD_PARM,
        };
        Self::new(400, reason)
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// A management command exported by the flag module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MiCommand {
    #[serde(rename = "set_uflag")]
    SetFlag,
    #[serde(rename = "reset_uflag")]
    ResetFlag,
    #[serde(rename = "is_uflag")]
    IsFlag,
    #[serde(rename = "get_uflags")]
    GetFlags,
}

impl MiCommand {
    pub const ALL: [MiCommand; 4] = [
        MiCommand::SetFlag,
        MiCommand::ResetFlag,
        MiCommand::IsFlag,
        MiCommand::GetFlags,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MiCommand::SetFlag => "set_uflag",
            MiCommand::ResetFlag => "reset_uflag",
            MiCommand::IsFlag => "is_uflag",
            MiCommand::GetFlags => "get_uflags",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    /// False for commands that ignore their arguments.
    #[must_use]
    pub fn takes_input(self) -> bool {
        !matches!(self, MiCommand::GetFlags)
    }

    /// Run the command and build its reply.
    ///
    /// Argument problems become `400` replies.
    pub fn execute<W, S>(self, registry: &FlagRegistry<W>, args: &[S]) -> MiReply
    where
        W: FlagWord,
        S: AsRef<str>,
    {
        self.try_execute(registry, args)
            .unwrap_or_else(MiReply::from)
    }

    /// Run the command, surfacing argument problems as errors.
    ///
    /// Only the first argument is read; extra arguments are ignored.
    pub fn try_execute<W, S>(
        self,
        registry: &FlagRegistry<W>,
        args: &[S],
    ) -> Result<MiReply, ClientError>
    where
        W: FlagWord,
        S: AsRef<str>,
    {
        match self {
            MiCommand::SetFlag => {
                let mask = first_mask(args)?;
                registry.set(mask);
                Ok(MiReply::ok())
            }
            MiCommand::ResetFlag => {
                let mask = first_mask(args)?;
                registry.reset(mask);
                Ok(MiReply::ok())
            }
            MiCommand::IsFlag => {
                let mask = first_mask(args)?;
                let answer = if registry.contains_all(mask) {
                    "TRUE"
                } else {
                    "FALSE"
                };
                Ok(MiReply::ok().with_child(answer))
            }
            MiCommand::GetFlags => {
                let snapshot = registry.snapshot();
                Ok(MiReply::ok()
                    .with_child(snapshot.hex())
                    .with_child(snapshot.decimal()))
            }
        }
    }
}

impl fmt::Display for MiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MiCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown command: {}", s))
    }
}

fn first_mask<W: FlagWord, S: AsRef<str>>(args: &[S]) -> Result<FlagMask<W>, ClientError> {
    let arg = args.first().ok_or(ClientError::MissingParameter)?;
    parse_flag_value(arg.as_ref())
}

/// Parse a management flag value.
///
/// Accepts unsigned decimal, or hexadecimal after a lowercase `0x` prefix. The
/// value is a mask, not an index, and must be non-zero.
pub fn parse_flag_value<W: FlagWord>(text: &str) -> Result<FlagMask<W>, ClientError> {
    let bad = || ClientError::BadParameter {
        value: text.to_string(),
    };

    let (digits, radix) = match text.strip_prefix("0x") {
        Some(hex) => (hex, 16),
        None => (text, 10),
    };

    let well_formed = !digits.is_empty()
        && digits.chars().all(|c| match radix {
            16 => c.is_ascii_hexdigit(),
            _ => c.is_ascii_digit(),
        });
    if !well_formed {
        return Err(bad());
    }

    let bits = W::from_str_radix(digits, radix).map_err(|_| bad())?;
    if bits.is_zero() {
        return Err(bad());
    }
    Ok(FlagMask::from_bits(bits))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(initial: u32) -> FlagRegistry {
        match FlagRegistry::initialize(initial) {
            Ok(registry) => registry,
            Err(err) => unreachable!("allocation failed: {err}"),
        }
    }

    #[test]
    fn set_then_get_flags() {
        let flags = registry(0);

        let reply = MiCommand::SetFlag.execute(&flags, &["8"]);
        assert_eq!(reply, MiReply::ok());

        let reply = MiCommand::GetFlags.execute::<u32, &str>(&flags, &[]);
        assert_eq!(reply.code, 200);
        assert_eq!(reply.values().collect::<Vec<_>>(), vec!["0x8", "8"]);
    }

    #[test]
    fn is_flag_requires_all_bits() {
        let flags = registry(0x8);

        let reply = MiCommand::IsFlag.execute(&flags, &["12"]);
        assert_eq!(reply.values().collect::<Vec<_>>(), vec!["FALSE"]);

        let reply = MiCommand::IsFlag.execute(&flags, &["8"]);
        assert_eq!(reply.values().collect::<Vec<_>>(), vec!["TRUE"]);
    }

    #[test]
    fn reset_clears_mask() {
        let flags = registry(0xFF);
        let reply = MiCommand::ResetFlag.execute(&flags, &["0x0F"]);
        assert!(reply.is_success());
        assert_eq!(flags.get_all(), 0xF0);
    }

    #[test]
    fn zero_is_a_bad_parameter() {
        let flags = registry(0);
        let reply = MiCommand::SetFlag.execute(&flags, &["0"]);
        assert_eq!(reply.code, 400);
        assert_eq!(reply.reason, MI_BAD_PARM);
        assert!(reply.children.is_empty());
    }

    #[test]
    fn missing_argument_is_reported() {
        let flags = registry(0);
        for command in [MiCommand::SetFlag, MiCommand::ResetFlag, MiCommand::IsFlag] {
            let result = command.try_execute::<u32, String>(&flags, &[]);
            assert_eq!(result, Err(ClientError::MissingParameter));

            let reply = command.execute::<u32, String>(&flags, &[]);
            assert_eq!(reply.code, 400);
            assert_eq!(reply.reason, MI_MISSING_PARM);
        }
    }

    #[test]
    fn get_flags_ignores_arguments() {
        let flags = registry(0xDEAD_BEEF);
        let reply = MiCommand::GetFlags.execute(&flags, &["whatever"]);
        assert_eq!(
            reply.values().collect::<Vec<_>>(),
            vec!["0xDEADBEEF", "3735928559"]
        );
        assert!(!MiCommand::GetFlags.takes_input());
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let flags = registry(0);
        let reply = MiCommand::SetFlag.execute(&flags, &["4", "junk"]);
        assert!(reply.is_success());
        assert_eq!(flags.get_all(), 4);
    }

    #[test]
    fn failed_command_leaves_word_untouched() {
        let flags = registry(0x5);
        let _ = MiCommand::ResetFlag.execute(&flags, &["x5"]);
        let _ = MiCommand::SetFlag.execute(&flags, &["0"]);
        assert_eq!(flags.get_all(), 0x5);
    }

    #[test]
    fn parse_flag_value_forms() {
        assert_eq!(parse_flag_value::<u32>("12").map(FlagMask::bits), Ok(12));
        assert_eq!(parse_flag_value::<u32>("0x8").map(FlagMask::bits), Ok(8));
        assert_eq!(parse_flag_value::<u32>("0xfF").map(FlagMask::bits), Ok(255));
        assert!(parse_flag_value::<u32>("0X8").is_err());
        assert_eq!(
            parse_flag_value::<u32>("4294967295").map(FlagMask::bits),
            Ok(u32::MAX)
        );

        for bad in ["", "0", "0x", "0x0", "-1", "+1", "1.5", "abc", " 1", "4294967296"] {
            assert!(parse_flag_value::<u32>(bad).is_err(), "{:?} should fail", bad);
        }
    }

    #[test]
    fn command_names_round_trip() {
        for command in MiCommand::ALL {
            assert_eq!(command.name().parse::<MiCommand>(), Ok(command));
        }
        assert!("get_gflags".parse::<MiCommand>().is_err());
    }

    #[test]
    fn reply_json_omits_empty_children() {
        let json = serde_json::to_string(&MiReply::ok()).ok();
        assert_eq!(json.as_deref(), Some(r#"{"code":200,"reason":"OK"}"#));

        let json = serde_json::to_value(MiReply::ok().with_child("TRUE")).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({"code": 200, "reason": "OK", "children": [{"value": "TRUE"}]}))
        );
    }
}
