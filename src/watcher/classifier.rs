//! Log line classification.
//!
//! Maps raw client log lines to named game events using two kinds of rules:
//! literal substring matches, which carry the whole line as payload, and
//! regex patterns, which carry the first match as payload.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A classified log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEventInfo {
    /// Event name, e.g. `GameJoining`.
    pub event: String,
    /// Raw line for substring rules, first match for pattern rules.
    pub data: String,
}

impl GameEventInfo {
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Error type for rule construction.
#[derive(thiserror::Error, Debug)]
pub enum RuleError {
    /// Invalid regex pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// A single classification rule.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Fires for every line containing `literal`.
    Match { event: String, literal: String },
    /// Fires for every line matching `regex`; payload is the first match.
    Pattern { event: String, regex: Regex },
}

impl Rule {
    /// Create a substring rule.
    #[must_use]
    pub fn matching(event: impl Into<String>, literal: impl Into<String>) -> Self {
        Self::Match {
            event: event.into(),
            literal: literal.into(),
        }
    }

    /// Create a regex rule.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPattern` if the regex is invalid.
    pub fn pattern(event: impl Into<String>, pattern: &str) -> Result<Self, RuleError> {
        Ok(Self::Pattern {
            event: event.into(),
            regex: Regex::new(pattern)?,
        })
    }

    /// Event name this rule emits.
    #[must_use]
    pub fn event(&self) -> &str {
        match self {
            Self::Match { event, .. } | Self::Pattern { event, .. } => event,
        }
    }

    /// Payload this rule produces for `line`, or `None` if it does not fire.
    #[must_use]
    pub fn apply<'a>(&self, line: &'a str) -> Option<&'a str> {
        match self {
            Self::Match { literal, .. } => line.contains(literal.as_str()).then_some(line),
            Self::Pattern { regex, .. } => regex.find(line).map(|m| m.as_str()),
        }
    }

    fn is_match_rule(&self) -> bool {
        matches!(self, Self::Match { .. })
    }
}

/// Stateless classifier over an ordered, immutable rule set.
#[derive(Debug, Clone, Default)]
pub struct LineClassifier {
    rules: Vec<Rule>,
}

impl LineClassifier {
    /// Create a classifier from explicit rules.
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Create a classifier with the built-in client log rules.
    #[must_use]
    pub fn with_builtin_rules() -> Self {
        let mut rules: Vec<Rule> = MATCH_RULES
            .iter()
            .map(|(event, literal)| Rule::matching(*event, *literal))
            .collect();

        rules.extend(
            PATTERN_RULES
                .iter()
                .filter_map(|(event, pattern)| match Rule::pattern(*event, pattern) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        tracing::warn!(event, error = %e, "Failed to compile built-in pattern rule");
                        None
                    }
                }),
        );

        Self { rules }
    }

    /// Get all rules.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify a batch of lines.
    ///
    /// All substring rules run before all pattern rules. Each rule is an
    /// independent pass over `lines` in input order, so a line matching
    /// several rules yields several events.
    #[must_use]
    pub fn classify<S: AsRef<str>>(&self, lines: &[S]) -> Vec<GameEventInfo> {
        let match_rules = self.rules.iter().filter(|r| r.is_match_rule());
        let pattern_rules = self.rules.iter().filter(|r| !r.is_match_rule());

        match_rules
            .chain(pattern_rules)
            .flat_map(move |rule| {
                lines.iter().filter_map(move |line| {
                    rule.apply(line.as_ref())
                        .map(|payload| GameEventInfo::new(rule.event(), payload))
                })
            })
            .collect()
    }
}

const MATCH_RULES: &[(&str, &str)] = &[
    ("GameJoining", "[FLog::Output] ! Joining game"),
    (
        "GameStartJoining",
        "[FLog::SingleSurfaceApp] launchUGCGameInternal",
    ),
    (
        "GameJoiningPrivateServer",
        "[FLog::GameJoinUtil] GameJoinUtil::joinGamePostPrivateServer",
    ),
    (
        "GameJoiningReservedServer",
        "[FLog::GameJoinUtil] GameJoinUtil::initiateTeleportToReservedServer",
    ),
    ("GameJoiningUDMUX", "[FLog::Network] UDMUX Address = "),
    ("GameJoined", "[FLog::Network] serverId:"),
    (
        "GameDisconnected",
        "[FLog::Network] Time to disconnect replication data:",
    ),
    ("GameTeleporting", "[FLog::SingleSurfaceApp] initiateTeleport"),
    ("GameMessage", "[FLog::Output] [BloxstrapRPC]"),
    ("GameLeaving", "[FLog::SingleSurfaceApp] leaveUGCGameInternal"),
];

const PATTERN_RULES: &[(&str, &str)] = &[
    (
        "GameJoiningEntry",
        r"! Joining game '([0-9a-f\-]{36})' place ([0-9]+) at ([0-9\.]+)",
    ),
    (
        "GameJoiningUDMUX",
        r"UDMUX Address = ([0-9\.]+), Port = [0-9]+ \| RCC Server Address = ([0-9\.]+), Port = [0-9]+",
    ),
    ("GameJoinedEntry", r"serverId: ([0-9\.]+)\|[0-9]+"),
    ("GameMessageEntry", r"\[BloxstrapRPC\] (.*)"),
    ("GameCrashEntry", r"\[FLog::CrashReportLog\] (.*)"),
];
