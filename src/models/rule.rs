//! Security rule model
//!
//! A rule pairs a typed matching condition with an action. The condition
//! is a tagged variant so that the evaluator never has to guess how to
//! interpret a payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier assigned by the rule repository
pub type RuleId = i64;

/// Errors raised while constructing or managing rules
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule name must not be empty")]
    EmptyName,

    #[error("Persistence error: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),
}

/// Discriminant of a rule condition, as stored in the `type` column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Ip,
    Protocol,
    Port,
    Signature,
    Unknown(String),
}

impl RuleKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "IP" => RuleKind::Ip,
            "Protocol" => RuleKind::Protocol,
            "Port" => RuleKind::Port,
            "Signature" => RuleKind::Signature,
            other => RuleKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RuleKind::Ip => "IP",
            RuleKind::Protocol => "Protocol",
            RuleKind::Port => "Port",
            RuleKind::Signature => "Signature",
            RuleKind::Unknown(s) => s,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Structured address condition. Absent or empty fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl IpCondition {
    pub fn new(source: Option<&str>, dest: Option<&str>, port: Option<&str>) -> Self {
        IpCondition {
            source: source.map(str::to_string),
            dest: dest.map(str::to_string),
            port: port.map(str::to_string),
        }
    }

    /// Field value, or `None` when the field is a wildcard
    pub fn source(&self) -> Option<&str> {
        non_empty(&self.source)
    }

    pub fn dest(&self) -> Option<&str> {
        non_empty(&self.dest)
    }

    pub fn port(&self) -> Option<&str> {
        non_empty(&self.port)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Typed rule condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCondition {
    /// Structured source/destination/port condition
    Ip(IpCondition),
    /// Plain-text address fragment from rules that predate structured conditions
    LegacyIp(String),
    Protocol(String),
    Port(String),
    Signature(String),
    /// Condition of a type this engine does not know; never matches
    Unknown { kind: String, raw: String },
}

impl RuleCondition {
    /// Parse a stored `(type, condition)` pair.
    ///
    /// `IP` conditions that are not a JSON object degrade to a legacy
    /// substring condition over the raw text.
    pub fn parse(kind: &str, raw: &str) -> Self {
        match RuleKind::from_str(kind) {
            RuleKind::Ip => match serde_json::from_str::<IpCondition>(raw) {
                Ok(condition) => RuleCondition::Ip(condition),
                Err(e) => {
                    log::debug!("IP condition {:?} is not structured ({}), using legacy match", raw, e);
                    RuleCondition::LegacyIp(raw.to_string())
                }
            },
            RuleKind::Protocol => RuleCondition::Protocol(raw.to_string()),
            RuleKind::Port => RuleCondition::Port(raw.to_string()),
            RuleKind::Signature => RuleCondition::Signature(raw.to_string()),
            RuleKind::Unknown(kind) => RuleCondition::Unknown {
                kind,
                raw: raw.to_string(),
            },
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            RuleCondition::Ip(_) | RuleCondition::LegacyIp(_) => RuleKind::Ip,
            RuleCondition::Protocol(_) => RuleKind::Protocol,
            RuleCondition::Port(_) => RuleKind::Port,
            RuleCondition::Signature(_) => RuleKind::Signature,
            RuleCondition::Unknown { kind, .. } => RuleKind::Unknown(kind.clone()),
        }
    }

    /// Text form written to the repository's `condition` column
    pub fn to_stored(&self) -> String {
        match self {
            RuleCondition::Ip(c) => {
                // Always write all three keys so stored rows look alike
                serde_json::json!({
                    "source": c.source.as_deref().unwrap_or(""),
                    "dest": c.dest.as_deref().unwrap_or(""),
                    "port": c.port.as_deref().unwrap_or(""),
                })
                .to_string()
            }
            RuleCondition::LegacyIp(raw)
            | RuleCondition::Protocol(raw)
            | RuleCondition::Port(raw)
            | RuleCondition::Signature(raw)
            | RuleCondition::Unknown { raw, .. } => raw.clone(),
        }
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCondition::Ip(c) => write!(
                f,
                "Source: {}, Dest: {}, Port: {}",
                c.source().unwrap_or("*"),
                c.dest().unwrap_or("*"),
                c.port().unwrap_or("*")
            ),
            RuleCondition::LegacyIp(raw)
            | RuleCondition::Protocol(raw)
            | RuleCondition::Port(raw)
            | RuleCondition::Signature(raw)
            | RuleCondition::Unknown { raw, .. } => f.write_str(raw),
        }
    }
}

/// Action taken when a rule matches. Unrecognised actions are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RuleAction {
    #[default]
    Flag,
    Block,
    Reject,
    Allow,
    Log,
    Other(String),
}

impl RuleAction {
    pub fn from_str(s: &str) -> Self {
        match s {
            "Flag" => RuleAction::Flag,
            "Block" => RuleAction::Block,
            "Reject" => RuleAction::Reject,
            "Allow" => RuleAction::Allow,
            "Log" => RuleAction::Log,
            other => RuleAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RuleAction::Flag => "Flag",
            RuleAction::Block => "Block",
            RuleAction::Reject => "Reject",
            RuleAction::Allow => "Allow",
            RuleAction::Log => "Log",
            RuleAction::Other(s) => s,
        }
    }

    /// Block and Reject mark matched traffic for alert treatment
    pub fn is_alerting(&self) -> bool {
        matches!(self, RuleAction::Block | RuleAction::Reject)
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A stored rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub condition: RuleCondition,
    pub action: RuleAction,
}

impl Rule {
    /// Rebuild a rule from its stored columns
    pub fn from_stored(id: RuleId, name: &str, kind: &str, condition: &str, action: &str) -> Self {
        Rule {
            id,
            name: name.to_string(),
            condition: RuleCondition::parse(kind, condition),
            action: RuleAction::from_str(action),
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.condition.kind()
    }
}

/// A validated rule that has not been assigned an identifier yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRule {
    name: String,
    condition: RuleCondition,
    action: RuleAction,
}

impl NewRule {
    pub fn new(
        name: impl Into<String>,
        condition: RuleCondition,
        action: RuleAction,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }
        Ok(NewRule {
            name,
            condition,
            action,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> &RuleCondition {
        &self.condition
    }

    pub fn action(&self) -> &RuleAction {
        &self.action
    }

    /// Attach the identifier handed out by the repository
    pub fn into_rule(self, id: RuleId) -> Rule {
        Rule {
            id,
            name: self.name,
            condition: self.condition,
            action: self.action,
        }
    }
}
