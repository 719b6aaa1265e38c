//! Termination predicates for the turn loop.
//!
//! Predicates are stateless checks over the transcript. A
//! [`TerminationCondition`] is their logical OR: the first predicate that
//! fires ends the conversation and yields a [`StopReason`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::transcript::Transcript;

/// Default turn cap for a single runner agent.
pub const ONE_AGENT_MAX_TURNS: usize = 4;
/// Default turn cap for the planner/executor/verifier team.
pub const TEAM_MAX_TURNS: usize = 10;

/// Test-runner summary fragments that end a one-agent conversation.
pub const ONE_AGENT_MENTIONS: &[&str] = &[
    " passed in ",
    " passed",
    " failed",
    " error",
    " deselected",
    " skipped",
    " short test summary ",
    " no tests ran",
];

/// Pass-oriented fragments that end a team conversation. Failures keep the
/// team talking so it can retry with a narrower filter.
pub const TEAM_MENTIONS: &[&str] = &[" passed in ", " passed", "All tests passed"];

/// A single stop check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPredicate {
    /// Latest turn's text or tool result contains the phrase (case-sensitive).
    TextMention(String),
    /// Transcript, task included, has reached this many turns.
    MaxTurns(usize),
}

impl TerminationPredicate {
    pub fn mention(phrase: impl Into<String>) -> Self {
        Self::TextMention(phrase.into())
    }

    pub fn max_turns(cap: usize) -> Self {
        Self::MaxTurns(cap)
    }

    /// Evaluate against the transcript.
    pub fn check(&self, transcript: &Transcript) -> Option<StopReason> {
        match self {
            Self::TextMention(phrase) => {
                let turn = transcript.last()?;
                if turn.is_task() {
                    return None;
                }
                turn.mentions(phrase).then(|| StopReason::TextMention {
                    phrase: phrase.clone(),
                    speaker: turn.speaker.clone(),
                })
            }
            Self::MaxTurns(cap) => {
                (transcript.len() >= *cap).then_some(StopReason::MaxTurns(*cap))
            }
        }
    }
}

/// Disjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationCondition {
    predicates: Vec<TerminationPredicate>,
}

impl TerminationCondition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate to the disjunction.
    pub fn or(mut self, predicate: TerminationPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Mentions from `phrases` OR the turn cap.
    pub fn from_mentions(phrases: &[&str], max_turns: usize) -> Self {
        phrases
            .iter()
            .fold(Self::new(), |cond, phrase| {
                cond.or(TerminationPredicate::mention(*phrase))
            })
            .or(TerminationPredicate::max_turns(max_turns))
    }

    /// Stop rules for a single runner agent.
    pub fn one_agent(max_turns: usize) -> Self {
        Self::from_mentions(ONE_AGENT_MENTIONS, max_turns)
    }

    /// Stop rules for the planner/executor/verifier team.
    pub fn team(max_turns: usize) -> Self {
        Self::from_mentions(TEAM_MENTIONS, max_turns)
    }

    pub fn predicates(&self) -> &[TerminationPredicate] {
        &self.predicates
    }

    /// Tightest turn cap, if any.
    pub fn turn_cap(&self) -> Option<usize> {
        self.predicates
            .iter()
            .filter_map(|p| match p {
                TerminationPredicate::MaxTurns(cap) => Some(*cap),
                TerminationPredicate::TextMention(_) => None,
            })
            .min()
    }

    /// First predicate that fires, in declaration order.
    pub fn check(&self, transcript: &Transcript) -> Option<StopReason> {
        self.predicates.iter().find_map(|p| p.check(transcript))
    }

    /// Only the cap predicates.
    pub fn check_cap(&self, transcript: &Transcript) -> Option<StopReason> {
        self.predicates
            .iter()
            .filter(|p| matches!(p, TerminationPredicate::MaxTurns(_)))
            .find_map(|p| p.check(transcript))
    }
}

impl From<TerminationPredicate> for TerminationCondition {
    fn from(predicate: TerminationPredicate) -> Self {
        Self::new().or(predicate)
    }
}

/// Why a conversation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TextMention { phrase: String, speaker: String },
    MaxTurns(usize),
    ModelError(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TextMention { phrase, speaker } => {
                write!(f, "{} mentioned {:?}", speaker, phrase)
            }
            StopReason::MaxTurns(cap) => write!(f, "reached {} turns", cap),
            StopReason::ModelError(e) => write!(f, "model error: {}", e),
        }
    }
}
