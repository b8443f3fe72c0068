//! Agent beliefs
//!
//! A belief is a named fact an agent holds about the system it diagnoses,
//! together with how far it has been verified.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptions kept per belief; older ones are dropped first.
pub const MAX_DESCRIPTIONS: usize = 16;

/// What a belief is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BeliefKind {
    #[default]
    Undefined,
    /// Skills the agent can perform
    Interaction,
    /// Structure and configuration of the diagnosed application
    SystemUnderDiagnosis,
    /// What happened during the current session
    Dynamic,
}

/// How far a belief has been verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Veracity {
    #[default]
    Undetermined,
    True,
    False,
}

impl fmt::Display for Veracity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Undetermined => "UNDETERMINED",
            Self::True => "TRUE",
            Self::False => "FALSE",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Belief {
    pub name: String,
    pub kind: BeliefKind,
    pub veracity: Veracity,
    pub descriptions: Vec<String>,
}

impl Belief {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: BeliefKind, veracity: Veracity) -> Self {
        Self {
            name: name.into(),
            kind,
            veracity,
            descriptions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.descriptions.push(description.into());
        self
    }
}

impl fmt::Display for Belief {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.veracity)?;
        if !self.descriptions.is_empty() {
            write!(f, " ({})", self.descriptions.join("; "))?;
        }
        Ok(())
    }
}

/// Beliefs keyed by name, in creation order
#[derive(Debug, Clone, Default)]
pub struct Beliefs {
    entries: Vec<Belief>,
}

impl Beliefs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a belief. An existing belief of the same name takes the new
    /// kind and veracity and gains the description, or has its descriptions
    /// replaced when the belief is dynamic.
    pub fn create(
        &mut self,
        name: &str,
        kind: BeliefKind,
        veracity: Veracity,
        description: impl Into<String>,
    ) {
        self.insert(Belief::new(name, kind, veracity).with_description(description));
    }

    /// Merge `belief` into the store.
    pub fn insert(&mut self, belief: Belief) {
        match self.entries.iter_mut().find(|b| b.name == belief.name) {
            Some(existing) => {
                existing.kind = belief.kind;
                existing.veracity = belief.veracity;
                if belief.kind == BeliefKind::Dynamic {
                    existing.descriptions = belief.descriptions;
                } else {
                    existing.descriptions.extend(belief.descriptions);
                }
                let excess = existing.descriptions.len().saturating_sub(MAX_DESCRIPTIONS);
                existing.descriptions.drain(..excess);
            }
            None => self.entries.push(belief),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Belief> {
        self.entries.iter().find(|b| b.name == name)
    }

    /// Veracity of `name`, undetermined if unknown.
    #[must_use]
    pub fn veracity(&self, name: &str) -> Veracity {
        self.get(name).map_or(Veracity::Undetermined, |b| b.veracity)
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Belief> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: BeliefKind) -> impl Iterator<Item = &Belief> {
        self.entries.iter().filter(move |b| b.kind == kind)
    }
}
