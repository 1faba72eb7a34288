//! Declared preconditions of analysis methods.
//!
//! Every check reads recording metadata only, so the runner can skip an
//! incompatible recording without loading any data.

use crate::recording::Recording;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One precondition a method needs from a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// At least this many distinct regions.
    MinRegions(usize),
    /// A signal in this region.
    Region(String),
    /// A signal carrying this tag.
    Tag(String),
    /// At least this many signals.
    MinSignals(usize),
    /// This key in the experiment parameters.
    Parameter(String),
}

impl Capability {
    /// `Err(reason)` when `recording` does not satisfy this capability.
    pub fn check(&self, recording: &Recording) -> Result<(), String> {
        match self {
            Capability::MinRegions(n) => {
                let found = recording.regions().len();
                if found >= *n {
                    Ok(())
                } else {
                    Err(format!("needs {} distinct regions, found {}", n, found))
                }
            }
            Capability::Region(region) => {
                if recording.has_region(region) {
                    Ok(())
                } else {
                    Err(format!("no signal in region `{}`", region))
                }
            }
            Capability::Tag(tag) => {
                if recording.has_tag(tag) {
                    Ok(())
                } else {
                    Err(format!("no signal tagged `{}`", tag))
                }
            }
            Capability::MinSignals(n) => {
                let found = recording.signal_count();
                if found >= *n {
                    Ok(())
                } else {
                    Err(format!("needs {} signals, found {}", n, found))
                }
            }
            Capability::Parameter(key) => {
                if recording.parameters().contains_key(key) {
                    Ok(())
                } else {
                    Err(format!("missing parameter `{}`", key))
                }
            }
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::MinRegions(n) => write!(f, "regions >= {}", n),
            Capability::Region(r) => write!(f, "region {}", r),
            Capability::Tag(t) => write!(f, "tag {}", t),
            Capability::MinSignals(n) => write!(f, "signals >= {}", n),
            Capability::Parameter(k) => write!(f, "parameter {}", k),
        }
    }
}

/// Conjunction of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements(Vec<Capability>);

impl Requirements {
    /// No preconditions.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.push(capability);
        self
    }

    pub fn min_regions(self, n: usize) -> Self {
        self.with(Capability::MinRegions(n))
    }

    pub fn region(self, region: impl Into<String>) -> Self {
        self.with(Capability::Region(region.into()))
    }

    pub fn tag(self, tag: impl Into<String>) -> Self {
        self.with(Capability::Tag(tag.into()))
    }

    pub fn min_signals(self, n: usize) -> Self {
        self.with(Capability::MinSignals(n))
    }

    pub fn parameter(self, key: impl Into<String>) -> Self {
        self.with(Capability::Parameter(key.into()))
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.0
    }

    /// All unmet capabilities, joined into one reason.
    pub fn check(&self, recording: &Recording) -> Result<(), String> {
        let unmet: Vec<String> = self
            .0
            .iter()
            .filter_map(|c| c.check(recording).err())
            .collect();
        if unmet.is_empty() {
            Ok(())
        } else {
            Err(unmet.join("; "))
        }
    }
}

impl FromIterator<Capability> for Requirements {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
