//! Aggregate block insertion failures into a single segment outcome.

use crate::Error;
use std::fmt;

/// The reason a single block insertion failed.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    #[error("rejected overload")]
    RejectedOverload,
    #[error("route not found")]
    RouteNotFound,
    #[error("route really not found")]
    RouteReallyNotFound,
    #[error("data not found")]
    DataNotFound,
    #[error("timeout")]
    Timeout,
    #[error("collision")]
    Collision,
    #[error("invalid key")]
    InvalidKey,
    #[error("storage error")]
    Storage,
    #[error("internal error")]
    Internal,
    #[error("cancelled")]
    Cancelled,
}

impl Kind {
    /// Returns true if retrying the insertion cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Kind::Collision | Kind::InvalidKey | Kind::Storage | Kind::Internal | Kind::Cancelled
        )
    }

    fn severity(&self) -> u8 {
        if self.is_fatal() {
            1
        } else {
            0
        }
    }
}

/// Counts of block failures by [Kind], in the order each kind was first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Failures {
    counts: Vec<(Kind, usize)>,
}

impl Failures {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure of `kind`.
    pub fn merge(&mut self, kind: Kind) {
        match self.counts.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((kind, 1)),
        }
    }


    /// Returns true if no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Returns the number of failures recorded.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, count)| count).sum()
    }

    /// Returns the number of failures of `kind` recorded.
    pub fn count(&self, kind: Kind) -> usize {
        self.counts
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, count)| *count)
    }

    /// Iterate over `(kind, count)` in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (Kind, usize)> + '_ {
        self.counts.iter().copied()
    }

    /// Returns the kind that describes the recorded failures.
    ///
    /// Fatal kinds outrank transient ones. Among kinds of the same severity, the
    /// first one seen wins.
    pub fn dominant(&self) -> Option<Kind> {
        let mut dominant: Option<Kind> = None;
        for &(kind, _) in &self.counts {
            match dominant {
                Some(current) if current.severity() >= kind.severity() => {}
                _ => dominant = Some(kind),
            }
        }
        dominant
    }

    /// Build the terminal error for the recorded failures, if any.
    pub fn to_error(&self) -> Option<Error> {
        let kind = self.dominant()?;
        Some(Error::Insert {
            kind,
            failures: self.clone(),
        })
    }
}

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (kind, count)) in self.counts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{count}x {kind}")?;
        }
        Ok(())
    }
}
