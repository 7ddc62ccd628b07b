//! Adapter outcomes and the scrape-run lifecycle.
//!
//! A run starts as a [`RunHandle`] and is consumed into an immutable
//! [`ScrapeRun`] exactly once, when it reaches a terminal status.

use crate::types::{RunId, StrategyId, TargetId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How one adapter invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AdapterOutcome {
    /// The adapter believes it enumerated the full catalog
    Complete,

    /// The backend legitimately returned nothing
    EmptyNoData,

    /// Anti-bot challenge or access-denied response
    BlockedOrChallenged {
        /// What was detected
        reason: String,
    },

    /// Session material is missing, expired or was rejected
    AuthExpired {
        /// What was detected
        reason: String,
    },

    /// Network or HTTP failure
    TransportError {
        /// Failure description
        reason: String,
        /// Whether the failure pattern suggests the identity is being blocked
        likely_blocking: bool,
    },
}

impl AdapterOutcome {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::EmptyNoData => "empty-no-data",
            Self::BlockedOrChallenged { .. } => "blocked-or-challenged",
            Self::AuthExpired { .. } => "auth-expired",
            Self::TransportError { .. } => "transport-error",
        }
    }

    /// Check if the outcome is `Complete`
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Check if the outcome should force an outbound identity rotation
    #[must_use]
    pub fn forces_rotation(&self) -> bool {
        matches!(
            self,
            Self::BlockedOrChallenged { .. }
                | Self::TransportError {
                    likely_blocking: true,
                    ..
                }
        )
    }
}

impl fmt::Display for AdapterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete | Self::EmptyNoData => f.write_str(self.kind()),
            Self::BlockedOrChallenged { reason }
            | Self::AuthExpired { reason }
            | Self::TransportError { reason, .. } => write!(f, "{}: {reason}", self.kind()),
        }
    }
}

/// Terminal status of a scrape run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// A strategy enumerated the full catalog
    Success,
    /// Some listings were produced but the catalog may be incomplete
    Partial,
    /// No usable result
    Failed,
}

impl RunStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Why a run did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailureCause {
    /// Every strategy reported an empty catalog
    EmptyNoData,
    /// The last strategy was blocked or challenged
    BlockedOrChallenged {
        /// What was detected
        reason: String,
    },
    /// Session material needs to be re-established out of band
    AuthExpired {
        /// What was detected
        reason: String,
    },
    /// The last strategy failed at the transport level
    TransportError {
        /// Failure description
        reason: String,
    },
    /// The run exceeded its wall-clock budget
    TimedOut {
        /// Budget in milliseconds
        after_ms: u64,
    },
    /// No strategy in the chain had the parameters it needs
    NoApplicableStrategy,
}

impl FailureCause {
    /// Map a terminal adapter outcome to a failure cause.
    ///
    /// Returns `None` for `Complete`.
    #[must_use]
    pub fn from_outcome(outcome: &AdapterOutcome) -> Option<Self> {
        match outcome {
            AdapterOutcome::Complete => None,
            AdapterOutcome::EmptyNoData => Some(Self::EmptyNoData),
            AdapterOutcome::BlockedOrChallenged { reason } => Some(Self::BlockedOrChallenged {
                reason: reason.clone(),
            }),
            AdapterOutcome::AuthExpired { reason } => Some(Self::AuthExpired {
                reason: reason.clone(),
            }),
            AdapterOutcome::TransportError { reason, .. } => Some(Self::TransportError {
                reason: reason.clone(),
            }),
        }
    }

    /// Short name used in logs and storage.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyNoData => "empty-no-data",
            Self::BlockedOrChallenged { .. } => "blocked-or-challenged",
            Self::AuthExpired { .. } => "auth-expired",
            Self::TransportError { .. } => "transport-error",
            Self::TimedOut { .. } => "timed-out",
            Self::NoApplicableStrategy => "no-applicable-strategy",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNoData | Self::NoApplicableStrategy => f.write_str(self.kind()),
            Self::BlockedOrChallenged { reason }
            | Self::AuthExpired { reason }
            | Self::TransportError { reason } => write!(f, "{}: {reason}", self.kind()),
            Self::TimedOut { after_ms } => write!(f, "{} after {after_ms}ms", self.kind()),
        }
    }
}

/// A run that has started but not yet reached a terminal status.
#[derive(Debug)]
pub struct RunHandle {
    id: RunId,
    target_id: TargetId,
    started_at: DateTime<Utc>,
}

impl RunHandle {
    /// Start a new run for a target.
    #[must_use]
    pub fn start(target_id: TargetId) -> Self {
        Self {
            id: RunId::generate(),
            target_id,
            started_at: Utc::now(),
        }
    }

    /// Run identifier.
    #[must_use]
    pub fn id(&self) -> &RunId {
        &self.id
    }

    /// Target being scraped.
    #[must_use]
    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    /// Finalize as a full success.
    #[must_use]
    pub fn succeed(self, listing_count: usize, strategy: StrategyId) -> ScrapeRun {
        self.seal(RunStatus::Success, listing_count, Some(strategy), None)
    }

    /// Finalize as partial, optionally recording what cut the run short.
    #[must_use]
    pub fn partial(
        self,
        listing_count: usize,
        strategy: StrategyId,
        cause: Option<FailureCause>,
    ) -> ScrapeRun {
        self.seal(RunStatus::Partial, listing_count, Some(strategy), cause)
    }

    /// Finalize as failed. Failed runs never report listings.
    #[must_use]
    pub fn fail(self, cause: FailureCause) -> ScrapeRun {
        self.seal(RunStatus::Failed, 0, None, Some(cause))
    }

    fn seal(
        self,
        status: RunStatus,
        listing_count: usize,
        winning_strategy: Option<StrategyId>,
        failure: Option<FailureCause>,
    ) -> ScrapeRun {
        ScrapeRun {
            id: self.id,
            target_id: self.target_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            status,
            listing_count,
            winning_strategy,
            failure,
        }
    }
}

/// A finalized scrape run header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRun {
    id: RunId,
    target_id: TargetId,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    status: RunStatus,
    listing_count: usize,
    winning_strategy: Option<StrategyId>,
    failure: Option<FailureCause>,
}

impl ScrapeRun {
    /// Rebuild a run header read back from storage.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: RunId,
        target_id: TargetId,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: RunStatus,
        listing_count: usize,
        winning_strategy: Option<StrategyId>,
        failure: Option<FailureCause>,
    ) -> Self {
        Self {
            id,
            target_id,
            started_at,
            finished_at,
            status,
            listing_count,
            winning_strategy,
            failure,
        }
    }

    /// Run identifier.
    #[must_use]
    pub fn id(&self) -> &RunId {
        &self.id
    }

    /// Target that was scraped.
    #[must_use]
    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the run was finalized.
    #[must_use]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Terminal status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Number of listings produced.
    #[must_use]
    pub fn listing_count(&self) -> usize {
        self.listing_count
    }

    /// Strategy whose output was kept.
    #[must_use]
    pub fn winning_strategy(&self) -> Option<StrategyId> {
        self.winning_strategy
    }

    /// Terminal failure cause, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureCause> {
        self.failure.as_ref()
    }

    /// Check if the run may replace a stored snapshot.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetId {
        TargetId::new("test-target").expect("valid target id")
    }

    #[test]
    fn test_forces_rotation() {
        let blocked = AdapterOutcome::BlockedOrChallenged {
            reason: "captcha".to_string(),
        };
        assert!(blocked.forces_rotation());

        let flaky = AdapterOutcome::TransportError {
            reason: "connection reset".to_string(),
            likely_blocking: false,
        };
        assert!(!flaky.forces_rotation());

        let repeated = AdapterOutcome::TransportError {
            reason: "HTTP 403 x3".to_string(),
            likely_blocking: true,
        };
        assert!(repeated.forces_rotation());
        assert!(!AdapterOutcome::EmptyNoData.forces_rotation());
    }

    #[test]
    fn test_failure_cause_from_outcome() {
        assert_eq!(FailureCause::from_outcome(&AdapterOutcome::Complete), None);
        assert_eq!(
            FailureCause::from_outcome(&AdapterOutcome::AuthExpired {
                reason: "age gate".to_string()
            }),
            Some(FailureCause::AuthExpired {
                reason: "age gate".to_string()
            })
        );
    }

    #[test]
    fn test_failed_run_reports_no_listings() {
        let run = RunHandle::start(target()).fail(FailureCause::TimedOut { after_ms: 5000 });
        assert!(run.is_failed());
        assert_eq!(run.listing_count(), 0);
        assert_eq!(run.winning_strategy(), None);
        assert_eq!(
            run.failure().map(ToString::to_string).as_deref(),
            Some("timed-out after 5000ms")
        );
        assert!(run.finished_at() >= run.started_at());
    }

    #[test]
    fn test_success_run() {
        let handle = RunHandle::start(target());
        let id = handle.id().clone();
        let run = handle.succeed(40, StrategyId::SearchIndex);
        assert_eq!(run.id(), &id);
        assert_eq!(run.status(), RunStatus::Success);
        assert_eq!(run.listing_count(), 40);
        assert_eq!(run.winning_strategy(), Some(StrategyId::SearchIndex));
        assert!(run.failure().is_none());
    }

    #[test]
    fn test_failure_cause_serde_tag() {
        let json = serde_json::to_string(&FailureCause::AuthExpired {
            reason: "cookies expired".to_string(),
        })
        .expect("serialize cause");
        assert_eq!(json, r#"{"kind":"auth-expired","reason":"cookies expired"}"#);
    }
}
