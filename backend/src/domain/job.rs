//! Job and queue value types.
//!
//! Identifiers are 64-bit and may exceed the range a JSON number can carry
//! safely in JavaScript clients, so [`JobId`] serialises as a quoted decimal
//! string and accepts either a quoted string or a bare integer on input.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Primary key of a job row.
///
/// # Examples
/// ```
/// use queue_admin::domain::JobId;
///
/// let id: JobId = serde_json::from_str("\"9223372036854775807\"").expect("quoted id");
/// assert_eq!(id, JobId::new(i64::MAX));
/// assert_eq!(serde_json::to_string(&id).expect("serialise"), "\"9223372036854775807\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(i64);

impl JobId {
    /// Wrap a raw database identifier.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw database identifier.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raised when a string is not a valid job identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job ID: {value}")]
pub struct JobIdParseError {
    value: String,
}

impl JobIdParseError {
    /// The rejected input.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FromStr for JobId {
    type Err = JobIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self).map_err(|_| JobIdParseError {
            value: s.to_owned(),
        })
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct JobIdVisitor;

impl Visitor<'_> for JobIdVisitor {
    type Value = JobId;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a 64-bit integer or a string containing one")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(JobId(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        i64::try_from(value)
            .map(JobId)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value
            .parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(JobIdVisitor)
    }
}

/// Lifecycle state of a job as recorded by the queue engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Available,
    Cancelled,
    Completed,
    Discarded,
    Pending,
    Retryable,
    Running,
    Scheduled,
}

impl JobState {
    /// Every state, in wire-name order.
    pub const ALL: [Self; 8] = [
        Self::Available,
        Self::Cancelled,
        Self::Completed,
        Self::Discarded,
        Self::Pending,
        Self::Retryable,
        Self::Running,
        Self::Scheduled,
    ];

    /// Wire names of every state, in the same order as [`JobState::ALL`].
    pub const NAMES: [&'static str; 8] = [
        "available",
        "cancelled",
        "completed",
        "discarded",
        "pending",
        "retryable",
        "running",
        "scheduled",
    ];

    /// Stable wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Discarded => "discarded",
            Self::Pending => "pending",
            Self::Retryable => "retryable",
            Self::Running => "running",
            Self::Scheduled => "scheduled",
        }
    }

    /// Whether the job has reached a terminal state.
    pub const fn is_finalized(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Discarded)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a string names no known job state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state: {0}")]
pub struct JobStateParseError(pub String);

impl FromStr for JobState {
    type Err = JobStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| JobStateParseError(s.to_owned()))
    }
}

/// A job row as exposed to administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub args: Value,
    pub attempt: i16,
    pub attempted_at: Option<DateTime<Utc>>,
    pub attempted_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub errors: Vec<Value>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub kind: String,
    pub max_attempts: i16,
    pub metadata: Value,
    pub priority: i16,
    pub queue: String,
    pub state: JobState,
    pub scheduled_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

/// A named queue with live job counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    pub count_available: i64,
    pub count_running: i64,
    pub created_at: DateTime<Utc>,
    pub metadata: Value,
    pub paused_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Number of jobs in each state.
///
/// This is the aggregate that is expensive on large tables and is therefore
/// served from a periodically refreshed cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStateCounts {
    pub available: i64,
    pub cancelled: i64,
    pub completed: i64,
    pub discarded: i64,
    pub pending: i64,
    pub retryable: i64,
    pub running: i64,
    pub scheduled: i64,
}

impl JobStateCounts {
    /// Count recorded for `state`.
    pub const fn get(&self, state: JobState) -> i64 {
        match state {
            JobState::Available => self.available,
            JobState::Cancelled => self.cancelled,
            JobState::Completed => self.completed,
            JobState::Discarded => self.discarded,
            JobState::Pending => self.pending,
            JobState::Retryable => self.retryable,
            JobState::Running => self.running,
            JobState::Scheduled => self.scheduled,
        }
    }

    /// Add `count` to the tally for `state`.
    pub fn add(&mut self, state: JobState, count: i64) {
        let slot = match state {
            JobState::Available => &mut self.available,
            JobState::Cancelled => &mut self.cancelled,
            JobState::Completed => &mut self.completed,
            JobState::Discarded => &mut self.discarded,
            JobState::Pending => &mut self.pending,
            JobState::Retryable => &mut self.retryable,
            JobState::Running => &mut self.running,
            JobState::Scheduled => &mut self.scheduled,
        };
        *slot = slot.saturating_add(count);
    }

    /// Sum across all states.
    pub fn total(&self) -> i64 {
        JobState::ALL
            .into_iter()
            .fold(0_i64, |sum, state| sum.saturating_add(self.get(state)))
    }
}

/// Filters accepted by job listing.
///
/// Empty collections mean "no filter" for that dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobListParams {
    pub limit: u32,
    pub states: Vec<JobState>,
    pub ids: Vec<JobId>,
    pub kinds: Vec<String>,
    pub queues: Vec<String>,
    pub priorities: Vec<i16>,
}

impl JobListParams {
    /// Unfiltered listing capped at `limit` rows.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            states: Vec::new(),
            ids: Vec::new(),
            kinds: Vec::new(),
            queues: Vec::new(),
            priorities: Vec::new(),
        }
    }

    /// Whether `job` satisfies every populated filter.
    pub fn matches(&self, job: &Job) -> bool {
        fn allows<T: PartialEq>(filter: &[T], value: &T) -> bool {
            filter.is_empty() || filter.contains(value)
        }

        allows(&self.states, &job.state)
            && allows(&self.ids, &job.id)
            && allows(&self.kinds, &job.kind)
            && allows(&self.queues, &job.queue)
            && allows(&self.priorities, &job.priority)
    }
}

#[cfg(test)]
mod tests {
    //! Wire-format coverage for identifiers and states.

    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("\"9223372036854775807\"")]
    #[case("9223372036854775807")]
    fn max_job_id_is_accepted_quoted_or_bare(#[case] input: &str) {
        let id: JobId = serde_json::from_str(input).expect("job id parses");
        assert_eq!(id.get(), i64::MAX);
    }

    #[rstest]
    fn job_id_round_trips_as_quoted_string() {
        let encoded = serde_json::to_string(&JobId::new(i64::MAX)).expect("serialise");
        assert_eq!(encoded, "\"9223372036854775807\"");
        let decoded: JobId = serde_json::from_str(&encoded).expect("deserialise");
        assert_eq!(decoded, JobId::new(i64::MAX));
    }

    #[rstest]
    #[case("\"abc\"")]
    #[case("18446744073709551615")]
    #[case("1.5")]
    fn malformed_job_ids_are_rejected(#[case] input: &str) {
        assert!(serde_json::from_str::<JobId>(input).is_err());
    }

    #[rstest]
    fn state_names_match_serde_representation() {
        for (state, name) in JobState::ALL.into_iter().zip(JobState::NAMES) {
            assert_eq!(state.as_str(), name);
            let encoded = serde_json::to_string(&state).expect("serialise state");
            assert_eq!(encoded, format!("\"{name}\""));
            assert_eq!(name.parse::<JobState>(), Ok(state));
        }
    }

    #[rstest]
    fn unknown_state_fails_to_parse() {
        assert_eq!(
            "paused".parse::<JobState>(),
            Err(JobStateParseError("paused".to_owned()))
        );
    }

    #[rstest]
    fn counts_total_sums_every_state() {
        let mut counts = JobStateCounts::default();
        counts.add(JobState::Available, 3);
        counts.add(JobState::Running, 2);
        counts.add(JobState::Available, 1);
        assert_eq!(counts.get(JobState::Available), 4);
        assert_eq!(counts.total(), 6);
    }
}
