//! Scheduled high-impact event calendar

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Expected market impact of a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// A scheduled macro event (rate decision, CPI print, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub name: String,
    /// Release time
    pub at: DateTime<Utc>,
    pub impact: Impact,
}

/// Calendar of scheduled events with a blackout window around high-impact ones
#[derive(Debug, Clone)]
pub struct NewsCalendar {
    events: Vec<ScheduledEvent>,
    before: Duration,
    after: Duration,
}

impl NewsCalendar {
    pub fn new(mut events: Vec<ScheduledEvent>, before: Duration, after: Duration) -> Self {
        events.sort_by_key(|e| e.at);
        Self {
            events,
            before,
            after,
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![], Duration::minutes(30), Duration::minutes(30))
    }

    /// High-impact event whose blackout window contains `now`
    pub fn blackout_at(&self, now: DateTime<Utc>) -> Option<&ScheduledEvent> {
        self.events.iter().find(|e| {
            e.impact == Impact::High && now >= e.at - self.before && now <= e.at + self.after
        })
    }

    /// Next high-impact event after `now`
    pub fn next_high_impact(&self, now: DateTime<Utc>) -> Option<&ScheduledEvent> {
        self.events
            .iter()
            .find(|e| e.impact == Impact::High && e.at > now)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
