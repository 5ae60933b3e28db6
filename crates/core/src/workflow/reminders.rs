//! Deadline reminder planning.
//!
//! Pure decision logic: given the active steps that are due soon, the time
//! each approver last received a reminder of each tier, and the clock, work
//! out which batches to send and which to hold back.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ReminderConfig;
use crate::domain::directory::UserId;
use crate::domain::document::DocumentId;

const BATCH_PREVIEW_LIMIT: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderTier {
    Upcoming,
    Urgent,
}

impl ReminderTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "deadline_24h",
            Self::Urgent => "deadline_2h",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "deadline_24h" => Some(Self::Upcoming),
            "deadline_2h" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// An active pending step with an approver and a deadline ahead of now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueStep {
    pub document_id: DocumentId,
    pub title: String,
    pub owner: UserId,
    pub step_order: u32,
    pub approver: UserId,
    pub deadline: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReminderBatch {
    pub approver: UserId,
    pub tier: ReminderTier,
    pub documents: Vec<DueStep>,
    /// Time left until the soonest deadline in the batch.
    pub remaining: Duration,
}

impl ReminderBatch {
    pub fn is_urgent(&self) -> bool {
        self.tier == ReminderTier::Urgent
    }

    /// Human readable digest listing the first few documents.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .documents
            .iter()
            .take(BATCH_PREVIEW_LIMIT)
            .map(|due| format!("- {} (due {})", due.title, due.deadline.format("%Y-%m-%d %H:%M")))
            .collect();
        if self.documents.len() > BATCH_PREVIEW_LIMIT {
            lines.push(format!("... and {} more", self.documents.len() - BATCH_PREVIEW_LIMIT));
        }
        format!(
            "{} document(s) awaiting approval, {}h {}m left:\n{}",
            self.documents.len(),
            self.remaining.num_hours(),
            self.remaining.num_minutes() % 60,
            lines.join("\n")
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Suppression {
    RecentlyNotified { last_sent: DateTime<Utc> },
    QuietHours { local_hour: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SuppressedBatch {
    pub approver: UserId,
    pub tier: ReminderTier,
    pub document_count: usize,
    pub reason: Suppression,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReminderPlan {
    pub batches: Vec<ReminderBatch>,
    pub suppressed: Vec<SuppressedBatch>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuietHours {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Evening hours at or past this one are still "before bedtime".
    pub evening_cutoff_hour: u32,
    pub utc_offset_minutes: i32,
}

impl QuietHours {
    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => now.with_timezone(&offset).hour(),
            None => now.hour(),
        }
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn suppresses(&self, now: DateTime<Utc>) -> Option<u32> {
        let hour = self.local_hour(now);
        (self.contains(hour) && hour < self.evening_cutoff_hour).then_some(hour)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReminderPolicy {
    pub upcoming_window: Duration,
    pub upcoming_repeat: Duration,
    pub urgent_window: Duration,
    pub urgent_repeat: Duration,
    pub quiet_hours: QuietHours,
    pub retention: Duration,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self::from(&ReminderConfig::default())
    }
}

impl From<&ReminderConfig> for ReminderPolicy {
    fn from(config: &ReminderConfig) -> Self {
        Self {
            upcoming_window: Duration::hours(i64::from(config.upcoming_window_hours)),
            upcoming_repeat: Duration::hours(i64::from(config.upcoming_repeat_hours)),
            urgent_window: Duration::hours(i64::from(config.urgent_window_hours)),
            urgent_repeat: Duration::hours(i64::from(config.urgent_repeat_hours)),
            quiet_hours: QuietHours {
                start_hour: config.quiet_start_hour,
                end_hour: config.quiet_end_hour,
                evening_cutoff_hour: config.evening_cutoff_hour,
                utc_offset_minutes: config.utc_offset_minutes,
            },
            retention: Duration::days(i64::from(config.retention_days)),
        }
    }
}

impl ReminderPolicy {
    /// Widest look-ahead any tier needs; callers use it to bound their query.
    pub fn horizon(&self) -> Duration {
        self.upcoming_window.max(self.urgent_window)
    }

    pub fn window(&self, tier: ReminderTier) -> Duration {
        match tier {
            ReminderTier::Upcoming => self.upcoming_window,
            ReminderTier::Urgent => self.urgent_window,
        }
    }

    /// Sends older than `now - retention` no longer affect de-duplication.
    pub fn prune_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention.max(self.upcoming_repeat).max(self.urgent_repeat)
    }

    pub fn repeat_after(&self, tier: ReminderTier) -> Duration {
        match tier {
            ReminderTier::Upcoming => self.upcoming_repeat,
            ReminderTier::Urgent => self.urgent_repeat,
        }
    }

    pub fn plan(
        &self,
        due: &[DueStep],
        now: DateTime<Utc>,
        last_sent: &HashMap<(UserId, ReminderTier), DateTime<Utc>>,
    ) -> ReminderPlan {
        let mut plan = ReminderPlan::default();

        for tier in [ReminderTier::Upcoming, ReminderTier::Urgent] {
            let horizon = now + self.window(tier);
            let mut by_approver: BTreeMap<&UserId, Vec<DueStep>> = BTreeMap::new();
            for step in due.iter().filter(|step| step.deadline > now && step.deadline <= horizon) {
                by_approver.entry(&step.approver).or_default().push(step.clone());
            }

            let quiet = match tier {
                ReminderTier::Urgent => self.quiet_hours.suppresses(now),
                ReminderTier::Upcoming => None,
            };

            for (approver, mut documents) in by_approver {
                documents.sort_by(|left, right| {
                    left.deadline.cmp(&right.deadline).then(left.document_id.cmp(&right.document_id))
                });

                if let Some(local_hour) = quiet {
                    plan.suppressed.push(SuppressedBatch {
                        approver: approver.clone(),
                        tier,
                        document_count: documents.len(),
                        reason: Suppression::QuietHours { local_hour },
                    });
                    continue;
                }

                if let Some(last) = last_sent.get(&(approver.clone(), tier)) {
                    if now - *last < self.repeat_after(tier) {
                        plan.suppressed.push(SuppressedBatch {
                            approver: approver.clone(),
                            tier,
                            document_count: documents.len(),
                            reason: Suppression::RecentlyNotified { last_sent: *last },
                        });
                        continue;
                    }
                }

                let remaining = documents[0].deadline - now;
                plan.batches.push(ReminderBatch {
                    approver: approver.clone(),
                    tier,
                    documents,
                    remaining,
                });
            }
        }

        plan
    }
}
