//! Change notifications delivered by the push channel.
use serde::{Deserialize, Serialize};

use crate::worker::{FlagUpdate, SegmentUpdate, UpdateQueue};

/// A push message announcing that an entity changed on the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// Some flag changed; all flags share one change number.
    #[serde(rename_all = "camelCase")]
    SplitUpdate {
        /// Change number all flags reached.
        change_number: i64,
    },
    /// A flag was killed. Handled as a regular flag update: the definition is always re-fetched.
    #[serde(rename_all = "camelCase")]
    SplitKill {
        /// The killed flag.
        split_name: String,
        /// Treatment the flag now serves.
        default_treatment: String,
        /// Change number of the killed definition.
        change_number: i64,
    },
    /// Membership of a segment changed.
    #[serde(rename_all = "camelCase")]
    SegmentUpdate {
        /// The changed segment.
        segment_name: String,
        /// Change number the segment reached.
        change_number: i64,
    },
}

impl Notification {
    /// Parse a push message payload. Unknown message types are reported as errors.
    pub fn from_json(payload: &str) -> serde_json::Result<Notification> {
        serde_json::from_str(payload)
    }

    /// Change number the entity reached.
    pub fn change_number(&self) -> i64 {
        match self {
            Notification::SplitUpdate { change_number }
            | Notification::SplitKill { change_number, .. }
            | Notification::SegmentUpdate { change_number, .. } => *change_number,
        }
    }
}

/// Entry point for the push transport: routes notifications to the worker of their entity kind.
#[derive(Clone)]
pub struct NotificationQueue {
    flags: UpdateQueue<FlagUpdate>,
    segments: UpdateQueue<SegmentUpdate>,
}

impl NotificationQueue {
    pub(crate) fn new(
        flags: UpdateQueue<FlagUpdate>,
        segments: UpdateQueue<SegmentUpdate>,
    ) -> NotificationQueue {
        NotificationQueue { flags, segments }
    }

    /// Enqueue a notification without blocking. Returns `false` once synchronization is shut down.
    pub fn push(&self, notification: Notification) -> bool {
        log::debug!(target: "splitio",
                    change_number = notification.change_number();
                    "received notification");
        match notification {
            Notification::SplitUpdate { change_number } => {
                self.flags.enqueue(FlagUpdate { change_number })
            }
            Notification::SplitKill {
                split_name,
                change_number,
                ..
            } => {
                log::debug!(target: "splitio",
                            flag_name:display = split_name,
                            change_number;
                            "flag killed, refreshing flags");
                self.flags.enqueue(FlagUpdate { change_number })
            }
            Notification::SegmentUpdate {
                segment_name,
                change_number,
            } => self.segments.enqueue(SegmentUpdate {
                segment_name,
                change_number,
            }),
        }
    }
}
