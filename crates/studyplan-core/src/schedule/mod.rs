//! Schedule block types.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recurring weekly block on the user's schedule.
///
/// The validity window (`start_date..=end_date`) bounds the weeks in which
/// the block applies. Blocks created by the calendar import are single-day:
/// `start_date == end_date`, both equal to the event's date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: String,
    pub user_id: String,
    pub title: String,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleBlock {
    /// Create a single-day block for `date`, the shape the importer produces.
    pub fn single_day(
        user_id: impl Into<String>,
        title: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            day_of_week: day_of_week(date),
            start_time,
            end_time,
            start_date: date,
            end_date: date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the validity window spans a single day.
    pub fn is_single_day(&self) -> bool {
        self.start_date == self.end_date
    }
}

/// Day-of-week index for a date (0 = Monday .. 6 = Sunday).
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}
