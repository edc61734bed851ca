use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ============================================================================
// Recurrence Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
    /// Any interval this server does not understand
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomInterval {
    pub unit: IntervalUnit,
    pub value: u32,
    /// Weekday numbers (0 = Sunday, 1 = Monday, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    /// Day of month (1-31)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    /// Month of year (1-12)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_of_year: Option<u32>,
}

impl CustomInterval {
    pub fn new(unit: IntervalUnit, value: u32) -> Self {
        Self {
            unit,
            value,
            days_of_week: None,
            day_of_month: None,
            month_of_year: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndCondition {
    #[default]
    Never,
    Count,
    UntilDate,
    #[serde(other)]
    Unknown,
}

/// A recurrence rule attached to a reminder or a todo.
///
/// `custom_interval` is only read when `interval` is `Custom`; `end_count` and
/// `end_date` are only read for the matching `end_condition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub interval: RecurrenceInterval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_interval: Option<CustomInterval>,
    #[serde(default)]
    pub end_condition: EndCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_count: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_end_date"
    )]
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn new(interval: RecurrenceInterval) -> Self {
        Self {
            interval,
            custom_interval: None,
            end_condition: EndCondition::Never,
            end_count: None,
            end_date: None,
        }
    }

    pub fn custom(custom_interval: CustomInterval) -> Self {
        Self {
            custom_interval: Some(custom_interval),
            ..Self::new(RecurrenceInterval::Custom)
        }
    }

    pub fn ending_after(mut self, count: u32) -> Self {
        self.end_condition = EndCondition::Count;
        self.end_count = Some(count);
        self
    }

    pub fn ending_on(mut self, date: NaiveDate) -> Self {
        self.end_condition = EndCondition::UntilDate;
        self.end_date = Some(date);
        self
    }
}

/// Accepts either a plain `YYYY-MM-DD` date or a full RFC 3339 timestamp
fn deserialize_end_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }

    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| Some(dt.date_naive()))
        .map_err(|_| serde::de::Error::custom(format!("invalid end_date: {}", raw)))
}

// ============================================================================
// Todo Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub is_recurring_parent: bool,
    pub recurring_parent_id: Option<Uuid>,
    pub recurring_occurrence: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubtaskRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub subtasks: Option<Vec<CreateSubtaskRequest>>,
    pub recurrence: Option<RecurrenceRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTodoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub is_completed: Option<bool>,
    pub subtasks: Option<Vec<Subtask>>,
    pub recurrence: Option<RecurrenceRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRecurringTaskRequest {
    pub todo_data: Todo,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringTaskStatus {
    pub message: String,
    pub task_id: Uuid,
}

// ============================================================================
// Reminder Types
// ============================================================================

pub const DEFAULT_REMINDER_TYPE: &str = "notification";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub todo_id: Uuid,
    pub user_id: String,
    pub reminder_date_time: DateTime<Utc>,
    pub reminder_type: String,
    pub message: String,
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub occurrence_count: u32,
    #[serde(default)]
    pub is_triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReminderRequest {
    pub todo_id: Uuid,
    pub reminder_date_time: DateTime<Utc>,
    pub reminder_type: Option<String>,
    pub message: Option<String>,
    pub recurrence: Option<RecurrenceRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReminderRequest {
    pub reminder_date_time: Option<DateTime<Utc>>,
    pub reminder_type: Option<String>,
    pub message: Option<String>,
    pub recurrence: Option<RecurrenceRule>,
}

// ============================================================================
// Notification Types
// ============================================================================

pub const REMINDER_NOTIFICATION_TITLE: &str = "Task Reminder";
pub const REMINDER_NOTIFICATION_TYPE: &str = "reminder";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub todo_id: Uuid,
    pub reminder_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSuccess<T> {
    pub data: T,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recurrence_rule_from_json() {
        let rule: RecurrenceRule = serde_json::from_str(
            r#"{"interval":"custom","custom_interval":{"unit":"week","value":2,"days_of_week":[1,3]},"end_condition":"count","end_count":5}"#,
        )
        .unwrap();

        assert_eq!(rule.interval, RecurrenceInterval::Custom);
        assert_eq!(rule.end_condition, EndCondition::Count);
        assert_eq!(rule.end_count, Some(5));
        let custom = rule.custom_interval.unwrap();
        assert_eq!(custom.unit, IntervalUnit::Week);
        assert_eq!(custom.value, 2);
        assert_eq!(custom.days_of_week, Some(vec![1, 3]));
    }

    #[test]
    fn test_end_condition_defaults_to_never() {
        let rule: RecurrenceRule = serde_json::from_str(r#"{"interval":"daily"}"#).unwrap();
        assert_eq!(rule.end_condition, EndCondition::Never);
        assert!(rule.custom_interval.is_none());
    }

    #[test]
    fn test_unrecognized_values_deserialize_as_unknown() {
        let rule: RecurrenceRule =
            serde_json::from_str(r#"{"interval":"hourly","end_condition":"whenever"}"#).unwrap();
        assert_eq!(rule.interval, RecurrenceInterval::Unknown);
        assert_eq!(rule.end_condition, EndCondition::Unknown);

        let custom: CustomInterval =
            serde_json::from_str(r#"{"unit":"fortnight","value":1}"#).unwrap();
        assert_eq!(custom.unit, IntervalUnit::Unknown);
    }

    #[test]
    fn test_end_date_accepts_date_and_timestamp() {
        let plain: RecurrenceRule = serde_json::from_str(
            r#"{"interval":"daily","end_condition":"untilDate","end_date":"2024-06-01"}"#,
        )
        .unwrap();
        let stamped: RecurrenceRule = serde_json::from_str(
            r#"{"interval":"daily","end_condition":"untilDate","end_date":"2024-06-01T00:00:00.000Z"}"#,
        )
        .unwrap();

        let expected = NaiveDate::from_ymd_opt(2024, 6, 1);
        assert_eq!(plain.end_date, expected);
        assert_eq!(stamped.end_date, expected);
    }

    #[test]
    fn test_end_date_rejects_garbage() {
        let result: Result<RecurrenceRule, _> = serde_json::from_str(
            r#"{"interval":"daily","end_condition":"untilDate","end_date":"next tuesday"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_notification_type_field_name() {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            todo_id: Uuid::new_v4(),
            reminder_id: Uuid::new_v4(),
            title: REMINDER_NOTIFICATION_TITLE.to_string(),
            message: "Water the plants".to_string(),
            notification_type: REMINDER_NOTIFICATION_TYPE.to_string(),
            is_read: false,
            created_at: Utc::now(),
            read_at: None,
        };

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "reminder");
        assert!(json.get("notification_type").is_none());
    }

    #[test]
    fn test_rule_builders() {
        let until = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let rule = RecurrenceRule::new(RecurrenceInterval::Weekly).ending_on(until);
        assert_eq!(rule.end_condition, EndCondition::UntilDate);
        assert_eq!(rule.end_date, Some(until));

        let rule = RecurrenceRule::custom(CustomInterval::new(IntervalUnit::Day, 3)).ending_after(4);
        assert_eq!(rule.interval, RecurrenceInterval::Custom);
        assert_eq!(rule.end_count, Some(4));
    }

    #[test]
    fn test_api_success() {
        let success = ApiSuccess::new("test data");
        assert_eq!(success.data, "test data");
    }
}
