use crate::{error::BeaconError, time::iso_millis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pending reminder persisted in the schedule store.
///
/// Field names serialize in camelCase so the persisted collections keep the
/// same shape no matter which process wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledNotification {
    pub id: String,
    /// Owning task. At most one active schedule per task.
    pub task_id: String,
    pub title: String,
    pub body: String,
    /// Absolute fire time, already adjusted for the reminder offset.
    #[serde(with = "iso_millis")]
    pub scheduled_time: DateTime<Utc>,
    /// Bound delivery target. Empty = broadcast to every known subscription.
    #[serde(default)]
    pub subscription_endpoint: String,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
}

impl ScheduledNotification {
    /// Build a fresh record with a new id.
    pub fn new(
        task_id: &str,
        title: &str,
        body: &str,
        scheduled_time: DateTime<Utc>,
        subscription_endpoint: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            scheduled_time,
            subscription_endpoint: subscription_endpoint.unwrap_or_default().to_string(),
            created_at,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_time <= now
    }

    pub fn is_bound(&self) -> bool {
        !self.subscription_endpoint.is_empty()
    }

    /// The payload pushed to clients, tagged with the task id.
    pub fn payload(&self) -> PushPayload {
        PushPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            tag: Some(self.task_id.clone()),
        }
    }
}

/// A background worker's cached timer record, keyed by task id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotification {
    pub task_id: String,
    pub title: String,
    pub body: String,
    #[serde(with = "iso_millis")]
    pub scheduled_time: DateTime<Utc>,
}

impl PendingNotification {
    pub fn payload(&self) -> PushPayload {
        PushPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            tag: Some(self.task_id.clone()),
        }
    }
}

impl From<&ScheduledNotification> for PendingNotification {
    fn from(n: &ScheduledNotification) -> Self {
        Self {
            task_id: n.task_id.clone(),
            title: n.title.clone(),
            body: n.body.clone(),
            scheduled_time: n.scheduled_time,
        }
    }
}

/// Provider-issued credentials for one delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A registered delivery target. `endpoint` is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

/// What a client displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    /// Task id, used by clients to group and dedup notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Largest accepted reminder offset: one leap year of minutes.
pub const MAX_REMINDER_MINUTES: i64 = 366 * 24 * 60;

/// A scheduling intent emitted when a task with reminders enabled is saved.
///
/// Every field defaults so that missing fields surface as validation errors
/// rather than deserialization failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleRequest {
    pub task_id: String,
    pub title: String,
    pub body: Option<String>,
    /// `YYYY-MM-DD`.
    pub scheduled_date: String,
    /// `HH:MM`.
    pub scheduled_time: String,
    /// Minutes before the event. Missing = 0.
    pub reminder_minutes: Option<i64>,
    pub subscription_endpoint: Option<String>,
}

impl ScheduleRequest {
    /// Reject requests missing a required field or carrying an offset outside
    /// `0..=MAX_REMINDER_MINUTES`.
    pub fn validate(&self) -> Result<(), BeaconError> {
        let required = [
            ("taskId", &self.task_id),
            ("title", &self.title),
            ("scheduledDate", &self.scheduled_date),
            ("scheduledTime", &self.scheduled_time),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BeaconError::MissingFields(missing));
        }
        match self.reminder_minutes() {
            m if m < 0 => Err(BeaconError::Validation(
                "reminderMinutes must not be negative".to_string(),
            )),
            m if m > MAX_REMINDER_MINUTES => Err(BeaconError::Validation(format!(
                "reminderMinutes must be at most {MAX_REMINDER_MINUTES}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn reminder_minutes(&self) -> i64 {
        self.reminder_minutes.unwrap_or(0)
    }

    /// The explicit body, or `template` with `{time}` replaced by the event time.
    pub fn body_or(&self, template: &str) -> String {
        match self.body.as_deref().map(str::trim) {
            Some(body) if !body.is_empty() => body.to_string(),
            _ => template.replace("{time}", &self.scheduled_time),
        }
    }

    /// The subscription endpoint, treating an empty string as unbound.
    pub fn endpoint(&self) -> Option<&str> {
        self.subscription_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ScheduleRequest {
        ScheduleRequest {
            task_id: "T1".to_string(),
            title: "Concert presale".to_string(),
            body: None,
            scheduled_date: "2025-01-10".to_string(),
            scheduled_time: "10:00".to_string(),
            reminder_minutes: Some(30),
            subscription_endpoint: None,
        }
    }

    #[test]
    fn test_scheduled_notification_wire_shape() {
        let at = DateTime::parse_from_rfc3339("2025-01-10T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let n = ScheduledNotification::new("T1", "Title", "Body", at, None, at);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["taskId"], "T1");
        assert_eq!(json["scheduledTime"], "2025-01-10T09:30:00.000Z");
        assert_eq!(json["subscriptionEndpoint"], "");
        assert!(!n.is_bound());

        let back: ScheduledNotification = serde_json::from_value(json).unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn test_scheduled_notification_reads_plain_iso() {
        let raw = r#"{
            "id": "T1-1736496000000",
            "taskId": "T1",
            "title": "t",
            "body": "b",
            "scheduledTime": "2025-01-10T09:30:00Z",
            "createdAt": "2025-01-10T09:00:00.123Z"
        }"#;
        let n: ScheduledNotification = serde_json::from_str(raw).unwrap();
        assert_eq!(n.subscription_endpoint, "");
        assert_eq!(n.payload().tag.as_deref(), Some("T1"));
    }

    #[test]
    fn test_validate_ok() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut req = request();
        req.task_id.clear();
        req.scheduled_time = "  ".to_string();
        match req.validate() {
            Err(BeaconError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["taskId", "scheduledTime"]);
            }
            other => panic!("expected missing fields, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_negative_offset() {
        let mut req = request();
        req.reminder_minutes = Some(-5);
        assert!(matches!(req.validate(), Err(BeaconError::Validation(_))));
    }

    #[test]
    fn test_validate_caps_offset() {
        let mut req = request();
        req.reminder_minutes = Some(MAX_REMINDER_MINUTES);
        assert!(req.validate().is_ok());
        req.reminder_minutes = Some(MAX_REMINDER_MINUTES + 1);
        assert!(matches!(req.validate(), Err(BeaconError::Validation(_))));
        req.reminder_minutes = Some(i64::MAX / 2);
        assert!(matches!(req.validate(), Err(BeaconError::Validation(_))));
    }

    #[test]
    fn test_missing_fields_message() {
        let err = BeaconError::MissingFields(vec!["taskId".into(), "title".into()]);
        assert_eq!(err.to_string(), "missing required fields: taskId, title");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_request_defaults_from_partial_json() {
        let req: ScheduleRequest =
            serde_json::from_str(r#"{"taskId":"T1","title":"x"}"#).unwrap();
        assert_eq!(req.reminder_minutes(), 0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_body_or_template() {
        let mut req = request();
        assert_eq!(req.body_or("Starting soon: {time}"), "Starting soon: 10:00");
        req.body = Some("Doors open".to_string());
        assert_eq!(req.body_or("Starting soon: {time}"), "Doors open");
    }

    #[test]
    fn test_endpoint_empty_is_unbound() {
        let mut req = request();
        req.subscription_endpoint = Some(String::new());
        assert_eq!(req.endpoint(), None);
        req.subscription_endpoint = Some("https://push.example/abc".to_string());
        assert_eq!(req.endpoint(), Some("https://push.example/abc"));
    }
}
