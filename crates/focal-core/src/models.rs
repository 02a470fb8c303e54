//! Domain types for the focal notification core.
//!
//! The vocabulary here is deliberately closed: event types, roles, and
//! notification categories are enums, not free strings. Collaborating
//! services own their payload shapes; focal validates only what it routes
//! on (`event_type`, `occurred_at`, `branch_id`) and parses payloads into
//! the per-type schemas below at projection time.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Roles
// ============================================================================

/// Clinic user roles, as issued by the upstream auth layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Staff,
    Optometrist,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Staff => "staff",
            Role::Optometrist => "optometrist",
            Role::Admin => "admin",
        }
    }

    /// All roles, in a stable order (used by docs and tests).
    pub fn all() -> [Role; 4] {
        [Role::Customer, Role::Staff, Role::Optometrist, Role::Admin]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "customer" => Ok(Role::Customer),
            "staff" => Ok(Role::Staff),
            "optometrist" => Ok(Role::Optometrist),
            "admin" => Ok(Role::Admin),
            other => Err(Error::Validation(format!("unknown role: {}", other))),
        }
    }
}

// ============================================================================
// Event types
// ============================================================================

/// Domain event types accepted by the event store.
///
/// Wire names are dot-namespaced (`"appointment.created"`). Strings outside
/// this set are rejected at append time; types inside the set without a
/// routing entry (currently `transfer.completed`) are stored but notify
/// nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum EventType {
    #[serde(rename = "appointment.created")]
    AppointmentCreated,
    #[serde(rename = "appointment.updated")]
    AppointmentUpdated,
    #[serde(rename = "appointment.cancelled")]
    AppointmentCancelled,
    #[serde(rename = "prescription.issued")]
    PrescriptionIssued,
    #[serde(rename = "prescription.expiring")]
    PrescriptionExpiring,
    #[serde(rename = "inventory.low_stock")]
    InventoryLowStock,
    #[serde(rename = "transfer.completed")]
    TransferCompleted,
    #[serde(rename = "feedback.submitted")]
    FeedbackSubmitted,
    #[serde(rename = "user.signup")]
    UserSignup,
    #[serde(rename = "user.role_request")]
    UserRoleRequest,
    #[serde(rename = "eyewear.assessed")]
    EyewearAssessed,
    #[serde(rename = "message.posted")]
    MessagePosted,
}

impl EventType {
    /// Namespaced wire name (`"inventory.low_stock"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AppointmentCreated => "appointment.created",
            EventType::AppointmentUpdated => "appointment.updated",
            EventType::AppointmentCancelled => "appointment.cancelled",
            EventType::PrescriptionIssued => "prescription.issued",
            EventType::PrescriptionExpiring => "prescription.expiring",
            EventType::InventoryLowStock => "inventory.low_stock",
            EventType::TransferCompleted => "transfer.completed",
            EventType::FeedbackSubmitted => "feedback.submitted",
            EventType::UserSignup => "user.signup",
            EventType::UserRoleRequest => "user.role_request",
            EventType::EyewearAssessed => "eyewear.assessed",
            EventType::MessagePosted => "message.posted",
        }
    }

    /// The notification category this event projects into.
    pub fn kind(&self) -> NotificationKind {
        match self {
            EventType::AppointmentCreated
            | EventType::AppointmentUpdated
            | EventType::AppointmentCancelled => NotificationKind::Appointment,
            EventType::PrescriptionIssued | EventType::PrescriptionExpiring => {
                NotificationKind::Prescription
            }
            EventType::InventoryLowStock | EventType::TransferCompleted => {
                NotificationKind::Inventory
            }
            EventType::FeedbackSubmitted => NotificationKind::Feedback,
            EventType::UserSignup | EventType::UserRoleRequest => NotificationKind::Account,
            EventType::EyewearAssessed => NotificationKind::Eyewear,
            EventType::MessagePosted => NotificationKind::General,
        }
    }

    /// All event types, in a stable order (used by docs and tests).
    pub fn all() -> &'static [EventType] {
        &[
            EventType::AppointmentCreated,
            EventType::AppointmentUpdated,
            EventType::AppointmentCancelled,
            EventType::PrescriptionIssued,
            EventType::PrescriptionExpiring,
            EventType::InventoryLowStock,
            EventType::TransferCompleted,
            EventType::FeedbackSubmitted,
            EventType::UserSignup,
            EventType::UserRoleRequest,
            EventType::EyewearAssessed,
            EventType::MessagePosted,
        ]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventType::all()
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| Error::Validation(format!("unknown event type: {}", s)))
    }
}

// ============================================================================
// Notification categories and status
// ============================================================================

/// Coarse notification category, used for client-side filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Appointment,
    Prescription,
    Inventory,
    Feedback,
    Account,
    Eyewear,
    General,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Appointment => "appointment",
            NotificationKind::Prescription => "prescription",
            NotificationKind::Inventory => "inventory",
            NotificationKind::Feedback => "feedback",
            NotificationKind::Account => "account",
            NotificationKind::Eyewear => "eyewear",
            NotificationKind::General => "general",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "appointment" => Ok(NotificationKind::Appointment),
            "prescription" => Ok(NotificationKind::Prescription),
            "inventory" => Ok(NotificationKind::Inventory),
            "feedback" => Ok(NotificationKind::Feedback),
            "account" => Ok(NotificationKind::Account),
            "eyewear" => Ok(NotificationKind::Eyewear),
            "general" => Ok(NotificationKind::General),
            other => Err(Error::Validation(format!(
                "unknown notification kind: {}",
                other
            ))),
        }
    }
}

/// Read state of a notification. `Unread → Read` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unread" => Ok(NotificationStatus::Unread),
            "read" => Ok(NotificationStatus::Read),
            other => Err(Error::Validation(format!(
                "unknown notification status: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Eyewear assessment vocabulary
// ============================================================================

/// Assessed condition of a customer's eyewear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EyewearCondition {
    Good,
    NeedsFix,
    NeedsReplacement,
    Bad,
}

impl EyewearCondition {
    /// Follow-up priority implied by the condition.
    pub fn priority(&self) -> Priority {
        match self {
            EyewearCondition::Good => Priority::Low,
            EyewearCondition::NeedsFix => Priority::Medium,
            EyewearCondition::NeedsReplacement => Priority::High,
            EyewearCondition::Bad => Priority::Urgent,
        }
    }

    /// Human-readable form for messages ("needs fix", "bad", ...).
    pub fn describe(&self) -> &'static str {
        match self {
            EyewearCondition::Good => "good",
            EyewearCondition::NeedsFix => "needs fix",
            EyewearCondition::NeedsReplacement => "needs replacement",
            EyewearCondition::Bad => "bad",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// An immutable domain event, as stored in the append-only log.
///
/// `id` is assigned by the store (monotonic BIGSERIAL) and doubles as the
/// replay cursor. `payload` is owned by the producing collaborator; focal
/// parses it only when projecting notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub branch_id: Option<i64>,
    pub actor_user_id: Option<i64>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Request to append a new event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub branch_id: Option<i64>,
    pub actor_user_id: Option<i64>,
    pub payload: Value,
}

impl NewEvent {
    pub fn new(event_type: EventType, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            occurred_at,
            branch_id: None,
            actor_user_id: None,
            payload: Value::Object(Default::default()),
        }
    }

    pub fn with_branch(mut self, branch_id: i64) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn with_actor(mut self, actor_user_id: i64) -> Self {
        self.actor_user_id = Some(actor_user_id);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Reject malformed events before any durable write.
    pub fn validate(&self) -> Result<()> {
        if !self.payload.is_object() {
            return Err(Error::Validation(
                "event payload must be a JSON object".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// A notification row: the projection of one event for one recipient.
///
/// The recipient is a single user when `recipient_user_id` is set, or a
/// role audience (optionally branch-scoped) when it is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Notification {
    pub id: Uuid,
    pub event_id: i64,
    pub recipient_user_id: Option<i64>,
    pub recipient_role: Role,
    pub branch_id: Option<i64>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.status == NotificationStatus::Read
    }

    /// Whether `(user_id, role, branch_id)` may read or mark this row.
    ///
    /// Owned rows require identity match; role-audience rows require role
    /// match plus branch match when the row is branch-scoped.
    pub fn visible_to(&self, user_id: i64, role: Role, branch_id: Option<i64>) -> bool {
        match self.recipient_user_id {
            Some(owner) => owner == user_id,
            None => {
                self.recipient_role == role
                    && match self.branch_id {
                        Some(b) => branch_id == Some(b),
                        None => true,
                    }
            }
        }
    }
}

/// Draft notification produced by the projector, before ids/timestamps are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub event_id: i64,
    pub recipient_user_id: Option<i64>,
    pub recipient_role: Role,
    pub branch_id: Option<i64>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Value,
}

// ============================================================================
// Subscriptions
// ============================================================================

/// One live client connection, as tracked by the subscription registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Subscription {
    pub connection_id: Uuid,
    pub user_id: i64,
    pub role: Role,
    pub branch_id: Option<i64>,
    pub connected_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(connection_id: Uuid, user_id: i64, role: Role, branch_id: Option<i64>) -> Self {
        Self {
            connection_id,
            user_id,
            role,
            branch_id,
            connected_at: Utc::now(),
        }
    }
}

// ============================================================================
// Typed event payloads
// ============================================================================

/// Payload schema for `appointment.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentPayload {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    #[serde(default)]
    pub optometrist_id: Option<i64>,
    #[serde(default)]
    pub optometrist_name: Option<String>,
    pub date: String,
    pub start_time: String,
}

/// Payload schema for `prescription.issued` / `prescription.expiring`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionPayload {
    pub prescription_id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    #[serde(default)]
    pub expiry_date: Option<String>,
}

/// Payload schema for `inventory.low_stock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockPayload {
    pub product: String,
    pub available: i64,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub threshold: Option<i64>,
}

/// Payload schema for `feedback.submitted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub customer_name: String,
    #[serde(default)]
    pub feedback_id: Option<i64>,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Payload schema for `user.signup` and `user.role_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupPayload {
    pub user_id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub requested_role: Role,
}

/// Payload schema for `eyewear.assessed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EyewearPayload {
    pub customer_id: i64,
    pub eyewear_label: String,
    pub condition: EyewearCondition,
    #[serde(default)]
    pub assessment_date: Option<String>,
    #[serde(default)]
    pub next_check_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub assessed_by: Option<String>,
}

/// One explicit recipient of a `message.posted` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecipient {
    pub user_id: i64,
    pub role: Role,
}

/// Payload schema for `message.posted` (direct announcements).
///
/// Rows are created for every entry in `recipients`, and one role-audience
/// row when `role` is set (scoped to the event's branch, if any).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub recipients: Vec<MessageRecipient>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl MessagePayload {
    /// Enforce the announcement limits before projecting rows.
    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() || self.title.len() > crate::defaults::TITLE_MAX_LENGTH {
            return Err(Error::Validation(format!(
                "title must be 1-{} characters",
                crate::defaults::TITLE_MAX_LENGTH
            )));
        }
        if self.message.is_empty() || self.message.len() > crate::defaults::MESSAGE_MAX_LENGTH {
            return Err(Error::Validation(format!(
                "message must be 1-{} characters",
                crate::defaults::MESSAGE_MAX_LENGTH
            )));
        }
        if self.recipients.is_empty() && self.role.is_none() {
            return Err(Error::Validation(
                "message.posted requires recipients or a role audience".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Delivery frames
// ============================================================================

/// Compact notification view pushed over live connections.
///
/// Clients de-duplicate on `event_id` across reconnects (delivery is
/// at-least-once); the durable row remains the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationFrame {
    pub notification_id: Uuid,
    pub event_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationFrame {
    fn from(n: &Notification) -> Self {
        Self {
            notification_id: n.id,
            event_id: n.event_id,
            kind: n.kind,
            title: n.title.clone(),
            message: n.message.clone(),
            data: n.data.clone(),
            created_at: n.created_at,
        }
    }
}

/// A frame delivered to a live connection (WebSocket or SSE).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum DeliveryFrame {
    /// Subscription acknowledgement, first frame on every connection.
    Connected { connection_id: Uuid },
    /// A freshly projected notification.
    Notification {
        #[serde(flatten)]
        notification: NotificationFrame,
    },
    /// Unread-badge refresh after a read-state mutation.
    UnreadCount { unread_count: i64 },
    /// Operational broadcast (e.g. server shutdown).
    System { message: String },
    /// Reply to a client-initiated application ping.
    Pong,
}

impl DeliveryFrame {
    /// Frame discriminator as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryFrame::Connected { .. } => "connected",
            DeliveryFrame::Notification { .. } => "notification",
            DeliveryFrame::UnreadCount { .. } => "unread_count",
            DeliveryFrame::System { .. } => "system",
            DeliveryFrame::Pong => "pong",
        }
    }
}
