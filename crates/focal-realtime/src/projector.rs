//! Event-to-notification projection.
//!
//! [`route_event`] is the routing table: a pure function from an event to
//! the notification drafts it fans out into, one per recipient. Role-wide
//! recipients become a single audience row (`recipient_user_id` NULL)
//! rather than a row per member, so routing never needs a user directory.
//! [`NotificationProjector`] materializes the drafts through the
//! deduplicating insert, which makes projection safe to replay.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use focal_core::{
    AppointmentPayload, Error, Event, EventType, EyewearPayload, FeedbackPayload,
    InsertedNotification, LowStockPayload, MessagePayload, NewNotification,
    NotificationRepository, PrescriptionPayload, Result, Role, SignupPayload,
};

/// Resolve an event into notification drafts.
///
/// Fails with [`Error::UnroutableEvent`] when the event type has no
/// routing entry, or when the payload does not parse into the type's
/// schema. Either way the stored event is untouched; it just notifies
/// nobody.
pub fn route_event(event: &Event) -> Result<Vec<NewNotification>> {
    match event.event_type {
        EventType::AppointmentCreated => route_appointment(event, "booked"),
        EventType::AppointmentUpdated => route_appointment(event, "updated"),
        EventType::AppointmentCancelled => route_appointment(event, "cancelled"),
        EventType::PrescriptionIssued => route_prescription_issued(event),
        EventType::PrescriptionExpiring => route_prescription_expiring(event),
        EventType::InventoryLowStock => route_low_stock(event),
        EventType::FeedbackSubmitted => route_feedback(event),
        EventType::UserSignup => route_signup(event),
        EventType::UserRoleRequest => route_role_request(event),
        EventType::EyewearAssessed => route_eyewear(event),
        EventType::MessagePosted => route_message(event),
        // Transfers are kept in the log for audit replay but notify nobody;
        // the legacy transfer notice had no resolvable recipient.
        EventType::TransferCompleted => Err(unroutable(event)),
    }
}

fn unroutable(event: &Event) -> Error {
    Error::UnroutableEvent {
        event_type: event.event_type.as_str().to_string(),
    }
}

fn parse_payload<T: DeserializeOwned>(event: &Event) -> Result<T> {
    serde_json::from_value(event.payload.clone()).map_err(|e| {
        warn!(
            subsystem = "projector",
            op = "payload.unparsed",
            event_id = event.id,
            event_type = event.event_type.as_str(),
            error_msg = %e,
            "Payload does not match the event type's schema"
        );
        unroutable(event)
    })
}

fn user_row(
    event: &Event,
    user_id: i64,
    role: Role,
    title: &str,
    message: String,
    data: Value,
) -> NewNotification {
    NewNotification {
        event_id: event.id,
        recipient_user_id: Some(user_id),
        recipient_role: role,
        branch_id: event.branch_id,
        kind: event.event_type.kind(),
        title: title.to_string(),
        message,
        data,
    }
}

fn role_row(
    event: &Event,
    role: Role,
    branch_id: Option<i64>,
    title: &str,
    message: String,
    data: Value,
) -> NewNotification {
    NewNotification {
        event_id: event.id,
        recipient_user_id: None,
        recipient_role: role,
        branch_id,
        kind: event.event_type.kind(),
        title: title.to_string(),
        message,
        data,
    }
}

/// Patient, assigned optometrist, and the branch's staff audience.
fn route_appointment(event: &Event, action: &str) -> Result<Vec<NewNotification>> {
    let payload: AppointmentPayload = parse_payload(event)?;

    let mut drafts = vec![user_row(
        event,
        payload.patient_id,
        Role::Customer,
        "Appointment Update",
        format!(
            "Your appointment for {} at {} has been {}",
            payload.date, payload.start_time, action
        ),
        json!({
            "appointment_id": payload.appointment_id,
            "date": payload.date,
            "start_time": payload.start_time,
        }),
    )];

    if let Some(optometrist_id) = payload.optometrist_id {
        drafts.push(user_row(
            event,
            optometrist_id,
            Role::Optometrist,
            "Appointment Update",
            format!(
                "You have a {} appointment with {} on {} at {}",
                action, payload.patient_name, payload.date, payload.start_time
            ),
            json!({
                "appointment_id": payload.appointment_id,
                "customer_name": payload.patient_name,
            }),
        ));
    }

    if event.branch_id.is_some() {
        drafts.push(role_row(
            event,
            Role::Staff,
            event.branch_id,
            "New Appointment in Your Branch",
            format!(
                "Customer {} has {} an appointment for {} at {}",
                payload.patient_name, action, payload.date, payload.start_time
            ),
            json!({
                "appointment_id": payload.appointment_id,
                "customer_name": payload.patient_name,
            }),
        ));
    }

    Ok(drafts)
}

/// Patient, plus the issuing branch's staff for pickup handling.
fn route_prescription_issued(event: &Event) -> Result<Vec<NewNotification>> {
    let payload: PrescriptionPayload = parse_payload(event)?;

    let mut drafts = vec![user_row(
        event,
        payload.patient_id,
        Role::Customer,
        "Prescription Update",
        "Your new prescription has been issued".to_string(),
        json!({
            "prescription_id": payload.prescription_id,
            "expiry_date": payload.expiry_date,
        }),
    )];

    if event.branch_id.is_some() {
        drafts.push(role_row(
            event,
            Role::Staff,
            event.branch_id,
            "Prescription Ready",
            format!("Prescription for {} is ready for pickup", payload.patient_name),
            json!({
                "prescription_id": payload.prescription_id,
                "customer_name": payload.patient_name,
            }),
        ));
    }

    Ok(drafts)
}

fn route_prescription_expiring(event: &Event) -> Result<Vec<NewNotification>> {
    let payload: PrescriptionPayload = parse_payload(event)?;

    let message = match &payload.expiry_date {
        Some(date) => format!("Your prescription expires on {}", date),
        None => "Your prescription is expiring soon".to_string(),
    };

    Ok(vec![user_row(
        event,
        payload.patient_id,
        Role::Customer,
        "Prescription Expiry Notice",
        message,
        json!({
            "prescription_id": payload.prescription_id,
            "expiry_date": payload.expiry_date,
        }),
    )])
}

/// Branch staff see their branch's alert; admins monitor stock across
/// branches, so their audience row is branch-less and names the branch
/// in `data` instead.
fn route_low_stock(event: &Event) -> Result<Vec<NewNotification>> {
    let payload: LowStockPayload = parse_payload(event)?;

    let message = format!("{}: {} left", payload.product, payload.available);
    let data = json!({
        "product": payload.product,
        "available": payload.available,
        "product_id": payload.product_id,
        "threshold": payload.threshold,
        "branch_id": event.branch_id,
    });

    let mut drafts = Vec::new();
    if event.branch_id.is_some() {
        drafts.push(role_row(
            event,
            Role::Staff,
            event.branch_id,
            "Low Stock Alert",
            message.clone(),
            data.clone(),
        ));
    }
    drafts.push(role_row(event, Role::Admin, None, "Low Stock Alert", message, data));

    Ok(drafts)
}

fn route_feedback(event: &Event) -> Result<Vec<NewNotification>> {
    let payload: FeedbackPayload = parse_payload(event)?;

    let message = match payload.rating {
        Some(rating) => format!("{} left feedback ({}/5)", payload.customer_name, rating),
        None => format!("{} left feedback", payload.customer_name),
    };

    let data = serde_json::to_value(&payload)?;
    Ok(vec![role_row(
        event,
        Role::Admin,
        None,
        "New Feedback",
        message,
        data,
    )])
}

fn route_signup(event: &Event) -> Result<Vec<NewNotification>> {
    let payload: SignupPayload = parse_payload(event)?;

    let message = match &payload.email {
        Some(email) => format!(
            "New user {} ({}) has requested {} access",
            payload.name, email, payload.requested_role
        ),
        None => format!(
            "New user {} has requested {} access",
            payload.name, payload.requested_role
        ),
    };

    let data = serde_json::to_value(&payload)?;
    Ok(vec![role_row(
        event,
        Role::Admin,
        None,
        "New User Signup",
        message,
        data,
    )])
}

fn route_role_request(event: &Event) -> Result<Vec<NewNotification>> {
    let payload: SignupPayload = parse_payload(event)?;

    let message = format!(
        "{} has requested {} access",
        payload.name, payload.requested_role
    );

    let data = serde_json::to_value(&payload)?;
    Ok(vec![role_row(
        event,
        Role::Admin,
        None,
        "Role Access Request",
        message,
        data,
    )])
}

fn route_eyewear(event: &Event) -> Result<Vec<NewNotification>> {
    let payload: EyewearPayload = parse_payload(event)?;

    let mut message = format!(
        "Your {} has been assessed as: {}",
        payload.eyewear_label,
        payload.condition.describe()
    );
    if let Some(notes) = &payload.notes {
        message.push_str(&format!("\n\nNotes: {}", notes));
    }
    if let Some(next_check) = &payload.next_check_date {
        message.push_str(&format!("\n\nNext recommended check: {}", next_check));
    }

    let priority = payload.condition.priority();
    let mut data = serde_json::to_value(&payload)?;
    data["priority"] = json!(priority);

    Ok(vec![user_row(
        event,
        payload.customer_id,
        Role::Customer,
        "Eyewear Condition Assessment",
        message,
        data,
    )])
}

/// Direct announcement: one row per explicit recipient, plus one
/// audience row when a role is addressed (branch from the envelope).
fn route_message(event: &Event) -> Result<Vec<NewNotification>> {
    let payload: MessagePayload = parse_payload(event)?;

    if let Err(e) = payload.validate() {
        warn!(
            subsystem = "projector",
            op = "payload.invalid",
            event_id = event.id,
            event_type = event.event_type.as_str(),
            error_msg = %e,
            "Announcement payload failed validation"
        );
        return Err(unroutable(event));
    }

    let data = match event.actor_user_id {
        Some(actor) => json!({ "sender_id": actor }),
        None => json!({}),
    };

    let mut drafts = Vec::new();
    for recipient in &payload.recipients {
        drafts.push(user_row(
            event,
            recipient.user_id,
            recipient.role,
            &payload.title,
            payload.message.clone(),
            data.clone(),
        ));
    }
    if let Some(role) = payload.role {
        drafts.push(role_row(
            event,
            role,
            event.branch_id,
            &payload.title,
            payload.message.clone(),
            data.clone(),
        ));
    }

    Ok(drafts)
}

/// Materializes routing drafts through the deduplicating insert.
pub struct NotificationProjector {
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationProjector {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    /// Project one event into durable notification rows.
    ///
    /// Replay-safe: rows that already exist come back with
    /// `created == false` instead of duplicating or erroring.
    pub async fn project(&self, event: &Event) -> Result<Vec<InsertedNotification>> {
        let drafts = route_event(event)?;

        let mut inserted = Vec::with_capacity(drafts.len());
        for draft in drafts {
            inserted.push(self.notifications.insert_unique(draft).await?);
        }

        let created = inserted.iter().filter(|i| i.created).count();
        debug!(
            subsystem = "projector",
            op = "project",
            event_id = event.id,
            event_type = event.event_type.as_str(),
            result_count = inserted.len(),
            created,
            "Event projected"
        );
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNotificationRepository;
    use chrono::Utc;
    use focal_core::NotificationKind;

    fn event(event_type: EventType, branch_id: Option<i64>, payload: Value) -> Event {
        Event {
            id: 42,
            event_type,
            occurred_at: Utc::now(),
            branch_id,
            actor_user_id: None,
            payload,
            created_at: Utc::now(),
        }
    }

    fn low_stock_event(branch_id: Option<i64>) -> Event {
        event(
            EventType::InventoryLowStock,
            branch_id,
            json!({"product": "Ray-Ban Aviator", "available": 2}),
        )
    }

    #[test]
    fn test_low_stock_routes_branch_staff_and_all_admins() {
        let drafts = route_event(&low_stock_event(Some(5))).unwrap();
        assert_eq!(drafts.len(), 2);

        let staff = &drafts[0];
        assert_eq!(staff.recipient_user_id, None);
        assert_eq!(staff.recipient_role, Role::Staff);
        assert_eq!(staff.branch_id, Some(5));
        assert_eq!(staff.kind, NotificationKind::Inventory);
        assert_eq!(staff.title, "Low Stock Alert");
        assert_eq!(staff.message, "Ray-Ban Aviator: 2 left");

        // The admin audience is branch-less; the branch rides in data.
        let admin = &drafts[1];
        assert_eq!(admin.recipient_role, Role::Admin);
        assert_eq!(admin.branch_id, None);
        assert_eq!(admin.data["branch_id"], json!(5));
    }

    #[test]
    fn test_low_stock_without_branch_still_reaches_admins() {
        let drafts = route_event(&low_stock_event(None)).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].recipient_role, Role::Admin);
    }

    #[test]
    fn test_appointment_fans_out_to_patient_optometrist_and_staff() {
        let drafts = route_event(&event(
            EventType::AppointmentCreated,
            Some(5),
            json!({
                "appointment_id": 301,
                "patient_id": 9,
                "patient_name": "Alice Reyes",
                "optometrist_id": 4,
                "date": "2026-03-01",
                "start_time": "10:00",
            }),
        ))
        .unwrap();
        assert_eq!(drafts.len(), 3);

        let patient = &drafts[0];
        assert_eq!(patient.recipient_user_id, Some(9));
        assert_eq!(patient.recipient_role, Role::Customer);
        assert_eq!(patient.title, "Appointment Update");
        assert_eq!(
            patient.message,
            "Your appointment for 2026-03-01 at 10:00 has been booked"
        );

        let optometrist = &drafts[1];
        assert_eq!(optometrist.recipient_user_id, Some(4));
        assert_eq!(
            optometrist.message,
            "You have a booked appointment with Alice Reyes on 2026-03-01 at 10:00"
        );

        let staff = &drafts[2];
        assert_eq!(staff.recipient_user_id, None);
        assert_eq!(staff.branch_id, Some(5));
        assert_eq!(staff.title, "New Appointment in Your Branch");
        assert_eq!(
            staff.message,
            "Customer Alice Reyes has booked an appointment for 2026-03-01 at 10:00"
        );
    }

    #[test]
    fn test_appointment_without_optometrist_or_branch() {
        let drafts = route_event(&event(
            EventType::AppointmentCancelled,
            None,
            json!({
                "appointment_id": 301,
                "patient_id": 9,
                "patient_name": "Alice Reyes",
                "date": "2026-03-01",
                "start_time": "10:00",
            }),
        ))
        .unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(
            drafts[0].message,
            "Your appointment for 2026-03-01 at 10:00 has been cancelled"
        );
    }

    #[test]
    fn test_prescription_issued_notifies_patient_and_branch_staff() {
        let drafts = route_event(&event(
            EventType::PrescriptionIssued,
            Some(5),
            json!({
                "prescription_id": 77,
                "patient_id": 9,
                "patient_name": "Alice Reyes",
                "expiry_date": "2027-03-01",
            }),
        ))
        .unwrap();

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].kind, NotificationKind::Prescription);
        assert_eq!(drafts[1].title, "Prescription Ready");
        assert_eq!(
            drafts[1].message,
            "Prescription for Alice Reyes is ready for pickup"
        );
    }

    #[test]
    fn test_prescription_expiring_goes_to_patient_only() {
        let drafts = route_event(&event(
            EventType::PrescriptionExpiring,
            None,
            json!({"prescription_id": 77, "patient_id": 9, "patient_name": "Alice Reyes",
                   "expiry_date": "2026-09-01"}),
        ))
        .unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].recipient_user_id, Some(9));
        assert_eq!(drafts[0].title, "Prescription Expiry Notice");
        assert_eq!(drafts[0].message, "Your prescription expires on 2026-09-01");
    }

    #[test]
    fn test_signup_wording_includes_email_when_present() {
        let drafts = route_event(&event(
            EventType::UserSignup,
            None,
            json!({"user_id": 31, "name": "Ben Cruz", "email": "ben@example.com",
                   "requested_role": "staff"}),
        ))
        .unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].recipient_role, Role::Admin);
        assert_eq!(drafts[0].title, "New User Signup");
        assert_eq!(
            drafts[0].message,
            "New user Ben Cruz (ben@example.com) has requested staff access"
        );

        let no_email = route_event(&event(
            EventType::UserSignup,
            None,
            json!({"user_id": 31, "name": "Ben Cruz", "requested_role": "staff"}),
        ))
        .unwrap();
        assert_eq!(
            no_email[0].message,
            "New user Ben Cruz has requested staff access"
        );
    }

    #[test]
    fn test_role_request_targets_admins() {
        let drafts = route_event(&event(
            EventType::UserRoleRequest,
            None,
            json!({"user_id": 31, "name": "Ben Cruz", "requested_role": "optometrist"}),
        ))
        .unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Role Access Request");
        assert_eq!(drafts[0].message, "Ben Cruz has requested optometrist access");
        assert_eq!(drafts[0].kind, NotificationKind::Account);
    }

    #[test]
    fn test_feedback_routes_to_admins_with_rating() {
        let drafts = route_event(&event(
            EventType::FeedbackSubmitted,
            Some(5),
            json!({"customer_name": "Alice Reyes", "rating": 4, "feedback_id": 12}),
        ))
        .unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].recipient_role, Role::Admin);
        assert_eq!(drafts[0].branch_id, None);
        assert_eq!(drafts[0].message, "Alice Reyes left feedback (4/5)");
    }

    #[test]
    fn test_eyewear_assessment_derives_priority_and_builds_message() {
        let drafts = route_event(&event(
            EventType::EyewearAssessed,
            Some(5),
            json!({
                "customer_id": 9,
                "eyewear_label": "Everyday frames",
                "condition": "needs_replacement",
                "notes": "Left hinge cracked",
                "next_check_date": "2026-09-15",
            }),
        ))
        .unwrap();

        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(draft.recipient_user_id, Some(9));
        assert_eq!(draft.title, "Eyewear Condition Assessment");
        assert_eq!(
            draft.message,
            "Your Everyday frames has been assessed as: needs replacement\n\n\
             Notes: Left hinge cracked\n\nNext recommended check: 2026-09-15"
        );
        assert_eq!(draft.data["priority"], json!("high"));
        assert_eq!(draft.kind, NotificationKind::Eyewear);
    }

    #[test]
    fn test_message_posted_creates_user_rows_and_role_row() {
        let mut e = event(
            EventType::MessagePosted,
            Some(5),
            json!({
                "title": "Maintenance window",
                "message": "Closing early on Friday",
                "recipients": [
                    {"user_id": 9, "role": "customer"},
                    {"user_id": 4, "role": "optometrist"},
                ],
                "role": "staff",
            }),
        );
        e.actor_user_id = Some(1);

        let drafts = route_event(&e).unwrap();
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].recipient_user_id, Some(9));
        assert_eq!(drafts[1].recipient_user_id, Some(4));

        let audience = &drafts[2];
        assert_eq!(audience.recipient_user_id, None);
        assert_eq!(audience.recipient_role, Role::Staff);
        assert_eq!(audience.branch_id, Some(5));
        assert_eq!(audience.title, "Maintenance window");
        assert_eq!(audience.data["sender_id"], json!(1));
    }

    #[test]
    fn test_message_posted_without_audience_is_unroutable() {
        let err = route_event(&event(
            EventType::MessagePosted,
            None,
            json!({"title": "Hello", "message": "No one to tell"}),
        ))
        .unwrap_err();

        assert!(matches!(err, Error::UnroutableEvent { .. }));
        assert!(err.is_non_fatal());
    }

    #[test]
    fn test_transfer_completed_has_no_routing_entry() {
        let err = route_event(&event(
            EventType::TransferCompleted,
            Some(5),
            json!({"transfer_id": 88}),
        ))
        .unwrap_err();

        match err {
            Error::UnroutableEvent { event_type } => {
                assert_eq!(event_type, "transfer.completed")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_is_unroutable() {
        let err = route_event(&event(
            EventType::InventoryLowStock,
            Some(5),
            json!({"available": 2}),
        ))
        .unwrap_err();

        assert!(matches!(err, Error::UnroutableEvent { .. }));
        assert!(err.is_non_fatal());
    }

    #[tokio::test]
    async fn test_project_is_idempotent_across_replays() {
        let repo = Arc::new(MemoryNotificationRepository::new());
        let projector = NotificationProjector::new(repo.clone());
        let e = low_stock_event(Some(5));

        let first = projector.project(&e).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|i| i.created));

        let replay = projector.project(&e).await.unwrap();
        assert_eq!(replay.len(), 2);
        assert!(replay.iter().all(|i| !i.created));
        assert_eq!(first[0].notification.id, replay[0].notification.id);
    }
}
