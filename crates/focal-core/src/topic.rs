//! Routing topics for live delivery.
//!
//! Every connection subscribes to a fixed topic set derived from its
//! identity; every notification resolves to exactly one topic. Delivery
//! happens when the notification's topic is in the connection's set.
//! Topics only gate the live push; durable reads go through the stricter
//! visibility predicate on [`Notification`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Notification, Role, Subscription};

/// A routing key: `user:42`, `role:staff`, `branch:5`, or `system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// Private channel for a single user.
    User(i64),
    /// All connections authenticated with the given role, any branch.
    Role(Role),
    /// All connections pinned to the given branch, any role.
    Branch(i64),
    /// Every live connection (operational broadcasts).
    System,
}

impl Topic {
    pub fn as_string(&self) -> String {
        match self {
            Topic::User(id) => format!("user:{}", id),
            Topic::Role(role) => format!("role:{}", role.as_str()),
            Topic::Branch(id) => format!("branch:{}", id),
            Topic::System => "system".to_string(),
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl std::str::FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "system" {
            return Ok(Topic::System);
        }
        let (prefix, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::Validation(format!("malformed topic: {}", s)))?;
        match prefix {
            "user" => rest
                .parse::<i64>()
                .map(Topic::User)
                .map_err(|_| Error::Validation(format!("malformed user topic: {}", s))),
            "branch" => rest
                .parse::<i64>()
                .map(Topic::Branch)
                .map_err(|_| Error::Validation(format!("malformed branch topic: {}", s))),
            "role" => rest.parse::<Role>().map(Topic::Role),
            _ => Err(Error::Validation(format!("malformed topic: {}", s))),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The topic set a connection listens on.
///
/// Always `user:{user_id}`, `role:{role}`, and `system`; plus
/// `branch:{branch_id}` when the identity carries a branch.
pub fn topics_for(subscription: &Subscription) -> BTreeSet<Topic> {
    let mut topics = BTreeSet::from([
        Topic::User(subscription.user_id),
        Topic::Role(subscription.role),
        Topic::System,
    ]);
    if let Some(branch_id) = subscription.branch_id {
        topics.insert(Topic::Branch(branch_id));
    }
    topics
}

impl Notification {
    /// The single topic this row is pushed on.
    ///
    /// Precedence: a user-addressed row goes to the private channel; a
    /// branch-scoped audience row goes to the branch channel; a global
    /// audience row goes to the role channel. Branch channels fan out to
    /// every role at that branch, which mirrors how branch rooms behaved
    /// in the clinic frontends; the durable list endpoint still applies
    /// [`Notification::visible_to`].
    pub fn topic_scope(&self) -> Topic {
        match (self.recipient_user_id, self.branch_id) {
            (Some(user_id), _) => Topic::User(user_id),
            (None, Some(branch_id)) => Topic::Branch(branch_id),
            (None, None) => Topic::Role(self.recipient_role),
        }
    }
}
