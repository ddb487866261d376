//! Change events emitted by the task write path.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::TaskRecord;

/// One task mutation, as carried over the pub/sub channel and re-emitted to
/// live listeners.
///
/// The JSON form is `{"action":"created","task":{..}}`,
/// `{"action":"updated","task":{..}}` or `{"action":"deleted","taskId":".."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChangeEvent {
    Created {
        task: TaskRecord,
    },
    Updated {
        task: TaskRecord,
    },
    Deleted {
        #[serde(rename = "taskId")]
        task_id: Uuid,
    },
}

impl ChangeEvent {
    pub fn action(&self) -> &'static str {
        match self {
            ChangeEvent::Created { .. } => "created",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Deleted { .. } => "deleted",
        }
    }

    pub fn task_id(&self) -> Uuid {
        match self {
            ChangeEvent::Created { task } | ChangeEvent::Updated { task } => task.id,
            ChangeEvent::Deleted { task_id } => *task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::types::TaskStatus;

    fn sample_task() -> TaskRecord {
        TaskRecord {
            id: Uuid::nil(),
            title: "x".to_string(),
            description: "y".to_string(),
            status: TaskStatus::Pending,
            assignee: None,
            comments: String::new(),
        }
    }

    #[test]
    fn created_event_carries_full_task() {
        let event = ChangeEvent::Created {
            task: sample_task(),
        };
        let value = serde_json::to_value(&event).expect("serialize");

        assert_eq!(value["action"], "created");
        assert_eq!(value["task"]["status"], "pending");
        assert_eq!(value["task"]["assignee"], serde_json::Value::Null);
    }

    #[test]
    fn deleted_event_uses_camel_case_task_id() {
        let id = Uuid::new_v4();
        let value = serde_json::to_value(ChangeEvent::Deleted { task_id: id }).expect("serialize");

        assert_eq!(value, json!({ "action": "deleted", "taskId": id.to_string() }));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let payload = json!({ "action": "archived", "taskId": Uuid::nil() }).to_string();
        assert!(serde_json::from_str::<ChangeEvent>(&payload).is_err());
    }

    #[test]
    fn missing_payload_is_rejected() {
        let payload = json!({ "action": "updated" }).to_string();
        assert!(serde_json::from_str::<ChangeEvent>(&payload).is_err());
    }
}
