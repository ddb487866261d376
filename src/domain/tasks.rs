//! Validated task inputs for the write path.

use uuid::Uuid;

use super::entities::TaskRecord;
use super::error::DomainError;
use super::types::TaskStatus;

/// Fields of a task about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub assignee: Option<String>,
    pub comments: String,
}

impl NewTask {
    /// Validate raw input, applying the defaults for omitted fields.
    pub fn new(
        title: String,
        description: String,
        status: Option<TaskStatus>,
        assignee: Option<String>,
        comments: Option<String>,
    ) -> Result<Self, DomainError> {
        let title = required_text(title, "title")?;
        let description = required_text(description, "description")?;
        let comments = match comments {
            Some(value) => required_text(value, "comments")?,
            None => String::new(),
        };

        Ok(Self {
            title,
            description,
            status: status.unwrap_or_default(),
            assignee: assignee.and_then(normalize_optional),
            comments,
        })
    }

    pub fn into_record(self, id: Uuid) -> TaskRecord {
        TaskRecord {
            id,
            title: self.title,
            description: self.description,
            status: self.status,
            assignee: self.assignee,
            comments: self.comments,
        }
    }
}

/// A partial update. `None` leaves the stored column untouched; for
/// `assignee`, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<Option<String>>,
    pub comments: Option<String>,
}

impl TaskChanges {
    pub fn new(
        title: Option<String>,
        description: Option<String>,
        status: Option<TaskStatus>,
        assignee: Option<Option<String>>,
        comments: Option<String>,
    ) -> Result<Self, DomainError> {
        let changes = Self {
            title: title.map(|v| required_text(v, "title")).transpose()?,
            description: description
                .map(|v| required_text(v, "description"))
                .transpose()?,
            status,
            assignee: assignee.map(|v| v.and_then(normalize_optional)),
            comments: comments
                .map(|v| required_text(v, "comments"))
                .transpose()?,
        };

        if changes.is_empty() {
            return Err(DomainError::validation("no fields to update"));
        }

        Ok(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.assignee.is_none()
            && self.comments.is_none()
    }

    /// Apply the changes to an in-memory record.
    pub fn apply_to(&self, task: &mut TaskRecord) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = assignee.clone();
        }
        if let Some(comments) = &self.comments {
            task.comments = comments.clone();
        }
    }
}

fn required_text(value: String, field: &'static str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
