use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{require_text, RecordId, StatusTracked, Validate};
use crate::errors::ValidationError;
use crate::update::{Assignment, FieldColumn, PartialUpdate};

pub const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Todo, Self::InProgress, Self::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|status| status.as_str() == value).ok_or_else(|| {
            ValidationError::field(
                "status",
                format!("`{value}` is not one of todo|in_progress|completed"),
            )
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|priority| priority.as_str() == value).ok_or_else(|| {
            ValidationError::field("priority", format!("`{value}` is not one of low|medium|high"))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Weak reference: not checked against the contacts collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<RecordId>,
    /// Weak reference: not checked against the leads collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<RecordId>,
    #[serde(with = "crate::domain::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl StatusTracked for Task {
    type Status = TaskStatus;

    fn status(&self) -> TaskStatus {
        self.status
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub contact_id: Option<RecordId>,
    #[serde(default)]
    pub lead_id: Option<RecordId>,
}

impl NewTask {
    pub fn into_task(self, id: RecordId, created_at: DateTime<Utc>) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            due_date: self.due_date,
            contact_id: self.contact_id,
            lead_id: self.lead_id,
            created_at,
        }
    }
}

impl Validate for NewTask {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskField {
    Title,
    Description,
    Status,
    Priority,
    DueDate,
    ContactId,
    LeadId,
}

impl FieldColumn for TaskField {
    fn column(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Status => "status",
            Self::Priority => "priority",
            Self::DueDate => "due_date",
            Self::ContactId => "contact_id",
            Self::LeadId => "lead_id",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<RecordId>,
}

impl Validate for TaskPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        Ok(())
    }
}

impl PartialUpdate for TaskPatch {
    type Field = TaskField;
    type Record = Task;

    fn assignments(&self) -> Vec<Assignment<TaskField>> {
        let mut assignments = Vec::new();
        if let Some(title) = &self.title {
            assignments.push(Assignment::new(TaskField::Title, title.as_str()));
        }
        if let Some(description) = &self.description {
            assignments.push(Assignment::new(TaskField::Description, description.as_str()));
        }
        if let Some(status) = self.status {
            assignments.push(Assignment::new(TaskField::Status, status.as_str()));
        }
        if let Some(priority) = self.priority {
            assignments.push(Assignment::new(TaskField::Priority, priority.as_str()));
        }
        if let Some(due_date) = self.due_date {
            assignments.push(Assignment::new(
                TaskField::DueDate,
                due_date.format(DUE_DATE_FORMAT).to_string(),
            ));
        }
        if let Some(contact_id) = &self.contact_id {
            assignments.push(Assignment::new(TaskField::ContactId, contact_id.as_str()));
        }
        if let Some(lead_id) = &self.lead_id {
            assignments.push(Assignment::new(TaskField::LeadId, lead_id.as_str()));
        }
        assignments
    }

    fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(contact_id) = &self.contact_id {
            task.contact_id = Some(contact_id.clone());
        }
        if let Some(lead_id) = &self.lead_id {
            task.lead_id = Some(lead_id.clone());
        }
    }
}
