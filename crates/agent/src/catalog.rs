use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crmdesk_core::domain::contact::NewContact;
use crmdesk_core::domain::lead::{LeadPatch, LeadStatus, NewLead};
use crmdesk_core::domain::task::{NewTask, TaskPatch, TaskPriority, TaskStatus};
use crmdesk_core::domain::{filter_by_status, parse_validated, Collection, RecordId, Validate};
use crmdesk_core::errors::ValidationError;
use crmdesk_core::update::{resolve_patch, PartialUpdate, ResolvedUpdate};
use crmdesk_db::{RecordStore, RepositoryError};

use crate::llm::OperationSpec;

/// Fields `update_lead` may change. Identity and contact details stay as created; other keys
/// in the bundle are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateLeadArgs {
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<UpdateLeadArgs> for LeadPatch {
    fn from(args: UpdateLeadArgs) -> Self {
        LeadPatch { status: args.status, value: args.value, notes: args.notes, ..Self::default() }
    }
}

/// Fields `update_task` may change. Title and back-references stay as created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateTaskArgs {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<UpdateTaskArgs> for TaskPatch {
    fn from(args: UpdateTaskArgs) -> Self {
        TaskPatch {
            status: args.status,
            priority: args.priority,
            due_date: args.due_date,
            description: args.description,
            ..Self::default()
        }
    }
}

// Field checks run on the patch each one converts into.
impl Validate for UpdateLeadArgs {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Validate for UpdateTaskArgs {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ListContacts,
    CreateContact,
    ListLeads,
    CreateLead,
    UpdateLead,
    ListTasks,
    CreateTask,
    UpdateTask,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        Self::ListContacts,
        Self::CreateContact,
        Self::ListLeads,
        Self::CreateLead,
        Self::UpdateLead,
        Self::ListTasks,
        Self::CreateTask,
        Self::UpdateTask,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListContacts => "list_contacts",
            Self::CreateContact => "create_contact",
            Self::ListLeads => "list_leads",
            Self::CreateLead => "create_lead",
            Self::UpdateLead => "update_lead",
            Self::ListTasks => "list_tasks",
            Self::CreateTask => "create_task",
            Self::UpdateTask => "update_task",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn collection(&self) -> Collection {
        match self {
            Self::ListContacts | Self::CreateContact => Collection::Contacts,
            Self::ListLeads | Self::CreateLead | Self::UpdateLead => Collection::Leads,
            Self::ListTasks | Self::CreateTask | Self::UpdateTask => Collection::Tasks,
        }
    }

    pub fn mutates(&self) -> bool {
        !matches!(self, Self::ListContacts | Self::ListLeads | Self::ListTasks)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ListContacts => "Get all contacts from the CRM, newest first.",
            Self::CreateContact => "Create a new contact.",
            Self::ListLeads => "Get leads from the CRM, optionally filtered by status.",
            Self::CreateLead => "Create a new lead.",
            Self::UpdateLead => "Update an existing lead. Only the supplied fields change.",
            Self::ListTasks => "Get tasks from the CRM, optionally filtered by status.",
            Self::CreateTask => "Create a new task.",
            Self::UpdateTask => "Update an existing task. Only the supplied fields change.",
        }
    }

    pub fn input_schema(&self) -> Value {
        let lead_statuses: Vec<&str> = LeadStatus::ALL.iter().map(|s| s.as_str()).collect();
        let task_statuses: Vec<&str> = TaskStatus::ALL.iter().map(|s| s.as_str()).collect();
        let priorities = ["low", "medium", "high"];

        match self {
            Self::ListContacts => json!({ "type": "object", "properties": {} }),
            Self::CreateContact => json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Contact name" },
                    "email": { "type": "string", "description": "Contact email" },
                    "phone": { "type": "string", "description": "Contact phone number" },
                    "company": { "type": "string", "description": "Company name" }
                },
                "required": ["name", "email"]
            }),
            Self::ListLeads => json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": lead_statuses,
                        "description": "Only return leads with this status"
                    }
                }
            }),
            Self::CreateLead => json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Lead name" },
                    "email": { "type": "string", "description": "Lead email" },
                    "phone": { "type": "string", "description": "Lead phone number" },
                    "company": { "type": "string", "description": "Company name" },
                    "status": { "type": "string", "enum": lead_statuses, "default": "new" },
                    "value": { "type": "number", "minimum": 0, "description": "Deal value" },
                    "notes": { "type": "string", "description": "Additional notes" }
                },
                "required": ["name", "email"]
            }),
            Self::UpdateLead => json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Lead ID" },
                    "status": { "type": "string", "enum": lead_statuses },
                    "value": { "type": "number", "minimum": 0, "description": "Deal value" },
                    "notes": { "type": "string", "description": "Additional notes" }
                },
                "required": ["id"]
            }),
            Self::ListTasks => json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": task_statuses,
                        "description": "Only return tasks with this status"
                    }
                }
            }),
            Self::CreateTask => json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Task title" },
                    "description": { "type": "string", "description": "Task description" },
                    "status": { "type": "string", "enum": task_statuses, "default": "todo" },
                    "priority": { "type": "string", "enum": priorities, "default": "medium" },
                    "due_date": { "type": "string", "description": "Due date (YYYY-MM-DD)" },
                    "contact_id": { "type": "string", "description": "Related contact ID" },
                    "lead_id": { "type": "string", "description": "Related lead ID" }
                },
                "required": ["title"]
            }),
            Self::UpdateTask => json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string", "description": "Task ID" },
                    "status": { "type": "string", "enum": task_statuses },
                    "priority": { "type": "string", "enum": priorities },
                    "due_date": { "type": "string", "description": "Due date (YYYY-MM-DD)" },
                    "description": { "type": "string", "description": "Task description" }
                },
                "required": ["id"]
            }),
        }
    }

    pub fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: self.name(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

/// A validated operation invocation, ready to execute.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    ListContacts,
    CreateContact(NewContact),
    ListLeads { status: Option<LeadStatus> },
    CreateLead(NewLead),
    UpdateLead(ResolvedUpdate<LeadPatch>),
    ListTasks { status: Option<TaskStatus> },
    CreateTask(NewTask),
    UpdateTask(ResolvedUpdate<TaskPatch>),
}

#[derive(Deserialize)]
struct StatusFilter<S> {
    #[serde(default = "Option::default")]
    status: Option<S>,
}

impl<S> Validate for StatusFilter<S> {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Operation {
    /// Validating parse of a named invocation. Nothing here touches the store.
    pub fn parse(name: &str, arguments: Value) -> Result<Self, ValidationError> {
        let kind = OperationKind::from_name(name)
            .ok_or_else(|| ValidationError::UnknownOperation(name.to_string()))?;

        let operation = match kind {
            OperationKind::ListContacts => {
                require_object(&arguments)?;
                Self::ListContacts
            }
            OperationKind::CreateContact => Self::CreateContact(parse_validated(arguments)?),
            OperationKind::ListLeads => {
                Self::ListLeads { status: status_filter::<LeadStatus>(arguments)? }
            }
            OperationKind::CreateLead => Self::CreateLead(parse_validated(arguments)?),
            OperationKind::UpdateLead => {
                Self::UpdateLead(routed_update::<UpdateLeadArgs, _>(arguments)?)
            }
            OperationKind::ListTasks => {
                Self::ListTasks { status: status_filter::<TaskStatus>(arguments)? }
            }
            OperationKind::CreateTask => Self::CreateTask(parse_validated(arguments)?),
            OperationKind::UpdateTask => {
                Self::UpdateTask(routed_update::<UpdateTaskArgs, _>(arguments)?)
            }
        };
        Ok(operation)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::ListContacts => OperationKind::ListContacts,
            Self::CreateContact(_) => OperationKind::CreateContact,
            Self::ListLeads { .. } => OperationKind::ListLeads,
            Self::CreateLead(_) => OperationKind::CreateLead,
            Self::UpdateLead(_) => OperationKind::UpdateLead,
            Self::ListTasks { .. } => OperationKind::ListTasks,
            Self::CreateTask(_) => OperationKind::CreateTask,
            Self::UpdateTask(_) => OperationKind::UpdateTask,
        }
    }

    /// True when executing this writes to the store. An update with no fields writes nothing.
    pub fn changes_records(&self) -> bool {
        match self {
            Self::CreateContact(_) | Self::CreateLead(_) | Self::CreateTask(_) => true,
            Self::UpdateLead(update) => !update.patch.is_empty(),
            Self::UpdateTask(update) => !update.patch.is_empty(),
            Self::ListContacts | Self::ListLeads { .. } | Self::ListTasks { .. } => false,
        }
    }
}

fn require_object(arguments: &Value) -> Result<(), ValidationError> {
    match arguments {
        Value::Null | Value::Object(_) => Ok(()),
        _ => Err(ValidationError::NotAnObject),
    }
}

fn status_filter<S>(arguments: Value) -> Result<Option<S>, ValidationError>
where
    S: DeserializeOwned,
{
    Ok(parse_validated::<StatusFilter<S>>(arguments)?.status)
}

/// Read the routing key out of an update bundle, decode the rest as `A` and widen it into `P`.
fn routed_update<A, P>(arguments: Value) -> Result<ResolvedUpdate<P>, ValidationError>
where
    A: DeserializeOwned + Validate + Into<P>,
    P: Validate,
{
    require_object(&arguments)?;
    let id = match arguments.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => RecordId(id.clone()),
        Some(Value::String(_)) => return Err(ValidationError::field("id", "must not be blank")),
        Some(_) => return Err(ValidationError::field("id", "must be a string")),
        None => return Err(ValidationError::field("id", "is required")),
    };
    let ResolvedUpdate { id, patch } = resolve_patch::<A>(id, arguments)?;
    let patch: P = patch.into();
    patch.validate()?;
    Ok(ResolvedUpdate::new(id, patch))
}

/// Successful execution: the payload the model reads and a one-line summary.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationOutcome {
    pub kind: OperationKind,
    pub payload: Value,
    pub summary: String,
    changed: bool,
}

impl OperationOutcome {
    fn new(kind: OperationKind, key: &str, records: Value, summary: String) -> Self {
        let payload = json!({ key: records, "message": summary });
        Self { kind, payload, summary, changed: kind.mutates() }
    }

    /// Whether the execution wrote to the store.
    pub fn mutated(&self) -> bool {
        self.changed
    }
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{collection} record `{id}` was not found")]
    NotFound { collection: Collection, id: String },
    #[error("record store unavailable: {0}")]
    Store(RepositoryError),
}

impl OperationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Store(_) => "store_unavailable",
        }
    }

    /// Validation and lookup failures go back to the model; store failures end the request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    pub fn payload(&self) -> Value {
        json!({ "error": self.kind(), "message": self.to_string() })
    }
}

impl From<RepositoryError> for OperationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { collection, id } => Self::NotFound { collection, id },
            other => Self::Store(other),
        }
    }
}

/// The fixed operation set, bound to one record store.
#[derive(Clone)]
pub struct OperationCatalog {
    store: RecordStore,
}

impl OperationCatalog {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn specs(&self) -> Vec<OperationSpec> {
        OperationKind::ALL.iter().map(OperationKind::spec).collect()
    }

    /// Parse then execute a named invocation.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<OperationOutcome, OperationError> {
        let operation = Operation::parse(name, arguments).map_err(|error| {
            debug!(
                event_name = "agent.operation.rejected",
                operation = name,
                error = %error,
                "operation arguments failed validation"
            );
            error
        })?;
        self.execute(operation).await
    }

    pub async fn execute(&self, operation: Operation) -> Result<OperationOutcome, OperationError> {
        let kind = operation.kind();
        let result = self.dispatch(operation).await;
        if let Err(OperationError::Store(error)) = &result {
            warn!(
                event_name = "agent.operation.store_failed",
                operation = kind.name(),
                error = %error,
                "record store failed during operation"
            );
        }
        result
    }

    async fn dispatch(&self, operation: Operation) -> Result<OperationOutcome, OperationError> {
        let kind = operation.kind();
        let changed = operation.changes_records();
        let mut outcome = match operation {
            Operation::ListContacts => {
                let contacts = self.store.list_contacts().await?;
                let summary = format!("Found {} contacts", contacts.len());
                OperationOutcome::new(kind, "contacts", to_value(&contacts)?, summary)
            }
            Operation::CreateContact(new) => {
                let contact = self.store.create_contact(new).await?;
                let summary = format!("Created contact: {}", contact.name);
                OperationOutcome::new(kind, "contact", to_value(&contact)?, summary)
            }
            Operation::ListLeads { status } => {
                let leads = filter_by_status(self.store.list_leads().await?, status);
                let summary = found_summary(leads.len(), "leads", status.map(|s| s.as_str()));
                OperationOutcome::new(kind, "leads", to_value(&leads)?, summary)
            }
            Operation::CreateLead(new) => {
                let lead = self.store.create_lead(new).await?;
                let summary = format!("Created lead: {}", lead.name);
                OperationOutcome::new(kind, "lead", to_value(&lead)?, summary)
            }
            Operation::UpdateLead(update) => {
                let lead = self.store.update_lead(update).await?;
                let summary = format!("Updated lead: {}", lead.name);
                OperationOutcome::new(kind, "lead", to_value(&lead)?, summary)
            }
            Operation::ListTasks { status } => {
                let tasks = filter_by_status(self.store.list_tasks().await?, status);
                let summary = found_summary(tasks.len(), "tasks", status.map(|s| s.as_str()));
                OperationOutcome::new(kind, "tasks", to_value(&tasks)?, summary)
            }
            Operation::CreateTask(new) => {
                let task = self.store.create_task(new).await?;
                let summary = format!("Created task: {}", task.title);
                OperationOutcome::new(kind, "task", to_value(&task)?, summary)
            }
            Operation::UpdateTask(update) => {
                let task = self.store.update_task(update).await?;
                let summary = format!("Updated task: {}", task.title);
                OperationOutcome::new(kind, "task", to_value(&task)?, summary)
            }
        };
        outcome.changed = changed;
        Ok(outcome)
    }
}

fn found_summary(count: usize, noun: &str, status: Option<&str>) -> String {
    match status {
        Some(status) => format!("Found {count} {noun} with status: {status}"),
        None => format!("Found {count} {noun}"),
    }
}

fn to_value<T: serde::Serialize>(records: &T) -> Result<Value, OperationError> {
    serde_json::to_value(records)
        .map_err(|error| OperationError::Store(RepositoryError::Decode(error.to_string())))
}
