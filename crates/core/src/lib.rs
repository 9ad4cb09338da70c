pub mod config;
pub mod domain;
pub mod errors;
pub mod update;

pub use domain::contact::{Contact, NewContact};
pub use domain::lead::{Lead, LeadField, LeadPatch, LeadStatus, NewLead};
pub use domain::task::{NewTask, Task, TaskField, TaskPatch, TaskPriority, TaskStatus};
pub use domain::{Collection, RecordId};
pub use errors::{ApplicationError, DomainError, InterfaceError, ValidationError};
pub use update::{PartialUpdate, ResolvedUpdate};
