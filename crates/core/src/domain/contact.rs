use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{require_email, require_text, RecordId, Validate};
use crate::errors::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(with = "crate::domain::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new contact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

impl NewContact {
    pub fn into_contact(self, id: RecordId, created_at: DateTime<Utc>) -> Contact {
        Contact {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            created_at,
        }
    }
}

impl Validate for NewContact {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        require_email("email", &self.email)
    }
}
