use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{require_email, require_text, RecordId, StatusTracked, Validate};
use crate::errors::ValidationError;
use crate::update::{Assignment, FieldColumn, PartialUpdate};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Qualified,
    Contacted,
    Converted,
    Lost,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] =
        [Self::New, Self::Qualified, Self::Contacted, Self::Converted, Self::Lost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Qualified => "qualified",
            Self::Contacted => "contacted",
            Self::Converted => "converted",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|status| status.as_str() == value).ok_or_else(|| {
            ValidationError::field(
                "status",
                format!("`{value}` is not one of new|qualified|contacted|converted|lost"),
            )
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub status: LeadStatus,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "crate::domain::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl StatusTracked for Lead {
    type Status = LeadStatus;

    fn status(&self) -> LeadStatus {
        self.status
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewLead {
    pub fn into_lead(self, id: RecordId, created_at: DateTime<Utc>) -> Lead {
        Lead {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            status: self.status,
            value: self.value,
            notes: self.notes,
            created_at,
        }
    }
}

impl Validate for NewLead {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        require_email("email", &self.email)?;
        require_non_negative(self.value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeadField {
    Name,
    Email,
    Phone,
    Company,
    Status,
    Value,
    Notes,
}

impl FieldColumn for LeadField {
    fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Company => "company",
            Self::Status => "status",
            Self::Value => "value",
            Self::Notes => "notes",
        }
    }
}

/// Fields of a lead that an update may change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Validate for LeadPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(email) = &self.email {
            require_email("email", email)?;
        }
        require_non_negative(self.value)
    }
}

impl PartialUpdate for LeadPatch {
    type Field = LeadField;
    type Record = Lead;

    fn assignments(&self) -> Vec<Assignment<LeadField>> {
        let mut assignments = Vec::new();
        if let Some(name) = &self.name {
            assignments.push(Assignment::new(LeadField::Name, name.as_str()));
        }
        if let Some(email) = &self.email {
            assignments.push(Assignment::new(LeadField::Email, email.as_str()));
        }
        if let Some(phone) = &self.phone {
            assignments.push(Assignment::new(LeadField::Phone, phone.as_str()));
        }
        if let Some(company) = &self.company {
            assignments.push(Assignment::new(LeadField::Company, company.as_str()));
        }
        if let Some(status) = self.status {
            assignments.push(Assignment::new(LeadField::Status, status.as_str()));
        }
        if let Some(value) = self.value {
            assignments.push(Assignment::new(LeadField::Value, value.to_string()));
        }
        if let Some(notes) = &self.notes {
            assignments.push(Assignment::new(LeadField::Notes, notes.as_str()));
        }
        assignments
    }

    fn apply_to(&self, lead: &mut Lead) {
        if let Some(name) = &self.name {
            lead.name = name.clone();
        }
        if let Some(email) = &self.email {
            lead.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            lead.phone = Some(phone.clone());
        }
        if let Some(company) = &self.company {
            lead.company = Some(company.clone());
        }
        if let Some(status) = self.status {
            lead.status = status;
        }
        if let Some(value) = self.value {
            lead.value = Some(value);
        }
        if let Some(notes) = &self.notes {
            lead.notes = Some(notes.clone());
        }
    }
}

fn require_non_negative(value: Option<Decimal>) -> Result<(), ValidationError> {
    match value {
        Some(amount) if amount.is_sign_negative() && !amount.is_zero() => {
            Err(ValidationError::field("value", "must not be negative"))
        }
        _ => Ok(()),
    }
}
