use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crmdesk_core::domain::contact::NewContact;
use crmdesk_core::domain::lead::{LeadStatus, NewLead};
use crmdesk_core::domain::task::{NewTask, TaskPriority, TaskStatus};

use crate::repositories::RepositoryError;
use crate::store::RecordStore;

struct DemoContact {
    name: &'static str,
    email: &'static str,
    phone: Option<&'static str>,
    company: &'static str,
}

struct DemoLead {
    name: &'static str,
    email: &'static str,
    company: &'static str,
    status: LeadStatus,
    value_cents: Option<i64>,
    notes: Option<&'static str>,
}

struct DemoTask {
    title: &'static str,
    description: Option<&'static str>,
    status: TaskStatus,
    priority: TaskPriority,
    due_date: Option<(i32, u32, u32)>,
    /// Index into the created contacts.
    contact: Option<usize>,
    /// Index into the created leads.
    lead: Option<usize>,
}

const DEMO_CONTACTS: &[DemoContact] = &[
    DemoContact {
        name: "Ada Lovelace",
        email: "ada@analytical.example",
        phone: Some("+44 20 7946 0001"),
        company: "Analytical Engines",
    },
    DemoContact {
        name: "Grace Hopper",
        email: "grace@cobol.example",
        phone: None,
        company: "Compiler Works",
    },
    DemoContact {
        name: "Alan Turing",
        email: "alan@bletchley.example",
        phone: Some("+44 20 7946 0003"),
        company: "Bletchley Labs",
    },
];

const DEMO_LEADS: &[DemoLead] = &[
    DemoLead {
        name: "Katherine Johnson",
        email: "katherine@orbit.example",
        company: "Orbit Analytics",
        status: LeadStatus::New,
        value_cents: Some(1_250_000),
        notes: Some("Asked for a trajectory planning demo"),
    },
    DemoLead {
        name: "Edsger Dijkstra",
        email: "edsger@paths.example",
        company: "Shortest Paths BV",
        status: LeadStatus::Qualified,
        value_cents: Some(4_800_000),
        notes: None,
    },
    DemoLead {
        name: "Barbara Liskov",
        email: "barbara@clu.example",
        company: "Substitution Inc",
        status: LeadStatus::Contacted,
        value_cents: None,
        notes: Some("Follow up after the conference"),
    },
    DemoLead {
        name: "Donald Knuth",
        email: "don@tex.example",
        company: "Typesetting Co",
        status: LeadStatus::Lost,
        value_cents: Some(300_000),
        notes: Some("Prefers to write it himself"),
    },
];

const DEMO_TASKS: &[DemoTask] = &[
    DemoTask {
        title: "Send pricing to Katherine",
        description: Some("Include the annual plan discount"),
        status: TaskStatus::Todo,
        priority: TaskPriority::High,
        due_date: Some((2026, 11, 2)),
        contact: None,
        lead: Some(0),
    },
    DemoTask {
        title: "Schedule onboarding call",
        description: None,
        status: TaskStatus::InProgress,
        priority: TaskPriority::Medium,
        due_date: Some((2026, 11, 9)),
        contact: Some(0),
        lead: None,
    },
    DemoTask {
        title: "Archive lost opportunity notes",
        description: None,
        status: TaskStatus::Completed,
        priority: TaskPriority::Low,
        due_date: None,
        contact: None,
        lead: Some(3),
    },
];

/// Deterministic demo records, loaded through the store API.
pub struct DemoDataset;

impl DemoDataset {
    /// Load the demo records unless the store already holds contacts.
    pub async fn load(store: &RecordStore) -> Result<SeedResult, RepositoryError> {
        if !store.list_contacts().await?.is_empty() {
            info!(event_name = "store.seed.skipped", "store already holds records");
            return Ok(SeedResult { skipped: true, ..SeedResult::default() });
        }

        let mut contact_ids = Vec::with_capacity(DEMO_CONTACTS.len());
        for demo in DEMO_CONTACTS {
            let contact = store
                .create_contact(NewContact {
                    name: demo.name.to_string(),
                    email: demo.email.to_string(),
                    phone: demo.phone.map(str::to_string),
                    company: Some(demo.company.to_string()),
                })
                .await?;
            contact_ids.push(contact.id);
        }

        let mut lead_ids = Vec::with_capacity(DEMO_LEADS.len());
        for demo in DEMO_LEADS {
            let lead = store
                .create_lead(NewLead {
                    name: demo.name.to_string(),
                    email: demo.email.to_string(),
                    phone: None,
                    company: Some(demo.company.to_string()),
                    status: demo.status,
                    value: demo.value_cents.map(|cents| Decimal::new(cents, 2)),
                    notes: demo.notes.map(str::to_string),
                })
                .await?;
            lead_ids.push(lead.id);
        }

        let mut tasks = 0;
        for demo in DEMO_TASKS {
            store
                .create_task(NewTask {
                    title: demo.title.to_string(),
                    description: demo.description.map(str::to_string),
                    status: demo.status,
                    priority: demo.priority,
                    due_date: demo
                        .due_date
                        .and_then(|(year, month, day)| NaiveDate::from_ymd_opt(year, month, day)),
                    contact_id: demo.contact.and_then(|index| contact_ids.get(index).cloned()),
                    lead_id: demo.lead.and_then(|index| lead_ids.get(index).cloned()),
                })
                .await?;
            tasks += 1;
        }

        let result = SeedResult {
            skipped: false,
            contacts: contact_ids.len(),
            leads: lead_ids.len(),
            tasks,
        };
        info!(
            event_name = "store.seed.loaded",
            contacts = result.contacts,
            leads = result.leads,
            tasks = result.tasks,
            "demo records loaded"
        );
        Ok(result)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SeedResult {
    pub skipped: bool,
    pub contacts: usize,
    pub leads: usize,
    pub tasks: usize,
}

#[cfg(test)]
mod tests {
    use crmdesk_core::domain::lead::LeadStatus;

    use super::{DemoDataset, DEMO_CONTACTS, DEMO_LEADS, DEMO_TASKS};
    use crate::store::RecordStore;

    #[tokio::test]
    async fn load_seeds_every_collection_once() {
        let store = RecordStore::in_memory();

        let first = DemoDataset::load(&store).await.expect("seed");
        let second = DemoDataset::load(&store).await.expect("reseed");

        assert!(!first.skipped);
        assert_eq!(first.contacts, DEMO_CONTACTS.len());
        assert_eq!(first.leads, DEMO_LEADS.len());
        assert_eq!(first.tasks, DEMO_TASKS.len());
        assert!(second.skipped);
        assert_eq!(store.list_contacts().await.expect("list").len(), DEMO_CONTACTS.len());
    }

    #[tokio::test]
    async fn task_back_references_point_at_seeded_records() {
        let store = RecordStore::in_memory();
        DemoDataset::load(&store).await.expect("seed");

        let leads = store.list_leads().await.expect("leads");
        let tasks = store.list_tasks().await.expect("tasks");

        for task in tasks.iter().filter_map(|task| task.lead_id.as_ref()) {
            assert!(leads.iter().any(|lead| &lead.id == task));
        }
        assert!(leads.iter().any(|lead| lead.status == LeadStatus::Qualified));
    }
}
