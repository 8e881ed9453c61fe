use serde::Serialize;
use std::collections::HashMap;

use crate::error::ApiResult;
use crate::store::LeadStore;
use crate::types::{Lead, Status};

#[derive(Debug, Serialize, PartialEq, Eq, Default)]
pub struct StatusBreakdown {
    #[serde(rename = "New")]
    pub new: usize,
    #[serde(rename = "Contacted")]
    pub contacted: usize,
    #[serde(rename = "Meeting Scheduled")]
    pub meeting_scheduled: usize,
    #[serde(rename = "Under Negotiation")]
    pub under_negotiation: usize,
    #[serde(rename = "Won")]
    pub won: usize,
    #[serde(rename = "Lost")]
    pub lost: usize,
}

/// Public dashboard counters.
#[derive(Debug, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: usize,
    pub pending: usize,
    pub meetings: usize,
    /// Any status whose label mentions "Negotiation".
    pub negotiating: usize,
    pub won: usize,
    pub lost: usize,
    pub contacted: usize,
    pub by_status: StatusBreakdown,
}

pub fn summarize(leads: &[Lead]) -> DashboardStats {
    let mut counts: HashMap<Status, usize> = HashMap::new();
    for lead in leads {
        *counts.entry(lead.status).or_default() += 1;
    }
    let count = |status: Status| counts.get(&status).copied().unwrap_or_default();

    let negotiating = leads
        .iter()
        .filter(|lead| lead.status.as_str().contains("Negotiation"))
        .count();

    DashboardStats {
        total: leads.len(),
        pending: count(Status::New),
        meetings: count(Status::MeetingScheduled),
        negotiating,
        won: count(Status::Won),
        lost: count(Status::Lost),
        contacted: count(Status::Contacted),
        by_status: StatusBreakdown {
            new: count(Status::New),
            contacted: count(Status::Contacted),
            meeting_scheduled: count(Status::MeetingScheduled),
            under_negotiation: count(Status::UnderNegotiation),
            won: count(Status::Won),
            lost: count(Status::Lost),
        },
    }
}

/// Counters over every lead in the store. Full scan.
pub async fn dashboard_stats(store: &dyn LeadStore) -> ApiResult<DashboardStats> {
    let leads = store.list_all().await?;
    Ok(summarize(&leads))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLeadStore;
    use crate::types::District;
    use chrono::Utc;

    fn lead_with(id: usize, status: Status) -> Lead {
        let now = Utc::now();
        Lead {
            lead_id: format!("l{}", id),
            owner_user_id: "u1".to_string(),
            business: "Acme".to_string(),
            contact: "555".to_string(),
            status,
            location: "Kochi".to_string(),
            district: District::Ernakulam,
            logs: vec![],
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn counts_each_bucket() {
        let statuses = [
            Status::New,
            Status::New,
            Status::Contacted,
            Status::MeetingScheduled,
            Status::UnderNegotiation,
            Status::Won,
            Status::Lost,
            Status::Forwarded,
        ];
        let leads: Vec<Lead> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| lead_with(i, *s))
            .collect();

        let stats = summarize(&leads);
        assert_eq!(stats.total, 8);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.contacted, 1);
        assert_eq!(stats.meetings, 1);
        assert_eq!(stats.negotiating, 1);
        assert_eq!(stats.won, 1);
        assert_eq!(stats.lost, 1);
        assert_eq!(stats.by_status.new, 2);
    }

    #[test]
    fn negotiating_matches_label_substring() {
        let leads: Vec<Lead> = Status::ALL
            .iter()
            .enumerate()
            .map(|(i, s)| lead_with(i, *s))
            .collect();
        let expected = Status::ALL
            .iter()
            .filter(|s| s.as_str().contains("Negotiation"))
            .count();
        assert_eq!(summarize(&leads).negotiating, expected);
    }

    #[test]
    fn serializes_with_client_keys() {
        let value = serde_json::to_value(summarize(&[lead_with(0, Status::MeetingScheduled)])).unwrap();
        assert_eq!(value["byStatus"]["Meeting Scheduled"], 1);
        assert_eq!(value["meetings"], 1);
        assert!(value["byStatus"].get("Quote Issued").is_none());
    }

    #[tokio::test]
    async fn empty_store_is_all_zero() {
        let store = InMemoryLeadStore::new();
        assert_eq!(dashboard_stats(&store).await.unwrap(), DashboardStats::default());
    }
}
