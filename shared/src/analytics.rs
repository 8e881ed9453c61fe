//! Admin-only aggregate views over every lead.
//!
//! Both views scan the whole lead set. The activity feed in particular
//! flattens every embedded log on every call and has no cursor, which is
//! fine for a single sales team but will not scale to large tables.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::auth::{require_admin, Caller};
use crate::error::ApiResult;
use crate::store::{LeadStore, UserStore};
use crate::types::{District, Lead, Status};

pub const TOP_DISTRICTS: usize = 10;
pub const RECENT_LEADS: usize = 10;
pub const ACTIVITY_FEED_LIMIT: usize = 100;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GroupCount<K> {
    #[serde(rename = "_id")]
    pub key: K,
    pub count: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentLead {
    #[serde(rename = "_id")]
    pub lead_id: String,
    pub business: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminAnalytics {
    pub total_users: usize,
    pub total_leads: usize,
    pub leads_by_status: Vec<GroupCount<Status>>,
    pub leads_by_district: Vec<GroupCount<District>>,
    pub recent_leads: Vec<RecentLead>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ActivityLogEntry {
    pub business: String,
    pub from: String,
    pub to: String,
    pub note: String,
    pub date: DateTime<Utc>,
}

pub fn analyze(total_users: usize, leads: &[Lead]) -> AdminAnalytics {
    let mut by_status: HashMap<Status, usize> = HashMap::new();
    let mut by_district: HashMap<District, usize> = HashMap::new();
    for lead in leads {
        *by_status.entry(lead.status).or_default() += 1;
        *by_district.entry(lead.district).or_default() += 1;
    }

    let mut leads_by_status: Vec<GroupCount<Status>> = by_status
        .into_iter()
        .map(|(key, count)| GroupCount { key, count })
        .collect();
    leads_by_status.sort_by_key(|g| g.key);

    let mut leads_by_district: Vec<GroupCount<District>> = by_district
        .into_iter()
        .map(|(key, count)| GroupCount { key, count })
        .collect();
    leads_by_district.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.key.as_str().cmp(b.key.as_str()))
    });
    leads_by_district.truncate(TOP_DISTRICTS);

    let mut newest: Vec<&Lead> = leads.iter().collect();
    newest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let recent_leads = newest
        .into_iter()
        .take(RECENT_LEADS)
        .map(|lead| RecentLead {
            lead_id: lead.lead_id.clone(),
            business: lead.business.clone(),
            status: lead.status,
            created_at: lead.created_at,
        })
        .collect();

    AdminAnalytics {
        total_users,
        total_leads: leads.len(),
        leads_by_status,
        leads_by_district,
        recent_leads,
    }
}

/// Every log of every lead, tagged with its business, newest first, capped.
pub fn flatten_logs(leads: &[Lead]) -> Vec<ActivityLogEntry> {
    let mut all: Vec<ActivityLogEntry> = leads
        .iter()
        .flat_map(|lead| {
            lead.logs.iter().map(|log| ActivityLogEntry {
                business: lead.business.clone(),
                from: log.from.clone(),
                to: log.to.clone(),
                note: log.note.clone(),
                date: log.date,
            })
        })
        .collect();
    // Stable sort keeps each lead's own order for equal timestamps.
    all.sort_by(|a, b| b.date.cmp(&a.date));
    all.truncate(ACTIVITY_FEED_LIMIT);
    all
}

pub async fn admin_analytics(
    leads: &dyn LeadStore,
    users: &dyn UserStore,
    caller: Option<&Caller>,
) -> ApiResult<AdminAnalytics> {
    require_admin(caller)?;
    let total_users = users.count().await?;
    let all = leads.list_all().await?;
    Ok(analyze(total_users, &all))
}

pub async fn activity_log_feed(leads: &dyn LeadStore, caller: Option<&Caller>) -> ApiResult<Vec<ActivityLogEntry>> {
    require_admin(caller)?;
    let all = leads.list_all().await?;
    tracing::info!("Building activity feed from {} leads", all.len());
    Ok(flatten_logs(&all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::store::{InMemoryLeadStore, InMemoryUserStore};
    use crate::types::{LogEntry, Role};
    use chrono::Duration;

    fn lead(id: usize, district: District, status: Status, minutes_ago: i64) -> Lead {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        Lead {
            lead_id: format!("l{}", id),
            owner_user_id: "u1".to_string(),
            business: format!("Business {}", id),
            contact: "555".to_string(),
            status,
            location: "Somewhere".to_string(),
            district,
            logs: vec![LogEntry {
                from: "-".to_string(),
                to: status.to_string(),
                note: "Lead created".to_string(),
                date: at,
            }],
            created_at: at,
            updated_at: at,
            version: 1,
        }
    }

    #[test]
    fn districts_are_ranked_and_capped() {
        let mut leads = Vec::new();
        // Every district once, Kollam three times, Idukki twice.
        for (i, district) in District::ALL.iter().enumerate() {
            leads.push(lead(i, *district, Status::New, i as i64));
        }
        leads.push(lead(100, District::Kollam, Status::Won, 1));
        leads.push(lead(101, District::Kollam, Status::Won, 1));
        leads.push(lead(102, District::Idukki, Status::Lost, 1));

        let analytics = analyze(3, &leads);
        assert_eq!(analytics.total_leads, 17);
        assert_eq!(analytics.leads_by_district.len(), TOP_DISTRICTS);
        assert_eq!(analytics.leads_by_district[0], GroupCount { key: District::Kollam, count: 3 });
        assert_eq!(analytics.leads_by_district[1], GroupCount { key: District::Idukki, count: 2 });
        // Ties fall back to name order.
        assert_eq!(analytics.leads_by_district[2].key, District::Alappuzha);
    }

    #[test]
    fn status_groups_cover_present_statuses_only() {
        let leads = vec![
            lead(1, District::Kannur, Status::Won, 3),
            lead(2, District::Kannur, Status::Won, 2),
            lead(3, District::Kannur, Status::Lost, 1),
        ];
        let analytics = analyze(0, &leads);
        assert_eq!(
            analytics.leads_by_status,
            vec![
                GroupCount { key: Status::Won, count: 2 },
                GroupCount { key: Status::Lost, count: 1 },
            ]
        );
    }

    #[test]
    fn recent_leads_are_newest_ten() {
        let leads: Vec<Lead> = (0..15)
            .map(|i| lead(i, District::Wayanad, Status::New, i as i64 * 10))
            .collect();
        let analytics = analyze(1, &leads);
        let ids: Vec<&str> = analytics.recent_leads.iter().map(|r| r.lead_id.as_str()).collect();
        assert_eq!(ids.len(), RECENT_LEADS);
        assert_eq!(ids[0], "l0");
        assert_eq!(ids[9], "l9");
    }

    #[test]
    fn feed_is_date_descending_and_capped() {
        let mut leads: Vec<Lead> = (0..60)
            .map(|i| lead(i, District::Thrissur, Status::New, i as i64))
            .collect();
        for l in leads.iter_mut() {
            let newer = l.logs[0].date + Duration::seconds(30);
            l.logs.insert(
                0,
                LogEntry {
                    from: "New".to_string(),
                    to: "Contacted".to_string(),
                    note: "Status updated".to_string(),
                    date: newer,
                },
            );
        }

        let feed = flatten_logs(&leads);
        assert_eq!(feed.len(), ACTIVITY_FEED_LIMIT);
        assert!(feed.windows(2).all(|w| w[0].date >= w[1].date));
        assert_eq!(feed[0].business, "Business 0");
        assert_eq!(feed[0].to, "Contacted");
    }

    #[tokio::test]
    async fn admin_views_are_gated() {
        let leads = InMemoryLeadStore::new();
        let users = InMemoryUserStore::new();
        let user = Caller {
            user_id: "u1".to_string(),
            role: Role::User,
        };
        assert!(matches!(
            admin_analytics(&leads, &users, Some(&user)).await,
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(activity_log_feed(&leads, None).await, Err(ApiError::Unauthenticated)));
    }
}
