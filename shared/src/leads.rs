use chrono::Utc;
use std::str::FromStr;

use crate::auth::{require_authenticated, Caller};
use crate::error::{ApiError, ApiResult, FieldError};
use crate::store::LeadStore;
use crate::types::{
    AddLogRequest, CreateLeadRequest, District, Lead, LogEntry, Status, UpdateLeadRequest,
    CREATION_LOG_FROM, DEFAULT_LOG_NOTE,
};

const CREATED_NOTE: &str = "Lead created";
const STATUS_UPDATED_NOTE: &str = "Status updated";

/// Trimmed value of a field that must be present and non-empty.
fn required_text(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: Option<String>,
    missing: &str,
) -> String {
    let trimmed = value.as_deref().map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        errors.push(FieldError::new(field, missing));
    }
    trimmed.to_string()
}

/// Trimmed value of an optional patch field. Present but blank is an error,
/// never a silent no-op.
fn patch_text(errors: &mut Vec<FieldError>, field: &'static str, value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new(field, format!("{} cannot be empty", field)));
        return None;
    }
    Some(trimmed.to_string())
}

fn parse_choice<T: FromStr>(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: Option<String>,
) -> Option<T> {
    let raw = value?;
    match raw.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            errors.push(FieldError::new(field, format!("`{}` is not a valid {}", raw, field)));
            None
        }
    }
}

fn optional_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

async fn load(store: &dyn LeadStore, lead_id: &str) -> ApiResult<Lead> {
    store.get(lead_id).await?.ok_or(ApiError::NotFound("Lead"))
}

/// Leads owned by the caller, newest first.
pub async fn list_leads(store: &dyn LeadStore, caller: Option<&Caller>) -> ApiResult<Vec<Lead>> {
    let caller = require_authenticated(caller)?;
    Ok(store.list_by_owner(&caller.user_id).await?)
}

/// A lead owned by somebody else is reported as missing.
pub async fn get_lead(store: &dyn LeadStore, lead_id: &str, caller: Option<&Caller>) -> ApiResult<Lead> {
    let caller = require_authenticated(caller)?;
    let lead = load(store, lead_id).await?;
    if lead.owner_user_id != caller.user_id {
        tracing::warn!("User {} asked for lead {} owned by someone else", caller.user_id, lead_id);
        return Err(ApiError::NotFound("Lead"));
    }
    Ok(lead)
}

pub async fn create_lead(
    store: &dyn LeadStore,
    caller: Option<&Caller>,
    req: CreateLeadRequest,
) -> ApiResult<Lead> {
    let caller = require_authenticated(caller)?;

    let mut errors = Vec::new();
    let business = required_text(&mut errors, "business", req.business, "Business name is required");
    let contact = required_text(&mut errors, "contact", req.contact, "Contact number is required");
    let location = required_text(&mut errors, "location", req.location, "Location is required");
    let district = match req.district {
        None => {
            errors.push(FieldError::new("district", "District is required"));
            None
        }
        raw => parse_choice::<District>(&mut errors, "district", raw),
    };
    // A blank status on create means "not chosen yet".
    let status = req.status.filter(|s| !s.trim().is_empty());
    let status = parse_choice::<Status>(&mut errors, "status", status).unwrap_or_default();

    let Some(district) = district.filter(|_| errors.is_empty()) else {
        return Err(ApiError::validation("Lead", errors));
    };

    let now = Utc::now();
    let lead = Lead {
        lead_id: uuid::Uuid::new_v4().to_string(),
        owner_user_id: caller.user_id.clone(),
        business,
        contact,
        status,
        location,
        district,
        logs: vec![LogEntry {
            from: CREATION_LOG_FROM.to_string(),
            to: status.to_string(),
            note: CREATED_NOTE.to_string(),
            date: now,
        }],
        created_at: now,
        updated_at: now,
        version: 1,
    };

    store.insert(&lead).await?;
    tracing::info!("Lead {} created by {} with status {}", lead.lead_id, caller.user_id, status);
    Ok(lead)
}

/// Partial update.
///
/// Not owner-scoped: any authenticated caller may update any lead, while
/// [`get_lead`] and [`list_leads`] only show the caller's own.
pub async fn update_lead(
    store: &dyn LeadStore,
    lead_id: &str,
    caller: Option<&Caller>,
    req: UpdateLeadRequest,
) -> ApiResult<Lead> {
    require_authenticated(caller)?;
    let mut lead = load(store, lead_id).await?;

    let mut errors = Vec::new();
    let business = patch_text(&mut errors, "business", req.business);
    let contact = patch_text(&mut errors, "contact", req.contact);
    let location = patch_text(&mut errors, "location", req.location);
    let district = parse_choice::<District>(&mut errors, "district", req.district);
    let status = parse_choice::<Status>(&mut errors, "status", req.status);
    if !errors.is_empty() {
        return Err(ApiError::validation("Lead", errors));
    }

    if let Some(expected) = req.version {
        if expected != lead.version {
            return Err(ApiError::VersionConflict("Lead"));
        }
    }

    let now = Utc::now();
    let mut changed = false;

    if let Some(new_status) = status.filter(|s| *s != lead.status) {
        lead.logs.insert(
            0,
            LogEntry {
                from: lead.status.to_string(),
                to: new_status.to_string(),
                note: optional_note(req.note).unwrap_or_else(|| STATUS_UPDATED_NOTE.to_string()),
                date: now,
            },
        );
        tracing::info!("Lead {} moved from {} to {}", lead_id, lead.status, new_status);
        lead.status = new_status;
        changed = true;
    }

    if let Some(business) = business.filter(|v| *v != lead.business) {
        lead.business = business;
        changed = true;
    }
    if let Some(contact) = contact.filter(|v| *v != lead.contact) {
        lead.contact = contact;
        changed = true;
    }
    if let Some(location) = location.filter(|v| *v != lead.location) {
        lead.location = location;
        changed = true;
    }
    if let Some(district) = district.filter(|v| *v != lead.district) {
        lead.district = district;
        changed = true;
    }

    if !changed {
        return Ok(lead);
    }

    let expected_version = lead.version;
    lead.version += 1;
    lead.updated_at = now;
    store.replace(&lead, expected_version).await?;
    Ok(lead)
}

/// Not owner-scoped, like [`update_lead`].
pub async fn delete_lead(store: &dyn LeadStore, lead_id: &str, caller: Option<&Caller>) -> ApiResult<()> {
    let caller = require_authenticated(caller)?;
    if !store.delete(lead_id).await? {
        return Err(ApiError::NotFound("Lead"));
    }
    tracing::info!("Lead {} deleted by {}", lead_id, caller.user_id);
    Ok(())
}

/// Record a manual activity entry. The lead's status is left alone.
/// Not owner-scoped, like [`update_lead`].
pub async fn add_log(
    store: &dyn LeadStore,
    lead_id: &str,
    caller: Option<&Caller>,
    req: AddLogRequest,
) -> ApiResult<Lead> {
    require_authenticated(caller)?;
    let mut lead = load(store, lead_id).await?;

    let mut errors = Vec::new();
    let from = required_text(&mut errors, "from", req.from, "From is required");
    let to = required_text(&mut errors, "to", req.to, "To is required");
    if !errors.is_empty() {
        return Err(ApiError::validation("LogEntry", errors));
    }

    let now = Utc::now();
    lead.logs.insert(
        0,
        LogEntry {
            from,
            to,
            note: optional_note(req.note).unwrap_or_else(|| DEFAULT_LOG_NOTE.to_string()),
            date: now,
        },
    );

    let expected_version = lead.version;
    lead.version += 1;
    lead.updated_at = now;
    store.replace(&lead, expected_version).await?;
    Ok(lead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLeadStore;
    use crate::types::Role;
    use rstest::rstest;

    fn caller(id: &str) -> Caller {
        Caller {
            user_id: id.to_string(),
            role: Role::User,
        }
    }

    fn acme() -> CreateLeadRequest {
        CreateLeadRequest {
            business: Some("Acme".to_string()),
            contact: Some("555".to_string()),
            status: None,
            location: Some("Kochi".to_string()),
            district: Some("Ernakulam".to_string()),
        }
    }

    async fn created(store: &InMemoryLeadStore) -> Lead {
        create_lead(store, Some(&caller("owner")), acme()).await.unwrap()
    }

    #[tokio::test]
    async fn create_defaults_status_and_writes_one_log() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;

        assert_eq!(lead.status, Status::New);
        assert_eq!(lead.owner_user_id, "owner");
        assert_eq!(lead.logs.len(), 1);
        assert_eq!(lead.logs[0].from, "-");
        assert_eq!(lead.logs[0].to, "New");
        assert_eq!(lead.logs[0].note, "Lead created");
        assert_eq!(lead.version, 1);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[tokio::test]
    async fn create_treats_blank_status_as_absent(#[case] status: &str) {
        let store = InMemoryLeadStore::new();
        let mut req = acme();
        req.status = Some(status.to_string());
        let lead = create_lead(&store, Some(&caller("owner")), req).await.unwrap();
        assert_eq!(lead.status, Status::New);
        assert_eq!(lead.logs[0].to, "New");
    }

    #[tokio::test]
    async fn create_with_explicit_status_logs_that_status() {
        let store = InMemoryLeadStore::new();
        let mut req = acme();
        req.status = Some("Quote Issued".to_string());
        let lead = create_lead(&store, Some(&caller("owner")), req).await.unwrap();
        assert_eq!(lead.status, Status::QuoteIssued);
        assert_eq!(lead.logs[0].to, "Quote Issued");
    }

    #[tokio::test]
    async fn create_trims_text_fields() {
        let store = InMemoryLeadStore::new();
        let mut req = acme();
        req.business = Some("  Acme Traders ".to_string());
        let lead = create_lead(&store, Some(&caller("owner")), req).await.unwrap();
        assert_eq!(lead.business, "Acme Traders");
    }

    #[tokio::test]
    async fn create_reports_every_invalid_field() {
        let store = InMemoryLeadStore::new();
        let req = CreateLeadRequest {
            business: Some("   ".to_string()),
            contact: None,
            status: Some("Pending".to_string()),
            location: Some("Kochi".to_string()),
            district: Some("Goa".to_string()),
        };
        let err = create_lead(&store, Some(&caller("owner")), req).await.unwrap_err();
        let ApiError::Validation { errors, .. } = &err else {
            panic!("expected validation error, got {:?}", err);
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["business", "contact", "district", "status"]);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_requires_a_caller() {
        let store = InMemoryLeadStore::new();
        let err = create_lead(&store, None, acme()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }

    #[tokio::test]
    async fn status_change_prepends_one_log() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;

        let updated = update_lead(
            &store,
            &lead.lead_id,
            Some(&caller("someone-else")),
            UpdateLeadRequest {
                status: Some("Contacted".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.status, Status::Contacted);
        assert_eq!(updated.logs.len(), 2);
        assert_eq!(updated.logs[0].from, "New");
        assert_eq!(updated.logs[0].to, "Contacted");
        assert_eq!(updated.logs[0].note, "Status updated");
        assert_eq!(updated.version, 2);
        assert_eq!(store.get(&lead.lead_id).await.unwrap().unwrap(), updated);
    }

    #[tokio::test]
    async fn status_change_uses_supplied_note() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;
        let updated = update_lead(
            &store,
            &lead.lead_id,
            Some(&caller("owner")),
            UpdateLeadRequest {
                status: Some("Won".to_string()),
                note: Some("Signed today".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.logs[0].note, "Signed today");
    }

    #[rstest]
    #[case(None)]
    #[case(Some("New"))]
    #[tokio::test]
    async fn same_or_absent_status_leaves_logs_alone(#[case] status: Option<&str>) {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;
        let updated = update_lead(
            &store,
            &lead.lead_id,
            Some(&caller("owner")),
            UpdateLeadRequest {
                status: status.map(str::to_string),
                location: Some("Aluva".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.logs, lead.logs);
        assert_eq!(updated.location, "Aluva");
    }

    #[tokio::test]
    async fn blank_patch_field_is_rejected_not_ignored() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;
        let err = update_lead(
            &store,
            &lead.lead_id,
            Some(&caller("owner")),
            UpdateLeadRequest {
                contact: Some("".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
        assert_eq!(store.get(&lead.lead_id).await.unwrap().unwrap().contact, "555");
    }

    #[tokio::test]
    async fn stale_client_version_is_a_conflict() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;
        update_lead(
            &store,
            &lead.lead_id,
            Some(&caller("owner")),
            UpdateLeadRequest {
                status: Some("Contacted".to_string()),
                version: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let err = update_lead(
            &store,
            &lead.lead_id,
            Some(&caller("owner")),
            UpdateLeadRequest {
                status: Some("Lost".to_string()),
                version: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::VersionConflict("Lead")));
        assert_eq!(err.status_code().as_u16(), 409);
    }

    #[tokio::test]
    async fn update_of_missing_lead_is_not_found() {
        let store = InMemoryLeadStore::new();
        let err = update_lead(&store, "missing", Some(&caller("owner")), UpdateLeadRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Lead")));
    }

    #[tokio::test]
    async fn get_hides_leads_of_other_owners() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;

        assert!(get_lead(&store, &lead.lead_id, Some(&caller("owner"))).await.is_ok());
        let err = get_lead(&store, &lead.lead_id, Some(&caller("intruder"))).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Lead")));
    }

    #[tokio::test]
    async fn list_only_returns_callers_leads() {
        let store = InMemoryLeadStore::new();
        created(&store).await;
        created(&store).await;
        create_lead(&store, Some(&caller("other")), acme()).await.unwrap();

        assert_eq!(list_leads(&store, Some(&caller("owner"))).await.unwrap().len(), 2);
        assert!(matches!(list_leads(&store, None).await, Err(ApiError::Unauthenticated)));
    }

    #[tokio::test]
    async fn add_log_never_touches_status() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;
        let updated = add_log(
            &store,
            &lead.lead_id,
            Some(&caller("owner")),
            AddLogRequest {
                from: Some("New".to_string()),
                to: Some("Won".to_string()),
                note: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.status, Status::New);
        assert_eq!(updated.logs.len(), 2);
        assert_eq!(updated.logs[0].to, "Won");
        assert_eq!(updated.logs[0].note, DEFAULT_LOG_NOTE);
    }

    #[tokio::test]
    async fn add_log_requires_from_and_to() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;
        let err = add_log(&store, &lead.lead_id, Some(&caller("owner")), AddLogRequest::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.client_message(),
            "LogEntry validation failed: from: From is required, to: To is required"
        );
    }

    #[tokio::test]
    async fn delete_removes_the_lead_once() {
        let store = InMemoryLeadStore::new();
        let lead = created(&store).await;
        delete_lead(&store, &lead.lead_id, Some(&caller("owner"))).await.unwrap();
        assert!(store.get(&lead.lead_id).await.unwrap().is_none());
        let err = delete_lead(&store, &lead.lead_id, Some(&caller("owner"))).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Lead")));
    }
}
