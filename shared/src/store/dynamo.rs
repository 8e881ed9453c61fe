use super::{
    email_key, lead_key, owner_key, user_key, username_key, LeadStore, StoreError, UserStore,
};
use crate::types::{Lead, LogEntry, User};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, Select, TransactWriteItem};
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;

type Item = HashMap<String, AttributeValue>;

const METADATA_SK: &str = "METADATA";
const LEAD_ENTITY: &str = "LEAD";
const USER_ENTITY: &str = "USER";
/// Sentinel items `PK=EMAIL#<addr>` / `PK=USERNAME#<name>` claiming a unique value.
const UNIQUE_SK: &str = "UNIQUE";
const UNIQUE_ENTITY: &str = "UNIQUE";
/// DynamoDB rejects items larger than 400 KB.
const MAX_ITEM_BYTES: usize = 400 * 1024;
/// GSI keyed by `GSI1PK = OWNER#<user>` and `GSI1SK = created_at`.
const OWNER_INDEX: &str = "GSI1";

fn backend<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StoreError::backend(DisplayErrorContext(&err).to_string())
}

fn build_error(err: BuildError) -> StoreError {
    StoreError::backend(format!("invalid request: {}", err))
}

/// Approximate stored size: attribute names plus string and number values.
fn item_size(item: &Item) -> usize {
    item.iter()
        .map(|(name, value)| {
            name.len()
                + match value {
                    AttributeValue::S(s) => s.len(),
                    AttributeValue::N(n) => n.len(),
                    _ => 0,
                }
        })
        .sum()
}

/// Fixed-width UTC timestamp so string order matches time order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn get_s<'a>(item: &'a Item, key: &str, attr: &str) -> Result<&'a str, StoreError> {
    item.get(attr)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.as_str())
        .ok_or_else(|| StoreError::corrupt(key, format!("missing string attribute `{}`", attr)))
}

fn get_time(item: &Item, key: &str, attr: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = get_s(item, key, attr)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(key, format!("`{}`: {}", attr, e)))
}

fn get_version(item: &Item, key: &str) -> Result<u64, StoreError> {
    item.get("version")
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| StoreError::corrupt(key, "missing numeric attribute `version`"))
}

fn parse_enum<T: std::str::FromStr>(item: &Item, key: &str, attr: &str) -> Result<T, StoreError> {
    let raw = get_s(item, key, attr)?;
    raw.parse::<T>()
        .map_err(|_| StoreError::corrupt(key, format!("`{}` holds unknown value `{}`", attr, raw)))
}

fn lead_to_item(lead: &Lead) -> Result<Item, StoreError> {
    let pk = lead_key(&lead.lead_id);
    let logs = serde_json::to_string(&lead.logs)
        .map_err(|e| StoreError::corrupt(&pk, format!("logs: {}", e)))?;

    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(pk.clone()));
    item.insert("SK".to_string(), AttributeValue::S(METADATA_SK.to_string()));
    item.insert("entity_type".to_string(), AttributeValue::S(LEAD_ENTITY.to_string()));
    item.insert("GSI1PK".to_string(), AttributeValue::S(owner_key(&lead.owner_user_id)));
    item.insert("GSI1SK".to_string(), AttributeValue::S(timestamp(&lead.created_at)));
    item.insert("lead_id".to_string(), AttributeValue::S(lead.lead_id.clone()));
    item.insert("owner_user_id".to_string(), AttributeValue::S(lead.owner_user_id.clone()));
    item.insert("business".to_string(), AttributeValue::S(lead.business.clone()));
    item.insert("contact".to_string(), AttributeValue::S(lead.contact.clone()));
    item.insert("status".to_string(), AttributeValue::S(lead.status.as_str().to_string()));
    item.insert("location".to_string(), AttributeValue::S(lead.location.clone()));
    item.insert("district".to_string(), AttributeValue::S(lead.district.as_str().to_string()));
    item.insert("logs".to_string(), AttributeValue::S(logs));
    item.insert("created_at".to_string(), AttributeValue::S(timestamp(&lead.created_at)));
    item.insert("updated_at".to_string(), AttributeValue::S(timestamp(&lead.updated_at)));
    item.insert("version".to_string(), AttributeValue::N(lead.version.to_string()));

    if item_size(&item) > MAX_ITEM_BYTES {
        tracing::warn!("Lead {} exceeds the item size limit with {} logs", lead.lead_id, lead.logs.len());
        return Err(StoreError::TooLarge { key: pk });
    }
    Ok(item)
}

fn lead_from_item(item: &Item) -> Result<Lead, StoreError> {
    let key = get_s(item, "<lead>", "PK")?.to_string();
    let logs: Vec<LogEntry> = serde_json::from_str(get_s(item, &key, "logs")?)
        .map_err(|e| StoreError::corrupt(&key, format!("logs: {}", e)))?;

    Ok(Lead {
        lead_id: get_s(item, &key, "lead_id")?.to_string(),
        owner_user_id: get_s(item, &key, "owner_user_id")?.to_string(),
        business: get_s(item, &key, "business")?.to_string(),
        contact: get_s(item, &key, "contact")?.to_string(),
        status: parse_enum(item, &key, "status")?,
        location: get_s(item, &key, "location")?.to_string(),
        district: parse_enum(item, &key, "district")?,
        logs,
        created_at: get_time(item, &key, "created_at")?,
        updated_at: get_time(item, &key, "updated_at")?,
        version: get_version(item, &key)?,
    })
}

fn user_to_item(user: &User) -> Item {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(user_key(&user.user_id)));
    item.insert("SK".to_string(), AttributeValue::S(METADATA_SK.to_string()));
    item.insert("entity_type".to_string(), AttributeValue::S(USER_ENTITY.to_string()));
    item.insert("user_id".to_string(), AttributeValue::S(user.user_id.clone()));
    item.insert("username".to_string(), AttributeValue::S(user.username.clone()));
    item.insert("email".to_string(), AttributeValue::S(user.email.clone()));
    item.insert("role".to_string(), AttributeValue::S(user.role.as_str().to_string()));
    item.insert("created_at".to_string(), AttributeValue::S(timestamp(&user.created_at)));
    item.insert("updated_at".to_string(), AttributeValue::S(timestamp(&user.updated_at)));
    item.insert("version".to_string(), AttributeValue::N(user.version.to_string()));
    item
}

fn unique_item(key: &str, user_id: &str) -> Item {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(key.to_string()));
    item.insert("SK".to_string(), AttributeValue::S(UNIQUE_SK.to_string()));
    item.insert("entity_type".to_string(), AttributeValue::S(UNIQUE_ENTITY.to_string()));
    item.insert("user_id".to_string(), AttributeValue::S(user_id.to_string()));
    item
}

fn unique_keys(user: &User) -> [String; 2] {
    [email_key(&user.email), username_key(&user.username)]
}

/// Sentinel keys to release and to claim when `stored` is rewritten as `updated`.
fn moved_unique_keys(stored: &User, updated: &User) -> (Vec<String>, Vec<String>) {
    let old = unique_keys(stored);
    let new = unique_keys(updated);
    let released = old.iter().filter(|k| !new.contains(k)).cloned().collect();
    let claimed = new.iter().filter(|k| !old.contains(k)).cloned().collect();
    (released, claimed)
}

fn user_from_item(item: &Item) -> Result<User, StoreError> {
    let key = get_s(item, "<user>", "PK")?.to_string();
    Ok(User {
        user_id: get_s(item, &key, "user_id")?.to_string(),
        username: get_s(item, &key, "username")?.to_string(),
        email: get_s(item, &key, "email")?.to_string(),
        role: parse_enum(item, &key, "role")?,
        created_at: get_time(item, &key, "created_at")?,
        updated_at: get_time(item, &key, "updated_at")?,
        version: get_version(item, &key)?,
    })
}

/// What a transaction item's condition protects.
enum Guard {
    Profile(String),
    Unique(String),
}

impl Guard {
    fn violation(&self) -> StoreError {
        match self {
            Guard::Profile(key) => StoreError::VersionConflict { key: key.clone() },
            Guard::Unique(key) => StoreError::Duplicate { key: key.clone() },
        }
    }
}

/// Shared single-table plumbing for both stores.
#[derive(Clone)]
struct Table {
    client: DynamoClient,
    table_name: String,
}

impl Table {
    async fn put_new(&self, pk: &str, item: Item) -> Result<(), StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(StoreError::VersionConflict { key: pk.to_string() })
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn put_versioned(&self, pk: &str, item: Item, expected_version: u64) -> Result<(), StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_exists(PK) AND #version = :expected")
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                tracing::warn!("Stale write rejected for {} at version {}", pk, expected_version);
                Err(StoreError::VersionConflict { key: pk.to_string() })
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get(&self, pk: String) -> Result<Option<Item>, StoreError> {
        self.get_item(pk, METADATA_SK).await
    }

    async fn get_item(&self, pk: String, sk: &str) -> Result<Option<Item>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(sk.to_string()))
            .send()
            .await
            .map_err(backend)?;
        Ok(result.item().cloned())
    }

    /// Owner of a unique value, if it is claimed.
    async fn unique_owner(&self, key: String) -> Result<Option<String>, StoreError> {
        let Some(item) = self.get_item(key.clone(), UNIQUE_SK).await? else {
            return Ok(None);
        };
        Ok(Some(get_s(&item, &key, "user_id")?.to_string()))
    }

    fn claim_unique(&self, key: &str, user_id: &str) -> Result<(TransactWriteItem, Guard), StoreError> {
        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(unique_item(key, user_id)))
            .condition_expression("attribute_not_exists(PK)")
            .build()
            .map_err(build_error)?;
        Ok((
            TransactWriteItem::builder().put(put).build(),
            Guard::Unique(key.to_string()),
        ))
    }

    fn release_unique(&self, key: &str) -> Result<(TransactWriteItem, Guard), StoreError> {
        let delete = Delete::builder()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(key.to_string()))
            .key("SK", AttributeValue::S(UNIQUE_SK.to_string()))
            .build()
            .map_err(build_error)?;
        Ok((
            TransactWriteItem::builder().delete(delete).build(),
            Guard::Unique(key.to_string()),
        ))
    }

    /// All-or-nothing write. A failed condition is reported against the item that guarded it.
    async fn transact(&self, writes: Vec<(TransactWriteItem, Guard)>) -> Result<(), StoreError> {
        let (items, guards): (Vec<TransactWriteItem>, Vec<Guard>) = writes.into_iter().unzip();
        let err = match self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };

        if let Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) =
            err.as_service_error()
        {
            let failed = cancelled
                .cancellation_reasons()
                .iter()
                .zip(&guards)
                .find(|(reason, _)| reason.code() == Some("ConditionalCheckFailed"));
            if let Some((_, guard)) = failed {
                return Err(guard.violation());
            }
        }
        Err(backend(err))
    }

    async fn delete(&self, pk: String) -> Result<bool, StoreError> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk))
            .key("SK", AttributeValue::S(METADATA_SK.to_string()))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(backend(e)),
        }
    }

    /// Full table scan filtered by entity type, paged until exhausted.
    async fn scan_entities(&self, entity: &str) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("entity_type = :entity")
                .expression_attribute_values(":entity", AttributeValue::S(entity.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(backend)?;
            items.extend(resp.items().iter().cloned());

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn count_entities(&self, entity: &str) -> Result<usize, StoreError> {
        let mut total = 0usize;
        let mut start_key: Option<Item> = None;
        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .select(Select::Count)
                .filter_expression("entity_type = :entity")
                .expression_attribute_values(":entity", AttributeValue::S(entity.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(backend)?;
            total += usize::try_from(resp.count()).unwrap_or_default();

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(total)
    }
}

/// Leads stored as `PK=LEAD#<id>, SK=METADATA`.
#[derive(Clone)]
pub struct DynamoLeadStore {
    table: Table,
}

impl DynamoLeadStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            table: Table {
                client,
                table_name: table_name.into(),
            },
        }
    }
}

#[async_trait]
impl LeadStore for DynamoLeadStore {
    async fn insert(&self, lead: &Lead) -> Result<(), StoreError> {
        let item = lead_to_item(lead)?;
        self.table.put_new(&lead_key(&lead.lead_id), item).await
    }

    async fn get(&self, lead_id: &str) -> Result<Option<Lead>, StoreError> {
        self.table
            .get(lead_key(lead_id))
            .await?
            .map(|item| lead_from_item(&item))
            .transpose()
    }

    async fn list_by_owner(&self, owner_user_id: &str) -> Result<Vec<Lead>, StoreError> {
        let mut leads = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let resp = self
                .table
                .client
                .query()
                .table_name(&self.table.table_name)
                .index_name(OWNER_INDEX)
                .key_condition_expression("GSI1PK = :owner")
                .expression_attribute_values(":owner", AttributeValue::S(owner_key(owner_user_id)))
                .scan_index_forward(false)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(backend)?;

            for item in resp.items() {
                leads.push(lead_from_item(item)?);
            }

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(leads)
    }

    async fn list_all(&self) -> Result<Vec<Lead>, StoreError> {
        self.table
            .scan_entities(LEAD_ENTITY)
            .await?
            .iter()
            .map(lead_from_item)
            .collect()
    }

    async fn replace(&self, lead: &Lead, expected_version: u64) -> Result<(), StoreError> {
        let item = lead_to_item(lead)?;
        self.table
            .put_versioned(&lead_key(&lead.lead_id), item, expected_version)
            .await
    }

    async fn delete(&self, lead_id: &str) -> Result<bool, StoreError> {
        self.table.delete(lead_key(lead_id)).await
    }
}

/// Users stored as `PK=USER#<id>, SK=METADATA`.
#[derive(Clone)]
pub struct DynamoUserStore {
    table: Table,
}

impl DynamoUserStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            table: Table {
                client,
                table_name: table_name.into(),
            },
        }
    }
}

impl DynamoUserStore {
    fn put_profile(&self, user: &User, expected_version: Option<u64>) -> Result<(TransactWriteItem, Guard), StoreError> {
        let builder = Put::builder()
            .table_name(&self.table.table_name)
            .set_item(Some(user_to_item(user)));
        let builder = match expected_version {
            None => builder.condition_expression("attribute_not_exists(PK)"),
            Some(expected) => builder
                .condition_expression("attribute_exists(PK) AND #version = :expected")
                .expression_attribute_names("#version", "version")
                .expression_attribute_values(":expected", AttributeValue::N(expected.to_string())),
        };
        let put = builder.build().map_err(build_error)?;
        Ok((
            TransactWriteItem::builder().put(put).build(),
            Guard::Profile(user_key(&user.user_id)),
        ))
    }

    /// User holding a unique value, unless it is `exclude_user_id`.
    async fn holder_of(&self, key: String, exclude_user_id: Option<&str>) -> Result<Option<User>, StoreError> {
        match self.table.unique_owner(key).await? {
            Some(owner) if Some(owner.as_str()) != exclude_user_id => self.get(&owner).await,
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl UserStore for DynamoUserStore {
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut writes = vec![self.put_profile(user, None)?];
        for key in unique_keys(user) {
            writes.push(self.table.claim_unique(&key, &user.user_id)?);
        }
        self.table.transact(writes).await
    }

    async fn get(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.table
            .get(user_key(user_id))
            .await?
            .map(|item| user_from_item(&item))
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.holder_of(email_key(email), None).await
    }

    async fn find_conflicting(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        exclude_user_id: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        if let Some(email) = email {
            if let Some(user) = self.holder_of(email_key(email), exclude_user_id).await? {
                return Ok(Some(user));
            }
        }
        match username {
            Some(username) => self.holder_of(username_key(username), exclude_user_id).await,
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        self.table
            .scan_entities(USER_ENTITY)
            .await?
            .iter()
            .map(user_from_item)
            .collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.table.count_entities(USER_ENTITY).await
    }

    async fn replace(&self, user: &User, expected_version: u64) -> Result<(), StoreError> {
        let stored = match self.get(&user.user_id).await? {
            Some(stored) if stored.version == expected_version => stored,
            _ => {
                return Err(StoreError::VersionConflict {
                    key: user_key(&user.user_id),
                })
            }
        };

        let (released, claimed) = moved_unique_keys(&stored, user);
        let mut writes = vec![self.put_profile(user, Some(expected_version))?];
        for key in &released {
            writes.push(self.table.release_unique(key)?);
        }
        for key in &claimed {
            writes.push(self.table.claim_unique(key, &user.user_id)?);
        }
        self.table.transact(writes).await
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        let Some(stored) = self.get(user_id).await? else {
            return Ok(false);
        };

        let profile = Delete::builder()
            .table_name(&self.table.table_name)
            .key("PK", AttributeValue::S(user_key(user_id)))
            .key("SK", AttributeValue::S(METADATA_SK.to_string()))
            .condition_expression("attribute_exists(PK)")
            .build()
            .map_err(build_error)?;
        let mut writes = vec![(
            TransactWriteItem::builder().delete(profile).build(),
            Guard::Profile(user_key(user_id)),
        )];
        for key in unique_keys(&stored) {
            writes.push(self.table.release_unique(&key)?);
        }

        match self.table.transact(writes).await {
            Ok(()) => Ok(true),
            Err(StoreError::VersionConflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{District, Role, Status};

    fn sample_lead() -> Lead {
        let now = Utc::now();
        Lead {
            lead_id: "abc".to_string(),
            owner_user_id: "u1".to_string(),
            business: "Acme".to_string(),
            contact: "555".to_string(),
            status: Status::UnderNegotiation,
            location: "Kochi".to_string(),
            district: District::Ernakulam,
            logs: vec![LogEntry {
                from: "-".to_string(),
                to: "Under Negotiation".to_string(),
                note: "Lead created".to_string(),
                date: now,
            }],
            created_at: now,
            updated_at: now,
            version: 3,
        }
    }

    #[test]
    fn lead_item_carries_keys_and_owner_index() {
        let item = lead_to_item(&sample_lead()).unwrap();
        assert_eq!(item["PK"], AttributeValue::S("LEAD#abc".to_string()));
        assert_eq!(item["SK"], AttributeValue::S("METADATA".to_string()));
        assert_eq!(item["GSI1PK"], AttributeValue::S("OWNER#u1".to_string()));
        assert_eq!(item["status"], AttributeValue::S("Under Negotiation".to_string()));
        assert_eq!(item["version"], AttributeValue::N("3".to_string()));
    }

    #[test]
    fn lead_item_decodes_back() {
        let lead = sample_lead();
        let decoded = lead_from_item(&lead_to_item(&lead).unwrap()).unwrap();
        assert_eq!(decoded.logs.len(), 1);
        assert_eq!(decoded.status, Status::UnderNegotiation);
        assert_eq!(decoded.created_at.timestamp_micros(), lead.created_at.timestamp_micros());
    }

    #[test]
    fn unknown_district_is_reported_as_corrupt() {
        let mut item = lead_to_item(&sample_lead()).unwrap();
        item.insert("district".to_string(), AttributeValue::S("Goa".to_string()));
        let err = lead_from_item(&item).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "LEAD#abc"));
    }

    #[test]
    fn user_item_never_holds_a_password() {
        let now = Utc::now();
        let item = user_to_item(&User {
            user_id: "u1".to_string(),
            username: "anu".to_string(),
            email: "anu@example.com".to_string(),
            role: Role::Admin,
            created_at: now,
            updated_at: now,
            version: 1,
        });
        assert!(!item.contains_key("password"));
        assert_eq!(user_from_item(&item).unwrap().role, Role::Admin);
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = DateTime::parse_from_rfc3339("2026-01-05T09:00:00Z").unwrap().with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2026-01-05T10:00:00.5Z").unwrap().with_timezone(&Utc);
        assert!(timestamp(&early) < timestamp(&late));
    }

    fn sample_user(username: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            user_id: "u1".to_string(),
            username: username.to_string(),
            email: email.to_string(),
            role: Role::User,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn unique_sentinel_points_at_its_owner() {
        let item = unique_item("EMAIL#anu@example.com", "u1");
        assert_eq!(item["SK"], AttributeValue::S("UNIQUE".to_string()));
        assert_eq!(item["entity_type"], AttributeValue::S("UNIQUE".to_string()));
        assert_eq!(item["user_id"], AttributeValue::S("u1".to_string()));
    }

    #[test]
    fn only_changed_unique_values_move() {
        let stored = sample_user("anu", "anu@example.com");

        let (released, claimed) = moved_unique_keys(&stored, &sample_user("anu", "new@example.com"));
        assert_eq!(released, vec!["EMAIL#anu@example.com".to_string()]);
        assert_eq!(claimed, vec!["EMAIL#new@example.com".to_string()]);

        let (released, claimed) = moved_unique_keys(&stored, &stored);
        assert!(released.is_empty() && claimed.is_empty());
    }

    #[test]
    fn oversized_lead_is_refused_before_writing() {
        let mut lead = sample_lead();
        let entry = LogEntry {
            from: "New".to_string(),
            to: "Contacted".to_string(),
            note: "x".repeat(1024),
            date: Utc::now(),
        };
        lead.logs = vec![entry; 500];

        let err = lead_to_item(&lead).unwrap_err();
        assert_eq!(err, StoreError::TooLarge { key: "LEAD#abc".to_string() });
        assert_eq!(crate::error::ApiError::from(err).status_code().as_u16(), 400);
    }
}
