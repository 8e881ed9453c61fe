use chrono::Utc;

use crate::auth::{require_admin, require_authenticated, Caller};
use crate::credentials::Credentials;
use crate::error::{ApiError, ApiResult, FieldError};
use crate::store::UserStore;
use crate::types::{CreateUserRequest, Role, UpdateUserRequest, User, UserSummary};

const USER_EXISTS: &str = "User already exists";

struct NewAccount {
    username: String,
    email: String,
    password: String,
    role: Role,
}

fn validate_new_account(req: CreateUserRequest, allow_role: bool) -> ApiResult<NewAccount> {
    let mut errors = Vec::new();

    let username = req.username.as_deref().map(str::trim).unwrap_or_default().to_string();
    if username.is_empty() {
        errors.push(FieldError::new("username", "Username is required"));
    }
    let email = req.email.as_deref().map(str::trim).unwrap_or_default().to_lowercase();
    if email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !email.contains('@') {
        errors.push(FieldError::new("email", "Email is invalid"));
    }
    let password = req.password.unwrap_or_default();
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }

    let role = match req.role {
        Some(raw) if allow_role => match raw.trim().parse::<Role>() {
            Ok(role) => role,
            Err(_) => {
                errors.push(FieldError::new("role", format!("`{}` is not a valid role", raw)));
                Role::User
            }
        },
        _ => Role::User,
    };

    if !errors.is_empty() {
        return Err(ApiError::validation("User", errors));
    }
    Ok(NewAccount {
        username,
        email,
        password,
        role,
    })
}

async fn open_account(
    users: &dyn UserStore,
    credentials: &dyn Credentials,
    account: NewAccount,
) -> ApiResult<User> {
    if users
        .find_conflicting(Some(&account.email), Some(&account.username), None)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(USER_EXISTS.to_string()));
    }

    let now = Utc::now();
    let user = User {
        user_id: uuid::Uuid::new_v4().to_string(),
        username: account.username,
        email: account.email,
        role: account.role,
        created_at: now,
        updated_at: now,
        version: 1,
    };

    credentials
        .register(&user.user_id, &user.email, &account.password)
        .await?;

    if let Err(e) = users.insert(&user).await {
        // Keep the credential provider in step with the profile table.
        if let Err(cleanup) = credentials.remove(&user.user_id).await {
            tracing::error!("Failed to remove credentials for {}: {}", user.user_id, cleanup);
        }
        return Err(e.into());
    }

    tracing::info!("User {} created with role {}", user.user_id, user.role);
    Ok(user)
}

/// Self-service sign-up. Always creates a plain user.
pub async fn register(
    users: &dyn UserStore,
    credentials: &dyn Credentials,
    req: CreateUserRequest,
) -> ApiResult<UserSummary> {
    let account = validate_new_account(req, false)?;
    let user = open_account(users, credentials, account).await?;
    Ok(UserSummary::from(&user))
}

/// Profile of the caller.
pub async fn current_user(users: &dyn UserStore, caller: Option<&Caller>) -> ApiResult<User> {
    let caller = require_authenticated(caller)?;
    users
        .get(&caller.user_id)
        .await?
        .ok_or(ApiError::Unauthenticated)
}

/// All users, newest first.
pub async fn list_users(users: &dyn UserStore, caller: Option<&Caller>) -> ApiResult<Vec<User>> {
    require_admin(caller)?;
    let mut all = users.list_all().await?;
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(all)
}

pub async fn create_user(
    users: &dyn UserStore,
    credentials: &dyn Credentials,
    caller: Option<&Caller>,
    req: CreateUserRequest,
) -> ApiResult<UserSummary> {
    let admin = require_admin(caller)?;
    let account = validate_new_account(req, true)?;
    let user = open_account(users, credentials, account).await?;
    tracing::info!("Admin {} created user {}", admin.user_id, user.user_id);
    Ok(UserSummary::from(&user))
}

pub async fn update_user(
    users: &dyn UserStore,
    user_id: &str,
    caller: Option<&Caller>,
    req: UpdateUserRequest,
) -> ApiResult<UserSummary> {
    let admin = require_admin(caller)?;
    let mut user = users.get(user_id).await?.ok_or(ApiError::NotFound("User"))?;

    let mut errors = Vec::new();
    let username = match req.username.as_deref().map(str::trim) {
        Some("") => {
            errors.push(FieldError::new("username", "username cannot be empty"));
            None
        }
        other => other.map(str::to_string),
    };
    let email = match req.email.as_deref().map(str::trim) {
        Some("") => {
            errors.push(FieldError::new("email", "email cannot be empty"));
            None
        }
        Some(e) if !e.contains('@') => {
            errors.push(FieldError::new("email", "Email is invalid"));
            None
        }
        other => other.map(str::to_lowercase),
    };
    let role = match req.role {
        Some(raw) => match raw.trim().parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                errors.push(FieldError::new("role", format!("`{}` is not a valid role", raw)));
                None
            }
        },
        None => None,
    };
    if !errors.is_empty() {
        return Err(ApiError::validation("User", errors));
    }

    let email = email.filter(|e| *e != user.email);
    let username = username.filter(|u| *u != user.username);
    let role = role.filter(|r| *r != user.role);

    if email.is_none() && username.is_none() && role.is_none() {
        return Ok(UserSummary::from(&user));
    }

    if users
        .find_conflicting(email.as_deref(), username.as_deref(), Some(user_id))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(USER_EXISTS.to_string()));
    }

    if let Some(email) = email {
        user.email = email;
    }
    if let Some(username) = username {
        user.username = username;
    }
    if let Some(role) = role {
        tracing::info!("Admin {} set role of {} to {}", admin.user_id, user_id, role);
        user.role = role;
    }

    let expected_version = user.version;
    user.version += 1;
    user.updated_at = Utc::now();
    users.replace(&user, expected_version).await?;
    Ok(UserSummary::from(&user))
}

pub async fn delete_user(
    users: &dyn UserStore,
    credentials: &dyn Credentials,
    user_id: &str,
    caller: Option<&Caller>,
) -> ApiResult<()> {
    let admin = require_admin(caller)?;
    if users.get(user_id).await?.is_none() {
        return Err(ApiError::NotFound("User"));
    }
    if user_id == admin.user_id {
        return Err(ApiError::InvalidOperation("Cannot delete your own account".to_string()));
    }

    if !users.delete(user_id).await? {
        return Err(ApiError::NotFound("User"));
    }
    if let Err(e) = credentials.remove(user_id).await {
        // The profile is gone, so the account can no longer resolve to a caller.
        tracing::error!("Failed to remove credentials for deleted user {}: {}", user_id, e);
    }
    tracing::info!("Admin {} deleted user {}", admin.user_id, user_id);
    Ok(())
}

/// Grant the admin role to the user with `email`. Used by the operator tool.
/// `None` when no user has that email; otherwise the user and whether the role changed.
pub async fn promote_to_admin(users: &dyn UserStore, email: &str) -> ApiResult<Option<(User, bool)>> {
    let Some(mut user) = users.find_by_email(&email.trim().to_lowercase()).await? else {
        return Ok(None);
    };
    if user.role == Role::Admin {
        return Ok(Some((user, false)));
    }

    let expected_version = user.version;
    user.role = Role::Admin;
    user.version += 1;
    user.updated_at = Utc::now();
    users.replace(&user, expected_version).await?;
    Ok(Some((user, true)))
}
