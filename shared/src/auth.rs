use serde::{Deserialize, Serialize};

use crate::credentials::{AuthTokens, Credentials};
use crate::error::{ApiError, ApiResult, FieldError};
use crate::store::UserStore;
use crate::types::{Role, User};

/// Identity of the authenticated user making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            role: user.role,
        }
    }
}

/// Any signed-in user passes.
pub fn require_authenticated(caller: Option<&Caller>) -> ApiResult<&Caller> {
    caller.ok_or(ApiError::Unauthenticated)
}

/// Gate in front of every admin operation.
pub fn require_admin(caller: Option<&Caller>) -> ApiResult<&Caller> {
    let caller = require_authenticated(caller)?;
    if caller.role != Role::Admin {
        tracing::warn!("Admin access denied for user {}", caller.user_id);
        return Err(ApiError::Forbidden);
    }
    Ok(caller)
}

/// Turn the verified token subject into a [`Caller`] by loading the user.
/// A subject with no stored profile is treated as anonymous.
pub async fn resolve_caller(users: &dyn UserStore, subject: Option<&str>) -> ApiResult<Option<Caller>> {
    let Some(subject) = subject.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match users.get(subject).await? {
        Some(user) => Ok(Some(Caller::from(&user))),
        None => {
            tracing::warn!("Token subject {} has no user profile", subject);
            Ok(None)
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub user: User,
}

/// Exchange email and password for tokens issued by the credential provider.
pub async fn login(
    users: &dyn UserStore,
    credentials: &dyn Credentials,
    req: LoginRequest,
) -> ApiResult<LoginResponse> {
    let email = req
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    let password = req.password.as_deref().unwrap_or_default();

    let mut errors = Vec::new();
    if email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    }
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation("Login", errors));
    }

    let Some(user) = users.find_by_email(&email).await? else {
        tracing::warn!("Login attempt for unknown email");
        return Err(ApiError::InvalidCredentials("Invalid email or password"));
    };

    let tokens = credentials.authenticate(&user.user_id, password).await?;
    tracing::info!("User {} logged in", user.user_id);
    Ok(LoginResponse { tokens, user })
}
