pub mod types;
pub mod error;
pub mod config;
pub mod store;
pub mod credentials;
pub mod auth;
pub mod leads;
pub mod stats;
pub mod analytics;
pub mod users;
pub mod response;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use config::Config;
use credentials::{CognitoCredentials, Credentials, InMemoryCredentials};
use std::sync::Arc;
use store::{DynamoLeadStore, DynamoUserStore, InMemoryLeadStore, InMemoryUserStore, LeadStore, UserStore};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub leads: Arc<dyn LeadStore>,
    pub users: Arc<dyn UserStore>,
    pub credentials: Arc<dyn Credentials>,
}

impl AppState {
    pub fn new(
        config: Config,
        leads: Arc<dyn LeadStore>,
        users: Arc<dyn UserStore>,
        credentials: Arc<dyn Credentials>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            leads,
            users,
            credentials,
        })
    }

    /// Production wiring: DynamoDB for documents, Cognito for passwords.
    pub fn from_aws(
        config: Config,
        dynamo_client: DynamoClient,
        cognito_client: CognitoClient,
    ) -> Arc<Self> {
        let leads = Arc::new(DynamoLeadStore::new(dynamo_client.clone(), &config.table_name));
        let users = Arc::new(DynamoUserStore::new(dynamo_client, &config.table_name));
        let credentials = Arc::new(CognitoCredentials::new(
            cognito_client,
            &config.cognito.user_pool_id,
            &config.cognito.client_id,
            &config.cognito.client_secret,
        ));
        Self::new(config, leads, users, credentials)
    }

    /// Everything in process; nothing touches AWS.
    pub fn in_memory(config: Config) -> Arc<Self> {
        Self::new(
            config,
            Arc::new(InMemoryLeadStore::new()),
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryCredentials::new()),
        )
    }
}
