//! Common test utilities for mssql-connector-tds integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mssql_connector_tds::AzureEndpoints;

/// Creates a mock OAuth token response.
pub fn create_token_response(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

/// Creates a managed identity token response (`expires_in` as a string).
pub fn create_imds_response(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in.to_string(),
        "resource": "https://database.windows.net/"
    })
}

/// Mock identity provider.
pub struct MockIdentityServer {
    pub server: MockServer,
}

impl MockIdentityServer {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Endpoints pointing at this server.
    pub fn endpoints(&self) -> AzureEndpoints {
        AzureEndpoints {
            authority_host: self.url(),
            imds_endpoint: format!("{}/metadata/identity/oauth2/token", self.url()),
        }
    }

    /// Sets up the client-credentials token endpoint.
    pub async fn mock_token_endpoint(&self, tenant_id: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/{tenant_id}/oauth2/v2.0/token")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_token_response(access_token, 3600)),
            )
            .mount(&self.server)
            .await;
    }

    /// Sets up a failing token endpoint.
    pub async fn mock_token_error(&self, tenant_id: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(format!("/{tenant_id}/oauth2/v2.0/token")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&self.server)
            .await;
    }

    /// Sets up the managed identity endpoint.
    pub async fn mock_imds_endpoint(&self, access_token: &str) {
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("resource", "https://database.windows.net/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_imds_response(access_token, 3599)),
            )
            .mount(&self.server)
            .await;
    }
}
