//! OIDC (OpenID Connect) relying-party configuration.
//!
//! This module provides configuration types for connecting to an external
//! OIDC identity provider, together with the knobs that control how a login
//! is turned into a local user record.

use serde::{Deserialize, Serialize};

use crate::mapping::ClaimMapping;

/// Configuration for the OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The provider base (issuer) URL, e.g. "https://auth.example.com/realms/main".
    /// Used for OIDC discovery.
    issuer_url: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The redirect URI for the callback (e.g., "https://app.example.com/oidc/callback").
    redirect_uri: String,
    /// OAuth2 scopes to request as a comma-separated string.
    #[serde(default = "default_scopes")]
    scopes: String,
    /// The claim name carrying the user's groups (or roles).
    #[serde(default = "default_groups_claim")]
    groups_claim: String,
    /// Group whose members are flagged as staff.
    #[serde(default)]
    staff_group: Option<String>,
    /// Group required for an active account. When unset every user is active.
    #[serde(default)]
    access_group: Option<String>,
    /// Verify the provider's TLS certificate.
    #[serde(default = "default_true")]
    verify_ssl: bool,
    /// Validate the nonce echoed back in the ID token.
    #[serde(default = "default_true")]
    use_nonce: bool,
    /// Create a local user on first login when none matches the subject.
    #[serde(default = "default_true")]
    create_user: bool,
    /// Where the browser lands after a successful login without a `next` path.
    #[serde(default = "default_login_redirect_url")]
    login_redirect_url: String,
    /// Where the provider sends the browser after end-session.
    #[serde(default)]
    post_logout_redirect_uri: Option<String>,
    /// Overrides the end-session endpoint advertised by discovery.
    #[serde(default)]
    end_session_url: Option<String>,
}

fn default_scopes() -> String {
    "openid,email,profile".to_string()
}

fn default_groups_claim() -> String {
    "groups".to_string()
}

fn default_login_redirect_url() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

impl OidcConfig {
    /// Creates a new OIDC configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        OidcConfigBuilder::new(issuer_url, client_id, client_secret, redirect_uri).build()
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> OidcConfigBuilder {
        OidcConfigBuilder::new(issuer_url, client_id, client_secret, redirect_uri)
    }

    /// Returns the OIDC issuer URL.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the OAuth2 scopes to request, parsed from the comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the name of the claim containing user groups.
    #[must_use]
    pub fn groups_claim(&self) -> &str {
        &self.groups_claim
    }

    #[must_use]
    pub fn verify_ssl(&self) -> bool {
        self.verify_ssl
    }

    #[must_use]
    pub fn use_nonce(&self) -> bool {
        self.use_nonce
    }

    #[must_use]
    pub fn create_user(&self) -> bool {
        self.create_user
    }

    #[must_use]
    pub fn login_redirect_url(&self) -> &str {
        &self.login_redirect_url
    }

    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> Option<&str> {
        self.post_logout_redirect_uri.as_deref()
    }

    #[must_use]
    pub fn end_session_url(&self) -> Option<&str> {
        self.end_session_url.as_deref()
    }

    /// Returns the rules that turn group claims into account flags.
    #[must_use]
    pub fn claim_mapping(&self) -> ClaimMapping {
        ClaimMapping::new(self.staff_group.clone(), self.access_group.clone())
    }
}

/// Builder for `OidcConfig`.
#[derive(Debug)]
pub struct OidcConfigBuilder {
    config: OidcConfig,
    scopes: Vec<String>,
}

impl OidcConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            config: OidcConfig {
                issuer_url,
                client_id,
                client_secret,
                redirect_uri,
                scopes: String::new(),
                groups_claim: default_groups_claim(),
                staff_group: None,
                access_group: None,
                verify_ssl: true,
                use_nonce: true,
                create_user: true,
                login_redirect_url: default_login_redirect_url(),
                post_logout_redirect_uri: None,
                end_session_url: None,
            },
            scopes: default_scopes().split(',').map(str::to_string).collect(),
        }
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Sets the claim name for user groups.
    #[must_use]
    pub fn groups_claim(mut self, claim: String) -> Self {
        self.config.groups_claim = claim;
        self
    }

    #[must_use]
    pub fn staff_group(mut self, group: String) -> Self {
        self.config.staff_group = Some(group);
        self
    }

    #[must_use]
    pub fn access_group(mut self, group: String) -> Self {
        self.config.access_group = Some(group);
        self
    }

    #[must_use]
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.config.verify_ssl = verify;
        self
    }

    #[must_use]
    pub fn use_nonce(mut self, use_nonce: bool) -> Self {
        self.config.use_nonce = use_nonce;
        self
    }

    #[must_use]
    pub fn create_user(mut self, create: bool) -> Self {
        self.config.create_user = create;
        self
    }

    #[must_use]
    pub fn login_redirect_url(mut self, url: String) -> Self {
        self.config.login_redirect_url = url;
        self
    }

    #[must_use]
    pub fn post_logout_redirect_uri(mut self, uri: String) -> Self {
        self.config.post_logout_redirect_uri = Some(uri);
        self
    }

    #[must_use]
    pub fn end_session_url(mut self, url: String) -> Self {
        self.config.end_session_url = Some(url);
        self
    }

    /// Builds the `OidcConfig`.
    #[must_use]
    pub fn build(mut self) -> OidcConfig {
        self.config.scopes = self.scopes.join(",");
        self.config
    }
}
