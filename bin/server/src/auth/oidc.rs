//! OIDC client implementation using the openidconnect crate.

use async_trait::async_trait;
use base64::Engine;
use gatehouse_platform_access::{OidcClaims, OidcConfig};
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreGenderClaim};
use openidconnect::url::Url;
use openidconnect::{
    AdditionalClaims, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndSessionUrl,
    IssuerUrl, Nonce, OAuth2TokenResponse, PkceCodeChallenge, PkceCodeVerifier,
    ProviderMetadataWithLogout, RedirectUrl, Scope, TokenResponse, UserInfoClaims,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// The identity-provider side of the login handshake.
///
/// `OidcClient` talks to a real provider; tests substitute a fake.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the provider authorization URL and the state needed to finish the flow.
    fn authorization_url(&self) -> (String, AuthState);

    /// Exchanges an authorization code for verified claims.
    async fn exchange_code(&self, code: &str, state: &AuthState) -> Result<TokenResult, OidcError>;

    /// Returns the provider end-session URL, if the provider has one.
    fn end_session_url(&self, id_token_hint: Option<&str>) -> Option<String>;
}

/// Data needed to complete the OIDC callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub csrf_token: String,
    pub pkce_verifier: String,
    pub nonce: String,
}

/// Result of a successful token exchange.
#[derive(Debug, Clone)]
pub struct TokenResult {
    pub claims: OidcClaims,
    /// The raw ID token, kept for `id_token_hint` on logout.
    pub id_token: String,
}

/// Userinfo claims outside the standard set, such as the configured groups claim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraClaims {
    #[serde(flatten)]
    claims: HashMap<String, JsonValue>,
}

impl AdditionalClaims for ExtraClaims {}

impl ExtraClaims {
    /// Reads the groups claim with the same lookup rules as the ID token.
    pub fn groups(&self, claim: &str) -> Option<Vec<String>> {
        let document = JsonValue::Object(self.claims.clone().into_iter().collect());
        groups_from_claims(&document, claim)
    }
}

/// OIDC client for authenticating users.
pub struct OidcClient {
    provider_metadata: ProviderMetadataWithLogout,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    end_session_url: Option<EndSessionUrl>,
    http_client: reqwest::Client,
    config: OidcConfig,
}

impl OidcClient {
    /// Creates a new OIDC client by discovering the provider metadata.
    pub async fn discover(config: OidcConfig) -> Result<Self, OidcError> {
        let issuer_url = IssuerUrl::new(config.issuer_url().to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid issuer URL: {e}")))?;

        if !config.verify_ssl() {
            warn!("TLS certificate verification for the identity provider is disabled");
        }

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!config.verify_ssl())
            .build()
            .map_err(|e| OidcError::Configuration(format!("failed to create HTTP client: {e}")))?;

        let provider_metadata = ProviderMetadataWithLogout::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| OidcError::Discovery(format!("failed to discover provider: {e}")))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| OidcError::Configuration(format!("invalid redirect URI: {e}")))?;

        let end_session_url = match config.end_session_url() {
            Some(url) => Some(EndSessionUrl::new(url.to_string()).map_err(|e| {
                OidcError::Configuration(format!("invalid end-session URL: {e}"))
            })?),
            None => provider_metadata
                .additional_metadata()
                .end_session_endpoint
                .clone(),
        };
        if end_session_url.is_none() {
            warn!("provider advertises no end-session endpoint; logout stays local");
        }

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            end_session_url,
            http_client,
            config,
        })
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn authorization_url(&self) -> (String, AuthState) {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in self.config.scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let state = AuthState {
            csrf_token: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: nonce.secret().clone(),
        };

        (auth_url.to_string(), state)
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str, state: &AuthState) -> Result<TokenResult, OidcError> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| OidcError::TokenExchange(format!("token endpoint error: {e}")))?
            .set_pkce_verifier(PkceCodeVerifier::new(state.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| OidcError::TokenExchange(format!("token exchange failed: {e}")))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| OidcError::TokenExchange("no ID token in response".to_string()))?;

        // Signature, issuer, audience and expiry are checked here.
        let verifier = client.id_token_verifier();
        let verified = if self.config.use_nonce() {
            id_token.claims(&verifier, &Nonce::new(state.nonce.clone()))
        } else {
            id_token.claims(&verifier, |_: Option<&Nonce>| -> Result<(), String> { Ok(()) })
        }
        .map_err(|e| OidcError::TokenValidation(format!("ID token validation failed: {e}")))?;

        let raw_id_token = raw_id_token(&token_response)?;
        let payload = decode_jwt_payload(&raw_id_token)?;

        let mut claims =
            OidcClaims::new(verified.subject().to_string(), verified.issuer().to_string())
                .with_email(verified.email().map(|e| e.as_str().to_string()))
                .with_preferred_username(
                    verified
                        .preferred_username()
                        .map(|u| u.as_str().to_string()),
                );
        let mut groups = groups_from_claims(&payload, self.config.groups_claim());

        // The library rejects a userinfo response issued for another subject.
        if (groups.is_none() || claims.email.is_none())
            && self.provider_metadata.userinfo_endpoint().is_some()
        {
            let userinfo: UserInfoClaims<ExtraClaims, CoreGenderClaim> = client
                .user_info(
                    token_response.access_token().clone(),
                    Some(verified.subject().clone()),
                )
                .map_err(|e| OidcError::UserInfo(format!("userinfo endpoint error: {e}")))?
                .request_async(&self.http_client)
                .await
                .map_err(|e| OidcError::UserInfo(format!("userinfo request failed: {e}")))?;

            merge_userinfo(
                &mut claims,
                &mut groups,
                userinfo.email().map(|e| e.as_str()),
                userinfo.preferred_username().map(|u| u.as_str()),
                userinfo.additional_claims(),
                self.config.groups_claim(),
            );
        }

        let claims = claims.with_groups(groups.unwrap_or_default());
        debug!(
            subject = %claims.subject,
            groups = claims.groups.len(),
            "verified ID token"
        );

        Ok(TokenResult {
            claims,
            id_token: raw_id_token,
        })
    }

    fn end_session_url(&self, id_token_hint: Option<&str>) -> Option<String> {
        self.end_session_url.as_ref().map(|endpoint| {
            build_end_session_url(
                endpoint.url(),
                self.config.client_id(),
                self.config.post_logout_redirect_uri(),
                id_token_hint,
            )
        })
    }
}

/// Returns the raw `id_token` string from a token response.
fn raw_id_token<TR>(token_response: &TR) -> Result<String, OidcError>
where
    TR: Serialize,
{
    let response_json = serde_json::to_value(token_response).map_err(|e| {
        OidcError::TokenValidation(format!("failed to serialize token response: {e}"))
    })?;

    response_json
        .get("id_token")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| OidcError::TokenValidation("no id_token in response".to_string()))
}

/// Decodes the payload segment of an already verified JWT.
///
/// Custom claims such as groups are not part of the typed claim set, so
/// they are read from the raw payload.
fn decode_jwt_payload(jwt: &str) -> Result<JsonValue, OidcError> {
    let mut parts = jwt.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(OidcError::TokenValidation("invalid JWT format".to_string()));
    };

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| OidcError::TokenValidation(format!("failed to decode JWT payload: {e}")))?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|e| OidcError::TokenValidation(format!("failed to parse JWT payload: {e}")))
}

/// Reads the groups claim.
///
/// The claim name is looked up literally first (`groups`, `cognito:groups`,
/// `https://example.com/roles`), then as a dotted path into nested objects
/// (`realm_access.roles`). A single string counts as a one-element list.
/// Returns `None` when the claim is absent.
pub fn groups_from_claims(claims: &JsonValue, claim: &str) -> Option<Vec<String>> {
    let value = claims.get(claim).or_else(|| {
        claim
            .split('.')
            .try_fold(claims, |node, segment| node.get(segment))
    })?;

    match value {
        JsonValue::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        JsonValue::String(single) => Some(vec![single.clone()]),
        _ => None,
    }
}

/// Fills claims missing from the ID token with the userinfo response.
fn merge_userinfo(
    claims: &mut OidcClaims,
    groups: &mut Option<Vec<String>>,
    email: Option<&str>,
    preferred_username: Option<&str>,
    extra: &ExtraClaims,
    groups_claim: &str,
) {
    if claims.email.is_none() {
        claims.email = email.map(str::to_string);
    }
    if claims.preferred_username.is_none() {
        claims.preferred_username = preferred_username.map(str::to_string);
    }
    if groups.is_none() {
        *groups = extra.groups(groups_claim);
    }
}

/// Builds an RP-initiated logout URL.
pub fn build_end_session_url(
    endpoint: &Url,
    client_id: &str,
    post_logout_redirect_uri: Option<&str>,
    id_token_hint: Option<&str>,
) -> String {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", client_id);
        if let Some(uri) = post_logout_redirect_uri {
            query.append_pair("post_logout_redirect_uri", uri);
        }
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }
    }
    url.to_string()
}

/// OIDC-related errors.
#[derive(Debug)]
pub enum OidcError {
    /// Configuration error (invalid URLs, etc.)
    Configuration(String),
    /// Failed to discover provider metadata.
    Discovery(String),
    /// Token exchange failed.
    TokenExchange(String),
    /// Token validation failed.
    TokenValidation(String),
    /// Userinfo request failed.
    UserInfo(String),
}

impl std::fmt::Display for OidcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "OIDC configuration error: {msg}"),
            Self::Discovery(msg) => write!(f, "OIDC discovery error: {msg}"),
            Self::TokenExchange(msg) => write!(f, "OIDC token exchange error: {msg}"),
            Self::TokenValidation(msg) => write!(f, "OIDC token validation error: {msg}"),
            Self::UserInfo(msg) => write!(f, "OIDC userinfo error: {msg}"),
        }
    }
}

impl std::error::Error for OidcError {}
