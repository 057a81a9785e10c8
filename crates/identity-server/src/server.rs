//! Identity HTTP server.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRef, FromRequest, Path, Query, State},
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use validator::Validate;

use identity_core::config::Config;
use identity_core::store::{IdentityStore, open_store};
use identity_core::types::{OrgId, Organization, UserId, UserView};

use crate::ServerError;
use crate::audit::{AuditLog, AuditRecord};
use crate::auth::jwks::JwkSet;
use crate::auth::jwt::{TokenCodec, TokenPair};
use crate::auth::keys::{KeyMode, KeyProvider};
use crate::auth::middleware::{CurrentUser, CurrentUserResolver};
use crate::auth::service::AuthService;
use crate::error::IdentityError;
use crate::events::BroadcastPublisher;
use crate::middleware::{CLEANUP_INTERVAL, RateLimits, rate_limit};
use crate::models::{
    ConfirmEmailRequest, ConfirmEmailResponse, CreateOrganizationRequest, DetailResponse,
    InviteUserRequest, LinkedUser, LoginRequest, LoginResponse, OrganizationView, RefreshRequest,
    RegisterRequest, SetRoleRequest, UpdateOrganizationRequest,
};
use crate::orgs::OrganizationService;
use crate::registry::{self, RegistryLookup};

/// Name reported by `/health` and `/`.
pub const SERVICE_NAME: &str = "identity";

const JWKS_CACHE_CONTROL: &str = "public, max-age=3600";
const DEFAULT_AUDIT_LIMIT: usize = 100;

/// Shared handler state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    /// Account lifecycle.
    pub auth: Arc<AuthService>,
    /// Organizations and memberships.
    pub orgs: Arc<OrganizationService>,
    /// Bearer token resolution.
    pub resolver: Arc<CurrentUserResolver>,
    /// Backing store.
    pub store: Arc<dyn IdentityStore>,
    /// Signing and verification keys.
    pub keys: Arc<KeyProvider>,
    /// Audit trail.
    pub audit: Arc<AuditLog>,
    /// Domain event channel.
    pub events: BroadcastPublisher,
    /// Request quotas.
    pub limits: Arc<RateLimits>,
    /// Effective configuration.
    pub config: Arc<Config>,
}

impl FromRef<AppState> for Arc<CurrentUserResolver> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.resolver)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store.backend_name())
            .field("keys", &self.keys)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Identity server.
#[derive(Debug)]
pub struct Server {
    state: AppState,
}

/// Builder for constructing a [`Server`] with its dependencies.
///
/// Anything not supplied is created from the configuration.
pub struct ServerBuilder {
    config: Config,
    store: Option<Arc<dyn IdentityStore>>,
    registry: Option<Arc<dyn RegistryLookup>>,
    events: Option<BroadcastPublisher>,
    keys: Option<Arc<KeyProvider>>,
}

impl ServerBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            store: None,
            registry: None,
            events: None,
            keys: None,
        }
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use an already opened store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific company registry client.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn RegistryLookup>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use an existing event publisher.
    #[must_use]
    pub fn with_events(mut self, events: BroadcastPublisher) -> Self {
        self.events = Some(events);
        self
    }

    /// Use pre-built keys.
    #[must_use]
    pub fn with_keys(mut self, keys: Arc<KeyProvider>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Server` if the store can't be opened and
    /// `ServerError::Config` if the auth settings or key files are invalid.
    pub fn build(self) -> Result<Server, ServerError> {
        let config = self.config;

        let store = match self.store {
            Some(store) => store,
            None => open_store(&config.store, &config.data_dir())
                .map_err(|e| ServerError::Server(format!("Failed to open store: {e}")))?,
        };

        let keys = self
            .keys
            .unwrap_or_else(|| Arc::new(KeyProvider::from_config(&config.auth)));
        keys.describe()
            .map_err(|e| ServerError::Config(format!("Key setup failed: {e}")))?;

        let codec = Arc::new(TokenCodec::from_config(Arc::clone(&keys), &config.auth));
        let events = self
            .events
            .unwrap_or_else(|| BroadcastPublisher::from_config(&config.events));
        let registry = self
            .registry
            .unwrap_or_else(|| registry::from_config(&config.registry));
        let audit = Arc::new(AuditLog::default());

        let auth = AuthService::new(
            &config.auth,
            Arc::clone(&store),
            Arc::clone(&codec),
            Arc::new(events.clone()),
            Arc::clone(&audit),
        )
        .map_err(|e| ServerError::Config(format!("Auth init failed: {e}")))?;

        let orgs = OrganizationService::new(
            Arc::clone(&store),
            registry,
            Arc::new(events.clone()),
            Arc::clone(&audit),
        );

        let state = AppState {
            auth: Arc::new(auth),
            orgs: Arc::new(orgs),
            resolver: Arc::new(CurrentUserResolver::new(codec, Arc::clone(&store))),
            store,
            keys,
            audit,
            events,
            limits: Arc::new(RateLimits::from_config(&config.rate_limit)),
            config: Arc::new(config),
        };

        Ok(Server { state })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Create a server from configuration alone.
    ///
    /// # Errors
    ///
    /// See [`ServerBuilder::build`].
    pub fn new(config: Config) -> Result<Self, ServerError> {
        ServerBuilder::new().with_config(config).build()
    }

    /// Shared handler state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// The full application router, with middleware.
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the server until it fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, the port can't be bound,
    /// or the server stops with an error.
    pub async fn run(&self) -> Result<(), ServerError> {
        let server = &self.state.config.server;

        match self.state.keys.describe() {
            Ok(KeyMode::SigningOnly) => tracing::warn!(
                "Public key unavailable: issued tokens will not verify until jwtPublicKeyPath is readable"
            ),
            Ok(mode) => tracing::info!(?mode, "Token keys loaded"),
            Err(e) => return Err(ServerError::Config(format!("Key setup failed: {e}"))),
        }

        let _event_tap = self.state.events.spawn_log_tap();
        let _limiter_cleanup = self.state.limits.spawn_cleanup(CLEANUP_INTERVAL);
        let app = self.router();

        let addr: SocketAddr = format!("{}:{}", server.host, server.port)
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid address: {e}")))?;

        tracing::info!(
            store = self.state.store.backend_name(),
            "Identity service listening on http://{}",
            addr
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| ServerError::Server(e.to_string()))
    }
}

/// Build the router for `state`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/signup/start", post(signup_start))
        .route("/signup/confirm-email", post(confirm_email))
        .route("/login", post(login))
        .route("/token/refresh", post(refresh_token))
        .route("/me", get(me))
        .route("/orgs", post(create_organization))
        .route("/orgs/my", get(my_organizations))
        .route(
            "/orgs/{org_id}",
            get(get_organization).patch(update_organization),
        )
        .route("/orgs/{org_id}/users", post(invite_user))
        .route("/admin/users/{user_id}/block", post(block_user))
        .route("/admin/users/{user_id}/unblock", post(unblock_user))
        .route("/admin/users/{user_id}/role", put(set_role))
        .route("/admin/audit", get(audit_log))
        .route("/internal/users/{user_id}", get(internal_user))
        .route("/internal/users/{user_id}/orgs", get(internal_user_orgs))
        .route("/internal/orgs/{org_id}", get(internal_organization))
        .route("/internal/orgs/{org_id}/users", get(internal_org_users));

    let server = &state.config.server;
    let cors = cors_layer(&server.cors_origins);
    let timeout = TimeoutLayer::new(Duration::from_secs(server.timeout_secs.max(1)));
    let limits = Arc::clone(&state.limits);

    Router::new()
        .route("/", get(root))
        .route("/.well-known/jwks.json", get(jwks))
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(limits, rate_limit))
        .layer(timeout)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// JSON body whose rejection uses the service error format.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(IdentityError))]
pub struct ApiJson<T>(pub T);

fn parse_id<T: FromStr>(raw: &str, field: &str) -> Result<T, IdentityError> {
    raw.parse()
        .map_err(|_| IdentityError::invalid_field(field, format!("'{raw}' is not a valid id")))
}

// Public endpoints

async fn root() -> Json<Value> {
    Json(json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Identity and authentication service",
        "jwks": "/.well-known/jwks.json",
        "api": {
            "v1": {
                "health": "/api/v1/health",
                "signup": "/api/v1/signup/start",
                "login": "/api/v1/login",
                "organizations": "/api/v1/orgs/my",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let connected = state.store.health_check().await;
    Json(json!({
        "status": if connected { "healthy" } else { "degraded" },
        "database": if connected { "connected" } else { "disconnected" },
        "service": SERVICE_NAME,
    }))
}

async fn jwks(State(state): State<AppState>) -> Result<impl IntoResponse, IdentityError> {
    let set = JwkSet::from_provider(&state.keys)?;
    Ok(([(CACHE_CONTROL, JWKS_CACHE_CONTROL)], Json(set)))
}

async fn signup_start(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserView>), IdentityError> {
    let user = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn confirm_email(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ConfirmEmailRequest>,
) -> Result<Json<ConfirmEmailResponse>, IdentityError> {
    let confirmed = state.auth.confirm_email(request).await?;
    Ok(Json(ConfirmEmailResponse { confirmed }))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, IdentityError> {
    Ok(Json(state.auth.authenticate(request).await?))
}

async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<TokenPair>, IdentityError> {
    request.validate()?;
    Ok(Json(state.auth.refresh(&request.refresh_token).await?))
}

// Authenticated endpoints

async fn me(CurrentUser(user): CurrentUser) -> Json<UserView> {
    Json(user)
}

async fn my_organizations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<OrganizationView>>, IdentityError> {
    Ok(Json(state.orgs.get_user_organizations(user.id()).await?))
}

async fn create_organization(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<OrganizationView>), IdentityError> {
    let org = state.orgs.create_organization(request, user.id()).await?;
    Ok((StatusCode::CREATED, Json(org)))
}

async fn get_organization(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(org_id): Path<String>,
) -> Result<Json<OrganizationView>, IdentityError> {
    let org_id: OrgId = parse_id(&org_id, "org_id")?;
    Ok(Json(state.orgs.get_organization(org_id, user.id()).await?))
}

async fn update_organization(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(org_id): Path<String>,
    ApiJson(request): ApiJson<UpdateOrganizationRequest>,
) -> Result<Json<OrganizationView>, IdentityError> {
    let org_id: OrgId = parse_id(&org_id, "org_id")?;
    Ok(Json(
        state
            .orgs
            .update_organization(org_id, user.id(), request)
            .await?,
    ))
}

async fn invite_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(org_id): Path<String>,
    ApiJson(request): ApiJson<InviteUserRequest>,
) -> Result<(StatusCode, Json<DetailResponse>), IdentityError> {
    let org_id: OrgId = parse_id(&org_id, "org_id")?;
    state.orgs.invite_user(org_id, user.id(), request).await?;
    Ok((
        StatusCode::CREATED,
        Json(DetailResponse {
            detail: "User invited successfully".to_string(),
        }),
    ))
}

// Admin endpoints

async fn block_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserView>, IdentityError> {
    admin.require_permission("admin.manage_users")?;
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    Ok(Json(state.auth.block_user(user_id, Some(admin.id())).await?))
}

async fn unblock_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserView>, IdentityError> {
    admin.require_permission("admin.manage_users")?;
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    Ok(Json(state.auth.unblock_user(user_id, Some(admin.id())).await?))
}

async fn set_role(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(user_id): Path<String>,
    ApiJson(request): ApiJson<SetRoleRequest>,
) -> Result<Json<UserView>, IdentityError> {
    admin.require_permission("admin.manage_roles")?;
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    Ok(Json(
        state
            .auth
            .set_role(user_id, request.role, Some(admin.id()))
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn audit_log(
    State(state): State<AppState>,
    admin: CurrentUser,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, IdentityError> {
    admin.require_permission("admin.system_config")?;
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    Ok(Json(state.audit.recent(limit).await))
}

// Internal endpoints, for trusted services on the private network

async fn internal_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserView>, IdentityError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    let user = state
        .store
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| IdentityError::not_found("User", user_id))?;
    Ok(Json(user.view()))
}

async fn internal_user_orgs(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Organization>>, IdentityError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    Ok(Json(state.store.get_organizations_for_user(user_id).await?))
}

async fn internal_organization(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Json<Organization>, IdentityError> {
    let org_id: OrgId = parse_id(&org_id, "org_id")?;
    let org = state
        .store
        .get_organization_by_id(org_id)
        .await?
        .ok_or_else(|| IdentityError::not_found("Organization", org_id))?;
    Ok(Json(org))
}

async fn internal_org_users(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Json<Vec<LinkedUser>>, IdentityError> {
    let org_id: OrgId = parse_id(&org_id, "org_id")?;
    Ok(Json(state.orgs.get_linked_users(org_id).await?))
}
