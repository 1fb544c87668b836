use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::TokenPair;
use crate::services::oauth::{refresh_pair, TokenEndpoint};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// How long a login `state` value stays redeemable
const LOGIN_STATE_TTL_MINUTES: i64 = 10;

/// Access tokens this close to expiry are refreshed before use
const REFRESH_MARGIN_SECONDS: i64 = 60;

const SESSION_TOKEN_DAYS: i64 = 7;

/// Credentials for one provider call, passed explicitly through every layer.
#[derive(Clone)]
pub struct AuthContext {
    pub session_id: Uuid,
    pub access_token: String,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Supplies the credentials for each provider call. Long-running work asks
/// again before every request so a refresh mid-run is picked up.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn current(&self) -> Result<AuthContext>;
}

#[async_trait]
impl TokenSource for AuthContext {
    async fn current(&self) -> Result<AuthContext> {
        Ok(self.clone())
    }
}

/// Live credentials of one session, refreshed on demand.
pub struct SessionTokens<'a> {
    sessions: &'a SessionService,
    session_id: Uuid,
}

#[async_trait]
impl TokenSource for SessionTokens<'_> {
    async fn current(&self) -> Result<AuthContext> {
        self.sessions.context(self.session_id).await
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub tokens: TokenPair,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Per-browser relay sessions. Each session owns its own token pair; the
/// browser only ever sees a signed session token.
pub struct SessionService {
    sessions: RwLock<HashMap<Uuid, Session>>,
    pending_states: RwLock<HashMap<String, DateTime<Utc>>>,
    oauth: Arc<dyn TokenEndpoint>,
    secret: String,
}

impl SessionService {
    pub fn new(oauth: Arc<dyn TokenEndpoint>, config: &Config) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pending_states: RwLock::new(HashMap::new()),
            oauth,
            secret: config.session_secret.clone(),
        }
    }

    /// Starts a login: remembers a fresh `state` and returns the authorize URL.
    pub async fn begin_login(&self) -> Result<String> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        let now = Utc::now();
        let mut pending = self.pending_states.write().await;
        pending.retain(|_, expires| *expires > now);
        pending.insert(state.clone(), now + Duration::minutes(LOGIN_STATE_TTL_MINUTES));
        drop(pending);

        self.oauth.authorize_url(&state)
    }

    /// Finishes a login. Returns the new session id and its signed token.
    pub async fn complete_login(&self, code: &str, state: &str) -> Result<(Uuid, String)> {
        let expires = self.pending_states.write().await.remove(state);
        match expires {
            Some(expires) if expires > Utc::now() => {}
            Some(_) => return Err(AppError::Auth("Login attempt expired".to_string())),
            None => return Err(AppError::Auth("Unknown login state".to_string())),
        }

        let tokens = self.oauth.exchange_code(code).await?;
        let session_id = self.create_session(tokens).await;
        let token = self.issue_token(session_id)?;

        tracing::info!("Session {} authenticated", session_id);
        Ok((session_id, token))
    }

    /// Stores a new session. Sessions idle for longer than a session token
    /// lives are dropped first; no token can still reference them.
    pub async fn create_session(&self, tokens: TokenPair) -> Uuid {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            tokens,
            created_at: now,
            last_used: now,
        };
        let id = session.id;

        let cutoff = now - Duration::days(SESSION_TOKEN_DAYS);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_used > cutoff);
        if sessions.len() < before {
            tracing::info!("Pruned {} idle sessions", before - sessions.len());
        }
        sessions.insert(id, session);
        id
    }

    pub fn issue_token(&self, session_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: session_id,
            iat: now.timestamp(),
            exp: (now + Duration::days(SESSION_TOKEN_DAYS)).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Session token generation failed: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized)?;

        Ok(token_data.claims)
    }

    pub async fn exists(&self, session_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    pub fn tokens(&self, session_id: Uuid) -> SessionTokens<'_> {
        SessionTokens {
            sessions: self,
            session_id,
        }
    }

    /// Credentials for a provider call, refreshing first when the access
    /// token is about to expire.
    pub async fn context(&self, session_id: Uuid) -> Result<AuthContext> {
        {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or(AppError::NotAuthenticated)?;
            session.last_used = Utc::now();

            if !session
                .tokens
                .expires_within(Duration::seconds(REFRESH_MARGIN_SECONDS))
            {
                return Ok(AuthContext {
                    session_id,
                    access_token: session.tokens.access_token.clone(),
                });
            }
        }

        tracing::debug!("Access token for session {} is expiring, refreshing", session_id);
        self.refresh(session_id).await
    }

    /// Forces a token refresh for the session.
    pub async fn refresh(&self, session_id: Uuid) -> Result<AuthContext> {
        let current = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .map(|s| s.tokens.clone())
            .ok_or(AppError::NotAuthenticated)?;

        // No lock is held across the provider call
        let refreshed = refresh_pair(self.oauth.as_ref(), &current).await?;

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(AppError::NotAuthenticated)?;
        session.tokens = refreshed;
        session.last_used = Utc::now();

        tracing::info!("Refreshed access token for session {}", session_id);
        Ok(AuthContext {
            session_id,
            access_token: session.tokens.access_token.clone(),
        })
    }

    pub async fn token_expiry(&self, session_id: Uuid) -> Option<DateTime<Utc>> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|s| s.tokens.expires_at)
    }

    pub async fn logout(&self, session_id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&session_id).is_some();
        if removed {
            tracing::info!("Session {} logged out", session_id);
        }
        removed
    }
}
