use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::Cache;
use crate::data::{ApiResult, ProfileService, Registration};
use crate::model::User;

/// Authentication state: the signed-in user and their token, persisted
/// through the cache so a restart stays signed in until the token's TTL
/// runs out.
pub struct Session {
    cache: Arc<Cache>,
    profile: Arc<dyn ProfileService>,
    user: Option<User>,
}

impl Session {
    pub fn new(cache: Arc<Cache>, profile: Arc<dyn ProfileService>) -> Self {
        Self {
            cache,
            profile,
            user: None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Pick up a persisted token on startup. An expired or missing token
    /// leaves the session signed out; a token the service no longer
    /// accepts is discarded.
    pub fn restore(&mut self, adopt_token: impl FnOnce(String)) -> Result<()> {
        let Some(token) = self
            .cache
            .auth_token()
            .context("session: read persisted token")?
        else {
            return Ok(());
        };
        adopt_token(token);
        match self.profile.current_user() {
            Ok(user) => {
                self.user = Some(user);
                Ok(())
            }
            Err(_) => {
                self.cache
                    .clear_auth_token()
                    .context("session: drop rejected token")?;
                Ok(())
            }
        }
    }

    pub fn login(&mut self, email: &str, password: &str) -> ApiResult<User> {
        let response = self.profile.login(email, password)?;
        // Persistence failure only costs the next restart a fresh login.
        let _ = self.cache.set_auth_token(&response.token);
        self.user = Some(response.user.clone());
        Ok(response.user)
    }

    pub fn register(&self, registration: Registration) -> ApiResult<User> {
        self.profile.register(registration)
    }

    pub fn logout(&mut self) -> Result<()> {
        if let Err(err) = self.profile.logout() {
            return Err(anyhow::Error::new(err).context("session: logout"));
        }
        self.user = None;
        self.cache
            .clear_auth_token()
            .context("session: clear persisted token")
    }
}
