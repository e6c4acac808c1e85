use crate::error::Error;
use crate::models::{Session, TokenPair};
use crate::store::SessionStore;
use crate::token;

/// Domain operations over the session store.
#[derive(Clone)]
pub struct SessionManager {
    store: SessionStore,
}

impl SessionManager {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn session(&self) -> Result<Option<Session>, Error> {
        self.store.get()
    }

    pub fn set_session(&self, session: &Session) -> Result<(), Error> {
        self.store.set(session)
    }

    pub fn clear(&self) -> Result<(), Error> {
        self.store.clear()
    }

    /// A session exists and its access token has not expired as of `now`.
    pub fn is_authenticated(&self, now: i64) -> Result<bool, Error> {
        Ok(match self.store.get()? {
            Some(session) => !token::is_expired(&session.access_token, now),
            None => false,
        })
    }

    /// Builds the successor session after a refresh exchange.
    ///
    /// The refresh response carries only the new token pair, so the user id
    /// is re-derived from the new token's `sub` claim and the username is
    /// kept from the prior session. Returns `None` if the new access token
    /// does not decode; a pair we cannot read an expiry from must not be
    /// persisted.
    pub fn apply_refresh(prior: &Session, pair: TokenPair) -> Option<Session> {
        let claims = token::decode_claims(&pair.access_token)?;

        Some(Session {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user_id: claims.sub,
            username: prior.username.clone(),
        })
    }
}
