use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::auth::UserProfile;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Login,
    Signup,
    Dashboard,
}

/// Per-request authentication state.
#[derive(Debug, Clone, PartialEq)]
pub enum Session {
    LoggedOut,
    LoggedIn(UserProfile),
}

impl Session {
    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Session::LoggedIn(user) => Some(user),
            Session::LoggedOut => None,
        }
    }

    /// The page actually shown for a requested page.
    pub fn page(&self, requested: Page) -> Page {
        match (self, requested) {
            (Session::LoggedIn(_), _) => Page::Dashboard,
            (Session::LoggedOut, Page::Signup) => Page::Signup,
            (Session::LoggedOut, _) => Page::Login,
        }
    }
}

/// How long a login stays valid after it was issued.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

#[derive(Debug)]
struct Entry {
    user: UserProfile,
    issued_at: Instant,
}

/// Live sessions keyed by the cookie token. Entries expire `ttl` after login.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `user`, dropping any sessions that have expired.
    pub fn open(&self, user: UserProfile) -> Uuid {
        let token = Uuid::new_v4();
        if let Ok(mut sessions) = self.sessions.write() {
            let ttl = self.ttl;
            sessions.retain(|_, entry| entry.issued_at.elapsed() < ttl);
            sessions.insert(
                token,
                Entry {
                    user,
                    issued_at: Instant::now(),
                },
            );
        }
        token
    }

    pub fn resolve(&self, token: &str) -> Session {
        let Ok(token) = Uuid::parse_str(token) else {
            return Session::LoggedOut;
        };

        let found = self.sessions.read().ok().and_then(|sessions| {
            sessions
                .get(&token)
                .map(|entry| (entry.user.clone(), entry.issued_at.elapsed() >= self.ttl))
        });
        match found {
            Some((user, false)) => Session::LoggedIn(user),
            Some((_, true)) => {
                if let Ok(mut sessions) = self.sessions.write() {
                    sessions.remove(&token);
                }
                Session::LoggedOut
            }
            None => Session::LoggedOut,
        }
    }

    pub fn close(&self, token: &str) -> bool {
        let Ok(token) = Uuid::parse_str(token) else {
            return false;
        };
        self.sessions
            .write()
            .map(|mut sessions| sessions.remove(&token).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile() -> UserProfile {
        UserProfile {
            username: "avery".into(),
            email: "avery@example.com".into(),
            full_name: "Avery Lee".into(),
            role: "user".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn logged_out_visitors_only_see_auth_pages() {
        let session = Session::LoggedOut;
        assert_eq!(session.page(Page::Dashboard), Page::Login);
        assert_eq!(session.page(Page::Signup), Page::Signup);
        assert_eq!(session.page(Page::Login), Page::Login);
        assert!(session.user().is_none());
    }

    #[test]
    fn logged_in_users_land_on_dashboard() {
        let session = Session::LoggedIn(profile());
        assert_eq!(session.page(Page::Login), Page::Dashboard);
        assert_eq!(session.page(Page::Signup), Page::Dashboard);
        assert_eq!(session.user().map(|u| u.username.as_str()), Some("avery"));
    }

    #[test]
    fn sessions_open_resolve_and_close() {
        let store = SessionStore::new();
        let user = profile();
        let token = store.open(user.clone()).to_string();

        assert_eq!(store.resolve(&token), Session::LoggedIn(user));
        assert_eq!(store.len(), 1);

        assert!(store.close(&token));
        assert!(!store.close(&token));
        assert_eq!(store.resolve(&token), Session::LoggedOut);
        assert!(store.is_empty());
    }

    #[test]
    fn malformed_tokens_are_logged_out() {
        let store = SessionStore::new();
        store.open(profile());
        assert_eq!(store.resolve("not-a-token"), Session::LoggedOut);
        assert_eq!(store.resolve(&Uuid::new_v4().to_string()), Session::LoggedOut);
    }

    #[test]
    fn expired_sessions_are_logged_out_and_removed() {
        let store = SessionStore::with_ttl(Duration::ZERO);
        let token = store.open(profile()).to_string();

        assert_eq!(store.resolve(&token), Session::LoggedOut);
        assert!(store.is_empty());
    }

    #[test]
    fn opening_a_session_evicts_stale_ones() {
        let store = SessionStore::with_ttl(Duration::from_millis(20));
        let stale = store.open(profile()).to_string();
        std::thread::sleep(Duration::from_millis(30));

        let fresh = store.open(profile()).to_string();
        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve(&stale), Session::LoggedOut);
        assert!(matches!(store.resolve(&fresh), Session::LoggedIn(_)));
    }

    #[test]
    fn default_ttl_keeps_fresh_logins() {
        let store = SessionStore::new();
        assert_eq!(store.ttl(), DEFAULT_SESSION_TTL);
        let token = store.open(profile()).to_string();
        assert!(matches!(store.resolve(&token), Session::LoggedIn(_)));
    }
}
