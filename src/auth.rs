use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::database::{Database, NewUser, StoreError};

pub const DEFAULT_ROLE: &str = "user";
pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Database connection failed")]
    ConnectionFailed,
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("Failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Password worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok())
        .as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_some_and(|re| re.is_match(email))
}

/// At least 8 characters with upper case, lower case and a digit.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(char::is_uppercase)
        && password.chars().any(char::is_lowercase)
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Collects every failing signup rule.
pub fn validate_signup(form: &SignupForm) -> Result<(), AuthError> {
    let mut errors = Vec::new();

    let fields = [
        &form.full_name,
        &form.username,
        &form.email,
        &form.password,
        &form.confirm_password,
    ];
    if fields.iter().any(|f| f.is_empty()) {
        errors.push("All fields are required".to_string());
    }
    if form.username.chars().count() < MIN_USERNAME_LEN {
        errors.push(format!(
            "Username must be at least {MIN_USERNAME_LEN} characters long"
        ));
    }
    if !is_valid_email(&form.email) {
        errors.push("Invalid email format".to_string());
    }
    if !is_strong_password(&form.password) {
        errors.push("Password does not meet requirements".to_string());
    }
    if form.password != form.confirm_password {
        errors.push("Passwords do not match".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Validation(errors))
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// [`hash_password`] on the blocking pool so request workers keep serving.
pub async fn hash_in_background(password: String, cost: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost)).await?
}

pub async fn verify_in_background(password: String, hash: String) -> Result<bool, AuthError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?)
}

/// Maps a unique index rejection back to the field that clashed.
fn account_conflict(err: StoreError) -> AuthError {
    match err {
        StoreError::Duplicate(column) if column.ends_with("email") => AuthError::EmailTaken,
        StoreError::Duplicate(_) => AuthError::UsernameTaken,
        other => AuthError::Store(other),
    }
}

pub struct NewAccount<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
}

impl<'a> From<&'a SignupForm> for NewAccount<'a> {
    fn from(form: &'a SignupForm) -> Self {
        NewAccount {
            username: &form.username,
            email: &form.email,
            password: &form.password,
            full_name: &form.full_name,
        }
    }
}

pub async fn create_account(
    db: Option<&Database>,
    account: NewAccount<'_>,
    cost: u32,
) -> Result<(), AuthError> {
    let db = db.ok_or(AuthError::ConnectionFailed)?;

    if db.username_exists(account.username).await? {
        return Err(AuthError::UsernameTaken);
    }
    if db.email_exists(account.email).await? {
        return Err(AuthError::EmailTaken);
    }

    // The checks above give early answers; the unique indexes settle concurrent signups.
    let password_hash = hash_in_background(account.password.to_string(), cost).await?;
    db.insert_user(&NewUser {
        username: account.username,
        email: account.email,
        password_hash: &password_hash,
        full_name: account.full_name,
        role: DEFAULT_ROLE,
        created_at: Utc::now(),
    })
    .await
    .map_err(account_conflict)?;

    info!(username = account.username, "account created");
    Ok(())
}

/// Returns the profile when the credentials match, `None` otherwise.
pub async fn authenticate(
    db: Option<&Database>,
    username: &str,
    password: &str,
) -> Result<Option<UserProfile>, AuthError> {
    let db = db.ok_or(AuthError::ConnectionFailed)?;

    let Some(user) = db.find_user(username).await? else {
        return Ok(None);
    };
    if !verify_in_background(password.to_string(), user.password_hash.clone()).await? {
        warn!(username, "failed login attempt");
        return Ok(None);
    }

    db.touch_last_login(user.id, Utc::now()).await?;
    Ok(Some(UserProfile {
        username: user.username,
        email: user.email,
        full_name: user.full_name,
        role: user.role,
        created_at: user.created_at,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    const TEST_COST: u32 = 4;

    fn form() -> SignupForm {
        SignupForm {
            full_name: "Avery Lee".to_string(),
            username: "avery".to_string(),
            email: "avery@example.com".to_string(),
            password: "Secret123".to_string(),
            confirm_password: "Secret123".to_string(),
        }
    }

    #[test]
    fn valid_form_passes() {
        assert!(validate_signup(&form()).is_ok());
    }

    #[test]
    fn every_failing_rule_is_reported() {
        let bad = SignupForm {
            full_name: String::new(),
            username: "av".to_string(),
            email: "avery@example".to_string(),
            password: "short".to_string(),
            confirm_password: "other".to_string(),
        };
        match validate_signup(&bad) {
            Err(AuthError::Validation(errors)) => assert_eq!(errors.len(), 5),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn password_strength_rules() {
        assert!(is_strong_password("Abcdefg1"));
        assert!(!is_strong_password("abcdefg1"));
        assert!(!is_strong_password("ABCDEFG1"));
        assert!(!is_strong_password("Abcdefgh"));
        assert!(!is_strong_password("Abc1"));
    }

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let first = hash_password("Secret123", TEST_COST).unwrap();
        let second = hash_password("Secret123", TEST_COST).unwrap();
        assert_ne!(first, second);
        assert!(verify_password("Secret123", &first));
        assert!(!verify_password("secret123", &first));
        assert!(!verify_password("Secret123", "not-a-hash"));
    }

    #[tokio::test]
    async fn accounts_require_a_store() {
        let result = create_account(None, NewAccount::from(&form()), TEST_COST).await;
        assert!(matches!(result, Err(AuthError::ConnectionFailed)));
        assert!(matches!(
            authenticate(None, "avery", "Secret123").await,
            Err(AuthError::ConnectionFailed)
        ));
    }

    #[tokio::test]
    async fn signup_then_login() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        create_account(Some(&db), NewAccount::from(&form()), TEST_COST)
            .await
            .unwrap();

        let profile = authenticate(Some(&db), "avery", "Secret123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.email, "avery@example.com");
        assert_eq!(profile.role, DEFAULT_ROLE);
        assert_eq!(profile.display_name(), "Avery Lee");

        assert_eq!(authenticate(Some(&db), "avery", "wrong").await.unwrap(), None);
        assert_eq!(authenticate(Some(&db), "nobody", "Secret123").await.unwrap(), None);

        let last_login = db.find_user("avery").await.unwrap().unwrap().last_login;
        assert!(last_login.is_some());
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_rejected() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let original = form();
        create_account(Some(&db), NewAccount::from(&original), TEST_COST)
            .await
            .unwrap();

        let mut same_name = form();
        same_name.email = "other@example.com".to_string();
        assert!(matches!(
            create_account(Some(&db), NewAccount::from(&same_name), TEST_COST).await,
            Err(AuthError::UsernameTaken)
        ));

        let mut same_email = form();
        same_email.username = "blake".to_string();
        assert!(matches!(
            create_account(Some(&db), NewAccount::from(&same_email), TEST_COST).await,
            Err(AuthError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn concurrent_signups_for_one_username_create_one_account() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let first = form();
        let mut second = form();
        second.email = "avery.lee@example.com".to_string();

        let (a, b) = tokio::join!(
            create_account(Some(&db), NewAccount::from(&first), TEST_COST),
            create_account(Some(&db), NewAccount::from(&second), TEST_COST),
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AuthError::UsernameTaken))));
        assert_eq!(db.stats().await.unwrap().users, 1);
    }

    #[test]
    fn index_rejections_map_to_the_clashing_field() {
        assert!(matches!(
            account_conflict(StoreError::Duplicate("users.email".to_string())),
            AuthError::EmailTaken
        ));
        assert!(matches!(
            account_conflict(StoreError::Duplicate("users.username".to_string())),
            AuthError::UsernameTaken
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hashing_leaves_the_runtime_free() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Cost 10 takes tens of milliseconds, long enough for the ticker to run.
        let hash = hash_in_background("Secret123".to_string(), 10).await.unwrap();
        ticker.abort();

        assert!(ticks.load(Ordering::SeqCst) > 0);
        assert!(verify_in_background("Secret123".to_string(), hash).await.unwrap());
    }
}
