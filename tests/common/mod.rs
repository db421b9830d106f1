// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use serde_json::{json, Value};
use social_connect::config::Config;
use social_connect::db::{FirestoreDb, MemoryDb};
use social_connect::error::{ProviderError, Result};
use social_connect::models::{
    Capabilities, OAuthSettings, Provider, ProviderKind, RawAttributes, SignatureMethod,
    TokenMaterial, TokenSessionSettings,
};
use social_connect::routes::create_router;
use social_connect::services::{
    AccountService, ClientConnector, OAuthApi, SocialServices, TokenSessionApi,
};
use social_connect::AppState;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── Fixtures ────────────────────────────────────────────────

#[allow(dead_code)]
pub fn token_session_provider() -> Provider {
    Provider::new(
        "fb",
        "Facebook",
        "https://api.facebook.test/restserver.php",
        Capabilities {
            people: true,
            groups: true,
            activities_push: true,
            activities_pull: false,
            notifications: true,
        },
        ProviderKind::TokenSession(TokenSessionSettings {
            login_url: "https://www.facebook.test/login.php".to_string(),
            api_key: "fb-key".to_string(),
            api_secret: "fb-secret".to_string(),
            api_version: "1.0".to_string(),
        }),
    )
}

/// OAuth provider without groups or notifications.
#[allow(dead_code)]
pub fn oauth_provider() -> Provider {
    Provider::new(
        "os",
        "Partuza",
        "https://partuza.test/social/rest",
        Capabilities {
            people: true,
            activities_push: true,
            ..Default::default()
        },
        ProviderKind::OAuth(OAuthSettings {
            consumer_key: "os-key".to_string(),
            consumer_secret: "os-secret".to_string(),
            request_token_url: "https://partuza.test/oauth/request_token".to_string(),
            authorization_url: "https://partuza.test/oauth/authorize".to_string(),
            access_token_url: "https://partuza.test/oauth/access_token".to_string(),
            token_validity_secs: 3600,
            signature_method: SignatureMethod::HmacSha1,
        }),
    )
}

fn attributes(value: Value) -> RawAttributes {
    match value {
        Value::Object(map) => map,
        _ => RawAttributes::new(),
    }
}

/// A token-session user record in native field names.
#[allow(dead_code)]
pub fn fb_user(uid: &str, name: &str) -> RawAttributes {
    attributes(json!({
        "uid": uid,
        "name": name,
        "sex": "male",
        "birthday": "March 5, 1980",
        "pic": format!("https://img.test/{}.jpg", uid),
    }))
}

/// An OAuth user record in native field names.
#[allow(dead_code)]
pub fn os_user(id: &str, name: &str) -> RawAttributes {
    attributes(json!({
        "id": id,
        "displayName": name,
        "gender": "FEMALE",
        "birthday": "1985-11-23",
    }))
}

#[allow(dead_code)]
pub fn session_tokens(token: &str, expires_at: i64) -> TokenMaterial {
    TokenMaterial::Session {
        token: token.to_string(),
        expires_at,
    }
}

#[allow(dead_code)]
pub fn oauth_tokens(token: &str, secret: &str, expires_at: i64) -> TokenMaterial {
    TokenMaterial::OAuth {
        token: token.to_string(),
        secret: secret.to_string(),
        expires_at,
    }
}

// ─── Scripted Provider ───────────────────────────────────────

/// Scripted remote platform shared by every client built by [`MockConnector`].
///
/// Counts every provider-native call and fails the next calls with the
/// queued error codes.
#[derive(Default)]
pub struct MockPlatform {
    calls: AtomicUsize,
    errors: Mutex<VecDeque<ProviderError>>,
    pub me: Mutex<RawAttributes>,
    pub friends: Mutex<Vec<RawAttributes>>,
    pub groups: Mutex<Vec<RawAttributes>>,
    pub published: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockPlatform {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, code: i64, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push_back(ProviderError::new(Some(code), message));
    }

    pub fn set_me(&self, me: RawAttributes) {
        *self.me.lock().unwrap() = me;
    }

    pub fn set_friends(&self, friends: Vec<RawAttributes>) {
        *self.friends.lock().unwrap() = friends;
    }

    pub fn set_groups(&self, groups: Vec<RawAttributes>) {
        *self.groups.lock().unwrap() = groups;
    }

    fn call(&self) -> std::result::Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.errors.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn records_with(&self, key: &str, ids: &[String]) -> Vec<RawAttributes> {
        let me = self.me.lock().unwrap().clone();
        let friends = self.friends.lock().unwrap().clone();
        std::iter::once(me)
            .chain(friends)
            .filter(|r| {
                r.get(key)
                    .and_then(Value::as_str)
                    .is_some_and(|id| ids.iter().any(|wanted| wanted == id))
            })
            .collect()
    }
}

pub struct MockTokenSession {
    uid: String,
    session_key: String,
    expires: i64,
    platform: Arc<MockPlatform>,
}

#[async_trait]
impl TokenSessionApi for MockTokenSession {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn session_key(&self) -> &str {
        &self.session_key
    }

    fn session_expires(&self) -> i64 {
        self.expires
    }

    async fn friends_get(&self) -> std::result::Result<Vec<String>, ProviderError> {
        self.platform.call()?;
        Ok(self
            .platform
            .friends
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.get("uid").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    async fn users_get_info(
        &self,
        uids: &[String],
        _fields: &[String],
    ) -> std::result::Result<Vec<RawAttributes>, ProviderError> {
        self.platform.call()?;
        Ok(self.platform.records_with("uid", uids))
    }

    async fn groups_get(&self, _uid: &str) -> std::result::Result<Vec<RawAttributes>, ProviderError> {
        self.platform.call()?;
        Ok(self.platform.groups.lock().unwrap().clone())
    }

    async fn feed_publish_user_action(
        &self,
        template_id: &str,
        _template_data: &Value,
        _target_ids: &[String],
    ) -> std::result::Result<Value, ProviderError> {
        self.platform.call()?;
        self.platform
            .published
            .lock()
            .unwrap()
            .push(template_id.to_string());
        Ok(json!({ "published": true }))
    }

    async fn notifications_send(
        &self,
        uids: &[String],
        _text: &str,
        _kind: &str,
    ) -> std::result::Result<Value, ProviderError> {
        self.platform.call()?;
        Ok(json!({ "sent": uids.len() }))
    }
}

pub struct MockOAuth {
    token: String,
    secret: String,
    expires: i64,
    platform: Arc<MockPlatform>,
}

#[async_trait]
impl OAuthApi for MockOAuth {
    fn token(&self) -> &str {
        &self.token
    }

    fn token_secret(&self) -> &str {
        &self.secret
    }

    fn token_expires(&self) -> i64 {
        self.expires
    }

    async fn get_uid(&self) -> std::result::Result<String, ProviderError> {
        self.platform.call()?;
        Ok(self
            .platform
            .me
            .lock()
            .unwrap()
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn get_friends(
        &self,
        _fields: &[String],
    ) -> std::result::Result<Vec<RawAttributes>, ProviderError> {
        self.platform.call()?;
        Ok(self.platform.friends.lock().unwrap().clone())
    }

    async fn get_users_profile(
        &self,
        ids: &[String],
        _fields: &[String],
    ) -> std::result::Result<Vec<RawAttributes>, ProviderError> {
        self.platform.call()?;
        if ids.len() == 1 && ids[0] == "@me" {
            return Ok(vec![self.platform.me.lock().unwrap().clone()]);
        }
        Ok(self.platform.records_with("id", ids))
    }

    async fn get_groups(&self) -> std::result::Result<Vec<RawAttributes>, ProviderError> {
        self.platform.call()?;
        Ok(self.platform.groups.lock().unwrap().clone())
    }

    async fn create_activity(
        &self,
        template_id: &str,
        _template_data: &Value,
        _target_ids: &[String],
    ) -> std::result::Result<Value, ProviderError> {
        self.platform.call()?;
        self.platform
            .published
            .lock()
            .unwrap()
            .push(template_id.to_string());
        Ok(json!({ "published": true }))
    }

    async fn send_message(
        &self,
        ids: &[String],
        _text: &str,
        _kind: &str,
    ) -> std::result::Result<Value, ProviderError> {
        self.platform.call()?;
        Ok(json!({ "sent": ids.len() }))
    }
}

/// Builds mock clients over one [`MockPlatform`].
#[derive(Default)]
pub struct MockConnector {
    pub platform: Arc<MockPlatform>,
    connects: AtomicUsize,
    /// Identity a token-session client reports instead of the persisted one
    pub session_uid: Mutex<Option<String>>,
    /// Session key a rebuilt token-session client reports (renewed session)
    pub renewed_key: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl MockConnector {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn token_session_client(&self, uid: &str, key: &str, expires: i64) -> Arc<MockTokenSession> {
        Arc::new(MockTokenSession {
            uid: uid.to_string(),
            session_key: key.to_string(),
            expires,
            platform: self.platform.clone(),
        })
    }

    pub fn oauth_client(&self, token: &str, secret: &str, expires: i64) -> Arc<MockOAuth> {
        Arc::new(MockOAuth {
            token: token.to_string(),
            secret: secret.to_string(),
            expires,
            platform: self.platform.clone(),
        })
    }
}

#[async_trait]
impl ClientConnector for MockConnector {
    async fn token_session(
        &self,
        _provider: &Provider,
        _settings: &TokenSessionSettings,
        session_key: &str,
        expires_at: i64,
        uid: &str,
    ) -> Result<Arc<dyn TokenSessionApi>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let uid = self
            .session_uid
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| uid.to_string());
        let key = self
            .renewed_key
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| session_key.to_string());
        Ok(self.token_session_client(&uid, &key, expires_at))
    }

    async fn oauth(
        &self,
        _provider: &Provider,
        _settings: &OAuthSettings,
        token: &str,
        secret: &str,
        expires_at: i64,
    ) -> Result<Arc<dyn OAuthApi>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.oauth_client(token, secret, expires_at))
    }
}

// ─── Harness ─────────────────────────────────────────────────

/// In-memory stores, one scripted platform, and the services over them.
pub struct Harness {
    pub db: MemoryDb,
    pub connector: Arc<MockConnector>,
    pub services: Arc<SocialServices>,
}

#[allow(dead_code)]
impl Harness {
    pub fn platform(&self) -> &MockPlatform {
        &self.connector.platform
    }

    pub fn accounts(&self) -> &AccountService {
        &self.services.accounts
    }
}

/// Harness with both fixture providers registered.
#[allow(dead_code)]
pub fn harness() -> Harness {
    social_connect::init_logging();

    let db = MemoryDb::new();
    db.upsert_provider(token_session_provider());
    db.upsert_provider(oauth_provider());

    let connector = Arc::new(MockConnector::default());
    let accounts = AccountService::new(Arc::new(db.clone()), Arc::new(db.clone()));
    let services = Arc::new(SocialServices::new(
        Arc::new(db.clone()),
        accounts,
        connector.clone(),
    ));

    Harness {
        db,
        connector,
        services,
    }
}

/// Create a test app over in-memory stores and the mock connector.
/// Returns the router, the shared state and the harness behind it.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Harness) {
    let harness = harness();
    let config = Config::test_default();

    let state = Arc::new(AppState::new(
        config,
        Arc::new(harness.db.clone()),
        Arc::new(harness.db.clone()),
        harness.connector.clone(),
    ));

    (create_router(state.clone()), state, harness)
}
