//! Authentication session and token storage.
//!
//! [`TokenStore`] abstracts where the bearer token lives so the transport
//! and the push connection can share it; [`MemoryTokenStore`] is the default
//! in-process implementation. [`AuthSession`] drives the register/login/
//! restore/logout flows and holds the signed-in user.

use std::sync::{Arc, RwLock};

use crate::api::AuthApi;
use crate::error::ApiError;
use crate::models::{LoginRequest, RegisterRequest, User};

/// Shared storage for the bearer token.
pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn save_token(&self, token: &str);
    fn clear(&self);
}

/// In-memory token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    fn save_token(&self, token: &str) {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token.to_string());
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.token.write() {
            *slot = None;
        }
    }
}

/// Client-side input checks, applied before any network call.
pub mod validation {
    use crate::error::ApiError;

    pub fn email(email: &str) -> Result<(), ApiError> {
        let email = email.trim();
        if email.contains('@') && email.contains('.') {
            Ok(())
        } else {
            Err(ApiError::ClientError("Please enter a valid email".into()))
        }
    }

    pub fn password(password: &str) -> Result<(), ApiError> {
        if password.len() >= 6 {
            Ok(())
        } else {
            Err(ApiError::ClientError(
                "Password must be at least 6 characters".into(),
            ))
        }
    }

    pub fn name(name: &str) -> Result<(), ApiError> {
        if name.trim().is_empty() {
            Err(ApiError::ClientError("Please enter your name".into()))
        } else {
            Ok(())
        }
    }
}

/// Sign-in state: the token plus the user it belongs to.
pub struct AuthSession<A> {
    api: A,
    tokens: Arc<dyn TokenStore>,
    current_user: RwLock<Option<User>>,
}

impl<A: AuthApi> AuthSession<A> {
    pub fn new(api: A, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            tokens,
            current_user: RwLock::new(None),
        }
    }

    /// Create an account and sign in.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        validation::name(name)?;
        validation::email(email)?;
        validation::password(password)?;

        let response = self
            .api
            .register(RegisterRequest {
                email: email.trim().to_string(),
                password: password.to_string(),
                name: name.trim().to_string(),
            })
            .await?;
        self.adopt(response.token, response.user.clone());
        Ok(response.user)
    }

    /// Sign in with existing credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        validation::email(email)?;
        validation::password(password)?;

        let response = self
            .api
            .login(LoginRequest {
                email: email.trim().to_string(),
                password: password.to_string(),
            })
            .await?;
        self.adopt(response.token, response.user.clone());
        Ok(response.user)
    }

    /// Resume a stored session by validating the token against the server.
    /// A dead token clears the session instead of erroring repeatedly.
    pub async fn restore(&self) -> Result<Option<User>, ApiError> {
        if self.tokens.token().is_none() {
            return Ok(None);
        }
        match self.api.current_user().await {
            Ok(user) => {
                if let Ok(mut slot) = self.current_user.write() {
                    *slot = Some(user.clone());
                }
                Ok(Some(user))
            }
            Err(err) if err.is_unauthorized() => {
                self.logout();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Drop the token and the signed-in user.
    pub fn logout(&self) {
        self.tokens.clear();
        if let Ok(mut slot) = self.current_user.write() {
            *slot = None;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some() && self.tokens.token().is_some()
    }

    pub fn current_user(&self) -> Option<User> {
        self.current_user.read().ok().and_then(|u| u.clone())
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.current_user().map(|u| u.id)
    }

    fn adopt(&self, token: String, user: User) {
        self.tokens.save_token(&token);
        if let Ok(mut slot) = self.current_user.write() {
            *slot = Some(user);
        }
        log::info!("signed in as {}", self.current_user_id().unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthResponse;
    use std::sync::Mutex;

    /// Scripted auth backend.
    struct FakeAuthApi {
        responses: Mutex<Vec<Result<AuthResponse, ApiError>>>,
        me: Mutex<Option<Result<User, ApiError>>>,
    }

    impl FakeAuthApi {
        fn new() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                me: Mutex::new(None),
            }
        }

        fn push(&self, response: Result<AuthResponse, ApiError>) {
            self.responses.lock().unwrap().push(response);
        }
    }

    impl AuthApi for &FakeAuthApi {
        async fn register(&self, _req: RegisterRequest) -> Result<AuthResponse, ApiError> {
            self.responses.lock().unwrap().remove(0)
        }

        async fn login(&self, _req: LoginRequest) -> Result<AuthResponse, ApiError> {
            self.responses.lock().unwrap().remove(0)
        }

        async fn current_user(&self) -> Result<User, ApiError> {
            self.me.lock().unwrap().take().unwrap()
        }
    }

    fn ok_response(id: &str) -> Result<AuthResponse, ApiError> {
        Ok(AuthResponse {
            token: format!("token-{id}"),
            user: User::new(id, "a@example.com", "Alice"),
        })
    }

    #[tokio::test]
    async fn test_login_adopts_token_and_user() {
        let api = FakeAuthApi::new();
        api.push(ok_response("u1"));
        let tokens = Arc::new(MemoryTokenStore::new());
        let session = AuthSession::new(&api, tokens.clone());

        let user = session.login("a@example.com", "secret1").await.unwrap();
        assert_eq!(user.id, "u1");
        assert!(session.is_authenticated());
        assert_eq!(tokens.token().as_deref(), Some("token-u1"));
    }

    #[tokio::test]
    async fn test_login_rejects_invalid_input_before_network() {
        let api = FakeAuthApi::new(); // would panic if called
        let session = AuthSession::new(&api, Arc::new(MemoryTokenStore::new()));

        let err = session.login("not-an-email", "secret1").await.unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid email");

        let err = session.login("a@example.com", "short").await.unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 6 characters");
    }

    #[tokio::test]
    async fn test_register_requires_name() {
        let api = FakeAuthApi::new();
        let session = AuthSession::new(&api, Arc::new(MemoryTokenStore::new()));
        let err = session
            .register("   ", "a@example.com", "secret1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please enter your name");
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let api = FakeAuthApi::new();
        api.push(ok_response("u1"));
        let tokens = Arc::new(MemoryTokenStore::new());
        let session = AuthSession::new(&api, tokens.clone());
        session.login("a@example.com", "secret1").await.unwrap();

        session.logout();
        assert!(!session.is_authenticated());
        assert!(tokens.token().is_none());
        assert!(session.current_user().is_none());
    }

    #[tokio::test]
    async fn test_restore_with_dead_token_signs_out() {
        let api = FakeAuthApi::new();
        *api.me.lock().unwrap() = Some(Err(ApiError::Unauthorized));
        let tokens = Arc::new(MemoryTokenStore::new());
        tokens.save_token("stale");
        let session = AuthSession::new(&api, tokens.clone());

        let restored = session.restore().await.unwrap();
        assert!(restored.is_none());
        assert!(tokens.token().is_none());
    }

    #[tokio::test]
    async fn test_restore_without_token_is_noop() {
        let api = FakeAuthApi::new();
        let session = AuthSession::new(&api, Arc::new(MemoryTokenStore::new()));
        assert!(session.restore().await.unwrap().is_none());
    }
}
