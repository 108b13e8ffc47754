//! Identity providers
//!
//! 身份来源只负责 "当前是谁"：uid 和邮箱。角色和部门由工作区从 `users` 集合解析。

use tokio::sync::watch;

use crate::core::Config;

/// Authenticated identity, decoupled from the user profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub uid: String,
    pub email: Option<String>,
}

impl AuthIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Source of the current identity
pub trait IdentityProvider: Send + Sync {
    /// Current identity (or `None`), then every change
    fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>>;
}

/// Identity driven by explicit sign-in / sign-out calls
#[derive(Debug)]
pub struct ManualIdentityProvider {
    tx: watch::Sender<Option<AuthIdentity>>,
}

impl Default for ManualIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualIdentityProvider {
    /// Signed out
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Already signed in as the demo identity
    pub fn demo(uid: impl Into<String>) -> Self {
        let provider = Self::new();
        provider.sign_in(AuthIdentity::new(uid));
        provider
    }

    /// 演示模式下启动即登录 `DEMO_UID`
    pub fn from_config(config: &Config) -> Self {
        if config.demo_mode {
            tracing::info!(uid = %config.demo_uid, "Demo mode: signing in demo identity");
            Self::demo(config.demo_uid.clone())
        } else {
            Self::new()
        }
    }

    /// Switch to `identity`; signing in as the current identity is a no-op
    pub fn sign_in(&self, identity: AuthIdentity) {
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&identity) {
                return false;
            }
            *current = Some(identity);
            true
        });
    }

    pub fn sign_out(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<AuthIdentity> {
        self.tx.borrow().clone()
    }
}

impl IdentityProvider for ManualIdentityProvider {
    fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>> {
        self.tx.subscribe()
    }
}
