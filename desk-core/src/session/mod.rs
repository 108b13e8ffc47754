//! Session state
//!
//! - [`identity`]: identity sources (manual / demo)
//! - [`Session`]: resolved profile of the signed-in identity

pub mod identity;

pub use identity::{AuthIdentity, IdentityProvider, ManualIdentityProvider};

use shared::models::User;

/// Session as seen by the engines
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Session {
    #[default]
    SignedOut,
    /// Identity known, profile read in flight
    Resolving { uid: String },
    Active(User),
    /// Identity has no `users` document
    ProfileMissing { uid: String },
    /// Profile could not be read or decoded
    Failed { uid: String, message: String },
}

impl Session {
    pub fn user(&self) -> Option<&User> {
        match self {
            Session::Active(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Session::Active(_))
    }

    pub fn uid(&self) -> Option<&str> {
        match self {
            Session::SignedOut => None,
            Session::Resolving { uid }
            | Session::ProfileMissing { uid }
            | Session::Failed { uid, .. } => Some(uid),
            Session::Active(user) => Some(&user.uid),
        }
    }
}
