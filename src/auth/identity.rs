//! The requesting principal.

use serde::Serialize;

use crate::db::User;

/// Display name of unauthenticated callers.
pub const GUEST_USERNAME: &str = "guest";

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Identity-provider subject; also the user id.
    pub subject: String,
    pub username: String,
    pub groups: Vec<String>,
    pub email: String,
    pub home: String,
    /// Set only for unauthenticated callers, never derived from the subject.
    #[serde(skip)]
    guest: bool,
}

impl Identity {
    /// An authenticated identity.
    pub fn new(
        subject: impl Into<String>,
        username: impl Into<String>,
        groups: Vec<String>,
        email: impl Into<String>,
        home: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            username: username.into(),
            groups,
            email: email.into(),
            home: home.into(),
            guest: false,
        }
    }

    /// The anonymous identity, member of `guest_group` only.
    ///
    /// Its subject is empty, which no identity provider issues.
    pub fn guest(guest_group: &str) -> Self {
        Self {
            subject: String::new(),
            username: GUEST_USERNAME.to_string(),
            groups: vec![guest_group.to_string()],
            email: String::new(),
            home: "/".to_string(),
            guest: true,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.guest
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self::new(user.id, user.username, user.groups, user.email, user.home)
    }
}
