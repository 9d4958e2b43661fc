use crate::core::{LoginError, Password, UserId, UserMode};

const MAX_USERNAME_CHARS: usize = 64;

// ---------------------------------------------------------------------------
// ParticipantDirectory — registered members plus the anonymous entry password
// ---------------------------------------------------------------------------

/// Authenticates participants as registered members or anonymous experiment users.
///
/// Uses a `Vec` scan instead of a map so every member entry is compared on
/// each login, keeping timing independent of where a match sits.
pub struct ParticipantDirectory {
    members: Vec<(UserId, Password)>,
    anonymous_password: Password,
}

impl ParticipantDirectory {
    pub fn new(members: Vec<(UserId, Password)>, anonymous_password: Password) -> Self {
        Self {
            members,
            anonymous_password,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Resolve a login attempt to the participant's mode.
    ///
    /// A registered name must present its own password; an unregistered name
    /// enters anonymously with the shared experiment password.
    pub fn authenticate(&self, username: &str, password: &Password) -> Result<UserMode, LoginError> {
        if !is_safe_username(username) {
            return Err(LoginError::UnsafeUsername(username.to_owned()));
        }

        let mut registered = false;
        let mut member_ok = false;
        for (name, stored) in &self.members {
            if name.as_str() == username {
                registered = true;
                member_ok = stored == password;
            }
        }

        if registered {
            if member_ok {
                Ok(UserMode::Member)
            } else {
                Err(LoginError::InvalidCredentials)
            }
        } else if &self.anonymous_password == password {
            Ok(UserMode::Anonymous)
        } else {
            Err(LoginError::InvalidCredentials)
        }
    }
}

/// Whether `username` can appear inside a session document key.
pub fn is_safe_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_CHARS
        && !username.starts_with('.')
        && !username.contains("..")
        && !username
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
