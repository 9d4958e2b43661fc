use std::fmt;

// ---------------------------------------------------------------------------
// String-based identity newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(UserId);
string_newtype!(Timestamp);

// ---------------------------------------------------------------------------
// SessionId — (user, start time) pair naming one transcript document
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId {
    user: UserId,
    start_time: Timestamp,
}

impl SessionId {
    pub fn new(user: UserId, start_time: Timestamp) -> Self {
        Self { user, start_time }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn start_time(&self) -> &Timestamp {
        &self.start_time
    }

    /// Document key, `{user}_{start_time}`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.user, self.start_time)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.user, self.start_time)
    }
}

// ---------------------------------------------------------------------------
// Variant — the two tuned model adapters competing for each turn
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Sft,
    Dpo,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Sft, Variant::Dpo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Sft => "sft",
            Variant::Dpo => "dpo",
        }
    }

    pub fn other(&self) -> Variant {
        match self {
            Variant::Sft => Variant::Dpo,
            Variant::Dpo => Variant::Sft,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// UserMode — how a participant entered the experiment
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserMode {
    Member,
    Anonymous,
}

impl UserMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserMode::Member => "member",
            UserMode::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for UserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Password — secret value object with redacted Debug and constant-time PartialEq
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        let a = self.0.as_bytes();
        let b = other.0.as_bytes();
        let max_len = a.len().max(b.len());
        let mut result = (a.len() != b.len()) as u8;
        for i in 0..max_len {
            let x = if i < a.len() { a[i] } else { 0 };
            let y = if i < b.len() { b[i] } else { 0 };
            result |= x ^ y;
        }
        result == 0
    }
}

impl Eq for Password {}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
