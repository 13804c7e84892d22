//! User record, profile and provider types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Identity provider a session was established with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// GitHub OAuth app
    GitHub,
    /// Google OAuth 2.0
    Google,
}

impl Provider {
    /// All providers this service can sign in with
    pub const ALL: [Provider; 2] = [Provider::GitHub, Provider::Google];

    /// Wire name, as stored in user records and used in route paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "google" => Ok(Self::Google),
            other => Err(Error::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Case-insensitive normalization applied to ids and emails before lookup
pub fn casefold(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Profile attributes returned by the identity provider after authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Provider-assigned id (GitHub sends a number, Google a string)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Display name
    pub name: String,

    /// Login handle
    pub login: String,

    /// Email address
    pub email: String,

    /// Avatar URL
    pub avatar_url: String,
}

impl Profile {
    /// Case-folded id used for the `user_by_id` lookup
    pub fn id_key(&self) -> String {
        casefold(&self.id)
    }

    /// Case-folded email used for the `user_by_email` lookup
    pub fn email_key(&self) -> String {
        casefold(&self.email)
    }

    /// Reject profiles that cannot be indexed
    pub fn ensure_indexable(&self) -> Result<(), Error> {
        if self.id.trim().is_empty() {
            return Err(Error::MalformedProfile("profile id is empty".to_string()));
        }
        if self.email.trim().is_empty() {
            return Err(Error::MalformedProfile("profile email is empty".to_string()));
        }
        Ok(())
    }
}

/// One stored user; exactly one exists per case-folded email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Provider id of the session that created the record; also its store key
    pub id: String,

    /// Provider of the most recent sign-in
    pub provider: Provider,

    pub name: String,

    pub login: String,

    pub email: String,

    pub avatar_url: String,

    pub level: i64,

    #[serde(rename = "currentExperience")]
    pub current_experience: i64,

    #[serde(rename = "challengesCompleted")]
    pub challenges_completed: i64,
}

impl UserRecord {
    /// Starting level for a new user
    pub const INITIAL_LEVEL: i64 = 1;

    /// Build the record created on a first sign-in
    pub fn first_sign_in(profile: &Profile, provider: Provider) -> Self {
        Self {
            id: profile.id.clone(),
            provider,
            name: profile.name.clone(),
            login: profile.login.clone(),
            email: profile.email.clone(),
            avatar_url: profile.avatar_url.clone(),
            level: Self::INITIAL_LEVEL,
            current_experience: 0,
            challenges_completed: 0,
        }
    }

    /// Case-folded id, as indexed by `user_by_id`
    pub fn id_key(&self) -> String {
        casefold(&self.id)
    }

    /// Case-folded email, as indexed by `user_by_email`
    pub fn email_key(&self) -> String {
        casefold(&self.email)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
