use crate::config::AppConfig;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// What the console knows about the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub role: Role,
    /// Contracts this user may see; `None` means all of them.
    pub scope: Option<Vec<String>>,
}

impl Session {
    pub fn admin(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            role: Role::Admin,
            scope: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn visible_contracts(&self, options: &[String]) -> Vec<String> {
        match &self.scope {
            None => options.to_vec(),
            Some(scope) => options
                .iter()
                .filter(|c| scope.iter().any(|s| s.trim().eq_ignore_ascii_case(c)))
                .cloned()
                .collect(),
        }
    }
}

/// Credential check supplied by whoever owns the user base.
pub trait Authenticator {
    /// Whether a login prompt is needed at all.
    fn requires_login(&self) -> bool;

    fn authenticate(&self, credentials: &Credentials) -> Option<Session>;
}

/// Users, roles and scopes listed in the secrets file.
#[derive(Debug, Clone, Default)]
pub struct SecretsAuthenticator {
    passwords: BTreeMap<String, String>,
    roles: BTreeMap<String, String>,
    scopes: BTreeMap<String, Vec<String>>,
}

impl SecretsAuthenticator {
    pub fn from_config(config: &AppConfig) -> Self {
        let lower = |m: &BTreeMap<String, String>| {
            m.iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            passwords: lower(&config.passwords),
            roles: lower(&config.roles),
            scopes: config
                .scopes
                .iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
                .collect(),
        }
    }
}

impl Authenticator for SecretsAuthenticator {
    fn requires_login(&self) -> bool {
        !self.passwords.is_empty()
    }

    fn authenticate(&self, credentials: &Credentials) -> Option<Session> {
        let user = credentials.username.trim().to_lowercase();
        if !self.requires_login() {
            return Some(Session::admin(user));
        }
        let expected = self.passwords.get(&user)?;
        if expected != credentials.password.trim() {
            tracing::warn!(user = %user, "login rejected");
            return None;
        }
        let role = self.roles.get(&user).map(|r| Role::parse(r)).unwrap_or(Role::User);
        let scope = self.scopes.get(&user).cloned();
        tracing::info!(user = %user, ?role, "login accepted");
        Some(Session { user, role, scope })
    }
}
