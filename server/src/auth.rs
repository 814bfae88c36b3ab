//! Token verification at connection upgrade.

use shared::Identity;

/// Turns the `?token=` of an upgrade request into a verified identity.
///
/// The embedding application supplies the real implementation, backed by
/// whatever issues its sessions.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Identity>;
}

/// Accepts `<id>:<username>` tokens. For local play and tests only.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevTokenAuthenticator;

impl Authenticator for DevTokenAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Identity> {
        let (id, username) = token.split_once(':')?;
        let id = id.parse().ok()?;
        let username = username.trim();
        if username.is_empty() {
            return None;
        }
        Some(Identity::new(id, username))
    }
}

/// Pulls the `token` parameter out of a request query string.
pub fn extract_token(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}
