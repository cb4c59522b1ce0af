//! Check- and reply-item tables (radcheck / radreply equivalents)

use dashmap::DashMap;

/// Attribute operator, as FreeRADIUS writes them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `:=` set/override
    SetEqual,
    /// `==` compare
    Equal,
    /// `+=` append
    Add,
}

impl Operator {
    /// Wire/database spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetEqual => ":=",
            Self::Equal => "==",
            Self::Add => "+=",
        }
    }
}

/// One check- or reply-item row
#[derive(Debug, Clone)]
pub struct CredentialEntry {
    /// Username the row belongs to
    pub username: String,
    /// Attribute name (e.g. `Cleartext-Password`, `Session-Timeout`)
    pub attribute: String,
    /// Operator
    pub op: Operator,
    /// Attribute value
    pub value: String,
}

/// Per-partition credential store: check items validate an
/// Access-Request, reply items are returned on Access-Accept.
pub struct CredentialStore {
    check: DashMap<String, Vec<CredentialEntry>>,
    reply: DashMap<String, Vec<CredentialEntry>>,
}

impl CredentialStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            check: DashMap::new(),
            reply: DashMap::new(),
        }
    }

    /// Add a check item for a username
    pub fn add_check_item(&self, username: &str, attribute: &str, op: Operator, value: &str) {
        self.check.entry(username.to_string()).or_default().push(CredentialEntry {
            username: username.to_string(),
            attribute: attribute.to_string(),
            op,
            value: value.to_string(),
        });
    }

    /// Add a reply item for a username
    pub fn add_reply_item(&self, username: &str, attribute: &str, op: Operator, value: &str) {
        self.reply.entry(username.to_string()).or_default().push(CredentialEntry {
            username: username.to_string(),
            attribute: attribute.to_string(),
            op,
            value: value.to_string(),
        });
    }

    /// All check items for a username
    pub fn check_items(&self, username: &str) -> Vec<CredentialEntry> {
        self.check.get(username).map(|v| v.clone()).unwrap_or_default()
    }

    /// All reply items for a username
    pub fn reply_items(&self, username: &str) -> Vec<CredentialEntry> {
        self.reply.get(username).map(|v| v.clone()).unwrap_or_default()
    }

    /// The Cleartext-Password check item, if provisioned
    pub fn cleartext_password(&self, username: &str) -> Option<String> {
        self.check.get(username)?.iter().find_map(|e| {
            (e.attribute == "Cleartext-Password").then(|| e.value.clone())
        })
    }

    /// Update the stored password
    pub fn update_password(&self, username: &str, new_password: &str) -> bool {
        match self.check.get_mut(username) {
            Some(mut rows) => {
                let mut updated = false;
                for row in rows.iter_mut() {
                    if row.attribute == "Cleartext-Password" {
                        row.value = new_password.to_string();
                        updated = true;
                    }
                }
                updated
            }
            None => false,
        }
    }

    /// Replace all reply items for a username (plan change)
    pub fn replace_reply_items(&self, username: &str, items: Vec<(String, Operator, String)>) {
        let rows = items
            .into_iter()
            .map(|(attribute, op, value)| CredentialEntry {
                username: username.to_string(),
                attribute,
                op,
                value,
            })
            .collect();
        self.reply.insert(username.to_string(), rows);
    }

    /// Drop all rows for a username
    pub fn remove_user(&self, username: &str) {
        self.check.remove(username);
        self.reply.remove(username);
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
