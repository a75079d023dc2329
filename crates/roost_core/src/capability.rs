/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::resource::{ResourceId, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::RwLock;

/// Access tiers as a bitmask. `contains` is the only ordering that matters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(u32);

impl Capability {
    pub const NONE: Capability = Capability(0);
    pub const READ: Capability = Capability(1 << 0);
    pub const WRITE: Capability = Capability(1 << 1);
    pub const DIRECT_MESSAGES: Capability = Capability(1 << 2);
    pub const ACCOUNTS: Capability = Capability(1 << 3);
    /// Caller is signed by the same key as the host.
    pub const SIGNATURE: Capability = Capability(1 << 4);

    const NAMED: [(&'static str, Capability); 5] = [
        ("read", Capability::READ),
        ("write", Capability::WRITE),
        ("direct_messages", Capability::DIRECT_MESSAGES),
        ("accounts", Capability::ACCOUNTS),
        ("signature", Capability::SIGNATURE),
    ];

    pub const ALL: Capability = Capability(0b1_1111);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Capability(bits & Self::ALL.0)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::NAMED.iter().find(|(n, _)| *n == name).map(|(_, c)| *c)
    }

    pub fn contains(self, other: Capability) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capability {
    type Output = Capability;

    fn bitor(self, rhs: Capability) -> Capability {
        Capability(self.0 | rhs.0)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let names = Self::NAMED
            .iter()
            .filter(|(_, c)| self.contains(*c))
            .map(|(n, _)| n.to_ascii_uppercase())
            .collect::<Vec<_>>();
        f.write_str(&names.join("|"))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({self})")
    }
}

/// Opaque token of whoever is on the other side of the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerIdentity {
    pub uid: u32,
}

impl CallerIdentity {
    pub fn new(uid: u32) -> Self {
        Self { uid }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Columns of the accounts table that expose credentials.
pub const CREDENTIAL_FIELDS: &[&str] = &["basic_auth_password", "oauth_token", "token_secret"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRules {
    pub read: Capability,
    pub write: Capability,
    /// Fields that need `field_level` on top of `read`.
    pub protected_fields: &'static [&'static str],
    pub field_level: Capability,
    pub write_requires_signature: bool,
    pub read_only_view: bool,
}

impl ResourceRules {
    const OPEN: ResourceRules = ResourceRules {
        read: Capability::NONE,
        write: Capability::NONE,
        protected_fields: &[],
        field_level: Capability::NONE,
        write_requires_signature: false,
        read_only_view: false,
    };

    const TIMELINE: ResourceRules = ResourceRules {
        read: Capability::READ,
        write: Capability::WRITE,
        ..ResourceRules::OPEN
    };

    const MESSAGES: ResourceRules = ResourceRules {
        read: Capability::DIRECT_MESSAGES,
        write: Capability::DIRECT_MESSAGES,
        ..ResourceRules::OPEN
    };
}

pub fn rules_for(resource: ResourceId) -> ResourceRules {
    match resource {
        ResourceId::None | ResourceId::Permissions | ResourceId::Notifications => ResourceRules::OPEN,
        ResourceId::ConsumerKeySecret => ResourceRules {
            read: Capability::ACCOUNTS,
            ..ResourceRules::OPEN
        },
        ResourceId::Table(Table::Accounts) => ResourceRules {
            read: Capability::READ,
            protected_fields: CREDENTIAL_FIELDS,
            field_level: Capability::ACCOUNTS,
            write_requires_signature: true,
            ..ResourceRules::OPEN
        },
        ResourceId::Table(Table::DirectMessagesInbox | Table::DirectMessagesOutbox) => ResourceRules::MESSAGES,
        ResourceId::DirectMessages
        | ResourceId::Conversation
        | ResourceId::ConversationScreenName
        | ResourceId::ConversationsEntry => ResourceRules {
            read_only_view: true,
            ..ResourceRules::MESSAGES
        },
        ResourceId::Table(_) => ResourceRules::TIMELINE,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("access to {resource} requires capability {required}")]
    InsufficientCapability {
        resource: &'static str,
        required: Capability,
    },
    #[error("access to {resource} denied: {reason}")]
    Forbidden {
        resource: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct Grant {
    capabilities: Capability,
    trusted: bool,
}

/// Capability grants per caller. The host itself always holds everything.
pub struct PermissionsManager {
    host_uid: u32,
    grants: RwLock<HashMap<u32, Grant>>,
}

impl PermissionsManager {
    pub fn new(host_uid: u32) -> Self {
        Self {
            host_uid,
            grants: RwLock::new(HashMap::new()),
        }
    }

    /// `SIGNATURE` cannot be granted directly; it follows `trusted`.
    pub fn grant(&self, uid: u32, capabilities: Capability, trusted: bool) {
        let capabilities = Capability(capabilities.0 & !Capability::SIGNATURE.0);
        let mut g = self.grants.write().unwrap();
        g.insert(uid, Grant { capabilities, trusted });
    }

    pub fn revoke(&self, uid: u32) {
        let mut g = self.grants.write().unwrap();
        g.remove(&uid);
    }

    /// Resolved bitmask for a caller, including `SIGNATURE` for trusted callers.
    pub fn permissions(&self, caller: CallerIdentity) -> Capability {
        if caller.uid == self.host_uid {
            return Capability::ALL;
        }
        let g = self.grants.read().unwrap();
        match g.get(&caller.uid) {
            Some(grant) if grant.trusted => grant.capabilities | Capability::SIGNATURE,
            Some(grant) => grant.capabilities,
            None => Capability::NONE,
        }
    }

    pub fn check(&self, caller: CallerIdentity, required: Capability) -> bool {
        self.permissions(caller).contains(required)
    }

    pub fn is_signature_trusted(&self, caller: CallerIdentity) -> bool {
        self.check(caller, Capability::SIGNATURE)
    }

    /// Decides whether `caller` may touch `resource`. Runs before any store access.
    pub fn authorize(
        &self,
        caller: CallerIdentity,
        resource: ResourceId,
        mode: AccessMode,
        requested_fields: Option<&[String]>,
    ) -> Result<(), Denial> {
        let rules = rules_for(resource);
        let name = resource.name();
        match mode {
            AccessMode::Read => {
                // No projection selects every column, protected ones included.
                let touches_protected = match requested_fields {
                    Some(fields) if !fields.is_empty() => fields
                        .iter()
                        .any(|f| rules.protected_fields.contains(&f.trim())),
                    _ => !rules.protected_fields.is_empty(),
                };
                if touches_protected && !self.check(caller, rules.field_level) {
                    return Err(Denial::InsufficientCapability {
                        resource: name,
                        required: rules.field_level,
                    });
                }
                if !self.check(caller, rules.read) {
                    return Err(Denial::InsufficientCapability {
                        resource: name,
                        required: rules.read,
                    });
                }
            }
            AccessMode::Write => {
                if rules.write_requires_signature && !self.is_signature_trusted(caller) {
                    return Err(Denial::Forbidden {
                        resource: name,
                        reason: "writes are restricted to callers signed like the host",
                    });
                }
                if !self.check(caller, rules.write) {
                    return Err(Denial::InsufficientCapability {
                        resource: name,
                        required: rules.write,
                    });
                }
            }
        }
        Ok(())
    }
}
