//! Business-network member directory
//!
//! Maps party identities to their Ed25519 verification keys. Membership is
//! provisioned out of band; an unknown party cannot take part in a session.

use crate::{Error, Result};
use dashmap::DashMap;
use vault_core::PartyId;

/// Party identity to public key map
#[derive(Debug, Default)]
pub struct MemberDirectory {
    keys: DashMap<PartyId, [u8; 32]>,
}

impl MemberDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member's verification key (replaces any previous key)
    pub fn register(&self, party: PartyId, public_key: [u8; 32]) {
        self.keys.insert(party, public_key);
    }

    /// Look up a member's verification key
    pub fn key_of(&self, party: &PartyId) -> Result<[u8; 32]> {
        self.keys
            .get(party)
            .map(|entry| *entry.value())
            .ok_or_else(|| Error::Session(format!("unknown party: {party}")))
    }

    /// Whether the party is a known member
    pub fn contains(&self, party: &PartyId) -> bool {
        self.keys.contains_key(party)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::KeyPair;

    #[test]
    fn test_lookup_registered_member() {
        let directory = MemberDirectory::new();
        let keypair = KeyPair::generate();
        directory.register(PartyId::new("BankA"), keypair.public_key());

        assert_eq!(
            directory.key_of(&PartyId::new("BankA")).unwrap(),
            keypair.public_key()
        );
        assert!(directory.contains(&PartyId::new("BankA")));
    }

    #[test]
    fn test_unknown_party_is_an_error() {
        let directory = MemberDirectory::new();
        assert!(directory.key_of(&PartyId::new("Nobody")).is_err());
    }
}
