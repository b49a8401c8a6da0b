//! Script classification and address derivation.
//!
//! The indexer and the query engine only see the trait; the standard solver
//! below covers the four standard output templates with tagged dispatch.

use ripemd160::Ripemd160;
use sha2::{Digest, Sha256};

pub trait ScriptSolver: Send + Sync {
    /// All destination addresses of an output script. Empty for
    /// unspendable or non-standard scripts.
    fn addresses_from_script(&self, script: &[u8]) -> Vec<String>;
    fn is_multisig(&self, script: &[u8]) -> bool;
    fn required_signatures(&self, script: &[u8]) -> u32;
    fn script_type_name(&self, script: &[u8]) -> &'static str;
}

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;

/// Base58check solver for the standard templates: P2PKH, P2SH, P2PK and
/// bare multisig. Version bytes are per-chain configuration.
pub struct StandardScriptSolver {
    pubkey_prefix: u8,
    script_prefix: u8,
}

impl StandardScriptSolver {
    pub fn new(pubkey_prefix: u8, script_prefix: u8) -> Self {
        Self {
            pubkey_prefix,
            script_prefix,
        }
    }

    fn hash160(data: &[u8]) -> Vec<u8> {
        let sha = Sha256::digest(data);
        Ripemd160::digest(&sha).to_vec()
    }

    fn sha256d(data: &[u8]) -> Vec<u8> {
        let first = Sha256::digest(data);
        Sha256::digest(&first).to_vec()
    }

    /// base58check(version byte + 20-byte hash).
    fn encode_address(&self, hash: &[u8], prefix: u8) -> String {
        let mut payload = vec![prefix];
        payload.extend_from_slice(hash);
        let checksum = Self::sha256d(&payload);
        payload.extend_from_slice(&checksum[0..4]);
        bs58::encode(payload).into_string()
    }

    fn pubkey_address(&self, pubkey: &[u8]) -> String {
        self.encode_address(&Self::hash160(pubkey), self.pubkey_prefix)
    }

    fn is_p2pkh(script: &[u8]) -> bool {
        script.len() == 25
            && script[0] == OP_DUP
            && script[1] == OP_HASH160
            && script[2] == 0x14
            && script[23] == OP_EQUALVERIFY
            && script[24] == OP_CHECKSIG
    }

    fn is_p2sh(script: &[u8]) -> bool {
        script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
    }

    /// `<push pubkey> OP_CHECKSIG` with a 33- or 65-byte key.
    fn p2pk_pubkey(script: &[u8]) -> Option<&[u8]> {
        match script.len() {
            35 if script[0] == 0x21 && script[34] == OP_CHECKSIG => Some(&script[1..34]),
            67 if script[0] == 0x41 && script[66] == OP_CHECKSIG => Some(&script[1..66]),
            _ => None,
        }
    }

    /// `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`; returns (m, pubkeys).
    fn multisig_parts(script: &[u8]) -> Option<(u32, Vec<&[u8]>)> {
        if script.len() < 3 || *script.last()? != OP_CHECKMULTISIG {
            return None;
        }
        let m_op = script[0];
        let n_op = script[script.len() - 2];
        if !(OP_1..=OP_16).contains(&m_op) || !(OP_1..=OP_16).contains(&n_op) {
            return None;
        }
        let required = (m_op - OP_1 + 1) as u32;
        let total = (n_op - OP_1 + 1) as usize;

        let mut keys = Vec::new();
        let mut pos = 1;
        while pos < script.len() - 2 {
            let push = script[pos] as usize;
            if push != 33 && push != 65 {
                return None;
            }
            if pos + 1 + push > script.len() - 2 {
                return None;
            }
            keys.push(&script[pos + 1..pos + 1 + push]);
            pos += 1 + push;
        }
        if keys.len() != total || required as usize > total {
            return None;
        }
        Some((required, keys))
    }
}

impl ScriptSolver for StandardScriptSolver {
    fn addresses_from_script(&self, script: &[u8]) -> Vec<String> {
        if Self::is_p2pkh(script) {
            return vec![self.encode_address(&script[3..23], self.pubkey_prefix)];
        }
        if Self::is_p2sh(script) {
            return vec![self.encode_address(&script[2..22], self.script_prefix)];
        }
        if let Some(pubkey) = Self::p2pk_pubkey(script) {
            return vec![self.pubkey_address(pubkey)];
        }
        if let Some((_, keys)) = Self::multisig_parts(script) {
            return keys.iter().map(|key| self.pubkey_address(key)).collect();
        }
        Vec::new()
    }

    fn is_multisig(&self, script: &[u8]) -> bool {
        Self::multisig_parts(script).is_some()
    }

    fn required_signatures(&self, script: &[u8]) -> u32 {
        Self::multisig_parts(script).map(|(m, _)| m).unwrap_or(0)
    }

    fn script_type_name(&self, script: &[u8]) -> &'static str {
        if Self::is_p2pkh(script) {
            "pay-to-pubkey-hash"
        } else if Self::is_p2sh(script) {
            "pay-to-script-hash"
        } else if Self::p2pk_pubkey(script).is_some() {
            "pay-to-pubkey"
        } else if Self::multisig_parts(script).is_some() {
            "multisig"
        } else {
            "nonstandard"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> StandardScriptSolver {
        StandardScriptSolver::new(71, 5)
    }

    fn p2pkh_script(hash: [u8; 20]) -> Vec<u8> {
        let mut script = vec![OP_DUP, OP_HASH160, 0x14];
        script.extend_from_slice(&hash);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        script
    }

    fn p2sh_script(hash: [u8; 20]) -> Vec<u8> {
        let mut script = vec![OP_HASH160, 0x14];
        script.extend_from_slice(&hash);
        script.push(OP_EQUAL);
        script
    }

    fn p2pk_script(pubkey: &[u8]) -> Vec<u8> {
        let mut script = vec![pubkey.len() as u8];
        script.extend_from_slice(pubkey);
        script.push(OP_CHECKSIG);
        script
    }

    fn multisig_script(required: u8, pubkeys: &[&[u8]]) -> Vec<u8> {
        let mut script = vec![OP_1 + required - 1];
        for key in pubkeys {
            script.push(key.len() as u8);
            script.extend_from_slice(key);
        }
        script.push(OP_1 + pubkeys.len() as u8 - 1);
        script.push(OP_CHECKMULTISIG);
        script
    }

    #[test]
    fn test_p2pkh_single_address() {
        let script = p2pkh_script([7u8; 20]);
        let solver = solver();
        let addresses = solver.addresses_from_script(&script);
        assert_eq!(addresses.len(), 1);
        // Same hash, same chain prefix, same address.
        assert_eq!(addresses, solver.addresses_from_script(&script));
        assert_eq!(solver.script_type_name(&script), "pay-to-pubkey-hash");
        assert!(!solver.is_multisig(&script));
    }

    #[test]
    fn test_p2sh_uses_script_prefix() {
        let solver = solver();
        let p2pkh = solver.addresses_from_script(&p2pkh_script([7u8; 20]));
        let p2sh = solver.addresses_from_script(&p2sh_script([7u8; 20]));
        assert_eq!(p2sh.len(), 1);
        // Identical hash but different version byte must differ.
        assert_ne!(p2pkh[0], p2sh[0]);
        assert_eq!(
            solver.script_type_name(&p2sh_script([7u8; 20])),
            "pay-to-script-hash"
        );
    }

    #[test]
    fn test_p2pk_matches_p2pkh_of_same_key() {
        let solver = solver();
        let mut pubkey = vec![0x02];
        pubkey.extend_from_slice(&[9u8; 32]);

        let p2pk = solver.addresses_from_script(&p2pk_script(&pubkey));
        assert_eq!(p2pk.len(), 1);
        let hash: [u8; 20] = StandardScriptSolver::hash160(&pubkey).try_into().unwrap();
        let p2pkh = solver.addresses_from_script(&p2pkh_script(hash));
        assert_eq!(p2pk, p2pkh);
        assert_eq!(
            solver.script_type_name(&p2pk_script(&pubkey)),
            "pay-to-pubkey"
        );
    }

    #[test]
    fn test_bare_multisig() {
        let solver = solver();
        let mut key_a = vec![0x02];
        key_a.extend_from_slice(&[1u8; 32]);
        let mut key_b = vec![0x03];
        key_b.extend_from_slice(&[2u8; 32]);

        let script = multisig_script(2, &[&key_a, &key_b]);
        assert!(solver.is_multisig(&script));
        assert_eq!(solver.required_signatures(&script), 2);
        assert_eq!(solver.script_type_name(&script), "multisig");

        let addresses = solver.addresses_from_script(&script);
        assert_eq!(addresses.len(), 2);
        assert_ne!(addresses[0], addresses[1]);
    }

    #[test]
    fn test_nonstandard_yields_nothing() {
        let solver = solver();
        for script in [&b""[..], &[0x6a, 0x04, 1, 2, 3, 4][..], &[OP_CHECKSIG][..]] {
            assert!(solver.addresses_from_script(script).is_empty());
            assert_eq!(solver.script_type_name(script), "nonstandard");
            assert!(!solver.is_multisig(script));
            assert_eq!(solver.required_signatures(script), 0);
        }
    }
}
