//! Account address derivation from public keys.
//!
//! Format: `blt_` + base32(public_key, 52 chars) + base32(checksum, 8 chars).
//! The checksum is the first 5 bytes of Blake2b-256(public_key). The alphabet
//! `13456789abcdefghijkmnopqrstuwxyz` leaves out visually ambiguous characters.

use ballot_types::{AccountAddress, PublicKey};

const BASE32_ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

/// ASCII byte → 5-bit value, 0xFF for characters outside the alphabet.
const BASE32_DECODE: [u8; 128] = {
    let mut table = [0xFFu8; 128];
    let mut i = 0;
    while i < 32 {
        table[BASE32_ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

const PUBKEY_CHARS: usize = 52;
const CHECKSUM_LEN: usize = 5;

fn encode_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut acc: u64 = 0;
    let mut bits = 0;
    for &byte in bytes {
        acc = (acc << 8) | byte as u64;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((acc >> bits) & 0x1F) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((acc << (5 - bits)) & 0x1F) as usize] as char);
    }
    out
}

/// Decode into exactly `N` bytes; trailing padding bits are discarded.
fn decode_base32<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    let mut pos = 0;
    let mut acc: u64 = 0;
    let mut bits = 0;
    for c in s.bytes() {
        let val = *BASE32_DECODE.get(c as usize)?;
        if val == 0xFF {
            return None;
        }
        acc = (acc << 5) | val as u64;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            if pos < N {
                out[pos] = (acc >> bits) as u8;
                pos += 1;
            }
        }
    }
    (pos == N).then_some(out)
}

fn checksum(public_key: &[u8; 32]) -> [u8; CHECKSUM_LEN] {
    let hash = crate::blake2b_256(public_key);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&hash[..CHECKSUM_LEN]);
    out
}

/// Derive the `blt_` address for a public key.
pub fn derive_address(public_key: &PublicKey) -> AccountAddress {
    AccountAddress::new(format!(
        "{}{}{}",
        AccountAddress::PREFIX,
        encode_base32(public_key.as_bytes()),
        encode_base32(&checksum(public_key.as_bytes()))
    ))
}

/// Extract the public key bytes from an address.
///
/// Returns `None` if the address is malformed or its checksum does not match.
pub fn decode_address(address: &str) -> Option<[u8; 32]> {
    let encoded = address.strip_prefix(AccountAddress::PREFIX)?;
    if address.len() != AccountAddress::ENCODED_LEN || !encoded.is_ascii() {
        return None;
    }
    let (key_part, checksum_part) = encoded.split_at(PUBKEY_CHARS);
    let key: [u8; 32] = decode_base32(key_part)?;
    let sum: [u8; CHECKSUM_LEN] = decode_base32(checksum_part)?;
    (sum == checksum(&key)).then_some(key)
}

/// The public key an address commits to.
pub fn public_key_of(address: &AccountAddress) -> Option<PublicKey> {
    decode_address(address.as_str()).map(PublicKey)
}

/// Whether an address string is well-formed with a correct checksum.
pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_keypair, keypair_from_seed};

    #[test]
    fn derive_and_validate() {
        let kp = generate_keypair();
        let addr = derive_address(&kp.public);
        assert!(addr.as_str().starts_with("blt_"));
        assert_eq!(addr.as_str().len(), AccountAddress::ENCODED_LEN);
        assert!(validate_address(addr.as_str()));
    }

    #[test]
    fn decode_roundtrip() {
        let kp = keypair_from_seed(&[3u8; 32]);
        let addr = derive_address(&kp.public);
        assert_eq!(public_key_of(&addr), Some(kp.public));
    }

    #[test]
    fn tampered_checksum_rejected() {
        let addr = derive_address(&keypair_from_seed(&[4u8; 32]).public);
        let mut bad = addr.as_str().to_string();
        let last = bad.pop().unwrap();
        bad.push(if last == '1' { '3' } else { '1' });
        assert!(!validate_address(&bad));
    }

    #[test]
    fn wrong_prefix_and_length_rejected() {
        assert!(!validate_address("blt_tooshort"));
        assert!(!validate_address("blt_"));
        let addr = derive_address(&keypair_from_seed(&[5u8; 32]).public);
        let foreign = addr.as_str().replacen("blt_", "xyz_", 1);
        assert!(!validate_address(&foreign));
    }

    #[test]
    fn non_ascii_rejected() {
        let s = format!("blt_{}", "é".repeat(30));
        assert!(!validate_address(&s));
    }

    #[test]
    fn base32_roundtrip() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x42];
        let decoded: [u8; 5] = decode_base32(&encode_base32(&data)).unwrap();
        assert_eq!(decoded, data);
    }
}
