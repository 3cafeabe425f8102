use crate::errors::{ErrorKind, PocketError, PocketResult};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LENGTH: usize = 16;

/// Raw 256-bit key derived from a passphrase.
pub(crate) fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Hex encoded SHA-256 of a string, as stored in hashed searchable columns.
pub(crate) fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Sealed bytes and the initialization vector, both base64 encoded.
pub(crate) struct SealedPayload {
    pub(crate) data: String,
    pub(crate) iv: String,
}

pub(crate) fn seal(plain: &[u8], key: &[u8; 32]) -> PocketResult<SealedPayload> {
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|e| {
        log::error!("Failed to initialize cipher: {}", e);
        PocketError::new("Failed to initialize cipher", ErrorKind::SecurityError)
    })?;
    let sealed = cipher.encrypt_padded_vec_mut::<Pkcs7>(plain);

    Ok(SealedPayload {
        data: STANDARD.encode(sealed),
        iv: STANDARD.encode(iv),
    })
}

/// Opens a sealed payload. Any malformed input or wrong key yields `None`.
pub(crate) fn open(data: &str, iv: &str, key: &[u8; 32]) -> Option<Vec<u8>> {
    let sealed = STANDARD.decode(data).ok()?;
    let iv = STANDARD.decode(iv).ok()?;
    let cipher = Aes256CbcDec::new_from_slices(key, &iv).ok()?;
    cipher.decrypt_padded_vec_mut::<Pkcs7>(&sealed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_derive_key_is_raw_digest() {
        let key = derive_key("abc");
        assert_eq!(hex::encode(key), sha256_hex("abc"));
    }

    #[test]
    fn test_seal_and_open() {
        let key = derive_key("secret");
        let sealed = seal(b"hello world", &key).unwrap();
        assert_eq!(STANDARD.decode(&sealed.iv).unwrap().len(), IV_LENGTH);
        let opened = open(&sealed.data, &sealed.iv, &key).unwrap();
        assert_eq!(opened, b"hello world");
    }

    #[test]
    fn test_seal_uses_fresh_iv() {
        let key = derive_key("secret");
        let first = seal(b"same", &key).unwrap();
        let second = seal(b"same", &key).unwrap();
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = seal(b"{\"name\":\"Alice\"}", &derive_key("right")).unwrap();
        // a wrong key almost always breaks the padding; if it does not, the bytes differ
        match open(&sealed.data, &sealed.iv, &derive_key("wrong")) {
            None => {}
            Some(bytes) => assert_ne!(bytes, b"{\"name\":\"Alice\"}"),
        }
    }

    #[test]
    fn test_open_rejects_garbage() {
        let key = derive_key("secret");
        assert!(open("not base64!", "AAAAAAAAAAAAAAAAAAAAAA==", &key).is_none());
        assert!(open("AAAA", "AAAA", &key).is_none());
    }
}
