//! Standard security handler (revisions 2 to 4, RC4 and AESV2).

use aes::Aes128;
use cbc::Decryptor;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rc4::{KeyInit, Rc4, StreamCipher};
use thiserror::Error;

use crate::model::{Dict, ObjRef, Object};

pub(crate) const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CryptMethod {
    Identity,
    Rc4,
    AesV2,
}

#[derive(Debug, Error)]
pub(crate) enum CryptError {
    #[error("invalid password for encrypted PDF")]
    InvalidPassword,
    #[error("unsupported encryption: {0}")]
    Unsupported(String),
    #[error("malformed encryption dictionary: {0}")]
    Malformed(String),
}

fn malformed(msg: impl Into<String>) -> CryptError {
    CryptError::Malformed(msg.into())
}

#[derive(Debug, Clone)]
pub(crate) struct SecurityHandler {
    encrypt_ref: Option<ObjRef>,
    revision: i64,
    key_len: usize,
    owner_hash: Vec<u8>,
    user_hash: Vec<u8>,
    permissions: i32,
    file_id: Vec<u8>,
    encrypt_metadata: bool,
    stream_method: CryptMethod,
    string_method: CryptMethod,
}

impl SecurityHandler {
    pub(crate) fn from_dict(
        dict: &Dict,
        encrypt_ref: Option<ObjRef>,
        file_id: Vec<u8>,
    ) -> Result<Self, CryptError> {
        let filter = dict
            .get("Filter")
            .and_then(|o| o.as_name())
            .ok_or_else(|| malformed("missing /Filter"))?;
        if filter != "Standard" {
            return Err(CryptError::Unsupported(format!("security handler {filter}")));
        }

        let revision = dict
            .get("R")
            .and_then(|o| o.as_i64())
            .ok_or_else(|| malformed("missing /R"))?;
        if !(2..=4).contains(&revision) {
            return Err(CryptError::Unsupported(format!("revision R={revision}")));
        }
        let version = dict.get("V").and_then(|o| o.as_i64()).unwrap_or(0);
        if !matches!(version, 1 | 2 | 4) {
            return Err(CryptError::Unsupported(format!("version V={version}")));
        }

        let owner_hash = dict
            .get("O")
            .and_then(|o| o.as_bytes())
            .ok_or_else(|| malformed("missing /O"))?
            .to_vec();
        let user_hash = dict
            .get("U")
            .and_then(|o| o.as_bytes())
            .ok_or_else(|| malformed("missing /U"))?
            .to_vec();
        if owner_hash.len() < 32 || user_hash.len() < 16 {
            return Err(malformed("unexpected /O or /U length"));
        }

        let permissions = dict
            .get("P")
            .and_then(|o| o.as_i64())
            .ok_or_else(|| malformed("missing /P"))?;
        // /P is a signed 32-bit field but some writers store it unsigned.
        let permissions = permissions as u32 as i32;

        if file_id.is_empty() {
            return Err(malformed("missing file identifier (/ID)"));
        }

        let key_bits = dict
            .get("Length")
            .and_then(|o| o.as_i64())
            .unwrap_or(if revision == 2 { 40 } else { 128 });
        if key_bits <= 0 || key_bits % 8 != 0 || key_bits > 128 {
            return Err(malformed(format!("invalid key /Length {key_bits}")));
        }
        let key_len = if version == 1 { 5 } else { (key_bits / 8) as usize };

        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|o| o.as_bool())
            .unwrap_or(true);

        let (stream_method, string_method) = if version == 4 {
            let filters = dict.get("CF").and_then(|o| o.as_dict());
            let stmf = dict.get("StmF").and_then(|o| o.as_name()).unwrap_or("Identity");
            let strf = dict.get("StrF").and_then(|o| o.as_name()).unwrap_or("Identity");
            (
                crypt_filter_method(stmf, filters)?,
                crypt_filter_method(strf, filters)?,
            )
        } else {
            (CryptMethod::Rc4, CryptMethod::Rc4)
        };
        let uses_aes = stream_method == CryptMethod::AesV2 || string_method == CryptMethod::AesV2;
        if uses_aes && key_len != 16 {
            return Err(malformed("AESV2 requires a 128-bit key"));
        }

        Ok(Self {
            encrypt_ref,
            revision,
            key_len,
            owner_hash,
            user_hash,
            permissions,
            file_id,
            encrypt_metadata,
            stream_method,
            string_method,
        })
    }

    pub(crate) fn encrypt_ref(&self) -> Option<ObjRef> {
        self.encrypt_ref
    }

    pub(crate) fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    pub(crate) fn stream_method(&self) -> CryptMethod {
        self.stream_method
    }

    pub(crate) fn string_method(&self) -> CryptMethod {
        self.string_method
    }

    /// Derives the file key, trying `password` as the user password and then as the owner password.
    pub(crate) fn authenticate(&self, password: &[u8]) -> Result<Vec<u8>, CryptError> {
        let as_user = self.file_key(password);
        if self.user_key_matches(&as_user) {
            return Ok(as_user);
        }
        let recovered = self.user_password_from_owner(password)?;
        let as_owner = self.file_key(&recovered);
        if self.user_key_matches(&as_owner) {
            return Ok(as_owner);
        }
        Err(CryptError::InvalidPassword)
    }

    pub(crate) fn decrypt(
        &self,
        method: CryptMethod,
        file_key: &[u8],
        (obj_num, gen_num): ObjRef,
        data: &[u8],
    ) -> Result<Vec<u8>, CryptError> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => {
                let key = object_key(file_key, obj_num, gen_num, false);
                let mut out = data.to_vec();
                rc4_apply(&key, &mut out)?;
                Ok(out)
            }
            CryptMethod::AesV2 => {
                if data.len() < 16 {
                    return Err(malformed("AESV2 payload is missing its IV"));
                }
                let key = object_key(file_key, obj_num, gen_num, true);
                let (iv, body) = data.split_at(16);
                let mut buf = body.to_vec();
                let plain = Decryptor::<Aes128>::new_from_slices(&key, iv)
                    .map_err(|_| malformed("invalid AES key or IV length"))?
                    .decrypt_padded_mut::<Pkcs7>(&mut buf)
                    .map_err(|_| malformed("invalid AESV2 padding"))?;
                Ok(plain.to_vec())
            }
        }
    }

    fn file_key(&self, password: &[u8]) -> Vec<u8> {
        let mut hasher = Md5::new();
        hasher.update(pad_password(password));
        hasher.update(&self.owner_hash);
        hasher.update(self.permissions.to_le_bytes());
        hasher.update(&self.file_id);
        if self.revision >= 4 && !self.encrypt_metadata {
            hasher.update([0xFF; 4]);
        }
        let mut digest: [u8; 16] = hasher.finalize().into();
        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5_sum(&digest[..self.key_len]);
            }
        }
        digest[..self.key_len].to_vec()
    }

    fn user_key_matches(&self, file_key: &[u8]) -> bool {
        if self.revision == 2 {
            let mut check = PASSWORD_PADDING.to_vec();
            return rc4_apply(file_key, &mut check).is_ok() && check[..] == self.user_hash[..32];
        }
        let mut seed = PASSWORD_PADDING.to_vec();
        seed.extend_from_slice(&self.file_id);
        let mut check = md5_sum(&seed).to_vec();
        for round in 0..=19u8 {
            if rc4_apply(&xor_key(file_key, round), &mut check).is_err() {
                return false;
            }
        }
        check[..16] == self.user_hash[..16]
    }

    fn user_password_from_owner(&self, owner_password: &[u8]) -> Result<Vec<u8>, CryptError> {
        let mut digest = md5_sum(&pad_password(owner_password));
        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5_sum(&digest[..self.key_len]);
            }
        }
        let owner_key = &digest[..self.key_len];
        let mut value = self.owner_hash.clone();
        if self.revision == 2 {
            rc4_apply(owner_key, &mut value)?;
        } else {
            for round in (0..=19u8).rev() {
                rc4_apply(&xor_key(owner_key, round), &mut value)?;
            }
        }
        Ok(value)
    }
}

fn crypt_filter_method(name: &str, filters: Option<&Dict>) -> Result<CryptMethod, CryptError> {
    if name == "Identity" {
        return Ok(CryptMethod::Identity);
    }
    let entry = filters
        .and_then(|cf| cf.get(name))
        .and_then(Object::as_dict)
        .ok_or_else(|| malformed(format!("missing /CF entry {name}")))?;
    match entry.get("CFM").and_then(|o| o.as_name()).unwrap_or("None") {
        "None" => Ok(CryptMethod::Identity),
        "V2" => Ok(CryptMethod::Rc4),
        "AESV2" => Ok(CryptMethod::AesV2),
        other => Err(CryptError::Unsupported(format!("crypt filter method {other}"))),
    }
}

pub(crate) fn object_key(file_key: &[u8], obj_num: u32, gen_num: u16, aes: bool) -> Vec<u8> {
    let mut material = file_key.to_vec();
    material.extend_from_slice(&obj_num.to_le_bytes()[..3]);
    material.extend_from_slice(&gen_num.to_le_bytes());
    if aes {
        material.extend_from_slice(b"sAlT");
    }
    let key_len = (file_key.len() + 5).min(16);
    md5_sum(&material)[..key_len].to_vec()
}

pub(crate) fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut out = PASSWORD_PADDING;
    let n = password.len().min(32);
    out[..n].copy_from_slice(&password[..n]);
    out
}

fn md5_sum(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

fn xor_key(key: &[u8], value: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ value).collect()
}

macro_rules! rc4_by_len {
    ($key:expr, $data:expr, $($n:literal => $size:ident),+ $(,)?) => {
        match $key.len() {
            $($n => rc4_apply_sized::<rc4::consts::$size>($key, $data),)+
            other => Err(malformed(format!("unsupported RC4 key length {other}"))),
        }
    };
}

pub(crate) fn rc4_apply(key: &[u8], data: &mut [u8]) -> Result<(), CryptError> {
    rc4_by_len!(key, data,
        1 => U1, 2 => U2, 3 => U3, 4 => U4, 5 => U5, 6 => U6, 7 => U7, 8 => U8,
        9 => U9, 10 => U10, 11 => U11, 12 => U12, 13 => U13, 14 => U14, 15 => U15, 16 => U16,
    )
}

fn rc4_apply_sized<K>(key: &[u8], data: &mut [u8]) -> Result<(), CryptError>
where
    Rc4<K>: KeyInit + StreamCipher,
{
    let mut cipher = Rc4::<K>::new_from_slice(key).map_err(|_| malformed("invalid RC4 key"))?;
    cipher.apply_keystream(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::Encryptor;
    use cipher::BlockEncryptMut;

    fn handler(revision: i64, method: CryptMethod) -> SecurityHandler {
        SecurityHandler {
            encrypt_ref: None,
            revision,
            key_len: 16,
            owner_hash: vec![0; 32],
            user_hash: vec![0; 32],
            permissions: -4,
            file_id: vec![9, 8, 7, 6],
            encrypt_metadata: true,
            stream_method: method,
            string_method: method,
        }
    }

    #[test]
    fn rc4_is_symmetric() {
        let mut data = b"template bytes".to_vec();
        rc4_apply(b"abcde", &mut data).expect("encrypt");
        assert_ne!(data, b"template bytes");
        rc4_apply(b"abcde", &mut data).expect("decrypt");
        assert_eq!(data, b"template bytes");
    }

    #[test]
    fn rc4_rejects_oversized_key() {
        let mut data = vec![0u8; 4];
        assert!(rc4_apply(&[1u8; 17], &mut data).is_err());
    }

    #[test]
    fn aesv2_decrypts_object_payload() {
        let sec = handler(4, CryptMethod::AesV2);
        let file_key: Vec<u8> = (0u8..16).collect();
        let key = object_key(&file_key, 7, 0, true);
        let plain = b"BT /F1 12 Tf ({firstName}) Tj ET";
        let iv = [3u8; 16];
        let mut buf = vec![0u8; plain.len() + 16];
        buf[..plain.len()].copy_from_slice(plain);
        let ct = Encryptor::<Aes128>::new_from_slices(&key, &iv)
            .expect("cipher")
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plain.len())
            .expect("pad")
            .to_vec();
        let mut payload = iv.to_vec();
        payload.extend_from_slice(&ct);

        let out = sec
            .decrypt(CryptMethod::AesV2, &file_key, (7, 0), &payload)
            .expect("decrypt");
        assert_eq!(out, plain);
    }

    #[test]
    fn revision_two_accepts_empty_user_password() {
        let mut sec = handler(2, CryptMethod::Rc4);
        sec.key_len = 5;
        let key = sec.file_key(b"");
        let mut user_hash = PASSWORD_PADDING.to_vec();
        rc4_apply(&key, &mut user_hash).expect("rc4");
        sec.user_hash = user_hash;
        assert_eq!(sec.authenticate(b"").expect("auth"), key);
        assert!(matches!(
            sec.authenticate(b"nope"),
            Err(CryptError::InvalidPassword)
        ));
    }
}
