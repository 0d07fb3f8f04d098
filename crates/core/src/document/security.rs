//! Security handlers: the standard password handler (R2 to R6) and the
//! public-key handler driven by a caller-supplied recipient decryptor.

use super::saslprep::saslprep;
use crate::codec::aes::{aes_cbc_decrypt, aes_cbc_encrypt, decrypt_with_iv};
use crate::codec::arcfour::rc4;
use crate::error::{PdfError, Result};
use crate::model::{ObjRef, PdfDictionary, PdfObject};
use rustc_hash::FxHashMap;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Password padding string used by revisions 2 to 4.
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Opens the PKCS#7 envelope of one `/Recipients` entry.
///
/// Returns the decrypted envelope content (the first 20 bytes are the
/// seed), or `None` if the blob is not addressed to this recipient.
pub trait RecipientDecryptor: Send + Sync {
    fn open_envelope(&self, recipient: &[u8]) -> Option<Vec<u8>>;
}

/// What the caller offers to unlock a document.
#[derive(Clone, Default)]
pub struct Credentials {
    pub password: Vec<u8>,
    pub recipient: Option<Arc<dyn RecipientDecryptor>>,
}

impl Credentials {
    pub fn password(password: impl Into<Vec<u8>>) -> Self {
        Self {
            password: password.into(),
            recipient: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"<redacted>")
            .field("recipient", &self.recipient.is_some())
            .finish()
    }
}

/// Decrypts the strings and streams of one document.
pub trait SecurityHandler: Send + Sync {
    /// Decrypt a string belonging to object `obj`.
    fn decrypt_string(&self, obj: ObjRef, data: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt the payload of a stream whose dictionary is `dict`.
    fn decrypt_stream(&self, obj: ObjRef, data: &[u8], dict: &PdfDictionary) -> Result<Vec<u8>>;

    /// Whether a stream with this dictionary carries encrypted data.
    fn encrypts_stream(&self, dict: &PdfDictionary) -> bool;

    /// File encryption key.
    fn key(&self) -> &[u8];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CryptMethod {
    Identity,
    Rc4,
    AesV2,
    AesV3,
}

impl CryptMethod {
    fn from_cfm(cfm: Option<&str>) -> Result<Self> {
        match cfm.unwrap_or("None") {
            "None" | "Identity" => Ok(Self::Identity),
            "V2" => Ok(Self::Rc4),
            "AESV2" => Ok(Self::AesV2),
            "AESV3" => Ok(Self::AesV3),
            other => Err(PdfError::UnsupportedEncryption(format!(
                "crypt filter method /{}",
                other
            ))),
        }
    }
}

/// Per-object decryption shared by every handler once the file key is known.
#[derive(Debug)]
struct ObjectCipher {
    key: Vec<u8>,
    strf: CryptMethod,
    stmf: CryptMethod,
    filters: FxHashMap<String, CryptMethod>,
    encrypt_metadata: bool,
}

impl ObjectCipher {
    fn object_key(&self, obj: ObjRef, aes: bool) -> Vec<u8> {
        let mut ctx = md5::Context::new();
        ctx.consume(&self.key);
        ctx.consume(&obj.num.to_le_bytes()[..3]);
        ctx.consume(obj.generation.to_le_bytes());
        if aes {
            ctx.consume(b"sAlT");
        }
        let digest = ctx.finalize();
        digest.0[..(self.key.len() + 5).min(16)].to_vec()
    }

    fn apply(&self, method: CryptMethod, obj: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(obj, false), data)),
            CryptMethod::AesV2 => decrypt_with_iv(&self.object_key(obj, true), data),
            CryptMethod::AesV3 => decrypt_with_iv(&self.key, data),
        }
    }

    fn stream_method(&self, dict: &PdfDictionary) -> CryptMethod {
        if !self.encrypt_metadata && dict.type_name() == Some("Metadata") {
            return CryptMethod::Identity;
        }
        match stream_crypt_filter(dict) {
            Some("Identity") => CryptMethod::Identity,
            Some(name) => self.filters.get(name).copied().unwrap_or(self.stmf),
            None => self.stmf,
        }
    }

    fn decrypt_string(&self, obj: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.strf, obj, data)
    }

    fn decrypt_stream(&self, obj: ObjRef, data: &[u8], dict: &PdfDictionary) -> Result<Vec<u8>> {
        self.apply(self.stream_method(dict), obj, data)
    }
}

/// Name of a stream-level `/Crypt` filter, `Identity` when it names none.
fn stream_crypt_filter(dict: &PdfDictionary) -> Option<&str> {
    let index = match dict.get("Filter")? {
        PdfObject::Name(n) if n == "Crypt" => 0,
        PdfObject::Array(arr) => arr.iter().position(|f| f.as_name().ok() == Some("Crypt"))?,
        _ => return None,
    };
    let parms = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(PdfObject::Dictionary(d)) if index == 0 => Some(d),
        Some(PdfObject::Array(arr)) => arr.get(index).and_then(|p| p.as_dict().ok()),
        _ => None,
    };
    Some(parms.and_then(|p| p.get_name("Name")).unwrap_or("Identity"))
}

/// Crypt filter table from `/CF`, and the `/StrF` `/StmF` selections.
fn crypt_filters(
    encrypt: &PdfDictionary,
) -> Result<(FxHashMap<String, CryptMethod>, CryptMethod, CryptMethod)> {
    let mut filters = FxHashMap::default();
    if let Some(cf) = encrypt.get("CF").and_then(|v| v.as_dict().ok()) {
        for (name, filter) in cf.iter() {
            let cfm = filter.as_dict().ok().and_then(|d| d.get_name("CFM"));
            filters.insert(name.as_str().to_string(), CryptMethod::from_cfm(cfm)?);
        }
    }
    let select = |key: &str| -> Result<CryptMethod> {
        match encrypt.get_name(key).unwrap_or("Identity") {
            "Identity" => Ok(CryptMethod::Identity),
            name => filters.get(name).copied().ok_or_else(|| {
                PdfError::UnsupportedEncryption(format!("/{} names unknown filter /{}", key, name))
            }),
        }
    };
    let strf = select("StrF")?;
    let stmf = select("StmF")?;
    Ok((filters, strf, stmf))
}

fn get_bytes(encrypt: &PdfDictionary, key: &str) -> Result<Vec<u8>> {
    encrypt
        .get(key)
        .ok_or_else(|| PdfError::EncryptionError(format!("missing /{} in /Encrypt", key)))?
        .as_string()
        .map(|s| s.to_vec())
}

fn get_int(encrypt: &PdfDictionary, key: &str) -> Result<i64> {
    encrypt
        .get_i64(key)
        .ok_or_else(|| PdfError::EncryptionError(format!("missing /{} in /Encrypt", key)))
}

fn encrypts_metadata(encrypt: &PdfDictionary) -> bool {
    encrypt
        .get("EncryptMetadata")
        .and_then(|v| v.as_bool().ok())
        .unwrap_or(true)
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

/// The standard password-based handler.
pub struct StandardSecurityHandler {
    revision: i64,
    cipher: ObjectCipher,
}

/// Inputs to key derivation for revisions 2 to 4.
struct LegacyParams<'a> {
    revision: i64,
    key_len: usize,
    o: &'a [u8],
    u: &'a [u8],
    p: u32,
    doc_id: &'a [u8],
    encrypt_metadata: bool,
}

impl LegacyParams<'_> {
    fn compute_key(&self, password: &[u8]) -> Vec<u8> {
        let mut ctx = md5::Context::new();
        ctx.consume(pad_password(password));
        ctx.consume(self.o);
        ctx.consume(self.p.to_le_bytes());
        ctx.consume(self.doc_id);
        if self.revision >= 4 && !self.encrypt_metadata {
            ctx.consume([0xFF; 4]);
        }
        let mut hash = ctx.finalize().0.to_vec();
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = md5::compute(&hash[..self.key_len]).0.to_vec();
            }
        }
        hash.truncate(self.key_len);
        hash
    }

    fn compute_u(&self, key: &[u8]) -> Vec<u8> {
        if self.revision == 2 {
            return rc4(key, &PASSWORD_PADDING);
        }
        let mut ctx = md5::Context::new();
        ctx.consume(PASSWORD_PADDING);
        ctx.consume(self.doc_id);
        let mut result = rc4(key, &ctx.finalize().0);
        for i in 1..20u8 {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            result = rc4(&round_key, &result);
        }
        result
    }

    fn check_user(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = self.compute_key(password);
        let u = self.compute_u(&key);
        let matches = if self.revision == 2 {
            u.as_slice() == self.u
        } else {
            self.u.len() >= 16 && u[..16] == self.u[..16]
        };
        matches.then_some(key)
    }

    fn check_owner(&self, password: &[u8]) -> Option<Vec<u8>> {
        let mut hash = md5::compute(pad_password(password)).0.to_vec();
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = md5::compute(&hash).0.to_vec();
            }
        }
        let key = &hash[..self.key_len];
        let user_password = if self.revision == 2 {
            rc4(key, self.o)
        } else {
            let mut result = self.o.to_vec();
            for i in (0..20u8).rev() {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
                result = rc4(&round_key, &result);
            }
            result
        };
        self.check_user(&user_password)
    }
}

/// O and U split into hash, validation salt and key salt (revisions 5 and 6).
struct ModernParams {
    revision: i64,
    o: Vec<u8>,
    u: Vec<u8>,
    oe: Vec<u8>,
    ue: Vec<u8>,
}

impl ModernParams {
    fn prepare_password(&self, password: &[u8]) -> Result<Vec<u8>> {
        let mut bytes = if self.revision == 6 {
            match std::str::from_utf8(password) {
                Ok(text) => saslprep(text)?.into_bytes(),
                Err(_) => password.to_vec(),
            }
        } else {
            password.to_vec()
        };
        bytes.truncate(127);
        Ok(bytes)
    }

    fn hash(&self, password: &[u8], salt: &[u8], udata: &[u8]) -> Result<Vec<u8>> {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        hasher.update(udata);
        let k = hasher.finalize().to_vec();
        if self.revision == 5 {
            return Ok(k);
        }
        hardened_hash(password, k, udata)
    }

    fn authenticate(&self, password: &[u8]) -> Result<Option<Vec<u8>>> {
        let password = self.prepare_password(password)?;
        let u48 = &self.u[..48];

        if self.hash(&password, &self.u[32..40], &[])? == self.u[..32] {
            let key_hash = self.hash(&password, &self.u[40..48], &[])?;
            return Ok(Some(aes_cbc_decrypt(&key_hash, &[0; 16], &self.ue[..32])?));
        }
        if self.hash(&password, &self.o[32..40], u48)? == self.o[..32] {
            let key_hash = self.hash(&password, &self.o[40..48], u48)?;
            return Ok(Some(aes_cbc_decrypt(&key_hash, &[0; 16], &self.oe[..32])?));
        }
        Ok(None)
    }
}

/// Revision 6 iterated hash over SHA-256/384/512 and AES-128-CBC.
fn hardened_hash(password: &[u8], mut k: Vec<u8>, udata: &[u8]) -> Result<Vec<u8>> {
    let mut round = 0u32;
    loop {
        let mut block = Vec::with_capacity(password.len() + k.len() + udata.len());
        block.extend_from_slice(password);
        block.extend_from_slice(&k);
        block.extend_from_slice(udata);
        let k1 = block.repeat(64);

        let e = aes_cbc_encrypt(&k[..16], &k[16..32], &k1)?;
        let selector = e[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        let last = e[e.len() - 1] as u32;
        if round >= 64 && last + 32 <= round {
            break;
        }
    }
    k.truncate(32);
    Ok(k)
}

impl StandardSecurityHandler {
    pub fn new(encrypt: &PdfDictionary, doc_id: &[u8], password: &[u8]) -> Result<Self> {
        let v = encrypt.get_i64("V").unwrap_or(0);
        let revision = get_int(encrypt, "R")?;
        let encrypt_metadata = encrypts_metadata(encrypt);

        let (filters, strf, stmf) = match v {
            1 | 2 => (FxHashMap::default(), CryptMethod::Rc4, CryptMethod::Rc4),
            4 | 5 => crypt_filters(encrypt)?,
            _ => {
                return Err(PdfError::UnsupportedEncryption(format!(
                    "standard handler V={}",
                    v
                )));
            }
        };

        let key = match revision {
            2..=4 => {
                let key_len = match revision {
                    2 => 5,
                    4 => 16,
                    _ => (encrypt.get_i64("Length").unwrap_or(40).clamp(40, 128) / 8) as usize,
                };
                let o = get_bytes(encrypt, "O")?;
                let u = get_bytes(encrypt, "U")?;
                let params = LegacyParams {
                    revision,
                    key_len,
                    o: &o,
                    u: &u,
                    p: get_int(encrypt, "P")? as u32,
                    doc_id,
                    encrypt_metadata,
                };
                params
                    .check_user(password)
                    .or_else(|| params.check_owner(password))
            }
            5 | 6 => {
                let params = ModernParams {
                    revision,
                    o: get_bytes(encrypt, "O")?,
                    u: get_bytes(encrypt, "U")?,
                    oe: get_bytes(encrypt, "OE")?,
                    ue: get_bytes(encrypt, "UE")?,
                };
                if params.o.len() < 48
                    || params.u.len() < 48
                    || params.oe.len() < 32
                    || params.ue.len() < 32
                {
                    return Err(PdfError::EncryptionError(
                        "truncated /O /U /OE or /UE value".into(),
                    ));
                }
                params.authenticate(password)?
            }
            _ => {
                return Err(PdfError::UnsupportedEncryption(format!(
                    "standard handler R={}",
                    revision
                )));
            }
        };
        let key = key.ok_or(PdfError::BadPassword)?;
        debug!(revision, key_len = key.len(), "standard security handler ready");

        Ok(Self {
            revision,
            cipher: ObjectCipher {
                key,
                strf,
                stmf,
                filters,
                encrypt_metadata,
            },
        })
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }
}

impl SecurityHandler for StandardSecurityHandler {
    fn decrypt_string(&self, obj: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.cipher.decrypt_string(obj, data)
    }

    fn decrypt_stream(&self, obj: ObjRef, data: &[u8], dict: &PdfDictionary) -> Result<Vec<u8>> {
        self.cipher.decrypt_stream(obj, data, dict)
    }

    fn encrypts_stream(&self, dict: &PdfDictionary) -> bool {
        self.cipher.stream_method(dict) != CryptMethod::Identity
    }

    fn key(&self) -> &[u8] {
        &self.cipher.key
    }
}

/// The `/Adobe.PubSec` handler.
pub struct PublicKeySecurityHandler {
    cipher: ObjectCipher,
}

impl PublicKeySecurityHandler {
    pub fn new(encrypt: &PdfDictionary, decryptor: &dyn RecipientDecryptor) -> Result<Self> {
        let v = encrypt.get_i64("V").unwrap_or(0);
        let encrypt_metadata = encrypts_metadata(encrypt);

        let (filters, strf, stmf, recipients, key_bits) = match v {
            1 | 2 => {
                let recipients = encrypt.get("Recipients");
                let bits = encrypt.get_i64("Length").unwrap_or(40);
                (FxHashMap::default(), CryptMethod::Rc4, CryptMethod::Rc4, recipients, bits)
            }
            4 | 5 => {
                let (filters, strf, stmf) = crypt_filters(encrypt)?;
                let default_cf = encrypt
                    .get("CF")
                    .and_then(|cf| cf.as_dict().ok())
                    .and_then(|cf| cf.get(encrypt.get_name("StmF").unwrap_or("DefaultCryptFilter")))
                    .and_then(|f| f.as_dict().ok());
                let recipients = default_cf.and_then(|f| f.get("Recipients"));
                let bits = if stmf == CryptMethod::AesV3 { 256 } else { 128 };
                (filters, strf, stmf, recipients, bits)
            }
            _ => {
                return Err(PdfError::UnsupportedEncryption(format!(
                    "public-key handler V={}",
                    v
                )));
            }
        };

        let recipients: Vec<&[u8]> = match recipients {
            Some(PdfObject::Array(arr)) => arr.iter().filter_map(|r| r.as_string().ok()).collect(),
            Some(PdfObject::String(s)) => vec![s.bytes.as_slice()],
            _ => {
                return Err(PdfError::EncryptionError(
                    "public-key /Encrypt has no /Recipients".into(),
                ));
            }
        };

        let seed = recipients
            .iter()
            .find_map(|r| decryptor.open_envelope(r))
            .filter(|envelope| envelope.len() >= 20)
            .ok_or(PdfError::BadPassword)?;

        let key_len = (key_bits.clamp(40, 256) / 8) as usize;
        let mut key = if stmf == CryptMethod::AesV3 {
            let mut hasher = Sha256::new();
            feed_seed(&mut hasher, &seed[..20], &recipients, encrypt_metadata);
            hasher.finalize().to_vec()
        } else {
            let mut hasher = Sha1::new();
            feed_seed(&mut hasher, &seed[..20], &recipients, encrypt_metadata);
            hasher.finalize().to_vec()
        };
        key.truncate(key_len);

        Ok(Self {
            cipher: ObjectCipher {
                key,
                strf,
                stmf,
                filters,
                encrypt_metadata,
            },
        })
    }
}

fn feed_seed<D: Digest>(hasher: &mut D, seed: &[u8], recipients: &[&[u8]], encrypt_metadata: bool) {
    hasher.update(seed);
    for r in recipients {
        hasher.update(r);
    }
    if !encrypt_metadata {
        hasher.update([0xFF; 4]);
    }
}

impl SecurityHandler for PublicKeySecurityHandler {
    fn decrypt_string(&self, obj: ObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.cipher.decrypt_string(obj, data)
    }

    fn decrypt_stream(&self, obj: ObjRef, data: &[u8], dict: &PdfDictionary) -> Result<Vec<u8>> {
        self.cipher.decrypt_stream(obj, data, dict)
    }

    fn encrypts_stream(&self, dict: &PdfDictionary) -> bool {
        self.cipher.stream_method(dict) != CryptMethod::Identity
    }

    fn key(&self) -> &[u8] {
        &self.cipher.key
    }
}

/// Pick the handler named by `/Filter` and authenticate.
///
/// `doc_id` is the first element of the trailer `/ID`.
pub fn create_security_handler(
    encrypt: &PdfDictionary,
    doc_id: &[u8],
    credentials: &Credentials,
) -> Result<Box<dyn SecurityHandler>> {
    match encrypt.get_name("Filter").unwrap_or("Standard") {
        "Standard" => Ok(Box::new(StandardSecurityHandler::new(
            encrypt,
            doc_id,
            &credentials.password,
        )?)),
        "Adobe.PubSec" => {
            let decryptor = credentials.recipient.as_deref().ok_or(PdfError::BadPassword)?;
            Ok(Box::new(PublicKeySecurityHandler::new(encrypt, decryptor)?))
        }
        other => Err(PdfError::UnsupportedEncryption(format!(
            "security handler /{}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_password() {
        assert_eq!(pad_password(b""), PASSWORD_PADDING);
        let padded = pad_password(b"ab");
        assert_eq!(&padded[..2], b"ab");
        assert_eq!(&padded[2..], &PASSWORD_PADDING[..30]);
    }

    #[test]
    fn test_stream_crypt_filter_lookup() {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::name("Crypt"));
        assert_eq!(stream_crypt_filter(&dict), Some("Identity"));

        let mut parms = PdfDictionary::new();
        parms.insert("Name", PdfObject::name("StdCF"));
        dict.insert(
            "Filter",
            vec![PdfObject::name("Crypt"), PdfObject::name("FlateDecode")],
        );
        dict.insert("DecodeParms", vec![PdfObject::Dictionary(parms), PdfObject::Null]);
        assert_eq!(stream_crypt_filter(&dict), Some("StdCF"));
    }
}
