//! Security handler tests.
//!
//! Encryption dictionaries are generated here from known passwords so each
//! revision can be checked end to end.

mod common;

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use common::PdfBuilder;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::sync::Arc;
use vellum_core::codec::aes::aes_cbc_encrypt;
use vellum_core::codec::arcfour::rc4;
use vellum_core::document::{
    Credentials, PASSWORD_PADDING, RecipientDecryptor, SecurityHandler, StandardSecurityHandler,
    create_security_handler,
};
use vellum_core::model::{ObjRef, PdfDictionary, PdfObject, PdfString};
use vellum_core::{IncrementalWriter, PdfError, PdfReader, ReaderOptions};

const DOC_ID: &[u8] = b"0123456789abcdef";
const P: i32 = -4;

fn pad(password: &[u8]) -> Vec<u8> {
    let mut out = password.to_vec();
    out.extend_from_slice(&PASSWORD_PADDING[..32 - password.len()]);
    out
}

fn rc4_rounds(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = rc4(key, data);
    for i in 1..20u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        out = rc4(&round_key, &out);
    }
    out
}

/// O, U and file key for revisions 2 to 4.
fn legacy_values(revision: i64, user: &[u8], owner: &[u8]) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let key_len = if revision == 2 { 5 } else { 16 };

    let mut hash = md5::compute(pad(owner)).0.to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash).0.to_vec();
        }
    }
    let owner_key = &hash[..key_len];
    let o = if revision == 2 {
        rc4(owner_key, &pad(user))
    } else {
        rc4_rounds(owner_key, &pad(user))
    };

    let mut ctx = md5::Context::new();
    ctx.consume(pad(user));
    ctx.consume(&o);
    ctx.consume((P as u32).to_le_bytes());
    ctx.consume(DOC_ID);
    let mut key = ctx.finalize().0.to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            key = md5::compute(&key[..key_len]).0.to_vec();
        }
    }
    key.truncate(key_len);

    let u = if revision == 2 {
        rc4(&key, &PASSWORD_PADDING)
    } else {
        let mut ctx = md5::Context::new();
        ctx.consume(PASSWORD_PADDING);
        ctx.consume(DOC_ID);
        let mut u = rc4_rounds(&key, &ctx.finalize().0);
        u.extend_from_slice(&[0u8; 16]);
        u
    };
    (o, u, key)
}

fn legacy_dict(revision: i64, o: &[u8], u: &[u8]) -> PdfDictionary {
    let mut dict = PdfDictionary::new();
    dict.insert("Filter", PdfObject::name("Standard"));
    dict.insert("V", if revision == 2 { 1 } else { 2 });
    dict.insert("R", revision);
    dict.insert("Length", if revision == 2 { 40 } else { 128 });
    dict.insert("O", PdfString::new(o));
    dict.insert("U", PdfString::new(u));
    dict.insert("P", P);
    dict
}

fn object_key(key: &[u8], r: ObjRef, aes: bool) -> Vec<u8> {
    let mut ctx = md5::Context::new();
    ctx.consume(key);
    ctx.consume(&r.num.to_le_bytes()[..3]);
    ctx.consume(r.generation.to_le_bytes());
    if aes {
        ctx.consume(b"sAlT");
    }
    ctx.finalize().0[..(key.len() + 5).min(16)].to_vec()
}

// === Standard handler, RC4 ===

#[test]
fn test_revision2_user_password() {
    let (o, u, key) = legacy_values(2, b"foo", b"owner");
    let dict = legacy_dict(2, &o, &u);
    let handler = StandardSecurityHandler::new(&dict, DOC_ID, b"foo").unwrap();
    assert_eq!(handler.revision(), 2);
    assert_eq!(handler.key(), key.as_slice());
    assert_eq!(key.len(), 5);
}

#[test]
fn test_revision3_user_and_owner_password() {
    let (o, u, key) = legacy_values(3, b"foo", b"owner");
    let dict = legacy_dict(3, &o, &u);

    let user = StandardSecurityHandler::new(&dict, DOC_ID, b"foo").unwrap();
    assert_eq!(user.key(), key.as_slice());

    let owner = StandardSecurityHandler::new(&dict, DOC_ID, b"owner").unwrap();
    assert_eq!(owner.key(), key.as_slice());
}

#[test]
fn test_wrong_and_empty_password_rejected() {
    for revision in [2, 3] {
        let (o, u, _) = legacy_values(revision, b"foo", b"owner");
        let dict = legacy_dict(revision, &o, &u);
        for password in [&b"bar"[..], &b""[..]] {
            let err = StandardSecurityHandler::new(&dict, DOC_ID, password)
                .err()
                .unwrap();
            assert!(matches!(err, PdfError::BadPassword));
            assert!(err.is_credential_error());
        }
    }
}

#[test]
fn test_empty_user_password_opens() {
    let (o, u, key) = legacy_values(3, b"", b"owner");
    let dict = legacy_dict(3, &o, &u);
    let handler = StandardSecurityHandler::new(&dict, DOC_ID, b"").unwrap();
    assert_eq!(handler.key(), key.as_slice());
}

#[test]
fn test_rc4_string_decryption_uses_object_key() {
    let (o, u, key) = legacy_values(3, b"foo", b"owner");
    let dict = legacy_dict(3, &o, &u);
    let handler = StandardSecurityHandler::new(&dict, DOC_ID, b"foo").unwrap();

    let id = ObjRef::new(7, 0);
    let encrypted = rc4(&object_key(&key, id, false), b"Attack at dawn");
    assert_eq!(handler.decrypt_string(id, &encrypted).unwrap(), b"Attack at dawn");

    // Same bytes under another object number do not decrypt.
    let other = handler.decrypt_string(ObjRef::new(8, 0), &encrypted).unwrap();
    assert_ne!(other, b"Attack at dawn");
}

// === Standard handler, AES ===

fn aes_v4_dict(o: &[u8], u: &[u8]) -> PdfDictionary {
    let mut std_cf = PdfDictionary::new();
    std_cf.insert("CFM", PdfObject::name("AESV2"));
    std_cf.insert("Length", 16);
    let mut cf = PdfDictionary::new();
    cf.insert("StdCF", std_cf);

    let mut dict = legacy_dict(4, o, u);
    dict.insert("V", 4);
    dict.insert("CF", cf);
    dict.insert("StmF", PdfObject::name("StdCF"));
    dict.insert("StrF", PdfObject::name("StdCF"));
    dict
}

fn pkcs7(data: &[u8]) -> Vec<u8> {
    let n = 16 - data.len() % 16;
    let mut out = data.to_vec();
    out.extend(std::iter::repeat_n(n as u8, n));
    out
}

#[test]
fn test_aesv2_string_and_stream() {
    let (o, u, key) = legacy_values(4, b"foo", b"owner");
    let dict = aes_v4_dict(&o, &u);
    let handler = StandardSecurityHandler::new(&dict, DOC_ID, b"foo").unwrap();
    assert_eq!(handler.key(), key.as_slice());

    let id = ObjRef::new(12, 0);
    let iv = [7u8; 16];
    let mut payload = iv.to_vec();
    payload.extend(aes_cbc_encrypt(&object_key(&key, id, true), &iv, &pkcs7(b"hello world")).unwrap());

    assert_eq!(handler.decrypt_string(id, &payload).unwrap(), b"hello world");
    let stream_dict = PdfDictionary::new();
    assert!(handler.encrypts_stream(&stream_dict));
    assert_eq!(
        handler.decrypt_stream(id, &payload, &stream_dict).unwrap(),
        b"hello world"
    );

    // Too short to hold an IV.
    assert!(handler.decrypt_string(id, b"short").unwrap().is_empty());
}

#[test]
fn test_identity_crypt_filter_and_metadata() {
    let (o, u, _) = legacy_values(4, b"foo", b"owner");
    let mut dict = aes_v4_dict(&o, &u);
    dict.insert("EncryptMetadata", false);
    let handler = StandardSecurityHandler::new(&dict, DOC_ID, b"foo");
    // /EncryptMetadata false changes the key, so the U check fails.
    assert!(matches!(handler.err(), Some(PdfError::BadPassword)));

    let dict = aes_v4_dict(&o, &u);
    let handler = StandardSecurityHandler::new(&dict, DOC_ID, b"foo").unwrap();
    let mut crypt = PdfDictionary::new();
    crypt.insert("Filter", PdfObject::name("Crypt"));
    assert!(!handler.encrypts_stream(&crypt));
}

#[test]
fn test_revision5_sha256() {
    let password = b"secret";
    let file_key = [0x42u8; 32];
    let validation_salt = *b"vsalt123";
    let key_salt = *b"ksalt123";

    let mut u = Sha256::new()
        .chain_update(password)
        .chain_update(validation_salt)
        .finalize()
        .to_vec();
    u.extend_from_slice(&validation_salt);
    u.extend_from_slice(&key_salt);

    let intermediate = Sha256::new()
        .chain_update(password)
        .chain_update(key_salt)
        .finalize();
    let mut ue = file_key.to_vec();
    cbc::Encryptor::<aes::Aes256>::new(&intermediate, (&[0u8; 16][..]).into())
        .encrypt_padded_mut::<NoPadding>(&mut ue, 32)
        .unwrap();

    let mut dict = PdfDictionary::new();
    dict.insert("Filter", PdfObject::name("Standard"));
    dict.insert("V", 5);
    dict.insert("R", 5);
    dict.insert("O", PdfString::new(vec![0u8; 48]));
    dict.insert("U", PdfString::new(u));
    dict.insert("OE", PdfString::new(vec![0u8; 32]));
    dict.insert("UE", PdfString::new(ue));
    dict.insert("P", P);

    let handler = StandardSecurityHandler::new(&dict, DOC_ID, password).unwrap();
    assert_eq!(handler.key(), &file_key[..]);
    assert!(matches!(
        StandardSecurityHandler::new(&dict, DOC_ID, b"nope").err(),
        Some(PdfError::BadPassword)
    ));

    dict.insert("UE", PdfString::new(vec![0u8; 8]));
    assert!(matches!(
        StandardSecurityHandler::new(&dict, DOC_ID, password).err(),
        Some(PdfError::EncryptionError(_))
    ));
}

/// ISO 32000-2 algorithm 2.B, written out independently of the handler.
fn r6_hash(password: &[u8], salt: &[u8], udata: &[u8]) -> Vec<u8> {
    let mut k = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(udata)
        .finalize()
        .to_vec();
    let mut round = 0usize;
    loop {
        let mut e = Vec::new();
        for _ in 0..64 {
            e.extend_from_slice(password);
            e.extend_from_slice(&k);
            e.extend_from_slice(udata);
        }
        let len = e.len();
        cbc::Encryptor::<aes::Aes128>::new((&k[..16]).into(), (&k[16..32]).into())
            .encrypt_padded_mut::<NoPadding>(&mut e, len)
            .unwrap();
        let head: [u8; 16] = e[..16].try_into().unwrap();
        k = match u128::from_be_bytes(head) % 3 {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };
        round += 1;
        if round >= 64 && usize::from(e[len - 1]) + 32 <= round {
            break;
        }
    }
    k.truncate(32);
    k
}

fn aes256_wrap(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    cbc::Encryptor::<aes::Aes256>::new(key.into(), (&[0u8; 16][..]).into())
        .encrypt_padded_mut::<NoPadding>(&mut out, data.len())
        .unwrap();
    out
}

fn r6_dict(user: &[u8], owner: &[u8], file_key: &[u8]) -> PdfDictionary {
    let mut u = r6_hash(user, b"uvalsalt", &[]);
    u.extend_from_slice(b"uvalsalt");
    u.extend_from_slice(b"ukeysalt");
    let ue = aes256_wrap(&r6_hash(user, b"ukeysalt", &[]), file_key);

    let mut o = r6_hash(owner, b"ovalsalt", &u);
    o.extend_from_slice(b"ovalsalt");
    o.extend_from_slice(b"okeysalt");
    let oe = aes256_wrap(&r6_hash(owner, b"okeysalt", &u), file_key);

    let mut dict = PdfDictionary::new();
    dict.insert("Filter", PdfObject::name("Standard"));
    dict.insert("V", 5);
    dict.insert("R", 6);
    dict.insert("O", PdfString::new(o));
    dict.insert("U", PdfString::new(u));
    dict.insert("OE", PdfString::new(oe));
    dict.insert("UE", PdfString::new(ue));
    dict.insert("P", P);
    dict
}

#[test]
fn test_revision6_user_and_owner_password() {
    let file_key: Vec<u8> = (0u8..32).collect();
    let dict = r6_dict(b"user6", b"owner6", &file_key);

    let handler = StandardSecurityHandler::new(&dict, DOC_ID, b"user6").unwrap();
    assert_eq!(handler.revision(), 6);
    assert_eq!(handler.key(), &file_key[..]);

    let handler = StandardSecurityHandler::new(&dict, DOC_ID, b"owner6").unwrap();
    assert_eq!(handler.key(), &file_key[..]);

    for wrong in [&b"user5"[..], b"", b"owner6 "] {
        assert!(matches!(
            StandardSecurityHandler::new(&dict, DOC_ID, wrong).err(),
            Some(PdfError::BadPassword)
        ));
    }
}

#[test]
fn test_revision6_password_is_saslprepped() {
    let file_key = [0x5Au8; 32];
    // Stored hashes are over the prepared form "caf\u{e9} pass".
    let dict = r6_dict("caf\u{e9} pass".as_bytes(), b"owner", &file_key);

    // Decomposed accent, no-break space and a soft hyphen all normalize away.
    let typed = "cafe\u{301}\u{a0}pa\u{ad}ss";
    let handler = StandardSecurityHandler::new(&dict, DOC_ID, typed.as_bytes()).unwrap();
    assert_eq!(handler.key(), &file_key[..]);

    let prohibited = "caf\u{e9}\u{7}pass";
    assert!(
        StandardSecurityHandler::new(&dict, DOC_ID, prohibited.as_bytes()).is_err()
    );
}

// === Handler selection ===

#[test]
fn test_unknown_handler_is_unsupported() {
    let mut dict = PdfDictionary::new();
    dict.insert("Filter", PdfObject::name("FooSecurity"));
    let err = create_security_handler(&dict, DOC_ID, &Credentials::default())
        .err()
        .unwrap();
    assert!(matches!(err, PdfError::UnsupportedEncryption(_)));
    assert!(err.is_unsupported());
}

#[test]
fn test_unknown_revision_is_unsupported() {
    let (o, u, _) = legacy_values(3, b"foo", b"owner");
    let mut dict = legacy_dict(3, &o, &u);
    dict.insert("R", 9);
    assert!(matches!(
        StandardSecurityHandler::new(&dict, DOC_ID, b"foo").err(),
        Some(PdfError::UnsupportedEncryption(_))
    ));
}

struct FixedRecipient {
    blob: Vec<u8>,
    seed: [u8; 20],
}

impl RecipientDecryptor for FixedRecipient {
    fn open_envelope(&self, recipient: &[u8]) -> Option<Vec<u8>> {
        (recipient == self.blob.as_slice()).then(|| {
            let mut out = self.seed.to_vec();
            out.extend_from_slice(&[0xFF; 4]);
            out
        })
    }
}

#[test]
fn test_public_key_handler_derives_sha1_key() {
    let blob = b"pkcs7-envelope".to_vec();
    let seed = [9u8; 20];

    let mut dict = PdfDictionary::new();
    dict.insert("Filter", PdfObject::name("Adobe.PubSec"));
    dict.insert("V", 2);
    dict.insert("Length", 128);
    dict.insert(
        "Recipients",
        vec![
            PdfObject::string(b"someone else".to_vec()),
            PdfObject::string(blob.clone()),
        ],
    );

    // No decryptor supplied.
    assert!(matches!(
        create_security_handler(&dict, DOC_ID, &Credentials::default()).err(),
        Some(PdfError::BadPassword)
    ));

    let credentials = Credentials {
        password: Vec::new(),
        recipient: Some(Arc::new(FixedRecipient {
            blob: blob.clone(),
            seed,
        })),
    };
    let handler = create_security_handler(&dict, DOC_ID, &credentials).unwrap();

    let expected = Sha1::new()
        .chain_update(seed)
        .chain_update(b"someone else")
        .chain_update(&blob)
        .finalize();
    assert_eq!(handler.key(), &expected[..16]);
}

// === Encrypted documents ===

fn hex_string(bytes: &[u8]) -> String {
    format!("<{}>", hex::encode(bytes))
}

fn encrypted_pdf() -> Vec<u8> {
    let (o, u, key) = legacy_values(3, b"foo", b"owner");
    let content = rc4(&object_key(&key, ObjRef::new(4, 0), false), b"BT /F1 12 Tf (Hi) Tj ET");
    let title = rc4(&object_key(&key, ObjRef::new(6, 0), false), b"Secret title");

    let mut b = PdfBuilder::new("1.4");
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
        .stream(4, "", &content, None)
        .object(
            5,
            &format!(
                "<< /Filter /Standard /V 2 /R 3 /Length 128 /P {} /O {} /U {} >>",
                P,
                hex_string(&o),
                hex_string(&u)
            ),
        )
        .object(6, &format!("<< /Title {} >>", hex_string(&title)));
    b.xref_table(&format!(
        " /Root 1 0 R /Info 6 0 R /Encrypt 5 0 R /ID [{} {}]",
        hex_string(DOC_ID),
        hex_string(DOC_ID)
    ));
    b.finish()
}

#[test]
fn test_reader_decrypts_strings_and_streams() {
    let reader =
        PdfReader::from_bytes(encrypted_pdf(), ReaderOptions::default().with_password("foo"))
            .unwrap();
    assert!(reader.is_encrypted());

    let info = reader.get(6).unwrap().unwrap();
    let title = info.as_dict().unwrap().get("Title").unwrap();
    assert_eq!(title.as_string().unwrap(), b"Secret title");

    let page = reader.get_page(0).unwrap();
    let contents = reader.resolve(page.contents().unwrap()).unwrap();
    let stream = contents.as_stream().unwrap();
    assert!(stream.is_encrypted());
    assert_eq!(
        reader.decode_stream(stream).unwrap(),
        b"BT /F1 12 Tf (Hi) Tj ET"
    );

    // The encryption dictionary itself stays as stored.
    let encrypt = reader.get(5).unwrap().unwrap();
    assert_eq!(encrypt.as_dict().unwrap().get_i64("R"), Some(3));
}

#[test]
fn test_reader_rejects_wrong_password() {
    let err = PdfReader::from_bytes(encrypted_pdf(), ReaderOptions::default().with_password("bar"))
        .err()
        .unwrap();
    assert!(matches!(err, PdfError::BadPassword));
}

#[test]
fn test_incremental_update_refuses_encrypted_source() {
    let original = encrypted_pdf();
    let reader =
        PdfReader::from_bytes(original.clone(), ReaderOptions::default().with_password("foo"))
            .unwrap();
    let err = IncrementalWriter::new(&original, &reader, Vec::new()).err().unwrap();
    assert!(matches!(err, PdfError::UnsupportedEncryption(_)));
}
