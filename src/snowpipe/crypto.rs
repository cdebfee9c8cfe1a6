use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pkcs8::{DecodePrivateKey as _, EncodePublicKey as _};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey as _, EncodeRsaPrivateKey as _};
use sha2::{Digest, Sha256};

use crate::{Config, Error};

const KEY_TAGS: [&str; 3] = ["ENCRYPTED PRIVATE KEY", "PRIVATE KEY", "RSA PRIVATE KEY"];

/// `SHA256:<base64>` digest of the DER public key, as registered on the user.
pub(super) fn public_key_fingerprint(key: &rsa::RsaPublicKey) -> Result<String, Error> {
    let spki = key
        .to_public_key_der()
        .map_err(|e| Error::Key(format!("cannot encode public key: {e}")))?;
    Ok(format!("SHA256:{}", STANDARD.encode(Sha256::digest(spki.as_bytes()))))
}

/// Decodes the first private key block in `pem_str`. Encrypted PKCS#8 blocks
/// need `passphrase`.
fn decode_private_key(pem_str: &str, passphrase: Option<&str>) -> Result<RsaPrivateKey, Error> {
    let blocks =
        pem::parse_many(pem_str).map_err(|e| Error::Key(format!("unreadable PEM input: {e}")))?;
    let block = blocks
        .iter()
        .find(|b| KEY_TAGS.contains(&b.tag()))
        .ok_or_else(|| Error::Key("no RSA private key block in PEM input".into()))?;
    let der = block.contents();
    match block.tag() {
        "ENCRYPTED PRIVATE KEY" => {
            let pass = passphrase.ok_or_else(|| {
                Error::Key("private key is encrypted but no passphrase is configured".into())
            })?;
            RsaPrivateKey::from_pkcs8_encrypted_der(der, pass)
                .map_err(|e| Error::Key(format!("cannot decrypt PKCS#8 key: {e}")))
        }
        "PRIVATE KEY" => RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| Error::Key(format!("invalid PKCS#8 key: {e}"))),
        _ => RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| Error::Key(format!("invalid PKCS#1 key: {e}"))),
    }
}

#[derive(serde::Serialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: u64,
    exp: u64,
}

/// Signs a key-pair JWT for the control plane from the configured private key.
pub(super) fn generate_assertion(cfg: &Config) -> Result<String, Error> {
    let private_key = cfg.private_key()?;
    let name = cfg.login.as_ref().unwrap_or(&cfg.user);
    let rsa_key = decode_private_key(&private_key, cfg.private_key_passphrase.as_deref())?;
    let fingerprint = match cfg.public_key_fp.as_ref() {
        Some(fp) => fp.clone(),
        None => public_key_fingerprint(&rsa_key.to_public_key())?,
    };
    let account_norm = cfg.account.to_uppercase().replace('.', "-");
    let sub = format!("{}.{}", account_norm, name.to_uppercase());
    let iss = format!("{}.{}", sub, fingerprint);
    let iat = jiff::Timestamp::now().as_second().max(0) as u64;
    let exp_secs = cfg.jwt_exp_secs.unwrap_or(3600);
    if exp_secs == 0 || exp_secs > 3600 {
        return Err(Error::Config(format!(
            "jwt_exp_secs must be between 1 and 3600 seconds (got {})",
            exp_secs
        )));
    }
    let claims = Claims {
        iss,
        sub,
        iat,
        exp: iat + exp_secs,
    };

    let pkcs1 = rsa_key
        .to_pkcs1_der()
        .map_err(|e| Error::Key(format!("PKCS#1 DER encode failed: {e}")))?;
    let enc_key = jsonwebtoken::EncodingKey::from_rsa_der(pkcs1.as_bytes());
    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    jsonwebtoken::encode(&header, &claims, &enc_key)
        .map_err(|e| Error::JwtSign(format!("JWT signing failed: {e}")))
}
