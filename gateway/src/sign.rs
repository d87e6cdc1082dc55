// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OpenPGP signing: cleartext (`InRelease`), detached text (`Release.gpg`), and detached binary
//! (`repomd.xml.asc`).

use std::io::Cursor;

use chrono::SubsecRound;
use debian_packaging::signing_key::fingerprint_string;
use pgp::crypto::HashAlgorithm;
use pgp::packet::{Packet, SignatureConfig, SignatureType, Subpacket};
use pgp::ser::Serialize as PgpSerialize;
use pgp::types::{KeyTrait, KeyVersion, SecretKeyTrait};
use pgp::{Deserializable, SignedPublicKey, SignedSecretKey};
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// An armored private key, decrypted on each signing call with the configured passphrase.
pub struct SigningKey {
    secret_key: SignedSecretKey,
}

impl SigningKey {
    /// Parse an armored private key block.
    pub fn from_armored(armored: &str) -> Result<Self> {
        let (secret_key, _) = SignedSecretKey::from_string(armored)
            .map_err(|e| Error::SigningFailure(format!("bad private key: {e}")))?;
        Ok(Self { secret_key })
    }

    /// This key's fingerprint, uppercase hex in ten 4-character groups.
    pub fn fingerprint(&self) -> String {
        fingerprint_string(&self.secret_key)
    }

    /// Produce `InRelease`: cleartext-signed framing around `text`.
    pub fn cleartext_sign(&self, passphrase: &str, text: &str) -> Result<String> {
        let passphrase = passphrase.to_string();
        pgp_cleartext::cleartext_sign(
            &self.secret_key,
            move || passphrase,
            HashAlgorithm::SHA2_256,
            Cursor::new(text.as_bytes()),
        )
        .map_err(|e| Error::SigningFailure(format!("cleartext sign: {e}")))
    }

    /// Produce `Release.gpg`: a detached, armored, canonical-text-class (sigclass 0x01)
    /// signature over `text`.
    pub fn detached_text_sign(&self, passphrase: &str, text: &str) -> Result<String> {
        self.detached_sign_armored(passphrase, text.as_bytes(), SignatureType::Text)
    }

    /// Produce `repomd.xml.asc`: a detached, unarmored, binary-class (sigclass 0x00) signature
    /// over the raw bytes of `data`. RPM/DNF require binary-class signatures for this file.
    pub fn detached_binary_sign(&self, passphrase: &str, data: &[u8]) -> Result<Vec<u8>> {
        let signature = self.sign_packet(passphrase, data, SignatureType::Binary)?;
        let packet = Packet::Signature(signature);

        let mut buf = Vec::new();
        packet
            .to_writer(&mut buf)
            .map_err(|e| Error::SigningFailure(format!("serialize binary signature: {e}")))?;
        Ok(buf)
    }

    fn detached_sign_armored(
        &self,
        passphrase: &str,
        data: &[u8],
        sig_type: SignatureType,
    ) -> Result<String> {
        let signature = self.sign_packet(passphrase, data, sig_type)?;

        let packet = Packet::Signature(signature);
        let mut writer = Cursor::new(Vec::<u8>::new());
        pgp::armor::write(&packet, pgp::armor::BlockType::Signature, &mut writer, None)
            .map_err(|e| Error::SigningFailure(format!("armor detached signature: {e}")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::SigningFailure(format!("armored signature not utf-8: {e}")))
    }

    /// Derive this key's public half, signed the same way [debian_packaging::signing_key]'s
    /// `create_self_signed_key` test helper signs a freshly generated one. Used when
    /// `GPG_PUBLIC_KEY` is not configured but `GPG_PRIVATE_KEY` is -- `public.key` still needs
    /// something to serve.
    pub fn derive_public_key(&self, passphrase: &str) -> Result<VerifyingKey> {
        let passphrase = passphrase.to_string();
        let public_key = self
            .secret_key
            .public_key()
            .sign(&self.secret_key, move || passphrase)
            .map_err(|e| Error::SigningFailure(format!("derive public key: {e}")))?;
        Ok(VerifyingKey { public_key })
    }

    fn sign_packet(
        &self,
        passphrase: &str,
        data: &[u8],
        sig_type: SignatureType,
    ) -> Result<pgp::Signature> {
        let hashed_subpackets = vec![
            Subpacket::IssuerFingerprint(
                KeyVersion::V4,
                SmallVec::from_slice(&self.secret_key.fingerprint()),
            ),
            Subpacket::SignatureCreationTime(chrono::Utc::now().trunc_subsecs(0)),
        ];
        let unhashed_subpackets = vec![Subpacket::Issuer(self.secret_key.key_id())];

        let config = SignatureConfig::new_v4(
            Default::default(),
            sig_type,
            self.secret_key.algorithm(),
            HashAlgorithm::SHA2_256,
            hashed_subpackets,
            unhashed_subpackets,
        );

        let passphrase = passphrase.to_string();
        config
            .sign(&self.secret_key, move || passphrase, Cursor::new(data))
            .map_err(|e| Error::SigningFailure(format!("sign: {e}")))
    }
}

/// An armored public key, served at `public.key` and used to short-circuit key derivation when
/// only verification-side material is configured.
pub struct VerifyingKey {
    public_key: SignedPublicKey,
}

impl VerifyingKey {
    pub fn from_armored(armored: &str) -> Result<Self> {
        let (public_key, _) = SignedPublicKey::from_string(armored)
            .map_err(|e| Error::SigningFailure(format!("bad public key: {e}")))?;
        Ok(Self { public_key })
    }

    pub fn fingerprint(&self) -> String {
        fingerprint_string(&self.public_key)
    }

    pub fn armored(&self) -> Result<String> {
        self.public_key
            .to_armored_string(None)
            .map_err(|e| Error::SigningFailure(format!("armor public key: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use debian_packaging::signing_key::{create_self_signed_key, signing_secret_key_params_builder};

    fn test_key() -> (SigningKey, VerifyingKey) {
        let builder = signing_secret_key_params_builder("Gateway Test <test@example.com>");
        let params = builder.build().unwrap();
        let (secret, public) = create_self_signed_key(params, || "hunter2".to_string()).unwrap();

        (SigningKey { secret_key: secret }, VerifyingKey { public_key: public })
    }

    #[test]
    fn cleartext_signature_verifies_against_public_key() {
        let (signing, verifying) = test_key();
        let signed = signing.cleartext_sign("hunter2", "Origin: example\n").unwrap();

        assert!(signed.starts_with("-----BEGIN PGP SIGNED MESSAGE-----"));

        let mut reader =
            pgp_cleartext::CleartextSignatureReader::new(Cursor::new(signed.as_bytes()));
        std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
        let signatures = reader.finalize();

        assert_eq!(signatures.verify(&verifying.public_key).unwrap(), 1);
    }

    #[test]
    fn detached_text_signature_round_trips_fingerprint() {
        let (signing, verifying) = test_key();
        assert_eq!(signing.fingerprint(), verifying.fingerprint());

        let armored = signing.detached_text_sign("hunter2", "Origin: example\n").unwrap();
        assert!(armored.starts_with("-----BEGIN PGP SIGNATURE-----"));
    }

    #[test]
    fn detached_binary_signature_is_not_armored() {
        let (signing, _) = test_key();
        let binary = signing.detached_binary_sign("hunter2", b"<repomd/>").unwrap();

        assert!(!binary.starts_with(b"-----BEGIN"));
        assert!(!binary.is_empty());
    }

    #[test]
    fn derived_public_key_fingerprint_matches_secret_key() {
        let (signing, _) = test_key();
        let derived = signing.derive_public_key("hunter2").unwrap();
        assert_eq!(signing.fingerprint(), derived.fingerprint());
    }
}
