// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! OpenPGP verification for repository indices.

`InRelease` documents are PGP-clearsigned. [verify_clearsigned] checks the
signature against a binary keyring file (the `trusted.gpg.d` format) and
returns the signed plaintext for parsing.
*/

use {
    crate::error::{DebError, Result},
    sequoia_openpgp::{
        cert::CertParser,
        parse::{
            stream::{MessageLayer, MessageStructure, VerificationHelper, VerifierBuilder},
            Parse,
        },
        policy::StandardPolicy,
        Cert, KeyHandle,
    },
    std::{io::Read, path::Path},
};

struct KeyringHelper {
    certs: Vec<Cert>,
}

impl VerificationHelper for &mut KeyringHelper {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> sequoia_openpgp::Result<Vec<Cert>> {
        Ok(self.certs.clone())
    }

    fn check(&mut self, structure: MessageStructure) -> sequoia_openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                if results.iter().any(|result| result.is_ok()) {
                    return Ok(());
                }
            }
        }

        Err(anyhow::anyhow!(
            "no valid signature from the configured keyring"
        ))
    }
}

/// Verify a clearsigned document against a binary keyring file.
///
/// Returns the signed plaintext. Any failure (unreadable keyring, a
/// document that is not clearsigned, no signature matching a keyring
/// certificate) is an integrity error.
pub fn verify_clearsigned(message: &[u8], keyring: &Path) -> Result<Vec<u8>> {
    let certs = CertParser::from_file(keyring)
        .map_err(|e| keyring_error(keyring, e))?
        .collect::<sequoia_openpgp::Result<Vec<_>>>()
        .map_err(|e| keyring_error(keyring, e))?;

    let policy = StandardPolicy::new();
    let mut helper = KeyringHelper { certs };

    let mut verifier = VerifierBuilder::from_bytes(message)
        .map_err(|e| verification_error(keyring, e))?
        .with_policy(&policy, None, &mut helper)
        .map_err(|e| verification_error(keyring, e))?;

    let mut plaintext = Vec::new();
    verifier
        .read_to_end(&mut plaintext)
        .map_err(|e| DebError::SignatureVerification {
            path: keyring.display().to_string(),
            reason: e.to_string(),
        })?;

    Ok(plaintext)
}

fn keyring_error(keyring: &Path, error: anyhow::Error) -> DebError {
    DebError::SignatureVerification {
        path: keyring.display().to_string(),
        reason: format!("unable to load keyring: {}", error),
    }
}

fn verification_error(keyring: &Path, error: anyhow::Error) -> DebError {
    DebError::SignatureVerification {
        path: keyring.display().to_string(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        sequoia_openpgp::{
            cert::CertBuilder,
            serialize::{
                stream::{Message, Signer},
                Serialize,
            },
        },
        std::io::Write,
    };

    const PLAINTEXT: &str = "Origin: Debian\nCodename: buster\n";

    fn signing_cert() -> Cert {
        CertBuilder::new()
            .add_userid("archive@example.org")
            .add_signing_subkey()
            .generate()
            .unwrap()
            .0
    }

    fn clearsign(cert: &Cert, text: &str) -> Vec<u8> {
        let policy = StandardPolicy::new();
        let keypair = cert
            .keys()
            .with_policy(&policy, None)
            .secret()
            .for_signing()
            .next()
            .expect("generated certificate has a signing subkey")
            .key()
            .clone()
            .into_keypair()
            .unwrap();

        let mut sink = Vec::new();
        let message = Message::new(&mut sink);
        let mut signer = Signer::new(message, keypair).cleartext().build().unwrap();
        signer.write_all(text.as_bytes()).unwrap();
        signer.finalize().unwrap();

        sink
    }

    fn write_keyring(dir: &Path, cert: &Cert) -> std::path::PathBuf {
        let path = dir.join("archive.gpg");
        let mut file = std::fs::File::create(&path).unwrap();
        cert.serialize(&mut file).unwrap();

        path
    }

    #[test]
    fn valid_signature_yields_plaintext() {
        let tmp = tempfile::tempdir().unwrap();
        let cert = signing_cert();
        let keyring = write_keyring(tmp.path(), &cert);
        let signed = clearsign(&cert, PLAINTEXT);

        let plaintext = verify_clearsigned(&signed, &keyring).unwrap();
        let text = String::from_utf8(plaintext).unwrap().replace("\r\n", "\n");
        assert_eq!(text, PLAINTEXT);
    }

    #[test]
    fn signature_from_unknown_key_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let signing = signing_cert();
        let trusted = signing_cert();
        let keyring = write_keyring(tmp.path(), &trusted);
        let signed = clearsign(&signing, PLAINTEXT);

        assert!(matches!(
            verify_clearsigned(&signed, &keyring),
            Err(DebError::SignatureVerification { .. })
        ));
    }

    #[test]
    fn unsigned_document_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let cert = signing_cert();
        let keyring = write_keyring(tmp.path(), &cert);

        assert!(verify_clearsigned(PLAINTEXT.as_bytes(), &keyring).is_err());
    }

    #[test]
    fn missing_keyring_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let cert = signing_cert();
        let signed = clearsign(&cert, PLAINTEXT);

        assert!(verify_clearsigned(&signed, &tmp.path().join("nope.gpg")).is_err());
    }
}
