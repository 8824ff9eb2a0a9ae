use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use std::fmt;

/// Something that can authorize spending from one address.
pub trait Signer {
    fn address(&self) -> String;
    /// Compressed public key, hex.
    fn public_key(&self) -> String;
    /// Sign a 32-byte message hash; returns hex DER.
    fn sign(&self, msg32: &[u8; 32]) -> String;
}

/// Checks signatures on behalf of the ledger. Concrete cryptography lives
/// behind this seam.
pub trait SignatureVerifier: fmt::Debug + Send + Sync {
    fn verify(&self, public_key: &str, msg32: &[u8; 32], signature: &str) -> bool;
    /// Address controlled by `public_key`, if the key is well formed.
    fn address_of(&self, public_key: &str) -> Option<String>;
}

/// secp256k1 key pair. The address is the hex of the compressed public key.
pub struct Wallet {
    secret: SecretKey,
    public: PublicKey,
}

impl Wallet {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut OsRng);
        Self { secret, public }
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl Signer for Wallet {
    fn address(&self) -> String {
        hex::encode(self.public.serialize())
    }

    fn public_key(&self) -> String {
        hex::encode(self.public.serialize())
    }

    fn sign(&self, msg32: &[u8; 32]) -> String {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_slice(msg32).expect("32-byte digest is a valid message");
        let sig = secp.sign_ecdsa(&msg, &self.secret);
        hex::encode(sig.serialize_der())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, public_key: &str, msg32: &[u8; 32], signature: &str) -> bool {
        verify_signature_hex(public_key, signature, *msg32).unwrap_or(false)
    }

    fn address_of(&self, public_key: &str) -> Option<String> {
        pubkey_to_address_hex(public_key).ok()
    }
}

/// Derive address (hex of compressed pubkey) from a given hex pubkey.
pub fn pubkey_to_address_hex(pubkey_hex: &str) -> Result<String, &'static str> {
    let bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&bytes).map_err(|_| "invalid pubkey bytes")?;
    Ok(hex::encode(pk.serialize()))
}

/// Verify a signature (hex DER) against the given pubkey (hex, compressed) and message hash.
pub fn verify_signature_hex(
    pubkey_hex: &str,
    sig_hex: &str,
    msg32: [u8; 32],
) -> Result<bool, &'static str> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(sig_hex).map_err(|_| "invalid signature hex")?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| "invalid DER signature")?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|_| "invalid pubkey hex")?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| "invalid pubkey bytes")?;

    let msg = Message::from_slice(&msg32).map_err(|_| "invalid message length")?;
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips_through_verifier() {
        let wallet = Wallet::generate();
        let msg = [7u8; 32];
        let sig = wallet.sign(&msg);

        let verifier = Secp256k1Verifier;
        assert!(verifier.verify(&wallet.public_key(), &msg, &sig));
        assert_eq!(
            verifier.address_of(&wallet.public_key()),
            Some(wallet.address())
        );
    }

    #[test]
    fn verifier_rejects_other_message_and_other_key() {
        let alice = Wallet::generate();
        let mallory = Wallet::generate();
        let sig = alice.sign(&[1u8; 32]);

        let verifier = Secp256k1Verifier;
        assert!(!verifier.verify(&alice.public_key(), &[2u8; 32], &sig));
        assert!(!verifier.verify(&mallory.public_key(), &[1u8; 32], &sig));
        assert!(!verifier.verify(&alice.public_key(), &[1u8; 32], "not-hex"));
    }
}
