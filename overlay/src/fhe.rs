//! Placeholder homomorphic-encryption shim for the density field.
//!
//! The trait is the seam: routing only ever consumes the decrypt oracle,
//! so a real additively-homomorphic scheme can replace `StubScheme`
//! without touching the scoring code. The stub carries the plaintext in a
//! fixed-size text ciphertext with identical algebra to the real thing.

/// Byte width of a ciphertext, matching the announcement signature slot.
pub const CIPHERTEXT_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext([u8; CIPHERTEXT_SIZE]);

impl Ciphertext {
    fn from_text(text: &str) -> Self {
        let mut raw = [0u8; CIPHERTEXT_SIZE];
        let bytes = text.as_bytes();
        let len = bytes.len().min(CIPHERTEXT_SIZE);
        raw[..len].copy_from_slice(&bytes[..len]);
        Self(raw)
    }

    fn as_text(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(CIPHERTEXT_SIZE);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

pub trait HomomorphicDensity: Send + Sync {
    fn encrypt(&self, plaintext: f64) -> Ciphertext;
    fn decrypt(&self, ciphertext: &Ciphertext) -> f64;
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext;
    fn scale(&self, a: &Ciphertext, scalar: f64) -> Ciphertext;
}

/// Identity-strength stand-in: `ENC(<value>)` text records. Addition and
/// scaling round-trip through the oracle, the same shape a real scheme
/// exposes homomorphically.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubScheme;

impl HomomorphicDensity for StubScheme {
    fn encrypt(&self, plaintext: f64) -> Ciphertext {
        Ciphertext::from_text(&format!("ENC({plaintext:.6})"))
    }

    fn decrypt(&self, ciphertext: &Ciphertext) -> f64 {
        let text = ciphertext.as_text();
        text.strip_prefix("ENC(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|value| value.parse().ok())
            .unwrap_or(0.0)
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
        self.encrypt(self.decrypt(a) + self.decrypt(b))
    }

    fn scale(&self, a: &Ciphertext, scalar: f64) -> Ciphertext {
        self.encrypt(self.decrypt(a) * scalar)
    }
}
