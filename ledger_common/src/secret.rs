use std::{
    fmt,
    fmt::{Debug, Display},
};

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A value that must never be logged. `Debug` and `Display` both render as `****`.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl Secret<String> {
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Compares a presented credential against the secret in constant time. An empty secret never matches anything.
    ///
    /// Both sides are reduced to HMAC-SHA256 tags keyed by the secret, so the comparison always covers 32 bytes
    /// whatever the candidate's length.
    pub fn matches(&self, candidate: &str) -> bool {
        if self.value.is_empty() {
            return false;
        }
        let (Ok(mut expected), Ok(mut presented)) = (self.mac(), self.mac()) else {
            return false;
        };
        expected.update(self.value.as_bytes());
        presented.update(candidate.as_bytes());
        presented.verify_slice(&expected.finalize().into_bytes()).is_ok()
    }

    fn mac(&self) -> Result<HmacSha256, hmac::digest::InvalidLength> {
        HmacSha256::new_from_slice(self.value.as_bytes())
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        let s = Secret::new("hunter2".to_string());
        assert_eq!(format!("{s} {s:?}"), "**** ****");
        assert_eq!(s.reveal(), "hunter2");
    }

    #[test]
    fn matching() {
        let s = Secret::new("cron-secret".to_string());
        assert!(s.matches("cron-secret"));
        assert!(!s.matches("cron-secreT"));
        assert!(!s.matches("cron"));
        assert!(!s.matches("cron-secret-and-then-some"));
        assert!(!s.matches(""));
        assert!(!Secret::<String>::default().matches(""));
    }
}
