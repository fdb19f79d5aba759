use std::hash::Hasher;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use siphasher::sip::SipHasher24;

/// Process-global SipHash keys. Set exactly once at startup, read-only after.
static FINGERPRINT_KEYS: OnceLock<FingerprintKeys> = OnceLock::new();

/// The two 64-bit SipHash-2-4 keys used for visitor fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintKeys {
    pub key0: u64,
    pub key1: u64,
}

/// Set the process-wide fingerprint keys.
///
/// Must be called once at startup, before the first fingerprint is computed.
/// Subsequent calls are ignored — the keys are immutable configuration, and
/// changing them mid-flight would split every active visitor.
pub fn set_fingerprint_keys(key0: u64, key1: u64) {
    let _ = FINGERPRINT_KEYS.set(FingerprintKeys { key0, key1 });
}

/// The keys set via [`set_fingerprint_keys`], or `None` before initialization.
pub fn fingerprint_keys() -> Option<FingerprintKeys> {
    FINGERPRINT_KEYS.get().copied()
}

/// Compute the visitor id for a request.
///
/// SipHash-2-4 over `salt || user_agent || ip || YYYYMMDD` keyed with the
/// process-global key pair. The UTC date suffix rotates every visitor id at
/// day rollover, which bounds how long a visitor can be followed without
/// storing any persistent identifier.
pub fn fingerprint(
    keys: FingerprintKeys,
    salt: &str,
    user_agent: &str,
    ip: &str,
    now: DateTime<Utc>,
) -> u64 {
    let mut hasher = SipHasher24::new_with_keys(keys.key0, keys.key1);
    hasher.write(salt.as_bytes());
    hasher.write(user_agent.as_bytes());
    hasher.write(ip.as_bytes());
    hasher.write(now.format("%Y%m%d").to_string().as_bytes());
    hasher.finish()
}
