//! Mask domain selection.
//!
//! When the operator does not pick a mask domain, one is chosen from a fixed
//! list of large, always-on TLS sites. The choice is a pure function of the
//! seed; callers supply the randomness.

/// Candidate mask domains.
pub const MASK_DOMAINS: &[&str] = &[
    "www.microsoft.com",
    "www.apple.com",
    "www.amazon.com",
    "www.cloudflare.com",
    "www.mozilla.org",
    "www.samsung.com",
    "www.nvidia.com",
    "www.oracle.com",
];

/// Picks a mask domain for `seed`. The same seed always yields the same domain.
#[must_use]
pub fn pick_mask_domain(seed: u64) -> &'static str {
    // Modulo of a u64 by a small slice length always fits in usize.
    let index = (seed % MASK_DOMAINS.len() as u64) as usize;
    MASK_DOMAINS[index]
}

/// Seed drawn from a random v4 UUID.
#[must_use]
pub fn random_seed() -> u64 {
    let value = uuid::Uuid::new_v4().as_u128();
    (value >> 64) as u64 ^ value as u64
}
