//! Serial numbers and validity windows shared by root and leaf issuance

use chrono::{DateTime, Duration, Months, Utc};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::BigNum;
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::rand::rand_bytes;

/// Low 48 bits of a random 64-bit draw; the top 16 bits stay clear
const SERIAL_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Days of back-dating applied to every `notBefore` to absorb clock skew
pub const CLOCK_SKEW_DAYS: i64 = 1;

/// Draw a random 48-bit serial number
///
/// Browsers cache certificates by issuer and serial, so every issuance gets a
/// fresh value. The reserved high bits keep the DER integer non-negative.
pub fn random_serial() -> Result<Asn1Integer, ErrorStack> {
    let mut raw = [0u8; 8];
    rand_bytes(&mut raw)?;
    let value = u64::from_be_bytes(raw) & SERIAL_MASK;
    BigNum::from_slice(&value.to_be_bytes())?.to_asn1_integer()
}

/// Validity window `[now - 1 day, now + 100 years]` for the root
pub fn root_validity(now: DateTime<Utc>) -> Result<(Asn1Time, Asn1Time), ErrorStack> {
    let not_after = now
        .checked_add_months(Months::new(100 * 12))
        .unwrap_or_else(|| now + Duration::days(36_525));
    window(now - Duration::days(CLOCK_SKEW_DAYS), not_after)
}

/// Validity window `[now - 1 day, now + 1 day]` for leaves
pub fn leaf_validity(now: DateTime<Utc>) -> Result<(Asn1Time, Asn1Time), ErrorStack> {
    window(now - Duration::days(CLOCK_SKEW_DAYS), now + Duration::days(1))
}

fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(Asn1Time, Asn1Time), ErrorStack> {
    Ok((
        Asn1Time::from_unix(from.timestamp() as _)?,
        Asn1Time::from_unix(to.timestamp() as _)?,
    ))
}

/// Signature digest for issued certificates
///
/// SHA-512 on 64-bit targets, SHA-256 elsewhere.
pub fn signature_digest() -> MessageDigest {
    if cfg!(target_pointer_width = "64") {
        MessageDigest::sha512()
    } else {
        MessageDigest::sha256()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_serials_are_48_bit_and_non_negative() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let serial = random_serial().unwrap();
            let bn = serial.to_bn().unwrap();
            assert!(!bn.is_negative());
            assert!(bn.num_bits() <= 48);
            seen.insert(bn.to_vec());
        }
        assert!(seen.len() > 60, "serials should practically never repeat");
    }

    #[test]
    fn test_leaf_window_contains_now() {
        let now = Utc::now();
        let (from, to) = leaf_validity(now).unwrap();
        let current = Asn1Time::days_from_now(0).unwrap();
        assert_eq!(from.compare(&current).unwrap(), std::cmp::Ordering::Less);
        assert_eq!(to.compare(&current).unwrap(), std::cmp::Ordering::Greater);
        assert_eq!(from.diff(&to).unwrap().days, 2);
    }

    #[test]
    fn test_root_window_spans_a_century() {
        let (from, to) = root_validity(Utc::now()).unwrap();
        let diff = from.diff(&to).unwrap();
        assert!(diff.days >= 365 * 100);
    }
}
