use burst_types::{PublicKey, Signature, Timestamp};
use proptest::prelude::*;

proptest! {
    /// PublicKey::is_zero is true only for all-zero bytes.
    #[test]
    fn public_key_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let key = PublicKey(bytes);
        prop_assert_eq!(key.is_zero(), bytes == [0u8; 32]);
    }

    /// as_bytes reflects exactly the bytes a PublicKey was built from.
    #[test]
    fn public_key_as_bytes_matches_input(bytes in prop::array::uniform32(0u8..)) {
        let key = PublicKey(bytes);
        prop_assert_eq!(key.as_bytes(), &bytes);
    }

    /// as_bytes reflects exactly the bytes a Signature was built from.
    #[test]
    fn signature_as_bytes_matches_input(
        first_half in prop::array::uniform32(0u8..),
        second_half in prop::array::uniform32(0u8..),
    ) {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&first_half);
        bytes[32..].copy_from_slice(&second_half);
        let sig = Signature(bytes);
        prop_assert_eq!(sig.as_bytes(), &bytes);
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// elapsed_since(now) = now - self when now >= self.
    #[test]
    fn timestamp_elapsed_since(base in 0u64..1_000_000, offset in 0u64..1_000_000) {
        let t = Timestamp::new(base);
        let now = Timestamp::new(base + offset);
        prop_assert_eq!(t.elapsed_since(now), offset);
    }

    /// elapsed_since saturates to 0 when now precedes self.
    #[test]
    fn timestamp_elapsed_since_saturates(
        base in 1u64..1_000_000,
        deficit in 1u64..1_000_000,
    ) {
        let later = Timestamp::new(base + deficit);
        let earlier = Timestamp::new(base);
        prop_assert_eq!(later.elapsed_since(earlier), 0);
    }

    /// has_expired agrees with direct arithmetic against now.
    #[test]
    fn timestamp_has_expired_correct(
        start in 0u64..500_000,
        duration in 1u64..500_000,
        offset in 0u64..1_000_000,
    ) {
        let t = Timestamp::new(start);
        let now = Timestamp::new(start.saturating_add(offset));
        prop_assert_eq!(t.has_expired(duration, now), offset >= duration);
    }
}
