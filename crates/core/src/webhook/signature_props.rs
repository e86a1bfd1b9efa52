//! Property-based tests for WebhookSigner.

use proptest::prelude::*;

use crate::webhook::signature::WebhookSigner;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A signature verifies against the exact bytes it was computed over.
    #[test]
    fn prop_signature_verifies_exact_body(
        secret in "[a-f0-9]{64}",
        body in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let sig = WebhookSigner::sign(&secret, &body).unwrap();
        prop_assert_eq!(sig.len(), 64);
        prop_assert!(WebhookSigner::verify(&secret, &body, &sig));
    }

    /// Flipping any single byte of the body breaks verification.
    #[test]
    fn prop_mutated_body_fails(
        secret in "[a-f0-9]{64}",
        body in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let sig = WebhookSigner::sign(&secret, &body).unwrap();
        let mut tampered = body.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= flip;
        prop_assert!(!WebhookSigner::verify(&secret, &tampered, &sig));
    }
}
