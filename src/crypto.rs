/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use ring::digest;

pub struct CryptoEngine;

impl CryptoEngine {
    pub fn compute_sha256(data: &[u8]) -> String {
        hex::encode(digest::digest(&digest::SHA256, data).as_ref())
    }

    /// Digest over archive members: payloads concatenated in ordinal path
    /// order, no delimiters, lowercase hex SHA-256.
    ///
    /// The caller is responsible for leaving the manifest member out.
    pub fn content_digest<'a, I>(members: I) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut sorted: Vec<(&str, &[u8])> = members.into_iter().collect();
        // str ordering is byte-lexicographic, not locale-aware
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut ctx = digest::Context::new(&digest::SHA256);
        let mut total = 0usize;
        for (path, data) in &sorted {
            log::trace!("digest <- {} ({} bytes)", path, data.len());
            ctx.update(data);
            total += data.len();
        }
        log::debug!(
            "Content digest over {} members, {} bytes",
            sorted.len(),
            total
        );
        hex::encode(ctx.finish().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            CryptoEngine::compute_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_sorts_by_path_before_concatenating() {
        let members = [
            ("d.txt", b"z".as_slice()),
            ("a.txt", b"x".as_slice()),
            ("b/c.txt", b"y".as_slice()),
        ];
        assert_eq!(
            CryptoEngine::content_digest(members),
            CryptoEngine::compute_sha256(b"xyz")
        );
    }

    #[test]
    fn digest_uses_ordinal_not_locale_order() {
        // Uppercase sorts before lowercase in byte order.
        let members = [("b.txt", b"2".as_slice()), ("B.txt", b"1".as_slice())];
        assert_eq!(
            CryptoEngine::content_digest(members),
            CryptoEngine::compute_sha256(b"12")
        );
    }

    #[test]
    fn digest_of_no_members_is_empty_hash() {
        let none: [(&str, &[u8]); 0] = [];
        assert_eq!(
            CryptoEngine::content_digest(none),
            CryptoEngine::compute_sha256(b"")
        );
    }

    proptest! {
        #[test]
        fn digest_is_permutation_invariant(
            files in proptest::collection::btree_map(
                "[a-zA-Z0-9/_.]{1,12}",
                proptest::collection::vec(any::<u8>(), 0..64),
                1..8,
            ),
            seed in any::<u64>(),
        ) {
            let forward: Vec<(&str, &[u8])> =
                files.iter().map(|(p, d)| (p.as_str(), d.as_slice())).collect();
            let mut shuffled = forward.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            let a = CryptoEngine::content_digest(forward.clone());
            let b = CryptoEngine::content_digest(shuffled);
            let c = CryptoEngine::content_digest(forward);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a, c);
        }
    }
}
