//! Near-duplicate page oracle
//!
//! Rendered pages are reduced to a 64-bit simhash-style fingerprint;
//! pages within a small hamming distance of one another are considered the
//! same template and their discovered children are suppressed. The crawler
//! treats this purely as a similarity oracle.

use sha2::{Digest, Sha256};

/// Hamming-distance budget under which two pages count as near-duplicates.
const SIMILARITY_THRESHOLD: u32 = 6;

/// Computes the similarity fingerprint of rendered page content.
///
/// Token-level simhash: each alphanumeric token votes its hashed bits
/// into a 64-wide tally, the sign of each tally becomes one output bit.
pub fn fingerprint(content: &str) -> u64 {
    let mut tally = [0i32; 64];

    for token in content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let digest = Sha256::digest(token.as_bytes());
        let hash = u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
        for (bit, slot) in tally.iter_mut().enumerate() {
            if hash >> bit & 1 == 1 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }

    tally
        .iter()
        .enumerate()
        .fold(0u64, |acc, (bit, slot)| acc | ((*slot > 0) as u64) << bit)
}

fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Tracks fingerprints of pages already seen in this crawl.
#[derive(Debug, Default)]
pub struct FingerprintBucket {
    seen: Vec<u64>,
}

impl FingerprintBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `candidate` is a near-duplicate of a page already
    /// in the bucket; otherwise records it.
    pub fn is_duplicate(&mut self, candidate: u64) -> bool {
        if self
            .seen
            .iter()
            .any(|&fp| hamming(fp, candidate) <= SIMILARITY_THRESHOLD)
        {
            return true;
        }
        self.seen.push(candidate);
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let html = "<html><body><h1>Products</h1><ul><li>alpha</li></ul></body></html>";
        assert_eq!(fingerprint(html), fingerprint(html));
    }

    #[test]
    fn test_similar_pages_collide() {
        // same template, one differing list entry
        let a = "<html><body><h1>Products</h1><ul><li>widget one</li><li>widget two</li>\
                 <li>widget three</li><li>widget four</li></ul><footer>contact about legal\
                 </footer></body></html>";
        let b = "<html><body><h1>Products</h1><ul><li>widget one</li><li>widget two</li>\
                 <li>widget three</li><li>widget five</li></ul><footer>contact about legal\
                 </footer></body></html>";
        assert!(hamming(fingerprint(a), fingerprint(b)) <= SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_unrelated_pages_do_not_collide() {
        let a = "<html><body>login password username submit forgotten reset</body></html>";
        let b = "<html><head><title>404</title></head><body>the page you requested does \
                 not exist on this server anymore sorry</body></html>";
        assert!(hamming(fingerprint(a), fingerprint(b)) > SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_bucket_flags_second_sighting() {
        let mut bucket = FingerprintBucket::new();
        let fp = fingerprint("<html><body>some page body text here</body></html>");

        assert!(!bucket.is_duplicate(fp));
        assert!(bucket.is_duplicate(fp));
        assert_eq!(bucket.len(), 1);
    }
}
