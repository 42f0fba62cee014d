use std::fmt::Display;

use crate::feature::{window_spans, FeatureType, Features};
use crate::hash::HashMethod;

/// The requested token window cannot produce features.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct InvalidWindowSize(&'static str);

impl Display for InvalidWindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid window size: {}", self.0)
    }
}

impl std::error::Error for InvalidWindowSize {}

type FingerprintFn = Box<dyn Fn(&str) -> u64 + Send + Sync>;

fn make_fingerprinter(
    method: HashMethod,
    features: FeatureType,
    window: usize,
) -> Result<FingerprintFn, InvalidWindowSize> {
    if window == 0 {
        return Err(InvalidWindowSize("window size must be greater than 0"));
    }
    Ok(match features {
        FeatureType::Bytes => Box::new(move |s: &str| {
            let bytes = s.as_bytes();
            if bytes.len() <= window {
                return simhash(std::iter::once(method.hash_bytes(bytes)));
            }
            simhash(bytes.windows(window).map(|w| method.hash_bytes(w)))
        }),
        FeatureType::Chars => Box::new(move |s: &str| {
            let bytes = s.as_bytes();
            let bounds = s.char_bounds();
            simhash(
                window_spans(&bounds, window)
                    .into_iter()
                    .map(|(start, end)| method.hash_bytes(&bytes[start..end])),
            )
        }),
        FeatureType::Words => Box::new(move |s: &str| {
            let bytes = s.as_bytes();
            let spans = s.word_spans();
            if spans.len() <= window {
                // too few words for a full window; hash what we have, or the
                // raw text when segmentation found no words at all
                if spans.is_empty() {
                    return simhash(std::iter::once(method.hash_bytes(bytes)));
                }
                let parts = spans.iter().map(|&(start, end)| &bytes[start..end]);
                return simhash(std::iter::once(method.hash_parts(parts)));
            }
            simhash(spans.windows(window).map(|w| {
                method.hash_parts(w.iter().map(|&(start, end)| &bytes[start..end]))
            }))
        }),
    })
}

/// Fold token hashes into one fingerprint by per-bit vote: a token with the
/// bit set votes up, any other token votes down; the bit survives iff the
/// tally is positive.
pub fn simhash(hashes: impl Iterator<Item = u64>) -> u64 {
    let mut votes = [0i32; 64];
    for hash in hashes {
        for (i, vote) in votes.iter_mut().enumerate() {
            if hash >> i & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }
    votes
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &v)| acc | (u64::from(v > 0) << i))
}

/// Reduces a text to a 64-bit SimHash: texts sharing most of their token
/// windows land within a few bits of each other.
pub struct SimHasher {
    hash_method: HashMethod,
    feature_type: FeatureType,
    window_size: usize,
    fingerprinter: FingerprintFn,
}

impl SimHasher {
    pub fn new(
        hash_method: HashMethod,
        features: FeatureType,
        window_size: usize,
    ) -> Result<Self, InvalidWindowSize> {
        let fingerprinter = make_fingerprinter(hash_method, features, window_size)?;
        Ok(Self {
            hash_method,
            feature_type: features,
            window_size,
            fingerprinter,
        })
    }

    pub fn fingerprint<T: AsRef<str>>(&self, text: T) -> u64 {
        (self.fingerprinter)(text.as_ref())
    }

    pub fn hash_method(&self) -> HashMethod {
        self.hash_method
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

impl Default for SimHasher {
    fn default() -> Self {
        SimHasher::new(HashMethod::XXHash, FeatureType::Bytes, 3).unwrap()
    }
}

impl Clone for SimHasher {
    fn clone(&self) -> Self {
        SimHasher::new(self.hash_method, self.feature_type, self.window_size).unwrap()
    }
}
