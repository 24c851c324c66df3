//! Domain-separated hashing into the mod-Q domain.
//!
//! Every challenge and every derived nonce in the protocol is the SHA-256
//! hash of an ordered sequence of public values, each rendered canonically
//! (group elements as uppercase hex, integers as decimal, absent values as
//! `"null"`, nested sequences by their own hash), with a `|` separator
//! framing every item. The digest is reduced mod Q.

use digest::Digest;
use num_bigint::BigUint;
use sha2::Sha256;

use crate::group::to_hex_uint;
use crate::{ElectionConstants, ElementModP, ElementModQ};

/// One item of a hash sequence, already rendered for framing.
#[derive(Debug, Clone)]
pub enum HashInput {
    Text(String),
    Sequence(Vec<HashInput>),
}

/// Anything that can appear in a hash sequence.
pub trait CryptoHashable {
    fn hash_input(&self) -> HashInput;
}

impl CryptoHashable for HashInput {
    fn hash_input(&self) -> HashInput {
        self.clone()
    }
}

impl<T: CryptoHashable + ?Sized> CryptoHashable for &T {
    fn hash_input(&self) -> HashInput {
        (**self).hash_input()
    }
}

impl CryptoHashable for str {
    fn hash_input(&self) -> HashInput {
        HashInput::Text(self.to_string())
    }
}

impl CryptoHashable for String {
    fn hash_input(&self) -> HashInput {
        HashInput::Text(self.clone())
    }
}

impl CryptoHashable for u32 {
    fn hash_input(&self) -> HashInput {
        HashInput::Text(self.to_string())
    }
}

impl CryptoHashable for u64 {
    fn hash_input(&self) -> HashInput {
        HashInput::Text(self.to_string())
    }
}

impl CryptoHashable for BigUint {
    fn hash_input(&self) -> HashInput {
        HashInput::Text(to_hex_uint(self))
    }
}

impl CryptoHashable for ElementModP {
    fn hash_input(&self) -> HashInput {
        HashInput::Text(self.to_hex())
    }
}

impl CryptoHashable for ElementModQ {
    fn hash_input(&self) -> HashInput {
        HashInput::Text(self.to_hex())
    }
}

impl<T: CryptoHashable> CryptoHashable for Option<T> {
    fn hash_input(&self) -> HashInput {
        match self {
            Some(inner) => inner.hash_input(),
            None => HashInput::Text("null".to_string()),
        }
    }
}

impl<T: CryptoHashable> CryptoHashable for [T] {
    fn hash_input(&self) -> HashInput {
        HashInput::Sequence(self.iter().map(|item| item.hash_input()).collect())
    }
}

impl<T: CryptoHashable> CryptoHashable for Vec<T> {
    fn hash_input(&self) -> HashInput {
        self.as_slice().hash_input()
    }
}

/// Hash an ordered sequence of items into an `ElementModQ`.
pub fn hash_elems(constants: &ElectionConstants, items: &[HashInput]) -> ElementModQ {
    let mut hasher = Sha256::new();
    hasher.update(b"|");
    for item in items {
        hasher.update(render(constants, item).as_bytes());
        hasher.update(b"|");
    }
    let digest = hasher.finalize();
    constants.reduce_to_q(BigUint::from_bytes_be(&digest))
}

fn render(constants: &ElectionConstants, item: &HashInput) -> String {
    match item {
        HashInput::Text(text) => text.clone(),
        HashInput::Sequence(items) if items.is_empty() => "null".to_string(),
        HashInput::Sequence(items) => hash_elems(constants, items).to_hex(),
    }
}

/// `hash_elems!(constants; a, b, c)` hashes a heterogeneous sequence.
#[macro_export]
macro_rules! hash_elems {
    ($constants:expr; $($item:expr),+ $(,)?) => {{
        #[allow(unused_imports)]
        use $crate::CryptoHashable as _;
        $crate::hash_elems($constants, &[$( ($item).hash_input() ),+])
    }};
}

/// A deterministic sequence of mod-Q values derived from a seed and a
/// domain-separation header. `get(i)` is independent of every other index,
/// so callers can consume indices sparsely.
#[derive(Debug, Clone)]
pub struct Nonces {
    seed: ElementModQ,
}

impl Nonces {
    pub fn new(
        constants: &ElectionConstants,
        seed: &ElementModQ,
        header: &dyn CryptoHashable,
    ) -> Self {
        Nonces {
            seed: hash_elems(constants, &[seed.hash_input(), header.hash_input()]),
        }
    }

    pub fn get(&self, constants: &ElectionConstants, index: u64) -> ElementModQ {
        hash_elems(constants, &[self.seed.hash_input(), index.hash_input()])
    }
}
