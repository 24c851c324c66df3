//! Exponential ElGamal: `pad = g^nonce`, `data = g^m * K^nonce`.
//!
//! Multiplying two ciphertexts componentwise adds their plaintexts, which is
//! what makes homomorphic tallying work. Decryption recovers `g^m` and then
//! looks the exponent up in a precomputed [`DiscreteLogTable`]; plaintexts
//! are vote counts, so the domain is small and known.

use num_bigint::BigUint;
use rand::{CryptoRng, Rng};
use std::collections::HashMap;

use crate::hash_elems;
use crate::{ElectionConstants, ElementModP, ElementModQ, Error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElGamalKeyPair {
    pub secret_key: ElementModQ,
    pub public_key: ElementModP,
}

impl ElGamalKeyPair {
    /// Derive the keypair from a known secret. Secrets below 2 are rejected.
    pub fn from_secret(constants: &ElectionConstants, secret_key: ElementModQ) -> Result<Self, Error> {
        if secret_key.as_uint() < &BigUint::from(2u8) {
            return Err(Error::OutOfRange {
                domain: "secret key",
                value: secret_key.to_hex(),
            });
        }
        let public_key = constants.g_pow_p(&secret_key);
        Ok(ElGamalKeyPair {
            secret_key,
            public_key,
        })
    }

    pub fn random<R: Rng + CryptoRng>(constants: &ElectionConstants, rng: &mut R) -> Self {
        let secret_key = constants.rand_q(rng);
        let public_key = constants.g_pow_p(&secret_key);
        ElGamalKeyPair {
            secret_key,
            public_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElGamalCiphertext {
    pub pad: ElementModP,
    pub data: ElementModP,
}

impl ElGamalCiphertext {
    /// The neutral accumulator: combining with it leaves the other operand
    /// unchanged, and it decrypts to zero.
    pub fn one() -> Self {
        ElGamalCiphertext {
            pad: ElementModP::one(),
            data: ElementModP::one(),
        }
    }

    /// Homomorphic combination: decrypts to the sum of the two plaintexts.
    pub fn combine(&self, constants: &ElectionConstants, other: &ElGamalCiphertext) -> Self {
        ElGamalCiphertext {
            pad: constants.mult_p(&self.pad, &other.pad),
            data: constants.mult_p(&self.data, &other.data),
        }
    }

    pub fn crypto_hash(&self, constants: &ElectionConstants) -> ElementModQ {
        hash_elems!(constants; self.pad, self.data)
    }

    /// This guardian's contribution `pad^secret` to a cooperative decryption.
    pub fn partial_decrypt(
        &self,
        constants: &ElectionConstants,
        secret_key: &ElementModQ,
    ) -> ElementModP {
        constants.pow_p(&self.pad, secret_key)
    }

    /// Full decryption with the (joint) secret key.
    pub fn decrypt(
        &self,
        constants: &ElectionConstants,
        secret_key: &ElementModQ,
        table: &DiscreteLogTable,
    ) -> Result<u64, Error> {
        let blind = self.partial_decrypt(constants, secret_key);
        self.decrypt_known_product(constants, &blind, table)
    }

    /// Decryption by the party that knows the encryption nonce (the voter
    /// audit path for spoiled ballots).
    pub fn decrypt_with_nonce(
        &self,
        constants: &ElectionConstants,
        public_key: &ElementModP,
        nonce: &ElementModQ,
        table: &DiscreteLogTable,
    ) -> Result<u64, Error> {
        let blind = constants.pow_p(public_key, nonce);
        self.decrypt_known_product(constants, &blind, table)
    }

    /// Decryption given the already-combined product of decryption shares.
    pub fn decrypt_known_product(
        &self,
        constants: &ElectionConstants,
        product: &ElementModP,
        table: &DiscreteLogTable,
    ) -> Result<u64, Error> {
        let value = constants.div_p(&self.data, product)?;
        table.lookup(&value).ok_or(Error::DecryptionFailed { max: table.max() })
    }
}

/// Encrypt a small non-negative integer. A zero nonce would leak the
/// plaintext (`pad = 1`), so it is rejected.
pub fn elgamal_encrypt(
    constants: &ElectionConstants,
    message: u64,
    nonce: &ElementModQ,
    public_key: &ElementModP,
) -> Result<ElGamalCiphertext, Error> {
    if nonce.is_zero() {
        return Err(Error::OutOfRange {
            domain: "encryption nonce",
            value: "0".to_string(),
        });
    }
    let exponent = constants.reduce_to_q(BigUint::from(message));
    let pad = constants.g_pow_p(nonce);
    let data = constants.mult_p(&constants.g_pow_p(&exponent), &constants.pow_p(public_key, nonce));
    Ok(ElGamalCiphertext { pad, data })
}

/// Homomorphically add any number of ciphertexts.
pub fn elgamal_add<'a>(
    constants: &ElectionConstants,
    ciphertexts: impl IntoIterator<Item = &'a ElGamalCiphertext>,
) -> ElGamalCiphertext {
    ciphertexts
        .into_iter()
        .fold(ElGamalCiphertext::one(), |acc, ct| acc.combine(constants, ct))
}

/// The joint public key: the product of every guardian's public key,
/// equal to `g^(sum of secrets)`.
pub fn combine_public_keys<'a>(
    constants: &ElectionConstants,
    keys: impl IntoIterator<Item = &'a ElementModP>,
) -> ElementModP {
    constants.mult_many_p(keys)
}

/// Injective map `g^m -> m` for `m` in `0..=max`, built once per plaintext
/// domain size and shared across every slot with that bound.
#[derive(Debug, Clone)]
pub struct DiscreteLogTable {
    table: HashMap<BigUint, u64>,
    max: u64,
}

impl DiscreteLogTable {
    pub fn new(constants: &ElectionConstants, max: u64) -> Self {
        let mut table = HashMap::with_capacity(max as usize + 1);
        let mut current = BigUint::from(1u8);
        for exponent in 0..=max {
            table.insert(current.clone(), exponent);
            current = current * &constants.generator % &constants.large_prime;
        }
        DiscreteLogTable { table, max }
    }

    pub fn lookup(&self, value: &ElementModP) -> Option<u64> {
        self.table.get(value.as_uint()).copied()
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ElectionConstants, ElGamalKeyPair, DiscreteLogTable) {
        let constants = ElectionConstants::standard();
        let mut rng = rand::thread_rng();
        let keypair = ElGamalKeyPair::random(&constants, &mut rng);
        let table = DiscreteLogTable::new(&constants, 16);
        (constants, keypair, table)
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let (c, keypair, table) = setup();
        let mut rng = rand::thread_rng();
        for message in &[0u64, 1, 2, 5, 16] {
            let nonce = c.rand_q(&mut rng);
            let ct = elgamal_encrypt(&c, *message, &nonce, &keypair.public_key).unwrap();
            assert_eq!(ct.decrypt(&c, &keypair.secret_key, &table).unwrap(), *message);
            assert_eq!(
                ct.decrypt_with_nonce(&c, &keypair.public_key, &nonce, &table)
                    .unwrap(),
                *message
            );
        }
    }

    #[test]
    fn zero_nonce_rejected() {
        let (c, keypair, _) = setup();
        assert!(elgamal_encrypt(&c, 1, &ElementModQ::zero(), &keypair.public_key).is_err());
    }

    #[test]
    fn homomorphic_addition() {
        let (c, keypair, table) = setup();
        let mut rng = rand::thread_rng();
        let cts: Vec<ElGamalCiphertext> = [1u64, 0, 3, 2]
            .iter()
            .map(|m| {
                let nonce = c.rand_q(&mut rng);
                elgamal_encrypt(&c, *m, &nonce, &keypair.public_key).unwrap()
            })
            .collect();
        let sum = elgamal_add(&c, &cts);
        assert_eq!(sum.decrypt(&c, &keypair.secret_key, &table).unwrap(), 6);
    }

    #[test]
    fn decryption_fails_outside_table_domain() {
        let (c, keypair, _) = setup();
        let mut rng = rand::thread_rng();
        let small_table = DiscreteLogTable::new(&c, 4);
        let nonce = c.rand_q(&mut rng);
        let ct = elgamal_encrypt(&c, 9, &nonce, &keypair.public_key).unwrap();
        match ct.decrypt(&c, &keypair.secret_key, &small_table) {
            Err(Error::DecryptionFailed { max: 4 }) => {}
            other => panic!("expected DecryptionFailed, got {:?}", other),
        }
    }

    #[test]
    fn joint_key_decrypts_with_summed_secrets() {
        let (c, _, table) = setup();
        let mut rng = rand::thread_rng();
        let pairs: Vec<ElGamalKeyPair> = (0..3)
            .map(|_| ElGamalKeyPair::random(&c, &mut rng))
            .collect();
        let joint = combine_public_keys(&c, pairs.iter().map(|p| &p.public_key));
        let joint_secret = c.sum_q(pairs.iter().map(|p| &p.secret_key));
        let nonce = c.rand_q(&mut rng);
        let ct = elgamal_encrypt(&c, 7, &nonce, &joint).unwrap();
        assert_eq!(ct.decrypt(&c, &joint_secret, &table).unwrap(), 7);
    }
}
