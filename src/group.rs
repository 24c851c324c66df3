//! Modular group arithmetic over the two domains every protocol value lives
//! in: the multiplicative subgroup mod P and the exponent field mod Q.
//!
//! `ElementModP` and `ElementModQ` are always fully reduced. All operations
//! go through an [`ElectionConstants`] so the group is an explicit input
//! rather than ambient state, and so the big-integer backend can be swapped
//! behind this module without touching protocol code.

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, Rng};

use crate::serde_hex::BigUintHex;
use crate::Error;
use hex_buffer_serde::Hex as _;

// 768-bit safe prime from the First Oakley Group (RFC 2409): (P-1)/2 is
// prime and 2 generates the subgroup of order (P-1)/2.
const STANDARD_PRIME_HEX: &[u8] =
    b"ffffffffffffffffc90fdaa22168c234c4c6628b80dc1cd129024e088a67cc74\
      020bbea63b139b22514a08798e3404ddef9519b3cd3a431b302b0a6df25f1437\
      4fe1356d6d51c245e485b576625e7ec6f44c42e9a63a3620ffffffffffffffff";

/// A group element: an integer in `[0, P)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementModP(#[serde(with = "BigUintHex")] BigUint);

/// An exponent/scalar: an integer in `[0, Q)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementModQ(#[serde(with = "BigUintHex")] BigUint);

impl ElementModP {
    /// The multiplicative identity.
    pub fn one() -> Self {
        ElementModP(BigUint::one())
    }

    pub fn to_hex(&self) -> String {
        to_hex_uint(&self.0)
    }

    pub(crate) fn as_uint(&self) -> &BigUint {
        &self.0
    }
}

impl ElementModQ {
    pub fn zero() -> Self {
        ElementModQ(BigUint::zero())
    }

    pub fn to_hex(&self) -> String {
        to_hex_uint(&self.0)
    }

    pub(crate) fn as_uint(&self) -> &BigUint {
        &self.0
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

pub(crate) fn to_hex_uint(value: &BigUint) -> String {
    hex::encode_upper(value.to_bytes_be())
}

/// The group parameters: primes P and Q with `P = Q * R + 1`, and a
/// generator G of the order-Q subgroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionConstants {
    #[serde(with = "BigUintHex")]
    pub large_prime: BigUint,
    #[serde(with = "BigUintHex")]
    pub small_prime: BigUint,
    #[serde(with = "BigUintHex")]
    pub cofactor: BigUint,
    #[serde(with = "BigUintHex")]
    pub generator: BigUint,
}

impl ElectionConstants {
    /// Build a group from caller-supplied parameters, checking the
    /// structural relations (`P = Q * R + 1`, `G^Q = 1 mod P`, `G > 1`).
    /// Primality of P and Q is the caller's responsibility.
    pub fn new(
        large_prime: BigUint,
        small_prime: BigUint,
        cofactor: BigUint,
        generator: BigUint,
    ) -> Result<Self, Error> {
        if &small_prime * &cofactor + BigUint::one() != large_prime {
            return Err(Error::OutOfRange {
                domain: "group cofactor",
                value: cofactor.to_string(),
            });
        }
        if generator <= BigUint::one() || generator >= large_prime {
            return Err(Error::OutOfRange {
                domain: "group generator",
                value: generator.to_string(),
            });
        }
        if !generator.modpow(&small_prime, &large_prime).is_one() {
            return Err(Error::OutOfRange {
                domain: "group generator order",
                value: generator.to_string(),
            });
        }
        Ok(ElectionConstants {
            large_prime,
            small_prime,
            cofactor,
            generator,
        })
    }

    /// The standard group: the 768-bit Oakley safe prime, Q = (P-1)/2,
    /// generator 2.
    pub fn standard() -> Self {
        let large_prime =
            BigUint::parse_bytes(STANDARD_PRIME_HEX, 16).expect("fixed prime parses");
        let small_prime = (&large_prime - 1u8) >> 1;
        ElectionConstants {
            large_prime,
            small_prime,
            cofactor: BigUint::from(2u8),
            generator: BigUint::from(2u8),
        }
    }

    // ---- constructors ----

    pub fn int_to_p(&self, value: BigUint) -> Result<ElementModP, Error> {
        if value >= self.large_prime {
            return Err(Error::OutOfRange {
                domain: "mod-P element",
                value: to_hex_uint(&value),
            });
        }
        Ok(ElementModP(value))
    }

    pub fn int_to_q(&self, value: BigUint) -> Result<ElementModQ, Error> {
        if value >= self.small_prime {
            return Err(Error::OutOfRange {
                domain: "mod-Q element",
                value: to_hex_uint(&value),
            });
        }
        Ok(ElementModQ(value))
    }

    /// Reduce an arbitrary integer into the mod-Q domain.
    pub(crate) fn reduce_to_q(&self, value: BigUint) -> ElementModQ {
        ElementModQ(value % &self.small_prime)
    }

    /// A random scalar in `[2, Q)`, suitable as a secret or nonce.
    pub fn rand_q<R: Rng + CryptoRng>(&self, rng: &mut R) -> ElementModQ {
        loop {
            let value = rng.gen_biguint_below(&self.small_prime);
            if value >= BigUint::from(2u8) {
                return ElementModQ(value);
            }
        }
    }

    // ---- mod-Q arithmetic ----

    pub fn add_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        ElementModQ((&a.0 + &b.0) % &self.small_prime)
    }

    pub fn sub_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        ElementModQ(((&a.0 + &self.small_prime) - &b.0) % &self.small_prime)
    }

    pub fn negate_q(&self, a: &ElementModQ) -> ElementModQ {
        ElementModQ((&self.small_prime - &a.0) % &self.small_prime)
    }

    pub fn mult_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        ElementModQ((&a.0 * &b.0) % &self.small_prime)
    }

    pub fn sum_q<'a>(&self, elems: impl IntoIterator<Item = &'a ElementModQ>) -> ElementModQ {
        elems
            .into_iter()
            .fold(ElementModQ::zero(), |acc, e| self.add_q(&acc, e))
    }

    /// Modular inverse mod Q (Q prime, so `a^(Q-2)`); zero has none.
    pub fn inv_q(&self, a: &ElementModQ) -> Result<ElementModQ, Error> {
        if a.0.is_zero() {
            return Err(Error::OutOfRange {
                domain: "mod-Q inverse",
                value: "0".to_string(),
            });
        }
        let exp = &self.small_prime - 2u8;
        Ok(ElementModQ(a.0.modpow(&exp, &self.small_prime)))
    }

    // ---- mod-P arithmetic ----

    pub fn mult_p(&self, a: &ElementModP, b: &ElementModP) -> ElementModP {
        ElementModP((&a.0 * &b.0) % &self.large_prime)
    }

    pub fn mult_many_p<'a>(
        &self,
        elems: impl IntoIterator<Item = &'a ElementModP>,
    ) -> ElementModP {
        elems
            .into_iter()
            .fold(ElementModP::one(), |acc, e| self.mult_p(&acc, e))
    }

    pub fn pow_p(&self, base: &ElementModP, exp: &ElementModQ) -> ElementModP {
        ElementModP(base.0.modpow(&exp.0, &self.large_prime))
    }

    pub fn g_pow_p(&self, exp: &ElementModQ) -> ElementModP {
        ElementModP(self.generator.modpow(&exp.0, &self.large_prime))
    }

    /// Modular inverse mod P (P prime); zero has none.
    pub fn inv_p(&self, a: &ElementModP) -> Result<ElementModP, Error> {
        if a.0.is_zero() {
            return Err(Error::OutOfRange {
                domain: "mod-P inverse",
                value: "0".to_string(),
            });
        }
        let exp = &self.large_prime - 2u8;
        Ok(ElementModP(a.0.modpow(&exp, &self.large_prime)))
    }

    pub fn div_p(&self, a: &ElementModP, b: &ElementModP) -> Result<ElementModP, Error> {
        Ok(self.mult_p(a, &self.inv_p(b)?))
    }

    // ---- domain checks ----

    pub fn is_in_bounds_p(&self, a: &ElementModP) -> bool {
        a.0 < self.large_prime
    }

    pub fn is_in_bounds_q(&self, a: &ElementModQ) -> bool {
        a.0 < self.small_prime
    }

    /// True iff `a` is a member of the order-Q subgroup (excluding zero).
    pub fn is_valid_residue(&self, a: &ElementModP) -> bool {
        !a.0.is_zero()
            && a.0 < self.large_prime
            && a.0.modpow(&self.small_prime, &self.large_prime).is_one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // p = 23, q = 11, r = 2, g = 2: ord(2) mod 23 is 11.
    fn tiny_group() -> ElectionConstants {
        ElectionConstants::new(
            BigUint::from(23u8),
            BigUint::from(11u8),
            BigUint::from(2u8),
            BigUint::from(2u8),
        )
        .unwrap()
    }

    #[test]
    fn constructors_reject_out_of_range() {
        let c = tiny_group();
        assert!(c.int_to_p(BigUint::from(23u8)).is_err());
        assert!(c.int_to_q(BigUint::from(11u8)).is_err());
        assert!(c.int_to_p(BigUint::from(22u8)).is_ok());
        assert!(c.int_to_q(BigUint::from(10u8)).is_ok());
    }

    #[test]
    fn bad_group_parameters_rejected() {
        assert!(ElectionConstants::new(
            BigUint::from(23u8),
            BigUint::from(11u8),
            BigUint::from(3u8),
            BigUint::from(2u8),
        )
        .is_err());
        // 5 is not in the order-11 subgroup mod 23
        assert!(ElectionConstants::new(
            BigUint::from(23u8),
            BigUint::from(11u8),
            BigUint::from(2u8),
            BigUint::from(5u8),
        )
        .is_err());
    }

    #[test]
    fn inverse_and_negation_identities() {
        let c = tiny_group();
        for v in 1u8..11 {
            let a = c.int_to_q(BigUint::from(v)).unwrap();
            let inv = c.inv_q(&a).unwrap();
            assert_eq!(c.mult_q(&a, &inv).as_uint(), &BigUint::one());
            let neg = c.negate_q(&a);
            assert!(c.add_q(&a, &neg).is_zero());
        }
        for v in 1u8..23 {
            let a = c.int_to_p(BigUint::from(v)).unwrap();
            let inv = c.inv_p(&a).unwrap();
            assert_eq!(c.mult_p(&a, &inv), ElementModP::one());
        }
        assert!(c.inv_q(&ElementModQ::zero()).is_err());
    }

    #[test]
    fn residue_check_accepts_exactly_the_subgroup() {
        let c = tiny_group();
        let members: Vec<u8> = (1u8..23)
            .filter(|v| {
                let e = c.int_to_p(BigUint::from(*v)).unwrap();
                c.is_valid_residue(&e)
            })
            .collect();
        // quadratic residues mod 23
        assert_eq!(members, vec![1, 2, 3, 4, 6, 8, 9, 12, 13, 16, 18]);
    }

    #[test]
    fn standard_group_is_well_formed() {
        let c = ElectionConstants::standard();
        assert_eq!(
            &c.small_prime * &c.cofactor + BigUint::one(),
            c.large_prime
        );
        assert!(c
            .generator
            .modpow(&c.small_prime, &c.large_prime)
            .is_one());
    }

    #[test]
    fn random_scalars_are_in_range() {
        let c = ElectionConstants::standard();
        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            let s = c.rand_q(&mut rng);
            assert!(c.is_in_bounds_q(&s));
            assert!(s.as_uint() >= &BigUint::from(2u8));
        }
    }
}
