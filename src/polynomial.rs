//! Guardian secret polynomials for Shamir-style threshold sharing.
//!
//! Each guardian holds a degree-(quorum-1) polynomial over the mod-Q field.
//! Coefficient 0 is the guardian's election secret; the public commitments
//! `g^a_j` let anyone check a claimed polynomial evaluation, and each
//! coefficient carries a Schnorr proof of possession.

use num_bigint::BigUint;
use rand::{CryptoRng, Rng};

use crate::{
    ElGamalKeyPair, ElectionConstants, ElementModP, ElementModQ, Error, SchnorrProof,
};

#[derive(Debug, Clone)]
pub struct ElectionPolynomial {
    coefficients: Vec<ElementModQ>,
    commitments: Vec<ElementModP>,
    proofs: Vec<SchnorrProof>,
}

impl ElectionPolynomial {
    /// A random polynomial of rank `quorum`.
    pub fn generate<R: Rng + CryptoRng>(
        constants: &ElectionConstants,
        quorum: u32,
        rng: &mut R,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(quorum as usize);
        let mut commitments = Vec::with_capacity(quorum as usize);
        let mut proofs = Vec::with_capacity(quorum as usize);
        for _ in 0..quorum {
            let coefficient = constants.rand_q(rng);
            let commitment = constants.g_pow_p(&coefficient);
            let keypair = ElGamalKeyPair {
                secret_key: coefficient.clone(),
                public_key: commitment.clone(),
            };
            proofs.push(SchnorrProof::make(constants, &keypair, &constants.rand_q(rng)));
            coefficients.push(coefficient);
            commitments.push(commitment);
        }
        ElectionPolynomial {
            coefficients,
            commitments,
            proofs,
        }
    }

    /// Coefficient 0: the guardian's election secret.
    pub fn secret(&self) -> &ElementModQ {
        &self.coefficients[0]
    }

    pub fn commitments(&self) -> &[ElementModP] {
        &self.commitments
    }

    pub fn proofs(&self) -> &[SchnorrProof] {
        &self.proofs
    }

    /// Evaluate the polynomial at `x` (mod Q).
    pub fn coordinate(&self, constants: &ElectionConstants, x: u64) -> ElementModQ {
        let x_q = constants.reduce_to_q(BigUint::from(x));
        let mut accumulator = ElementModQ::zero();
        let mut x_power = constants.reduce_to_q(BigUint::from(1u8));
        for coefficient in &self.coefficients {
            accumulator = constants.add_q(
                &accumulator,
                &constants.mult_q(coefficient, &x_power),
            );
            x_power = constants.mult_q(&x_power, &x_q);
        }
        accumulator
    }
}

/// Check a claimed evaluation against the owner's public commitments:
/// `g^value == prod_j commitment_j^(x^j)`.
pub fn verify_polynomial_coordinate(
    constants: &ElectionConstants,
    value: &ElementModQ,
    x: u64,
    commitments: &[ElementModP],
) -> bool {
    let x_q = constants.reduce_to_q(BigUint::from(x));
    let mut x_power = constants.reduce_to_q(BigUint::from(1u8));
    let mut product = ElementModP::one();
    for commitment in commitments {
        product = constants.mult_p(&product, &constants.pow_p(commitment, &x_power));
        x_power = constants.mult_q(&x_power, &x_q);
    }
    constants.g_pow_p(value) == product
}

/// The Lagrange interpolation weight at zero for the guardian at
/// `coordinate`, given the x-coordinates of the *other* guardians actually
/// present: `prod x_j / prod (x_j - coordinate)` mod Q. Recomputed for every
/// decrypting quorum; never cached across quorums.
pub fn lagrange_coefficient(
    constants: &ElectionConstants,
    coordinate: u64,
    others: &[u64],
) -> Result<ElementModQ, Error> {
    let mut numerator = constants.reduce_to_q(BigUint::from(1u8));
    let mut denominator = constants.reduce_to_q(BigUint::from(1u8));
    for &other in others {
        if other == coordinate {
            return Err(Error::DuplicateXCoordinate(other as u32));
        }
        let other_q = constants.reduce_to_q(BigUint::from(other));
        let coordinate_q = constants.reduce_to_q(BigUint::from(coordinate));
        numerator = constants.mult_q(&numerator, &other_q);
        denominator =
            constants.mult_q(&denominator, &constants.sub_q(&other_q, &coordinate_q));
    }
    Ok(constants.mult_q(&numerator, &constants.inv_q(&denominator)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_verify_against_commitments() {
        let c = ElectionConstants::standard();
        let mut rng = rand::thread_rng();
        let polynomial = ElectionPolynomial::generate(&c, 3, &mut rng);
        for x in 1u64..=5 {
            let value = polynomial.coordinate(&c, x);
            assert!(verify_polynomial_coordinate(
                &c,
                &value,
                x,
                polynomial.commitments()
            ));
            // wrong coordinate does not verify
            assert!(!verify_polynomial_coordinate(
                &c,
                &value,
                x + 1,
                polynomial.commitments()
            ));
        }
    }

    #[test]
    fn possession_proofs_are_valid() {
        let c = ElectionConstants::standard();
        let mut rng = rand::thread_rng();
        let polynomial = ElectionPolynomial::generate(&c, 2, &mut rng);
        assert_eq!(polynomial.proofs().len(), 2);
        assert!(polynomial.proofs().iter().all(|p| p.is_valid(&c)));
    }

    #[test]
    fn lagrange_interpolation_recovers_the_secret() {
        let c = ElectionConstants::standard();
        let mut rng = rand::thread_rng();
        let polynomial = ElectionPolynomial::generate(&c, 3, &mut rng);

        // any 3 of these coordinates reconstruct P(0)
        for subset in &[[1u64, 2, 3], [2, 4, 5], [1, 3, 5]] {
            let mut reconstructed = ElementModQ::zero();
            for &x in subset.iter() {
                let others: Vec<u64> =
                    subset.iter().copied().filter(|&o| o != x).collect();
                let weight = lagrange_coefficient(&c, x, &others).unwrap();
                reconstructed = c.add_q(
                    &reconstructed,
                    &c.mult_q(&weight, &polynomial.coordinate(&c, x)),
                );
            }
            assert_eq!(&reconstructed, polynomial.secret());
        }
    }

    #[test]
    fn duplicate_coordinates_rejected() {
        let c = ElectionConstants::standard();
        assert!(lagrange_coefficient(&c, 2, &[1, 2, 3]).is_err());
    }
}
