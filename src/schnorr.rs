//! Schnorr proof of possession: the publisher of a public key `K = g^s`
//! proves knowledge of `s` without revealing it. Every polynomial
//! coefficient commitment in the key ceremony carries one.

use crate::hash_elems;
use crate::{ElGamalKeyPair, ElectionConstants, ElementModP, ElementModQ};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProof {
    /// The public key `K` the proof is about.
    pub public_key: ElementModP,
    /// Commitment `h = g^nonce`.
    pub commitment: ElementModP,
    /// Fiat-Shamir challenge `c = H(K, h)`.
    pub challenge: ElementModQ,
    /// Response `u = nonce + s * c mod Q`.
    pub response: ElementModQ,
}

impl SchnorrProof {
    pub fn make(
        constants: &ElectionConstants,
        keypair: &ElGamalKeyPair,
        nonce: &ElementModQ,
    ) -> Self {
        let commitment = constants.g_pow_p(nonce);
        let challenge = hash_elems!(constants; keypair.public_key, commitment);
        let response = constants.add_q(
            nonce,
            &constants.mult_q(&keypair.secret_key, &challenge),
        );
        SchnorrProof {
            public_key: keypair.public_key.clone(),
            commitment,
            challenge,
            response,
        }
    }

    /// `g^u == h * K^c`, with all elements in their domains and the
    /// challenge recomputed from scratch.
    pub fn is_valid(&self, constants: &ElectionConstants) -> bool {
        let in_bounds = constants.is_valid_residue(&self.public_key)
            && constants.is_valid_residue(&self.commitment)
            && constants.is_in_bounds_q(&self.challenge)
            && constants.is_in_bounds_q(&self.response);
        if !in_bounds {
            return false;
        }
        let expected_challenge = hash_elems!(constants; self.public_key, self.commitment);
        if expected_challenge != self.challenge {
            return false;
        }
        let lhs = constants.g_pow_p(&self.response);
        let rhs = constants.mult_p(
            &self.commitment,
            &constants.pow_p(&self.public_key, &self.challenge),
        );
        lhs == rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn honest_proof_verifies() {
        let c = ElectionConstants::standard();
        let mut rng = rand::thread_rng();
        let keypair = ElGamalKeyPair::random(&c, &mut rng);
        let proof = SchnorrProof::make(&c, &keypair, &c.rand_q(&mut rng));
        assert!(proof.is_valid(&c));
    }

    #[test]
    fn tampered_proof_rejected() {
        let c = ElectionConstants::standard();
        let mut rng = rand::thread_rng();
        let keypair = ElGamalKeyPair::random(&c, &mut rng);
        let proof = SchnorrProof::make(&c, &keypair, &c.rand_q(&mut rng));

        let mut wrong_response = proof.clone();
        wrong_response.response =
            c.add_q(&proof.response, &c.reduce_to_q(BigUint::from(1u8)));
        assert!(!wrong_response.is_valid(&c));

        let mut wrong_challenge = proof.clone();
        wrong_challenge.challenge =
            c.add_q(&proof.challenge, &c.reduce_to_q(BigUint::from(1u8)));
        assert!(!wrong_challenge.is_valid(&c));

        let mut wrong_key = proof;
        wrong_key.public_key = ElGamalKeyPair::random(&c, &mut rng).public_key;
        assert!(!wrong_key.is_valid(&c));
    }
}
