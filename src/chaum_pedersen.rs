//! The Chaum-Pedersen proof family, made non-interactive via Fiat-Shamir.
//!
//! Three variants: the disjunctive proof that a selection encrypts 0 or 1,
//! the constant proof that a contest's combined selections encrypt exactly
//! the selection limit, and the generic proof that a published partial
//! decryption is consistent with a public key. Every challenge binds the
//! election's extended base hash so proofs cannot be replayed across
//! elections.

use num_bigint::BigUint;

use crate::hash_elems;
use crate::{
    ElGamalCiphertext, ElectionConstants, ElementModP, ElementModQ, Error, Nonces,
};

/// Proves a ciphertext encrypts 0 or 1 without revealing which. The false
/// branch is simulated; the branch challenges sum to the overall challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisjunctiveChaumPedersenProof {
    pub proof_zero_pad: ElementModP,
    pub proof_zero_data: ElementModP,
    pub proof_one_pad: ElementModP,
    pub proof_one_data: ElementModP,
    pub proof_zero_challenge: ElementModQ,
    pub proof_one_challenge: ElementModQ,
    pub challenge: ElementModQ,
    pub proof_zero_response: ElementModQ,
    pub proof_one_response: ElementModQ,
}

impl DisjunctiveChaumPedersenProof {
    /// Construct the proof for a ciphertext known to encrypt `plaintext`
    /// (0 or 1) under `nonce`.
    pub fn make(
        constants: &ElectionConstants,
        message: &ElGamalCiphertext,
        nonce: &ElementModQ,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
        seed: &ElementModQ,
        plaintext: u64,
    ) -> Result<Self, Error> {
        match plaintext {
            0 => Ok(Self::make_zero(
                constants,
                message,
                nonce,
                public_key,
                extended_base_hash,
                seed,
            )),
            1 => Ok(Self::make_one(
                constants,
                message,
                nonce,
                public_key,
                extended_base_hash,
                seed,
            )),
            other => Err(Error::OutOfRange {
                domain: "disjunctive proof plaintext",
                value: other.to_string(),
            }),
        }
    }

    fn make_zero(
        constants: &ElectionConstants,
        message: &ElGamalCiphertext,
        nonce: &ElementModQ,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
        seed: &ElementModQ,
    ) -> Self {
        let (alpha, beta) = (&message.pad, &message.data);
        let nonces = Nonces::new(constants, seed, &"disjoint-chaum-pedersen-proof");
        let proof_one_challenge = nonces.get(constants, 0);
        let proof_one_response = nonces.get(constants, 1);
        let commitment_nonce = nonces.get(constants, 2);

        // real zero branch
        let proof_zero_pad = constants.g_pow_p(&commitment_nonce);
        let proof_zero_data = constants.pow_p(public_key, &commitment_nonce);

        // simulated one branch: commitments chosen so the verification
        // identities hold for the pre-picked challenge and response
        let neg_challenge = constants.negate_q(&proof_one_challenge);
        let proof_one_pad = constants.mult_p(
            &constants.g_pow_p(&proof_one_response),
            &constants.pow_p(alpha, &neg_challenge),
        );
        let proof_one_data = constants.mult_p(
            &constants.mult_p(
                &constants.pow_p(public_key, &proof_one_response),
                &constants.g_pow_p(&proof_one_challenge),
            ),
            &constants.pow_p(beta, &neg_challenge),
        );

        let challenge = hash_elems!(constants;
            extended_base_hash, alpha, beta,
            proof_zero_pad, proof_zero_data, proof_one_pad, proof_one_data);
        let proof_zero_challenge = constants.sub_q(&challenge, &proof_one_challenge);
        let proof_zero_response = constants.add_q(
            &commitment_nonce,
            &constants.mult_q(&proof_zero_challenge, nonce),
        );

        DisjunctiveChaumPedersenProof {
            proof_zero_pad,
            proof_zero_data,
            proof_one_pad,
            proof_one_data,
            proof_zero_challenge,
            proof_one_challenge,
            challenge,
            proof_zero_response,
            proof_one_response,
        }
    }

    fn make_one(
        constants: &ElectionConstants,
        message: &ElGamalCiphertext,
        nonce: &ElementModQ,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
        seed: &ElementModQ,
    ) -> Self {
        let (alpha, beta) = (&message.pad, &message.data);
        let nonces = Nonces::new(constants, seed, &"disjoint-chaum-pedersen-proof");
        let proof_zero_challenge = nonces.get(constants, 0);
        let proof_zero_response = nonces.get(constants, 1);
        let commitment_nonce = nonces.get(constants, 2);

        // simulated zero branch
        let neg_challenge = constants.negate_q(&proof_zero_challenge);
        let proof_zero_pad = constants.mult_p(
            &constants.g_pow_p(&proof_zero_response),
            &constants.pow_p(alpha, &neg_challenge),
        );
        let proof_zero_data = constants.mult_p(
            &constants.pow_p(public_key, &proof_zero_response),
            &constants.pow_p(beta, &neg_challenge),
        );

        // real one branch
        let proof_one_pad = constants.g_pow_p(&commitment_nonce);
        let proof_one_data = constants.pow_p(public_key, &commitment_nonce);

        let challenge = hash_elems!(constants;
            extended_base_hash, alpha, beta,
            proof_zero_pad, proof_zero_data, proof_one_pad, proof_one_data);
        let proof_one_challenge = constants.sub_q(&challenge, &proof_zero_challenge);
        let proof_one_response = constants.add_q(
            &commitment_nonce,
            &constants.mult_q(&proof_one_challenge, nonce),
        );

        DisjunctiveChaumPedersenProof {
            proof_zero_pad,
            proof_zero_data,
            proof_one_pad,
            proof_one_data,
            proof_zero_challenge,
            proof_one_challenge,
            challenge,
            proof_zero_response,
            proof_one_response,
        }
    }

    pub fn is_valid(
        &self,
        constants: &ElectionConstants,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        let (alpha, beta) = (&message.pad, &message.data);
        let in_bounds = constants.is_valid_residue(alpha)
            && constants.is_valid_residue(beta)
            && constants.is_valid_residue(&self.proof_zero_pad)
            && constants.is_valid_residue(&self.proof_zero_data)
            && constants.is_valid_residue(&self.proof_one_pad)
            && constants.is_valid_residue(&self.proof_one_data)
            && constants.is_in_bounds_q(&self.proof_zero_challenge)
            && constants.is_in_bounds_q(&self.proof_one_challenge)
            && constants.is_in_bounds_q(&self.proof_zero_response)
            && constants.is_in_bounds_q(&self.proof_one_response);
        if !in_bounds {
            return false;
        }

        let expected_challenge = hash_elems!(constants;
            extended_base_hash, alpha, beta,
            self.proof_zero_pad, self.proof_zero_data,
            self.proof_one_pad, self.proof_one_data);
        let consistent_challenge = self.challenge == expected_challenge
            && constants.add_q(&self.proof_zero_challenge, &self.proof_one_challenge)
                == self.challenge;
        if !consistent_challenge {
            return false;
        }

        // g^v0 == a0 * alpha^c0
        let zero_pad_ok = constants.g_pow_p(&self.proof_zero_response)
            == constants.mult_p(
                &self.proof_zero_pad,
                &constants.pow_p(alpha, &self.proof_zero_challenge),
            );
        // K^v0 == b0 * beta^c0
        let zero_data_ok = constants.pow_p(public_key, &self.proof_zero_response)
            == constants.mult_p(
                &self.proof_zero_data,
                &constants.pow_p(beta, &self.proof_zero_challenge),
            );
        // g^v1 == a1 * alpha^c1
        let one_pad_ok = constants.g_pow_p(&self.proof_one_response)
            == constants.mult_p(
                &self.proof_one_pad,
                &constants.pow_p(alpha, &self.proof_one_challenge),
            );
        // g^c1 * K^v1 == b1 * beta^c1
        let one_data_ok = constants.mult_p(
            &constants.g_pow_p(&self.proof_one_challenge),
            &constants.pow_p(public_key, &self.proof_one_response),
        ) == constants.mult_p(
            &self.proof_one_data,
            &constants.pow_p(beta, &self.proof_one_challenge),
        );

        zero_pad_ok && zero_data_ok && one_pad_ok && one_data_ok
    }
}

/// Proves the homomorphic combination of a contest's selections encrypts
/// exactly `constant` (the selection limit), using the aggregate nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantChaumPedersenProof {
    pub pad: ElementModP,
    pub data: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
    pub constant: u64,
}

impl ConstantChaumPedersenProof {
    /// `aggregate_nonce` is the mod-Q sum of the individual selection nonces
    /// of the combined ciphertext.
    pub fn make(
        constants: &ElectionConstants,
        message: &ElGamalCiphertext,
        aggregate_nonce: &ElementModQ,
        constant: u64,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
        seed: &ElementModQ,
    ) -> Self {
        let (alpha, beta) = (&message.pad, &message.data);
        let nonces = Nonces::new(constants, seed, &"constant-chaum-pedersen-proof");
        let commitment_nonce = nonces.get(constants, 0);

        let pad = constants.g_pow_p(&commitment_nonce);
        let data = constants.pow_p(public_key, &commitment_nonce);
        let challenge = hash_elems!(constants; extended_base_hash, alpha, beta, pad, data);
        let response = constants.add_q(
            &commitment_nonce,
            &constants.mult_q(&challenge, aggregate_nonce),
        );

        ConstantChaumPedersenProof {
            pad,
            data,
            challenge,
            response,
            constant,
        }
    }

    pub fn is_valid(
        &self,
        constants: &ElectionConstants,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        let (alpha, beta) = (&message.pad, &message.data);
        let in_bounds = constants.is_valid_residue(alpha)
            && constants.is_valid_residue(beta)
            && constants.is_valid_residue(&self.pad)
            && constants.is_valid_residue(&self.data)
            && constants.is_in_bounds_q(&self.challenge)
            && constants.is_in_bounds_q(&self.response);
        if !in_bounds {
            return false;
        }

        let expected_challenge =
            hash_elems!(constants; extended_base_hash, alpha, beta, self.pad, self.data);
        if self.challenge != expected_challenge {
            return false;
        }

        // g^v == a * alpha^c
        let pad_ok = constants.g_pow_p(&self.response)
            == constants.mult_p(&self.pad, &constants.pow_p(alpha, &self.challenge));
        // g^(L*c) * K^v == b * beta^c
        let constant_q = constants.reduce_to_q(BigUint::from(self.constant));
        let data_ok = constants.mult_p(
            &constants.g_pow_p(&constants.mult_q(&constant_q, &self.challenge)),
            &constants.pow_p(public_key, &self.response),
        ) == constants.mult_p(&self.data, &constants.pow_p(beta, &self.challenge));

        pad_ok && data_ok
    }
}

/// Proves a partial decryption `share = pad^s` is consistent with the public
/// key `K = g^s`, for a secret `s` the prover never reveals. Verified
/// against a guardian public key, or against a recovery key for compensated
/// shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaumPedersenProof {
    pub pad: ElementModP,
    pub data: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
}

impl ChaumPedersenProof {
    pub fn make(
        constants: &ElectionConstants,
        message: &ElGamalCiphertext,
        secret: &ElementModQ,
        share: &ElementModP,
        extended_base_hash: &ElementModQ,
        seed: &ElementModQ,
    ) -> Self {
        let (alpha, beta) = (&message.pad, &message.data);
        let nonces = Nonces::new(constants, seed, &"decryption-chaum-pedersen-proof");
        let commitment_nonce = nonces.get(constants, 0);

        let pad = constants.g_pow_p(&commitment_nonce);
        let data = constants.pow_p(alpha, &commitment_nonce);
        let challenge =
            hash_elems!(constants; extended_base_hash, alpha, beta, pad, data, share);
        let response = constants.add_q(
            &commitment_nonce,
            &constants.mult_q(&challenge, secret),
        );

        ChaumPedersenProof {
            pad,
            data,
            challenge,
            response,
        }
    }

    pub fn is_valid(
        &self,
        constants: &ElectionConstants,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        share: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        let (alpha, beta) = (&message.pad, &message.data);
        let in_bounds = constants.is_valid_residue(alpha)
            && constants.is_valid_residue(beta)
            && constants.is_valid_residue(&self.pad)
            && constants.is_valid_residue(&self.data)
            && constants.is_valid_residue(share)
            && constants.is_in_bounds_q(&self.challenge)
            && constants.is_in_bounds_q(&self.response);
        if !in_bounds {
            return false;
        }

        let expected_challenge =
            hash_elems!(constants; extended_base_hash, alpha, beta, self.pad, self.data, share);
        if self.challenge != expected_challenge {
            return false;
        }

        // g^v == a * K^c
        let pad_ok = constants.g_pow_p(&self.response)
            == constants.mult_p(&self.pad, &constants.pow_p(public_key, &self.challenge));
        // alpha^v == b * share^c
        let data_ok = constants.pow_p(alpha, &self.response)
            == constants.mult_p(&self.data, &constants.pow_p(share, &self.challenge));

        pad_ok && data_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{elgamal_encrypt, ElGamalKeyPair};

    fn setup() -> (
        ElectionConstants,
        ElGamalKeyPair,
        ElementModQ, // extended base hash stand-in
    ) {
        let c = ElectionConstants::standard();
        let mut rng = rand::thread_rng();
        let keypair = ElGamalKeyPair::random(&c, &mut rng);
        let q_bar = hash_elems!(&c; "election-context");
        (c, keypair, q_bar)
    }

    #[test]
    fn disjunctive_proof_verifies_for_both_plaintexts() {
        let (c, keypair, q_bar) = setup();
        let mut rng = rand::thread_rng();
        for plaintext in &[0u64, 1] {
            let nonce = c.rand_q(&mut rng);
            let ct = elgamal_encrypt(&c, *plaintext, &nonce, &keypair.public_key).unwrap();
            let seed = c.rand_q(&mut rng);
            let proof = DisjunctiveChaumPedersenProof::make(
                &c, &ct, &nonce, &keypair.public_key, &q_bar, &seed, *plaintext,
            )
            .unwrap();
            assert!(proof.is_valid(&c, &ct, &keypair.public_key, &q_bar));
        }
    }

    #[test]
    fn disjunctive_proof_rejects_plaintexts_above_one() {
        let (c, keypair, q_bar) = setup();
        let mut rng = rand::thread_rng();
        let nonce = c.rand_q(&mut rng);
        let ct = elgamal_encrypt(&c, 2, &nonce, &keypair.public_key).unwrap();
        let seed = c.rand_q(&mut rng);
        assert!(DisjunctiveChaumPedersenProof::make(
            &c, &ct, &nonce, &keypair.public_key, &q_bar, &seed, 2
        )
        .is_err());
    }

    #[test]
    fn disjunctive_proof_mutation_rejected() {
        let (c, keypair, q_bar) = setup();
        let mut rng = rand::thread_rng();
        let nonce = c.rand_q(&mut rng);
        let ct = elgamal_encrypt(&c, 1, &nonce, &keypair.public_key).unwrap();
        let seed = c.rand_q(&mut rng);
        let proof = DisjunctiveChaumPedersenProof::make(
            &c, &ct, &nonce, &keypair.public_key, &q_bar, &seed, 1,
        )
        .unwrap();

        let one = c.reduce_to_q(num_bigint::BigUint::from(1u8));
        let mut bad_challenge = proof.clone();
        bad_challenge.challenge = c.add_q(&bad_challenge.challenge, &one);
        assert!(!bad_challenge.is_valid(&c, &ct, &keypair.public_key, &q_bar));

        let mut bad_response = proof.clone();
        bad_response.proof_one_response = c.add_q(&bad_response.proof_one_response, &one);
        assert!(!bad_response.is_valid(&c, &ct, &keypair.public_key, &q_bar));

        // tampered ciphertext data no longer matches the proof
        let mut bad_message = ct;
        bad_message.data = c.mult_p(&bad_message.data, &c.g_pow_p(&one));
        assert!(!proof.is_valid(&c, &bad_message, &keypair.public_key, &q_bar));
    }

    #[test]
    fn constant_proof_round_trip() {
        let (c, keypair, q_bar) = setup();
        let mut rng = rand::thread_rng();
        let nonces: Vec<ElementModQ> = (0..3).map(|_| c.rand_q(&mut rng)).collect();
        let cts: Vec<_> = [1u64, 0, 1]
            .iter()
            .zip(&nonces)
            .map(|(m, n)| elgamal_encrypt(&c, *m, n, &keypair.public_key).unwrap())
            .collect();
        let combined = crate::elgamal_add(&c, &cts);
        let aggregate_nonce = c.sum_q(&nonces);
        let seed = c.rand_q(&mut rng);
        let proof = ConstantChaumPedersenProof::make(
            &c, &combined, &aggregate_nonce, 2, &keypair.public_key, &q_bar, &seed,
        );
        assert!(proof.is_valid(&c, &combined, &keypair.public_key, &q_bar));

        // a proof for the wrong constant fails
        let wrong = ConstantChaumPedersenProof::make(
            &c, &combined, &aggregate_nonce, 3, &keypair.public_key, &q_bar, &seed,
        );
        assert!(!wrong.is_valid(&c, &combined, &keypair.public_key, &q_bar));
    }

    #[test]
    fn decryption_proof_round_trip() {
        let (c, keypair, q_bar) = setup();
        let mut rng = rand::thread_rng();
        let nonce = c.rand_q(&mut rng);
        let ct = elgamal_encrypt(&c, 1, &nonce, &keypair.public_key).unwrap();
        let share = ct.partial_decrypt(&c, &keypair.secret_key);
        let seed = c.rand_q(&mut rng);
        let proof =
            ChaumPedersenProof::make(&c, &ct, &keypair.secret_key, &share, &q_bar, &seed);
        assert!(proof.is_valid(&c, &ct, &keypair.public_key, &share, &q_bar));

        // wrong public key
        let other = ElGamalKeyPair::random(&c, &mut rng);
        assert!(!proof.is_valid(&c, &ct, &other.public_key, &share, &q_bar));
    }
}
