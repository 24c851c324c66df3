//! Plaintext and encrypted ballots.
//!
//! Encrypted ballot types are parameterized by a nonce phase: freshly
//! encrypted ballots still carry their derivation nonces (so the voter can
//! spot-check), while ballots submitted to the record have them stripped.
//! The distinction lives in the type system so a nonce-bearing ballot can
//! never be submitted by accident.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::hash_elems;
use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlaintextSelection {
    pub object_id: String,
    pub vote: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlaintextContest {
    pub object_id: String,
    pub selections: Vec<PlaintextSelection>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlaintextBallot {
    pub object_id: String,
    pub contests: Vec<PlaintextContest>,
}

impl PlaintextBallot {
    /// The vote recorded for a selection; unmarked selections count as 0.
    pub fn vote(&self, contest_id: &str, selection_id: &str) -> u64 {
        self.contests
            .iter()
            .find(|contest| contest.object_id == contest_id)
            .and_then(|contest| {
                contest
                    .selections
                    .iter()
                    .find(|selection| selection.object_id == selection_id)
            })
            .map(|selection| selection.vote)
            .unwrap_or(0)
    }
}

/// Whether encrypted ballot types still carry their derivation nonces.
pub trait NoncePhase {
    type Nonce: Clone + Debug + Serialize + DeserializeOwned + PartialEq;
}

/// Fresh from the encrypter: nonces present for voter verification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WithNonce;

/// Ready for the public record: nonces discarded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NonceStripped;

impl NoncePhase for WithNonce {
    type Nonce = ElementModQ;
}

impl NoncePhase for NonceStripped {
    type Nonce = ();
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(bound = "")]
pub struct EncryptedSelection<P: NoncePhase> {
    pub object_id: String,
    pub sequence_order: u32,
    pub description_hash: ElementModQ,
    pub ciphertext: ElGamalCiphertext,
    pub crypto_hash: ElementModQ,
    /// Placeholders absorb unspent votes so every contest encrypts to
    /// exactly `votes_allowed`; they never appear in the tally.
    pub is_placeholder: bool,
    pub proof: DisjunctiveChaumPedersenProof,
    pub nonce: P::Nonce,
}

impl<P: NoncePhase> EncryptedSelection<P> {
    pub fn recompute_crypto_hash(&self, constants: &ElectionConstants) -> ElementModQ {
        hash_elems!(constants;
            self.object_id,
            self.description_hash,
            self.ciphertext.crypto_hash(constants))
    }
}

impl EncryptedSelection<WithNonce> {
    pub fn strip_nonce(self) -> EncryptedSelection<NonceStripped> {
        EncryptedSelection {
            object_id: self.object_id,
            sequence_order: self.sequence_order,
            description_hash: self.description_hash,
            ciphertext: self.ciphertext,
            crypto_hash: self.crypto_hash,
            is_placeholder: self.is_placeholder,
            proof: self.proof,
            nonce: (),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(bound = "")]
pub struct EncryptedContest<P: NoncePhase> {
    pub object_id: String,
    pub sequence_order: u32,
    pub description_hash: ElementModQ,
    /// Real selections first, placeholders after, in sequence order.
    pub selections: Vec<EncryptedSelection<P>>,
    pub crypto_hash: ElementModQ,
    /// Proves the contest total (placeholders included) is exactly
    /// `votes_allowed`.
    pub proof: ConstantChaumPedersenProof,
    pub nonce: P::Nonce,
}

impl<P: NoncePhase> EncryptedContest<P> {
    pub fn recompute_crypto_hash(&self, constants: &ElectionConstants) -> ElementModQ {
        let selection_hashes: Vec<ElementModQ> = self
            .selections
            .iter()
            .map(|selection| selection.crypto_hash.clone())
            .collect();
        hash_elems!(constants; self.object_id, self.description_hash, selection_hashes)
    }

    /// The homomorphic sum of every selection ciphertext, placeholders
    /// included; the constant proof speaks about this value.
    pub fn aggregate_ciphertext(&self, constants: &ElectionConstants) -> ElGamalCiphertext {
        elgamal_add(
            constants,
            self.selections.iter().map(|selection| &selection.ciphertext),
        )
    }
}

impl EncryptedContest<WithNonce> {
    pub fn strip_nonce(self) -> EncryptedContest<NonceStripped> {
        EncryptedContest {
            object_id: self.object_id,
            sequence_order: self.sequence_order,
            description_hash: self.description_hash,
            selections: self
                .selections
                .into_iter()
                .map(EncryptedSelection::strip_nonce)
                .collect(),
            crypto_hash: self.crypto_hash,
            proof: self.proof,
            nonce: (),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(bound = "")]
pub struct EncryptedBallot<P: NoncePhase> {
    pub object_id: String,
    pub manifest_hash: ElementModQ,
    /// The previous ballot's tracking code, or the device hash for the
    /// first ballot of a session.
    pub code_seed: ElementModQ,
    pub contests: Vec<EncryptedContest<P>>,
    pub crypto_hash: ElementModQ,
    pub tracking_code: ElementModQ,
    pub timestamp: u64,
    /// The master nonce the whole derivation chain unrolls from.
    pub nonce: P::Nonce,
}

impl<P: NoncePhase> EncryptedBallot<P> {
    pub fn recompute_crypto_hash(&self, constants: &ElectionConstants) -> ElementModQ {
        let contest_hashes: Vec<ElementModQ> = self
            .contests
            .iter()
            .map(|contest| contest.crypto_hash.clone())
            .collect();
        hash_elems!(constants; self.object_id, self.manifest_hash, contest_hashes)
    }

    pub fn recompute_tracking_code(&self, constants: &ElectionConstants) -> ElementModQ {
        hash_elems!(constants; self.code_seed, self.timestamp, self.crypto_hash)
    }
}

impl EncryptedBallot<WithNonce> {
    pub fn strip_nonce(self) -> EncryptedBallot<NonceStripped> {
        EncryptedBallot {
            object_id: self.object_id,
            manifest_hash: self.manifest_hash,
            code_seed: self.code_seed,
            contests: self
                .contests
                .into_iter()
                .map(EncryptedContest::strip_nonce)
                .collect(),
            crypto_hash: self.crypto_hash,
            tracking_code: self.tracking_code,
            timestamp: self.timestamp,
            nonce: (),
        }
    }

    /// Finalize the ballot into the public record as cast or spoiled.
    pub fn submit(self, state: BallotState) -> SubmittedBallot {
        SubmittedBallot {
            ballot: self.strip_nonce(),
            state,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallotState {
    /// Counted in the tally.
    Cast,
    /// Excluded from the tally and decrypted individually as a challenge.
    Spoiled,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmittedBallot {
    pub ballot: EncryptedBallot<NonceStripped>,
    pub state: BallotState,
}

impl SubmittedBallot {
    pub fn is_cast(&self) -> bool {
        self.state == BallotState::Cast
    }
}
