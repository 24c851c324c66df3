//! The validated election manifest, as the opaque contest/selection index
//! the protocol consumes, and the election context whose extended base hash
//! is bound into every proof.

use crate::hash_elems;
use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SelectionDescription {
    pub object_id: String,
    pub sequence_order: u32,
    pub candidate_id: String,
}

impl SelectionDescription {
    pub fn crypto_hash(&self, constants: &ElectionConstants) -> ElementModQ {
        hash_elems!(constants; self.object_id, self.sequence_order, self.candidate_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContestDescription {
    pub object_id: String,
    pub sequence_order: u32,
    /// How many selections a voter may mark; also the number of placeholder
    /// selections appended during encryption.
    pub votes_allowed: u64,
    pub selections: Vec<SelectionDescription>,
}

impl ContestDescription {
    pub fn crypto_hash(&self, constants: &ElectionConstants) -> ElementModQ {
        let selection_hashes: Vec<ElementModQ> = self
            .selections
            .iter()
            .map(|selection| selection.crypto_hash(constants))
            .collect();
        hash_elems!(constants;
            self.object_id, self.sequence_order, self.votes_allowed, selection_hashes)
    }

    pub fn selection(&self, object_id: &str) -> Option<&SelectionDescription> {
        self.selections
            .iter()
            .find(|selection| selection.object_id == object_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub election_scope_id: String,
    pub contests: Vec<ContestDescription>,
}

impl Manifest {
    pub fn crypto_hash(&self, constants: &ElectionConstants) -> ElementModQ {
        let contest_hashes: Vec<ElementModQ> = self
            .contests
            .iter()
            .map(|contest| contest.crypto_hash(constants))
            .collect();
        hash_elems!(constants; self.election_scope_id, contest_hashes)
    }

    pub fn contest(&self, object_id: &str) -> Option<&ContestDescription> {
        self.contests
            .iter()
            .find(|contest| contest.object_id == object_id)
    }
}

/// Everything the encryption and decryption sides need to agree on,
/// published once after the key ceremony.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ElectionContext {
    pub number_of_guardians: u32,
    pub quorum: u32,
    pub joint_public_key: ElementModP,
    pub commitment_hash: ElementModQ,
    pub manifest_hash: ElementModQ,
    pub crypto_base_hash: ElementModQ,
    /// `q-bar`: the base hash extended with the ceremony commitments; bound
    /// into every proof challenge.
    pub crypto_extended_base_hash: ElementModQ,
}

impl ElectionContext {
    pub fn new(
        constants: &ElectionConstants,
        number_of_guardians: u32,
        quorum: u32,
        joint_key: &JointKey,
        manifest: &Manifest,
    ) -> Self {
        let manifest_hash = manifest.crypto_hash(constants);
        let crypto_base_hash = hash_elems!(constants;
            constants.large_prime, constants.small_prime, constants.generator,
            number_of_guardians, quorum, manifest_hash);
        let crypto_extended_base_hash =
            hash_elems!(constants; crypto_base_hash, joint_key.commitment_hash);
        ElectionContext {
            number_of_guardians,
            quorum,
            joint_public_key: joint_key.joint_public_key.clone(),
            commitment_hash: joint_key.commitment_hash.clone(),
            manifest_hash,
            crypto_base_hash,
            crypto_extended_base_hash,
        }
    }
}

#[cfg(test)]
pub(crate) fn two_candidate_manifest() -> Manifest {
    Manifest {
        election_scope_id: "municipal-2024".to_string(),
        contests: vec![ContestDescription {
            object_id: "mayor".to_string(),
            sequence_order: 0,
            votes_allowed: 1,
            selections: vec![
                SelectionDescription {
                    object_id: "mayor-alice".to_string(),
                    sequence_order: 0,
                    candidate_id: "alice".to_string(),
                },
                SelectionDescription {
                    object_id: "mayor-bob".to_string(),
                    sequence_order: 1,
                    candidate_id: "bob".to_string(),
                },
            ],
        }],
    }
}
