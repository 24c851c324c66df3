//! The threshold key ceremony.
//!
//! Guardians are independent actors owning their own secrets; the
//! [`KeyCeremony`] mediator only relays the explicit round messages defined
//! here and tracks round completion. Rounds are strict: keys are shared,
//! then backups exchanged, then backups verified (with a challenge/response
//! recovery path), and only then is the joint key published.

use indexmap::IndexMap;
use rand::{CryptoRng, Rng};

use crate::hash_elems;
use crate::*;

/// How many guardians participate and how many are needed to decrypt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CeremonyDetails {
    pub number_of_guardians: u32,
    pub quorum: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyState {
    Created,
    KeysShared,
    BackupsExchanged,
    BackupsVerified,
    JointKeyComputed,
}

/// Round 1 message: everything a guardian publishes about itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKeySet {
    pub owner_id: String,
    /// The guardian's polynomial x value, unique in `[1, 255]`.
    pub x_coordinate: u32,
    /// Key under which partial key backups for this guardian are encrypted.
    pub auxiliary_public_key: ElementModP,
    /// One possession proof per polynomial coefficient; proof 0 is about
    /// the guardian's election public key.
    pub coefficient_proofs: Vec<SchnorrProof>,
}

impl PublicKeySet {
    pub fn election_public_key(&self) -> &ElementModP {
        &self.coefficient_proofs[0].public_key
    }

    pub fn coefficient_commitments(&self) -> Vec<ElementModP> {
        self.coefficient_proofs
            .iter()
            .map(|proof| proof.public_key.clone())
            .collect()
    }

    pub fn is_valid(&self, constants: &ElectionConstants) -> bool {
        !self.coefficient_proofs.is_empty()
            && self.x_coordinate >= 1
            && self.x_coordinate <= 255
            && constants.is_valid_residue(&self.auxiliary_public_key)
            && self.coefficient_proofs.iter().all(|p| p.is_valid(constants))
    }
}

/// A polynomial coordinate sealed to its designated recipient: hashed
/// ElGamal under the recipient's auxiliary key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCoordinate {
    pub pad: ElementModP,
    pub data: ElementModQ,
}

impl EncryptedCoordinate {
    pub fn seal<R: Rng + CryptoRng>(
        constants: &ElectionConstants,
        coordinate: &ElementModQ,
        recipient_key: &ElementModP,
        rng: &mut R,
    ) -> Self {
        let ephemeral = constants.rand_q(rng);
        let pad = constants.g_pow_p(&ephemeral);
        let shared = constants.pow_p(recipient_key, &ephemeral);
        let mask = hash_elems!(constants; pad, shared);
        EncryptedCoordinate {
            data: constants.add_q(coordinate, &mask),
            pad,
        }
    }

    pub fn open(
        &self,
        constants: &ElectionConstants,
        recipient_secret: &ElementModQ,
    ) -> ElementModQ {
        let shared = constants.pow_p(&self.pad, recipient_secret);
        let mask = hash_elems!(constants; self.pad, shared);
        constants.sub_q(&self.data, &mask)
    }
}

/// Round 2 message: one guardian's Shamir share of its own secret, destined
/// for one other guardian.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PartialKeyBackup {
    pub owner_id: String,
    pub designated_id: String,
    pub designated_x_coordinate: u32,
    pub encrypted_coordinate: EncryptedCoordinate,
}

/// Round 2 result: did the designated guardian's check of a backup succeed.
/// Failures are per-pair data for round 3, not errors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PartialKeyVerification {
    pub owner_id: String,
    pub designated_id: String,
    pub verified: bool,
}

/// Round 3 message: the challenged owner publishes the coordinate in the
/// clear so anyone can check it against the public commitments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BackupChallengeResponse {
    pub owner_id: String,
    pub designated_id: String,
    pub designated_x_coordinate: u32,
    pub coordinate: ElementModQ,
}

impl BackupChallengeResponse {
    /// The third-party check: no secrets required.
    pub fn verify(&self, constants: &ElectionConstants, owner_keys: &PublicKeySet) -> bool {
        verify_polynomial_coordinate(
            constants,
            &self.coordinate,
            self.designated_x_coordinate as u64,
            &owner_keys.coefficient_commitments(),
        )
    }
}

/// The ceremony's product: the election encryption key and the hash binding
/// every guardian's commitments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JointKey {
    pub joint_public_key: ElementModP,
    pub commitment_hash: ElementModQ,
}

/// A key-ceremony participant. All secret material lives here and never
/// leaves except inside sealed [`PartialKeyBackup`]s.
#[derive(Debug)]
pub struct Guardian {
    id: String,
    x_coordinate: u32,
    details: CeremonyDetails,
    polynomial: ElectionPolynomial,
    auxiliary_keys: ElGamalKeyPair,
    /// Every guardian's round-1 message, own included.
    public_key_sets: IndexMap<String, PublicKeySet>,
    /// Backups this guardian issued, by designated guardian id.
    backups_issued: IndexMap<String, PartialKeyBackup>,
    /// Verified coordinates of other guardians' polynomials at this
    /// guardian's x, by owner id. Fuel for compensated decryption.
    backup_coordinates: IndexMap<String, ElementModQ>,
}

impl Guardian {
    pub fn new<R: Rng + CryptoRng>(
        constants: &ElectionConstants,
        id: &str,
        x_coordinate: u32,
        details: CeremonyDetails,
        rng: &mut R,
    ) -> Result<Self, Error> {
        if x_coordinate < 1 || x_coordinate > 255 {
            return Err(Error::OutOfRange {
                domain: "guardian x coordinate",
                value: x_coordinate.to_string(),
            });
        }
        if details.quorum < 1 || details.quorum > details.number_of_guardians {
            return Err(Error::OutOfRange {
                domain: "ceremony quorum",
                value: details.quorum.to_string(),
            });
        }
        let polynomial = ElectionPolynomial::generate(constants, details.quorum, rng);
        let auxiliary_keys = ElGamalKeyPair::random(constants, rng);
        let mut guardian = Guardian {
            id: id.to_string(),
            x_coordinate,
            details,
            polynomial,
            auxiliary_keys,
            public_key_sets: IndexMap::new(),
            backups_issued: IndexMap::new(),
            backup_coordinates: IndexMap::new(),
        };
        let own_keys = guardian.share_keys();
        guardian.public_key_sets.insert(guardian.id.clone(), own_keys);
        Ok(guardian)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn x_coordinate(&self) -> u32 {
        self.x_coordinate
    }

    pub fn ceremony_details(&self) -> CeremonyDetails {
        self.details
    }

    pub fn election_public_key(&self) -> &ElementModP {
        &self.polynomial.commitments()[0]
    }

    pub fn public_key_set(&self, guardian_id: &str) -> Option<&PublicKeySet> {
        self.public_key_sets.get(guardian_id)
    }

    pub(crate) fn secret(&self) -> &ElementModQ {
        self.polynomial.secret()
    }

    pub(crate) fn backup_coordinate(&self, owner_id: &str) -> Option<&ElementModQ> {
        self.backup_coordinates.get(owner_id)
    }

    /// Round 1: publish this guardian's keys and possession proofs.
    pub fn share_keys(&self) -> PublicKeySet {
        PublicKeySet {
            owner_id: self.id.clone(),
            x_coordinate: self.x_coordinate,
            auxiliary_public_key: self.auxiliary_keys.public_key.clone(),
            coefficient_proofs: self.polynomial.proofs().to_vec(),
        }
    }

    /// Round 1: record another guardian's keys after validating them.
    pub fn receive_keys(
        &mut self,
        constants: &ElectionConstants,
        keys: PublicKeySet,
    ) -> Result<(), Error> {
        if self.public_key_sets.contains_key(&keys.owner_id) {
            return Err(Error::DuplicateGuardianId(keys.owner_id));
        }
        if self
            .public_key_sets
            .values()
            .any(|existing| existing.x_coordinate == keys.x_coordinate)
        {
            return Err(Error::DuplicateXCoordinate(keys.x_coordinate));
        }
        if !keys.is_valid(constants) {
            return Err(Error::GuardianFailedVerification(keys.owner_id));
        }
        self.public_key_sets.insert(keys.owner_id.clone(), keys);
        Ok(())
    }

    /// Round 2: evaluate own polynomial at the recipient's x and seal the
    /// result under the recipient's auxiliary key.
    pub fn send_partial_key_backup<R: Rng + CryptoRng>(
        &mut self,
        constants: &ElectionConstants,
        designated_id: &str,
        rng: &mut R,
    ) -> Result<PartialKeyBackup, Error> {
        if designated_id == self.id {
            return Err(Error::DuplicateGuardianId(self.id.clone()));
        }
        if let Some(backup) = self.backups_issued.get(designated_id) {
            return Ok(backup.clone());
        }
        let recipient = self
            .public_key_sets
            .get(designated_id)
            .ok_or_else(|| Error::MissingPublicKeys(designated_id.to_string()))?;
        let coordinate = self
            .polynomial
            .coordinate(constants, recipient.x_coordinate as u64);
        let backup = PartialKeyBackup {
            owner_id: self.id.clone(),
            designated_id: designated_id.to_string(),
            designated_x_coordinate: recipient.x_coordinate,
            encrypted_coordinate: EncryptedCoordinate::seal(
                constants,
                &coordinate,
                &recipient.auxiliary_public_key,
                rng,
            ),
        };
        self.backups_issued
            .insert(designated_id.to_string(), backup.clone());
        Ok(backup)
    }

    /// Round 2: decrypt a backup destined for this guardian and check the
    /// coordinate against the owner's public commitments. A mismatch is a
    /// recorded failure, not an error.
    pub fn verify_partial_key_backup(
        &mut self,
        constants: &ElectionConstants,
        backup: &PartialKeyBackup,
    ) -> Result<PartialKeyVerification, Error> {
        if backup.designated_id != self.id {
            return Ok(PartialKeyVerification {
                owner_id: backup.owner_id.clone(),
                designated_id: backup.designated_id.clone(),
                verified: false,
            });
        }
        let owner = self
            .public_key_sets
            .get(&backup.owner_id)
            .ok_or_else(|| Error::MissingPublicKeys(backup.owner_id.clone()))?;
        let coordinate = backup
            .encrypted_coordinate
            .open(constants, &self.auxiliary_keys.secret_key);
        let verified = verify_polynomial_coordinate(
            constants,
            &coordinate,
            self.x_coordinate as u64,
            &owner.coefficient_commitments(),
        );
        if verified {
            self.backup_coordinates
                .insert(backup.owner_id.clone(), coordinate);
        }
        Ok(PartialKeyVerification {
            owner_id: backup.owner_id.clone(),
            designated_id: backup.designated_id.clone(),
            verified,
        })
    }

    /// Round 3: answer a challenge against a backup this guardian issued by
    /// publishing the coordinate in the clear.
    pub fn challenge_backup(
        &self,
        constants: &ElectionConstants,
        designated_id: &str,
    ) -> Result<BackupChallengeResponse, Error> {
        let backup = self
            .backups_issued
            .get(designated_id)
            .ok_or_else(|| Error::MissingBackup {
                guardian_id: self.id.clone(),
                missing_guardian_id: designated_id.to_string(),
            })?;
        Ok(BackupChallengeResponse {
            owner_id: self.id.clone(),
            designated_id: designated_id.to_string(),
            designated_x_coordinate: backup.designated_x_coordinate,
            coordinate: self
                .polynomial
                .coordinate(constants, backup.designated_x_coordinate as u64),
        })
    }

    /// Round 3: accept a published challenge response. A coordinate that
    /// checks out publicly stands in for the failed backup.
    pub fn receive_challenge_response(
        &mut self,
        constants: &ElectionConstants,
        response: &BackupChallengeResponse,
    ) -> Result<(), Error> {
        let owner = self
            .public_key_sets
            .get(&response.owner_id)
            .ok_or_else(|| Error::MissingPublicKeys(response.owner_id.clone()))?;
        if !response.verify(constants, owner) {
            return Err(ValidationError::BackupVerificationFailed {
                owner_id: response.owner_id.clone(),
                designated_id: response.designated_id.clone(),
            }
            .into());
        }
        if response.designated_id == self.id {
            self.backup_coordinates
                .insert(response.owner_id.clone(), response.coordinate.clone());
        }
        Ok(())
    }
}

/// The mediator: relays round messages, enforces round order, and never
/// holds secret material.
#[derive(Debug)]
pub struct KeyCeremony {
    details: CeremonyDetails,
    state: CeremonyState,
    public_keys: IndexMap<String, PublicKeySet>,
    backups_recorded: u32,
    verifications_recorded: u32,
    /// (owner, designated) pairs whose backups failed and await challenge.
    unresolved_failures: Vec<(String, String)>,
}

impl KeyCeremony {
    pub fn new(details: CeremonyDetails) -> Self {
        KeyCeremony {
            details,
            state: CeremonyState::Created,
            public_keys: IndexMap::new(),
            backups_recorded: 0,
            verifications_recorded: 0,
            unresolved_failures: Vec::new(),
        }
    }

    pub fn state(&self) -> CeremonyState {
        self.state
    }

    pub fn details(&self) -> CeremonyDetails {
        self.details
    }

    fn require_state(&self, expected: CeremonyState) -> Result<(), Error> {
        if self.state != expected {
            return Err(Error::CeremonyStateMismatch {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn expected_backups(&self) -> u32 {
        let n = self.details.number_of_guardians;
        n * (n - 1)
    }

    /// Round 1: register a guardian's public keys.
    pub fn announce(
        &mut self,
        constants: &ElectionConstants,
        keys: PublicKeySet,
    ) -> Result<(), Error> {
        self.require_state(CeremonyState::Created)?;
        if self.public_keys.contains_key(&keys.owner_id) {
            return Err(Error::DuplicateGuardianId(keys.owner_id));
        }
        if self
            .public_keys
            .values()
            .any(|existing| existing.x_coordinate == keys.x_coordinate)
        {
            return Err(Error::DuplicateXCoordinate(keys.x_coordinate));
        }
        if !keys.is_valid(constants) {
            return Err(Error::GuardianFailedVerification(keys.owner_id));
        }
        self.public_keys.insert(keys.owner_id.clone(), keys);
        if self.public_keys.len() as u32 == self.details.number_of_guardians {
            self.state = CeremonyState::KeysShared;
        }
        Ok(())
    }

    /// Round 2: observe a relayed backup.
    pub fn record_backup(&mut self, backup: &PartialKeyBackup) -> Result<(), Error> {
        self.require_state(CeremonyState::KeysShared)?;
        if !self.public_keys.contains_key(&backup.owner_id) {
            return Err(Error::UnknownGuardian(backup.owner_id.clone()));
        }
        if !self.public_keys.contains_key(&backup.designated_id) {
            return Err(Error::UnknownGuardian(backup.designated_id.clone()));
        }
        self.backups_recorded += 1;
        if self.backups_recorded == self.expected_backups() {
            self.state = CeremonyState::BackupsExchanged;
        }
        Ok(())
    }

    /// Round 2 results: record a designated guardian's verification verdict.
    pub fn record_verification(
        &mut self,
        verification: PartialKeyVerification,
    ) -> Result<(), Error> {
        self.require_state(CeremonyState::BackupsExchanged)?;
        if !verification.verified {
            self.unresolved_failures.push((
                verification.owner_id.clone(),
                verification.designated_id.clone(),
            ));
        }
        self.verifications_recorded += 1;
        self.advance_if_verified();
        Ok(())
    }

    /// Round 3: check a challenge response publicly. Success clears the
    /// failure; another failure means the ceremony cannot complete with
    /// this guardian.
    pub fn record_challenge_response(
        &mut self,
        constants: &ElectionConstants,
        response: &BackupChallengeResponse,
    ) -> Result<(), Error> {
        self.require_state(CeremonyState::BackupsExchanged)?;
        let owner = self
            .public_keys
            .get(&response.owner_id)
            .ok_or_else(|| Error::UnknownGuardian(response.owner_id.clone()))?;
        if !response.verify(constants, owner) {
            return Err(ValidationError::BackupVerificationFailed {
                owner_id: response.owner_id.clone(),
                designated_id: response.designated_id.clone(),
            }
            .into());
        }
        self.unresolved_failures.retain(|(owner_id, designated_id)| {
            owner_id != &response.owner_id || designated_id != &response.designated_id
        });
        self.advance_if_verified();
        Ok(())
    }

    fn advance_if_verified(&mut self) {
        if self.verifications_recorded == self.expected_backups()
            && self.unresolved_failures.is_empty()
        {
            self.state = CeremonyState::BackupsVerified;
        }
    }

    /// Completion: the joint key is the product of every guardian's election
    /// public key; the commitment hash binds every coefficient commitment.
    pub fn publish_joint_key(
        &mut self,
        constants: &ElectionConstants,
    ) -> Result<JointKey, Error> {
        self.require_state(CeremonyState::BackupsVerified)?;
        let joint_public_key = combine_public_keys(
            constants,
            self.public_keys
                .values()
                .map(|keys| keys.election_public_key()),
        );
        let commitment_lists: Vec<HashInput> = self
            .public_keys
            .values()
            .map(|keys| keys.coefficient_commitments().hash_input())
            .collect();
        let commitment_hash = hash_elems!(constants; commitment_lists);
        self.state = CeremonyState::JointKeyComputed;
        Ok(JointKey {
            joint_public_key,
            commitment_hash,
        })
    }
}
