//! Quorum decryption of the tally and of spoiled ballots.
//!
//! Each available guardian publishes one decryption share per tally slot,
//! proved against its election public key. For a missing guardian, every
//! available guardian publishes a compensated share computed from its
//! verified backup of the missing guardian's polynomial; any quorum of
//! compensated shares reconstructs the missing share by Lagrange
//! interpolation. Once every guardian is represented, the slot plaintext is
//! `data / prod(shares)` looked up in the discrete log table.

use indexmap::IndexMap;
use num_bigint::BigUint;
use rand::{CryptoRng, Rng};

use crate::*;

/// One guardian's decryption share for one tally slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelectionDecryptionShare {
    pub object_id: String,
    pub guardian_id: String,
    /// `pad^P(x)` for the guardian's secret, or the reconstruction of it.
    pub share: ElementModP,
    pub proof: ShareProof,
}

/// How a selection share is justified: directly by the guardian, or
/// reconstructed from a quorum of compensating guardians.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ShareProof {
    Proof(ChaumPedersenProof),
    /// The compensated shares the reconstruction was interpolated from,
    /// keyed by compensating guardian id.
    Recovered(IndexMap<String, CompensatedSelectionShare>),
}

/// One guardian's contribution toward a missing guardian's share of one
/// slot, proved against the recovery public key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompensatedSelectionShare {
    pub object_id: String,
    pub guardian_id: String,
    pub x_coordinate: u32,
    pub missing_guardian_id: String,
    /// `pad^P_missing(x_guardian)`.
    pub share: ElementModP,
    /// `g^P_missing(x_guardian)`, computed from public commitments alone.
    pub recovery_public_key: ElementModP,
    pub proof: ChaumPedersenProof,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContestDecryptionShare {
    pub object_id: String,
    pub selections: IndexMap<String, SelectionDecryptionShare>,
}

/// A guardian's shares for every slot of the tally (or of one ballot).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecryptionShare {
    pub guardian_id: String,
    pub public_key: ElementModP,
    pub contests: IndexMap<String, ContestDecryptionShare>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompensatedContestShare {
    pub object_id: String,
    pub selections: IndexMap<String, CompensatedSelectionShare>,
}

/// One guardian's compensated shares for every slot, on behalf of one
/// missing guardian.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompensatedDecryptionShare {
    pub guardian_id: String,
    pub x_coordinate: u32,
    pub missing_guardian_id: String,
    pub recovery_public_key: ElementModP,
    pub contests: IndexMap<String, CompensatedContestShare>,
}

/// The decrypted counterpart of a [`CiphertextTally`] or of one spoiled
/// ballot, with everything needed to re-verify it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaintextTally {
    pub object_id: String,
    pub contests: IndexMap<String, PlaintextTallyContest>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaintextTallyContest {
    pub object_id: String,
    pub selections: IndexMap<String, PlaintextTallySelection>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaintextTallySelection {
    pub object_id: String,
    pub tally: u64,
    /// `g^tally`, the value actually recovered before the dlog lookup.
    pub value: ElementModP,
    pub message: ElGamalCiphertext,
    pub shares: Vec<SelectionDecryptionShare>,
}

/// The slots of a tally or ballot in a uniform shape: contest id paired
/// with its non-placeholder (selection id, ciphertext) pairs.
type Slots<'a> = Vec<(String, Vec<(String, &'a ElGamalCiphertext)>)>;

fn tally_slots(tally: &CiphertextTally) -> Slots<'_> {
    tally
        .contests
        .values()
        .map(|contest| {
            let selections = contest
                .selections
                .values()
                .map(|selection| (selection.object_id.clone(), &selection.ciphertext))
                .collect();
            (contest.object_id.clone(), selections)
        })
        .collect()
}

fn ballot_slots(ballot: &EncryptedBallot<NonceStripped>) -> Slots<'_> {
    ballot
        .contests
        .iter()
        .map(|contest| {
            let selections = contest
                .selections
                .iter()
                .filter(|selection| !selection.is_placeholder)
                .map(|selection| (selection.object_id.clone(), &selection.ciphertext))
                .collect();
            (contest.object_id.clone(), selections)
        })
        .collect()
}

impl Guardian {
    fn share_for_slots<R: Rng + CryptoRng>(
        &self,
        constants: &ElectionConstants,
        slots: &Slots<'_>,
        extended_base_hash: &ElementModQ,
        rng: &mut R,
    ) -> DecryptionShare {
        let contests = slots
            .iter()
            .map(|(contest_id, selections)| {
                let selections = selections
                    .iter()
                    .map(|(selection_id, ciphertext)| {
                        let share = ciphertext.partial_decrypt(constants, self.secret());
                        let proof = ChaumPedersenProof::make(
                            constants,
                            ciphertext,
                            self.secret(),
                            &share,
                            extended_base_hash,
                            &constants.rand_q(rng),
                        );
                        (
                            selection_id.clone(),
                            SelectionDecryptionShare {
                                object_id: selection_id.clone(),
                                guardian_id: self.id().to_string(),
                                share,
                                proof: ShareProof::Proof(proof),
                            },
                        )
                    })
                    .collect();
                (
                    contest_id.clone(),
                    ContestDecryptionShare {
                        object_id: contest_id.clone(),
                        selections,
                    },
                )
            })
            .collect();
        DecryptionShare {
            guardian_id: self.id().to_string(),
            public_key: self.election_public_key().clone(),
            contests,
        }
    }

    pub fn partially_decrypt_tally<R: Rng + CryptoRng>(
        &self,
        constants: &ElectionConstants,
        tally: &CiphertextTally,
        extended_base_hash: &ElementModQ,
        rng: &mut R,
    ) -> DecryptionShare {
        self.share_for_slots(constants, &tally_slots(tally), extended_base_hash, rng)
    }

    pub fn partially_decrypt_ballot<R: Rng + CryptoRng>(
        &self,
        constants: &ElectionConstants,
        ballot: &EncryptedBallot<NonceStripped>,
        extended_base_hash: &ElementModQ,
        rng: &mut R,
    ) -> DecryptionShare {
        self.share_for_slots(constants, &ballot_slots(ballot), extended_base_hash, rng)
    }

    /// `g^P_missing(x_self)`, derived from the missing guardian's public
    /// commitments; compensated share proofs verify against this.
    pub fn recovery_public_key(
        &self,
        constants: &ElectionConstants,
        missing_guardian_id: &str,
    ) -> Result<ElementModP, Error> {
        let missing = self
            .public_key_set(missing_guardian_id)
            .ok_or_else(|| Error::MissingPublicKeys(missing_guardian_id.to_string()))?;
        Ok(compute_recovery_public_key(
            constants,
            self.x_coordinate(),
            &missing.coefficient_commitments(),
        ))
    }

    fn compensated_share_for_slots<R: Rng + CryptoRng>(
        &self,
        constants: &ElectionConstants,
        slots: &Slots<'_>,
        missing_guardian_id: &str,
        extended_base_hash: &ElementModQ,
        rng: &mut R,
    ) -> Result<CompensatedDecryptionShare, Error> {
        let coordinate = self
            .backup_coordinate(missing_guardian_id)
            .ok_or_else(|| Error::MissingBackup {
                guardian_id: self.id().to_string(),
                missing_guardian_id: missing_guardian_id.to_string(),
            })?
            .clone();
        let recovery_public_key = self.recovery_public_key(constants, missing_guardian_id)?;

        let contests = slots
            .iter()
            .map(|(contest_id, selections)| {
                let selections = selections
                    .iter()
                    .map(|(selection_id, ciphertext)| {
                        let share = constants.pow_p(&ciphertext.pad, &coordinate);
                        let proof = ChaumPedersenProof::make(
                            constants,
                            ciphertext,
                            &coordinate,
                            &share,
                            extended_base_hash,
                            &constants.rand_q(rng),
                        );
                        (
                            selection_id.clone(),
                            CompensatedSelectionShare {
                                object_id: selection_id.clone(),
                                guardian_id: self.id().to_string(),
                                x_coordinate: self.x_coordinate(),
                                missing_guardian_id: missing_guardian_id.to_string(),
                                share,
                                recovery_public_key: recovery_public_key.clone(),
                                proof,
                            },
                        )
                    })
                    .collect();
                (
                    contest_id.clone(),
                    CompensatedContestShare {
                        object_id: contest_id.clone(),
                        selections,
                    },
                )
            })
            .collect();

        Ok(CompensatedDecryptionShare {
            guardian_id: self.id().to_string(),
            x_coordinate: self.x_coordinate(),
            missing_guardian_id: missing_guardian_id.to_string(),
            recovery_public_key,
            contests,
        })
    }

    pub fn compensated_decrypt_tally<R: Rng + CryptoRng>(
        &self,
        constants: &ElectionConstants,
        tally: &CiphertextTally,
        missing_guardian_id: &str,
        extended_base_hash: &ElementModQ,
        rng: &mut R,
    ) -> Result<CompensatedDecryptionShare, Error> {
        self.compensated_share_for_slots(
            constants,
            &tally_slots(tally),
            missing_guardian_id,
            extended_base_hash,
            rng,
        )
    }

    pub fn compensated_decrypt_ballot<R: Rng + CryptoRng>(
        &self,
        constants: &ElectionConstants,
        ballot: &EncryptedBallot<NonceStripped>,
        missing_guardian_id: &str,
        extended_base_hash: &ElementModQ,
        rng: &mut R,
    ) -> Result<CompensatedDecryptionShare, Error> {
        self.compensated_share_for_slots(
            constants,
            &ballot_slots(ballot),
            missing_guardian_id,
            extended_base_hash,
            rng,
        )
    }
}

/// `g^P(x)` for the polynomial behind a guardian's published coefficient
/// commitments, computed from the commitments alone.
pub(crate) fn compute_recovery_public_key(
    constants: &ElectionConstants,
    x_coordinate: u32,
    commitments: &[ElementModP],
) -> ElementModP {
    let x_q = constants.reduce_to_q(BigUint::from(x_coordinate));
    let mut x_power = constants.reduce_to_q(BigUint::from(1u8));
    let mut key = ElementModP::one();
    for commitment in commitments {
        key = constants.mult_p(&key, &constants.pow_p(commitment, &x_power));
        x_power = constants.mult_q(&x_power, &x_q);
    }
    key
}

/// Interpolate a missing guardian's full decryption share from a quorum of
/// compensated shares.
pub fn reconstruct_decryption_share(
    constants: &ElectionConstants,
    missing_guardian_id: &str,
    missing_public_key: &ElementModP,
    compensated: &[&CompensatedDecryptionShare],
) -> Result<DecryptionShare, Error> {
    if compensated.is_empty() {
        return Err(Error::InsufficientGuardians {
            needed: 1,
            available: 0,
        });
    }
    let coordinates: Vec<u64> = compensated
        .iter()
        .map(|share| share.x_coordinate as u64)
        .collect();
    let mut weights = Vec::with_capacity(compensated.len());
    for (i, share) in compensated.iter().enumerate() {
        if share.missing_guardian_id != missing_guardian_id {
            return Err(Error::UnknownGuardian(share.missing_guardian_id.clone()));
        }
        let others: Vec<u64> = coordinates
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, &x)| x)
            .collect();
        weights.push(lagrange_coefficient(
            constants,
            share.x_coordinate as u64,
            &others,
        )?);
    }

    // every compensated share covers the same slots; use the first as the
    // slot index
    let mut contests = IndexMap::new();
    for (contest_id, contest) in &compensated[0].contests {
        let mut selections = IndexMap::new();
        for selection_id in contest.selections.keys() {
            let mut share = ElementModP::one();
            let mut parts = IndexMap::new();
            for (compensator, weight) in compensated.iter().zip(&weights) {
                let part = compensator
                    .contests
                    .get(contest_id)
                    .and_then(|c| c.selections.get(selection_id))
                    .ok_or_else(|| Error::UnknownSelection {
                        contest_id: contest_id.clone(),
                        selection_id: selection_id.clone(),
                    })?;
                share = constants.mult_p(&share, &constants.pow_p(&part.share, weight));
                parts.insert(compensator.guardian_id.clone(), part.clone());
            }
            selections.insert(
                selection_id.clone(),
                SelectionDecryptionShare {
                    object_id: selection_id.clone(),
                    guardian_id: missing_guardian_id.to_string(),
                    share,
                    proof: ShareProof::Recovered(parts),
                },
            );
        }
        contests.insert(
            contest_id.clone(),
            ContestDecryptionShare {
                object_id: contest_id.clone(),
                selections,
            },
        );
    }

    Ok(DecryptionShare {
        guardian_id: missing_guardian_id.to_string(),
        public_key: missing_public_key.clone(),
        contests,
    })
}

/// Check one guardian's share for one slot, whichever way it is justified.
/// `owner_keys` is the share owner's ceremony-published key set; recovered
/// shares verify their parts against recovery keys rederived from the
/// owner's coefficient commitments, never against keys the parts carry.
pub(crate) fn verify_selection_share(
    constants: &ElectionConstants,
    selection_share: &SelectionDecryptionShare,
    owner_keys: &PublicKeySet,
    ciphertext: &ElGamalCiphertext,
    extended_base_hash: &ElementModQ,
) -> Result<(), Error> {
    let invalid = || {
        Error::Validation(ValidationError::DecryptionProofInvalid {
            object_id: selection_share.object_id.clone(),
            guardian_id: selection_share.guardian_id.clone(),
        })
    };
    if selection_share.guardian_id != owner_keys.owner_id {
        return Err(invalid());
    }
    match &selection_share.proof {
        ShareProof::Proof(proof) => {
            if !proof.is_valid(
                constants,
                ciphertext,
                owner_keys.election_public_key(),
                &selection_share.share,
                extended_base_hash,
            ) {
                return Err(invalid());
            }
        }
        ShareProof::Recovered(parts) => {
            let commitments = owner_keys.coefficient_commitments();
            let coordinates: Vec<u64> =
                parts.values().map(|part| part.x_coordinate as u64).collect();
            let mut reconstructed = ElementModP::one();
            for part in parts.values() {
                if part.missing_guardian_id != owner_keys.owner_id {
                    return Err(invalid());
                }
                let recovery_key = compute_recovery_public_key(
                    constants,
                    part.x_coordinate,
                    &commitments,
                );
                if part.recovery_public_key != recovery_key {
                    return Err(invalid());
                }
                if !part.proof.is_valid(
                    constants,
                    ciphertext,
                    &recovery_key,
                    &part.share,
                    extended_base_hash,
                ) {
                    return Err(invalid());
                }
                let others: Vec<u64> = coordinates
                    .iter()
                    .copied()
                    .filter(|&x| x != part.x_coordinate as u64)
                    .collect();
                let weight =
                    lagrange_coefficient(constants, part.x_coordinate as u64, &others)?;
                reconstructed =
                    constants.mult_p(&reconstructed, &constants.pow_p(&part.share, &weight));
            }
            if reconstructed != selection_share.share {
                return Err(invalid());
            }
        }
    }
    Ok(())
}

fn decrypt_slots(
    constants: &ElectionConstants,
    object_id: &str,
    slots: &Slots<'_>,
    shares: &[DecryptionShare],
    guardian_keys: &[PublicKeySet],
    context: &ElectionContext,
    table: &DiscreteLogTable,
) -> Result<PlaintextTally, Error> {
    if (shares.len() as u32) < context.number_of_guardians {
        return Err(Error::InsufficientGuardians {
            needed: context.number_of_guardians,
            available: shares.len() as u32,
        });
    }
    let mut owner_keys = Vec::with_capacity(shares.len());
    for share in shares {
        let keys = guardian_keys
            .iter()
            .find(|keys| keys.owner_id == share.guardian_id)
            .ok_or_else(|| Error::MissingPublicKeys(share.guardian_id.clone()))?;
        if &share.public_key != keys.election_public_key() {
            return Err(Error::Validation(ValidationError::DecryptionProofInvalid {
                object_id: object_id.to_string(),
                guardian_id: share.guardian_id.clone(),
            }));
        }
        owner_keys.push(keys);
    }

    let mut contests = IndexMap::new();
    for (contest_id, selections) in slots {
        let mut decrypted_selections = IndexMap::new();
        for (selection_id, ciphertext) in selections {
            let mut selection_shares = Vec::with_capacity(shares.len());
            for (share, keys) in shares.iter().zip(&owner_keys) {
                let selection_share = share
                    .contests
                    .get(contest_id)
                    .and_then(|contest| contest.selections.get(selection_id))
                    .ok_or_else(|| Error::UnknownSelection {
                        contest_id: contest_id.clone(),
                        selection_id: selection_id.clone(),
                    })?;
                verify_selection_share(
                    constants,
                    selection_share,
                    keys,
                    ciphertext,
                    &context.crypto_extended_base_hash,
                )?;
                selection_shares.push(selection_share.clone());
            }
            let product = constants
                .mult_many_p(selection_shares.iter().map(|share| &share.share));
            let tally = ciphertext.decrypt_known_product(constants, &product, table)?;
            decrypted_selections.insert(
                selection_id.clone(),
                PlaintextTallySelection {
                    object_id: selection_id.clone(),
                    tally,
                    value: constants.div_p(&ciphertext.data, &product)?,
                    message: (*ciphertext).clone(),
                    shares: selection_shares,
                },
            );
        }
        contests.insert(
            contest_id.clone(),
            PlaintextTallyContest {
                object_id: contest_id.clone(),
                selections: decrypted_selections,
            },
        );
    }

    Ok(PlaintextTally {
        object_id: object_id.to_string(),
        contests,
    })
}

/// Decrypt the tally from one share per guardian, verifying every share
/// proof against the ceremony-published key sets along the way.
pub fn decrypt_tally(
    constants: &ElectionConstants,
    tally: &CiphertextTally,
    shares: &[DecryptionShare],
    guardian_keys: &[PublicKeySet],
    context: &ElectionContext,
    table: &DiscreteLogTable,
) -> Result<PlaintextTally, Error> {
    decrypt_slots(
        constants,
        &tally.object_id,
        &tally_slots(tally),
        shares,
        guardian_keys,
        context,
        table,
    )
}

/// Decrypt one spoiled ballot the same way the tally is decrypted.
pub fn decrypt_ballot(
    constants: &ElectionConstants,
    ballot: &EncryptedBallot<NonceStripped>,
    shares: &[DecryptionShare],
    guardian_keys: &[PublicKeySet],
    context: &ElectionContext,
    table: &DiscreteLogTable,
) -> Result<PlaintextTally, Error> {
    decrypt_slots(
        constants,
        &ballot.object_id,
        &ballot_slots(ballot),
        shares,
        guardian_keys,
        context,
        table,
    )
}

/// Collects shares from available guardians, reconstructs shares for
/// missing ones, and runs the final decryption once every guardian is
/// represented.
pub struct DecryptionMediator<'a> {
    constants: &'a ElectionConstants,
    context: &'a ElectionContext,
    tally: &'a CiphertextTally,
    guardian_keys: &'a [PublicKeySet],
    shares: IndexMap<String, DecryptionShare>,
    compensated: Vec<CompensatedDecryptionShare>,
}

impl<'a> DecryptionMediator<'a> {
    pub fn new(
        constants: &'a ElectionConstants,
        context: &'a ElectionContext,
        tally: &'a CiphertextTally,
        guardian_keys: &'a [PublicKeySet],
    ) -> Self {
        DecryptionMediator {
            constants,
            context,
            tally,
            guardian_keys,
            shares: IndexMap::new(),
            compensated: Vec::new(),
        }
    }

    pub fn announce(&mut self, share: DecryptionShare) -> Result<(), Error> {
        if self.shares.contains_key(&share.guardian_id) {
            return Err(Error::DuplicateGuardianId(share.guardian_id));
        }
        self.shares.insert(share.guardian_id.clone(), share);
        Ok(())
    }

    pub fn announce_compensated(
        &mut self,
        share: CompensatedDecryptionShare,
    ) -> Result<(), Error> {
        if self.compensated.iter().any(|existing| {
            existing.guardian_id == share.guardian_id
                && existing.missing_guardian_id == share.missing_guardian_id
        }) {
            return Err(Error::DuplicateGuardianId(share.guardian_id));
        }
        self.compensated.push(share);
        Ok(())
    }

    /// Reconstruct the named missing guardian's share from the compensated
    /// shares announced so far. Requires at least a quorum of them; the
    /// missing guardian's public key comes from its ceremony-published set.
    pub fn reconstruct_missing(&mut self, missing_guardian_id: &str) -> Result<(), Error> {
        if self.shares.contains_key(missing_guardian_id) {
            return Err(Error::DuplicateGuardianId(missing_guardian_id.to_string()));
        }
        let missing_keys = self
            .guardian_keys
            .iter()
            .find(|keys| keys.owner_id == missing_guardian_id)
            .ok_or_else(|| Error::MissingPublicKeys(missing_guardian_id.to_string()))?;
        let parts: Vec<&CompensatedDecryptionShare> = self
            .compensated
            .iter()
            .filter(|share| share.missing_guardian_id == missing_guardian_id)
            .collect();
        if (parts.len() as u32) < self.context.quorum {
            return Err(Error::InsufficientGuardians {
                needed: self.context.quorum,
                available: parts.len() as u32,
            });
        }
        let reconstructed = reconstruct_decryption_share(
            self.constants,
            missing_guardian_id,
            missing_keys.election_public_key(),
            &parts,
        )?;
        self.shares
            .insert(missing_guardian_id.to_string(), reconstructed);
        Ok(())
    }

    pub fn decrypt(&self, table: &DiscreteLogTable) -> Result<PlaintextTally, Error> {
        let shares: Vec<DecryptionShare> = self.shares.values().cloned().collect();
        decrypt_tally(
            self.constants,
            self.tally,
            &shares,
            self.guardian_keys,
            self.context,
            table,
        )
    }
}
