//! An independent verifier over the published election record.
//!
//! Re-derives every hash and re-checks every proof from the record alone,
//! without any secret material: guardian possession proofs and the joint
//! key, ballot hash chains and selection/contest proofs, tally
//! accumulation, and the decryption shares behind each announced result.

use num_bigint::BigUint;

use crate::decryption::verify_selection_share;
use crate::encrypt::placeholder_descriptions;
use crate::hash_elems;
use crate::*;

/// Everything an election publishes. A verifier needs nothing else.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionRecord {
    pub constants: ElectionConstants,
    pub manifest: Manifest,
    pub context: ElectionContext,
    /// In ceremony announcement order; the commitment hash depends on it.
    pub guardian_keys: Vec<PublicKeySet>,
    pub submitted_ballots: Vec<SubmittedBallot>,
    pub ciphertext_tally: CiphertextTally,
    pub plaintext_tally: PlaintextTally,
    /// Individually decrypted spoiled ballots, keyed off their ballot ids.
    pub spoiled_ballots: Vec<PlaintextTally>,
}

pub fn verify_election_record(record: &ElectionRecord) -> Result<(), ValidationError> {
    verify_guardian_keys(record)?;
    verify_context(record)?;
    for submitted in &record.submitted_ballots {
        verify_ballot(record, &submitted.ballot)?;
    }
    verify_tally_accumulation(record)?;
    verify_decryption(record, &record.ciphertext_tally.object_id, &record.plaintext_tally)?;
    verify_spoiled_ballots(record)?;
    Ok(())
}

fn verify_guardian_keys(record: &ElectionRecord) -> Result<(), ValidationError> {
    let constants = &record.constants;
    for keys in &record.guardian_keys {
        for (index, proof) in keys.coefficient_proofs.iter().enumerate() {
            if !proof.is_valid(constants) {
                return Err(ValidationError::SchnorrProofInvalid {
                    guardian_id: keys.owner_id.clone(),
                    index,
                });
            }
        }
    }

    let joint = combine_public_keys(
        constants,
        record.guardian_keys.iter().map(|k| k.election_public_key()),
    );
    if joint != record.context.joint_public_key {
        return Err(ValidationError::JointKeyMismatch);
    }
    let commitment_lists: Vec<HashInput> = record
        .guardian_keys
        .iter()
        .map(|keys| keys.coefficient_commitments().hash_input())
        .collect();
    if hash_elems!(constants; commitment_lists) != record.context.commitment_hash {
        return Err(ValidationError::JointKeyMismatch);
    }
    Ok(())
}

fn verify_context(record: &ElectionRecord) -> Result<(), ValidationError> {
    let constants = &record.constants;
    let context = &record.context;
    let manifest_hash = record.manifest.crypto_hash(constants);
    let base_hash = hash_elems!(constants;
        constants.large_prime, constants.small_prime, constants.generator,
        context.number_of_guardians, context.quorum, manifest_hash);
    let extended = hash_elems!(constants; base_hash, context.commitment_hash);
    let consistent = manifest_hash == context.manifest_hash
        && base_hash == context.crypto_base_hash
        && extended == context.crypto_extended_base_hash;
    if !consistent {
        return Err(ValidationError::BaseHashMismatch);
    }
    Ok(())
}

fn verify_ballot(
    record: &ElectionRecord,
    ballot: &EncryptedBallot<NonceStripped>,
) -> Result<(), ValidationError> {
    let constants = &record.constants;
    let context = &record.context;
    if ballot.manifest_hash != context.manifest_hash {
        return Err(ValidationError::HashMismatch {
            object_id: ballot.object_id.clone(),
        });
    }

    for contest in &ballot.contests {
        let description = record
            .manifest
            .contest(&contest.object_id)
            .ok_or_else(|| ValidationError::HashMismatch {
                object_id: contest.object_id.clone(),
            })?;
        if contest.description_hash != description.crypto_hash(constants) {
            return Err(ValidationError::HashMismatch {
                object_id: contest.object_id.clone(),
            });
        }

        let placeholders = placeholder_descriptions(description);
        for selection in &contest.selections {
            // every selection's description hash must trace back to the
            // manifest, placeholders to their synthetic descriptions
            let expected_description_hash = if selection.is_placeholder {
                placeholders
                    .iter()
                    .find(|p| p.object_id == selection.object_id)
                    .map(|p| p.crypto_hash(constants))
            } else {
                description
                    .selection(&selection.object_id)
                    .map(|d| d.crypto_hash(constants))
            };
            if expected_description_hash.as_ref() != Some(&selection.description_hash) {
                return Err(ValidationError::HashMismatch {
                    object_id: selection.object_id.clone(),
                });
            }
            if selection.crypto_hash != selection.recompute_crypto_hash(constants) {
                return Err(ValidationError::HashMismatch {
                    object_id: selection.object_id.clone(),
                });
            }
            if !selection.proof.is_valid(
                constants,
                &selection.ciphertext,
                &context.joint_public_key,
                &context.crypto_extended_base_hash,
            ) {
                return Err(ValidationError::SelectionProofInvalid {
                    object_id: selection.object_id.clone(),
                });
            }
        }

        if contest.crypto_hash != contest.recompute_crypto_hash(constants) {
            return Err(ValidationError::HashMismatch {
                object_id: contest.object_id.clone(),
            });
        }
        let limit_ok = contest.proof.constant == description.votes_allowed
            && contest.proof.is_valid(
                constants,
                &contest.aggregate_ciphertext(constants),
                &context.joint_public_key,
                &context.crypto_extended_base_hash,
            );
        if !limit_ok {
            return Err(ValidationError::ContestProofInvalid {
                object_id: contest.object_id.clone(),
            });
        }
    }

    let hashes_ok = ballot.crypto_hash == ballot.recompute_crypto_hash(constants)
        && ballot.tracking_code == ballot.recompute_tracking_code(constants);
    if !hashes_ok {
        return Err(ValidationError::HashMismatch {
            object_id: ballot.object_id.clone(),
        });
    }
    Ok(())
}

fn verify_tally_accumulation(record: &ElectionRecord) -> Result<(), ValidationError> {
    let constants = &record.constants;
    let mut recomputed = CiphertextTally::new(
        &record.ciphertext_tally.object_id,
        constants,
        &record.manifest,
    );
    for submitted in &record.submitted_ballots {
        recomputed.accumulate(constants, submitted).map_err(|_| {
            ValidationError::TallyMismatch {
                object_id: submitted.ballot.object_id.clone(),
            }
        })?;
    }
    if recomputed != record.ciphertext_tally {
        return Err(ValidationError::TallyMismatch {
            object_id: record.ciphertext_tally.object_id.clone(),
        });
    }
    Ok(())
}

/// Check the decryption of one slot set (the tally, or one spoiled ballot)
/// against its ciphertexts.
fn verify_decrypted_selection(
    record: &ElectionRecord,
    ciphertext: &ElGamalCiphertext,
    selection: &PlaintextTallySelection,
) -> Result<(), ValidationError> {
    let constants = &record.constants;
    let context = &record.context;
    if &selection.message != ciphertext {
        return Err(ValidationError::TallyMismatch {
            object_id: selection.object_id.clone(),
        });
    }
    if (selection.shares.len() as u32) < context.number_of_guardians {
        return Err(ValidationError::DecryptionMismatch {
            object_id: selection.object_id.clone(),
        });
    }

    for share in &selection.shares {
        // every share verifies against the owning guardian's published key
        // set; recovered shares rederive recovery keys from its commitments
        let owner_keys = record
            .guardian_keys
            .iter()
            .find(|keys| keys.owner_id == share.guardian_id)
            .ok_or_else(|| ValidationError::DecryptionProofInvalid {
                object_id: share.object_id.clone(),
                guardian_id: share.guardian_id.clone(),
            })?;
        verify_selection_share(
            constants,
            share,
            owner_keys,
            ciphertext,
            &context.crypto_extended_base_hash,
        )
        .map_err(|_| ValidationError::DecryptionProofInvalid {
            object_id: share.object_id.clone(),
            guardian_id: share.guardian_id.clone(),
        })?;
    }

    // B == g^t * prod(shares)
    let product = constants.mult_many_p(selection.shares.iter().map(|share| &share.share));
    let tally_q = constants.reduce_to_q(BigUint::from(selection.tally));
    let value = constants.g_pow_p(&tally_q);
    let consistent = value == selection.value
        && constants.mult_p(&value, &product) == ciphertext.data;
    if !consistent {
        return Err(ValidationError::DecryptionMismatch {
            object_id: selection.object_id.clone(),
        });
    }
    Ok(())
}

fn verify_decryption(
    record: &ElectionRecord,
    object_id: &str,
    plaintext: &PlaintextTally,
) -> Result<(), ValidationError> {
    if plaintext.object_id != object_id
        || plaintext.contests.len() != record.ciphertext_tally.contests.len()
    {
        return Err(ValidationError::DecryptionMismatch {
            object_id: object_id.to_string(),
        });
    }
    for (contest_id, tally_contest) in &record.ciphertext_tally.contests {
        let decrypted = plaintext.contests.get(contest_id).ok_or_else(|| {
            ValidationError::DecryptionMismatch {
                object_id: contest_id.clone(),
            }
        })?;
        for (selection_id, slot) in &tally_contest.selections {
            let selection = decrypted.selections.get(selection_id).ok_or_else(|| {
                ValidationError::DecryptionMismatch {
                    object_id: selection_id.clone(),
                }
            })?;
            verify_decrypted_selection(record, &slot.ciphertext, selection)?;
        }
    }
    Ok(())
}

fn verify_spoiled_ballots(record: &ElectionRecord) -> Result<(), ValidationError> {
    for plaintext in &record.spoiled_ballots {
        let submitted = record
            .submitted_ballots
            .iter()
            .find(|s| s.ballot.object_id == plaintext.object_id)
            .ok_or_else(|| ValidationError::DecryptionMismatch {
                object_id: plaintext.object_id.clone(),
            })?;
        if submitted.is_cast() {
            return Err(ValidationError::DecryptionMismatch {
                object_id: plaintext.object_id.clone(),
            });
        }
        for contest in &submitted.ballot.contests {
            let decrypted = plaintext.contests.get(&contest.object_id).ok_or_else(|| {
                ValidationError::DecryptionMismatch {
                    object_id: contest.object_id.clone(),
                }
            })?;
            for selection in contest.selections.iter().filter(|s| !s.is_placeholder) {
                let value = decrypted
                    .selections
                    .get(&selection.object_id)
                    .ok_or_else(|| ValidationError::DecryptionMismatch {
                        object_id: selection.object_id.clone(),
                    })?;
                verify_decrypted_selection(record, &selection.ciphertext, value)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::two_candidate_manifest;
    use crate::encrypt::{ballot_for, encrypt_ballot};

    /// Run a 2-of-2 election end to end and publish the record.
    fn published_record() -> ElectionRecord {
        let c = ElectionConstants::standard();
        let manifest = two_candidate_manifest();
        let mut rng = rand::thread_rng();
        let details = CeremonyDetails {
            number_of_guardians: 2,
            quorum: 2,
        };

        let mut guardians: Vec<Guardian> = (1u32..=2)
            .map(|i| Guardian::new(&c, &format!("guardian-{}", i), i, details, &mut rng).unwrap())
            .collect();
        let mut ceremony = KeyCeremony::new(details);
        let all_keys: Vec<PublicKeySet> = guardians.iter().map(|g| g.share_keys()).collect();
        for keys in &all_keys {
            ceremony.announce(&c, keys.clone()).unwrap();
        }
        for guardian in guardians.iter_mut() {
            for keys in &all_keys {
                if keys.owner_id != guardian.id() {
                    guardian.receive_keys(&c, keys.clone()).unwrap();
                }
            }
        }
        let ids: Vec<String> = guardians.iter().map(|g| g.id().to_string()).collect();
        let mut backups = Vec::new();
        for guardian in guardians.iter_mut() {
            for id in &ids {
                if id != guardian.id() {
                    backups.push(guardian.send_partial_key_backup(&c, id, &mut rng).unwrap());
                }
            }
        }
        for backup in &backups {
            ceremony.record_backup(backup).unwrap();
        }
        for backup in &backups {
            let designated = guardians
                .iter_mut()
                .find(|g| g.id() == backup.designated_id)
                .unwrap();
            let verification = designated.verify_partial_key_backup(&c, backup).unwrap();
            ceremony.record_verification(verification).unwrap();
        }
        let joint_key = ceremony.publish_joint_key(&c).unwrap();
        let context = ElectionContext::new(&c, 2, 2, &joint_key, &manifest);

        let submitted: Vec<SubmittedBallot> = [
            ("ballot-1", "mayor-alice", BallotState::Cast),
            ("ballot-2", "mayor-bob", BallotState::Cast),
            ("ballot-3", "mayor-alice", BallotState::Spoiled),
        ]
        .iter()
        .map(|(id, choice, state)| {
            encrypt_ballot(
                &c,
                &manifest,
                &context,
                &ballot_for(id, choice),
                &c.rand_q(&mut rng),
                &ElementModQ::zero(),
                1000,
            )
            .unwrap()
            .submit(*state)
        })
        .collect();

        let mut tally = CiphertextTally::new("tally", &c, &manifest);
        for ballot in &submitted {
            tally.accumulate(&c, ballot).unwrap();
        }

        let shares: Vec<DecryptionShare> = guardians
            .iter()
            .map(|g| {
                g.partially_decrypt_tally(&c, &tally, &context.crypto_extended_base_hash, &mut rng)
            })
            .collect();
        let table = DiscreteLogTable::new(&c, 2);
        let plaintext_tally =
            decrypt_tally(&c, &tally, &shares, &all_keys, &context, &table).unwrap();

        let spoiled = &submitted[2].ballot;
        let spoiled_shares: Vec<DecryptionShare> = guardians
            .iter()
            .map(|g| {
                g.partially_decrypt_ballot(
                    &c,
                    spoiled,
                    &context.crypto_extended_base_hash,
                    &mut rng,
                )
            })
            .collect();
        let spoiled_plaintext =
            decrypt_ballot(&c, spoiled, &spoiled_shares, &all_keys, &context, &table).unwrap();

        ElectionRecord {
            constants: c,
            manifest,
            context,
            guardian_keys: all_keys,
            submitted_ballots: submitted,
            ciphertext_tally: tally,
            plaintext_tally,
            spoiled_ballots: vec![spoiled_plaintext],
        }
    }

    #[test]
    fn honest_record_verifies() {
        let record = published_record();
        verify_election_record(&record).unwrap();
        // and the announced counts are right
        let contest = &record.plaintext_tally.contests["mayor"];
        assert_eq!(contest.selections["mayor-alice"].tally, 1);
        assert_eq!(contest.selections["mayor-bob"].tally, 1);
    }

    #[test]
    fn tampered_ballot_ciphertext_detected() {
        let mut record = published_record();
        let c = record.constants.clone();
        let selection = &mut record.submitted_ballots[0].ballot.contests[0].selections[0];
        selection.ciphertext.data = c.mult_p(
            &selection.ciphertext.data,
            &c.int_to_p(num_bigint::BigUint::from(4u8)).unwrap(),
        );
        match verify_election_record(&record) {
            Err(ValidationError::HashMismatch { .. }) => {}
            other => panic!("expected HashMismatch, got {:?}", other),
        }
    }

    #[test]
    fn selection_description_must_come_from_the_manifest() {
        let mut record = published_record();
        let c = record.constants.clone();
        // point one selection at a description the manifest never published,
        // then repair every downstream hash so only the manifest anchor can
        // catch it
        let ballot = &mut record.submitted_ballots[0].ballot;
        let contest = &mut ballot.contests[0];
        let selection = &mut contest.selections[0];
        selection.description_hash = hash_elems!(&c; "write-in-nobody");
        selection.crypto_hash = selection.recompute_crypto_hash(&c);
        contest.crypto_hash = contest.recompute_crypto_hash(&c);
        ballot.crypto_hash = ballot.recompute_crypto_hash(&c);
        ballot.tracking_code = ballot.recompute_tracking_code(&c);
        match verify_election_record(&record) {
            Err(ValidationError::HashMismatch { .. }) => {}
            other => panic!("expected HashMismatch, got {:?}", other),
        }
    }

    #[test]
    fn swapped_joint_key_detected() {
        let mut record = published_record();
        let c = record.constants.clone();
        let keypair = ElGamalKeyPair::random(&c, &mut rand::thread_rng());
        record.context.joint_public_key = keypair.public_key;
        match verify_election_record(&record) {
            Err(ValidationError::JointKeyMismatch) => {}
            other => panic!("expected JointKeyMismatch, got {:?}", other),
        }
    }

    #[test]
    fn dropped_ballot_detected_in_tally() {
        let mut record = published_record();
        // the record claims a tally the published ballots don't produce
        record.submitted_ballots.remove(1);
        match verify_election_record(&record) {
            Err(ValidationError::TallyMismatch { .. }) => {}
            other => panic!("expected TallyMismatch, got {:?}", other),
        }
    }

    #[test]
    fn misannounced_count_detected() {
        let mut record = published_record();
        let selection = record
            .plaintext_tally
            .contests
            .get_mut("mayor")
            .unwrap()
            .selections
            .get_mut("mayor-alice")
            .unwrap();
        selection.tally += 1;
        match verify_election_record(&record) {
            Err(ValidationError::DecryptionMismatch { .. }) => {}
            other => panic!("expected DecryptionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn record_survives_serialization() {
        let record = published_record();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ElectionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        verify_election_record(&parsed).unwrap();
    }
}
