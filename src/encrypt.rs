//! Ballot encryption.
//!
//! Every ciphertext nonce on a ballot derives deterministically from one
//! master nonce, so a voter who keeps the master nonce can re-derive the
//! whole ballot and check the published record. Contests are padded with
//! placeholder selections until exactly `votes_allowed` selections encrypt
//! 1, which is what lets the constant proof assert the selection limit.

use rayon::prelude::*;

use crate::hash_elems;
use crate::*;

/// The device a ballot was encrypted on; its hash seeds the tracking-code
/// chain for the session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptionDevice {
    pub device_id: u64,
    pub session_id: u64,
    pub launch_code: u64,
    pub location: String,
}

impl EncryptionDevice {
    pub fn crypto_hash(&self, constants: &ElectionConstants) -> ElementModQ {
        hash_elems!(constants;
            self.device_id, self.session_id, self.launch_code, self.location)
    }
}

fn encrypt_selection(
    constants: &ElectionConstants,
    description: &SelectionDescription,
    vote: u64,
    is_placeholder: bool,
    contest_nonce: &ElementModQ,
    public_key: &ElementModP,
    extended_base_hash: &ElementModQ,
) -> Result<EncryptedSelection<WithNonce>, Error> {
    let description_hash = description.crypto_hash(constants);
    let nonce_sequence = Nonces::new(constants, &description_hash, contest_nonce);
    let selection_nonce = nonce_sequence.get(constants, description.sequence_order as u64);
    let proof_seed = nonce_sequence.get(constants, 0);

    let ciphertext = elgamal_encrypt(constants, vote, &selection_nonce, public_key)?;
    let proof = DisjunctiveChaumPedersenProof::make(
        constants,
        &ciphertext,
        &selection_nonce,
        public_key,
        extended_base_hash,
        &proof_seed,
        vote,
    )?;
    let crypto_hash = hash_elems!(constants;
        description.object_id,
        description_hash,
        ciphertext.crypto_hash(constants));

    Ok(EncryptedSelection {
        object_id: description.object_id.clone(),
        sequence_order: description.sequence_order,
        description_hash,
        ciphertext,
        crypto_hash,
        is_placeholder,
        proof,
        nonce: selection_nonce,
    })
}

/// The synthetic descriptions for a contest's placeholder selections, with
/// sequence orders after every real selection.
pub(crate) fn placeholder_descriptions(contest: &ContestDescription) -> Vec<SelectionDescription> {
    let max_sequence_order = contest
        .selections
        .iter()
        .map(|selection| selection.sequence_order)
        .max()
        .unwrap_or(0);
    (0..contest.votes_allowed)
        .map(|i| {
            let object_id = format!("{}-placeholder-{}", contest.object_id, i);
            SelectionDescription {
                candidate_id: object_id.clone(),
                object_id,
                sequence_order: max_sequence_order + 1 + i as u32,
            }
        })
        .collect()
}

fn encrypt_contest(
    constants: &ElectionConstants,
    description: &ContestDescription,
    plaintext: Option<&PlaintextContest>,
    nonce_seed: &ElementModQ,
    public_key: &ElementModP,
    extended_base_hash: &ElementModQ,
) -> Result<EncryptedContest<WithNonce>, Error> {
    if let Some(contest) = plaintext {
        for selection in &contest.selections {
            if description.selection(&selection.object_id).is_none() {
                return Err(Error::UnknownSelection {
                    contest_id: description.object_id.clone(),
                    selection_id: selection.object_id.clone(),
                });
            }
        }
    }

    let vote_for = |selection_id: &str| -> u64 {
        plaintext
            .and_then(|contest| {
                contest
                    .selections
                    .iter()
                    .find(|selection| selection.object_id == selection_id)
            })
            .map(|selection| selection.vote)
            .unwrap_or(0)
    };
    let selected: u64 = description
        .selections
        .iter()
        .map(|selection| vote_for(&selection.object_id))
        .sum();
    if selected > description.votes_allowed {
        return Err(Error::SelectionLimitExceeded {
            contest_id: description.object_id.clone(),
            selected,
            limit: description.votes_allowed,
        });
    }

    let description_hash = description.crypto_hash(constants);
    let nonce_sequence = Nonces::new(constants, &description_hash, nonce_seed);
    let contest_nonce = nonce_sequence.get(constants, description.sequence_order as u64);
    let proof_seed = nonce_sequence.get(constants, 0);

    let mut selections = Vec::new();
    for selection in &description.selections {
        selections.push(encrypt_selection(
            constants,
            selection,
            vote_for(&selection.object_id),
            false,
            &contest_nonce,
            public_key,
            extended_base_hash,
        )?);
    }
    // pad with placeholders until exactly votes_allowed selections encrypt 1
    let mut filled = selected;
    for placeholder in &placeholder_descriptions(description) {
        let vote = if filled < description.votes_allowed { 1 } else { 0 };
        filled += vote;
        selections.push(encrypt_selection(
            constants,
            placeholder,
            vote,
            true,
            &contest_nonce,
            public_key,
            extended_base_hash,
        )?);
    }

    let aggregate = elgamal_add(constants, selections.iter().map(|s| &s.ciphertext));
    let aggregate_nonce = constants.sum_q(selections.iter().map(|s| &s.nonce));
    let proof = ConstantChaumPedersenProof::make(
        constants,
        &aggregate,
        &aggregate_nonce,
        description.votes_allowed,
        public_key,
        extended_base_hash,
        &proof_seed,
    );

    let selection_hashes: Vec<ElementModQ> = selections
        .iter()
        .map(|selection| selection.crypto_hash.clone())
        .collect();
    let crypto_hash = hash_elems!(constants;
        description.object_id, description_hash, selection_hashes);

    Ok(EncryptedContest {
        object_id: description.object_id.clone(),
        sequence_order: description.sequence_order,
        description_hash,
        selections,
        crypto_hash,
        proof,
        nonce: contest_nonce,
    })
}

/// Encrypt one ballot. Every contest in the manifest is encrypted, voted or
/// not; the whole derivation is a pure function of the master nonce.
pub fn encrypt_ballot(
    constants: &ElectionConstants,
    manifest: &Manifest,
    context: &ElectionContext,
    ballot: &PlaintextBallot,
    master_nonce: &ElementModQ,
    code_seed: &ElementModQ,
    timestamp: u64,
) -> Result<EncryptedBallot<WithNonce>, Error> {
    for contest in &ballot.contests {
        if manifest.contest(&contest.object_id).is_none() {
            return Err(Error::UnknownContest(contest.object_id.clone()));
        }
    }

    let nonce_seed = hash_elems!(constants;
        context.manifest_hash, ballot.object_id, master_nonce);

    let mut contests = Vec::with_capacity(manifest.contests.len());
    for description in &manifest.contests {
        let plaintext = ballot
            .contests
            .iter()
            .find(|contest| contest.object_id == description.object_id);
        contests.push(encrypt_contest(
            constants,
            description,
            plaintext,
            &nonce_seed,
            &context.joint_public_key,
            &context.crypto_extended_base_hash,
        )?);
    }

    let contest_hashes: Vec<ElementModQ> = contests
        .iter()
        .map(|contest| contest.crypto_hash.clone())
        .collect();
    let crypto_hash = hash_elems!(constants;
        ballot.object_id, context.manifest_hash, contest_hashes);
    let tracking_code = hash_elems!(constants; code_seed, timestamp, crypto_hash);

    Ok(EncryptedBallot {
        object_id: ballot.object_id.clone(),
        manifest_hash: context.manifest_hash.clone(),
        code_seed: code_seed.clone(),
        contests,
        crypto_hash,
        tracking_code,
        timestamp,
        nonce: master_nonce.clone(),
    })
}

/// Encrypt a session's ballots in parallel, then chain the tracking codes
/// in submission order starting from the device hash.
pub fn encrypt_ballots(
    constants: &ElectionConstants,
    manifest: &Manifest,
    context: &ElectionContext,
    device: &EncryptionDevice,
    ballots: &[(PlaintextBallot, ElementModQ)],
    timestamp: u64,
) -> Result<Vec<EncryptedBallot<WithNonce>>, Error> {
    let device_hash = device.crypto_hash(constants);
    let mut encrypted: Vec<EncryptedBallot<WithNonce>> = ballots
        .par_iter()
        .map(|(ballot, master_nonce)| {
            encrypt_ballot(
                constants,
                manifest,
                context,
                ballot,
                master_nonce,
                &device_hash,
                timestamp,
            )
        })
        .collect::<Result<_, _>>()?;

    // the ciphertexts are independent of the code seed, so the chain can be
    // stitched after the parallel pass
    let mut code_seed = device_hash;
    for ballot in encrypted.iter_mut() {
        ballot.code_seed = code_seed;
        ballot.tracking_code = ballot.recompute_tracking_code(constants);
        code_seed = ballot.tracking_code.clone();
    }
    Ok(encrypted)
}

/// Single-keypair context for tests that don't need a full key ceremony.
#[cfg(test)]
pub(crate) fn test_context(
    constants: &ElectionConstants,
    manifest: &Manifest,
    keypair: &ElGamalKeyPair,
) -> ElectionContext {
    let joint_key = JointKey {
        joint_public_key: keypair.public_key.clone(),
        commitment_hash: hash_elems!(constants; keypair.public_key),
    };
    ElectionContext::new(constants, 1, 1, &joint_key, manifest)
}

#[cfg(test)]
pub(crate) fn ballot_for(ballot_id: &str, selection_id: &str) -> PlaintextBallot {
    PlaintextBallot {
        object_id: ballot_id.to_string(),
        contests: vec![PlaintextContest {
            object_id: "mayor".to_string(),
            selections: vec![PlaintextSelection {
                object_id: selection_id.to_string(),
                vote: 1,
            }],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::two_candidate_manifest;

    fn setup() -> (ElectionConstants, Manifest, ElGamalKeyPair, ElectionContext) {
        let c = ElectionConstants::standard();
        let manifest = two_candidate_manifest();
        let keypair = ElGamalKeyPair::random(&c, &mut rand::thread_rng());
        let context = test_context(&c, &manifest, &keypair);
        (c, manifest, keypair, context)
    }

    #[test]
    fn ballot_encrypts_with_placeholders_and_valid_proofs() {
        let (c, manifest, _, context) = setup();
        let master_nonce = c.rand_q(&mut rand::thread_rng());
        let ballot = ballot_for("ballot-1", "mayor-alice");
        let encrypted = encrypt_ballot(
            &c, &manifest, &context, &ballot, &master_nonce, &ElementModQ::zero(), 1000,
        )
        .unwrap();

        assert_eq!(encrypted.contests.len(), 1);
        let contest = &encrypted.contests[0];
        // 2 real selections + votes_allowed placeholders
        assert_eq!(contest.selections.len(), 3);
        assert_eq!(
            contest.selections.iter().filter(|s| s.is_placeholder).count(),
            1
        );
        for selection in &contest.selections {
            assert!(selection.proof.is_valid(
                &c,
                &selection.ciphertext,
                &context.joint_public_key,
                &context.crypto_extended_base_hash,
            ));
        }
        assert!(contest.proof.is_valid(
            &c,
            &contest.aggregate_ciphertext(&c),
            &context.joint_public_key,
            &context.crypto_extended_base_hash,
        ));
        assert_eq!(encrypted.crypto_hash, encrypted.recompute_crypto_hash(&c));
        assert_eq!(
            encrypted.tracking_code,
            encrypted.recompute_tracking_code(&c)
        );
    }

    #[test]
    fn unvoted_contest_fills_with_placeholder_votes() {
        let (c, manifest, keypair, context) = setup();
        let master_nonce = c.rand_q(&mut rand::thread_rng());
        let blank = PlaintextBallot {
            object_id: "ballot-blank".to_string(),
            contests: vec![],
        };
        let encrypted = encrypt_ballot(
            &c, &manifest, &context, &blank, &master_nonce, &ElementModQ::zero(), 1000,
        )
        .unwrap();

        // the placeholder absorbs the whole selection limit
        let table = DiscreteLogTable::new(&c, 1);
        let contest = &encrypted.contests[0];
        let placeholder = contest.selections.last().unwrap();
        assert!(placeholder.is_placeholder);
        assert_eq!(
            placeholder
                .ciphertext
                .decrypt(&c, &keypair.secret_key, &table)
                .unwrap(),
            1
        );
        for selection in contest.selections.iter().filter(|s| !s.is_placeholder) {
            assert_eq!(
                selection
                    .ciphertext
                    .decrypt(&c, &keypair.secret_key, &table)
                    .unwrap(),
                0
            );
        }
    }

    #[test]
    fn overvote_rejected() {
        let (c, manifest, _, context) = setup();
        let master_nonce = c.rand_q(&mut rand::thread_rng());
        let overvote = PlaintextBallot {
            object_id: "ballot-over".to_string(),
            contests: vec![PlaintextContest {
                object_id: "mayor".to_string(),
                selections: vec![
                    PlaintextSelection {
                        object_id: "mayor-alice".to_string(),
                        vote: 1,
                    },
                    PlaintextSelection {
                        object_id: "mayor-bob".to_string(),
                        vote: 1,
                    },
                ],
            }],
        };
        match encrypt_ballot(
            &c, &manifest, &context, &overvote, &master_nonce, &ElementModQ::zero(), 1000,
        ) {
            Err(Error::SelectionLimitExceeded {
                selected: 2,
                limit: 1,
                ..
            }) => {}
            other => panic!("expected SelectionLimitExceeded, got {:?}", other),
        }
    }

    #[test]
    fn unknown_ids_rejected() {
        let (c, manifest, _, context) = setup();
        let master_nonce = c.rand_q(&mut rand::thread_rng());

        let mut bad_contest = ballot_for("ballot-x", "mayor-alice");
        bad_contest.contests[0].object_id = "senate".to_string();
        assert!(matches!(
            encrypt_ballot(
                &c, &manifest, &context, &bad_contest, &master_nonce,
                &ElementModQ::zero(), 1000,
            ),
            Err(Error::UnknownContest(_))
        ));

        let bad_selection = ballot_for("ballot-y", "mayor-carol");
        assert!(matches!(
            encrypt_ballot(
                &c, &manifest, &context, &bad_selection, &master_nonce,
                &ElementModQ::zero(), 1000,
            ),
            Err(Error::UnknownSelection { .. })
        ));
    }

    #[test]
    fn encryption_is_deterministic_in_the_master_nonce() {
        let (c, manifest, _, context) = setup();
        let master_nonce = c.rand_q(&mut rand::thread_rng());
        let ballot = ballot_for("ballot-1", "mayor-bob");
        let first = encrypt_ballot(
            &c, &manifest, &context, &ballot, &master_nonce, &ElementModQ::zero(), 1000,
        )
        .unwrap();
        let second = encrypt_ballot(
            &c, &manifest, &context, &ballot, &master_nonce, &ElementModQ::zero(), 1000,
        )
        .unwrap();
        assert_eq!(first, second);

        let other_nonce = c.rand_q(&mut rand::thread_rng());
        let third = encrypt_ballot(
            &c, &manifest, &context, &ballot, &other_nonce, &ElementModQ::zero(), 1000,
        )
        .unwrap();
        assert_ne!(first.crypto_hash, third.crypto_hash);
    }

    #[test]
    fn voter_can_redecrypt_with_the_derived_nonce() {
        let (c, manifest, _, context) = setup();
        let master_nonce = c.rand_q(&mut rand::thread_rng());
        let ballot = ballot_for("ballot-1", "mayor-alice");
        let encrypted = encrypt_ballot(
            &c, &manifest, &context, &ballot, &master_nonce, &ElementModQ::zero(), 1000,
        )
        .unwrap();

        let table = DiscreteLogTable::new(&c, 1);
        for selection in &encrypted.contests[0].selections {
            let expected = if selection.is_placeholder {
                0 // alice got the vote, so the placeholder stays empty
            } else {
                ballot.vote("mayor", &selection.object_id)
            };
            assert_eq!(
                selection
                    .ciphertext
                    .decrypt_with_nonce(&c, &context.joint_public_key, &selection.nonce, &table)
                    .unwrap(),
                expected
            );
        }
    }

    #[test]
    fn tracking_codes_chain_across_a_session() {
        let (c, manifest, _, context) = setup();
        let mut rng = rand::thread_rng();
        let device = EncryptionDevice {
            device_id: 1,
            session_id: 42,
            launch_code: 7,
            location: "precinct-9".to_string(),
        };
        let ballots = vec![
            (ballot_for("ballot-1", "mayor-alice"), c.rand_q(&mut rng)),
            (ballot_for("ballot-2", "mayor-bob"), c.rand_q(&mut rng)),
            (ballot_for("ballot-3", "mayor-bob"), c.rand_q(&mut rng)),
        ];
        let encrypted =
            encrypt_ballots(&c, &manifest, &context, &device, &ballots, 1000).unwrap();

        assert_eq!(encrypted[0].code_seed, device.crypto_hash(&c));
        for pair in encrypted.windows(2) {
            assert_eq!(pair[1].code_seed, pair[0].tracking_code);
            assert_eq!(pair[1].tracking_code, pair[1].recompute_tracking_code(&c));
        }
    }
}
