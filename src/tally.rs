//! The homomorphic ciphertext tally.
//!
//! One accumulator ciphertext per real selection, laid out from the
//! manifest. Cast ballots multiply in; spoiled ballots are skipped and kept
//! aside for individual challenge decryption. Placeholder selections never
//! reach the tally.

use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;

use crate::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TallySelection {
    pub object_id: String,
    pub sequence_order: u32,
    pub description_hash: ElementModQ,
    pub ciphertext: ElGamalCiphertext,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TallyContest {
    pub object_id: String,
    pub sequence_order: u32,
    pub description_hash: ElementModQ,
    pub selections: IndexMap<String, TallySelection>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CiphertextTally {
    pub object_id: String,
    pub contests: IndexMap<String, TallyContest>,
    pub cast_ballot_ids: IndexSet<String>,
}

impl CiphertextTally {
    /// An empty tally shaped by the manifest, every slot at the neutral
    /// ciphertext.
    pub fn new(object_id: &str, constants: &ElectionConstants, manifest: &Manifest) -> Self {
        let contests = manifest
            .contests
            .iter()
            .map(|contest| {
                let selections = contest
                    .selections
                    .iter()
                    .map(|selection| {
                        (
                            selection.object_id.clone(),
                            TallySelection {
                                object_id: selection.object_id.clone(),
                                sequence_order: selection.sequence_order,
                                description_hash: selection.crypto_hash(constants),
                                ciphertext: ElGamalCiphertext::one(),
                            },
                        )
                    })
                    .collect();
                (
                    contest.object_id.clone(),
                    TallyContest {
                        object_id: contest.object_id.clone(),
                        sequence_order: contest.sequence_order,
                        description_hash: contest.crypto_hash(constants),
                        selections,
                    },
                )
            })
            .collect();
        CiphertextTally {
            object_id: object_id.to_string(),
            contests,
            cast_ballot_ids: IndexSet::new(),
        }
    }

    /// Same shape, no accumulated ballots. Partial accumulators for the
    /// parallel path start from this.
    fn empty_like(&self) -> Self {
        let contests = self
            .contests
            .iter()
            .map(|(contest_id, contest)| {
                let selections = contest
                    .selections
                    .iter()
                    .map(|(selection_id, selection)| {
                        (
                            selection_id.clone(),
                            TallySelection {
                                ciphertext: ElGamalCiphertext::one(),
                                ..selection.clone()
                            },
                        )
                    })
                    .collect();
                (
                    contest_id.clone(),
                    TallyContest {
                        selections,
                        ..contest.clone()
                    },
                )
            })
            .collect();
        CiphertextTally {
            object_id: self.object_id.clone(),
            contests,
            cast_ballot_ids: IndexSet::new(),
        }
    }

    /// Fold one submitted ballot into the tally. Returns whether the ballot
    /// was counted; spoiled ballots are not.
    pub fn accumulate(
        &mut self,
        constants: &ElectionConstants,
        submitted: &SubmittedBallot,
    ) -> Result<bool, Error> {
        if !submitted.is_cast() {
            return Ok(false);
        }
        if self.cast_ballot_ids.contains(&submitted.ballot.object_id) {
            return Err(Error::DuplicateBallotId(submitted.ballot.object_id.clone()));
        }
        for contest in &submitted.ballot.contests {
            let slot_contest = self
                .contests
                .get_mut(&contest.object_id)
                .ok_or_else(|| Error::UnknownContest(contest.object_id.clone()))?;
            for selection in &contest.selections {
                if selection.is_placeholder {
                    continue;
                }
                let slot = slot_contest
                    .selections
                    .get_mut(&selection.object_id)
                    .ok_or_else(|| Error::UnknownSelection {
                        contest_id: contest.object_id.clone(),
                        selection_id: selection.object_id.clone(),
                    })?;
                slot.ciphertext = slot.ciphertext.combine(constants, &selection.ciphertext);
            }
        }
        self.cast_ballot_ids
            .insert(submitted.ballot.object_id.clone());
        Ok(true)
    }

    /// Fold a batch of ballots in parallel. Returns how many were counted.
    pub fn accumulate_all(
        &mut self,
        constants: &ElectionConstants,
        ballots: &[SubmittedBallot],
    ) -> Result<u64, Error> {
        let cast: Vec<&SubmittedBallot> = ballots.iter().filter(|b| b.is_cast()).collect();
        let merged = cast
            .par_iter()
            .try_fold(
                || self.empty_like(),
                |mut partial, submitted| {
                    partial.accumulate(constants, submitted)?;
                    Ok::<_, Error>(partial)
                },
            )
            .try_reduce(|| self.empty_like(), |mut left, right| {
                left.merge(constants, right)?;
                Ok(left)
            })?;
        let counted = merged.cast_ballot_ids.len() as u64;
        self.merge(constants, merged)?;
        Ok(counted)
    }

    /// Combine another same-shaped tally into this one. Overlapping ballot
    /// ids mean a ballot was accumulated twice.
    fn merge(&mut self, constants: &ElectionConstants, other: CiphertextTally) -> Result<(), Error> {
        for ballot_id in &other.cast_ballot_ids {
            if self.cast_ballot_ids.contains(ballot_id) {
                return Err(Error::DuplicateBallotId(ballot_id.clone()));
            }
        }
        for (contest_id, other_contest) in &other.contests {
            let contest = self
                .contests
                .get_mut(contest_id)
                .ok_or_else(|| Error::UnknownContest(contest_id.clone()))?;
            for (selection_id, other_selection) in &other_contest.selections {
                let slot = contest
                    .selections
                    .get_mut(selection_id)
                    .ok_or_else(|| Error::UnknownSelection {
                        contest_id: contest_id.clone(),
                        selection_id: selection_id.clone(),
                    })?;
                slot.ciphertext =
                    slot.ciphertext.combine(constants, &other_selection.ciphertext);
            }
        }
        self.cast_ballot_ids.extend(other.cast_ballot_ids);
        Ok(())
    }
}
