use thiserror::Error;

/// Errors returned by protocol operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("quorumballot: {domain} out of range: {value}")]
    OutOfRange { domain: &'static str, value: String },

    #[error("quorumballot: decryption failed: no plaintext in 0..={max} matches")]
    DecryptionFailed { max: u64 },

    #[error("quorumballot: duplicate guardian id: {0}")]
    DuplicateGuardianId(String),

    #[error("quorumballot: duplicate guardian x coordinate: {0}")]
    DuplicateXCoordinate(u32),

    #[error("quorumballot: guardian {0} failed verification")]
    GuardianFailedVerification(String),

    #[error("quorumballot: insufficient guardians: need {needed}, have {available}")]
    InsufficientGuardians { needed: u32, available: u32 },

    #[error("quorumballot: guardian {guardian_id} holds no verified backup for {missing_guardian_id}")]
    MissingBackup {
        guardian_id: String,
        missing_guardian_id: String,
    },

    #[error("quorumballot: duplicate ballot id: {0}")]
    DuplicateBallotId(String),

    #[error("quorumballot: unknown guardian: {0}")]
    UnknownGuardian(String),

    #[error("quorumballot: unknown contest: {0}")]
    UnknownContest(String),

    #[error("quorumballot: unknown selection {selection_id} in contest {contest_id}")]
    UnknownSelection {
        contest_id: String,
        selection_id: String,
    },

    #[error("quorumballot: contest {contest_id} selects {selected}, limit is {limit}")]
    SelectionLimitExceeded {
        contest_id: String,
        selected: u64,
        limit: u64,
    },

    #[error("quorumballot: ceremony is in state {actual:?}, operation requires {expected:?}")]
    CeremonyStateMismatch {
        expected: crate::CeremonyState,
        actual: crate::CeremonyState,
    },

    #[error("quorumballot: no public keys registered for guardian {0}")]
    MissingPublicKeys(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors returned when re-validating published artifacts. Every variant
/// carries enough context to locate the offending object.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid possession proof for guardian {guardian_id}, coefficient {index}")]
    SchnorrProofInvalid { guardian_id: String, index: usize },

    #[error("invalid selection proof: {object_id}")]
    SelectionProofInvalid { object_id: String },

    #[error("invalid selection-limit proof for contest {object_id}")]
    ContestProofInvalid { object_id: String },

    #[error("invalid decryption proof by guardian {guardian_id} for {object_id}")]
    DecryptionProofInvalid {
        object_id: String,
        guardian_id: String,
    },

    #[error("crypto hash mismatch: {object_id}")]
    HashMismatch { object_id: String },

    #[error("tally does not match the homomorphic sum of cast ballots: {object_id}")]
    TallyMismatch { object_id: String },

    #[error("decrypted value inconsistent with shares: {object_id}")]
    DecryptionMismatch { object_id: String },

    #[error("joint public key does not match the guardian commitments")]
    JointKeyMismatch,

    #[error("election base hash does not match its inputs")]
    BaseHashMismatch,

    #[error("backup by {owner_id} for {designated_id} failed verification")]
    BackupVerificationFailed {
        owner_id: String,
        designated_id: String,
    },
}
