//! End-to-end verifiable election cryptography.
//!
//! Guardians run a threshold key ceremony to produce a joint ElGamal key;
//! ballots are encrypted selection-by-selection with zero-knowledge proofs
//! and chained tracking codes; cast ballots are tallied homomorphically;
//! any quorum of guardians decrypts the tally (compensating for missing
//! guardians); and an independent verifier re-checks the published record
//! from end to end.

#[macro_use]
extern crate serde;

mod ballot;
mod chaum_pedersen;
mod decryption;
mod election;
mod elgamal;
mod encrypt;
mod error;
mod group;
mod hash;
mod keyceremony;
mod polynomial;
mod schnorr;
mod serde_hex;
mod tally;
mod verifier;

pub use ballot::*;
pub use chaum_pedersen::*;
pub use decryption::*;
pub use election::*;
pub use elgamal::*;
pub use encrypt::*;
pub use error::*;
pub use group::*;
pub use hash::*;
pub use keyceremony::*;
pub use polynomial::*;
pub use schnorr::*;
pub use serde_hex::*;
pub use tally::*;
pub use verifier::*;
