//! # txguard-verifier
//!
//! Stateless checks run against a client-signed transaction before the
//! server adds its own signature. Each check is a plain function; the
//! composite [`verify_signed_transaction`] runs them in a fixed order and
//! stops at the first failure:
//!
//! 1. [`verify_fee_payer`]: the declared payer is the one recorded at build
//! 2. [`verify_signature`]: the required party actually signed these bytes
//! 3. [`verify_integrity`]: the message hashes to the value recorded at build
//! 4. [`verify_freshness`]: the chain still accepts the embedded blockhash
//!
//! None of these functions touch shared state. The only collaborator is the
//! [`BlockhashOracle`] consulted for freshness.

pub mod checks;
pub mod composite;
pub mod oracle;

pub use checks::*;
pub use composite::*;
pub use oracle::*;
