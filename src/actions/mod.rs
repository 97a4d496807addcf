//! Actions on a loaded register.
//!
//! - [`confirm`]: the two-prompt [`ConfirmationGate`] and its [`Operator`] seam
//! - [`delete`]: the fail-fast [`DeletionExecutor`]
//! - [`verify`]: read-only [`verify_register`] using `HeadObject`
//!
//! ```no_run
//! use s3dedupe::actions::{ConsoleOperator, DeleteConfig, DeletionExecutor};
//! use s3dedupe::register::DuplicateRegister;
//! use s3dedupe::storage::LocalStorage;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new("/srv/buckets");
//! let register = DuplicateRegister::load(Path::new("s3-duplicates.json")).unwrap();
//! let mut executor = DeletionExecutor::new(&storage, DeleteConfig::default());
//! let outcome = executor.run(&register, &mut ConsoleOperator::stdio());
//! ```

pub mod confirm;
pub mod delete;
pub mod verify;

pub use confirm::{Answer, ConfirmationGate, ConsoleOperator, GateState, Operator, ScriptedOperator};
pub use delete::{
    DeleteConfig, DeleteError, DeleteProgressCallback, DeleteReport, DeletionExecutor,
    DeletionOutcome, DeletionState, DELETING_PHASE,
};
pub use verify::{verify_register, VerifyConfig, VerifyReport, VERIFYING_PHASE};
