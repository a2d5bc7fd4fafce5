//! # premarket-custody
//!
//! **Collaborator seams** between the exchange core and the outside world.
//!
//! ## Architecture
//!
//! The core never moves value, checks roles, or reads the wall clock
//! itself. It goes through these seams:
//! 1. **Custodian**: asset precision oracle + escrow value movement, with savepoints
//! 2. **Authority**: operator / admin capability checks
//! 3. **Clock**: the caller-visible current time
//! 4. **ExecutionLock**: the exclusive in-operation guard
//! 5. **JournaledTable**: entity table with an undo journal for all-or-nothing units
//!
//! ## Operation Flow
//!
//! ```text
//! ExecutionLock.try_enter() → savepoints(tables, log, custodian)
//!     → checks → Custodian movements → table writes
//!     → release (Ok) | rollback_to (Err) → lock released on drop
//! ```

pub mod authority;
pub mod clock;
pub mod custodian;
pub mod journal;
pub mod lock;

pub use authority::{Authority, Role, StaticRoles};
pub use clock::{Clock, ManualClock, SystemClock};
pub use custodian::{Custodian, InMemoryCustodian, Savepoint};
pub use journal::JournaledTable;
pub use lock::{ExecutionLock, LockHandle};
