//! Fleetlog Custodian - bounded local disk without losing unreplicated data
//!
//! Three layered retention policies, each independently enabled:
//!
//! 1. **Deferred deletion** - uploaded files are kept for a configured
//!    number of days (anchored to file mtime, so system clock changes do
//!    not shorten or extend retention), then removed.
//! 2. **Age-based cleanup** - pattern-matching files past an age horizon
//!    are removed whether uploaded or not; the backstop when upload is
//!    chronically behind.
//! 3. **Emergency reclamation** - oldest-first deletion to reach a free
//!    space target: first over uploaded files only, then (critically full,
//!    explicitly enabled) over all pattern-matching files.
//!
//! Standard cleanup never touches a file it has not recorded as uploaded,
//! and no policy ever deletes outside the monitored directories.

pub mod custodian;
pub mod disk;
pub mod marker;

pub use custodian::{CustodianSettings, DiskCustodian};
pub use disk::DiskUsage;
pub use marker::DeleteAfter;
