//! The skip-check shared by every stage.
//!
//! Each stage first observes the world (cache file, marker directory, remote
//! listing, output file) into a plan value. The plan answers
//! [`Idempotent::already_done`] without touching the filesystem or network
//! again, which keeps the decision testable on its own.

pub trait Idempotent {
    /// True when running the stage would not change anything.
    fn already_done(&self) -> bool;
}
