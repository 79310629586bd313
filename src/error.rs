//! Error types and utilities for simulation operations.

use thiserror::Error;

use crate::value::Value;

/// Errors that can occur while building or running a simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// The wait a process was suspended on was interrupted.
    ///
    /// This is the one recoverable fault: a process body may match on it at
    /// the await site and continue; propagating it with `?` instead turns it
    /// into an unhandled process fault.
    #[error("wait interrupted: {cause}")]
    Interrupted {
        /// The cause supplied to [`Process::interrupt`](crate::Process::interrupt).
        cause: Value,
    },

    /// A container operation was submitted with a non-positive amount.
    #[error("container amount must be positive, got {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: i64,
    },

    /// A container put larger than the capacity can never be admitted.
    #[error("put of {amount} can never be admitted into capacity {capacity}")]
    NeverAdmissible {
        /// The rejected amount.
        amount: i64,
        /// The container capacity.
        capacity: i64,
    },

    /// The process has already finished and cannot be scheduled.
    #[error("process `{label}` has already finished")]
    ProcessFinished {
        /// Label of the finished process.
        label: String,
    },

    /// An engine future was polled outside a scheduled process.
    #[error("engine events can only be awaited inside a scheduled process")]
    OutsideProcess,

    /// The environment behind a weak handle has been dropped.
    #[error("simulation environment has been shut down")]
    Shutdown,

    /// A fault escaped a process body and terminated the run.
    #[error("process `{label}` faulted: {source}")]
    ProcessFault {
        /// Label of the faulting process.
        label: String,
        /// The escaped fault.
        #[source]
        source: Box<SimError>,
    },
}

/// A type alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
