//! Crate-wide error type.
//!
//! Only genuinely unrecoverable conditions live here. Illegal player input
//! is not an error (it resolves to a bump), and running out of power or
//! health is an ordinary termination reason.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    /// No traversable layout could be generated within the retry budget.
    /// The requested size/difficulty combination is unworkable.
    #[error("could not generate a traversable {width}x{height} level at difficulty {difficulty} after {attempts} attempts")]
    MapGeneration {
        width: i32,
        height: i32,
        difficulty: u32,
        attempts: u32,
    },

    /// The save record could not be parsed at all.
    #[error("malformed save data: {0}")]
    SaveFormat(#[from] serde_json::Error),

    /// The save record parsed but describes an impossible level.
    #[error("inconsistent save data: {0}")]
    CorruptSave(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
