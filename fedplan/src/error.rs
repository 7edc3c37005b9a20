use thiserror::Error;

/// Reasons a decomposition fails as a whole.
#[derive(Debug, Error)]
pub enum DecomposeError {
    /// No combination of known molecules or wrappers covers all predicates of a star.
    #[error("no combination of known sources covers predicates {predicates:?} of star {star}")]
    UnsatisfiableStar {
        star: String,
        predicates: Vec<String>,
    },
    /// A type anchored star uses properties its molecule does not declare.
    #[error(
        "star {star} can't be executed, molecule {molecule} has no properties {predicates:?} in this federation"
    )]
    OutsideFederation {
        star: String,
        molecule: String,
        predicates: Vec<String>,
    },
    #[error("molecule {0} is not in the catalogue")]
    UnknownMolecule(String),
    #[error("failed to load planner input")]
    Load(#[from] anyhow::Error),
}

pub type DecomposeResult<T> = Result<T, DecomposeError>;
