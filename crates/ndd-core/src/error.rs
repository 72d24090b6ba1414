use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("field {0} is not in the data dictionary")]
    UnknownField(String),

    #[error("code {code:?} is not a choice of {field}")]
    UnknownCode { field: String, code: String },

    #[error("label {label:?} has no code in {field}")]
    UnknownLabel { field: String, label: String },

    #[error("expected exactly one export column for checkbox {field} option {code}, found {found}")]
    MissingCheckboxColumn {
        field: String,
        code: String,
        found: usize,
    },

    #[error("F-number sequence exhausted for year {year:02}")]
    FNumberExhausted { year: u32 },
}

pub type Result<T> = std::result::Result<T, CoreError>;
