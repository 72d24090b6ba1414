//! Side-effect-free logic shared by the ETL, the webhook server and the
//! one-off transforms.
//!
//! Nothing in this crate performs I/O: callers fetch records and
//! dictionaries, and push whatever these functions compute.

pub mod allocate;
pub mod choices;
pub mod collapse;
pub mod dates;
pub mod decode;
pub mod error;
pub mod fields;

pub use allocate::{
    SubjectIdSequence, f_number_year, next_data_collection_id, next_f_number,
    next_f_number_for_year, next_individual_number, next_repeat_instance,
};
pub use choices::{ChoiceMap, ParseOptions};
pub use collapse::{CollapseSource, collapse_checkbox, collapse_values};
pub use dates::{coerce_date, coerce_datetime};
pub use decode::{CheckboxColumns, ExpandedCheckbox};
pub use error::{CoreError, Result};
pub use fields::{concat_fields, concat_other, duplicate_key, f_number_digits, piped_instance};
