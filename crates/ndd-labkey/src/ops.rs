//! Single-row helpers on top of [`LabkeyApi`].

use serde_json::Value;
use tracing::{error, warn};

use crate::api::{LabkeyApi, Row};
use crate::error::{LabkeyError, Result};

/// How [`upsert_row`] stored the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Updated,
    Inserted,
}

/// Insert one row, logging a failure.
pub fn insert_row(api: &dyn LabkeyApi, schema: &str, query: &str, row: Row) -> Result<()> {
    api.insert_rows(schema, query, &[row]).map(|_| ()).inspect_err(|err| {
        error!(schema, query, error = %err, "LabKey insert failed");
    })
}

/// Update one row, inserting it when the update fails.
pub fn upsert_row(api: &dyn LabkeyApi, schema: &str, query: &str, row: Row) -> Result<Upsert> {
    let rows = [row];
    match api.update_rows(schema, query, &rows) {
        Ok(_) => Ok(Upsert::Updated),
        Err(update_err) => {
            warn!(schema, query, error = %update_err, "LabKey update failed, inserting");
            match api.insert_rows(schema, query, &rows) {
                Ok(_) => Ok(Upsert::Inserted),
                Err(err) => {
                    error!(schema, query, error = %err, "LabKey update and insert both failed");
                    Err(err)
                }
            }
        }
    }
}

pub const NEXT_SUBJECT_ID_SCHEMA: &str = "study";
pub const NEXT_SUBJECT_ID_QUERY: &str = "GetNextSubjectID";

/// Next free warehouse subject id; a null result counts as 0.
pub fn next_subject_id(api: &dyn LabkeyApi) -> Result<u64> {
    let rows = api.select_rows(NEXT_SUBJECT_ID_SCHEMA, NEXT_SUBJECT_ID_QUERY)?;
    let value = rows
        .first()
        .and_then(|row| row.get("nextSubjID"))
        .cloned()
        .unwrap_or(Value::Null);
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .ok_or_else(|| LabkeyError::UnexpectedResponse(format!("nextSubjID = {n}"))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| LabkeyError::UnexpectedResponse(format!("nextSubjID = {s:?}"))),
        other => Err(LabkeyError::UnexpectedResponse(format!(
            "nextSubjID = {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::row;
    use crate::memory::MemoryLabkey;

    #[test]
    fn upsert_updates_existing_rows() {
        let labkey = MemoryLabkey::new();
        labkey.set_rows("lists", "Families", vec![row([("id", json!("7")), ("fnum", json!(""))])]);
        let outcome = upsert_row(
            &labkey,
            "lists",
            "Families",
            row([("id", "7"), ("fnum", "F190001")]),
        )
        .unwrap();
        assert_eq!(outcome, Upsert::Updated);
        let rows = labkey.rows("lists", "Families");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["fnum"], json!("F190001"));
    }

    #[test]
    fn upsert_falls_back_to_insert() {
        let labkey = MemoryLabkey::new();
        let outcome = upsert_row(
            &labkey,
            "study",
            "Enrollment",
            row([("SubjectID", "12"), ("f_idnum", "F190001-01")]),
        )
        .unwrap();
        assert_eq!(outcome, Upsert::Inserted);
        assert_eq!(labkey.rows("study", "Enrollment").len(), 1);
    }

    #[test]
    fn upsert_reports_second_failure() {
        let labkey = MemoryLabkey::new();
        labkey.fail_inserts();
        let err = upsert_row(&labkey, "study", "Enrollment", row([("SubjectID", "12")]));
        assert!(err.is_err());
        assert!(insert_row(&labkey, "study", "Demographics", Row::new()).is_err());
    }

    #[test]
    fn next_subject_id_handles_null() {
        let labkey = MemoryLabkey::new();
        labkey.set_rows("study", "GetNextSubjectID", vec![row([("nextSubjID", Value::Null)])]);
        assert_eq!(next_subject_id(&labkey).unwrap(), 0);

        labkey.set_rows("study", "GetNextSubjectID", vec![row([("nextSubjID", 418)])]);
        assert_eq!(next_subject_id(&labkey).unwrap(), 418);

        labkey.set_rows("study", "GetNextSubjectID", vec![row([("nextSubjID", "19")])]);
        assert_eq!(next_subject_id(&labkey).unwrap(), 19);

        labkey.set_rows("study", "GetNextSubjectID", Vec::new());
        assert_eq!(next_subject_id(&labkey).unwrap(), 0);
    }
}
