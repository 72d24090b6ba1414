//! Record exports from the referral and data-collection projects.

use std::collections::HashMap;

use ndd_model::{Record, fields};
use ndd_redcap::{RecordQuery, RedcapApi};
use tracing::{debug, info};

use crate::error::Result;

/// Columns that identify one row across chunked exports.
pub const ROW_KEY: [&str; 4] = [
    fields::RECORD_ID,
    fields::EVENT_NAME,
    fields::REPEAT_INSTANCE,
    fields::REPEAT_INSTRUMENT,
];

fn row_key(record: &Record) -> [String; 4] {
    ROW_KEY.map(|field| record.get(field).to_string())
}

/// Outer-join row sets on [`ROW_KEY`], keeping first-seen row order.
pub fn merge_rows<I>(sets: I) -> Vec<Record>
where
    I: IntoIterator<Item = Vec<Record>>,
{
    let mut merged: Vec<Record> = Vec::new();
    let mut index: HashMap<[String; 4], usize> = HashMap::new();
    for rows in sets {
        for row in rows {
            let key = row_key(&row);
            match index.get(&key) {
                Some(&idx) => merged[idx].merge(&row),
                None => {
                    index.insert(key, merged.len());
                    merged.push(row);
                }
            }
        }
    }
    merged
}

pub fn pull_referrals(api: &dyn RedcapApi) -> Result<Vec<Record>> {
    let rows = api.export_rows(&RecordQuery::all())?;
    info!(rows = rows.len(), "referral records exported");
    Ok(rows)
}

/// Export `instruments` from the data-collection project `chunk_size` at a
/// time and merge the chunks.
pub fn pull_data_collection(
    api: &dyn RedcapApi,
    instruments: &[String],
    chunk_size: usize,
) -> Result<Vec<Record>> {
    let mut sets = Vec::new();
    for chunk in instruments.chunks(chunk_size.max(1)) {
        let query = RecordQuery::all()
            .forms(chunk.iter().cloned())
            .fields(ROW_KEY);
        let rows = api.export_rows(&query)?;
        debug!(instruments = ?chunk, rows = rows.len(), "instrument chunk exported");
        sets.push(rows);
    }
    let merged = merge_rows(sets);
    info!(
        instruments = instruments.len(),
        rows = merged.len(),
        "data collection records exported"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, instance: &str, field: &str, value: &str) -> Record {
        Record::new()
            .with(fields::RECORD_ID, id)
            .with(fields::EVENT_NAME, "family_member_arm_1")
            .with(fields::REPEAT_INSTANCE, instance)
            .with(fields::REPEAT_INSTRUMENT, "")
            .with(field, value)
    }

    #[test]
    fn chunks_are_joined_on_row_identity() {
        let merged = merge_rows([
            vec![row("1", "1", "demo_sex", "2"), row("1", "2", "demo_sex", "1")],
            vec![row("1", "2", "enroll_date", "2019-01-01"), row("2", "1", "enroll_date", "x")],
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].get("demo_sex"), "1");
        assert_eq!(merged[1].get("enroll_date"), "2019-01-01");
        assert_eq!(merged[2].record_id(), "2");
    }
}
