//! Rows grouped by the event they belong to.

use std::collections::HashSet;

use ndd_model::{Record, events, fields};
use tracing::warn;

/// Instrument event name for rows that come from the referral project.
pub const REFERRAL: &str = "referral";

pub const REFERRAL_ID: &str = "referral_id";
pub const F_INDIVIDUAL_ID: &str = "f_idnum";
pub const RELATION: &str = "demo_relation";
pub const SUBJECT_ID: &str = "labkey_subjid";

#[derive(Debug, Clone, Default)]
pub struct EventData {
    /// Non-repeating referral rows with an F-individual number, keyed by
    /// `referral_id` instead of `redcap_id`.
    pub referrals: Vec<Record>,
    pub families: Vec<Record>,
    /// Family members whose relation is known.
    pub members: Vec<Record>,
    pub clinical: Vec<Record>,
}

impl EventData {
    pub fn split(referrals: Vec<Record>, data: Vec<Record>) -> Self {
        let mut split = Self::default();
        let mut seen = HashSet::new();
        for mut referral in referrals {
            if !referral.repeat_instrument().is_empty()
                || !referral.get(F_INDIVIDUAL_ID).starts_with('F')
            {
                continue;
            }
            if !seen.insert(referral.get(F_INDIVIDUAL_ID).to_string()) {
                warn!(
                    f_idnum = referral.get(F_INDIVIDUAL_ID),
                    "F-individual number on more than one referral, keeping the first"
                );
                continue;
            }
            let id = referral.remove(fields::RECORD_ID).unwrap_or_default();
            referral.set(REFERRAL_ID, id);
            split.referrals.push(referral);
        }
        for row in data {
            let bucket = match row.event() {
                events::FAMILY => Some(&mut split.families),
                events::MEMBER if !row.get(RELATION).trim().is_empty() => Some(&mut split.members),
                events::CLINICAL => Some(&mut split.clinical),
                _ => None,
            };
            if let Some(bucket) = bucket {
                bucket.push(row);
            }
        }
        split
    }

    /// Rows of an instrument event, `None` for an unknown event.
    pub fn rows(&self, event: &str) -> Option<&[Record]> {
        match event {
            REFERRAL => Some(&self.referrals),
            events::FAMILY => Some(&self.families),
            events::MEMBER => Some(&self.members),
            events::CLINICAL => Some(&self.clinical),
            _ => None,
        }
    }

    /// Subject id of the member with this record id and repeat instance.
    pub fn member_subject_id(&self, record_id: &str, instance: u32) -> Option<&str> {
        self.members
            .iter()
            .find(|m| {
                m.record_id() == record_id
                    && m.repeat_instance().trim().parse::<u32>().ok() == Some(instance)
            })
            .and_then(|m| m.non_empty(SUBJECT_ID))
    }

    /// Copy member subject ids onto referrals sharing their F-individual number.
    pub fn link_referral_subjects(&mut self) {
        for referral in &mut self.referrals {
            let subject = self
                .members
                .iter()
                .find(|m| m.get(F_INDIVIDUAL_ID) == referral.get(F_INDIVIDUAL_ID))
                .map(|m| m.get(SUBJECT_ID).to_string())
                .unwrap_or_default();
            referral.set(SUBJECT_ID, subject);
        }
    }
}
