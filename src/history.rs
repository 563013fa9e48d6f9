//! Append-only audit trail of inline quantity/price edits, kept apart from versions
use crate::error::{LedgerError, LedgerResult};
use crate::inquiry::Inquiry;
use crate::pricing;
use crate::store::{Store, encode, reject, sequence_taken, settle, tx_decode};
use crate::types::{Amount, ChangeType, ChangedBy, TimeStamp};
use crate::utils::{HISTORY_HRP, new_uuid_to_bech32, sequence_key};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Transactional;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuNegotiationHistory {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub inquiry_id: String,
    #[n(2)]
    pub sku_id: String,
    #[n(3)]
    pub sequence_number: u32,
    #[n(4)]
    pub change_type: ChangeType,
    #[n(5)]
    pub old_quantity: i64,
    #[n(6)]
    pub new_quantity: i64,
    #[n(7)]
    pub old_unit_price: Amount,
    #[n(8)]
    pub new_unit_price: Amount,
    #[n(9)]
    pub changed_by: ChangedBy,
    #[n(10)]
    pub reason: Option<String>,
    #[n(11)]
    pub author: String,
    #[n(12)]
    pub changed_at: TimeStamp<Utc>,
}

/// One inline edit as reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuChange {
    #[serde(rename = "itemId")]
    pub sku_id: String,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub old_unit_price: Amount,
    pub new_unit_price: Amount,
    pub changed_by: ChangedBy,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub author: String,
}

/// The values a negotiator currently sees for a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDraft {
    pub quantity: i64,
    pub unit_price: Amount,
}

/// The single field touched by an inline edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Quantity(i64),
    UnitPrice(Amount),
}

impl LineDraft {
    pub fn new(quantity: i64, unit_price: Amount) -> Self {
        Self {
            quantity,
            unit_price,
        }
    }

    fn with(&self, field: EditField) -> Self {
        match field {
            EditField::Quantity(quantity) => Self { quantity, ..*self },
            EditField::UnitPrice(unit_price) => Self {
                unit_price,
                ..*self
            },
        }
    }
}

/// Which fields differ between `old` and `new`, `None` if nothing changed.
pub fn change_type(old: &LineDraft, new: &LineDraft) -> Option<ChangeType> {
    match (old.quantity != new.quantity, old.unit_price != new.unit_price) {
        (true, true) => Some(ChangeType::Both),
        (true, false) => Some(ChangeType::QuantityChange),
        (false, true) => Some(ChangeType::PriceChange),
        (false, false) => None,
    }
}

pub struct ChangeRecorder {
    store: Arc<Store>,
}

impl ChangeRecorder {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Appends one history row. Existing rows are never touched.
    #[tracing::instrument(skip(self, change), fields(sku_id = %change.sku_id, changed_by = %change.changed_by))]
    pub fn record_change(&self, change: SkuChange) -> LedgerResult<SkuNegotiationHistory> {
        let inquiry = self.store.inquiry_of_sku(&change.sku_id)?;
        inquiry.ensure_writable()?;
        if change.author.trim().is_empty() {
            return Err(LedgerError::Validation("author is required".into()));
        }
        if change.old_quantity < 0 || change.old_unit_price.is_negative() {
            return Err(LedgerError::Validation(
                "previous quantity and price cannot be negative".into(),
            ));
        }
        // the new values must price as a valid line
        pricing::line_total(change.new_quantity, change.new_unit_price)?;

        let old = LineDraft::new(change.old_quantity, change.old_unit_price);
        let new = LineDraft::new(change.new_quantity, change.new_unit_price);
        let kind = change_type(&old, &new).ok_or_else(|| {
            LedgerError::Validation("neither quantity nor unit price changed".into())
        })?;

        if let Some(last) = self.last_change(&change.sku_id)?
            && LineDraft::new(last.new_quantity, last.new_unit_price) != old
        {
            warn!(
                last_sequence = last.sequence_number,
                "edit starts from values that differ from the last recorded change"
            );
        }

        let id = new_uuid_to_bech32(HISTORY_HRP)?;
        let store = &self.store;
        let entry = store.append_sequenced(&store.sku_history, &change.sku_id, |sequence_number| {
            let entry = SkuNegotiationHistory {
                id: id.clone(),
                inquiry_id: inquiry.id.clone(),
                sku_id: change.sku_id.clone(),
                sequence_number,
                change_type: kind,
                old_quantity: change.old_quantity,
                new_quantity: change.new_quantity,
                old_unit_price: change.old_unit_price,
                new_unit_price: change.new_unit_price,
                changed_by: change.changed_by,
                reason: change.reason.clone(),
                author: change.author.clone(),
                changed_at: TimeStamp::new(),
            };
            let key = sequence_key(&change.sku_id, sequence_number);
            let bytes = encode(&entry)?;

            let result = (&store.sku_history, &store.inquiries).transaction(|(history, inquiries)| {
                if history.get(key.as_slice())?.is_some() {
                    return sequence_taken();
                }
                let Some(inquiry_bytes) = inquiries.get(inquiry.id.as_bytes())? else {
                    return reject(LedgerError::not_found("inquiry", inquiry.id.as_str()));
                };
                let current: Inquiry = tx_decode(&inquiry_bytes)?;
                if let Err(err) = current.ensure_writable() {
                    return reject(err);
                }
                history.insert(key.as_slice(), bytes.as_slice())?;
                Ok(())
            });

            Ok(settle(result)?.map(|_| entry.clone()))
        })?;

        info!(
            history_id = %entry.id,
            sequence_number = entry.sequence_number,
            change_type = %entry.change_type,
            "sku change recorded"
        );
        Ok(entry)
    }

    /// Records a single-field edit against the line's last known values.
    pub fn record_field_edit(
        &self,
        sku_id: &str,
        current: &LineDraft,
        field: EditField,
        changed_by: ChangedBy,
        author: &str,
        reason: Option<&str>,
    ) -> LedgerResult<SkuNegotiationHistory> {
        let next = current.with(field);
        self.record_change(SkuChange {
            sku_id: sku_id.into(),
            old_quantity: current.quantity,
            new_quantity: next.quantity,
            old_unit_price: current.unit_price,
            new_unit_price: next.unit_price,
            changed_by,
            reason: reason.map(Into::into),
            author: author.into(),
        })
    }

    /// Rows for one sku, oldest first.
    pub fn sku_history(&self, sku_id: &str) -> LedgerResult<Vec<SkuNegotiationHistory>> {
        self.store.scan(&self.store.sku_history, sku_id)
    }

    /// How many times the sku has been renegotiated inline.
    pub fn negotiation_count(&self, sku_id: &str) -> LedgerResult<usize> {
        self.store.count(&self.store.sku_history, sku_id)
    }

    /// Rows across every sku of the inquiry, newest first.
    pub fn inquiry_history(&self, inquiry_id: &str) -> LedgerResult<Vec<SkuNegotiationHistory>> {
        let inquiry = self.store.load_inquiry(inquiry_id)?;
        let mut rows = Vec::new();
        for sku in &inquiry.skus {
            rows.extend(self.sku_history(&sku.id)?);
        }
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    fn last_change(&self, sku_id: &str) -> LedgerResult<Option<SkuNegotiationHistory>> {
        match self.store.last_sequence(&self.store.sku_history, sku_id)? {
            0 => Ok(None),
            seq => self
                .store
                .get(&self.store.sku_history, sequence_key(sku_id, seq)),
        }
    }
}

/// Newest `changed_at` first, higher sequence first on ties.
fn sort_newest_first(rows: &mut [SkuNegotiationHistory]) {
    rows.sort_by(|a, b| {
        b.changed_at
            .to_datetime_utc()
            .cmp(&a.changed_at.to_datetime_utc())
            .then_with(|| b.sequence_number.cmp(&a.sequence_number))
    });
}

/// Apply locally, commit remotely, roll back locally if the commit fails.
///
/// ```ignore
/// let mut draft = LineDraft::new(5, Amount::from_minor(1000));
/// let edit = OptimisticEdit::apply(&mut draft, EditField::UnitPrice(Amount::from_minor(1200)));
/// edit.commit(&recorder, &sku_id, ChangedBy::Internal, "alice", None)?;
/// ```
pub struct OptimisticEdit<'a> {
    draft: &'a mut LineDraft,
    previous: LineDraft,
}

impl<'a> OptimisticEdit<'a> {
    /// Mutates the draft immediately so the caller can show the new value.
    pub fn apply(draft: &'a mut LineDraft, field: EditField) -> Self {
        let previous = *draft;
        *draft = previous.with(field);
        Self { draft, previous }
    }

    pub fn previous(&self) -> &LineDraft {
        &self.previous
    }

    pub fn current(&self) -> &LineDraft {
        &*self.draft
    }

    /// Writes the history row. On error the draft is restored before the error is returned.
    pub fn commit(
        self,
        recorder: &ChangeRecorder,
        sku_id: &str,
        changed_by: ChangedBy,
        author: &str,
        reason: Option<&str>,
    ) -> LedgerResult<SkuNegotiationHistory> {
        let change = SkuChange {
            sku_id: sku_id.into(),
            old_quantity: self.previous.quantity,
            new_quantity: self.draft.quantity,
            old_unit_price: self.previous.unit_price,
            new_unit_price: self.draft.unit_price,
            changed_by,
            reason: reason.map(Into::into),
            author: author.into(),
        };

        match recorder.record_change(change) {
            Ok(entry) => Ok(entry),
            Err(err) => {
                *self.draft = self.previous;
                Err(err)
            }
        }
    }

    /// Abandons the edit without writing anything.
    pub fn rollback(self) {
        *self.draft = self.previous;
    }
}
