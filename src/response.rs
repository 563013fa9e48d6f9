//! Customer reactions to a version: the one-off coarse verdict and repeatable detailed
//! responses with per-line answers.
use crate::error::{LedgerError, LedgerResult};
use crate::inquiry::Inquiry;
use crate::store::{Store, encode, reject, sequence_taken, settle, tx_decode, tx_encode};
use crate::types::{
    Amount, CommunicationMethod, CustomerResponseStatus, ItemStatus, OverallStatus, TimeStamp,
};
use crate::utils::{
    CUSTOMER_RESPONSE_HRP, QUOTATION_RESPONSE_HRP, RESPONSE_ITEM_HRP, new_uuid_to_bech32,
    sequence_key,
};
use crate::version::{VersionWithItems, load_version_by_id};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Transactional;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub version_id: String,
    #[n(2)]
    pub inquiry_id: String,
    #[n(3)]
    pub status: CustomerResponseStatus,
    #[n(4)]
    pub comments: Option<String>,
    #[n(5)]
    pub requested_changes: Option<String>,
    #[n(6)]
    pub responded_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomerResponse {
    pub status: CustomerResponseStatus,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub requested_changes: Option<String>,
}

impl NewCustomerResponse {
    pub fn new(status: CustomerResponseStatus) -> Self {
        Self {
            status,
            comments: None,
            requested_changes: None,
        }
    }
    pub fn set_comments(mut self, comments: &str) -> Self {
        self.comments = Some(comments.into());
        self
    }
    pub fn set_requested_changes(mut self, changes: &str) -> Self {
        self.requested_changes = Some(changes.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationResponse {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub version_id: String,
    #[n(2)]
    pub inquiry_id: String,
    #[n(3)]
    pub sequence_number: u32,
    #[n(4)]
    pub overall_status: OverallStatus,
    #[n(5)]
    pub response_date: TimeStamp<Utc>,
    #[n(6)]
    pub customer_contact_person: Option<String>,
    #[n(7)]
    pub communication_method: CommunicationMethod,
    #[n(8)]
    pub overall_comments: Option<String>,
    #[n(9)]
    pub requested_delivery_date: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub requested_payment_terms: Option<String>,
    #[n(11)]
    pub special_instructions: Option<String>,
    #[n(12)]
    pub recorded_by: String,
    #[n(13)]
    pub recorded_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationResponseItem {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub response_id: String,
    #[n(2)]
    pub line: u32,
    #[n(3)]
    pub quotation_version_item_id: String,
    #[n(4)]
    pub sku_id: String,
    #[n(5)]
    pub item_status: ItemStatus,
    #[n(6)]
    pub requested_quantity: Option<i64>,
    #[n(7)]
    pub requested_unit_price: Option<Amount>,
    #[n(8)]
    pub customer_sku_ref: Option<String>,
    #[n(9)]
    pub item_specific_comments: Option<String>,
    #[n(10)]
    pub alternative_suggestions: Option<String>,
    #[n(11)]
    pub delivery_requirements: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResponseLine {
    pub quotation_version_item_id: String,
    pub sku_id: String,
    pub item_status: ItemStatus,
    #[serde(default)]
    pub requested_quantity: Option<i64>,
    #[serde(default)]
    pub requested_unit_price: Option<Amount>,
    #[serde(default)]
    pub customer_sku_ref: Option<String>,
    #[serde(default)]
    pub item_specific_comments: Option<String>,
    #[serde(default)]
    pub alternative_suggestions: Option<String>,
    #[serde(default)]
    pub delivery_requirements: Option<String>,
}

impl NewResponseLine {
    pub fn new(quotation_version_item_id: &str, sku_id: &str, item_status: ItemStatus) -> Self {
        Self {
            quotation_version_item_id: quotation_version_item_id.into(),
            sku_id: sku_id.into(),
            item_status,
            requested_quantity: None,
            requested_unit_price: None,
            customer_sku_ref: None,
            item_specific_comments: None,
            alternative_suggestions: None,
            delivery_requirements: None,
        }
    }
    pub fn request(mut self, quantity: Option<i64>, unit_price: Option<Amount>) -> Self {
        self.requested_quantity = quantity;
        self.requested_unit_price = unit_price;
        self
    }
    pub fn set_comments(mut self, comments: &str) -> Self {
        self.item_specific_comments = Some(comments.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuotationResponse {
    pub overall_status: OverallStatus,
    pub response_date: TimeStamp<Utc>,
    pub communication_method: CommunicationMethod,
    #[serde(default)]
    pub customer_contact_person: Option<String>,
    #[serde(default)]
    pub overall_comments: Option<String>,
    #[serde(default)]
    pub requested_delivery_date: Option<TimeStamp<Utc>>,
    #[serde(default)]
    pub requested_payment_terms: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub recorded_by: String,
    #[serde(default)]
    pub response_items: Vec<NewResponseLine>,
}

impl NewQuotationResponse {
    pub fn new(
        overall_status: OverallStatus,
        communication_method: CommunicationMethod,
        recorded_by: &str,
    ) -> Self {
        Self {
            overall_status,
            response_date: TimeStamp::new(),
            communication_method,
            customer_contact_person: None,
            overall_comments: None,
            requested_delivery_date: None,
            requested_payment_terms: None,
            special_instructions: None,
            recorded_by: recorded_by.into(),
            response_items: vec![],
        }
    }
    pub fn set_contact(mut self, person: &str) -> Self {
        self.customer_contact_person = Some(person.into());
        self
    }
    pub fn set_comments(mut self, comments: &str) -> Self {
        self.overall_comments = Some(comments.into());
        self
    }
    pub fn set_response_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.response_date = date;
        self
    }
    pub fn add_line(mut self, line: NewResponseLine) -> Self {
        self.response_items.push(line);
        self
    }

    /// Every line must answer a distinct item of `version` with a consistent sku.
    fn validate_against(&self, version: &VersionWithItems) -> LedgerResult<()> {
        let mut answered = HashSet::new();
        for line in &self.response_items {
            let Some(item) = version
                .items
                .iter()
                .find(|item| item.id == line.quotation_version_item_id)
            else {
                return Err(LedgerError::Integrity(format!(
                    "item '{}' does not belong to version '{}'",
                    line.quotation_version_item_id, version.version.id
                )));
            };
            if item.sku_id != line.sku_id {
                return Err(LedgerError::Integrity(format!(
                    "item '{}' prices sku '{}', not '{}'",
                    item.id, item.sku_id, line.sku_id
                )));
            }
            if !answered.insert(item.id.as_str()) {
                return Err(LedgerError::Validation(format!(
                    "item '{}' is answered more than once",
                    item.id
                )));
            }
            if let Some(quantity) = line.requested_quantity
                && quantity <= 0
            {
                return Err(LedgerError::Validation(format!(
                    "requested quantity for item '{}' must be positive, got {quantity}",
                    item.id
                )));
            }
            if let Some(price) = line.requested_unit_price
                && price.is_negative()
            {
                return Err(LedgerError::Validation(format!(
                    "requested unit price for item '{}' is negative",
                    item.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationResponseWithItems {
    #[serde(flatten)]
    pub response: QuotationResponse,
    pub response_items: Vec<QuotationResponseItem>,
}

/// Caller-supplied overall status that disagrees with what the lines imply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMismatch {
    pub supplied: OverallStatus,
    pub derived: OverallStatus,
}

impl std::fmt::Display for StatusMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "overall status {} disagrees with line statuses, which imply {}",
            self.supplied, self.derived
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedQuotationResponse {
    #[serde(flatten)]
    pub response: QuotationResponseWithItems,
    pub status_mismatch: Option<StatusMismatch>,
}

/// Overall status implied by the line statuses alone.
pub fn derive_overall_status(lines: &[ItemStatus]) -> OverallStatus {
    let all = |status: ItemStatus| lines.iter().all(|line| *line == status);
    let any = |status: ItemStatus| lines.contains(&status);

    if lines.is_empty() || all(ItemStatus::Pending) {
        OverallStatus::Pending
    } else if all(ItemStatus::Accepted) {
        OverallStatus::Accepted
    } else if all(ItemStatus::Declined) {
        OverallStatus::Declined
    } else if any(ItemStatus::CounterProposed) || any(ItemStatus::NeedsClarification) {
        OverallStatus::Negotiating
    } else if any(ItemStatus::Accepted) {
        OverallStatus::PartialAccepted
    } else {
        // declined and pending lines only
        OverallStatus::Pending
    }
}

/// `None` when consistent. A response without lines is never flagged.
pub fn check_overall_status(supplied: OverallStatus, lines: &[ItemStatus]) -> Option<StatusMismatch> {
    if lines.is_empty() {
        return None;
    }
    let derived = derive_overall_status(lines);
    (derived != supplied).then_some(StatusMismatch { supplied, derived })
}

pub struct ResponseRecorder {
    store: Arc<Store>,
}

impl ResponseRecorder {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Records the single coarse verdict for a version and moves the inquiry accordingly.
    #[tracing::instrument(skip(self, new_response), fields(status = %new_response.status))]
    pub fn record_customer_response(
        &self,
        version_id: &str,
        new_response: NewCustomerResponse,
    ) -> LedgerResult<CustomerResponse> {
        let version = load_version_by_id(&self.store, version_id)?;
        let inquiry_id = version.version.inquiry_id.clone();
        self.store.load_inquiry(&inquiry_id)?.ensure_writable()?;

        let response = CustomerResponse {
            id: new_uuid_to_bech32(CUSTOMER_RESPONSE_HRP)?,
            version_id: version_id.to_string(),
            inquiry_id: inquiry_id.clone(),
            status: new_response.status,
            comments: new_response.comments,
            requested_changes: new_response.requested_changes,
            responded_at: TimeStamp::new(),
        };
        let response_bytes = encode(&response)?;

        let result = (&self.store.customer_responses, &self.store.inquiries).transaction(
            |(responses, inquiries)| {
                if responses.get(version_id)?.is_some() {
                    return reject(LedgerError::Conflict(format!(
                        "version '{version_id}' already has a customer response"
                    )));
                }
                let Some(inquiry_bytes) = inquiries.get(inquiry_id.as_bytes())? else {
                    return reject(LedgerError::not_found("inquiry", inquiry_id.as_str()));
                };
                let mut inquiry: Inquiry = tx_decode(&inquiry_bytes)?;
                if let Err(err) = inquiry.ensure_writable() {
                    return reject(err);
                }
                inquiry.transition(response.status.into());

                responses.insert(version_id.as_bytes(), response_bytes.as_slice())?;
                inquiries.insert(inquiry_id.as_bytes(), tx_encode(&inquiry)?)?;
                Ok(())
            },
        );
        if let Err(err) = settle(result) {
            debug!(error = %err, "customer response rejected");
            return Err(err);
        }

        info!(response_id = %response.id, inquiry_id = %inquiry_id, "customer response recorded");
        Ok(response)
    }

    pub fn get_customer_response(&self, version_id: &str) -> LedgerResult<Option<CustomerResponse>> {
        self.store.get(&self.store.customer_responses, version_id)
    }

    /// Appends a detailed response with the next sequence number for the version.
    /// Response, lines and the inquiry status change commit together.
    #[tracing::instrument(skip(self, new_response), fields(overall_status = %new_response.overall_status, lines = new_response.response_items.len()))]
    pub fn record_quotation_response(
        &self,
        version_id: &str,
        new_response: NewQuotationResponse,
    ) -> LedgerResult<RecordedQuotationResponse> {
        let version = load_version_by_id(&self.store, version_id)?;
        let inquiry_id = version.version.inquiry_id.clone();
        self.store.load_inquiry(&inquiry_id)?.ensure_writable()?;
        if new_response.recorded_by.trim().is_empty() {
            return Err(LedgerError::Validation("recordedBy is required".into()));
        }
        if let Err(err) = new_response.validate_against(&version) {
            debug!(error = %err, "quotation response rejected");
            return Err(err);
        }

        let line_statuses: Vec<ItemStatus> = new_response
            .response_items
            .iter()
            .map(|line| line.item_status)
            .collect();
        let status_mismatch = check_overall_status(new_response.overall_status, &line_statuses);
        if let Some(mismatch) = &status_mismatch {
            warn!(
                supplied = %mismatch.supplied,
                derived = %mismatch.derived,
                "overall status accepted as supplied despite line statuses"
            );
        }

        let response_id = new_uuid_to_bech32(QUOTATION_RESPONSE_HRP)?;
        let mut items = Vec::with_capacity(new_response.response_items.len());
        for (line, answer) in new_response.response_items.iter().enumerate() {
            items.push(QuotationResponseItem {
                id: new_uuid_to_bech32(RESPONSE_ITEM_HRP)?,
                response_id: response_id.clone(),
                line: line as u32 + 1,
                quotation_version_item_id: answer.quotation_version_item_id.clone(),
                sku_id: answer.sku_id.clone(),
                item_status: answer.item_status,
                requested_quantity: answer.requested_quantity,
                requested_unit_price: answer.requested_unit_price,
                customer_sku_ref: answer.customer_sku_ref.clone(),
                item_specific_comments: answer.item_specific_comments.clone(),
                alternative_suggestions: answer.alternative_suggestions.clone(),
                delivery_requirements: answer.delivery_requirements.clone(),
            });
        }
        let encoded_items = items
            .iter()
            .map(|item| Ok((sequence_key(&response_id, item.line), encode(item)?)))
            .collect::<LedgerResult<Vec<_>>>()?;
        let transition = new_response.overall_status.inquiry_transition();

        let store = &self.store;
        let response = store.append_sequenced(&store.quotation_responses, version_id, |sequence_number| {
            let response = QuotationResponse {
                id: response_id.clone(),
                version_id: version_id.to_string(),
                inquiry_id: inquiry_id.clone(),
                sequence_number,
                overall_status: new_response.overall_status,
                response_date: new_response.response_date.clone(),
                customer_contact_person: new_response.customer_contact_person.clone(),
                communication_method: new_response.communication_method,
                overall_comments: new_response.overall_comments.clone(),
                requested_delivery_date: new_response.requested_delivery_date.clone(),
                requested_payment_terms: new_response.requested_payment_terms.clone(),
                special_instructions: new_response.special_instructions.clone(),
                recorded_by: new_response.recorded_by.clone(),
                recorded_at: TimeStamp::new(),
            };
            let response_key = sequence_key(version_id, sequence_number);
            let response_bytes = encode(&response)?;

            let result = (
                &store.quotation_responses,
                &store.quotation_response_items,
                &store.inquiries,
            )
                .transaction(|(responses, response_items, inquiries)| {
                    if responses.get(response_key.as_slice())?.is_some() {
                        return sequence_taken();
                    }
                    let Some(inquiry_bytes) = inquiries.get(inquiry_id.as_bytes())? else {
                        return reject(LedgerError::not_found("inquiry", inquiry_id.as_str()));
                    };
                    let mut inquiry: Inquiry = tx_decode(&inquiry_bytes)?;
                    if let Err(err) = inquiry.ensure_writable() {
                        return reject(err);
                    }

                    responses.insert(response_key.as_slice(), response_bytes.as_slice())?;
                    for (key, bytes) in &encoded_items {
                        response_items.insert(key.as_slice(), bytes.as_slice())?;
                    }
                    if let Some(status) = transition {
                        inquiry.transition(status);
                        inquiries.insert(inquiry_id.as_bytes(), tx_encode(&inquiry)?)?;
                    }
                    Ok(())
                });

            Ok(settle(result)?.map(|_| response.clone()))
        })?;

        info!(
            response_id = %response.id,
            sequence_number = response.sequence_number,
            "quotation response recorded"
        );

        Ok(RecordedQuotationResponse {
            response: QuotationResponseWithItems {
                response,
                response_items: items,
            },
            status_mismatch,
        })
    }

    /// Detailed responses for the version, ascending by sequence number.
    pub fn list_quotation_responses(
        &self,
        version_id: &str,
    ) -> LedgerResult<Vec<QuotationResponseWithItems>> {
        if self.store.version_index.get(version_id)?.is_none() {
            return Err(LedgerError::not_found("version", version_id));
        }
        let responses: Vec<QuotationResponse> =
            self.store.scan(&self.store.quotation_responses, version_id)?;
        responses
            .into_iter()
            .map(|response| {
                let response_items = self
                    .store
                    .scan(&self.store.quotation_response_items, &response.id)?;
                Ok(QuotationResponseWithItems {
                    response,
                    response_items,
                })
            })
            .collect()
    }

    pub fn count_quotation_responses(&self, version_id: &str) -> LedgerResult<usize> {
        self.store.count(&self.store.quotation_responses, version_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ItemStatus::*;

    #[test]
    fn derives_uniform_statuses() {
        assert_eq!(derive_overall_status(&[]), OverallStatus::Pending);
        assert_eq!(derive_overall_status(&[Accepted, Accepted]), OverallStatus::Accepted);
        assert_eq!(derive_overall_status(&[Declined]), OverallStatus::Declined);
        assert_eq!(derive_overall_status(&[Pending, Pending]), OverallStatus::Pending);
    }

    #[test]
    fn derives_mixed_statuses() {
        assert_eq!(
            derive_overall_status(&[Accepted, Declined]),
            OverallStatus::PartialAccepted
        );
        assert_eq!(
            derive_overall_status(&[Accepted, Pending]),
            OverallStatus::PartialAccepted
        );
        assert_eq!(
            derive_overall_status(&[Accepted, CounterProposed]),
            OverallStatus::Negotiating
        );
        assert_eq!(
            derive_overall_status(&[Declined, NeedsClarification]),
            OverallStatus::Negotiating
        );
        assert_eq!(derive_overall_status(&[Declined, Pending]), OverallStatus::Pending);
    }

    #[test]
    fn mismatch_is_reported_not_enforced() {
        assert_eq!(check_overall_status(OverallStatus::Accepted, &[Accepted]), None);
        assert_eq!(check_overall_status(OverallStatus::Declined, &[]), None);
        assert_eq!(
            check_overall_status(OverallStatus::PartialAccepted, &[Accepted, Accepted]),
            Some(StatusMismatch {
                supplied: OverallStatus::PartialAccepted,
                derived: OverallStatus::Accepted,
            })
        );
    }
}
