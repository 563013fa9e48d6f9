//! The inquiry (RFQ) aggregate: intake, catalog lines and lifecycle status
use crate::error::{LedgerError, LedgerResult};
use crate::store::{Store, encode, reject, settle, tx_decode, tx_encode};
use crate::types::{InquiryStatus, TimeStamp};
use crate::utils::{INQUIRY_HRP, SKU_HRP, new_uuid_to_bech32};
use chrono::Utc;
use serde::Serialize;
use sled::Transactional;
use std::sync::Arc;
use tracing::info;

/// A catalog line the customer asked to be priced.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquirySku {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub part_number: String,
    #[n(2)]
    pub description: Option<String>,
    #[n(3)]
    pub requested_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inquiry {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7, hrp "rfq"
    #[n(1)]
    pub number: String, // human readable, e.g. RFQ-2024-0042
    #[n(2)]
    pub customer_ref: String,
    #[n(3)]
    pub currency: String, // currency of record, ISO 4217
    #[n(4)]
    pub status: InquiryStatus,
    #[n(5)]
    pub skus: Vec<InquirySku>,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
    #[n(7)]
    pub updated_at: TimeStamp<Utc>,
}

// used for constructing an inquiry on intake
#[derive(Debug, Default, Clone)]
pub struct NewInquiry {
    number: Option<String>,
    customer_ref: Option<String>,
    currency: Option<String>,
    skus: Vec<(String, Option<String>, i64)>,
}

impl NewInquiry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_number(mut self, number: &str) -> Self {
        self.number = Some(number.into());
        self
    }
    pub fn set_customer(mut self, customer_ref: &str) -> Self {
        self.customer_ref = Some(customer_ref.into());
        self
    }
    pub fn set_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_uppercase());
        self
    }
    pub fn add_sku(mut self, part_number: &str, description: Option<&str>, quantity: i64) -> Self {
        self.skus
            .push((part_number.into(), description.map(Into::into), quantity));
        self
    }

    /// Checks every field and assigns identifiers.
    pub fn validate_and_finalise(&self) -> LedgerResult<Inquiry> {
        let number = non_blank(self.number.as_deref(), "inquiry number")?;
        let customer_ref = non_blank(self.customer_ref.as_deref(), "customer reference")?;
        let currency = non_blank(self.currency.as_deref(), "currency")?;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(LedgerError::Validation(format!(
                "currency '{currency}' is not a three letter code"
            )));
        }
        if self.skus.is_empty() {
            return Err(LedgerError::Validation(
                "an inquiry needs at least one sku".into(),
            ));
        }

        let mut skus = Vec::with_capacity(self.skus.len());
        for (part_number, description, quantity) in &self.skus {
            let part_number = non_blank(Some(part_number), "part number")?;
            if *quantity <= 0 {
                return Err(LedgerError::Validation(format!(
                    "requested quantity for '{part_number}' must be positive, got {quantity}"
                )));
            }
            skus.push(InquirySku {
                id: new_uuid_to_bech32(SKU_HRP)?,
                part_number,
                description: description.clone(),
                requested_quantity: *quantity,
            });
        }

        let now = TimeStamp::new();
        Ok(Inquiry {
            id: new_uuid_to_bech32(INQUIRY_HRP)?,
            number,
            customer_ref,
            currency,
            status: InquiryStatus::New,
            skus,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

fn non_blank(value: Option<&str>, field: &str) -> LedgerResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(LedgerError::Validation(format!("{field} is required"))),
    }
}

impl Inquiry {
    pub fn sku(&self, sku_id: &str) -> Option<&InquirySku> {
        self.skus.iter().find(|sku| sku.id == sku_id)
    }

    /// Fails once the inquiry is processed.
    pub fn ensure_writable(&self) -> LedgerResult<()> {
        if self.status.is_terminal() {
            return Err(LedgerError::InvalidState {
                inquiry_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// First offer sends the inquiry, later ones put it into negotiation.
    pub fn on_version_created(&mut self, had_prior_version: bool) {
        let next = if had_prior_version {
            InquiryStatus::Negotiating
        } else {
            match self.status {
                InquiryStatus::New | InquiryStatus::Draft => InquiryStatus::Sent,
                _ => InquiryStatus::Negotiating,
            }
        };
        self.transition(next);
    }

    pub fn transition(&mut self, status: InquiryStatus) {
        self.status = status;
        self.updated_at = TimeStamp::new();
    }
}

/// Intake and manual lifecycle moves. Ledger-driven transitions happen inside the
/// version and response writes.
pub struct InquiryRegistry {
    store: Arc<Store>,
}

impl InquiryRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, new_inquiry))]
    pub fn open_inquiry(&self, new_inquiry: NewInquiry) -> LedgerResult<Inquiry> {
        let inquiry = new_inquiry.validate_and_finalise()?;

        let inquiry_bytes = encode(&inquiry)?;

        // inquiry record and its sku index commit together
        let result = (&self.store.sku_index, &self.store.inquiries).transaction(|(skus, inquiries)| {
            if inquiries.get(inquiry.id.as_bytes())?.is_some() {
                return reject(LedgerError::Conflict(format!(
                    "inquiry '{}' already exists",
                    inquiry.id
                )));
            }
            for sku in &inquiry.skus {
                skus.insert(sku.id.as_bytes(), inquiry.id.as_bytes())?;
            }
            inquiries.insert(inquiry.id.as_bytes(), inquiry_bytes.as_slice())?;
            Ok(())
        });
        settle(result)?;

        info!(inquiry_id = %inquiry.id, number = %inquiry.number, skus = inquiry.skus.len(), "inquiry opened");
        Ok(inquiry)
    }

    pub fn get_inquiry(&self, inquiry_id: &str) -> LedgerResult<Inquiry> {
        self.store.load_inquiry(inquiry_id)
    }

    /// NEW -> DRAFT, while an offer is being prepared.
    pub fn mark_draft(&self, inquiry_id: &str) -> LedgerResult<Inquiry> {
        self.move_status(inquiry_id, &[InquiryStatus::New], InquiryStatus::Draft)
    }

    /// ACCEPTED -> PROCESSED. The ledger is closed afterwards.
    pub fn mark_processed(&self, inquiry_id: &str) -> LedgerResult<Inquiry> {
        self.move_status(inquiry_id, &[InquiryStatus::Accepted], InquiryStatus::Processed)
    }

    fn move_status(
        &self,
        inquiry_id: &str,
        from: &[InquiryStatus],
        to: InquiryStatus,
    ) -> LedgerResult<Inquiry> {
        // transactional so it serialises with the version, response and history writes
        let result = self.store.inquiries.transaction(|inquiries| {
            let Some(current) = inquiries.get(inquiry_id)? else {
                return reject(LedgerError::not_found("inquiry", inquiry_id));
            };
            let mut inquiry: Inquiry = tx_decode(&current)?;
            if !from.contains(&inquiry.status) {
                return reject(LedgerError::InvalidState {
                    inquiry_id: inquiry_id.to_string(),
                    status: inquiry.status.to_string(),
                });
            }
            inquiry.transition(to);
            inquiries.insert(inquiry_id.as_bytes(), tx_encode(&inquiry)?)?;
            Ok(inquiry)
        });

        let inquiry = settle(result)?.ok_or_else(|| {
            LedgerError::Conflict(format!("status of inquiry '{inquiry_id}' changed concurrently"))
        })?;
        info!(inquiry_id, status = %to, "inquiry status changed");
        Ok(inquiry)
    }
}
