//! Read-side view over a whole negotiation. Writes go through the components it hands out.
use crate::config::LedgerConfig;
use crate::currency::CurrencyConverter;
use crate::error::LedgerResult;
use crate::history::{ChangeRecorder, SkuNegotiationHistory};
use crate::inquiry::{Inquiry, InquiryRegistry};
use crate::response::ResponseRecorder;
use crate::store::Store;
use crate::types::Amount;
use crate::version::{VersionListing, VersionManager};
use serde::Serialize;
use sled::Db;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationState {
    pub inquiry: Inquiry,
    pub versions: Vec<VersionListing>,
    /// History rows keyed by sku id, oldest first within each sku.
    pub sku_history: BTreeMap<String, Vec<SkuNegotiationHistory>>,
}

impl NegotiationState {
    pub fn latest_version(&self) -> Option<&VersionListing> {
        self.versions.last()
    }

    /// The newest offer has no reply of either kind yet.
    pub fn awaiting_response(&self) -> bool {
        self.latest_version().is_some_and(|listing| {
            listing.customer_response.is_none() && listing.quotation_response_count == 0
        })
    }

    pub fn is_open(&self) -> bool {
        self.inquiry.status.is_open()
    }

    /// Inline edits made against the sku so far.
    pub fn renegotiation_count(&self, sku_id: &str) -> usize {
        self.sku_history.get(sku_id).map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayTotal {
    pub version_number: u32,
    pub total: Amount,
    pub currency: String,
    /// `None` when the converter knows no rate.
    pub converted: Option<Amount>,
    pub display_currency: String,
}

/// Composition root: owns the store and the four ledger components.
pub struct NegotiationLedger {
    store: Arc<Store>,
    inquiries: InquiryRegistry,
    versions: VersionManager,
    responses: ResponseRecorder,
    changes: ChangeRecorder,
}

impl NegotiationLedger {
    pub fn new(instance: Arc<Db>, config: LedgerConfig) -> LedgerResult<Self> {
        let store = Arc::new(Store::open(instance, config)?);
        Ok(Self {
            inquiries: InquiryRegistry::new(store.clone()),
            versions: VersionManager::new(store.clone()),
            responses: ResponseRecorder::new(store.clone()),
            changes: ChangeRecorder::new(store.clone()),
            store,
        })
    }

    /// Opens the sled database named by the config.
    pub fn open(config: LedgerConfig) -> LedgerResult<Self> {
        let db = config.open_db()?;
        Self::new(Arc::new(db), config)
    }

    pub fn inquiries(&self) -> &InquiryRegistry {
        &self.inquiries
    }
    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }
    pub fn responses(&self) -> &ResponseRecorder {
        &self.responses
    }
    pub fn changes(&self) -> &ChangeRecorder {
        &self.changes
    }

    pub fn flush(&self) -> LedgerResult<usize> {
        self.store.flush()
    }

    /// Everything the negotiation screen needs for one inquiry.
    pub fn negotiation_state(&self, inquiry_id: &str) -> LedgerResult<NegotiationState> {
        let inquiry = self.store.load_inquiry(inquiry_id)?;
        let versions = self.versions.get_versions(inquiry_id)?;

        let mut sku_history = BTreeMap::new();
        for sku in &inquiry.skus {
            let rows = self.changes.sku_history(&sku.id)?;
            if !rows.is_empty() {
                sku_history.insert(sku.id.clone(), rows);
            }
        }

        Ok(NegotiationState {
            inquiry,
            versions,
            sku_history,
        })
    }

    /// Version totals in another currency, for display. Stored totals are untouched.
    pub fn display_totals(
        &self,
        inquiry_id: &str,
        display_currency: &str,
        converter: &dyn CurrencyConverter,
    ) -> LedgerResult<Vec<DisplayTotal>> {
        let inquiry = self.store.load_inquiry(inquiry_id)?;
        let versions = self.versions.get_versions(inquiry_id)?;

        Ok(versions
            .into_iter()
            .map(|listing| DisplayTotal {
                version_number: listing.version.version_number,
                total: listing.version.total_amount,
                currency: inquiry.currency.clone(),
                converted: converter.convert(
                    listing.version.total_amount,
                    &inquiry.currency,
                    display_currency,
                ),
                display_currency: display_currency.to_string(),
            })
            .collect())
    }
}
