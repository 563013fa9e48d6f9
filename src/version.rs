//! Immutable, numbered quotation versions and their line items
use crate::error::{LedgerError, LedgerResult};
use crate::inquiry::Inquiry;
use crate::pricing::{self, PricedLine};
use crate::response::CustomerResponse;
use crate::store::{Store, encode, reject, sequence_taken, settle, tx_decode, tx_encode};
use crate::types::{Amount, EntryType, TimeStamp, VersionStatus};
use crate::utils::{VERSION_HRP, VERSION_ITEM_HRP, new_uuid_to_bech32, sequence_key};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Transactional;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationVersion {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub inquiry_id: String,
    #[n(2)]
    pub version_number: u32,
    #[n(3)]
    pub entry_type: EntryType,
    #[n(4)]
    pub status: VersionStatus,
    #[n(5)]
    #[serde(rename = "finalPrice")]
    pub total_amount: Amount, // cached, always Σ item totals
    #[n(6)]
    pub item_count: u32,
    #[n(7)]
    pub items_digest: String, // sha256 over the cbor encoded items
    #[n(8)]
    pub created_by: String,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationVersionItem {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub version_id: String,
    #[n(2)]
    pub line: u32,
    #[n(3)]
    pub sku_id: String,
    #[n(4)]
    pub quantity: i64,
    #[n(5)]
    pub unit_price: Amount,
    #[n(6)]
    pub total: Amount,
    #[n(7)]
    pub comment: Option<String>,
}

impl PricedLine for QuotationVersionItem {
    fn quantity(&self) -> i64 {
        self.quantity
    }
    fn unit_price(&self) -> Amount {
        self.unit_price
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVersionItem {
    pub sku_id: String,
    pub quantity: i64,
    pub unit_price: Amount,
    #[serde(default)]
    pub comment: Option<String>,
}

impl PricedLine for NewVersionItem {
    fn quantity(&self) -> i64 {
        self.quantity
    }
    fn unit_price(&self) -> Amount {
        self.unit_price
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersion {
    pub entry_type: EntryType,
    pub items: Vec<NewVersionItem>,
    pub notes: Option<String>,
    pub author: String,
}

impl NewVersion {
    pub fn new(entry_type: EntryType, author: &str) -> Self {
        Self {
            entry_type,
            items: vec![],
            notes: None,
            author: author.into(),
        }
    }
    pub fn add_item(mut self, sku_id: &str, quantity: i64, unit_price: Amount) -> Self {
        self.items.push(NewVersionItem {
            sku_id: sku_id.into(),
            quantity,
            unit_price,
            comment: None,
        });
        self
    }
    pub fn add_item_with_comment(
        mut self,
        sku_id: &str,
        quantity: i64,
        unit_price: Amount,
        comment: &str,
    ) -> Self {
        self.items.push(NewVersionItem {
            sku_id: sku_id.into(),
            quantity,
            unit_price,
            comment: Some(comment.into()),
        });
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Structural checks that need no storage access.
    fn validate(&self, inquiry: &Inquiry) -> LedgerResult<()> {
        if self.items.is_empty() {
            return Err(LedgerError::Validation(
                "a version needs at least one item".into(),
            ));
        }
        if self.author.trim().is_empty() {
            return Err(LedgerError::Validation("author is required".into()));
        }
        let mut seen = HashSet::new();
        for item in &self.items {
            if inquiry.sku(&item.sku_id).is_none() {
                return Err(LedgerError::not_found("sku", &item.sku_id));
            }
            if !seen.insert(item.sku_id.as_str()) {
                return Err(LedgerError::Validation(format!(
                    "sku '{}' appears more than once",
                    item.sku_id
                )));
            }
        }
        Ok(())
    }
}

/// A version together with its lines, as created or loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionWithItems {
    #[serde(flatten)]
    pub version: QuotationVersion,
    pub items: Vec<QuotationVersionItem>,
}

/// List entry: responses are summarised, not expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionListing {
    #[serde(flatten)]
    pub version: QuotationVersion,
    pub items: Vec<QuotationVersionItem>,
    pub customer_response: Option<CustomerResponse>,
    pub quotation_response_count: usize,
}

pub(crate) fn items_digest(items: &[QuotationVersionItem]) -> LedgerResult<String> {
    Ok(sha256::digest(&encode(&items.to_vec())?))
}

pub struct VersionManager {
    store: Arc<Store>,
}

impl VersionManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Appends the next version for the inquiry. Version, items, index entry and the
    /// inquiry's status change commit together.
    #[tracing::instrument(skip(self, new_version), fields(entry_type = %new_version.entry_type, items = new_version.items.len()))]
    pub fn create_version(
        &self,
        inquiry_id: &str,
        new_version: NewVersion,
    ) -> LedgerResult<VersionWithItems> {
        let inquiry = self.store.load_inquiry(inquiry_id)?;
        inquiry.ensure_writable()?;
        if let Err(err) = new_version.validate(&inquiry) {
            debug!(error = %err, "version rejected");
            return Err(err);
        }

        let total_amount = pricing::version_total(&new_version.items)?;
        let version_id = new_uuid_to_bech32(VERSION_HRP)?;
        let item_ids = new_version
            .items
            .iter()
            .map(|_| new_uuid_to_bech32(VERSION_ITEM_HRP))
            .collect::<LedgerResult<Vec<_>>>()?;

        let mut items = Vec::with_capacity(new_version.items.len());
        for (line, (item, id)) in new_version.items.iter().zip(item_ids).enumerate() {
            items.push(QuotationVersionItem {
                id,
                version_id: version_id.clone(),
                line: line as u32 + 1,
                sku_id: item.sku_id.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total: pricing::line_total(item.quantity, item.unit_price)?,
                comment: item.comment.clone(),
            });
        }
        let digest = items_digest(&items)?;
        let encoded_items = items
            .iter()
            .map(|item| Ok((sequence_key(&version_id, item.line), encode(item)?)))
            .collect::<LedgerResult<Vec<_>>>()?;

        let store = &self.store;
        let created = store.append_sequenced(&store.versions, inquiry_id, |version_number| {
            let version = QuotationVersion {
                id: version_id.clone(),
                inquiry_id: inquiry_id.to_string(),
                version_number,
                entry_type: new_version.entry_type,
                status: new_version.entry_type.version_status(),
                total_amount,
                item_count: items.len() as u32,
                items_digest: digest.clone(),
                created_by: new_version.author.clone(),
                created_at: TimeStamp::new(),
                notes: new_version.notes.clone(),
            };
            let version_key = sequence_key(inquiry_id, version_number);
            let version_bytes = encode(&version)?;

            let result = (
                &store.versions,
                &store.version_index,
                &store.version_items,
                &store.inquiries,
            )
                .transaction(|(versions, index, version_items, inquiries)| {
                    if versions.get(version_key.as_slice())?.is_some() {
                        return sequence_taken();
                    }
                    let Some(inquiry_bytes) = inquiries.get(inquiry_id)? else {
                        return reject(LedgerError::not_found("inquiry", inquiry_id));
                    };
                    let mut inquiry: Inquiry = tx_decode(&inquiry_bytes)?;
                    if let Err(err) = inquiry.ensure_writable() {
                        return reject(err);
                    }
                    inquiry.on_version_created(version_number > 1);

                    versions.insert(version_key.as_slice(), version_bytes.as_slice())?;
                    index.insert(version_id.as_bytes(), version_key.as_slice())?;
                    for (key, bytes) in &encoded_items {
                        version_items.insert(key.as_slice(), bytes.as_slice())?;
                    }
                    inquiries.insert(inquiry_id.as_bytes(), tx_encode(&inquiry)?)?;
                    Ok(())
                });

            Ok(settle::<()>(result)?.map(|_| version.clone()))
        })?;

        info!(
            version_id = %created.id,
            version_number = created.version_number,
            total = %created.total_amount,
            "quotation version created"
        );

        Ok(VersionWithItems {
            version: created,
            items,
        })
    }

    /// All versions of the inquiry, ascending by number.
    pub fn get_versions(&self, inquiry_id: &str) -> LedgerResult<Vec<VersionListing>> {
        self.store.load_inquiry(inquiry_id)?;

        let versions: Vec<QuotationVersion> = self.store.scan(&self.store.versions, inquiry_id)?;
        versions
            .into_iter()
            .map(|version| {
                let items = self.load_items(&version)?;
                let customer_response = self
                    .store
                    .get(&self.store.customer_responses, &version.id)?;
                let quotation_response_count = self
                    .store
                    .count(&self.store.quotation_responses, &version.id)?;
                Ok(VersionListing {
                    version,
                    items,
                    customer_response,
                    quotation_response_count,
                })
            })
            .collect()
    }

    pub fn get_version(&self, inquiry_id: &str, version_number: u32) -> LedgerResult<VersionWithItems> {
        let version: QuotationVersion = self
            .store
            .get(&self.store.versions, sequence_key(inquiry_id, version_number))?
            .ok_or_else(|| {
                LedgerError::not_found("version", format!("{inquiry_id}#{version_number}"))
            })?;
        let items = self.load_items(&version)?;
        Ok(VersionWithItems { version, items })
    }

    /// Looks a version up by its surrogate id.
    pub fn find_version(&self, version_id: &str) -> LedgerResult<VersionWithItems> {
        load_version_by_id(&self.store, version_id)
    }

    fn load_items(&self, version: &QuotationVersion) -> LedgerResult<Vec<QuotationVersionItem>> {
        load_items(&self.store, version)
    }
}

pub(crate) fn load_version_by_id(store: &Store, version_id: &str) -> LedgerResult<VersionWithItems> {
    let key = store
        .version_index
        .get(version_id)?
        .ok_or_else(|| LedgerError::not_found("version", version_id))?;
    let version: QuotationVersion = store
        .get(&store.versions, key)?
        .ok_or_else(|| LedgerError::Integrity(format!("index points at a missing version '{version_id}'")))?;
    let items = load_items(store, &version)?;
    Ok(VersionWithItems { version, items })
}

/// Loads the lines and checks them against the digest and cached total taken at creation.
fn load_items(store: &Store, version: &QuotationVersion) -> LedgerResult<Vec<QuotationVersionItem>> {
    let items: Vec<QuotationVersionItem> = store.scan(&store.version_items, &version.id)?;

    if items_digest(&items)? != version.items_digest {
        return Err(LedgerError::Integrity(format!(
            "items of version '{}' changed after creation",
            version.id
        )));
    }
    if pricing::version_total(&items)? != version.total_amount {
        return Err(LedgerError::Integrity(format!(
            "cached total of version '{}' does not match its items",
            version.id
        )));
    }
    Ok(items)
}

