//! Request/response boundary. Bodies arrive as loose JSON and are parsed into closed types
//! here; nothing downstream sees an unvalidated payload.
use crate::error::{ErrorKind, LedgerError, LedgerResult};
use crate::history::{SkuChange, SkuNegotiationHistory};
use crate::ledger::{NegotiationLedger, NegotiationState};
use crate::response::{CustomerResponse, NewCustomerResponse, NewQuotationResponse, QuotationResponseWithItems};
use crate::types::{Amount, EntryType, VersionStatus};
use crate::version::{NewVersion, NewVersionItem, VersionListing};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Envelope returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> ApiResponse<T> {
    fn ok(status_code: u16, data: T) -> Self {
        Self {
            success: true,
            status_code,
            data: Some(data),
            error: None,
            warnings: vec![],
        }
    }

    fn failed(err: LedgerError) -> Self {
        debug!(error = %err, status_code = err.status_code(), "request failed");
        Self {
            success: false,
            status_code: err.status_code(),
            data: None,
            error: Some(ApiError {
                kind: err.kind(),
                message: err.to_string(),
            }),
            warnings: vec![],
        }
    }

    fn from_result(status_code: u16, result: LedgerResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(status_code, data),
            Err(err) => Self::failed(err),
        }
    }

    fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVersionBody {
    entry_type: EntryType,
    #[serde(default)]
    notes: Option<String>,
    items: Vec<NewVersionItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedVersion {
    pub id: String,
    pub version_number: u32,
    pub status: VersionStatus,
    pub final_price: Amount,
    pub item_count: u32,
}

fn parse<T: DeserializeOwned>(body: Value) -> LedgerResult<T> {
    serde_json::from_value(body).map_err(|e| LedgerError::Validation(e.to_string()))
}

pub struct LedgerApi {
    ledger: NegotiationLedger,
}

impl LedgerApi {
    pub fn new(ledger: NegotiationLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &NegotiationLedger {
        &self.ledger
    }

    /// `POST createVersion`. `actor` is the authenticated user.
    pub fn create_version(&self, inquiry_id: &str, actor: &str, body: Value) -> ApiResponse<CreatedVersion> {
        let result = parse::<CreateVersionBody>(body).and_then(|body| {
            let new_version = NewVersion {
                entry_type: body.entry_type,
                items: body.items,
                notes: body.notes,
                author: actor.to_string(),
            };
            self.ledger.versions().create_version(inquiry_id, new_version)
        });

        ApiResponse::from_result(
            201,
            result.map(|created| CreatedVersion {
                id: created.version.id,
                version_number: created.version.version_number,
                status: created.version.status,
                final_price: created.version.total_amount,
                item_count: created.version.item_count,
            }),
        )
    }

    /// `GET listVersions`
    pub fn list_versions(&self, inquiry_id: &str) -> ApiResponse<Vec<VersionListing>> {
        ApiResponse::from_result(200, self.ledger.versions().get_versions(inquiry_id))
    }

    /// `POST recordCustomerResponse`
    pub fn record_customer_response(&self, version_id: &str, body: Value) -> ApiResponse<CustomerResponse> {
        let result = parse::<NewCustomerResponse>(body)
            .and_then(|body| self.ledger.responses().record_customer_response(version_id, body));
        ApiResponse::from_result(201, result)
    }

    /// `POST recordQuotationResponse`. A disagreeing overall status comes back as a warning.
    pub fn record_quotation_response(
        &self,
        version_id: &str,
        actor: &str,
        body: Value,
    ) -> ApiResponse<QuotationResponseWithItems> {
        let result = parse::<NewQuotationResponse>(body).and_then(|mut body| {
            if body.recorded_by.trim().is_empty() {
                body.recorded_by = actor.to_string();
            }
            self.ledger.responses().record_quotation_response(version_id, body)
        });

        match result {
            Ok(recorded) => {
                let warnings = recorded
                    .status_mismatch
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                ApiResponse::ok(201, recorded.response).with_warnings(warnings)
            }
            Err(err) => ApiResponse::failed(err),
        }
    }

    /// `GET listQuotationResponses`
    pub fn list_quotation_responses(&self, version_id: &str) -> ApiResponse<Vec<QuotationResponseWithItems>> {
        ApiResponse::from_result(200, self.ledger.responses().list_quotation_responses(version_id))
    }

    /// `POST recordSkuChange`
    pub fn record_sku_change(&self, actor: &str, body: Value) -> ApiResponse<SkuNegotiationHistory> {
        let result = parse::<SkuChange>(body).and_then(|mut change| {
            if change.author.trim().is_empty() {
                change.author = actor.to_string();
            }
            self.ledger.changes().record_change(change)
        });
        ApiResponse::from_result(201, result)
    }

    /// `GET listSkuHistory`, newest first.
    pub fn list_sku_history(&self, inquiry_id: &str) -> ApiResponse<Vec<SkuNegotiationHistory>> {
        ApiResponse::from_result(200, self.ledger.changes().inquiry_history(inquiry_id))
    }

    pub fn negotiation_state(&self, inquiry_id: &str) -> ApiResponse<NegotiationState> {
        ApiResponse::from_result(200, self.ledger.negotiation_state(inquiry_id))
    }
}
