//! Smoke Screen tests for the request/response boundary
//!
//! Bodies are built with `serde_json::json!` the way a web handler would hand them over.
//! These check envelopes and status codes, the ledger semantics behind them are covered
//! in the scenario tests.
//!

use rfq_ledger::{
    NegotiationLedger,
    api::LedgerApi,
    config::LedgerConfig,
    error::ErrorKind,
    inquiry::{Inquiry, NewInquiry},
    types::VersionStatus,
};
use serde_json::json;
use std::sync::Arc;

fn api() -> anyhow::Result<(LedgerApi, Inquiry)> {
    let db = Arc::new(LedgerConfig::temporary()?);
    let ledger = NegotiationLedger::new(db, LedgerConfig::default())?;
    let inquiry = ledger.inquiries().open_inquiry(
        NewInquiry::new()
            .set_number("RFQ-2024-0100")
            .set_customer("Globex")
            .set_currency("usd")
            .add_sku("A", None, 5)
            .add_sku("B", Some("gasket"), 10),
    )?;
    Ok((LedgerApi::new(ledger), inquiry))
}

// VERSION ENDPOINT TESTS
#[cfg(test)]
mod version_tests {
    use super::*;

    /// Test that a created version reports number, status and rounded final price
    #[test]
    fn create_version_returns_created() -> anyhow::Result<()> {
        let (api, inquiry) = api()?;
        let response = api.create_version(
            &inquiry.id,
            "alice",
            json!({
                "entryType": "INTERNAL_QUOTE",
                "items": [{ "skuId": inquiry.skus[0].id, "quantity": 5, "unitPrice": "10.00" }]
            }),
        );

        assert!(response.success);
        assert_eq!(response.status_code, 201);
        let created = response.data.ok_or_else(|| anyhow::anyhow!("missing data"))?;
        assert_eq!(created.version_number, 1);
        assert_eq!(created.status, VersionStatus::Sent);
        assert_eq!(created.final_price.to_string(), "50.00");
        assert_eq!(created.item_count, 1);
        Ok(())
    }

    /// Test that customer feedback versions are stored as received
    #[test]
    fn customer_feedback_is_received() -> anyhow::Result<()> {
        let (api, inquiry) = api()?;
        let response = api.create_version(
            &inquiry.id,
            "alice",
            json!({
                "entryType": "CUSTOMER_FEEDBACK",
                "notes": "call notes",
                "items": [{ "skuId": inquiry.skus[1].id, "quantity": 10, "unitPrice": "1.005" }]
            }),
        );
        let created = response.data.ok_or_else(|| anyhow::anyhow!("missing data"))?;
        assert_eq!(created.status, VersionStatus::Received);
        assert_eq!(created.final_price.to_string(), "10.05");
        Ok(())
    }

    /// Test that malformed bodies are rejected as validation errors
    #[test]
    fn malformed_body_is_bad_request() -> anyhow::Result<()> {
        let (api, inquiry) = api()?;

        let unknown_type = api.create_version(
            &inquiry.id,
            "alice",
            json!({ "entryType": "SUPPLIER_QUOTE", "items": [] }),
        );
        assert!(!unknown_type.success);
        assert_eq!(unknown_type.status_code, 400);

        let empty = api.create_version(&inquiry.id, "alice", json!({ "entryType": "COUNTER_OFFER", "items": [] }));
        assert_eq!(empty.status_code, 400);
        assert_eq!(empty.error.map(|e| e.kind), Some(ErrorKind::Validation));

        let negative = api.create_version(
            &inquiry.id,
            "alice",
            json!({
                "entryType": "COUNTER_OFFER",
                "items": [{ "skuId": inquiry.skus[0].id, "quantity": -1, "unitPrice": "1.00" }]
            }),
        );
        assert_eq!(negative.status_code, 400);
        Ok(())
    }

    /// Test that unknown inquiries map to not found
    #[test]
    fn unknown_inquiry_is_not_found() -> anyhow::Result<()> {
        let (api, _) = api()?;
        let listed = api.list_versions("rfq1unknown");
        assert_eq!(listed.status_code, 404);
        assert_eq!(listed.error.map(|e| e.kind), Some(ErrorKind::NotFound));
        Ok(())
    }

    /// Test that the list envelope serialises the wire names
    #[test]
    fn listed_versions_use_wire_names() -> anyhow::Result<()> {
        let (api, inquiry) = api()?;
        api.create_version(
            &inquiry.id,
            "alice",
            json!({
                "entryType": "INTERNAL_QUOTE",
                "items": [{ "skuId": inquiry.skus[0].id, "quantity": 2, "unitPrice": "3.50" }]
            }),
        );

        let listed = serde_json::to_value(api.list_versions(&inquiry.id))?;
        assert_eq!(listed["statusCode"], 200);
        assert_eq!(listed["data"][0]["versionNumber"], 1);
        assert_eq!(listed["data"][0]["entryType"], "INTERNAL_QUOTE");
        assert_eq!(listed["data"][0]["finalPrice"], "7.00");
        assert_eq!(listed["data"][0]["quotationResponseCount"], 0);
        assert!(listed.get("error").is_none());
        Ok(())
    }
}

// RESPONSE ENDPOINT TESTS
#[cfg(test)]
mod response_tests {
    use super::*;

    fn first_version(api: &LedgerApi, inquiry: &Inquiry) -> anyhow::Result<(String, String)> {
        let created = api
            .create_version(
                &inquiry.id,
                "alice",
                json!({
                    "entryType": "INTERNAL_QUOTE",
                    "items": [{ "skuId": inquiry.skus[0].id, "quantity": 5, "unitPrice": "10.00" }]
                }),
            )
            .data
            .ok_or_else(|| anyhow::anyhow!("version not created"))?;
        let version = api.ledger().versions().find_version(&created.id)?;
        Ok((created.id, version.items[0].id.clone()))
    }

    /// Test that a second customer response is a conflict
    #[test]
    fn duplicate_customer_response_conflicts() -> anyhow::Result<()> {
        let (api, inquiry) = api()?;
        let (version_id, _) = first_version(&api, &inquiry)?;

        let first = api.record_customer_response(&version_id, json!({ "status": "NEGOTIATING" }));
        assert_eq!(first.status_code, 201);

        let second = api.record_customer_response(&version_id, json!({ "status": "ACCEPTED" }));
        assert_eq!(second.status_code, 409);
        assert_eq!(second.error.map(|e| e.kind), Some(ErrorKind::Conflict));
        Ok(())
    }

    /// Test that an inconsistent overall status comes back as a warning
    #[test]
    fn status_mismatch_is_a_warning() -> anyhow::Result<()> {
        let (api, inquiry) = api()?;
        let (version_id, item_id) = first_version(&api, &inquiry)?;

        let response = api.record_quotation_response(
            &version_id,
            "bob",
            json!({
                "overallStatus": "ACCEPTED",
                "responseDate": "2024-05-01T10:00:00Z",
                "communicationMethod": "EMAIL",
                "responseItems": [{
                    "quotationVersionItemId": item_id,
                    "skuId": inquiry.skus[0].id,
                    "itemStatus": "DECLINED"
                }]
            }),
        );

        assert!(response.success);
        assert_eq!(response.warnings.len(), 1);
        let recorded = response.data.ok_or_else(|| anyhow::anyhow!("missing data"))?;
        assert_eq!(recorded.response.sequence_number, 1);
        assert_eq!(recorded.response.recorded_by, "bob");
        Ok(())
    }

    /// Test that unknown versions are not found for both response kinds
    #[test]
    fn unknown_version_is_not_found() -> anyhow::Result<()> {
        let (api, _) = api()?;
        assert_eq!(
            api.record_customer_response("qv1unknown", json!({ "status": "ACCEPTED" }))
                .status_code,
            404
        );
        assert_eq!(api.list_quotation_responses("qv1unknown").status_code, 404);
        Ok(())
    }
}

// HISTORY ENDPOINT TESTS
#[cfg(test)]
mod history_tests {
    use super::*;

    /// Test that a recorded sku change is listed back newest first
    #[test]
    fn sku_change_round_trips() -> anyhow::Result<()> {
        let (api, inquiry) = api()?;
        let sku_id = &inquiry.skus[0].id;

        for (old, new) in [("10.00", "12.00"), ("12.00", "11.50")] {
            let recorded = api.record_sku_change(
                "carol",
                json!({
                    "itemId": sku_id,
                    "oldQuantity": 5,
                    "newQuantity": 5,
                    "oldUnitPrice": old,
                    "newUnitPrice": new,
                    "changedBy": "CUSTOMER"
                }),
            );
            assert_eq!(recorded.status_code, 201);
        }

        let history = api.list_sku_history(&inquiry.id);
        let rows = history.data.ok_or_else(|| anyhow::anyhow!("missing data"))?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sequence_number, 2);
        assert_eq!(rows[0].author, "carol");
        Ok(())
    }

    /// Test that a no-op edit is rejected
    #[test]
    fn unchanged_values_are_rejected() -> anyhow::Result<()> {
        let (api, inquiry) = api()?;
        let recorded = api.record_sku_change(
            "carol",
            json!({
                "itemId": inquiry.skus[0].id,
                "oldQuantity": 5,
                "newQuantity": 5,
                "oldUnitPrice": "10.00",
                "newUnitPrice": "10.00",
                "changedBy": "INTERNAL"
            }),
        );
        assert_eq!(recorded.status_code, 400);
        Ok(())
    }
}
