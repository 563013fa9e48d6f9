//! Walks one inquiry through a full negotiation.
//!
//! ```text
//! cargo run --example negotiation              # throwaway database
//! cargo run --example negotiation -- ledger.yaml
//! ```
//!
//! Log level comes from `RFQ_LEDGER_LOG`, defaulting to `info`.

use rfq_ledger::{
    NegotiationLedger,
    api::LedgerApi,
    config::LedgerConfig,
    currency::CurrencyConverter,
    history::{EditField, LineDraft, OptimisticEdit},
    inquiry::NewInquiry,
    response::{NewCustomerResponse, NewQuotationResponse, NewResponseLine},
    types::{
        Amount, ChangedBy, CommunicationMethod, CustomerResponseStatus, EntryType, ItemStatus,
        OverallStatus,
    },
    version::NewVersion,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fixed demo rate, EUR to USD only.
struct DemoRates;

impl CurrencyConverter for DemoRates {
    fn convert(&self, amount: Amount, from: &str, to: &str) -> Option<Amount> {
        match (from, to) {
            ("EUR", "USD") => Some(Amount::new(amount.value() * Decimal::new(108, 2)).round_to(2)),
            (from, to) if from == to => Some(amount),
            _ => None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("RFQ_LEDGER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ledger = match std::env::args().nth(1) {
        Some(path) => NegotiationLedger::open(LedgerConfig::load(Some(&path))?)?,
        None => NegotiationLedger::new(Arc::new(LedgerConfig::temporary()?), LedgerConfig::default())?,
    };

    let inquiry = ledger.inquiries().open_inquiry(
        NewInquiry::new()
            .set_number("RFQ-2024-0042")
            .set_customer("ACME Corp")
            .set_currency("EUR")
            .add_sku("6204-2RS", Some("deep groove ball bearing"), 500)
            .add_sku("CR-25x40", Some("radial shaft seal"), 200),
    )?;
    let (bearing, seal) = (&inquiry.skus[0].id, &inquiry.skus[1].id);
    ledger.inquiries().mark_draft(&inquiry.id)?;

    // v1: our opening quote
    let v1 = ledger.versions().create_version(
        &inquiry.id,
        NewVersion::new(EntryType::InternalQuote, "alice")
            .add_item(bearing, 500, Amount::from_minor(412))
            .add_item(seal, 200, Amount::from_minor(189)),
    )?;
    info!(version = v1.version.version_number, total = %v1.version.total_amount, "opening quote sent");

    // the customer answers line by line
    let reply = ledger.responses().record_quotation_response(
        &v1.version.id,
        NewQuotationResponse::new(OverallStatus::Negotiating, CommunicationMethod::Email, "alice")
            .set_contact("J. Buyer")
            .add_line(NewResponseLine::new(&v1.items[0].id, bearing, ItemStatus::CounterProposed).request(
                Some(600),
                Some(Amount::from_minor(380)),
            ))
            .add_line(NewResponseLine::new(&v1.items[1].id, seal, ItemStatus::Accepted)),
    )?;
    info!(sequence = reply.response.response.sequence_number, "customer reply logged");

    // inline edit on the bearing line before cutting a counter offer
    let mut draft = LineDraft::new(500, Amount::from_minor(412));
    OptimisticEdit::apply(&mut draft, EditField::UnitPrice(Amount::from_minor(395))).commit(
        ledger.changes(),
        bearing,
        ChangedBy::Internal,
        "alice",
        Some("volume discount"),
    )?;
    OptimisticEdit::apply(&mut draft, EditField::Quantity(600)).commit(
        ledger.changes(),
        bearing,
        ChangedBy::Customer,
        "alice",
        None,
    )?;

    let v2 = ledger.versions().create_version(
        &inquiry.id,
        NewVersion::new(EntryType::CounterOffer, "alice")
            .add_item(bearing, draft.quantity, draft.unit_price)
            .add_item(seal, 200, Amount::from_minor(189))
            .set_notes("volume discount for 600 pcs"),
    )?;
    ledger.responses().record_customer_response(
        &v2.version.id,
        NewCustomerResponse::new(CustomerResponseStatus::Accepted).set_comments("PO to follow"),
    )?;
    ledger.inquiries().mark_processed(&inquiry.id)?;

    for total in ledger.display_totals(&inquiry.id, "USD", &DemoRates)? {
        info!(
            version = total.version_number,
            total = %total.total,
            currency = %total.currency,
            converted = ?total.converted.map(|amount| amount.to_string()),
            "version total"
        );
    }

    let api = LedgerApi::new(ledger);
    let state = api.negotiation_state(&inquiry.id);
    println!("{}", serde_json::to_string_pretty(&state)?);

    api.ledger().flush()?;
    Ok(())
}
