//! Shared value types and the closed status vocabularies of the ledger
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
            .unwrap_or_else(Self::new)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TimeStamp<Utc> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        DateTime::<Utc>::deserialize(deserializer).map(TimeStamp)
    }
}

/// Monetary amount in the inquiry's currency of record.
///
/// Stored as the 16 byte `rust_decimal` representation so no precision is lost between
/// writes and reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }
    /// Convenience for minor units, e.g. `Amount::from_minor(1050)` is 10.50.
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }
    pub fn value(&self) -> Decimal {
        self.0
    }
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
    /// Rounds to `scale` decimals, half away from zero.
    pub fn round_to(&self, scale: u32) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.round_to(2).0)
    }
}

impl<C> minicbor::Encode<C> for Amount {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        self.0.serialize().encode(e, ctx)
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Amount {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let raw: [u8; 16] = d.decode()?;

        Ok(Amount(Decimal::deserialize(raw)))
    }
}

macro_rules! ledger_enum {
    ($(#[$meta:meta])* $name:ident { $($idx:literal => $variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            minicbor::Encode,
            minicbor::Decode,
            Serialize,
            Deserialize,
            strum::Display,
            strum::EnumString,
            strum::EnumIter,
        )]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        #[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $(
                #[n($idx)]
                $variant,
            )+
        }
    };
}

ledger_enum!(
    /// Lifecycle of the inquiry itself.
    InquiryStatus {
        0 => New,
        1 => Draft,
        2 => Sent,
        3 => Negotiating,
        4 => Accepted,
        5 => Declined,
        6 => Processed,
    }
);

ledger_enum!(
    /// Where a quotation version came from.
    EntryType {
        0 => InternalQuote,
        1 => CustomerFeedback,
        2 => CounterOffer,
    }
);

ledger_enum!(
    /// Fixed at creation: offers we issue are `Sent`, offers captured from the customer are `Received`.
    VersionStatus {
        0 => Sent,
        1 => Received,
    }
);

ledger_enum!(
    /// Coarse verdict on a version.
    CustomerResponseStatus {
        0 => Accepted,
        1 => Declined,
        2 => Negotiating,
    }
);

ledger_enum!(
    OverallStatus {
        0 => Pending,
        1 => Accepted,
        2 => Declined,
        3 => PartialAccepted,
        4 => Negotiating,
    }
);

ledger_enum!(
    ItemStatus {
        0 => Pending,
        1 => Accepted,
        2 => Declined,
        3 => CounterProposed,
        4 => NeedsClarification,
    }
);

ledger_enum!(
    CommunicationMethod {
        0 => Email,
        1 => Phone,
        2 => Meeting,
        3 => Portal,
    }
);

ledger_enum!(
    ChangeType {
        0 => PriceChange,
        1 => QuantityChange,
        2 => Both,
    }
);

ledger_enum!(
    ChangedBy {
        0 => Internal,
        1 => Customer,
    }
);

impl InquiryStatus {
    /// Processed inquiries are archived; nothing may be appended to their ledger.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InquiryStatus::Processed)
    }
    /// Still expecting offers or replies.
    pub fn is_open(&self) -> bool {
        !matches!(
            self,
            InquiryStatus::Accepted | InquiryStatus::Declined | InquiryStatus::Processed
        )
    }
}

impl EntryType {
    pub fn version_status(&self) -> VersionStatus {
        match self {
            EntryType::InternalQuote | EntryType::CounterOffer => VersionStatus::Sent,
            EntryType::CustomerFeedback => VersionStatus::Received,
        }
    }
}

impl From<CustomerResponseStatus> for InquiryStatus {
    fn from(value: CustomerResponseStatus) -> Self {
        match value {
            CustomerResponseStatus::Accepted => InquiryStatus::Accepted,
            CustomerResponseStatus::Declined => InquiryStatus::Declined,
            CustomerResponseStatus::Negotiating => InquiryStatus::Negotiating,
        }
    }
}

impl OverallStatus {
    /// Inquiry status implied by a detailed response, `None` when the inquiry stays put.
    pub fn inquiry_transition(&self) -> Option<InquiryStatus> {
        match self {
            OverallStatus::Pending => None,
            OverallStatus::Accepted => Some(InquiryStatus::Accepted),
            OverallStatus::Declined => Some(InquiryStatus::Declined),
            OverallStatus::PartialAccepted | OverallStatus::Negotiating => {
                Some(InquiryStatus::Negotiating)
            }
        }
    }
}
