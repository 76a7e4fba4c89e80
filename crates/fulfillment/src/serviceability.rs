//! Pincode serviceability and delivery-time estimates.

use domain::Pincode;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::FulfillmentError;
use crate::services::{Carrier, PincodeInfo};

const METRO_CITIES: &[&str] = &[
    "delhi",
    "new delhi",
    "mumbai",
    "bengaluru",
    "bangalore",
    "chennai",
    "kolkata",
    "hyderabad",
    "pune",
    "ahmedabad",
];

const METRO_STATES: &[&str] = &["DL"];

const TIER_TWO_CITIES: &[&str] = &[
    "jaipur",
    "lucknow",
    "chandigarh",
    "kochi",
    "indore",
    "nagpur",
    "coimbatore",
    "surat",
    "bhopal",
    "visakhapatnam",
    "vadodara",
    "patna",
    "bhubaneswar",
    "mysuru",
    "mysore",
    "nashik",
    "ludhiana",
    "kanpur",
    "thiruvananthapuram",
    "guwahati",
    "dehradun",
];

/// Why a pincode cannot take the requested shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum UnserviceableReason {
    NotServiced,
    Embargoed,
    CodUnavailable,
    PrepaidUnavailable,
    WeightExceeded { max_kg: Decimal },
    CodAmountExceeded { max_amount: Decimal },
}

impl UnserviceableReason {
    /// Returns a message the shopper can act on.
    pub fn message(&self) -> String {
        match self {
            UnserviceableReason::NotServiced => {
                "We do not deliver to this pincode yet".to_string()
            }
            UnserviceableReason::Embargoed => {
                "Deliveries to this pincode are temporarily suspended".to_string()
            }
            UnserviceableReason::CodUnavailable => {
                "Cash on delivery is not available for this pincode; please pay online".to_string()
            }
            UnserviceableReason::PrepaidUnavailable => {
                "Prepaid delivery is not available for this pincode; choose cash on delivery"
                    .to_string()
            }
            UnserviceableReason::WeightExceeded { max_kg } => {
                format!("Package weight exceeds the {max_kg} kg limit for this pincode")
            }
            UnserviceableReason::CodAmountExceeded { max_amount } => {
                format!("Cash on delivery is limited to ₹{max_amount} for this pincode")
            }
        }
    }
}

/// Estimated delivery window in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEstimate {
    pub min_days: u32,
    pub max_days: u32,
}

impl DeliveryEstimate {
    const fn days(min_days: u32, max_days: u32) -> Self {
        Self { min_days, max_days }
    }

    fn earlier_by_one(self) -> Self {
        Self {
            min_days: self.min_days.saturating_sub(1).max(1),
            max_days: self.max_days.saturating_sub(1).max(1),
        }
    }
}

impl std::fmt::Display for DeliveryEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{} days", self.min_days, self.max_days)
    }
}

/// What the shopper asked to ship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceabilityQuery {
    pub weight_kg: Decimal,
    pub cod: bool,
    /// Amount to collect on delivery, checked against the carrier's limit.
    pub cod_amount: Option<Decimal>,
}

/// Serviceability of one pincode for one shipment. Recomputed on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceabilityResult {
    pub pincode: String,
    pub serviceable: bool,
    pub delivery_estimate: Option<DeliveryEstimate>,
    pub cod_charge: Option<Decimal>,
    pub prepaid_charge: Option<Decimal>,
    pub reason: Option<UnserviceableReason>,
    pub error: Option<String>,
}

impl ServiceabilityResult {
    fn unserviceable(pincode: &Pincode, reason: UnserviceableReason) -> Self {
        Self {
            pincode: pincode.to_string(),
            serviceable: false,
            delivery_estimate: None,
            cod_charge: None,
            prepaid_charge: None,
            error: Some(reason.message()),
            reason: Some(reason),
        }
    }
}

/// Checks whether the carrier can deliver to a pincode.
pub struct PincodeServiceabilityChecker<C: Carrier> {
    carrier: C,
    default_cod_charge: Decimal,
    default_prepaid_charge: Decimal,
}

impl<C: Carrier> PincodeServiceabilityChecker<C> {
    /// Creates a checker with a ₹50 COD charge and free prepaid delivery
    /// for pincodes where the carrier reports no charges.
    pub fn new(carrier: C) -> Self {
        Self {
            carrier,
            default_cod_charge: Decimal::from(50),
            default_prepaid_charge: Decimal::ZERO,
        }
    }

    /// Checks a raw pincode. Malformed codes fail before any carrier call.
    #[tracing::instrument(skip(self))]
    pub async fn check(
        &self,
        pincode: &str,
        query: &ServiceabilityQuery,
    ) -> Result<ServiceabilityResult, FulfillmentError> {
        let pincode = Pincode::parse(pincode)?;
        let info = self.carrier.pincode_info(&pincode).await?;

        let result = match info {
            None => ServiceabilityResult::unserviceable(&pincode, UnserviceableReason::NotServiced),
            Some(info) => match unserviceable_reason(&info, query) {
                Some(reason) => ServiceabilityResult::unserviceable(&pincode, reason),
                None => ServiceabilityResult {
                    pincode: pincode.to_string(),
                    serviceable: true,
                    delivery_estimate: Some(estimate_delivery(&info)),
                    cod_charge: Some(info.cod_charge.unwrap_or(self.default_cod_charge)),
                    prepaid_charge: Some(
                        info.prepaid_charge.unwrap_or(self.default_prepaid_charge),
                    ),
                    reason: None,
                    error: None,
                },
            },
        };

        metrics::counter!(
            "pincode_checks_total",
            "serviceable" => if result.serviceable { "true" } else { "false" }
        )
        .increment(1);
        tracing::debug!(
            pincode = %result.pincode,
            serviceable = result.serviceable,
            "pincode checked"
        );

        Ok(result)
    }
}

fn is_embargoed(remarks: &str) -> bool {
    remarks.to_ascii_lowercase().contains("embargo")
}

fn unserviceable_reason(
    info: &PincodeInfo,
    query: &ServiceabilityQuery,
) -> Option<UnserviceableReason> {
    if is_embargoed(&info.remarks) {
        return Some(UnserviceableReason::Embargoed);
    }
    if query.cod && !info.cod {
        return Some(UnserviceableReason::CodUnavailable);
    }
    if !query.cod && !info.prepaid {
        return Some(UnserviceableReason::PrepaidUnavailable);
    }
    if let Some(max_kg) = info.max_weight_kg
        && query.weight_kg > max_kg
    {
        return Some(UnserviceableReason::WeightExceeded { max_kg });
    }
    if query.cod
        && let (Some(max_amount), Some(amount)) = (info.max_cod_amount, query.cod_amount)
        && amount > max_amount
    {
        return Some(UnserviceableReason::CodAmountExceeded { max_amount });
    }
    None
}

/// Estimates the delivery window for a serviceable pincode.
///
/// Restricted remarks and containment zones take precedence over the city
/// tier. Weekend delivery brings both bounds in by a day.
pub fn estimate_delivery(info: &PincodeInfo) -> DeliveryEstimate {
    let remarks = info.remarks.to_ascii_lowercase();
    let zone = info
        .zone
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let containment = zone.contains("containment")
        || has_word(&zone, "red")
        || remarks.contains("containment");

    let base = if containment {
        DeliveryEstimate::days(5, 8)
    } else if remarks.contains("restricted") {
        DeliveryEstimate::days(5, 7)
    } else if is_metro(info) {
        DeliveryEstimate::days(1, 3)
    } else if is_tier_two(info) {
        DeliveryEstimate::days(2, 4)
    } else {
        DeliveryEstimate::days(3, 5)
    };

    if info.weekend_delivery {
        base.earlier_by_one()
    } else {
        base
    }
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| w == word)
}

fn matches_any(values: &[&str], candidates: &[&str]) -> bool {
    values.iter().any(|value| {
        let value = value.trim().to_ascii_lowercase();
        !value.is_empty() && candidates.contains(&value.as_str())
    })
}

fn is_metro(info: &PincodeInfo) -> bool {
    matches_any(&[&info.city, &info.district], METRO_CITIES)
        || METRO_STATES.contains(&info.state.trim().to_ascii_uppercase().as_str())
}

fn is_tier_two(info: &PincodeInfo) -> bool {
    matches_any(&[&info.city, &info.district], TIER_TWO_CITIES)
}
