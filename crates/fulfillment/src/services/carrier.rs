//! Logistics carrier trait, Delhivery client, and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::Pincode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::FulfillmentError;

const SERVICE: &str = "carrier";

/// Payment mode as the carrier understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarrierPaymentMode {
    #[serde(rename = "COD")]
    Cod,
    Prepaid,
}

/// A shipment booking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRequest {
    pub consignee_name: String,
    pub address: String,
    pub phone: String,
    pub pincode: Pincode,
    pub city: String,
    pub state: String,
    pub country: String,
    pub order_ref: String,
    pub payment_mode: CarrierPaymentMode,
    pub products_desc: String,
    pub cod_amount: Option<Decimal>,
    pub total_amount: Decimal,
    pub weight_kg: Decimal,
}

/// A successful booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentBooking {
    pub waybill: String,
}

/// Carrier metadata for one postal code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PincodeInfo {
    pub pincode: String,
    pub cod: bool,
    pub prepaid: bool,
    pub max_weight_kg: Option<Decimal>,
    pub max_cod_amount: Option<Decimal>,
    pub remarks: String,
    pub city: String,
    pub district: String,
    pub state: String,
    /// Zone classification, e.g. a containment or red zone marker.
    pub zone: Option<String>,
    pub weekend_delivery: bool,
    pub cod_charge: Option<Decimal>,
    pub prepaid_charge: Option<Decimal>,
}

/// Trait for logistics carrier operations.
#[async_trait]
pub trait Carrier: Send + Sync {
    /// Books a shipment and returns its waybill.
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentBooking, FulfillmentError>;

    /// Looks up carrier metadata for a postal code. Returns `None` if the
    /// carrier does not serve it at all.
    async fn pincode_info(&self, pincode: &Pincode)
    -> Result<Option<PincodeInfo>, FulfillmentError>;
}

#[async_trait]
impl<T: Carrier + ?Sized> Carrier for Arc<T> {
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentBooking, FulfillmentError> {
        (**self).create_shipment(request).await
    }

    async fn pincode_info(
        &self,
        pincode: &Pincode,
    ) -> Result<Option<PincodeInfo>, FulfillmentError> {
        (**self).pincode_info(pincode).await
    }
}

/// Connection settings for [`DelhiveryCarrier`].
#[derive(Debug, Clone)]
pub struct CarrierConfig {
    pub base_url: String,
    pub api_token: String,
    pub pickup_location: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct CreateManifest<'a> {
    shipments: [ManifestShipment<'a>; 1],
    pickup_location: PickupLocation<'a>,
}

#[derive(Serialize)]
struct PickupLocation<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct ManifestShipment<'a> {
    name: &'a str,
    add: &'a str,
    pin: &'a str,
    city: &'a str,
    state: &'a str,
    country: &'a str,
    phone: &'a str,
    order: &'a str,
    payment_mode: CarrierPaymentMode,
    products_desc: &'a str,
    cod_amount: String,
    total_amount: String,
    /// Grams.
    weight: String,
}

#[derive(Deserialize)]
struct CreateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    packages: Vec<PackageResponse>,
    #[serde(default)]
    rmk: Option<String>,
}

#[derive(Deserialize)]
struct PackageResponse {
    #[serde(default)]
    waybill: Option<String>,
    #[serde(default)]
    remarks: Vec<String>,
}

#[derive(Deserialize)]
struct PincodeResponse {
    #[serde(default)]
    delivery_codes: Vec<DeliveryCode>,
}

#[derive(Deserialize)]
struct DeliveryCode {
    postal_code: PostalCode,
}

#[derive(Deserialize)]
struct PostalCode {
    pin: serde_json::Value,
    #[serde(default)]
    cod: String,
    #[serde(default)]
    pre_paid: String,
    #[serde(default)]
    max_weight: Option<Decimal>,
    #[serde(default)]
    max_amount: Option<Decimal>,
    #[serde(default)]
    remarks: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    district: String,
    #[serde(default)]
    state_code: String,
    #[serde(default)]
    inc: Option<String>,
    #[serde(default)]
    sun_tat: Option<bool>,
    #[serde(default)]
    cod_charge: Option<Decimal>,
    #[serde(default)]
    prepaid_charge: Option<Decimal>,
}

fn flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("y")
}

impl From<PostalCode> for PincodeInfo {
    fn from(code: PostalCode) -> Self {
        let pincode = match code.pin {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Self {
            pincode,
            cod: flag(&code.cod),
            prepaid: flag(&code.pre_paid),
            max_weight_kg: code.max_weight.filter(|w| w.is_sign_positive() && !w.is_zero()),
            max_cod_amount: code.max_amount.filter(|a| a.is_sign_positive() && !a.is_zero()),
            remarks: code.remarks,
            city: code.city,
            district: code.district,
            state: code.state_code,
            zone: code.inc.filter(|z| !z.trim().is_empty()),
            weekend_delivery: code.sun_tat.unwrap_or(false),
            cod_charge: code.cod_charge,
            prepaid_charge: code.prepaid_charge,
        }
    }
}

/// Delhivery client over HTTP.
#[derive(Clone)]
pub struct DelhiveryCarrier {
    client: reqwest::Client,
    config: Arc<CarrierConfig>,
}

impl DelhiveryCarrier {
    /// Creates a client with the given settings.
    pub fn new(config: CarrierConfig) -> Result<Self, FulfillmentError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FulfillmentError::upstream(SERVICE, e.to_string()))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn auth(&self) -> String {
        format!("Token {}", self.config.api_token)
    }

    fn transport_error(&self, err: reqwest::Error) -> FulfillmentError {
        if err.is_timeout() {
            FulfillmentError::Timeout {
                service: SERVICE,
                after: self.config.timeout,
            }
        } else {
            FulfillmentError::upstream(SERVICE, err.to_string())
        }
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("HTTP {status}: {body}")
}

#[async_trait]
impl Carrier for DelhiveryCarrier {
    #[tracing::instrument(skip(self, request), fields(order_ref = %request.order_ref))]
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentBooking, FulfillmentError> {
        let grams = (request.weight_kg * Decimal::ONE_THOUSAND).round();
        let manifest = CreateManifest {
            shipments: [ManifestShipment {
                name: &request.consignee_name,
                add: &request.address,
                pin: request.pincode.as_str(),
                city: &request.city,
                state: &request.state,
                country: &request.country,
                phone: &request.phone,
                order: &request.order_ref,
                payment_mode: request.payment_mode,
                products_desc: &request.products_desc,
                cod_amount: request.cod_amount.unwrap_or(Decimal::ZERO).to_string(),
                total_amount: request.total_amount.to_string(),
                weight: grams.to_string(),
            }],
            pickup_location: PickupLocation {
                name: &self.config.pickup_location,
            },
        };
        let data = serde_json::to_string(&manifest)?;

        let response = self
            .client
            .post(self.url("/api/cmu/create.json"))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .form(&[("format", "json"), ("data", data.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(FulfillmentError::upstream(SERVICE, error_body(response).await));
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| FulfillmentError::upstream(SERVICE, format!("bad response: {e}")))?;

        let package = created.packages.into_iter().next();
        match package {
            Some(PackageResponse {
                waybill: Some(waybill),
                ..
            }) if created.success && !waybill.trim().is_empty() => Ok(ShipmentBooking { waybill }),
            Some(package) => Err(FulfillmentError::upstream(
                SERVICE,
                package
                    .remarks
                    .first()
                    .cloned()
                    .or(created.rmk)
                    .unwrap_or_else(|| "booking rejected".to_string()),
            )),
            None => Err(FulfillmentError::upstream(
                SERVICE,
                created.rmk.unwrap_or_else(|| "no package in response".to_string()),
            )),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn pincode_info(
        &self,
        pincode: &Pincode,
    ) -> Result<Option<PincodeInfo>, FulfillmentError> {
        let response = self
            .client
            .get(self.url("/c/api/pin-codes/json/"))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .query(&[("filter_codes", pincode.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(FulfillmentError::upstream(SERVICE, error_body(response).await));
        }

        let body: PincodeResponse = response
            .json()
            .await
            .map_err(|e| FulfillmentError::upstream(SERVICE, format!("bad response: {e}")))?;

        Ok(body
            .delivery_codes
            .into_iter()
            .next()
            .map(|code| PincodeInfo::from(code.postal_code)))
    }
}

#[derive(Debug, Default)]
struct InMemoryCarrierState {
    pincodes: HashMap<String, PincodeInfo>,
    shipments: Vec<ShipmentRequest>,
    next_waybill: u32,
    create_calls: usize,
    pincode_calls: usize,
    fail_on_create: bool,
    create_delay: Option<Duration>,
}

/// In-memory carrier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarrier {
    state: Arc<RwLock<InMemoryCarrierState>>,
}

impl InMemoryCarrier {
    /// Creates a new in-memory carrier that serves no pincodes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers carrier metadata for a pincode.
    pub async fn add_pincode(&self, info: PincodeInfo) {
        self.state
            .write()
            .await
            .pincodes
            .insert(info.pincode.clone(), info);
    }

    /// Configures the carrier to reject bookings.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Makes every booking wait before answering.
    pub async fn set_create_delay(&self, delay: Option<Duration>) {
        self.state.write().await.create_delay = delay;
    }

    /// Returns the number of booking calls made, successful or not.
    pub async fn create_calls(&self) -> usize {
        self.state.read().await.create_calls
    }

    /// Returns the number of pincode lookups made.
    pub async fn pincode_calls(&self) -> usize {
        self.state.read().await.pincode_calls
    }

    /// Returns the successfully booked shipments.
    pub async fn shipments(&self) -> Vec<ShipmentRequest> {
        self.state.read().await.shipments.clone()
    }
}

#[async_trait]
impl Carrier for InMemoryCarrier {
    async fn create_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentBooking, FulfillmentError> {
        let delay = {
            let mut state = self.state.write().await;
            state.create_calls += 1;
            state.create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(FulfillmentError::upstream(SERVICE, "booking rejected"));
        }

        state.next_waybill += 1;
        let waybill = format!("WB{:010}", state.next_waybill);
        state.shipments.push(request.clone());

        Ok(ShipmentBooking { waybill })
    }

    async fn pincode_info(
        &self,
        pincode: &Pincode,
    ) -> Result<Option<PincodeInfo>, FulfillmentError> {
        let mut state = self.state.write().await;
        state.pincode_calls += 1;
        Ok(state.pincodes.get(pincode.as_str()).cloned())
    }
}
