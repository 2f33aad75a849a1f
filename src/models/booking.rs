//! Booking model and related types

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::NoShow => "no_show",
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "no_show" => Ok(BookingStatus::NoShow),
            other => Err(format!("Unknown booking status: {}", other)),
        }
    }
}

text_column!(BookingStatus);

/// Payment status. Payment is settled upstream, bookings are created `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("Unknown payment status: {}", other)),
        }
    }
}

text_column!(PaymentStatus);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Identity document kinds accepted at the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    Aadhar,
    Pan,
    Passport,
    DrivingLicense,
}

/// One visitor covered by a booking
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    #[validate(length(min = 2, message = "Visitor name is required"))]
    pub name: String,
    #[validate(range(min = 0, max = 120, message = "Valid age is required"))]
    pub age: i32,
    pub gender: Gender,
    pub id_type: Option<IdType>,
    pub id_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckIn {
    pub time: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    pub verified_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Feedback {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckOut {
    pub time: DateTime<Utc>,
    pub feedback: Option<Feedback>,
}

/// Booking record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Booking {
    pub id: i32,
    /// Human-shareable booking identifier
    pub booking_ref: String,
    pub user_id: i32,
    pub temple_id: i32,
    pub slot_id: i32,
    pub visitors_count: i32,
    #[schema(value_type = Vec<Visitor>)]
    pub visitors: Json<Vec<Visitor>>,
    pub contact_email: String,
    pub contact_phone: String,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub status: BookingStatus,
    /// Opaque encoded payload for the entry QR code
    pub qr_code: String,
    #[schema(value_type = Option<CheckIn>)]
    pub check_in: Option<Json<CheckIn>>,
    #[schema(value_type = Option<CheckOut>)]
    pub check_out: Option<Json<CheckOut>>,
    #[schema(value_type = Vec<String>)]
    pub special_requests: Json<Vec<String>>,
    pub crea_date: Option<DateTime<Utc>>,
    pub modif_date: Option<DateTime<Utc>>,
}

/// Values for a booking insert
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub booking_ref: String,
    pub user_id: i32,
    pub temple_id: i32,
    pub slot_id: i32,
    pub visitors_count: i32,
    pub visitors: Vec<Visitor>,
    pub contact_email: String,
    pub contact_phone: String,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub qr_code: String,
    pub special_requests: Vec<String>,
}

/// Data handed to the QR encoder
#[derive(Debug, Clone, Serialize)]
pub struct QrPayload {
    pub booking_id: String,
    pub temple: String,
    pub date: NaiveDate,
    pub time: String,
    pub visitors: i32,
    pub user: String,
}

impl QrPayload {
    pub fn time_window(start: NaiveTime, end: NaiveTime) -> String {
        format!("{} - {}", start.format("%H:%M"), end.format("%H:%M"))
    }
}

/// Create booking request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub slot_id: i32,
    #[validate(range(min = 1, max = 10, message = "Visitors count must be between 1 and 10"))]
    pub visitors_count: i32,
    #[validate(nested)]
    pub visitors: Vec<Visitor>,
    #[serde(default)]
    pub special_requests: Vec<String>,
}

/// Check-in request (admin)
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub verified_by: Option<String>,
}

/// Check-out request (admin)
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,
    #[validate(length(max = 500, message = "Comment cannot exceed 500 characters"))]
    pub comment: Option<String>,
}

/// Query parameters for booking listing
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookingQuery {
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub status: Option<BookingStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Paginated booking list
#[derive(Debug, Serialize, ToSchema)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub count: usize,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

/// QR lookup answer
#[derive(Debug, Serialize, ToSchema)]
pub struct BookingQr {
    pub booking_id: String,
    pub qr_code: String,
}

#[cfg(test)]
pub(crate) fn sample_booking(id: i32, slot_id: i32, visitors_count: i32) -> Booking {
    Booking {
        id,
        booking_ref: format!("TCMTEST{}", id),
        user_id: 7,
        temple_id: 1,
        slot_id,
        visitors_count,
        visitors: Json(Vec::new()),
        contact_email: "asha@example.org".to_string(),
        contact_phone: String::new(),
        total_amount: Decimal::new(20, 0) * Decimal::from(visitors_count),
        payment_status: PaymentStatus::Completed,
        status: BookingStatus::Confirmed,
        qr_code: "qr".to_string(),
        check_in: None,
        check_out: None,
        special_requests: Json(Vec::new()),
        crea_date: None,
        modif_date: None,
    }
}
