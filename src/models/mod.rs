//! Data models for Darshan

/// Implements Display and the Postgres TEXT column mapping for a string-backed enum.
///
/// The type must provide `as_str(&self) -> &'static str` and `FromStr<Err = String>`.
macro_rules! text_column {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s: String = sqlx::Decode::<sqlx::Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub mod booking;
pub mod crowd;
pub mod slot;
pub mod temple;
pub mod user;

// Re-export commonly used types
pub use booking::{Booking, BookingStatus, PaymentStatus};
pub use crowd::{Alert, AlertType, CrowdSimulation, Density, HourlyCrowdRecord, Severity};
pub use slot::{Slot, SlotStatus};
pub use temple::Temple;
pub use user::{Role, UserClaims};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_columns_display_their_wire_names() {
        assert_eq!(BookingStatus::NoShow.to_string(), "no_show");
        assert_eq!(PaymentStatus::Refunded.to_string(), "refunded");
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(AlertType::SpecialEvent.to_string(), "special_event");
        assert_eq!(SlotStatus::FULL.to_string(), "full");
    }

    #[test]
    fn test_request_bodies_are_camel_case() {
        let booking: booking::CreateBooking = serde_json::from_value(serde_json::json!({
            "slotId": 4,
            "visitorsCount": 1,
            "visitors": [{ "name": "Asha", "age": 30, "gender": "female", "idType": "aadhar" }],
            "specialRequests": ["wheelchair"]
        }))
        .unwrap();
        assert_eq!(booking.slot_id, 4);
        assert_eq!(booking.visitors[0].id_type, Some(booking::IdType::Aadhar));
        assert_eq!(booking.special_requests, vec!["wheelchair".to_string()]);

        let slot: slot::BulkCreateSlots = serde_json::from_value(serde_json::json!({
            "templeId": 1,
            "startDate": "2030-01-15",
            "endDate": "2030-01-16",
            "timeSlots": [{ "startTime": "09:00", "endTime": "09:30" }]
        }))
        .unwrap();
        assert_eq!(slot.time_slots[0].end_time, "09:30");

        let update: crowd::SimulationUpdate = serde_json::from_value(serde_json::json!({
            "hour": 10,
            "expectedVisitors": 60,
            "actualVisitors": 95
        }))
        .unwrap();
        assert_eq!(update.actual_visitors, 95);

        let snake = serde_json::json!({ "slot_id": 4, "visitors_count": 1, "visitors": [] });
        assert!(serde_json::from_value::<booking::CreateBooking>(snake).is_err());
    }
}
