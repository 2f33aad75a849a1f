//! QR payload encoding
//!
//! The stored payload is opaque to the booking core; rendering it as an image is
//! the client's job.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    error::{AppError, AppResult},
    models::booking::QrPayload,
};

#[cfg_attr(test, mockall::automock)]
pub trait QrEncoder: Send + Sync {
    fn encode(&self, payload: &QrPayload) -> AppResult<String>;
}

/// Encodes the payload as a base64 JSON data URL
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUrlQrEncoder;

impl QrEncoder for DataUrlQrEncoder {
    fn encode(&self, payload: &QrPayload) -> AppResult<String> {
        let json = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(format!("QR payload serialization failed: {}", e)))?;
        Ok(format!("data:application/json;base64,{}", STANDARD.encode(json)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_data_url_roundtrips_payload() {
        let payload = QrPayload {
            booking_id: "TCMABC123".into(),
            temple: "Somnath".into(),
            date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            time: "09:00 - 09:30".into(),
            visitors: 2,
            user: "Asha".into(),
        };
        let url = DataUrlQrEncoder.encode(&payload).unwrap();
        let encoded = url.strip_prefix("data:application/json;base64,").unwrap();
        let decoded: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded["booking_id"], "TCMABC123");
        assert_eq!(decoded["visitors"], 2);
    }
}
