//! Crowd estimation: density classification and wait-time estimates
//!
//! All functions are pure.

use crate::models::crowd::{Density, QueueLevel, QueueWaitEstimate, WaitEstimateRequest};

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Density of observed against expected visitors
pub fn classify_density(actual: i32, expected: i32) -> Density {
    match ratio(f64::from(actual), f64::from(expected)) {
        r if r < 0.5 => Density::Low,
        r if r < 0.8 => Density::Medium,
        r if r < 1.2 => Density::High,
        _ => Density::Critical,
    }
}

/// Density of an area's occupancy against its capacity
pub fn classify_area_density(occupancy: i32, capacity: i32) -> Density {
    match ratio(f64::from(occupancy), f64::from(capacity)) {
        r if r < 0.3 => Density::Low,
        r if r < 0.6 => Density::Medium,
        r if r < 0.9 => Density::High,
        _ => Density::Critical,
    }
}

/// Coarse wait time in minutes from the occupancy ratio
pub fn estimate_wait_minutes(actual: i32, capacity: i32) -> i32 {
    match ratio(f64::from(actual), f64::from(capacity)) {
        r if r < 0.3 => 0,
        r if r < 0.6 => 5,
        r if r < 0.8 => 15,
        _ => 30,
    }
}

/// Queue-throughput wait estimate
///
/// Service rate is `capacity_per_slot / slot_duration_minutes * lanes` visitors
/// per minute. Without a positive rate the estimate is unknown.
pub fn estimate_queue_wait(
    current_visitors: f64,
    capacity_per_slot: f64,
    slot_duration_minutes: f64,
    lanes: f64,
) -> QueueWaitEstimate {
    let service_rate = ratio(capacity_per_slot, slot_duration_minutes) * lanes;
    if !service_rate.is_finite() || service_rate <= 0.0 {
        return QueueWaitEstimate {
            minutes: None,
            level: QueueLevel::Unknown,
        };
    }

    let minutes = ((current_visitors / service_rate).round() as i64).max(0);
    let level = match minutes {
        m if m > 90 => QueueLevel::High,
        m if m > 45 => QueueLevel::Medium,
        _ => QueueLevel::Low,
    };
    QueueWaitEstimate {
        minutes: Some(minutes),
        level,
    }
}

/// Queue estimate for a request, with absent or invalid inputs defaulted
///
/// Visitors and capacity default to 0. Duration and lanes fall back to the given
/// defaults when absent or zero and are never below 1.
pub fn estimate_queue_wait_for(
    request: &WaitEstimateRequest,
    default_duration_minutes: u32,
    default_lanes: u32,
) -> QueueWaitEstimate {
    fn or_default(value: Option<f64>, default: f64) -> f64 {
        match value {
            Some(v) if v.is_finite() && v != 0.0 => v,
            _ => default,
        }
    }

    estimate_queue_wait(
        or_default(request.current_visitors, 0.0),
        or_default(request.capacity_per_slot, 0.0),
        or_default(request.slot_duration_minutes, f64::from(default_duration_minutes)).max(1.0),
        or_default(request.lanes, f64::from(default_lanes)).max(1.0),
    )
}

/// Temple-wide density of the current hour, as a percentage of expected visitors
///
/// `None` (no record for the hour) reads as low.
pub fn overall_density(current: Option<(i32, i32)>) -> Density {
    let (actual, expected) = match current {
        Some(counts) => counts,
        None => return Density::Low,
    };
    match ratio(f64::from(actual), f64::from(expected)) * 100.0 {
        p if p < 30.0 => Density::Low,
        p if p < 60.0 => Density::Medium,
        p if p < 90.0 => Density::High,
        _ => Density::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_density_boundaries() {
        assert_eq!(classify_density(0, 100), Density::Low);
        assert_eq!(classify_density(49, 100), Density::Low);
        assert_eq!(classify_density(50, 100), Density::Medium);
        assert_eq!(classify_density(80, 100), Density::High);
        assert_eq!(classify_density(120, 100), Density::Critical);
        assert_eq!(classify_density(150, 100), Density::Critical);
    }

    #[test]
    fn test_zero_expected_is_low() {
        assert_eq!(classify_density(500, 0), Density::Low);
        assert_eq!(overall_density(Some((10, 0))), Density::Low);
    }

    #[test]
    fn test_classify_area_density() {
        assert_eq!(classify_area_density(29, 100), Density::Low);
        assert_eq!(classify_area_density(30, 100), Density::Medium);
        assert_eq!(classify_area_density(60, 100), Density::High);
        assert_eq!(classify_area_density(90, 100), Density::Critical);
    }

    #[test]
    fn test_wait_minutes_step_function() {
        assert_eq!(estimate_wait_minutes(10, 100), 0);
        assert_eq!(estimate_wait_minutes(30, 100), 5);
        assert_eq!(estimate_wait_minutes(60, 100), 15);
        assert_eq!(estimate_wait_minutes(95, 100), 30);
    }

    #[test]
    fn test_queue_wait_estimate() {
        let empty = estimate_queue_wait(0.0, 100.0, 30.0, 2.0);
        assert_eq!(empty.minutes, Some(0));
        assert_eq!(empty.level, QueueLevel::Low);

        // 100/30*2 = 6.67 visitors per minute
        let busy = estimate_queue_wait(400.0, 100.0, 30.0, 2.0);
        assert_eq!(busy.minutes, Some(60));
        assert_eq!(busy.level, QueueLevel::Medium);

        let packed = estimate_queue_wait(1000.0, 100.0, 30.0, 2.0);
        assert_eq!(packed.level, QueueLevel::High);
    }

    #[test]
    fn test_queue_wait_unknown_without_service_rate() {
        let unknown = estimate_queue_wait(50.0, 0.0, 30.0, 2.0);
        assert_eq!(unknown.minutes, None);
        assert_eq!(unknown.level, QueueLevel::Unknown);
    }

    #[test]
    fn test_queue_request_defaults() {
        let request = WaitEstimateRequest {
            current_visitors: Some(0.0),
            capacity_per_slot: Some(100.0),
            slot_duration_minutes: None,
            lanes: None,
        };
        let estimate = estimate_queue_wait_for(&request, 30, 2);
        assert_eq!(estimate.minutes, Some(0));
        assert_eq!(estimate.level, QueueLevel::Low);

        // Negative lanes clamp to one lane: 100/30 visitors per minute
        let request = WaitEstimateRequest {
            current_visitors: Some(200.0),
            capacity_per_slot: Some(100.0),
            slot_duration_minutes: Some(30.0),
            lanes: Some(-3.0),
        };
        assert_eq!(estimate_queue_wait_for(&request, 30, 2).minutes, Some(60));

        let missing = estimate_queue_wait_for(&WaitEstimateRequest::default(), 30, 2);
        assert_eq!(missing.level, QueueLevel::Unknown);
    }

    #[test]
    fn test_overall_density_thresholds() {
        assert_eq!(overall_density(None), Density::Low);
        assert_eq!(overall_density(Some((29, 100))), Density::Low);
        assert_eq!(overall_density(Some((30, 100))), Density::Medium);
        assert_eq!(overall_density(Some((60, 100))), Density::High);
        assert_eq!(overall_density(Some((90, 100))), Density::Critical);
    }
}
