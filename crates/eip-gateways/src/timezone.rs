//! Timezone distance helpers used to rank gateways without server-side load data.

use chrono::{Local, Offset};

/// Hours in a day; distances wrap around it
const HOURS_PER_DAY: i32 = 24;

/// Largest possible distance between two offsets
pub const MAX_DISTANCE: i32 = HOURS_PER_DAY / 2;

/// Quality floor so nearby gateways never report zero load
const MIN_QUALITY: f64 = 0.1;

/// Local UTC offset in whole hours
pub fn current_offset() -> i32 {
    Local::now().offset().fix().local_minus_utc() / 3600
}

/// Circular distance in hours between two UTC offsets, `0..=12`
pub fn distance(client: i32, gateway: i32) -> i32 {
    let d = (client - gateway).rem_euclid(HOURS_PER_DAY);
    d.min(HOURS_PER_DAY - d)
}

/// Pseudo load in `0.1..=1.0` derived from timezone distance
pub fn connection_quality(client: i32, gateway: i32) -> f64 {
    (distance(client, gateway) as f64 / MAX_DISTANCE as f64).max(MIN_QUALITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_wraps() {
        assert_eq!(distance(1, 1), 0);
        assert_eq!(distance(1, 3), 2);
        assert_eq!(distance(-11, 12), 1);
        assert_eq!(distance(0, 12), 12);
        assert_eq!(distance(8, -7), 9);
    }

    #[test]
    fn test_distance_is_bounded() {
        for client in -12..=14 {
            for gateway in -12..=14 {
                let d = distance(client, gateway);
                assert!((0..=MAX_DISTANCE).contains(&d));
                assert_eq!(d, distance(gateway, client));
            }
        }
    }

    #[test]
    fn test_connection_quality() {
        assert_eq!(connection_quality(1, 1), 0.1);
        assert_eq!(connection_quality(0, 6), 0.5);
        assert_eq!(connection_quality(0, 12), 1.0);
    }

    #[test]
    fn test_current_offset_in_range() {
        assert!((-12..=14).contains(&current_offset()));
    }
}
