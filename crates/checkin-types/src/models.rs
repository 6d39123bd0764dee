use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// -- Roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

// -- Check-in window --

/// Where `now` falls relative to a session's check-in window.
/// Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    NotStarted,
    Active,
    Expired,
}

impl WindowState {
    pub fn at(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < start {
            WindowState::NotStarted
        } else if now > end {
            WindowState::Expired
        } else {
            WindowState::Active
        }
    }
}

// -- Seat / location metadata --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seat {
    pub row: char,
    pub col: u32,
}

impl Seat {
    /// Normalizes the row to upper case and rejects anything outside A-Z / col >= 1.
    pub fn normalized(self) -> Result<Self, String> {
        let row = self.row.to_ascii_uppercase();
        if !row.is_ascii_uppercase() {
            return Err("Seat row must be a letter A-Z".into());
        }
        if self.col == 0 {
            return Err("Seat column must be at least 1".into());
        }
        Ok(Seat { row, col: self.col })
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// When the device took the fix, if it reported one.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Location {
    pub fn validate(&self) -> Result<(), String> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err("Latitude must be between -90 and 90".into());
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err("Longitude must be between -180 and 180".into());
        }
        if let Some(acc) = self.accuracy {
            if !acc.is_finite() || acc < 0.0 {
                return Err("Location accuracy must be a non-negative number".into());
            }
        }
        Ok(())
    }
}

// -- Stored entities, as exposed over the API --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub student_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub title: String,
    pub checkin_code: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn window(&self, now: DateTime<Utc>) -> WindowState {
        WindowState::at(self.start_time, self.end_time, now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub checkin_time: DateTime<Utc>,
    pub location: Option<Location>,
    pub seat: Option<Seat>,
}

/// Percentage with two decimals. A zero denominator yields 0.
pub fn attendance_rate(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = count as f64 * 100.0 / total as f64;
    (pct * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        (start, start + Duration::minutes(60))
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let (start, end) = window();
        assert_eq!(WindowState::at(start, end, start), WindowState::Active);
        assert_eq!(WindowState::at(start, end, end), WindowState::Active);
        assert_eq!(
            WindowState::at(start, end, start - Duration::seconds(1)),
            WindowState::NotStarted
        );
        assert_eq!(
            WindowState::at(start, end, end + Duration::seconds(1)),
            WindowState::Expired
        );
    }

    #[test]
    fn seat_row_is_upper_cased() {
        let seat = Seat { row: 'c', col: 4 }.normalized().unwrap();
        assert_eq!(seat, Seat { row: 'C', col: 4 });
        assert_eq!(seat.to_string(), "C4");
    }

    #[test]
    fn seat_rejects_bad_coordinates() {
        assert!(Seat { row: '3', col: 4 }.normalized().is_err());
        assert!(Seat { row: 'A', col: 0 }.normalized().is_err());
    }

    #[test]
    fn location_range_checks() {
        let ok = Location { latitude: 31.2, longitude: 121.5, accuracy: Some(12.0), timestamp: None };
        assert!(ok.validate().is_ok());

        let bad_lat = Location { latitude: 91.0, ..ok };
        assert!(bad_lat.validate().is_err());

        let bad_acc = Location { accuracy: Some(-1.0), ..ok };
        assert!(bad_acc.validate().is_err());
    }

    #[test]
    fn rate_rounds_and_handles_empty() {
        assert_eq!(attendance_rate(0, 0), 0.0);
        assert_eq!(attendance_rate(1, 3), 33.33);
        assert_eq!(attendance_rate(2, 2), 100.0);
    }

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("guest".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Student);
    }
}
