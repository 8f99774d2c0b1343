//! Read-only aggregate snapshots.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub suspended_users: i64,
    pub verified_users: i64,
    pub users_with_logins: i64,
    pub new_users_30d: i64,
    pub new_users_7d: i64,
    pub active_percentage: f64,
    pub verification_rate: f64,
}

impl UserStats {
    /// Fill in the derived percentages from the raw counts.
    pub fn with_rates(mut self) -> Self {
        self.active_percentage = percentage(self.active_users, self.total_users);
        self.verification_rate = percentage(self.verified_users, self.total_users);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: i64,
    pub active_sessions: i64,
    pub expired_sessions: i64,
    pub sessions_24h: i64,
    pub sessions_7d: i64,
    pub sessions_30d: i64,
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_population_has_zero_rates() {
        let stats = UserStats::default().with_rates();
        assert_eq!(stats.active_percentage, 0.0);
        assert_eq!(stats.verification_rate, 0.0);
    }

    #[test]
    fn rates_are_percentages() {
        let stats = UserStats {
            total_users: 4,
            active_users: 3,
            verified_users: 1,
            ..Default::default()
        }
        .with_rates();
        assert_eq!(stats.active_percentage, 75.0);
        assert_eq!(stats.verification_rate, 25.0);
    }
}
