//! Vocabulary mapping between the registry labels stored in the database
//! (Spanish) and the wire tokens the console speaks (English).
//!
//! Reads are lenient: an unrecognized stored label collapses to the default
//! category instead of failing. Writes go through the strict `parse_token`
//! functions so enum drift is rejected at the boundary.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub const DEFAULT: AttendanceStatus = AttendanceStatus::Present;
    pub const TOKENS: [&'static str; 3] = ["present", "absent", "late"];

    pub fn token(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn db_label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "presente",
            AttendanceStatus::Absent => "falta",
            AttendanceStatus::Late => "tardanza",
        }
    }

    /// Strict wire-token parse for the write path.
    pub fn parse_token(token: &str) -> Option<AttendanceStatus> {
        match token {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }

    /// Lenient read of a stored label; unknown labels map to the default.
    pub fn from_db_label(label: &str) -> AttendanceStatus {
        match label {
            "presente" => AttendanceStatus::Present,
            "falta" => AttendanceStatus::Absent,
            "tardanza" => AttendanceStatus::Late,
            _ => AttendanceStatus::DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipationLevel {
    High,
    Medium,
    Low,
}

impl ParticipationLevel {
    pub const DEFAULT: ParticipationLevel = ParticipationLevel::Medium;
    pub const TOKENS: [&'static str; 3] = ["high", "medium", "low"];

    pub fn token(self) -> &'static str {
        match self {
            ParticipationLevel::High => "high",
            ParticipationLevel::Medium => "medium",
            ParticipationLevel::Low => "low",
        }
    }

    pub fn db_label(self) -> &'static str {
        match self {
            ParticipationLevel::High => "alta",
            ParticipationLevel::Medium => "media",
            ParticipationLevel::Low => "baja",
        }
    }

    pub fn parse_token(token: &str) -> Option<ParticipationLevel> {
        match token {
            "high" => Some(ParticipationLevel::High),
            "medium" => Some(ParticipationLevel::Medium),
            "low" => Some(ParticipationLevel::Low),
            _ => None,
        }
    }

    pub fn from_db_label(label: &str) -> ParticipationLevel {
        match label {
            "alta" => ParticipationLevel::High,
            "media" => ParticipationLevel::Medium,
            "baja" => ParticipationLevel::Low,
            _ => ParticipationLevel::DEFAULT,
        }
    }

    /// Numeric rank used for averaging and rank-ordered sorting.
    pub fn rank(self) -> i64 {
        match self {
            ParticipationLevel::High => 3,
            ParticipationLevel::Medium => 2,
            ParticipationLevel::Low => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_round_trips_known_labels() {
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
        ] {
            assert_eq!(AttendanceStatus::from_db_label(status.db_label()), status);
            assert_eq!(AttendanceStatus::parse_token(status.token()), Some(status));
        }
    }

    #[test]
    fn unknown_stored_label_falls_back_to_default() {
        assert_eq!(
            AttendanceStatus::from_db_label("justificada"),
            AttendanceStatus::Present
        );
        assert_eq!(AttendanceStatus::from_db_label(""), AttendanceStatus::Present);
        assert_eq!(
            ParticipationLevel::from_db_label("regular"),
            ParticipationLevel::Medium
        );
    }

    #[test]
    fn strict_parse_rejects_unknown_tokens() {
        assert_eq!(AttendanceStatus::parse_token("presente"), None);
        assert_eq!(AttendanceStatus::parse_token("LATE"), None);
        assert_eq!(ParticipationLevel::parse_token("alta"), None);
    }

    #[test]
    fn level_ranks_order_high_to_low() {
        assert!(ParticipationLevel::High.rank() > ParticipationLevel::Medium.rank());
        assert!(ParticipationLevel::Medium.rank() > ParticipationLevel::Low.rank());
    }
}
