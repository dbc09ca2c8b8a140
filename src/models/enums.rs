use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ServicePoint {
    Registration => "registration",
    Triage => "triage",
    Consultation => "consultation",
    Laboratory => "laboratory",
    Radiology => "radiology",
    Pharmacy => "pharmacy",
    Billing => "billing",
    Cashier => "cashier",
    Injection => "injection",
    Dressing => "dressing",
    Vitals => "vitals",
    Records => "records",
});

impl ServicePoint {
    /// Single-letter ticket prefix. Points without a dedicated letter
    /// share the generic 'Q'.
    pub fn ticket_prefix(&self) -> char {
        match self {
            Self::Registration => 'R',
            Self::Triage => 'T',
            Self::Consultation => 'C',
            Self::Laboratory => 'L',
            Self::Radiology => 'X',
            Self::Pharmacy => 'P',
            Self::Billing => 'B',
            Self::Injection => 'I',
            Self::Dressing => 'D',
            Self::Vitals => 'V',
            Self::Cashier | Self::Records => 'Q',
        }
    }

    /// Human-readable name for display boards.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Registration => "Registration",
            Self::Triage => "Triage",
            Self::Consultation => "Consultation",
            Self::Laboratory => "Laboratory",
            Self::Radiology => "Radiology",
            Self::Pharmacy => "Pharmacy",
            Self::Billing => "Billing",
            Self::Cashier => "Cashier",
            Self::Injection => "Injection Room",
            Self::Dressing => "Dressing Room",
            Self::Vitals => "Vitals Station",
            Self::Records => "Medical Records",
        }
    }
}

str_enum!(QueueStatus {
    Waiting => "waiting",
    Called => "called",
    InService => "in_service",
    Completed => "completed",
    Skipped => "skipped",
    NoShow => "no_show",
    Transferred => "transferred",
    Cancelled => "cancelled",
});

impl QueueStatus {
    /// A patient holds at most one open entry per facility per day.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Waiting | Self::Called | Self::InService)
    }
}

/// Priority band. Lower value is served first; Routine yields to
/// everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Emergency,
    Urgent,
    High,
    Normal,
    Routine,
}

impl Priority {
    pub fn value(&self) -> i64 {
        match self {
            Self::Emergency => 1,
            Self::Urgent => 2,
            Self::High => 3,
            Self::Normal => 5,
            Self::Routine => 10,
        }
    }

    pub fn from_value(value: i64) -> Result<Self, DatabaseError> {
        match value {
            1 => Ok(Self::Emergency),
            2 => Ok(Self::Urgent),
            3 => Ok(Self::High),
            5 => Ok(Self::Normal),
            10 => Ok(Self::Routine),
            _ => Err(DatabaseError::InvalidEnum {
                field: "Priority".into(),
                value: value.to_string(),
            }),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value().cmp(&other.value())
    }
}
