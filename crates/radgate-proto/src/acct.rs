//! Accounting enums (RFC 2866)

/// Acct-Status-Type values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AcctStatusType {
    /// Session started
    Start = 1,
    /// Session ended
    Stop = 2,
    /// Mid-session counter refresh
    InterimUpdate = 3,
    /// NAS came up
    AccountingOn = 7,
    /// NAS going down
    AccountingOff = 8,
}

impl AcctStatusType {
    /// Parse a wire value
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Start),
            2 => Some(Self::Stop),
            3 => Some(Self::InterimUpdate),
            7 => Some(Self::AccountingOn),
            8 => Some(Self::AccountingOff),
            _ => None,
        }
    }
}

/// Acct-Terminate-Cause values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AcctTerminateCause {
    /// User requested termination
    UserRequest = 1,
    /// Carrier lost
    LostCarrier = 2,
    /// Idle timeout
    IdleTimeout = 4,
    /// Session timeout reached
    SessionTimeout = 5,
    /// Administrative reset (our disconnect path)
    AdminReset = 6,
    /// NAS rebooted
    NasReboot = 11,
    /// Port suspended
    PortSuspended = 16,
}

impl AcctTerminateCause {
    /// Parse a wire value
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::UserRequest),
            2 => Some(Self::LostCarrier),
            4 => Some(Self::IdleTimeout),
            5 => Some(Self::SessionTimeout),
            6 => Some(Self::AdminReset),
            11 => Some(Self::NasReboot),
            16 => Some(Self::PortSuspended),
            _ => None,
        }
    }

    /// Human-readable cause string, as stored in accounting records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserRequest => "User-Request",
            Self::LostCarrier => "Lost-Carrier",
            Self::IdleTimeout => "Idle-Timeout",
            Self::SessionTimeout => "Session-Timeout",
            Self::AdminReset => "Admin-Reset",
            Self::NasReboot => "NAS-Reboot",
            Self::PortSuspended => "Port-Suspended",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_type_parse() {
        assert_eq!(AcctStatusType::from_u32(1), Some(AcctStatusType::Start));
        assert_eq!(AcctStatusType::from_u32(3), Some(AcctStatusType::InterimUpdate));
        assert_eq!(AcctStatusType::from_u32(99), None);
    }

    #[test]
    fn test_terminate_cause_names() {
        assert_eq!(AcctTerminateCause::AdminReset.as_str(), "Admin-Reset");
        assert_eq!(AcctTerminateCause::from_u32(11), Some(AcctTerminateCause::NasReboot));
    }
}
