//! Access records held by the access contract
//!
//! One [`AccessRecord`] exists per principal. Role does not imply capability
//! flags: flags are granted explicitly. A record is only usable while its role
//! is not [`AccessRole::None`] and it has not expired.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::decision::DenyReason;

/// Access role, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    /// No access
    None = 0,
    /// Regular user
    Default = 1,
    /// Service personnel
    Service = 2,
    /// Administrator
    Admin = 3,
}

impl Default for AccessRole {
    fn default() -> Self {
        Self::None
    }
}

impl AccessRole {
    /// Decode the on-chain `uint8` value; unknown values map to `None`
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Default,
            2 => Self::Service,
            3 => Self::Admin,
            _ => Self::None,
        }
    }

    /// On-chain `uint8` value
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Parse from a name (for CLI and config input)
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "default" | "user" => Some(Self::Default),
            "service" => Some(Self::Service),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Human readable name
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Default => "Default",
            Self::Service => "Service",
            Self::Admin => "Admin",
        }
    }

    /// Flags the admin UI pre-selects for this role
    ///
    /// Service and Admin get every flag; Default gets physical and digital.
    pub fn conventional_flags(&self) -> (bool, bool, bool) {
        match self {
            Self::None => (false, false, false),
            Self::Default => (true, true, false),
            Self::Service | Self::Admin => (true, true, true),
        }
    }
}

impl std::fmt::Display for AccessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Capability a gateway requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Open physical doors
    Physical,
    /// Open digital doors
    Digital,
    /// Enter the admin room
    AdminRoom,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Physical => write!(f, "physical"),
            Capability::Digital => write!(f, "digital"),
            Capability::AdminRoom => write!(f, "admin_room"),
        }
    }
}

/// Per-principal access record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Role
    pub role: AccessRole,
    /// May open physical doors
    pub has_physical_access: bool,
    /// May open digital doors
    pub has_digital_access: bool,
    /// May enter the admin room
    pub has_admin_room_access: bool,
    /// Unix seconds after which the record is void; 0 means never
    pub expiration: u64,
}

impl AccessRecord {
    /// Record with every flag set to the role's conventional defaults
    pub fn for_role(role: AccessRole, expiration: u64) -> Self {
        let (physical, digital, admin_room) = role.conventional_flags();
        Self {
            role,
            has_physical_access: physical,
            has_digital_access: digital,
            has_admin_room_access: admin_room,
            expiration,
        }
    }

    /// Whether the record never expires
    pub fn never_expires(&self) -> bool {
        self.expiration == 0
    }

    /// Whether the record has expired at `now` (unix seconds)
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiration != 0 && self.expiration <= now
    }

    /// `role != None && (expiration == 0 || expiration > now)`
    pub fn is_valid(&self, now: u64) -> bool {
        self.role != AccessRole::None && !self.is_expired(now)
    }

    /// Whether the capability flag is set, ignoring role and expiration
    pub fn grants(&self, capability: Capability) -> bool {
        match capability {
            Capability::Physical => self.has_physical_access,
            Capability::Digital => self.has_digital_access,
            Capability::AdminRoom => self.has_admin_room_access,
        }
    }

    /// Valid at `now` and carrying the capability flag
    pub fn is_valid_for(&self, capability: Capability, now: u64) -> bool {
        self.check(capability, now).is_ok()
    }

    /// Like [`Self::is_valid_for`] but says why access is refused
    pub fn check(&self, capability: Capability, now: u64) -> Result<(), DenyReason> {
        if self.role == AccessRole::None {
            return Err(DenyReason::NoRecord);
        }
        if self.is_expired(now) {
            return Err(DenyReason::Expired);
        }
        if !self.grants(capability) {
            return Err(DenyReason::CapabilityNotGranted);
        }
        Ok(())
    }

    /// Expiration as a timestamp; `None` when the record never expires
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.never_expires() {
            return None;
        }
        Utc.timestamp_opt(self.expiration as i64, 0).single()
    }

    /// Expiration rendered for humans: `∞` or `yyyy-mm-dd HH:MM`
    pub fn expiration_label(&self) -> String {
        format_expiration(self.expiration)
    }
}

/// Render a unix-seconds expiration, treating 0 as "never expires"
pub fn format_expiration(expiration: u64) -> String {
    if expiration == 0 {
        return "∞".to_string();
    }
    match Utc.timestamp_opt(expiration as i64, 0).single() {
        Some(ts) => ts.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("@{}", expiration),
    }
}

/// Expiration timestamp for a grant lasting `minutes` from `now`; 0 minutes is forever
pub fn expiration_from_minutes(now: u64, minutes: u32) -> u64 {
    if minutes == 0 {
        0
    } else {
        now.saturating_add(u64::from(minutes) * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn service_record(expiration: u64) -> AccessRecord {
        AccessRecord {
            role: AccessRole::Service,
            has_physical_access: true,
            has_digital_access: true,
            has_admin_room_access: true,
            expiration,
        }
    }

    #[test]
    fn test_role_ordering_and_codes() {
        assert!(AccessRole::Admin > AccessRole::Service);
        assert!(AccessRole::Service > AccessRole::Default);
        assert!(AccessRole::Default > AccessRole::None);
        assert_eq!(AccessRole::from_u8(2), AccessRole::Service);
        assert_eq!(AccessRole::from_u8(9), AccessRole::None);
        assert_eq!(AccessRole::Admin.as_u8(), 3);
    }

    #[test]
    fn test_never_expiring_service_record_is_valid() {
        let r = service_record(0);
        assert!(r.is_valid(1_700_000_000));
        assert!(r.is_valid_for(Capability::Physical, 1_700_000_000));
        assert_eq!(r.expires_at(), None);
    }

    #[test]
    fn test_expired_record_denied() {
        let now = 1_700_000_000;
        let r = service_record(now - 1);
        assert!(!r.is_valid(now));
        assert_eq!(r.check(Capability::Physical, now), Err(DenyReason::Expired));
    }

    #[test]
    fn test_expiration_boundary_is_exclusive() {
        let r = service_record(100);
        assert!(r.is_valid(99));
        assert!(!r.is_valid(100));
    }

    #[test]
    fn test_flags_independent_of_role() {
        let r = AccessRecord {
            role: AccessRole::Admin,
            has_physical_access: false,
            has_digital_access: true,
            has_admin_room_access: false,
            expiration: 0,
        };
        assert_eq!(
            r.check(Capability::Physical, 0),
            Err(DenyReason::CapabilityNotGranted)
        );
        assert!(r.check(Capability::Digital, 0).is_ok());
    }

    #[test]
    fn test_none_role_reports_no_record() {
        let r = AccessRecord {
            has_physical_access: true,
            ..AccessRecord::default()
        };
        assert_eq!(r.check(Capability::Physical, 0), Err(DenyReason::NoRecord));
    }

    #[test]
    fn test_expiration_rendering() {
        assert_eq!(format_expiration(0), "∞");
        assert_eq!(format_expiration(86_400), "1970-01-02 00:00");
    }

    #[test]
    fn test_expiration_from_minutes() {
        assert_eq!(expiration_from_minutes(1_000, 0), 0);
        assert_eq!(expiration_from_minutes(1_000, 2), 1_120);
    }

    fn arb_role() -> impl Strategy<Value = AccessRole> {
        (0u8..4).prop_map(AccessRole::from_u8)
    }

    proptest! {
        #[test]
        fn prop_validity_matches_invariant(
            role in arb_role(),
            physical in any::<bool>(),
            digital in any::<bool>(),
            admin_room in any::<bool>(),
            expiration in 0u64..10_000,
            now in 0u64..10_000,
        ) {
            let r = AccessRecord {
                role,
                has_physical_access: physical,
                has_digital_access: digital,
                has_admin_room_access: admin_room,
                expiration,
            };
            let expected = role != AccessRole::None && (expiration == 0 || expiration > now);
            prop_assert_eq!(r.is_valid(now), expected);
            for cap in [Capability::Physical, Capability::Digital, Capability::AdminRoom] {
                prop_assert_eq!(r.is_valid_for(cap, now), expected && r.grants(cap));
            }
        }
    }
}
