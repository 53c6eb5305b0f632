//! Caller segments and routing destinations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Caller behavioral segment
///
/// Each segment selects a guidance strategy (journey tree) and a default
/// destination. `Emergency` is the urgency overlay: it may bypass the normal
/// funnel ordering via fast-track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Time-critical call (flooding, gas, no heating in winter)
    Emergency,
    /// Owner of a let property who does not live there
    RemoteLandlord,
    /// Owner-occupier calling about their own home
    Homeowner,
    /// Renter calling about the home they live in
    Tenant,
    /// Agent or manager acting for one or more properties
    PropertyManager,
    /// Caller comparing prices before committing
    PriceShopper,
}

impl Segment {
    /// All segments in priority order (urgency overlay first)
    pub const ALL: [Segment; 6] = [
        Segment::Emergency,
        Segment::RemoteLandlord,
        Segment::Homeowner,
        Segment::Tenant,
        Segment::PropertyManager,
        Segment::PriceShopper,
    ];

    /// Segment used when nothing else can be determined
    pub const DEFAULT: Segment = Segment::Homeowner;

    /// Stable identifier used on the wire and in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Emergency => "emergency",
            Segment::RemoteLandlord => "remote_landlord",
            Segment::Homeowner => "homeowner",
            Segment::Tenant => "tenant",
            Segment::PropertyManager => "property_manager",
            Segment::PriceShopper => "price_shopper",
        }
    }

    /// Get segment display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Segment::Emergency => "Emergency",
            Segment::RemoteLandlord => "Remote Landlord",
            Segment::Homeowner => "Homeowner",
            Segment::Tenant => "Tenant",
            Segment::PropertyManager => "Property Manager",
            Segment::PriceShopper => "Price Shopper",
        }
    }

    /// Priority used to break ties (lower = higher priority)
    pub fn priority(&self) -> u8 {
        match self {
            Segment::Emergency => 0,
            Segment::RemoteLandlord => 1,
            Segment::PropertyManager => 2,
            Segment::Tenant => 3,
            Segment::Homeowner => 4,
            Segment::PriceShopper => 5,
        }
    }

    /// Whether this is the urgency overlay segment
    pub fn is_urgent(&self) -> bool {
        matches!(self, Segment::Emergency)
    }

    /// Destination recommended when the call reaches the DESTINATION station
    pub fn default_destination(&self) -> Destination {
        match self {
            Segment::Emergency => Destination::EmergencyDispatch,
            Segment::RemoteLandlord => Destination::BookVisit,
            Segment::Homeowner => Destination::BookVisit,
            Segment::Tenant => Destination::OwnerApproval,
            Segment::PropertyManager => Destination::AccountTeam,
            Segment::PriceShopper => Destination::SendQuote,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "emergency" | "urgent" => Ok(Segment::Emergency),
            "remote_landlord" | "landlord" => Ok(Segment::RemoteLandlord),
            "homeowner" | "home_owner" => Ok(Segment::Homeowner),
            "tenant" | "renter" => Ok(Segment::Tenant),
            "property_manager" | "managing_agent" => Ok(Segment::PropertyManager),
            "price_shopper" => Ok(Segment::PriceShopper),
            _ => Err(Error::UnknownSegment(s.to_string())),
        }
    }
}

/// Where the call should be routed once guidance is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Dispatch an engineer immediately
    EmergencyDispatch,
    /// Book a standard visit
    BookVisit,
    /// Work must be approved by the property owner first
    OwnerApproval,
    /// Hand over to the commercial accounts team
    AccountTeam,
    /// Send a written quote
    SendQuote,
    /// Arrange a callback
    Callback,
    /// Job is outside what we service
    NotServiced,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::EmergencyDispatch => "emergency_dispatch",
            Destination::BookVisit => "book_visit",
            Destination::OwnerApproval => "owner_approval",
            Destination::AccountTeam => "account_team",
            Destination::SendQuote => "send_quote",
            Destination::Callback => "callback",
            Destination::NotServiced => "not_serviced",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Destination::EmergencyDispatch => "Emergency Dispatch",
            Destination::BookVisit => "Book Visit",
            Destination::OwnerApproval => "Owner Approval",
            Destination::AccountTeam => "Account Team",
            Destination::SendQuote => "Send Quote",
            Destination::Callback => "Callback",
            Destination::NotServiced => "Not Serviced",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
