//! Per-call state: funnel stations, captured facts and journey cursor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::segment::{Destination, Segment};
use crate::Error;

/// Top-level funnel station
///
/// Stations only ever move forward. The single out-of-order move is the
/// urgency fast-track, which lands on `Destination` directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunnelStation {
    /// Let the caller describe the problem
    #[default]
    Listen,
    /// Work out who the caller is
    Segment,
    /// Decide whether we can take the job
    Qualify,
    /// Route the call
    Destination,
}

impl FunnelStation {
    pub const ALL: [FunnelStation; 4] = [
        FunnelStation::Listen,
        FunnelStation::Segment,
        FunnelStation::Qualify,
        FunnelStation::Destination,
    ];

    /// Next station in the funnel, `None` at the end
    pub fn next(&self) -> Option<FunnelStation> {
        match self {
            FunnelStation::Listen => Some(FunnelStation::Segment),
            FunnelStation::Segment => Some(FunnelStation::Qualify),
            FunnelStation::Qualify => Some(FunnelStation::Destination),
            FunnelStation::Destination => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStation::Listen => "LISTEN",
            FunnelStation::Segment => "SEGMENT",
            FunnelStation::Qualify => "QUALIFY",
            FunnelStation::Destination => "DESTINATION",
        }
    }

    /// Operator-facing prompt for this station
    pub fn guidance(&self) -> &'static str {
        match self {
            FunnelStation::Listen => "Let the caller explain the problem. Capture what the job is.",
            FunnelStation::Segment => "Confirm who you are speaking to and their relationship to the property.",
            FunnelStation::Qualify => "Check we cover the area and the caller can authorise the work.",
            FunnelStation::Destination => "Route the call to the recommended next step.",
        }
    }
}

impl fmt::Display for FunnelStation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which voice track a transcript chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    /// The person calling in
    Caller,
    /// The live agent taking the call
    Agent,
    /// IVR prompts, hold messages and the like
    System,
}

impl FromStr for SpeakerRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "caller" | "customer" | "inbound" => Ok(SpeakerRole::Caller),
            "agent" | "operator" => Ok(SpeakerRole::Agent),
            "system" | "ivr" => Ok(SpeakerRole::System),
            other => Err(Error::UnknownSpeakerRole(other.to_string())),
        }
    }
}

/// Identifier of a captured-info field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoField {
    Job,
    LocationCode,
    Name,
    Contact,
    DecisionMaker,
    RemoteOwner,
    TenantPresent,
}

impl InfoField {
    pub const ALL: [InfoField; 7] = [
        InfoField::Job,
        InfoField::LocationCode,
        InfoField::Name,
        InfoField::Contact,
        InfoField::DecisionMaker,
        InfoField::RemoteOwner,
        InfoField::TenantPresent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InfoField::Job => "job",
            InfoField::LocationCode => "location_code",
            InfoField::Name => "name",
            InfoField::Contact => "contact",
            InfoField::DecisionMaker => "decision_maker",
            InfoField::RemoteOwner => "remote_owner",
            InfoField::TenantPresent => "tenant_present",
        }
    }

    /// Whether the field holds a yes/no answer rather than text
    pub fn is_flag(&self) -> bool {
        matches!(
            self,
            InfoField::DecisionMaker | InfoField::RemoteOwner | InfoField::TenantPresent
        )
    }
}

impl FromStr for InfoField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InfoField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s.trim())
            .ok_or_else(|| Error::UnknownInfoField(s.to_string()))
    }
}

impl fmt::Display for InfoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text or yes/no value, used for journey flags and captured-info writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Interpret the value as a yes/no answer
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" => Some(true),
                "false" | "no" | "n" => Some(false),
                _ => None,
            },
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Structured facts captured from the conversation
///
/// Every field is nullable. Merging follows the once-set-never-cleared rule:
/// `None` on the incoming side never erases a captured value, and a later
/// non-null value overwrites an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedInfo {
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub location_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub decision_maker: Option<bool>,
    #[serde(default)]
    pub remote_owner: Option<bool>,
    #[serde(default)]
    pub tenant_present: Option<bool>,
}

impl CapturedInfo {
    /// Merge non-null fields from `partial`, returning the fields whose value changed
    pub fn merge(&mut self, partial: &CapturedInfo) -> Vec<InfoField> {
        let mut changed = Vec::new();

        fn take<T: Clone + PartialEq>(
            slot: &mut Option<T>,
            incoming: &Option<T>,
            field: InfoField,
            changed: &mut Vec<InfoField>,
        ) {
            if let Some(value) = incoming {
                if slot.as_ref() != Some(value) {
                    *slot = Some(value.clone());
                    changed.push(field);
                }
            }
        }

        take(&mut self.job, &partial.job, InfoField::Job, &mut changed);
        take(
            &mut self.location_code,
            &partial.location_code,
            InfoField::LocationCode,
            &mut changed,
        );
        take(&mut self.name, &partial.name, InfoField::Name, &mut changed);
        take(&mut self.contact, &partial.contact, InfoField::Contact, &mut changed);
        take(
            &mut self.decision_maker,
            &partial.decision_maker,
            InfoField::DecisionMaker,
            &mut changed,
        );
        take(
            &mut self.remote_owner,
            &partial.remote_owner,
            InfoField::RemoteOwner,
            &mut changed,
        );
        take(
            &mut self.tenant_present,
            &partial.tenant_present,
            InfoField::TenantPresent,
            &mut changed,
        );

        changed
    }

    /// Check whether a field holds a value
    pub fn is_set(&self, field: InfoField) -> bool {
        match field {
            InfoField::Job => self.job.is_some(),
            InfoField::LocationCode => self.location_code.is_some(),
            InfoField::Name => self.name.is_some(),
            InfoField::Contact => self.contact.is_some(),
            InfoField::DecisionMaker => self.decision_maker.is_some(),
            InfoField::RemoteOwner => self.remote_owner.is_some(),
            InfoField::TenantPresent => self.tenant_present.is_some(),
        }
    }

    /// Build a single-field partial from a loosely typed value
    pub fn single(field: InfoField, value: &FieldValue) -> Result<CapturedInfo, Error> {
        let mut partial = CapturedInfo::default();
        if field.is_flag() {
            let flag = value.as_bool().ok_or_else(|| Error::InvalidFieldValue {
                field: field.as_str().to_string(),
                message: format!("expected yes/no, got {:?}", value),
            })?;
            match field {
                InfoField::DecisionMaker => partial.decision_maker = Some(flag),
                InfoField::RemoteOwner => partial.remote_owner = Some(flag),
                InfoField::TenantPresent => partial.tenant_present = Some(flag),
                _ => unreachable!("non-flag field handled below"),
            }
        } else {
            let text = match value {
                FieldValue::Text(s) if !s.trim().is_empty() => s.trim().to_string(),
                other => {
                    return Err(Error::InvalidFieldValue {
                        field: field.as_str().to_string(),
                        message: format!("expected non-empty text, got {:?}", other),
                    })
                }
            };
            match field {
                InfoField::Job => partial.job = Some(text),
                InfoField::LocationCode => partial.location_code = Some(text),
                InfoField::Name => partial.name = Some(text),
                InfoField::Contact => partial.contact = Some(text),
                _ => unreachable!("flag field handled above"),
            }
        }
        Ok(partial)
    }
}

/// Full state of one active call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallState {
    pub call_id: String,
    #[serde(default)]
    pub caller_ref: Option<String>,

    pub current_station: FunnelStation,
    pub completed_stations: Vec<FunnelStation>,

    pub detected_segment: Option<Segment>,
    /// 0 - 100
    pub segment_confidence: u8,
    pub segment_signals: Vec<String>,
    /// Set once an operator has confirmed the segment
    #[serde(default)]
    pub segment_confirmed: bool,

    pub captured_info: CapturedInfo,

    pub is_qualified: Option<bool>,
    pub qualification_notes: Vec<String>,

    pub recommended_destination: Option<Destination>,
    pub selected_destination: Option<Destination>,

    /// Segment whose journey is loaded, if any
    #[serde(default)]
    pub journey_segment: Option<Segment>,
    pub journey_path: Vec<String>,
    pub current_journey_station: Option<String>,
    pub journey_flags: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub journey_complete: bool,

    pub station_entered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallState {
    /// Fresh state for a call that has just started
    pub fn new(call_id: impl Into<String>, caller_ref: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.into(),
            caller_ref,
            current_station: FunnelStation::Listen,
            completed_stations: Vec::new(),
            detected_segment: None,
            segment_confidence: 0,
            segment_signals: Vec::new(),
            segment_confirmed: false,
            captured_info: CapturedInfo::default(),
            is_qualified: None,
            qualification_notes: Vec::new(),
            recommended_destination: None,
            selected_destination: None,
            journey_segment: None,
            journey_path: Vec::new(),
            current_journey_station: None,
            journey_flags: BTreeMap::new(),
            journey_complete: false,
            station_entered_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh `updated_at`, never moving it backwards
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// Mark a station complete (idempotent)
    pub fn complete_station(&mut self, station: FunnelStation) {
        if !self.completed_stations.contains(&station) {
            self.completed_stations.push(station);
        }
    }

    /// Move to `station`, stamping the entry time
    pub fn enter_station(&mut self, station: FunnelStation) {
        self.current_station = station;
        self.station_entered_at = Utc::now().max(self.station_entered_at);
    }

    /// Operator selection if present, otherwise the recommendation
    pub fn effective_destination(&self) -> Option<Destination> {
        self.selected_destination.or(self.recommended_destination)
    }

    /// Clear every piece of journey state
    pub fn clear_journey(&mut self) {
        self.journey_segment = None;
        self.journey_path.clear();
        self.current_journey_station = None;
        self.journey_flags.clear();
        self.journey_complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funnel_order() {
        assert_eq!(FunnelStation::Listen.next(), Some(FunnelStation::Segment));
        assert_eq!(FunnelStation::Qualify.next(), Some(FunnelStation::Destination));
        assert_eq!(FunnelStation::Destination.next(), None);
        assert!(FunnelStation::Listen < FunnelStation::Destination);
    }

    #[test]
    fn test_merge_never_clears() {
        let mut info = CapturedInfo {
            job: Some("fix boiler".into()),
            ..Default::default()
        };
        let changed = info.merge(&CapturedInfo::default());
        assert!(changed.is_empty());
        assert_eq!(info.job.as_deref(), Some("fix boiler"));
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut info = CapturedInfo {
            job: Some("fix boiler".into()),
            ..Default::default()
        };
        let changed = info.merge(&CapturedInfo {
            job: Some("replace tap".into()),
            tenant_present: Some(false),
            ..Default::default()
        });
        assert_eq!(changed, vec![InfoField::Job, InfoField::TenantPresent]);
        assert_eq!(info.job.as_deref(), Some("replace tap"));
        assert_eq!(info.tenant_present, Some(false));
    }

    #[test]
    fn test_merge_same_value_is_not_a_change() {
        let mut info = CapturedInfo {
            name: Some("Sam".into()),
            ..Default::default()
        };
        let changed = info.merge(&CapturedInfo {
            name: Some("Sam".into()),
            ..Default::default()
        });
        assert!(changed.is_empty());
    }

    #[test]
    fn test_single_field_partial() {
        let partial = CapturedInfo::single(InfoField::RemoteOwner, &"yes".into()).unwrap();
        assert_eq!(partial.remote_owner, Some(true));

        let partial = CapturedInfo::single(InfoField::Job, &"fix boiler".into()).unwrap();
        assert_eq!(partial.job.as_deref(), Some("fix boiler"));

        assert!(CapturedInfo::single(InfoField::DecisionMaker, &"maybe".into()).is_err());
        assert!(CapturedInfo::single(InfoField::Name, &FieldValue::Bool(true)).is_err());
    }

    #[test]
    fn test_state_serde_round_trip() {
        let mut state = CallState::new("call-1", Some("+441234".into()));
        state.detected_segment = Some(Segment::Tenant);
        state
            .journey_flags
            .insert("access_arranged".into(), FieldValue::Bool(true));

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"LISTEN\""));
        let restored: CallState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_speaker_role_parse() {
        assert_eq!("Customer".parse::<SpeakerRole>().unwrap(), SpeakerRole::Caller);
        assert_eq!("agent".parse::<SpeakerRole>().unwrap(), SpeakerRole::Agent);
        assert!("robot".parse::<SpeakerRole>().is_err());
    }
}
