//! Segment journey trees
//!
//! A journey is a small directed graph of guidance stations for one segment.
//! Stations are tagged variants (`info`, `choice`, `destination`); options on
//! choice/destination stations can be gated by a declarative condition and
//! carry a declarative side-effect action. Both are closed sets interpreted by
//! the call state machine, so journey definitions are plain data that can be
//! loaded from YAML.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::call::{CallState, FieldValue, InfoField};
use crate::segment::{Destination, Segment};
use crate::Error;

/// Kind of journey station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    /// Read-out or reminder; advances without a choice
    Info,
    /// Operator picks one of several options
    Choice,
    /// Final routing choice
    Destination,
}

impl StationKind {
    /// Whether advancing requires an option id
    pub fn requires_option(&self) -> bool {
        matches!(self, StationKind::Choice | StationKind::Destination)
    }
}

/// Availability predicate for an option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionCondition {
    InfoCaptured { field: InfoField },
    InfoMissing { field: InfoField },
    FlagEquals { flag: String, value: FieldValue },
    FlagUnset { flag: String },
}

impl OptionCondition {
    /// Evaluate against the current call state
    pub fn is_met(&self, state: &CallState) -> bool {
        match self {
            OptionCondition::InfoCaptured { field } => state.captured_info.is_set(*field),
            OptionCondition::InfoMissing { field } => !state.captured_info.is_set(*field),
            OptionCondition::FlagEquals { flag, value } => {
                state.journey_flags.get(flag) == Some(value)
            }
            OptionCondition::FlagUnset { flag } => !state.journey_flags.contains_key(flag),
        }
    }
}

/// Side effect executed when an option is selected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionAction {
    /// Record a journey flag
    SetFlag { flag: String, value: FieldValue },
    /// Write a captured-info field
    CaptureInfo { field: InfoField, value: FieldValue },
    /// Jump to a station other than the option's `next`
    Navigate { station: String },
    /// Skip straight to the DESTINATION funnel station
    FastTrack,
}

/// One selectable option on a choice or destination station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationOption {
    pub id: String,
    pub label: String,
    /// Station to move to; `None` ends the journey
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub condition: Option<OptionCondition>,
    #[serde(default)]
    pub action: Option<OptionAction>,
}

impl StationOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            next: None,
            condition: None,
            action: None,
        }
    }

    pub fn to(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn when(mut self, condition: OptionCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_action(mut self, action: OptionAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Whether the option can currently be selected
    pub fn is_available(&self, state: &CallState) -> bool {
        self.condition.as_ref().map_or(true, |c| c.is_met(state))
    }
}

/// A node in a segment journey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyStation {
    pub id: String,
    pub kind: StationKind,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Successor for `info` stations
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub options: Vec<StationOption>,
    /// Routing hint shown on destination stations
    #[serde(default)]
    pub destination: Option<Destination>,
}

impl JourneyStation {
    pub fn info(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: StationKind::Info,
            prompt: Some(prompt.into()),
            next: None,
            options: Vec::new(),
            destination: None,
        }
    }

    pub fn choice(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind: StationKind::Choice,
            ..Self::info(id, prompt)
        }
    }

    pub fn destination(
        id: impl Into<String>,
        prompt: impl Into<String>,
        destination: Destination,
    ) -> Self {
        Self {
            kind: StationKind::Destination,
            destination: Some(destination),
            ..Self::info(id, prompt)
        }
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn option(mut self, option: StationOption) -> Self {
        self.options.push(option);
        self
    }

    /// Find an option by id
    pub fn find_option(&self, option_id: &str) -> Option<&StationOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Options whose condition currently holds
    pub fn available_options(&self, state: &CallState) -> Vec<&StationOption> {
        self.options.iter().filter(|o| o.is_available(state)).collect()
    }
}

/// The full journey tree for one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentJourney {
    pub segment: Segment,
    pub entry: String,
    pub stations: Vec<JourneyStation>,
}

impl SegmentJourney {
    pub fn new(segment: Segment, entry: impl Into<String>) -> Self {
        Self {
            segment,
            entry: entry.into(),
            stations: Vec::new(),
        }
    }

    pub fn station(mut self, station: JourneyStation) -> Self {
        self.stations.push(station);
        self
    }

    /// Look up a station by id
    pub fn get(&self, id: &str) -> Option<&JourneyStation> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// Check structural integrity: unique ids, resolvable references, and
    /// option lists that match the station kind.
    pub fn validate(&self) -> Result<(), Error> {
        let segment = self.segment;
        let mut ids = HashSet::new();
        for station in &self.stations {
            if !ids.insert(station.id.as_str()) {
                return Err(Error::InvalidJourney(format!(
                    "{}: duplicate station id '{}'",
                    segment, station.id
                )));
            }
        }

        if !ids.contains(self.entry.as_str()) {
            return Err(Error::InvalidJourney(format!(
                "{}: entry station '{}' does not exist",
                segment, self.entry
            )));
        }

        let check_ref = |from: &str, target: &str| -> Result<(), Error> {
            if ids.contains(target) {
                Ok(())
            } else {
                Err(Error::InvalidJourney(format!(
                    "{}: station '{}' references unknown station '{}'",
                    segment, from, target
                )))
            }
        };

        for station in &self.stations {
            match station.kind {
                StationKind::Info => {
                    if !station.options.is_empty() {
                        return Err(Error::InvalidJourney(format!(
                            "{}: info station '{}' must not have options",
                            segment, station.id
                        )));
                    }
                    if let Some(next) = &station.next {
                        check_ref(&station.id, next)?;
                    }
                }
                StationKind::Choice | StationKind::Destination => {
                    if station.options.is_empty() {
                        return Err(Error::InvalidJourney(format!(
                            "{}: station '{}' has no options",
                            segment, station.id
                        )));
                    }
                    let mut option_ids = HashSet::new();
                    for option in &station.options {
                        if !option_ids.insert(option.id.as_str()) {
                            return Err(Error::InvalidJourney(format!(
                                "{}: station '{}' has duplicate option '{}'",
                                segment, station.id, option.id
                            )));
                        }
                        if let Some(next) = &option.next {
                            check_ref(&station.id, next)?;
                        }
                        if let Some(OptionAction::Navigate { station: target }) = &option.action {
                            check_ref(&station.id, target)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
