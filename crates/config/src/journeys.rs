//! Segment journey catalog
//!
//! One journey tree per segment, loaded at startup and immutable afterwards.
//! A YAML catalog may override any subset of segments; segments it does not
//! mention keep their built-in tree.

use std::collections::HashMap;
use std::path::Path;

use call_assist_core::{
    Destination, FieldValue, InfoField, JourneyStation, OptionAction, OptionCondition, Segment,
    SegmentJourney, StationOption,
};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// On-disk catalog layout
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    journeys: Vec<SegmentJourney>,
}

/// Immutable map from segment to its journey tree
#[derive(Debug, Clone)]
pub struct JourneyCatalog {
    journeys: HashMap<Segment, SegmentJourney>,
}

impl JourneyCatalog {
    /// Catalog with the built-in journey for every segment
    pub fn builtin() -> Self {
        let journeys = [
            emergency(),
            remote_landlord(),
            homeowner(),
            tenant(),
            property_manager(),
            price_shopper(),
        ]
        .into_iter()
        .map(|j| (j.segment, j))
        .collect();

        Self { journeys }
    }

    /// Parse a YAML catalog, filling unmentioned segments from the built-ins
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let mut catalog = Self::builtin();
        let mut seen = Vec::new();

        for journey in file.journeys {
            if seen.contains(&journey.segment) {
                return Err(ConfigError::Journey(format!(
                    "segment '{}' defined more than once",
                    journey.segment
                )));
            }
            seen.push(journey.segment);
            catalog.journeys.insert(journey.segment, journey);
        }

        catalog.validate()?;
        tracing::debug!(overridden = seen.len(), "Loaded journey catalog");
        Ok(catalog)
    }

    /// Load a YAML catalog from disk
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_yaml_str(&content)
    }

    /// Load from `path` when given, else the built-in catalog
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                tracing::info!(path = %path, "Loading journey catalog");
                Self::from_yaml_file(path)
            }
            None => Ok(Self::builtin()),
        }
    }

    /// Validate every journey tree
    pub fn validate(&self) -> Result<(), ConfigError> {
        for segment in Segment::ALL {
            let journey = self.journeys.get(&segment).ok_or_else(|| {
                ConfigError::Journey(format!("no journey for segment '{}'", segment))
            })?;
            if journey.segment != segment {
                return Err(ConfigError::Journey(format!(
                    "journey registered under '{}' declares segment '{}'",
                    segment, journey.segment
                )));
            }
            journey.validate()?;
        }
        Ok(())
    }

    pub fn get(&self, segment: Segment) -> Option<&SegmentJourney> {
        self.journeys.get(&segment)
    }

    pub fn len(&self) -> usize {
        self.journeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.journeys.is_empty()
    }
}

impl Default for JourneyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn set_flag(flag: &str, value: bool) -> OptionAction {
    OptionAction::SetFlag {
        flag: flag.to_string(),
        value: FieldValue::Bool(value),
    }
}

fn capture(field: InfoField, value: bool) -> OptionAction {
    OptionAction::CaptureInfo {
        field,
        value: FieldValue::Bool(value),
    }
}

fn emergency() -> SegmentJourney {
    SegmentJourney::new(Segment::Emergency, "safety")
        .station(
            JourneyStation::info(
                "safety",
                "Check everyone is safe. If they can smell gas, tell them to leave and call the gas emergency line.",
            )
            .then("isolate"),
        )
        .station(
            JourneyStation::choice("isolate", "Can they turn off the supply at the stopcock or fuse box?")
                .option(
                    StationOption::new("isolated", "Supply isolated")
                        .with_action(set_flag("supply_isolated", true))
                        .to("access"),
                )
                .option(
                    StationOption::new("not_isolated", "Cannot isolate")
                        .with_action(set_flag("supply_isolated", false))
                        .to("access"),
                ),
        )
        .station(
            JourneyStation::choice("access", "Will someone be on site to let the engineer in?")
                .option(
                    StationOption::new("on_site", "Someone on site")
                        .with_action(set_flag("someone_on_site", true))
                        .to("dispatch"),
                )
                .option(
                    StationOption::new("not_on_site", "Nobody on site")
                        .with_action(set_flag("someone_on_site", false))
                        .to("contact"),
                ),
        )
        .station(
            JourneyStation::choice("contact", "Take a number the engineer can call on the way.")
                .option(
                    StationOption::new("contact_taken", "Number confirmed")
                        .when(OptionCondition::InfoCaptured {
                            field: InfoField::Contact,
                        })
                        .to("dispatch"),
                )
                .option(StationOption::new("no_contact", "No number given").to("dispatch")),
        )
        .station(
            JourneyStation::destination(
                "dispatch",
                "Dispatch the nearest emergency engineer.",
                Destination::EmergencyDispatch,
            )
            .option(
                StationOption::new("dispatch_now", "Dispatch now")
                    .when(OptionCondition::InfoCaptured {
                        field: InfoField::Job,
                    })
                    .with_action(OptionAction::FastTrack),
            )
            .option(StationOption::new("callback", "Call back within 15 minutes")),
        )
}

fn remote_landlord() -> SegmentJourney {
    SegmentJourney::new(Segment::RemoteLandlord, "ownership")
        .station(
            JourneyStation::choice("ownership", "Confirm they own the property but live elsewhere.")
                .option(
                    StationOption::new("confirmed", "Owns, lives elsewhere")
                        .with_action(capture(InfoField::RemoteOwner, true))
                        .to("tenant_access"),
                )
                .option(
                    StationOption::new("lives_there", "Actually lives there")
                        .with_action(capture(InfoField::RemoteOwner, false))
                        .to("authority"),
                ),
        )
        .station(
            JourneyStation::choice("tenant_access", "Will the tenant be home to give access?")
                .option(
                    StationOption::new("tenant_home", "Tenant will be home")
                        .with_action(capture(InfoField::TenantPresent, true))
                        .to("authority"),
                )
                .option(
                    StationOption::new("tenant_away", "Tenant unavailable")
                        .with_action(capture(InfoField::TenantPresent, false))
                        .to("keys"),
                ),
        )
        .station(
            JourneyStation::info("keys", "Arrange key collection or take a key safe code.")
                .then("authority"),
        )
        .station(
            JourneyStation::choice("authority", "Can they approve the cost themselves?")
                .option(
                    StationOption::new("authorised", "Yes, they approve")
                        .with_action(capture(InfoField::DecisionMaker, true))
                        .to("route"),
                )
                .option(
                    StationOption::new("needs_agent", "Needs their agent or co-owner")
                        .with_action(capture(InfoField::DecisionMaker, false))
                        .to("route"),
                ),
        )
        .station(
            JourneyStation::destination("route", "Book the visit.", Destination::BookVisit)
                .option(
                    StationOption::new("book", "Book visit").when(OptionCondition::FlagUnset {
                        flag: "quote_requested".into(),
                    }),
                )
                .option(StationOption::new("quote_first", "Send a quote first")),
        )
}

fn homeowner() -> SegmentJourney {
    SegmentJourney::new(Segment::Homeowner, "describe")
        .station(
            JourneyStation::info("describe", "Get the full picture of the problem and when it started.")
                .then("timing"),
        )
        .station(
            JourneyStation::choice("timing", "How soon do they need someone?")
                .option(
                    StationOption::new("today", "Today")
                        .with_action(set_flag("wants_today", true))
                        .to("contact"),
                )
                .option(StationOption::new("this_week", "This week").to("contact"))
                .option(StationOption::new("flexible", "Flexible").to("contact")),
        )
        .station(
            JourneyStation::choice("contact", "Confirm the best contact number.")
                .option(
                    StationOption::new("have_contact", "Number confirmed")
                        .when(OptionCondition::InfoCaptured {
                            field: InfoField::Contact,
                        })
                        .to("route"),
                )
                .option(
                    StationOption::new("take_contact", "Take a number")
                        .when(OptionCondition::InfoMissing {
                            field: InfoField::Contact,
                        })
                        .to("route"),
                ),
        )
        .station(
            JourneyStation::destination("route", "Book the visit.", Destination::BookVisit)
                .option(StationOption::new("book", "Book visit"))
                .option(StationOption::new("quote", "Send a quote")),
        )
}

fn tenant() -> SegmentJourney {
    SegmentJourney::new(Segment::Tenant, "relationship")
        .station(
            JourneyStation::info("relationship", "Confirm they rent the property.")
                .then("landlord_aware"),
        )
        .station(
            JourneyStation::choice("landlord_aware", "Does the landlord know about the problem?")
                .option(
                    StationOption::new("aware", "Landlord knows")
                        .with_action(set_flag("landlord_aware", true))
                        .to("landlord_details"),
                )
                .option(
                    StationOption::new("not_aware", "Landlord not told")
                        .with_action(set_flag("landlord_aware", false))
                        .to("landlord_details"),
                ),
        )
        .station(
            JourneyStation::choice("landlord_details", "Take the landlord or letting agent's details.")
                .option(StationOption::new("has_details", "Details taken").to("route"))
                .option(
                    StationOption::new("no_details", "No details available")
                        .with_action(set_flag("landlord_details_missing", true))
                        .to("route"),
                ),
        )
        .station(
            JourneyStation::destination(
                "route",
                "Request approval from the property owner.",
                Destination::OwnerApproval,
            )
            .option(StationOption::new("request_approval", "Request owner approval"))
            .option(
                StationOption::new("tenant_pays", "Tenant will pay")
                    .with_action(capture(InfoField::DecisionMaker, true)),
            ),
        )
}

fn property_manager() -> SegmentJourney {
    SegmentJourney::new(Segment::PropertyManager, "account")
        .station(
            JourneyStation::choice("account", "Is the property already on an account with us?")
                .option(
                    StationOption::new("existing", "Existing account")
                        .with_action(set_flag("existing_account", true))
                        .to("reference"),
                )
                .option(
                    StationOption::new("new", "New client")
                        .with_action(set_flag("existing_account", false))
                        .to("route"),
                ),
        )
        .station(
            JourneyStation::info("reference", "Take the purchase order or job reference.")
                .then("route"),
        )
        .station(
            JourneyStation::destination(
                "route",
                "Hand over to the accounts team.",
                Destination::AccountTeam,
            )
            .option(StationOption::new("handover", "Hand over"))
            .option(StationOption::new("book_direct", "Book directly").when(
                OptionCondition::FlagEquals {
                    flag: "existing_account".into(),
                    value: FieldValue::Bool(true),
                },
            )),
        )
}

fn price_shopper() -> SegmentJourney {
    SegmentJourney::new(Segment::PriceShopper, "pricing")
        .station(
            JourneyStation::info("pricing", "Explain the call-out charge and hourly rate.")
                .then("compare"),
        )
        .station(
            JourneyStation::choice("compare", "Are they still comparing quotes?")
                .option(StationOption::new("comparing", "Still comparing").to("route"))
                .option(
                    StationOption::new("ready", "Ready to book")
                        .with_action(set_flag("ready_to_book", true))
                        .to("route"),
                ),
        )
        .station(
            JourneyStation::destination("route", "Send a written quote.", Destination::SendQuote)
                .option(StationOption::new("send_quote", "Send quote").when(
                    OptionCondition::InfoCaptured {
                        field: InfoField::Contact,
                    },
                ))
                .option(StationOption::new("book_now", "Book now").when(
                    OptionCondition::FlagEquals {
                        flag: "ready_to_book".into(),
                        value: FieldValue::Bool(true),
                    },
                ))
                .option(StationOption::new("callback", "Arrange a callback")),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_covers_every_segment() {
        let catalog = JourneyCatalog::builtin();
        assert_eq!(catalog.len(), Segment::ALL.len());
        assert!(catalog.validate().is_ok());
        for segment in Segment::ALL {
            let journey = catalog.get(segment).unwrap();
            assert!(journey.get(&journey.entry).is_some());
        }
    }

    #[test]
    fn test_yaml_override_keeps_other_builtins() {
        let yaml = r#"
journeys:
  - segment: tenant
    entry: only
    stations:
      - id: only
        kind: destination
        destination: owner_approval
        options:
          - id: done
            label: Done
"#;
        let catalog = JourneyCatalog::from_yaml_str(yaml).unwrap();
        assert_eq!(catalog.get(Segment::Tenant).unwrap().entry, "only");
        assert_eq!(catalog.get(Segment::Homeowner).unwrap().entry, "describe");
    }

    #[test]
    fn test_duplicate_segment_rejected() {
        let yaml = r#"
journeys:
  - segment: tenant
    entry: a
    stations: [{ id: a, kind: info }]
  - segment: tenant
    entry: a
    stations: [{ id: a, kind: info }]
"#;
        assert!(matches!(
            JourneyCatalog::from_yaml_str(yaml),
            Err(ConfigError::Journey(_))
        ));
    }

    #[test]
    fn test_broken_reference_rejected() {
        let yaml = r#"
journeys:
  - segment: homeowner
    entry: a
    stations:
      - { id: a, kind: info, next: missing }
"#;
        let err = JourneyCatalog::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "journeys:\n  - segment: price_shopper\n    entry: a\n    stations:\n      - {{ id: a, kind: info }}"
        )
        .unwrap();

        let catalog = JourneyCatalog::load(file.path().to_str()).unwrap();
        assert_eq!(catalog.get(Segment::PriceShopper).unwrap().stations.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            JourneyCatalog::from_yaml_file("/nonexistent/journeys.yaml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
